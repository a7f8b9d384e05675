//! Shared test fixtures.

use crate::{
    diff::{record, template},
    workspace::{InstanceRecord, Workspace},
};
use deltadb_schema::model::{Entity, Model, Property};

/// `Crm` model: one `Customer` entity with a required `Name`.
pub fn customer_model() -> Model {
    let mut model = Model {
        name: "Crm".to_string(),
        entities: vec![Entity {
            name: "Customer".to_string(),
            properties: vec![Property {
                name: "Name".to_string(),
                ..Property::default()
            }],
            ..Entity::default()
        }],
    };
    model.normalize();

    model
}

/// `Sales` model: one `Client` entity with a required `FullName`.
pub fn client_model() -> Model {
    let mut model = Model {
        name: "Sales".to_string(),
        entities: vec![Entity {
            name: "Client".to_string(),
            properties: vec![Property {
                name: "FullName".to_string(),
                ..Property::default()
            }],
            ..Entity::default()
        }],
    };
    model.normalize();

    model
}

pub fn customer_record(id: &str, name: &str) -> InstanceRecord {
    let mut rec = InstanceRecord::new(id);
    rec.values.insert("Name".to_string(), name.to_string());

    rec
}

pub fn customer_workspace(rows: &[(&str, &str)]) -> Workspace {
    let mut ws = Workspace::new(customer_model());
    for (id, name) in rows {
        ws.push_record("Customer", customer_record(id, name));
    }

    ws
}

pub fn client_workspace(rows: &[(&str, &str)]) -> Workspace {
    let mut ws = Workspace::new(client_model());
    for (id, name) in rows {
        let mut rec = InstanceRecord::new(*id);
        rec.values
            .insert("FullName".to_string(), (*name).to_string());
        ws.push_record("Client", rec);
    }

    ws
}

/// `Min` model: one `A` entity with a nullable `P`, rows carrying no values.
pub fn minimal_workspace(ids: &[&str]) -> Workspace {
    let mut model = Model {
        name: "Min".to_string(),
        entities: vec![Entity {
            name: "A".to_string(),
            properties: vec![Property {
                name: "P".to_string(),
                is_nullable: true,
                ..Property::default()
            }],
            ..Entity::default()
        }],
    };
    model.normalize();

    let mut ws = Workspace::new(model);
    for id in ids {
        ws.push_record("A", InstanceRecord::new(*id));
    }

    ws
}

/// Alignment catalog workspace mapping `Crm.Customer.Name` onto
/// `Sales.Client.FullName`.
pub fn rename_alignment() -> Workspace {
    let mut ws = Workspace::new(template::alignment_catalog().model.clone());

    ws.push_record("Model", record("1", &[("Name", "Crm")], &[]));
    ws.push_record("Model", record("2", &[("Name", "Sales")], &[]));
    ws.push_record("ModelLeft", record("1", &[], &[("Model", "1")]));
    ws.push_record("ModelRight", record("1", &[], &[("Model", "2")]));
    ws.push_record(
        "Alignment",
        record("1", &[], &[("ModelLeft", "1"), ("ModelRight", "1")]),
    );
    ws.push_record(
        "ModelLeftEntity",
        record("1", &[("Name", "Customer")], &[("ModelLeft", "1")]),
    );
    ws.push_record(
        "ModelRightEntity",
        record("1", &[("Name", "Client")], &[("ModelRight", "1")]),
    );
    ws.push_record(
        "ModelLeftProperty",
        record("1", &[("Name", "Name")], &[("ModelLeftEntity", "1")]),
    );
    ws.push_record(
        "ModelRightProperty",
        record("1", &[("Name", "FullName")], &[("ModelRightEntity", "1")]),
    );
    ws.push_record(
        "EntityMap",
        record(
            "1",
            &[],
            &[
                ("Alignment", "1"),
                ("ModelLeftEntity", "1"),
                ("ModelRightEntity", "1"),
            ],
        ),
    );
    ws.push_record(
        "PropertyMap",
        record(
            "1",
            &[],
            &[
                ("Alignment", "1"),
                ("ModelLeftProperty", "1"),
                ("ModelRightProperty", "1"),
            ],
        ),
    );

    ws
}
