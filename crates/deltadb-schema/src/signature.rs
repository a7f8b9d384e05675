//! Contract signatures: a deterministic structural fingerprint of a Model.
//!
//! The three sanctioned diff/alignment templates are pinned by their
//! signatures, and every diff or alignment workspace read back is checked for
//! byte-for-byte signature equality before its rows are trusted. The model
//! name itself does not participate; shape does.

use crate::model::{Model, name_cmp};
use sha2::{Digest, Sha256};

/// Render the canonical structural text of a model.
///
/// Entities sorted by name, each followed by its sorted property and
/// relationship lines. Any change to names, types, nullability or aliases
/// changes the text.
#[must_use]
pub fn canonical_text(model: &Model) -> String {
    let mut entities: Vec<_> = model.entities.iter().collect();
    entities.sort_by(|a, b| name_cmp(&a.name, &b.name));

    let mut lines = Vec::new();
    for entity in entities {
        lines.push(format!("entity|{}|{}", entity.name, entity.plural));

        let mut properties: Vec<_> = entity.properties.iter().collect();
        properties.sort_by(|a, b| name_cmp(&a.name, &b.name));
        for property in properties {
            let nullability = if property.is_nullable {
                "nullable"
            } else {
                "required"
            };
            lines.push(format!(
                "property|{}|{}|{}|{nullability}",
                entity.name, property.name, property.data_type
            ));
        }

        let mut relationships: Vec<_> = entity.relationships.iter().collect();
        relationships.sort_by(|a, b| {
            name_cmp(&a.name, &b.name).then_with(|| name_cmp(&a.entity, &b.entity))
        });
        for relationship in relationships {
            lines.push(format!(
                "relationship|{}|{}|{}|{}",
                entity.name, relationship.entity, relationship.name, relationship.column
            ));
        }
    }

    lines.join("\n")
}

/// Compute the contract signature: lowercase hex SHA-256 of the canonical text.
#[must_use]
pub fn signature(model: &Model) -> String {
    let digest = Sha256::digest(canonical_text(model).as_bytes());

    let mut hex = String::with_capacity(digest.len() * 2);
    for byte in digest {
        hex.push_str(&format!("{byte:02x}"));
    }

    hex
}

///
/// TESTS
///

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{DataType, Entity, Model, Property, Relationship};

    fn sample_model() -> Model {
        let mut model = Model {
            name: "Crm".to_string(),
            entities: vec![
                Entity {
                    name: "Region".to_string(),
                    properties: vec![Property {
                        name: "Code".to_string(),
                        data_type: DataType::Text,
                        is_nullable: true,
                    }],
                    ..Entity::default()
                },
                Entity {
                    name: "Customer".to_string(),
                    properties: vec![Property {
                        name: "Name".to_string(),
                        ..Property::default()
                    }],
                    relationships: vec![Relationship {
                        entity: "Region".to_string(),
                        ..Relationship::default()
                    }],
                    ..Entity::default()
                },
            ],
        };
        model.normalize();

        model
    }

    #[test]
    fn canonical_text_sorts_entities_and_members() {
        let expected = "entity|Customer|Customers\n\
                        property|Customer|Name|Text|required\n\
                        relationship|Customer|Region|Region|RegionId\n\
                        entity|Region|Regions\n\
                        property|Region|Code|Text|nullable";

        assert_eq!(canonical_text(&sample_model()), expected);
    }

    #[test]
    fn signature_is_stable_and_independent_of_model_name() {
        let mut model = sample_model();
        let first = signature(&model);

        model.name = "Renamed".to_string();
        assert_eq!(signature(&model), first);

        // Regression constant: canonical text above, SHA-256, lowercase hex.
        assert_eq!(
            first,
            "25686798e9640ad0b55519be8543112d89e643ca1f0681d112724aa3e8e4b14a"
        );
    }

    #[test]
    fn signature_changes_when_shape_changes() {
        let mut model = sample_model();
        let before = signature(&model);

        model.entities[0].properties[0].is_nullable = false;
        assert_ne!(signature(&model), before);
    }
}
