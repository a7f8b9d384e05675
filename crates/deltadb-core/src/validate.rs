//! Workspace validation: model passes plus instance integrity.
//!
//! Consumed after every merge apply and after every diff build; the merge
//! executor rolls back on errors (and on warnings under strict mode).

use crate::workspace::Workspace;
use deltadb_schema::{
    diag::Diagnostics,
    model::{Entity, name_eq},
    validate::validate_model,
};
use std::collections::BTreeSet;

/// Validate a workspace: model invariants, then instance integrity.
#[must_use]
pub fn validate(workspace: &Workspace) -> Diagnostics {
    let mut diag = Diagnostics::new();
    validate_model(&workspace.model, &mut diag);
    validate_instance(workspace, &mut diag);

    diag
}

// Instance integrity: id format/uniqueness, required values, relationship
// completeness, and undeclared data (warning).
fn validate_instance(workspace: &Workspace, diag: &mut Diagnostics) {
    for entity_name in workspace.instance.keys() {
        if workspace.model.find_entity(entity_name).is_none() {
            diag.warning(
                "instance.unknown-entity",
                format!("instance.{entity_name}"),
                "instance data for an entity the model does not declare",
            );
        }
    }

    for entity in &workspace.model.entities {
        validate_entity_records(workspace, entity, diag);
    }
}

fn validate_entity_records(workspace: &Workspace, entity: &Entity, diag: &mut Diagnostics) {
    let mut seen_ids: BTreeSet<&str> = BTreeSet::new();

    for record in workspace.records(&entity.name) {
        let location = format!("instance.{}.{}", entity.name, record.id);

        match record.id.parse::<u64>() {
            Ok(id) if id > 0 => {}
            _ => diag.error(
                "instance.bad-id",
                &location,
                format!("id '{}' is not a positive integer", record.id),
            ),
        }
        if !seen_ids.insert(record.id.as_str()) {
            diag.error(
                "instance.duplicate-id",
                &location,
                format!("duplicate id '{}'", record.id),
            );
        }

        for property in &entity.properties {
            if property.is_nullable {
                continue;
            }
            if record.value(&property.name).is_none_or(str::is_empty) {
                diag.error(
                    "instance.missing-value",
                    &location,
                    format!("required property '{}' has no value", property.name),
                );
            }
        }
        for key in record.values.keys() {
            if entity.find_property(key).is_none() {
                diag.warning(
                    "instance.unknown-property",
                    &location,
                    format!("value for undeclared property '{key}'"),
                );
            }
        }

        for relationship in &entity.relationships {
            match record.relationship_id(&relationship.name) {
                None => diag.error(
                    "instance.missing-relationship",
                    &location,
                    format!("relationship '{}' has no target id", relationship.name),
                ),
                Some(target_id) if target_id.is_empty() => diag.error(
                    "instance.missing-relationship",
                    &location,
                    format!("relationship '{}' has an empty target id", relationship.name),
                ),
                Some(target_id) => {
                    if workspace.find_record(&relationship.entity, target_id).is_none() {
                        diag.error(
                            "instance.dangling-relationship",
                            &location,
                            format!(
                                "relationship '{}' targets missing row '{}/{target_id}'",
                                relationship.name, relationship.entity
                            ),
                        );
                    }
                }
            }
        }
        for key in record.relationship_ids.keys() {
            if !entity.relationships.iter().any(|r| name_eq(&r.name, key)) {
                diag.warning(
                    "instance.unknown-relationship",
                    &location,
                    format!("target id for undeclared relationship '{key}'"),
                );
            }
        }
    }
}

///
/// TESTS
///

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{customer_record, customer_workspace};
    use crate::workspace::InstanceRecord;

    #[test]
    fn accepts_a_consistent_workspace() {
        let workspace = customer_workspace(&[("1", "Ann"), ("2", "Bo")]);
        let diag = validate(&workspace);

        assert!(diag.is_empty(), "{diag}");
    }

    #[test]
    fn rejects_missing_required_value_and_bad_id() {
        let mut workspace = customer_workspace(&[("1", "Ann")]);
        workspace.push_record("Customer", InstanceRecord::new("0"));
        workspace.push_record("Customer", customer_record("x", ""));

        let diag = validate(&workspace);
        let codes: Vec<&str> = diag.issues.iter().map(|i| i.code).collect();

        assert!(codes.contains(&"instance.bad-id"));
        assert!(codes.contains(&"instance.missing-value"));
    }

    #[test]
    fn rejects_duplicate_ids() {
        let workspace = customer_workspace(&[("1", "Ann"), ("1", "Bo")]);
        let diag = validate(&workspace);

        assert!(diag.issues.iter().any(|i| i.code == "instance.duplicate-id"));
    }

    #[test]
    fn warns_on_undeclared_values() {
        let mut workspace = customer_workspace(&[("1", "Ann")]);
        workspace.instance.get_mut("Customer").expect("records")[0]
            .values
            .insert("Ghost".to_string(), "boo".to_string());

        let diag = validate(&workspace);

        assert!(!diag.has_errors());
        assert_eq!(diag.warning_count(), 1);
    }
}
