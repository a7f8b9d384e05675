//! Model validation: staged, deterministic passes over a Model.
//!
//! Phase 1 checks naming invariants per scope, phase 2 checks the
//! relationship graph (targets exist, graph is acyclic). All findings are
//! collected into [`Diagnostics`]; nothing short-circuits.

use crate::{
    diag::Diagnostics,
    model::{Entity, Model, name_cmp, name_eq},
};
use std::collections::BTreeMap;

/// Identity is implicit; no entity may declare it as a column.
pub const RESERVED_ID: &str = "Id";

/// Run all model-level validation passes.
pub fn validate_model(model: &Model, diag: &mut Diagnostics) {
    validate_naming(model, diag);
    validate_relations(model, diag);
}

// Phase 1: name uniqueness and reserved names, case-insensitive per scope.
fn validate_naming(model: &Model, diag: &mut Diagnostics) {
    if model.name.is_empty() {
        diag.error("model.name.empty", "model", "model name is empty");
    }

    let mut seen_entities: BTreeMap<String, String> = BTreeMap::new();
    for entity in &model.entities {
        let location = format!("model.{}", entity.name);

        if entity.name.is_empty() {
            diag.error("model.entity.empty-name", &location, "entity name is empty");
            continue;
        }
        if let Some(prev) = seen_entities.insert(entity.name.to_ascii_lowercase(), entity.name.clone())
        {
            diag.error(
                "model.entity.duplicate",
                &location,
                format!("duplicate entity name '{}' (also '{prev}')", entity.name),
            );
        }

        validate_entity_naming(entity, &location, diag);
    }
}

fn validate_entity_naming(entity: &Entity, location: &str, diag: &mut Diagnostics) {
    // Properties and relationship columns share one column namespace.
    let mut seen_columns: BTreeMap<String, &str> = BTreeMap::new();

    for property in &entity.properties {
        let location = format!("{location}.{}", property.name);
        if property.name.is_empty() {
            diag.error("model.property.empty-name", &location, "property name is empty");
            continue;
        }
        if name_eq(&property.name, RESERVED_ID) {
            diag.error(
                "model.property.reserved-id",
                &location,
                "'Id' is implicit identity and may not be declared",
            );
        }
        if seen_columns
            .insert(property.name.to_ascii_lowercase(), "property")
            .is_some()
        {
            diag.error(
                "model.column.duplicate",
                &location,
                format!("duplicate column name '{}'", property.name),
            );
        }
    }

    let mut seen_usages: BTreeMap<String, ()> = BTreeMap::new();
    for relationship in &entity.relationships {
        let location = format!("{location}.{}", relationship.name);
        if relationship.name.is_empty() || relationship.column.is_empty() {
            diag.error(
                "model.relation.empty-alias",
                &location,
                "relationship usage and column aliases must be non-empty",
            );
            continue;
        }
        if seen_usages
            .insert(relationship.name.to_ascii_lowercase(), ())
            .is_some()
        {
            diag.error(
                "model.relation.duplicate",
                &location,
                format!("duplicate relationship usage name '{}'", relationship.name),
            );
        }
        if name_eq(&relationship.column, RESERVED_ID) {
            diag.error(
                "model.property.reserved-id",
                &location,
                "'Id' is implicit identity and may not be used as a column alias",
            );
        }
        if seen_columns
            .insert(relationship.column.to_ascii_lowercase(), "relationship")
            .is_some()
        {
            diag.error(
                "model.column.duplicate",
                &location,
                format!("duplicate column name '{}'", relationship.column),
            );
        }
    }
}

// Phase 2: relationship targets resolve, and the entity graph is acyclic.
fn validate_relations(model: &Model, diag: &mut Diagnostics) {
    for entity in &model.entities {
        for relationship in &entity.relationships {
            if model.find_entity(&relationship.entity).is_none() {
                diag.error(
                    "model.relation.missing-target",
                    format!("model.{}.{}", entity.name, relationship.name),
                    format!(
                        "relationship targets unknown entity '{}'",
                        relationship.entity
                    ),
                );
            }
        }
    }

    detect_cycles(model, diag);
}

// Depth-first traversal with an explicit visiting set; one finding per cycle
// entry point, reported in sorted entity order for determinism.
fn detect_cycles(model: &Model, diag: &mut Diagnostics) {
    let mut done: Vec<String> = Vec::new();

    let mut names: Vec<&str> = model.entities.iter().map(|e| e.name.as_str()).collect();
    names.sort_by(|a, b| name_cmp(a, b));

    for name in names {
        if done.iter().any(|d| name_eq(d, name)) {
            continue;
        }
        let mut path: Vec<String> = Vec::new();
        visit_entity(model, name, &mut path, &mut done, diag);
    }
}

fn visit_entity(
    model: &Model,
    name: &str,
    path: &mut Vec<String>,
    done: &mut Vec<String>,
    diag: &mut Diagnostics,
) {
    if let Some(position) = path.iter().position(|p| name_eq(p, name)) {
        let cycle = path[position..].join(" -> ");
        diag.error(
            "model.relation.cycle",
            format!("model.{name}"),
            format!("relationship cycle: {cycle} -> {name}"),
        );
        return;
    }
    if done.iter().any(|d| name_eq(d, name)) {
        return;
    }

    let Some(entity) = model.find_entity(name) else {
        return;
    };

    path.push(entity.name.clone());
    let mut targets: Vec<&str> = entity
        .relationships
        .iter()
        .map(|r| r.entity.as_str())
        .collect();
    targets.sort_by(|a, b| name_cmp(a, b));
    for target in targets {
        visit_entity(model, target, path, done, diag);
    }
    path.pop();
    done.push(entity.name.clone());
}

///
/// TESTS
///
