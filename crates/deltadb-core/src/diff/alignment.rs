//! Alignment catalogs.
//!
//! An alignment catalog is a workspace on the `InstanceAlignment` template
//! that maps entities and properties of one schema onto another. The aligned
//! diff engine embeds these same tables, so the row parser here is shared
//! between a standalone catalog and a catalog carried inside an aligned diff.

use crate::{
    diff::{
        Side, exactly_one, require_relationship, require_value,
        template::{
            self, AlignmentTable, PROP_NAME, REL_ALIGNMENT, REL_MODEL, REL_MODEL_LEFT,
            REL_MODEL_LEFT_ENTITY, REL_MODEL_LEFT_PROPERTY, REL_MODEL_RIGHT,
            REL_MODEL_RIGHT_ENTITY, REL_MODEL_RIGHT_PROPERTY,
        },
        verify_template,
    },
    error::DiffError,
    workspace::{InstanceRecord, Workspace},
};
use deltadb_schema::model::{name_cmp, name_eq};
use std::collections::{BTreeMap, BTreeSet};

///
/// AlignmentCatalog
///
/// The parsed mapping: which left entity corresponds to which right entity,
/// and which properties correspond within each mapped pair. Identifier
/// columns align implicitly and are never listed.
///

#[derive(Clone, Debug)]
pub struct AlignmentCatalog {
    pub left_model_name: String,
    pub right_model_name: String,
    pub entity_maps: Vec<EntityMapEntry>,
    pub property_maps: Vec<PropertyMapEntry>,
}

///
/// EntityMapEntry / PropertyMapEntry
///

#[derive(Clone, Debug)]
pub struct EntityMapEntry {
    pub id: String,
    pub left_entity: String,
    pub right_entity: String,
}

impl EntityMapEntry {
    #[must_use]
    pub fn entity(&self, side: Side) -> &str {
        match side {
            Side::Left => &self.left_entity,
            Side::Right => &self.right_entity,
        }
    }
}

#[derive(Clone, Debug)]
pub struct PropertyMapEntry {
    pub id: String,
    pub entity_map_id: String,
    pub left_property: String,
    pub right_property: String,
}

impl PropertyMapEntry {
    #[must_use]
    pub fn property(&self, side: Side) -> &str {
        match side {
            Side::Left => &self.left_property,
            Side::Right => &self.right_property,
        }
    }
}

impl AlignmentCatalog {
    #[must_use]
    pub fn model_name(&self, side: Side) -> &str {
        match side {
            Side::Left => &self.left_model_name,
            Side::Right => &self.right_model_name,
        }
    }

    /// Property maps of one entity map, sorted by left property name.
    #[must_use]
    pub fn property_maps_for(&self, entity_map_id: &str) -> Vec<&PropertyMapEntry> {
        let mut maps: Vec<&PropertyMapEntry> = self
            .property_maps
            .iter()
            .filter(|pm| pm.entity_map_id == entity_map_id)
            .collect();
        maps.sort_by(|a, b| name_cmp(&a.left_property, &b.left_property));

        maps
    }

    /// Check that one side of the alignment resolves against a live
    /// workspace: matching model name, every mapped entity present, every
    /// mapped property resolvable as a column.
    pub fn validate_side(&self, ws: &Workspace, side: Side) -> Result<(), DiffError> {
        if !name_eq(&ws.model.name, self.model_name(side)) {
            return Err(DiffError::shape(format!(
                "{side} workspace model '{}' does not match aligned model '{}'",
                ws.model.name,
                self.model_name(side)
            )));
        }

        for entity_map in &self.entity_maps {
            let entity = ws.model.find_entity(entity_map.entity(side)).ok_or_else(|| {
                DiffError::shape(format!(
                    "{side} model '{}' has no entity '{}'",
                    ws.model.name,
                    entity_map.entity(side)
                ))
            })?;
            for property_map in self.property_maps_for(&entity_map.id) {
                if entity.resolve_column(property_map.property(side)).is_none() {
                    return Err(DiffError::shape(format!(
                        "{side} entity '{}' has no column '{}'",
                        entity.name,
                        property_map.property(side)
                    )));
                }
            }
        }

        Ok(())
    }
}

/// Parse a standalone alignment catalog workspace.
pub fn parse(ws: &Workspace) -> Result<AlignmentCatalog, DiffError> {
    verify_template(ws, template::alignment_catalog())?;
    parse_rows(ws)
}

/// Parse the alignment tables out of any workspace embedding them. The
/// aligned diff template carries the same tables under the same names.
pub(crate) fn parse_rows(ws: &Workspace) -> Result<AlignmentCatalog, DiffError> {
    let models = named_rows(ws, AlignmentTable::Model.name())?;
    let left_sides = side_rows(ws, AlignmentTable::ModelLeft.name(), &models)?;
    let right_sides = side_rows(ws, AlignmentTable::ModelRight.name(), &models)?;

    let alignment = exactly_one(ws, AlignmentTable::Alignment.name())?;
    let alignment_table = AlignmentTable::Alignment.name();
    let left_side = require_relationship(alignment, alignment_table, REL_MODEL_LEFT)?;
    let right_side = require_relationship(alignment, alignment_table, REL_MODEL_RIGHT)?;
    let left_model = left_sides.get(left_side).ok_or_else(|| {
        DiffError::dangling(
            alignment_table,
            &alignment.id,
            format!("unknown ModelLeft id '{left_side}'"),
        )
    })?;
    let right_model = right_sides.get(right_side).ok_or_else(|| {
        DiffError::dangling(
            alignment_table,
            &alignment.id,
            format!("unknown ModelRight id '{right_side}'"),
        )
    })?;

    let left_entities = entity_rows(
        ws,
        AlignmentTable::ModelLeftEntity.name(),
        REL_MODEL_LEFT,
        left_side,
        &left_sides,
    )?;
    let right_entities = entity_rows(
        ws,
        AlignmentTable::ModelRightEntity.name(),
        REL_MODEL_RIGHT,
        right_side,
        &right_sides,
    )?;
    let left_properties = property_rows(
        ws,
        AlignmentTable::ModelLeftProperty.name(),
        REL_MODEL_LEFT_ENTITY,
        &left_entities,
    )?;
    let right_properties = property_rows(
        ws,
        AlignmentTable::ModelRightProperty.name(),
        REL_MODEL_RIGHT_ENTITY,
        &right_entities,
    )?;

    // Entity maps must be a partial bijection: no entity on either side may
    // be mapped twice.
    let mut entity_maps = Vec::new();
    let mut map_of_left_entity: BTreeMap<String, String> = BTreeMap::new();
    let mut map_of_right_entity: BTreeMap<String, String> = BTreeMap::new();
    for rec in ws.sorted_records(AlignmentTable::EntityMap.name()) {
        let table = AlignmentTable::EntityMap.name();
        require_alignment_ref(rec, table, &alignment.id)?;
        let left_ref = require_relationship(rec, table, REL_MODEL_LEFT_ENTITY)?;
        let left_name = left_entities.get(left_ref).ok_or_else(|| {
            DiffError::dangling(
                table,
                &rec.id,
                format!("unknown ModelLeftEntity id '{left_ref}'"),
            )
        })?;
        let right_ref = require_relationship(rec, table, REL_MODEL_RIGHT_ENTITY)?;
        let right_name = right_entities.get(right_ref).ok_or_else(|| {
            DiffError::dangling(
                table,
                &rec.id,
                format!("unknown ModelRightEntity id '{right_ref}'"),
            )
        })?;

        if map_of_left_entity
            .insert(left_ref.to_string(), rec.id.clone())
            .is_some()
        {
            return Err(DiffError::duplicate(format!(
                "left entity '{left_name}' is mapped twice"
            )));
        }
        if map_of_right_entity
            .insert(right_ref.to_string(), rec.id.clone())
            .is_some()
        {
            return Err(DiffError::duplicate(format!(
                "right entity '{right_name}' is mapped twice"
            )));
        }

        entity_maps.push(EntityMapEntry {
            id: rec.id.clone(),
            left_entity: left_name.clone(),
            right_entity: right_name.clone(),
        });
    }
    entity_maps.sort_by(|a, b| name_cmp(&a.left_entity, &b.left_entity));

    let mut property_maps = Vec::new();
    let mut left_property_used: BTreeSet<String> = BTreeSet::new();
    let mut right_property_used: BTreeSet<String> = BTreeSet::new();
    for rec in ws.sorted_records(AlignmentTable::PropertyMap.name()) {
        let table = AlignmentTable::PropertyMap.name();
        require_alignment_ref(rec, table, &alignment.id)?;
        let left_ref = require_relationship(rec, table, REL_MODEL_LEFT_PROPERTY)?;
        let (left_entity, left_name) = left_properties.get(left_ref).ok_or_else(|| {
            DiffError::dangling(
                table,
                &rec.id,
                format!("unknown ModelLeftProperty id '{left_ref}'"),
            )
        })?;
        let right_ref = require_relationship(rec, table, REL_MODEL_RIGHT_PROPERTY)?;
        let (right_entity, right_name) = right_properties.get(right_ref).ok_or_else(|| {
            DiffError::dangling(
                table,
                &rec.id,
                format!("unknown ModelRightProperty id '{right_ref}'"),
            )
        })?;

        // Identifier columns align implicitly; a listed Id pair is dropped,
        // and an identifier never aligns with an ordinary property.
        let left_is_id = name_eq(left_name, "Id");
        let right_is_id = name_eq(right_name, "Id");
        if left_is_id && right_is_id {
            continue;
        }
        if left_is_id || right_is_id {
            return Err(DiffError::shape(format!(
                "'{table}' row '{}' aligns an identifier with property '{}'",
                rec.id,
                if left_is_id { right_name } else { left_name }
            )));
        }

        if !left_property_used.insert(left_ref.to_string()) {
            return Err(DiffError::duplicate(format!(
                "left property '{left_name}' is mapped twice"
            )));
        }
        if !right_property_used.insert(right_ref.to_string()) {
            return Err(DiffError::duplicate(format!(
                "right property '{right_name}' is mapped twice"
            )));
        }

        let left_map = map_of_left_entity.get(left_entity).ok_or_else(|| {
            DiffError::shape(format!(
                "property '{left_name}' belongs to an unmapped left entity"
            ))
        })?;
        let right_map = map_of_right_entity.get(right_entity).ok_or_else(|| {
            DiffError::shape(format!(
                "property '{right_name}' belongs to an unmapped right entity"
            ))
        })?;
        if left_map != right_map {
            return Err(DiffError::shape(format!(
                "properties '{left_name}' and '{right_name}' align across different entity maps"
            )));
        }

        property_maps.push(PropertyMapEntry {
            id: rec.id.clone(),
            entity_map_id: left_map.clone(),
            left_property: left_name.clone(),
            right_property: right_name.clone(),
        });
    }
    property_maps.sort_by(|a, b| {
        name_cmp(&a.entity_map_id, &b.entity_map_id)
            .then_with(|| name_cmp(&a.left_property, &b.left_property))
    });

    Ok(AlignmentCatalog {
        left_model_name: models
            .get(left_model)
            .expect("side rows were resolved against the model table")
            .clone(),
        right_model_name: models
            .get(right_model)
            .expect("side rows were resolved against the model table")
            .clone(),
        entity_maps,
        property_maps,
    })
}

fn require_alignment_ref(
    rec: &InstanceRecord,
    table: &str,
    alignment_id: &str,
) -> Result<(), DiffError> {
    let align_ref = require_relationship(rec, table, REL_ALIGNMENT)?;
    if align_ref == alignment_id {
        return Ok(());
    }

    Err(DiffError::dangling(
        table,
        &rec.id,
        format!("unknown Alignment id '{align_ref}'"),
    ))
}

/// Rows with a Name value, keyed by id.
fn named_rows(ws: &Workspace, table: &str) -> Result<BTreeMap<String, String>, DiffError> {
    let mut rows = BTreeMap::new();
    for rec in ws.sorted_records(table) {
        let name = require_value(rec, table, PROP_NAME)?;
        if rows.insert(rec.id.clone(), name.to_string()).is_some() {
            return Err(DiffError::duplicate(format!(
                "'{table}' id '{}' declared twice",
                rec.id
            )));
        }
    }

    Ok(rows)
}

/// ModelLeft / ModelRight rows: id mapped to the Model row they reference.
fn side_rows(
    ws: &Workspace,
    table: &str,
    models: &BTreeMap<String, String>,
) -> Result<BTreeMap<String, String>, DiffError> {
    let mut rows = BTreeMap::new();
    for rec in ws.sorted_records(table) {
        let model_ref = require_relationship(rec, table, REL_MODEL)?;
        if !models.contains_key(model_ref) {
            return Err(DiffError::dangling(
                table,
                &rec.id,
                format!("unknown Model id '{model_ref}'"),
            ));
        }
        if rows.insert(rec.id.clone(), model_ref.to_string()).is_some() {
            return Err(DiffError::duplicate(format!(
                "'{table}' id '{}' declared twice",
                rec.id
            )));
        }
    }

    Ok(rows)
}

/// Side entity rows: id mapped to name, constrained to this alignment's side.
fn entity_rows(
    ws: &Workspace,
    table: &str,
    side_rel: &'static str,
    expected_side: &str,
    sides: &BTreeMap<String, String>,
) -> Result<BTreeMap<String, String>, DiffError> {
    let mut rows = BTreeMap::new();
    for rec in ws.sorted_records(table) {
        let name = require_value(rec, table, PROP_NAME)?;
        let side_ref = require_relationship(rec, table, side_rel)?;
        if !sides.contains_key(side_ref) {
            return Err(DiffError::dangling(
                table,
                &rec.id,
                format!("unknown {side_rel} id '{side_ref}'"),
            ));
        }
        if side_ref != expected_side {
            return Err(DiffError::shape(format!(
                "'{table}' row '{}' belongs to a side outside this alignment",
                rec.id
            )));
        }
        if rows.insert(rec.id.clone(), name.to_string()).is_some() {
            return Err(DiffError::duplicate(format!(
                "'{table}' id '{}' declared twice",
                rec.id
            )));
        }
    }

    Ok(rows)
}

/// Side property rows: id mapped to (owning entity id, name).
fn property_rows(
    ws: &Workspace,
    table: &str,
    entity_rel: &'static str,
    entities: &BTreeMap<String, String>,
) -> Result<BTreeMap<String, (String, String)>, DiffError> {
    let mut rows = BTreeMap::new();
    for rec in ws.sorted_records(table) {
        let name = require_value(rec, table, PROP_NAME)?;
        let entity_ref = require_relationship(rec, table, entity_rel)?;
        if !entities.contains_key(entity_ref) {
            return Err(DiffError::dangling(
                table,
                &rec.id,
                format!("unknown {entity_rel} id '{entity_ref}'"),
            ));
        }
        if rows
            .insert(rec.id.clone(), (entity_ref.to_string(), name.to_string()))
            .is_some()
        {
            return Err(DiffError::duplicate(format!(
                "'{table}' id '{}' declared twice",
                rec.id
            )));
        }
    }

    Ok(rows)
}

///
/// TESTS
///
