//! Structural diff engines and their shared plumbing.
//!
//! Both engines follow the same shape: build emits a write-once diff
//! workspace from two live workspaces, parse reconstructs the computation
//! from a diff workspace and cross-checks the stored set differences against
//! an independent recomputation. The equal-model engine groups rows by a
//! freshly allocated entity/property catalog; the aligned engine groups by
//! entity-map/property-map ids from an embedded alignment catalog.

pub mod aligned;
pub mod alignment;
pub mod equal;
pub mod ident;
pub mod merge;
pub mod template;

use crate::{
    error::DiffError,
    key,
    workspace::{InstanceRecord, Workspace},
};
use deltadb_schema::{
    model::{ColumnSource, name_cmp},
    signature::signature,
};
use derive_more::Display;
use ident::IdentityAllocator;
use std::collections::{BTreeMap, BTreeSet};
use template::{PROP_ENTITY_IDENTIFIER, PROP_VALUE, Template};

///
/// Side
///

#[derive(Clone, Copy, Debug, Display, Eq, PartialEq)]
pub enum Side {
    Left,
    Right,
}

impl Side {
    #[must_use]
    pub const fn entity_instance(self) -> &'static str {
        match self {
            Self::Left => "LeftEntityInstance",
            Self::Right => "RightEntityInstance",
        }
    }

    #[must_use]
    pub const fn property_instance(self) -> &'static str {
        match self {
            Self::Left => "LeftPropertyInstance",
            Self::Right => "RightPropertyInstance",
        }
    }

    #[must_use]
    pub const fn rows_not_in_other(self) -> &'static str {
        match self {
            Self::Left => "LeftEntityInstanceNotInRight",
            Self::Right => "RightEntityInstanceNotInLeft",
        }
    }

    #[must_use]
    pub const fn properties_not_in_other(self) -> &'static str {
        match self {
            Self::Left => "LeftPropertyInstanceNotInRight",
            Self::Right => "RightPropertyInstanceNotInLeft",
        }
    }
}

///
/// SideData
///
/// One side of a diff reduced to canonical-key sets: row membership,
/// property-tuple membership, a value lookup per (row, property) cell, and
/// the ordered original ids per grouping key.
///

#[derive(Clone, Debug, Default)]
pub struct SideData {
    pub row_set: BTreeSet<String>,
    pub property_set: BTreeSet<String>,
    pub value_by_identity: BTreeMap<String, String>,
    pub rows_by_group: BTreeMap<String, Vec<String>>,
    pub row_key_of_property: BTreeMap<String, String>,
}

///
/// Differences
///
/// The four computed set differences. Property differences are restricted to
/// rows present on both sides; a changed value appears as one tuple on each
/// side, never as a merged "changed" record.
///

#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct Differences {
    pub left_rows_not_in_right: BTreeSet<String>,
    pub right_rows_not_in_left: BTreeSet<String>,
    pub left_properties_not_in_right: BTreeSet<String>,
    pub right_properties_not_in_left: BTreeSet<String>,
}

impl Differences {
    #[must_use]
    pub fn compute(left: &SideData, right: &SideData) -> Self {
        let shared: BTreeSet<&String> = left.row_set.intersection(&right.row_set).collect();

        let restrict = |from: &SideData, other: &SideData| -> BTreeSet<String> {
            from.property_set
                .difference(&other.property_set)
                .filter(|tuple| {
                    from.row_key_of_property
                        .get(*tuple)
                        .is_some_and(|row| shared.contains(row))
                })
                .cloned()
                .collect()
        };

        Self {
            left_rows_not_in_right: left.row_set.difference(&right.row_set).cloned().collect(),
            right_rows_not_in_left: right.row_set.difference(&left.row_set).cloned().collect(),
            left_properties_not_in_right: restrict(left, right),
            right_properties_not_in_left: restrict(right, left),
        }
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.left_rows_not_in_right.is_empty()
            && self.right_rows_not_in_left.is_empty()
            && self.left_properties_not_in_right.is_empty()
            && self.right_properties_not_in_left.is_empty()
    }
}

///
/// GroupSpec
///
/// One diff grouping resolved against a live workspace: the grouping key
/// (catalog entity id or entity-map id), the live entity it covers, and the
/// catalog columns bound to storage cells.
///

#[derive(Clone, Debug)]
pub struct GroupSpec {
    pub id: String,
    pub entity: String,
    pub columns: Vec<ColumnBinding>,
}

///
/// ColumnBinding
///

#[derive(Clone, Debug)]
pub struct ColumnBinding {
    pub id: String,
    pub source: ColumnSource,
}

///
/// SideEmission
///
/// Build-time side output: the reduced side data plus the allocated
/// instance-row ids needed to reference rows from the NotIn tables.
///

#[derive(Debug, Default)]
pub(crate) struct SideEmission {
    pub data: SideData,
    pub row_id_by_key: BTreeMap<String, String>,
    pub property_id_by_key: BTreeMap<String, String>,
}

///
/// ParsedSide
///
/// Parse-time side output: the reduced side data plus reverse lookups from
/// stored instance-row ids back to canonical keys.
///

#[derive(Debug, Default)]
pub(crate) struct ParsedSide {
    pub data: SideData,
    pub row_key_by_instance: BTreeMap<String, (String, String)>,
    pub property_key_by_instance: BTreeMap<String, String>,
}

/// Reject a workspace whose model is not the expected sanctioned template.
pub(crate) fn verify_template(ws: &Workspace, template: &Template) -> Result<(), DiffError> {
    if ws.model.name != template.model.name {
        return Err(DiffError::shape(format!(
            "expected model '{}', found '{}'",
            template.model.name, ws.model.name
        )));
    }
    if signature(&ws.model) != template.signature {
        return Err(DiffError::shape(format!(
            "contract signature mismatch for model '{}'",
            template.model.name
        )));
    }

    Ok(())
}

/// Build one instance record from literal cells.
pub(crate) fn record(
    id: &str,
    values: &[(&str, &str)],
    relationships: &[(&str, &str)],
) -> InstanceRecord {
    let mut rec = InstanceRecord::new(id);
    for (name, value) in values {
        rec.values.insert((*name).to_string(), (*value).to_string());
    }
    for (usage, target) in relationships {
        rec.relationship_ids
            .insert((*usage).to_string(), (*target).to_string());
    }

    rec
}

pub(crate) fn require_value<'a>(
    rec: &'a InstanceRecord,
    table: &str,
    property: &str,
) -> Result<&'a str, DiffError> {
    rec.value(property).ok_or_else(|| {
        DiffError::shape(format!(
            "'{table}' row '{}' is missing required value '{property}'",
            rec.id
        ))
    })
}

pub(crate) fn require_relationship<'a>(
    rec: &'a InstanceRecord,
    table: &str,
    usage: &str,
) -> Result<&'a str, DiffError> {
    rec.relationship_id(usage).ok_or_else(|| {
        DiffError::shape(format!(
            "'{table}' row '{}' is missing relationship '{usage}'",
            rec.id
        ))
    })
}

pub(crate) fn exactly_one<'a>(
    ws: &'a Workspace,
    table: &str,
) -> Result<&'a InstanceRecord, DiffError> {
    let records = ws.records(table);
    match records {
        [single] => Ok(single),
        _ => Err(DiffError::shape(format!(
            "expected exactly one '{table}' row, found {}",
            records.len()
        ))),
    }
}

/// Emit one side's instance and property-instance rows into a diff workspace.
pub(crate) fn emit_side(
    out: &mut Workspace,
    source: &Workspace,
    side: Side,
    specs: &[GroupSpec],
    group_rel: &'static str,
    property_rel: &'static str,
    alloc: &mut IdentityAllocator,
) -> SideEmission {
    let mut emission = SideEmission::default();

    for spec in specs {
        let mut idents = Vec::new();
        for rec in source.sorted_records(&spec.entity) {
            let inst_id = alloc.next(side.entity_instance());
            out.push_record(
                side.entity_instance(),
                record(
                    &inst_id,
                    &[(PROP_ENTITY_IDENTIFIER, &rec.id)],
                    &[(group_rel, &spec.id)],
                ),
            );
            let row_key = key::row_key(&spec.id, &rec.id);
            emission.data.row_set.insert(row_key.clone());
            emission.row_id_by_key.insert(row_key.clone(), inst_id.clone());
            idents.push(rec.id.clone());

            for column in &spec.columns {
                let Some(value) = rec.cell(&column.source) else {
                    continue;
                };
                if value.is_empty() {
                    continue;
                }
                let prop_inst_id = alloc.next(side.property_instance());
                out.push_record(
                    side.property_instance(),
                    record(
                        &prop_inst_id,
                        &[(PROP_VALUE, value)],
                        &[
                            (side.entity_instance(), &inst_id),
                            (property_rel, &column.id),
                        ],
                    ),
                );
                let property_key = key::property_key(&spec.id, &rec.id, &column.id, value);
                let identity_key = key::identity_key(&spec.id, &rec.id, &column.id);
                emission.data.property_set.insert(property_key.clone());
                emission
                    .data
                    .value_by_identity
                    .insert(identity_key, value.to_string());
                emission
                    .data
                    .row_key_of_property
                    .insert(property_key.clone(), row_key.clone());
                emission.property_id_by_key.insert(property_key, prop_inst_id);
            }
        }
        emission.data.rows_by_group.insert(spec.id.clone(), idents);
    }

    emission
}

/// Emit the four NotIn tables from computed differences.
pub(crate) fn emit_differences(
    out: &mut Workspace,
    alloc: &mut IdentityAllocator,
    diffs: &Differences,
    left: &SideEmission,
    right: &SideEmission,
) {
    let row_tables = [
        (Side::Left, &diffs.left_rows_not_in_right, &left.row_id_by_key),
        (
            Side::Right,
            &diffs.right_rows_not_in_left,
            &right.row_id_by_key,
        ),
    ];
    for (side, keys, ids) in row_tables {
        for row_key in keys {
            let target = ids
                .get(row_key)
                .expect("row difference key comes from its own side's row set");
            let id = alloc.next(side.rows_not_in_other());
            out.push_record(
                side.rows_not_in_other(),
                record(&id, &[], &[(side.entity_instance(), target)]),
            );
        }
    }

    let property_tables = [
        (
            Side::Left,
            &diffs.left_properties_not_in_right,
            &left.property_id_by_key,
        ),
        (
            Side::Right,
            &diffs.right_properties_not_in_left,
            &right.property_id_by_key,
        ),
    ];
    for (side, keys, ids) in property_tables {
        for property_key in keys {
            let target = ids
                .get(property_key)
                .expect("property difference key comes from its own side's property set");
            let id = alloc.next(side.properties_not_in_other());
            out.push_record(
                side.properties_not_in_other(),
                record(&id, &[], &[(side.property_instance(), target)]),
            );
        }
    }
}

/// Reconstruct one side from a diff workspace's instance tables.
pub(crate) fn parse_side(
    ws: &Workspace,
    side: Side,
    group_rel: &'static str,
    property_rel: &'static str,
    groups: &BTreeSet<String>,
    properties: &BTreeSet<String>,
) -> Result<ParsedSide, DiffError> {
    let mut parsed = ParsedSide::default();
    for group in groups {
        parsed.data.rows_by_group.insert(group.clone(), Vec::new());
    }

    for rec in ws.sorted_records(side.entity_instance()) {
        let table = side.entity_instance();
        let group = require_relationship(rec, table, group_rel)?;
        if !groups.contains(group) {
            return Err(DiffError::dangling(
                table,
                &rec.id,
                format!("unknown {group_rel} id '{group}'"),
            ));
        }
        let ident = require_value(rec, table, PROP_ENTITY_IDENTIFIER)?;
        let row_key = key::row_key(group, ident);
        if !parsed.data.row_set.insert(row_key) {
            return Err(DiffError::duplicate(format!(
                "'{table}' lists row '{group}/{ident}' twice"
            )));
        }
        parsed
            .data
            .rows_by_group
            .get_mut(group)
            .expect("group id was checked against the catalog")
            .push(ident.to_string());
        parsed
            .row_key_by_instance
            .insert(rec.id.clone(), (group.to_string(), ident.to_string()));
    }

    for rec in ws.sorted_records(side.property_instance()) {
        let table = side.property_instance();
        let owner = require_relationship(rec, table, side.entity_instance())?;
        let Some((group, ident)) = parsed.row_key_by_instance.get(owner) else {
            return Err(DiffError::dangling(
                table,
                &rec.id,
                format!("unknown {} id '{owner}'", side.entity_instance()),
            ));
        };
        let property = require_relationship(rec, table, property_rel)?;
        if !properties.contains(property) {
            return Err(DiffError::dangling(
                table,
                &rec.id,
                format!("unknown {property_rel} id '{property}'"),
            ));
        }
        let value = require_value(rec, table, PROP_VALUE)?;

        let identity_key = key::identity_key(group, ident, property);
        if parsed
            .data
            .value_by_identity
            .insert(identity_key, value.to_string())
            .is_some()
        {
            return Err(DiffError::duplicate(format!(
                "cell '{group}/{ident}/{property}' declares two values"
            )));
        }
        let property_key = key::property_key(group, ident, property, value);
        parsed.data.property_set.insert(property_key.clone());
        parsed
            .data
            .row_key_of_property
            .insert(property_key.clone(), key::row_key(group, ident));
        parsed
            .property_key_by_instance
            .insert(rec.id.clone(), property_key);
    }

    for idents in parsed.data.rows_by_group.values_mut() {
        idents.sort_by(|a, b| name_cmp(a, b));
    }

    Ok(parsed)
}

/// Read the four stored NotIn tables back as canonical-key sets.
pub(crate) fn parse_stored_differences(
    ws: &Workspace,
    left: &ParsedSide,
    right: &ParsedSide,
) -> Result<Differences, DiffError> {
    let rows = |side: Side, parsed: &ParsedSide| -> Result<BTreeSet<String>, DiffError> {
        let table = side.rows_not_in_other();
        let mut set = BTreeSet::new();
        for rec in ws.records(table) {
            let target = require_relationship(rec, table, side.entity_instance())?;
            let Some((group, ident)) = parsed.row_key_by_instance.get(target) else {
                return Err(DiffError::dangling(
                    table,
                    &rec.id,
                    format!("unknown {} id '{target}'", side.entity_instance()),
                ));
            };
            set.insert(key::row_key(group, ident));
        }

        Ok(set)
    };

    let properties = |side: Side, parsed: &ParsedSide| -> Result<BTreeSet<String>, DiffError> {
        let table = side.properties_not_in_other();
        let mut set = BTreeSet::new();
        for rec in ws.records(table) {
            let target = require_relationship(rec, table, side.property_instance())?;
            let Some(property_key) = parsed.property_key_by_instance.get(target) else {
                return Err(DiffError::dangling(
                    table,
                    &rec.id,
                    format!("unknown {} id '{target}'", side.property_instance()),
                ));
            };
            set.insert(property_key.clone());
        }

        Ok(set)
    };

    Ok(Differences {
        left_rows_not_in_right: rows(Side::Left, left)?,
        right_rows_not_in_left: rows(Side::Right, right)?,
        left_properties_not_in_right: properties(Side::Left, left)?,
        right_properties_not_in_left: properties(Side::Right, right)?,
    })
}

/// Self-consistency check: stored differences must equal the recomputation.
pub(crate) fn verify_stored_differences(
    stored: &Differences,
    recomputed: &Differences,
) -> Result<(), DiffError> {
    if stored == recomputed {
        return Ok(());
    }

    Err(DiffError::shape(
        "stored NotIn tables do not match the recomputed set differences",
    ))
}
