//! Equal-model diff engine.
//!
//! Build computes a portable diff workspace between two instances of one
//! schema. The diff carries its own freshly allocated entity/property
//! catalog, so its keys never depend on the live schema's ids; that
//! re-identification is what makes the diff replayable against a third
//! workspace.

use crate::{
    diff::{
        ColumnBinding, Differences, GroupSpec, Side, SideData, emit_differences, emit_side,
        exactly_one, parse_side, parse_stored_differences, record, require_relationship,
        require_value,
        template::{
            self, DIFF_MODEL_VERSION, EqualDiffTable, PROP_DIFF_MODEL_VERSION, PROP_NAME,
            REL_ENTITY, REL_MODEL, REL_PROPERTY,
        },
        verify_stored_differences, verify_template,
    },
    diff::ident::IdentityAllocator,
    error::DiffError,
    validate::validate,
    workspace::Workspace,
};
use deltadb_schema::model::{Model, name_cmp};
use std::collections::{BTreeMap, BTreeSet};

///
/// EqualDiff
///
/// Build output: the write-once diff workspace and whether the two sides
/// differed at all.
///

#[derive(Debug)]
pub struct EqualDiff {
    pub workspace: Workspace,
    pub has_differences: bool,
}

///
/// CatalogEntity / CatalogColumn
///
/// The diff's own entity/property catalog, reconstructed on parse.
///

#[derive(Clone, Debug)]
pub struct CatalogEntity {
    pub id: String,
    pub name: String,
    pub columns: Vec<CatalogColumn>,
}

#[derive(Clone, Debug)]
pub struct CatalogColumn {
    pub id: String,
    pub name: String,
}

///
/// EqualDiffData
///
/// Parse output: both sides reduced to canonical-key sets, the catalog, and
/// the verified set differences.
///

#[derive(Debug)]
pub struct EqualDiffData {
    pub model_name: String,
    pub catalog: Vec<CatalogEntity>,
    pub left: SideData,
    pub right: SideData,
    pub differences: Differences,
    pub has_differences: bool,
}

impl EqualDiffData {
    /// Bind the diff catalog to a live model for merge computation.
    pub fn group_specs(&self, model: &Model) -> Result<Vec<GroupSpec>, DiffError> {
        self.catalog
            .iter()
            .map(|catalog_entity| {
                let entity = model.find_entity(&catalog_entity.name).ok_or_else(|| {
                    DiffError::shape(format!(
                        "target model has no entity '{}'",
                        catalog_entity.name
                    ))
                })?;
                let columns = catalog_entity
                    .columns
                    .iter()
                    .map(|column| {
                        let source = entity.resolve_column(&column.name).ok_or_else(|| {
                            DiffError::shape(format!(
                                "entity '{}' has no column '{}'",
                                entity.name, column.name
                            ))
                        })?;
                        Ok(ColumnBinding {
                            id: column.id.clone(),
                            source,
                        })
                    })
                    .collect::<Result<Vec<_>, DiffError>>()?;

                Ok(GroupSpec {
                    id: catalog_entity.id.clone(),
                    entity: entity.name.clone(),
                    columns,
                })
            })
            .collect()
    }
}

/// Build a diff workspace between two instances of one schema.
///
/// `left.model` is the authoritative schema; the caller asserts that `right`
/// uses the same one.
pub fn build(left: &Workspace, right: &Workspace) -> Result<EqualDiff, DiffError> {
    let template = template::equal_diff();
    let mut out = Workspace::new(template.model.clone());
    let mut alloc = IdentityAllocator::new();

    let model_row = alloc.next(EqualDiffTable::Model.name());
    out.push_record(
        EqualDiffTable::Model.name(),
        record(&model_row, &[(PROP_NAME, &left.model.name)], &[]),
    );

    // Fresh catalog, sorted names, ids independent of the live schema.
    let mut specs = Vec::new();
    for entity_name in left.model.sorted_entity_names() {
        let entity = left
            .model
            .find_entity(entity_name)
            .expect("sorted entity names come from the model");
        let entity_row = alloc.next(EqualDiffTable::Entity.name());
        out.push_record(
            EqualDiffTable::Entity.name(),
            record(
                &entity_row,
                &[(PROP_NAME, &entity.name)],
                &[(REL_MODEL, &model_row)],
            ),
        );

        let mut columns = Vec::new();
        for column in entity.columns() {
            let property_row = alloc.next(EqualDiffTable::Property.name());
            out.push_record(
                EqualDiffTable::Property.name(),
                record(
                    &property_row,
                    &[(PROP_NAME, &column.name)],
                    &[(REL_ENTITY, &entity_row)],
                ),
            );
            columns.push(ColumnBinding {
                id: property_row,
                source: column.source,
            });
        }

        specs.push(GroupSpec {
            id: entity_row,
            entity: entity.name.clone(),
            columns,
        });
    }

    let diff_row = alloc.next(EqualDiffTable::Diff.name());
    out.push_record(
        EqualDiffTable::Diff.name(),
        record(
            &diff_row,
            &[(PROP_DIFF_MODEL_VERSION, DIFF_MODEL_VERSION)],
            &[(REL_MODEL, &model_row)],
        ),
    );

    let left_side = emit_side(&mut out, left, Side::Left, &specs, REL_ENTITY, REL_PROPERTY, &mut alloc);
    let right_side = emit_side(
        &mut out,
        right,
        Side::Right,
        &specs,
        REL_ENTITY,
        REL_PROPERTY,
        &mut alloc,
    );

    let differences = Differences::compute(&left_side.data, &right_side.data);
    emit_differences(&mut out, &mut alloc, &differences, &left_side, &right_side);

    let has_differences =
        !differences.is_empty() || left_side.data.row_set != right_side.data.row_set;

    // Refuse to emit a diff workspace the validator rejects.
    let diag = validate(&out);
    if diag.has_errors() {
        return Err(DiffError::Validation(diag));
    }

    log::debug!(
        "built equal-model diff: {} group(s), differences: {has_differences}",
        specs.len()
    );

    Ok(EqualDiff {
        workspace: out,
        has_differences,
    })
}

/// Parse a diff workspace back into its computation, cross-checking the
/// stored NotIn tables against an independent recomputation.
pub fn parse(ws: &Workspace) -> Result<EqualDiffData, DiffError> {
    verify_template(ws, template::equal_diff())?;

    let model_row = exactly_one(ws, EqualDiffTable::Model.name())?;
    let model_name = require_value(model_row, EqualDiffTable::Model.name(), PROP_NAME)?.to_string();

    let diff_row = exactly_one(ws, EqualDiffTable::Diff.name())?;
    let version = require_value(diff_row, EqualDiffTable::Diff.name(), PROP_DIFF_MODEL_VERSION)?;
    if version != DIFF_MODEL_VERSION {
        return Err(DiffError::shape(format!(
            "unsupported DiffModelVersion '{version}' (expected '{DIFF_MODEL_VERSION}')"
        )));
    }
    let diff_model_ref = require_relationship(diff_row, EqualDiffTable::Diff.name(), REL_MODEL)?;
    if diff_model_ref != model_row.id {
        return Err(DiffError::dangling(
            EqualDiffTable::Diff.name(),
            &diff_row.id,
            format!("unknown Model id '{diff_model_ref}'"),
        ));
    }

    // Rebuild the entity/property catalog from the stored rows.
    let mut entity_names: BTreeMap<String, String> = BTreeMap::new();
    for rec in ws.sorted_records(EqualDiffTable::Entity.name()) {
        let table = EqualDiffTable::Entity.name();
        let name = require_value(rec, table, PROP_NAME)?;
        let model_ref = require_relationship(rec, table, REL_MODEL)?;
        if model_ref != model_row.id {
            return Err(DiffError::dangling(
                table,
                &rec.id,
                format!("unknown Model id '{model_ref}'"),
            ));
        }
        if entity_names.insert(rec.id.clone(), name.to_string()).is_some() {
            return Err(DiffError::duplicate(format!(
                "'{table}' id '{}' declared twice",
                rec.id
            )));
        }
    }

    let mut columns_by_entity: BTreeMap<String, Vec<CatalogColumn>> = BTreeMap::new();
    let mut property_ids: BTreeSet<String> = BTreeSet::new();
    for rec in ws.sorted_records(EqualDiffTable::Property.name()) {
        let table = EqualDiffTable::Property.name();
        let name = require_value(rec, table, PROP_NAME)?;
        let entity_ref = require_relationship(rec, table, REL_ENTITY)?;
        if !entity_names.contains_key(entity_ref) {
            return Err(DiffError::dangling(
                table,
                &rec.id,
                format!("unknown Entity id '{entity_ref}'"),
            ));
        }
        if !property_ids.insert(rec.id.clone()) {
            return Err(DiffError::duplicate(format!(
                "'{table}' id '{}' declared twice",
                rec.id
            )));
        }
        columns_by_entity
            .entry(entity_ref.to_string())
            .or_default()
            .push(CatalogColumn {
                id: rec.id.clone(),
                name: name.to_string(),
            });
    }

    let mut catalog: Vec<CatalogEntity> = entity_names
        .iter()
        .map(|(id, name)| {
            let mut columns = columns_by_entity.remove(id).unwrap_or_default();
            columns.sort_by(|a, b| name_cmp(&a.name, &b.name));

            CatalogEntity {
                id: id.clone(),
                name: name.clone(),
                columns,
            }
        })
        .collect();
    catalog.sort_by(|a, b| name_cmp(&a.name, &b.name));

    let groups: BTreeSet<String> = entity_names.keys().cloned().collect();
    let left = parse_side(ws, Side::Left, REL_ENTITY, REL_PROPERTY, &groups, &property_ids)?;
    let right = parse_side(ws, Side::Right, REL_ENTITY, REL_PROPERTY, &groups, &property_ids)?;

    let stored = parse_stored_differences(ws, &left, &right)?;
    let differences = Differences::compute(&left.data, &right.data);
    verify_stored_differences(&stored, &differences)?;

    let has_differences = !differences.is_empty() || left.data.row_set != right.data.row_set;

    Ok(EqualDiffData {
        model_name,
        catalog,
        left: left.data,
        right: right.data,
        differences,
        has_differences,
    })
}

///
/// TESTS
///

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        key,
        test_support::{customer_workspace, minimal_workspace},
    };

    #[test]
    fn identical_sides_have_no_differences() {
        let left = customer_workspace(&[("1", "Ann")]);
        let diff = build(&left, &left.clone()).expect("build");

        assert!(!diff.has_differences);

        let data = parse(&diff.workspace).expect("parse");
        assert!(!data.has_differences);
        assert!(data.differences.is_empty());
        assert_eq!(data.left.row_set, data.right.row_set);
    }

    #[test]
    fn reports_row_set_differences() {
        // Left rows {1,2}, right rows {2,3}: 1 only left, 3 only right.
        let left = minimal_workspace(&["1", "2"]);
        let right = minimal_workspace(&["2", "3"]);
        let diff = build(&left, &right).expect("build");
        assert!(diff.has_differences);

        let data = parse(&diff.workspace).expect("parse");
        let entity_id = &data.catalog[0].id;

        assert_eq!(
            data.differences.left_rows_not_in_right,
            [key::row_key(entity_id, "1")].into()
        );
        assert_eq!(
            data.differences.right_rows_not_in_left,
            [key::row_key(entity_id, "3")].into()
        );
        assert!(data.differences.left_properties_not_in_right.is_empty());
        assert!(data.differences.right_properties_not_in_left.is_empty());
    }

    #[test]
    fn customer_scenario_reports_value_change_as_two_tuples() {
        let left = customer_workspace(&[("1", "Ann"), ("2", "Bo")]);
        let right = customer_workspace(&[("1", "Ann"), ("2", "Beau"), ("3", "Cy")]);
        let diff = build(&left, &right).expect("build");
        let data = parse(&diff.workspace).expect("parse");

        let entity_id = &data.catalog[0].id;
        let name_id = &data.catalog[0].columns[0].id;
        assert_eq!(data.catalog[0].name, "Customer");
        assert_eq!(data.catalog[0].columns[0].name, "Name");

        assert!(data.differences.left_rows_not_in_right.is_empty());
        assert_eq!(
            data.differences.right_rows_not_in_left,
            [key::row_key(entity_id, "3")].into()
        );
        // Customer/2 exists on both sides with different values: one tuple
        // per side. Customer/3's Name is implied by the row difference and
        // not reported.
        assert_eq!(
            data.differences.left_properties_not_in_right,
            [key::property_key(entity_id, "2", name_id, "Bo")].into()
        );
        assert_eq!(
            data.differences.right_properties_not_in_left,
            [key::property_key(entity_id, "2", name_id, "Beau")].into()
        );
    }

    #[test]
    fn parse_round_trips_the_build_sets() {
        let left = customer_workspace(&[("1", "Ann"), ("2", "Bo")]);
        let right = customer_workspace(&[("2", "Beau")]);
        let diff = build(&left, &right).expect("build");
        let data = parse(&diff.workspace).expect("parse");
        let entity_id = &data.catalog[0].id;

        let expect_rows = |ids: &[&str]| -> std::collections::BTreeSet<String> {
            ids.iter().map(|id| key::row_key(entity_id, id)).collect()
        };
        assert_eq!(data.left.row_set, expect_rows(&["1", "2"]));
        assert_eq!(data.right.row_set, expect_rows(&["2"]));
        assert_eq!(data.left.rows_by_group[entity_id], vec!["1", "2"]);
        assert_eq!(
            data.left.value_by_identity
                [&key::identity_key(entity_id, "2", &data.catalog[0].columns[0].id)],
            "Bo"
        );
    }

    #[test]
    fn parse_rejects_a_foreign_model_name() {
        let left = customer_workspace(&[("1", "Ann")]);
        let mut diff = build(&left, &left.clone()).expect("build").workspace;
        diff.model.name = "SomethingElse".to_string();

        assert!(matches!(
            parse(&diff),
            Err(DiffError::ShapeMismatch { .. })
        ));
    }

    #[test]
    fn parse_rejects_a_reshaped_template() {
        let left = customer_workspace(&[("1", "Ann")]);
        let mut diff = build(&left, &left.clone()).expect("build").workspace;
        diff.model.entities[0].plural = "Modelz".to_string();

        assert!(matches!(
            parse(&diff),
            Err(DiffError::ShapeMismatch { .. })
        ));
    }

    #[test]
    fn parse_rejects_an_unknown_diff_version() {
        let left = customer_workspace(&[("1", "Ann")]);
        let mut diff = build(&left, &left.clone()).expect("build").workspace;
        diff.instance.get_mut("Diff").expect("diff row")[0]
            .values
            .insert("DiffModelVersion".to_string(), "2.0".to_string());

        assert!(matches!(
            parse(&diff),
            Err(DiffError::ShapeMismatch { .. })
        ));
    }

    #[test]
    fn parse_rejects_a_duplicate_identity_cell() {
        let left = customer_workspace(&[("1", "Ann")]);
        let right = customer_workspace(&[("1", "Beau")]);
        let mut diff = build(&left, &right).expect("build").workspace;

        let rows = diff
            .instance
            .get_mut("LeftPropertyInstance")
            .expect("left property instances");
        let mut duplicate = rows[0].clone();
        duplicate.id = "99".to_string();
        duplicate.values.insert("Value".to_string(), "Other".to_string());
        rows.push(duplicate);

        assert!(matches!(
            parse(&diff),
            Err(DiffError::DuplicateIdentity { .. })
        ));
    }

    #[test]
    fn parse_rejects_tampered_stored_differences() {
        let left = customer_workspace(&[("1", "Ann"), ("2", "Bo")]);
        let right = customer_workspace(&[("1", "Ann")]);
        let mut diff = build(&left, &right).expect("build").workspace;

        // Drop the stored row difference; recomputation must notice.
        diff.instance
            .get_mut("LeftEntityInstanceNotInRight")
            .expect("stored differences")
            .clear();

        assert!(matches!(
            parse(&diff),
            Err(DiffError::ShapeMismatch { .. })
        ));
    }
}
