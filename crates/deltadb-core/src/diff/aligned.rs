//! Aligned diff engine.
//!
//! Diffs two workspaces on different schemas through an alignment catalog.
//! The produced diff embeds the mapping it was computed under, so it parses
//! without access to the original catalog workspace; rows group by entity-map
//! id and property instances key by property-map id instead of the per-side
//! catalog ids the equal-model engine uses.

use crate::{
    diff::{
        ColumnBinding, Differences, GroupSpec, Side, SideData, alignment,
        alignment::{AlignmentCatalog, EntityMapEntry, PropertyMapEntry},
        emit_differences, emit_side, exactly_one, ident::IdentityAllocator, parse_side,
        parse_stored_differences, record, require_relationship, require_value,
        template::{
            self, AlignmentTable, DIFF_MODEL_VERSION, EqualDiffTable, PROP_DIFF_MODEL_VERSION,
            PROP_NAME, REL_ALIGNMENT, REL_ENTITY_MAP, REL_MODEL, REL_MODEL_LEFT,
            REL_MODEL_LEFT_ENTITY, REL_MODEL_LEFT_PROPERTY, REL_MODEL_RIGHT,
            REL_MODEL_RIGHT_ENTITY, REL_MODEL_RIGHT_PROPERTY, REL_PROPERTY_MAP,
        },
        verify_stored_differences, verify_template,
    },
    error::DiffError,
    validate::validate,
    workspace::Workspace,
};
use deltadb_schema::model::Model;
use std::collections::BTreeSet;

///
/// AlignedDiff
///

#[derive(Debug)]
pub struct AlignedDiff {
    pub workspace: Workspace,
    pub has_differences: bool,
}

///
/// AlignedDiffData
///
/// Parse output: the embedded alignment catalog plus both sides reduced to
/// canonical-key sets and the verified set differences.
///

#[derive(Debug)]
pub struct AlignedDiffData {
    pub catalog: AlignmentCatalog,
    pub left: SideData,
    pub right: SideData,
    pub differences: Differences,
    pub has_differences: bool,
}

impl AlignedDiffData {
    /// Bind the embedded mapping to a merge target, which carries the
    /// left-side schema.
    pub fn group_specs(&self, model: &Model) -> Result<Vec<GroupSpec>, DiffError> {
        side_specs(&self.catalog, model, Side::Left)
    }
}

/// Resolve one side of an alignment against a live model as diff groupings.
fn side_specs(
    catalog: &AlignmentCatalog,
    model: &Model,
    side: Side,
) -> Result<Vec<GroupSpec>, DiffError> {
    catalog
        .entity_maps
        .iter()
        .map(|entity_map| {
            let entity = model.find_entity(entity_map.entity(side)).ok_or_else(|| {
                DiffError::shape(format!(
                    "{side} model '{}' has no entity '{}'",
                    model.name,
                    entity_map.entity(side)
                ))
            })?;
            let columns = catalog
                .property_maps_for(&entity_map.id)
                .into_iter()
                .map(|property_map| {
                    let source = entity
                        .resolve_column(property_map.property(side))
                        .ok_or_else(|| {
                            DiffError::shape(format!(
                                "{side} entity '{}' has no column '{}'",
                                entity.name,
                                property_map.property(side)
                            ))
                        })?;
                    Ok(ColumnBinding {
                        id: property_map.id.clone(),
                        source,
                    })
                })
                .collect::<Result<Vec<_>, DiffError>>()?;

            Ok(GroupSpec {
                id: entity_map.id.clone(),
                entity: entity.name.clone(),
                columns,
            })
        })
        .collect()
}

/// Re-emit the parsed mapping into the diff workspace under fresh ids,
/// returning the catalog renumbered to the emitted rows.
fn embed_catalog(
    out: &mut Workspace,
    alloc: &mut IdentityAllocator,
    catalog: &AlignmentCatalog,
) -> (AlignmentCatalog, String) {
    let left_model = alloc.next(AlignmentTable::Model.name());
    out.push_record(
        AlignmentTable::Model.name(),
        record(&left_model, &[(PROP_NAME, &catalog.left_model_name)], &[]),
    );
    let right_model = alloc.next(AlignmentTable::Model.name());
    out.push_record(
        AlignmentTable::Model.name(),
        record(&right_model, &[(PROP_NAME, &catalog.right_model_name)], &[]),
    );

    let left_side = alloc.next(AlignmentTable::ModelLeft.name());
    out.push_record(
        AlignmentTable::ModelLeft.name(),
        record(&left_side, &[], &[(REL_MODEL, &left_model)]),
    );
    let right_side = alloc.next(AlignmentTable::ModelRight.name());
    out.push_record(
        AlignmentTable::ModelRight.name(),
        record(&right_side, &[], &[(REL_MODEL, &right_model)]),
    );

    let alignment_row = alloc.next(AlignmentTable::Alignment.name());
    out.push_record(
        AlignmentTable::Alignment.name(),
        record(
            &alignment_row,
            &[],
            &[(REL_MODEL_LEFT, &left_side), (REL_MODEL_RIGHT, &right_side)],
        ),
    );

    let mut entity_maps = Vec::new();
    let mut property_maps = Vec::new();
    for entity_map in &catalog.entity_maps {
        let left_entity = alloc.next(AlignmentTable::ModelLeftEntity.name());
        out.push_record(
            AlignmentTable::ModelLeftEntity.name(),
            record(
                &left_entity,
                &[(PROP_NAME, &entity_map.left_entity)],
                &[(REL_MODEL_LEFT, &left_side)],
            ),
        );
        let right_entity = alloc.next(AlignmentTable::ModelRightEntity.name());
        out.push_record(
            AlignmentTable::ModelRightEntity.name(),
            record(
                &right_entity,
                &[(PROP_NAME, &entity_map.right_entity)],
                &[(REL_MODEL_RIGHT, &right_side)],
            ),
        );
        let map_row = alloc.next(AlignmentTable::EntityMap.name());
        out.push_record(
            AlignmentTable::EntityMap.name(),
            record(
                &map_row,
                &[],
                &[
                    (REL_ALIGNMENT, &alignment_row),
                    (REL_MODEL_LEFT_ENTITY, &left_entity),
                    (REL_MODEL_RIGHT_ENTITY, &right_entity),
                ],
            ),
        );

        for property_map in catalog.property_maps_for(&entity_map.id) {
            let left_property = alloc.next(AlignmentTable::ModelLeftProperty.name());
            out.push_record(
                AlignmentTable::ModelLeftProperty.name(),
                record(
                    &left_property,
                    &[(PROP_NAME, &property_map.left_property)],
                    &[(REL_MODEL_LEFT_ENTITY, &left_entity)],
                ),
            );
            let right_property = alloc.next(AlignmentTable::ModelRightProperty.name());
            out.push_record(
                AlignmentTable::ModelRightProperty.name(),
                record(
                    &right_property,
                    &[(PROP_NAME, &property_map.right_property)],
                    &[(REL_MODEL_RIGHT_ENTITY, &right_entity)],
                ),
            );
            let property_row = alloc.next(AlignmentTable::PropertyMap.name());
            out.push_record(
                AlignmentTable::PropertyMap.name(),
                record(
                    &property_row,
                    &[],
                    &[
                        (REL_ALIGNMENT, &alignment_row),
                        (REL_MODEL_LEFT_PROPERTY, &left_property),
                        (REL_MODEL_RIGHT_PROPERTY, &right_property),
                    ],
                ),
            );
            property_maps.push(PropertyMapEntry {
                id: property_row,
                entity_map_id: map_row.clone(),
                left_property: property_map.left_property.clone(),
                right_property: property_map.right_property.clone(),
            });
        }

        entity_maps.push(EntityMapEntry {
            id: map_row,
            left_entity: entity_map.left_entity.clone(),
            right_entity: entity_map.right_entity.clone(),
        });
    }

    (
        AlignmentCatalog {
            left_model_name: catalog.left_model_name.clone(),
            right_model_name: catalog.right_model_name.clone(),
            entity_maps,
            property_maps,
        },
        alignment_row,
    )
}

/// Build an aligned diff between two workspaces on different schemas.
pub fn build(
    left: &Workspace,
    right: &Workspace,
    alignment_ws: &Workspace,
) -> Result<AlignedDiff, DiffError> {
    let catalog = alignment::parse(alignment_ws)?;
    catalog.validate_side(left, Side::Left)?;
    catalog.validate_side(right, Side::Right)?;

    let template = template::aligned_diff();
    let mut out = Workspace::new(template.model.clone());
    let mut alloc = IdentityAllocator::new();

    let (embedded, alignment_row) = embed_catalog(&mut out, &mut alloc, &catalog);

    let diff_row = alloc.next(EqualDiffTable::Diff.name());
    out.push_record(
        EqualDiffTable::Diff.name(),
        record(
            &diff_row,
            &[(PROP_DIFF_MODEL_VERSION, DIFF_MODEL_VERSION)],
            &[(REL_ALIGNMENT, &alignment_row)],
        ),
    );

    let left_specs = side_specs(&embedded, &left.model, Side::Left)?;
    let right_specs = side_specs(&embedded, &right.model, Side::Right)?;

    let left_side = emit_side(
        &mut out,
        left,
        Side::Left,
        &left_specs,
        REL_ENTITY_MAP,
        REL_PROPERTY_MAP,
        &mut alloc,
    );
    let right_side = emit_side(
        &mut out,
        right,
        Side::Right,
        &right_specs,
        REL_ENTITY_MAP,
        REL_PROPERTY_MAP,
        &mut alloc,
    );

    let differences = Differences::compute(&left_side.data, &right_side.data);
    emit_differences(&mut out, &mut alloc, &differences, &left_side, &right_side);

    let has_differences =
        !differences.is_empty() || left_side.data.row_set != right_side.data.row_set;

    let diag = validate(&out);
    if diag.has_errors() {
        return Err(DiffError::Validation(diag));
    }

    log::debug!(
        "built aligned diff: {} mapping(s), differences: {has_differences}",
        embedded.entity_maps.len()
    );

    Ok(AlignedDiff {
        workspace: out,
        has_differences,
    })
}

/// Parse an aligned diff workspace, recovering the embedded mapping and
/// cross-checking the stored NotIn tables against a recomputation.
pub fn parse(ws: &Workspace) -> Result<AlignedDiffData, DiffError> {
    verify_template(ws, template::aligned_diff())?;

    let catalog = alignment::parse_rows(ws)?;
    let alignment_row = exactly_one(ws, AlignmentTable::Alignment.name())?;

    let diff_row = exactly_one(ws, EqualDiffTable::Diff.name())?;
    let version = require_value(diff_row, EqualDiffTable::Diff.name(), PROP_DIFF_MODEL_VERSION)?;
    if version != DIFF_MODEL_VERSION {
        return Err(DiffError::shape(format!(
            "unsupported DiffModelVersion '{version}' (expected '{DIFF_MODEL_VERSION}')"
        )));
    }
    let diff_alignment = require_relationship(diff_row, EqualDiffTable::Diff.name(), REL_ALIGNMENT)?;
    if diff_alignment != alignment_row.id {
        return Err(DiffError::dangling(
            EqualDiffTable::Diff.name(),
            &diff_row.id,
            format!("unknown Alignment id '{diff_alignment}'"),
        ));
    }

    let groups: BTreeSet<String> = catalog.entity_maps.iter().map(|em| em.id.clone()).collect();
    let properties: BTreeSet<String> =
        catalog.property_maps.iter().map(|pm| pm.id.clone()).collect();

    let left = parse_side(ws, Side::Left, REL_ENTITY_MAP, REL_PROPERTY_MAP, &groups, &properties)?;
    let right = parse_side(
        ws,
        Side::Right,
        REL_ENTITY_MAP,
        REL_PROPERTY_MAP,
        &groups,
        &properties,
    )?;

    let stored = parse_stored_differences(ws, &left, &right)?;
    let differences = Differences::compute(&left.data, &right.data);
    verify_stored_differences(&stored, &differences)?;

    let has_differences = !differences.is_empty() || left.data.row_set != right.data.row_set;

    Ok(AlignedDiffData {
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
