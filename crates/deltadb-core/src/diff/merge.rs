//! Merge executor.
//!
//! Replays a parsed diff onto a target workspace under an exact-match
//! protocol: the target must equal the diff's left side before apply and
//! must equal the right side after. Any validation or postcondition failure
//! rolls the target back to its pre-merge snapshot in memory; persistence is
//! the caller's decision.

use crate::{
    diff::{GroupSpec, Side, SideData, aligned, equal},
    error::{DiffError, MergePhase},
    key,
    validate::validate,
    workspace::{InstanceRecord, Workspace},
};
use deltadb_schema::model::name_eq;
use std::collections::{BTreeMap, BTreeSet};

///
/// MergeOptions
///

#[derive(Clone, Copy, Debug, Default)]
pub struct MergeOptions {
    /// Treat validation warnings as errors.
    pub strict: bool,
}

/// Replay an equal-model diff onto a target workspace.
pub fn merge_equal(
    target: &mut Workspace,
    diff: &Workspace,
    options: MergeOptions,
) -> Result<(), DiffError> {
    let data = equal::parse(diff)?;
    if !name_eq(&target.model.name, &data.model_name) {
        return Err(DiffError::shape(format!(
            "target model '{}' does not match diff model '{}'",
            target.model.name, data.model_name
        )));
    }
    let specs = data.group_specs(&target.model)?;

    run(target, &specs, &data.left, &data.right, options)
}

/// Replay an aligned diff onto a target workspace carrying the left-side
/// schema.
pub fn merge_aligned(
    target: &mut Workspace,
    diff: &Workspace,
    options: MergeOptions,
) -> Result<(), DiffError> {
    let data = aligned::parse(diff)?;
    data.catalog.validate_side(target, Side::Left)?;
    let specs = data.group_specs(&target.model)?;

    run(target, &specs, &data.left, &data.right, options)
}

fn run(
    target: &mut Workspace,
    specs: &[GroupSpec],
    left: &SideData,
    right: &SideData,
    options: MergeOptions,
) -> Result<(), DiffError> {
    let (rows, properties) = snapshot_sets(target, specs);
    if rows != left.row_set || properties != left.property_set {
        return Err(DiffError::conflict(
            MergePhase::Precondition,
            describe_mismatch(&rows, &left.row_set, &properties, &left.property_set),
        ));
    }
    log::debug!("merge precondition holds over {} group(s)", specs.len());

    let snapshot = target.snapshot();
    apply(target, specs, right);

    let diag = validate(target);
    if diag.has_errors() || (options.strict && diag.warning_count() > 0) {
        target.restore(snapshot);
        return Err(DiffError::Validation(diag));
    }

    let (rows, properties) = snapshot_sets(target, specs);
    if rows != right.row_set || properties != right.property_set {
        let detail =
            describe_mismatch(&rows, &right.row_set, &properties, &right.property_set);
        target.restore(snapshot);
        return Err(DiffError::conflict(MergePhase::Postcondition, detail));
    }

    log::info!("merge applied over {} group(s)", specs.len());

    Ok(())
}

/// Rebuild every grouped entity's rows from the diff's right side. Rows keep
/// their unmapped cells when they already exist on the target; cells the
/// right side does not carry are cleared.
fn apply(target: &mut Workspace, specs: &[GroupSpec], right: &SideData) {
    for spec in specs {
        let existing: BTreeMap<String, InstanceRecord> = target
            .records(&spec.entity)
            .iter()
            .map(|rec| (rec.id.clone(), rec.clone()))
            .collect();

        let idents = right
            .rows_by_group
            .get(&spec.id)
            .map_or(&[] as &[String], Vec::as_slice);

        let rows = idents
            .iter()
            .map(|ident| {
                let mut rec = existing
                    .get(ident)
                    .cloned()
                    .unwrap_or_else(|| InstanceRecord::new(ident.clone()));
                for column in &spec.columns {
                    let identity = key::identity_key(&spec.id, ident, &column.id);
                    match right.value_by_identity.get(&identity) {
                        Some(value) => rec.set_cell(&column.source, value.clone()),
                        None => rec.clear_cell(&column.source),
                    }
                }

                rec
            })
            .collect();

        target.replace_records(&spec.entity, rows);
    }
}

/// Reduce the target's grouped entities to canonical-key sets for the
/// exact-match checks.
fn snapshot_sets(
    target: &Workspace,
    specs: &[GroupSpec],
) -> (BTreeSet<String>, BTreeSet<String>) {
    let mut rows = BTreeSet::new();
    let mut properties = BTreeSet::new();

    for spec in specs {
        for rec in target.sorted_records(&spec.entity) {
            rows.insert(key::row_key(&spec.id, &rec.id));
            for column in &spec.columns {
                let Some(value) = rec.cell(&column.source) else {
                    continue;
                };
                if value.is_empty() {
                    continue;
                }
                properties.insert(key::property_key(&spec.id, &rec.id, &column.id, value));
            }
        }
    }

    (rows, properties)
}

fn describe_mismatch(
    rows: &BTreeSet<String>,
    expected_rows: &BTreeSet<String>,
    properties: &BTreeSet<String>,
    expected_properties: &BTreeSet<String>,
) -> String {
    format!(
        "target does not match the diff ({} unexpected row(s), {} missing row(s), {} unexpected value(s), {} missing value(s))",
        rows.difference(expected_rows).count(),
        expected_rows.difference(rows).count(),
        properties.difference(expected_properties).count(),
        expected_properties.difference(properties).count(),
    )
}

///
/// TESTS
///

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{
        client_workspace, customer_record, customer_workspace, rename_alignment,
    };

    #[test]
    fn merge_applies_adds_removes_and_changes() {
        let left = customer_workspace(&[("1", "Ann"), ("2", "Bo")]);
        let right = customer_workspace(&[("2", "Beau"), ("3", "Cy")]);
        let diff = equal::build(&left, &right).expect("build").workspace;

        let mut target = left.clone();
        merge_equal(&mut target, &diff, MergeOptions::default()).expect("merge");

        assert!(target.find_record("Customer", "1").is_none());
        assert_eq!(
            target.find_record("Customer", "2").and_then(|r| r.value("Name")),
            Some("Beau")
        );
        assert_eq!(
            target.find_record("Customer", "3").and_then(|r| r.value("Name")),
            Some("Cy")
        );
    }

    #[test]
    fn merge_replays_onto_an_equivalent_third_workspace() {
        let left = customer_workspace(&[("1", "Ann")]);
        let right = customer_workspace(&[("1", "Annette")]);
        let diff = equal::build(&left, &right).expect("build").workspace;

        // Same content, independently constructed.
        let mut target = customer_workspace(&[("1", "Ann")]);
        merge_equal(&mut target, &diff, MergeOptions::default()).expect("merge");

        assert_eq!(
            target.find_record("Customer", "1").and_then(|r| r.value("Name")),
            Some("Annette")
        );
    }

    #[test]
    fn merging_twice_raises_a_precondition_conflict() {
        let left = customer_workspace(&[("1", "Ann")]);
        let right = customer_workspace(&[("1", "Beau")]);
        let diff = equal::build(&left, &right).expect("build").workspace;

        let mut target = left.clone();
        merge_equal(&mut target, &diff, MergeOptions::default()).expect("first merge");

        let err = merge_equal(&mut target, &diff, MergeOptions::default())
            .expect_err("second merge must conflict");
        assert!(matches!(
            err,
            DiffError::Conflict {
                phase: MergePhase::Precondition,
                ..
            }
        ));
        // The conflicting merge must not touch the target.
        assert_eq!(
            target.find_record("Customer", "1").and_then(|r| r.value("Name")),
            Some("Beau")
        );
    }

    #[test]
    fn a_drifted_target_conflicts_without_mutation() {
        let left = customer_workspace(&[("1", "Ann")]);
        let right = customer_workspace(&[("1", "Beau")]);
        let diff = equal::build(&left, &right).expect("build").workspace;

        let mut target = left.clone();
        target.push_record("Customer", customer_record("9", "Drift"));
        let before = target.clone();

        let err = merge_equal(&mut target, &diff, MergeOptions::default())
            .expect_err("drifted target must conflict");
        assert!(err.is_conflict());
        assert_eq!(target, before);
    }

    #[test]
    fn validation_failure_rolls_the_target_back() {
        let left = customer_workspace(&[("1", "Ann")]);
        // Empty Name never emits a property instance, so the merge clears the
        // required value and validation must reject the applied state.
        let right = customer_workspace(&[("1", "")]);
        let diff = equal::build(&left, &right).expect("build").workspace;

        let mut target = left.clone();
        let err = merge_equal(&mut target, &diff, MergeOptions::default())
            .expect_err("merge must fail validation");
        assert!(matches!(err, DiffError::Validation(_)));
        assert_eq!(
            target.find_record("Customer", "1").and_then(|r| r.value("Name")),
            Some("Ann")
        );
    }

    #[test]
    fn strict_mode_rolls_back_on_warnings() {
        let left = customer_workspace(&[("1", "Ann")]);
        let right = customer_workspace(&[("1", "Beau")]);
        let diff = equal::build(&left, &right).expect("build").workspace;

        let mut target = left.clone();
        target.push_record("Ghost", InstanceRecord::new("1"));

        let strict = MergeOptions { strict: true };
        let err = merge_equal(&mut target, &diff, strict).expect_err("strict must reject");
        assert!(matches!(err, DiffError::Validation(_)));
        assert_eq!(
            target.find_record("Customer", "1").and_then(|r| r.value("Name")),
            Some("Ann")
        );

        // The same warning passes without strict mode.
        merge_equal(&mut target, &diff, MergeOptions::default()).expect("lenient merge");
    }

    #[test]
    fn aligned_merge_translates_through_the_mapping() {
        let left = customer_workspace(&[("1", "Ann"), ("2", "Bo")]);
        let right = client_workspace(&[("2", "Beau"), ("3", "Cy")]);
        let diff = aligned::build(&left, &right, &rename_alignment())
            .expect("build")
            .workspace;

        let mut target = left.clone();
        merge_aligned(&mut target, &diff, MergeOptions::default()).expect("merge");

        assert!(target.find_record("Customer", "1").is_none());
        assert_eq!(
            target.find_record("Customer", "2").and_then(|r| r.value("Name")),
            Some("Beau")
        );
        assert_eq!(
            target.find_record("Customer", "3").and_then(|r| r.value("Name")),
            Some("Cy")
        );
    }

    #[test]
    fn aligned_merge_rejects_a_right_side_target() {
        let left = customer_workspace(&[("1", "Ann")]);
        let right = client_workspace(&[("1", "Beau")]);
        let diff = aligned::build(&left, &right, &rename_alignment())
            .expect("build")
            .workspace;

        let mut target = right.clone();
        assert!(matches!(
            merge_aligned(&mut target, &diff, MergeOptions::default()),
            Err(DiffError::ShapeMismatch { .. })
        ));
    }
}
