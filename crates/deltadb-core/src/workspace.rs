use deltadb_schema::model::{ColumnSource, Model, name_cmp, name_eq};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

///
/// Workspace
///
/// A schema plus its instance data: per entity name, an ordered list of
/// records. The unit every engine operation loads, diffs, merges and saves.
///

#[derive(Clone, Debug, Default, Deserialize, Eq, PartialEq, Serialize)]
pub struct Workspace {
    pub model: Model,

    #[serde(default)]
    pub instance: BTreeMap<String, Vec<InstanceRecord>>,
}

impl Workspace {
    #[must_use]
    pub fn new(model: Model) -> Self {
        Self {
            model,
            instance: BTreeMap::new(),
        }
    }

    /// Records of one entity, case-insensitive on the entity name.
    #[must_use]
    pub fn records(&self, entity: &str) -> &[InstanceRecord] {
        self.instance
            .iter()
            .find(|(name, _)| name_eq(name, entity))
            .map_or(&[], |(_, records)| records.as_slice())
    }

    /// Records of one entity in canonical id order.
    #[must_use]
    pub fn sorted_records(&self, entity: &str) -> Vec<&InstanceRecord> {
        let mut records: Vec<&InstanceRecord> = self.records(entity).iter().collect();
        records.sort_by(|a, b| name_cmp(&a.id, &b.id));

        records
    }

    /// Find one record by entity name and id.
    #[must_use]
    pub fn find_record(&self, entity: &str, id: &str) -> Option<&InstanceRecord> {
        self.records(entity).iter().find(|r| r.id == id)
    }

    /// Append a record to an entity's row list, creating the list on first
    /// use and reusing a case-variant key when one already exists.
    pub fn push_record(&mut self, entity: &str, record: InstanceRecord) {
        let key = self
            .instance
            .keys()
            .find(|name| name_eq(name, entity))
            .cloned()
            .unwrap_or_else(|| entity.to_string());
        self.instance.entry(key).or_default().push(record);
    }

    /// Replace an entity's row list wholesale, reusing a case-variant key
    /// when one already exists.
    pub fn replace_records(&mut self, entity: &str, records: Vec<InstanceRecord>) {
        let key = self
            .instance
            .keys()
            .find(|name| name_eq(name, entity))
            .cloned()
            .unwrap_or_else(|| entity.to_string());
        self.instance.insert(key, records);
    }

    /// Capture a deep copy of the instance data for rollback.
    #[must_use]
    pub fn snapshot(&self) -> Snapshot {
        Snapshot {
            instance: self.instance.clone(),
        }
    }

    /// Swap a captured snapshot back wholesale.
    pub fn restore(&mut self, snapshot: Snapshot) {
        self.instance = snapshot.instance;
    }
}

///
/// Snapshot
///
/// Deep-cloned instance state captured before a merge mutates the target.
/// Restored on any validation or postcondition failure; discarded on commit.
///

#[derive(Clone, Debug)]
pub struct Snapshot {
    instance: BTreeMap<String, Vec<InstanceRecord>>,
}

///
/// InstanceRecord
///
/// One row: a positive-integer id encoded as a string, plain property values,
/// and relationship target ids keyed by usage alias.
///

#[derive(Clone, Debug, Default, Deserialize, Eq, PartialEq, Serialize)]
pub struct InstanceRecord {
    pub id: String,

    #[serde(default)]
    pub values: BTreeMap<String, String>,

    #[serde(default)]
    pub relationship_ids: BTreeMap<String, String>,
}

impl InstanceRecord {
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            ..Self::default()
        }
    }

    #[must_use]
    pub fn value(&self, property: &str) -> Option<&str> {
        self.values
            .iter()
            .find(|(name, _)| name_eq(name, property))
            .map(|(_, value)| value.as_str())
    }

    #[must_use]
    pub fn relationship_id(&self, usage: &str) -> Option<&str> {
        self.relationship_ids
            .iter()
            .find(|(name, _)| name_eq(name, usage))
            .map(|(_, value)| value.as_str())
    }

    /// Read the cell a resolved column points at.
    #[must_use]
    pub fn cell(&self, source: &ColumnSource) -> Option<&str> {
        match source {
            ColumnSource::Property(name) => self.value(name),
            ColumnSource::Relationship(usage) => self.relationship_id(usage),
        }
    }

    /// Write the cell a resolved column points at, replacing any
    /// case-variant key already present.
    pub fn set_cell(&mut self, source: &ColumnSource, value: impl Into<String>) {
        match source {
            ColumnSource::Property(name) => {
                self.values.retain(|k, _| !name_eq(k, name));
                self.values.insert(name.clone(), value.into());
            }
            ColumnSource::Relationship(usage) => {
                self.relationship_ids.retain(|k, _| !name_eq(k, usage));
                self.relationship_ids.insert(usage.clone(), value.into());
            }
        }
    }

    /// Remove the cell a resolved column points at, if present.
    pub fn clear_cell(&mut self, source: &ColumnSource) {
        match source {
            ColumnSource::Property(name) => self.values.retain(|k, _| !name_eq(k, name)),
            ColumnSource::Relationship(usage) => {
                self.relationship_ids.retain(|k, _| !name_eq(k, usage));
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

    #[test]
    fn sorted_records_use_canonical_id_order() {
        let mut workspace = Workspace::default();
        for id in ["2", "10", "1"] {
            workspace.push_record("Customer", InstanceRecord::new(id));
        }
        let ids: Vec<&str> = workspace
            .sorted_records("Customer")
            .iter()
            .map(|r| r.id.as_str())
            .collect();

        // Ordinal string order, not numeric.
        assert_eq!(ids, vec!["1", "10", "2"]);
    }

    #[test]
    fn push_record_reuses_a_case_variant_entity_key() {
        let mut workspace = Workspace::default();
        workspace.push_record("Customer", InstanceRecord::new("1"));
        workspace.push_record("customer", InstanceRecord::new("2"));

        assert_eq!(workspace.instance.len(), 1);
        assert_eq!(workspace.records("CUSTOMER").len(), 2);
    }

    #[test]
    fn snapshot_restore_round_trips_instance_state() {
        let mut workspace = Workspace::default();
        workspace.push_record("Customer", InstanceRecord::new("1"));
        let snapshot = workspace.snapshot();

        workspace.instance.clear();
        assert!(workspace.records("Customer").is_empty());

        workspace.restore(snapshot);
        assert_eq!(workspace.records("Customer").len(), 1);
    }

    #[test]
    fn set_cell_replaces_case_variant_keys() {
        let mut record = InstanceRecord::new("1");
        record
            .values
            .insert("name".to_string(), "Ann".to_string());
        record.set_cell(
            &ColumnSource::Property("Name".to_string()),
            "Beau".to_string(),
        );

        assert_eq!(record.values.len(), 1);
        assert_eq!(record.value("NAME"), Some("Beau"));
    }
}
