use derive_more::Display;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;

/// Case-insensitive ordinal comparison, with a byte-order tie break.
///
/// Every sorted traversal in the engine goes through this so output is
/// byte-for-byte reproducible across runs.
#[must_use]
pub fn name_cmp(a: &str, b: &str) -> Ordering {
    let fold = |s: &str| s.to_ascii_lowercase();

    fold(a).cmp(&fold(b)).then_with(|| a.cmp(b))
}

/// Case-insensitive name equality (entity, property and alias scopes).
#[must_use]
pub fn name_eq(a: &str, b: &str) -> bool {
    a.eq_ignore_ascii_case(b)
}

///
/// DataType
///
/// Storage is stringly typed; the data type is carried for validation and
/// the contract signature only.
///

#[derive(Clone, Copy, Debug, Default, Deserialize, Display, Eq, PartialEq, Serialize)]
#[remain::sorted]
pub enum DataType {
    Bool,
    Date,
    Decimal,
    Int,
    #[default]
    Text,
}

///
/// Model
///

#[derive(Clone, Debug, Default, Deserialize, Eq, PartialEq, Serialize)]
pub struct Model {
    pub name: String,

    #[serde(default)]
    pub entities: Vec<Entity>,
}

impl Model {
    #[must_use]
    pub fn find_entity(&self, name: &str) -> Option<&Entity> {
        self.entities.iter().find(|e| name_eq(&e.name, name))
    }

    /// Entity names in the canonical (sorted) traversal order.
    #[must_use]
    pub fn sorted_entity_names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.entities.iter().map(|e| e.name.as_str()).collect();
        names.sort_by(|a, b| name_cmp(a, b));

        names
    }

    /// Fill in defaulted display and alias names after deserialization.
    pub fn normalize(&mut self) {
        for entity in &mut self.entities {
            if entity.plural.is_empty() {
                entity.plural = format!("{}s", entity.name);
            }
            for relationship in &mut entity.relationships {
                if relationship.name.is_empty() {
                    relationship.name.clone_from(&relationship.entity);
                }
                if relationship.column.is_empty() {
                    relationship.column = format!("{}Id", relationship.name);
                }
            }
        }
    }
}

///
/// Entity
///

#[derive(Clone, Debug, Default, Deserialize, Eq, PartialEq, Serialize)]
pub struct Entity {
    pub name: String,

    #[serde(default)]
    pub plural: String,

    #[serde(default)]
    pub properties: Vec<Property>,

    #[serde(default)]
    pub relationships: Vec<Relationship>,
}

impl Entity {
    #[must_use]
    pub fn find_property(&self, name: &str) -> Option<&Property> {
        self.properties.iter().find(|p| name_eq(&p.name, name))
    }

    #[must_use]
    pub fn find_relationship(&self, usage: &str) -> Option<&Relationship> {
        self.relationships.iter().find(|r| name_eq(&r.name, usage))
    }

    #[must_use]
    pub fn find_relationship_by_column(&self, column: &str) -> Option<&Relationship> {
        self.relationships.iter().find(|r| name_eq(&r.column, column))
    }

    /// Resolve a catalog column name to its storage source.
    ///
    /// Properties win over relationship columns, which win over relationship
    /// usage aliases.
    #[must_use]
    pub fn resolve_column(&self, name: &str) -> Option<ColumnSource> {
        if let Some(property) = self.find_property(name) {
            return Some(ColumnSource::Property(property.name.clone()));
        }
        if let Some(relationship) = self.find_relationship_by_column(name) {
            return Some(ColumnSource::Relationship(relationship.name.clone()));
        }
        if let Some(relationship) = self.find_relationship(name) {
            return Some(ColumnSource::Relationship(relationship.name.clone()));
        }

        None
    }

    /// All diffable columns of this entity, sorted by catalog name.
    ///
    /// One column per property and one per relationship storage alias; the
    /// implicit `Id` is identity, never a column.
    #[must_use]
    pub fn columns(&self) -> Vec<Column> {
        let mut columns: Vec<Column> = self
            .properties
            .iter()
            .map(|p| Column {
                name: p.name.clone(),
                source: ColumnSource::Property(p.name.clone()),
            })
            .chain(self.relationships.iter().map(|r| Column {
                name: r.column.clone(),
                source: ColumnSource::Relationship(r.name.clone()),
            }))
            .collect();
        columns.sort_by(|a, b| name_cmp(&a.name, &b.name));

        columns
    }
}

///
/// Property
///

#[derive(Clone, Debug, Default, Deserialize, Eq, PartialEq, Serialize)]
pub struct Property {
    pub name: String,

    #[serde(default)]
    pub data_type: DataType,

    #[serde(default)]
    pub is_nullable: bool,
}

///
/// Relationship
///
/// `entity` is the target entity name, `name` the usage alias records key
/// their foreign ids by, `column` the storage alias seen by the diff catalog.
///

#[derive(Clone, Debug, Default, Deserialize, Eq, PartialEq, Serialize)]
pub struct Relationship {
    pub entity: String,

    #[serde(default)]
    pub name: String,

    #[serde(default)]
    pub column: String,
}

///
/// Column
///
/// One diffable cell source on an entity, under its catalog name.
///

#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Column {
    pub name: String,
    pub source: ColumnSource,
}

///
/// ColumnSource
///

#[derive(Clone, Debug, Eq, PartialEq)]
pub enum ColumnSource {
    /// Value lives in `InstanceRecord::values` under the property name.
    Property(String),

    /// Value lives in `InstanceRecord::relationship_ids` under the usage alias.
    Relationship(String),
}

///
/// TESTS
///
