//! The three sanctioned workspace models.
//!
//! Diff and alignment workspaces are ordinary workspaces whose models are
//! fixed templates embedded in the binary. Each template is parsed once and
//! cached with its contract signature; a workspace read back is trusted only
//! after its model name and signature match the template byte for byte.

use deltadb_schema::{
    model::Model,
    signature::signature,
};
use std::sync::LazyLock;

/// Value of the `DiffModelVersion` property a diff workspace must carry.
pub const DIFF_MODEL_VERSION: &str = "1.0";

// Property names shared by the templates.
pub const PROP_NAME: &str = "Name";
pub const PROP_VALUE: &str = "Value";
pub const PROP_DIFF_MODEL_VERSION: &str = "DiffModelVersion";
pub const PROP_ENTITY_IDENTIFIER: &str = "EntityInstanceIdentifier";

// Relationship usage aliases (template defaults: the target entity name).
pub const REL_MODEL: &str = "Model";
pub const REL_ENTITY: &str = "Entity";
pub const REL_PROPERTY: &str = "Property";
pub const REL_ALIGNMENT: &str = "Alignment";
pub const REL_MODEL_LEFT: &str = "ModelLeft";
pub const REL_MODEL_RIGHT: &str = "ModelRight";
pub const REL_MODEL_LEFT_ENTITY: &str = "ModelLeftEntity";
pub const REL_MODEL_RIGHT_ENTITY: &str = "ModelRightEntity";
pub const REL_MODEL_LEFT_PROPERTY: &str = "ModelLeftProperty";
pub const REL_MODEL_RIGHT_PROPERTY: &str = "ModelRightProperty";
pub const REL_ENTITY_MAP: &str = "EntityMap";
pub const REL_PROPERTY_MAP: &str = "PropertyMap";

///
/// Template
///
/// One sanctioned model with its cached contract signature.
///

#[derive(Debug)]
pub struct Template {
    pub model: Model,
    pub signature: String,
}

impl Template {
    fn parse(json: &str) -> Self {
        let mut model: Model =
            serde_json::from_str(json).expect("embedded template model is well-formed");
        model.normalize();
        let signature = signature(&model);

        Self { model, signature }
    }
}

static EQUAL_DIFF: LazyLock<Template> =
    LazyLock::new(|| Template::parse(include_str!("../../templates/equal_diff.json")));

static ALIGNED_DIFF: LazyLock<Template> =
    LazyLock::new(|| Template::parse(include_str!("../../templates/aligned_diff.json")));

static ALIGNMENT_CATALOG: LazyLock<Template> =
    LazyLock::new(|| Template::parse(include_str!("../../templates/alignment_catalog.json")));

/// The equal-model diff template (`InstanceDiff`).
#[must_use]
pub fn equal_diff() -> &'static Template {
    &EQUAL_DIFF
}

/// The aligned diff template (`InstanceDiffAligned`).
#[must_use]
pub fn aligned_diff() -> &'static Template {
    &ALIGNED_DIFF
}

/// The alignment catalog template (`InstanceAlignment`).
#[must_use]
pub fn alignment_catalog() -> &'static Template {
    &ALIGNMENT_CATALOG
}

///
/// EqualDiffTable
///
/// Closed set of row kinds in an equal-model diff workspace. Unknown kinds
/// are a compile-time error, not a runtime branch.
///

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
#[remain::sorted]
pub enum EqualDiffTable {
    Diff,
    Entity,
    LeftEntityInstance,
    LeftEntityInstanceNotInRight,
    LeftPropertyInstance,
    LeftPropertyInstanceNotInRight,
    Model,
    Property,
    RightEntityInstance,
    RightEntityInstanceNotInLeft,
    RightPropertyInstance,
    RightPropertyInstanceNotInLeft,
}

impl EqualDiffTable {
    pub const ALL: [Self; 12] = [
        Self::Diff,
        Self::Entity,
        Self::LeftEntityInstance,
        Self::LeftEntityInstanceNotInRight,
        Self::LeftPropertyInstance,
        Self::LeftPropertyInstanceNotInRight,
        Self::Model,
        Self::Property,
        Self::RightEntityInstance,
        Self::RightEntityInstanceNotInLeft,
        Self::RightPropertyInstance,
        Self::RightPropertyInstanceNotInLeft,
    ];

    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::Diff => "Diff",
            Self::Entity => "Entity",
            Self::LeftEntityInstance => "LeftEntityInstance",
            Self::LeftEntityInstanceNotInRight => "LeftEntityInstanceNotInRight",
            Self::LeftPropertyInstance => "LeftPropertyInstance",
            Self::LeftPropertyInstanceNotInRight => "LeftPropertyInstanceNotInRight",
            Self::Model => "Model",
            Self::Property => "Property",
            Self::RightEntityInstance => "RightEntityInstance",
            Self::RightEntityInstanceNotInLeft => "RightEntityInstanceNotInLeft",
            Self::RightPropertyInstance => "RightPropertyInstance",
            Self::RightPropertyInstanceNotInLeft => "RightPropertyInstanceNotInLeft",
        }
    }
}

///
/// AlignmentTable
///
/// Closed set of row kinds in an alignment catalog workspace. The aligned
/// diff template embeds all of these plus the instance tables.
///

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
#[remain::sorted]
pub enum AlignmentTable {
    Alignment,
    EntityMap,
    Model,
    ModelLeft,
    ModelLeftEntity,
    ModelLeftProperty,
    ModelRight,
    ModelRightEntity,
    ModelRightProperty,
    PropertyMap,
}

impl AlignmentTable {
    pub const ALL: [Self; 10] = [
        Self::Alignment,
        Self::EntityMap,
        Self::Model,
        Self::ModelLeft,
        Self::ModelLeftEntity,
        Self::ModelLeftProperty,
        Self::ModelRight,
        Self::ModelRightEntity,
        Self::ModelRightProperty,
        Self::PropertyMap,
    ];

    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::Alignment => "Alignment",
            Self::EntityMap => "EntityMap",
            Self::Model => "Model",
            Self::ModelLeft => "ModelLeft",
            Self::ModelLeftEntity => "ModelLeftEntity",
            Self::ModelLeftProperty => "ModelLeftProperty",
            Self::ModelRight => "ModelRight",
            Self::ModelRightEntity => "ModelRightEntity",
            Self::ModelRightProperty => "ModelRightProperty",
            Self::PropertyMap => "PropertyMap",
        }
    }
}

///
/// TESTS
///

#[cfg(test)]
mod tests {
    use super::*;
    use deltadb_schema::model::name_eq;

    // Regression constants: the engine hard-codes these shapes; any change to
    // the embedded templates is a contract break and must fail here.
    const EQUAL_DIFF_SIGNATURE: &str =
        "cad11ecbb62d7e93d3537a149da945deb79546b190b11203f5084c1b518eeb95";
    const ALIGNED_DIFF_SIGNATURE: &str =
        "533e6472003dbc1f664a3f2a35a7fe96efdd8e4557f6fd758482a3d8f2f55911";
    const ALIGNMENT_CATALOG_SIGNATURE: &str =
        "b79c2c4a6c3ff7c8acb63ae7887530077a8b44362f3bfb6d35319e2e2fbf875c";

    #[test]
    fn template_signatures_are_stable() {
        assert_eq!(equal_diff().signature, EQUAL_DIFF_SIGNATURE);
        assert_eq!(aligned_diff().signature, ALIGNED_DIFF_SIGNATURE);
        assert_eq!(alignment_catalog().signature, ALIGNMENT_CATALOG_SIGNATURE);
    }

    #[test]
    fn template_models_carry_the_expected_names() {
        assert_eq!(equal_diff().model.name, "InstanceDiff");
        assert_eq!(aligned_diff().model.name, "InstanceDiffAligned");
        assert_eq!(alignment_catalog().model.name, "InstanceAlignment");
    }

    #[test]
    fn template_models_validate_cleanly() {
        for template in [equal_diff(), aligned_diff(), alignment_catalog()] {
            let mut diag = deltadb_schema::diag::Diagnostics::new();
            deltadb_schema::validate::validate_model(&template.model, &mut diag);
            assert!(diag.is_empty(), "{}: {diag}", template.model.name);
        }
    }

    #[test]
    fn table_enums_match_the_embedded_entities() {
        for table in EqualDiffTable::ALL {
            assert!(
                equal_diff().model.find_entity(table.name()).is_some(),
                "equal-diff template lacks {}",
                table.name()
            );
        }
        assert_eq!(equal_diff().model.entities.len(), EqualDiffTable::ALL.len());

        for table in AlignmentTable::ALL {
            assert!(
                alignment_catalog().model.find_entity(table.name()).is_some(),
                "alignment template lacks {}",
                table.name()
            );
            assert!(
                aligned_diff().model.find_entity(table.name()).is_some(),
                "aligned-diff template lacks {}",
                table.name()
            );
        }
        assert_eq!(
            alignment_catalog().model.entities.len(),
            AlignmentTable::ALL.len()
        );

        // The aligned template embeds the alignment tables plus Diff and the
        // eight instance tables.
        let aligned_only = aligned_diff()
            .model
            .entities
            .iter()
            .filter(|e| {
                !AlignmentTable::ALL
                    .iter()
                    .any(|t| name_eq(t.name(), &e.name))
            })
            .count();
        assert_eq!(aligned_only, 9);
    }
}
