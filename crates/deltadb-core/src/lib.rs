pub mod diff;
pub mod error;
pub mod key;
pub mod store;
pub mod validate;
pub mod workspace;

#[cfg(test)]
pub(crate) mod test_support;

///
/// Prelude
///

pub mod prelude {
    pub use crate::{
        diff::{
            aligned::{AlignedDiff, AlignedDiffData},
            alignment::AlignmentCatalog,
            equal::{EqualDiff, EqualDiffData},
            merge::{MergeOptions, merge_aligned, merge_equal},
        },
        error::DiffError,
        validate::validate,
        workspace::{InstanceRecord, Workspace},
    };
    pub use deltadb_schema::prelude::*;
}
