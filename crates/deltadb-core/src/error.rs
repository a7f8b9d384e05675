use crate::{key::KeyError, store::StoreError};
use deltadb_schema::diag::Diagnostics;
use derive_more::Display;
use thiserror::Error as ThisError;

///
/// MergePhase
///
/// Which exact-match snapshot check a merge conflict was raised by.
///

#[derive(Clone, Copy, Debug, Display, Eq, PartialEq)]
pub enum MergePhase {
    #[display("precondition")]
    Precondition,

    #[display("postcondition")]
    Postcondition,
}

///
/// DiffError
///
/// Closed failure taxonomy for the diff/alignment/merge engine. Data and
/// shape errors are fatal and never retried; `Conflict` is fatal to the
/// merge but expected at the workflow level (the caller re-diffs);
/// `Validation` always follows an in-memory rollback.
///

#[derive(Debug, ThisError)]
#[remain::sorted]
pub enum DiffError {
    #[error("merge conflict at {phase}: {detail}")]
    Conflict { phase: MergePhase, detail: String },

    #[error("dangling reference in '{entity}' row '{row}': {detail}")]
    DanglingReference {
        entity: String,
        row: String,
        detail: String,
    },

    #[error("duplicate identity: {detail}")]
    DuplicateIdentity { detail: String },

    #[error("canonical key error: {0}")]
    Key(#[from] KeyError),

    #[error("workspace shape mismatch: {detail}")]
    ShapeMismatch { detail: String },

    #[error("workspace store error: {0}")]
    Store(#[from] StoreError),

    #[error("validation failed:\n{0}")]
    Validation(Diagnostics),
}

impl DiffError {
    /// Construct a malformed-workspace shape error.
    pub fn shape(detail: impl Into<String>) -> Self {
        Self::ShapeMismatch {
            detail: detail.into(),
        }
    }

    /// Construct a dangling-foreign-key error for one row.
    pub fn dangling(
        entity: impl Into<String>,
        row: impl Into<String>,
        detail: impl Into<String>,
    ) -> Self {
        Self::DanglingReference {
            entity: entity.into(),
            row: row.into(),
            detail: detail.into(),
        }
    }

    /// Construct a duplicate-identity error (cell or bijection side).
    pub fn duplicate(detail: impl Into<String>) -> Self {
        Self::DuplicateIdentity {
            detail: detail.into(),
        }
    }

    /// Construct a merge conflict for the given phase.
    pub fn conflict(phase: MergePhase, detail: impl Into<String>) -> Self {
        Self::Conflict {
            phase,
            detail: detail.into(),
        }
    }

    /// True for pre/postcondition conflicts, the recoverable-by-rediff class.
    #[must_use]
    pub const fn is_conflict(&self) -> bool {
        matches!(self, Self::Conflict { .. })
    }
}
