pub mod diag;
pub mod model;
pub mod signature;
pub mod validate;

///
/// Prelude
///

pub mod prelude {
    pub use crate::{
        diag::{Diagnostics, Issue, Severity},
        model::{DataType, Entity, Model, Property, Relationship},
        signature::signature,
    };
    pub use serde::{Deserialize, Serialize};
}
