//! Forms domain model
//!
//! - **Value Objects**: FieldId, FieldType, FieldValue, ValidationRules, Field
//! - **Aggregates**: FormSchema (immutable once saved)

pub mod aggregates;
pub mod value_objects;

pub use aggregates::*;
pub use value_objects::*;
