//! Form schema aggregate
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::value_objects::{Field, FieldId};

/// A saved, named form
///
/// # Invariants
/// - Name is non-empty (checked by [`crate::FormBuilder::save`])
/// - Immutable once created; editing starts a new builder from `fields()`
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FormSchema {
    id: String,
    name: String,
    created_at: DateTime<Utc>,
    fields: Vec<Field>,
}

impl FormSchema {
    pub(crate) fn create(name: impl Into<String>, fields: Vec<Field>) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            name: name.into(),
            created_at: Utc::now(),
            fields,
        }
    }

    pub fn id(&self) -> &str { &self.id }
    pub fn name(&self) -> &str { &self.name }
    pub fn created_at(&self) -> DateTime<Utc> { self.created_at }
    pub fn fields(&self) -> &[Field] { &self.fields }

    pub fn field(&self, id: &FieldId) -> Option<&Field> {
        self.fields.iter().find(|f| &f.id == id)
    }

    pub fn is_empty(&self) -> bool { self.fields.is_empty() }
}
