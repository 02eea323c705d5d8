//! Forms value objects
//!
//! The serialized shape of [`Field`] is the flat JSON record the builder
//! persists: `{id, type, label, defaultValue, validation, options, derived,
//! parentFieldIds, formula}`.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;

/// Field identifier (Value Object)
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FieldId(String);

impl FieldId {
    /// Fresh random identifier
    pub fn generate() -> Self {
        Self(uuid::Uuid::new_v4().to_string())
    }

    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for FieldId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for FieldId {
    fn from(id: &str) -> Self {
        Self(id.to_string())
    }
}

impl From<String> for FieldId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

/// Current value of every field in a session, keyed by field id
pub type ValueMap = HashMap<FieldId, FieldValue>;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum FieldType {
    #[serde(rename = "text")]
    ShortText,
    #[serde(rename = "number")]
    Number,
    #[serde(rename = "textarea")]
    LongText,
    #[serde(rename = "select")]
    Select,
    #[serde(rename = "radio")]
    Radio,
    #[serde(rename = "checkbox")]
    Checkbox,
    #[serde(rename = "date")]
    Date,
}

impl FieldType {
    /// Types the length, email and password rules apply to
    pub fn is_text_like(&self) -> bool {
        matches!(self, Self::ShortText | Self::LongText)
    }

    /// Types that pick from `options`
    pub fn is_choice(&self) -> bool {
        matches!(self, Self::Select | Self::Radio | Self::Checkbox)
    }

    /// Value of an untouched field of this type
    pub fn empty_value(&self) -> FieldValue {
        match self {
            Self::Checkbox => FieldValue::List(Vec::new()),
            _ => FieldValue::blank(),
        }
    }
}

/// A field's value: text, number, or checkbox selection
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FieldValue {
    Number(f64),
    Text(String),
    List(Vec<String>),
}

impl FieldValue {
    pub fn blank() -> Self {
        Self::Text(String::new())
    }

    pub fn text(s: impl Into<String>) -> Self {
        Self::Text(s.into())
    }

    /// Empty text or empty selection. Numbers are never empty.
    pub fn is_empty(&self) -> bool {
        match self {
            Self::Text(s) => s.is_empty(),
            Self::List(items) => items.is_empty(),
            Self::Number(_) => false,
        }
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            Self::Text(s) => Some(s),
            _ => None,
        }
    }
}

impl Default for FieldValue {
    fn default() -> Self {
        Self::blank()
    }
}

impl fmt::Display for FieldValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Number(n) if n.fract() == 0.0 && n.abs() < 1e15 => write!(f, "{}", *n as i64),
            Self::Number(n) => write!(f, "{}", n),
            Self::Text(s) => write!(f, "{}", s),
            Self::List(items) => write!(f, "{}", items.join(",")),
        }
    }
}

impl From<&str> for FieldValue {
    fn from(s: &str) -> Self {
        Self::Text(s.to_string())
    }
}

impl From<String> for FieldValue {
    fn from(s: String) -> Self {
        Self::Text(s)
    }
}

impl From<f64> for FieldValue {
    fn from(n: f64) -> Self {
        Self::Number(n)
    }
}

impl From<Vec<String>> for FieldValue {
    fn from(items: Vec<String>) -> Self {
        Self::List(items)
    }
}

/// Per-field validation configuration. All rules are optional and combine.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ValidationRules {
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    pub required: bool,
    #[serde(skip_serializing_if = "Option::is_none", deserialize_with = "lenient_length")]
    pub min_length: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none", deserialize_with = "lenient_length")]
    pub max_length: Option<usize>,
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    pub email_format: bool,
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    pub password_rule: bool,
}

impl ValidationRules {
    pub fn required() -> Self {
        Self { required: true, ..Default::default() }
    }

    pub fn email() -> Self {
        Self { email_format: true, ..Default::default() }
    }

    pub fn password() -> Self {
        Self { password_rule: true, ..Default::default() }
    }
}

/// Stored lengths come from free-form editors. Any number is accepted and
/// floored; zero, negative or non-numeric values mean "unset".
fn lenient_length<'de, D>(deserializer: D) -> Result<Option<usize>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let raw = serde_json::Value::deserialize(deserializer)?;
    Ok(raw
        .as_f64()
        .filter(|n| n.is_finite() && *n >= 1.0)
        .map(|n| n.min(usize::MAX as f64) as usize))
}

/// Formula half of a derived field
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Derivation {
    pub parent_field_ids: Vec<FieldId>,
    pub formula: String,
}

/// Plain fields take user input; derived fields are computed
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub enum FieldKind {
    #[default]
    Plain,
    Derived(Derivation),
}

/// Form field (Entity within a schema)
///
/// # Invariants
/// - A derived field's parents are plain fields (enforced by the builder)
/// - Choice fields carry at least one option (enforced by the builder)
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(from = "RawField", into = "RawField")]
pub struct Field {
    pub id: FieldId,
    pub field_type: FieldType,
    pub label: String,
    pub default_value: Option<FieldValue>,
    pub validation: ValidationRules,
    pub options: Vec<String>,
    pub kind: FieldKind,
}

impl Field {
    pub fn new(id: impl Into<FieldId>, field_type: FieldType, label: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            field_type,
            label: label.into(),
            default_value: None,
            validation: ValidationRules::default(),
            options: Vec::new(),
            kind: FieldKind::Plain,
        }
    }

    /// Derived field computing `formula` over `parents`
    pub fn derived(
        id: impl Into<FieldId>,
        field_type: FieldType,
        label: impl Into<String>,
        parents: Vec<FieldId>,
        formula: impl Into<String>,
    ) -> Self {
        Self {
            kind: FieldKind::Derived(Derivation {
                parent_field_ids: parents,
                formula: formula.into(),
            }),
            ..Self::new(id, field_type, label)
        }
    }

    pub fn with_validation(mut self, validation: ValidationRules) -> Self {
        self.validation = validation;
        self
    }

    pub fn with_default(mut self, value: impl Into<FieldValue>) -> Self {
        self.default_value = Some(value.into());
        self
    }

    pub fn with_options<S: Into<String>>(mut self, options: impl IntoIterator<Item = S>) -> Self {
        self.options = options.into_iter().map(Into::into).collect();
        self
    }

    pub fn is_derived(&self) -> bool {
        matches!(self.kind, FieldKind::Derived(_))
    }

    pub fn derivation(&self) -> Option<&Derivation> {
        match &self.kind {
            FieldKind::Derived(d) => Some(d),
            FieldKind::Plain => None,
        }
    }

    pub fn derivation_mut(&mut self) -> Option<&mut Derivation> {
        match &mut self.kind {
            FieldKind::Derived(d) => Some(d),
            FieldKind::Plain => None,
        }
    }

    /// Name the field is bound under inside formulas: the label with all
    /// whitespace removed.
    pub fn variable_name(&self) -> String {
        self.label.chars().filter(|c| !c.is_whitespace()).collect()
    }

    /// Starting value of a plain field: the default when present and
    /// non-empty, otherwise the type's empty value.
    pub fn initial_value(&self) -> FieldValue {
        match &self.default_value {
            Some(v) if !v.is_empty() => v.clone(),
            _ => self.field_type.empty_value(),
        }
    }
}

/// Wire shape of a field
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawField {
    id: FieldId,
    #[serde(rename = "type")]
    field_type: FieldType,
    #[serde(default)]
    label: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    default_value: Option<FieldValue>,
    #[serde(default)]
    validation: Option<ValidationRules>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    options: Option<Vec<String>>,
    #[serde(default)]
    derived: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    parent_field_ids: Option<Vec<FieldId>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    formula: Option<String>,
}

impl From<RawField> for Field {
    fn from(raw: RawField) -> Self {
        let kind = if raw.derived {
            FieldKind::Derived(Derivation {
                parent_field_ids: raw.parent_field_ids.unwrap_or_default(),
                formula: raw.formula.unwrap_or_default(),
            })
        } else {
            FieldKind::Plain
        };
        Self {
            id: raw.id,
            field_type: raw.field_type,
            label: raw.label,
            default_value: raw.default_value,
            validation: raw.validation.unwrap_or_default(),
            options: raw.options.unwrap_or_default(),
            kind,
        }
    }
}

impl From<Field> for RawField {
    fn from(field: Field) -> Self {
        let (derived, parent_field_ids, formula) = match field.kind {
            FieldKind::Derived(d) => (true, Some(d.parent_field_ids), Some(d.formula)),
            FieldKind::Plain => (false, None, None),
        };
        Self {
            id: field.id,
            field_type: field.field_type,
            label: field.label,
            default_value: field.default_value,
            validation: Some(field.validation),
            options: if field.options.is_empty() { None } else { Some(field.options) },
            derived,
            parent_field_ids,
            formula,
        }
    }
}
