//! Field validation
//!
//! Rules run in a fixed order and each failing rule appends one message:
//! required → min length → max length → email → password → confirm-password.
//! Length, email and password rules only apply to text and long-text fields.

use regex::Regex;
use std::collections::HashMap;
use std::sync::OnceLock;

use crate::domain::{Field, FieldId, FieldValue, ValueMap};

pub const REQUIRED: &str = "Required";
pub const INVALID_EMAIL: &str = "Invalid email";
pub const WEAK_PASSWORD: &str = "Password must be at least 8 characters and contain a number";
pub const PASSWORDS_DO_NOT_MATCH: &str = "Passwords do not match";

const PASSWORD_MIN_CHARS: usize = 8;

/// Field id → messages from the last validation run
pub type ErrorMap = HashMap<FieldId, Vec<String>>;

fn email_regex() -> &'static Regex {
    static EMAIL: OnceLock<Regex> = OnceLock::new();
    EMAIL.get_or_init(|| Regex::new(r"^[^@\s]+@[^@\s]+\.[^@\s]+$").expect("valid email pattern"))
}

/// Validate one field against the whole form's current values.
///
/// `value` is the field's own value (`None` when the session has none).
/// Pure: nothing in `all_values` is modified.
pub fn validate(
    field: &Field,
    value: Option<&FieldValue>,
    all_values: &ValueMap,
    all_fields: &[Field],
) -> Vec<String> {
    let mut errors = Vec::new();
    let rules = &field.validation;

    // Empty checkbox selections count as missing
    if rules.required && value.map_or(true, FieldValue::is_empty) {
        errors.push(REQUIRED.to_string());
    }

    if field.field_type.is_text_like() {
        let text = value.map(ToString::to_string).unwrap_or_default();
        let len = text.chars().count();

        // A zero bound is the builder's "unset"
        if let Some(min) = rules.min_length.filter(|n| *n > 0) {
            if len < min {
                errors.push(format!("Min length: {}", min));
            }
        }
        if let Some(max) = rules.max_length.filter(|n| *n > 0) {
            if len > max {
                errors.push(format!("Max length: {}", max));
            }
        }
        if rules.email_format && !email_regex().is_match(&text) {
            errors.push(INVALID_EMAIL.to_string());
        }
        if rules.password_rule
            && (len < PASSWORD_MIN_CHARS || !text.chars().any(|c| c.is_ascii_digit()))
        {
            errors.push(WEAK_PASSWORD.to_string());
        }
    }

    if is_confirm_password(field) {
        if let Some(password) = find_password_field(field, all_fields) {
            let blank = FieldValue::blank();
            let own = value.unwrap_or(&blank);
            let expected = all_values.get(&password.id).unwrap_or(&blank);
            if own != expected {
                errors.push(PASSWORDS_DO_NOT_MATCH.to_string());
            }
        }
    }

    errors
}

/// Validate every field in order
pub fn validate_all(fields: &[Field], values: &ValueMap) -> ErrorMap {
    fields
        .iter()
        .map(|field| {
            let errors = validate(field, values.get(&field.id), values, fields);
            (field.id.clone(), errors)
        })
        .collect()
}

fn is_confirm_password(field: &Field) -> bool {
    let label = field.label.to_lowercase();
    label.contains("confirm") && label.contains("password")
}

fn find_password_field<'f>(field: &Field, all_fields: &'f [Field]) -> Option<&'f Field> {
    all_fields
        .iter()
        .find(|f| f.id != field.id && f.label.trim().to_lowercase() == "password")
}
