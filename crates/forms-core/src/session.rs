//! Fill-in session
//!
//! One live instance of a form: the current value of every field and the
//! error snapshot of the last submit.
//!
//! ```text
//! Initializing ──initialize──► Ready ──submit──► Submitted(valid | invalid)
//!                                ▲                    │
//!                                └──── submit again ◄─┘
//! ```
//!
//! Value changes recompute derived fields immediately but leave the phase
//! and the stored errors alone: errors describe the last submit, not the
//! current values.

use std::sync::Arc;

use crate::clock::{Clock, SystemClock};
use crate::domain::{Field, FieldId, FieldValue, ValueMap};
use crate::expr::EvalContext;
use crate::resolver;
use crate::validator::{self, ErrorMap};
use crate::{FormsError, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionPhase {
    Initializing,
    Ready,
    Submitted { valid: bool },
}

/// Result of a submit
#[derive(Debug, Clone, PartialEq)]
pub struct SubmitOutcome {
    pub valid: bool,
    pub errors: ErrorMap,
}

impl SubmitOutcome {
    /// Number of fields with at least one message
    pub fn invalid_field_count(&self) -> usize {
        self.errors.values().filter(|e| !e.is_empty()).count()
    }
}

pub struct FormSession {
    fields: Vec<Field>,
    values: ValueMap,
    errors: ErrorMap,
    phase: SessionPhase,
    clock: Arc<dyn Clock>,
}

impl FormSession {
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self {
            fields: Vec::new(),
            values: ValueMap::new(),
            errors: ErrorMap::new(),
            phase: SessionPhase::Initializing,
            clock,
        }
    }

    /// New session over `fields`, already initialized
    pub fn start(fields: Vec<Field>, clock: Arc<dyn Clock>) -> Self {
        let mut session = Self::new(clock);
        session.initialize(fields);
        session
    }

    /// Session on the wall clock
    pub fn with_system_clock(fields: Vec<Field>) -> Self {
        Self::start(fields, Arc::new(SystemClock))
    }

    /// Plain fields take their defaults, derived fields their computed
    /// values. Clears any previous errors.
    pub fn initialize(&mut self, mut fields: Vec<Field>) {
        let dropped = resolver::drop_invalid_parents(&mut fields);
        let defaults: ValueMap = fields
            .iter()
            .filter(|f| !f.is_derived())
            .map(|f| (f.id.clone(), f.initial_value()))
            .collect();
        self.values = resolver::recompute(&fields, &defaults, &self.eval_context());
        self.fields = fields;
        self.errors.clear();
        self.phase = SessionPhase::Ready;
        tracing::debug!(fields = self.fields.len(), dropped_parents = dropped, "Session initialized");
    }

    /// Set a plain field's value and recompute every derived field
    pub fn set_value(&mut self, id: &FieldId, value: impl Into<FieldValue>) -> Result<()> {
        self.ensure_started()?;
        let field = self
            .field(id)
            .ok_or_else(|| FormsError::FieldNotFound(id.to_string()))?;
        if field.is_derived() {
            return Err(FormsError::DerivedFieldReadOnly(id.to_string()));
        }

        let mut snapshot = self.values.clone();
        snapshot.insert(id.clone(), value.into());
        self.values = resolver::recompute(&self.fields, &snapshot, &self.eval_context());
        Ok(())
    }

    /// Swap in an edited field list. Surviving plain fields keep their
    /// values, new ones start at their defaults, removed ones are dropped.
    pub fn set_fields(&mut self, mut fields: Vec<Field>) -> Result<()> {
        self.ensure_started()?;
        resolver::drop_invalid_parents(&mut fields);
        let snapshot: ValueMap = fields
            .iter()
            .filter(|f| !f.is_derived())
            .map(|f| {
                let value = self.values.get(&f.id).cloned().unwrap_or_else(|| f.initial_value());
                (f.id.clone(), value)
            })
            .collect();
        self.values = resolver::recompute(&fields, &snapshot, &self.eval_context());
        self.errors.retain(|id, _| fields.iter().any(|f| &f.id == id));
        self.fields = fields;
        Ok(())
    }

    /// Validate every field against the current values and keep the result
    pub fn submit(&mut self) -> Result<SubmitOutcome> {
        self.ensure_started()?;
        self.errors = validator::validate_all(&self.fields, &self.values);
        let valid = self.errors.values().all(Vec::is_empty);
        self.phase = SessionPhase::Submitted { valid };

        let outcome = SubmitOutcome { valid, errors: self.errors.clone() };
        tracing::debug!(valid, invalid_fields = outcome.invalid_field_count(), "Form submitted");
        Ok(outcome)
    }

    pub fn phase(&self) -> SessionPhase { self.phase }
    pub fn fields(&self) -> &[Field] { &self.fields }
    pub fn values(&self) -> &ValueMap { &self.values }
    pub fn errors(&self) -> &ErrorMap { &self.errors }

    pub fn value(&self, id: &FieldId) -> Option<&FieldValue> {
        self.values.get(id)
    }

    /// Messages from the last submit; empty before the first submit
    pub fn errors_for(&self, id: &FieldId) -> &[String] {
        self.errors.get(id).map(Vec::as_slice).unwrap_or(&[])
    }

    /// No fields: nothing to fill in or preview
    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    fn field(&self, id: &FieldId) -> Option<&Field> {
        self.fields.iter().find(|f| &f.id == id)
    }

    fn ensure_started(&self) -> Result<()> {
        match self.phase {
            SessionPhase::Initializing => Err(FormsError::SessionNotInitialized),
            _ => Ok(()),
        }
    }

    fn eval_context(&self) -> EvalContext {
        EvalContext::at(self.clock.now())
    }
}

impl std::fmt::Debug for FormSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FormSession")
            .field("phase", &self.phase)
            .field("fields", &self.fields.len())
            .field("values", &self.values)
            .field("errors", &self.errors)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::FixedClock;
    use crate::domain::{FieldType, ValidationRules};
    use crate::validator::{PASSWORDS_DO_NOT_MATCH, REQUIRED};
    use chrono::{TimeZone, Utc};

    const AGE_FORMULA: &str =
        "Math.floor((DOB ? (Date.now() - new Date(DOB).getTime()) / 3.15576e10 : 0))";

    fn clock() -> Arc<dyn Clock> {
        Arc::new(FixedClock::new(Utc.with_ymd_and_hms(2026, 10, 18, 12, 0, 0).unwrap()))
    }

    fn id(s: &str) -> FieldId {
        FieldId::from(s)
    }

    fn age_form() -> Vec<Field> {
        vec![
            Field::new("d1", FieldType::Date, "DOB"),
            Field::derived("a1", FieldType::Number, "Age", vec![id("d1")], AGE_FORMULA),
        ]
    }

    fn signup_form() -> Vec<Field> {
        vec![
            Field::new("name", FieldType::ShortText, "Name")
                .with_validation(ValidationRules::required()),
            Field::new("email", FieldType::ShortText, "Email")
                .with_validation(ValidationRules::email()),
            Field::new("pw", FieldType::ShortText, "Password")
                .with_validation(ValidationRules::password()),
            Field::new("cpw", FieldType::ShortText, "Confirm Password"),
            Field::new("tags", FieldType::Checkbox, "Interests").with_options(["Baking", "Grilling"]),
            Field::new("city", FieldType::Select, "City")
                .with_options(["Pune", "Delhi"])
                .with_default("Pune"),
        ]
    }

    #[test]
    fn test_new_session_is_initializing() {
        let mut session = FormSession::new(clock());
        assert_eq!(session.phase(), SessionPhase::Initializing);
        assert!(matches!(session.submit(), Err(FormsError::SessionNotInitialized)));
        assert!(matches!(
            session.set_value(&id("x"), "v"),
            Err(FormsError::SessionNotInitialized)
        ));
    }

    #[test]
    fn test_initialize_defaults() {
        let session = FormSession::start(signup_form(), clock());
        assert_eq!(session.phase(), SessionPhase::Ready);
        assert_eq!(session.value(&id("name")), Some(&FieldValue::blank()));
        assert_eq!(session.value(&id("tags")), Some(&FieldValue::List(vec![])));
        assert_eq!(session.value(&id("city")), Some(&FieldValue::text("Pune")));
        assert!(session.errors().is_empty());
    }

    #[test]
    fn test_initialize_computes_derived() {
        let fields = vec![
            Field::new("a", FieldType::Number, "A").with_default(2.0),
            Field::derived("b", FieldType::Number, "B", vec![id("a")], "A * 10"),
        ];
        let session = FormSession::start(fields, clock());
        assert_eq!(session.value(&id("b")), Some(&FieldValue::Number(20.0)));
    }

    #[test]
    fn test_derived_age() {
        let mut session = FormSession::start(age_form(), clock());
        assert_eq!(session.value(&id("a1")), Some(&FieldValue::Number(0.0)));

        session.set_value(&id("d1"), "2016-09-01").unwrap();
        assert_eq!(session.value(&id("a1")), Some(&FieldValue::Number(10.0)));

        session.set_value(&id("d1"), "2016-10-18").unwrap();
        let age = session.value(&id("a1")).cloned();
        assert!(
            age == Some(FieldValue::Number(10.0)) || age == Some(FieldValue::Number(9.0)),
            "boundary age {:?}",
            age
        );

        session.set_value(&id("d1"), "not a date").unwrap();
        assert_eq!(session.value(&id("a1")), Some(&FieldValue::blank()));
    }

    #[test]
    fn test_set_value_rejects_unknown_and_derived() {
        let mut session = FormSession::start(age_form(), clock());
        assert!(matches!(
            session.set_value(&id("nope"), "x"),
            Err(FormsError::FieldNotFound(_))
        ));
        assert!(matches!(
            session.set_value(&id("a1"), 5.0),
            Err(FormsError::DerivedFieldReadOnly(_))
        ));
    }

    #[test]
    fn test_submit_required() {
        let fields = vec![Field::new("t", FieldType::ShortText, "Title")
            .with_validation(ValidationRules::required())];
        let mut session = FormSession::start(fields, clock());

        let outcome = session.submit().unwrap();
        assert!(!outcome.valid);
        assert_eq!(session.errors_for(&id("t")), [REQUIRED]);
        assert_eq!(session.phase(), SessionPhase::Submitted { valid: false });

        session.set_value(&id("t"), "x").unwrap();
        let outcome = session.submit().unwrap();
        assert!(outcome.valid);
        assert!(session.errors_for(&id("t")).is_empty());
        assert_eq!(session.phase(), SessionPhase::Submitted { valid: true });
    }

    #[test]
    fn test_errors_are_submit_snapshot() {
        let fields = vec![Field::new("t", FieldType::ShortText, "Title")
            .with_validation(ValidationRules::required())];
        let mut session = FormSession::start(fields, clock());
        session.submit().unwrap();

        // Fixing the value does not clear the stored error until resubmit
        session.set_value(&id("t"), "fixed").unwrap();
        assert_eq!(session.errors_for(&id("t")), [REQUIRED]);
        assert_eq!(session.phase(), SessionPhase::Submitted { valid: false });

        session.submit().unwrap();
        assert!(session.errors_for(&id("t")).is_empty());
    }

    #[test]
    fn test_confirm_password_flow() {
        let mut session = FormSession::start(signup_form(), clock());
        session.set_value(&id("name"), "Asha").unwrap();
        session.set_value(&id("email"), "asha@example.com").unwrap();
        session.set_value(&id("pw"), "abc12345").unwrap();
        session.set_value(&id("cpw"), "xyz").unwrap();

        let outcome = session.submit().unwrap();
        assert!(!outcome.valid);
        assert_eq!(outcome.invalid_field_count(), 1);
        assert_eq!(session.errors_for(&id("cpw")), [PASSWORDS_DO_NOT_MATCH]);

        session.set_value(&id("cpw"), "abc12345").unwrap();
        let outcome = session.submit().unwrap();
        assert!(outcome.valid, "unexpected errors: {:?}", outcome.errors);
    }

    #[test]
    fn test_empty_session() {
        let mut session = FormSession::start(Vec::new(), clock());
        assert!(session.is_empty());
        let outcome = session.submit().unwrap();
        assert!(outcome.valid);
    }

    #[test]
    fn test_set_fields_keeps_surviving_values() {
        let mut session = FormSession::start(
            vec![
                Field::new("a", FieldType::Number, "A"),
                Field::new("b", FieldType::ShortText, "B"),
            ],
            clock(),
        );
        session.set_value(&id("a"), 4.0).unwrap();
        session.set_value(&id("b"), "gone").unwrap();

        session
            .set_fields(vec![
                Field::new("a", FieldType::Number, "A"),
                Field::derived("sq", FieldType::Number, "Square", vec![id("a")], "A * A"),
                Field::new("c", FieldType::ShortText, "C").with_default("fresh"),
            ])
            .unwrap();

        assert_eq!(session.value(&id("a")), Some(&FieldValue::Number(4.0)));
        assert_eq!(session.value(&id("sq")), Some(&FieldValue::Number(16.0)));
        assert_eq!(session.value(&id("c")), Some(&FieldValue::text("fresh")));
        assert_eq!(session.value(&id("b")), None);
    }

    #[test]
    fn test_reorder_keeps_values() {
        let mut session = FormSession::start(age_form(), clock());
        session.set_value(&id("d1"), "2000-01-01").unwrap();
        let before = session.values().clone();

        let mut reordered = age_form();
        reordered.reverse();
        session.set_fields(reordered).unwrap();
        assert_eq!(session.values(), &before);
    }

    fn chained_form() -> Vec<Field> {
        vec![
            Field::new("a", FieldType::Number, "A"),
            Field::derived("b", FieldType::Number, "B", vec![id("a")], "A * 2"),
            Field::derived("c", FieldType::Number, "C", vec![id("b")], "B + 1"),
        ]
    }

    #[test]
    fn test_derived_parent_is_dropped_on_initialize() {
        let mut session = FormSession::start(chained_form(), clock());
        assert!(session.fields()[2].derivation().unwrap().parent_field_ids.is_empty());

        session.set_value(&id("a"), 5.0).unwrap();
        assert_eq!(session.value(&id("b")), Some(&FieldValue::Number(10.0)));
        assert_eq!(session.value(&id("c")), Some(&FieldValue::blank()));

        let first = session.values().clone();
        session.set_value(&id("a"), 5.0).unwrap();
        assert_eq!(session.values(), &first);
    }

    #[test]
    fn test_derived_parent_is_dropped_on_set_fields() {
        let mut session = FormSession::start(age_form(), clock());
        session.set_fields(chained_form()).unwrap();
        session.set_value(&id("a"), 3.0).unwrap();
        assert_eq!(session.value(&id("b")), Some(&FieldValue::Number(6.0)));
        assert_eq!(session.value(&id("c")), Some(&FieldValue::blank()));
    }
}
