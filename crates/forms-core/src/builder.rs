//! Form builder aggregate
//!
//! Owns the working field list while a form is being designed and enforces
//! the structural invariants at the point of mutation:
//! - derived fields only have plain parents (invalid selections are filtered)
//! - a field that is some derived field's parent cannot itself become derived
//! - choice fields always carry at least one option

use crate::config::FormsConfig;
use crate::domain::{
    Derivation, Field, FieldId, FieldKind, FieldType, FieldValue, FormSchema, ValidationRules,
};
use crate::resolver;
use crate::{FormsError, Result};

/// Divisor turning milliseconds into years (365.25 days)
const MILLIS_PER_YEAR: &str = "3.15576e+10";

#[derive(Debug, Clone)]
pub struct FormBuilder {
    name: String,
    fields: Vec<Field>,
    default_options: Vec<String>,
}

impl FormBuilder {
    pub fn new(config: &FormsConfig) -> Self {
        Self {
            name: String::new(),
            fields: Vec::new(),
            default_options: config.default_options.clone(),
        }
    }

    /// Start editing from a saved schema's field list. Parent references that
    /// break the plain-parent invariant are dropped.
    pub fn from_schema(config: &FormsConfig, schema: &FormSchema) -> Self {
        let mut builder = Self::new(config);
        builder.load(schema);
        builder
    }

    /// Replace the working state with a saved schema's name and fields
    pub fn load(&mut self, schema: &FormSchema) {
        self.name = schema.name().to_string();
        self.fields = schema.fields().to_vec();

        let dropped = resolver::drop_invalid_parents(&mut self.fields);
        tracing::debug!(
            form_id = schema.id(),
            fields = self.fields.len(),
            dropped_parents = dropped,
            "Schema loaded into builder"
        );
    }

    pub fn name(&self) -> &str { &self.name }
    pub fn fields(&self) -> &[Field] { &self.fields }

    pub fn field(&self, id: &FieldId) -> Option<&Field> {
        self.fields.iter().find(|f| &f.id == id)
    }

    pub fn set_name(&mut self, name: impl Into<String>) {
        self.name = name.into();
    }

    /// Append a fresh plain field of `field_type` and return its id
    pub fn add_field(&mut self, field_type: FieldType) -> FieldId {
        let mut field = Field::new(FieldId::generate(), field_type, "").with_default("");
        if field_type.is_choice() {
            field.options = self.default_options.clone();
        }
        let id = field.id.clone();
        self.fields.push(field);
        id
    }

    pub fn update_label(&mut self, id: &FieldId, label: impl Into<String>) -> Result<()> {
        self.field_mut(id)?.label = label.into();
        Ok(())
    }

    pub fn update_default_value(&mut self, id: &FieldId, value: Option<FieldValue>) -> Result<()> {
        self.field_mut(id)?.default_value = value;
        Ok(())
    }

    pub fn update_validation(&mut self, id: &FieldId, rules: ValidationRules) -> Result<()> {
        self.field_mut(id)?.validation = rules;
        Ok(())
    }

    pub fn update_options(&mut self, id: &FieldId, options: Vec<String>) -> Result<()> {
        let field = self.field_mut(id)?;
        if field.field_type.is_choice() && options.is_empty() {
            tracing::warn!(field_id = %id, "Refused to clear options of a choice field");
            return Err(FormsError::MissingOptions(id.to_string()));
        }
        field.options = options;
        Ok(())
    }

    /// Switch a field's type; moving into a choice type seeds options
    pub fn change_type(&mut self, id: &FieldId, field_type: FieldType) -> Result<()> {
        let defaults = self.default_options.clone();
        let field = self.field_mut(id)?;
        field.field_type = field_type;
        if field_type.is_choice() && field.options.is_empty() {
            field.options = defaults;
        }
        Ok(())
    }

    /// Toggle derived mode.
    ///
    /// Turning it on for a number field while a plain date field exists picks
    /// that date field as the parent and, when it has a label, prefills the
    /// age formula. Turning it off drops parents and formula.
    pub fn set_derived(&mut self, id: &FieldId, derived: bool) -> Result<()> {
        let field = self.field(id).ok_or_else(|| FormsError::FieldNotFound(id.to_string()))?;

        if !derived {
            self.field_mut(id)?.kind = FieldKind::Plain;
            return Ok(());
        }
        if field.is_derived() {
            return Ok(());
        }

        let dependents = resolver::dependents(&self.fields, id);
        if !dependents.is_empty() {
            tracing::warn!(field_id = %id, dependents = dependents.len(), "Refused to derive a parent field");
            return Err(FormsError::InvariantViolation(format!(
                "field {} is a parent of {} derived field(s)",
                id,
                dependents.len()
            )));
        }

        let mut derivation = Derivation::default();
        if field.field_type == FieldType::Number {
            let date_parent = self
                .fields
                .iter()
                .find(|f| f.field_type == FieldType::Date && !f.is_derived() && &f.id != id);
            if let Some(dob) = date_parent {
                derivation.parent_field_ids = vec![dob.id.clone()];
                if !dob.label.trim().is_empty() {
                    derivation.formula = age_formula(&dob.variable_name());
                }
            }
        }

        self.field_mut(id)?.kind = FieldKind::Derived(derivation);
        Ok(())
    }

    /// Assign parents, keeping only existing plain fields other than `id`.
    /// Returns the ids that were kept.
    pub fn set_parents(&mut self, id: &FieldId, parents: Vec<FieldId>) -> Result<Vec<FieldId>> {
        let mut kept: Vec<FieldId> = Vec::with_capacity(parents.len());
        for parent in parents {
            if resolver::is_valid_parent(&self.fields, id, &parent) && !kept.contains(&parent) {
                kept.push(parent);
            }
        }

        let field = self.field_mut(id)?;
        let derivation = field
            .derivation_mut()
            .ok_or_else(|| FormsError::InvariantViolation(format!("field {} is not derived", id)))?;
        derivation.parent_field_ids = kept.clone();
        Ok(kept)
    }

    pub fn set_formula(&mut self, id: &FieldId, formula: impl Into<String>) -> Result<()> {
        let field = self.field_mut(id)?;
        let derivation = field
            .derivation_mut()
            .ok_or_else(|| FormsError::InvariantViolation(format!("field {} is not derived", id)))?;
        derivation.formula = formula.into();
        Ok(())
    }

    /// Remove a field and every reference to it as a parent
    pub fn delete_field(&mut self, id: &FieldId) -> Result<()> {
        let before = self.fields.len();
        self.fields.retain(|f| &f.id != id);
        if self.fields.len() == before {
            return Err(FormsError::FieldNotFound(id.to_string()));
        }
        for field in &mut self.fields {
            if let Some(derivation) = field.derivation_mut() {
                derivation.parent_field_ids.retain(|p| p != id);
            }
        }
        Ok(())
    }

    /// Move the field at `from` to position `to`; out-of-range moves are ignored
    pub fn move_field(&mut self, from: usize, to: usize) {
        if from >= self.fields.len() || to >= self.fields.len() || from == to {
            return;
        }
        let field = self.fields.remove(from);
        self.fields.insert(to, field);
    }

    pub fn reset(&mut self) {
        self.name.clear();
        self.fields.clear();
    }

    /// Freeze the working list into a named schema
    pub fn save(&mut self, name: &str) -> Result<FormSchema> {
        let name = name.trim();
        if name.is_empty() {
            return Err(FormsError::EmptyFormName);
        }
        self.name = name.to_string();
        let schema = FormSchema::create(name, self.fields.clone());
        tracing::info!(form_id = schema.id(), form_name = name, fields = self.fields.len(), "Form saved");
        Ok(schema)
    }

    fn field_mut(&mut self, id: &FieldId) -> Result<&mut Field> {
        self.fields
            .iter_mut()
            .find(|f| &f.id == id)
            .ok_or_else(|| FormsError::FieldNotFound(id.to_string()))
    }
}

/// Age in whole years from a date-of-birth variable
pub fn age_formula(dob: &str) -> String {
    format!(
        "Math.floor(({dob} ? (Date.now() - new Date({dob}).getTime()) / {MILLIS_PER_YEAR} : 0))"
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    fn builder() -> FormBuilder {
        FormBuilder::new(&FormsConfig::default())
    }

    #[test]
    fn test_add_field_defaults() {
        let mut b = builder();
        let text = b.add_field(FieldType::ShortText);
        let select = b.add_field(FieldType::Select);

        let text = b.field(&text).unwrap();
        assert_eq!(text.label, "");
        assert!(text.options.is_empty());
        assert!(!text.is_derived());
        assert_eq!(b.field(&select).unwrap().options, vec!["Option 1", "Option 2"]);
        assert_ne!(b.fields()[0].id, b.fields()[1].id);
    }

    #[test]
    fn test_options_cannot_be_emptied_for_choice() {
        let mut b = builder();
        let radio = b.add_field(FieldType::Radio);
        let text = b.add_field(FieldType::ShortText);
        assert!(matches!(
            b.update_options(&radio, vec![]),
            Err(FormsError::MissingOptions(_))
        ));
        b.update_options(&radio, vec!["Yes".into()]).unwrap();
        b.update_options(&text, vec![]).unwrap();
    }

    #[test]
    fn test_change_type_seeds_options() {
        let mut b = builder();
        let id = b.add_field(FieldType::ShortText);
        b.change_type(&id, FieldType::Checkbox).unwrap();
        assert_eq!(b.field(&id).unwrap().options.len(), 2);
    }

    #[test]
    fn test_derived_toggle_prefills_age() {
        let mut b = builder();
        let dob = b.add_field(FieldType::Date);
        b.update_label(&dob, "Date of Birth").unwrap();
        let age = b.add_field(FieldType::Number);

        b.set_derived(&age, true).unwrap();
        let derivation = b.field(&age).unwrap().derivation().unwrap();
        assert_eq!(derivation.parent_field_ids, vec![dob.clone()]);
        assert_eq!(derivation.formula, age_formula("DateofBirth"));

        b.set_derived(&age, false).unwrap();
        assert!(!b.field(&age).unwrap().is_derived());
    }

    #[test]
    fn test_derived_toggle_unlabeled_date() {
        let mut b = builder();
        let dob = b.add_field(FieldType::Date);
        let age = b.add_field(FieldType::Number);
        b.set_derived(&age, true).unwrap();
        let derivation = b.field(&age).unwrap().derivation().unwrap();
        assert_eq!(derivation.parent_field_ids, vec![dob]);
        assert!(derivation.formula.is_empty());
    }

    #[test]
    fn test_derived_toggle_text_has_no_prefill() {
        let mut b = builder();
        b.add_field(FieldType::Date);
        let text = b.add_field(FieldType::ShortText);
        b.set_derived(&text, true).unwrap();
        assert_eq!(b.field(&text).unwrap().derivation(), Some(&Derivation::default()));
    }

    #[test]
    fn test_parent_cannot_become_derived() {
        let mut b = builder();
        let a = b.add_field(FieldType::Number);
        let c = b.add_field(FieldType::Number);
        b.set_derived(&c, true).unwrap();
        b.set_parents(&c, vec![a.clone()]).unwrap();

        assert!(matches!(
            b.set_derived(&a, true),
            Err(FormsError::InvariantViolation(_))
        ));
        assert!(!b.field(&a).unwrap().is_derived());
    }

    #[test]
    fn test_set_parents_filters_invalid() {
        let mut b = builder();
        let plain = b.add_field(FieldType::Number);
        let other_derived = b.add_field(FieldType::ShortText);
        let target = b.add_field(FieldType::ShortText);
        b.set_derived(&other_derived, true).unwrap();
        b.set_derived(&target, true).unwrap();

        let kept = b
            .set_parents(
                &target,
                vec![
                    plain.clone(),
                    other_derived,
                    target.clone(),
                    FieldId::from("ghost"),
                    plain.clone(),
                ],
            )
            .unwrap();
        assert_eq!(kept, vec![plain.clone()]);
        assert_eq!(
            b.field(&target).unwrap().derivation().unwrap().parent_field_ids,
            vec![plain]
        );
    }

    #[test]
    fn test_parents_and_formula_require_derived() {
        let mut b = builder();
        let a = b.add_field(FieldType::Number);
        assert!(b.set_parents(&a, vec![]).is_err());
        assert!(b.set_formula(&a, "1").is_err());
    }

    #[test]
    fn test_delete_field_prunes_parents() {
        let mut b = builder();
        let a = b.add_field(FieldType::Number);
        let c = b.add_field(FieldType::Number);
        b.set_derived(&c, true).unwrap();
        b.set_parents(&c, vec![a.clone()]).unwrap();

        b.delete_field(&a).unwrap();
        assert!(b.field(&c).unwrap().derivation().unwrap().parent_field_ids.is_empty());
        assert!(matches!(b.delete_field(&a), Err(FormsError::FieldNotFound(_))));
    }

    #[test]
    fn test_move_field() {
        let mut b = builder();
        let a = b.add_field(FieldType::ShortText);
        let c = b.add_field(FieldType::Number);
        let d = b.add_field(FieldType::Date);

        b.move_field(0, 2);
        let order: Vec<_> = b.fields().iter().map(|f| f.id.clone()).collect();
        assert_eq!(order, vec![c.clone(), d.clone(), a.clone()]);

        b.move_field(5, 0);
        b.move_field(0, 3);
        let order: Vec<_> = b.fields().iter().map(|f| f.id.clone()).collect();
        assert_eq!(order, vec![c, d, a]);
    }

    #[test]
    fn test_save() {
        let mut b = builder();
        b.add_field(FieldType::ShortText);
        assert!(matches!(b.save("   "), Err(FormsError::EmptyFormName)));

        let schema = b.save("  Feedback ").unwrap();
        assert_eq!(schema.name(), "Feedback");
        assert_eq!(b.name(), "Feedback");
        assert_eq!(schema.fields(), b.fields());

        let again = b.save("Feedback").unwrap();
        assert_ne!(schema.id(), again.id());
    }

    #[test]
    fn test_from_schema_drops_invalid_parents() {
        let json = r#"{
            "id": "f", "name": "Loaded", "createdAt": "2025-01-01T00:00:00Z",
            "fields": [
                {"id": "a", "type": "number", "label": "A"},
                {"id": "b", "type": "number", "label": "B", "derived": true,
                 "parentFieldIds": ["a"], "formula": "A"},
                {"id": "c", "type": "number", "label": "C", "derived": true,
                 "parentFieldIds": ["a", "b", "c"], "formula": "A + B"}
            ]
        }"#;
        let schema: FormSchema = serde_json::from_str(json).unwrap();
        let b = FormBuilder::from_schema(&FormsConfig::default(), &schema);
        assert_eq!(b.name(), "Loaded");
        let parents = &b.field(&FieldId::from("c")).unwrap().derivation().unwrap().parent_field_ids;
        assert_eq!(parents, &vec![FieldId::from("a")]);
    }

    #[test]
    fn test_reset() {
        let mut b = builder();
        b.set_name("Draft");
        b.add_field(FieldType::Date);
        b.reset();
        assert!(b.fields().is_empty());
        assert_eq!(b.name(), "");
    }
}
