//! Derived-field resolution
//!
//! Derived fields may only depend on plain fields, so one pass over the
//! field list in order is enough: no derived value feeds another. Every pass
//! reads from the snapshot it was given and writes into a fresh map, so a
//! derived field never observes a half-updated state.

use crate::domain::{Derivation, Field, FieldId, FieldValue, ValueMap};
use crate::expr::{self, Bindings, EvalContext, Value};

/// Recompute every derived field from the plain values in `values`.
///
/// Plain values are copied through untouched. Calling this again on its own
/// output yields the same map.
pub fn recompute(fields: &[Field], values: &ValueMap, ctx: &EvalContext) -> ValueMap {
    let mut next = values.clone();
    for field in fields {
        if let Some(derivation) = field.derivation() {
            next.insert(field.id.clone(), compute(fields, derivation, values, ctx));
        }
    }
    next
}

/// Value of one derived field against a snapshot
pub fn compute(
    fields: &[Field],
    derivation: &Derivation,
    values: &ValueMap,
    ctx: &EvalContext,
) -> FieldValue {
    if derivation.formula.trim().is_empty() {
        return FieldValue::blank();
    }
    let bindings = parent_bindings(fields, derivation, values);
    expr::evaluate(&derivation.formula, &bindings, ctx)
}

/// Parents bound under their sanitized labels, in field order. Parents that
/// no longer exist are skipped, so references to them fail to blank.
pub fn parent_bindings(fields: &[Field], derivation: &Derivation, values: &ValueMap) -> Bindings {
    fields
        .iter()
        .filter(|f| derivation.parent_field_ids.contains(&f.id))
        .filter_map(|parent| {
            let name = parent.variable_name();
            if name.is_empty() {
                return None;
            }
            let value = values.get(&parent.id).map(Value::from).unwrap_or(Value::Blank);
            Some((name, value))
        })
        .collect()
}

/// Derived fields that list `id` as a parent
pub fn dependents<'f>(fields: &'f [Field], id: &FieldId) -> Vec<&'f Field> {
    fields
        .iter()
        .filter(|f| {
            f.derivation()
                .is_some_and(|d| d.parent_field_ids.contains(id))
        })
        .collect()
}

/// Whether `id` may be chosen as a parent of `child`: it exists, is not the
/// child itself, and is a plain field.
pub fn is_valid_parent(fields: &[Field], child: &FieldId, id: &FieldId) -> bool {
    id != child && fields.iter().any(|f| &f.id == id && !f.is_derived())
}

/// Remove every parent reference that [`is_valid_parent`] rejects.
/// Returns how many references were dropped.
pub fn drop_invalid_parents(fields: &mut [Field]) -> usize {
    let snapshot = fields.to_vec();
    let mut dropped = 0;
    for field in fields.iter_mut() {
        let child = field.id.clone();
        if let Some(derivation) = field.derivation_mut() {
            let before = derivation.parent_field_ids.len();
            derivation
                .parent_field_ids
                .retain(|p| is_valid_parent(&snapshot, &child, p));
            dropped += before - derivation.parent_field_ids.len();
        }
    }
    dropped
}
