//! Derived-field formula language
//!
//! A formula is a small expression over the parent fields of a derived field,
//! each bound under its label with whitespace removed:
//!
//! ```text
//! Math.floor((DOB ? (Date.now() - new Date(DOB).getTime()) / 3.15576e+10 : 0))
//! Price * Quantity
//! Score >= 50 ? "pass" : "fail"
//! daysBetween(Start, End)
//! ```
//!
//! Formulas are tokenized, parsed into an [`Expr`] tree and interpreted.
//! Nothing outside the bindings and the [`EvalContext`] is reachable. String
//! literals take single or double quotes and have no escapes. Nesting is
//! capped at [`MAX_NESTING`] levels and length at [`MAX_TOKENS`] tokens.
//!
//! Helpers: `Math.floor/ceil/round/abs/min/max`, `Date.now()`,
//! `new Date(x)`, `.getTime()`, `.length`, `floor(x)`, `today()` (days since
//! epoch), `daysBetween(a, b)` (whole days from `a` to `b`).

mod interpreter;
mod lexer;
mod parser;
mod value;

pub use parser::{BinaryOp, Expr, UnaryOp, MAX_NESTING, MAX_TOKENS};
pub use value::{parse_date, Value};

use chrono::{DateTime, Utc};
use std::collections::HashMap;

use crate::domain::FieldValue;
use interpreter::Interpreter;

/// Variable name → value
pub type Bindings = HashMap<String, Value>;

/// Everything a formula may observe besides its bindings
#[derive(Debug, Clone, Copy)]
pub struct EvalContext {
    pub now: DateTime<Utc>,
}

impl EvalContext {
    pub fn at(now: DateTime<Utc>) -> Self {
        Self { now }
    }
}

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum EvalError {
    #[error("formula is empty")]
    EmptyFormula,

    #[error("unexpected character {ch:?} at {pos}")]
    UnexpectedChar { ch: char, pos: usize },

    #[error("invalid number literal: {0}")]
    InvalidNumber(String),

    #[error("unexpected {found} at {pos}")]
    UnexpectedToken { found: String, pos: usize },

    #[error("unexpected end of formula")]
    UnexpectedEnd,

    #[error("formula nests deeper than {0} levels")]
    TooDeep(usize),

    #[error("formula has {0} tokens")]
    TooLong(usize),

    #[error("unknown name: {0}")]
    UnknownName(String),

    #[error("unknown function: {0}")]
    UnknownFunction(String),

    #[error("unknown property: {0}")]
    UnknownProperty(String),

    #[error("value is not callable")]
    NotCallable,

    #[error("{function} expects {expected} argument(s), got {found}")]
    Arity {
        function: String,
        expected: &'static str,
        found: usize,
    },

    #[error("type mismatch: {0}")]
    TypeMismatch(String),

    #[error("invalid date: {0}")]
    InvalidDate(String),

    #[error("division by zero")]
    DivisionByZero,

    #[error("result is not a finite number")]
    NonFinite,
}

/// A parsed formula, reusable across evaluations
#[derive(Debug, Clone, PartialEq)]
pub struct Formula {
    expr: Expr,
}

impl Formula {
    pub fn parse(src: &str) -> Result<Self, EvalError> {
        let tokens = lexer::tokenize(src)?;
        let expr = parser::parse(&tokens, src.len())?;
        Ok(Self { expr })
    }

    pub fn expr(&self) -> &Expr {
        &self.expr
    }

    pub fn eval(&self, bindings: &Bindings, ctx: &EvalContext) -> Result<Value, EvalError> {
        Interpreter::new(bindings, ctx).eval(&self.expr)
    }
}

/// Parse and evaluate, reporting why a formula failed
pub fn try_evaluate(
    formula: &str,
    bindings: &Bindings,
    ctx: &EvalContext,
) -> Result<FieldValue, EvalError> {
    Formula::parse(formula)?.eval(bindings, ctx)?.into_field_value()
}

/// Evaluate for display: any failure yields a blank value.
///
/// A formula is routinely incomplete while it is being typed, so failures are
/// logged at debug level and never surfaced.
pub fn evaluate(formula: &str, bindings: &Bindings, ctx: &EvalContext) -> FieldValue {
    match try_evaluate(formula, bindings, ctx) {
        Ok(value) => value,
        Err(e) => {
            tracing::debug!(error = %e, formula, "Formula evaluation failed, using blank");
            FieldValue::blank()
        }
    }
}
