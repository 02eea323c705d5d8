//! upliance Form Schema Engine
//!
//! Core of the visual form builder: field schemas, derived-field formulas,
//! validation and fill-in sessions.
//!
//! ## Features
//! - Plain and derived fields (values computed from parent fields)
//! - Formula interpreter over parent labels (no dynamic code execution)
//! - Ordered, deterministic per-field validation including confirm-password
//! - Fill-in sessions with submit-time error snapshots
//! - Named schema persistence (in-memory or JSON file)
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────┐  save   ┌──────────────┐  start  ┌──────────────────────┐
//! │ FormBuilder  │───────►│  FormSchema  │───────►│     FormSession      │
//! │ (working     │        │ (immutable)  │        │  values ── resolver  │
//! │  field list) │        └──────┬───────┘        │    │        │        │
//! └──────────────┘               │ append/list    │    │     expr eval   │
//!                         ┌──────▼───────┐        │  submit ── validator │
//!                         │FormRepository│        └──────────────────────┘
//!                         └──────────────┘
//! ```

#![warn(clippy::all)]

pub mod builder;
pub mod clock;
pub mod config;
pub mod domain;
pub mod expr;
pub mod resolver;
pub mod session;
pub mod store;
pub mod validator;

pub use builder::FormBuilder;
pub use clock::{Clock, FixedClock, SystemClock};
pub use config::FormsConfig;
pub use domain::*;
pub use session::{FormSession, SessionPhase, SubmitOutcome};
pub use store::{FormRepository, InMemoryFormRepository, JsonFileFormRepository};

use thiserror::Error;

// =============================================================================
// Error Types
// =============================================================================

#[derive(Error, Debug)]
pub enum FormsError {
    #[error("field not found: {0}")]
    FieldNotFound(String),

    #[error("form not found: {0}")]
    FormNotFound(String),

    #[error("form name cannot be empty")]
    EmptyFormName,

    #[error("derived field is read-only: {0}")]
    DerivedFieldReadOnly(String),

    #[error("choice field needs at least one option: {0}")]
    MissingOptions(String),

    #[error("invariant violation: {0}")]
    InvariantViolation(String),

    #[error("session not initialized")]
    SessionNotInitialized,

    #[error("storage error: {0}")]
    StorageError(String),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    JsonError(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, FormsError>;
