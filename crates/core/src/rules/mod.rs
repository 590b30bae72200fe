//! Rule model: conditions, formulas, and actions.
//!
//! Persisted rules carry JSON `conditions` and `actions` payloads; they
//! are parsed into the tagged types here once, at catalog load, so the
//! engine never interprets raw JSON mid-run.

pub mod condition;
pub mod formula;
pub mod types;

pub use condition::Condition;
pub use formula::{detect_cycles, Formula};
pub use types::{Action, AmountSource, Rule, RuleKind};

use thiserror::Error;

/// Errors raised while parsing a persisted rule payload.
///
/// A malformed persisted rule is a structural catalog defect; it fails
/// the load rather than a single run.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum RuleParseError {
    /// The conditions payload has an unrecognized shape.
    #[error("unrecognized condition shape: {0}")]
    BadCondition(String),

    /// The formula payload has an unrecognized shape.
    #[error("unrecognized formula: {0}")]
    BadFormula(String),

    /// The actions payload has an unrecognized shape.
    #[error("unrecognized action: {0}")]
    BadAction(String),

    /// A calculation rule set contains a reference cycle.
    #[error("formula dependency cycle through {0}")]
    DependencyCycle(String),
}
