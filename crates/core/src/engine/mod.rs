//! The rule engine: a deterministic seven-phase interpreter folding tax
//! events and a versioned rule set into the declaration field map and
//! flag set.

pub mod context;
pub mod runner;

pub use context::{
    CalculationRecord, MappingRecord, RuleFailure, RunOptions, RunOutcome, RunStats,
};
pub use runner::{EngineError, RuleEngine};
