//! State accumulated across the engine phases.

use rust_decimal::Decimal;
use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet};

use salyq_shared::types::{RuleId, TaxEventId};

/// Options controlling a single engine run.
#[derive(Debug, Clone, Copy, Default)]
pub struct RunOptions {
    /// Permit a run over an empty event set.
    pub allow_empty: bool,
}

/// Record of one `map` action firing.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MappingRecord {
    /// Event the contribution came from.
    pub tax_event_id: TaxEventId,
    /// Tax year of the event.
    pub tax_year: i32,
    /// Logical field the amount was added to.
    pub logical_field: String,
    /// Contributed amount, after multiplier and rounding.
    pub amount: Decimal,
    /// Rule that fired.
    pub rule_id: RuleId,
}

/// Record of one `calc` action firing.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CalculationRecord {
    /// Logical field that was written.
    pub logical_field: String,
    /// Value written.
    pub value: Decimal,
    /// Rule that fired.
    pub rule_id: RuleId,
}

/// A non-fatal per-rule failure captured during a run.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RuleFailure {
    /// Rule that failed.
    pub rule_id: RuleId,
    /// Event being processed, when applicable.
    pub event_id: Option<TaxEventId>,
    /// Failure description.
    pub message: String,
}

/// Run counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct RunStats {
    /// Events seen by the run.
    pub events_processed: u64,
    /// Events removed by exclusion rules.
    pub events_excluded: u64,
    /// Rule-condition matches across all phases.
    pub rules_matched: u64,
    /// Mapping tuples emitted.
    pub mappings_created: u64,
}

/// The complete result of an engine run.
///
/// Given identical inputs the outcome is identical, including the order
/// of `mappings`, `calculations`, and `errors`.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct RunOutcome {
    /// Logical field code to amount.
    pub field_values: BTreeMap<String, Decimal>,
    /// Every `map` firing, in phase order.
    pub mappings: Vec<MappingRecord>,
    /// Every `calc` firing, in phase order.
    pub calculations: Vec<CalculationRecord>,
    /// Declaration flags.
    pub flags: BTreeMap<String, bool>,
    /// Events removed by exclusion rules.
    pub excluded_event_ids: BTreeSet<TaxEventId>,
    /// Non-fatal per-rule failures.
    pub errors: Vec<RuleFailure>,
    /// Run counters.
    pub stats: RunStats,
}

impl RunOutcome {
    /// Convenience read of a field value; missing fields read as zero.
    #[must_use]
    pub fn field(&self, code: &str) -> Decimal {
        self.field_values.get(code).copied().unwrap_or(Decimal::ZERO)
    }

    /// Convenience read of a flag; missing flags read as false.
    #[must_use]
    pub fn flag(&self, name: &str) -> bool {
        self.flags.get(name).copied().unwrap_or(false)
    }
}
