//! The seven-phase rule engine runner.
//!
//! Phases run strictly in order over snapshots of their inputs:
//!
//! 1. Exclusion — first matching exclusion rule removes the event.
//! 2. Mapping — matching mapping rules add amounts to logical fields.
//! 3. Base totals — closed subtotal set, filled only where rules left
//!    gaps.
//! 4. Calculation rules — formulas overwrite fields in priority order.
//! 5. Derived totals — taxable income, IPN, payable.
//! 6. Conditional flag rules — evaluated against the field map.
//! 7. Auto-flags — presentation flags derived from totals.
//!
//! Per-rule failures are recorded and skipped; only structural defects
//! (unknown event type, empty input without `allow_empty`) fail the run.

use rust_decimal::{Decimal, RoundingStrategy};
use std::collections::{BTreeMap, BTreeSet};
use thiserror::Error;
use tracing::debug;

use crate::events::TaxEvent;
use crate::fields::{self, flags};
use crate::rules::{Action, AmountSource, Rule, RuleKind};

use super::context::{
    CalculationRecord, MappingRecord, RuleFailure, RunOptions, RunOutcome, RunStats,
};

/// The personal income tax rate.
const IPN_RATE: Decimal = Decimal::from_parts(10, 0, 0, false, 2); // 0.10

/// Structural failures that abort a run.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum EngineError {
    /// The event set is empty and the caller did not allow it.
    #[error("no tax events to process")]
    EmptyEventSet,

    /// An event references a type code missing from the catalog.
    #[error("unknown event type: {0}")]
    UnknownEventType(String),
}

/// Deterministic interpreter over events and rules.
pub struct RuleEngine;

impl RuleEngine {
    /// Runs the engine for one taxpayer-year.
    ///
    /// `events` is the year's event snapshot, `rules` the active rule
    /// set ordered by (priority, creation), and `event_types` the
    /// catalog vocabulary.
    ///
    /// # Errors
    ///
    /// Returns an error on an empty event set without
    /// [`RunOptions::allow_empty`], or when an event carries a type code
    /// outside the vocabulary.
    pub fn run(
        tax_year: i32,
        events: &[TaxEvent],
        rules: &[Rule],
        event_types: &BTreeSet<String>,
        options: &RunOptions,
    ) -> Result<RunOutcome, EngineError> {
        if events.is_empty() && !options.allow_empty {
            return Err(EngineError::EmptyEventSet);
        }
        for event in events {
            if !event_types.contains(&event.event_type) {
                return Err(EngineError::UnknownEventType(event.event_type.clone()));
            }
        }

        // Event order is date-first; v7 ids preserve insertion order
        // within a date.
        let mut events: Vec<&TaxEvent> = events.iter().collect();
        events.sort_by_key(|e| (e.event_date, e.id));

        let select = |kind: RuleKind| -> Vec<&Rule> {
            let mut selected: Vec<&Rule> = rules
                .iter()
                .filter(|r| r.kind == kind && r.applies_to_year(tax_year))
                .collect();
            selected.sort_by_key(|r| r.priority);
            selected
        };
        let exclusion_rules = select(RuleKind::Exclusion);
        let mapping_rules = select(RuleKind::Mapping);
        let calculation_rules = select(RuleKind::Calculation);
        let flag_rules = select(RuleKind::Flag);

        let mut out = RunOutcome {
            stats: RunStats {
                events_processed: events.len() as u64,
                ..RunStats::default()
            },
            ..RunOutcome::default()
        };

        Self::phase_exclusion(&events, &exclusion_rules, &mut out);
        Self::phase_mapping(&events, &mapping_rules, &mut out);
        Self::phase_base_totals(&mut out);
        Self::phase_calculations(&calculation_rules, &mut out);
        Self::phase_derived_totals(&mut out);
        Self::phase_flag_rules(&flag_rules, &mut out);
        Self::phase_auto_flags(&mut out);

        debug!(
            tax_year,
            events = out.stats.events_processed,
            excluded = out.stats.events_excluded,
            mappings = out.stats.mappings_created,
            "engine run complete"
        );
        Ok(out)
    }

    /// Phase 1: the first matching exclusion rule removes the event and
    /// stops further exclusion checks for it.
    fn phase_exclusion(events: &[&TaxEvent], rules: &[&Rule], out: &mut RunOutcome) {
        for event in events {
            for rule in rules {
                if rule.condition.matches_event(event) {
                    out.stats.rules_matched += 1;
                    out.excluded_event_ids.insert(event.id);
                    break;
                }
            }
        }
        out.stats.events_excluded = out.excluded_event_ids.len() as u64;
    }

    /// Phase 2: every matching mapping rule runs all its actions against
    /// each non-excluded event, in event order then rule order.
    fn phase_mapping(events: &[&TaxEvent], rules: &[&Rule], out: &mut RunOutcome) {
        for event in events {
            if out.excluded_event_ids.contains(&event.id) {
                continue;
            }
            for rule in rules {
                if !rule.condition.matches_event(event) {
                    continue;
                }
                out.stats.rules_matched += 1;
                for action in &rule.actions {
                    match action {
                        Action::Map {
                            target,
                            amount_source,
                            multiplier,
                            round,
                        } => {
                            let base = match amount_source {
                                AmountSource::EventAmount => event.amount,
                                AmountSource::Metadata(key) => {
                                    lookup_metadata_amount(&event.metadata, key)
                                }
                                AmountSource::Fixed(value) => Some(*value),
                            };
                            let Some(base) = base else {
                                out.errors.push(RuleFailure {
                                    rule_id: rule.id,
                                    event_id: Some(event.id),
                                    message: format!(
                                        "no amount available for {target} via {amount_source:?}"
                                    ),
                                });
                                continue;
                            };
                            let mut amount = base * multiplier.unwrap_or(Decimal::ONE);
                            if let Some(precision) = round {
                                amount = amount.round_dp_with_strategy(
                                    *precision,
                                    RoundingStrategy::MidpointAwayFromZero,
                                );
                            }
                            *out.field_values
                                .entry(target.clone())
                                .or_insert(Decimal::ZERO) += amount;
                            out.mappings.push(MappingRecord {
                                tax_event_id: event.id,
                                tax_year: event.tax_year,
                                logical_field: target.clone(),
                                amount,
                                rule_id: rule.id,
                            });
                            out.stats.mappings_created += 1;
                        }
                        Action::Flag { set } => {
                            out.flags.extend(set.iter().map(|(k, v)| (k.clone(), *v)));
                        }
                        other => out.errors.push(RuleFailure {
                            rule_id: rule.id,
                            event_id: Some(event.id),
                            message: format!("unsupported action in mapping rule: {other:?}"),
                        }),
                    }
                }
            }
        }
    }

    /// Phase 3: fills the closed subtotal set where rules left gaps, so
    /// the engine stays usable without the year's calculation rules.
    fn phase_base_totals(out: &mut RunOutcome) {
        let groups: [(&str, &[&str]); 5] = [
            (fields::INCOME_PROPERTY_TOTAL, &fields::PROPERTY_FIELDS),
            (fields::INCOME_FOREIGN_TOTAL, &fields::FOREIGN_FIELDS),
            (fields::DEDUCTION_TOTAL, &fields::DEDUCTION_FIELDS),
            (fields::ADJUSTMENT_TOTAL, &fields::ADJUSTMENT_FIELDS),
            (fields::INCOME_TOTAL, &fields::PRIMARY_INCOME_FIELDS),
        ];
        for (total, members) in groups {
            if out.field_values.contains_key(total) {
                continue;
            }
            let sum: Decimal = members
                .iter()
                .filter_map(|member| out.field_values.get(*member))
                .copied()
                .sum();
            if sum > Decimal::ZERO {
                out.field_values.insert(total.to_string(), sum);
            }
        }
    }

    /// Phase 4: calculation rules overwrite fields in priority order;
    /// authors control dependency order through priorities.
    fn phase_calculations(rules: &[&Rule], out: &mut RunOutcome) {
        for rule in rules {
            if !rule.condition.matches_fields(&out.field_values) {
                continue;
            }
            out.stats.rules_matched += 1;
            for action in &rule.actions {
                match action {
                    Action::Calc {
                        target,
                        formula,
                        round,
                        min,
                        max,
                    } => {
                        let mut value = formula.eval(&out.field_values);
                        if let Some(precision) = round {
                            value = value.round_dp_with_strategy(
                                *precision,
                                RoundingStrategy::MidpointAwayFromZero,
                            );
                        }
                        if let Some(floor) = min {
                            value = value.max(*floor);
                        }
                        if let Some(ceiling) = max {
                            value = value.min(*ceiling);
                        }
                        out.field_values.insert(target.clone(), value);
                        out.calculations.push(CalculationRecord {
                            logical_field: target.clone(),
                            value,
                            rule_id: rule.id,
                        });
                    }
                    Action::Flag { set } => {
                        out.flags.extend(set.iter().map(|(k, v)| (k.clone(), *v)));
                    }
                    other => out.errors.push(RuleFailure {
                        rule_id: rule.id,
                        event_id: None,
                        message: format!("unsupported action in calculation rule: {other:?}"),
                    }),
                }
            }
        }
    }

    /// Phase 5: derived totals, filled when missing or zero.
    fn phase_derived_totals(out: &mut RunOutcome) {
        let income = out.field(fields::INCOME_TOTAL);
        let adjustments = out.field(fields::ADJUSTMENT_TOTAL);
        let deductions = out.field(fields::DEDUCTION_TOTAL);
        set_if_missing_or_zero(
            &mut out.field_values,
            fields::TAXABLE_INCOME,
            (income - adjustments - deductions).max(Decimal::ZERO),
        );

        let taxable = out.field(fields::TAXABLE_INCOME);
        set_if_missing_or_zero(
            &mut out.field_values,
            fields::IPN_CALCULATED,
            (taxable * IPN_RATE)
                .round_dp_with_strategy(0, RoundingStrategy::MidpointAwayFromZero),
        );

        let calculated = out.field(fields::IPN_CALCULATED);
        let credit_general = out.field(fields::FOREIGN_TAX_CREDIT_GENERAL);
        let credit_cfc = out.field(fields::FOREIGN_TAX_CREDIT_CFC);
        set_if_missing_or_zero(
            &mut out.field_values,
            fields::IPN_PAYABLE,
            (calculated - credit_general - credit_cfc).max(Decimal::ZERO),
        );
    }

    /// Phase 6: flag rules evaluated against the field map.
    fn phase_flag_rules(rules: &[&Rule], out: &mut RunOutcome) {
        for rule in rules {
            if !rule.condition.matches_fields(&out.field_values) {
                continue;
            }
            out.stats.rules_matched += 1;
            for action in &rule.actions {
                match action {
                    Action::Flag { set } => {
                        out.flags.extend(set.iter().map(|(k, v)| (k.clone(), *v)));
                    }
                    other => out.errors.push(RuleFailure {
                        rule_id: rule.id,
                        event_id: None,
                        message: format!("unsupported action in flag rule: {other:?}"),
                    }),
                }
            }
        }
    }

    /// Phase 7: presentation flags derived from totals. Appendix flags
    /// are only ever raised here, never lowered.
    fn phase_auto_flags(out: &mut RunOutcome) {
        let income = out.field(fields::INCOME_TOTAL);
        out.flags
            .insert(flags::HAS_INCOME.to_string(), income > Decimal::ZERO);

        let foreign = out.field(fields::INCOME_FOREIGN_TOTAL);
        out.flags
            .insert(flags::HAS_FOREIGN_INCOME.to_string(), foreign > Decimal::ZERO);
        if foreign > Decimal::ZERO {
            out.flags.insert(flags::PRIL_2.to_string(), true);
        }

        let cfc = out.field(fields::INCOME_CFC_PROFIT);
        out.flags.insert(flags::HAS_CFC.to_string(), cfc > Decimal::ZERO);
        if cfc > Decimal::ZERO {
            out.flags.insert(flags::PRIL_3.to_string(), true);
        }

        let deductions = out.field(fields::DEDUCTION_TOTAL);
        out.flags
            .insert(flags::HAS_DEDUCTIONS.to_string(), deductions > Decimal::ZERO);

        let pril_1 = fields::PROPERTY_FIELDS
            .iter()
            .chain([fields::INCOME_PROPERTY_TOTAL].iter())
            .chain([fields::INCOME_RENT_NON_AGENT].iter())
            .chain([fields::INCOME_OTHER_NON_AGENT].iter())
            .any(|code| out.field(code) > Decimal::ZERO);
        if pril_1 {
            out.flags.insert(flags::PRIL_1.to_string(), true);
        }
    }
}

fn set_if_missing_or_zero(
    fields: &mut BTreeMap<String, Decimal>,
    code: &str,
    value: Decimal,
) {
    let current = fields.get(code).copied().unwrap_or(Decimal::ZERO);
    if current.is_zero() {
        fields.insert(code.to_string(), value);
    }
}

fn lookup_metadata_amount(metadata: &serde_json::Value, key: &str) -> Option<Decimal> {
    let mut current = metadata;
    for segment in key.split('.') {
        current = current.get(segment)?;
    }
    crate::events::normalize::amount_from_value(current)
}
