//! Rule catalog repository: typed CRUD over the reference tables.
//!
//! No business logic lives here beyond structural validation: a `map`
//! action must target an existing logical field, and the calculation
//! rule set must stay acyclic.

use chrono::Utc;
use sea_orm::sea_query::Condition as QueryCondition;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, DatabaseConnection, EntityTrait, QueryFilter, QueryOrder, Set,
};
use serde_json::Value;
use uuid::Uuid;

use salyq_core::fields;
use salyq_core::rules::{detect_cycles, Action, Formula, Rule, RuleKind};
use salyq_core::xml::FieldMapRow;
use salyq_shared::types::RuleId;

use crate::entities::{logical_fields, tax_event_types, tax_rules, xml_field_map};
use crate::error::{StoreError, StoreResult};

/// Input for inserting a rule.
#[derive(Debug, Clone)]
pub struct CreateRuleInput {
    /// Human-readable rule code.
    pub rule_code: String,
    /// Tax year scope; `None` applies to any year.
    pub tax_year: Option<i32>,
    /// Rule kind.
    pub kind: RuleKind,
    /// Conditions payload.
    pub conditions: Value,
    /// Actions payload.
    pub actions: Value,
    /// Execution order within the kind.
    pub priority: i32,
    /// Whether the rule participates in runs.
    pub active: bool,
}

/// Rule catalog repository.
#[derive(Debug, Clone)]
pub struct CatalogRepository {
    db: DatabaseConnection,
}

impl CatalogRepository {
    /// Creates a new catalog repository.
    #[must_use]
    pub const fn new(db: DatabaseConnection) -> Self {
        Self { db }
    }

    /// Inserts an event type if it is not present.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    pub async fn upsert_event_type(&self, code: &str, description: &str) -> StoreResult<()> {
        if tax_event_types::Entity::find_by_id(code)
            .one(&self.db)
            .await?
            .is_some()
        {
            return Ok(());
        }
        tax_event_types::ActiveModel {
            code: Set(code.to_string()),
            description: Set(description.to_string()),
        }
        .insert(&self.db)
        .await?;
        Ok(())
    }

    /// Inserts a logical field if it is not present.
    ///
    /// # Errors
    ///
    /// Returns `Conflict` for a malformed code.
    pub async fn upsert_logical_field(&self, code: &str, description: &str) -> StoreResult<()> {
        if !fields::is_valid_code(code) {
            return Err(StoreError::Conflict(format!(
                "malformed logical field code: {code}"
            )));
        }
        if logical_fields::Entity::find_by_id(code)
            .one(&self.db)
            .await?
            .is_some()
        {
            return Ok(());
        }
        logical_fields::ActiveModel {
            code: Set(code.to_string()),
            description: Set(description.to_string()),
        }
        .insert(&self.db)
        .await?;
        Ok(())
    }

    /// True if the logical field exists.
    ///
    /// # Errors
    ///
    /// Returns an error if the database query fails.
    pub async fn logical_field_exists(&self, code: &str) -> StoreResult<bool> {
        Ok(logical_fields::Entity::find_by_id(code)
            .one(&self.db)
            .await?
            .is_some())
    }

    /// Inserts a rule after structural validation.
    ///
    /// The payloads must parse into the tagged rule model, `map`
    /// targets must name existing logical fields, and adding a
    /// calculation rule must not create a formula dependency cycle.
    ///
    /// # Errors
    ///
    /// Returns `Conflict` for structural defects.
    pub async fn insert_rule(&self, input: CreateRuleInput) -> StoreResult<tax_rules::Model> {
        let parsed = Rule::from_payloads(
            RuleId::new(),
            input.rule_code.clone(),
            input.tax_year,
            input.kind,
            &input.conditions,
            &input.actions,
            input.priority,
        )
        .map_err(|err| StoreError::Conflict(format!("malformed rule payload: {err}")))?;

        for action in &parsed.actions {
            if let Action::Map { target, .. } = action {
                if !self.logical_field_exists(target).await? {
                    return Err(StoreError::Conflict(format!(
                        "map action targets unknown logical field: {target}"
                    )));
                }
            }
        }

        if input.kind == RuleKind::Calculation && input.active {
            self.check_calculation_cycles(&parsed).await?;
        }

        let model = tax_rules::ActiveModel {
            id: Set(parsed.id.into_inner()),
            rule_code: Set(input.rule_code),
            tax_year: Set(input.tax_year),
            rule_type: Set(input.kind.as_str().to_string()),
            conditions: Set(input.conditions),
            actions: Set(input.actions),
            priority: Set(input.priority),
            active: Set(input.active),
            created_at: Set(Utc::now().into()),
        };
        Ok(model.insert(&self.db).await?)
    }

    /// Rejects a calculation rule that would close a reference cycle
    /// with the already-active calculation rules of its scope.
    async fn check_calculation_cycles(&self, candidate: &Rule) -> StoreResult<()> {
        let mut existing = self
            .active_rules_for_year(candidate.tax_year.unwrap_or(0))
            .await?;
        if candidate.tax_year.is_none() {
            // Year-agnostic rules interact with every year's set; the
            // year-agnostic subset is what they can cycle with.
            existing.retain(|rule| rule.tax_year.is_none());
        }
        let mut pairs: Vec<(String, Formula)> = Vec::new();
        for rule in existing.iter().chain(std::iter::once(candidate)) {
            if rule.kind != RuleKind::Calculation {
                continue;
            }
            for action in &rule.actions {
                if let Action::Calc { target, formula, .. } = action {
                    pairs.push((target.clone(), formula.clone()));
                }
            }
        }
        detect_cycles(pairs.iter().map(|(t, f)| (t.as_str(), f)))
            .map_err(|err| StoreError::Conflict(err.to_string()))
    }

    /// Active rules for a tax year: `active = true` and
    /// `tax_year ∈ {year, null}`, ordered by priority then creation.
    ///
    /// # Errors
    ///
    /// Returns `Conflict` for a malformed persisted rule.
    pub async fn active_rules_for_year(&self, tax_year: i32) -> StoreResult<Vec<Rule>> {
        let rows = tax_rules::Entity::find()
            .filter(tax_rules::Column::Active.eq(true))
            .filter(
                QueryCondition::any()
                    .add(tax_rules::Column::TaxYear.eq(tax_year))
                    .add(tax_rules::Column::TaxYear.is_null()),
            )
            .order_by_asc(tax_rules::Column::Priority)
            .order_by_asc(tax_rules::Column::CreatedAt)
            .all(&self.db)
            .await?;

        rows.into_iter()
            .map(|row| {
                let kind = RuleKind::parse(&row.rule_type).ok_or_else(|| {
                    StoreError::Conflict(format!("unknown rule type: {}", row.rule_type))
                })?;
                Rule::from_payloads(
                    RuleId::from_uuid(row.id),
                    row.rule_code,
                    row.tax_year,
                    kind,
                    &row.conditions,
                    &row.actions,
                    row.priority,
                )
                .map_err(|err| StoreError::Conflict(format!("malformed persisted rule: {err}")))
            })
            .collect()
    }

    /// Inserts an XML field map row if it is not present.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    pub async fn upsert_field_map_row(
        &self,
        form_code: &str,
        application_code: &str,
        logical_field: Option<&str>,
        xml_field_name: &str,
        sort_order: i32,
    ) -> StoreResult<()> {
        let existing = xml_field_map::Entity::find()
            .filter(xml_field_map::Column::FormCode.eq(form_code))
            .filter(xml_field_map::Column::ApplicationCode.eq(application_code))
            .filter(xml_field_map::Column::XmlFieldName.eq(xml_field_name))
            .one(&self.db)
            .await?;
        if existing.is_some() {
            return Ok(());
        }
        xml_field_map::ActiveModel {
            id: Set(Uuid::now_v7()),
            form_code: Set(form_code.to_string()),
            application_code: Set(application_code.to_string()),
            logical_field: Set(logical_field.map(String::from)),
            xml_field_name: Set(xml_field_name.to_string()),
            sort_order: Set(sort_order),
        }
        .insert(&self.db)
        .await?;
        Ok(())
    }

    /// The field map for a form, in emission order.
    ///
    /// # Errors
    ///
    /// Returns an error if the database query fails.
    pub async fn field_map_rows(&self, form_code: &str) -> StoreResult<Vec<FieldMapRow>> {
        let rows = xml_field_map::Entity::find()
            .filter(xml_field_map::Column::FormCode.eq(form_code))
            .order_by_asc(xml_field_map::Column::ApplicationCode)
            .order_by_asc(xml_field_map::Column::SortOrder)
            .all(&self.db)
            .await?;
        Ok(rows
            .into_iter()
            .map(|row| FieldMapRow {
                application_code: row.application_code,
                logical_field: row.logical_field,
                xml_field_name: row.xml_field_name,
            })
            .collect())
    }
}
