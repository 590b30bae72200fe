//! The filing pipeline service.

use rust_decimal::Decimal;
use sea_orm::{DatabaseConnection, DatabaseTransaction};
use serde_json::{json, Value};
use std::collections::BTreeMap;
use tracing::{info, warn};
use uuid::Uuid;

use salyq_core::declaration::{DeclarationKind, SnapshotHeader};
use salyq_core::engine::{EngineError, RuleEngine, RunOptions, RunOutcome};
use salyq_core::events::{SourceKind, TaxEvent};
use salyq_core::parsers::{ParserRegistry, RawSource};
use salyq_core::workflow::{DeclarationStatus, WorkflowError, WorkflowService};
use salyq_core::xml::{DeclarationView, ProjectionError, XmlProjector};
use salyq_db::entities::{declarations, source_records, tax_events, xml_exports};
use salyq_db::repositories::{
    CatalogRepository, DeclarationRepository, EventRepository, SourceRecordRepository,
    TaxpayerRepository, XmlExportRepository,
};
use salyq_db::StoreError;
use salyq_shared::types::{SourceRecordId, TaxpayerId};
use salyq_shared::{AppError, AppResult};

/// The filed form code.
const FORM_CODE: &str = "270.00";

/// Result of parsing one source record.
#[derive(Debug)]
pub struct ParseSummary {
    /// Events created by this call.
    pub created: usize,
    /// True when prior events short-circuited the parse.
    pub skipped: bool,
    /// The events now attached to the source record.
    pub events: Vec<tax_events::Model>,
}

/// Public operations of the filing pipeline.
///
/// Every operation that mutates a declaration - generation, status
/// transitions, item and header edits, XML projection - runs inside a
/// transaction that holds the declaration's row lock, so concurrent
/// calls on the same declaration serialize.
#[derive(Debug, Clone)]
pub struct FilingService {
    db: DatabaseConnection,
}

impl FilingService {
    /// Creates the service over a database connection.
    #[must_use]
    pub const fn new(db: DatabaseConnection) -> Self {
        Self { db }
    }

    fn taxpayers(&self) -> TaxpayerRepository {
        TaxpayerRepository::new(self.db.clone())
    }

    fn source_records(&self) -> SourceRecordRepository {
        SourceRecordRepository::new(self.db.clone())
    }

    fn events(&self) -> EventRepository {
        EventRepository::new(self.db.clone())
    }

    fn catalog(&self) -> CatalogRepository {
        CatalogRepository::new(self.db.clone())
    }

    fn declarations(&self) -> DeclarationRepository {
        DeclarationRepository::new(self.db.clone())
    }

    /// Ingests a raw payload, idempotent by checksum.
    ///
    /// # Errors
    ///
    /// Returns `NotFound` for an unknown taxpayer.
    pub async fn ingest(
        &self,
        taxpayer_id: Uuid,
        source_kind: SourceKind,
        external_id: Option<String>,
        payload: Value,
    ) -> AppResult<source_records::Model> {
        self.taxpayers().find_by_id(taxpayer_id).await?;
        let (record, created) = self
            .source_records()
            .ingest(taxpayer_id, source_kind, external_id, payload)
            .await?;
        info!(
            source_record = %record.id,
            %source_kind,
            created,
            "payload ingested"
        );
        Ok(record)
    }

    /// Parses a source record into stored events.
    ///
    /// Idempotent: existing events short-circuit. Parsers never write;
    /// this operation owns the store side.
    ///
    /// # Errors
    ///
    /// Returns `Parse` when the payload is rejected, `Unprocessable`
    /// for a deactivated record.
    pub async fn parse(&self, source_record_id: Uuid) -> AppResult<ParseSummary> {
        let record = self.source_records().find_by_id(source_record_id).await?;
        if !record.active {
            return Err(AppError::Unprocessable(format!(
                "source record {source_record_id} is deactivated"
            )));
        }

        let existing = self.events().list_for_source(source_record_id).await?;
        if !existing.is_empty() {
            return Ok(ParseSummary {
                created: 0,
                skipped: true,
                events: existing,
            });
        }

        let kind = SourceKind::parse(&record.source_kind).ok_or_else(|| {
            AppError::Internal(format!("unknown stored source kind: {}", record.source_kind))
        })?;
        let registry = ParserRegistry::standard();
        let inputs = registry
            .parse(
                kind,
                &RawSource {
                    taxpayer_id: TaxpayerId::from_uuid(record.taxpayer_id),
                    source_record_id: SourceRecordId::from_uuid(record.id),
                    payload: &record.raw_payload,
                },
            )
            .map_err(|err| AppError::Parse(err.to_string()))?;

        let inserted = self.events().insert_many(&inputs).await?;
        info!(
            source_record = %source_record_id,
            events = inserted.len(),
            "source record parsed"
        );
        Ok(ParseSummary {
            created: inserted.len(),
            skipped: false,
            events: inserted,
        })
    }

    /// Deletes a source record's events and parses it again.
    ///
    /// # Errors
    ///
    /// Returns the same errors as [`FilingService::parse`].
    pub async fn reparse(&self, source_record_id: Uuid) -> AppResult<ParseSummary> {
        let deleted = self.events().delete_for_source(source_record_id).await?;
        if deleted > 0 {
            info!(source_record = %source_record_id, deleted, "events dropped for re-parse");
        }
        self.parse(source_record_id).await
    }

    /// Runs the engine for a taxpayer-year without persisting anything.
    ///
    /// # Errors
    ///
    /// Returns `Unprocessable` for an empty event set without
    /// `allow_empty`, `Conflict` for catalog defects.
    pub async fn run_engine(
        &self,
        taxpayer_id: Uuid,
        tax_year: i32,
        options: RunOptions,
    ) -> AppResult<RunOutcome> {
        let (_, outcome) = self.load_and_run(taxpayer_id, tax_year, options).await?;
        Ok(outcome)
    }

    async fn load_and_run(
        &self,
        taxpayer_id: Uuid,
        tax_year: i32,
        options: RunOptions,
    ) -> AppResult<(Vec<TaxEvent>, RunOutcome)> {
        let events = self.events().list_for_year(taxpayer_id, tax_year).await?;
        let rules = self.catalog().active_rules_for_year(tax_year).await?;
        let vocabulary = self.events().event_type_codes().await?;

        let outcome = RuleEngine::run(tax_year, &events, &rules, &vocabulary, &options)
            .map_err(|err| match err {
                EngineError::EmptyEventSet => AppError::Unprocessable(err.to_string()),
                EngineError::UnknownEventType(_) => AppError::Conflict(err.to_string()),
            })?;
        if !outcome.errors.is_empty() {
            warn!(
                taxpayer = %taxpayer_id,
                tax_year,
                failures = outcome.errors.len(),
                "engine run finished with rule failures"
            );
        }
        Ok((events, outcome))
    }

    /// Runs the engine and persists the result into the declaration.
    ///
    /// The items, flags, and mapping rows are replaced in one
    /// row-locked transaction; the header is refreshed from the
    /// taxpayer and the regeneration gate is checked under the lock.
    ///
    /// # Errors
    ///
    /// Returns `Conflict` when the declaration is past regeneration.
    pub async fn generate_declaration(
        &self,
        taxpayer_id: Uuid,
        tax_year: i32,
    ) -> AppResult<(declarations::Model, RunOutcome)> {
        let taxpayer = self.taxpayers().find_by_id(taxpayer_id).await?;
        let (events, outcome) = self
            .load_and_run(taxpayer_id, tax_year, RunOptions::default())
            .await?;

        let header = TaxpayerRepository::snapshot_header(&taxpayer);
        let repo = self.declarations();
        let declaration = repo
            .find_or_create(taxpayer_id, tax_year, FORM_CODE, DeclarationKind::Main, &header)
            .await?;

        let event_ids: Vec<Uuid> = events.iter().map(|e| e.id.into_inner()).collect();
        let declaration = repo
            .regenerate(
                declaration.id,
                &header,
                &outcome.field_values,
                &outcome.flags,
                &outcome.mappings,
                &event_ids,
            )
            .await?;
        info!(
            declaration = %declaration.id,
            tax_year,
            items = outcome.field_values.len(),
            "declaration generated"
        );
        Ok((declaration, outcome))
    }

    /// Validates a declaration, writing a business report either way.
    ///
    /// # Errors
    ///
    /// Returns `Unprocessable` when the gate fails (the invalid report
    /// is still persisted), `Conflict` for a wrong starting status.
    pub async fn validate(&self, declaration_id: Uuid) -> AppResult<declarations::Model> {
        self.transition(declaration_id, DeclarationStatus::Validated)
            .await
    }

    /// Transitions a declaration to a target status.
    ///
    /// The whole read-check-write runs under the declaration's row
    /// lock; the draft → validated edge goes through the validation
    /// gate and persists a business report whichever way it goes.
    ///
    /// # Errors
    ///
    /// Returns `Conflict` for a transition outside the state graph.
    pub async fn transition(
        &self,
        declaration_id: Uuid,
        target: DeclarationStatus,
    ) -> AppResult<declarations::Model> {
        let repo = self.declarations();
        let txn = repo.begin().await?;
        let declaration = repo.find_for_update(&txn, declaration_id).await?;
        let status = DeclarationRepository::status_of(&declaration)?;
        WorkflowService::transition(status, target).map_err(workflow_error)?;

        if status == DeclarationStatus::Draft && target == DeclarationStatus::Validated {
            // Commit either way: an invalid report must be persisted.
            return match Self::validate_in(&txn, declaration).await {
                Ok(updated) => {
                    txn.commit().await.map_err(StoreError::from)?;
                    info!(declaration = %declaration_id, "declaration validated");
                    Ok(updated)
                }
                Err(err) => {
                    txn.commit().await.map_err(StoreError::from)?;
                    Err(err)
                }
            };
        }

        let updated = DeclarationRepository::update_status_in(&txn, declaration, target).await?;
        txn.commit().await.map_err(StoreError::from)?;
        info!(declaration = %declaration_id, status = %target, "declaration transitioned");
        Ok(updated)
    }

    /// The draft → validated gate, run inside the caller's locked
    /// transaction.
    async fn validate_in(
        txn: &DatabaseTransaction,
        declaration: declarations::Model,
    ) -> AppResult<declarations::Model> {
        let declaration_id = declaration.id;
        let items = DeclarationRepository::items_in(txn, declaration_id).await?;
        match WorkflowService::validation_gate(items.len(), items.keys().map(String::as_str)) {
            Ok(()) => {
                DeclarationRepository::insert_report_in(
                    txn,
                    declaration_id,
                    "business",
                    true,
                    json!({
                        "item_count": items.len(),
                        "checked_fields": ["LF_INCOME_TOTAL", "LF_TAXABLE_INCOME", "LF_IPN_CALCULATED"],
                    }),
                )
                .await?;
                Ok(DeclarationRepository::update_status_in(
                    txn,
                    declaration,
                    DeclarationStatus::Validated,
                )
                .await?)
            }
            Err(gate) => {
                DeclarationRepository::insert_report_in(
                    txn,
                    declaration_id,
                    "business",
                    false,
                    json!({"error": gate.to_string()}),
                )
                .await?;
                Err(AppError::Unprocessable(gate.to_string()))
            }
        }
    }

    /// Overrides a single item by hand.
    ///
    /// Editing a validated declaration drops it back to draft;
    /// submitted and accepted declarations reject the edit.
    ///
    /// # Errors
    ///
    /// Returns `Conflict` for immutable declarations.
    pub async fn set_manual_item(
        &self,
        declaration_id: Uuid,
        logical_field: &str,
        value: Decimal,
    ) -> AppResult<declarations::Model> {
        // Catalog reads stay outside the declaration lock.
        if !self.catalog().logical_field_exists(logical_field).await? {
            return Err(AppError::Conflict(format!(
                "unknown logical field: {logical_field}"
            )));
        }

        let repo = self.declarations();
        let txn = repo.begin().await?;
        let declaration = repo.find_for_update(&txn, declaration_id).await?;
        let status = DeclarationRepository::status_of(&declaration)?;
        WorkflowService::ensure_mutable(status).map_err(workflow_error)?;

        let mut patch = BTreeMap::new();
        patch.insert(logical_field.to_string(), value);
        DeclarationRepository::upsert_items_in(&txn, declaration_id, &patch, "manual").await?;

        let updated = if status == DeclarationStatus::Validated {
            DeclarationRepository::update_status_in(&txn, declaration, DeclarationStatus::Draft)
                .await?
        } else {
            declaration
        };
        txn.commit().await.map_err(StoreError::from)?;
        Ok(updated)
    }

    /// Overrides the snapshot header by hand.
    ///
    /// Editing a validated declaration drops it back to draft;
    /// submitted and accepted declarations reject the edit.
    ///
    /// # Errors
    ///
    /// Returns `Conflict` for immutable declarations.
    pub async fn update_header(
        &self,
        declaration_id: Uuid,
        header: &SnapshotHeader,
    ) -> AppResult<declarations::Model> {
        let repo = self.declarations();
        let txn = repo.begin().await?;
        let declaration = repo.find_for_update(&txn, declaration_id).await?;
        let status = DeclarationRepository::status_of(&declaration)?;
        WorkflowService::ensure_mutable(status).map_err(workflow_error)?;

        let mut updated =
            DeclarationRepository::update_header_in(&txn, declaration, header).await?;
        if status == DeclarationStatus::Validated {
            updated =
                DeclarationRepository::update_status_in(&txn, updated, DeclarationStatus::Draft)
                    .await?;
        }
        txn.commit().await.map_err(StoreError::from)?;
        Ok(updated)
    }

    /// Projects a declaration into a new XML export version.
    ///
    /// Requires the declaration to be validated or further along; the
    /// status check, item read, version assignment, and export append
    /// all happen under the declaration's row lock.
    ///
    /// # Errors
    ///
    /// Returns `Unprocessable` before validation, `Internal` if the
    /// projector's structural self-check fails.
    pub async fn project_xml(&self, declaration_id: Uuid) -> AppResult<xml_exports::Model> {
        // The field map is read-mostly reference data; fetch it before
        // taking the declaration lock.
        let field_map = self.catalog().field_map_rows(FORM_CODE).await?;

        let repo = self.declarations();
        let txn = repo.begin().await?;
        let declaration = repo.find_for_update(&txn, declaration_id).await?;
        let status = DeclarationRepository::status_of(&declaration)?;
        if !status.is_validated_or_later() {
            return Err(AppError::Unprocessable(format!(
                "declaration is {status}; XML projection requires a validated declaration"
            )));
        }

        let items = DeclarationRepository::items_in(&txn, declaration_id).await?;
        let flags = DeclarationRepository::flags_of(&declaration);
        let header = DeclarationRepository::header_of(&declaration);
        let kind = DeclarationKind::parse(&declaration.kind).ok_or_else(|| {
            AppError::Internal(format!("unknown declaration kind: {}", declaration.kind))
        })?;

        let view = DeclarationView {
            tax_year: declaration.tax_year,
            kind,
            header: &header,
            filled_at: Some(declaration.created_at.date_naive()),
            flags: &flags,
            items: &items,
        };
        let document = XmlProjector::project(&view, &field_map).map_err(|err| match err {
            ProjectionError::StructuralCheckFailed => AppError::Internal(err.to_string()),
            ProjectionError::Write(msg) => AppError::Internal(msg),
        })?;

        let export = XmlExportRepository::append_in(
            &txn,
            declaration_id,
            document.payload,
            document.content_hash,
        )
        .await?;
        DeclarationRepository::mark_exported_in(&txn, declaration).await?;
        txn.commit().await.map_err(StoreError::from)?;
        info!(
            declaration = %declaration_id,
            version = export.schema_version,
            "xml export created"
        );
        Ok(export)
    }
}

/// Maps workflow violations onto the error taxonomy.
fn workflow_error(err: WorkflowError) -> AppError {
    match err {
        WorkflowError::InvalidTransition { .. } | WorkflowError::Immutable(_) => {
            AppError::Conflict(err.to_string())
        }
        WorkflowError::NoItems | WorkflowError::MissingRequiredFields { .. } => {
            AppError::Unprocessable(err.to_string())
        }
    }
}
