//! End-to-end tests for the filing pipeline.
//!
//! Each test boots an in-memory SQLite database, runs the real
//! migration, seeds the reference catalog, and drives the public
//! operations the way a caller would.

use chrono::NaiveDate;
use rust_decimal_macros::dec;
use sea_orm::{ConnectOptions, Database, DatabaseConnection};
use serde_json::json;
use std::collections::BTreeMap;
use uuid::Uuid;

use salyq_core::engine::RunOptions;
use salyq_core::events::{SourceKind, TaxEventInput};
use salyq_core::workflow::DeclarationStatus;
use salyq_db::migration::{Migrator, MigratorTrait};
use salyq_db::repositories::{
    CreateTaxpayerInput, DeclarationRepository, EventRepository, SourceRecordRepository,
    TaxpayerRepository, XmlExportRepository,
};
use salyq_db::seed::seed_catalog;
use salyq_service::FilingService;
use salyq_shared::types::{Iin, SourceRecordId, TaxpayerId};
use salyq_shared::AppError;

async fn setup() -> (DatabaseConnection, FilingService, Uuid) {
    let mut options = ConnectOptions::new("sqlite::memory:");
    // A single connection keeps every query on the same in-memory
    // database.
    options.max_connections(1);
    let db = Database::connect(options).await.expect("connect sqlite");
    Migrator::up(&db, None).await.expect("run migrations");
    seed_catalog(&db).await.expect("seed catalog");

    let taxpayer = TaxpayerRepository::new(db.clone())
        .create(CreateTaxpayerInput {
            iin: Iin::new("880101300123").unwrap(),
            kind: "individual".to_string(),
            last_name: Some("Иванов".to_string()),
            first_name: Some("Иван".to_string()),
            middle_name: None,
            phone: Some("+77010000000".to_string()),
            email: Some("ivanov@example.kz".to_string()),
            is_resident: true,
        })
        .await
        .expect("create taxpayer");

    let service = FilingService::new(db.clone());
    (db, service, taxpayer.id)
}

async fn ingest_and_parse(
    service: &FilingService,
    taxpayer: Uuid,
    payload: serde_json::Value,
) -> Uuid {
    let record = service
        .ingest(taxpayer, SourceKind::Manual, None, payload)
        .await
        .expect("ingest");
    service.parse(record.id).await.expect("parse");
    record.id
}

fn dividends_payload() -> serde_json::Value {
    json!({
        "event_type": "EV_FOREIGN_DIVIDENDS",
        "date": "2024-06-15",
        "amount": 500000,
        "currency": "KZT"
    })
}

#[tokio::test]
async fn foreign_dividends_compute_the_full_chain() {
    let (_db, service, taxpayer) = setup().await;
    ingest_and_parse(&service, taxpayer, dividends_payload()).await;

    let outcome = service
        .run_engine(taxpayer, 2024, RunOptions::default())
        .await
        .unwrap();

    assert_eq!(outcome.field("LF_INCOME_FOREIGN_DIVIDENDS"), dec!(500000));
    assert_eq!(outcome.field("LF_INCOME_FOREIGN_TOTAL"), dec!(500000));
    assert_eq!(outcome.field("LF_INCOME_TOTAL"), dec!(500000));
    assert_eq!(outcome.field("LF_TAXABLE_INCOME"), dec!(500000));
    assert_eq!(outcome.field("LF_IPN_CALCULATED"), dec!(50000));
    assert_eq!(outcome.field("LF_IPN_PAYABLE"), dec!(50000));
    assert!(outcome.flag("has_income"));
    assert!(outcome.flag("has_foreign_income"));
    assert!(outcome.flag("pril_2"));
}

#[tokio::test]
async fn foreign_tax_credit_wipes_the_payable_tax() {
    let (_db, service, taxpayer) = setup().await;
    ingest_and_parse(&service, taxpayer, dividends_payload()).await;
    ingest_and_parse(
        &service,
        taxpayer,
        json!({
            "event_type": "EV_FOREIGN_TAX_PAID_GENERAL",
            "date": "2024-06-15",
            "amount": 50000
        }),
    )
    .await;

    let outcome = service
        .run_engine(taxpayer, 2024, RunOptions::default())
        .await
        .unwrap();
    assert_eq!(outcome.field("LF_FOREIGN_TAX_CREDIT_GENERAL"), dec!(50000));
    assert_eq!(outcome.field("LF_IPN_PAYABLE"), dec!(0));
}

#[tokio::test]
async fn property_sale_with_deduction_generates_items() {
    let (db, service, taxpayer) = setup().await;
    ingest_and_parse(
        &service,
        taxpayer,
        json!({"event_type": "EV_PROPERTY_SALE_KZ", "date": "2024-08-20", "amount": 1000000}),
    )
    .await;
    ingest_and_parse(
        &service,
        taxpayer,
        json!({"event_type": "EV_DEDUCTION_STANDARD", "date": "2024-03-01", "amount": 200000}),
    )
    .await;

    let (declaration, outcome) = service.generate_declaration(taxpayer, 2024).await.unwrap();
    assert_eq!(outcome.field("LF_INCOME_PROPERTY_KZ"), dec!(1000000));
    assert_eq!(outcome.field("LF_INCOME_PROPERTY_TOTAL"), dec!(1000000));
    assert_eq!(outcome.field("LF_DEDUCTION_TOTAL"), dec!(200000));
    assert_eq!(outcome.field("LF_TAXABLE_INCOME"), dec!(800000));
    assert_eq!(outcome.field("LF_IPN_CALCULATED"), dec!(80000));
    assert!(outcome.flag("pril_1"));

    let items = DeclarationRepository::new(db.clone())
        .items_for(declaration.id)
        .await
        .unwrap();
    assert_eq!(items.get("LF_TAXABLE_INCOME"), Some(&dec!(800000)));
    assert_eq!(items.get("LF_DEDUCTION_STANDARD"), Some(&dec!(200000)));
    assert_eq!(declaration.status, "draft");
}

#[tokio::test]
async fn regeneration_is_deterministic_and_versions_are_monotonic() {
    let (db, service, taxpayer) = setup().await;
    ingest_and_parse(
        &service,
        taxpayer,
        json!({"event_type": "EV_PROPERTY_SALE_KZ", "date": "2024-08-20", "amount": 1000000}),
    )
    .await;
    ingest_and_parse(
        &service,
        taxpayer,
        json!({"event_type": "EV_DEDUCTION_STANDARD", "date": "2024-03-01", "amount": 200000}),
    )
    .await;

    let (declaration, _) = service.generate_declaration(taxpayer, 2024).await.unwrap();
    service.validate(declaration.id).await.unwrap();
    let first = service.project_xml(declaration.id).await.unwrap();

    // Regenerate (drops back to draft), validate, project again.
    service.generate_declaration(taxpayer, 2024).await.unwrap();
    service.validate(declaration.id).await.unwrap();
    let second = service.project_xml(declaration.id).await.unwrap();

    assert_eq!(first.schema_version, 1);
    assert_eq!(second.schema_version, 2);
    assert_eq!(first.content_hash, second.content_hash);
    assert_eq!(first.payload, second.payload);

    let exports = XmlExportRepository::new(db.clone());
    let history = exports.list_for(declaration.id).await.unwrap();
    assert_eq!(history.len(), 2);
    assert_eq!(history[0].schema_version, 1);
    let latest = exports.latest(declaration.id).await.unwrap().unwrap();
    assert_eq!(latest.schema_version, 2);
}

#[tokio::test]
async fn validation_refuses_a_declaration_without_items() {
    let (db, service, taxpayer) = setup().await;

    let repo = DeclarationRepository::new(db.clone());
    let taxpayer_row = TaxpayerRepository::new(db.clone())
        .find_by_id(taxpayer)
        .await
        .unwrap();
    let declaration = repo
        .find_or_create(
            taxpayer,
            2024,
            "270.00",
            salyq_core::declaration::DeclarationKind::Main,
            &TaxpayerRepository::snapshot_header(&taxpayer_row),
        )
        .await
        .unwrap();

    let err = service.validate(declaration.id).await.unwrap_err();
    assert!(matches!(err, AppError::Unprocessable(_)));

    let reloaded = repo.find_by_id(declaration.id).await.unwrap();
    assert_eq!(reloaded.status, "draft");

    let reports = repo.list_reports(declaration.id).await.unwrap();
    assert_eq!(reports.len(), 1);
    assert_eq!(reports[0].kind, "business");
    assert!(!reports[0].is_valid);
}

#[tokio::test]
async fn ingestion_is_idempotent_by_checksum() {
    let (db, service, taxpayer) = setup().await;

    let first = service
        .ingest(taxpayer, SourceKind::Manual, None, dividends_payload())
        .await
        .unwrap();
    let second = service
        .ingest(taxpayer, SourceKind::Manual, None, dividends_payload())
        .await
        .unwrap();
    assert_eq!(first.id, second.id);

    let parsed = service.parse(first.id).await.unwrap();
    assert_eq!(parsed.created, 1);
    assert!(!parsed.skipped);

    let again = service.parse(first.id).await.unwrap();
    assert!(again.skipped);
    assert_eq!(again.created, 0);

    let events = salyq_db::repositories::EventRepository::new(db.clone())
        .list_for_source(first.id)
        .await
        .unwrap();
    assert_eq!(events.len(), 1);
}

#[tokio::test]
async fn reparse_replaces_events() {
    let (db, service, taxpayer) = setup().await;
    let record = service
        .ingest(taxpayer, SourceKind::Manual, None, dividends_payload())
        .await
        .unwrap();
    service.parse(record.id).await.unwrap();

    let events = salyq_db::repositories::EventRepository::new(db.clone());
    let before = events.list_for_source(record.id).await.unwrap();

    let summary = service.reparse(record.id).await.unwrap();
    assert_eq!(summary.created, 1);
    let after = events.list_for_source(record.id).await.unwrap();
    assert_eq!(after.len(), 1);
    assert_ne!(before[0].id, after[0].id);
}

#[tokio::test]
async fn workflow_walks_to_accepted_and_freezes() {
    let (_db, service, taxpayer) = setup().await;
    ingest_and_parse(&service, taxpayer, dividends_payload()).await;
    let (declaration, _) = service.generate_declaration(taxpayer, 2024).await.unwrap();

    service
        .transition(declaration.id, DeclarationStatus::Validated)
        .await
        .unwrap();
    service
        .transition(declaration.id, DeclarationStatus::AwaitingConsent)
        .await
        .unwrap();
    service
        .transition(declaration.id, DeclarationStatus::Signed)
        .await
        .unwrap();
    service
        .transition(declaration.id, DeclarationStatus::Submitted)
        .await
        .unwrap();

    // Submitted declarations reject mutation with a distinct error.
    let err = service
        .set_manual_item(declaration.id, "LF_INCOME_TOTAL", dec!(1))
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::Conflict(_)));
    let err = service.generate_declaration(taxpayer, 2024).await.unwrap_err();
    assert!(matches!(err, AppError::Conflict(_)));

    let accepted = service
        .transition(declaration.id, DeclarationStatus::Accepted)
        .await
        .unwrap();
    assert_eq!(accepted.status, "accepted");

    let err = service
        .transition(declaration.id, DeclarationStatus::Draft)
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::Conflict(_)));
}

#[tokio::test]
async fn projection_requires_validation() {
    let (_db, service, taxpayer) = setup().await;
    ingest_and_parse(&service, taxpayer, dividends_payload()).await;
    let (declaration, _) = service.generate_declaration(taxpayer, 2024).await.unwrap();

    let err = service.project_xml(declaration.id).await.unwrap_err();
    assert!(matches!(err, AppError::Unprocessable(_)));
}

#[tokio::test]
async fn projected_xml_carries_header_and_amounts() {
    let (_db, service, taxpayer) = setup().await;
    ingest_and_parse(&service, taxpayer, dividends_payload()).await;
    let (declaration, _) = service.generate_declaration(taxpayer, 2024).await.unwrap();
    service.validate(declaration.id).await.unwrap();

    let export = service.project_xml(declaration.id).await.unwrap();
    assert!(export.payload.starts_with("<?xml version=\"1.0\" encoding=\"UTF-8\"?>"));
    assert!(export.payload.contains("<field name=\"iin\">880101300123</field>"));
    assert!(export.payload.contains("<field name=\"period_year\">2024</field>"));
    assert!(export.payload.contains("<field name=\"dt_main\">1</field>"));
    assert!(export.payload.contains("<field name=\"pril_2\">1</field>"));
    assert!(export.payload.contains("<field name=\"field_270_01_D\">500000</field>"));
    assert!(export.payload.contains("<field name=\"field_270_02_A\">500000</field>"));
    assert!(export.payload.contains("<field name=\"field_270_01_K\">50000</field>"));
    assert!(!export.signed);
}

#[tokio::test]
async fn bank_debits_are_excluded_from_income() {
    let (_db, service, taxpayer) = setup().await;
    let record = service
        .ingest(
            taxpayer,
            SourceKind::Bank,
            None,
            json!({"transactions": [
                {"date": "2024-05-01", "amount": -30000, "purpose": "grocery store"},
                {"date": "2024-05-02", "credit": 120000, "purpose": "Оплата аренды за апрель"}
            ]}),
        )
        .await
        .unwrap();
    service.parse(record.id).await.unwrap();

    let outcome = service
        .run_engine(taxpayer, 2024, RunOptions::default())
        .await
        .unwrap();
    assert_eq!(outcome.excluded_event_ids.len(), 1);
    assert_eq!(outcome.field("LF_INCOME_RENT_NON_AGENT"), dec!(120000));
    assert_eq!(outcome.field("LF_INCOME_TOTAL"), dec!(120000));
    assert_eq!(outcome.field("LF_INCOME_OTHER_NON_AGENT"), dec!(0));
}

#[tokio::test]
async fn empty_year_requires_allow_empty() {
    let (_db, service, taxpayer) = setup().await;

    let err = service
        .run_engine(taxpayer, 2024, RunOptions::default())
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::Unprocessable(_)));

    let outcome = service
        .run_engine(taxpayer, 2024, RunOptions { allow_empty: true })
        .await
        .unwrap();
    assert_eq!(outcome.stats.events_processed, 0);
}

#[tokio::test]
async fn manual_override_survives_until_regeneration() {
    let (db, service, taxpayer) = setup().await;
    ingest_and_parse(&service, taxpayer, dividends_payload()).await;
    let (declaration, _) = service.generate_declaration(taxpayer, 2024).await.unwrap();

    service
        .set_manual_item(declaration.id, "LF_DEDUCTION_OTHER", dec!(12345))
        .await
        .unwrap();
    let repo = DeclarationRepository::new(db.clone());
    let items = repo.items_for(declaration.id).await.unwrap();
    assert_eq!(items.get("LF_DEDUCTION_OTHER"), Some(&dec!(12345)));

    // Regeneration replaces all items; manual overrides are discarded.
    service.generate_declaration(taxpayer, 2024).await.unwrap();
    let items = repo.items_for(declaration.id).await.unwrap();
    assert_eq!(items.get("LF_DEDUCTION_OTHER"), None);
}

#[tokio::test]
async fn store_level_item_and_flag_operations() {
    let (db, service, taxpayer) = setup().await;
    ingest_and_parse(&service, taxpayer, dividends_payload()).await;
    let (declaration, _) = service.generate_declaration(taxpayer, 2024).await.unwrap();

    let repo = DeclarationRepository::new(db.clone());
    let mut patch = BTreeMap::new();
    patch.insert("LF_DEDUCTION_OTHER".to_string(), dec!(500));
    repo.bulk_upsert_items(declaration.id, &patch, "manual")
        .await
        .unwrap();
    let items = repo.items_for(declaration.id).await.unwrap();
    assert_eq!(items.get("LF_DEDUCTION_OTHER"), Some(&dec!(500)));

    let mut flags = BTreeMap::new();
    flags.insert("pril_7".to_string(), true);
    let updated = repo.merge_flags(declaration.id, &flags).await.unwrap();
    let merged = DeclarationRepository::flags_of(&updated);
    assert_eq!(merged.get("pril_7"), Some(&true));
    // Shallow merge keeps the engine's flags.
    assert_eq!(merged.get("has_foreign_income"), Some(&true));

    let deleted = repo.delete_items(declaration.id).await.unwrap();
    assert!(deleted > 0);
    assert!(repo.items_for(declaration.id).await.unwrap().is_empty());
}

#[tokio::test]
async fn deactivating_a_source_hides_its_events() {
    let (db, service, taxpayer) = setup().await;
    let record = service
        .ingest(taxpayer, SourceKind::Manual, None, dividends_payload())
        .await
        .unwrap();
    service.parse(record.id).await.unwrap();

    let sources = SourceRecordRepository::new(db.clone());
    assert_eq!(sources.list_for_taxpayer(taxpayer).await.unwrap().len(), 1);
    sources.deactivate(record.id).await.unwrap();

    // Deactivated events no longer reach the engine.
    let err = service
        .run_engine(taxpayer, 2024, RunOptions::default())
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::Unprocessable(_)));

    // The record itself refuses re-parsing.
    let err = service.parse(record.id).await.unwrap_err();
    assert!(matches!(err, AppError::Unprocessable(_)));
}

#[tokio::test]
async fn taxpayer_lookup_and_single_event_insert() {
    let (db, _service, taxpayer) = setup().await;

    let taxpayers = TaxpayerRepository::new(db.clone());
    let found = taxpayers
        .find_by_iin(&Iin::new("880101300123").unwrap())
        .await
        .unwrap();
    assert_eq!(found.map(|t| t.id), Some(taxpayer));

    let (record, _) = SourceRecordRepository::new(db.clone())
        .ingest(taxpayer, SourceKind::Manual, None, json!({"probe": 1}))
        .await
        .unwrap();
    let events = EventRepository::new(db.clone());
    let inserted = events
        .insert_one(&TaxEventInput {
            taxpayer_id: TaxpayerId::from_uuid(taxpayer),
            source_record_id: SourceRecordId::from_uuid(record.id),
            event_type: "EV_WINNINGS".to_string(),
            event_date: NaiveDate::from_ymd_opt(2024, 4, 1).unwrap(),
            amount: Some(dec!(777)),
            currency: Some("KZT".to_string()),
            metadata: json!({}),
        })
        .await
        .unwrap();
    assert_eq!(inserted.event_type, "EV_WINNINGS");
    assert_eq!(events.list_for_year(taxpayer, 2024).await.unwrap().len(), 1);
}

#[tokio::test]
async fn editing_a_validated_declaration_drops_it_to_draft() {
    let (db, service, taxpayer) = setup().await;
    ingest_and_parse(&service, taxpayer, dividends_payload()).await;
    let (declaration, _) = service.generate_declaration(taxpayer, 2024).await.unwrap();
    service.validate(declaration.id).await.unwrap();

    let updated = service
        .set_manual_item(declaration.id, "LF_DEDUCTION_OTHER", dec!(1000))
        .await
        .unwrap();
    assert_eq!(updated.status, "draft");

    let repo = DeclarationRepository::new(db.clone());
    let reloaded = repo.find_by_id(declaration.id).await.unwrap();
    assert_eq!(reloaded.status, "draft");
}
