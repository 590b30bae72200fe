//! Reference catalog seed: event types, logical fields, the 2024 rule
//! set, and the form 270.00 XML field map.
//!
//! Seeding is idempotent; every entry is skipped when already present.

use sea_orm::{ColumnTrait, DatabaseConnection, EntityTrait, QueryFilter};
use serde_json::json;

use salyq_core::fields;
use salyq_core::rules::RuleKind;

use crate::entities::tax_rules;
use crate::error::StoreResult;
use crate::repositories::{CatalogRepository, CreateRuleInput};

/// Seeds the whole reference catalog.
///
/// # Errors
///
/// Returns an error if a database operation fails.
pub async fn seed_catalog(db: &DatabaseConnection) -> StoreResult<()> {
    seed_event_types(db).await?;
    seed_logical_fields(db).await?;
    seed_rules(db).await?;
    seed_field_map(db).await?;
    Ok(())
}

const EVENT_TYPES: [(&str, &str); 33] = [
    ("EV_PROPERTY_SALE_KZ", "Sale of real property in Kazakhstan"),
    ("EV_PROPERTY_SALE_FOREIGN", "Sale of real property abroad"),
    ("EV_VEHICLE_SALE", "Sale of a vehicle"),
    ("EV_FOREIGN_DIVIDENDS", "Dividends from foreign sources"),
    ("EV_FOREIGN_INTEREST", "Interest from foreign sources"),
    ("EV_FOREIGN_ROYALTY", "Royalties from foreign sources"),
    ("EV_FOREIGN_EMPLOYMENT", "Employment income from foreign sources"),
    ("EV_FOREIGN_CAPITAL_GAINS", "Capital gains from foreign sources"),
    ("EV_FOREIGN_RENT", "Rental income from foreign sources"),
    ("EV_FOREIGN_PENSION", "Pension from foreign sources"),
    ("EV_FOREIGN_BUSINESS", "Business income from foreign sources"),
    ("EV_FOREIGN_OTHER", "Other income from foreign sources"),
    ("EV_FOREIGN_TRANSFER", "Inbound transfer from abroad"),
    ("EV_RENT_INCOME", "Rental income without a tax agent"),
    ("EV_ASSIGNMENT_INCOME", "Assignment of claim rights"),
    ("EV_IP_ASSET_SALE", "Sale of intellectual property or other assets"),
    ("EV_CFC_PROFIT", "Profit of a controlled foreign company"),
    ("EV_EMPLOYMENT_INCOME", "Employment income without a tax agent"),
    ("EV_CIVIL_CONTRACT_INCOME", "Civil-contract income without a tax agent"),
    ("EV_DIVIDENDS_KZ", "Domestic dividends without a tax agent"),
    ("EV_INTEREST_KZ", "Domestic interest without a tax agent"),
    ("EV_WINNINGS", "Winnings without a tax agent"),
    ("EV_OTHER_INCOME", "Other income without a tax agent"),
    ("EV_DEDUCTION_STANDARD", "Standard deduction"),
    ("EV_DEDUCTION_OTHER", "Other deduction"),
    ("EV_ADJUSTMENT_EXEMPT", "Exempt-income adjustment"),
    ("EV_ADJUSTMENT_DOUBLE_TAX", "Double-taxation adjustment"),
    ("EV_ADJUSTMENT_CORRECTION", "Correction adjustment"),
    ("EV_ADJUSTMENT_OTHER", "Other adjustment"),
    ("EV_FOREIGN_TAX_PAID_GENERAL", "Foreign tax paid on general income"),
    ("EV_FOREIGN_TAX_PAID_CFC", "Foreign tax paid on CFC profit"),
    ("EV_ASSET_DECLARED", "Declared asset"),
    ("EV_DEBT_DECLARED", "Declared debt"),
];

async fn seed_event_types(db: &DatabaseConnection) -> StoreResult<()> {
    let catalog = CatalogRepository::new(db.clone());
    for (code, description) in EVENT_TYPES {
        catalog.upsert_event_type(code, description).await?;
    }
    Ok(())
}

const LOGICAL_FIELDS: [(&str, &str); 33] = [
    (fields::INCOME_PROPERTY_KZ, "Income from property sales in Kazakhstan"),
    (fields::INCOME_PROPERTY_FOREIGN, "Income from property sales abroad"),
    (fields::INCOME_PROPERTY_VEHICLE, "Income from vehicle sales"),
    (fields::INCOME_PROPERTY_TOTAL, "Property sale income, total"),
    (fields::INCOME_FOREIGN_DIVIDENDS, "Foreign dividends"),
    (fields::INCOME_FOREIGN_INTEREST, "Foreign interest"),
    (fields::INCOME_FOREIGN_ROYALTY, "Foreign royalties"),
    (fields::INCOME_FOREIGN_EMPLOYMENT, "Foreign employment income"),
    (fields::INCOME_FOREIGN_CAPITAL_GAINS, "Foreign capital gains"),
    (fields::INCOME_FOREIGN_RENT, "Foreign rental income"),
    (fields::INCOME_FOREIGN_PENSION, "Foreign pensions"),
    (fields::INCOME_FOREIGN_BUSINESS, "Foreign business income"),
    (fields::INCOME_FOREIGN_OTHER, "Other foreign income"),
    (fields::INCOME_FOREIGN_TOTAL, "Foreign income, total"),
    (fields::DEDUCTION_STANDARD, "Standard deduction"),
    (fields::DEDUCTION_OTHER, "Other deductions"),
    (fields::DEDUCTION_TOTAL, "Deductions, total"),
    (fields::ADJUSTMENT_EXEMPT, "Exempt-income adjustment"),
    (fields::ADJUSTMENT_DOUBLE_TAX, "Double-taxation adjustment"),
    (fields::ADJUSTMENT_CORRECTION, "Correction adjustment"),
    (fields::ADJUSTMENT_OTHER, "Other adjustments"),
    (fields::ADJUSTMENT_TOTAL, "Adjustments, total"),
    (fields::INCOME_EMPLOYMENT_NON_AGENT, "Employment income without a tax agent"),
    (fields::INCOME_CIVIL_CONTRACT_NON_AGENT, "Civil-contract income without a tax agent"),
    (fields::INCOME_DIVIDENDS_NON_AGENT, "Domestic dividends without a tax agent"),
    (fields::INCOME_INTEREST_NON_AGENT, "Domestic interest without a tax agent"),
    (fields::INCOME_WINNINGS_NON_AGENT, "Winnings without a tax agent"),
    (fields::INCOME_OTHER_NON_AGENT, "Other income without a tax agent"),
    (fields::INCOME_RENT_NON_AGENT, "Rental income without a tax agent"),
    (fields::INCOME_ASSIGNMENT, "Assignment of claim rights"),
    (fields::INCOME_IP_OTHER_ASSETS, "Sale of IP and other assets"),
    (fields::INCOME_CFC_PROFIT, "CFC profit"),
    (fields::FOREIGN_TAX_CREDIT_GENERAL, "Foreign tax credit, general income"),
];

/// Fields derived by the engine rather than mapped from events.
const DERIVED_FIELDS: [(&str, &str); 5] = [
    (fields::FOREIGN_TAX_CREDIT_CFC, "Foreign tax credit, CFC profit"),
    (fields::INCOME_TOTAL, "Annual income, total"),
    (fields::TAXABLE_INCOME, "Taxable income"),
    (fields::IPN_CALCULATED, "IPN at the 10% rate"),
    (fields::IPN_PAYABLE, "IPN payable after credits"),
];

async fn seed_logical_fields(db: &DatabaseConnection) -> StoreResult<()> {
    let catalog = CatalogRepository::new(db.clone());
    for (code, description) in LOGICAL_FIELDS.iter().chain(DERIVED_FIELDS.iter()) {
        catalog.upsert_logical_field(code, description).await?;
    }
    Ok(())
}

/// Event type to logical field, one mapping rule each.
const MAPPINGS: [(&str, &str, &str); 25] = [
    ("M270_PROPERTY_KZ", "EV_PROPERTY_SALE_KZ", fields::INCOME_PROPERTY_KZ),
    ("M270_PROPERTY_FOREIGN", "EV_PROPERTY_SALE_FOREIGN", fields::INCOME_PROPERTY_FOREIGN),
    ("M270_VEHICLE", "EV_VEHICLE_SALE", fields::INCOME_PROPERTY_VEHICLE),
    ("M270_FOREIGN_DIVIDENDS", "EV_FOREIGN_DIVIDENDS", fields::INCOME_FOREIGN_DIVIDENDS),
    ("M270_FOREIGN_INTEREST", "EV_FOREIGN_INTEREST", fields::INCOME_FOREIGN_INTEREST),
    ("M270_FOREIGN_ROYALTY", "EV_FOREIGN_ROYALTY", fields::INCOME_FOREIGN_ROYALTY),
    ("M270_FOREIGN_EMPLOYMENT", "EV_FOREIGN_EMPLOYMENT", fields::INCOME_FOREIGN_EMPLOYMENT),
    ("M270_FOREIGN_GAINS", "EV_FOREIGN_CAPITAL_GAINS", fields::INCOME_FOREIGN_CAPITAL_GAINS),
    ("M270_FOREIGN_RENT", "EV_FOREIGN_RENT", fields::INCOME_FOREIGN_RENT),
    ("M270_FOREIGN_PENSION", "EV_FOREIGN_PENSION", fields::INCOME_FOREIGN_PENSION),
    ("M270_FOREIGN_BUSINESS", "EV_FOREIGN_BUSINESS", fields::INCOME_FOREIGN_BUSINESS),
    ("M270_FOREIGN_OTHER", "EV_FOREIGN_OTHER", fields::INCOME_FOREIGN_OTHER),
    ("M270_FOREIGN_TRANSFER", "EV_FOREIGN_TRANSFER", fields::INCOME_FOREIGN_OTHER),
    ("M270_RENT", "EV_RENT_INCOME", fields::INCOME_RENT_NON_AGENT),
    ("M270_ASSIGNMENT", "EV_ASSIGNMENT_INCOME", fields::INCOME_ASSIGNMENT),
    ("M270_IP_ASSETS", "EV_IP_ASSET_SALE", fields::INCOME_IP_OTHER_ASSETS),
    ("M270_CFC", "EV_CFC_PROFIT", fields::INCOME_CFC_PROFIT),
    ("M270_EMPLOYMENT", "EV_EMPLOYMENT_INCOME", fields::INCOME_EMPLOYMENT_NON_AGENT),
    ("M270_CIVIL", "EV_CIVIL_CONTRACT_INCOME", fields::INCOME_CIVIL_CONTRACT_NON_AGENT),
    ("M270_DIVIDENDS_KZ", "EV_DIVIDENDS_KZ", fields::INCOME_DIVIDENDS_NON_AGENT),
    ("M270_INTEREST_KZ", "EV_INTEREST_KZ", fields::INCOME_INTEREST_NON_AGENT),
    ("M270_WINNINGS", "EV_WINNINGS", fields::INCOME_WINNINGS_NON_AGENT),
    ("M270_OTHER", "EV_OTHER_INCOME", fields::INCOME_OTHER_NON_AGENT),
    ("M270_DEDUCTION_STANDARD", "EV_DEDUCTION_STANDARD", fields::DEDUCTION_STANDARD),
    ("M270_DEDUCTION_OTHER", "EV_DEDUCTION_OTHER", fields::DEDUCTION_OTHER),
];

const ADJUSTMENT_MAPPINGS: [(&str, &str, &str); 6] = [
    ("M270_ADJ_EXEMPT", "EV_ADJUSTMENT_EXEMPT", fields::ADJUSTMENT_EXEMPT),
    ("M270_ADJ_DOUBLE", "EV_ADJUSTMENT_DOUBLE_TAX", fields::ADJUSTMENT_DOUBLE_TAX),
    ("M270_ADJ_CORRECTION", "EV_ADJUSTMENT_CORRECTION", fields::ADJUSTMENT_CORRECTION),
    ("M270_ADJ_OTHER", "EV_ADJUSTMENT_OTHER", fields::ADJUSTMENT_OTHER),
    ("M270_CREDIT_GENERAL", "EV_FOREIGN_TAX_PAID_GENERAL", fields::FOREIGN_TAX_CREDIT_GENERAL),
    ("M270_CREDIT_CFC", "EV_FOREIGN_TAX_PAID_CFC", fields::FOREIGN_TAX_CREDIT_CFC),
];

async fn rule_exists(db: &DatabaseConnection, rule_code: &str) -> StoreResult<bool> {
    Ok(tax_rules::Entity::find()
        .filter(tax_rules::Column::RuleCode.eq(rule_code))
        .one(db)
        .await?
        .is_some())
}

async fn seed_rules(db: &DatabaseConnection) -> StoreResult<()> {
    let catalog = CatalogRepository::new(db.clone());

    // Bank statement debits are outgoing money, not income.
    if !rule_exists(db, "X270_BANK_DEBIT").await? {
        catalog
            .insert_rule(CreateRuleInput {
                rule_code: "X270_BANK_DEBIT".to_string(),
                tax_year: None,
                kind: RuleKind::Exclusion,
                conditions: json!({"all": [
                    {"event_type": {"eq": "EV_OTHER_INCOME"}},
                    {"metadata.direction": {"eq": "debit"}}
                ]}),
                actions: json!([{"type": "exclude"}]),
                priority: 10,
                active: true,
            })
            .await?;
    }

    let mut priority = 100;
    for (code, event_type, target) in MAPPINGS.iter().chain(ADJUSTMENT_MAPPINGS.iter()) {
        if !rule_exists(db, code).await? {
            catalog
                .insert_rule(CreateRuleInput {
                    rule_code: (*code).to_string(),
                    tax_year: None,
                    kind: RuleKind::Mapping,
                    conditions: json!({"event_type": {"eq": event_type}}),
                    actions: json!([{"type": "map", "target": target}]),
                    priority,
                    active: true,
                })
                .await?;
        }
        priority += 10;
    }

    // The statutory chain; the engine derives the same values when a
    // year's catalog omits these.
    let calculations: [(&str, i32, serde_json::Value); 3] = [
        (
            "C270_TAXABLE",
            300,
            json!([{
                "type": "calc",
                "target": fields::TAXABLE_INCOME,
                "formula": {"op": "max", "refs": [{
                    "op": "sub",
                    "a": {"op": "sub", "a": fields::INCOME_TOTAL, "b": fields::ADJUSTMENT_TOTAL},
                    "b": fields::DEDUCTION_TOTAL
                }]}
            }]),
        ),
        (
            "C270_IPN",
            310,
            json!([{
                "type": "calc",
                "target": fields::IPN_CALCULATED,
                "formula": {"op": "percent", "a": fields::TAXABLE_INCOME, "b": 10},
                "round": 0
            }]),
        ),
        (
            "C270_PAYABLE",
            320,
            json!([{
                "type": "calc",
                "target": fields::IPN_PAYABLE,
                "formula": {"op": "max", "refs": [{
                    "op": "sub",
                    "a": {"op": "sub", "a": fields::IPN_CALCULATED, "b": fields::FOREIGN_TAX_CREDIT_GENERAL},
                    "b": fields::FOREIGN_TAX_CREDIT_CFC
                }]}
            }]),
        ),
    ];
    for (code, priority, actions) in calculations {
        if !rule_exists(db, code).await? {
            catalog
                .insert_rule(CreateRuleInput {
                    rule_code: code.to_string(),
                    tax_year: None,
                    kind: RuleKind::Calculation,
                    conditions: json!({"always": true}),
                    actions,
                    priority,
                    active: true,
                })
                .await?;
        }
    }

    Ok(())
}

/// Header fields of application 00, filled from declaration attributes.
const HEADER_FIELDS: [&str; 19] = [
    "iin",
    "period_year",
    "fio1",
    "fio2",
    "fio3",
    "email",
    "payer_phone_number",
    "date_fill",
    "dt_main",
    "dt_regular",
    "dt_additional",
    "dt_notice",
    "pril_1",
    "pril_2",
    "pril_3",
    "pril_4",
    "pril_5",
    "pril_6",
    "pril_7",
];

const APP_01_FIELDS: [(&str, &str); 11] = [
    ("field_270_01_A", fields::INCOME_PROPERTY_TOTAL),
    ("field_270_01_B", fields::INCOME_RENT_NON_AGENT),
    ("field_270_01_C", fields::INCOME_FOREIGN_TOTAL),
    ("field_270_01_D", fields::INCOME_TOTAL),
    ("field_270_01_E", fields::ADJUSTMENT_TOTAL),
    ("field_270_01_F", fields::DEDUCTION_TOTAL),
    ("field_270_01_G", fields::TAXABLE_INCOME),
    ("field_270_01_H", fields::IPN_CALCULATED),
    ("field_270_01_I", fields::FOREIGN_TAX_CREDIT_GENERAL),
    ("field_270_01_J", fields::FOREIGN_TAX_CREDIT_CFC),
    ("field_270_01_K", fields::IPN_PAYABLE),
];

const APP_02_FIELDS: [(&str, &str); 10] = [
    ("field_270_02_A", fields::INCOME_FOREIGN_DIVIDENDS),
    ("field_270_02_B", fields::INCOME_FOREIGN_INTEREST),
    ("field_270_02_C", fields::INCOME_FOREIGN_ROYALTY),
    ("field_270_02_D", fields::INCOME_FOREIGN_EMPLOYMENT),
    ("field_270_02_E", fields::INCOME_FOREIGN_CAPITAL_GAINS),
    ("field_270_02_F", fields::INCOME_FOREIGN_RENT),
    ("field_270_02_G", fields::INCOME_FOREIGN_PENSION),
    ("field_270_02_H", fields::INCOME_FOREIGN_BUSINESS),
    ("field_270_02_I", fields::INCOME_FOREIGN_OTHER),
    ("field_270_02_J", fields::INCOME_FOREIGN_TOTAL),
];

const APP_03_FIELDS: [(&str, &str); 2] = [
    ("field_270_03_A", fields::INCOME_CFC_PROFIT),
    ("field_270_03_B", fields::FOREIGN_TAX_CREDIT_CFC),
];

async fn seed_field_map(db: &DatabaseConnection) -> StoreResult<()> {
    let catalog = CatalogRepository::new(db.clone());
    let form = "270.00";

    let mut sort = 1;
    for name in HEADER_FIELDS {
        catalog
            .upsert_field_map_row(form, "00", None, name, sort)
            .await?;
        sort += 1;
    }
    for (name, field) in APP_01_FIELDS {
        catalog
            .upsert_field_map_row(form, "01", Some(field), name, sort)
            .await?;
        sort += 1;
    }
    for (name, field) in APP_02_FIELDS {
        catalog
            .upsert_field_map_row(form, "02", Some(field), name, sort)
            .await?;
        sort += 1;
    }
    for (name, field) in APP_03_FIELDS {
        catalog
            .upsert_field_map_row(form, "03", Some(field), name, sort)
            .await?;
        sort += 1;
    }
    // Registers 270.04-270.07 are fixed 3x3 grids emitted as empty
    // placeholders until their source modules are wired in.
    for application in ["04", "05", "06", "07"] {
        for row in 1..=3 {
            for column in ["A", "B", "C"] {
                let name = format!("field_270_{application}_{column}_{row}");
                catalog
                    .upsert_field_map_row(form, application, None, &name, sort)
                    .await?;
                sort += 1;
            }
        }
    }
    Ok(())
}
