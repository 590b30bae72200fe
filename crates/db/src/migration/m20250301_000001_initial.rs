//! Initial database migration.
//!
//! Creates the taxpayer registry, the append-only ingestion tables, the
//! rule catalog, and the declaration tables with their uniqueness
//! constraints.

use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(Taxpayers::Table)
                    .col(ColumnDef::new(Taxpayers::Id).uuid().not_null().primary_key())
                    .col(ColumnDef::new(Taxpayers::Iin).string_len(12).not_null())
                    .col(ColumnDef::new(Taxpayers::Kind).string_len(16).not_null())
                    .col(ColumnDef::new(Taxpayers::LastName).string())
                    .col(ColumnDef::new(Taxpayers::FirstName).string())
                    .col(ColumnDef::new(Taxpayers::MiddleName).string())
                    .col(ColumnDef::new(Taxpayers::Phone).string())
                    .col(ColumnDef::new(Taxpayers::Email).string())
                    .col(ColumnDef::new(Taxpayers::IsResident).boolean().not_null())
                    .col(
                        ColumnDef::new(Taxpayers::CreatedAt)
                            .timestamp_with_time_zone()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(Taxpayers::UpdatedAt)
                            .timestamp_with_time_zone()
                            .not_null(),
                    )
                    .to_owned(),
            )
            .await?;
        manager
            .create_index(
                Index::create()
                    .name("ux_taxpayers_iin")
                    .table(Taxpayers::Table)
                    .col(Taxpayers::Iin)
                    .unique()
                    .to_owned(),
            )
            .await?;

        manager
            .create_table(
                Table::create()
                    .table(SourceRecords::Table)
                    .col(
                        ColumnDef::new(SourceRecords::Id)
                            .uuid()
                            .not_null()
                            .primary_key(),
                    )
                    .col(ColumnDef::new(SourceRecords::TaxpayerId).uuid().not_null())
                    .col(
                        ColumnDef::new(SourceRecords::SourceKind)
                            .string_len(16)
                            .not_null(),
                    )
                    .col(ColumnDef::new(SourceRecords::ExternalId).string())
                    .col(
                        ColumnDef::new(SourceRecords::Checksum)
                            .string_len(64)
                            .not_null(),
                    )
                    .col(ColumnDef::new(SourceRecords::RawPayload).json().not_null())
                    .col(
                        ColumnDef::new(SourceRecords::ImportedAt)
                            .timestamp_with_time_zone()
                            .not_null(),
                    )
                    .col(ColumnDef::new(SourceRecords::Active).boolean().not_null())
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_source_records_taxpayer")
                            .from(SourceRecords::Table, SourceRecords::TaxpayerId)
                            .to(Taxpayers::Table, Taxpayers::Id),
                    )
                    .to_owned(),
            )
            .await?;
        manager
            .create_index(
                Index::create()
                    .name("ux_source_records_taxpayer_checksum")
                    .table(SourceRecords::Table)
                    .col(SourceRecords::TaxpayerId)
                    .col(SourceRecords::Checksum)
                    .unique()
                    .to_owned(),
            )
            .await?;

        manager
            .create_table(
                Table::create()
                    .table(TaxEventTypes::Table)
                    .col(
                        ColumnDef::new(TaxEventTypes::Code)
                            .string_len(64)
                            .not_null()
                            .primary_key(),
                    )
                    .col(ColumnDef::new(TaxEventTypes::Description).string().not_null())
                    .to_owned(),
            )
            .await?;

        manager
            .create_table(
                Table::create()
                    .table(LogicalFields::Table)
                    .col(
                        ColumnDef::new(LogicalFields::Code)
                            .string_len(64)
                            .not_null()
                            .primary_key(),
                    )
                    .col(ColumnDef::new(LogicalFields::Description).string().not_null())
                    .to_owned(),
            )
            .await?;

        manager
            .create_table(
                Table::create()
                    .table(TaxEvents::Table)
                    .col(ColumnDef::new(TaxEvents::Id).uuid().not_null().primary_key())
                    .col(ColumnDef::new(TaxEvents::TaxpayerId).uuid().not_null())
                    .col(ColumnDef::new(TaxEvents::SourceRecordId).uuid())
                    .col(ColumnDef::new(TaxEvents::EventType).string_len(64).not_null())
                    .col(ColumnDef::new(TaxEvents::EventDate).date().not_null())
                    .col(ColumnDef::new(TaxEvents::Amount).string())
                    .col(ColumnDef::new(TaxEvents::Currency).string_len(3))
                    .col(ColumnDef::new(TaxEvents::Metadata).json().not_null())
                    .col(ColumnDef::new(TaxEvents::TaxYear).integer().not_null())
                    .col(ColumnDef::new(TaxEvents::Active).boolean().not_null())
                    .col(
                        ColumnDef::new(TaxEvents::CreatedAt)
                            .timestamp_with_time_zone()
                            .not_null(),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_tax_events_taxpayer")
                            .from(TaxEvents::Table, TaxEvents::TaxpayerId)
                            .to(Taxpayers::Table, Taxpayers::Id),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_tax_events_source_record")
                            .from(TaxEvents::Table, TaxEvents::SourceRecordId)
                            .to(SourceRecords::Table, SourceRecords::Id),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_tax_events_event_type")
                            .from(TaxEvents::Table, TaxEvents::EventType)
                            .to(TaxEventTypes::Table, TaxEventTypes::Code),
                    )
                    .to_owned(),
            )
            .await?;
        manager
            .create_index(
                Index::create()
                    .name("ix_tax_events_taxpayer_year")
                    .table(TaxEvents::Table)
                    .col(TaxEvents::TaxpayerId)
                    .col(TaxEvents::TaxYear)
                    .to_owned(),
            )
            .await?;

        manager
            .create_table(
                Table::create()
                    .table(TaxRules::Table)
                    .col(ColumnDef::new(TaxRules::Id).uuid().not_null().primary_key())
                    .col(ColumnDef::new(TaxRules::RuleCode).string_len(64).not_null())
                    .col(ColumnDef::new(TaxRules::TaxYear).integer())
                    .col(ColumnDef::new(TaxRules::RuleType).string_len(16).not_null())
                    .col(ColumnDef::new(TaxRules::Conditions).json().not_null())
                    .col(ColumnDef::new(TaxRules::Actions).json().not_null())
                    .col(ColumnDef::new(TaxRules::Priority).integer().not_null())
                    .col(ColumnDef::new(TaxRules::Active).boolean().not_null())
                    .col(
                        ColumnDef::new(TaxRules::CreatedAt)
                            .timestamp_with_time_zone()
                            .not_null(),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_table(
                Table::create()
                    .table(TaxMappings::Table)
                    .col(ColumnDef::new(TaxMappings::Id).uuid().not_null().primary_key())
                    .col(ColumnDef::new(TaxMappings::TaxEventId).uuid().not_null())
                    .col(ColumnDef::new(TaxMappings::TaxYear).integer().not_null())
                    .col(
                        ColumnDef::new(TaxMappings::LogicalField)
                            .string_len(64)
                            .not_null(),
                    )
                    .col(ColumnDef::new(TaxMappings::Amount).string().not_null())
                    .col(ColumnDef::new(TaxMappings::RuleId).uuid().not_null())
                    .col(
                        ColumnDef::new(TaxMappings::CreatedAt)
                            .timestamp_with_time_zone()
                            .not_null(),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_tax_mappings_event")
                            .from(TaxMappings::Table, TaxMappings::TaxEventId)
                            .to(TaxEvents::Table, TaxEvents::Id),
                    )
                    .to_owned(),
            )
            .await?;
        manager
            .create_index(
                Index::create()
                    .name("ix_tax_mappings_year")
                    .table(TaxMappings::Table)
                    .col(TaxMappings::TaxYear)
                    .to_owned(),
            )
            .await?;

        manager
            .create_table(
                Table::create()
                    .table(Declarations::Table)
                    .col(ColumnDef::new(Declarations::Id).uuid().not_null().primary_key())
                    .col(ColumnDef::new(Declarations::TaxpayerId).uuid().not_null())
                    .col(ColumnDef::new(Declarations::TaxYear).integer().not_null())
                    .col(ColumnDef::new(Declarations::FormCode).string_len(8).not_null())
                    .col(ColumnDef::new(Declarations::Kind).string_len(16).not_null())
                    .col(ColumnDef::new(Declarations::Status).string_len(24).not_null())
                    .col(ColumnDef::new(Declarations::Iin).string_len(12).not_null())
                    .col(ColumnDef::new(Declarations::LastName).string())
                    .col(ColumnDef::new(Declarations::FirstName).string())
                    .col(ColumnDef::new(Declarations::MiddleName).string())
                    .col(ColumnDef::new(Declarations::Phone).string())
                    .col(ColumnDef::new(Declarations::Email).string())
                    .col(ColumnDef::new(Declarations::SpouseIin).string())
                    .col(ColumnDef::new(Declarations::LegalRepIin).string())
                    .col(ColumnDef::new(Declarations::Flags).json().not_null())
                    .col(ColumnDef::new(Declarations::ValidatedAt).timestamp_with_time_zone())
                    .col(ColumnDef::new(Declarations::ExportedAt).timestamp_with_time_zone())
                    .col(
                        ColumnDef::new(Declarations::CreatedAt)
                            .timestamp_with_time_zone()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(Declarations::UpdatedAt)
                            .timestamp_with_time_zone()
                            .not_null(),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_declarations_taxpayer")
                            .from(Declarations::Table, Declarations::TaxpayerId)
                            .to(Taxpayers::Table, Taxpayers::Id),
                    )
                    .to_owned(),
            )
            .await?;
        manager
            .create_index(
                Index::create()
                    .name("ux_declarations_taxpayer_year_form")
                    .table(Declarations::Table)
                    .col(Declarations::TaxpayerId)
                    .col(Declarations::TaxYear)
                    .col(Declarations::FormCode)
                    .unique()
                    .to_owned(),
            )
            .await?;

        manager
            .create_table(
                Table::create()
                    .table(DeclarationItems::Table)
                    .col(
                        ColumnDef::new(DeclarationItems::Id)
                            .uuid()
                            .not_null()
                            .primary_key(),
                    )
                    .col(
                        ColumnDef::new(DeclarationItems::DeclarationId)
                            .uuid()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(DeclarationItems::LogicalField)
                            .string_len(64)
                            .not_null(),
                    )
                    .col(ColumnDef::new(DeclarationItems::Value).string().not_null())
                    .col(ColumnDef::new(DeclarationItems::Source).string_len(16).not_null())
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_declaration_items_declaration")
                            .from(DeclarationItems::Table, DeclarationItems::DeclarationId)
                            .to(Declarations::Table, Declarations::Id),
                    )
                    .to_owned(),
            )
            .await?;
        manager
            .create_index(
                Index::create()
                    .name("ux_declaration_items_declaration_field")
                    .table(DeclarationItems::Table)
                    .col(DeclarationItems::DeclarationId)
                    .col(DeclarationItems::LogicalField)
                    .unique()
                    .to_owned(),
            )
            .await?;

        manager
            .create_table(
                Table::create()
                    .table(ValidationReports::Table)
                    .col(
                        ColumnDef::new(ValidationReports::Id)
                            .uuid()
                            .not_null()
                            .primary_key(),
                    )
                    .col(
                        ColumnDef::new(ValidationReports::DeclarationId)
                            .uuid()
                            .not_null(),
                    )
                    .col(ColumnDef::new(ValidationReports::Kind).string_len(16).not_null())
                    .col(ColumnDef::new(ValidationReports::IsValid).boolean().not_null())
                    .col(ColumnDef::new(ValidationReports::Report).json().not_null())
                    .col(
                        ColumnDef::new(ValidationReports::CreatedAt)
                            .timestamp_with_time_zone()
                            .not_null(),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_validation_reports_declaration")
                            .from(ValidationReports::Table, ValidationReports::DeclarationId)
                            .to(Declarations::Table, Declarations::Id),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_table(
                Table::create()
                    .table(XmlFieldMap::Table)
                    .col(ColumnDef::new(XmlFieldMap::Id).uuid().not_null().primary_key())
                    .col(ColumnDef::new(XmlFieldMap::FormCode).string_len(8).not_null())
                    .col(
                        ColumnDef::new(XmlFieldMap::ApplicationCode)
                            .string_len(2)
                            .not_null(),
                    )
                    .col(ColumnDef::new(XmlFieldMap::LogicalField).string_len(64))
                    .col(
                        ColumnDef::new(XmlFieldMap::XmlFieldName)
                            .string_len(64)
                            .not_null(),
                    )
                    .col(ColumnDef::new(XmlFieldMap::SortOrder).integer().not_null())
                    .to_owned(),
            )
            .await?;
        manager
            .create_index(
                Index::create()
                    .name("ux_xml_field_map_form_app_name")
                    .table(XmlFieldMap::Table)
                    .col(XmlFieldMap::FormCode)
                    .col(XmlFieldMap::ApplicationCode)
                    .col(XmlFieldMap::XmlFieldName)
                    .unique()
                    .to_owned(),
            )
            .await?;

        manager
            .create_table(
                Table::create()
                    .table(XmlExports::Table)
                    .col(ColumnDef::new(XmlExports::Id).uuid().not_null().primary_key())
                    .col(ColumnDef::new(XmlExports::DeclarationId).uuid().not_null())
                    .col(ColumnDef::new(XmlExports::Payload).text().not_null())
                    .col(ColumnDef::new(XmlExports::SchemaVersion).integer().not_null())
                    .col(
                        ColumnDef::new(XmlExports::ContentHash)
                            .string_len(64)
                            .not_null(),
                    )
                    .col(ColumnDef::new(XmlExports::Signed).boolean().not_null())
                    .col(
                        ColumnDef::new(XmlExports::CreatedAt)
                            .timestamp_with_time_zone()
                            .not_null(),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_xml_exports_declaration")
                            .from(XmlExports::Table, XmlExports::DeclarationId)
                            .to(Declarations::Table, Declarations::Id),
                    )
                    .to_owned(),
            )
            .await?;

        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        for table in [
            "xml_exports",
            "xml_field_map",
            "validation_reports",
            "declaration_items",
            "declarations",
            "tax_mappings",
            "tax_rules",
            "tax_events",
            "logical_fields",
            "tax_event_types",
            "source_records",
            "taxpayers",
        ] {
            manager
                .drop_table(Table::drop().table(Alias::new(table)).to_owned())
                .await?;
        }
        Ok(())
    }
}

#[derive(DeriveIden)]
enum Taxpayers {
    Table,
    Id,
    Iin,
    Kind,
    LastName,
    FirstName,
    MiddleName,
    Phone,
    Email,
    IsResident,
    CreatedAt,
    UpdatedAt,
}

#[derive(DeriveIden)]
enum SourceRecords {
    Table,
    Id,
    TaxpayerId,
    SourceKind,
    ExternalId,
    Checksum,
    RawPayload,
    ImportedAt,
    Active,
}

#[derive(DeriveIden)]
enum TaxEventTypes {
    Table,
    Code,
    Description,
}

#[derive(DeriveIden)]
enum LogicalFields {
    Table,
    Code,
    Description,
}

#[derive(DeriveIden)]
enum TaxEvents {
    Table,
    Id,
    TaxpayerId,
    SourceRecordId,
    EventType,
    EventDate,
    Amount,
    Currency,
    Metadata,
    TaxYear,
    Active,
    CreatedAt,
}

#[derive(DeriveIden)]
enum TaxRules {
    Table,
    Id,
    RuleCode,
    TaxYear,
    RuleType,
    Conditions,
    Actions,
    Priority,
    Active,
    CreatedAt,
}

#[derive(DeriveIden)]
enum TaxMappings {
    Table,
    Id,
    TaxEventId,
    TaxYear,
    LogicalField,
    Amount,
    RuleId,
    CreatedAt,
}

#[derive(DeriveIden)]
enum Declarations {
    Table,
    Id,
    TaxpayerId,
    TaxYear,
    FormCode,
    Kind,
    Status,
    Iin,
    LastName,
    FirstName,
    MiddleName,
    Phone,
    Email,
    SpouseIin,
    LegalRepIin,
    Flags,
    ValidatedAt,
    ExportedAt,
    CreatedAt,
    UpdatedAt,
}

#[derive(DeriveIden)]
enum DeclarationItems {
    Table,
    Id,
    DeclarationId,
    LogicalField,
    Value,
    Source,
}

#[derive(DeriveIden)]
enum ValidationReports {
    Table,
    Id,
    DeclarationId,
    Kind,
    IsValid,
    Report,
    CreatedAt,
}

#[derive(DeriveIden)]
enum XmlFieldMap {
    Table,
    Id,
    FormCode,
    ApplicationCode,
    LogicalField,
    XmlFieldName,
    SortOrder,
}

#[derive(DeriveIden)]
enum XmlExports {
    Table,
    Id,
    DeclarationId,
    Payload,
    SchemaVersion,
    ContentHash,
    Signed,
    CreatedAt,
}
