//! `SeaORM` Entity for the tax_events table.
//!
//! Amounts are stored as exact decimal strings; repositories expose
//! `Decimal`.

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Eq, Serialize, Deserialize)]
#[sea_orm(table_name = "tax_events")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,
    pub taxpayer_id: Uuid,
    pub source_record_id: Option<Uuid>,
    pub event_type: String,
    pub event_date: Date,
    pub amount: Option<String>,
    pub currency: Option<String>,
    pub metadata: Json,
    pub tax_year: i32,
    pub active: bool,
    pub created_at: DateTimeWithTimeZone,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "super::taxpayers::Entity",
        from = "Column::TaxpayerId",
        to = "super::taxpayers::Column::Id"
    )]
    Taxpayers,
    #[sea_orm(
        belongs_to = "super::source_records::Entity",
        from = "Column::SourceRecordId",
        to = "super::source_records::Column::Id"
    )]
    SourceRecords,
}

impl Related<super::taxpayers::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Taxpayers.def()
    }
}

impl Related<super::source_records::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::SourceRecords.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
