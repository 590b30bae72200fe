//! `SeaORM` Entity for the source_records table.

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Eq, Serialize, Deserialize)]
#[sea_orm(table_name = "source_records")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,
    pub taxpayer_id: Uuid,
    pub source_kind: String,
    pub external_id: Option<String>,
    pub checksum: String,
    pub raw_payload: Json,
    pub imported_at: DateTimeWithTimeZone,
    pub active: bool,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "super::taxpayers::Entity",
        from = "Column::TaxpayerId",
        to = "super::taxpayers::Column::Id"
    )]
    Taxpayers,
    #[sea_orm(has_many = "super::tax_events::Entity")]
    TaxEvents,
}

impl Related<super::taxpayers::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Taxpayers.def()
    }
}

impl Related<super::tax_events::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::TaxEvents.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
