//! `SeaORM` Entity for the tax_mappings table.
//!
//! One row per `map` action firing in an engine run.

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Eq, Serialize, Deserialize)]
#[sea_orm(table_name = "tax_mappings")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,
    pub tax_event_id: Uuid,
    pub tax_year: i32,
    pub logical_field: String,
    pub amount: String,
    pub rule_id: Uuid,
    pub created_at: DateTimeWithTimeZone,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "super::tax_events::Entity",
        from = "Column::TaxEventId",
        to = "super::tax_events::Column::Id"
    )]
    TaxEvents,
}

impl Related<super::tax_events::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::TaxEvents.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
