//! `SeaORM` Entity for the declarations table.
//!
//! Carries the workflow status, the snapshot header copied from the
//! taxpayer at generation, and the flag map.

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Eq, Serialize, Deserialize)]
#[sea_orm(table_name = "declarations")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,
    pub taxpayer_id: Uuid,
    pub tax_year: i32,
    pub form_code: String,
    pub kind: String,
    pub status: String,
    pub iin: String,
    pub last_name: Option<String>,
    pub first_name: Option<String>,
    pub middle_name: Option<String>,
    pub phone: Option<String>,
    pub email: Option<String>,
    pub spouse_iin: Option<String>,
    pub legal_rep_iin: Option<String>,
    pub flags: Json,
    pub validated_at: Option<DateTimeWithTimeZone>,
    pub exported_at: Option<DateTimeWithTimeZone>,
    pub created_at: DateTimeWithTimeZone,
    pub updated_at: DateTimeWithTimeZone,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "super::taxpayers::Entity",
        from = "Column::TaxpayerId",
        to = "super::taxpayers::Column::Id"
    )]
    Taxpayers,
    #[sea_orm(has_many = "super::declaration_items::Entity")]
    DeclarationItems,
    #[sea_orm(has_many = "super::xml_exports::Entity")]
    XmlExports,
}

impl Related<super::taxpayers::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Taxpayers.def()
    }
}

impl Related<super::declaration_items::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::DeclarationItems.def()
    }
}

impl Related<super::xml_exports::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::XmlExports.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
