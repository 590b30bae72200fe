//! `SeaORM` Entity for the xml_field_map reference table.
//!
//! `sort_order` fixes the emission order within an application; a null
//! `logical_field` marks a header field filled from declaration
//! attributes.

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Eq, Serialize, Deserialize)]
#[sea_orm(table_name = "xml_field_map")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,
    pub form_code: String,
    pub application_code: String,
    pub logical_field: Option<String>,
    pub xml_field_name: String,
    pub sort_order: i32,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}
