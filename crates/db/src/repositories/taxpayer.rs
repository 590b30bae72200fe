//! Taxpayer registry repository.

use chrono::Utc;
use sea_orm::{ActiveModelTrait, ColumnTrait, DatabaseConnection, EntityTrait, QueryFilter, Set};
use uuid::Uuid;

use salyq_core::declaration::SnapshotHeader;
use salyq_shared::types::Iin;

use crate::entities::taxpayers;
use crate::error::{StoreError, StoreResult};

/// Input for registering a taxpayer.
#[derive(Debug, Clone)]
pub struct CreateTaxpayerInput {
    /// Validated identifier.
    pub iin: Iin,
    /// `individual` or `business`.
    pub kind: String,
    /// Last name.
    pub last_name: Option<String>,
    /// First name.
    pub first_name: Option<String>,
    /// Middle name.
    pub middle_name: Option<String>,
    /// Contact phone.
    pub phone: Option<String>,
    /// Contact email.
    pub email: Option<String>,
    /// Tax residency.
    pub is_resident: bool,
}

/// Taxpayer repository.
#[derive(Debug, Clone)]
pub struct TaxpayerRepository {
    db: DatabaseConnection,
}

impl TaxpayerRepository {
    /// Creates a new taxpayer repository.
    #[must_use]
    pub const fn new(db: DatabaseConnection) -> Self {
        Self { db }
    }

    /// Registers a taxpayer. Identity is immutable once created.
    ///
    /// # Errors
    ///
    /// Returns `Conflict` for a duplicate IIN or an unknown kind.
    pub async fn create(&self, input: CreateTaxpayerInput) -> StoreResult<taxpayers::Model> {
        if input.kind != "individual" && input.kind != "business" {
            return Err(StoreError::Conflict(format!(
                "unknown taxpayer kind: {}",
                input.kind
            )));
        }
        let existing = taxpayers::Entity::find()
            .filter(taxpayers::Column::Iin.eq(input.iin.as_str()))
            .one(&self.db)
            .await?;
        if existing.is_some() {
            return Err(StoreError::Conflict(format!(
                "taxpayer with IIN {} already exists",
                input.iin
            )));
        }

        let now = Utc::now().into();
        let model = taxpayers::ActiveModel {
            id: Set(Uuid::now_v7()),
            iin: Set(input.iin.as_str().to_string()),
            kind: Set(input.kind),
            last_name: Set(input.last_name),
            first_name: Set(input.first_name),
            middle_name: Set(input.middle_name),
            phone: Set(input.phone),
            email: Set(input.email),
            is_resident: Set(input.is_resident),
            created_at: Set(now),
            updated_at: Set(now),
        };
        Ok(model.insert(&self.db).await?)
    }

    /// Finds a taxpayer by ID.
    ///
    /// # Errors
    ///
    /// Returns `NotFound` if the taxpayer does not exist.
    pub async fn find_by_id(&self, id: Uuid) -> StoreResult<taxpayers::Model> {
        taxpayers::Entity::find_by_id(id)
            .one(&self.db)
            .await?
            .ok_or_else(|| StoreError::NotFound(format!("taxpayer {id}")))
    }

    /// Finds a taxpayer by IIN.
    ///
    /// # Errors
    ///
    /// Returns an error if the database query fails.
    pub async fn find_by_iin(&self, iin: &Iin) -> StoreResult<Option<taxpayers::Model>> {
        Ok(taxpayers::Entity::find()
            .filter(taxpayers::Column::Iin.eq(iin.as_str()))
            .one(&self.db)
            .await?)
    }

    /// Builds the declaration snapshot header from a taxpayer row.
    #[must_use]
    pub fn snapshot_header(taxpayer: &taxpayers::Model) -> SnapshotHeader {
        SnapshotHeader {
            iin: taxpayer.iin.clone(),
            last_name: taxpayer.last_name.clone(),
            first_name: taxpayer.first_name.clone(),
            middle_name: taxpayer.middle_name.clone(),
            phone: taxpayer.phone.clone(),
            email: taxpayer.email.clone(),
            spouse_iin: None,
            legal_rep_iin: None,
        }
    }
}
