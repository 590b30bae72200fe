//! Source record repository: checksum-idempotent ingestion.

use chrono::Utc;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, DatabaseConnection, EntityTrait, QueryFilter, QueryOrder, Set,
};
use serde_json::Value;
use sha2::{Digest, Sha256};
use uuid::Uuid;

use salyq_core::events::SourceKind;

use crate::entities::{source_records, tax_events};
use crate::error::{StoreError, StoreResult};

/// Serializes a JSON value with object keys sorted at every level.
///
/// The checksum must not depend on the key order the client happened to
/// send, so canonicalization is explicit rather than relying on map
/// implementation details.
#[must_use]
pub fn canonical_json(value: &Value) -> String {
    let mut out = String::new();
    write_canonical(value, &mut out);
    out
}

fn write_canonical(value: &Value, out: &mut String) {
    match value {
        Value::Object(map) => {
            let mut keys: Vec<&String> = map.keys().collect();
            keys.sort();
            out.push('{');
            for (position, key) in keys.iter().enumerate() {
                if position > 0 {
                    out.push(',');
                }
                out.push_str(&Value::String((*key).clone()).to_string());
                out.push(':');
                write_canonical(&map[*key], out);
            }
            out.push('}');
        }
        Value::Array(items) => {
            out.push('[');
            for (position, item) in items.iter().enumerate() {
                if position > 0 {
                    out.push(',');
                }
                write_canonical(item, out);
            }
            out.push(']');
        }
        scalar => out.push_str(&scalar.to_string()),
    }
}

/// Hex SHA-256 over the canonical JSON of a payload.
#[must_use]
pub fn payload_checksum(payload: &Value) -> String {
    hex::encode(Sha256::digest(canonical_json(payload).as_bytes()))
}

/// Source record repository.
#[derive(Debug, Clone)]
pub struct SourceRecordRepository {
    db: DatabaseConnection,
}

impl SourceRecordRepository {
    /// Creates a new source record repository.
    #[must_use]
    pub const fn new(db: DatabaseConnection) -> Self {
        Self { db }
    }

    /// Ingests a payload at most once per (taxpayer, checksum).
    ///
    /// Returns the record and whether it was created by this call; a
    /// repeated payload returns the prior row untouched.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    pub async fn ingest(
        &self,
        taxpayer_id: Uuid,
        source_kind: SourceKind,
        external_id: Option<String>,
        payload: Value,
    ) -> StoreResult<(source_records::Model, bool)> {
        let checksum = payload_checksum(&payload);
        if let Some(existing) = self.find_by_checksum(taxpayer_id, &checksum).await? {
            return Ok((existing, false));
        }

        let model = source_records::ActiveModel {
            id: Set(Uuid::now_v7()),
            taxpayer_id: Set(taxpayer_id),
            source_kind: Set(source_kind.as_str().to_string()),
            external_id: Set(external_id),
            checksum: Set(checksum.clone()),
            raw_payload: Set(payload),
            imported_at: Set(Utc::now().into()),
            active: Set(true),
        };
        match model.insert(&self.db).await {
            Ok(inserted) => Ok((inserted, true)),
            // A concurrent writer may have hit the unique constraint
            // first; the prior row wins.
            Err(err) => match self.find_by_checksum(taxpayer_id, &checksum).await? {
                Some(existing) => Ok((existing, false)),
                None => Err(err.into()),
            },
        }
    }

    async fn find_by_checksum(
        &self,
        taxpayer_id: Uuid,
        checksum: &str,
    ) -> StoreResult<Option<source_records::Model>> {
        Ok(source_records::Entity::find()
            .filter(source_records::Column::TaxpayerId.eq(taxpayer_id))
            .filter(source_records::Column::Checksum.eq(checksum))
            .one(&self.db)
            .await?)
    }

    /// Finds a source record by ID.
    ///
    /// # Errors
    ///
    /// Returns `NotFound` if the record does not exist.
    pub async fn find_by_id(&self, id: Uuid) -> StoreResult<source_records::Model> {
        source_records::Entity::find_by_id(id)
            .one(&self.db)
            .await?
            .ok_or_else(|| StoreError::NotFound(format!("source record {id}")))
    }

    /// Lists a taxpayer's source records, newest first.
    ///
    /// # Errors
    ///
    /// Returns an error if the database query fails.
    pub async fn list_for_taxpayer(
        &self,
        taxpayer_id: Uuid,
    ) -> StoreResult<Vec<source_records::Model>> {
        Ok(source_records::Entity::find()
            .filter(source_records::Column::TaxpayerId.eq(taxpayer_id))
            .order_by_desc(source_records::Column::ImportedAt)
            .all(&self.db)
            .await?)
    }

    /// Soft-deactivates a record and the events parsed from it.
    ///
    /// # Errors
    ///
    /// Returns `NotFound` if the record does not exist.
    pub async fn deactivate(&self, id: Uuid) -> StoreResult<source_records::Model> {
        let record = self.find_by_id(id).await?;
        let mut active: source_records::ActiveModel = record.into();
        active.active = Set(false);
        let updated = active.update(&self.db).await?;

        tax_events::Entity::update_many()
            .col_expr(tax_events::Column::Active, sea_orm::sea_query::Expr::value(false))
            .filter(tax_events::Column::SourceRecordId.eq(id))
            .exec(&self.db)
            .await?;

        Ok(updated)
    }
}
