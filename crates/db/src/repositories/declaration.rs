//! Declaration repository: header, items, flags, and reports.
//!
//! Regeneration runs as one transaction wrapping delete-items,
//! upsert-items, flag merge, and the mapping rewrite, so a canceled
//! request never leaves a half-written declaration behind.

use chrono::Utc;
use rust_decimal::Decimal;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, ConnectionTrait, DatabaseConnection, DatabaseTransaction,
    DbBackend, EntityTrait, QueryFilter, QueryOrder, QuerySelect, Set, TransactionTrait,
};
use serde_json::Value;
use std::collections::BTreeMap;
use uuid::Uuid;

use salyq_core::declaration::{DeclarationKind, SnapshotHeader};
use salyq_core::engine::MappingRecord;
use salyq_core::workflow::DeclarationStatus;

use crate::entities::{declaration_items, declarations, tax_mappings, validation_reports};
use crate::error::{StoreError, StoreResult};
use crate::repositories::{decimal_from_db, decimal_to_db};

/// Declaration repository.
#[derive(Debug, Clone)]
pub struct DeclarationRepository {
    db: DatabaseConnection,
}

impl DeclarationRepository {
    /// Creates a new declaration repository.
    #[must_use]
    pub const fn new(db: DatabaseConnection) -> Self {
        Self { db }
    }

    /// Finds or atomically creates the declaration for
    /// (taxpayer, year, form).
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    pub async fn find_or_create(
        &self,
        taxpayer_id: Uuid,
        tax_year: i32,
        form_code: &str,
        kind: DeclarationKind,
        header: &SnapshotHeader,
    ) -> StoreResult<declarations::Model> {
        if let Some(existing) = self.find_unique(taxpayer_id, tax_year, form_code).await? {
            return Ok(existing);
        }

        let now = Utc::now().into();
        let model = declarations::ActiveModel {
            id: Set(Uuid::now_v7()),
            taxpayer_id: Set(taxpayer_id),
            tax_year: Set(tax_year),
            form_code: Set(form_code.to_string()),
            kind: Set(kind.as_str().to_string()),
            status: Set(DeclarationStatus::Draft.as_str().to_string()),
            iin: Set(header.iin.clone()),
            last_name: Set(header.last_name.clone()),
            first_name: Set(header.first_name.clone()),
            middle_name: Set(header.middle_name.clone()),
            phone: Set(header.phone.clone()),
            email: Set(header.email.clone()),
            spouse_iin: Set(header.spouse_iin.clone()),
            legal_rep_iin: Set(header.legal_rep_iin.clone()),
            flags: Set(Value::Object(serde_json::Map::new())),
            validated_at: Set(None),
            exported_at: Set(None),
            created_at: Set(now),
            updated_at: Set(now),
        };
        match model.insert(&self.db).await {
            Ok(created) => Ok(created),
            // Lost the race on the unique constraint; the winner's row
            // is the declaration.
            Err(err) => match self.find_unique(taxpayer_id, tax_year, form_code).await? {
                Some(existing) => Ok(existing),
                None => Err(err.into()),
            },
        }
    }

    async fn find_unique(
        &self,
        taxpayer_id: Uuid,
        tax_year: i32,
        form_code: &str,
    ) -> StoreResult<Option<declarations::Model>> {
        Ok(declarations::Entity::find()
            .filter(declarations::Column::TaxpayerId.eq(taxpayer_id))
            .filter(declarations::Column::TaxYear.eq(tax_year))
            .filter(declarations::Column::FormCode.eq(form_code))
            .one(&self.db)
            .await?)
    }

    /// Finds a declaration by ID.
    ///
    /// # Errors
    ///
    /// Returns `NotFound` if the declaration does not exist.
    pub async fn find_by_id(&self, id: Uuid) -> StoreResult<declarations::Model> {
        declarations::Entity::find_by_id(id)
            .one(&self.db)
            .await?
            .ok_or_else(|| StoreError::NotFound(format!("declaration {id}")))
    }

    /// Starts a transaction for a serialized declaration operation.
    ///
    /// # Errors
    ///
    /// Returns an error if the transaction cannot be started.
    pub async fn begin(&self) -> StoreResult<DatabaseTransaction> {
        Ok(self.db.begin().await?)
    }

    /// Loads a declaration inside a transaction, taking a row lock on
    /// backends that support one. SQLite serializes writers globally,
    /// which is the required equivalent.
    ///
    /// Every status change, item or header edit, and export append
    /// goes through this lock so concurrent operations on the same
    /// declaration serialize.
    ///
    /// # Errors
    ///
    /// Returns `NotFound` if the declaration does not exist.
    pub async fn find_for_update(
        &self,
        txn: &DatabaseTransaction,
        id: Uuid,
    ) -> StoreResult<declarations::Model> {
        let mut query = declarations::Entity::find_by_id(id);
        if self.db.get_database_backend() == DbBackend::Postgres {
            query = query.lock_exclusive();
        }
        query
            .one(txn)
            .await?
            .ok_or_else(|| StoreError::NotFound(format!("declaration {id}")))
    }

    /// Parses the stored status.
    ///
    /// # Errors
    ///
    /// Returns an error if the stored status is unknown.
    pub fn status_of(declaration: &declarations::Model) -> StoreResult<DeclarationStatus> {
        DeclarationStatus::parse(&declaration.status)
            .ok_or_else(|| StoreError::Corrupt(format!("unknown status: {}", declaration.status)))
    }

    /// Reads the flag map.
    #[must_use]
    pub fn flags_of(declaration: &declarations::Model) -> BTreeMap<String, bool> {
        declaration
            .flags
            .as_object()
            .map(|map| {
                map.iter()
                    .filter_map(|(k, v)| v.as_bool().map(|b| (k.clone(), b)))
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Builds the snapshot header view of a declaration row.
    #[must_use]
    pub fn header_of(declaration: &declarations::Model) -> SnapshotHeader {
        SnapshotHeader {
            iin: declaration.iin.clone(),
            last_name: declaration.last_name.clone(),
            first_name: declaration.first_name.clone(),
            middle_name: declaration.middle_name.clone(),
            phone: declaration.phone.clone(),
            email: declaration.email.clone(),
            spouse_iin: declaration.spouse_iin.clone(),
            legal_rep_iin: declaration.legal_rep_iin.clone(),
        }
    }

    /// Items of a declaration as a field map.
    ///
    /// # Errors
    ///
    /// Returns an error if a stored value cannot be decoded.
    pub async fn items_for(&self, declaration_id: Uuid) -> StoreResult<BTreeMap<String, Decimal>> {
        Self::items_in(&self.db, declaration_id).await
    }

    /// Items of a declaration, read through the caller's connection.
    ///
    /// # Errors
    ///
    /// Returns an error if a stored value cannot be decoded.
    pub async fn items_in<C: ConnectionTrait>(
        conn: &C,
        declaration_id: Uuid,
    ) -> StoreResult<BTreeMap<String, Decimal>> {
        let rows = declaration_items::Entity::find()
            .filter(declaration_items::Column::DeclarationId.eq(declaration_id))
            .order_by_asc(declaration_items::Column::LogicalField)
            .all(conn)
            .await?;
        let mut items = BTreeMap::new();
        for row in rows {
            items.insert(row.logical_field, decimal_from_db(&row.value)?);
        }
        Ok(items)
    }

    /// Replaces the whole computed state of a declaration in one
    /// transaction: items, flags, mapping rows, refreshed header, and
    /// the draft status.
    ///
    /// The regeneration gate is checked under the row lock, so a
    /// concurrent transition past `validated` makes this fail rather
    /// than overwrite a frozen declaration.
    ///
    /// # Errors
    ///
    /// Returns `Conflict` when the declaration is past regeneration.
    #[allow(clippy::too_many_arguments)]
    pub async fn regenerate(
        &self,
        declaration_id: Uuid,
        header: &SnapshotHeader,
        field_values: &BTreeMap<String, Decimal>,
        flags: &BTreeMap<String, bool>,
        mappings: &[MappingRecord],
        affected_event_ids: &[Uuid],
    ) -> StoreResult<declarations::Model> {
        let txn = self.db.begin().await?;
        let declaration = self.find_for_update(&txn, declaration_id).await?;
        let status = Self::status_of(&declaration)?;
        if !status.allows_regeneration() {
            return Err(StoreError::Conflict(format!(
                "declaration is {status}; regeneration is only permitted in draft or validated"
            )));
        }

        Self::delete_items_in(&txn, declaration_id).await?;
        Self::insert_items_in(&txn, declaration_id, field_values, "rule_engine").await?;

        if !affected_event_ids.is_empty() {
            tax_mappings::Entity::delete_many()
                .filter(tax_mappings::Column::TaxEventId.is_in(affected_event_ids.to_vec()))
                .exec(&txn)
                .await?;
        }
        let now = Utc::now();
        for mapping in mappings {
            tax_mappings::ActiveModel {
                id: Set(Uuid::now_v7()),
                tax_event_id: Set(mapping.tax_event_id.into_inner()),
                tax_year: Set(mapping.tax_year),
                logical_field: Set(mapping.logical_field.clone()),
                amount: Set(decimal_to_db(mapping.amount)),
                rule_id: Set(mapping.rule_id.into_inner()),
                created_at: Set(now.into()),
            }
            .insert(&txn)
            .await?;
        }

        let merged = Self::merged_flags(&declaration, flags);
        let mut active: declarations::ActiveModel = declaration.into();
        active.status = Set(DeclarationStatus::Draft.as_str().to_string());
        active.iin = Set(header.iin.clone());
        active.last_name = Set(header.last_name.clone());
        active.first_name = Set(header.first_name.clone());
        active.middle_name = Set(header.middle_name.clone());
        active.phone = Set(header.phone.clone());
        active.email = Set(header.email.clone());
        active.flags = Set(merged);
        active.validated_at = Set(None);
        active.updated_at = Set(now.into());
        let updated = active.update(&txn).await?;

        txn.commit().await?;
        Ok(updated)
    }

    /// Deletes all items of a declaration, under the row lock.
    ///
    /// # Errors
    ///
    /// Returns `NotFound` if the declaration does not exist.
    pub async fn delete_items(&self, declaration_id: Uuid) -> StoreResult<u64> {
        let txn = self.db.begin().await?;
        self.find_for_update(&txn, declaration_id).await?;
        let deleted = declaration_items::Entity::delete_many()
            .filter(declaration_items::Column::DeclarationId.eq(declaration_id))
            .exec(&txn)
            .await?;
        txn.commit().await?;
        Ok(deleted.rows_affected)
    }

    async fn delete_items_in<C: ConnectionTrait>(
        conn: &C,
        declaration_id: Uuid,
    ) -> StoreResult<()> {
        declaration_items::Entity::delete_many()
            .filter(declaration_items::Column::DeclarationId.eq(declaration_id))
            .exec(conn)
            .await?;
        Ok(())
    }

    async fn insert_items_in<C: ConnectionTrait>(
        conn: &C,
        declaration_id: Uuid,
        field_values: &BTreeMap<String, Decimal>,
        source: &str,
    ) -> StoreResult<()> {
        for (logical_field, value) in field_values {
            declaration_items::ActiveModel {
                id: Set(Uuid::now_v7()),
                declaration_id: Set(declaration_id),
                logical_field: Set(logical_field.clone()),
                value: Set(decimal_to_db(*value)),
                source: Set(source.to_string()),
            }
            .insert(conn)
            .await?;
        }
        Ok(())
    }

    /// Upserts per-field values through the caller's transaction,
    /// respecting the (declaration, logical_field) uniqueness.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    pub async fn upsert_items_in<C: ConnectionTrait>(
        conn: &C,
        declaration_id: Uuid,
        field_values: &BTreeMap<String, Decimal>,
        source: &str,
    ) -> StoreResult<()> {
        declaration_items::Entity::delete_many()
            .filter(declaration_items::Column::DeclarationId.eq(declaration_id))
            .filter(
                declaration_items::Column::LogicalField
                    .is_in(field_values.keys().cloned().collect::<Vec<_>>()),
            )
            .exec(conn)
            .await?;
        Self::insert_items_in(conn, declaration_id, field_values, source).await
    }

    /// Upserts per-field values as a standalone operation, under the
    /// row lock.
    ///
    /// # Errors
    ///
    /// Returns `NotFound` if the declaration does not exist.
    pub async fn bulk_upsert_items(
        &self,
        declaration_id: Uuid,
        field_values: &BTreeMap<String, Decimal>,
        source: &str,
    ) -> StoreResult<()> {
        let txn = self.db.begin().await?;
        self.find_for_update(&txn, declaration_id).await?;
        Self::upsert_items_in(&txn, declaration_id, field_values, source).await?;
        txn.commit().await?;
        Ok(())
    }

    /// Overwrites the snapshot header of a locked declaration.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    pub async fn update_header_in<C: ConnectionTrait>(
        conn: &C,
        declaration: declarations::Model,
        header: &SnapshotHeader,
    ) -> StoreResult<declarations::Model> {
        let mut active: declarations::ActiveModel = declaration.into();
        active.iin = Set(header.iin.clone());
        active.last_name = Set(header.last_name.clone());
        active.first_name = Set(header.first_name.clone());
        active.middle_name = Set(header.middle_name.clone());
        active.phone = Set(header.phone.clone());
        active.email = Set(header.email.clone());
        active.spouse_iin = Set(header.spouse_iin.clone());
        active.legal_rep_iin = Set(header.legal_rep_iin.clone());
        active.updated_at = Set(Utc::now().into());
        Ok(active.update(conn).await?)
    }

    /// Shallow-merges flags into the declaration's flag map, under the
    /// row lock.
    ///
    /// # Errors
    ///
    /// Returns `NotFound` if the declaration does not exist.
    pub async fn merge_flags(
        &self,
        declaration_id: Uuid,
        flags: &BTreeMap<String, bool>,
    ) -> StoreResult<declarations::Model> {
        let txn = self.db.begin().await?;
        let declaration = self.find_for_update(&txn, declaration_id).await?;
        let merged = Self::merged_flags(&declaration, flags);
        let mut active: declarations::ActiveModel = declaration.into();
        active.flags = Set(merged);
        active.updated_at = Set(Utc::now().into());
        let updated = active.update(&txn).await?;
        txn.commit().await?;
        Ok(updated)
    }

    fn merged_flags(declaration: &declarations::Model, flags: &BTreeMap<String, bool>) -> Value {
        let mut map = declaration
            .flags
            .as_object()
            .cloned()
            .unwrap_or_default();
        for (name, value) in flags {
            map.insert(name.clone(), Value::Bool(*value));
        }
        Value::Object(map)
    }

    /// Persists a status change on a locked declaration, stamping
    /// `validated_at` when entering the validated status.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    pub async fn update_status_in<C: ConnectionTrait>(
        conn: &C,
        declaration: declarations::Model,
        status: DeclarationStatus,
    ) -> StoreResult<declarations::Model> {
        let mut active: declarations::ActiveModel = declaration.into();
        active.status = Set(status.as_str().to_string());
        if status == DeclarationStatus::Validated {
            active.validated_at = Set(Some(Utc::now().into()));
        }
        active.updated_at = Set(Utc::now().into());
        Ok(active.update(conn).await?)
    }

    /// Stamps the export timestamp on a locked declaration.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    pub async fn mark_exported_in<C: ConnectionTrait>(
        conn: &C,
        declaration: declarations::Model,
    ) -> StoreResult<declarations::Model> {
        let mut active: declarations::ActiveModel = declaration.into();
        active.exported_at = Set(Some(Utc::now().into()));
        Ok(active.update(conn).await?)
    }

    /// Appends a validation report through the caller's transaction.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    pub async fn insert_report_in<C: ConnectionTrait>(
        conn: &C,
        declaration_id: Uuid,
        kind: &str,
        is_valid: bool,
        report: Value,
    ) -> StoreResult<validation_reports::Model> {
        let model = validation_reports::ActiveModel {
            id: Set(Uuid::now_v7()),
            declaration_id: Set(declaration_id),
            kind: Set(kind.to_string()),
            is_valid: Set(is_valid),
            report: Set(report),
            created_at: Set(Utc::now().into()),
        };
        Ok(model.insert(conn).await?)
    }

    /// Reports for a declaration, oldest first.
    ///
    /// # Errors
    ///
    /// Returns an error if the database query fails.
    pub async fn list_reports(
        &self,
        declaration_id: Uuid,
    ) -> StoreResult<Vec<validation_reports::Model>> {
        Ok(validation_reports::Entity::find()
            .filter(validation_reports::Column::DeclarationId.eq(declaration_id))
            .order_by_asc(validation_reports::Column::CreatedAt)
            .order_by_asc(validation_reports::Column::Id)
            .all(&self.db)
            .await?)
    }
}
