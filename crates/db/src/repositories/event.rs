//! Tax event repository: the append-only event store.

use chrono::Utc;
use sea_orm::{
    ColumnTrait, DatabaseConnection, EntityTrait, QueryFilter, QueryOrder, Set, TransactionTrait,
};
use std::collections::BTreeSet;
use uuid::Uuid;

use salyq_core::events::{TaxEvent, TaxEventInput};
use salyq_shared::types::{SourceRecordId, TaxEventId, TaxpayerId};

use crate::entities::{tax_event_types, tax_events, tax_mappings};
use crate::error::{StoreError, StoreResult};
use crate::repositories::{decimal_from_db, decimal_to_db};

/// Tax event repository.
#[derive(Debug, Clone)]
pub struct EventRepository {
    db: DatabaseConnection,
}

impl EventRepository {
    /// Creates a new event repository.
    #[must_use]
    pub const fn new(db: DatabaseConnection) -> Self {
        Self { db }
    }

    /// Inserts a batch of events atomically.
    ///
    /// Every event type must exist in the catalog vocabulary; codes the
    /// parsers emit but the catalog does not know are rejected here.
    ///
    /// # Errors
    ///
    /// Returns `Conflict` for an unknown event type; otherwise database
    /// errors.
    pub async fn insert_many(
        &self,
        inputs: &[TaxEventInput],
    ) -> StoreResult<Vec<tax_events::Model>> {
        let vocabulary = self.event_type_codes().await?;
        for input in inputs {
            if !vocabulary.contains(&input.event_type) {
                return Err(StoreError::Conflict(format!(
                    "unknown event type: {}",
                    input.event_type
                )));
            }
        }

        let txn = self.db.begin().await?;
        let now = Utc::now();
        let mut inserted = Vec::with_capacity(inputs.len());
        for input in inputs {
            let model = tax_events::ActiveModel {
                id: Set(Uuid::now_v7()),
                taxpayer_id: Set(input.taxpayer_id.into_inner()),
                source_record_id: Set(Some(input.source_record_id.into_inner())),
                event_type: Set(input.event_type.clone()),
                event_date: Set(input.event_date),
                amount: Set(input.amount.map(decimal_to_db)),
                currency: Set(input.currency.clone()),
                metadata: Set(input.metadata.clone()),
                tax_year: Set(input.tax_year()),
                active: Set(true),
                created_at: Set(now.into()),
            };
            inserted.push(sea_orm::ActiveModelTrait::insert(model, &txn).await?);
        }
        txn.commit().await?;
        Ok(inserted)
    }

    /// Inserts a single event.
    ///
    /// # Errors
    ///
    /// Returns `Conflict` for an unknown event type.
    pub async fn insert_one(&self, input: &TaxEventInput) -> StoreResult<tax_events::Model> {
        let mut inserted = self.insert_many(std::slice::from_ref(input)).await?;
        inserted
            .pop()
            .ok_or_else(|| StoreError::Corrupt("insert returned no row".to_string()))
    }

    /// The catalog's event-type vocabulary.
    ///
    /// # Errors
    ///
    /// Returns an error if the database query fails.
    pub async fn event_type_codes(&self) -> StoreResult<BTreeSet<String>> {
        Ok(tax_event_types::Entity::find()
            .all(&self.db)
            .await?
            .into_iter()
            .map(|row| row.code)
            .collect())
    }

    /// Active events for a taxpayer-year, ordered by event date then
    /// insertion.
    ///
    /// # Errors
    ///
    /// Returns an error if a stored amount cannot be decoded.
    pub async fn list_for_year(
        &self,
        taxpayer_id: Uuid,
        tax_year: i32,
    ) -> StoreResult<Vec<TaxEvent>> {
        let rows = tax_events::Entity::find()
            .filter(tax_events::Column::TaxpayerId.eq(taxpayer_id))
            .filter(tax_events::Column::TaxYear.eq(tax_year))
            .filter(tax_events::Column::Active.eq(true))
            .order_by_asc(tax_events::Column::EventDate)
            .order_by_asc(tax_events::Column::Id)
            .all(&self.db)
            .await?;
        rows.into_iter().map(Self::into_core).collect()
    }

    /// Events parsed from one source record.
    ///
    /// # Errors
    ///
    /// Returns an error if the database query fails.
    pub async fn list_for_source(
        &self,
        source_record_id: Uuid,
    ) -> StoreResult<Vec<tax_events::Model>> {
        Ok(tax_events::Entity::find()
            .filter(tax_events::Column::SourceRecordId.eq(source_record_id))
            .order_by_asc(tax_events::Column::Id)
            .all(&self.db)
            .await?)
    }

    /// Deletes the events of a source record, for re-parsing.
    ///
    /// Mapping rows referencing those events go first.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    pub async fn delete_for_source(&self, source_record_id: Uuid) -> StoreResult<u64> {
        let txn = self.db.begin().await?;
        let ids: Vec<Uuid> = tax_events::Entity::find()
            .filter(tax_events::Column::SourceRecordId.eq(source_record_id))
            .all(&txn)
            .await?
            .into_iter()
            .map(|row| row.id)
            .collect();
        if ids.is_empty() {
            txn.commit().await?;
            return Ok(0);
        }
        tax_mappings::Entity::delete_many()
            .filter(tax_mappings::Column::TaxEventId.is_in(ids.clone()))
            .exec(&txn)
            .await?;
        let deleted = tax_events::Entity::delete_many()
            .filter(tax_events::Column::Id.is_in(ids))
            .exec(&txn)
            .await?;
        txn.commit().await?;
        Ok(deleted.rows_affected)
    }

    /// Converts a stored row into the core event model.
    ///
    /// # Errors
    ///
    /// Returns an error if the stored amount cannot be decoded.
    pub fn into_core(row: tax_events::Model) -> StoreResult<TaxEvent> {
        let amount = row.amount.as_deref().map(decimal_from_db).transpose()?;
        Ok(TaxEvent {
            id: TaxEventId::from_uuid(row.id),
            taxpayer_id: TaxpayerId::from_uuid(row.taxpayer_id),
            source_record_id: row.source_record_id.map(SourceRecordId::from_uuid),
            event_type: row.event_type,
            event_date: row.event_date,
            amount,
            currency: row.currency,
            metadata: row.metadata,
            tax_year: row.tax_year,
        })
    }
}
