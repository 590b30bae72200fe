//! XML export repository: append-only versioned payloads.

use chrono::Utc;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, ConnectionTrait, DatabaseConnection, EntityTrait,
    PaginatorTrait, QueryFilter, QueryOrder, Set,
};
use uuid::Uuid;

use crate::entities::xml_exports;
use crate::error::StoreResult;

/// XML export repository.
#[derive(Debug, Clone)]
pub struct XmlExportRepository {
    db: DatabaseConnection,
}

impl XmlExportRepository {
    /// Creates a new export repository.
    #[must_use]
    pub const fn new(db: DatabaseConnection) -> Self {
        Self { db }
    }

    /// Appends a new export version through the caller's transaction,
    /// which must hold the declaration's row lock.
    ///
    /// `schema_version` is the count of prior versions plus one,
    /// assigned under that lock so versions stay monotonic.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    pub async fn append_in<C: ConnectionTrait>(
        conn: &C,
        declaration_id: Uuid,
        payload: String,
        content_hash: String,
    ) -> StoreResult<xml_exports::Model> {
        let prior = xml_exports::Entity::find()
            .filter(xml_exports::Column::DeclarationId.eq(declaration_id))
            .count(conn)
            .await?;
        let model = xml_exports::ActiveModel {
            id: Set(Uuid::now_v7()),
            declaration_id: Set(declaration_id),
            payload: Set(payload),
            schema_version: Set(i32::try_from(prior).unwrap_or(i32::MAX - 1) + 1),
            content_hash: Set(content_hash),
            signed: Set(false),
            created_at: Set(Utc::now().into()),
        };
        Ok(model.insert(conn).await?)
    }

    /// Exports of a declaration in version order.
    ///
    /// # Errors
    ///
    /// Returns an error if the database query fails.
    pub async fn list_for(&self, declaration_id: Uuid) -> StoreResult<Vec<xml_exports::Model>> {
        Ok(xml_exports::Entity::find()
            .filter(xml_exports::Column::DeclarationId.eq(declaration_id))
            .order_by_asc(xml_exports::Column::SchemaVersion)
            .all(&self.db)
            .await?)
    }

    /// The latest export of a declaration, if any.
    ///
    /// # Errors
    ///
    /// Returns an error if the database query fails.
    pub async fn latest(&self, declaration_id: Uuid) -> StoreResult<Option<xml_exports::Model>> {
        Ok(xml_exports::Entity::find()
            .filter(xml_exports::Column::DeclarationId.eq(declaration_id))
            .order_by_desc(xml_exports::Column::SchemaVersion)
            .one(&self.db)
            .await?)
    }
}
