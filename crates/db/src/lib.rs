//! Database layer with `SeaORM` entities and repositories.
//!
//! This crate provides:
//! - `SeaORM` entity definitions for the filing tables
//! - Repository abstractions for data access
//! - Database migrations (portable across Postgres and SQLite)
//! - The reference catalog seed for tax year 2024
//!
//! Monetary amounts are persisted as exact decimal strings so the same
//! schema runs on both backends; repositories expose
//! `rust_decimal::Decimal`.

pub mod entities;
pub mod error;
pub mod migration;
pub mod repositories;
pub mod seed;

pub use error::{StoreError, StoreResult};
pub use repositories::{
    CatalogRepository, DeclarationRepository, EventRepository, SourceRecordRepository,
    TaxpayerRepository, XmlExportRepository,
};

use sea_orm::{ConnectOptions, Database, DatabaseConnection, DbErr};

use salyq_shared::config::DatabaseConfig;

/// Establishes a connection to the database.
///
/// # Errors
///
/// Returns an error if the connection cannot be established.
pub async fn connect(database_url: &str) -> Result<DatabaseConnection, DbErr> {
    Database::connect(database_url).await
}

/// Establishes a connection with the configured pool bounds.
///
/// # Errors
///
/// Returns an error if the connection cannot be established.
pub async fn connect_with(config: &DatabaseConfig) -> Result<DatabaseConnection, DbErr> {
    let mut options = ConnectOptions::new(config.url.clone());
    options
        .max_connections(config.max_connections)
        .min_connections(config.min_connections);
    Database::connect(options).await
}
