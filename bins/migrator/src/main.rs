//! Database migration runner for Salyq.
//!
//! Usage:
//!   migrator up      - Run all pending migrations
//!   migrator down    - Rollback last migration
//!   migrator status  - Show migration status
//!   migrator fresh   - Drop all tables and re-run migrations

use salyq_db::migration::Migrator;
use salyq_shared::AppConfig;
use sea_orm_migration::prelude::*;

#[tokio::main]
async fn main() {
    // Load .env file if present
    dotenvy::dotenv().ok();

    // The migration CLI reads DATABASE_URL; feed it the layered
    // configuration's database URL when the variable is not set.
    let config = AppConfig::load().expect("Failed to load configuration");
    if std::env::var("DATABASE_URL").is_err() {
        std::env::set_var("DATABASE_URL", &config.database.url);
    }

    // Run the migrator CLI (it sets up its own tracing)
    cli::run_cli(Migrator).await;
}
