//! Reference catalog seeder for Salyq.
//!
//! Seeds the event-type and logical-field vocabularies, the 2024 rule
//! set, and the form 270.00 XML field map. Safe to run repeatedly;
//! existing entries are skipped.
//!
//! Usage: cargo run --bin seeder

use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use salyq_shared::AppConfig;

#[tokio::main]
async fn main() {
    dotenvy::dotenv().ok();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "salyq=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = AppConfig::load().expect("Failed to load configuration");

    info!("connecting to database");
    let db = salyq_db::connect_with(&config.database)
        .await
        .expect("Failed to connect to database");

    info!("seeding reference catalog");
    salyq_db::seed::seed_catalog(&db)
        .await
        .expect("Failed to seed catalog");

    info!("seeding complete");
}
