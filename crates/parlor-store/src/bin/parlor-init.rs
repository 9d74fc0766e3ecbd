//! # parlor-init
//!
//! Bootstraps a Parlor chat database: resolves the configured path, applies
//! pending migrations (seeding the demo data set on a fresh file when
//! enabled), and reports what it found.

use parlor_store::{Database, StoreConfig};
use tracing::info;
use tracing_subscriber::EnvFilter;

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("info,parlor_store=debug")),
        )
        .init();

    info!("Starting parlor-init v{}", env!("CARGO_PKG_VERSION"));

    let config = StoreConfig::from_env();
    info!(?config, "Loaded configuration");

    let db = Database::open(&config)?;
    db.ping()?;

    let users = db.list_users()?;
    info!(
        path = %db.path().display(),
        users = users.len(),
        open_connections = db.open_connections(),
        in_use_connections = db.in_use_connections(),
        "Database ready"
    );

    Ok(())
}
