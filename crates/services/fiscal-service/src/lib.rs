//! Fiscal Service Library
//!
//! NF-e / NFC-e emission against the SEFAZ web services: document building,
//! XML-DSig signing, transmission, receipt polling and fiscal events.
//! The gateway embeds it in-process; the binary runs the poller and
//! migrations on their own.

pub mod config;
pub mod infra;
pub mod qrcode;
pub mod repository;
pub mod sefaz;
pub mod service;
pub mod signing;
pub mod worker;
pub mod xml;

use std::sync::Arc;

use tokio::sync::watch;
use tracing::info;

use crate::config::FiscalServiceConfig;
use crate::infra::Database;
use crate::repository::FiscalStore;
use crate::sefaz::{EndpointCatalog, HttpTransport, SefazClient};
use crate::service::{FiscalManager, FiscalService};
use crate::signing::FileCredentialProvider;
use crate::worker::ReceiptPoller;

/// Connect to the database and wire the production service.
pub async fn connect(config: &FiscalServiceConfig) -> Result<Arc<dyn FiscalService>, Box<dyn std::error::Error>> {
    let db = Database::connect(&config.database_url).await?;
    let repo = Arc::new(FiscalStore::new(db.connection().clone()));

    let transport = Arc::new(HttpTransport::new(&config.sefaz));
    let catalog = EndpointCatalog::new(config.sefaz.base_url_override.clone());
    if let Some(base) = &config.sefaz.base_url_override {
        info!(base_url = %base, "SEFAZ endpoints overridden");
    }

    Ok(Arc::new(FiscalManager::new(
        repo,
        SefazClient::new(catalog, transport),
        Arc::new(FileCredentialProvider::new(&config.certificate_root)),
        config.sefaz.clone(),
    )))
}

/// Run the receipt poller until Ctrl+C.
pub async fn run_worker() -> Result<(), Box<dyn std::error::Error>> {
    let config = FiscalServiceConfig::from_env();
    let service = connect(&config).await?;

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let handle = ReceiptPoller::new(service, &config.sefaz).spawn(shutdown_rx);
    info!("Receipt poller running. Press Ctrl+C to stop.");

    tokio::signal::ctrl_c().await?;
    info!("Received shutdown signal, stopping poller...");
    shutdown_tx.send(true)?;
    handle.await?;

    Ok(())
}

/// Run migrations (for CLI commands).
pub async fn run_migrations(action: MigrateAction) -> Result<(), Box<dyn std::error::Error>> {
    let config = FiscalServiceConfig::from_env();
    let db = Database::connect_without_migrations(&config.database_url).await?;

    match action {
        MigrateAction::Up => {
            db.run_migrations().await?;
            info!("Migrations applied successfully");
        }
        MigrateAction::Down => {
            db.rollback_migration().await?;
            info!("Rolled back last migration");
        }
        MigrateAction::Status => {
            let status = db.migration_status().await?;
            for (name, applied) in status {
                let marker = if applied { "[x]" } else { "[ ]" };
                println!("{} {}", marker, name);
            }
        }
        MigrateAction::Fresh => {
            db.fresh_migrations().await?;
            info!("Database reset and migrations applied");
        }
    }

    Ok(())
}

/// Migration action type.
#[derive(Debug, Clone, Copy)]
pub enum MigrateAction {
    Up,
    Down,
    Status,
    Fresh,
}
