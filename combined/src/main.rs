//! Combined binary for development - gateway and receipt poller in one process.

use clap::{Parser, Subcommand};
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser)]
#[command(name = "mestres-fiscal")]
#[command(about = "Fiscal back office in a single process")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the HTTP API and the receipt poller (development mode)
    Serve {
        #[arg(long, default_value = "0.0.0.0")]
        host: String,
        #[arg(long, default_value = "3000")]
        port: u16,
    },
    /// Run database migrations
    Migrate {
        #[command(subcommand)]
        action: MigrateAction,
    },
}

#[derive(Subcommand, Clone, Copy)]
enum MigrateAction {
    /// Run pending migrations
    Up,
    /// Rollback last migration
    Down,
    /// Show migration status
    Status,
    /// Reset database and run all migrations
    Fresh,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    dotenvy::dotenv().ok();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Serve { host, port } => {
            info!("Starting gateway and receipt poller in development mode");
            info!("  Gateway:    http://{}:{}", host, port);
            info!("  Swagger UI: http://{}:{}/swagger-ui", host, port);
            gateway_lib::run_embedded(&host, port, true).await?;
        }
        Commands::Migrate { action } => {
            let migrate_action = match action {
                MigrateAction::Up => fiscal_service_lib::MigrateAction::Up,
                MigrateAction::Down => fiscal_service_lib::MigrateAction::Down,
                MigrateAction::Status => fiscal_service_lib::MigrateAction::Status,
                MigrateAction::Fresh => fiscal_service_lib::MigrateAction::Fresh,
            };
            fiscal_service_lib::run_migrations(migrate_action).await?;
        }
    }

    Ok(())
}
