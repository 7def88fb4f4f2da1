use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use timecard_ledger::api::{self, AppState};
use timecard_ledger::config::AppConfig;
use timecard_ledger::crypto::signer_from_config;
use timecard_ledger::database::Database;
use timecard_ledger::ledger::IntegrityLedger;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "timecard_ledger=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("Starting timecard integrity ledger");

    let config = AppConfig::load()?;
    info!("Configuration loaded");

    let database = Database::new(&config.database_url).await?;
    database.run_migrations().await?;
    info!("Database migrations completed");

    let signer = signer_from_config(&config.signing)?;
    let ledger =
        IntegrityLedger::new(database.pool().clone(), signer).with_page_size(config.page_size);
    let app = api::router(AppState::new(ledger, config.audit_log_max_limit));

    let addr = config.bind_address();
    info!("Server listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
