//! Swovie matching engine
//!
//! Server entry point: hosts group sessions over Postgres stores and the
//! configured change feed until interrupted.

use std::sync::Arc;

use anyhow::Context;
use tracing::{error, info, warn};

use SwovieMatch::{
    config::Settings,
    database::{create_pool, run_migrations, DatabaseService},
    services::{ServiceFactory, StaticCatalog, MAX_DECK_SIZE},
    utils::logging,
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenv::dotenv().ok();

    // Load configuration
    let settings = Settings::new().context("failed to load settings")?;
    settings.validate()?;

    // Initialize logging; the guard flushes file output on exit
    let _log_guard = logging::init_logging(&settings.logging)?;

    info!("Starting {}...", SwovieMatch::info());

    info!("Connecting to database...");
    let pool = create_pool(&settings.database).await?;
    run_migrations(&pool).await?;
    let database = DatabaseService::new(pool);

    let catalog = Arc::new(StaticCatalog::sequential(MAX_DECK_SIZE as i64));
    let services = ServiceFactory::new(settings.clone(), catalog).await?;

    let health = services.health_check().await;
    for issue in health.get_issues() {
        warn!(issue = %issue, "Service health issue");
    }

    let engine = services.engine(database);
    match engine.resume_open_groups().await {
        Ok(resumed) => info!(resumed = resumed, "Resumed open groups"),
        Err(e) => error!(error = %e, severity = %e.severity(), "Failed to resume open groups"),
    }

    let sweeper = engine.spawn_sweeper();
    info!("Swovie engine is ready!");

    tokio::signal::ctrl_c()
        .await
        .context("failed to listen for shutdown signal")?;

    info!("Shutdown signal received");
    sweeper.abort();
    engine.shutdown().await;

    Ok(())
}
