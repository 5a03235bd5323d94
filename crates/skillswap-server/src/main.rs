//! Service entry point: wires configuration, storage and the booking
//! service together.

use skillswap_booking::{BookingConfig, BookingService, HttpMeetProvisioner, TracingNotifier};
use skillswap_db::repository::{
    SurrealDisputeRepository, SurrealLedgerRepository, SurrealSessionRepository,
};
use skillswap_db::{DbConfig, DbManager, run_migrations};
use tracing::info;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .json()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("skillswap=info")),
        )
        .init();

    let db_config = DbConfig::from_env();
    let manager = DbManager::connect(&db_config).await?;
    let db = manager.client();
    run_migrations(db).await?;

    let config = BookingConfig::from_env();
    let provisioner = HttpMeetProvisioner::new(
        config.meet_endpoint.clone(),
        config.provisioning_timeout_secs,
    )?;
    let _service = BookingService::new(
        SurrealLedgerRepository::new(db.clone()),
        SurrealSessionRepository::new(db.clone()),
        SurrealDisputeRepository::new(db.clone()),
        provisioner,
        TracingNotifier,
        config,
    );
    info!("booking service initialized");

    // TODO: mount the HTTP API once the transport layer lands.

    info!("skillswap-server stopped");
    Ok(())
}
