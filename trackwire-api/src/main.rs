//! trackwire-api — music distribution backend service
//!
//! Code issuance (ISRC/UPC), release records, concurrent platform fan-out,
//! and payment-webhook fulfillment.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Result;
use clap::Parser;
use tracing::info;
use trackwire_api::distributor::{
    PlatformClient, SoundcloudClient, SpotifyClient, YoutubeClient,
};
use trackwire_api::ledger::CodeGenerator;
use trackwire_api::notify::spawn_notification_listener;
use trackwire_api::{build_router, AppState};
use trackwire_common::config::ServiceConfig;
use trackwire_common::db::init_database;
use trackwire_common::events::EventBus;

#[derive(Debug, Parser)]
#[command(name = "trackwire-api", about = "Music distribution backend service")]
struct Args {
    /// Path to a TOML config file
    #[arg(long, env = "TRACKWIRE_CONFIG")]
    config: Option<PathBuf>,

    /// Listen port (overrides config)
    #[arg(long)]
    port: Option<u16>,

    /// Database path (overrides config)
    #[arg(long)]
    database: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::INFO.into()),
        )
        .init();

    info!("Starting trackwire-api v{}", env!("CARGO_PKG_VERSION"));

    let args = Args::parse();
    let config = ServiceConfig::load(
        args.config.as_deref(),
        args.port,
        args.database.as_deref(),
    )?;

    let pool = init_database(&config.database).await?;
    info!("✓ Connected to database: {}", config.database.display());

    let bus = EventBus::new(1000);
    spawn_notification_listener(&bus);

    let clients: Vec<Arc<dyn PlatformClient>> = vec![
        Arc::new(YoutubeClient::new()?),
        Arc::new(SpotifyClient::new()?),
        Arc::new(SoundcloudClient::new()?),
    ];

    let generator = CodeGenerator::new(&config.isrc_country, &config.isrc_registrant);
    if config.webhook_secret.is_empty() {
        info!("Webhook signature check disabled (no secret configured)");
    }

    let state = AppState::new(
        pool,
        bus,
        generator,
        clients,
        config.webhook_secret.clone(),
    );
    let app = build_router(state);

    let addr = config.bind_address();
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    info!("✓ Listening on http://{}", addr);
    axum::serve(listener, app).await?;

    Ok(())
}
