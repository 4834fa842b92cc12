//! bridged - SpoolEase to Spoolman sync daemon
//!
//! This daemon continuously reflects the SpoolEase spool inventory and
//! filament consumption into Spoolman, correlating records across the two
//! systems by NFC tag id.

use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use tokio::time::sleep;
use tracing::{error, info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use bridged::config::Config;
use bridged::store::MappingStore;
use bridged::sync::{SyncEngine, SyncSettings};
use spool_bridge_core::codec;
use spool_bridge_net::{SpoolEaseClient, SpoolmanClient};

#[tokio::main]
async fn main() -> ExitCode {
    // Parse configuration
    let config = Config::parse();

    // Initialize logging; RUST_LOG wins over the configured level
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(config.log_level.to_lowercase()));
    tracing_subscriber::registry().with(fmt::layer()).with(filter).init();

    info!(
        "bridged v{} - SpoolEase to Spoolman Bridge",
        env!("CARGO_PKG_VERSION")
    );
    info!("SpoolEase: {}", config.spoolease_base_url());
    info!("Spoolman:  {}", config.spoolman_base_url());
    info!("Poll interval: {}s", config.poll_interval_seconds);

    if let Err(e) = config.validate() {
        error!("Invalid configuration: {}", e);
        return ExitCode::FAILURE;
    }

    match run(config).await {
        Ok(()) => {
            info!("Bridge stopped");
            ExitCode::SUCCESS
        }
        Err(e) => {
            error!("Fatal startup error: {:#}", e);
            ExitCode::FAILURE
        }
    }
}

async fn run(config: Config) -> anyhow::Result<()> {
    let key = codec::derive_key(
        &config.spoolease_security_key,
        &config.spoolease_salt,
        config.spoolease_iterations,
    );
    let spoolease = SpoolEaseClient::new(config.spoolease_base_url(), key)?;
    let spoolman = SpoolmanClient::new(
        config.spoolman_base_url(),
        config.spoolman_ws_url(),
        config.spoolman_tag_id_field.clone(),
        config.spoolman_spoolease_id_field.clone(),
    )?;
    let store = Arc::new(MappingStore::new(&config.mapping_file_path));

    // Fatal when the derived key is wrong or the device never answers:
    // everything downstream would only produce garbage.
    info!("Validating SpoolEase security key...");
    if !spoolease.test_key().await {
        anyhow::bail!(
            "SpoolEase security key validation failed; check BRIDGE_SPOOLEASE_SECURITY_KEY \
             and that the device is reachable"
        );
    }

    info!("Ensuring Spoolman extra fields exist...");
    spoolman.ensure_extra_fields_exist().await?;

    store.load();
    if store.is_empty() {
        info!("No existing mappings - checking Spoolman for recoverable data...");
        match spoolman.get_all_spools().await {
            Ok(spools) => {
                let recovered = store.rebuild_from_spoolman_spools(
                    &spools,
                    &config.spoolman_tag_id_field,
                    &config.spoolman_spoolease_id_field,
                );
                if recovered > 0 {
                    if let Err(e) = store.save() {
                        warn!("Could not persist rebuilt mappings: {}", e);
                    }
                }
            }
            Err(e) => warn!("Could not rebuild mappings from Spoolman: {}", e),
        }
    }

    if config.initial_sync_delay > 0 {
        info!("Waiting {}s before initial sync...", config.initial_sync_delay);
        sleep(Duration::from_secs(config.initial_sync_delay)).await;
    }

    let engine = SyncEngine::new(
        spoolease,
        spoolman.clone(),
        store,
        SyncSettings::from_config(&config),
    );

    info!("Running initial full sync...");
    engine.full_sync().await;

    info!("Bridge is running. Starting sync loops.");
    let engine_ref = &engine;
    tokio::select! {
        _ = engine.poll_loop() => {}
        _ = spoolman.listen_events(move |event_type, payload| async move {
            engine_ref.handle_event(&event_type, &payload).await;
        }) => {}
        _ = tokio::signal::ctrl_c() => {
            info!("Received shutdown signal");
        }
    }

    Ok(())
}
