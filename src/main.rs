//! CLI for mqttdash
//!
//! Runs the dashboard backend: connects to the configured broker (if any)
//! and serves browser sessions over WebSocket until interrupted.

use std::sync::Arc;

use clap::Parser;
use mqttdash::bridge::{Bridge, SharedBridge, lock_bridge};
use mqttdash::config::{DEFAULT_CONFIG_PATH, Settings, load_config_from};
use mqttdash::persistence::MemoryStore;
use mqttdash::relay::Relay;
use mqttdash::relay::websocket::start_websocket_server;
use mqttdash::utils::logging;
use tracing::{error, info, warn};

#[derive(Parser)]
#[command(name = "mqttdash", about = "MQTT dashboard backend")]
struct Cli {
    /// Configuration file, without extension (e.g. `config/default` for `config/default.toml`)
    #[arg(long, default_value = DEFAULT_CONFIG_PATH)]
    config: String,
}

#[tokio::main]
async fn main() {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();

    let settings = match load_config_from(&cli.config) {
        Ok(settings) => settings,
        Err(e) => {
            logging::init("info");
            error!("Failed to load configuration: {}", e);
            std::process::exit(1);
        }
    };
    logging::init(&settings.logging.level);

    if let Err(e) = run_server(settings).await {
        error!("Server failed: {}", e);
    }
}

async fn run_server(settings: Settings) -> Result<(), Box<dyn std::error::Error>> {
    let addr = format!("{}:{}", settings.server.host, settings.server.port);

    let store = MemoryStore::with_capacity(settings.store.max_messages);
    let bridge = Bridge::new(settings.mqtt.bridge_options(), store).into_shared();
    let relay = Arc::new(Relay::new());
    lock_bridge(&bridge).register_listener(relay.clone());

    connect_on_startup(&bridge, &settings).await;

    tokio::select! {
        result = start_websocket_server(&addr, bridge.clone(), relay) => {
            if let Err(e) = result {
                error!("WebSocket server exited: {}", e);
            } else {
                error!("WebSocket server exited unexpectedly.");
            }
        }
        _ = tokio::signal::ctrl_c() => {
            info!("Shutdown signal received. Exiting gracefully.");
        }
    }

    Bridge::disconnect(&bridge).await;
    Ok(())
}

/// Connects to the configured broker and subscribes the configured topics.
/// A failed attempt is logged and leaves the bridge in the error state.
async fn connect_on_startup(bridge: &SharedBridge, settings: &Settings) {
    let Some(request) = settings.mqtt.connect_request() else {
        warn!("No broker URL configured; waiting without an upstream connection");
        return;
    };

    if let Err(e) = Bridge::connect(bridge, request).await {
        warn!("Startup connection failed: {}", e);
        return;
    }

    match lock_bridge(bridge).subscribe_all(&settings.mqtt.topics) {
        Ok(count) => info!("Subscribed to {} configured topics", count),
        Err(e) => warn!("Failed to subscribe configured topics: {}", e),
    }
}
