mod auth;
mod error;
mod service;

use std::path::Path;
use std::sync::Arc;

use herald_core::{Broker, BrokerConfig, RocksDbStorage, WebhookDeliverer};
use tracing::{info, warn};

use auth::ApiToken;
use service::AppState;

fn load_config() -> BrokerConfig {
    let paths = ["herald.toml", "/etc/herald/herald.toml"];

    for path in &paths {
        if Path::new(path).exists() {
            match std::fs::read_to_string(path) {
                Ok(contents) => match toml::from_str(&contents) {
                    Ok(config) => {
                        info!(path, "loaded configuration");
                        return config;
                    }
                    Err(e) => {
                        eprintln!("error parsing {path}: {e}");
                        std::process::exit(1);
                    }
                },
                Err(e) => {
                    eprintln!("error reading {path}: {e}");
                    std::process::exit(1);
                }
            }
        }
    }

    info!("no config file found, using defaults");
    BrokerConfig::default()
}

// The broker and the blocking webhook client are built before the async
// runtime exists: the blocking client must not be created or dropped on a
// runtime thread.
fn main() -> Result<(), Box<dyn std::error::Error>> {
    herald_core::telemetry::init_tracing();

    let mut config = load_config();
    if let Ok(token) = std::env::var("HERALD_API_TOKEN") {
        config.server.api_token = Some(token);
    }
    let listen_addr = config.server.listen_addr.clone();
    let api_token = config
        .server
        .api_token
        .clone()
        .filter(|token| !token.is_empty())
        .map(ApiToken::new);
    if api_token.is_none() {
        warn!("no API token configured, authentication is disabled");
    }

    let data_dir = std::env::var("HERALD_DATA_DIR").unwrap_or_else(|_| "data".to_string());
    let storage = Arc::new(RocksDbStorage::open(&data_dir)?);
    let deliverer = Arc::new(WebhookDeliverer::new(&config.delivery)?);
    let broker = Arc::new(Broker::new(config, storage, deliverer)?);

    let app = service::router(AppState::new(Arc::clone(&broker)), api_token);

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()?;
    runtime.block_on(async {
        let listener = tokio::net::TcpListener::bind(&listen_addr).await?;
        info!(addr = %listener.local_addr()?, "starting HTTP server");
        axum::serve(listener, app)
            .with_graceful_shutdown(shutdown_signal())
            .await
    })?;
    drop(runtime);

    info!("HTTP server stopped, shutting down broker");

    match Arc::try_unwrap(broker) {
        Ok(broker) => broker.shutdown()?,
        // Drop impl stops the scheduler once the last reference goes away
        Err(_) => warn!("broker still referenced at shutdown"),
    }

    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = tokio::signal::ctrl_c();

    #[cfg(unix)]
    {
        let mut sigterm = tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler");
        tokio::select! {
            _ = ctrl_c => {},
            _ = sigterm.recv() => {},
        }
    }

    #[cfg(not(unix))]
    {
        ctrl_c.await.expect("failed to install CTRL+C handler");
    }

    info!("received shutdown signal");
}
