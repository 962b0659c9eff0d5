use std::sync::Arc;
use std::time::Duration;

use project_map::config::{parse_cli_args, ServerConfig};
use project_map::shutdown::{self, shutdown_channel, ShutdownRx};
use project_map::{build_router, build_state, start_relay};
use region_db::RegionDb;

#[tokio::main]
async fn main() {
    observability::init_logging();

    let config = parse_cli_args();
    tracing::info!("Map server starting...");

    let (shutdown_tx, shutdown_rx) = shutdown_channel();

    let server_future = run_map_server(config, shutdown_rx);

    tokio::select! {
        _ = shutdown::wait_for_signal() => {
            tracing::info!("Shutdown signal received, stopping server...");
            shutdown_tx.trigger();
            tokio::time::sleep(Duration::from_millis(500)).await;
        }
        _ = server_future => {}
    }

    tracing::info!("Server stopped.");
}

async fn run_map_server(config: ServerConfig, shutdown_rx: ShutdownRx) {
    let db = match RegionDb::open(&config.database.path) {
        Ok(db) => Arc::new(db),
        Err(e) => {
            tracing::error!("Failed to open region database: {}", e);
            std::process::exit(1);
        }
    };

    let relay = start_relay(shutdown_rx.clone().into_inner());

    let state = match build_state(&config, db, relay.commands.clone()) {
        Ok(state) => state,
        Err(e) => {
            tracing::error!("Failed to set up external service clients: {}", e);
            std::process::exit(1);
        }
    };
    let app = build_router(&relay, &config.relay.producer_token, state);

    if let Err(e) = net::web_server::run_web_server_with_shutdown(
        config.net.addr.clone(),
        app,
        config.static_dir(),
        shutdown_rx.into_inner(),
    )
    .await
    {
        tracing::error!("Web server error: {}", e);
    }
}
