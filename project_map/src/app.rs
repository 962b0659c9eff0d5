use std::sync::Arc;

use axum::Router;
use net::channels::ConnectionChannels;
use reconciler::services::{build_client, MeiliIndex, NominatimGeocoder, OverpassCounter};
use reconciler::{GeoReconciler, Ports, ReconcileError};
use region_db::RegionDb;
use relay::CommandChannel;
use tokio::sync::watch;
use tower_http::cors::CorsLayer;

use crate::auth::StaticTokenVerifier;
use crate::config::ServerConfig;
use crate::routes::{api_routes, AppState};

/// Handles onto the running relay pipeline.
#[derive(Clone)]
pub struct RelayHandles {
    pub channels: ConnectionChannels,
    pub commands: CommandChannel,
}

/// Spawn the output router and the relay task.
pub fn start_relay(shutdown_rx: watch::Receiver<bool>) -> RelayHandles {
    let (relay_tx, relay_rx) = tokio::sync::mpsc::unbounded_channel();
    let (output_tx, output_rx) = tokio::sync::mpsc::unbounded_channel();
    let (register_tx, register_rx) = tokio::sync::mpsc::unbounded_channel();
    let (unregister_tx, unregister_rx) = tokio::sync::mpsc::unbounded_channel();

    tokio::spawn(net::output_router::run_output_router(
        output_rx,
        register_rx,
        unregister_rx,
    ));
    tokio::spawn(relay::run_relay(relay_rx, output_tx.clone(), shutdown_rx));

    RelayHandles {
        channels: ConnectionChannels {
            relay_tx,
            register_tx,
            unregister_tx,
        },
        commands: CommandChannel::new(output_tx),
    }
}

/// Wire the reconciler against the configured external services and `db`.
pub fn build_state(config: &ServerConfig, db: Arc<RegionDb>, commands: CommandChannel) -> Result<AppState, ReconcileError> {
    let client = build_client(&config.to_http_settings())?;
    let ports = Ports {
        store: db.clone(),
        counter: Arc::new(OverpassCounter::new(
            client.clone(),
            config.services.overpass_url.clone(),
            config.services.request_timeout_secs,
        )),
        geocoder: Arc::new(NominatimGeocoder::new(
            client,
            config.services.nominatim_url.clone(),
        )),
        search: Arc::new(MeiliIndex::new(config.to_meili_settings())?),
    };

    Ok(AppState {
        reconciler: Arc::new(GeoReconciler::new(ports, config.reconcile.page_size)),
        db,
        commands,
        verifier: Arc::new(StaticTokenVerifier::from_entries(&config.auth.tokens)),
        admin_role: Arc::from(config.auth.admin_role.as_str()),
    })
}

/// Relay socket plus the HTTP API, with permissive CORS for the map frontend.
pub fn build_router(relay: &RelayHandles, producer_token: &str, state: AppState) -> Router {
    if producer_token.is_empty() {
        tracing::warn!("No producer token configured; game servers cannot connect as producers");
    }
    Router::new()
        .merge(net::web_server::relay_routes(relay.channels.clone(), producer_token))
        .merge(api_routes(state))
        .layer(CorsLayer::permissive())
}
