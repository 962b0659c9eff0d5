use geo::LatLon;
use net::channels::{NetToRelay, OutputTx, RelayRx};
use net::protocol::{parse_location_batch, ClientEvent, ServerEvent};
use session::{ConnectionRole, ConnectionTable, SessionId, SessionOutput};

use crate::registry::{PlayerRecord, PlayerRegistry};

/// Relay state: who is connected and which players they reported.
///
/// Owned by a single task; every [`NetToRelay`] message is applied in full
/// before the next one is looked at, so batches never interleave.
#[derive(Debug, Default)]
pub struct RelayGateway {
    registry: PlayerRegistry,
    connections: ConnectionTable,
}

impl RelayGateway {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn registry(&self) -> &PlayerRegistry {
        &self.registry
    }

    pub fn connections(&self) -> &ConnectionTable {
        &self.connections
    }

    /// Apply one message and return the frames it produced.
    pub fn handle(&mut self, msg: NetToRelay) -> Vec<SessionOutput> {
        match msg {
            NetToRelay::Connected { session_id, role } => self.on_connected(session_id, role),
            NetToRelay::Event { session_id, event } => self.on_event(session_id, event),
            NetToRelay::Disconnected { session_id } => self.on_disconnected(session_id),
        }
    }

    fn on_connected(&mut self, session_id: SessionId, role: ConnectionRole) -> Vec<SessionOutput> {
        self.connections.register(session_id, role);
        tracing::debug!(
            ?session_id,
            ?role,
            producers = self.connections.count(ConnectionRole::Producer),
            consumers = self.connections.count(ConnectionRole::Consumer),
            "connection joined"
        );

        // The connection already queued an empty collection; catch it up.
        if role == ConnectionRole::Consumer && !self.registry.is_empty() {
            return self
                .encode_snapshot()
                .map(|text| vec![SessionOutput::new(session_id, text)])
                .unwrap_or_default();
        }
        Vec::new()
    }

    fn on_event(&mut self, session_id: SessionId, event: ClientEvent) -> Vec<SessionOutput> {
        match self.connections.role_of(session_id) {
            Some(ConnectionRole::Producer) => {}
            role => {
                tracing::debug!(?session_id, ?role, "dropping event from non-producer");
                return Vec::new();
            }
        }

        match event {
            ClientEvent::PlayerLocationUpdate(payload) => {
                self.apply_location_batch(session_id, &payload);
                self.broadcast_snapshot()
            }
            ClientEvent::PlayerDisconnect(uuid) => {
                let uuid = uuid.trim();
                if self.registry.remove(uuid) {
                    tracing::debug!(?session_id, uuid, "removed player");
                    self.broadcast_snapshot()
                } else {
                    Vec::new()
                }
            }
        }
    }

    fn apply_location_batch(&mut self, session_id: SessionId, payload: &str) {
        let mut applied = 0usize;
        for parsed in parse_location_batch(payload) {
            match parsed {
                Ok(loc) => {
                    self.registry.upsert(PlayerRecord {
                        uuid: loc.uuid,
                        position: LatLon::new(loc.lat, loc.lon),
                        display_name: loc.display_name,
                        source: session_id,
                    });
                    applied += 1;
                }
                Err(e) => tracing::warn!(?session_id, "skipping player tuple: {}", e),
            }
        }
        tracing::trace!(?session_id, applied, tracked = self.registry.len(), "location batch applied");
    }

    fn on_disconnected(&mut self, session_id: SessionId) -> Vec<SessionOutput> {
        match self.connections.remove(session_id) {
            Some(ConnectionRole::Producer) => {
                let swept = self.registry.remove_by_source(session_id);
                tracing::info!(?session_id, swept, "producer disconnected, players swept");
                if swept > 0 {
                    self.broadcast_snapshot()
                } else {
                    Vec::new()
                }
            }
            Some(ConnectionRole::Consumer) | None => Vec::new(),
        }
    }

    fn broadcast_snapshot(&self) -> Vec<SessionOutput> {
        self.encode_snapshot()
            .map(|text| vec![SessionOutput::to_group(ConnectionRole::Consumer, text)])
            .unwrap_or_default()
    }

    fn encode_snapshot(&self) -> Option<String> {
        match ServerEvent::player_locations(&self.registry.snapshot_as_feature_collection()) {
            Ok(text) => Some(text),
            Err(e) => {
                tracing::error!("Failed to encode player snapshot: {}", e);
                None
            }
        }
    }
}

/// Drive a [`RelayGateway`] until its input closes or shutdown is signalled.
pub async fn run_relay(
    mut relay_rx: RelayRx,
    output_tx: OutputTx,
    mut shutdown_rx: tokio::sync::watch::Receiver<bool>,
) {
    let mut gateway = RelayGateway::new();

    loop {
        tokio::select! {
            msg = relay_rx.recv() => {
                let Some(msg) = msg else { break };
                for out in gateway.handle(msg) {
                    if output_tx.send(out).is_err() {
                        tracing::warn!("Output router gone, stopping relay");
                        return;
                    }
                }
            }
            changed = shutdown_rx.changed() => {
                if changed.is_err() || *shutdown_rx.borrow() {
                    break;
                }
            }
        }
    }

    tracing::info!(tracked = gateway.registry().len(), "Relay shutting down");
}
