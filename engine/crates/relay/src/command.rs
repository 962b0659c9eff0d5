use geo::LatLon;
use net::channels::OutputTx;
use net::protocol::{ServerEvent, TeleportEnvelope};
use session::{ConnectionRole, SessionOutput};

use crate::error::RelayError;

/// Reverse path from the HTTP layer to the game servers.
#[derive(Debug, Clone)]
pub struct CommandChannel {
    output_tx: OutputTx,
}

impl CommandChannel {
    pub fn new(output_tx: OutputTx) -> Self {
        Self { output_tx }
    }

    /// Ask the game servers to teleport `target_uuid` to `coords`.
    ///
    /// Sent to the whole producer group; each server only acts on players it
    /// hosts. Fire-and-forget: nothing confirms delivery.
    pub fn send_teleport_request(&self, coords: LatLon, target_uuid: &str) -> Result<(), RelayError> {
        let envelope = TeleportEnvelope {
            coords: coords.into(),
            uuid: target_uuid.to_string(),
        };
        let frame = ServerEvent::teleport_player(&envelope)?;
        tracing::debug!(uuid = target_uuid, lat = coords.lat, lon = coords.lon, "Sending teleport request");

        self.output_tx
            .send(SessionOutput::to_group(ConnectionRole::Producer, frame))
            .map_err(|_| RelayError::ChannelClosed)
    }
}
