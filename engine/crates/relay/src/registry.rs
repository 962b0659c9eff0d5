use geo::LatLon;
use net::protocol::{Feature, FeatureCollection, Geometry, PlayerProperties};
use session::SessionId;

/// Last known state of a tracked player.
#[derive(Debug, Clone, PartialEq)]
pub struct PlayerRecord {
    pub uuid: String,
    pub position: LatLon,
    pub display_name: String,
    /// Producer connection that last reported this player.
    pub source: SessionId,
}

/// In-memory table of tracked players, in first-seen order.
///
/// Lookups are linear scans; the population is a few hundred players at most.
#[derive(Debug, Default)]
pub struct PlayerRegistry {
    players: Vec<PlayerRecord>,
}

impl PlayerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the record with the same uuid in place, or append it.
    pub fn upsert(&mut self, record: PlayerRecord) {
        match self.players.iter_mut().find(|p| p.uuid == record.uuid) {
            Some(existing) => *existing = record,
            None => self.players.push(record),
        }
    }

    /// Remove a player. Unknown uuids are ignored.
    pub fn remove(&mut self, uuid: &str) -> bool {
        let before = self.players.len();
        self.players.retain(|p| p.uuid != uuid);
        self.players.len() != before
    }

    /// Remove every player last reported by `source`, returning how many went.
    pub fn remove_by_source(&mut self, source: SessionId) -> usize {
        let before = self.players.len();
        self.players.retain(|p| p.source != source);
        before - self.players.len()
    }

    pub fn get(&self, uuid: &str) -> Option<&PlayerRecord> {
        self.players.iter().find(|p| p.uuid == uuid)
    }

    pub fn len(&self) -> usize {
        self.players.len()
    }

    pub fn is_empty(&self) -> bool {
        self.players.is_empty()
    }

    pub fn snapshot_as_feature_collection(&self) -> FeatureCollection<PlayerProperties> {
        FeatureCollection::new(
            self.players
                .iter()
                .map(|p| Feature {
                    properties: PlayerProperties {
                        username: p.display_name.clone(),
                        uuid: p.uuid.clone(),
                    },
                    geometry: Geometry::Point {
                        coordinates: [p.position.lat, p.position.lon],
                    },
                })
                .collect(),
        )
    }
}
