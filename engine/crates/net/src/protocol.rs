use serde::{Deserialize, Serialize};

/// Event sent by a connection (adjacently tagged JSON: `{"event": .., "data": ..}`).
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "event", content = "data", rename_all = "camelCase")]
pub enum ClientEvent {
    /// `"[uuid;lat;lon;name, uuid;lat;lon;name, ...]"`
    PlayerLocationUpdate(String),
    /// Bare player uuid.
    PlayerDisconnect(String),
}

/// Event sent to connections. Payloads are JSON documents encoded as strings.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "event", content = "data", rename_all = "camelCase")]
pub enum ServerEvent {
    PlayerLocations(String),
    TeleportPlayer(String),
}

impl ServerEvent {
    /// Frame carrying a player snapshot.
    pub fn player_locations<P: Serialize>(
        collection: &FeatureCollection<P>,
    ) -> Result<String, serde_json::Error> {
        let payload = serde_json::to_string(collection)?;
        serde_json::to_string(&ServerEvent::PlayerLocations(payload))
    }

    /// Frame carrying a teleport command.
    pub fn teleport_player(envelope: &TeleportEnvelope) -> Result<String, serde_json::Error> {
        let payload = serde_json::to_string(envelope)?;
        serde_json::to_string(&ServerEvent::TeleportPlayer(payload))
    }
}

/// GeoJSON `FeatureCollection`.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type")]
pub struct FeatureCollection<P> {
    pub features: Vec<Feature<P>>,
}

impl<P> FeatureCollection<P> {
    pub fn new(features: Vec<Feature<P>>) -> Self {
        Self { features }
    }

    pub fn empty() -> Self {
        Self { features: Vec::new() }
    }

    pub fn len(&self) -> usize {
        self.features.len()
    }

    pub fn is_empty(&self) -> bool {
        self.features.is_empty()
    }
}

/// GeoJSON `Feature`.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type")]
pub struct Feature<P> {
    pub properties: P,
    pub geometry: Geometry,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type")]
pub enum Geometry {
    Point { coordinates: [f64; 2] },
    Polygon { coordinates: Vec<Vec<[f64; 2]>> },
}

/// Properties of a player point. Coordinates are `[lat, lon]`, the order the
/// map frontend expects for player markers.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PlayerProperties {
    pub username: String,
    pub uuid: String,
}

/// Wire representation of a teleport command.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TeleportEnvelope {
    pub coords: [f64; 2],
    pub uuid: String,
}

/// One decoded `uuid;lat;lon;name` tuple.
#[derive(Debug, Clone, PartialEq)]
pub struct PlayerLocation {
    pub uuid: String,
    pub lat: f64,
    pub lon: f64,
    pub display_name: String,
}

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum TupleParseError {
    #[error("expected 4 fields in '{segment}', found {found}")]
    WrongFieldCount { segment: String, found: usize },

    #[error("empty uuid in '{0}'")]
    EmptyUuid(String),

    #[error("invalid {field} '{value}' in '{segment}'")]
    InvalidCoordinate {
        segment: String,
        field: &'static str,
        value: String,
    },
}

/// Decode a position batch.
///
/// Every tuple is parsed on its own: a bad tuple yields an `Err` entry and the
/// rest of the batch is still returned.
pub fn parse_location_batch(payload: &str) -> Vec<Result<PlayerLocation, TupleParseError>> {
    let trimmed = payload.trim();
    let inner = trimmed.strip_prefix('[').unwrap_or(trimmed);
    let inner = inner.strip_suffix(']').unwrap_or(inner);

    inner
        .split(',')
        .map(str::trim)
        .filter(|segment| !segment.is_empty())
        .map(parse_tuple)
        .collect()
}

fn parse_tuple(segment: &str) -> Result<PlayerLocation, TupleParseError> {
    let fields: Vec<&str> = segment.split(';').collect();
    if fields.len() != 4 {
        return Err(TupleParseError::WrongFieldCount {
            segment: segment.to_string(),
            found: fields.len(),
        });
    }

    let uuid = fields[0].trim();
    if uuid.is_empty() {
        return Err(TupleParseError::EmptyUuid(segment.to_string()));
    }

    let lat = parse_coordinate(segment, "lat", fields[1])?;
    let lon = parse_coordinate(segment, "lon", fields[2])?;

    Ok(PlayerLocation {
        uuid: uuid.to_string(),
        lat,
        lon,
        display_name: fields[3].trim().to_string(),
    })
}

fn parse_coordinate(segment: &str, field: &'static str, raw: &str) -> Result<f64, TupleParseError> {
    raw.trim()
        .parse::<f64>()
        .ok()
        .filter(|v| v.is_finite())
        .ok_or_else(|| TupleParseError::InvalidCoordinate {
            segment: segment.to_string(),
            field,
            value: raw.trim().to_string(),
        })
}
