use async_trait::async_trait;
use geo::LatLon;
use serde::Serialize;

use crate::error::{SearchError, ServiceError, StoreError};

/// Read-only view of a stored region.
#[derive(Debug, Clone, PartialEq)]
pub struct RegionSnapshot {
    pub id: String,
    /// Open ring; the closing vertex is implied.
    pub vertices: Vec<LatLon>,
    pub city: String,
    pub username: String,
    pub buildings_count: u64,
    pub search_display_name: Option<String>,
}

/// Persistence port for regions.
///
/// Pages are returned in a stable order so offsets stay meaningful across a
/// pass. Write-backs touch exactly one field of one region.
#[async_trait]
pub trait RegionStore: Send + Sync {
    async fn region_count(&self) -> Result<usize, StoreError>;

    async fn regions_page(&self, offset: usize, limit: usize) -> Result<Vec<RegionSnapshot>, StoreError>;

    async fn set_buildings_count(&self, region_id: &str, count: u64) -> Result<(), StoreError>;

    async fn set_search_display_name(&self, region_id: &str, display_name: &str) -> Result<(), StoreError>;
}

/// Counts buildings inside a polygon filter (`"lat lon lat lon ..."`).
#[async_trait]
pub trait BuildingCounter: Send + Sync {
    /// Missing or malformed counts come back as `Ok(0)`.
    async fn count_buildings(&self, polygon_filter: &str) -> Result<u64, ServiceError>;
}

#[async_trait]
pub trait ReverseGeocoder: Send + Sync {
    /// Human-readable name for a point, if the service knows one.
    async fn display_name(&self, point: LatLon) -> Result<Option<String>, ServiceError>;
}

/// Geo point in the search engine's field naming.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct GeoPoint {
    pub lat: f64,
    pub lng: f64,
}

impl From<LatLon> for GeoPoint {
    fn from(p: LatLon) -> Self {
        Self { lat: p.lat, lng: p.lon }
    }
}

/// Flattened region as submitted to the search index.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SearchDocument {
    pub id: String,
    pub city: String,
    #[serde(rename = "_geo")]
    pub geo: GeoPoint,
    #[serde(rename = "displayName")]
    pub display_name: Option<String>,
    pub username: String,
}

#[async_trait]
pub trait SearchIndex: Send + Sync {
    /// Returns [`SearchError::IndexNotFound`] when there is nothing to delete.
    async fn delete_index(&self) -> Result<(), SearchError>;

    async fn create_index(&self) -> Result<(), SearchError>;

    /// Make `_geo` filterable and sortable.
    async fn declare_geo_attributes(&self) -> Result<(), SearchError>;

    async fn add_documents(&self, documents: &[SearchDocument]) -> Result<(), SearchError>;
}
