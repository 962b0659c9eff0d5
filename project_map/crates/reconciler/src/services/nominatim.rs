use async_trait::async_trait;
use geo::LatLon;
use serde::Deserialize;

use super::check_status;
use crate::error::ServiceError;
use crate::ports::ReverseGeocoder;

#[derive(Debug, Deserialize)]
struct ReverseResponse {
    display_name: Option<String>,
}

/// Reverse geocoding against a Nominatim instance.
pub struct NominatimGeocoder {
    client: reqwest::Client,
    base_url: String,
}

impl NominatimGeocoder {
    pub fn new(client: reqwest::Client, base_url: impl Into<String>) -> Self {
        Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        }
    }
}

#[async_trait]
impl ReverseGeocoder for NominatimGeocoder {
    async fn display_name(&self, point: LatLon) -> Result<Option<String>, ServiceError> {
        let response = self
            .client
            .get(format!("{}/reverse", self.base_url))
            .query(&[
                ("format", "jsonv2".to_string()),
                ("lat", point.lat.to_string()),
                ("lon", point.lon.to_string()),
            ])
            .send()
            .await?;
        // Points in the sea come back as `{"error": "Unable to geocode"}`.
        let body: ReverseResponse = check_status(response).await?.json().await?;
        Ok(body.display_name.filter(|name| !name.is_empty()))
    }
}
