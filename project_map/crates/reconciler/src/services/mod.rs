//! HTTP adapters for the reconciler ports.

pub mod meili;
pub mod nominatim;
pub mod overpass;

use std::time::Duration;

pub use meili::{MeiliIndex, MeiliSettings};
pub use nominatim::NominatimGeocoder;
pub use overpass::OverpassCounter;

use crate::error::ServiceError;

/// Settings shared by every outbound client.
#[derive(Debug, Clone)]
pub struct HttpSettings {
    pub timeout: Duration,
    pub user_agent: String,
}

impl Default for HttpSettings {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(30),
            user_agent: concat!("map_server/", env!("CARGO_PKG_VERSION")).to_string(),
        }
    }
}

pub fn build_client(settings: &HttpSettings) -> Result<reqwest::Client, ServiceError> {
    Ok(reqwest::Client::builder()
        .timeout(settings.timeout)
        .user_agent(settings.user_agent.clone())
        .build()?)
}

/// Turn a non-success response into [`ServiceError::Status`].
pub(crate) async fn check_status(response: reqwest::Response) -> Result<reqwest::Response, ServiceError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text().await.unwrap_or_default();
    Err(ServiceError::Status {
        status: status.as_u16(),
        body,
    })
}
