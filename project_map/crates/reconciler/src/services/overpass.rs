use async_trait::async_trait;
use serde_json::Value;

use super::check_status;
use crate::error::ServiceError;
use crate::ports::BuildingCounter;

/// Building counts from an Overpass API interpreter endpoint.
pub struct OverpassCounter {
    client: reqwest::Client,
    url: String,
    query_timeout_secs: u64,
}

impl OverpassCounter {
    pub fn new(client: reqwest::Client, url: impl Into<String>, query_timeout_secs: u64) -> Self {
        Self {
            client,
            url: url.into(),
            query_timeout_secs,
        }
    }

    fn query(&self, polygon_filter: &str) -> String {
        format!(
            "[out:json][timeout:{t}];(way[\"building\"](poly:\"{p}\");relation[\"building\"](poly:\"{p}\"););out count;",
            t = self.query_timeout_secs,
            p = polygon_filter,
        )
    }
}

/// `elements[0].tags.total`, which Overpass reports as a string.
fn total_from_response(body: &Value) -> u64 {
    let total = &body["elements"][0]["tags"]["total"];
    match total {
        Value::String(s) => s.trim().parse().unwrap_or(0),
        Value::Number(n) => n.as_u64().unwrap_or(0),
        _ => 0,
    }
}

#[async_trait]
impl BuildingCounter for OverpassCounter {
    async fn count_buildings(&self, polygon_filter: &str) -> Result<u64, ServiceError> {
        let query = self.query(polygon_filter);
        let response = self
            .client
            .post(&self.url)
            .form(&[("data", query.as_str())])
            .send()
            .await?;
        let body: Value = check_status(response).await?.json().await?;
        Ok(total_from_response(&body))
    }
}
