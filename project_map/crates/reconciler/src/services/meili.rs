use std::time::Duration;

use async_trait::async_trait;
use meilisearch_sdk::client::Client;
use meilisearch_sdk::errors::{Error as MeiliError, ErrorCode};
use meilisearch_sdk::settings::Settings;
use meilisearch_sdk::task_info::TaskInfo;

use crate::error::SearchError;
use crate::ports::{SearchDocument, SearchIndex};

const PRIMARY_KEY: &str = "id";
const GEO_FIELD: &str = "_geo";

#[derive(Debug, Clone)]
pub struct MeiliSettings {
    pub host: String,
    pub api_key: Option<String>,
    pub index: String,
    pub task_poll: Duration,
    pub task_timeout: Duration,
}

/// Search index on a Meilisearch server.
///
/// Every write is an asynchronous task on the server; each call here waits
/// until its task has finished.
pub struct MeiliIndex {
    client: Client,
    settings: MeiliSettings,
}

impl MeiliIndex {
    pub fn new(settings: MeiliSettings) -> Result<Self, SearchError> {
        let client = Client::new(settings.host.trim_end_matches('/'), settings.api_key.clone())?;
        Ok(Self { client, settings })
    }

    fn classify(&self, error: MeiliError) -> SearchError {
        match error {
            MeiliError::Meilisearch(e) if matches!(e.error_code, ErrorCode::IndexNotFound) => {
                SearchError::IndexNotFound(self.settings.index.clone())
            }
            other => SearchError::Meilisearch(other),
        }
    }

    async fn finish(&self, enqueued: Result<TaskInfo, MeiliError>) -> Result<(), SearchError> {
        let info = enqueued.map_err(|e| self.classify(e))?;
        let uid = u64::from(info.task_uid);
        tracing::debug!(task_uid = uid, index = %self.settings.index, "search task enqueued");

        let task = info
            .wait_for_completion(
                &self.client,
                Some(self.settings.task_poll),
                Some(self.settings.task_timeout),
            )
            .await
            .map_err(|e| match e {
                MeiliError::Timeout => SearchError::TaskTimeout(uid),
                other => self.classify(other),
            })?;

        if !task.is_failure() {
            return Ok(());
        }
        let error = task.unwrap_failure();
        if matches!(error.error_code, ErrorCode::IndexNotFound) {
            return Err(SearchError::IndexNotFound(self.settings.index.clone()));
        }
        Err(SearchError::TaskFailed {
            uid,
            message: error.error_message,
        })
    }
}

#[async_trait]
impl SearchIndex for MeiliIndex {
    async fn delete_index(&self) -> Result<(), SearchError> {
        self.finish(self.client.delete_index(&self.settings.index).await)
            .await
    }

    async fn create_index(&self) -> Result<(), SearchError> {
        self.finish(
            self.client
                .create_index(&self.settings.index, Some(PRIMARY_KEY))
                .await,
        )
        .await
    }

    async fn declare_geo_attributes(&self) -> Result<(), SearchError> {
        let settings = Settings::new()
            .with_filterable_attributes([GEO_FIELD])
            .with_sortable_attributes([GEO_FIELD]);
        self.finish(
            self.client
                .index(&self.settings.index)
                .set_settings(&settings)
                .await,
        )
        .await
    }

    async fn add_documents(&self, documents: &[SearchDocument]) -> Result<(), SearchError> {
        self.finish(
            self.client
                .index(&self.settings.index)
                .add_documents(documents, Some(PRIMARY_KEY))
                .await,
        )
        .await
    }
}
