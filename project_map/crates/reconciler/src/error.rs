/// Failure talking to an external HTTP service.
#[derive(Debug, thiserror::Error)]
pub enum ServiceError {
    #[error("request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("unexpected status {status}: {body}")]
    Status { status: u16, body: String },

    #[error("malformed response: {0}")]
    Malformed(String),
}

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("region not found: {0}")]
    RegionNotFound(String),

    #[error("region store error: {0}")]
    Backend(String),
}

#[derive(Debug, thiserror::Error)]
pub enum SearchError {
    #[error("search index not found: {0}")]
    IndexNotFound(String),

    #[error("search task {uid} failed: {message}")]
    TaskFailed { uid: u64, message: String },

    #[error("search task {0} did not finish in time")]
    TaskTimeout(u64),

    #[error("search engine error: {0}")]
    Meilisearch(#[from] meilisearch_sdk::errors::Error),
}

/// Errors surfaced to the caller of a pass or while wiring the services;
/// per-region failures never get here.
#[derive(Debug, thiserror::Error)]
pub enum ReconcileError {
    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Search(#[from] SearchError),

    #[error(transparent)]
    Service(#[from] ServiceError),
}
