#[derive(Debug, thiserror::Error)]
pub enum RelayError {
    #[error("relay output channel closed")]
    ChannelClosed,

    #[error("failed to encode frame: {0}")]
    Encode(#[from] serde_json::Error),
}
