/// Errors raised while applying or encoding relay state.
#[derive(Debug, thiserror::Error)]
pub enum RelayError {
    #[error("document update rejected: {0}")]
    DocumentUpdate(String),
    #[error("presence update rejected: {0}")]
    PresenceUpdate(String),
    #[error("failed to export document snapshot: {0}")]
    Snapshot(String),
    #[error("failed to serialize frame: {0}")]
    Encode(#[from] serde_json::Error),
}
