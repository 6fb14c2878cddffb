use serde::Deserialize;
use uuid::Uuid;

/// Encoding a connection uses for sync and awareness payloads.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WireFormat {
    /// JSON envelopes with `data` as an array of byte values.
    #[default]
    Json,
    /// One tag byte followed by the raw update.
    Binary,
}

/// Identity of one live connection. Bound to a single document for its
/// whole lifetime.
#[derive(Clone, Debug)]
pub struct ConnCtx {
    pub conn_id: Uuid,
    pub document_id: String,
    pub user_id: String,
    pub format: WireFormat,
}

impl ConnCtx {
    pub fn new(document_id: impl Into<String>, user_id: impl Into<String>, format: WireFormat) -> Self {
        Self {
            conn_id: Uuid::new_v4(),
            document_id: document_id.into(),
            user_id: user_id.into(),
            format,
        }
    }
}
