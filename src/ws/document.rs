use loro::{ExportMode, LoroDoc};

use crate::error::RelayError;

/// The replicated document held for one `documentId`.
///
/// The relay never derives deltas itself: inbound updates are imported and
/// relayed verbatim, and newcomers receive a full snapshot.
pub struct SharedDoc {
    doc: LoroDoc,
}

impl SharedDoc {
    pub fn new() -> Self {
        Self { doc: LoroDoc::new() }
    }

    /// Import a binary update. A rejected update leaves the document untouched.
    pub fn apply_update(&self, update: &[u8]) -> Result<(), RelayError> {
        if update.is_empty() {
            return Err(RelayError::DocumentUpdate("empty update".to_string()));
        }
        self.doc
            .import(update)
            .map(|_| ())
            .map_err(|e| RelayError::DocumentUpdate(e.to_string()))
    }

    pub fn is_empty(&self) -> bool {
        self.doc.oplog_vv().is_empty()
    }

    /// Full state as a snapshot.
    pub fn encode_state(&self) -> Result<Vec<u8>, RelayError> {
        self.doc
            .export(ExportMode::Snapshot)
            .map_err(|e| RelayError::Snapshot(e.to_string()))
    }
}

impl Default for SharedDoc {
    fn default() -> Self {
        Self::new()
    }
}
