use axum::extract::ws::Message;
use tokio::sync::mpsc::{self, error::TrySendError};
use tracing::{debug, warn};
use uuid::Uuid;

use super::connctx::{ConnCtx, WireFormat};
use super::document::SharedDoc;
use super::presence::Presence;
use crate::error::RelayError;
use crate::models::{
    encode_binary_frame, AwarenessMessage, SendMessage, SyncMessage, BINARY_AWARENESS_TAG, BINARY_SYNC_TAG,
};

/// Bounded queue feeding a connection's writer task.
pub type PeerSender = mpsc::Sender<Message>;

/// One frame encoded for every wire format, so a broadcast serializes once.
#[derive(Clone, Debug)]
pub struct Outbound {
    text: String,
    binary: Option<Vec<u8>>,
}

impl Outbound {
    /// A notification; JSON for every recipient.
    pub fn notice(msg: &SendMessage) -> Result<Self, RelayError> {
        Ok(Self {
            text: serde_json::to_string(msg)?,
            binary: None,
        })
    }

    /// A sync payload. `raw` is reused verbatim when the frame arrived as JSON.
    pub fn sync(data: &[u8], raw: Option<&str>) -> Result<Self, RelayError> {
        let text = match raw {
            Some(raw) => raw.to_string(),
            None => serde_json::to_string(&SendMessage::Sync(SyncMessage { data: data.to_vec() }))?,
        };
        Ok(Self {
            text,
            binary: Some(encode_binary_frame(BINARY_SYNC_TAG, data)),
        })
    }

    pub fn awareness(data: &[u8], raw: Option<&str>) -> Result<Self, RelayError> {
        let text = match raw {
            Some(raw) => raw.to_string(),
            None => serde_json::to_string(&SendMessage::Awareness(AwarenessMessage { data: data.to_vec() }))?,
        };
        Ok(Self {
            text,
            binary: Some(encode_binary_frame(BINARY_AWARENESS_TAG, data)),
        })
    }

    fn message_for(&self, format: WireFormat) -> Message {
        match (format, &self.binary) {
            (WireFormat::Binary, Some(bytes)) => Message::Binary(bytes.clone()),
            _ => Message::Text(self.text.clone()),
        }
    }
}

struct Peer {
    conn_id: Uuid,
    user_id: String,
    format: WireFormat,
    tx: PeerSender,
}

impl Peer {
    /// Queue a frame without waiting. A closed or full queue means the
    /// member must be evicted.
    fn deliver(&self, outbound: &Outbound) -> bool {
        match self.tx.try_send(outbound.message_for(self.format)) {
            Ok(()) => true,
            Err(TrySendError::Full(_)) => {
                warn!(conn_id = %self.conn_id, user_id = %self.user_id, "subscriber queue full, evicting slow consumer");
                false
            }
            Err(TrySendError::Closed(_)) => {
                debug!(conn_id = %self.conn_id, user_id = %self.user_id, "subscriber queue closed");
                false
            }
        }
    }
}

/// Everything held for one `documentId`: the document, its presence state
/// and the set of connections subscribed to it.
pub struct Room {
    doc: SharedDoc,
    presence: Presence,
    peers: Vec<Peer>,
}

impl Room {
    pub fn new(presence_timeout_ms: i64) -> Self {
        Self {
            doc: SharedDoc::new(),
            presence: Presence::new(presence_timeout_ms),
            peers: Vec::new(),
        }
    }

    pub fn doc(&self) -> &SharedDoc {
        &self.doc
    }

    pub fn presence(&self) -> &Presence {
        &self.presence
    }

    pub fn len(&self) -> usize {
        self.peers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.peers.is_empty()
    }

    pub fn contains(&self, conn_id: Uuid) -> bool {
        self.peers.iter().any(|p| p.conn_id == conn_id)
    }

    pub fn join(&mut self, ctx: &ConnCtx, tx: PeerSender) {
        if !self.contains(ctx.conn_id) {
            self.peers.push(Peer {
                conn_id: ctx.conn_id,
                user_id: ctx.user_id.clone(),
                format: ctx.format,
                tx,
            });
        }
    }

    /// Returns whether the connection was a member.
    pub fn leave(&mut self, conn_id: Uuid) -> bool {
        let before = self.peers.len();
        self.peers.retain(|p| p.conn_id != conn_id);
        self.peers.len() != before
    }

    /// Send to a single member; a dead or backed-up member is evicted.
    pub fn send_to(&mut self, conn_id: Uuid, outbound: &Outbound) -> bool {
        let Some(idx) = self.peers.iter().position(|p| p.conn_id == conn_id) else {
            return false;
        };
        if !self.peers[idx].deliver(outbound) {
            self.peers.remove(idx);
            return false;
        }
        true
    }

    /// Fan out to every member except `from`. Members whose queue is gone or
    /// full are evicted and delivery continues with the rest. Returns the
    /// number of members reached.
    ///
    /// Dropping an evicted member's sender ends its writer task, which in
    /// turn closes the socket.
    pub fn broadcast(&mut self, from: Option<Uuid>, outbound: &Outbound) -> usize {
        let mut delivered = 0;
        let mut dead: Vec<Uuid> = Vec::new();
        for peer in self.peers.iter() {
            if Some(peer.conn_id) == from {
                continue;
            }
            if peer.deliver(outbound) {
                delivered += 1;
            } else {
                dead.push(peer.conn_id);
            }
        }
        if !dead.is_empty() {
            self.peers.retain(|p| !dead.contains(&p.conn_id));
            debug!(removed = dead.len(), "removed dead subscribers");
        }
        delivered
    }

    /// Ask every member's writer to close the socket.
    pub fn close_all(&mut self) {
        for peer in self.peers.drain(..) {
            let _ = peer.tx.try_send(Message::Close(None));
        }
    }

    pub fn dispose(self) {
        self.presence.dispose();
    }
}
