use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tokio::task::JoinHandle;
use tracing::{debug, info};

use super::connctx::ConnCtx;
use super::room::{PeerSender, Room};
use crate::config::Config;

/// Counters reported by the diagnostics endpoint.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct RelayStats {
    pub rooms: usize,
    pub connections: usize,
    pub nonempty_docs: usize,
    pub presence_entries: usize,
}

/// The collaboration relay: every room of the process, keyed by `documentId`.
///
/// One instance is created at startup and shared by `Arc` with the router and
/// every connection task. Each event runs to completion under the registry
/// lock, so a document's state, presence and connection set are never
/// observed half-updated.
pub struct Relay {
    config: Config,
    rooms: Mutex<HashMap<String, Room>>,
}

impl Relay {
    pub fn new(config: Config) -> Self {
        info!("Relay initialized");
        Self {
            config,
            rooms: Mutex::new(HashMap::new()),
        }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    fn rooms(&self) -> MutexGuard<'_, HashMap<String, Room>> {
        self.rooms.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Get the room for `document_id`, creating an empty one if needed.
    fn ensure<'a>(rooms: &'a mut HashMap<String, Room>, document_id: &str, presence_timeout_ms: i64) -> &'a mut Room {
        rooms.entry(document_id.to_string()).or_insert_with(|| {
            info!(document_id, "creating room");
            Room::new(presence_timeout_ms)
        })
    }

    /// Discard the room if no connection is left. Returns whether it was
    /// discarded.
    fn release(rooms: &mut HashMap<String, Room>, document_id: &str) -> bool {
        if !rooms.get(document_id).is_some_and(Room::is_empty) {
            return false;
        }
        if let Some(room) = rooms.remove(document_id) {
            room.dispose();
            info!(document_id, "last connection left, room discarded");
        }
        true
    }

    /// Register a connection and run `on_joined` while the room is still
    /// locked, so nothing can reach the newcomer before it.
    pub fn join<R>(&self, ctx: &ConnCtx, tx: PeerSender, on_joined: impl FnOnce(&mut Room) -> R) -> R {
        let mut rooms = self.rooms();
        let room = Self::ensure(&mut rooms, &ctx.document_id, self.config.presence_timeout_ms);
        room.join(ctx, tx);
        debug!(document_id = %ctx.document_id, conn_id = %ctx.conn_id, members = room.len(), "joined");
        on_joined(room)
    }

    /// Remove a connection. `on_left` runs only if other connections remain;
    /// otherwise the room is released.
    pub fn leave<R>(&self, ctx: &ConnCtx, on_left: impl FnOnce(&mut Room) -> R) -> Option<R> {
        let mut rooms = self.rooms();
        let room = rooms.get_mut(&ctx.document_id)?;
        room.leave(ctx.conn_id);
        debug!(document_id = %ctx.document_id, conn_id = %ctx.conn_id, members = room.len(), "left");
        let result = if room.is_empty() { None } else { Some(on_left(room)) };
        Self::release(&mut rooms, &ctx.document_id);
        result
    }

    /// Run `f` against a live room, if any.
    pub fn with_room<R>(&self, document_id: &str, f: impl FnOnce(&mut Room) -> R) -> Option<R> {
        let mut rooms = self.rooms();
        let room = rooms.get_mut(document_id)?;
        let result = f(room);
        // Fan-out may have evicted the last members.
        Self::release(&mut rooms, document_id);
        Some(result)
    }

    pub fn room_count(&self) -> usize {
        self.rooms().len()
    }

    pub fn stats(&self) -> RelayStats {
        let rooms = self.rooms();
        rooms.values().fold(
            RelayStats {
                rooms: rooms.len(),
                ..RelayStats::default()
            },
            |mut stats, room| {
                stats.connections += room.len();
                stats.presence_entries += room.presence().len();
                if !room.doc().is_empty() {
                    stats.nonempty_docs += 1;
                }
                stats
            },
        )
    }

    /// Drop expired presence entries in every room.
    pub fn sweep_presence(&self) -> usize {
        let rooms = self.rooms();
        let removed: usize = rooms.values().map(|room| room.presence().remove_outdated()).sum();
        if removed > 0 {
            debug!(removed, "expired presence entries removed");
        }
        removed
    }

    pub fn spawn_presence_sweeper(self: &Arc<Self>) -> JoinHandle<()> {
        let relay = Arc::clone(self);
        let period = self.config.presence_sweep_interval();
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(period);
            ticker.tick().await;
            loop {
                ticker.tick().await;
                relay.sweep_presence();
            }
        })
    }

    /// Close every connection and discard every room.
    pub fn shutdown(&self) {
        let mut rooms = self.rooms();
        let count = rooms.len();
        for (_, mut room) in rooms.drain() {
            room.close_all();
            room.dispose();
        }
        info!(rooms = count, "Relay shut down");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ws::connctx::WireFormat;
    use axum::extract::ws::Message;
    use tokio::sync::mpsc;

    fn connect(relay: &Relay, document_id: &str) -> (ConnCtx, mpsc::Receiver<Message>) {
        let ctx = ConnCtx::new(document_id, "user", WireFormat::Json);
        let (tx, rx) = mpsc::channel(16);
        relay.join(&ctx, tx, |_| ());
        (ctx, rx)
    }

    #[test]
    fn ensure_is_idempotent_and_release_waits_for_the_last_leave() {
        let relay = Relay::new(Config::default());
        let (a, _rx_a) = connect(&relay, "doc1");
        let (b, _rx_b) = connect(&relay, "doc1");
        let (_c, _rx_c) = connect(&relay, "doc2");
        assert_eq!(relay.room_count(), 2);
        assert_eq!(relay.stats().connections, 3);

        assert_eq!(relay.leave(&a, |room| room.len()), Some(1));
        assert_eq!(relay.room_count(), 2);
        assert_eq!(relay.leave(&b, |room| room.len()), None);
        assert_eq!(relay.room_count(), 1);
        assert!(relay.with_room("doc1", |_| ()).is_none());
    }

    #[test]
    fn leaving_an_unknown_room_is_a_no_op() {
        let relay = Relay::new(Config::default());
        let ctx = ConnCtx::new("ghost", "user", WireFormat::Json);
        assert_eq!(relay.leave(&ctx, |_| ()), None);
    }

    #[test]
    fn shutdown_closes_members_and_clears_rooms() {
        let relay = Relay::new(Config::default());
        let (_a, mut rx_a) = connect(&relay, "doc1");
        relay.shutdown();
        assert_eq!(relay.room_count(), 0);
        assert!(matches!(rx_a.try_recv(), Ok(Message::Close(None))));
    }

    #[test]
    fn stats_count_documents_and_presence() {
        let relay = Relay::new(Config::default());
        let (a, _rx) = connect(&relay, "doc1");
        relay.with_room(&a.document_id, |room| {
            room.doc()
                .apply_update(&crate::ws::document::tests::text_update(1, "hi"))
                .unwrap();
            room.presence()
                .apply_remote(&crate::ws::presence::tests::cursor_update("alice", 1))
                .unwrap();
        });
        assert_eq!(
            relay.stats(),
            RelayStats {
                rooms: 1,
                connections: 1,
                nonempty_docs: 1,
                presence_entries: 1,
            }
        );
    }

    #[tokio::test]
    async fn background_sweeper_expires_presence() {
        let relay = Arc::new(Relay::new(Config {
            presence_timeout_ms: 50,
            presence_sweep_secs: 1,
            ..Config::default()
        }));
        let (a, _rx) = connect(&relay, "doc1");
        relay.with_room(&a.document_id, |room| {
            room.presence()
                .apply_remote(&crate::ws::presence::tests::cursor_update("alice", 1))
                .unwrap();
        });
        assert_eq!(relay.stats().presence_entries, 1);

        let sweeper = relay.spawn_presence_sweeper();
        tokio::time::sleep(std::time::Duration::from_millis(1_500)).await;
        assert_eq!(relay.stats().presence_entries, 0);
        sweeper.abort();
    }
}
