use chrono::Utc;
use tracing::{error, info, warn};

use super::msg_awareness_handler::handle_awareness_message;
use super::msg_note_update_handler::handle_note_update_message;
use super::msg_sync_handler::handle_sync_message;
use crate::models::{decode_binary_frame, decode_text_frame, PeerMessage, ReceivedMessage, SendMessage};
use crate::ws::connctx::ConnCtx;
use crate::ws::relay::Relay;
use crate::ws::room::{Outbound, PeerSender, Room};

/// CONNECTING -> OPEN: join the room, hand the newcomer a snapshot and tell
/// everyone else who arrived.
pub fn open_session(relay: &Relay, ctx: &ConnCtx, tx: PeerSender) {
    relay.join(ctx, tx, |room| {
        send_snapshot(ctx, room);
        announce(ctx, room, SendMessage::UserJoined(peer_notice(ctx)));
    });
    info!(document_id = %ctx.document_id, conn_id = %ctx.conn_id, user_id = %ctx.user_id, "session opened");
}

/// OPEN -> CLOSED: leave the room and tell the survivors, if any.
pub fn close_session(relay: &Relay, ctx: &ConnCtx) {
    relay.leave(ctx, |room| {
        announce(ctx, room, SendMessage::UserLeft(peer_notice(ctx)));
    });
    info!(document_id = %ctx.document_id, conn_id = %ctx.conn_id, user_id = %ctx.user_id, "session closed");
}

/// Handle a JSON text frame. Bad frames are logged and dropped.
pub fn handle_text(relay: &Relay, ctx: &ConnCtx, text: &str) {
    match decode_text_frame(text) {
        Ok(msg) => dispatch(relay, ctx, msg, Some(text)),
        Err(e) => warn!(document_id = %ctx.document_id, conn_id = %ctx.conn_id, "Dropping frame: {e}"),
    }
}

/// Handle a binary frame. Bad frames are logged and dropped.
pub fn handle_binary(relay: &Relay, ctx: &ConnCtx, bytes: &[u8]) {
    match decode_binary_frame(bytes) {
        Ok(msg) => dispatch(relay, ctx, msg, None),
        Err(e) => warn!(document_id = %ctx.document_id, conn_id = %ctx.conn_id, "Dropping frame: {e}"),
    }
}

fn dispatch(relay: &Relay, ctx: &ConnCtx, msg: ReceivedMessage, raw: Option<&str>) {
    let handled = relay.with_room(&ctx.document_id, |room| match &msg {
        ReceivedMessage::Sync(sync_msg) => handle_sync_message(sync_msg, raw, ctx, room),
        ReceivedMessage::Awareness(awareness_msg) => handle_awareness_message(awareness_msg, raw, ctx, room),
        ReceivedMessage::NoteUpdate(note_msg) => handle_note_update_message(note_msg, ctx, room),
    });
    if handled.is_none() {
        warn!(document_id = %ctx.document_id, conn_id = %ctx.conn_id, "Frame for a discarded room dropped");
    }
}

fn send_snapshot(ctx: &ConnCtx, room: &mut Room) {
    if !room.doc().is_empty() {
        match room.doc().encode_state().and_then(|state| Outbound::sync(&state, None)) {
            Ok(outbound) => {
                room.send_to(ctx.conn_id, &outbound);
            }
            Err(e) => error!(document_id = %ctx.document_id, "Failed to build document snapshot: {e}"),
        }
    }
    if !room.presence().is_empty() {
        match Outbound::awareness(&room.presence().encode_all(), None) {
            Ok(outbound) => {
                room.send_to(ctx.conn_id, &outbound);
            }
            Err(e) => error!(document_id = %ctx.document_id, "Failed to build presence snapshot: {e}"),
        }
    }
}

fn announce(ctx: &ConnCtx, room: &mut Room, msg: SendMessage) {
    match Outbound::notice(&msg) {
        Ok(outbound) => {
            room.broadcast(Some(ctx.conn_id), &outbound);
        }
        Err(e) => error!(document_id = %ctx.document_id, "Failed to encode notification: {e}"),
    }
}

fn peer_notice(ctx: &ConnCtx) -> PeerMessage {
    PeerMessage {
        user_id: ctx.user_id.clone(),
        timestamp: Utc::now().timestamp_millis(),
    }
}
