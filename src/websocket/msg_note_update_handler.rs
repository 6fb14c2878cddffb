use chrono::Utc;
use tracing::{debug, error};

use crate::models::{NoteUpdateMessage, SendMessage};
use crate::ws::connctx::ConnCtx;
use crate::ws::room::{Outbound, Room};

/// Handle NoteUpdateMessage
///
/// Not applied to any state: the note is stamped with the sender and the
/// server time and forwarded to everyone else.
pub fn handle_note_update_message(note_msg: &NoteUpdateMessage, ctx: &ConnCtx, room: &mut Room) {
    let stamped = SendMessage::NoteUpdate(NoteUpdateMessage {
        note_id: note_msg.note_id.clone(),
        content: note_msg.content.clone(),
        user_id: Some(ctx.user_id.clone()),
        timestamp: Some(Utc::now().timestamp_millis()),
    });

    let outbound = match Outbound::notice(&stamped) {
        Ok(outbound) => outbound,
        Err(e) => {
            error!(document_id = %ctx.document_id, "Failed to encode note-update frame: {e}");
            return;
        }
    };
    let delivered = room.broadcast(Some(ctx.conn_id), &outbound);
    debug!(document_id = %ctx.document_id, note_id = %note_msg.note_id, delivered, "note update relayed");
}
