use tracing::{debug, error, warn};

use crate::models::AwarenessMessage;
use crate::ws::connctx::ConnCtx;
use crate::ws::room::{Outbound, Room};

/// Handle AwarenessMessage - Apply as a remote update and Broadcast
pub fn handle_awareness_message(awareness_msg: &AwarenessMessage, raw: Option<&str>, ctx: &ConnCtx, room: &mut Room) {
    if let Err(e) = room.presence().apply_remote(&awareness_msg.data) {
        warn!(document_id = %ctx.document_id, conn_id = %ctx.conn_id, user_id = %ctx.user_id, "{e}");
        return;
    }

    let outbound = match Outbound::awareness(&awareness_msg.data, raw) {
        Ok(outbound) => outbound,
        Err(e) => {
            error!(document_id = %ctx.document_id, "Failed to encode awareness frame: {e}");
            return;
        }
    };
    let delivered = room.broadcast(Some(ctx.conn_id), &outbound);
    debug!(document_id = %ctx.document_id, conn_id = %ctx.conn_id, delivered, "awareness relayed");
}
