use tracing::{debug, error, warn};

use crate::models::SyncMessage;
use crate::ws::connctx::ConnCtx;
use crate::ws::room::{Outbound, Room};

/// Handle SyncMessage - Apply and Broadcast
pub fn handle_sync_message(sync_msg: &SyncMessage, raw: Option<&str>, ctx: &ConnCtx, room: &mut Room) {
    if let Err(e) = room.doc().apply_update(&sync_msg.data) {
        warn!(document_id = %ctx.document_id, conn_id = %ctx.conn_id, user_id = %ctx.user_id, "{e}");
        return;
    }

    let outbound = match Outbound::sync(&sync_msg.data, raw) {
        Ok(outbound) => outbound,
        Err(e) => {
            error!(document_id = %ctx.document_id, "Failed to encode sync frame: {e}");
            return;
        }
    };
    let delivered = room.broadcast(Some(ctx.conn_id), &outbound);
    debug!(
        document_id = %ctx.document_id,
        conn_id = %ctx.conn_id,
        bytes = sync_msg.data.len(),
        delivered,
        "sync relayed"
    );
}
