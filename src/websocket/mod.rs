pub mod handler;
pub mod msg_awareness_handler;
pub mod msg_note_update_handler;
pub mod msg_sync_handler;
pub mod protocol;
