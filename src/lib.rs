//! In-memory relay for real-time collaborative documents.
//!
//! Each `documentId` gets one Loro document, one presence store and the set
//! of WebSocket connections editing it. Updates from one connection are
//! applied locally and relayed to every other connection on the same
//! document; state lives only as long as someone is connected.

pub mod config;
pub mod docs;
pub mod error;
pub mod handlers;
pub mod models;
pub mod routes;
pub mod utils;
pub mod websocket;
pub mod ws;

pub use config::Config;
pub use routes::create_app;
pub use ws::relay::Relay;
