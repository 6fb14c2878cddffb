pub mod connctx;
pub mod document;
pub mod presence;
pub mod relay;
pub mod room;
