//! Transport layer (WebSocket).
//!
//! Bridges sockets to [`crate::broker::NodeSession`]; routing decisions live
//! in the broker so in-process attachments behave the same way.

pub mod codec;
pub mod ws;
