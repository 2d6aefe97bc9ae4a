//! dynbus router library entry.
//!
//! Named nodes connect over WebSocket, register under a name and exchange
//! envelopes addressed by name. The router stamps the sender, enforces the
//! configured addressing rules and tells contacts when a node goes away.
//! Consumed by the binary (`main.rs`) and by integration tests, which attach
//! in-process nodes through [`broker::Broker::attach`].

pub mod app_state;
pub mod broker;
pub mod config;
pub mod obs;
pub mod ops;
pub mod router;
pub mod transport;
