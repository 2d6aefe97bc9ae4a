//! dynbus RPC runtime.
//!
//! An [`Endpoint`] is one connection to the router. It can serve calls
//! against local objects ([`server::Server`]) and call into objects owned by
//! other nodes ([`client::ServerProxy`], [`client::ObjectProxy`]) over the
//! same connection at the same time.
//!
//! ```no_run
//! # async fn demo() -> dynbus_core::Result<()> {
//! use dynbus_rpc::{args, Endpoint, EndpointConfig};
//!
//! let endpoint = Endpoint::connect(&EndpointConfig::default(), None).await?;
//! let browser = endpoint.connect_to("browser").await?;
//! browser.register_constructor("Window");
//! let root = browser.get_root_object().await?;
//! root.call("alert", args!["hello"]).await?;
//! # Ok(()) }
//! ```

#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]
#![deny(clippy::panic)]

pub mod client;
pub mod config;
pub mod endpoint;
pub mod server;
pub mod transport;

pub use client::{Arg, Attribute, BoundMethod, ObjectProxy, Returned, ServerProxy};
pub use config::EndpointConfig;
pub use endpoint::Endpoint;
pub use server::{Class, ClassBuilder, Local, Params, RemoteObject, Server};
pub use transport::Transport;
