//! dynbus core: wire contracts and the shared error surface.
//!
//! This crate defines the envelope/message formats, handle markers and
//! Constructor Specs shared by the router and the RPC runtime. It carries no
//! transport or runtime dependencies so both sides can reuse it.
//!
//! Panics, `unwrap` and `expect` are compile-denied here; every fallible path
//! surfaces as `DynbusError` so malformed traffic never crashes a process.

#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]
#![deny(clippy::panic)]

pub mod error;
pub mod protocol;

/// Shared result type.
pub use error::{DynbusError, ErrorCode, ErrorObject, Result};
