//! Top-level facade crate for dynbus.
//!
//! Re-exports the wire contracts, the router library and the RPC runtime so
//! users can depend on a single crate.

pub mod core {
    pub use dynbus_core::*;
}

pub mod router {
    pub use dynbus_router::*;
}

pub mod rpc {
    pub use dynbus_rpc::*;
}
