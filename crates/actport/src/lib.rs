//! Top-level facade crate for actPort.
//!
//! Re-exports core types and the client library so users can depend on a single crate.

pub mod core {
    pub use actport_core::*;
}

pub mod client {
    pub use actport_client::*;
}
