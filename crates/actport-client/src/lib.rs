//! actPort client library entry.
//!
//! This crate wires the transport seam, the messenger, the activity ports,
//! and redirect result recovery into the client side of the activity stack.
//! It is intended to be consumed by embedders and by integration tests.

pub mod messenger;
pub mod platform;
pub mod popup;
pub mod port;
pub mod settings;
pub mod slot;
pub mod transport;
pub mod urlutil;
