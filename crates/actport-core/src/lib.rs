//! actPort core: wire-level protocol contracts, error types, and result values.
//!
//! This crate defines the envelope format, the closed command set, and the
//! activity request/result values shared by the client and host roles. It
//! intentionally carries no transport or runtime dependencies so it can be
//! reused in multiple contexts.
//!
//! # Defensive guarantees
//! Panics, `unwrap`, and `expect` are compile-denied here
//! (`#![deny(clippy::panic, clippy::unwrap_used, clippy::expect_used)]`).
//! All fallible paths must surface as `ActivityError`/`Result` so embedders
//! do not crash on malformed cross-context traffic.

#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]
#![deny(clippy::panic)]

pub mod error;
pub mod protocol;
pub mod request;
pub mod result;

/// Shared result type.
pub use error::{ActivityError, Result};
pub use protocol::command::Command;
pub use protocol::envelope::{Envelope, SENTINEL};
pub use result::{ActivityMode, ActivityResult, ActivityResultCode};
