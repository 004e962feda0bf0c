//! Shared error type across actPort crates.

use thiserror::Error;

/// Shared result type.
pub type Result<T> = std::result::Result<T, ActivityError>;

/// Unified error type used by core and client.
///
/// `Clone` is derived because the one-shot result slot hands the same
/// terminal rejection to every waiter.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ActivityError {
    /// API used out of its allowed session state, or a malformed command.
    #[error("protocol violation: {0}")]
    Protocol(String),
    /// Peer or peer origin requested before the handshake pinned them.
    #[error("not connected")]
    NotConnected,
    /// `connect` called twice without an intervening disconnect.
    #[error("already connected")]
    AlreadyConnected,
    /// Opening the destination context failed in every attempted mode.
    #[error("failed to open window: {0}")]
    OpenFailed(String),
    /// A send path failed (closed endpoint, closed window).
    #[error("transport: {0}")]
    Transport(String),
    /// Serialization or internal invariant failure.
    #[error("internal: {0}")]
    Internal(String),
}
