//! Protocol modules (envelope + closed command set).
//!
//! Every message on either transport is a JSON envelope carrying the
//! protocol sentinel. Parsing is panic-free: traffic that is not part of
//! the protocol decodes to `None` instead of erroring, and malformed
//! command payloads degrade to safe defaults rather than tearing down the
//! session.

pub mod command;
pub mod envelope;
