//! Client settings loader (strict parsing).

pub mod schema;

use std::fs;

use actport_core::{ActivityError, Result};

pub use schema::{ClientSettings, PopupSettings};

pub fn load_from_file(path: &str) -> Result<ClientSettings> {
    let s = fs::read_to_string(path)
        .map_err(|e| ActivityError::Internal(format!("read settings failed: {e}")))?;
    load_from_str(&s)
}

pub fn load_from_str(s: &str) -> Result<ClientSettings> {
    let settings: ClientSettings = serde_yaml::from_str(s)
        .map_err(|e| ActivityError::Protocol(format!("invalid yaml: {e}")))?;
    settings.validate()?;
    Ok(settings)
}
