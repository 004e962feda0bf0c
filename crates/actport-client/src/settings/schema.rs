use serde::Deserialize;

use actport_core::{ActivityError, Result};

/// Client runtime settings.
///
/// The timing defaults (500 ms poll, 3000 ms grace, 200 ms check) are a
/// compatibility contract with existing hosts; overrides exist for embedders
/// with unusual schedulers and are range-checked by `validate`.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ClientSettings {
    /// Liveness poll period for the opened context.
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,

    /// Window after observing a closed context in which an in-flight result
    /// may still arrive.
    #[serde(default = "default_grace_delay_ms")]
    pub grace_delay_ms: u64,

    /// Delay before the closed-check requested by a host `check` command.
    #[serde(default = "default_check_delay_ms")]
    pub check_delay_ms: u64,

    #[serde(default)]
    pub popup: PopupSettings,
}

impl Default for ClientSettings {
    fn default() -> Self {
        Self {
            poll_interval_ms: default_poll_interval_ms(),
            grace_delay_ms: default_grace_delay_ms(),
            check_delay_ms: default_check_delay_ms(),
            popup: PopupSettings::default(),
        }
    }
}

impl ClientSettings {
    pub fn validate(&self) -> Result<()> {
        if !(100..=10_000).contains(&self.poll_interval_ms) {
            return Err(ActivityError::Protocol(
                "poll_interval_ms must be between 100 and 10000".into(),
            ));
        }
        if !(500..=60_000).contains(&self.grace_delay_ms) {
            return Err(ActivityError::Protocol(
                "grace_delay_ms must be between 500 and 60000".into(),
            ));
        }
        if !(50..=5_000).contains(&self.check_delay_ms) {
            return Err(ActivityError::Protocol(
                "check_delay_ms must be between 50 and 5000".into(),
            ));
        }
        if self.check_delay_ms >= self.poll_interval_ms {
            return Err(ActivityError::Protocol(
                "check_delay_ms must be smaller than poll_interval_ms".into(),
            ));
        }
        self.popup.validate()?;
        Ok(())
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PopupSettings {
    #[serde(default = "default_max_width")]
    pub max_width: u32,

    #[serde(default = "default_max_height")]
    pub max_height: u32,

    /// Share of the available screen a default popup may occupy.
    #[serde(default = "default_avail_ratio")]
    pub avail_ratio: f64,
}

impl Default for PopupSettings {
    fn default() -> Self {
        Self {
            max_width: default_max_width(),
            max_height: default_max_height(),
            avail_ratio: default_avail_ratio(),
        }
    }
}

impl PopupSettings {
    pub fn validate(&self) -> Result<()> {
        if !(100..=4096).contains(&self.max_width) || !(100..=4096).contains(&self.max_height) {
            return Err(ActivityError::Protocol(
                "popup.max_width/max_height must be between 100 and 4096".into(),
            ));
        }
        if !(self.avail_ratio > 0.0 && self.avail_ratio <= 1.0) {
            return Err(ActivityError::Protocol(
                "popup.avail_ratio must be within (0, 1]".into(),
            ));
        }
        Ok(())
    }
}

fn default_poll_interval_ms() -> u64 {
    500
}
fn default_grace_delay_ms() -> u64 {
    3000
}
fn default_check_delay_ms() -> u64 {
    200
}
fn default_max_width() -> u32 {
    600
}
fn default_max_height() -> u32 {
    600
}
fn default_avail_ratio() -> f64 {
    0.9
}
