//! Popup feature-string computation.
//!
//! Pure calculation: given screen metrics and optional caller-requested
//! dimensions, request a centered window sized to the lesser of the
//! configured cap, the configured share of available space, or the caller's
//! request, where "available space" is never taken to be less than half
//! the full screen.

use crate::platform::ScreenMetrics;
use crate::settings::PopupSettings;

/// Build the feature string for opening a popup.
pub fn build_features(
    screen: ScreenMetrics,
    popup: &PopupSettings,
    width: Option<u32>,
    height: Option<u32>,
) -> String {
    let w = dimension(
        screen.width,
        screen.avail_width,
        popup.max_width,
        popup.avail_ratio,
        width,
    );
    let h = dimension(
        screen.height,
        screen.avail_height,
        popup.max_height,
        popup.avail_ratio,
        height,
    );
    let x = screen.width.saturating_sub(w) / 2;
    let y = screen.height.saturating_sub(h) / 2;
    format!("width={w},height={h},left={x},top={y},resizable=yes,scrollbars=yes")
}

fn dimension(full: u32, avail: u32, cap: u32, ratio: f64, requested: Option<u32>) -> u32 {
    // Usable bound: trust `avail`, but never less than half the full screen
    // (platforms under-report available space when chrome insets are large,
    // and a hidden popup is worse than an overlapping one).
    let max_dim = f64::from(avail).max(f64::from(full) * 0.5);
    let d = match requested {
        Some(requested) => f64::from(requested).min(max_dim),
        None => f64::from(cap).min(max_dim * ratio),
    };
    d.floor() as u32
}
