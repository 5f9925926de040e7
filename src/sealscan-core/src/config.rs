//! Configuration for the verification engine and scan input handling.

use std::time::Duration;

use crate::registry::DeviceType;

/// Configuration for a SealScan verification station.
#[derive(Debug, Clone)]
pub struct VerifyConfig {
    /// Debounce window for character-by-character scanner input.
    pub debounce_window: Duration,
    /// Minimum accumulated length for the QR early-completion predicate.
    /// Must cover the longest known payload template plus identifier, or
    /// chunked input would emit before the trailing digits arrive.
    pub early_complete_min_len: usize,
    /// Device type preselected for new sessions.
    pub default_device: Option<DeviceType>,
}

impl Default for VerifyConfig {
    fn default() -> Self {
        Self {
            debounce_window: Duration::from_millis(120),
            early_complete_min_len: 59,
            default_device: Some(DeviceType::Tydenbrooks),
        }
    }
}
