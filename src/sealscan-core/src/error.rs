//! Error types for verification operations.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::registry::DeviceType;

/// Errors returned at the engine's API edges.
///
/// Verification failures (malformed payloads, mismatched identifiers) are
/// never surfaced through this type: they are recorded on the session as a
/// [`FailureReason`] and halt progress via the lock flag, so already-entered
/// data is kept. `VerifyError` covers misuse of the API surface itself and is
/// always recoverable.
#[derive(Debug, Error)]
pub enum VerifyError {
    /// A required field was absent at a transition that needs it.
    #[error("missing input: {field}")]
    MissingInput {
        /// Name of the absent field.
        field: &'static str,
    },

    /// The session is locked after a recorded failure; reset before retrying.
    #[error("session is locked pending reset")]
    SessionLocked,

    /// A payload template in the registry failed to compile.
    #[error("invalid payload template for {device}: {source}")]
    InvalidPattern {
        /// Device type whose template is broken.
        device: DeviceType,
        /// Underlying pattern error.
        #[source]
        source: regex::Error,
    },
}

impl VerifyError {
    /// Check if this error clears once the operator supplies more input.
    #[must_use]
    pub fn is_missing_input(&self) -> bool {
        matches!(self, Self::MissingInput { .. })
    }
}

/// Diagnostic classification of a failed verification.
///
/// The `Display` rendering is the operator-facing failure reason stored in
/// session snapshots. Recording any of these locks the session until reset.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureReason {
    /// The enclosure payload does not contain the module payload at all.
    #[error("module data absent from scanned payload")]
    ModuleDataAbsent,

    /// The payload belongs to a different device family than selected.
    #[error("payload host does not match selected device type")]
    HostMismatch,

    /// The payload matches no known rule for the selected device type.
    #[error("payload does not match expected format")]
    FormatMismatch,

    /// No device type was selected when the payload arrived.
    #[error("no device type selected")]
    NoDeviceTypeSelected,
}

impl FailureReason {
    /// Check if the failure points at the device-type selection rather than
    /// the scanned data, so the operator should correct the selection before
    /// re-scanning.
    #[must_use]
    pub fn suggests_reselect(&self) -> bool {
        matches!(self, Self::HostMismatch | Self::NoDeviceTypeSelected)
    }
}
