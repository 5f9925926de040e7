//! Snapshot types handed to persistence collaborators.
//!
//! The core performs no I/O: callers check [`can_persist`] and serialize the
//! snapshot themselves (the station writes it as JSON).
//!
//! [`can_persist`]: crate::session::VerificationSession::can_persist

use serde::{Deserialize, Serialize};

use crate::error::FailureReason;
use crate::registry::DeviceType;
use crate::session::{FormatStatus, MatchStatus, StepState};

/// Immutable view of a verification session at handoff time.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionSnapshot {
    /// Module IMEI derived from the barcode scan.
    pub module_imei: String,

    /// Full module barcode text as scanned.
    pub module_raw: String,

    /// Full enclosure QR payload as scanned.
    pub enclosure_raw: String,

    /// Payload expected for the selected device type and scanned module.
    pub expected_url: String,

    /// IMEI extracted from the enclosure payload; empty if absent.
    pub extracted_imei: String,

    /// Device type selected at snapshot time.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub selected_device: Option<DeviceType>,

    /// Validity of the enclosure payload format.
    pub url_format: FormatStatus,

    /// Identifier cross-check outcome.
    pub imei_match: MatchStatus,

    /// Operator-facing failure reason; empty when the check passed.
    #[serde(default)]
    pub failure_reason: String,

    /// Attachment references (blobs stay with the session).
    #[serde(default)]
    pub attachments: Vec<AttachmentRecord>,

    /// Step the session was on.
    pub step: StepState,

    /// Whether the session was locked by a recorded failure.
    pub locked: bool,

    /// Overall verdict: format valid and identifiers match or the
    /// cross-check was not applicable.
    pub passed: bool,
}

impl SessionSnapshot {
    /// Reconstruct the diagnostic failure from the rendered reason, if any.
    ///
    /// Snapshots serialize the reason as the operator-facing string; sinks
    /// that want the typed taxonomy can recover it here.
    #[must_use]
    pub fn failure(&self) -> Option<FailureReason> {
        if self.failure_reason.is_empty() {
            return None;
        }
        [
            FailureReason::ModuleDataAbsent,
            FailureReason::HostMismatch,
            FailureReason::FormatMismatch,
            FailureReason::NoDeviceTypeSelected,
        ]
        .into_iter()
        .find(|reason| reason.to_string() == self.failure_reason)
    }
}

/// Reference to one attachment blob in a snapshot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AttachmentRecord {
    /// Slot the blob was stored under (for example `battery`, `qa`).
    pub slot: String,

    /// Original filename.
    pub filename: String,

    /// Blob size in bytes.
    pub size_bytes: usize,

    /// SHA-256 of the blob, hex-encoded.
    pub sha256: String,
}
