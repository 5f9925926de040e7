//! Verification session state.
//!
//! [`VerificationSession`] is the unit of work for one physical device
//! check: a plain data record created empty, mutated in place by the engine
//! on each scan event, and replaced wholesale on reset. It holds no logic of
//! its own beyond derived views (`failure_reason`, `can_persist`,
//! `snapshot`).

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::error::FailureReason;
use crate::registry::DeviceType;
use crate::types::{AttachmentRecord, SessionSnapshot};

/// Tri-state validity of the enclosure payload format.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FormatStatus {
    /// No enclosure payload has been evaluated yet.
    #[default]
    Unknown,
    /// The payload matched a template for the selected device type.
    Valid,
    /// The payload matched nothing for the selected device type.
    Invalid,
}

impl FormatStatus {
    /// Check that the format has been evaluated.
    #[must_use]
    pub fn is_resolved(&self) -> bool {
        !matches!(self, Self::Unknown)
    }
}

/// Outcome of cross-checking the module and enclosure identifiers.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MatchStatus {
    /// Cross-check has not run yet.
    #[default]
    Unknown,
    /// Both identifiers present and equal.
    Match,
    /// Identifiers present and unequal, or a required side absent.
    Mismatch,
    /// Enclosure label carries no embedded identifier (base URL only);
    /// treated as pass-equivalent.
    NotApplicable,
}

impl MatchStatus {
    /// Check that the cross-check has run.
    #[must_use]
    pub fn is_resolved(&self) -> bool {
        !matches!(self, Self::Unknown)
    }

    /// Check if the outcome allows the flow to advance.
    #[must_use]
    pub fn is_pass_equivalent(&self) -> bool {
        matches!(self, Self::Match | Self::NotApplicable)
    }
}

/// Steps of the verification flow, strictly forward-progressing except on
/// explicit reset.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize,
)]
#[serde(rename_all = "snake_case")]
pub enum StepState {
    /// Waiting for the module IMEI barcode.
    #[default]
    AwaitingModuleId,
    /// Waiting for the enclosure QR payload.
    AwaitingEnclosurePayload,
    /// Waiting for attachment capture.
    AwaitingAttachments,
    /// Verification finished.
    Complete,
}

/// A named binary blob captured during verification.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Attachment {
    /// Original filename as reported by the picker.
    pub filename: String,
    /// Raw bytes.
    pub data: Vec<u8>,
}

impl Attachment {
    /// SHA-256 of the blob, hex-encoded.
    #[must_use]
    pub fn digest_hex(&self) -> String {
        hex::encode(Sha256::digest(&self.data))
    }
}

/// The mutable record of one verification attempt.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct VerificationSession {
    /// Module IMEI derived from the barcode scan (leading 15-digit run).
    pub module_imei: String,
    /// Full module barcode text as scanned.
    pub module_raw: String,
    /// Full enclosure QR payload as scanned.
    pub enclosure_raw: String,
    /// Payload expected for the selected device type and scanned module.
    pub expected_url: String,
    /// IMEI extracted from the enclosure payload; empty if absent.
    pub extracted_imei: String,
    /// Currently selected device type; `None` when the operator cleared it.
    pub selected_device: Option<DeviceType>,
    /// Validity of the enclosure payload format.
    pub url_format: FormatStatus,
    /// Identifier cross-check outcome.
    pub imei_match: MatchStatus,
    /// Diagnostic failure, set iff the format is invalid or the identifiers
    /// mismatch.
    pub failure: Option<FailureReason>,
    /// Named attachments, keyed by slot (for example `battery`, `qa`).
    pub attachments: BTreeMap<String, Attachment>,
    /// Current step of the flow.
    pub step: StepState,
    /// Set once a failure is recorded; blocks transitions until reset.
    pub locked: bool,
}

impl VerificationSession {
    /// Create a fresh session with the given device selection.
    #[must_use]
    pub fn with_device(device: Option<DeviceType>) -> Self {
        Self {
            selected_device: device,
            ..Self::default()
        }
    }

    /// Operator-facing failure reason; empty unless a failure is recorded.
    #[must_use]
    pub fn failure_reason(&self) -> String {
        self.failure.map(|f| f.to_string()).unwrap_or_default()
    }

    /// Check if the session can be handed to a persistence sink: module id,
    /// enclosure payload, cross-check and format validity all resolved.
    #[must_use]
    pub fn can_persist(&self) -> bool {
        !self.module_imei.is_empty()
            && !self.enclosure_raw.is_empty()
            && self.imei_match.is_resolved()
            && self.url_format.is_resolved()
    }

    /// Overall verdict: format valid and cross-check pass-equivalent.
    #[must_use]
    pub fn passed(&self) -> bool {
        self.url_format == FormatStatus::Valid && self.imei_match.is_pass_equivalent()
    }

    /// Immutable snapshot for the persistence handoff.
    ///
    /// Attachments are referenced by name, size and digest; the blobs stay
    /// with the session.
    #[must_use]
    pub fn snapshot(&self) -> SessionSnapshot {
        SessionSnapshot {
            module_imei: self.module_imei.clone(),
            module_raw: self.module_raw.clone(),
            enclosure_raw: self.enclosure_raw.clone(),
            expected_url: self.expected_url.clone(),
            extracted_imei: self.extracted_imei.clone(),
            selected_device: self.selected_device,
            url_format: self.url_format,
            imei_match: self.imei_match,
            failure_reason: self.failure_reason(),
            attachments: self
                .attachments
                .iter()
                .map(|(slot, attachment)| AttachmentRecord {
                    slot: slot.clone(),
                    filename: attachment.filename.clone(),
                    size_bytes: attachment.data.len(),
                    sha256: attachment.digest_hex(),
                })
                .collect(),
            step: self.step,
            locked: self.locked,
            passed: self.passed(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_session_is_unresolved() {
        let session = VerificationSession::with_device(Some(DeviceType::Tydenbrooks));

        assert_eq!(session.step, StepState::AwaitingModuleId);
        assert!(!session.url_format.is_resolved());
        assert!(!session.imei_match.is_resolved());
        assert!(!session.can_persist());
        assert!(session.failure_reason().is_empty());
    }

    #[test]
    fn test_can_persist_requires_all_resolved() {
        let mut session = VerificationSession::with_device(Some(DeviceType::Tydenbrooks));
        session.module_imei = "869487066634998".to_string();
        session.enclosure_raw = "https://tydendigital.com/#/scan-device/869487066634998".into();
        assert!(!session.can_persist());

        session.url_format = FormatStatus::Valid;
        session.imei_match = MatchStatus::Match;
        assert!(session.can_persist());
    }

    #[test]
    fn test_mismatch_can_still_persist() {
        // Failed verifications are persisted too; only completion is gated
        // on the lock.
        let mut session = VerificationSession::with_device(Some(DeviceType::Tydenbrooks));
        session.module_imei = "111111111111111".to_string();
        session.enclosure_raw = "https://tydendigital.com/#/scan-device/222222222222222".into();
        session.url_format = FormatStatus::Valid;
        session.imei_match = MatchStatus::Mismatch;
        session.failure = Some(FailureReason::ModuleDataAbsent);
        session.locked = true;

        assert!(session.can_persist());
        assert!(!session.passed());
        assert!(!session.failure_reason().is_empty());
    }

    #[test]
    fn test_attachment_digest_is_stable() {
        let attachment = Attachment {
            filename: "battery.pdf".to_string(),
            data: b"battery report".to_vec(),
        };
        assert_eq!(attachment.digest_hex(), attachment.digest_hex());
        assert_eq!(attachment.digest_hex().len(), 64);
    }

    #[test]
    fn test_snapshot_carries_attachment_records() {
        let mut session = VerificationSession::with_device(Some(DeviceType::Vynd));
        session.attachments.insert(
            "qa".to_string(),
            Attachment {
                filename: "qa-checklist.pdf".to_string(),
                data: vec![1, 2, 3],
            },
        );

        let snapshot = session.snapshot();
        assert_eq!(snapshot.attachments.len(), 1);
        assert_eq!(snapshot.attachments[0].slot, "qa");
        assert_eq!(snapshot.attachments[0].size_bytes, 3);
    }
}
