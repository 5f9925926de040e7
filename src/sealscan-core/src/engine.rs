//! Verification state machine.
//!
//! Drives the four-step flow for one physical device:
//!
//! 1. capture module IMEI (barcode)
//! 2. capture enclosure QR payload, extract + cross-check
//! 3. capture attachments
//! 4. complete
//!
//! Every transition re-derives its outputs deterministically from the
//! submitted raw text and leaves the session in a consistent state.
//! Verification failures never raise errors: they lock the session, which
//! halts forward progress without losing already-entered data, until an
//! explicit reset.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tracing::{debug, info, warn};

use crate::coalesce::{ScanEvent, ScanSlot};
use crate::config::VerifyConfig;
use crate::error::{FailureReason, VerifyError};
use crate::registry::{DeviceType, PatternRegistry, IMEI_DIGITS};
use crate::session::{Attachment, FormatStatus, MatchStatus, StepState, VerificationSession};
use crate::types::SessionSnapshot;

/// The verification state machine for one station.
///
/// Owns the pattern registry, the active session and the lock flag shared
/// with the scan coalescers. All mutation happens through the serialized
/// transition methods; at most one session is active at a time.
pub struct VerificationEngine {
    config: VerifyConfig,
    registry: PatternRegistry,
    session: VerificationSession,
    locked: Arc<AtomicBool>,
}

impl VerificationEngine {
    /// Create an engine with default configuration.
    ///
    /// # Errors
    ///
    /// Returns error if the pattern registry fails to compile.
    pub fn new() -> Result<Self, VerifyError> {
        Self::with_config(VerifyConfig::default())
    }

    /// Create an engine with custom configuration.
    ///
    /// # Errors
    ///
    /// Returns error if the pattern registry fails to compile.
    pub fn with_config(config: VerifyConfig) -> Result<Self, VerifyError> {
        let registry = PatternRegistry::new()?;
        let session = VerificationSession::with_device(config.default_device);
        info!(
            default_device = ?config.default_device,
            debounce_ms = config.debounce_window.as_millis() as u64,
            "verification engine ready"
        );
        Ok(Self {
            config,
            registry,
            session,
            locked: Arc::new(AtomicBool::new(false)),
        })
    }

    /// Session lock flag shared with scan coalescers.
    ///
    /// Set while the session is locked, so no stable-scan emission can race
    /// a pending reset.
    #[must_use]
    pub fn lock_flag(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.locked)
    }

    /// Read-only view of the active session.
    #[must_use]
    pub fn session(&self) -> &VerificationSession {
        &self.session
    }

    /// The compiled pattern registry.
    #[must_use]
    pub fn registry(&self) -> &PatternRegistry {
        &self.registry
    }

    /// Route a stabilized scan event to the transition for its slot.
    pub fn handle_scan(&mut self, event: &ScanEvent) -> &VerificationSession {
        match event.slot {
            ScanSlot::ModuleBarcode => self.submit_module_id(&event.text),
            ScanSlot::EnclosureQr => self.submit_enclosure_payload(&event.text),
        }
    }

    /// Step 1: submit the module barcode text.
    ///
    /// Stores the raw payload and derives the module IMEI as the leading
    /// 15-digit run. Without a resolvable IMEI the step does not advance.
    pub fn submit_module_id(&mut self, raw: &str) -> &VerificationSession {
        if self.session.locked {
            debug!("module scan ignored: session locked");
            return &self.session;
        }
        if self.session.step != StepState::AwaitingModuleId {
            debug!(step = ?self.session.step, "module scan ignored: module already captured");
            return &self.session;
        }

        self.session.module_raw = raw.trim().to_string();
        match leading_imei(&self.session.module_raw) {
            Some(imei) => {
                info!(imei = %imei, "module IMEI captured");
                self.session.module_imei = imei;
                self.session.step = StepState::AwaitingEnclosurePayload;
            },
            None => {
                warn!(
                    len = self.session.module_raw.len(),
                    "module scan carries no 15-digit run; staying on step"
                );
                self.session.module_imei.clear();
            },
        }
        &self.session
    }

    /// Step 2: submit the enclosure QR payload.
    ///
    /// Stores the raw payload, derives the expected URL for the selected
    /// device type, runs extraction and the identifier cross-check. A valid
    /// format with a matching (or not-applicable) identifier advances the
    /// flow; anything else locks the session with a diagnostic reason.
    pub fn submit_enclosure_payload(&mut self, raw: &str) -> &VerificationSession {
        if self.session.locked {
            debug!("enclosure scan ignored: session locked");
            return &self.session;
        }
        if self.session.step != StepState::AwaitingEnclosurePayload {
            debug!(step = ?self.session.step, "enclosure scan ignored: not awaiting payload");
            return &self.session;
        }

        self.session.enclosure_raw = raw.trim().to_string();
        self.revalidate();

        if self.session.url_format == FormatStatus::Valid
            && self.session.imei_match.is_pass_equivalent()
        {
            info!(
                device = ?self.session.selected_device,
                imei_match = ?self.session.imei_match,
                extracted = %self.session.extracted_imei,
                "enclosure payload verified"
            );
            self.session.step = StepState::AwaitingAttachments;
        } else {
            self.lock_session();
        }
        &self.session
    }

    /// Change the selected device type.
    ///
    /// Re-runs extraction and matching against any stored enclosure payload
    /// so an operator can correct a misselected type before re-scanning.
    /// Step and lock state are never altered here; only reset unlocks.
    pub fn set_device_type(&mut self, device: Option<DeviceType>) -> &VerificationSession {
        info!(from = ?self.session.selected_device, to = ?device, "device type changed");
        self.session.selected_device = device;
        if !self.session.enclosure_raw.is_empty() {
            self.revalidate();
        }
        &self.session
    }

    /// Store an attachment blob under a named slot.
    ///
    /// No step transition; the lock state is unaffected.
    pub fn attach_file(&mut self, slot: &str, filename: &str, data: Vec<u8>) -> &VerificationSession {
        let attachment = Attachment {
            filename: filename.to_string(),
            data,
        };
        debug!(
            slot = %slot,
            filename = %filename,
            size = attachment.data.len(),
            sha256 = %attachment.digest_hex(),
            "attachment stored"
        );
        self.session.attachments.insert(slot.to_string(), attachment);
        &self.session
    }

    /// Step 4: finish the verification.
    ///
    /// # Errors
    ///
    /// Returns [`VerifyError::SessionLocked`] after a recorded failure and
    /// [`VerifyError::MissingInput`] when a required field is unresolved.
    pub fn complete(&mut self) -> Result<&VerificationSession, VerifyError> {
        if self.session.locked {
            return Err(VerifyError::SessionLocked);
        }
        if self.session.module_raw.is_empty() {
            return Err(VerifyError::MissingInput {
                field: "module payload",
            });
        }
        if self.session.enclosure_raw.is_empty() {
            return Err(VerifyError::MissingInput {
                field: "enclosure payload",
            });
        }
        if !self.session.imei_match.is_resolved() {
            return Err(VerifyError::MissingInput {
                field: "identifier cross-check",
            });
        }
        if !self.session.url_format.is_resolved() {
            return Err(VerifyError::MissingInput {
                field: "payload format check",
            });
        }

        self.session.step = StepState::Complete;
        info!(
            imei = %self.session.module_imei,
            device = ?self.session.selected_device,
            attachments = self.session.attachments.len(),
            "verification complete"
        );
        Ok(&self.session)
    }

    /// Start a new verification, optionally preserving the device selection.
    ///
    /// Clears the lock. Callers must cancel in-flight coalescer timers first
    /// so a stale emission cannot land in the fresh session.
    pub fn reset(&mut self, preserve_device_type: bool) -> &VerificationSession {
        let device = if preserve_device_type {
            self.session.selected_device
        } else {
            self.config.default_device
        };
        info!(preserve_device_type, "session reset");
        self.session = VerificationSession::with_device(device);
        self.locked.store(false, Ordering::SeqCst);
        &self.session
    }

    /// Check if the session is ready for the persistence sink.
    #[must_use]
    pub fn can_persist(&self) -> bool {
        self.session.can_persist()
    }

    /// Snapshot of the session for the persistence handoff.
    #[must_use]
    pub fn serialize(&self) -> SessionSnapshot {
        self.session.snapshot()
    }

    /// Re-derive expected URL, extraction result and cross-check outcome
    /// from the stored payloads and the current device selection.
    fn revalidate(&mut self) {
        let session = &mut self.session;

        let Some(device) = session.selected_device else {
            session.expected_url.clear();
            session.extracted_imei.clear();
            session.url_format = FormatStatus::Invalid;
            session.imei_match = MatchStatus::Mismatch;
            session.failure = Some(FailureReason::NoDeviceTypeSelected);
            return;
        };

        session.expected_url = format!(
            "{}{}",
            self.registry.template_prefix(device),
            session.module_raw
        );

        let extraction = self.registry.extract(device, &session.enclosure_raw);
        session.url_format = if extraction.matched {
            FormatStatus::Valid
        } else {
            FormatStatus::Invalid
        };
        session.extracted_imei = extraction.imei.clone().unwrap_or_default();

        session.imei_match = match extraction.imei {
            Some(imei) if !session.module_imei.is_empty() && imei == session.module_imei => {
                MatchStatus::Match
            },
            Some(_) => MatchStatus::Mismatch,
            None if extraction.base_url_only => MatchStatus::NotApplicable,
            None => MatchStatus::Mismatch,
        };

        session.failure = if session.url_format == FormatStatus::Invalid
            || session.imei_match == MatchStatus::Mismatch
        {
            Some(classify_failure(&self.registry, device, session))
        } else {
            None
        };
    }

    fn lock_session(&mut self) {
        self.session.locked = true;
        self.locked.store(true, Ordering::SeqCst);
        warn!(
            reason = %self.session.failure_reason(),
            device = ?self.session.selected_device,
            extracted = %self.session.extracted_imei,
            "verification failed; session locked pending reset"
        );
    }
}

/// Derive the module IMEI as the leading run of 15 or more digits, truncated
/// to 15. Scanner text may carry non-digit framing around the serial.
fn leading_imei(raw: &str) -> Option<String> {
    let bytes = raw.as_bytes();
    let mut start = 0;
    while start < bytes.len() {
        if bytes[start].is_ascii_digit() {
            let mut end = start;
            while end < bytes.len() && bytes[end].is_ascii_digit() {
                end += 1;
            }
            if end - start >= IMEI_DIGITS {
                return Some(raw[start..start + IMEI_DIGITS].to_string());
            }
            start = end;
        } else {
            start += 1;
        }
    }
    None
}

/// Choose the diagnostic reason for a failed payload, in precedence order:
/// module data absent from the payload, then a wrong-family host, then the
/// generic format mismatch.
fn classify_failure(
    registry: &PatternRegistry,
    device: DeviceType,
    session: &VerificationSession,
) -> FailureReason {
    if !session.module_raw.is_empty() && !session.enclosure_raw.contains(&session.module_raw) {
        FailureReason::ModuleDataAbsent
    } else if !session.enclosure_raw.contains(registry.host_token(device)) {
        FailureReason::HostMismatch
    } else {
        FailureReason::FormatMismatch
    }
}
