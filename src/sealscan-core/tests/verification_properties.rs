//! Property-based tests for the verification engine.
//!
//! These tests verify invariants of extraction and the verification flow
//! using proptest to generate arbitrary scanner input.

use proptest::prelude::*;
use sealscan_core::{
    DeviceType, FormatStatus, MatchStatus, PatternRegistry, StepState, VerificationEngine,
    VerificationSession,
};

/// Strategy for a well-formed 15-digit module IMEI.
fn imei() -> impl Strategy<Value = String> {
    "[0-9]{15}"
}

/// Strategy for an arbitrary device type.
fn device() -> impl Strategy<Value = DeviceType> {
    prop_oneof![Just(DeviceType::Tydenbrooks), Just(DeviceType::Vynd)]
}

/// Strategy for arbitrary printable scanner text.
fn scanner_text() -> impl Strategy<Value = String> {
    "\\PC{0,80}"
}

fn registry() -> PatternRegistry {
    PatternRegistry::new().expect("registry compiles")
}

fn data_payload(device: DeviceType, imei: &str) -> String {
    format!("{}{imei}", registry().template_prefix(device))
}

fn other_device(device: DeviceType) -> DeviceType {
    match device {
        DeviceType::Tydenbrooks => DeviceType::Vynd,
        DeviceType::Vynd => DeviceType::Tydenbrooks,
    }
}

proptest! {
    #![proptest_config(ProptestConfig {
        cases: 256,
        max_shrink_iters: 1000,
        ..ProptestConfig::default()
    })]

    // ========================================================================
    // Extraction Properties
    // ========================================================================

    /// Extraction is a pure function of (type, payload).
    #[test]
    fn extract_is_pure(device in device(), payload in scanner_text()) {
        let registry = registry();
        prop_assert_eq!(
            registry.extract(device, &payload),
            registry.extract(device, &payload)
        );
    }

    /// The embedded IMEI is always recovered from a data-bearing payload.
    #[test]
    fn extract_recovers_embedded_imei(device in device(), imei in imei()) {
        let result = registry().extract(device, &data_payload(device, &imei));

        prop_assert!(result.matched);
        prop_assert_eq!(result.imei.as_deref(), Some(imei.as_str()));
        prop_assert!(!result.base_url_only);
    }

    /// Extraction is type-scoped: a payload from another family never
    /// matches the selected type.
    #[test]
    fn extract_is_type_scoped(device in device(), imei in imei()) {
        let payload = data_payload(other_device(device), &imei);
        let result = registry().extract(device, &payload);

        prop_assert!(!result.matched);
        prop_assert!(result.imei.is_none());
    }

    /// Whatever detection classifies, type-scoped extraction agrees with.
    #[test]
    fn detect_agrees_with_extract(payload in scanner_text()) {
        let registry = registry();
        if let Some(device) = registry.detect_type(&payload) {
            prop_assert!(registry.extract(device, &payload).matched);
        }
    }

    // ========================================================================
    // Module Capture Properties
    // ========================================================================

    /// The module IMEI is derived as the leading 15-digit run regardless of
    /// non-digit framing around it.
    #[test]
    fn module_imei_survives_framing(
        prefix in "[A-Za-z:#-]{0,8}",
        imei in imei(),
        suffix in "[A-Za-z,:]{0,8}"
    ) {
        let mut engine = VerificationEngine::new().unwrap();
        let session = engine.submit_module_id(&format!("{prefix}{imei}{suffix}"));

        prop_assert_eq!(&session.module_imei, &imei);
        prop_assert_eq!(session.step, StepState::AwaitingEnclosurePayload);
    }

    // ========================================================================
    // Flow Properties
    // ========================================================================

    /// A matching module/enclosure pair always passes and never locks.
    #[test]
    fn matching_pair_always_passes(device in device(), imei in imei()) {
        let mut engine = VerificationEngine::new().unwrap();
        engine.set_device_type(Some(device));
        engine.submit_module_id(&imei);
        let session = engine.submit_enclosure_payload(&data_payload(device, &imei));

        prop_assert_eq!(session.imei_match, MatchStatus::Match);
        prop_assert_eq!(session.url_format, FormatStatus::Valid);
        prop_assert!(!session.locked);
        prop_assert_eq!(session.step, StepState::AwaitingAttachments);
    }

    /// Distinct identifiers always lock with a non-empty reason.
    #[test]
    fn mismatched_pair_always_locks(
        device in device(),
        module in imei(),
        enclosure in imei()
    ) {
        prop_assume!(module != enclosure);

        let mut engine = VerificationEngine::new().unwrap();
        engine.set_device_type(Some(device));
        engine.submit_module_id(&module);
        let session = engine.submit_enclosure_payload(&data_payload(device, &enclosure));

        prop_assert_eq!(session.imei_match, MatchStatus::Mismatch);
        prop_assert!(session.locked);
        prop_assert!(!session.failure_reason().is_empty());
        prop_assert_eq!(session.step, StepState::AwaitingEnclosurePayload);
    }

    /// For arbitrary enclosure input the session invariants hold: the
    /// failure reason is non-empty exactly when the format is invalid or
    /// the identifiers mismatch, the lock mirrors that, and not-applicable
    /// implies a valid format with no extracted identifier.
    #[test]
    fn session_invariants_hold_for_arbitrary_payloads(
        imei in imei(),
        payload in scanner_text()
    ) {
        let mut engine = VerificationEngine::new().unwrap();
        engine.submit_module_id(&imei);
        let session = engine.submit_enclosure_payload(&payload);

        let failed = session.url_format == FormatStatus::Invalid
            || session.imei_match == MatchStatus::Mismatch;
        prop_assert_eq!(!session.failure_reason().is_empty(), failed);
        prop_assert_eq!(session.locked, failed);

        if session.imei_match == MatchStatus::NotApplicable {
            prop_assert_eq!(session.url_format, FormatStatus::Valid);
            prop_assert!(session.extracted_imei.is_empty());
        }
    }

    /// After a lock, reset always yields a session indistinguishable from a
    /// fresh one.
    #[test]
    fn reset_restores_fresh_session(imei in imei(), payload in scanner_text()) {
        let mut engine = VerificationEngine::new().unwrap();
        engine.submit_module_id(&imei);
        engine.submit_enclosure_payload(&payload);

        engine.reset(false);
        prop_assert_eq!(
            engine.session(),
            &VerificationSession::with_device(Some(DeviceType::Tydenbrooks))
        );
    }
}

// ============================================================================
// Non-proptest Deterministic Tests
// ============================================================================

#[test]
fn test_reference_imei_round_trip() {
    let mut engine = VerificationEngine::new().unwrap();
    engine.submit_module_id("869487066634998");
    let session = engine
        .submit_enclosure_payload("https://tydendigital.com/#/scan-device/869487066634998");

    assert_eq!(session.imei_match, MatchStatus::Match);
    assert_eq!(session.url_format, FormatStatus::Valid);
    assert!(!session.locked);
    assert_eq!(session.step, StepState::AwaitingAttachments);
}

#[test]
fn test_snapshot_serializes_for_the_sink() {
    let mut engine = VerificationEngine::new().unwrap();
    engine.submit_module_id("869487066634998");
    engine.submit_enclosure_payload("https://tydendigital.com/#/scan-device/869487066634998");
    engine.attach_file("battery", "battery.pdf", b"report".to_vec());

    assert!(engine.can_persist());
    let json = serde_json::to_string(&engine.serialize()).unwrap();
    assert!(json.contains("\"869487066634998\""));
    assert!(json.contains("\"battery\""));
}

#[test]
fn test_detection_is_an_explicit_separate_operation() {
    let registry = PatternRegistry::new().unwrap();

    // Detection probes all families...
    assert_eq!(
        registry.detect_type("https://dev-vynd-full.web.app/#/scan-device/869487066634998"),
        Some(DeviceType::Vynd)
    );
    // ...but extraction stays scoped to the selected one.
    assert!(
        !registry
            .extract(
                DeviceType::Tydenbrooks,
                "https://dev-vynd-full.web.app/#/scan-device/869487066634998"
            )
            .matched
    );
}
