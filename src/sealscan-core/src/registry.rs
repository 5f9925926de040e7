//! Device-type payload templates and identifier extraction rules.
//!
//! Each supported device family labels its enclosure with a QR URL of the
//! form `<prefix><imei>[<delimited extra fields>]`. The registry owns the
//! compiled patterns and the extraction rule for each family. Matching is
//! always scoped to an explicitly selected [`DeviceType`]; probing every
//! family against one payload is a separate, explicit operation
//! ([`PatternRegistry::detect_type`]) and is never folded into extraction.

use std::fmt;
use std::str::FromStr;

use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::error::VerifyError;

/// Number of digits in a module IMEI.
pub const IMEI_DIGITS: usize = 15;

/// Supported device families.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DeviceType {
    /// Tydenbrooks security-seal tracker.
    Tydenbrooks,
    /// Vynd asset tracker.
    Vynd,
}

impl DeviceType {
    /// All known device types, in detection-probe order.
    pub const ALL: [DeviceType; 2] = [DeviceType::Tydenbrooks, DeviceType::Vynd];

    /// Stable lowercase name used in CLI flags and snapshots.
    #[must_use]
    pub fn name(&self) -> &'static str {
        match self {
            Self::Tydenbrooks => "tydenbrooks",
            Self::Vynd => "vynd",
        }
    }
}

impl fmt::Display for DeviceType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for DeviceType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "tydenbrooks" => Ok(Self::Tydenbrooks),
            "vynd" => Ok(Self::Vynd),
            other => Err(format!("unknown device type: {other}")),
        }
    }
}

/// Result of applying a device type's extraction rule to a raw payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExtractionResult {
    /// Did the payload match the data-bearing or the base template?
    pub matched: bool,
    /// Embedded module IMEI, present when the data-bearing template matched.
    pub imei: Option<String>,
    /// The payload matched the base template with no trailing data segment:
    /// a syntactically valid label that has not been provisioned yet.
    pub base_url_only: bool,
}

impl ExtractionResult {
    fn unmatched() -> Self {
        Self {
            matched: false,
            imei: None,
            base_url_only: false,
        }
    }
}

/// Compiled patterns for one device family.
struct DevicePattern {
    device: DeviceType,
    /// URL prefix up to and including the final path separator.
    prefix: &'static str,
    /// Host token identifying the family inside a payload.
    host: &'static str,
    /// Data-bearing form: prefix, an IMEI, then optional delimited fields.
    data: Regex,
    /// Base form: the prefix with no trailing data.
    base: Regex,
}

impl DevicePattern {
    fn compile(
        device: DeviceType,
        prefix: &'static str,
        host: &'static str,
    ) -> Result<Self, VerifyError> {
        let escaped = regex::escape(prefix);
        let data = Regex::new(&format!(r"^{escaped}(\d{{{IMEI_DIGITS}}})"))
            .map_err(|source| VerifyError::InvalidPattern { device, source })?;
        let stem = regex::escape(prefix.trim_end_matches('/'));
        let base = Regex::new(&format!(r"^{stem}/?$"))
            .map_err(|source| VerifyError::InvalidPattern { device, source })?;
        Ok(Self {
            device,
            prefix,
            host,
            data,
            base,
        })
    }

    fn extract(&self, payload: &str) -> ExtractionResult {
        if let Some(captures) = self.data.captures(payload) {
            return ExtractionResult {
                matched: true,
                imei: Some(captures[1].to_string()),
                base_url_only: false,
            };
        }
        if self.base.is_match(payload) {
            return ExtractionResult {
                matched: true,
                imei: None,
                base_url_only: true,
            };
        }
        ExtractionResult::unmatched()
    }
}

/// Immutable registry of per-device-type payload templates.
///
/// Built once at engine startup and only queried afterwards. Adding a device
/// family means adding a pattern here; no other component changes.
pub struct PatternRegistry {
    patterns: Vec<DevicePattern>,
}

impl PatternRegistry {
    /// Compile the registry for all known device types.
    ///
    /// # Errors
    ///
    /// Returns [`VerifyError::InvalidPattern`] if a template fails to compile.
    pub fn new() -> Result<Self, VerifyError> {
        let patterns = vec![
            DevicePattern::compile(
                DeviceType::Tydenbrooks,
                "https://tydendigital.com/#/scan-device/",
                "tydendigital.com",
            )?,
            DevicePattern::compile(
                DeviceType::Vynd,
                "https://dev-vynd-full.web.app/#/scan-device/",
                "dev-vynd-full.web.app",
            )?,
        ];
        Ok(Self { patterns })
    }

    fn pattern(&self, device: DeviceType) -> &DevicePattern {
        // Registry always holds every DeviceType variant.
        self.patterns
            .iter()
            .find(|p| p.device == device)
            .unwrap_or(&self.patterns[0])
    }

    /// Payload template prefix for a device type (host and path, ending at
    /// the data separator).
    #[must_use]
    pub fn template_prefix(&self, device: DeviceType) -> &'static str {
        self.pattern(device).prefix
    }

    /// Host token identifying a device family inside a payload.
    #[must_use]
    pub fn host_token(&self, device: DeviceType) -> &'static str {
        self.pattern(device).host
    }

    /// Apply the extraction rule for `device` to a raw payload.
    ///
    /// Pure function of its inputs: the data-bearing template is tried first
    /// and yields the embedded IMEI; the base template next, yielding a
    /// matched-but-empty result; anything else is unmatched. Extraction is
    /// type-scoped: a payload from a different family never matches.
    #[must_use]
    pub fn extract(&self, device: DeviceType, payload: &str) -> ExtractionResult {
        if payload.is_empty() {
            return ExtractionResult::unmatched();
        }
        self.pattern(device).extract(payload)
    }

    /// Probe every device family for one that matches the payload.
    ///
    /// This is the explicit auto-detection operation; routine verification
    /// never infers the type from the payload.
    #[must_use]
    pub fn detect_type(&self, payload: &str) -> Option<DeviceType> {
        if payload.is_empty() {
            return None;
        }
        self.patterns
            .iter()
            .find(|p| p.extract(payload).matched)
            .map(|p| p.device)
    }
}
