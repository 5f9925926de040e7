//! # sealscan-core
//!
//! Device-verification validation engine for the SealScan QA station: it
//! reconciles a module IMEI read from one barcode source with a QR payload
//! read from a second source, classifies the device type, extracts and
//! cross-checks the embedded identifier, and decides pass/fail with an
//! operator-facing failure reason.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                   VerificationEngine                         │
//! │                                                              │
//! │  ┌──────────────┐          ┌──────────────┐                 │
//! │  │ScanCoalescer │ module   │ScanCoalescer │ enclosure       │
//! │  │ (debounce)   │ barcode  │ (debounce)   │ QR              │
//! │  └──────┬───────┘          └──────┬───────┘                 │
//! │         └─────────┬──────────────┘                          │
//! │                   ▼  stable ScanEvent                       │
//! │  ┌──────────────────────────────────────────────────┐      │
//! │  │              state machine (4 steps)              │      │
//! │  │   module id → enclosure → attachments → complete  │      │
//! │  └──────────────────────┬───────────────────────────┘      │
//! │                         ▼                                   │
//! │  ┌──────────────────────────────────────────────────┐      │
//! │  │  PatternRegistry (per-type templates + extract)   │      │
//! │  └──────────────────────┬───────────────────────────┘      │
//! │                         ▼                                   │
//! │  ┌──────────────────────────────────────────────────┐      │
//! │  │   VerificationSession (tri-states, lock, reason)  │      │
//! │  └──────────────────────────────────────────────────┘      │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Properties
//!
//! - **Deterministic**: every transition re-derives state from its raw
//!   inputs; extraction is a pure function of (type, payload)
//! - **Fail-locked**: a mismatch locks the session instead of erroring,
//!   keeping entered data until an explicit reset
//! - **Type-scoped**: matching runs only against the selected device type;
//!   cross-family probing is a separate, explicit detection operation

#![warn(missing_docs)]
#![warn(clippy::all)]
#![allow(clippy::module_name_repetitions)] // Allow Type in module::Type
#![allow(clippy::missing_errors_doc)] // Error documentation not required
#![allow(clippy::must_use_candidate)] // Not all functions need must_use

pub mod coalesce;
pub mod config;
pub mod engine;
pub mod error;
pub mod registry;
pub mod session;
pub mod types;

pub use coalesce::{CompletionPredicate, ScanCoalescer, ScanEvent, ScanSlot};
pub use config::VerifyConfig;
pub use engine::VerificationEngine;
pub use error::{FailureReason, VerifyError};
pub use registry::{DeviceType, ExtractionResult, PatternRegistry, IMEI_DIGITS};
pub use session::{Attachment, FormatStatus, MatchStatus, StepState, VerificationSession};
pub use types::{AttachmentRecord, SessionSnapshot};
