//! sentinel-core — Presence gate engine.
//!
//! Orchestrates a single-shot capture, a remote face comparison against one
//! enrolled reference, and evidence archival of unrecognized captures.
//! Hardware and cloud access live behind the traits in [`types`].

pub mod evidence;
pub mod gate;
pub mod types;

pub use evidence::{
    evidence_key, EvidenceKeys, IntruderRecord, DEFAULT_EVIDENCE_PREFIX, MAX_KEY_ATTEMPTS,
};
pub use gate::{AccessGate, CycleReport, GateError, GateSettings, DEFAULT_SIMILARITY_THRESHOLD};
pub use types::{
    ArchiveError, CaptureError, CaptureFrame, CaptureSource, EvidenceArchiver, GateState,
    IdentityVerifier, ReferenceIdentity, SessionOutcome, VerificationOutcome, Verdict,
};
