use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

use crate::evidence::IntruderRecord;

/// An encoded (JPEG) still image and the moment it was taken.
///
/// The byte buffer is shared, never mutated, and lives for exactly one
/// verification cycle.
#[derive(Clone)]
pub struct CaptureFrame {
    bytes: Arc<[u8]>,
    captured_at: DateTime<Utc>,
}

impl CaptureFrame {
    pub fn new(bytes: impl Into<Arc<[u8]>>, captured_at: DateTime<Utc>) -> Self {
        Self {
            bytes: bytes.into(),
            captured_at,
        }
    }

    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    pub fn captured_at(&self) -> DateTime<Utc> {
        self.captured_at
    }

    /// Capture time in whole seconds since the Unix epoch.
    pub fn unix_timestamp(&self) -> i64 {
        self.captured_at.timestamp()
    }

    /// Lowercase hex SHA-256 of the encoded image, recorded alongside evidence.
    pub fn sha256_hex(&self) -> String {
        format!("{:x}", Sha256::digest(&self.bytes))
    }
}

// Frames are biometric data: never dump the bytes into logs.
impl fmt::Debug for CaptureFrame {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CaptureFrame")
            .field("len", &self.bytes.len())
            .field("captured_at", &self.captured_at)
            .finish()
    }
}

/// Storage pointer to the single enrolled reference image.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReferenceIdentity {
    pub bucket: String,
    pub key: String,
}

impl ReferenceIdentity {
    pub fn new(bucket: impl Into<String>, key: impl Into<String>) -> Self {
        Self {
            bucket: bucket.into(),
            key: key.into(),
        }
    }
}

impl fmt::Display for ReferenceIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "s3://{}/{}", self.bucket, self.key)
    }
}

/// Result of one comparison attempt. Exactly one variant per attempt.
#[derive(Debug, Clone, PartialEq)]
pub enum VerificationOutcome {
    /// At least one face matched at or above the threshold.
    Matched { confidence: f32 },
    /// The service answered and reported no matching face.
    NotMatched,
    /// The call itself failed: transport, auth, timeout or malformed response.
    ServiceError { detail: String },
}

impl VerificationOutcome {
    /// Apply the match policy to the similarity scores a service returned.
    ///
    /// The best score wins; it must reach `threshold` (0–100 scale) to count.
    /// An empty list is a genuine non-match, not an error. NaN scores are ignored.
    pub fn from_similarities<I>(scores: I, threshold: f32) -> Self
    where
        I: IntoIterator<Item = f32>,
    {
        let best = scores
            .into_iter()
            .filter(|s| !s.is_nan())
            .fold(None, |best: Option<f32>, s| Some(best.map_or(s, |b| b.max(s))));

        match best {
            Some(confidence) if confidence >= threshold => Self::Matched { confidence },
            _ => Self::NotMatched,
        }
    }

    pub fn is_match(&self) -> bool {
        matches!(self, Self::Matched { .. })
    }

    pub fn verdict(&self) -> Verdict {
        match self {
            Self::Matched { .. } => Verdict::Matched,
            Self::NotMatched => Verdict::NotMatched,
            Self::ServiceError { .. } => Verdict::ServiceError,
        }
    }
}

/// Payload-free tag of a [`VerificationOutcome`], used in diagnostics.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Verdict {
    Matched,
    NotMatched,
    ServiceError,
}

/// What the presentation layer gets to see. Carries no identity detail.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SessionOutcome {
    #[serde(rename = "granted")]
    Granted,
    #[serde(rename = "denied")]
    DeniedLogged,
}

impl SessionOutcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Granted => "granted",
            Self::DeniedLogged => "denied",
        }
    }
}

impl fmt::Display for SessionOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Error)]
#[error("unknown session outcome: {0:?}")]
pub struct ParseOutcomeError(String);

impl FromStr for SessionOutcome {
    type Err = ParseOutcomeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "granted" => Ok(Self::Granted),
            "denied" => Ok(Self::DeniedLogged),
            other => Err(ParseOutcomeError(other.to_string())),
        }
    }
}

/// Access gate state machine position.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GateState {
    Idle,
    Capturing,
    Verifying,
    Granted,
    DeniedLogged,
}

impl GateState {
    /// True while a cycle owns the pipeline.
    pub fn in_flight(&self) -> bool {
        matches!(self, Self::Capturing | Self::Verifying)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::Capturing => "capturing",
            Self::Verifying => "verifying",
            Self::Granted => "granted",
            Self::DeniedLogged => "denied_logged",
        }
    }
}

impl fmt::Display for GateState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl From<SessionOutcome> for GateState {
    fn from(outcome: SessionOutcome) -> Self {
        match outcome {
            SessionOutcome::Granted => Self::Granted,
            SessionOutcome::DeniedLogged => Self::DeniedLogged,
        }
    }
}

#[derive(Error, Debug)]
pub enum CaptureError {
    #[error("device not found: {0}")]
    DeviceNotFound(String),
    #[error("device busy")]
    DeviceBusy,
    #[error("device error: {0}")]
    Device(String),
    #[error("no frame produced: {0}")]
    NoFrame(String),
    #[error("capture timed out after {0:?}")]
    Timeout(Duration),
    #[error("capture task aborted: {0}")]
    Aborted(String),
}

#[derive(Error, Debug)]
pub enum ArchiveError {
    #[error("evidence key already exists: {0}")]
    AlreadyExists(String),
    #[error("evidence write failed: {0}")]
    Write(String),
    #[error("evidence write timed out after {0:?}")]
    Timeout(Duration),
}

/// Acquires exactly one still frame per call.
///
/// Blocking: the gate runs it on the blocking thread pool. Implementations
/// must release the device before returning, on success and on failure.
pub trait CaptureSource: Send + Sync {
    fn capture(&self) -> Result<CaptureFrame, CaptureError>;
}

/// Compares a captured frame against the reference identity.
///
/// Failures are reported in-band as [`VerificationOutcome::ServiceError`].
/// Implementations must not log, store, or retain the frame.
#[async_trait]
pub trait IdentityVerifier: Send + Sync {
    async fn compare(
        &self,
        frame: &CaptureFrame,
        reference: &ReferenceIdentity,
        threshold: f32,
    ) -> VerificationOutcome;
}

/// Persists the frame of a denied cycle as audit evidence.
#[async_trait]
pub trait EvidenceArchiver: Send + Sync {
    async fn store(&self, frame: &CaptureFrame) -> Result<IntruderRecord, ArchiveError>;
}
