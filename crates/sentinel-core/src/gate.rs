//! Access gate: runs a single capture through remote comparison and
//! decides whether the presence is the enrolled owner.
//!
//! `Idle → Capturing → Verifying → {Granted, DeniedLogged}`. Anything short
//! of a positive match is denied and the frame is archived exactly once.
//! Only a capture failure ends a cycle without a decision.

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use thiserror::Error;
use tracing::Instrument;
use uuid::Uuid;

use crate::types::{
    ArchiveError, CaptureError, CaptureFrame, CaptureSource, EvidenceArchiver, GateState,
    IdentityVerifier, ReferenceIdentity, SessionOutcome, VerificationOutcome, Verdict,
};

/// Default similarity threshold on the service's 0–100 scale.
pub const DEFAULT_SIMILARITY_THRESHOLD: f32 = 90.0;

#[derive(Error, Debug)]
pub enum GateError {
    #[error("a verification cycle is already in progress ({0})")]
    Busy(GateState),
    #[error("capture failed: {0}")]
    Capture(#[from] CaptureError),
}

/// Read-only per-gate configuration.
#[derive(Debug, Clone)]
pub struct GateSettings {
    pub reference: ReferenceIdentity,
    /// Minimum similarity (0–100) for a match.
    pub threshold: f32,
    pub capture_timeout: Duration,
    pub verify_timeout: Duration,
    pub archive_timeout: Duration,
}

impl GateSettings {
    pub fn new(reference: ReferenceIdentity) -> Self {
        Self {
            reference,
            threshold: DEFAULT_SIMILARITY_THRESHOLD,
            capture_timeout: Duration::from_secs(5),
            verify_timeout: Duration::from_secs(10),
            archive_timeout: Duration::from_secs(10),
        }
    }
}

/// Diagnostic summary of the most recent decided cycle.
#[derive(Debug, Clone, Serialize)]
pub struct CycleReport {
    pub cycle_id: Uuid,
    pub captured_at: DateTime<Utc>,
    pub outcome: SessionOutcome,
    pub verdict: Verdict,
    pub confidence: Option<f32>,
    pub service_error: Option<String>,
    pub evidence_key: Option<String>,
    pub archive_error: Option<String>,
}

struct Inner {
    state: GateState,
    last: Option<CycleReport>,
}

/// Presence gate over injected capture, verification and archival.
pub struct AccessGate {
    capture: Arc<dyn CaptureSource>,
    verifier: Arc<dyn IdentityVerifier>,
    archiver: Arc<dyn EvidenceArchiver>,
    settings: GateSettings,
    inner: Mutex<Inner>,
    /// Set while a blocking capture holds the camera, including one the
    /// gate stopped waiting for after a timeout or cancellation.
    device_claimed: Arc<AtomicBool>,
}

/// Releases the camera claim when the blocking capture returns or unwinds.
struct DeviceClaim(Arc<AtomicBool>);

impl Drop for DeviceClaim {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

impl AccessGate {
    pub fn new(
        capture: Arc<dyn CaptureSource>,
        verifier: Arc<dyn IdentityVerifier>,
        archiver: Arc<dyn EvidenceArchiver>,
        settings: GateSettings,
    ) -> Self {
        Self {
            capture,
            verifier,
            archiver,
            settings,
            inner: Mutex::new(Inner {
                state: GateState::Idle,
                last: None,
            }),
            device_claimed: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn settings(&self) -> &GateSettings {
        &self.settings
    }

    pub fn state(&self) -> GateState {
        self.lock().state
    }

    pub fn last_cycle(&self) -> Option<CycleReport> {
        self.lock().last.clone()
    }

    /// Return a decided gate to `Idle` and forget the last cycle (logout).
    ///
    /// Idempotent. Ignored while a cycle is in flight; returns the state
    /// the gate is in afterwards.
    pub fn reset(&self) -> GateState {
        let mut inner = self.lock();
        if inner.state.in_flight() {
            tracing::debug!(state = %inner.state, "reset ignored: cycle in flight");
            return inner.state;
        }
        inner.state = GateState::Idle;
        inner.last = None;
        GateState::Idle
    }

    /// Run one verification cycle.
    ///
    /// Rejected immediately with [`GateError::Busy`] if a cycle is already
    /// capturing or verifying, or if a timed-out capture has not yet let go
    /// of the camera. A capture failure returns the gate to `Idle`
    /// and surfaces as [`GateError::Capture`]; every other failure resolves
    /// to [`SessionOutcome::DeniedLogged`] after the frame has been archived.
    pub async fn run_check(&self) -> Result<SessionOutcome, GateError> {
        let guard = self.begin()?;
        let cycle_id = Uuid::new_v4();
        self.run_cycle(guard, cycle_id)
            .instrument(tracing::info_span!("cycle", id = %cycle_id))
            .await
    }

    fn begin(&self) -> Result<CycleGuard<'_>, GateError> {
        let mut inner = self.lock();
        if inner.state.in_flight() {
            tracing::info!(state = %inner.state, "check rejected: cycle in flight");
            return Err(GateError::Busy(inner.state));
        }
        if self.device_claimed.load(Ordering::Acquire) {
            tracing::info!("check rejected: an abandoned capture still holds the camera");
            return Err(GateError::Busy(GateState::Capturing));
        }
        inner.state = GateState::Capturing;
        inner.last = None;
        Ok(CycleGuard {
            inner: &self.inner,
            finished: false,
        })
    }

    async fn run_cycle(
        &self,
        guard: CycleGuard<'_>,
        cycle_id: Uuid,
    ) -> Result<SessionOutcome, GateError> {
        let frame = match self.capture_frame().await {
            Ok(frame) => frame,
            Err(e) => {
                tracing::warn!(error = %e, "capture failed; no decision made");
                guard.finish(GateState::Idle, None);
                return Err(e.into());
            }
        };
        tracing::debug!(bytes = frame.len(), ts = frame.unix_timestamp(), "frame captured");

        guard.advance(GateState::Verifying);
        let outcome = self.verify(&frame).await;

        let mut report = CycleReport {
            cycle_id,
            captured_at: frame.captured_at(),
            outcome: SessionOutcome::DeniedLogged,
            verdict: outcome.verdict(),
            confidence: None,
            service_error: None,
            evidence_key: None,
            archive_error: None,
        };

        let session = match outcome {
            VerificationOutcome::Matched { confidence } => {
                tracing::info!(confidence, "identity confirmed");
                report.confidence = Some(confidence);
                SessionOutcome::Granted
            }
            VerificationOutcome::NotMatched => {
                tracing::info!("no matching face");
                self.archive(&frame, &mut report).await;
                SessionOutcome::DeniedLogged
            }
            VerificationOutcome::ServiceError { detail } => {
                tracing::warn!(%detail, "comparison service failed; denying");
                report.service_error = Some(detail);
                self.archive(&frame, &mut report).await;
                SessionOutcome::DeniedLogged
            }
        };

        report.outcome = session;
        guard.finish(session.into(), Some(report));
        Ok(session)
    }

    async fn capture_frame(&self) -> Result<CaptureFrame, CaptureError> {
        let source = Arc::clone(&self.capture);
        self.device_claimed.store(true, Ordering::Release);
        let claim = DeviceClaim(Arc::clone(&self.device_claimed));
        let task = tokio::task::spawn_blocking(move || {
            let _claim = claim;
            source.capture()
        });
        match tokio::time::timeout(self.settings.capture_timeout, task).await {
            Ok(Ok(result)) => result,
            Ok(Err(join)) => Err(CaptureError::Aborted(join.to_string())),
            Err(_) => Err(CaptureError::Timeout(self.settings.capture_timeout)),
        }
    }

    async fn verify(&self, frame: &CaptureFrame) -> VerificationOutcome {
        let compare = self
            .verifier
            .compare(frame, &self.settings.reference, self.settings.threshold);
        match tokio::time::timeout(self.settings.verify_timeout, compare).await {
            Ok(outcome) => outcome,
            Err(_) => VerificationOutcome::ServiceError {
                detail: format!("comparison timed out after {:?}", self.settings.verify_timeout),
            },
        }
    }

    /// Archive failures are reported, never escalated: the deny stands.
    async fn archive(&self, frame: &CaptureFrame, report: &mut CycleReport) {
        let result = match tokio::time::timeout(
            self.settings.archive_timeout,
            self.archiver.store(frame),
        )
        .await
        {
            Ok(result) => result,
            Err(_) => Err(ArchiveError::Timeout(self.settings.archive_timeout)),
        };

        match result {
            Ok(record) => {
                tracing::warn!(
                    key = %record.key,
                    sha256 = %record.sha256,
                    size = record.size,
                    "unrecognized presence archived"
                );
                report.evidence_key = Some(record.key);
            }
            Err(e) => {
                tracing::error!(error = %e, "evidence archival failed");
                report.archive_error = Some(e.to_string());
            }
        }
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Owns the gate for the duration of one cycle.
///
/// Dropped without `finish` (cancelled future), it puts the gate back to `Idle`.
struct CycleGuard<'a> {
    inner: &'a Mutex<Inner>,
    finished: bool,
}

impl CycleGuard<'_> {
    fn advance(&self, state: GateState) {
        self.lock().state = state;
    }

    fn finish(mut self, state: GateState, report: Option<CycleReport>) {
        let mut inner = self.lock();
        inner.state = state;
        inner.last = report;
        drop(inner);
        self.finished = true;
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Drop for CycleGuard<'_> {
    fn drop(&mut self) {
        if !self.finished {
            tracing::warn!("cycle abandoned before a decision; gate back to idle");
            let mut inner = self.lock();
            inner.state = GateState::Idle;
            inner.last = None;
        }
    }
}
