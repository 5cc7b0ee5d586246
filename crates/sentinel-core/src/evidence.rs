//! Evidence records and archive key allocation.
//!
//! Keys are derived from the capture second: `<prefix>/WARNING_<secs>.jpg`.
//! A second denied capture within the same second gets a `_<n>` suffix
//! rather than overwriting the first.

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::future::Future;
use std::sync::{Mutex, PoisonError};

use crate::types::{ArchiveError, CaptureFrame};

/// Default object-storage prefix for unrecognized captures.
pub const DEFAULT_EVIDENCE_PREFIX: &str = "intruders";

/// Keys tried per frame before giving up on a crowded second.
pub const MAX_KEY_ATTEMPTS: u32 = 8;

/// A denied cycle's frame as it was written to storage.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct IntruderRecord {
    pub key: String,
    pub sha256: String,
    pub captured_at: DateTime<Utc>,
    pub size: usize,
}

impl IntruderRecord {
    pub fn new(key: impl Into<String>, frame: &CaptureFrame) -> Self {
        Self {
            key: key.into(),
            sha256: frame.sha256_hex(),
            captured_at: frame.captured_at(),
            size: frame.len(),
        }
    }
}

/// Build an evidence key. `seq` 0 is the plain form.
pub fn evidence_key(prefix: &str, unix_secs: i64, seq: u32) -> String {
    let name = if seq == 0 {
        format!("WARNING_{unix_secs}.jpg")
    } else {
        format!("WARNING_{unix_secs}_{seq}.jpg")
    };
    if prefix.is_empty() {
        name
    } else {
        format!("{prefix}/{name}")
    }
}

/// Hands out collision-free evidence keys within one process.
///
/// Only the most recent second is remembered; storage backends should still
/// write conditionally so an out-of-order clock cannot overwrite evidence.
pub struct EvidenceKeys {
    prefix: String,
    last: Mutex<Option<(i64, u32)>>,
}

impl EvidenceKeys {
    pub fn new(prefix: impl Into<String>) -> Self {
        let prefix: String = prefix.into();
        Self {
            prefix: prefix.trim_end_matches('/').to_string(),
            last: Mutex::new(None),
        }
    }

    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    /// Allocate the key for a frame captured at `captured_at`.
    pub fn allocate(&self, captured_at: DateTime<Utc>) -> String {
        let secs = captured_at.timestamp();
        let mut last = self.last.lock().unwrap_or_else(PoisonError::into_inner);
        let seq = match *last {
            Some((prev, n)) if prev == secs => n + 1,
            _ => 0,
        };
        *last = Some((secs, seq));
        evidence_key(&self.prefix, secs, seq)
    }

    /// Write under the first free key for `captured_at`.
    ///
    /// `put` must refuse to overwrite and report a taken key as
    /// [`ArchiveError::AlreadyExists`]; the next `_<n>` key is then tried,
    /// up to [`MAX_KEY_ATTEMPTS`]. Any other error is returned as is.
    /// Covers keys left by an earlier process that this allocator never saw.
    pub async fn write_unique<F, Fut>(
        &self,
        captured_at: DateTime<Utc>,
        mut put: F,
    ) -> Result<String, ArchiveError>
    where
        F: FnMut(String) -> Fut,
        Fut: Future<Output = Result<(), ArchiveError>>,
    {
        let mut taken = String::new();
        for _ in 0..MAX_KEY_ATTEMPTS {
            let key = self.allocate(captured_at);
            match put(key.clone()).await {
                Ok(()) => return Ok(key),
                Err(ArchiveError::AlreadyExists(existing)) => {
                    tracing::debug!(key = %existing, "evidence key taken; trying next");
                    taken = existing;
                }
                Err(e) => return Err(e),
            }
        }
        Err(ArchiveError::AlreadyExists(taken))
    }
}

impl Default for EvidenceKeys {
    fn default() -> Self {
        Self::new(DEFAULT_EVIDENCE_PREFIX)
    }
}
