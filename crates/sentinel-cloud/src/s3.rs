//! S3 evidence archive.

use async_trait::async_trait;
use aws_sdk_s3::error::{DisplayErrorContext, ProvideErrorMetadata};
use aws_sdk_s3::primitives::ByteStream;
use aws_sdk_s3::Client;
use sentinel_core::{ArchiveError, CaptureFrame, EvidenceArchiver, EvidenceKeys, IntruderRecord};

/// Writes denied frames under time-derived keys, never overwriting.
pub struct S3Archiver {
    client: Client,
    bucket: String,
    keys: EvidenceKeys,
}

impl S3Archiver {
    pub fn new(client: Client, bucket: impl Into<String>, keys: EvidenceKeys) -> Self {
        Self {
            client,
            bucket: bucket.into(),
            keys,
        }
    }

    /// Conditional write of one object; a taken key is `AlreadyExists`.
    async fn put(&self, key: String, frame: &CaptureFrame, sha256: &str) -> Result<(), ArchiveError> {
        let result = self
            .client
            .put_object()
            .bucket(&self.bucket)
            .key(&key)
            .body(ByteStream::from(frame.bytes().to_vec()))
            .content_type("image/jpeg")
            .if_none_match("*")
            .metadata("sha256", sha256)
            .metadata("captured-at", frame.captured_at().to_rfc3339())
            .send()
            .await;

        match result {
            Ok(_) => Ok(()),
            Err(e) if is_existing_object(e.code()) => Err(ArchiveError::AlreadyExists(key)),
            Err(e) => Err(ArchiveError::Write(DisplayErrorContext(&e).to_string())),
        }
    }
}

#[async_trait]
impl EvidenceArchiver for S3Archiver {
    async fn store(&self, frame: &CaptureFrame) -> Result<IntruderRecord, ArchiveError> {
        let sha256 = frame.sha256_hex();
        let key = self
            .keys
            .write_unique(frame.captured_at(), |key| self.put(key, frame, &sha256))
            .await?;
        Ok(IntruderRecord::new(key, frame))
    }
}

/// Error codes S3 returns when a conditional `If-None-Match: *` write loses.
fn is_existing_object(code: Option<&str>) -> bool {
    matches!(code, Some("PreconditionFailed" | "ConditionalRequestConflict"))
}
