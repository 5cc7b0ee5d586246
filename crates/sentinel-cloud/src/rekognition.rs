//! Rekognition `CompareFaces` verifier.
//!
//! The reference is passed by S3 pointer, the candidate inline. The frame
//! is not logged or kept once the request has been sent.

use async_trait::async_trait;
use aws_sdk_rekognition::error::DisplayErrorContext;
use aws_sdk_rekognition::primitives::Blob;
use aws_sdk_rekognition::types::{CompareFacesMatch, Image, S3Object};
use aws_sdk_rekognition::Client;
use sentinel_core::{CaptureFrame, IdentityVerifier, ReferenceIdentity, VerificationOutcome};

pub struct RekognitionVerifier {
    client: Client,
}

impl RekognitionVerifier {
    pub fn new(client: Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl IdentityVerifier for RekognitionVerifier {
    async fn compare(
        &self,
        frame: &CaptureFrame,
        reference: &ReferenceIdentity,
        threshold: f32,
    ) -> VerificationOutcome {
        let source = Image::builder()
            .s3_object(
                S3Object::builder()
                    .bucket(&reference.bucket)
                    .name(&reference.key)
                    .build(),
            )
            .build();
        let target = Image::builder().bytes(Blob::new(frame.bytes())).build();

        let result = self
            .client
            .compare_faces()
            .source_image(source)
            .target_image(target)
            .similarity_threshold(threshold)
            .send()
            .await;

        match result {
            Ok(output) => outcome_from_matches(output.face_matches.as_deref(), threshold),
            Err(e) => VerificationOutcome::ServiceError {
                detail: DisplayErrorContext(&e).to_string(),
            },
        }
    }
}

/// A missing `FaceMatches` list, or a match without a `Similarity`, is a
/// malformed response rather than a non-match.
fn outcome_from_matches(
    matches: Option<&[CompareFacesMatch]>,
    threshold: f32,
) -> VerificationOutcome {
    let Some(matches) = matches else {
        return VerificationOutcome::ServiceError {
            detail: "response missing FaceMatches".into(),
        };
    };
    let scores: Option<Vec<f32>> = matches.iter().map(|m| m.similarity).collect();
    match scores {
        Some(scores) => VerificationOutcome::from_similarities(scores, threshold),
        None => VerificationOutcome::ServiceError {
            detail: "match without Similarity".into(),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn face(similarity: f32) -> CompareFacesMatch {
        CompareFacesMatch::builder().similarity(similarity).build()
    }

    fn judge(matches: &[CompareFacesMatch]) -> VerificationOutcome {
        outcome_from_matches(Some(matches), 90.0)
    }

    #[test]
    fn test_match_above_threshold() {
        assert_eq!(judge(&[face(95.0)]), VerificationOutcome::Matched { confidence: 95.0 });
    }

    #[test]
    fn test_best_of_several_matches() {
        assert_eq!(
            judge(&[face(91.0), face(98.5)]),
            VerificationOutcome::Matched { confidence: 98.5 }
        );
    }

    #[test]
    fn test_empty_list_is_not_matched() {
        assert_eq!(judge(&[]), VerificationOutcome::NotMatched);
    }

    #[test]
    fn test_missing_list_is_service_error() {
        let outcome = outcome_from_matches(None, 90.0);
        assert!(matches!(outcome, VerificationOutcome::ServiceError { .. }));
    }

    #[test]
    fn test_match_without_similarity_is_service_error() {
        assert_eq!(
            judge(&[CompareFacesMatch::builder().build()]),
            VerificationOutcome::ServiceError {
                detail: "match without Similarity".into()
            }
        );
        // One unscored entry taints an otherwise matching response.
        assert!(matches!(
            judge(&[face(99.0), CompareFacesMatch::builder().build()]),
            VerificationOutcome::ServiceError { .. }
        ));
    }
}
