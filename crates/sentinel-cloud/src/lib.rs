//! sentinel-cloud — AWS adapters for the presence gate.
//!
//! Face comparison via Rekognition `CompareFaces` and evidence archival
//! via S3 `PutObject`.

pub mod client;
pub mod rekognition;
pub mod s3;

pub use client::{aws_clients, AwsClients};
pub use rekognition::RekognitionVerifier;
pub use s3::S3Archiver;
