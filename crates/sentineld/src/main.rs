use anyhow::{Context, Result};
use sentinel_cloud::{RekognitionVerifier, S3Archiver};
use sentinel_core::{AccessGate, EvidenceKeys};
use sentinel_hw::V4lCaptureSource;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

mod config;
mod dbus_interface;

use dbus_interface::{SentinelService, BUS_NAME, OBJECT_PATH};

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    tracing::info!("sentineld starting");

    let config = config::Config::load().context("loading configuration")?;
    tracing::info!(
        region = %config.region,
        reference = %config.reference(),
        threshold = config.similarity_threshold,
        camera = %config.camera_device,
        "configuration loaded"
    );

    let clients = sentinel_cloud::aws_clients(&config.region).await;

    let capture = V4lCaptureSource::new(&config.camera_device)
        .with_settle(config.settle())
        .with_jpeg_quality(config.jpeg_quality);
    let verifier = RekognitionVerifier::new(clients.rekognition);
    let archiver = S3Archiver::new(
        clients.s3,
        &config.bucket,
        EvidenceKeys::new(&config.evidence_prefix),
    );

    let gate = Arc::new(AccessGate::new(
        Arc::new(capture),
        Arc::new(verifier),
        Arc::new(archiver),
        config.gate_settings(),
    ));

    let _connection = zbus::connection::Builder::session()?
        .name(BUS_NAME)?
        .serve_at(OBJECT_PATH, SentinelService::new(gate))?
        .build()
        .await
        .context("registering on the session bus")?;

    tracing::info!(bus = BUS_NAME, path = OBJECT_PATH, "sentineld ready");

    // Keep running until signaled; an in-flight check is abandoned on exit.
    tokio::signal::ctrl_c().await?;
    tracing::info!("sentineld shutting down");

    Ok(())
}
