use sentinel_core::{AccessGate, GateError};
use std::sync::Arc;
use zbus::interface;

pub const BUS_NAME: &str = "org.hideit.Sentinel1";
pub const OBJECT_PATH: &str = "/org/hideit/Sentinel1";

#[derive(Debug, zbus::DBusError)]
#[zbus(prefix = "org.hideit.Sentinel1.Error")]
pub enum SentinelError {
    #[zbus(error)]
    ZBus(zbus::Error),
    /// A check is already capturing or verifying.
    Busy(String),
    /// The camera produced no frame; no decision was made.
    CaptureFailed(String),
}

impl From<GateError> for SentinelError {
    fn from(e: GateError) -> Self {
        match e {
            GateError::Busy(_) => Self::Busy(e.to_string()),
            GateError::Capture(_) => Self::CaptureFailed(e.to_string()),
        }
    }
}

/// D-Bus front of the access gate.
///
/// Bus name: org.hideit.Sentinel1
/// Object path: /org/hideit/Sentinel1
pub struct SentinelService {
    gate: Arc<AccessGate>,
}

impl SentinelService {
    pub fn new(gate: Arc<AccessGate>) -> Self {
        Self { gate }
    }
}

#[interface(name = "org.hideit.Sentinel1")]
impl SentinelService {
    /// Run one presence check. Returns "granted" or "denied".
    async fn run_check(&self) -> Result<String, SentinelError> {
        tracing::info!("check requested");
        let outcome = self.gate.run_check().await?;
        Ok(outcome.as_str().to_string())
    }

    /// Leave the personal area: back to idle, last cycle forgotten.
    async fn logout(&self) {
        let state = self.gate.reset();
        tracing::info!(%state, "logout");
    }

    /// Return daemon status as JSON.
    async fn status(&self) -> zbus::fdo::Result<String> {
        let settings = self.gate.settings();
        Ok(serde_json::json!({
            "version": env!("CARGO_PKG_VERSION"),
            "state": self.gate.state(),
            "reference": settings.reference.to_string(),
            "threshold": settings.threshold,
            "last_cycle": self.gate.last_cycle(),
        })
        .to_string())
    }
}
