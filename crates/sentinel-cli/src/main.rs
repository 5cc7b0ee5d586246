use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use sentinel_core::{CaptureSource, SessionOutcome};
use sentinel_hw::{Camera, V4lCaptureSource};
use std::path::PathBuf;
use std::process::ExitCode;
use std::time::Duration;

const LANDING_LINE: &str = "What are you looking for?";
const INTRUDER_LINE: &str = "You are not the owner, your face is in the database.";

#[zbus::proxy(
    interface = "org.hideit.Sentinel1",
    default_service = "org.hideit.Sentinel1",
    default_path = "/org/hideit/Sentinel1"
)]
trait Sentinel {
    fn run_check(&self) -> zbus::Result<String>;
    fn logout(&self) -> zbus::Result<()>;
    fn status(&self) -> zbus::Result<String>;
}

#[derive(Parser)]
#[command(name = "sentinel", about = "Sentinel presence gate CLI")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run one presence check and enter the personal area
    Check,
    /// Leave the personal area
    Logout,
    /// Show daemon status
    Status,
    /// List V4L2 capture devices
    Devices,
    /// Capture a still directly from the camera (bypasses the daemon)
    Test {
        /// V4L2 device path
        #[arg(short, long, default_value = "/dev/video0")]
        device: String,
        /// Where to write the JPEG
        #[arg(short, long, default_value = "sentinel-test.jpg")]
        output: PathBuf,
        /// Auto-exposure settle time in milliseconds
        #[arg(long, default_value_t = 300)]
        settle_ms: u64,
    },
}

#[tokio::main]
async fn main() -> Result<ExitCode> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Check => {
            let proxy = connect().await?;
            return match proxy.run_check().await {
                Ok(reply) => {
                    let outcome: SessionOutcome =
                        reply.parse().context("unexpected reply from sentineld")?;
                    for line in outcome_lines(outcome) {
                        println!("{line}");
                    }
                    Ok(ExitCode::from(exit_status(outcome)))
                }
                Err(e) => {
                    eprintln!("{}", describe_error(&e));
                    Ok(ExitCode::FAILURE)
                }
            };
        }
        Commands::Logout => {
            connect().await?.logout().await.context("logout failed")?;
            println!("Logged out");
        }
        Commands::Status => {
            let status = connect().await?.status().await.context("status failed")?;
            let value: serde_json::Value = serde_json::from_str(&status)?;
            println!("{}", serde_json::to_string_pretty(&value)?);
        }
        Commands::Devices => {
            let devices = Camera::list_devices();
            if devices.is_empty() {
                println!("No V4L2 capture devices found");
            }
            for dev in devices {
                println!("{}  {} ({}, {})", dev.path, dev.name, dev.driver, dev.bus);
            }
        }
        Commands::Test {
            device,
            output,
            settle_ms,
        } => {
            let source = V4lCaptureSource::new(device).with_settle(Duration::from_millis(settle_ms));
            println!("Capturing from {}...", source.device_path());
            let frame = tokio::task::spawn_blocking(move || source.capture())
                .await?
                .context("capture failed")?;
            std::fs::write(&output, frame.bytes())
                .with_context(|| format!("writing {}", output.display()))?;
            println!(
                "Wrote {} ({} bytes, sha256 {})",
                output.display(),
                frame.len(),
                frame.sha256_hex()
            );
        }
    }

    Ok(ExitCode::SUCCESS)
}

async fn connect() -> Result<SentinelProxy<'static>> {
    let connection = zbus::Connection::session()
        .await
        .context("connecting to the session bus")?;
    let proxy = SentinelProxy::new(&connection)
        .await
        .context("sentineld not reachable")?;
    tracing::debug!("connected to sentineld");
    Ok(proxy)
}

/// Both outcomes land in the personal area; a denied one carries the warning.
fn outcome_lines(outcome: SessionOutcome) -> Vec<&'static str> {
    match outcome {
        SessionOutcome::Granted => vec![LANDING_LINE],
        SessionOutcome::DeniedLogged => vec![LANDING_LINE, INTRUDER_LINE],
    }
}

/// 0 granted, 2 denied; 1 is left for errors.
fn exit_status(outcome: SessionOutcome) -> u8 {
    match outcome {
        SessionOutcome::Granted => 0,
        SessionOutcome::DeniedLogged => 2,
    }
}

fn describe_error(e: &zbus::Error) -> String {
    match e {
        zbus::Error::MethodError(name, detail, _) => {
            let detail = detail.as_deref().unwrap_or("");
            match name.as_str() {
                "org.hideit.Sentinel1.Error.Busy" => format!("A check is already running: {detail}"),
                "org.hideit.Sentinel1.Error.CaptureFailed" => {
                    format!("Camera unavailable, try again: {detail}")
                }
                other => format!("{other}: {detail}"),
            }
        }
        other => format!("sentineld error: {other}"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_granted_shows_landing_only() {
        assert_eq!(outcome_lines(SessionOutcome::Granted), vec![LANDING_LINE]);
    }

    #[test]
    fn test_denied_adds_warning() {
        assert_eq!(
            outcome_lines(SessionOutcome::DeniedLogged),
            vec![LANDING_LINE, INTRUDER_LINE]
        );
    }

    #[test]
    fn test_describe_non_method_error() {
        let msg = describe_error(&zbus::Error::InterfaceNotFound);
        assert!(msg.starts_with("sentineld error:"), "{msg}");
    }

    #[test]
    fn test_exit_codes_differ() {
        assert_eq!(exit_status(SessionOutcome::Granted), 0);
        assert_eq!(exit_status(SessionOutcome::DeniedLogged), 2);
    }

    #[test]
    fn test_cli_parses_test_command() {
        let cli = Cli::parse_from(["sentinel", "test", "--device", "/dev/video2", "--settle-ms", "100"]);
        match cli.command {
            Commands::Test { device, settle_ms, output } => {
                assert_eq!(device, "/dev/video2");
                assert_eq!(settle_ms, 100);
                assert_eq!(output, PathBuf::from("sentinel-test.jpg"));
            }
            _ => panic!("expected test command"),
        }
    }
}
