use anyhow::{anyhow, bail, Context, Result};
use sentinel_core::{GateSettings, ReferenceIdentity, DEFAULT_EVIDENCE_PREFIX};
use serde::Deserialize;
use std::fmt::Display;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

/// Daemon configuration: defaults, then an optional TOML file, then
/// `SENTINEL_*` environment variables. Read once at startup.
#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
    /// AWS region for both Rekognition and S3.
    pub region: String,
    /// Bucket holding the reference image and the evidence archive.
    pub bucket: String,
    /// Object key of the enrolled reference image.
    pub reference_key: String,
    /// Minimum Rekognition similarity (0–100) for a match.
    pub similarity_threshold: f32,
    /// Key prefix for archived unrecognized captures.
    pub evidence_prefix: String,
    /// V4L2 device path.
    pub camera_device: String,
    /// Auto-exposure settle time before the still is taken.
    pub settle_ms: u64,
    pub jpeg_quality: u8,
    pub capture_timeout_secs: u64,
    pub verify_timeout_secs: u64,
    pub archive_timeout_secs: u64,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            region: "eu-west-2".to_string(),
            bucket: "face.reco".to_string(),
            reference_key: "users/owner.jpg".to_string(),
            similarity_threshold: sentinel_core::DEFAULT_SIMILARITY_THRESHOLD,
            evidence_prefix: DEFAULT_EVIDENCE_PREFIX.to_string(),
            camera_device: "/dev/video0".to_string(),
            settle_ms: 300,
            jpeg_quality: 90,
            capture_timeout_secs: 5,
            verify_timeout_secs: 10,
            archive_timeout_secs: 10,
        }
    }
}

impl Config {
    /// Load from the config file (if any) and the process environment.
    pub fn load() -> Result<Self> {
        let file = match config_path() {
            Some(path) => {
                tracing::debug!(path = %path.display(), "reading config file");
                Some(
                    std::fs::read_to_string(&path)
                        .with_context(|| format!("reading {}", path.display()))?,
                )
            }
            None => None,
        };
        Self::from_sources(file.as_deref(), |key| std::env::var(key).ok())
    }

    pub fn from_sources(file: Option<&str>, env: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let mut config: Self = match file {
            Some(src) => toml::from_str(src).context("parsing config file")?,
            None => Self::default(),
        };

        override_string(&env, "SENTINEL_REGION", &mut config.region);
        override_string(&env, "SENTINEL_BUCKET", &mut config.bucket);
        override_string(&env, "SENTINEL_REFERENCE_KEY", &mut config.reference_key);
        override_string(&env, "SENTINEL_EVIDENCE_PREFIX", &mut config.evidence_prefix);
        override_string(&env, "SENTINEL_CAMERA_DEVICE", &mut config.camera_device);
        override_parsed(&env, "SENTINEL_SIMILARITY_THRESHOLD", &mut config.similarity_threshold)?;
        override_parsed(&env, "SENTINEL_SETTLE_MS", &mut config.settle_ms)?;
        override_parsed(&env, "SENTINEL_JPEG_QUALITY", &mut config.jpeg_quality)?;
        override_parsed(&env, "SENTINEL_CAPTURE_TIMEOUT_SECS", &mut config.capture_timeout_secs)?;
        override_parsed(&env, "SENTINEL_VERIFY_TIMEOUT_SECS", &mut config.verify_timeout_secs)?;
        override_parsed(&env, "SENTINEL_ARCHIVE_TIMEOUT_SECS", &mut config.archive_timeout_secs)?;

        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<()> {
        if !(0.0..=100.0).contains(&self.similarity_threshold) {
            bail!(
                "similarity_threshold must be within 0–100, got {}",
                self.similarity_threshold
            );
        }
        for (field, value) in [
            ("region", &self.region),
            ("bucket", &self.bucket),
            ("reference_key", &self.reference_key),
            ("camera_device", &self.camera_device),
        ] {
            if value.trim().is_empty() {
                bail!("{field} must not be empty");
            }
        }
        for (field, secs) in [
            ("capture_timeout_secs", self.capture_timeout_secs),
            ("verify_timeout_secs", self.verify_timeout_secs),
            ("archive_timeout_secs", self.archive_timeout_secs),
        ] {
            if secs == 0 {
                bail!("{field} must be at least 1");
            }
        }
        if !(1..=100).contains(&self.jpeg_quality) {
            bail!("jpeg_quality must be within 1–100, got {}", self.jpeg_quality);
        }
        Ok(())
    }

    pub fn reference(&self) -> ReferenceIdentity {
        ReferenceIdentity::new(&self.bucket, &self.reference_key)
    }

    pub fn settle(&self) -> Duration {
        Duration::from_millis(self.settle_ms)
    }

    pub fn gate_settings(&self) -> GateSettings {
        GateSettings {
            reference: self.reference(),
            threshold: self.similarity_threshold,
            capture_timeout: Duration::from_secs(self.capture_timeout_secs),
            verify_timeout: Duration::from_secs(self.verify_timeout_secs),
            archive_timeout: Duration::from_secs(self.archive_timeout_secs),
        }
    }
}

/// `SENTINEL_CONFIG` if set, else `$XDG_CONFIG_HOME/sentinel/config.toml` when it exists.
fn config_path() -> Option<PathBuf> {
    if let Ok(path) = std::env::var("SENTINEL_CONFIG") {
        return Some(PathBuf::from(path));
    }
    let base = std::env::var("XDG_CONFIG_HOME")
        .map(PathBuf::from)
        .or_else(|_| std::env::var("HOME").map(|home| PathBuf::from(home).join(".config")))
        .ok()?;
    let path = base.join("sentinel").join("config.toml");
    path.exists().then_some(path)
}

fn override_string(env: &impl Fn(&str) -> Option<String>, key: &str, slot: &mut String) {
    if let Some(value) = env(key) {
        *slot = value;
    }
}

fn override_parsed<T>(env: &impl Fn(&str) -> Option<String>, key: &str, slot: &mut T) -> Result<()>
where
    T: FromStr,
    T::Err: Display,
{
    if let Some(raw) = env(key) {
        *slot = raw
            .trim()
            .parse()
            .map_err(|e| anyhow!("{key}={raw:?}: {e}"))?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn env_of(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_defaults() {
        let config = Config::from_sources(None, env_of(&[])).unwrap();
        assert_eq!(config.region, "eu-west-2");
        assert_eq!(config.bucket, "face.reco");
        assert_eq!(config.similarity_threshold, 90.0);
        assert_eq!(config.evidence_prefix, "intruders");
        assert_eq!(config.settle(), Duration::from_millis(300));
    }

    #[test]
    fn test_file_values() {
        let file = r#"
            bucket = "audit.bucket"
            reference_key = "users/marco.jpg"
            similarity_threshold = 85.5
            verify_timeout_secs = 3
        "#;
        let config = Config::from_sources(Some(file), env_of(&[])).unwrap();
        assert_eq!(config.bucket, "audit.bucket");
        assert_eq!(config.similarity_threshold, 85.5);
        assert_eq!(config.reference().to_string(), "s3://audit.bucket/users/marco.jpg");
        assert_eq!(config.gate_settings().verify_timeout, Duration::from_secs(3));
        // Untouched fields keep their defaults.
        assert_eq!(config.region, "eu-west-2");
    }

    #[test]
    fn test_env_overrides_file() {
        let file = r#"similarity_threshold = 80.0"#;
        let env = env_of(&[
            ("SENTINEL_SIMILARITY_THRESHOLD", "97"),
            ("SENTINEL_CAMERA_DEVICE", "/dev/video2"),
        ]);
        let config = Config::from_sources(Some(file), env).unwrap();
        assert_eq!(config.similarity_threshold, 97.0);
        assert_eq!(config.camera_device, "/dev/video2");
        assert_eq!(config.gate_settings().threshold, 97.0);
    }

    #[test]
    fn test_unparseable_env_rejected() {
        let err = Config::from_sources(None, env_of(&[("SENTINEL_SETTLE_MS", "soon")]))
            .unwrap_err()
            .to_string();
        assert!(err.contains("SENTINEL_SETTLE_MS"), "{err}");
    }

    #[test]
    fn test_threshold_out_of_range_rejected() {
        let result = Config::from_sources(None, env_of(&[("SENTINEL_SIMILARITY_THRESHOLD", "120")]));
        assert!(result.is_err());
    }

    #[test]
    fn test_empty_bucket_rejected() {
        let result = Config::from_sources(Some(r#"bucket = """#), env_of(&[]));
        assert!(result.unwrap_err().to_string().contains("bucket"));
    }

    #[test]
    fn test_zero_timeout_rejected() {
        let result = Config::from_sources(None, env_of(&[("SENTINEL_VERIFY_TIMEOUT_SECS", "0")]));
        assert!(result.is_err());
    }

    #[test]
    fn test_unknown_field_rejected() {
        let result = Config::from_sources(Some(r#"treshold = 90.0"#), env_of(&[]));
        assert!(result.is_err());
    }
}
