use crate::core::detectors::DetectorThresholds;
use crate::models::landmarks::LandmarkConfig;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Application configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct Config {
    /// Root directory of the filesystem evidence store
    pub storage_path: PathBuf,
    /// SQLite database file
    pub database_path: PathBuf,
    /// HTTP object endpoint; when set it replaces the filesystem store
    pub evidence_endpoint: Option<String>,
    /// Bucket name on the HTTP object endpoint
    pub evidence_bucket: String,
    /// Bearer token sent to the HTTP object endpoint
    pub evidence_token: Option<String>,
    /// Per-request timeout for the HTTP object endpoint
    pub http_timeout_seconds: u64,
    /// Detector tuning
    pub thresholds: DetectorThresholds,
    /// Face mesh provider settings
    pub landmarks: LandmarkConfig,
    /// Upper bound on simultaneous snapshot downloads while building a report
    pub max_concurrent_fetches: usize,
}

impl Default for Config {
    fn default() -> Self {
        let data_dir = Self::data_dir();

        Self {
            storage_path: data_dir.join("evidence"),
            database_path: data_dir.join("database").join("proctor.db"),
            evidence_endpoint: None,
            evidence_bucket: "snapshots".to_string(),
            evidence_token: None,
            http_timeout_seconds: 30,
            thresholds: DetectorThresholds::default(),
            landmarks: LandmarkConfig::default(),
            max_concurrent_fetches: 4,
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Could not determine home directory")]
    NoHomeDirectory,

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid config file: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

pub type ConfigResult<T> = Result<T, ConfigError>;

impl Config {
    /// Load configuration from file, creating with defaults if it doesn't exist
    pub fn load() -> ConfigResult<Self> {
        Self::load_from(&Self::get_config_path()?)
    }

    pub fn load_from(path: &Path) -> ConfigResult<Self> {
        if path.exists() {
            let contents = std::fs::read_to_string(path)?;
            let config: Config = serde_json::from_str(&contents)?;
            config.validate()?;
            Ok(config)
        } else {
            let config = Self::default();
            config.save_to(path)?;
            tracing::info!(path = %path.display(), "wrote default configuration");
            Ok(config)
        }
    }

    /// Save configuration to file
    pub fn save(&self) -> ConfigResult<()> {
        self.save_to(&Self::get_config_path()?)
    }

    pub fn save_to(&self, path: &Path) -> ConfigResult<()> {
        self.validate()?;

        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let contents = serde_json::to_string_pretty(self)?;
        std::fs::write(path, contents)?;

        Ok(())
    }

    /// Validate configuration values
    pub fn validate(&self) -> ConfigResult<()> {
        let t = &self.thresholds;

        if t.luminance_cutoff == 0 || t.luminance_cutoff == 255 {
            return Err(ConfigError::Invalid(format!(
                "Invalid luminance cutoff: {}. Must be between 1 and 254",
                t.luminance_cutoff
            )));
        }

        if !(t.head_pose_threshold_deg > 0.0 && t.head_pose_threshold_deg < 90.0) {
            return Err(ConfigError::Invalid(format!(
                "Invalid head pose threshold: {}. Must be between 0 and 90 degrees",
                t.head_pose_threshold_deg
            )));
        }

        if !(t.mouth_ratio_threshold > 0.0 && t.mouth_ratio_threshold.is_finite()) {
            return Err(ConfigError::Invalid(format!(
                "Invalid mouth ratio threshold: {}. Must be positive",
                t.mouth_ratio_threshold
            )));
        }

        if self.landmarks.max_faces < 2 {
            return Err(ConfigError::Invalid(format!(
                "Invalid max faces: {}. At least 2 are needed to detect extra people",
                self.landmarks.max_faces
            )));
        }

        if !(0.0..=1.0).contains(&self.landmarks.min_detection_confidence) {
            return Err(ConfigError::Invalid(format!(
                "Invalid detection confidence: {}. Must be between 0 and 1",
                self.landmarks.min_detection_confidence
            )));
        }

        if self.max_concurrent_fetches == 0 || self.max_concurrent_fetches > 64 {
            return Err(ConfigError::Invalid(format!(
                "Invalid max concurrent fetches: {}. Must be between 1 and 64",
                self.max_concurrent_fetches
            )));
        }

        if self.http_timeout_seconds == 0 || self.http_timeout_seconds > 300 {
            return Err(ConfigError::Invalid(format!(
                "Invalid HTTP timeout: {}. Must be between 1 and 300 seconds",
                self.http_timeout_seconds
            )));
        }

        if let Some(endpoint) = &self.evidence_endpoint {
            if !(endpoint.starts_with("http://") || endpoint.starts_with("https://")) {
                return Err(ConfigError::Invalid(format!(
                    "Invalid evidence endpoint: {}. Must be an http(s) URL",
                    endpoint
                )));
            }
            if self.evidence_bucket.trim_matches('/').is_empty() {
                return Err(ConfigError::Invalid("Evidence bucket cannot be empty".to_string()));
            }
        }

        Ok(())
    }

    /// Reset to default configuration
    pub fn reset() -> ConfigResult<Self> {
        let config = Self::default();
        config.save()?;
        Ok(config)
    }

    fn data_dir() -> PathBuf {
        let home = std::env::var("HOME")
            .or_else(|_| std::env::var("USERPROFILE"))
            .unwrap_or_else(|_| ".".to_string());

        PathBuf::from(home).join(".exam_proctor")
    }

    /// Get the configuration file path
    fn get_config_path() -> ConfigResult<PathBuf> {
        let home = std::env::var("HOME")
            .or_else(|_| std::env::var("USERPROFILE"))
            .map_err(|_| ConfigError::NoHomeDirectory)?;

        let mut path = PathBuf::from(home);
        path.push(".exam_proctor");
        path.push("config");
        path.push("settings.json");

        Ok(path)
    }
}
