//! Runtime configuration
//!
//! Defaults, overridden by an optional TOML file, then by environment
//! variables. The CLI applies its flags last.

use crate::api::UploadRetry;
use crate::capture::{MediaConstraints, Resolution};
use crate::utils::{AppError, AppResult};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

pub const ENV_API_URL: &str = "INTERVIEW_API_URL";
pub const ENV_API_TOKEN: &str = "INTERVIEW_API_TOKEN";
pub const ENV_MAX_QUESTIONS: &str = "INTERVIEW_MAX_QUESTIONS";

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct InterviewConfig {
    pub api: ApiConfig,
    pub flow: FlowConfig,
    pub analysis: AnalysisConfig,
    pub recording: RecordingConfig,
    pub storage: StorageConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ApiConfig {
    pub base_url: String,
    /// Attached as a bearer credential when set
    #[serde(skip_serializing)]
    pub bearer_token: Option<String>,
    pub request_timeout_secs: u64,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            base_url: "http://127.0.0.1:8000".to_string(),
            bearer_token: None,
            request_timeout_secs: 60,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FlowConfig {
    /// Hard cap on questions, including follow-ups
    pub max_questions: usize,
    pub upload_retry: UploadRetry,
    /// Record one continuous video alongside per-question audio
    pub record_session_video: bool,
}

impl Default for FlowConfig {
    fn default() -> Self {
        Self {
            max_questions: 10,
            upload_retry: UploadRetry::AutomaticOnce,
            record_session_video: true,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AnalysisConfig {
    pub poll_interval_ms: u64,
    pub max_attempts: u32,
}

impl AnalysisConfig {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        Self {
            poll_interval_ms: 2000,
            max_attempts: 90,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RecordingConfig {
    pub audio_mime: String,
    pub video_mime: String,
    pub video_width: u32,
    pub video_height: u32,
}

impl RecordingConfig {
    pub fn constraints(&self) -> MediaConstraints {
        MediaConstraints {
            audio: true,
            video: Some(Resolution {
                width: self.video_width,
                height: self.video_height,
            }),
            ..MediaConstraints::default()
        }
    }
}

impl Default for RecordingConfig {
    fn default() -> Self {
        Self {
            audio_mime: "audio/webm".to_string(),
            video_mime: "video/webm".to_string(),
            video_width: 1280,
            video_height: 720,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    pub cache_dir: PathBuf,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            cache_dir: std::env::temp_dir().join("interview-coach"),
        }
    }
}

impl InterviewConfig {
    /// Defaults plus `path` (when given) plus environment overrides
    pub fn load(path: Option<&Path>) -> AppResult<Self> {
        let mut config = match path {
            Some(path) => Self::from_file(path)?,
            None => Self::default(),
        };
        config.apply_env(|key| std::env::var(key).ok())?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_file(path: &Path) -> AppResult<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| AppError::Config(format!("Failed to read {}: {}", path.display(), e)))?;
        let config = Self::from_toml(&content)?;
        tracing::info!("Loaded configuration from {}", path.display());
        Ok(config)
    }

    pub fn from_toml(content: &str) -> AppResult<Self> {
        toml::from_str(content).map_err(|e| AppError::Config(format!("Invalid configuration: {}", e)))
    }

    /// Apply environment overrides read through `lookup`
    pub fn apply_env(&mut self, lookup: impl Fn(&str) -> Option<String>) -> AppResult<()> {
        if let Some(url) = lookup(ENV_API_URL).filter(|v| !v.is_empty()) {
            self.api.base_url = url;
        }
        if let Some(token) = lookup(ENV_API_TOKEN).filter(|v| !v.is_empty()) {
            self.api.bearer_token = Some(token);
        }
        if let Some(max) = lookup(ENV_MAX_QUESTIONS) {
            self.flow.max_questions = max.trim().parse().map_err(|_| {
                AppError::Config(format!("{} must be a positive integer, got {:?}", ENV_MAX_QUESTIONS, max))
            })?;
        }
        Ok(())
    }

    pub fn validate(&self) -> AppResult<()> {
        if self.api.base_url.trim().is_empty() {
            return Err(AppError::Config("api.base_url must not be empty".to_string()));
        }
        if self.flow.max_questions == 0 {
            return Err(AppError::Config("flow.max_questions must be at least 1".to_string()));
        }
        if self.analysis.max_attempts == 0 {
            return Err(AppError::Config("analysis.max_attempts must be at least 1".to_string()));
        }
        if self.analysis.poll_interval_ms == 0 {
            return Err(AppError::Config("analysis.poll_interval_ms must be positive".to_string()));
        }
        Ok(())
    }
}
