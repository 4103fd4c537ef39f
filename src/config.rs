//! Configuration file handling for storyreel.
//!
//! Loads configuration from `{config_dir}/storyreel/config.toml` or a custom path.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::export::{AudioJoin, ExportOptions, DEFAULT_EXPORT_FPS};
use crate::gemini::retry::{DEFAULT_INITIAL_DELAY, DEFAULT_MAX_RETRIES};
use crate::gemini::{RetryPolicy, GEMINI_API_BASE_URL};
use crate::store::DiskStore;
use crate::story::media::{DEFAULT_SPEECH_MODEL, DEFAULT_VIDEO_MODEL, DEFAULT_VOICE};
use crate::story::{NarrationSettings, StudioSettings, VideoSettings, DEFAULT_TEXT_MODEL};

/// Configuration file structure for storyreel.
/// Loaded from {config_dir}/storyreel/config.toml (or custom path via --config).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct Config {
    pub gemini: GeminiConfig,
    pub retry: RetryConfig,
    pub video: VideoConfig,
    pub narration: NarrationConfig,
    pub storage: StorageConfig,
    pub export: ExportConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GeminiConfig {
    pub base_url: String,
    pub text_model: String,
    pub video_model: String,
    pub speech_model: String,
}

impl Default for GeminiConfig {
    fn default() -> Self {
        Self {
            base_url: GEMINI_API_BASE_URL.to_string(),
            text_model: DEFAULT_TEXT_MODEL.to_string(),
            video_model: DEFAULT_VIDEO_MODEL.to_string(),
            speech_model: DEFAULT_SPEECH_MODEL.to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryConfig {
    pub max_retries: u32,
    pub initial_delay_ms: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: DEFAULT_MAX_RETRIES,
            initial_delay_ms: DEFAULT_INITIAL_DELAY.as_millis() as u64,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct VideoConfig {
    pub resolution: String,
    pub aspect_ratio: String,
    pub poll_interval_ms: u64,
    pub timeout_ms: u64,
}

impl Default for VideoConfig {
    fn default() -> Self {
        let defaults = VideoSettings::default();
        Self {
            resolution: defaults.resolution,
            aspect_ratio: defaults.aspect_ratio,
            poll_interval_ms: defaults.poll_interval.as_millis() as u64,
            timeout_ms: defaults.timeout.as_millis() as u64,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct NarrationConfig {
    pub voice: String,
}

impl Default for NarrationConfig {
    fn default() -> Self {
        Self {
            voice: DEFAULT_VOICE.to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct StorageConfig {
    /// Store directory; defaults to `{data_dir}/storyreel/creations`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub dir: Option<PathBuf>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExportConfig {
    pub fps: u32,
    pub audio_join: AudioJoin,
    /// Where downloads land; defaults to the current directory.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub output_dir: Option<PathBuf>,
}

impl Default for ExportConfig {
    fn default() -> Self {
        Self {
            fps: DEFAULT_EXPORT_FPS,
            audio_join: AudioJoin::default(),
            output_dir: None,
        }
    }
}

impl Config {
    /// Load configuration from a file path.
    /// Returns default config if the file doesn't exist.
    /// Returns an error if the file exists but cannot be parsed.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let path = path.map(PathBuf::from).unwrap_or_else(default_path);

        if path.exists() {
            let content = std::fs::read_to_string(&path).map_err(|e| ConfigError::Io {
                path: path.clone(),
                source: e,
            })?;
            let config: Config = toml::from_str(&content).map_err(|e| ConfigError::Parse {
                path: path.clone(),
                source: e,
            })?;
            log::debug!("Loaded config from {}", path.display());
            Ok(config)
        } else {
            Ok(Config::default())
        }
    }

    /// Render as TOML.
    pub fn to_toml(&self) -> Result<String, ConfigError> {
        Ok(toml::to_string_pretty(self)?)
    }

    /// Write the default configuration to `path`, refusing to overwrite.
    pub fn write_default(path: &Path) -> Result<(), ConfigError> {
        if path.exists() {
            return Err(ConfigError::AlreadyExists(path.to_path_buf()));
        }
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| ConfigError::Io {
                path: parent.to_path_buf(),
                source: e,
            })?;
        }
        std::fs::write(path, Config::default().to_toml()?).map_err(|e| ConfigError::Io {
            path: path.to_path_buf(),
            source: e,
        })
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_retries: self.retry.max_retries,
            initial_delay: Duration::from_millis(self.retry.initial_delay_ms),
        }
    }

    pub fn studio_settings(&self) -> StudioSettings {
        StudioSettings {
            text_model: self.gemini.text_model.clone(),
            retry: self.retry_policy(),
            video: VideoSettings {
                model: self.gemini.video_model.clone(),
                resolution: self.video.resolution.clone(),
                aspect_ratio: self.video.aspect_ratio.clone(),
                poll_interval: Duration::from_millis(self.video.poll_interval_ms),
                timeout: Duration::from_millis(self.video.timeout_ms),
            },
            narration: NarrationSettings {
                model: self.gemini.speech_model.clone(),
                voice: self.narration.voice.clone(),
            },
        }
    }

    pub fn export_options(&self) -> ExportOptions {
        ExportOptions {
            fps: self.export.fps.max(1),
            join: self.export.audio_join,
        }
    }

    pub fn storage_dir(&self) -> PathBuf {
        self.storage.dir.clone().unwrap_or_else(DiskStore::default_dir)
    }

    pub fn output_dir(&self) -> PathBuf {
        self.export
            .output_dir
            .clone()
            .unwrap_or_else(|| PathBuf::from("."))
    }
}

/// Errors that can occur when loading or writing configuration.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file '{}': {}", .path.display(), .source)]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Failed to parse config file '{}': {}", .path.display(), .source)]
    Parse {
        path: PathBuf,
        source: toml::de::Error,
    },

    #[error("Failed to serialize config: {0}")]
    Serialize(#[from] toml::ser::Error),

    #[error("Config file '{}' already exists", .0.display())]
    AlreadyExists(PathBuf),
}

/// Get the default config file path.
pub fn default_path() -> PathBuf {
    dirs::config_dir()
        .map(|d| d.join("storyreel").join("config.toml"))
        .unwrap_or_else(|| {
            let home = std::env::var("HOME").unwrap_or_else(|_| ".".to_string());
            PathBuf::from(home).join(".config/storyreel/config.toml")
        })
}
