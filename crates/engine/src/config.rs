//! Engine configuration persisted as JSON.

use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use directories::ProjectDirs;
use media_ffmpeg::{FfmpegTools, MediaFfmpegError};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::error::{EngineError, Result};

const DEFAULT_PREVIEW_CACHE_FRAMES: usize = 96;
const CONFIG_FILE_NAME: &str = "config.json";

/// Policy for turning a selection into a clip file.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExtractionStrategy {
    /// Frame-accurate decode and re-encode.
    #[default]
    Reencode,
    /// Packet-accurate remux without decoding.
    StreamCopy,
    /// Stream copy when it is exact enough, re-encode otherwise.
    Auto,
}

/// Encoder settings for re-encoded clips.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReencodeConfig {
    pub video_codec: String,
    pub video_preset: Option<String>,
    pub pixel_format: Option<String>,
    pub audio_codec: Option<String>,
}

impl Default for ReencodeConfig {
    fn default() -> Self {
        Self {
            video_codec: "libx264".to_string(),
            video_preset: Some("ultrafast".to_string()),
            pixel_format: Some("yuv420p".to_string()),
            audio_codec: Some("aac".to_string()),
        }
    }
}

/// Engine settings. Missing fields fall back to their defaults.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Directory holding clip files and `index.json`.
    pub cache_dir: PathBuf,
    pub strategy: ExtractionStrategy,
    pub reencode: ReencodeConfig,
    /// Explicit `ffmpeg` binary; looked up on `PATH` when unset.
    pub ffmpeg: Option<PathBuf>,
    /// Explicit `ffprobe` binary; looked up on `PATH` when unset.
    pub ffprobe: Option<PathBuf>,
    pub preview_cache_frames: usize,
    /// Drop index entries with missing files when the cache is opened.
    pub prune_on_open: bool,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            cache_dir: default_cache_dir(),
            strategy: ExtractionStrategy::default(),
            reencode: ReencodeConfig::default(),
            ffmpeg: None,
            ffprobe: None,
            preview_cache_frames: DEFAULT_PREVIEW_CACHE_FRAMES,
            prune_on_open: true,
        }
    }
}

impl EngineConfig {
    /// Platform config file location, if a home directory is known.
    pub fn default_path() -> Option<PathBuf> {
        project_dirs().map(|dirs| dirs.config_dir().join(CONFIG_FILE_NAME))
    }

    /// Reads `path`; a missing file yields the defaults.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let text = match fs::read_to_string(path) {
            Ok(text) => text,
            Err(error) if error.kind() == ErrorKind::NotFound => {
                debug!(path = ?path, "config file not found; using defaults");
                return Ok(Self::default());
            }
            Err(source) => {
                return Err(EngineError::ConfigIo {
                    path: path.to_path_buf(),
                    source,
                });
            }
        };
        serde_json::from_str(&text).map_err(|source| EngineError::ConfigSerialization {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Writes the config as pretty JSON, creating parent directories.
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        if let Some(parent) = path.parent().filter(|parent| !parent.as_os_str().is_empty()) {
            fs::create_dir_all(parent).map_err(|source| EngineError::ConfigIo {
                path: parent.to_path_buf(),
                source,
            })?;
        }
        let text =
            serde_json::to_string_pretty(self).map_err(|source| EngineError::ConfigSerialization {
                path: path.to_path_buf(),
                source,
            })?;
        fs::write(path, text).map_err(|source| EngineError::ConfigIo {
            path: path.to_path_buf(),
            source,
        })?;
        info!(path = ?path, "config saved");
        Ok(())
    }

    /// Resolves FFmpeg tool paths: explicit entries win, `PATH` otherwise.
    pub fn ffmpeg_tools(&self) -> std::result::Result<FfmpegTools, MediaFfmpegError> {
        FfmpegTools::with_overrides(self.ffmpeg.clone(), self.ffprobe.clone())
    }
}

fn project_dirs() -> Option<ProjectDirs> {
    ProjectDirs::from("com", "clipnexus", "clipnexus")
}

fn default_cache_dir() -> PathBuf {
    project_dirs()
        .map(|dirs| dirs.cache_dir().join("clips"))
        .unwrap_or_else(|| std::env::temp_dir().join("clipnexus-clips"))
}
