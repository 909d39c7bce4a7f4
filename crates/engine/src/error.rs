use std::fmt::{Display, Formatter};
use std::path::PathBuf;

use crate::index::ClipId;

/// Result type used by the engine crate.
pub type Result<T> = std::result::Result<T, EngineError>;

/// Why a session cannot be committed right now.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NotCommittableReason {
    NoAsset,
    SelectionIncomplete,
    AssetChanged,
}

impl Display for NotCommittableReason {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::NoAsset => write!(f, "no asset is loaded"),
            Self::SelectionIncomplete => write!(f, "start and end are not both set"),
            Self::AssetChanged => write!(f, "source file changed since it was probed"),
        }
    }
}

/// Errors produced by the trim and cache engine.
#[derive(Debug)]
pub enum EngineError {
    UnsupportedMedia {
        path: PathBuf,
        reason: String,
    },
    Io {
        context: &'static str,
        path: PathBuf,
        source: std::io::Error,
    },
    AssetUnavailable {
        path: Option<PathBuf>,
        source: Option<Box<EngineError>>,
    },
    NotCommittable {
        reason: NotCommittableReason,
    },
    ExtractionFailure {
        asset: PathBuf,
        start_tl: i64,
        end_tl: i64,
        reason: String,
    },
    WriteFailure {
        asset: PathBuf,
        start_tl: i64,
        end_tl: i64,
        destination: PathBuf,
        reason: String,
    },
    EntryNotFound {
        id: ClipId,
    },
    IndexIo {
        context: &'static str,
        path: PathBuf,
        source: std::io::Error,
    },
    IndexSerialization {
        path: PathBuf,
        source: serde_json::Error,
    },
    ConfigIo {
        path: PathBuf,
        source: std::io::Error,
    },
    ConfigSerialization {
        path: PathBuf,
        source: serde_json::Error,
    },
    InvalidTimestamp {
        value: String,
    },
    InvalidRational {
        num: i32,
        den: i32,
    },
    Media(media_ffmpeg::MediaFfmpegError),
}

impl EngineError {
    /// Source path and bounds of a failed commit, for retry prompts.
    pub fn commit_context(&self) -> Option<(&PathBuf, i64, i64)> {
        match self {
            Self::ExtractionFailure {
                asset,
                start_tl,
                end_tl,
                ..
            }
            | Self::WriteFailure {
                asset,
                start_tl,
                end_tl,
                ..
            } => Some((asset, *start_tl, *end_tl)),
            _ => None,
        }
    }
}

impl Display for EngineError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::UnsupportedMedia { path, reason } => {
                write!(f, "unsupported media {}: {reason}", path.display())
            }
            Self::Io {
                context,
                path,
                source,
            } => write!(f, "{context}: {} ({source})", path.display()),
            Self::AssetUnavailable { path, source } => {
                match path {
                    Some(path) => write!(f, "asset unavailable: {}", path.display())?,
                    None => write!(f, "no asset is loaded")?,
                }
                if let Some(source) = source {
                    write!(f, " ({source})")?;
                }
                Ok(())
            }
            Self::NotCommittable { reason } => write!(f, "selection is not committable: {reason}"),
            Self::ExtractionFailure {
                asset,
                start_tl,
                end_tl,
                reason,
            } => write!(
                f,
                "extraction of {} [{start_tl}..{end_tl}) failed: {reason}",
                asset.display()
            ),
            Self::WriteFailure {
                asset,
                start_tl,
                end_tl,
                destination,
                reason,
            } => write!(
                f,
                "writing clip of {} [{start_tl}..{end_tl}) to {} failed: {reason}",
                asset.display(),
                destination.display()
            ),
            Self::EntryNotFound { id } => write!(f, "cache entry not found: {id}"),
            Self::IndexIo {
                context,
                path,
                source,
            } => write!(f, "{context}: {} ({source})", path.display()),
            Self::IndexSerialization { path, source } => {
                write!(
                    f,
                    "cache index serialization/deserialization failed at {} ({source})",
                    path.display()
                )
            }
            Self::ConfigIo { path, source } => {
                write!(f, "config io failed at {} ({source})", path.display())
            }
            Self::ConfigSerialization { path, source } => {
                write!(f, "config is invalid at {} ({source})", path.display())
            }
            Self::InvalidTimestamp { value } => write!(f, "invalid timestamp: {value}"),
            Self::InvalidRational { num, den } => write!(f, "invalid rational {num}/{den}"),
            Self::Media(err) => write!(f, "media backend error: {err}"),
        }
    }
}

impl std::error::Error for EngineError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Io { source, .. } => Some(source),
            Self::AssetUnavailable {
                source: Some(source),
                ..
            } => Some(source.as_ref()),
            Self::IndexIo { source, .. } => Some(source),
            Self::IndexSerialization { source, .. } => Some(source),
            Self::ConfigIo { source, .. } => Some(source),
            Self::ConfigSerialization { source, .. } => Some(source),
            Self::Media(err) => Some(err),
            _ => None,
        }
    }
}

impl From<media_ffmpeg::MediaFfmpegError> for EngineError {
    fn from(value: media_ffmpeg::MediaFfmpegError) -> Self {
        Self::Media(value)
    }
}
