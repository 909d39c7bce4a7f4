//! Media probe: turns a source path into an immutable [`Asset`].

use std::fs;
use std::path::{Path, PathBuf};
use std::time::SystemTime;

use tracing::{debug, warn};

use crate::backend::{MediaBackend, ProbedAudioStream, ProbedMedia, ProbedVideoStream};
use crate::error::{EngineError, Result};
use crate::time::{Rational, TIMELINE_TIME_BASE, frame_duration_tl, rescale};

/// Container extension used when the source file has none.
pub const FALLBACK_CONTAINER_EXTENSION: &str = "mkv";

/// A probed source media file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Asset {
    pub path: PathBuf,
    /// Decodable duration in timeline ticks; always positive.
    pub duration_tl: i64,
    /// Duration the container claims, which may exceed the decodable one.
    pub declared_duration_tl: Option<i64>,
    pub container: Option<String>,
    pub video: Option<VideoStreamInfo>,
    pub audio: Option<AudioStreamInfo>,
    /// Smallest addressable time step in timeline ticks; at least 1.
    pub granularity_tl: i64,
    fingerprint: FileFingerprint,
}

/// Video stream descriptor.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VideoStreamInfo {
    pub codec_name: Option<String>,
    pub time_base: Rational,
    pub src_in: i64,
    pub frame_rate: Option<Rational>,
    pub width: u32,
    pub height: u32,
}

/// Audio stream descriptor.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AudioStreamInfo {
    pub codec_name: Option<String>,
    pub time_base: Rational,
    pub src_in: i64,
    pub sample_rate: u32,
    pub channels: u16,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct FileFingerprint {
    len: u64,
    modified: Option<SystemTime>,
}

impl FileFingerprint {
    fn read(path: &Path) -> std::io::Result<Self> {
        let metadata = fs::metadata(path)?;
        Ok(Self {
            len: metadata.len(),
            modified: metadata.modified().ok(),
        })
    }
}

impl Asset {
    /// Largest valid timestamp: selections live in `[0, duration)`.
    pub fn max_tick(&self) -> i64 {
        self.duration_tl - 1
    }

    /// Returns true when the file changed or vanished since probing.
    pub fn is_stale(&self) -> bool {
        match FileFingerprint::read(&self.path) {
            Ok(current) => current != self.fingerprint,
            Err(_) => true,
        }
    }

    /// File extension used for clips cut from this asset.
    pub fn container_extension(&self) -> String {
        self.path
            .extension()
            .and_then(|extension| extension.to_str())
            .filter(|extension| !extension.is_empty())
            .map(str::to_ascii_lowercase)
            .unwrap_or_else(|| FALLBACK_CONTAINER_EXTENSION.to_string())
    }

    /// File stem used in clip names.
    pub fn stem(&self) -> String {
        self.path
            .file_stem()
            .map(|stem| stem.to_string_lossy().into_owned())
            .unwrap_or_else(|| "clip".to_string())
    }

    /// Asset-relative ticks to a timestamp in the video stream time base.
    pub fn video_pts(&self, t_tl: i64) -> Option<i64> {
        self.video
            .as_ref()
            .map(|video| video.src_in + rescale(t_tl, TIMELINE_TIME_BASE, video.time_base))
    }

    /// Asset-relative ticks to a timestamp in the audio stream time base.
    pub fn audio_pts(&self, t_tl: i64) -> Option<i64> {
        self.audio
            .as_ref()
            .map(|audio| audio.src_in + rescale(t_tl, TIMELINE_TIME_BASE, audio.time_base))
    }
}

/// Probes `path` into an [`Asset`].
///
/// Missing or unreadable files fail with [`EngineError::Io`]; anything the
/// backend cannot interpret, or a zero-length result, fails with
/// [`EngineError::UnsupportedMedia`].
pub fn probe_asset<M>(backend: &M, path: impl AsRef<Path>) -> Result<Asset>
where
    M: MediaBackend + ?Sized,
{
    let path = std::path::absolute(path.as_ref()).map_err(|source| EngineError::Io {
        context: "resolve asset path",
        path: path.as_ref().to_path_buf(),
        source,
    })?;
    let fingerprint = FileFingerprint::read(&path).map_err(|source| EngineError::Io {
        context: "read asset metadata",
        path: path.clone(),
        source,
    })?;
    fs::File::open(&path).map_err(|source| EngineError::Io {
        context: "open asset for reading",
        path: path.clone(),
        source,
    })?;

    let probed = backend.probe(&path).map_err(|error| match error {
        EngineError::UnsupportedMedia { .. } | EngineError::Io { .. } => error,
        other => EngineError::UnsupportedMedia {
            path: path.clone(),
            reason: other.to_string(),
        },
    })?;

    let asset = asset_from_probe(path, probed, fingerprint)?;
    debug!(
        path = ?asset.path,
        duration_tl = asset.duration_tl,
        declared_duration_tl = ?asset.declared_duration_tl,
        granularity_tl = asset.granularity_tl,
        has_video = asset.video.is_some(),
        has_audio = asset.audio.is_some(),
        "asset probed"
    );
    Ok(asset)
}

fn asset_from_probe(path: PathBuf, probed: ProbedMedia, fingerprint: FileFingerprint) -> Result<Asset> {
    if probed.video.is_none() && probed.audio.is_none() {
        return Err(EngineError::UnsupportedMedia {
            path,
            reason: "no audio or video stream".to_string(),
        });
    }

    let duration_tl = decodable_duration_tl(&probed).ok_or_else(|| EngineError::UnsupportedMedia {
        path: path.clone(),
        reason: "duration is unknown".to_string(),
    })?;
    if duration_tl <= 0 {
        return Err(EngineError::UnsupportedMedia {
            path,
            reason: "duration is zero".to_string(),
        });
    }
    if let Some(declared) = probed.declared_duration_tl
        && declared > duration_tl
    {
        warn!(
            path = ?path,
            declared,
            decodable = duration_tl,
            "container duration exceeds stream duration; clamping to decodable range"
        );
    }

    let granularity_tl = granularity_tl(probed.video.as_ref(), probed.audio.as_ref());
    Ok(Asset {
        path,
        duration_tl,
        declared_duration_tl: probed.declared_duration_tl,
        container: probed.format_name,
        video: probed.video.map(VideoStreamInfo::from),
        audio: probed.audio.map(AudioStreamInfo::from),
        granularity_tl,
        fingerprint,
    })
}

/// Shortest of the container duration and every stream duration.
fn decodable_duration_tl(probed: &ProbedMedia) -> Option<i64> {
    let video = probed.video.as_ref().and_then(|stream| {
        stream
            .src_out
            .map(|src_out| rescale(src_out - stream.src_in, stream.time_base, TIMELINE_TIME_BASE))
    });
    let audio = probed.audio.as_ref().and_then(|stream| {
        stream
            .src_out
            .map(|src_out| rescale(src_out - stream.src_in, stream.time_base, TIMELINE_TIME_BASE))
    });

    [probed.declared_duration_tl, video, audio]
        .into_iter()
        .flatten()
        .min()
}

fn granularity_tl(video: Option<&ProbedVideoStream>, audio: Option<&ProbedAudioStream>) -> i64 {
    if let Some(video) = video {
        return match video.frame_rate {
            Some(frame_rate) => frame_duration_tl(frame_rate),
            None => rescale(1, video.time_base, TIMELINE_TIME_BASE).max(1),
        };
    }
    audio
        .map(|audio| rescale(1, audio.time_base, TIMELINE_TIME_BASE).max(1))
        .unwrap_or(1)
}

impl From<ProbedVideoStream> for VideoStreamInfo {
    fn from(value: ProbedVideoStream) -> Self {
        Self {
            codec_name: value.codec_name,
            time_base: value.time_base,
            src_in: value.src_in,
            frame_rate: value.frame_rate,
            width: value.width,
            height: value.height,
        }
    }
}

impl From<ProbedAudioStream> for AudioStreamInfo {
    fn from(value: ProbedAudioStream) -> Self {
        Self {
            codec_name: value.codec_name,
            time_base: value.time_base,
            src_in: value.src_in,
            sample_rate: value.sample_rate,
            channels: value.channels,
        }
    }
}
