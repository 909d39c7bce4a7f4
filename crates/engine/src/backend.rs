use std::path::{Path, PathBuf};
use std::sync::Arc;

use media_ffmpeg::FfmpegTools;
use tracing::debug;

use crate::asset::Asset;
use crate::error::{EngineError, Result};
use crate::plan::{ExtractionMode, ExtractionPlan};
use crate::time::{Rational, TIMELINE_TIME_BASE, rescale};

/// Pixel format for preview frames passed to the UI.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PreviewPixelFormat {
    Rgba8,
}

/// Raw preview frame payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PreviewFrame {
    pub width: u32,
    pub height: u32,
    pub format: PreviewPixelFormat,
    pub bytes: Arc<[u8]>,
    /// Asset-relative timestamp the frame was requested for.
    pub at_tl: i64,
}

/// Result of probing one media file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProbedMedia {
    pub path: PathBuf,
    /// Container-declared duration in timeline ticks.
    pub declared_duration_tl: Option<i64>,
    pub format_name: Option<String>,
    pub comment: Option<String>,
    pub video: Option<ProbedVideoStream>,
    pub audio: Option<ProbedAudioStream>,
}

/// Probed video stream information.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProbedVideoStream {
    pub codec_name: Option<String>,
    pub time_base: Rational,
    pub src_in: i64,
    pub src_out: Option<i64>,
    pub frame_rate: Option<Rational>,
    pub width: u32,
    pub height: u32,
}

/// Probed audio stream information.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProbedAudioStream {
    pub codec_name: Option<String>,
    pub time_base: Rational,
    pub src_in: i64,
    pub src_out: Option<i64>,
    pub sample_rate: u32,
    pub channels: u16,
}

/// Media operations required by the engine.
///
/// Implementations must never open source files for writing.
pub trait MediaBackend: Send + Sync {
    /// Reads container and stream metadata without decoding the payload.
    fn probe(&self, path: &Path) -> Result<ProbedMedia>;

    /// Lists video keyframe timestamps in asset-relative ticks, ascending.
    fn keyframes(&self, asset: &Asset) -> Result<Vec<i64>>;

    /// Decodes the video frame shown at asset-relative `at_tl`.
    fn decode_preview_frame(&self, asset: &Asset, at_tl: i64) -> Result<PreviewFrame>;

    /// Writes the planned range into `plan.output` as a standalone file.
    fn extract(&self, plan: &ExtractionPlan) -> Result<()>;
}

/// FFmpeg CLI-backed backend used by production wiring.
#[derive(Debug, Default, Clone)]
pub struct FfmpegMediaBackend {
    tools: FfmpegTools,
}

impl FfmpegMediaBackend {
    pub fn new(tools: FfmpegTools) -> Self {
        Self { tools }
    }

    pub fn tools(&self) -> &FfmpegTools {
        &self.tools
    }
}

impl MediaBackend for FfmpegMediaBackend {
    fn probe(&self, path: &Path) -> Result<ProbedMedia> {
        let info = media_ffmpeg::probe_media(&self.tools, path)?;

        let video = info
            .first_video()
            .map(|stream| -> Result<ProbedVideoStream> {
                let dimensions = stream.width.zip(stream.height).ok_or_else(|| {
                    EngineError::UnsupportedMedia {
                        path: path.to_path_buf(),
                        reason: "video dimensions are missing".to_string(),
                    }
                })?;
                let src_in = stream.start_pts.unwrap_or(0);
                Ok(ProbedVideoStream {
                    codec_name: stream.codec_name.clone(),
                    time_base: stream.time_base.into(),
                    src_in,
                    src_out: stream.duration_ts.map(|duration| src_in + duration),
                    frame_rate: stream.r_frame_rate.map(Rational::from),
                    width: dimensions.0,
                    height: dimensions.1,
                })
            })
            .transpose()?;

        let audio = info
            .first_audio()
            .map(|stream| -> Result<ProbedAudioStream> {
                let missing = || EngineError::UnsupportedMedia {
                    path: path.to_path_buf(),
                    reason: "audio sample rate or channel count is missing".to_string(),
                };
                let src_in = stream.start_pts.unwrap_or(0);
                Ok(ProbedAudioStream {
                    codec_name: stream.codec_name.clone(),
                    time_base: stream.time_base.into(),
                    src_in,
                    src_out: stream.duration_ts.map(|duration| src_in + duration),
                    sample_rate: stream.sample_rate.ok_or_else(missing)?,
                    channels: stream.channels.ok_or_else(missing)?,
                })
            })
            .transpose()?;

        Ok(ProbedMedia {
            path: info.path,
            declared_duration_tl: info.duration_micros,
            format_name: info.format_name,
            comment: info.comment,
            video,
            audio,
        })
    }

    fn keyframes(&self, asset: &Asset) -> Result<Vec<i64>> {
        let Some(video) = asset.video.as_ref() else {
            return Ok(Vec::new());
        };
        let keyframes = media_ffmpeg::probe_keyframes(&self.tools, &asset.path)?;
        Ok(keyframes
            .into_iter()
            .map(|pts| rescale(pts - video.src_in, video.time_base, TIMELINE_TIME_BASE))
            .collect())
    }

    fn decode_preview_frame(&self, asset: &Asset, at_tl: i64) -> Result<PreviewFrame> {
        let video = asset
            .video
            .as_ref()
            .ok_or_else(|| EngineError::UnsupportedMedia {
                path: asset.path.clone(),
                reason: "asset has no video stream to preview".to_string(),
            })?;
        debug!(path = ?asset.path, at_tl, "decode preview frame");
        let decoded = media_ffmpeg::decode_video_frame_at(
            &self.tools,
            &asset.path,
            at_tl.max(0),
            video.width,
            video.height,
        )?;
        Ok(PreviewFrame {
            width: decoded.width,
            height: decoded.height,
            format: PreviewPixelFormat::Rgba8,
            bytes: decoded.rgba.into(),
            at_tl,
        })
    }

    fn extract(&self, plan: &ExtractionPlan) -> Result<()> {
        let request = media_ffmpeg::ExtractRequest {
            input: plan.input.clone(),
            output: plan.output.clone(),
            start_micros: plan.start_tl,
            end_micros: plan.end_tl,
            video: plan.video.map(|span| media_ffmpeg::StreamRange {
                start_pts: span.start_pts,
                end_pts: span.end_pts,
                time_base: span.time_base.into(),
            }),
            audio: plan.audio.map(|span| media_ffmpeg::StreamRange {
                start_pts: span.start_pts,
                end_pts: span.end_pts,
                time_base: span.time_base.into(),
            }),
            mode: match plan.mode {
                ExtractionMode::Reencode => media_ffmpeg::ExtractMode::Reencode,
                ExtractionMode::StreamCopy => media_ffmpeg::ExtractMode::StreamCopy,
            },
            reencode: media_ffmpeg::ReencodeSettings {
                video_codec: plan.reencode.video_codec.clone(),
                video_preset: plan.reencode.video_preset.clone(),
                pixel_format: plan.reencode.pixel_format.clone(),
                audio_codec: plan.reencode.audio_codec.clone(),
            },
            comment: plan.comment.clone(),
        };
        media_ffmpeg::extract_range(&self.tools, &request)?;
        Ok(())
    }
}
