use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::asset::Asset;
use crate::backend::MediaBackend;
use crate::config::{ExtractionStrategy, ReencodeConfig};
use crate::session::CommitSnapshot;
use crate::time::Rational;

/// How a clip file was produced.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExtractionMode {
    Reencode,
    StreamCopy,
}

/// Selected range of one source stream, in that stream's time base.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StreamSpan {
    pub start_pts: i64,
    pub end_pts: i64,
    pub time_base: Rational,
}

/// Everything the backend needs to write one clip.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExtractionPlan {
    pub input: PathBuf,
    pub output: PathBuf,
    /// Asset-relative range start in timeline ticks.
    pub start_tl: i64,
    /// Asset-relative exclusive range end in timeline ticks.
    pub end_tl: i64,
    pub video: Option<StreamSpan>,
    pub audio: Option<StreamSpan>,
    pub mode: ExtractionMode,
    pub reencode: ReencodeConfig,
    /// Stored in the output container's `comment` tag.
    pub comment: Option<String>,
}

/// Builds the plan for writing `snapshot` into `output`.
///
/// Stream spans are never empty: a selection shorter than one stream tick
/// still covers that tick.
pub fn build_extraction_plan(
    snapshot: &CommitSnapshot,
    output: PathBuf,
    mode: ExtractionMode,
    reencode: &ReencodeConfig,
    comment: Option<String>,
) -> ExtractionPlan {
    let asset = &snapshot.asset;
    let selection = snapshot.selection;

    let video = asset.video.as_ref().map(|video| {
        stream_span(
            asset.video_pts(selection.start_tl).unwrap_or(video.src_in),
            asset.video_pts(selection.end_tl).unwrap_or(video.src_in),
            video.time_base,
        )
    });
    let audio = asset.audio.as_ref().map(|audio| {
        stream_span(
            asset.audio_pts(selection.start_tl).unwrap_or(audio.src_in),
            asset.audio_pts(selection.end_tl).unwrap_or(audio.src_in),
            audio.time_base,
        )
    });

    let mut reencode = reencode.clone();
    if video.is_none() {
        // Audio-only clips keep the container's default audio encoder.
        reencode.audio_codec = None;
    }

    ExtractionPlan {
        input: asset.path.clone(),
        output,
        start_tl: selection.start_tl,
        end_tl: selection.end_tl,
        video,
        audio,
        mode,
        reencode,
        comment,
    }
}

fn stream_span(start_pts: i64, end_pts: i64, time_base: Rational) -> StreamSpan {
    StreamSpan {
        start_pts,
        end_pts: end_pts.max(start_pts + 1),
        time_base,
    }
}

/// Resolves a strategy into the mode used for one commit.
pub fn choose_extraction_mode<M>(
    strategy: ExtractionStrategy,
    snapshot: &CommitSnapshot,
    backend: &M,
) -> ExtractionMode
where
    M: MediaBackend + ?Sized,
{
    match strategy {
        ExtractionStrategy::Reencode => ExtractionMode::Reencode,
        ExtractionStrategy::StreamCopy => ExtractionMode::StreamCopy,
        ExtractionStrategy::Auto => {
            auto_mode(&snapshot.asset, snapshot.selection.start_tl, backend)
        }
    }
}

fn auto_mode<M>(asset: &Asset, start_tl: i64, backend: &M) -> ExtractionMode
where
    M: MediaBackend + ?Sized,
{
    if asset.video.is_none() {
        return ExtractionMode::StreamCopy;
    }
    let keyframes = match backend.keyframes(asset) {
        Ok(keyframes) => keyframes,
        Err(error) => {
            warn!(path = ?asset.path, %error, "keyframe listing failed; re-encoding");
            return ExtractionMode::Reencode;
        }
    };
    let on_keyframe = keyframes
        .iter()
        .any(|keyframe| (start_tl - keyframe).abs() < asset.granularity_tl);
    debug!(
        path = ?asset.path,
        start_tl,
        keyframe_count = keyframes.len(),
        on_keyframe,
        "auto extraction mode resolved"
    );
    if on_keyframe {
        ExtractionMode::StreamCopy
    } else {
        ExtractionMode::Reencode
    }
}
