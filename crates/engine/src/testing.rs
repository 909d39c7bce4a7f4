use std::collections::{HashMap, HashSet};
use std::fs;
use std::path::{Path, PathBuf};
use std::process::ExitStatus;
use std::sync::Arc;

use crossbeam_channel::Receiver;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

use crate::asset::Asset;
use crate::backend::{
    MediaBackend, PreviewFrame, PreviewPixelFormat, ProbedAudioStream, ProbedMedia,
    ProbedVideoStream,
};
use crate::error::{EngineError, Result};
use crate::plan::ExtractionPlan;
use crate::time::{Rational, TIMELINE_TIME_BASE, rescale};

const SOURCE_BYTES: &[u8] = b"mock source media payload";
const CORRUPT_BYTES: &[u8] = b"corrupt";
const DEFAULT_DURATION_TL: i64 = 10_000_000;

/// Writes a stand-in source file that the mock probes as 10s of A/V.
pub(crate) fn write_source(dir: &Path, name: &str) -> PathBuf {
    let path = dir.join(name);
    fs::write(&path, SOURCE_BYTES).expect("write mock source");
    path
}

pub(crate) fn sample_probed_media(path: &Path, duration_tl: i64) -> ProbedMedia {
    let video_tb = Rational::new(1, 90_000).expect("valid rational");
    let audio_tb = Rational::new(1, 48_000).expect("valid rational");
    ProbedMedia {
        path: path.to_path_buf(),
        declared_duration_tl: Some(duration_tl),
        format_name: Some("mov,mp4,m4a,3gp,3g2,mj2".to_string()),
        comment: None,
        video: Some(ProbedVideoStream {
            codec_name: Some("h264".to_string()),
            time_base: video_tb,
            src_in: 0,
            src_out: Some(rescale(duration_tl, TIMELINE_TIME_BASE, video_tb)),
            frame_rate: Some(Rational::new(25, 1).expect("valid rational")),
            width: 160,
            height: 90,
        }),
        audio: Some(ProbedAudioStream {
            codec_name: Some("aac".to_string()),
            time_base: audio_tb,
            src_in: 0,
            src_out: Some(rescale(duration_tl, TIMELINE_TIME_BASE, audio_tb)),
            sample_rate: 48_000,
            channels: 2,
        }),
    }
}

pub(crate) fn audio_only_media(path: &Path, duration_tl: i64) -> ProbedMedia {
    let mut media = sample_probed_media(path, duration_tl);
    media.video = None;
    media.format_name = Some("wav".to_string());
    media
}

/// What the mock "encodes" into an output file.
#[derive(Debug, Serialize, Deserialize)]
struct MockClip {
    duration_tl: i64,
    has_video: bool,
    comment: Option<String>,
}

#[derive(Debug, Default)]
struct MockState {
    media: HashMap<PathBuf, ProbedMedia>,
    probe_failures: HashSet<PathBuf>,
    keyframes: Vec<i64>,
    extract_failure: Option<String>,
    corrupt_output: bool,
    decode_gate: Option<Receiver<()>>,
    extract_calls: Vec<ExtractionPlan>,
    decode_calls: Vec<i64>,
}

/// In-memory backend. Clones share state, so a test can keep one clone for
/// inspection while the engine owns another.
#[derive(Debug, Clone, Default)]
pub(crate) struct MockBackend {
    state: Arc<Mutex<MockState>>,
}

impl MockBackend {
    fn with_state(self, update: impl FnOnce(&mut MockState)) -> Self {
        {
            let mut state = self.state.lock();
            update(&mut *state);
        }
        self
    }

    pub(crate) fn with_media(self, path: &Path, media: ProbedMedia) -> Self {
        let path = path.to_path_buf();
        self.with_state(|state| {
            state.media.insert(path, media);
        })
    }

    pub(crate) fn with_probe_failure(self, path: &Path) -> Self {
        let path = path.to_path_buf();
        self.with_state(|state| {
            state.probe_failures.insert(path);
        })
    }

    pub(crate) fn with_keyframes(self, keyframes: Vec<i64>) -> Self {
        self.with_state(|state| state.keyframes = keyframes)
    }

    pub(crate) fn with_decode_gate(self, gate: Receiver<()>) -> Self {
        self.with_state(|state| state.decode_gate = Some(gate))
    }

    /// Makes every extraction fail like ffmpeg exiting with `stderr`.
    pub(crate) fn set_extract_failure(&self, stderr: Option<&str>) {
        self.state.lock().extract_failure =
            stderr.map(str::to_string);
    }

    /// Makes extractions succeed but write an undecodable file.
    pub(crate) fn set_corrupt_output(&self, corrupt: bool) {
        self.state.lock().corrupt_output = corrupt;
    }

    pub(crate) fn extract_calls(&self) -> Vec<ExtractionPlan> {
        self.state.lock().extract_calls.clone()
    }

    pub(crate) fn decode_calls(&self) -> Vec<i64> {
        self.state.lock().decode_calls.clone()
    }
}

impl MediaBackend for MockBackend {
    fn probe(&self, path: &Path) -> Result<ProbedMedia> {
        {
            let state = self.state.lock();
            if state.probe_failures.contains(path) {
                return Err(EngineError::UnsupportedMedia {
                    path: path.to_path_buf(),
                    reason: "mock probe failure".to_string(),
                });
            }
            if let Some(media) = state.media.get(path) {
                return Ok(media.clone());
            }
        }

        let bytes = fs::read(path).map_err(|source| EngineError::Io {
            context: "read mock media",
            path: path.to_path_buf(),
            source,
        })?;
        if bytes.starts_with(CORRUPT_BYTES) {
            return Err(EngineError::UnsupportedMedia {
                path: path.to_path_buf(),
                reason: "invalid data found when processing input".to_string(),
            });
        }
        match serde_json::from_slice::<MockClip>(&bytes) {
            Ok(clip) => {
                let mut media = if clip.has_video {
                    sample_probed_media(path, clip.duration_tl)
                } else {
                    audio_only_media(path, clip.duration_tl)
                };
                media.comment = clip.comment;
                Ok(media)
            }
            Err(_) => Ok(sample_probed_media(path, DEFAULT_DURATION_TL)),
        }
    }

    fn keyframes(&self, _asset: &Asset) -> Result<Vec<i64>> {
        Ok(self.state.lock().keyframes.clone())
    }

    fn decode_preview_frame(&self, _asset: &Asset, at_tl: i64) -> Result<PreviewFrame> {
        let gate = {
            let mut state = self.state.lock();
            state.decode_calls.push(at_tl);
            state.decode_gate.clone()
        };
        if let Some(gate) = gate {
            let _ = gate.recv();
        }
        Ok(PreviewFrame {
            width: 2,
            height: 2,
            format: PreviewPixelFormat::Rgba8,
            bytes: Arc::from(vec![0; 16]),
            at_tl,
        })
    }

    fn extract(&self, plan: &ExtractionPlan) -> Result<()> {
        let (failure, corrupt) = {
            let mut state = self.state.lock();
            state.extract_calls.push(plan.clone());
            (state.extract_failure.clone(), state.corrupt_output)
        };
        if let Some(stderr) = failure {
            return Err(EngineError::Media(media_ffmpeg::MediaFfmpegError::CommandFailed {
                command: format!("mock ffmpeg extract {}", plan.input.display()),
                status: ExitStatus::default(),
                stderr,
            }));
        }

        let bytes = if corrupt {
            CORRUPT_BYTES.to_vec()
        } else {
            serde_json::to_vec(&MockClip {
                duration_tl: plan.end_tl - plan.start_tl,
                has_video: plan.video.is_some(),
                comment: plan.comment.clone(),
            })
            .expect("serialize mock clip")
        };
        fs::write(&plan.output, bytes).map_err(|source| EngineError::Io {
            context: "write mock clip",
            path: plan.output.clone(),
            source,
        })
    }
}
