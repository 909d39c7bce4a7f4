//! Trim and cache engine for ClipNexus: probe a source, select `[start, end)`,
//! preview it in a loop and cache the selection as a standalone clip.

pub mod api;
pub mod asset;
pub mod backend;
pub mod config;
pub mod error;
pub mod frame_cache;
pub mod index;
pub mod playback;
pub mod plan;
pub mod session;
pub mod time;
pub mod writer;

#[cfg(test)]
pub(crate) mod testing;

pub use api::{AssetSummary, Command, Engine, EngineErrorEvent, EngineErrorKind, Event};
pub use asset::{Asset, AudioStreamInfo, VideoStreamInfo, probe_asset};
pub use backend::{
    FfmpegMediaBackend, MediaBackend, PreviewFrame, PreviewPixelFormat, ProbedAudioStream,
    ProbedMedia, ProbedVideoStream,
};
pub use config::{EngineConfig, ExtractionStrategy, ReencodeConfig};
pub use error::{EngineError, NotCommittableReason, Result};
pub use index::{CacheEntry, CacheIndex, ClipId};
pub use playback::{PlaybackPosition, PlaybackState, PreviewLoop};
pub use plan::ExtractionMode;
pub use session::{CommitSnapshot, Selection, SessionHandle, SessionState, TrimSession};
pub use self::time::{Rational, TIMELINE_TIME_BASE, rescale};
pub use writer::{CacheWriter, CommitOptions, CommitTicket};
