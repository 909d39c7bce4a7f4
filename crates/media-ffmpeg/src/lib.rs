//! Wrappers over the `ffprobe`/`ffmpeg` command-line tools.

mod decode;
mod error;
mod extract;
mod probe;
mod time;
mod tools;

pub use decode::{DecodedVideoFrame, decode_video_frame_at};
pub use error::{MediaFfmpegError, Result};
pub use extract::{ExtractMode, ExtractRequest, ReencodeSettings, StreamRange, extract_range};
pub use probe::{MediaInfo, StreamInfo, StreamKind, probe_keyframes, probe_media};
pub use time::{Rational, micros_to_seconds_arg, rescale};
pub use tools::FfmpegTools;
