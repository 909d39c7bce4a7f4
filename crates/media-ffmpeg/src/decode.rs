use std::path::Path;

use crate::error::{MediaFfmpegError, Result};
use crate::time::micros_to_seconds_arg;
use crate::tools::{FfmpegTools, run_checked};

/// A decoded video frame in RGBA format.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecodedVideoFrame {
    pub width: u32,
    pub height: u32,
    pub rgba: Vec<u8>,
    pub at_micros: i64,
}

/// Decodes the first video frame at-or-after `at_micros`.
///
/// The input is opened with an accurate `-ss` seek, so FFmpeg decodes from
/// the preceding keyframe and discards frames before the target. `width` and
/// `height` are the probed stream dimensions and are used to validate the
/// raw output size.
///
/// # Example
/// ```no_run
/// use media_ffmpeg::{FfmpegTools, decode_video_frame_at};
///
/// let frame = decode_video_frame_at(&FfmpegTools::default(), "sample.mp4", 500_000, 160, 90)
///     .expect("decode should succeed");
/// assert_eq!(frame.rgba.len(), 160 * 90 * 4);
/// ```
pub fn decode_video_frame_at(
    tools: &FfmpegTools,
    path: impl AsRef<Path>,
    at_micros: i64,
    width: u32,
    height: u32,
) -> Result<DecodedVideoFrame> {
    if at_micros < 0 {
        return Err(MediaFfmpegError::InvalidTimestamp(at_micros));
    }
    let path = path.as_ref();

    let mut command = tools.ffmpeg_command();
    command
        .args(["-hide_banner", "-v", "error", "-nostdin", "-ss"])
        .arg(micros_to_seconds_arg(at_micros))
        .arg("-i")
        .arg(path)
        .args([
            "-map", "0:v:0", "-frames:v", "1", "-f", "rawvideo", "-pix_fmt", "rgba", "-",
        ]);
    let output = run_checked(command, "run ffmpeg decode frame", || {
        format!("ffmpeg decode frame {}", path.display())
    })?;

    let rgba = output.stdout;
    if rgba.is_empty() {
        return Err(MediaFfmpegError::MissingVideoStream(path.to_path_buf()));
    }
    let expected_size = width as usize * height as usize * 4;
    if rgba.len() != expected_size {
        return Err(MediaFfmpegError::Parse {
            context: "decoded rgba size",
            value: format!("expected {expected_size} bytes, got {}", rgba.len()),
        });
    }

    Ok(DecodedVideoFrame {
        width,
        height,
        rgba,
        at_micros,
    })
}
