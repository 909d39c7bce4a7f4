use std::ffi::OsString;
use std::path::PathBuf;

use crate::error::{MediaFfmpegError, Result};
use crate::time::{Rational, micros_to_seconds_arg};
use crate::tools::{FfmpegTools, run_checked};

/// How the selected range is written to the output container.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExtractMode {
    /// Decode, trim by timestamp and re-encode. Frame accurate.
    Reencode,
    /// Remux packets without decoding. Starts on the packet nearest the seek point.
    StreamCopy,
}

/// Encoder settings used by [`ExtractMode::Reencode`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReencodeSettings {
    pub video_codec: String,
    pub video_preset: Option<String>,
    pub pixel_format: Option<String>,
    /// `None` lets FFmpeg pick the container's default audio encoder.
    pub audio_codec: Option<String>,
}

impl Default for ReencodeSettings {
    fn default() -> Self {
        Self {
            video_codec: "libx264".to_string(),
            video_preset: Some("ultrafast".to_string()),
            pixel_format: Some("yuv420p".to_string()),
            audio_codec: Some("aac".to_string()),
        }
    }
}

/// Source range of one stream, in that stream's time base.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StreamRange {
    pub start_pts: i64,
    pub end_pts: i64,
    pub time_base: Rational,
}

/// Request payload for a single-range extraction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExtractRequest {
    pub input: PathBuf,
    pub output: PathBuf,
    /// Range start relative to the beginning of the file, in microseconds.
    pub start_micros: i64,
    /// Exclusive range end relative to the beginning of the file, in microseconds.
    pub end_micros: i64,
    pub video: Option<StreamRange>,
    pub audio: Option<StreamRange>,
    pub mode: ExtractMode,
    pub reencode: ReencodeSettings,
    /// Written as the container `comment` tag.
    pub comment: Option<String>,
}

/// Writes `[start, end)` of the input into a new self-contained file.
///
/// The output file is overwritten if it exists. Source files are only read.
pub fn extract_range(tools: &FfmpegTools, request: &ExtractRequest) -> Result<()> {
    validate_request(request)?;
    let args = build_args(request);

    let mut command = tools.ffmpeg_command();
    command.args(args);
    run_checked(command, "run ffmpeg extract range", || {
        format!(
            "ffmpeg extract {} -> {}",
            request.input.display(),
            request.output.display()
        )
    })?;
    Ok(())
}

fn build_args(request: &ExtractRequest) -> Vec<OsString> {
    let mut args: Vec<OsString> = ["-hide_banner", "-v", "error", "-nostdin", "-y"]
        .into_iter()
        .map(OsString::from)
        .collect();

    match request.mode {
        ExtractMode::Reencode => push_reencode_args(&mut args, request),
        ExtractMode::StreamCopy => push_stream_copy_args(&mut args, request),
    }

    if let Some(comment) = &request.comment {
        args.push("-metadata".into());
        args.push(format!("comment={comment}").into());
    }
    args.push(request.output.clone().into_os_string());
    args
}

fn push_reencode_args(args: &mut Vec<OsString>, request: &ExtractRequest) {
    args.push("-copyts".into());
    args.push("-i".into());
    args.push(request.input.clone().into_os_string());
    args.push("-filter_complex".into());
    args.push(build_filter_complex(request).into());

    if request.video.is_some() {
        args.push("-map".into());
        args.push("[v0]".into());
        args.push("-c:v".into());
        args.push(request.reencode.video_codec.clone().into());
        if let Some(preset) = &request.reencode.video_preset {
            args.push("-preset".into());
            args.push(preset.into());
        }
        if let Some(pixel_format) = &request.reencode.pixel_format {
            args.push("-pix_fmt".into());
            args.push(pixel_format.into());
        }
    } else {
        args.push("-vn".into());
    }

    if request.audio.is_some() {
        args.push("-map".into());
        args.push("[a0]".into());
        if let Some(audio_codec) = &request.reencode.audio_codec {
            args.push("-c:a".into());
            args.push(audio_codec.into());
        }
    } else {
        args.push("-an".into());
    }
}

fn push_stream_copy_args(args: &mut Vec<OsString>, request: &ExtractRequest) {
    args.push("-ss".into());
    args.push(micros_to_seconds_arg(request.start_micros).into());
    args.push("-i".into());
    args.push(request.input.clone().into_os_string());
    args.push("-t".into());
    args.push(micros_to_seconds_arg(request.end_micros - request.start_micros).into());
    if request.video.is_some() {
        args.push("-map".into());
        args.push("0:v:0".into());
    }
    if request.audio.is_some() {
        args.push("-map".into());
        args.push("0:a:0".into());
    }
    for arg in ["-c", "copy", "-avoid_negative_ts", "make_zero"] {
        args.push(arg.into());
    }
}

fn build_filter_complex(request: &ExtractRequest) -> String {
    let mut chains = Vec::<String>::with_capacity(2);
    if let Some(video) = request.video {
        chains.push(format!(
            "[0:v:0]settb={}/{},trim=start_pts={}:end_pts={},setpts=PTS-STARTPTS[v0]",
            video.time_base.num, video.time_base.den, video.start_pts, video.end_pts
        ));
    }
    if let Some(audio) = request.audio {
        chains.push(format!(
            "[0:a:0]asettb={}/{},atrim=start_pts={}:end_pts={},asetpts=PTS-STARTPTS[a0]",
            audio.time_base.num, audio.time_base.den, audio.start_pts, audio.end_pts
        ));
    }
    chains.join(";")
}

fn validate_request(request: &ExtractRequest) -> Result<()> {
    if request.input == request.output {
        return Err(MediaFfmpegError::InvalidExtractRequest {
            reason: "output path must differ from input path",
        });
    }
    if request.start_micros < 0 {
        return Err(MediaFfmpegError::InvalidExtractRequest {
            reason: "range start is negative",
        });
    }
    if request.end_micros <= request.start_micros {
        return Err(MediaFfmpegError::InvalidExtractRequest {
            reason: "range is not positive",
        });
    }
    if request.video.is_none() && request.audio.is_none() {
        return Err(MediaFfmpegError::InvalidExtractRequest {
            reason: "no stream selected",
        });
    }
    for range in [request.video, request.audio].into_iter().flatten() {
        if range.end_pts <= range.start_pts {
            return Err(MediaFfmpegError::InvalidExtractRequest {
                reason: "stream range is not positive",
            });
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::{
        ExtractMode, ExtractRequest, ReencodeSettings, StreamRange, build_args,
        build_filter_complex, validate_request,
    };
    use crate::{MediaFfmpegError, Rational};
    use std::ffi::OsString;
    use std::path::PathBuf;

    fn request(mode: ExtractMode) -> ExtractRequest {
        ExtractRequest {
            input: PathBuf::from("in.mp4"),
            output: PathBuf::from("out.mp4"),
            start_micros: 2_000_000,
            end_micros: 5_000_000,
            video: Some(StreamRange {
                start_pts: 180_000,
                end_pts: 450_000,
                time_base: Rational::new(1, 90_000).expect("valid"),
            }),
            audio: Some(StreamRange {
                start_pts: 96_000,
                end_pts: 240_000,
                time_base: Rational::new(1, 48_000).expect("valid"),
            }),
            mode,
            reencode: ReencodeSettings::default(),
            comment: None,
        }
    }

    fn strings(args: Vec<OsString>) -> Vec<String> {
        args.into_iter()
            .map(|arg| arg.to_string_lossy().into_owned())
            .collect()
    }

    #[test]
    fn build_filter_complex_trims_video_and_audio_in_stream_time_base() {
        let filter = build_filter_complex(&request(ExtractMode::Reencode));
        assert_eq!(
            filter,
            "[0:v:0]settb=1/90000,trim=start_pts=180000:end_pts=450000,setpts=PTS-STARTPTS[v0];\
[0:a:0]asettb=1/48000,atrim=start_pts=96000:end_pts=240000,asetpts=PTS-STARTPTS[a0]"
        );
    }

    #[test]
    fn reencode_args_map_filter_outputs_and_encoders() {
        let args = strings(build_args(&request(ExtractMode::Reencode)));
        let joined = args.join(" ");
        assert!(joined.contains("-copyts -i in.mp4 -filter_complex"));
        assert!(joined.contains("-map [v0] -c:v libx264 -preset ultrafast -pix_fmt yuv420p"));
        assert!(joined.contains("-map [a0] -c:a aac"));
        assert_eq!(args.last().map(String::as_str), Some("out.mp4"));
    }

    #[test]
    fn reencode_args_for_audio_only_use_container_default_encoder() {
        let mut request = request(ExtractMode::Reencode);
        request.video = None;
        request.reencode.audio_codec = None;

        let args = strings(build_args(&request));
        assert!(args.contains(&"-vn".to_string()));
        assert!(!args.contains(&"-c:a".to_string()));
        assert!(!build_filter_complex(&request).contains("[v0]"));
    }

    #[test]
    fn stream_copy_args_seek_input_and_copy_codecs() {
        let mut request = request(ExtractMode::StreamCopy);
        request.comment = Some("{\"id\":\"abc\"}".to_string());

        let args = strings(build_args(&request));
        let joined = args.join(" ");
        assert!(joined.contains("-ss 2.000000 -i in.mp4 -t 3.000000"));
        assert!(joined.contains("-map 0:v:0 -map 0:a:0 -c copy -avoid_negative_ts make_zero"));
        assert!(joined.contains("-metadata comment={\"id\":\"abc\"}"));
        assert!(!joined.contains("-filter_complex"));
    }

    #[test]
    fn validate_request_rejects_in_place_extraction() {
        let mut request = request(ExtractMode::StreamCopy);
        request.output = request.input.clone();

        assert!(matches!(
            validate_request(&request),
            Err(MediaFfmpegError::InvalidExtractRequest {
                reason: "output path must differ from input path"
            })
        ));
    }

    #[test]
    fn validate_request_rejects_empty_range() {
        let mut request = request(ExtractMode::Reencode);
        request.end_micros = request.start_micros;

        assert!(matches!(
            validate_request(&request),
            Err(MediaFfmpegError::InvalidExtractRequest {
                reason: "range is not positive"
            })
        ));
    }
}
