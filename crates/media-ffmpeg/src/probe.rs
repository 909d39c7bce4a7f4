use std::collections::HashMap;
use std::path::{Path, PathBuf};

use crate::error::{MediaFfmpegError, Result};
use crate::time::{Rational, parse_seconds_to_micros};
use crate::tools::{FfmpegTools, command_for_display, run_checked};

/// Stream kind discovered by probe.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamKind {
    Video,
    Audio,
    Other,
}

/// Stream metadata read from `ffprobe`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StreamInfo {
    pub index: u32,
    pub kind: StreamKind,
    pub codec_name: Option<String>,
    pub time_base: Rational,
    pub width: Option<u32>,
    pub height: Option<u32>,
    pub r_frame_rate: Option<Rational>,
    pub sample_rate: Option<u32>,
    pub channels: Option<u16>,
    pub channel_layout: Option<String>,
    pub start_pts: Option<i64>,
    pub duration_ts: Option<i64>,
}

/// Media probe result.
#[derive(Debug, Clone, PartialEq)]
pub struct MediaInfo {
    pub path: PathBuf,
    pub streams: Vec<StreamInfo>,
    /// Container-declared duration in microseconds.
    pub duration_micros: Option<i64>,
    /// Demuxer name list, e.g. `mov,mp4,m4a,3gp,3g2,mj2`.
    pub format_name: Option<String>,
    /// Container-level `comment` tag.
    pub comment: Option<String>,
}

impl MediaInfo {
    /// Returns the first video stream.
    ///
    /// # Example
    /// ```no_run
    /// use media_ffmpeg::{FfmpegTools, probe_media};
    ///
    /// let info = probe_media(&FfmpegTools::default(), "sample.mp4").expect("probe should succeed");
    /// let _video = info.first_video().expect("video stream exists");
    /// ```
    pub fn first_video(&self) -> Option<&StreamInfo> {
        self.streams
            .iter()
            .find(|stream| stream.kind == StreamKind::Video)
    }

    /// Returns the first audio stream.
    pub fn first_audio(&self) -> Option<&StreamInfo> {
        self.streams
            .iter()
            .find(|stream| stream.kind == StreamKind::Audio)
    }
}

/// Probes a media file via `ffprobe`.
///
/// Only container headers and stream metadata are read.
///
/// # Example
/// ```no_run
/// use media_ffmpeg::{FfmpegTools, probe_media};
///
/// let info = probe_media(&FfmpegTools::default(), "sample.mp4").expect("probe should succeed");
/// assert!(!info.streams.is_empty());
/// ```
pub fn probe_media(tools: &FfmpegTools, path: impl AsRef<Path>) -> Result<MediaInfo> {
    let path = path.as_ref();

    let mut command = tools.ffprobe_command();
    command
        .args([
            "-v",
            "error",
            "-show_entries",
            "stream=index,codec_type,codec_name,time_base,width,height,r_frame_rate,sample_rate,channels,channel_layout,start_pts,duration_ts",
            "-of",
            "compact=p=0:nk=0",
        ])
        .arg(path);
    let output = run_checked(command, "run ffprobe stream probe", || {
        command_for_display("ffprobe stream probe", &tools.ffprobe, path)
    })?;

    let stdout = String::from_utf8(output.stdout)?;
    let mut streams = Vec::new();
    for line in stdout.lines().filter(|line| !line.trim().is_empty()) {
        streams.push(parse_stream_line(line)?);
    }

    if streams.is_empty() {
        return Err(MediaFfmpegError::Parse {
            context: "streams",
            value: "no streams found".to_string(),
        });
    }

    let format = probe_format(tools, path)?;
    Ok(MediaInfo {
        path: path.to_path_buf(),
        streams,
        duration_micros: format.duration_micros,
        format_name: format.format_name,
        comment: format.comment,
    })
}

/// Lists keyframe packet timestamps of the first video stream.
///
/// Timestamps are in the stream time base and sorted ascending. Packets are
/// inspected, frames are not decoded.
pub fn probe_keyframes(tools: &FfmpegTools, path: impl AsRef<Path>) -> Result<Vec<i64>> {
    let path = path.as_ref();

    let mut command = tools.ffprobe_command();
    command
        .args([
            "-v",
            "error",
            "-select_streams",
            "v:0",
            "-show_entries",
            "packet=pts,flags",
            "-of",
            "csv=p=0",
        ])
        .arg(path);
    let output = run_checked(command, "run ffprobe show_packets", || {
        command_for_display("ffprobe show_packets", &tools.ffprobe, path)
    })?;

    let stdout = String::from_utf8(output.stdout)?;
    parse_keyframe_lines(&stdout)
}

#[derive(Debug, Default)]
struct FormatInfo {
    duration_micros: Option<i64>,
    format_name: Option<String>,
    comment: Option<String>,
}

fn probe_format(tools: &FfmpegTools, path: &Path) -> Result<FormatInfo> {
    let mut command = tools.ffprobe_command();
    command
        .args([
            "-v",
            "error",
            "-show_entries",
            "format=duration,format_name:format_tags=comment",
            "-of",
            "default=noprint_wrappers=1",
        ])
        .arg(path);
    let output = run_checked(command, "run ffprobe format probe", || {
        command_for_display("ffprobe format probe", &tools.ffprobe, path)
    })?;

    let stdout = String::from_utf8(output.stdout)?;
    parse_format_lines(&stdout)
}

fn parse_format_lines(stdout: &str) -> Result<FormatInfo> {
    let mut info = FormatInfo::default();
    for line in stdout.lines() {
        let Some((key, value)) = line.split_once('=') else {
            continue;
        };
        let value = value.trim();
        if value.is_empty() || value == "N/A" {
            continue;
        }
        match key.trim() {
            "duration" => {
                info.duration_micros = Some(parse_seconds_to_micros(value, "format duration")?);
            }
            "format_name" => info.format_name = Some(value.to_string()),
            key if key.eq_ignore_ascii_case("TAG:comment") => {
                info.comment = Some(value.to_string());
            }
            _ => {}
        }
    }
    Ok(info)
}

fn parse_keyframe_lines(stdout: &str) -> Result<Vec<i64>> {
    let mut keyframes = Vec::new();
    for line in stdout.lines().filter(|line| !line.trim().is_empty()) {
        let mut fields = line.split(',');
        let (Some(raw_pts), Some(flags)) = (fields.next(), fields.next()) else {
            continue;
        };
        if raw_pts.is_empty() || raw_pts == "N/A" || !flags.starts_with('K') {
            continue;
        }
        let pts = raw_pts.parse::<i64>().map_err(|_| MediaFfmpegError::Parse {
            context: "packet pts",
            value: raw_pts.to_string(),
        })?;
        keyframes.push(pts);
    }
    keyframes.sort_unstable();
    keyframes.dedup();
    Ok(keyframes)
}

fn parse_stream_line(line: &str) -> Result<StreamInfo> {
    let mut map = HashMap::<&str, &str>::new();
    for field in line.split('|') {
        let (key, value) = field
            .split_once('=')
            .ok_or_else(|| MediaFfmpegError::Parse {
                context: "stream field",
                value: field.to_string(),
            })?;
        map.insert(key.trim(), unquote(value.trim()));
    }

    let codec_type = map
        .get("codec_type")
        .copied()
        .ok_or_else(|| MediaFfmpegError::Parse {
            context: "codec_type",
            value: line.to_string(),
        })?;
    let kind = match codec_type {
        "video" => StreamKind::Video,
        "audio" => StreamKind::Audio,
        _ => StreamKind::Other,
    };

    let index =
        parse_optional_u32(map.get("index").copied(), "stream index")?.ok_or_else(|| {
            MediaFfmpegError::Parse {
                context: "stream index",
                value: line.to_string(),
            }
        })?;
    let time_base = parse_optional_rational(map.get("time_base").copied(), "time_base")?
        .ok_or_else(|| MediaFfmpegError::Parse {
            context: "time_base",
            value: line.to_string(),
        })?;

    Ok(StreamInfo {
        index,
        kind,
        codec_name: map
            .get("codec_name")
            .filter(|value| !value.is_empty())
            .map(|value| value.to_string()),
        time_base,
        width: parse_optional_u32(map.get("width").copied(), "width")?,
        height: parse_optional_u32(map.get("height").copied(), "height")?,
        r_frame_rate: parse_optional_rational(map.get("r_frame_rate").copied(), "r_frame_rate")?,
        sample_rate: parse_optional_u32(map.get("sample_rate").copied(), "sample_rate")?,
        channels: parse_optional_u16(map.get("channels").copied(), "channels")?,
        channel_layout: map
            .get("channel_layout")
            .filter(|value| !value.is_empty() && **value != "N/A")
            .map(|value| value.to_string()),
        start_pts: parse_optional_i64(map.get("start_pts").copied(), "start_pts")?,
        duration_ts: parse_optional_i64(map.get("duration_ts").copied(), "duration_ts")?,
    })
}

fn parse_optional_u32(value: Option<&str>, context: &'static str) -> Result<Option<u32>> {
    parse_optional(value, context, str::parse::<u32>)
}

fn parse_optional_u16(value: Option<&str>, context: &'static str) -> Result<Option<u16>> {
    parse_optional(value, context, str::parse::<u16>)
}

fn parse_optional_i64(value: Option<&str>, context: &'static str) -> Result<Option<i64>> {
    parse_optional(value, context, str::parse::<i64>)
}

fn parse_optional_rational(value: Option<&str>, context: &'static str) -> Result<Option<Rational>> {
    let Some(raw) = value else {
        return Ok(None);
    };
    if raw.is_empty() || raw == "N/A" || raw == "0/0" {
        return Ok(None);
    }

    Rational::parse(raw)
        .map(Some)
        .map_err(|_| MediaFfmpegError::Parse {
            context,
            value: raw.to_string(),
        })
}

fn parse_optional<T, F>(value: Option<&str>, context: &'static str, parse: F) -> Result<Option<T>>
where
    F: Fn(&str) -> std::result::Result<T, std::num::ParseIntError>,
{
    let Some(raw) = value else {
        return Ok(None);
    };
    if raw.is_empty() || raw == "N/A" {
        return Ok(None);
    }

    parse(raw).map(Some).map_err(|_| MediaFfmpegError::Parse {
        context,
        value: raw.to_string(),
    })
}

fn unquote(value: &str) -> &str {
    value.trim_matches('"')
}

#[cfg(test)]
mod tests {
    use super::{StreamKind, parse_format_lines, parse_keyframe_lines, parse_stream_line};

    #[test]
    fn parse_stream_line_reads_audio_fields() {
        let stream = parse_stream_line(
            "index=1|codec_type=audio|codec_name=aac|time_base=1/48000|sample_rate=48000|channels=2|channel_layout=stereo|start_pts=0|duration_ts=480000",
        )
        .expect("valid line");

        assert_eq!(stream.kind, StreamKind::Audio);
        assert_eq!(stream.codec_name.as_deref(), Some("aac"));
        assert_eq!(stream.sample_rate, Some(48_000));
        assert_eq!(stream.channels, Some(2));
        assert_eq!(stream.duration_ts, Some(480_000));
        assert_eq!(stream.r_frame_rate, None);
    }

    #[test]
    fn parse_format_lines_reads_duration_name_and_comment() {
        let info = parse_format_lines(
            "duration=10.010000\nformat_name=mov,mp4,m4a,3gp,3g2,mj2\nTAG:comment={\"id\":\"x\",\"a=b\":1}\n",
        )
        .expect("valid output");

        assert_eq!(info.duration_micros, Some(10_010_000));
        assert_eq!(info.format_name.as_deref(), Some("mov,mp4,m4a,3gp,3g2,mj2"));
        assert_eq!(info.comment.as_deref(), Some("{\"id\":\"x\",\"a=b\":1}"));
    }

    #[test]
    fn parse_format_lines_treats_na_duration_as_missing() {
        let info = parse_format_lines("duration=N/A\nformat_name=wav\n").expect("valid output");
        assert_eq!(info.duration_micros, None);
    }

    #[test]
    fn parse_keyframe_lines_keeps_only_flagged_packets_sorted() {
        let keyframes =
            parse_keyframe_lines("1024,__\n0,K__\n,K_\n15360,K_\n512,__\n").expect("valid output");
        assert_eq!(keyframes, vec![0, 15_360]);
    }
}
