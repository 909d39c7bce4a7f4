use std::path::{Path, PathBuf};
use std::process::{Command, Output};

use crate::error::{MediaFfmpegError, Result};

/// Locations of the `ffmpeg` and `ffprobe` executables.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FfmpegTools {
    pub ffmpeg: PathBuf,
    pub ffprobe: PathBuf,
}

impl FfmpegTools {
    /// Resolves both tools on `PATH`.
    ///
    /// # Example
    /// ```no_run
    /// use media_ffmpeg::FfmpegTools;
    ///
    /// let tools = FfmpegTools::locate().expect("ffmpeg must be installed");
    /// assert!(tools.ffprobe.is_absolute());
    /// ```
    pub fn locate() -> Result<Self> {
        Ok(Self {
            ffmpeg: locate_tool("ffmpeg")?,
            ffprobe: locate_tool("ffprobe")?,
        })
    }

    /// Uses explicit tool paths, falling back to `PATH` lookup for missing ones.
    pub fn with_overrides(ffmpeg: Option<PathBuf>, ffprobe: Option<PathBuf>) -> Result<Self> {
        let ffmpeg = match ffmpeg {
            Some(path) => path,
            None => locate_tool("ffmpeg")?,
        };
        let ffprobe = match ffprobe {
            Some(path) => path,
            None => locate_tool("ffprobe")?,
        };
        Ok(Self { ffmpeg, ffprobe })
    }

    pub(crate) fn ffprobe_command(&self) -> Command {
        Command::new(&self.ffprobe)
    }

    pub(crate) fn ffmpeg_command(&self) -> Command {
        Command::new(&self.ffmpeg)
    }
}

impl Default for FfmpegTools {
    /// Bare tool names resolved by the OS at spawn time.
    fn default() -> Self {
        Self {
            ffmpeg: PathBuf::from("ffmpeg"),
            ffprobe: PathBuf::from("ffprobe"),
        }
    }
}

fn locate_tool(tool: &'static str) -> Result<PathBuf> {
    which::which(tool).map_err(|source| MediaFfmpegError::ToolNotFound { tool, source })
}

/// Runs a prepared command and turns a non-zero exit into `CommandFailed`.
pub(crate) fn run_checked(
    mut command: Command,
    context: &'static str,
    display: impl FnOnce() -> String,
) -> Result<Output> {
    let output = command
        .output()
        .map_err(|source| MediaFfmpegError::Io { context, source })?;
    if !output.status.success() {
        return Err(MediaFfmpegError::CommandFailed {
            command: display(),
            status: output.status,
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
        });
    }
    Ok(output)
}

pub(crate) fn command_for_display(context: &str, tool: &Path, path: &Path) -> String {
    format!("{context}: {} {}", tool.display(), path.display())
}
