use anyhow::{Context, Result};
use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::process::Command;

/// Where to find the external encoder and prober.
///
/// When a bundled `bin_dir` is configured it is searched first and is also
/// prepended to `PATH` for every child process, so helpers that ffmpeg
/// itself spawns resolve from the same bundle.
#[derive(Debug, Clone, PartialEq)]
pub struct Tools {
    pub ffmpeg: PathBuf,
    pub ffprobe: PathBuf,
    pub bin_dir: Option<PathBuf>,
}

impl Default for Tools {
    fn default() -> Self {
        Self {
            ffmpeg: PathBuf::from("ffmpeg"),
            ffprobe: PathBuf::from("ffprobe"),
            bin_dir: None,
        }
    }
}

fn executable_name(name: &Path) -> PathBuf {
    if cfg!(windows) && name.extension().is_none() {
        name.with_extension("exe")
    } else {
        name.to_path_buf()
    }
}

impl Tools {
    pub fn new(ffmpeg: impl Into<PathBuf>, ffprobe: impl Into<PathBuf>) -> Self {
        Self {
            ffmpeg: ffmpeg.into(),
            ffprobe: ffprobe.into(),
            bin_dir: None,
        }
    }

    pub fn with_bin_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.bin_dir = Some(dir.into());
        self
    }

    /// Resolve a program, preferring the bundled directory
    fn resolve(&self, program: &Path) -> PathBuf {
        if program.components().count() == 1 {
            if let Some(dir) = &self.bin_dir {
                let bundled = dir.join(executable_name(program));
                if bundled.is_file() {
                    return bundled;
                }
            }
        }
        program.to_path_buf()
    }

    pub fn ffmpeg_program(&self) -> PathBuf {
        self.resolve(&self.ffmpeg)
    }

    pub fn ffprobe_program(&self) -> PathBuf {
        self.resolve(&self.ffprobe)
    }

    /// `PATH` value with `bin_dir` in front, if one is configured
    pub fn search_path(&self) -> Option<OsString> {
        let dir = self.bin_dir.as_ref()?;
        let mut paths = vec![dir.clone()];
        if let Some(existing) = std::env::var_os("PATH") {
            paths.extend(std::env::split_paths(&existing));
        }
        std::env::join_paths(paths).ok()
    }

    fn command_for(&self, program: PathBuf) -> Command {
        let mut cmd = Command::new(program);
        if let Some(path) = self.search_path() {
            cmd.env("PATH", path);
        }
        cmd
    }

    pub fn ffmpeg_command(&self) -> Command {
        self.command_for(self.ffmpeg_program())
    }

    pub fn ffprobe_command(&self) -> Command {
        self.command_for(self.ffprobe_program())
    }
}

fn first_version_line(mut cmd: Command, tool: &str) -> Result<String> {
    let output = cmd.arg("-version").output().with_context(|| {
        format!(
            "Failed to execute {}. Is {} installed and in PATH? Reinstall it or add its folder to PATH.",
            tool, tool
        )
    })?;

    if !output.status.success() {
        anyhow::bail!("{} command failed with status: {}", tool, output.status);
    }

    let version_output = String::from_utf8_lossy(&output.stdout);
    let first_line = version_output.lines().next().unwrap_or("Unknown version");

    Ok(first_line.to_string())
}

/// Check if ffmpeg is available and return its version
pub fn ffmpeg_version(tools: &Tools) -> Result<String> {
    first_version_line(tools.ffmpeg_command(), "ffmpeg")
}

/// Check if ffprobe is available and return its version
pub fn ffprobe_version(tools: &Tools) -> Result<String> {
    first_version_line(tools.ffprobe_command(), "ffprobe")
}

/// Quick yes/no check used before starting a job
pub fn check_ffmpeg_installation(tools: &Tools) -> bool {
    ffmpeg_version(tools).is_ok()
}

/// Render a command line for display, quoting arguments the way a shell would
pub fn format_command<I, S>(program: &Path, args: I) -> String
where
    I: IntoIterator<Item = S>,
    S: AsRef<std::ffi::OsStr>,
{
    let mut parts = vec![program.to_string_lossy().into_owned()];
    parts.extend(
        args.into_iter()
            .map(|a| a.as_ref().to_string_lossy().into_owned()),
    );
    parts
        .iter()
        .map(|p| {
            shlex::try_quote(p)
                .map(|q| q.into_owned())
                .unwrap_or_else(|_| p.clone())
        })
        .collect::<Vec<_>>()
        .join(" ")
}
