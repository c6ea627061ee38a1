use std::path::PathBuf;
use thiserror::Error;

/// Faults that end an encode (or prevent it from starting).
///
/// Each message carries the remediation hint shown to the user.
#[derive(Debug, Error)]
pub enum EncodeError {
    #[error("Already processing a video. Wait for it to finish or cancel it first.")]
    AlreadyRunning,

    #[error("FFmpeg not found at '{}'! Please install FFmpeg and make sure it is in your PATH.", .program.display())]
    ToolMissing { program: PathBuf },

    #[error("FFmpeg processing failed (exit code: {}).\n\nError details:\n{details}", exit_code_label(.exit_code))]
    ToolFailure {
        exit_code: Option<i32>,
        details: String,
    },

    #[error(
        "Subtitle burn-in failed: this FFmpeg build's libass lacks text wrapping support. \
         Choose an MKV container to keep subtitles as a separate track, or install a newer FFmpeg build."
    )]
    SubtitleLibraryIncompatible,

    #[error("FFmpeg process timed out after {seconds}s. The video may be too long or the settings too demanding.")]
    Timeout { seconds: u64 },

    #[error("Permission denied. Please check file permissions and make sure the output location is writable.")]
    Permission,

    #[error("I/O error while encoding: {0}")]
    Io(#[from] std::io::Error),
}

fn exit_code_label(code: &Option<i32>) -> String {
    match code {
        Some(code) => code.to_string(),
        None => "terminated by signal".to_string(),
    }
}

impl EncodeError {
    /// Map a spawn failure onto the taxonomy
    pub fn from_spawn(err: std::io::Error, program: PathBuf) -> Self {
        match err.kind() {
            std::io::ErrorKind::NotFound => EncodeError::ToolMissing { program },
            std::io::ErrorKind::PermissionDenied => EncodeError::Permission,
            _ => EncodeError::Io(err),
        }
    }
}
