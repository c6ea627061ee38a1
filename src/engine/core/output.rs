use std::path::{Path, PathBuf};

use super::options::{Container, TrimRange};
use super::timecode::format_time;

const VIDEO_EXTENSIONS: &[&str] = &["mp4", "webm", "mkv", "avi", "mov", "wmv", "flv"];

/// Check if a file is a supported input video
pub fn is_video_file(path: &Path) -> bool {
    if let Some(ext) = path.extension() {
        if let Some(ext_str) = ext.to_str() {
            return VIDEO_EXTENSIONS.contains(&ext_str.to_lowercase().as_str());
        }
    }
    false
}

/// Replace characters that are invalid in file names on common platforms
pub fn sanitize_filename(name: &str) -> String {
    name.chars()
        .map(|c| match c {
            '<' | '>' | ':' | '"' | '/' | '\\' | '|' | '?' | '*' => '_',
            c => c,
        })
        .collect()
}

/// Default output path for a clip of `input_path`.
///
/// Trimmed clips are named `<stem>-<M-SS>-<M-SS>-clip.<ext>`, untrimmed
/// ones `<stem>-clip.<ext>`. The file lands next to the input unless an
/// output directory is given.
pub fn derive_output_path(
    input_path: &Path,
    container: Container,
    trim: Option<&TrimRange>,
    output_dir: Option<&Path>,
) -> PathBuf {
    let dir = match output_dir {
        Some(dir) => dir,
        None => input_path.parent().unwrap_or_else(|| Path::new(".")),
    };

    let stem = input_path
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "output".to_string());

    let name = match trim {
        Some(trim) => format!(
            "{}-{}-{}-clip",
            stem,
            format_time(trim.start_s).replace(':', "-"),
            format_time(trim.end_s).replace(':', "-")
        ),
        None => format!("{}-clip", stem),
    };

    dir.join(format!("{}.{}", sanitize_filename(&name), container.extension()))
}

/// Force the extension of a user-chosen output path to match the container
pub fn with_container_extension(path: &Path, container: Container) -> PathBuf {
    let matches = path
        .extension()
        .and_then(|e| e.to_str())
        .is_some_and(|e| e.eq_ignore_ascii_case(container.extension()));
    if matches {
        return path.to_path_buf();
    }

    match Container::from_path(path) {
        // Swap a known container extension rather than stacking another one
        Some(_) => path.with_extension(container.extension()),
        None => {
            let mut name = path.as_os_str().to_os_string();
            name.push(".");
            name.push(container.extension());
            PathBuf::from(name)
        }
    }
}
