mod ffmpeg_cmd;
mod ffmpeg_info;
mod options;
mod output;
mod progress;
mod timecode;

pub use ffmpeg_cmd::{
    EncodePlan, EncodeStrategy, FfmpegCommandBuilder, HYBRID_PREROLL_S, SubtitleKind,
    SubtitleStrategy, TrimStrategy, atempo_chain, build_encode_plan, escape_filter_path,
    seconds_arg, subtitle_strategy,
};
pub use ffmpeg_info::{
    Tools, check_ffmpeg_installation, ffmpeg_version, ffprobe_version, format_command,
};
pub use options::{
    AudioBitrate, Container, EncodeJob, EncodeOptions, Preset, Resolution, SPEED_PRESETS,
    SPEED_RANGE, TrimRange, VideoCodec, parse_speed,
};
pub use output::{derive_output_path, is_video_file, sanitize_filename, with_container_extension};
pub use progress::{ProgressState, parse_elapsed};
pub use timecode::{TimeParseError, format_time, parse_time_lenient, parse_time_strict};
