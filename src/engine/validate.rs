//! Fail-fast checks run before any ffmpeg command is built.

use crate::engine::core::{AudioBitrate, EncodeJob, EncodeOptions, Resolution, SPEED_RANGE, TrimRange};
use crate::engine::probe::MediaInfo;
use serde::Serialize;
use thiserror::Error;

/// A user input that cannot be encoded as given.
#[derive(Debug, Clone, PartialEq, Serialize, Error)]
#[error("{message}")]
pub struct ValidationError {
    pub field: String,
    pub message: String,
}

impl ValidationError {
    pub fn new(field: &str, message: impl Into<String>) -> Self {
        Self {
            field: field.to_string(),
            message: message.into(),
        }
    }
}

/// Validate encode options against codec and container rules.
pub fn validate_options(options: &EncodeOptions) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    let (crf_min, crf_max) = options.video_codec.crf_range();
    if !(crf_min..=crf_max).contains(&options.crf) {
        errors.push(ValidationError::new(
            "crf",
            format!(
                "CRF must be within {}-{} for {}, got {}",
                crf_min,
                crf_max,
                options.video_codec.label(),
                options.crf
            ),
        ));
    }

    if let Some(fps) = options.fps {
        if !(1..=240).contains(&fps) {
            errors.push(ValidationError::new(
                "fps",
                format!("FPS must be a positive integer (1-240), got {}", fps),
            ));
        }
    }

    if let AudioBitrate::Kbps(kbps) = options.audio_bitrate {
        if !(AudioBitrate::MIN_KBPS..=AudioBitrate::MAX_KBPS).contains(&kbps) {
            errors.push(ValidationError::new(
                "audio_bitrate",
                format!(
                    "Audio bitrate must be between {}k and {}k, got {}k",
                    AudioBitrate::MIN_KBPS,
                    AudioBitrate::MAX_KBPS,
                    kbps
                ),
            ));
        }
    }

    if let Some(res) = options.resolution {
        let (w_min, w_max) = Resolution::WIDTH_RANGE;
        let (h_min, h_max) = Resolution::HEIGHT_RANGE;
        if !(w_min..=w_max).contains(&res.width) || !(h_min..=h_max).contains(&res.height) {
            errors.push(ValidationError::new(
                "resolution",
                format!(
                    "Resolution width must be {}-{} and height {}-{}, got {}",
                    w_min, w_max, h_min, h_max, res
                ),
            ));
        }
    }

    let (speed_min, speed_max) = SPEED_RANGE;
    if !options.speed.is_finite() || options.speed < speed_min || options.speed > speed_max {
        errors.push(ValidationError::new(
            "speed",
            format!(
                "Speed must be between {}x and {}x, got {}",
                speed_min, speed_max, options.speed
            ),
        ));
    }

    if !options.container.supports_codec(options.video_codec) {
        errors.push(ValidationError::new(
            "container",
            format!(
                "{} cannot hold {} video; choose a different container or codec",
                options.container.extension().to_uppercase(),
                options.video_codec.label()
            ),
        ));
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

/// Validate a trim range. An unknown duration (`None` or non-positive)
/// skips the upper-bound check.
pub fn validate_trim(trim: &TrimRange, source_duration: Option<f64>) -> Result<(), ValidationError> {
    if !trim.start_s.is_finite() || !trim.end_s.is_finite() || trim.start_s < 0.0 {
        return Err(ValidationError::new(
            "trim",
            "Start and end times must be non-negative",
        ));
    }
    if trim.start_s >= trim.end_s {
        return Err(ValidationError::new(
            "trim",
            "Start time must be before end time!",
        ));
    }
    if let Some(duration) = source_duration.filter(|d| *d > 0.0) {
        if trim.end_s > duration {
            return Err(ValidationError::new(
                "trim",
                format!(
                    "End time cannot exceed video duration ({:.2}s > {:.2}s)",
                    trim.end_s, duration
                ),
            ));
        }
    }
    Ok(())
}

/// Validate a whole job against the probed source.
pub fn validate_job(job: &EncodeJob, media: &MediaInfo) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    if let Some(options) = &job.options {
        if let Err(mut option_errors) = validate_options(options) {
            errors.append(&mut option_errors);
        }

        if let Some(index) = options.subtitle_track {
            if media.subtitle_stream(index).is_none() {
                errors.push(ValidationError::new(
                    "subtitle_track",
                    format!("Subtitle stream #{} not found in input", index),
                ));
            }
        }
        if let Some(index) = options.audio_track {
            if media.audio_stream(index).is_none() {
                errors.push(ValidationError::new(
                    "audio_track",
                    format!("Audio stream #{} not found in input", index),
                ));
            }
        }
    }

    if let Some(trim) = &job.trim {
        if let Err(e) = validate_trim(trim, media.duration_s) {
            errors.push(e);
        }
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}
