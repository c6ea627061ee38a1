// End-to-end tests that run the real ffmpeg/ffprobe.
// Skipped when either tool is not installed.

use ffclip::engine::{
    Container, EncodeJob, EncodeOptions, EncodeOutcome, EncodeSession, MediaProber,
    SessionSettings, SubtitleStrategy, Tools, TrimRange, TrimStrategy, VideoCodec,
    build_encode_plan, derive_output_path,
};
use std::path::PathBuf;
use tempfile::TempDir;

use crate::common::ffmpeg_runner::*;
use crate::common::helpers::*;

macro_rules! require_ffmpeg {
    () => {
        if !is_ffmpeg_available() {
            eprintln!("Skipping test: FFmpeg not available");
            return;
        }
    };
}

fn create_test_video(temp_dir: &TempDir) -> PathBuf {
    let video_path = temp_dir.path().join("input.mkv");
    generate_test_video(&video_path, 4.0).expect("Failed to generate test video");
    video_path
}

fn run_to_completion(job: EncodeJob, media: &ffclip::engine::MediaInfo) -> EncodeOutcome {
    let plan = build_encode_plan(&job, media).expect("plan should validate");
    let mut session = EncodeSession::new(SessionSettings::default());
    session.start(job, plan).expect("ffmpeg should spawn");
    let events = collect_events(&session);
    session.join();

    assert_eq!(progress_values(&events).last(), Some(&100));
    match events.into_iter().last() {
        Some(ffclip::engine::SessionEvent::Finished { outcome, .. }) => outcome,
        _ => unreachable!(),
    }
}

#[test]
fn e2e_probe_generated_clip() {
    require_ffmpeg!();

    let temp_dir = TempDir::new().unwrap();
    let input = create_test_video(&temp_dir);
    let media = MediaProber::new(Tools::default()).probe(&input);

    let duration = media.duration_s.expect("duration should be known");
    assert!((duration - 4.0).abs() < 0.2, "duration {}", duration);
    let video = media.video.expect("video stream");
    assert_eq!((video.width, video.height), (320, 240));
    assert_eq!(media.audio_streams.len(), 1);
    assert_eq!(media.subtitle_streams.len(), 1);
    assert_eq!(media.subtitle_streams[0].codec_name, "subrip");
}

#[test]
fn e2e_trim_default_options() {
    require_ffmpeg!();

    let temp_dir = TempDir::new().unwrap();
    let input = create_test_video(&temp_dir);
    let media = MediaProber::new(Tools::default()).probe(&input);

    let trim = TrimRange::new(1.0, 3.0);
    let output = derive_output_path(&input, Container::Mp4, Some(&trim), None);
    let job = EncodeJob::new(input, output.clone()).with_trim(trim);

    match run_to_completion(job, &media) {
        EncodeOutcome::Completed { output: done } => assert_eq!(done, output),
        other => panic!("encode failed: {:?}", other),
    }

    let clip = MediaProber::new(Tools::default()).probe(&output);
    let duration = clip.duration_s.expect("clip duration");
    assert!((duration - 2.0).abs() < 0.3, "clip duration {}", duration);
}

#[test]
fn e2e_soft_subtitles_in_mkv_with_speed() {
    require_ffmpeg!();

    let temp_dir = TempDir::new().unwrap();
    let input = create_test_video(&temp_dir);
    let media = MediaProber::new(Tools::default()).probe(&input);
    let subtitle_index = media.subtitle_streams[0].index;

    let options = EncodeOptions {
        container: Container::Mkv,
        video_codec: VideoCodec::H264,
        subtitle_track: Some(subtitle_index),
        speed: 2.0,
        ..EncodeOptions::default()
    };
    let output = temp_dir.path().join("fast.mkv");
    let job = EncodeJob::new(input, output.clone())
        .with_options(options)
        .with_trim(TrimRange::new(0.0, 3.5));

    let plan = build_encode_plan(&job, &media).unwrap();
    assert_eq!(plan.trim_strategy, Some(TrimStrategy::Hybrid));
    assert_eq!(plan.subtitle_strategy, Some(SubtitleStrategy::SoftCopy));

    assert!(matches!(
        run_to_completion(job, &media),
        EncodeOutcome::Completed { .. }
    ));
    let clip = MediaProber::new(Tools::default()).probe(&output);
    assert_eq!(clip.subtitle_streams.len(), 1);
    assert_eq!(clip.audio_streams.len(), 1);
}
