// Session lifecycle against a scripted stand-in for ffmpeg.
// Unix only: the stand-in is a /bin/sh script.

#![cfg(unix)]

use ffclip::engine::{EncodeError, EncodeOutcome, EncodeSession, SessionEvent, SessionState};
use std::fs;
use std::sync::mpsc;
use std::time::{Duration, Instant};
use tempfile::TempDir;

use crate::common::helpers::*;

fn finished_outcome(events: Vec<SessionEvent>) -> EncodeOutcome {
    match events.into_iter().last() {
        Some(SessionEvent::Finished { outcome, .. }) => outcome,
        other => panic!("expected Finished as the last event, got {:?}", other),
    }
}

#[test]
fn test_progress_is_reported_once_per_percent() {
    let dir = TempDir::new().unwrap();
    let (settings, script) = fake_ffmpeg(
        dir.path(),
        r"printf 'Duration: 00:00:10.00, start: 0.000000\n' >&2
printf 'frame=  10 fps=0.0 q=28.0 size=0kB time=00:00:02.50 bitrate=N/A\r' >&2
printf 'frame=  11 fps=0.0 q=28.0 size=0kB time=00:00:02.50 bitrate=N/A\r' >&2
printf 'frame=  50 fps=0.0 q=28.0 size=0kB time=00:00:05.00 bitrate=N/A\r' >&2
exit 0",
    );

    let mut session = EncodeSession::new(settings);
    let output = dir.path().join("out.mp4");
    let job = job("in.mp4", output.to_str().unwrap());
    let job_id = session.start(job, script_plan(script, 10.0)).unwrap();

    let events = collect_events(&session);
    assert!(matches!(events[0], SessionEvent::Started { job_id: id } if id == job_id));
    assert_eq!(progress_values(&events), vec![25, 50, 100]);
    match finished_outcome(events) {
        EncodeOutcome::Completed { output: done } => assert_eq!(done, output),
        other => panic!("expected Completed, got {:?}", other),
    }

    session.join();
    assert_eq!(session.state(), SessionState::Completed);
}

#[test]
fn test_second_start_is_rejected_while_running() {
    let dir = TempDir::new().unwrap();
    let counter = dir.path().join("spawns");
    let (settings, script) = fake_ffmpeg(
        dir.path(),
        &format!("echo spawn >> '{}'\nexec sleep 30", counter.display()),
    );

    let mut session = EncodeSession::new(settings);
    session
        .start(job("in.mp4", "/nonexistent/a.mp4"), script_plan(script.clone(), 10.0))
        .unwrap();
    assert_eq!(session.state(), SessionState::Running);

    let err = session
        .start(job("in.mp4", "/nonexistent/b.mp4"), script_plan(script, 10.0))
        .unwrap_err();
    assert!(matches!(err, EncodeError::AlreadyRunning));

    session.cancel();
    let outcome = finished_outcome(collect_events(&session));
    assert!(matches!(outcome, EncodeOutcome::Cancelled));
    session.join();

    let spawns = fs::read_to_string(&counter).unwrap();
    assert_eq!(spawns.lines().count(), 1);
}

#[test]
fn test_cancel_stops_a_long_encode_quickly() {
    let dir = TempDir::new().unwrap();
    let (settings, script) = fake_ffmpeg(
        dir.path(),
        "printf 'frame=1 time=00:00:01.00\\r' >&2\nexec sleep 30",
    );
    let output = dir.path().join("partial.mp4");
    fs::write(&output, b"partial").unwrap();

    let mut session = EncodeSession::new(settings);
    session
        .start(job("in.mp4", output.to_str().unwrap()), script_plan(script, 100.0))
        .unwrap();

    // Wait for the first progress line so the script is past its printf
    loop {
        match session.events().recv_timeout(EVENT_TIMEOUT).unwrap() {
            SessionEvent::Progress { percent, .. } => {
                assert_eq!(percent, 1);
                break;
            }
            SessionEvent::Started { .. } => continue,
            other => panic!("unexpected event {:?}", other),
        }
    }

    let began = Instant::now();
    session.cancel();
    session.cancel();
    let outcome = finished_outcome(collect_events(&session));
    assert!(matches!(outcome, EncodeOutcome::Cancelled));
    assert!(began.elapsed() < Duration::from_secs(10));

    session.join();
    assert_eq!(session.state(), SessionState::Cancelled);
    // Cancelled jobs keep whatever was written
    assert!(output.exists());

    session.reset();
    assert_eq!(session.state(), SessionState::Idle);
}

#[test]
fn test_interrupt_cancels_and_waits_for_the_final_report() {
    let dir = TempDir::new().unwrap();
    let (settings, script) = fake_ffmpeg(
        dir.path(),
        "printf 'frame=1 time=00:00:05.00\\r' >&2\nexec sleep 30",
    );

    let mut session = EncodeSession::new(settings);
    session
        .start(job("in.mp4", "/nonexistent/out.mp4"), script_plan(script, 100.0))
        .unwrap();

    let (interrupt_tx, interrupts) = mpsc::channel();
    let began = Instant::now();
    let mut percents = Vec::new();
    let outcome = session.wait_for_outcome(&interrupts, |event| {
        if let SessionEvent::Progress { percent, .. } = event {
            percents.push(*percent);
            // Ctrl-C arrives once the encoder is busy
            let _ = interrupt_tx.send(());
        }
    });

    assert!(matches!(outcome, Some(EncodeOutcome::Cancelled)), "{:?}", outcome);
    assert_eq!(percents, vec![5]);
    assert!(began.elapsed() < Duration::from_secs(10));
    session.join();
    assert_eq!(session.state(), SessionState::Cancelled);
}

#[test]
fn test_wait_for_outcome_without_interrupt_reports_completion() {
    let dir = TempDir::new().unwrap();
    let (settings, script) = fake_ffmpeg(
        dir.path(),
        "printf 'frame=1 time=00:00:05.00\\r' >&2\nexit 0",
    );
    let (_interrupt_tx, interrupts) = mpsc::channel();

    let mut session = EncodeSession::new(settings);
    assert!(session.wait_for_outcome(&interrupts, |_| {}).is_none());

    session
        .start(job("in.mp4", "/nonexistent/out.mp4"), script_plan(script, 10.0))
        .unwrap();
    let mut events = 0;
    let outcome = session.wait_for_outcome(&interrupts, |_| events += 1);
    assert!(matches!(outcome, Some(EncodeOutcome::Completed { .. })), "{:?}", outcome);
    // Started, 50%, 100%
    assert_eq!(events, 3);

    // Finished has been consumed; a second wait returns instead of hanging
    assert!(session.wait_for_outcome(&interrupts, |_| {}).is_none());
    session.join();
}

#[test]
fn test_libass_failure_is_classified_and_output_removed() {
    let dir = TempDir::new().unwrap();
    let (settings, script) = fake_ffmpeg(
        dir.path(),
        "echo \"[Parsed_subtitles_0 @ 0x55] libass wasn't built with ASS_FEATURE_WRAP_UNICODE support\" >&2
echo 'Error initializing filter' >&2
exit 1",
    );
    let output = dir.path().join("clip.mp4");
    fs::write(&output, b"half a file").unwrap();

    let mut session = EncodeSession::new(settings);
    session
        .start(job("in.mkv", output.to_str().unwrap()), script_plan(script, 10.0))
        .unwrap();

    let outcome = finished_outcome(collect_events(&session));
    assert!(
        matches!(outcome, EncodeOutcome::Failed(EncodeError::SubtitleLibraryIncompatible)),
        "{:?}",
        outcome
    );
    session.join();
    assert_eq!(session.state(), SessionState::Failed);
    assert!(!output.exists());
}

#[test]
fn test_generic_failure_carries_exit_code_and_summary() {
    let dir = TempDir::new().unwrap();
    let (settings, script) = fake_ffmpeg(
        dir.path(),
        "echo 'Input #0, matroska' >&2
echo 'Unknown encoder libfoo' >&2
echo 'Error while opening encoder for output stream #0:0' >&2
exit 3",
    );

    let mut session = EncodeSession::new(settings);
    session
        .start(job("in.mkv", "/nonexistent/out.mp4"), script_plan(script, 10.0))
        .unwrap();

    match finished_outcome(collect_events(&session)) {
        EncodeOutcome::Failed(EncodeError::ToolFailure { exit_code, details }) => {
            assert_eq!(exit_code, Some(3));
            assert!(details.contains("Error while opening encoder"), "{}", details);
        }
        other => panic!("expected ToolFailure, got {:?}", other),
    }
}

#[test]
fn test_timeout_kills_a_hung_encoder() {
    let dir = TempDir::new().unwrap();
    let (mut settings, script) = fake_ffmpeg(dir.path(), "exec sleep 30");
    settings.timeout = Some(Duration::from_millis(300));

    let mut session = EncodeSession::new(settings);
    session
        .start(job("in.mp4", "/nonexistent/out.mp4"), script_plan(script, 10.0))
        .unwrap();

    let outcome = finished_outcome(collect_events(&session));
    assert!(
        matches!(outcome, EncodeOutcome::Failed(EncodeError::Timeout { .. })),
        "{:?}",
        outcome
    );
}

#[test]
fn test_session_can_run_again_after_finishing() {
    let dir = TempDir::new().unwrap();
    let (settings, script) = fake_ffmpeg(dir.path(), "exit 0");

    let mut session = EncodeSession::new(settings);
    for _ in 0..2 {
        session
            .start(job("in.mp4", "/nonexistent/out.mp4"), script_plan(script.clone(), 0.0))
            .unwrap();
        let outcome = finished_outcome(collect_events(&session));
        assert!(matches!(outcome, EncodeOutcome::Completed { .. }));
        assert_eq!(session.state(), SessionState::Completed);
    }
}

#[test]
fn test_missing_encoder_is_reported_without_spawning() {
    let dir = TempDir::new().unwrap();
    let (mut settings, script) = fake_ffmpeg(dir.path(), "exit 0");
    settings.tools = ffclip::engine::Tools::new(dir.path().join("no-such-ffmpeg"), "ffprobe");

    let mut session = EncodeSession::new(settings);
    let err = session
        .start(job("in.mp4", "/nonexistent/out.mp4"), script_plan(script, 10.0))
        .unwrap_err();
    assert!(matches!(err, EncodeError::ToolMissing { .. }));
    assert!(err.to_string().contains("PATH"));
    assert_eq!(session.state(), SessionState::Idle);
    assert!(session.events().try_recv().is_err());
}
