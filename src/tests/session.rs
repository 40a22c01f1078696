//! End-to-end session tests

use std::path::{Path, PathBuf};

use crate::capabilities::{EncoderRegistry, StaticCapabilities};
use crate::error::{ConcatError, Stage};
use crate::ffmpeg_utils::ffmpeg;
use crate::negotiate::{ContainerKind, OutputCodec};
use crate::session::{ConcatSession, WarningKind};
use crate::tests::fixtures::{
    inspect_output, loudness_profile, write_corrupt_mp3_wav, write_text_file,
    write_unknown_codec_wav, write_wav, Tone,
};

/// One AAC frame at 44.1 kHz, in seconds
const FRAME_SECS: f64 = 1024.0 / 44100.0;

/// loud 0.6 s, silent 0.6 s, loud 0.4 s with mixed rates and layouts
fn three_clips(dir: &Path) -> Vec<PathBuf> {
    vec![
        write_wav(dir, "01.wav", Tone::sine(22050, 1, 0.6)),
        write_wav(dir, "02.wav", Tone::silence(48000, 2, 0.6)),
        write_wav(dir, "03.wav", Tone::sine(44100, 1, 0.4)),
    ]
}

fn setup() -> tempfile::TempDir {
    crate::ffmpeg_utils::init().unwrap();
    tempfile::tempdir().unwrap()
}

fn assert_three_clips_in_order(output: &Path) {
    let profile = loudness_profile(output, 0.1);
    assert!(profile.len() >= 15, "profile too short: {:?}", profile);
    for i in 1..=4 {
        assert!(profile[i] > 0.1, "window {} should be loud: {:?}", i, profile);
    }
    for i in 7..=10 {
        assert!(profile[i] < 0.02, "window {} should be silent: {:?}", i, profile);
    }
    for i in 13..=14 {
        assert!(profile[i] > 0.1, "window {} should be loud: {:?}", i, profile);
    }
}

#[test]
fn test_segments_concatenated_in_order() {
    let dir = setup();
    let inputs = three_clips(dir.path());
    let output = dir.path().join("book.m4a");
    let caps = EncoderRegistry::probe();

    let report = ConcatSession::new(inputs, &output, &caps).run().unwrap();

    assert_eq!(report.segments_written, 3);
    assert!(report.skipped.is_empty());
    assert!(report.warnings.is_empty());
    assert_eq!(report.codec, OutputCodec::Aac);
    assert_eq!(report.container, ContainerKind::M4a);
    assert_eq!(report.channels, 1);
    assert_eq!(report.sample_rate, 44100);
    assert_three_clips_in_order(&output);
}

#[test]
fn test_duration_is_additive() {
    let dir = setup();
    let inputs = three_clips(dir.path());
    let output = dir.path().join("book.m4a");
    let caps = StaticCapabilities::aac_only();

    // Each segment's encoder pads its last partial frame and the next
    // segment starts after that frame, so the drift is below one frame per
    // segment. The m4a edit list hides the encoder delay.
    let tolerance = inputs.len() as f64 * FRAME_SECS;
    let report = ConcatSession::new(inputs, &output, &caps).run().unwrap();
    let written = inspect_output(&output);

    let expected = 0.6 + 0.6 + 0.4;
    assert!(
        report.duration_secs > expected - 1e-6 && report.duration_secs - expected < tolerance,
        "reported duration {} vs {}",
        report.duration_secs,
        expected
    );
    assert!(
        (written.duration_secs - expected).abs() < tolerance,
        "container duration {} vs {}",
        written.duration_secs,
        expected
    );
}

#[test]
fn test_written_timestamps_are_monotonic() {
    let dir = setup();
    let inputs = three_clips(dir.path());
    let output = dir.path().join("book.m4a");
    let caps = StaticCapabilities::aac_only();

    let report = ConcatSession::new(inputs, &output, &caps).run().unwrap();
    let written = inspect_output(&output);

    assert_eq!(written.codec, ffmpeg::codec::Id::AAC);
    assert_eq!(written.packets.len() as u64, report.packets_written);
    for pair in written.packets.windows(2) {
        let ((pts_a, dts_a), (pts_b, dts_b)) = (pair[0], pair[1]);
        assert!(dts_b > dts_a, "dts went from {} to {}", dts_a, dts_b);
        assert!(pts_b >= pts_a, "pts went from {} to {}", pts_a, pts_b);
    }
}

#[test]
fn test_mp3_request_falls_back_to_aac() {
    let dir = setup();
    let inputs = three_clips(dir.path());
    let output = dir.path().join("book.mp3");
    let caps = StaticCapabilities::aac_only();

    let report = ConcatSession::new(inputs, &output, &caps).run().unwrap();

    assert!(report.substituted);
    assert_eq!(report.codec, OutputCodec::Aac);
    assert_eq!(report.container, ContainerKind::Adts);
    assert_eq!(report.output, output);
    assert!(output.exists());

    let written = inspect_output(&output);
    assert_eq!(written.codec, ffmpeg::codec::Id::AAC);
    assert_eq!(written.sample_rate, 44100);
}

#[test]
fn test_missing_segment_is_skipped() {
    let dir = setup();
    let mut inputs = three_clips(dir.path());
    let missing = dir.path().join("missing.wav");
    inputs.insert(1, missing.clone());
    let output = dir.path().join("book.m4a");
    let caps = StaticCapabilities::aac_only();

    let report = ConcatSession::new(inputs, &output, &caps).run().unwrap();

    assert_eq!(report.segments_written, 3);
    assert_eq!(report.skipped.len(), 1);
    assert_eq!(report.skipped[0].path, missing);
    assert_eq!(report.skipped[0].stage, Stage::Open);
    assert_three_clips_in_order(&output);
}

#[test]
fn test_later_segment_without_audio_is_skipped() {
    let dir = setup();
    let mut inputs = three_clips(dir.path());
    let text = write_text_file(dir.path(), "notes.txt");
    inputs.push(text.clone());
    let output = dir.path().join("book.m4a");
    let caps = StaticCapabilities::aac_only();

    let report = ConcatSession::new(inputs, &output, &caps).run().unwrap();

    assert_eq!(report.segments_written, 3);
    assert_eq!(report.skipped.len(), 1);
    assert_eq!(report.skipped[0].path, text);
    assert!(matches!(report.skipped[0].stage, Stage::Open | Stage::Probe));
}

#[test]
fn test_missing_first_segment_is_fatal() {
    let dir = setup();
    let mut inputs = three_clips(dir.path());
    inputs.insert(0, dir.path().join("missing.wav"));
    let output = dir.path().join("book.m4a");
    let caps = StaticCapabilities::aac_only();

    match ConcatSession::new(inputs, &output, &caps).run() {
        Err(ConcatError::OpenInput { path, .. }) => {
            assert_eq!(path, dir.path().join("missing.wav"))
        }
        Err(e) => panic!("unexpected error: {}", e),
        Ok(report) => panic!("session should fail, wrote {:?}", report.output),
    }
    assert!(!output.exists());
}

#[test]
fn test_first_segment_without_audio_is_fatal() {
    let dir = setup();
    let mut inputs = three_clips(dir.path());
    inputs.insert(0, write_text_file(dir.path(), "notes.txt"));
    let output = dir.path().join("book.m4a");
    let caps = StaticCapabilities::aac_only();

    let err = match ConcatSession::new(inputs, &output, &caps).run() {
        Err(e) => e,
        Ok(report) => panic!("session should fail, wrote {:?}", report.output),
    };
    assert!(
        matches!(
            err,
            ConcatError::OpenInput { .. } | ConcatError::NoAudioStream { .. }
        ),
        "unexpected error: {}",
        err
    );
    assert_eq!(err.path(), Some(dir.path().join("notes.txt").as_path()));
    assert!(!output.exists());
}

#[test]
fn test_undecodable_first_segment_is_fatal() {
    let dir = setup();
    let mut inputs = three_clips(dir.path());
    let bad = write_unknown_codec_wav(dir.path(), "00.wav");
    inputs.insert(0, bad.clone());
    let output = dir.path().join("book.m4a");
    let caps = StaticCapabilities::aac_only();

    match ConcatSession::new(inputs, &output, &caps).run() {
        Err(e @ ConcatError::Decode { .. }) => {
            assert_eq!(e.stage(), Stage::Decode);
            assert_eq!(e.path(), Some(bad.as_path()));
        }
        Err(e) => panic!("unexpected error: {}", e),
        Ok(_) => panic!("session should fail"),
    }
    assert!(!output.exists());
}

#[test]
fn test_undecodable_later_segment_is_skipped() {
    let dir = setup();
    let mut inputs = three_clips(dir.path());
    let bad = write_unknown_codec_wav(dir.path(), "01b.wav");
    inputs.insert(1, bad.clone());
    let output = dir.path().join("book.m4a");
    let caps = StaticCapabilities::aac_only();

    let report = ConcatSession::new(inputs, &output, &caps).run().unwrap();

    assert_eq!(report.segments_written, 3);
    assert_eq!(report.skipped.len(), 1);
    assert_eq!(report.skipped[0].path, bad);
    assert_eq!(report.skipped[0].stage, Stage::Decode);
    assert_three_clips_in_order(&output);
}

#[test]
fn test_corrupt_payload_does_not_break_session() {
    let dir = setup();
    let mut inputs = three_clips(dir.path());
    let bad = write_corrupt_mp3_wav(dir.path(), "02b.wav");
    inputs.insert(2, bad.clone());
    let output = dir.path().join("book.m4a");
    let caps = StaticCapabilities::aac_only();

    let report = ConcatSession::new(inputs, &output, &caps).run().unwrap();

    // Invalid packets are dropped by the decoder, so the segment is either
    // skipped, reported as silent or appended as whatever survived.
    let skipped = report.skipped.iter().any(|s| s.path == bad);
    let silent = report
        .warnings
        .iter()
        .any(|w| w.path == bad && w.kind == WarningKind::NoAudioDecoded);
    assert!(
        skipped || silent || report.segments_written == 4,
        "corrupt segment left no trace: {:?}",
        report
    );
    assert!(report.segments_written >= 3);
    assert!(output.exists());
}

#[test]
fn test_no_encoder_is_fatal() {
    let dir = setup();
    let inputs = three_clips(dir.path());
    let output = dir.path().join("book.mp3");
    let caps = StaticCapabilities::default();

    match ConcatSession::new(inputs, &output, &caps).run() {
        Err(ConcatError::EncoderUnavailable { requested, fallback }) => {
            assert_eq!(requested, "mp3");
            assert_eq!(fallback, Some("aac"));
        }
        Err(e) => panic!("unexpected error: {}", e),
        Ok(_) => panic!("session should fail"),
    }
    assert!(!output.exists());
}

#[test]
fn test_only_skipped_segments_is_no_usable_segments() {
    let dir = setup();
    let first = write_wav(dir.path(), "01.wav", Tone::sine(44100, 1, 0.0));
    let inputs = vec![first, dir.path().join("gone.wav")];
    let output = dir.path().join("book.m4a");
    let caps = StaticCapabilities::aac_only();

    match ConcatSession::new(inputs, &output, &caps).run() {
        Err(ConcatError::NoUsableSegments { skipped }) => assert_eq!(skipped, 1),
        Err(e) => panic!("unexpected error: {}", e),
        Ok(report) => panic!("session should fail, wrote {:?}", report.output),
    }
    assert!(!output.exists());
}

#[test]
fn test_rerun_is_structurally_identical() {
    let dir = setup();
    let inputs = three_clips(dir.path());
    let caps = StaticCapabilities::aac_only();

    let first = ConcatSession::new(inputs.clone(), dir.path().join("a.m4a"), &caps)
        .run()
        .unwrap();
    let second = ConcatSession::new(inputs, dir.path().join("b.m4a"), &caps)
        .run()
        .unwrap();

    assert_ne!(first.session_id, second.session_id);
    assert_eq!(first.segments_written, second.segments_written);
    assert_eq!(first.packets_written, second.packets_written);
    assert!((first.duration_secs - second.duration_secs).abs() < 1e-9);

    let a = inspect_output(&dir.path().join("a.m4a"));
    let b = inspect_output(&dir.path().join("b.m4a"));
    assert!((a.duration_secs - b.duration_secs).abs() < 1e-6);
    assert_eq!(a.packets, b.packets);
}

#[test]
fn test_concatenate_helper() {
    let dir = setup();
    let inputs = three_clips(dir.path());
    let output = dir.path().join("book.aac");
    let caps = StaticCapabilities::aac_only();

    let report = crate::concatenate(&inputs, &output, &caps).unwrap();
    assert_eq!(report.container, ContainerKind::Adts);
    assert_eq!(report.segments_written, 3);
    assert!(!report
        .warnings
        .iter()
        .any(|w| w.kind == WarningKind::DurationUnknown));
}
