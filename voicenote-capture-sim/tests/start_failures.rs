mod common;

use std::thread;
use std::time::Duration;

use voicenote_capture_core::models::error::CaptureError;
use voicenote_capture_core::{SessionOptions, SessionState};

use common::{bare_harness, harness, options, wait_for};

#[test]
fn microphone_permission_denied_aborts_start() {
    let h = harness();
    h.backend.set_deny_permission(true);

    assert_eq!(
        h.session.start(&options()).unwrap_err(),
        CaptureError::PermissionDenied
    );
    assert_eq!(h.session.state(), SessionState::Idle);
    assert_eq!(
        h.session.snapshot().last_error,
        Some(CaptureError::PermissionDenied)
    );
    assert_eq!(h.backend.open_stream_count(), 0);
}

#[test]
fn no_devices_aborts_start() {
    let h = bare_harness();

    assert_eq!(
        h.session.start(&options()).unwrap_err(),
        CaptureError::NoDevice
    );
    assert_eq!(h.session.state(), SessionState::Idle);
}

#[test]
fn missing_encoder_aborts_start_without_leaking_streams() {
    let h = harness();
    h.encoders.set_disabled(true);

    assert_eq!(
        h.session.start(&options()).unwrap_err(),
        CaptureError::EncoderUnavailable
    );
    assert_eq!(h.session.state(), SessionState::Idle);

    // The microphone acquired before the encoder failure must be released.
    assert!(wait_for(Duration::from_secs(1), || {
        h.backend.open_stream_count() == 0
    }));
}

#[test]
fn mime_negotiation_picks_the_first_supported_type() {
    let h = harness();

    let opts = SessionOptions {
        mime_preference: vec!["audio/flac".to_string(), "audio/pcm".to_string()],
        ..options()
    };
    h.session.start(&opts).unwrap();
    thread::sleep(Duration::from_millis(300));
    h.session.stop().unwrap();

    assert_eq!(h.session.artifact().unwrap().mime_type(), "audio/pcm");
}

#[test]
fn unsupported_preferences_fall_back_to_the_platform_default() {
    let h = harness();

    // The default preference list names browser codecs the simulated
    // platform does not provide.
    h.session.start(&options()).unwrap();
    thread::sleep(Duration::from_millis(300));
    h.session.stop().unwrap();

    assert_eq!(h.session.artifact().unwrap().mime_type(), "audio/wav");
}

#[test]
fn invalid_options_are_rejected_before_acquisition() {
    let h = harness();

    let opts = SessionOptions {
        sample_rate: 0.0,
        ..options()
    };
    assert!(matches!(
        h.session.start(&opts).unwrap_err(),
        CaptureError::Internal(_)
    ));
    assert_eq!(h.session.state(), SessionState::Idle);
    assert_eq!(h.backend.open_stream_count(), 0);
}

#[test]
fn failed_start_does_not_block_a_retry() {
    let h = harness();

    h.backend.set_deny_permission(true);
    assert!(h.session.start(&options()).is_err());

    h.backend.set_deny_permission(false);
    h.session.start(&options()).unwrap();
    assert_eq!(h.session.state(), SessionState::Recording);
    thread::sleep(Duration::from_millis(300));
    h.session.stop().unwrap();
    assert!(h.session.artifact().is_some());
}
