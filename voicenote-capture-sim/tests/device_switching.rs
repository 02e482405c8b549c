mod common;

use std::thread;
use std::time::Duration;

use voicenote_capture_core::models::error::CaptureError;
use voicenote_capture_core::{SessionOptions, SessionState};

use common::{harness, options, wait_for};

fn options_for(device_id: &str) -> SessionOptions {
    SessionOptions {
        device_id: Some(device_id.to_string()),
        ..options()
    }
}

#[test]
fn live_patch_switch_keeps_the_encoder() {
    let h = harness();

    h.session.start(&options_for("mic-a")).unwrap();
    assert!(h.session.capabilities().live_patch);
    thread::sleep(Duration::from_millis(300));

    h.session.switch_device("mic-b").unwrap();
    assert_eq!(h.session.state(), SessionState::Recording);
    thread::sleep(Duration::from_millis(300));
    h.session.stop().unwrap();

    assert_eq!(h.session.diagnostics().encoder_rotations, 0);
    assert_eq!(
        h.session.snapshot().selected_device_id.as_deref(),
        Some("mic-b")
    );
    assert!(h.session.artifact().is_some());
}

#[test]
fn rebuild_switch_rotates_encoder_and_preserves_chunks() {
    let h = harness();
    h.backend.set_live_patch(false);

    h.session.start(&options_for("mic-a")).unwrap();
    assert!(!h.session.capabilities().live_patch);
    assert!(wait_for(Duration::from_secs(2), || {
        h.session.diagnostics().bytes_captured > 0
    }));
    let bytes_before_switch = h.session.diagnostics().bytes_captured;

    h.session.switch_device("mic-b").unwrap();
    assert_eq!(h.session.state(), SessionState::Recording);
    thread::sleep(Duration::from_millis(400));
    h.session.stop().unwrap();

    assert!(h.session.diagnostics().encoder_rotations >= 1);
    let artifact = h.session.artifact().expect("no artifact");
    // Audio captured before the switch survives the encoder rotation.
    assert!(artifact.metadata().byte_len >= bytes_before_switch);
}

#[test]
fn switch_to_unknown_device_fails_and_recording_continues() {
    let h = harness();

    h.session.start(&options_for("mic-a")).unwrap();
    thread::sleep(Duration::from_millis(200));

    assert_eq!(
        h.session.switch_device("mic-z").unwrap_err(),
        CaptureError::NoDevice
    );
    assert_eq!(h.session.state(), SessionState::Recording);
    assert_eq!(h.session.snapshot().last_error, Some(CaptureError::NoDevice));
    assert_eq!(
        h.session.snapshot().selected_device_id.as_deref(),
        Some("mic-a")
    );

    thread::sleep(Duration::from_millis(200));
    h.session.stop().unwrap();
    assert!(h.session.artifact().is_some());
}

#[test]
fn switch_while_idle_only_updates_the_selection() {
    let h = harness();

    h.session.switch_device("mic-b").unwrap();
    assert_eq!(h.session.state(), SessionState::Idle);
    assert_eq!(
        h.session.snapshot().selected_device_id.as_deref(),
        Some("mic-b")
    );
    assert_eq!(h.backend.open_stream_count(), 0);

    // The next start picks the stored selection up.
    h.session.start(&options()).unwrap();
    assert_eq!(
        h.session.snapshot().selected_device_id.as_deref(),
        Some("mic-b")
    );
    h.session.stop().unwrap();
}

#[test]
fn switch_releases_the_previous_device() {
    let h = harness();

    h.session.start(&options_for("mic-a")).unwrap();
    thread::sleep(Duration::from_millis(200));
    assert_eq!(h.backend.open_stream_count(), 1);

    h.session.switch_device("mic-b").unwrap();
    assert!(wait_for(Duration::from_secs(1), || {
        h.backend.open_stream_count() == 1
    }));

    h.session.stop().unwrap();
    assert_eq!(h.backend.open_stream_count(), 0);
}
