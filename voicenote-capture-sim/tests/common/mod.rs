#![allow(dead_code)]

use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use voicenote_capture_core::traits::device_access::DeviceAccess;
use voicenote_capture_core::traits::encoder::EncoderFactory;
use voicenote_capture_core::{CaptureSession, SessionOptions};
use voicenote_capture_sim::{SimBackend, SimEncoderFactory};

pub struct Harness {
    pub backend: Arc<SimBackend>,
    pub encoders: Arc<SimEncoderFactory>,
    pub session: CaptureSession,
}

/// Backend with two microphones (mic-a default, mic-b) and a working
/// encoder factory.
pub fn harness() -> Harness {
    let harness = bare_harness();
    harness.backend.add_device("mic-a", "Mic A", true);
    harness.backend.add_device("mic-b", "Mic B", false);
    harness
}

/// Backend with no devices at all.
pub fn bare_harness() -> Harness {
    let backend = Arc::new(SimBackend::new());
    let encoders = Arc::new(SimEncoderFactory::new());
    let session = CaptureSession::new(
        Arc::clone(&backend) as Arc<dyn DeviceAccess>,
        Arc::clone(&encoders) as Arc<dyn EncoderFactory>,
    );
    Harness {
        backend,
        encoders,
        session,
    }
}

pub fn options() -> SessionOptions {
    SessionOptions::default()
}

/// Poll `cond` until it holds or the timeout elapses.
pub fn wait_for(timeout: Duration, mut cond: impl FnMut() -> bool) -> bool {
    let deadline = Instant::now() + timeout;
    while Instant::now() < deadline {
        if cond() {
            return true;
        }
        thread::sleep(Duration::from_millis(20));
    }
    cond()
}
