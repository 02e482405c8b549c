use std::sync::Arc;
use std::thread;
use std::time::Duration;

use parking_lot::Mutex;

use voicenote_capture_core::models::error::{Capability, CaptureError};
use voicenote_capture_core::models::source::{AudioSourceInfo, SourceKind};
use voicenote_capture_core::traits::device_access::{DeviceAccess, DeviceChangeListener};
use voicenote_capture_core::traits::source_stream::SourceStream;

use crate::stream::{SimSourceStream, StreamShared};

/// Desktop audio deliberately runs at a different rate than the usual
/// 48 kHz graph so the resampling path gets exercised.
const DESKTOP_SAMPLE_RATE: f64 = 44_100.0;
const DESKTOP_TONE_HZ: f64 = 250.0;
const MIC_SAMPLE_RATE: f64 = 48_000.0;

struct SimDevice {
    info: AudioSourceInfo,
    tone_hz: f64,
}

struct LiveTrack {
    device_id: String,
    shared: Arc<StreamShared>,
}

struct BackendState {
    devices: Vec<SimDevice>,
    deny_permission: bool,
    desktop_supported: bool,
    desktop_denied: bool,
    live_patch: bool,
    acquire_delay: Duration,
    listeners: Vec<DeviceChangeListener>,
    tracks: Vec<LiveTrack>,
}

/// Scriptable in-memory platform: synthetic devices, toggleable permissions
/// and capabilities, hot-plug, and external stream termination.
///
/// Every opened stream is tracked so tests can assert that no track is left
/// live after an operation (the "microphone in use" indicator check).
pub struct SimBackend {
    state: Arc<Mutex<BackendState>>,
}

impl SimBackend {
    pub fn new() -> Self {
        Self {
            state: Arc::new(Mutex::new(BackendState {
                devices: Vec::new(),
                deny_permission: false,
                desktop_supported: true,
                desktop_denied: false,
                live_patch: true,
                acquire_delay: Duration::ZERO,
                listeners: Vec::new(),
                tracks: Vec::new(),
            })),
        }
    }

    /// Add a microphone. Each device gets its own tone so recordings from
    /// different devices are distinguishable.
    pub fn add_device(&self, id: &str, label: &str, is_default: bool) {
        let mut state = self.state.lock();
        let tone_hz = 300.0 + 150.0 * state.devices.len() as f64;
        state.devices.push(SimDevice {
            info: AudioSourceInfo {
                id: id.to_string(),
                label: label.to_string(),
                kind: SourceKind::Microphone,
                is_default,
            },
            tone_hz,
        });
    }

    pub fn set_deny_permission(&self, deny: bool) {
        self.state.lock().deny_permission = deny;
    }

    pub fn set_desktop_supported(&self, supported: bool) {
        self.state.lock().desktop_supported = supported;
    }

    /// Make the next desktop prompt fail as if the user dismissed it.
    pub fn set_deny_desktop(&self, deny: bool) {
        self.state.lock().desktop_denied = deny;
    }

    pub fn set_live_patch(&self, live_patch: bool) {
        self.state.lock().live_patch = live_patch;
    }

    /// Delay injected into every stream acquisition, for racing commands
    /// against an in-flight start.
    pub fn set_acquire_delay(&self, delay: Duration) {
        self.state.lock().acquire_delay = delay;
    }

    /// Number of tracks currently capturing.
    pub fn open_stream_count(&self) -> usize {
        let mut state = self.state.lock();
        state.tracks.retain(|t| t.shared.is_live());
        state.tracks.len()
    }

    /// Remove a device, ending any live track on it, and fire hot-plug
    /// listeners.
    pub fn unplug(&self, id: &str) {
        let (ended, listeners) = {
            let mut state = self.state.lock();
            state.devices.retain(|d| d.info.id != id);
            let ended: Vec<Arc<StreamShared>> = state
                .tracks
                .iter()
                .filter(|t| t.device_id == id)
                .map(|t| Arc::clone(&t.shared))
                .collect();
            (ended, state.listeners.clone())
        };
        for shared in ended {
            shared.end_externally();
        }
        for listener in listeners {
            listener();
        }
    }

    /// Add a device and fire hot-plug listeners.
    pub fn plug(&self, id: &str, label: &str, is_default: bool) {
        self.add_device(id, label, is_default);
        let listeners = self.state.lock().listeners.clone();
        for listener in listeners {
            listener();
        }
    }

    /// End the live desktop track, as if the user revoked the share from
    /// the platform's own UI.
    pub fn end_desktop_share(&self) {
        let ended: Vec<Arc<StreamShared>> = {
            let state = self.state.lock();
            state
                .tracks
                .iter()
                .filter(|t| t.device_id == voicenote_capture_core::DESKTOP_SOURCE_ID)
                .map(|t| Arc::clone(&t.shared))
                .collect()
        };
        for shared in ended {
            shared.end_externally();
        }
    }

    fn acquire_delay(&self) -> Duration {
        self.state.lock().acquire_delay
    }

    fn track(&self, device_id: &str, shared: Arc<StreamShared>) {
        self.state.lock().tracks.push(LiveTrack {
            device_id: device_id.to_string(),
            shared,
        });
    }
}

impl Default for SimBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl DeviceAccess for SimBackend {
    fn request_permission(&self) -> Result<(), CaptureError> {
        if self.state.lock().deny_permission {
            return Err(CaptureError::PermissionDenied);
        }
        Ok(())
    }

    fn enumerate(&self) -> Result<Vec<AudioSourceInfo>, CaptureError> {
        Ok(self
            .state
            .lock()
            .devices
            .iter()
            .map(|d| d.info.clone())
            .collect())
    }

    fn supports_desktop_capture(&self) -> bool {
        self.state.lock().desktop_supported
    }

    fn supports_live_patch(&self) -> bool {
        self.state.lock().live_patch
    }

    fn open_microphone(
        &self,
        device_id: Option<&str>,
    ) -> Result<Box<dyn SourceStream>, CaptureError> {
        let delay = self.acquire_delay();
        if !delay.is_zero() {
            thread::sleep(delay);
        }

        let (info, tone_hz) = {
            let state = self.state.lock();
            if state.deny_permission {
                return Err(CaptureError::PermissionDenied);
            }
            let device = match device_id {
                Some(id) => state.devices.iter().find(|d| d.info.id == id),
                None => state
                    .devices
                    .iter()
                    .find(|d| d.info.is_default)
                    .or_else(|| state.devices.first()),
            };
            let device = device.ok_or(CaptureError::NoDevice)?;
            (device.info.clone(), device.tone_hz)
        };

        let id = info.id.clone();
        let (stream, shared) = SimSourceStream::new(info, tone_hz, MIC_SAMPLE_RATE);
        self.track(&id, shared);
        log::debug!("sim: opened microphone {id}");
        Ok(Box::new(stream))
    }

    fn open_desktop(&self) -> Result<Box<dyn SourceStream>, CaptureError> {
        let delay = self.acquire_delay();
        if !delay.is_zero() {
            thread::sleep(delay);
        }

        {
            let state = self.state.lock();
            if !state.desktop_supported {
                return Err(CaptureError::Unsupported(Capability::DesktopCapture));
            }
            if state.desktop_denied {
                return Err(CaptureError::PermissionDenied);
            }
        }

        let (stream, shared) = SimSourceStream::new(
            AudioSourceInfo::desktop(),
            DESKTOP_TONE_HZ,
            DESKTOP_SAMPLE_RATE,
        );
        self.track(voicenote_capture_core::DESKTOP_SOURCE_ID, shared);
        log::debug!("sim: opened desktop audio");
        Ok(Box::new(stream))
    }

    fn watch_devices(&self, listener: DeviceChangeListener) {
        self.state.lock().listeners.push(listener);
    }
}
