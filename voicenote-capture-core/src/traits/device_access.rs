use std::sync::Arc;

use crate::models::error::CaptureError;
use crate::models::source::AudioSourceInfo;
use crate::traits::source_stream::SourceStream;

/// Listener invoked when the platform reports device hot-plug or removal.
pub type DeviceChangeListener = Arc<dyn Fn() + Send + Sync + 'static>;

/// Platform capability for enumerating audio endpoints and acquiring live
/// streams from them.
///
/// Implemented by platform backends; the engine never talks to audio
/// hardware directly.
pub trait DeviceAccess: Send + Sync {
    /// Request microphone permission, prompting the user if necessary.
    ///
    /// Any stream opened for the prompt must be released before returning —
    /// enumeration alone must not leave a track open.
    fn request_permission(&self) -> Result<(), CaptureError>;

    /// Enumerate audio input endpoints.
    ///
    /// Fails with `Unsupported(AudioCapture)` when the platform has no
    /// audio-capture capability at all.
    fn enumerate(&self) -> Result<Vec<AudioSourceInfo>, CaptureError>;

    /// Whether the platform can capture desktop/system audio.
    fn supports_desktop_capture(&self) -> bool;

    /// Whether sources can be added to or removed from a running mix graph
    /// without rebuilding downstream consumers.
    fn supports_live_patch(&self) -> bool;

    /// Open a live microphone stream, or the platform default when
    /// `device_id` is `None`.
    fn open_microphone(
        &self,
        device_id: Option<&str>,
    ) -> Result<Box<dyn SourceStream>, CaptureError>;

    /// Prompt for and open the desktop/system-audio stream.
    fn open_desktop(&self) -> Result<Box<dyn SourceStream>, CaptureError>;

    /// Register a hot-plug listener.
    fn watch_devices(&self, listener: DeviceChangeListener);
}
