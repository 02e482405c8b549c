use std::sync::Arc;

use crate::models::error::CaptureError;
use crate::models::source::AudioSourceInfo;

/// Sink receiving live audio buffers from a source stream.
///
/// Parameters:
/// - `samples`: interleaved f32 samples.
/// - `sample_rate`: the actual sample rate of the delivered audio.
/// - `channels`: number of channels (1 = mono, 2 = stereo interleaved).
///
/// Fires on the platform's capture thread — keep processing minimal.
pub type SampleSink = Arc<dyn Fn(&[f32], f64, u16) + Send + Sync + 'static>;

/// Hook fired at most once when the platform ends the track outside the
/// session's control (desktop share revoked, device unplugged).
pub type EndedHook = Box<dyn FnOnce() + Send + 'static>;

/// A live audio-producing endpoint: an open microphone track or the audio
/// track of an active desktop share.
///
/// The stream is exclusively owned by whichever component acquired it; it
/// must be stopped on every exit path so the platform's "in use" indicator
/// is released.
pub trait SourceStream: Send {
    /// The endpoint this stream was opened from.
    fn info(&self) -> AudioSourceInfo;

    /// Begin delivering buffers into `sink`.
    fn start(&mut self, sink: SampleSink) -> Result<(), CaptureError>;

    /// Stop the underlying hardware track. Idempotent.
    fn stop(&mut self);

    /// Whether the track is still producing audio.
    fn is_live(&self) -> bool;

    /// Register a hook fired when the track ends externally. Must be set
    /// before `start` for ends to be observed reliably.
    fn on_ended(&mut self, hook: EndedHook);
}
