use std::sync::Arc;
use std::time::Duration;

use crate::models::error::CaptureError;

/// Sink receiving encoded chunks from an active encoder.
///
/// Chunks must be delivered in encode order; the session appends them to an
/// ordered queue and drains it deterministically.
pub type ChunkSink = Arc<dyn Fn(Vec<u8>) + Send + Sync + 'static>;

/// An active encoder instance consuming mixed frames and emitting encoded
/// chunks on a timeslice basis.
pub trait Encoder: Send {
    /// The negotiated MIME/codec tag of the output.
    fn mime_type(&self) -> &str;

    /// Feed mixed mono frames; emits zero or more chunks into the sink.
    fn encode(&mut self, frames: &[f32]) -> Result<(), CaptureError>;

    /// Suspend chunk production.
    ///
    /// Fails with `Unsupported(Pause)` on platforms without recorder pause.
    fn pause(&mut self) -> Result<(), CaptureError>;

    /// Resume chunk production after a pause.
    fn resume(&mut self) -> Result<(), CaptureError>;

    /// Flush all buffered data into the sink synchronously. Called exactly
    /// once; the encoder is unusable afterwards.
    fn finish(&mut self) -> Result<(), CaptureError>;
}

/// Platform capability producing encoder instances.
pub trait EncoderFactory: Send + Sync {
    /// Whether the platform can encode to `mime`.
    fn is_type_supported(&self, mime: &str) -> bool;

    /// Whether encoders support pause/resume. Probed once at session start.
    fn supports_pause(&self) -> bool;

    /// Open an encoder for `mime`, or the platform default codec when
    /// `None`. Fails with `EncoderUnavailable` when no codec exists.
    fn open(
        &self,
        mime: Option<&str>,
        sample_rate: f64,
        timeslice: Duration,
        sink: ChunkSink,
    ) -> Result<Box<dyn Encoder>, CaptureError>;
}
