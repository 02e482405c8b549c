use std::time::Duration;

use parking_lot::Mutex;

use voicenote_capture_core::models::error::{Capability, CaptureError};
use voicenote_capture_core::processing::mixing;
use voicenote_capture_core::traits::encoder::{ChunkSink, Encoder, EncoderFactory};

const DEFAULT_MIME: &str = "audio/wav";

struct FactoryState {
    supported: Vec<String>,
    pause_supported: bool,
    disabled: bool,
}

/// Produces raw-PCM chunk encoders, with toggles for the capability edges:
/// pause support and total encoder absence.
pub struct SimEncoderFactory {
    state: Mutex<FactoryState>,
}

impl SimEncoderFactory {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(FactoryState {
                supported: vec![DEFAULT_MIME.to_string(), "audio/pcm".to_string()],
                pause_supported: true,
                disabled: false,
            }),
        }
    }

    pub fn set_pause_supported(&self, supported: bool) {
        self.state.lock().pause_supported = supported;
    }

    /// Make every open fail with `EncoderUnavailable`.
    pub fn set_disabled(&self, disabled: bool) {
        self.state.lock().disabled = disabled;
    }

    pub fn set_supported_types(&self, types: &[&str]) {
        self.state.lock().supported = types.iter().map(|t| t.to_string()).collect();
    }
}

impl Default for SimEncoderFactory {
    fn default() -> Self {
        Self::new()
    }
}

impl EncoderFactory for SimEncoderFactory {
    fn is_type_supported(&self, mime: &str) -> bool {
        let state = self.state.lock();
        !state.disabled && state.supported.iter().any(|m| m == mime)
    }

    fn supports_pause(&self) -> bool {
        self.state.lock().pause_supported
    }

    fn open(
        &self,
        mime: Option<&str>,
        sample_rate: f64,
        timeslice: Duration,
        sink: ChunkSink,
    ) -> Result<Box<dyn Encoder>, CaptureError> {
        let state = self.state.lock();
        if state.disabled {
            return Err(CaptureError::EncoderUnavailable);
        }
        let mime = mime
            .filter(|m| state.supported.iter().any(|s| s == m))
            .unwrap_or(DEFAULT_MIME)
            .to_string();
        Ok(Box::new(PcmChunkEncoder::new(
            mime,
            sample_rate,
            timeslice,
            state.pause_supported,
            sink,
        )))
    }
}

/// Buffers mixed frames and emits one 16-bit little-endian PCM chunk per
/// timeslice worth of audio, matching the chunked delivery of a real
/// platform recorder.
struct PcmChunkEncoder {
    mime: String,
    frames_per_chunk: usize,
    buffer: Vec<f32>,
    sink: ChunkSink,
    pause_supported: bool,
    paused: bool,
    finished: bool,
}

impl PcmChunkEncoder {
    fn new(
        mime: String,
        sample_rate: f64,
        timeslice: Duration,
        pause_supported: bool,
        sink: ChunkSink,
    ) -> Self {
        Self {
            mime,
            frames_per_chunk: ((sample_rate * timeslice.as_secs_f64()) as usize).max(1),
            buffer: Vec::new(),
            sink,
            pause_supported,
            paused: false,
            finished: false,
        }
    }

    fn emit_full_chunks(&mut self) {
        while self.buffer.len() >= self.frames_per_chunk {
            let frames: Vec<f32> = self.buffer.drain(..self.frames_per_chunk).collect();
            (self.sink)(mixing::pcm16_bytes(&frames));
        }
    }
}

impl Encoder for PcmChunkEncoder {
    fn mime_type(&self) -> &str {
        &self.mime
    }

    fn encode(&mut self, frames: &[f32]) -> Result<(), CaptureError> {
        if self.finished {
            return Err(CaptureError::Internal("encoder already finished".into()));
        }
        if self.paused {
            return Ok(());
        }
        self.buffer.extend_from_slice(frames);
        self.emit_full_chunks();
        Ok(())
    }

    fn pause(&mut self) -> Result<(), CaptureError> {
        if !self.pause_supported {
            return Err(CaptureError::Unsupported(Capability::Pause));
        }
        self.paused = true;
        Ok(())
    }

    fn resume(&mut self) -> Result<(), CaptureError> {
        if !self.pause_supported {
            return Err(CaptureError::Unsupported(Capability::Pause));
        }
        self.paused = false;
        Ok(())
    }

    fn finish(&mut self) -> Result<(), CaptureError> {
        if self.finished {
            return Ok(());
        }
        self.finished = true;
        self.emit_full_chunks();
        if !self.buffer.is_empty() {
            let remainder: Vec<f32> = self.buffer.drain(..).collect();
            (self.sink)(mixing::pcm16_bytes(&remainder));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;

    fn collector() -> (ChunkSink, Arc<Mutex<Vec<Vec<u8>>>>) {
        let chunks = Arc::new(Mutex::new(Vec::new()));
        let sink: ChunkSink = {
            let chunks = Arc::clone(&chunks);
            Arc::new(move |bytes| chunks.lock().push(bytes))
        };
        (sink, chunks)
    }

    fn open(factory: &SimEncoderFactory, sink: ChunkSink) -> Box<dyn Encoder> {
        factory
            .open(Some("audio/wav"), 1000.0, Duration::from_millis(100), sink)
            .unwrap()
    }

    #[test]
    fn emits_one_chunk_per_timeslice() {
        let factory = SimEncoderFactory::new();
        let (sink, chunks) = collector();
        let mut encoder = open(&factory, sink);

        // 100 frames per chunk at 1 kHz / 100 ms.
        encoder.encode(&vec![0.5; 250]).unwrap();

        let chunks = chunks.lock();
        assert_eq!(chunks.len(), 2);
        assert_eq!(chunks[0].len(), 200); // 100 frames * 2 bytes
    }

    #[test]
    fn finish_flushes_the_remainder() {
        let factory = SimEncoderFactory::new();
        let (sink, chunks) = collector();
        let mut encoder = open(&factory, sink);

        encoder.encode(&vec![0.5; 250]).unwrap();
        encoder.finish().unwrap();

        let chunks = chunks.lock();
        assert_eq!(chunks.len(), 3);
        assert_eq!(chunks[2].len(), 100); // 50 leftover frames
    }

    #[test]
    fn paused_encoder_emits_nothing() {
        let factory = SimEncoderFactory::new();
        let (sink, chunks) = collector();
        let mut encoder = open(&factory, sink);

        encoder.pause().unwrap();
        encoder.encode(&vec![0.5; 500]).unwrap();
        assert!(chunks.lock().is_empty());

        encoder.resume().unwrap();
        encoder.encode(&vec![0.5; 100]).unwrap();
        assert_eq!(chunks.lock().len(), 1);
    }

    #[test]
    fn disabled_factory_reports_no_support() {
        let factory = SimEncoderFactory::new();
        factory.set_disabled(true);

        assert!(!factory.is_type_supported("audio/wav"));
        let (sink, _) = collector();
        let result = factory.open(None, 48_000.0, Duration::from_millis(100), sink);
        assert_eq!(result.err(), Some(CaptureError::EncoderUnavailable));
    }

    #[test]
    fn pause_unsupported_is_surfaced() {
        let factory = SimEncoderFactory::new();
        factory.set_pause_supported(false);
        let (sink, _) = collector();
        let mut encoder = open(&factory, sink);

        assert_eq!(
            encoder.pause().err(),
            Some(CaptureError::Unsupported(Capability::Pause))
        );
    }
}
