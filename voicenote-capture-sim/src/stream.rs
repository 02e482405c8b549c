use std::f64::consts::PI;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use parking_lot::Mutex;

use voicenote_capture_core::models::error::CaptureError;
use voicenote_capture_core::models::source::AudioSourceInfo;
use voicenote_capture_core::traits::source_stream::{EndedHook, SampleSink, SourceStream};

/// Buffer cadence of the synthetic capture thread.
const BUFFER_INTERVAL: Duration = Duration::from_millis(10);

/// State shared between a stream and the backend that opened it, so the
/// backend can end the track externally (unplug, share revoked) and count
/// live tracks.
pub(crate) struct StreamShared {
    running: AtomicBool,
    ended_hook: Mutex<Option<EndedHook>>,
}

impl StreamShared {
    fn new() -> Arc<Self> {
        Arc::new(Self {
            running: AtomicBool::new(false),
            ended_hook: Mutex::new(None),
        })
    }

    pub(crate) fn is_live(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    /// Session-initiated stop: silent, no ended hook.
    fn stop(&self) {
        self.running.store(false, Ordering::SeqCst);
    }

    /// Platform-initiated end: stops the track and fires the hook once.
    pub(crate) fn end_externally(&self) {
        self.running.store(false, Ordering::SeqCst);
        if let Some(hook) = self.ended_hook.lock().take() {
            hook();
        }
    }
}

/// A synthetic audio track producing a steady sine tone.
pub(crate) struct SimSourceStream {
    info: AudioSourceInfo,
    frequency: f64,
    sample_rate: f64,
    shared: Arc<StreamShared>,
    worker: Option<JoinHandle<()>>,
}

impl SimSourceStream {
    pub(crate) fn new(
        info: AudioSourceInfo,
        frequency: f64,
        sample_rate: f64,
    ) -> (Self, Arc<StreamShared>) {
        let shared = StreamShared::new();
        let stream = Self {
            info,
            frequency,
            sample_rate,
            shared: Arc::clone(&shared),
            worker: None,
        };
        (stream, shared)
    }
}

impl SourceStream for SimSourceStream {
    fn info(&self) -> AudioSourceInfo {
        self.info.clone()
    }

    fn start(&mut self, sink: SampleSink) -> Result<(), CaptureError> {
        self.shared.running.store(true, Ordering::SeqCst);

        let shared = Arc::clone(&self.shared);
        let frequency = self.frequency;
        let sample_rate = self.sample_rate;
        let frames = ((sample_rate * BUFFER_INTERVAL.as_secs_f64()) as usize).max(1);
        let worker = thread::Builder::new()
            .name(format!("sim-source-{}", self.info.id))
            .spawn(move || {
                let mut phase = 0.0f64;
                let step = 2.0 * PI * frequency / sample_rate;
                let mut buffer = vec![0.0f32; frames];
                while shared.is_live() {
                    for sample in buffer.iter_mut() {
                        *sample = (phase.sin() * 0.8) as f32;
                        phase += step;
                    }
                    phase %= 2.0 * PI;
                    sink(&buffer, sample_rate, 1);
                    thread::sleep(BUFFER_INTERVAL);
                }
            })
            .map_err(|err| CaptureError::Internal(format!("spawn failed: {err}")))?;
        self.worker = Some(worker);
        Ok(())
    }

    fn stop(&mut self) {
        self.shared.stop();
        if let Some(worker) = self.worker.take() {
            let _ = worker.join();
        }
    }

    fn is_live(&self) -> bool {
        self.shared.is_live()
    }

    fn on_ended(&mut self, hook: EndedHook) {
        *self.shared.ended_hook.lock() = Some(hook);
    }
}

impl Drop for SimSourceStream {
    fn drop(&mut self) {
        self.stop();
    }
}
