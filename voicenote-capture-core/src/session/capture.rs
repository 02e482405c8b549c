//! The capture session state machine.
//!
//! A session owns the full pipeline for one recording at a time: source
//! streams feeding a [`StreamMixer`], an encoder consuming the mixed output,
//! and a level meter tapped off the same frames. Commands (`start`, `pause`,
//! `resume`, `stop`, `switch_device`, `toggle_desktop_capture`) run on the
//! caller's thread; two worker threads drive the pipeline while a recording
//! is active:
//!
//! - the pipeline thread drains the mix graph, feeds the encoder and meter,
//!   and applies source-ended events;
//! - the timer thread pushes level updates to the observer.
//!
//! Lock order: `pipeline` before `shared`; `chunk_queue`, `events` and the
//! artifact store are leaf locks. Observers are notified with no locks held.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use serde::Serialize;

use crate::mixer::{SourceHandle, StreamMixer};
use crate::models::artifact::{ArtifactMetadata, ArtifactRef, EncodedChunk};
use crate::models::config::SessionOptions;
use crate::models::error::{Capability, CaptureError};
use crate::models::source::SourceKind;
use crate::models::state::{SessionDiagnostics, SessionSnapshot, SessionState};
use crate::processing::level_meter::LevelMeter;
use crate::storage::ArtifactStore;
use crate::traits::device_access::DeviceAccess;
use crate::traits::encoder::{ChunkSink, Encoder, EncoderFactory};
use crate::traits::observer::SessionObserver;
use crate::traits::source_stream::SourceStream;

/// Pipeline thread tick.
const PROCESS_INTERVAL: Duration = Duration::from_millis(100);

/// Level/elapsed push tick.
const TIMER_INTERVAL: Duration = Duration::from_millis(250);

/// Platform capabilities probed once at session start, so every command in
/// the session sees the same answers.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct SessionCapabilities {
    pub pause: bool,
    pub desktop_capture: bool,
    pub live_patch: bool,
}

/// Internal phase. `Starting` and `Stopping` cover the async edges of the
/// observable state machine; commands arriving during them are deferred or
/// rejected rather than racing the transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    Idle,
    Starting,
    Recording,
    Paused,
    Stopping,
    Stopped,
}

impl Phase {
    fn observable(self) -> SessionState {
        match self {
            Phase::Idle | Phase::Starting => SessionState::Idle,
            Phase::Recording => SessionState::Recording,
            Phase::Paused => SessionState::Paused,
            Phase::Stopping | Phase::Stopped => SessionState::Stopped,
        }
    }

    fn is_active(self) -> bool {
        matches!(self, Phase::Recording | Phase::Paused)
    }
}

/// Mutable session state shared between command handlers and workers.
struct Shared {
    phase: Phase,
    /// Stop arrived while `Starting`; acquisition unwinds instead of
    /// entering `Recording`.
    pending_stop: bool,
    capture_start: Option<Instant>,
    paused_duration: Duration,
    last_pause: Option<Instant>,
    elapsed_final: f64,
    level: f32,
    selected_device_id: Option<String>,
    desktop_enabled: bool,
    last_error: Option<CaptureError>,
    chunks: Vec<EncodedChunk>,
    caps: SessionCapabilities,
    artifact: Option<ArtifactMetadata>,
    diagnostics: SessionDiagnostics,
}

impl Shared {
    fn new() -> Self {
        Self {
            phase: Phase::Idle,
            pending_stop: false,
            capture_start: None,
            paused_duration: Duration::ZERO,
            last_pause: None,
            elapsed_final: 0.0,
            level: 0.0,
            selected_device_id: None,
            desktop_enabled: false,
            last_error: None,
            chunks: Vec::new(),
            caps: SessionCapabilities::default(),
            artifact: None,
            diagnostics: SessionDiagnostics::default(),
        }
    }

    /// Recorded time excluding paused intervals. Live while capture runs,
    /// frozen at the final value once it stops.
    fn elapsed_seconds(&self) -> f64 {
        let Some(start) = self.capture_start else {
            return self.elapsed_final;
        };
        let mut paused = self.paused_duration;
        if let Some(pause_start) = self.last_pause {
            paused += pause_start.elapsed();
        }
        (start.elapsed().saturating_sub(paused)).as_secs_f64()
    }

    /// Stop the elapsed clock at its current value.
    fn freeze_elapsed(&mut self) {
        self.elapsed_final = self.elapsed_seconds();
        self.capture_start = None;
        self.last_pause = None;
        self.paused_duration = Duration::ZERO;
    }
}

/// Everything that exists only while a recording is live.
struct Pipeline {
    mixer: StreamMixer,
    encoder: Option<Box<dyn Encoder>>,
    /// MIME of the current encoder instance.
    mime: String,
    /// Negotiated preference passed to the factory on every (re)open.
    mime_choice: Option<String>,
    mic_handle: SourceHandle,
    desktop_handle: Option<SourceHandle>,
    mic_token: u64,
    desktop_token: Option<u64>,
    encoder_generation: u32,
    meter: LevelMeter,
    timeslice: Duration,
    sample_rate: f64,
}

/// Out-of-band notification from a source stream, keyed by acquisition
/// token so events from streams already replaced are ignored.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SourceEvent {
    Ended(u64),
}

type ObserverSlot = Arc<Mutex<Option<Arc<dyn SessionObserver>>>>;
type PipelineSlot = Arc<Mutex<Option<Pipeline>>>;
type ChunkQueue = Arc<Mutex<VecDeque<EncodedChunk>>>;
type EventQueue = Arc<Mutex<Vec<SourceEvent>>>;

/// Audio capture session over a platform backend.
///
/// All methods take `&self`; wrap in an `Arc` to share between the UI and
/// background callers.
pub struct CaptureSession {
    access: Arc<dyn DeviceAccess>,
    encoders: Arc<dyn EncoderFactory>,
    shared: Arc<Mutex<Shared>>,
    pipeline: PipelineSlot,
    chunk_queue: ChunkQueue,
    events: EventQueue,
    store: Arc<Mutex<ArtifactStore>>,
    observer: ObserverSlot,
    running: Arc<AtomicBool>,
    workers: Mutex<Vec<JoinHandle<()>>>,
    next_token: AtomicU64,
}

impl CaptureSession {
    pub fn new(access: Arc<dyn DeviceAccess>, encoders: Arc<dyn EncoderFactory>) -> Self {
        Self {
            access,
            encoders,
            shared: Arc::new(Mutex::new(Shared::new())),
            pipeline: Arc::new(Mutex::new(None)),
            chunk_queue: Arc::new(Mutex::new(VecDeque::new())),
            events: Arc::new(Mutex::new(Vec::new())),
            store: Arc::new(Mutex::new(ArtifactStore::new())),
            observer: Arc::new(Mutex::new(None)),
            running: Arc::new(AtomicBool::new(false)),
            workers: Mutex::new(Vec::new()),
            next_token: AtomicU64::new(1),
        }
    }

    pub fn set_observer(&self, observer: Arc<dyn SessionObserver>) {
        *self.observer.lock() = Some(observer);
    }

    pub fn state(&self) -> SessionState {
        self.shared.lock().phase.observable()
    }

    /// Capabilities probed at the most recent `start`.
    pub fn capabilities(&self) -> SessionCapabilities {
        self.shared.lock().caps
    }

    pub fn snapshot(&self) -> SessionSnapshot {
        let shared = self.shared.lock();
        SessionSnapshot {
            state: shared.phase.observable(),
            elapsed_seconds: shared.elapsed_seconds(),
            selected_device_id: shared.selected_device_id.clone(),
            desktop_capture_enabled: shared.desktop_enabled,
            level: shared.level,
            last_error: shared.last_error.clone(),
            artifact: shared.artifact.clone(),
        }
    }

    pub fn diagnostics(&self) -> SessionDiagnostics {
        self.shared.lock().diagnostics
    }

    /// The current finalized recording, if one exists and was not discarded.
    pub fn artifact(&self) -> Option<ArtifactRef> {
        self.store.lock().current().cloned()
    }

    /// Revoke the current recording's bytes and drop it from the store.
    pub fn discard_artifact(&self) {
        self.store.lock().discard();
        self.shared.lock().artifact = None;
    }

    /// Begin a recording.
    ///
    /// Source acquisition runs on the caller's thread. Microphone failure
    /// aborts the start; desktop-capture failure is downgraded to a
    /// microphone-only recording with the error surfaced. A `stop` arriving
    /// during acquisition cancels the start and releases every stream.
    pub fn start(&self, options: &SessionOptions) -> Result<(), CaptureError> {
        options.validate().map_err(CaptureError::Internal)?;
        self.reap_workers();

        let device_id = {
            let mut shared = self.shared.lock();
            if shared.phase.is_active() || shared.phase == Phase::Starting {
                return Err(CaptureError::SessionAlreadyActive);
            }
            shared.phase = Phase::Starting;
            shared.pending_stop = false;
            shared.last_error = None;
            shared.chunks.clear();
            shared.diagnostics = SessionDiagnostics::default();
            shared.level = 0.0;
            shared.elapsed_final = 0.0;
            shared.capture_start = None;
            shared.paused_duration = Duration::ZERO;
            shared.last_pause = None;
            if options.device_id.is_some() {
                shared.selected_device_id = options.device_id.clone();
            }
            shared.desktop_enabled = options.desktop_capture;
            shared.caps = SessionCapabilities {
                pause: self.encoders.supports_pause(),
                desktop_capture: self.access.supports_desktop_capture(),
                live_patch: self.access.supports_live_patch(),
            };
            shared.selected_device_id.clone()
        };
        let caps = self.capabilities();
        self.chunk_queue.lock().clear();
        self.events.lock().clear();

        let mime_choice = options
            .mime_preference
            .iter()
            .find(|m| self.encoders.is_type_supported(m))
            .cloned();

        let mut mic_stream = match self.access.open_microphone(device_id.as_deref()) {
            Ok(stream) => stream,
            Err(err) => return Err(self.abort_start(err)),
        };
        let mic_token = self.next_token.fetch_add(1, Ordering::Relaxed);
        mic_stream.on_ended(Self::ended_hook(&self.events, mic_token));

        let desktop_stream = if options.desktop_capture {
            match self.acquire_desktop(caps) {
                Ok(pair) => Some(pair),
                Err(err) => {
                    // Microphone-only recording continues; the UI sees why.
                    let mut shared = self.shared.lock();
                    shared.desktop_enabled = false;
                    shared.last_error = Some(err.clone());
                    drop(shared);
                    self.notify_error(&err);
                    None
                }
            }
        } else {
            None
        };

        let mut mixer = StreamMixer::new(options.sample_rate, caps.live_patch);
        let (mic_handle, _) = match mixer.connect(mic_stream, SourceKind::Microphone) {
            Ok(connected) => connected,
            Err(err) => {
                mixer.clear();
                return Err(self.abort_start(err));
            }
        };
        let mut desktop_handle = None;
        let mut desktop_token = None;
        if let Some((stream, token)) = desktop_stream {
            match mixer.connect(stream, SourceKind::Desktop) {
                Ok((handle, _)) => {
                    desktop_handle = Some(handle);
                    desktop_token = Some(token);
                }
                Err(err) => {
                    let mut shared = self.shared.lock();
                    shared.desktop_enabled = false;
                    shared.last_error = Some(err.clone());
                    drop(shared);
                    self.notify_error(&err);
                }
            }
        }

        {
            let mut shared = self.shared.lock();
            if shared.pending_stop {
                shared.pending_stop = false;
                shared.phase = Phase::Idle;
                drop(shared);
                mixer.clear();
                return Ok(());
            }
        }

        let sink = Self::chunk_sink(&self.chunk_queue, 0);
        let encoder = match self
            .encoders
            .open(mime_choice.as_deref(), options.sample_rate, options.timeslice, sink)
        {
            Ok(encoder) => encoder,
            Err(err) => {
                mixer.clear();
                return Err(self.abort_start(err));
            }
        };
        let mime = encoder.mime_type().to_string();
        log::info!("capture started: {} @ {} Hz", mime, options.sample_rate);

        *self.pipeline.lock() = Some(Pipeline {
            mixer,
            encoder: Some(encoder),
            mime,
            mime_choice,
            mic_handle,
            desktop_handle,
            mic_token,
            desktop_token,
            encoder_generation: 0,
            meter: LevelMeter::new(options.analysis_window, options.sample_rate),
            timeslice: options.timeslice,
            sample_rate: options.sample_rate,
        });

        {
            let mut shared = self.shared.lock();
            if shared.pending_stop {
                shared.pending_stop = false;
                shared.phase = Phase::Stopping;
                drop(shared);
                Self::finalize(
                    &self.pipeline,
                    &self.shared,
                    &self.chunk_queue,
                    &self.store,
                    &self.observer,
                    false,
                );
                return Ok(());
            }
            shared.capture_start = Some(Instant::now());
            shared.phase = Phase::Recording;
        }
        self.notify_state(SessionState::Recording);
        self.spawn_workers();
        Ok(())
    }

    /// Suspend encoding without tearing the pipeline down. No-op outside
    /// `Recording`.
    pub fn pause(&self) -> Result<(), CaptureError> {
        let mut pipeline = self.pipeline.lock();
        {
            let mut shared = self.shared.lock();
            if shared.phase != Phase::Recording {
                return Ok(());
            }
            if !shared.caps.pause {
                let err = CaptureError::Unsupported(Capability::Pause);
                shared.last_error = Some(err.clone());
                drop(shared);
                drop(pipeline);
                self.notify_error(&err);
                return Err(err);
            }
        }

        if let Some(p) = pipeline.as_mut() {
            if let Some(encoder) = p.encoder.as_mut() {
                if let Err(err) = encoder.pause() {
                    self.shared.lock().last_error = Some(err.clone());
                    drop(pipeline);
                    self.notify_error(&err);
                    return Err(err);
                }
            }
        }

        {
            let mut shared = self.shared.lock();
            shared.last_pause = Some(Instant::now());
            shared.phase = Phase::Paused;
        }
        drop(pipeline);
        self.notify_state(SessionState::Paused);
        Ok(())
    }

    /// Resume a paused recording. No-op outside `Paused`.
    pub fn resume(&self) -> Result<(), CaptureError> {
        let mut pipeline = self.pipeline.lock();
        if self.shared.lock().phase != Phase::Paused {
            return Ok(());
        }

        if let Some(p) = pipeline.as_mut() {
            if let Some(encoder) = p.encoder.as_mut() {
                if let Err(err) = encoder.resume() {
                    self.shared.lock().last_error = Some(err.clone());
                    drop(pipeline);
                    self.notify_error(&err);
                    return Err(err);
                }
            }
        }

        {
            let mut shared = self.shared.lock();
            if let Some(pause_start) = shared.last_pause.take() {
                shared.paused_duration += pause_start.elapsed();
            }
            shared.phase = Phase::Recording;
        }
        drop(pipeline);
        self.notify_state(SessionState::Recording);
        Ok(())
    }

    /// End the recording and finalize whatever was captured.
    ///
    /// Idempotent; a stop during `Starting` cancels the start instead.
    pub fn stop(&self) -> Result<(), CaptureError> {
        let encode_tail = {
            let mut shared = self.shared.lock();
            match shared.phase {
                Phase::Idle | Phase::Stopped | Phase::Stopping => {
                    drop(shared);
                    self.reap_workers();
                    return Ok(());
                }
                Phase::Starting => {
                    shared.pending_stop = true;
                    return Ok(());
                }
                Phase::Recording | Phase::Paused => {
                    let was_recording = shared.phase == Phase::Recording;
                    if let Some(pause_start) = shared.last_pause.take() {
                        shared.paused_duration += pause_start.elapsed();
                    }
                    shared.phase = Phase::Stopping;
                    was_recording
                }
            }
        };

        self.running.store(false, Ordering::SeqCst);
        self.reap_workers();
        Self::finalize(
            &self.pipeline,
            &self.shared,
            &self.chunk_queue,
            &self.store,
            &self.observer,
            encode_tail,
        );
        Ok(())
    }

    /// Change the capture microphone.
    ///
    /// While idle this only updates the selection for the next start. While
    /// active the new device is acquired first; on failure the recording
    /// continues on the old device and the error is returned. On platforms
    /// without live patching the encoder is rotated against the rebuilt
    /// graph and accumulated chunks are preserved.
    pub fn switch_device(&self, device_id: &str) -> Result<(), CaptureError> {
        {
            let mut shared = self.shared.lock();
            if !shared.phase.is_active() {
                shared.selected_device_id = Some(device_id.to_string());
                return Ok(());
            }
        }

        let mut stream = match self.access.open_microphone(Some(device_id)) {
            Ok(stream) => stream,
            Err(err) => {
                self.shared.lock().last_error = Some(err.clone());
                self.notify_error(&err);
                return Err(err);
            }
        };
        let token = self.next_token.fetch_add(1, Ordering::Relaxed);
        stream.on_ended(Self::ended_hook(&self.events, token));

        let mut pipeline = self.pipeline.lock();
        let Some(p) = pipeline.as_mut() else {
            // Stopped while we were acquiring; keep the selection only.
            drop(pipeline);
            self.shared.lock().selected_device_id = Some(device_id.to_string());
            return Ok(());
        };

        let (new_handle, connect_edit) = match p.mixer.connect(stream, SourceKind::Microphone) {
            Ok(connected) => connected,
            Err(err) => {
                drop(pipeline);
                self.shared.lock().last_error = Some(err.clone());
                self.notify_error(&err);
                return Err(err);
            }
        };
        let disconnect_edit = p.mixer.disconnect(p.mic_handle);
        p.mic_handle = new_handle;
        p.mic_token = token;

        let rebuild = connect_edit.requires_rebuild() || disconnect_edit.requires_rebuild();
        if rebuild {
            self.rotate_encoder(p)?;
        }
        drop(pipeline);

        self.shared.lock().selected_device_id = Some(device_id.to_string());
        log::info!("switched capture device to {device_id} (rebuild: {rebuild})");
        Ok(())
    }

    /// Enable or disable desktop-audio capture, returning the new setting.
    ///
    /// While idle this records intent for the next start. While active the
    /// desktop source is connected to or removed from the running graph;
    /// acquisition failure leaves the recording untouched.
    pub fn toggle_desktop_capture(&self) -> Result<bool, CaptureError> {
        let (active, currently_enabled, caps) = {
            let shared = self.shared.lock();
            (shared.phase.is_active(), shared.desktop_enabled, shared.caps)
        };

        if !active {
            if !currently_enabled && !self.access.supports_desktop_capture() {
                let err = CaptureError::Unsupported(Capability::DesktopCapture);
                self.shared.lock().last_error = Some(err.clone());
                return Err(err);
            }
            let mut shared = self.shared.lock();
            shared.desktop_enabled = !currently_enabled;
            return Ok(shared.desktop_enabled);
        }

        if currently_enabled {
            let mut pipeline = self.pipeline.lock();
            if let Some(p) = pipeline.as_mut() {
                p.desktop_token = None;
                if let Some(handle) = p.desktop_handle.take() {
                    let edit = p.mixer.disconnect(handle);
                    if edit.requires_rebuild() {
                        self.rotate_encoder(p)?;
                    }
                }
            }
            drop(pipeline);
            self.shared.lock().desktop_enabled = false;
            return Ok(false);
        }

        let (stream, token) = match self.acquire_desktop(caps) {
            Ok(pair) => pair,
            Err(err) => {
                self.shared.lock().last_error = Some(err.clone());
                self.notify_error(&err);
                return Err(err);
            }
        };

        let mut pipeline = self.pipeline.lock();
        let Some(p) = pipeline.as_mut() else {
            return Ok(false);
        };
        match p.mixer.connect(stream, SourceKind::Desktop) {
            Ok((handle, edit)) => {
                p.desktop_handle = Some(handle);
                p.desktop_token = Some(token);
                if edit.requires_rebuild() {
                    self.rotate_encoder(p)?;
                }
            }
            Err(err) => {
                drop(pipeline);
                self.shared.lock().last_error = Some(err.clone());
                self.notify_error(&err);
                return Err(err);
            }
        }
        drop(pipeline);
        self.shared.lock().desktop_enabled = true;
        Ok(true)
    }

    fn acquire_desktop(
        &self,
        caps: SessionCapabilities,
    ) -> Result<(Box<dyn SourceStream>, u64), CaptureError> {
        if !caps.desktop_capture {
            return Err(CaptureError::Unsupported(Capability::DesktopCapture));
        }
        let mut stream = self.access.open_desktop()?;
        let token = self.next_token.fetch_add(1, Ordering::Relaxed);
        stream.on_ended(Self::ended_hook(&self.events, token));
        Ok((stream, token))
    }

    /// Replace the encoder against a rebuilt graph. The outgoing encoder is
    /// flushed completely before the replacement opens, so chunk generations
    /// never interleave.
    fn rotate_encoder(&self, p: &mut Pipeline) -> Result<(), CaptureError> {
        if let Some(mut old) = p.encoder.take() {
            old.finish()?;
        }
        p.encoder_generation += 1;

        let sink = Self::chunk_sink(&self.chunk_queue, p.encoder_generation);
        let mut encoder =
            self.encoders
                .open(p.mime_choice.as_deref(), p.sample_rate, p.timeslice, sink)?;
        if self.shared.lock().phase == Phase::Paused {
            encoder.pause()?;
        }
        p.mime = encoder.mime_type().to_string();
        p.encoder = Some(encoder);

        self.shared.lock().diagnostics.encoder_rotations += 1;
        log::debug!("encoder rotated to generation {}", p.encoder_generation);
        Ok(())
    }

    fn abort_start(&self, err: CaptureError) -> CaptureError {
        {
            let mut shared = self.shared.lock();
            shared.phase = Phase::Idle;
            shared.pending_stop = false;
            shared.last_error = Some(err.clone());
        }
        self.notify_error(&err);
        err
    }

    fn chunk_sink(queue: &ChunkQueue, generation: u32) -> ChunkSink {
        let queue = Arc::clone(queue);
        Arc::new(move |bytes: Vec<u8>| {
            if bytes.is_empty() {
                return;
            }
            queue.lock().push_back(EncodedChunk {
                bytes,
                encoder_generation: generation,
            });
        })
    }

    fn ended_hook(events: &EventQueue, token: u64) -> Box<dyn FnOnce() + Send + 'static> {
        let events = Arc::clone(events);
        Box::new(move || {
            events.lock().push(SourceEvent::Ended(token));
        })
    }

    fn notify_state(&self, state: SessionState) {
        if let Some(observer) = self.observer.lock().clone() {
            observer.on_state_changed(state);
        }
    }

    fn notify_error(&self, err: &CaptureError) {
        if let Some(observer) = self.observer.lock().clone() {
            observer.on_error(err);
        }
    }

    fn spawn_workers(&self) {
        self.running.store(true, Ordering::SeqCst);
        let mut workers = self.workers.lock();

        let pipeline_thread = {
            let running = Arc::clone(&self.running);
            let pipeline = Arc::clone(&self.pipeline);
            let shared = Arc::clone(&self.shared);
            let chunk_queue = Arc::clone(&self.chunk_queue);
            let events = Arc::clone(&self.events);
            let store = Arc::clone(&self.store);
            let observer = Arc::clone(&self.observer);
            let encoders = Arc::clone(&self.encoders);
            thread::Builder::new()
                .name("capture-pipeline".to_string())
                .spawn(move || {
                    while running.load(Ordering::SeqCst) {
                        thread::sleep(PROCESS_INTERVAL);
                        if !running.load(Ordering::SeqCst) {
                            break;
                        }
                        Self::drain_events(
                            &running,
                            &pipeline,
                            &shared,
                            &chunk_queue,
                            &events,
                            &store,
                            &observer,
                            encoders.as_ref(),
                        );
                        Self::pump(&pipeline, &shared, &chunk_queue);
                    }
                })
        };
        let timer_thread = {
            let running = Arc::clone(&self.running);
            let shared = Arc::clone(&self.shared);
            let observer = Arc::clone(&self.observer);
            thread::Builder::new()
                .name("capture-timer".to_string())
                .spawn(move || {
                    while running.load(Ordering::SeqCst) {
                        thread::sleep(TIMER_INTERVAL);
                        let level = {
                            let shared = shared.lock();
                            // Level updates stop on pause; only push while
                            // actually recording.
                            if shared.phase != Phase::Recording {
                                continue;
                            }
                            shared.level
                        };
                        if let Some(observer) = observer.lock().clone() {
                            observer.on_level(level);
                        }
                    }
                })
        };

        for handle in [pipeline_thread, timer_thread] {
            match handle {
                Ok(handle) => workers.push(handle),
                Err(err) => log::error!("failed to spawn capture worker: {err}"),
            }
        }
    }

    fn reap_workers(&self) {
        let handles: Vec<JoinHandle<()>> = self.workers.lock().drain(..).collect();
        for handle in handles {
            if let Err(err) = handle.join() {
                log::error!("capture worker panicked: {err:?}");
            }
        }
    }

    /// One pipeline tick: drain the mix graph, feed encoder and meter, move
    /// delivered chunks into the accumulated sequence.
    fn pump(pipeline: &PipelineSlot, shared: &Arc<Mutex<Shared>>, chunk_queue: &ChunkQueue) {
        let mut pipeline = pipeline.lock();
        let Some(p) = pipeline.as_mut() else {
            return;
        };
        let phase = shared.lock().phase;
        if !phase.is_active() {
            return;
        }

        // Twice the nominal tick budget lets the loop catch up after a
        // scheduling hiccup without unbounded bursts.
        let budget = (p.sample_rate * PROCESS_INTERVAL.as_secs_f64() * 2.0) as usize;
        let frames = p.mixer.mix(budget);
        // Input arriving while paused is drained and discarded; neither the
        // encoder nor the meter sees it.
        if !frames.is_empty() && phase == Phase::Recording {
            let level = p.meter.process(&frames);
            shared.lock().level = level;
            if let Some(encoder) = p.encoder.as_mut() {
                if let Err(err) = encoder.encode(&frames) {
                    log::warn!("encode failed: {err}");
                    shared.lock().last_error = Some(err);
                }
            }
        }
        drop(pipeline);

        let delivered: Vec<EncodedChunk> = chunk_queue.lock().drain(..).collect();
        if !delivered.is_empty() {
            let mut shared = shared.lock();
            shared.diagnostics.chunks_captured += delivered.len() as u64;
            shared.diagnostics.bytes_captured +=
                delivered.iter().map(|c| c.bytes.len() as u64).sum::<u64>();
            shared.chunks.extend(delivered);
        }
    }

    /// Apply queued source-ended events. Desktop loss degrades to
    /// microphone-only; losing the last source finalizes the recording.
    #[allow(clippy::too_many_arguments)]
    fn drain_events(
        running: &Arc<AtomicBool>,
        pipeline: &PipelineSlot,
        shared: &Arc<Mutex<Shared>>,
        chunk_queue: &ChunkQueue,
        events: &EventQueue,
        store: &Arc<Mutex<ArtifactStore>>,
        observer: &ObserverSlot,
        encoders: &dyn EncoderFactory,
    ) {
        let queued: Vec<SourceEvent> = events.lock().drain(..).collect();
        for event in queued {
            let SourceEvent::Ended(token) = event;

            enum Outcome {
                Ignored,
                Degraded(CaptureError),
                LastSourceLost(CaptureError),
            }

            let outcome = {
                let mut guard = pipeline.lock();
                let Some(p) = guard.as_mut() else {
                    continue;
                };

                if p.desktop_token == Some(token) {
                    p.desktop_token = None;
                    let err = CaptureError::SourceLost(SourceKind::Desktop);
                    if p.mixer.handle_of_kind(SourceKind::Microphone).is_none() {
                        // The microphone is already gone; this was the sole
                        // remaining source.
                        Outcome::LastSourceLost(err)
                    } else {
                        let rebuild = p
                            .desktop_handle
                            .take()
                            .map(|handle| p.mixer.disconnect(handle).requires_rebuild())
                            .unwrap_or(false);
                        if rebuild {
                            Self::rotate_detached(p, encoders, chunk_queue, shared);
                        }
                        let mut shared = shared.lock();
                        shared.desktop_enabled = false;
                        shared.diagnostics.source_events += 1;
                        shared.last_error = Some(err.clone());
                        Outcome::Degraded(err)
                    }
                } else if p.mic_token == token {
                    let err = CaptureError::SourceLost(SourceKind::Microphone);
                    if p.desktop_handle.is_some() {
                        p.mic_token = 0;
                        let rebuild = p
                            .mixer
                            .handle_of_kind(SourceKind::Microphone)
                            .map(|handle| p.mixer.disconnect(handle).requires_rebuild())
                            .unwrap_or(false);
                        if rebuild {
                            Self::rotate_detached(p, encoders, chunk_queue, shared);
                        }
                        let mut shared = shared.lock();
                        shared.diagnostics.source_events += 1;
                        shared.last_error = Some(err.clone());
                        Outcome::Degraded(err)
                    } else {
                        Outcome::LastSourceLost(err)
                    }
                } else {
                    // Event from a stream already replaced.
                    Outcome::Ignored
                }
            };

            match outcome {
                Outcome::Ignored => {}
                Outcome::Degraded(err) => {
                    if let Some(observer) = observer.lock().clone() {
                        observer.on_error(&err);
                    }
                }
                Outcome::LastSourceLost(err) => {
                    {
                        let mut shared = shared.lock();
                        if let Some(pause_start) = shared.last_pause.take() {
                            shared.paused_duration += pause_start.elapsed();
                        }
                        shared.phase = Phase::Stopping;
                        if err == CaptureError::SourceLost(SourceKind::Desktop) {
                            shared.desktop_enabled = false;
                        }
                        shared.diagnostics.source_events += 1;
                        shared.last_error = Some(err.clone());
                    }
                    if let Some(observer) = observer.lock().clone() {
                        observer.on_error(&err);
                    }
                    running.store(false, Ordering::SeqCst);
                    Self::finalize(pipeline, shared, chunk_queue, store, observer, false);
                    return;
                }
            }
        }
    }

    /// `rotate_encoder` for worker-thread callers that have the pipeline
    /// lock but no `&self`. Failure leaves the session without an encoder;
    /// the error is surfaced rather than propagated.
    fn rotate_detached(
        p: &mut Pipeline,
        encoders: &dyn EncoderFactory,
        chunk_queue: &ChunkQueue,
        shared: &Arc<Mutex<Shared>>,
    ) {
        if let Some(mut old) = p.encoder.take() {
            if let Err(err) = old.finish() {
                log::warn!("encoder flush during rotation failed: {err}");
            }
        }
        p.encoder_generation += 1;

        let sink = Self::chunk_sink(chunk_queue, p.encoder_generation);
        match encoders.open(p.mime_choice.as_deref(), p.sample_rate, p.timeslice, sink) {
            Ok(mut encoder) => {
                let mut shared = shared.lock();
                if shared.phase == Phase::Paused {
                    if let Err(err) = encoder.pause() {
                        shared.last_error = Some(err);
                    }
                }
                p.mime = encoder.mime_type().to_string();
                p.encoder = Some(encoder);
                shared.diagnostics.encoder_rotations += 1;
            }
            Err(err) => {
                log::error!("encoder rotation failed: {err}");
                shared.lock().last_error = Some(err);
            }
        }
    }

    /// Tear the pipeline down and assemble the accumulated chunks into an
    /// artifact. A recording with no chunks returns to `Idle` with no
    /// artifact instead of `Stopped`.
    fn finalize(
        pipeline: &PipelineSlot,
        shared: &Arc<Mutex<Shared>>,
        chunk_queue: &ChunkQueue,
        store: &Arc<Mutex<ArtifactStore>>,
        observer: &ObserverSlot,
        encode_tail: bool,
    ) {
        let mut mime = None;
        {
            let mut guard = pipeline.lock();
            if let Some(mut p) = guard.take() {
                if encode_tail {
                    let tail = p.mixer.mix(usize::MAX);
                    if !tail.is_empty() {
                        if let Some(encoder) = p.encoder.as_mut() {
                            if let Err(err) = encoder.encode(&tail) {
                                log::warn!("tail encode failed: {err}");
                            }
                        }
                    }
                }
                if let Some(mut encoder) = p.encoder.take() {
                    if let Err(err) = encoder.finish() {
                        log::warn!("encoder flush failed: {err}");
                    }
                }
                p.mixer.clear();
                mime = Some(p.mime);
            }
        }

        let delivered: Vec<EncodedChunk> = chunk_queue.lock().drain(..).collect();

        let (chunks, duration) = {
            let mut shared = shared.lock();
            if !delivered.is_empty() {
                shared.diagnostics.chunks_captured += delivered.len() as u64;
                shared.diagnostics.bytes_captured +=
                    delivered.iter().map(|c| c.bytes.len() as u64).sum::<u64>();
                shared.chunks.extend(delivered);
            }
            shared.freeze_elapsed();
            shared.level = 0.0;
            (std::mem::take(&mut shared.chunks), shared.elapsed_final)
        };

        if chunks.is_empty() {
            {
                let mut shared = shared.lock();
                if shared.phase != Phase::Stopping {
                    // A concurrent path already finalized this recording.
                    return;
                }
                shared.phase = Phase::Idle;
                shared.artifact = None;
            }
            log::info!("capture stopped with no audio; nothing to finalize");
            if let Some(observer) = observer.lock().clone() {
                observer.on_state_changed(SessionState::Idle);
            }
            return;
        }

        let mime = mime.unwrap_or_else(|| "application/octet-stream".to_string());
        let artifact = store.lock().finalize(&chunks, &mime, duration);
        {
            let mut shared = shared.lock();
            shared.artifact = Some(artifact.metadata().clone());
            shared.phase = Phase::Stopped;
        }

        if let Some(observer) = observer.lock().clone() {
            observer.on_artifact(&artifact);
            observer.on_state_changed(SessionState::Stopped);
        }
    }
}

impl Drop for CaptureSession {
    fn drop(&mut self) {
        self.running.store(false, Ordering::SeqCst);
        self.reap_workers();
        if let Some(mut p) = self.pipeline.lock().take() {
            if let Some(mut encoder) = p.encoder.take() {
                if let Err(err) = encoder.finish() {
                    log::warn!("encoder flush on drop failed: {err}");
                }
            }
            p.mixer.clear();
        }
    }
}
