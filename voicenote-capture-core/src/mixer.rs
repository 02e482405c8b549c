//! Mix graph combining live audio sources into a single output.
//!
//! Each connected source feeds its own sample queue (resampled to the graph
//! rate and downmixed to mono on the capture thread); `mix` drains and sums
//! them into the combined output. The graph stays valid with zero sources —
//! the output is then merely silent.

use std::sync::Arc;

use parking_lot::Mutex;

use crate::models::error::CaptureError;
use crate::models::source::SourceKind;
use crate::processing::mixing;
use crate::processing::sample_queue::SampleQueue;
use crate::traits::source_stream::{SampleSink, SourceStream};

/// Seconds of audio buffered per source before the oldest samples drop.
const QUEUE_SECONDS: f64 = 5.0;

/// Identifies a connected source within the mix graph.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SourceHandle(u64);

/// Descriptor of the mixer's combined output. The generation changes
/// whenever the graph had to be rebuilt, invalidating consumers attached to
/// the previous output.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MixerOutput {
    pub generation: u64,
}

/// Outcome of a graph edit.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GraphEdit {
    /// The edit took effect without disturbing consumers of the output.
    LivePatched,
    /// Consumers of the previous output must re-attach (restart the encoder
    /// against the new output).
    RebuildRequired { output: MixerOutput },
}

impl GraphEdit {
    pub fn requires_rebuild(&self) -> bool {
        matches!(self, GraphEdit::RebuildRequired { .. })
    }
}

struct MixInput {
    handle: SourceHandle,
    kind: SourceKind,
    stream: Box<dyn SourceStream>,
    queue: Arc<Mutex<SampleQueue>>,
}

pub struct StreamMixer {
    sample_rate: f64,
    live_patch: bool,
    inputs: Vec<MixInput>,
    next_handle: u64,
    generation: u64,
}

impl StreamMixer {
    /// Allocate an empty graph with a defined (silent) output.
    ///
    /// `live_patch` reflects the platform's ability to edit a running graph
    /// in place; without it, every edit after the first connect reports
    /// `RebuildRequired`.
    pub fn new(sample_rate: f64, live_patch: bool) -> Self {
        Self {
            sample_rate,
            live_patch,
            inputs: Vec::new(),
            next_handle: 1,
            generation: 0,
        }
    }

    pub fn output(&self) -> MixerOutput {
        MixerOutput {
            generation: self.generation,
        }
    }

    pub fn sample_rate(&self) -> f64 {
        self.sample_rate
    }

    pub fn len(&self) -> usize {
        self.inputs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inputs.is_empty()
    }

    /// Add a source to the graph and start draining it into the mix.
    ///
    /// The combined output reflects the new source from the next `mix` call
    /// onward. Callers with no consumer attached yet may ignore a
    /// `RebuildRequired` result.
    pub fn connect(
        &mut self,
        mut stream: Box<dyn SourceStream>,
        kind: SourceKind,
    ) -> Result<(SourceHandle, GraphEdit), CaptureError> {
        let capacity = (self.sample_rate * QUEUE_SECONDS) as usize;
        let queue = Arc::new(Mutex::new(SampleQueue::new(capacity)));

        let sink: SampleSink = {
            let queue = Arc::clone(&queue);
            let target_rate = self.sample_rate;
            Arc::new(move |samples, source_rate, channels| {
                let mono = if channels > 1 {
                    mixing::downmix_to_mono(samples, channels as usize)
                } else {
                    samples.to_vec()
                };
                let resampled = mixing::resample(&mono, source_rate, target_rate);
                queue.lock().push(&resampled);
            })
        };

        stream.start(sink)?;

        let handle = SourceHandle(self.next_handle);
        self.next_handle += 1;
        let first = self.inputs.is_empty();
        self.inputs.push(MixInput {
            handle,
            kind,
            stream,
            queue,
        });

        log::debug!("mixer: connected {} source {:?}", kind, handle);
        Ok((handle, self.edit_result(first)))
    }

    /// Remove a source and stop its underlying hardware track. Unknown
    /// handles are a no-op. The graph remains valid, possibly silent.
    pub fn disconnect(&mut self, handle: SourceHandle) -> GraphEdit {
        let Some(pos) = self.inputs.iter().position(|i| i.handle == handle) else {
            return GraphEdit::LivePatched;
        };

        let mut input = self.inputs.remove(pos);
        input.stream.stop();
        log::debug!("mixer: disconnected {} source {:?}", input.kind, handle);
        self.edit_result(false)
    }

    /// First handle of the given kind, if connected.
    pub fn handle_of_kind(&self, kind: SourceKind) -> Option<SourceHandle> {
        self.inputs
            .iter()
            .find(|i| i.kind == kind)
            .map(|i| i.handle)
    }

    /// Drain up to `max_frames` mixed mono frames from the connected
    /// sources. Shorter inputs are zero-padded; an empty graph yields
    /// nothing.
    pub fn mix(&mut self, max_frames: usize) -> Vec<f32> {
        let available = self
            .inputs
            .iter()
            .map(|i| i.queue.lock().len())
            .max()
            .unwrap_or(0);
        let frames = available.min(max_frames);
        if frames == 0 {
            return Vec::new();
        }

        let parts: Vec<Vec<f32>> = self
            .inputs
            .iter()
            .map(|i| i.queue.lock().pop(frames))
            .collect();
        let slices: Vec<&[f32]> = parts.iter().map(|p| p.as_slice()).collect();
        mixing::mix(&slices)
    }

    /// Stop every connected stream and empty the graph. The output stays
    /// defined (and silent) afterwards.
    pub fn clear(&mut self) {
        for input in &mut self.inputs {
            input.stream.stop();
        }
        self.inputs.clear();
    }

    fn edit_result(&mut self, trivially_live: bool) -> GraphEdit {
        if self.live_patch || trivially_live {
            GraphEdit::LivePatched
        } else {
            self.generation += 1;
            GraphEdit::RebuildRequired {
                output: self.output(),
            }
        }
    }
}

impl Drop for StreamMixer {
    fn drop(&mut self) {
        self.clear();
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicBool, Ordering};

    use crate::models::source::AudioSourceInfo;
    use crate::traits::source_stream::EndedHook;

    use super::*;

    /// Stream whose sink the test drives directly.
    struct FakeStream {
        info: AudioSourceInfo,
        sink: Arc<Mutex<Option<SampleSink>>>,
        stopped: Arc<AtomicBool>,
    }

    impl FakeStream {
        fn new(id: &str, kind: SourceKind) -> (Box<Self>, Arc<Mutex<Option<SampleSink>>>, Arc<AtomicBool>) {
            let sink = Arc::new(Mutex::new(None));
            let stopped = Arc::new(AtomicBool::new(false));
            let stream = Box::new(Self {
                info: AudioSourceInfo {
                    id: id.into(),
                    label: id.into(),
                    kind,
                    is_default: false,
                },
                sink: Arc::clone(&sink),
                stopped: Arc::clone(&stopped),
            });
            (stream, sink, stopped)
        }
    }

    impl SourceStream for FakeStream {
        fn info(&self) -> AudioSourceInfo {
            self.info.clone()
        }

        fn start(&mut self, sink: SampleSink) -> Result<(), CaptureError> {
            *self.sink.lock() = Some(sink);
            Ok(())
        }

        fn stop(&mut self) {
            self.stopped.store(true, Ordering::SeqCst);
        }

        fn is_live(&self) -> bool {
            !self.stopped.load(Ordering::SeqCst)
        }

        fn on_ended(&mut self, _hook: EndedHook) {}
    }

    fn push(sink: &Arc<Mutex<Option<SampleSink>>>, samples: &[f32]) {
        let sink = sink.lock().clone().expect("stream not started");
        sink(samples, 48_000.0, 1);
    }

    #[test]
    fn first_connect_is_always_live() {
        let mut mixer = StreamMixer::new(48_000.0, false);
        let (stream, _, _) = FakeStream::new("mic", SourceKind::Microphone);

        let (_, edit) = mixer.connect(stream, SourceKind::Microphone).unwrap();
        assert_eq!(edit, GraphEdit::LivePatched);
    }

    #[test]
    fn second_connect_without_live_patch_requires_rebuild() {
        let mut mixer = StreamMixer::new(48_000.0, false);
        let (a, _, _) = FakeStream::new("mic", SourceKind::Microphone);
        let (b, _, _) = FakeStream::new("desktop", SourceKind::Desktop);

        mixer.connect(a, SourceKind::Microphone).unwrap();
        let before = mixer.output();
        let (_, edit) = mixer.connect(b, SourceKind::Desktop).unwrap();

        assert!(edit.requires_rebuild());
        assert_ne!(mixer.output(), before);
    }

    #[test]
    fn edits_with_live_patch_never_rebuild() {
        let mut mixer = StreamMixer::new(48_000.0, true);
        let (a, _, _) = FakeStream::new("mic", SourceKind::Microphone);
        let (b, _, _) = FakeStream::new("desktop", SourceKind::Desktop);

        let (handle, _) = mixer.connect(a, SourceKind::Microphone).unwrap();
        let (_, edit) = mixer.connect(b, SourceKind::Desktop).unwrap();
        assert_eq!(edit, GraphEdit::LivePatched);

        assert_eq!(mixer.disconnect(handle), GraphEdit::LivePatched);
        assert_eq!(mixer.output().generation, 0);
    }

    #[test]
    fn disconnect_stops_the_hardware_track() {
        let mut mixer = StreamMixer::new(48_000.0, true);
        let (stream, _, stopped) = FakeStream::new("mic", SourceKind::Microphone);

        let (handle, _) = mixer.connect(stream, SourceKind::Microphone).unwrap();
        mixer.disconnect(handle);

        assert!(stopped.load(Ordering::SeqCst));
    }

    #[test]
    fn removing_last_source_leaves_valid_silent_graph() {
        let mut mixer = StreamMixer::new(48_000.0, true);
        let (stream, sink, _) = FakeStream::new("mic", SourceKind::Microphone);

        let (handle, _) = mixer.connect(stream, SourceKind::Microphone).unwrap();
        push(&sink, &[0.5; 100]);
        mixer.disconnect(handle);

        assert!(mixer.is_empty());
        assert!(mixer.mix(100).is_empty());
        assert_eq!(mixer.output().generation, 0);
    }

    #[test]
    fn mix_sums_connected_sources() {
        let mut mixer = StreamMixer::new(48_000.0, true);
        let (a, sink_a, _) = FakeStream::new("mic", SourceKind::Microphone);
        let (b, sink_b, _) = FakeStream::new("desktop", SourceKind::Desktop);

        mixer.connect(a, SourceKind::Microphone).unwrap();
        mixer.connect(b, SourceKind::Desktop).unwrap();

        push(&sink_a, &[0.25, 0.25]);
        push(&sink_b, &[0.5, 0.5, 0.5]);

        // Longest input defines the frame count; shorter ones zero-pad.
        let mixed = mixer.mix(10);
        assert_eq!(mixed.len(), 3);
        assert!((mixed[0] - 0.75).abs() < 1e-6);
        assert!((mixed[2] - 0.5).abs() < 1e-6);
    }

    #[test]
    fn clear_stops_every_track() {
        let mut mixer = StreamMixer::new(48_000.0, true);
        let (a, _, stopped_a) = FakeStream::new("mic", SourceKind::Microphone);
        let (b, _, stopped_b) = FakeStream::new("desktop", SourceKind::Desktop);

        mixer.connect(a, SourceKind::Microphone).unwrap();
        mixer.connect(b, SourceKind::Desktop).unwrap();
        mixer.clear();

        assert!(stopped_a.load(Ordering::SeqCst));
        assert!(stopped_b.load(Ordering::SeqCst));
        assert!(mixer.is_empty());
    }

    #[test]
    fn handle_of_kind_finds_connected_source() {
        let mut mixer = StreamMixer::new(48_000.0, true);
        let (a, _, _) = FakeStream::new("mic", SourceKind::Microphone);

        let (handle, _) = mixer.connect(a, SourceKind::Microphone).unwrap();
        assert_eq!(mixer.handle_of_kind(SourceKind::Microphone), Some(handle));
        assert_eq!(mixer.handle_of_kind(SourceKind::Desktop), None);
    }
}
