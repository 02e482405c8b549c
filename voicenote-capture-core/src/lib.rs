//! Platform-agnostic audio capture engine for voice notes.
//!
//! The engine turns one or more live audio sources (a microphone and,
//! optionally, desktop/system audio) into a single encoded recording:
//!
//! - [`DeviceCatalog`] enumerates capturable sources and re-enumerates on
//!   hot-plug;
//! - [`StreamMixer`] combines live sources into one output, reporting
//!   whether each graph edit could be applied in place;
//! - [`CaptureSession`] drives the recording state machine
//!   (idle/recording/paused/stopped) over the mixer and an encoder;
//! - [`LevelMeter`] derives a normalized loudness from the mixed frames;
//! - [`ArtifactStore`] assembles the encoded chunks into a revocable
//!   in-memory recording.
//!
//! Platform backends plug in through the [`traits`] module; this crate
//! never touches audio hardware itself.

pub mod catalog;
pub mod mixer;
pub mod models;
pub mod processing;
pub mod session;
pub mod storage;
pub mod traits;

pub use catalog::{CatalogListener, DeviceCatalog};
pub use mixer::{GraphEdit, MixerOutput, SourceHandle, StreamMixer};
pub use models::artifact::{ArtifactMetadata, ArtifactRef, EncodedChunk};
pub use models::config::{SessionOptions, DEFAULT_MIME_PREFERENCE};
pub use models::error::{Capability, CaptureError};
pub use models::source::{AudioSourceInfo, SourceKind, DESKTOP_SOURCE_ID};
pub use models::state::{SessionDiagnostics, SessionSnapshot, SessionState};
pub use processing::level_meter::LevelMeter;
pub use session::{CaptureSession, SessionCapabilities};
pub use storage::ArtifactStore;
