use serde::{Deserialize, Serialize};

use super::artifact::ArtifactMetadata;
use super::error::CaptureError;

/// Observable capture session states.
///
/// State transitions:
/// ```text
/// idle → recording ↔ paused
///           ↓          ↓
///           └──── stopped ──→ (idle on next start)
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionState {
    Idle,
    Recording,
    Paused,
    Stopped,
}

impl SessionState {
    pub fn is_idle(&self) -> bool {
        matches!(self, Self::Idle)
    }

    pub fn is_recording(&self) -> bool {
        matches!(self, Self::Recording)
    }

    pub fn is_paused(&self) -> bool {
        matches!(self, Self::Paused)
    }

    pub fn is_stopped(&self) -> bool {
        matches!(self, Self::Stopped)
    }

    /// Whether an encoder instance is live (recording or paused).
    pub fn is_active(&self) -> bool {
        matches!(self, Self::Recording | Self::Paused)
    }
}

/// Observable session state for UI binding.
#[derive(Debug, Clone, Serialize)]
pub struct SessionSnapshot {
    pub state: SessionState,
    pub elapsed_seconds: f64,
    pub selected_device_id: Option<String>,
    pub desktop_capture_enabled: bool,
    /// Normalized loudness of the mixed output, 0.0–1.0.
    pub level: f32,
    pub last_error: Option<CaptureError>,
    pub artifact: Option<ArtifactMetadata>,
}

/// Counters for debugging capture sessions.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct SessionDiagnostics {
    pub chunks_captured: u64,
    pub bytes_captured: u64,
    pub encoder_rotations: u32,
    pub source_events: u64,
}
