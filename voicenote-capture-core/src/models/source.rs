use std::fmt;

use serde::{Deserialize, Serialize};

/// Sentinel identity for the synthetic desktop/system-audio source.
pub const DESKTOP_SOURCE_ID: &str = "desktop";

/// Kind of audio-producing endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SourceKind {
    Microphone,
    Desktop,
}

impl fmt::Display for SourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SourceKind::Microphone => f.write_str("microphone"),
            SourceKind::Desktop => f.write_str("desktop"),
        }
    }
}

/// An audio endpoint as reported by the device catalog.
///
/// Catalog entries carry identity only; the live stream handle is acquired
/// separately (and exclusively) by whoever captures from the source.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AudioSourceInfo {
    pub id: String,
    pub label: String,
    pub kind: SourceKind,
    pub is_default: bool,
}

impl AudioSourceInfo {
    /// The single synthetic desktop-audio entry appended by the catalog when
    /// the platform supports display capture.
    pub fn desktop() -> Self {
        Self {
            id: DESKTOP_SOURCE_ID.to_string(),
            label: "Desktop audio".to_string(),
            kind: SourceKind::Desktop,
            is_default: false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn desktop_entry_uses_sentinel_id() {
        let desktop = AudioSourceInfo::desktop();
        assert_eq!(desktop.id, DESKTOP_SOURCE_ID);
        assert_eq!(desktop.kind, SourceKind::Desktop);
        assert!(!desktop.is_default);
    }

    #[test]
    fn kind_serializes_lowercase() {
        assert_eq!(
            serde_json::to_string(&SourceKind::Microphone).unwrap(),
            "\"microphone\""
        );
    }
}
