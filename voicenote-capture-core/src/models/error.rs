use std::fmt;

use serde::Serialize;
use thiserror::Error;

use super::source::SourceKind;

/// A platform capability that may be absent at runtime.
///
/// Probed once at session start rather than checked ad hoc inside command
/// handlers, so every command sees a consistent capability set.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum Capability {
    AudioCapture,
    DesktopCapture,
    Pause,
    LivePatch,
}

impl fmt::Display for Capability {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Capability::AudioCapture => f.write_str("audio capture"),
            Capability::DesktopCapture => f.write_str("desktop capture"),
            Capability::Pause => f.write_str("pause"),
            Capability::LivePatch => f.write_str("live patch"),
        }
    }
}

/// Errors surfaced by capture operations.
#[derive(Debug, Error, Clone, PartialEq, Eq, Serialize)]
pub enum CaptureError {
    #[error("permission denied")]
    PermissionDenied,

    #[error("no usable audio input device")]
    NoDevice,

    #[error("platform lacks capability: {0}")]
    Unsupported(Capability),

    #[error("no supported audio encoder")]
    EncoderUnavailable,

    #[error("{0} source lost")]
    SourceLost(SourceKind),

    #[error("a capture session is already active")]
    SessionAlreadyActive,

    #[error("internal error: {0}")]
    Internal(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_names_the_missing_capability() {
        let err = CaptureError::Unsupported(Capability::Pause);
        assert_eq!(err.to_string(), "platform lacks capability: pause");
    }

    #[test]
    fn source_lost_names_the_kind() {
        let err = CaptureError::SourceLost(SourceKind::Desktop);
        assert_eq!(err.to_string(), "desktop source lost");
    }
}
