use std::time::Duration;

/// Codec preference order probed at session start; the first supported entry
/// wins, falling back to the encoder factory's default when none match.
pub const DEFAULT_MIME_PREFERENCE: &[&str] = &[
    "audio/webm",
    "audio/webm;codecs=opus",
    "audio/ogg;codecs=opus",
    "audio/mp4",
];

/// Configuration for one capture session.
#[derive(Debug, Clone)]
pub struct SessionOptions {
    /// Microphone to capture from, or `None` for the platform default.
    pub device_id: Option<String>,

    /// Acquire the desktop/system-audio source at start.
    pub desktop_capture: bool,

    /// Mix graph sample rate in Hz (default: 48000).
    pub sample_rate: f64,

    /// Encoded chunk emission interval (default: 100 ms).
    pub timeslice: Duration,

    /// Codec preference order, most preferred first.
    pub mime_preference: Vec<String>,

    /// Level meter analysis window in samples (default: 256).
    pub analysis_window: usize,
}

impl SessionOptions {
    pub fn validate(&self) -> Result<(), String> {
        if self.sample_rate <= 0.0 {
            return Err("sample rate must be positive".into());
        }
        if self.timeslice.is_zero() {
            return Err("timeslice must be positive".into());
        }
        if self.analysis_window == 0 {
            return Err("analysis window must be positive".into());
        }
        Ok(())
    }
}

impl Default for SessionOptions {
    fn default() -> Self {
        Self {
            device_id: None,
            desktop_capture: false,
            sample_rate: 48_000.0,
            timeslice: Duration::from_millis(100),
            mime_preference: DEFAULT_MIME_PREFERENCE
                .iter()
                .map(|m| m.to_string())
                .collect(),
            analysis_window: 256,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_options_are_valid() {
        assert!(SessionOptions::default().validate().is_ok());
    }

    #[test]
    fn rejects_zero_timeslice() {
        let options = SessionOptions {
            timeslice: Duration::ZERO,
            ..SessionOptions::default()
        };
        assert!(options.validate().is_err());
    }
}
