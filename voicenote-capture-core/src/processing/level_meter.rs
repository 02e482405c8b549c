use std::f64::consts::PI;

/// Band centers (Hz) analyzed per window, spanning the speech range.
const BANDS_HZ: [f64; 8] = [
    125.0, 250.0, 500.0, 1000.0, 2000.0, 3000.0, 4000.0, 6000.0,
];

/// Gain applied to the peak band amplitude so a full-scale tone pins the
/// meter at 1.0.
const METER_GAIN: f32 = 255.0 / 128.0;

/// Fixed-window frequency-domain loudness meter.
///
/// Mixed frames accumulate into an analysis window; each full window is
/// reduced to per-band amplitudes (Goertzel) and the peak band, scaled and
/// clamped, becomes the normalized level in [0, 1]. The level holds its
/// last value between windows and resets to 0 on `reset`.
pub struct LevelMeter {
    window: Vec<f32>,
    window_size: usize,
    sample_rate: f64,
    level: f32,
}

impl LevelMeter {
    pub fn new(window_size: usize, sample_rate: f64) -> Self {
        Self {
            window: Vec::with_capacity(window_size),
            window_size,
            sample_rate,
            level: 0.0,
        }
    }

    /// Feed mixed frames and return the current level.
    pub fn process(&mut self, frames: &[f32]) -> f32 {
        for &sample in frames {
            self.window.push(sample);
            if self.window.len() == self.window_size {
                self.level = Self::analyze(&self.window, self.sample_rate);
                self.window.clear();
            }
        }
        self.level
    }

    pub fn level(&self) -> f32 {
        self.level
    }

    /// Drop any partial window and zero the level.
    pub fn reset(&mut self) {
        self.window.clear();
        self.level = 0.0;
    }

    fn analyze(window: &[f32], sample_rate: f64) -> f32 {
        let peak = BANDS_HZ
            .iter()
            .map(|&freq| goertzel_amplitude(window, freq, sample_rate))
            .fold(0.0f32, f32::max);
        (peak * METER_GAIN).min(1.0)
    }
}

/// Amplitude of the sinusoid component nearest `freq_hz`, via the Goertzel
/// recurrence. Returns ~1.0 for a full-scale tone at the matched bin.
fn goertzel_amplitude(samples: &[f32], freq_hz: f64, sample_rate: f64) -> f32 {
    let n = samples.len();
    if n == 0 || sample_rate <= 0.0 {
        return 0.0;
    }

    let k = (n as f64 * freq_hz / sample_rate).round();
    let omega = 2.0 * PI * k / n as f64;
    let coeff = 2.0 * omega.cos();

    let mut s1 = 0.0f64;
    let mut s2 = 0.0f64;
    for &sample in samples {
        let s0 = sample as f64 + coeff * s1 - s2;
        s2 = s1;
        s1 = s0;
    }

    let power = s1 * s1 + s2 * s2 - coeff * s1 * s2;
    (power.max(0.0).sqrt() * 2.0 / n as f64) as f32
}
