//! Pure-math sample manipulation: downmixing, resampling, source summation,
//! PCM conversion. No platform dependencies, no state.

/// Average interleaved multi-channel samples into mono, one sample per frame.
pub fn downmix_to_mono(samples: &[f32], channels: usize) -> Vec<f32> {
    if channels <= 1 {
        return samples.to_vec();
    }

    let frames = samples.len() / channels;
    let mut mono = Vec::with_capacity(frames);
    for frame in 0..frames {
        let sum: f32 = samples[frame * channels..(frame + 1) * channels].iter().sum();
        mono.push(sum / channels as f32);
    }
    mono
}

/// Linear-interpolation resampling for mono audio.
///
/// Returns the input unchanged when the rates already match.
pub fn resample(samples: &[f32], source_rate: f64, target_rate: f64) -> Vec<f32> {
    if (source_rate - target_rate).abs() < 0.01 || samples.is_empty() {
        return samples.to_vec();
    }

    let ratio = target_rate / source_rate;
    let output_count = (samples.len() as f64 * ratio) as usize;
    if output_count == 0 {
        return Vec::new();
    }

    let mut output = vec![0.0f32; output_count];
    for (i, sample) in output.iter_mut().enumerate() {
        let source_index = i as f64 / ratio;
        let index = source_index as usize;
        let fraction = (source_index - index as f64) as f32;

        if index + 1 < samples.len() {
            *sample = samples[index] * (1.0 - fraction) + samples[index + 1] * fraction;
        } else if index < samples.len() {
            *sample = samples[index];
        }
    }
    output
}

/// Sum mono sources into one output, zero-padding shorter inputs and
/// clamping the sum to [-1.0, 1.0].
pub fn mix(sources: &[&[f32]]) -> Vec<f32> {
    let frames = sources.iter().map(|s| s.len()).max().unwrap_or(0);
    if frames == 0 {
        return Vec::new();
    }

    let mut mixed = vec![0.0f32; frames];
    for source in sources {
        for (i, &sample) in source.iter().enumerate() {
            mixed[i] += sample;
        }
    }
    for sample in &mut mixed {
        *sample = sample.clamp(-1.0, 1.0);
    }
    mixed
}

/// Convert f32 samples [-1.0, 1.0] to 16-bit little-endian PCM bytes.
pub fn pcm16_bytes(samples: &[f32]) -> Vec<u8> {
    let mut data = Vec::with_capacity(samples.len() * 2);
    for &sample in samples {
        let clamped = sample.clamp(-1.0, 1.0);
        let value = (clamped * i16::MAX as f32) as i16;
        data.extend_from_slice(&value.to_le_bytes());
    }
    data
}

#[cfg(test)]
mod tests {
    use approx::assert_relative_eq;

    use super::*;

    #[test]
    fn downmix_averages_channels() {
        let stereo = [0.2, 0.4, -0.6, -0.2];
        let mono = downmix_to_mono(&stereo, 2);

        assert_eq!(mono.len(), 2);
        assert_relative_eq!(mono[0], 0.3, epsilon = 1e-6);
        assert_relative_eq!(mono[1], -0.4, epsilon = 1e-6);
    }

    #[test]
    fn downmix_mono_is_passthrough() {
        let samples = vec![0.1, 0.2];
        assert_eq!(downmix_to_mono(&samples, 1), samples);
    }

    #[test]
    fn resample_same_rate_is_passthrough() {
        let samples = vec![1.0, 2.0, 3.0];
        assert_eq!(resample(&samples, 48_000.0, 48_000.0), samples);
    }

    #[test]
    fn resample_upsample_interpolates() {
        let result = resample(&[0.0, 1.0], 24_000.0, 48_000.0);

        assert_eq!(result.len(), 4);
        assert_relative_eq!(result[0], 0.0, epsilon = 0.01);
        assert_relative_eq!(result[1], 0.5, epsilon = 0.1);
    }

    #[test]
    fn resample_downsample_halves() {
        let samples: Vec<f32> = (0..100).map(|i| i as f32 / 100.0).collect();
        assert_eq!(resample(&samples, 48_000.0, 24_000.0).len(), 50);
    }

    #[test]
    fn mix_sums_and_zero_pads() {
        let a = [0.25, 0.25, 0.25];
        let b = [0.5];
        let mixed = mix(&[&a, &b]);

        assert_eq!(mixed.len(), 3);
        assert_relative_eq!(mixed[0], 0.75, epsilon = 1e-6);
        assert_relative_eq!(mixed[1], 0.25, epsilon = 1e-6);
    }

    #[test]
    fn mix_clamps_the_sum() {
        let a = [0.8, -0.8];
        let b = [0.8, -0.8];
        let mixed = mix(&[&a, &b]);

        assert_eq!(mixed, vec![1.0, -1.0]);
    }

    #[test]
    fn mix_of_nothing_is_empty() {
        assert!(mix(&[]).is_empty());
    }

    #[test]
    fn pcm16_full_scale() {
        let pcm = pcm16_bytes(&[0.0, 1.0, -1.0]);

        assert_eq!(pcm.len(), 6);
        assert_eq!(i16::from_le_bytes([pcm[0], pcm[1]]), 0);
        assert_eq!(i16::from_le_bytes([pcm[2], pcm[3]]), i16::MAX);
        assert_eq!(i16::from_le_bytes([pcm[4], pcm[5]]), -i16::MAX);
    }

    #[test]
    fn pcm16_clamps_out_of_range() {
        let pcm = pcm16_bytes(&[2.0]);
        assert_eq!(i16::from_le_bytes([pcm[0], pcm[1]]), i16::MAX);
    }
}
