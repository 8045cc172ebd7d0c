//! Validation tests for Pass 0: Signal Conditioning

use mono2midi::audio::{AnalysisState, AudioBuffer};
use mono2midi::config::{ConditioningConfig, Config, DenoiseConfig, DenoiseMode};
use mono2midi::passes::pass_0;
use rand::{rngs::StdRng, Rng, SeedableRng};
use std::f32::consts::PI;

/// Generate a sine tone
fn sine(freq_hz: f32, amplitude: f32, n_samples: usize, sr: u32) -> Vec<f32> {
    (0..n_samples)
        .map(|i| amplitude * (2.0 * PI * freq_hz * i as f32 / sr as f32).sin())
        .collect()
}

/// Seeded white noise in [-level, level]
fn noise(level: f32, n_samples: usize, seed: u64) -> Vec<f32> {
    let mut rng = StdRng::seed_from_u64(seed);
    (0..n_samples).map(|_| rng.gen_range(-level..=level)).collect()
}

fn config_with(mode: DenoiseMode, band_pass_enabled: bool) -> ConditioningConfig {
    ConditioningConfig {
        band_pass_enabled,
        denoise: DenoiseConfig {
            mode,
            ..DenoiseConfig::default()
        },
        ..ConditioningConfig::default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_output_length_matches_input_frames() {
        let sr = 44100;
        let mut stereo = Vec::new();
        for s in sine(440.0, 0.5, 10_000, sr) {
            stereo.push(s);
            stereo.push(-s * 0.5);
        }
        let buffer = AudioBuffer::interleaved(stereo, 2, sr);

        for mode in [DenoiseMode::Off, DenoiseMode::Fixed, DenoiseMode::Adaptive] {
            let out = pass_0::condition(&buffer, &config_with(mode, true));
            assert_eq!(out.len(), 10_000);
            assert!(out.iter().all(|x| x.is_finite() && x.abs() <= 1.0));
        }
    }

    #[test]
    fn test_silence_is_a_no_op() {
        let buffer = AudioBuffer::mono(vec![0.0; 8192], 44100);
        for mode in [DenoiseMode::Off, DenoiseMode::Fixed, DenoiseMode::Adaptive] {
            let out = pass_0::condition(&buffer, &config_with(mode, true));
            assert_eq!(out.len(), 8192);
            assert!(out.iter().all(|&x| x == 0.0));
        }
    }

    #[test]
    fn test_empty_buffer() {
        let buffer = AudioBuffer::mono(Vec::new(), 44100);
        assert!(pass_0::condition(&buffer, &ConditioningConfig::default()).is_empty());
    }

    #[test]
    fn test_band_pass_removes_out_of_band_tone() {
        let sr = 44100;
        // Whole cycles over one second so both tones sit on exact bins
        let low = sine(200.0, 0.4, sr as usize, sr);
        let high = sine(8000.0, 0.4, sr as usize, sr);
        let mixed: Vec<f32> = low.iter().zip(&high).map(|(a, b)| a + b).collect();

        let config = ConditioningConfig {
            low_cut_hz: 20.0,
            high_cut_hz: 1000.0,
            ..config_with(DenoiseMode::Off, true)
        };
        let out = pass_0::condition(&AudioBuffer::mono(mixed, sr), &config);

        let max_error = out
            .iter()
            .zip(&low)
            .map(|(a, b)| (a - b).abs())
            .fold(0.0f32, f32::max);
        assert!(max_error < 1e-2, "max error {}", max_error);
    }

    #[test]
    fn test_fixed_threshold_silences_low_level_noise() {
        let buffer = AudioBuffer::mono(noise(0.01, 4096, 7), 44100);
        let out = pass_0::condition(&buffer, &config_with(DenoiseMode::Fixed, false));
        assert!(out.iter().all(|&x| x == 0.0));
    }

    #[test]
    fn test_adaptive_denoise_lowers_noise_energy() {
        let sr = 44100;
        let mut samples = noise(0.02, sr as usize, 42);
        for (s, t) in samples.iter_mut().zip(sine(440.0, 0.5, sr as usize, sr)).skip(sr as usize / 2) {
            *s += t;
        }
        let buffer = AudioBuffer::mono(samples.clone(), sr);
        let out = pass_0::condition(&buffer, &config_with(DenoiseMode::Adaptive, false));

        let half = sr as usize / 2;
        let energy = |x: &[f32]| x.iter().map(|v| v * v).sum::<f32>();
        assert!(energy(&out[..half]) < energy(&samples[..half]) * 0.6);
        assert!(energy(&out[half..]) > energy(&samples[half..]) * 0.5);
    }

    #[test]
    fn test_run_keeps_caller_buffer() {
        let samples = sine(440.0, 0.5, 4096, 44100);
        let mut state = AnalysisState::from_samples(samples.clone(), 44100);
        pass_0::run(&mut state, &Config::default()).unwrap();

        assert_eq!(state.input.samples, samples);
        assert_eq!(state.conditioned.as_ref().map(|c| c.len()), Some(4096));
    }
}
