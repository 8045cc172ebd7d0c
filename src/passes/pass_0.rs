//! Pass 0: Signal Conditioning
//!
//! Mono-izes, denoises and band-limits the caller's buffer. The result is a
//! new buffer of the same length (in sample frames); the input is untouched.

use crate::audio::{percentile, AnalysisState, AudioBuffer};
use crate::config::{ConditioningConfig, Config, DenoiseConfig, DenoiseMode};
use crate::error::Result as TranscriptionResult;
use crate::spectral::band_pass;

/// Condition a raw buffer for pitch estimation
pub fn condition(input: &AudioBuffer, config: &ConditioningConfig) -> Vec<f32> {
    let mono = downmix(&input.samples, input.channels);
    let denoised = denoise(&mono, &config.denoise);

    if !config.band_pass_enabled {
        return denoised;
    }

    let (low_hz, high_hz) = effective_band(config, input.sample_rate);
    let nyquist = input.sample_rate as f32 / 2.0;
    if low_hz <= 0.0 && high_hz >= nyquist {
        log::debug!("  Band-pass covers the full spectrum, skipping");
        return denoised;
    }

    band_pass(&denoised, input.sample_rate, low_hz, high_hz)
}

/// Average interleaved channels sample-wise
///
/// Non-finite samples are replaced by silence and the result is clipped to
/// [-1, 1]. A trailing partial frame is dropped.
pub fn downmix(samples: &[f32], channels: u16) -> Vec<f32> {
    let channels = channels.max(1) as usize;
    samples
        .chunks_exact(channels)
        .map(|frame| {
            let sum: f32 = frame
                .iter()
                .map(|&x| if x.is_finite() { x } else { 0.0 })
                .sum();
            (sum / channels as f32).clamp(-1.0, 1.0)
        })
        .collect()
}

/// Apply the configured denoising policy
pub fn denoise(samples: &[f32], config: &DenoiseConfig) -> Vec<f32> {
    match config.mode {
        DenoiseMode::Off => samples.to_vec(),
        DenoiseMode::Fixed => fixed_threshold_denoise(samples, config.denoise_threshold),
        DenoiseMode::Adaptive => {
            adaptive_denoise(samples, config.noise_percentile, config.strength)
        }
    }
}

/// Zero every sample whose magnitude is below `threshold`
pub fn fixed_threshold_denoise(samples: &[f32], threshold: f32) -> Vec<f32> {
    samples
        .iter()
        .map(|&x| if x.abs() < threshold { 0.0 } else { x })
        .collect()
}

/// Estimate the noise floor of a signal
///
/// The floor is the mean magnitude of the samples at or below the given
/// percentile of |x|. Returns 0 for empty or silent input.
pub fn estimate_noise_floor(samples: &[f32], noise_percentile: f32) -> f32 {
    if samples.is_empty() {
        return 0.0;
    }

    let magnitudes: Vec<f32> = samples.iter().map(|x| x.abs()).collect();
    let gate = percentile(&magnitudes, noise_percentile);

    let (sum, count) = magnitudes
        .iter()
        .filter(|&&m| m <= gate)
        .fold((0.0f32, 0usize), |(s, c), &m| (s + m, c + 1));

    if count == 0 {
        0.0
    } else {
        sum / count as f32
    }
}

/// Subtract the estimated noise floor from each sample's magnitude
///
/// Samples keep their sign; magnitudes never go negative and the output is
/// clipped to [-1, 1].
pub fn adaptive_denoise(samples: &[f32], noise_percentile: f32, strength: f32) -> Vec<f32> {
    let floor = estimate_noise_floor(samples, noise_percentile) * strength;
    if floor <= 0.0 {
        return samples.to_vec();
    }

    log::debug!("  Adaptive noise floor: {:.6}", floor);

    samples
        .iter()
        .map(|&x| {
            let reduced = (x.abs() - floor).max(0.0);
            (reduced * x.signum()).clamp(-1.0, 1.0)
        })
        .collect()
}

/// Band limits after clamping to what the sample rate can represent
pub fn effective_band(config: &ConditioningConfig, sample_rate: u32) -> (f32, f32) {
    let nyquist = sample_rate as f32 / 2.0;
    // NaN would make `clamp` panic on the low side
    let high = if config.high_cut_hz.is_nan() {
        nyquist
    } else {
        config.high_cut_hz.clamp(0.0, nyquist)
    };
    let low = if config.low_cut_hz.is_nan() {
        0.0
    } else {
        config.low_cut_hz.clamp(0.0, high)
    };
    if high < config.high_cut_hz {
        log::debug!(
            "  high_cut_hz {} above Nyquist, using {}",
            config.high_cut_hz,
            high
        );
    }
    (low, high)
}

pub fn run(state: &mut AnalysisState, config: &Config) -> TranscriptionResult<()> {
    log::info!("Pass 0: Signal Conditioning");

    let conditioned = condition(&state.input, &config.conditioning);

    log::debug!(
        "  {} channel(s) -> {} mono samples, denoise {:?}",
        state.input.channels,
        conditioned.len(),
        config.conditioning.denoise.mode
    );

    state.conditioned = Some(conditioned);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_downmix_averages_channels() {
        let stereo = vec![1.0, 0.0, 0.5, 0.5, -1.0, 0.0];
        assert_eq!(downmix(&stereo, 2), vec![0.5, 0.5, -0.5]);
        assert_eq!(downmix(&[0.3, f32::NAN], 1), vec![0.3, 0.0]);
    }

    #[test]
    fn test_fixed_threshold_zeroes_small_samples() {
        let out = fixed_threshold_denoise(&[0.01, -0.5, -0.019, 0.02], 0.02);
        assert_eq!(out, vec![0.0, -0.5, 0.0, 0.02]);
    }

    #[test]
    fn test_noise_floor_of_silence_is_zero() {
        assert_eq!(estimate_noise_floor(&[], 25.0), 0.0);
        assert_eq!(estimate_noise_floor(&vec![0.0; 64], 25.0), 0.0);
    }

    #[test]
    fn test_adaptive_denoise_subtracts_floor() {
        // Quarter of the samples sit at the 0.1 noise level
        let mut samples = vec![0.1, -0.1, 0.1, -0.1];
        samples.extend(vec![0.9; 4]);
        samples.extend(vec![-0.9; 4]);
        samples.extend(vec![0.5; 4]);

        let out = adaptive_denoise(&samples, 25.0, 1.0);
        assert!(out[..4].iter().all(|&x| x.abs() < 1e-6));
        assert!((out[4] - 0.8).abs() < 1e-6);
        assert!((out[8] + 0.8).abs() < 1e-6);
        assert!((out[12] - 0.4).abs() < 1e-6);
    }

    #[test]
    fn test_effective_band_clamps_to_nyquist() {
        let config = ConditioningConfig {
            low_cut_hz: 30000.0,
            high_cut_hz: 40000.0,
            ..ConditioningConfig::default()
        };
        assert_eq!(effective_band(&config, 44100), (22050.0, 22050.0));
    }

    #[test]
    fn test_non_finite_cutoffs_fall_back_to_full_band() {
        let config = ConditioningConfig {
            low_cut_hz: f32::NAN,
            high_cut_hz: f32::NAN,
            ..ConditioningConfig::default()
        };
        assert_eq!(effective_band(&config, 44100), (0.0, 22050.0));

        let config = ConditioningConfig {
            low_cut_hz: f32::NEG_INFINITY,
            high_cut_hz: f32::INFINITY,
            ..ConditioningConfig::default()
        };
        assert_eq!(effective_band(&config, 44100), (0.0, 22050.0));

        let raw = AudioBuffer::mono(vec![0.1; 64], 44100);
        let config = ConditioningConfig {
            high_cut_hz: f32::NAN,
            ..ConditioningConfig::default()
        };
        let out = condition(&raw, &config);
        assert_eq!(out.len(), 64);
        assert!(out.iter().all(|x| x.is_finite()));
    }
}
