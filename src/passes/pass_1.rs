//! Pass 1: Spectral Pitch Estimation
//!
//! Produces one `PitchObservation` per STFT frame. Frame size and hop are
//! fixed by `PitchConfig` (defaults 1024/256 samples) so repeated runs see
//! identical frames.

use crate::analysis::PitchObservation;
use crate::audio::{rms, AnalysisState};
use crate::config::{Config, PitchConfig, PitchMethod};
use crate::error::{Result as TranscriptionResult, TranscriptionError};
use crate::spectral::{magnitude_spectrogram, stft};

/// Estimate the dominant pitch of every frame of a conditioned mono signal
///
/// Frames below the energy floor, or without a spectral candidate inside
/// the configured frequency range, are reported with `frequency_hz = 0`.
pub fn estimate(samples: &[f32], sample_rate: u32, config: &PitchConfig) -> Vec<PitchObservation> {
    if samples.is_empty() || sample_rate == 0 {
        return Vec::new();
    }

    let frame_size = config.frame_size.max(2);
    let hop_size = config.hop_size.max(1);

    let stft_data = stft(samples, frame_size, hop_size, sample_rate);
    let mag_spec = magnitude_spectrogram(&stft_data);
    let bin_hz = sample_rate as f32 / frame_size as f32;
    let (min_bin, max_bin) = search_range(config, bin_hz, stft_data.n_bins());
    let half = frame_size / 2;

    let mut observations = Vec::with_capacity(stft_data.n_frames());

    for frame_idx in 0..stft_data.n_frames() {
        let timestamp_s = stft_data.times[frame_idx];
        let center = frame_idx * hop_size;
        let start = center.saturating_sub(half);
        let end = (center + half).min(samples.len());

        if rms(&samples[start..end]) < config.energy_floor || min_bin > max_bin {
            observations.push(PitchObservation::unvoiced(frame_idx, timestamp_s));
            continue;
        }

        let column: Vec<f32> = mag_spec.column(frame_idx).to_vec();
        let peak_bin = match config.method {
            PitchMethod::SpectralPeak => pick_peak(&column, min_bin, max_bin),
            PitchMethod::HarmonicProduct => {
                let hps = harmonic_product_spectrum(&column, config.harmonics);
                pick_peak(&hps, min_bin, max_bin.min(hps.len().saturating_sub(1)))
            }
        };

        let observation = peak_bin.and_then(|bin| {
            let amplitude = 2.0 * column[bin] / stft_data.window_sum;
            let frequency_hz = (bin as f32 + interpolate_peak(&column, bin)) * bin_hz;
            if amplitude < config.energy_floor || !amplitude.is_finite() || !frequency_hz.is_finite() {
                None
            } else {
                Some(PitchObservation {
                    frame_index: frame_idx,
                    frequency_hz,
                    magnitude: amplitude,
                    timestamp_s,
                })
            }
        });

        observations.push(observation.unwrap_or_else(|| PitchObservation::unvoiced(frame_idx, timestamp_s)));
    }

    normalize_magnitudes(&mut observations, config.normalize_magnitude);
    observations
}

/// Inclusive bin range searched for a pitch candidate
///
/// Bin 0 (DC) and the last bin are never candidates: interpolation needs a
/// neighbour on each side.
fn search_range(config: &PitchConfig, bin_hz: f32, n_bins: usize) -> (usize, usize) {
    let min_bin = ((config.min_frequency_hz / bin_hz).ceil() as usize).max(1);
    let max_bin = ((config.max_frequency_hz / bin_hz).floor() as usize).min(n_bins.saturating_sub(2));
    (min_bin, max_bin)
}

/// Index of the largest value in `values[min_bin..=max_bin]`
///
/// Ties resolve to the lowest frequency. Returns `None` for an empty range
/// or an all-zero spectrum.
pub fn pick_peak(values: &[f32], min_bin: usize, max_bin: usize) -> Option<usize> {
    if values.is_empty() || min_bin > max_bin || min_bin >= values.len() {
        return None;
    }
    let max_bin = max_bin.min(values.len() - 1);

    let mut best: Option<(usize, f32)> = None;
    for (bin, &value) in values.iter().enumerate().take(max_bin + 1).skip(min_bin) {
        if !value.is_finite() || value <= 0.0 {
            continue;
        }
        match best {
            Some((_, best_value)) if value <= best_value => {}
            _ => best = Some((bin, value)),
        }
    }
    best.map(|(bin, _)| bin)
}

/// Harmonic product spectrum: `hps[k] = prod_h mags[k * h]`
///
/// Only bins whose highest harmonic is still inside the spectrum are kept.
pub fn harmonic_product_spectrum(mags: &[f32], harmonics: usize) -> Vec<f32> {
    let harmonics = harmonics.max(1);
    let len = (mags.len() + harmonics - 1) / harmonics;
    (0..len)
        .map(|k| {
            (1..=harmonics)
                .map(|h| mags.get(k * h).copied().unwrap_or(0.0))
                .product::<f32>()
        })
        .collect()
}

/// Fractional bin offset of a spectral peak from parabolic interpolation
/// on log magnitudes, in [-0.5, 0.5]
pub fn interpolate_peak(mags: &[f32], bin: usize) -> f32 {
    if bin == 0 || bin + 1 >= mags.len() {
        return 0.0;
    }
    let alpha = (mags[bin - 1] + 1e-12).ln();
    let beta = (mags[bin] + 1e-12).ln();
    let gamma = (mags[bin + 1] + 1e-12).ln();

    let denom = alpha - 2.0 * beta + gamma;
    if denom.abs() < 1e-12 || !denom.is_finite() {
        return 0.0;
    }
    (0.5 * (alpha - gamma) / denom).clamp(-0.5, 0.5)
}

/// Scale voiced magnitudes into [0, 1]
///
/// With normalization the loudest frame becomes 1.0; without it magnitudes
/// are only clipped. An all-unvoiced sequence is left alone.
fn normalize_magnitudes(observations: &mut [PitchObservation], normalize: bool) {
    let max_magnitude = observations
        .iter()
        .map(|o| o.magnitude)
        .fold(0.0f32, f32::max);

    if max_magnitude <= 0.0 {
        return;
    }

    let scale = if normalize { 1.0 / max_magnitude } else { 1.0 };
    for observation in observations.iter_mut() {
        observation.magnitude = (observation.magnitude * scale).clamp(0.0, 1.0);
    }
}

pub fn run(state: &mut AnalysisState, config: &Config) -> TranscriptionResult<()> {
    log::info!("Pass 1: Spectral Pitch Estimation");

    let samples = state.conditioned.as_ref().ok_or_else(|| {
        TranscriptionError::ProcessingPipelineError(
            "Pass 1 requires conditioned audio from Pass 0".to_string(),
        )
    })?;

    let observations = estimate(samples, state.sample_rate(), &config.pitch);
    let voiced = observations.iter().filter(|o| o.is_voiced()).count();

    log::debug!(
        "  {} frames ({} voiced), frame {} / hop {} samples, {:?}",
        observations.len(),
        voiced,
        config.pitch.frame_size,
        config.pitch.hop_size,
        config.pitch.method
    );

    state.frame_duration_s = if state.sample_rate() == 0 {
        0.0
    } else {
        config.pitch.hop_size.max(1) as f32 / state.sample_rate() as f32
    };
    state.observations = observations;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pick_peak_prefers_lowest_frequency_on_ties() {
        let mags = vec![0.0, 1.0, 3.0, 0.5, 3.0, 1.0];
        assert_eq!(pick_peak(&mags, 1, 4), Some(2));
        assert_eq!(pick_peak(&mags, 3, 5), Some(4));
    }

    #[test]
    fn test_pick_peak_on_empty_or_silent_spectrum() {
        assert_eq!(pick_peak(&[], 1, 4), None);
        assert_eq!(pick_peak(&[0.0; 8], 1, 6), None);
        assert_eq!(pick_peak(&[1.0; 8], 5, 2), None);
    }

    #[test]
    fn test_interpolate_peak_symmetry() {
        assert_eq!(interpolate_peak(&[1.0, 4.0, 1.0], 1), 0.0);
        assert!(interpolate_peak(&[1.0, 4.0, 3.0], 1) > 0.0);
        assert!(interpolate_peak(&[3.0, 4.0, 1.0], 1) < 0.0);
        assert_eq!(interpolate_peak(&[4.0, 1.0], 0), 0.0);
    }

    #[test]
    fn test_harmonic_product_spectrum() {
        // Fundamental at bin 2 with harmonics at 4 and 6
        let mut mags = vec![0.1; 12];
        mags[2] = 1.0;
        mags[4] = 1.2; // second harmonic louder than the fundamental
        mags[6] = 0.6;

        let hps = harmonic_product_spectrum(&mags, 3);
        assert_eq!(hps.len(), 4);
        assert_eq!(pick_peak(&hps, 1, 3), Some(2));
        assert_eq!(pick_peak(&mags, 1, 10), Some(4));
    }

    #[test]
    fn test_normalize_magnitudes() {
        let mut obs = vec![
            PitchObservation { frame_index: 0, frequency_hz: 100.0, magnitude: 0.2, timestamp_s: 0.0 },
            PitchObservation { frame_index: 1, frequency_hz: 100.0, magnitude: 0.4, timestamp_s: 0.1 },
            PitchObservation::unvoiced(2, 0.2),
        ];
        normalize_magnitudes(&mut obs, true);
        assert!((obs[0].magnitude - 0.5).abs() < 1e-6);
        assert!((obs[1].magnitude - 1.0).abs() < 1e-6);
        assert_eq!(obs[2].magnitude, 0.0);
    }
}
