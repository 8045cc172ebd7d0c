//! Spectral processing utilities (STFT, band-pass filtering, pitch units)

use ndarray::Array2;
use rustfft::{num_complex::Complex32, FftPlanner};

/// STFT data structure
///
/// `s` is laid out `[frequency_bin, frame]`. Frame `i` is centred on sample
/// `i * hop_length` of the unpadded signal, so `times[i] = i * hop / sr`.
#[derive(Debug, Clone)]
pub struct StftData {
    pub s: Array2<Complex32>,
    pub freqs: Vec<f32>,
    pub times: Vec<f32>,
    /// Sum of the analysis window, used to turn bin magnitudes into amplitudes
    pub window_sum: f32,
}

impl StftData {
    pub fn n_frames(&self) -> usize {
        self.s.shape()[1]
    }

    pub fn n_bins(&self) -> usize {
        self.s.shape()[0]
    }
}

/// Compute a centred STFT of a mono signal
///
/// The signal is zero-padded by `n_fft / 2` on both sides. One frame is
/// produced per hop that starts inside the signal; an empty signal yields
/// zero frames.
pub fn stft(y: &[f32], n_fft: usize, hop_length: usize, sample_rate: u32) -> StftData {
    let hop_length = hop_length.max(1);
    let n_bins = n_fft / 2 + 1;
    let n_frames = if y.is_empty() {
        0
    } else {
        (y.len() - 1) / hop_length + 1
    };

    let window = hann_window(n_fft);
    let window_sum: f32 = window.iter().sum();
    let mut s = Array2::<Complex32>::zeros((n_bins, n_frames));

    let mut planner = FftPlanner::new();
    let fft = planner.plan_fft_forward(n_fft);
    let half = (n_fft / 2) as isize;
    let mut frame = vec![Complex32::new(0.0, 0.0); n_fft];

    for frame_idx in 0..n_frames {
        let center = (frame_idx * hop_length) as isize;
        for (i, slot) in frame.iter_mut().enumerate() {
            let src = center - half + i as isize;
            let sample = if src >= 0 && (src as usize) < y.len() {
                y[src as usize]
            } else {
                0.0
            };
            *slot = Complex32::new(sample * window[i], 0.0);
        }

        fft.process(&mut frame);

        for (bin, &val) in frame[..n_bins].iter().enumerate() {
            s[[bin, frame_idx]] = val;
        }
    }

    let freqs: Vec<f32> = (0..n_bins)
        .map(|i| i as f32 * sample_rate as f32 / n_fft as f32)
        .collect();

    let times: Vec<f32> = (0..n_frames)
        .map(|i| (i * hop_length) as f32 / sample_rate as f32)
        .collect();

    StftData {
        s,
        freqs,
        times,
        window_sum,
    }
}

/// Periodic Hann window
pub fn hann_window(size: usize) -> Vec<f32> {
    (0..size)
        .map(|i| 0.5 * (1.0 - (2.0 * std::f32::consts::PI * i as f32 / size as f32).cos()))
        .collect()
}

/// Compute magnitude spectrogram
pub fn magnitude_spectrogram(stft_data: &StftData) -> Array2<f32> {
    stft_data.s.map(|c| c.norm())
}

/// Zero every frequency bin outside `[low_hz, high_hz]` of a whole-signal FFT
///
/// The output has exactly the input length. Bins are mirrored so the
/// inverse transform stays real.
pub fn band_pass(y: &[f32], sample_rate: u32, low_hz: f32, high_hz: f32) -> Vec<f32> {
    let n = y.len();
    if n == 0 || sample_rate == 0 {
        return y.to_vec();
    }

    let mut planner = FftPlanner::<f32>::new();
    let fft = planner.plan_fft_forward(n);
    let ifft = planner.plan_fft_inverse(n);

    let mut spectrum: Vec<Complex32> = y.iter().map(|&x| Complex32::new(x, 0.0)).collect();
    fft.process(&mut spectrum);

    let bin_hz = sample_rate as f32 / n as f32;
    for k in 0..=n / 2 {
        let freq = k as f32 * bin_hz;
        if freq < low_hz || freq > high_hz {
            spectrum[k] = Complex32::new(0.0, 0.0);
            if k != 0 {
                spectrum[n - k] = Complex32::new(0.0, 0.0);
            }
        }
    }

    ifft.process(&mut spectrum);

    let scale = 1.0 / n as f32;
    spectrum.iter().map(|c| c.re * scale).collect()
}

/// Convert a frequency to a fractional MIDI note number (A4 = 440 Hz = 69)
pub fn hz_to_midi(freq_hz: f32) -> f32 {
    12.0 * (freq_hz / 440.0).log2() + 69.0
}

/// Convert a MIDI note number to its frequency
pub fn midi_to_hz(note: f32) -> f32 {
    440.0 * 2.0f32.powf((note - 69.0) / 12.0)
}
