//! Audio I/O and basic processing functionality

use crate::analysis::{NoteEvent, PitchObservation};
use crate::error::{Result as TranscriptionResult, TranscriptionError};
use hound::{SampleFormat, WavReader, WavSpec, WavWriter};
use std::path::Path;

/// Raw sample buffer as handed over by the caller
///
/// Samples are interleaved when `channels > 1`; mono-izing is part of
/// signal conditioning, not loading.
#[derive(Debug, Clone, PartialEq)]
pub struct AudioBuffer {
    /// Interleaved samples in [-1, 1]
    pub samples: Vec<f32>,
    pub channels: u16,
    /// Sample rate in Hz
    pub sample_rate: u32,
}

impl AudioBuffer {
    pub fn mono(samples: Vec<f32>, sample_rate: u32) -> Self {
        Self {
            samples,
            channels: 1,
            sample_rate,
        }
    }

    pub fn interleaved(samples: Vec<f32>, channels: u16, sample_rate: u32) -> Self {
        Self {
            samples,
            channels: channels.max(1),
            sample_rate,
        }
    }

    /// Number of sample frames (one sample per channel)
    pub fn n_frames(&self) -> usize {
        self.samples.len() / self.channels.max(1) as usize
    }

    pub fn duration_sec(&self) -> f32 {
        if self.sample_rate == 0 {
            return 0.0;
        }
        self.n_frames() as f32 / self.sample_rate as f32
    }

    pub fn is_empty(&self) -> bool {
        self.n_frames() == 0
    }
}

/// State carried through the passes of one pipeline run
///
/// Each pass reads the fields written by earlier passes and fills its own.
#[derive(Debug, Clone)]
pub struct AnalysisState {
    /// Caller's audio, never modified
    pub input: AudioBuffer,

    // Pass 0: Signal conditioning
    /// Mono, denoised, band-limited samples
    pub conditioned: Option<Vec<f32>>,

    // Pass 1: Pitch estimation
    /// One observation per analysis frame, in frame order
    pub observations: Vec<PitchObservation>,
    /// Time advanced per frame (hop / sample rate)
    pub frame_duration_s: f32,

    // Pass 2: Segmentation
    /// Notes committed by the segmenter, before post-processing
    pub segmented_notes: Vec<NoteEvent>,

    // Pass 3: Post-processing
    /// Final note list
    pub notes: Vec<NoteEvent>,
}

impl AnalysisState {
    /// Load audio file and create initial state
    pub fn load<P: AsRef<Path>>(path: P) -> TranscriptionResult<Self> {
        let buffer = load_audio_file(path)?;
        Ok(Self::from_buffer(buffer))
    }

    /// Create a state from an in-memory buffer
    pub fn from_buffer(input: AudioBuffer) -> Self {
        AnalysisState {
            input,
            conditioned: None,
            observations: Vec::new(),
            frame_duration_s: 0.0,
            segmented_notes: Vec::new(),
            notes: Vec::new(),
        }
    }

    /// Create a state from mono test samples
    pub fn from_samples(samples: Vec<f32>, sr: u32) -> Self {
        Self::from_buffer(AudioBuffer::mono(samples, sr))
    }

    pub fn sample_rate(&self) -> u32 {
        self.input.sample_rate
    }

    /// Get audio duration in seconds
    pub fn duration_sec(&self) -> f32 {
        self.input.duration_sec()
    }
}

/// Load audio file and return its interleaved samples
pub fn load_audio_file<P: AsRef<Path>>(path: P) -> TranscriptionResult<AudioBuffer> {
    let path = path.as_ref();

    let extension = path
        .extension()
        .and_then(|ext| ext.to_str())
        .unwrap_or("")
        .to_lowercase();

    match extension.as_str() {
        "wav" | "wave" => load_wav_file(path),
        _ => Err(TranscriptionError::InvalidAudioFormat(format!(
            "Unsupported audio format: {}",
            extension
        ))),
    }
}

/// Load WAV file
fn load_wav_file(path: &Path) -> TranscriptionResult<AudioBuffer> {
    let mut reader = WavReader::open(path)?;
    let spec = reader.spec();

    if spec.channels == 0 {
        return Err(TranscriptionError::InvalidAudioFormat(
            "WAV header declares zero channels".to_string(),
        ));
    }

    if spec.bits_per_sample == 0 || spec.bits_per_sample > 32 {
        return Err(TranscriptionError::InvalidAudioFormat(format!(
            "Unsupported bit depth: {}",
            spec.bits_per_sample
        )));
    }

    let mut samples: Vec<f32> = Vec::with_capacity(reader.len() as usize);

    match spec.sample_format {
        SampleFormat::Int => {
            let max_value = (1i64 << (spec.bits_per_sample - 1)) as f32;
            for sample in reader.samples::<i32>() {
                samples.push(sample? as f32 / max_value);
            }
        }
        SampleFormat::Float => {
            for sample in reader.samples::<f32>() {
                samples.push(sample?);
            }
        }
    }

    log::debug!(
        "Loaded {} samples ({} channels, {} Hz) from {}",
        samples.len(),
        spec.channels,
        spec.sample_rate,
        path.display()
    );

    Ok(AudioBuffer::interleaved(samples, spec.channels, spec.sample_rate))
}

/// Write a buffer as a 32-bit float WAV file
pub fn write_wav<P: AsRef<Path>>(path: P, buffer: &AudioBuffer) -> TranscriptionResult<()> {
    let spec = WavSpec {
        channels: buffer.channels.max(1),
        sample_rate: buffer.sample_rate,
        bits_per_sample: 32,
        sample_format: SampleFormat::Float,
    };
    let mut writer = WavWriter::create(path, spec)?;
    for &sample in &buffer.samples {
        writer.write_sample(sample)?;
    }
    writer.finalize()?;
    Ok(())
}

/// Validate audio file format and content
///
/// Silence is not rejected here: a silent recording transcribes to an empty
/// note list.
pub fn validate_audio_file<P: AsRef<Path>>(path: P) -> TranscriptionResult<()> {
    let path = path.as_ref();

    if !path.exists() {
        return Err(TranscriptionError::InputValidationError(format!(
            "Audio file does not exist: {}",
            path.display()
        )));
    }

    let buffer = load_audio_file(path)?;

    if buffer.is_empty() {
        return Err(TranscriptionError::InputValidationError(
            "Audio file contains no samples".to_string(),
        ));
    }

    if !(8000..=192000).contains(&buffer.sample_rate) {
        return Err(TranscriptionError::UnsupportedSampleRate(buffer.sample_rate));
    }

    let peak = peak(&buffer.samples);
    if peak > 0.99 {
        log::warn!("Audio file may be clipped (peak = {:.3})", peak);
    }

    Ok(())
}

/// Cut `[start_s, end_s)` out of a mono signal and apply linear fades
///
/// Out-of-range times are clamped to the signal; the fade is shortened to
/// half the slice when the slice is too short for it.
pub fn slice_with_fade(samples: &[f32], sr: u32, start_s: f32, end_s: f32, fade_s: f32) -> Vec<f32> {
    let to_index = |t: f32| -> usize {
        if !t.is_finite() || t <= 0.0 {
            0
        } else {
            ((t * sr as f32) as usize).min(samples.len())
        }
    };
    let start = to_index(start_s);
    let end = to_index(end_s).max(start);

    let mut sliced = samples[start..end].to_vec();
    let fade_len = to_fade_len(fade_s, sr).min(sliced.len() / 2);
    if fade_len == 0 {
        return sliced;
    }

    let n = sliced.len();
    for i in 0..fade_len {
        let gain = i as f32 / fade_len as f32;
        sliced[i] *= gain;
        sliced[n - 1 - i] *= gain;
    }
    sliced
}

fn to_fade_len(fade_s: f32, sr: u32) -> usize {
    if !fade_s.is_finite() || fade_s <= 0.0 {
        0
    } else {
        (fade_s * sr as f32) as usize
    }
}

/// Root mean square of a signal, 0 for an empty slice
pub fn rms(samples: &[f32]) -> f32 {
    if samples.is_empty() {
        return 0.0;
    }
    (samples.iter().map(|&x| x * x).sum::<f32>() / samples.len() as f32).sqrt()
}

/// Largest absolute sample value, 0 for an empty slice
pub fn peak(samples: &[f32]) -> f32 {
    samples
        .iter()
        .filter(|x| x.is_finite())
        .fold(0.0f32, |acc, &x| acc.max(x.abs()))
}

/// Compute the p-th percentile of a dataset
pub fn percentile(data: &[f32], p: f32) -> f32 {
    if data.is_empty() {
        return 0.0;
    }

    let mut sorted = data.to_vec();
    sorted.sort_by(|a, b| a.total_cmp(b));

    if p <= 0.0 {
        return sorted[0];
    }
    if p >= 100.0 {
        return sorted[sorted.len() - 1];
    }

    let n = sorted.len() as f32;
    let rank = (p / 100.0) * (n - 1.0);
    let lower = rank.floor() as usize;
    let upper = rank.ceil() as usize;

    if lower == upper {
        return sorted[lower];
    }

    // Linear interpolation between the two closest values
    let fraction = rank - rank.floor();
    sorted[lower] + fraction * (sorted[upper] - sorted[lower])
}
