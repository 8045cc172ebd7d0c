//! Configuration system for the monophonic transcriber
//!
//! A `Config` is an immutable snapshot for one pipeline run. Out-of-range
//! values are never fatal: [`clamp_config`] pulls them back to the nearest
//! valid value and reports what it changed.

use serde::{Deserialize, Serialize};

/// Main configuration structure
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub version: String,
    pub conditioning: ConditioningConfig,
    pub pitch: PitchConfig,
    pub segmentation: SegmentationConfig,
    pub postprocess: PostProcessConfig,
    pub export: ExportConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            version: "1.0".to_string(),
            conditioning: ConditioningConfig::default(),
            pitch: PitchConfig::default(),
            segmentation: SegmentationConfig::default(),
            postprocess: PostProcessConfig::default(),
            export: ExportConfig::default(),
        }
    }
}

/// Signal conditioning (pass 0) configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ConditioningConfig {
    pub low_cut_hz: f32,
    pub high_cut_hz: f32,
    pub band_pass_enabled: bool,
    pub denoise: DenoiseConfig,
}

impl Default for ConditioningConfig {
    fn default() -> Self {
        Self {
            low_cut_hz: 20.0,
            high_cut_hz: 20000.0,
            band_pass_enabled: true,
            denoise: DenoiseConfig::default(),
        }
    }
}

/// Denoising policy
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DenoiseMode {
    /// Leave the signal untouched
    Off,
    /// Zero every sample whose magnitude is below `denoise_threshold`
    Fixed,
    /// Estimate a noise floor from the quietest samples and subtract it
    Adaptive,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DenoiseConfig {
    pub mode: DenoiseMode,
    /// Amplitude floor for the fixed policy
    pub denoise_threshold: f32,
    /// Fraction of the estimated noise floor subtracted by the adaptive policy
    pub strength: f32,
    /// Samples at or below this percentile of |x| form the noise profile
    pub noise_percentile: f32,
}

impl Default for DenoiseConfig {
    fn default() -> Self {
        Self {
            mode: DenoiseMode::Adaptive,
            denoise_threshold: 0.02,
            strength: 1.0,
            noise_percentile: 25.0,
        }
    }
}

/// Pitch estimation method
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PitchMethod {
    /// Strongest spectral peak, refined by parabolic interpolation
    SpectralPeak,
    /// Harmonic product spectrum over `harmonics` downsampled copies
    HarmonicProduct,
}

/// Spectral/pitch estimation (pass 1) configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PitchConfig {
    pub frame_size: usize,
    pub hop_size: usize,
    pub method: PitchMethod,
    pub harmonics: usize,
    /// Frames whose RMS is below this level are reported unvoiced
    pub energy_floor: f32,
    /// Scale magnitudes so the loudest frame of the run is 1.0
    ///
    /// Velocities then become relative to the whole recording: a quiet note
    /// next to a loud one maps to a low velocity and may fall under the
    /// post-processing velocity threshold, while the same note recorded on
    /// its own maps to 127. Disable to keep absolute amplitudes.
    pub normalize_magnitude: bool,
    pub min_frequency_hz: f32,
    pub max_frequency_hz: f32,
}

impl Default for PitchConfig {
    fn default() -> Self {
        Self {
            frame_size: 1024,
            hop_size: 256,
            method: PitchMethod::SpectralPeak,
            harmonics: 3,
            energy_floor: 1e-4,
            normalize_magnitude: true,
            min_frequency_hz: 30.0,
            max_frequency_hz: 5000.0,
        }
    }
}

/// Mapping from peak magnitude to MIDI velocity
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VelocityCurve {
    /// `round(peak * 127)`
    Linear,
    /// `round(127 * log10(peak * 9 + 1))`
    Logarithmic,
}

/// Note segmentation (pass 2) configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SegmentationConfig {
    pub pitch_threshold_hz: f32,
    pub amplitude_threshold: f32,
    pub min_duration_s: f32,
    pub pitch_tolerance_semitones: f32,
    pub velocity_curve: VelocityCurve,
}

impl Default for SegmentationConfig {
    fn default() -> Self {
        Self {
            pitch_threshold_hz: 50.0,
            amplitude_threshold: 0.1,
            min_duration_s: 0.05,
            pitch_tolerance_semitones: 0.5,
            velocity_curve: VelocityCurve::Linear,
        }
    }
}

/// Where legato overlap is synthesized
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LegatoStage {
    /// Pass 3 extends the earlier of two adjacent same-pitch notes
    PostProcess,
    /// Pass 2 extends every note as it is committed
    Segmenter,
}

/// Post-processing (pass 3) configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PostProcessConfig {
    pub velocity_threshold: u8,
    pub min_duration_s: f32,
    pub legato_enabled: bool,
    pub legato_overlap_ratio: f32,
    pub legato_stage: LegatoStage,
    pub quantize_enabled: bool,
    pub bpm: u32,
    /// Grid cells per beat (4 = sixteenth notes)
    pub grid_subdivision: u32,
}

impl Default for PostProcessConfig {
    fn default() -> Self {
        Self {
            velocity_threshold: 30,
            min_duration_s: 0.05,
            legato_enabled: false,
            legato_overlap_ratio: 0.15,
            legato_stage: LegatoStage::PostProcess,
            quantize_enabled: false,
            bpm: 120,
            grid_subdivision: 4,
        }
    }
}

/// Export configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExportConfig {
    pub ticks_per_beat: u16,
    pub channel: u8,
    /// General MIDI program (0 = acoustic grand piano, 73 = flute)
    pub program: u8,
    pub emit_tempo_map: bool,
    pub midi_filename: String,
    pub write_analysis_json: bool,
}

impl Default for ExportConfig {
    fn default() -> Self {
        Self {
            ticks_per_beat: 480,
            channel: 0,
            program: 0,
            emit_tempo_map: true,
            midi_filename: "transcription.mid".to_string(),
            write_analysis_json: true,
        }
    }
}

/// A configuration after clamping, with a note for every adjusted field
#[derive(Debug, Clone)]
pub struct ClampedConfig {
    pub config: Config,
    pub adjustments: Vec<String>,
}

impl ClampedConfig {
    pub fn is_unchanged(&self) -> bool {
        self.adjustments.is_empty()
    }
}

fn clamp_f32(value: f32, min: f32, max: f32, name: &str, adjustments: &mut Vec<String>) -> f32 {
    // NaN falls back to the lower bound
    let clamped = if value.is_nan() { min } else { value.clamp(min, max) };
    if clamped != value {
        adjustments.push(format!("{} = {} clamped to {}", name, value, clamped));
    }
    clamped
}

fn clamp_usize(value: usize, min: usize, max: usize, name: &str, adjustments: &mut Vec<String>) -> usize {
    let clamped = value.clamp(min, max);
    if clamped != value {
        adjustments.push(format!("{} = {} clamped to {}", name, value, clamped));
    }
    clamped
}

/// Clamp every out-of-range parameter to its nearest valid value
///
/// The high cut is bounded by the Nyquist frequency later, in pass 0, where
/// the sample rate is known.
pub fn clamp_config(config: &Config) -> ClampedConfig {
    let mut c = config.clone();
    let mut adj = Vec::new();

    let cond = &mut c.conditioning;
    cond.low_cut_hz = clamp_f32(cond.low_cut_hz, 0.0, f32::MAX, "conditioning.low_cut_hz", &mut adj);
    cond.high_cut_hz = clamp_f32(cond.high_cut_hz, 0.0, f32::MAX, "conditioning.high_cut_hz", &mut adj);
    if cond.low_cut_hz > cond.high_cut_hz {
        adj.push(format!(
            "conditioning.low_cut_hz = {} exceeds high_cut_hz, clamped to {}",
            cond.low_cut_hz, cond.high_cut_hz
        ));
        cond.low_cut_hz = cond.high_cut_hz;
    }
    let dn = &mut cond.denoise;
    dn.denoise_threshold = clamp_f32(dn.denoise_threshold, 0.0, 1.0, "denoise.denoise_threshold", &mut adj);
    dn.strength = clamp_f32(dn.strength, 0.0, 1.0, "denoise.strength", &mut adj);
    dn.noise_percentile = clamp_f32(dn.noise_percentile, 0.0, 100.0, "denoise.noise_percentile", &mut adj);

    let p = &mut c.pitch;
    p.frame_size = clamp_usize(p.frame_size, 32, 1 << 16, "pitch.frame_size", &mut adj);
    p.hop_size = clamp_usize(p.hop_size, 1, p.frame_size, "pitch.hop_size", &mut adj);
    p.harmonics = clamp_usize(p.harmonics, 1, 8, "pitch.harmonics", &mut adj);
    p.energy_floor = clamp_f32(p.energy_floor, 0.0, 1.0, "pitch.energy_floor", &mut adj);
    p.min_frequency_hz = clamp_f32(p.min_frequency_hz, 0.0, f32::MAX, "pitch.min_frequency_hz", &mut adj);
    p.max_frequency_hz = clamp_f32(
        p.max_frequency_hz,
        p.min_frequency_hz,
        f32::MAX,
        "pitch.max_frequency_hz",
        &mut adj,
    );

    let s = &mut c.segmentation;
    s.pitch_threshold_hz = clamp_f32(s.pitch_threshold_hz, 0.0, f32::MAX, "segmentation.pitch_threshold_hz", &mut adj);
    s.amplitude_threshold = clamp_f32(s.amplitude_threshold, 0.0, 1.0, "segmentation.amplitude_threshold", &mut adj);
    s.min_duration_s = clamp_f32(s.min_duration_s, 0.0, f32::MAX, "segmentation.min_duration_s", &mut adj);
    s.pitch_tolerance_semitones = clamp_f32(
        s.pitch_tolerance_semitones,
        0.05,
        6.0,
        "segmentation.pitch_tolerance_semitones",
        &mut adj,
    );

    let pp = &mut c.postprocess;
    if pp.velocity_threshold > 127 {
        adj.push(format!(
            "postprocess.velocity_threshold = {} clamped to 127",
            pp.velocity_threshold
        ));
        pp.velocity_threshold = 127;
    }
    pp.min_duration_s = clamp_f32(pp.min_duration_s, 0.0, f32::MAX, "postprocess.min_duration_s", &mut adj);
    pp.legato_overlap_ratio = clamp_f32(pp.legato_overlap_ratio, 0.0, 1.0, "postprocess.legato_overlap_ratio", &mut adj);
    if pp.bpm == 0 {
        adj.push("postprocess.bpm = 0 clamped to 1".to_string());
        pp.bpm = 1;
    }
    if pp.grid_subdivision == 0 {
        adj.push("postprocess.grid_subdivision = 0 clamped to 1".to_string());
        pp.grid_subdivision = 1;
    }

    let e = &mut c.export;
    if e.ticks_per_beat == 0 {
        adj.push("export.ticks_per_beat = 0 clamped to 1".to_string());
        e.ticks_per_beat = 1;
    }
    // u15 timing field
    if e.ticks_per_beat > 0x7FFF {
        adj.push(format!("export.ticks_per_beat = {} clamped to 32767", e.ticks_per_beat));
        e.ticks_per_beat = 0x7FFF;
    }
    if e.channel > 15 {
        adj.push(format!("export.channel = {} clamped to 15", e.channel));
        e.channel = 15;
    }
    if e.program > 127 {
        adj.push(format!("export.program = {} clamped to 127", e.program));
        e.program = 127;
    }

    ClampedConfig {
        config: c,
        adjustments: adj,
    }
}

/// Validate configuration parameters
///
/// Returns the list of adjustments clamping would make; an empty list means
/// the configuration is used as written.
pub fn validate_config(config: &Config) -> anyhow::Result<Vec<String>> {
    if config.version.trim().is_empty() {
        anyhow::bail!("version must not be empty");
    }
    Ok(clamp_config(config).adjustments)
}

/// Load configuration from JSON file
pub fn load_config<P: AsRef<std::path::Path>>(path: P) -> anyhow::Result<Config> {
    let content = std::fs::read_to_string(path)?;
    let config: Config = serde_json::from_str(&content)?;
    validate_config(&config)?;
    Ok(config)
}

/// Save configuration to JSON file
pub fn save_config<P: AsRef<std::path::Path>>(config: &Config, path: P) -> anyhow::Result<()> {
    let content = serde_json::to_string_pretty(config)?;
    std::fs::write(path, content)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_needs_no_clamping() {
        let clamped = clamp_config(&Config::default());
        assert!(clamped.is_unchanged(), "{:?}", clamped.adjustments);
        assert_eq!(clamped.config, Config::default());
    }

    #[test]
    fn test_inverted_band_is_clamped() {
        let mut config = Config::default();
        config.conditioning.low_cut_hz = 5000.0;
        config.conditioning.high_cut_hz = 1000.0;

        let clamped = clamp_config(&config);
        assert_eq!(clamped.config.conditioning.low_cut_hz, 1000.0);
        assert_eq!(clamped.config.conditioning.high_cut_hz, 1000.0);
        assert_eq!(clamped.adjustments.len(), 1);
    }

    #[test]
    fn test_zero_bpm_and_hop_are_clamped() {
        let mut config = Config::default();
        config.postprocess.bpm = 0;
        config.pitch.hop_size = 0;
        config.pitch.frame_size = 4;

        let clamped = clamp_config(&config).config;
        assert_eq!(clamped.postprocess.bpm, 1);
        assert_eq!(clamped.pitch.frame_size, 32);
        assert_eq!(clamped.pitch.hop_size, 1);
    }

    #[test]
    fn test_nan_ratio_falls_back_to_lower_bound() {
        let mut config = Config::default();
        config.postprocess.legato_overlap_ratio = f32::NAN;
        let clamped = clamp_config(&config);
        assert_eq!(clamped.config.postprocess.legato_overlap_ratio, 0.0);
        assert!(!clamped.is_unchanged());
    }

    #[test]
    fn test_partial_json_uses_defaults() {
        let json = r#"{ "postprocess": { "bpm": 90, "legato_enabled": true },
                        "segmentation": { "velocity_curve": "logarithmic" } }"#;
        let config: Config = serde_json::from_str(json).unwrap();
        assert_eq!(config.postprocess.bpm, 90);
        assert!(config.postprocess.legato_enabled);
        assert_eq!(config.postprocess.legato_overlap_ratio, 0.15);
        assert_eq!(config.segmentation.velocity_curve, VelocityCurve::Logarithmic);
        assert_eq!(config.pitch.frame_size, 1024);
    }

    #[test]
    fn test_save_and_load_config() {
        let path = std::env::temp_dir().join(format!("mono2midi_config_{}.json", std::process::id()));
        let mut config = Config::default();
        config.conditioning.denoise.mode = DenoiseMode::Fixed;
        config.export.program = 73;

        save_config(&config, &path).unwrap();
        let loaded = load_config(&path).unwrap();
        std::fs::remove_file(&path).ok();

        assert_eq!(loaded, config);
    }

    #[test]
    fn test_malformed_config_is_an_error() {
        let path = std::env::temp_dir().join(format!("mono2midi_bad_{}.json", std::process::id()));
        std::fs::write(&path, "{ not json").unwrap();
        let result = load_config(&path);
        std::fs::remove_file(&path).ok();
        assert!(result.is_err());
    }
}
