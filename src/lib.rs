//! Monophonic Audio-to-MIDI Transcription
//!
//! A deterministic signal processing pipeline that turns a recorded
//! monophonic melody into a list of MIDI notes.

pub mod analysis;
pub mod audio;
pub mod config;
pub mod error;
pub mod midi;
pub mod passes;
pub mod session;
pub mod spectral;

pub use analysis::{NoteEvent, PitchObservation, TranscriptionSummary};
pub use audio::{AnalysisState, AudioBuffer};
pub use config::Config;
pub use error::{Result as TranscriptionResult, TranscriptionError};
pub use session::{AnalysisTicket, TranscriptionSession};

use std::path::{Path, PathBuf};

/// File name of the exported conditioned audio
pub const CONDITIONED_WAV_NAME: &str = "conditioned.wav";

/// Main processing pipeline for monophonic audio-to-MIDI conversion
#[derive(Debug, Clone)]
pub struct MonoToMidi {
    config: Config,
    export_conditioned: bool,
}

impl MonoToMidi {
    /// Create a new processor with the given configuration
    ///
    /// Out-of-range parameters are clamped to their nearest valid value
    /// and each adjustment is logged as a warning.
    pub fn new(config: Config) -> Self {
        let clamped = config::clamp_config(&config);
        for adjustment in &clamped.adjustments {
            log::warn!("Config: {}", adjustment);
        }
        Self {
            config: clamped.config,
            export_conditioned: false,
        }
    }

    /// Also write the conditioned signal next to the MIDI file
    pub fn with_conditioned_export(mut self, enabled: bool) -> Self {
        self.export_conditioned = enabled;
        self
    }

    /// The clamped configuration this pipeline runs with
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Transcribe an in-memory buffer into the final note list
    ///
    /// Silent or empty input yields an empty list. The caller's buffer is
    /// never modified.
    pub fn transcribe(&self, buffer: &AudioBuffer) -> TranscriptionResult<Vec<NoteEvent>> {
        Ok(self.analyze(buffer.clone())?.notes)
    }

    /// Run every pass over a buffer and return the full analysis state
    pub fn analyze(&self, buffer: AudioBuffer) -> TranscriptionResult<AnalysisState> {
        let mut state = AnalysisState::from_buffer(buffer);
        self.run_pipeline(&mut state)?;
        Ok(state)
    }

    /// Process an audio file and write MIDI (plus analysis) into `output_dir`
    pub fn process<P: AsRef<Path>, Q: AsRef<Path>>(
        &self,
        input_path: P,
        output_dir: Q,
    ) -> TranscriptionResult<AnalysisState> {
        // Load audio
        let mut state = AnalysisState::load(input_path)?;

        // Run all passes
        self.run_pipeline(&mut state)?;

        // Export results
        self.export_results(&state, output_dir.as_ref())?;

        Ok(state)
    }

    /// Execute the complete multi-pass pipeline
    pub fn run_pipeline(&self, state: &mut AnalysisState) -> TranscriptionResult<()> {
        // Pass 0: Signal Conditioning
        passes::pass_0::run(state, &self.config)?;

        // Pass 1: Spectral Pitch Estimation
        passes::pass_1::run(state, &self.config)?;

        // Pass 2: Note Segmentation
        passes::pass_2::run(state, &self.config)?;

        // Pass 3: Note Post-Processing
        passes::pass_3::run(state, &self.config)?;

        Ok(())
    }

    /// Export MIDI and analysis results
    fn export_results(&self, state: &AnalysisState, output_dir: &Path) -> TranscriptionResult<Vec<PathBuf>> {
        std::fs::create_dir_all(output_dir).map_err(|e| {
            TranscriptionError::MidiExportError(format!("{}: {}", output_dir.display(), e))
        })?;
        let export = &self.config.export;
        let mut written = Vec::new();

        let midi_path = output_dir.join(&export.midi_filename);
        midi::export_midi(&state.notes, &midi_path, export, self.config.postprocess.bpm)?;
        written.push(midi_path);

        if export.write_analysis_json {
            written.push(analysis::export_analysis(state, output_dir)?);
        }

        if self.export_conditioned {
            if let Some(conditioned) = &state.conditioned {
                let wav_path = output_dir.join(CONDITIONED_WAV_NAME);
                let buffer = AudioBuffer::mono(conditioned.clone(), state.sample_rate());
                audio::write_wav(&wav_path, &buffer).map_err(|e| {
                    TranscriptionError::AnalysisExportError(format!("{}: {}", wav_path.display(), e))
                })?;
                log::info!("Exported conditioned audio to {}", wav_path.display());
                written.push(wav_path);
            }
        }

        Ok(written)
    }
}

impl Default for MonoToMidi {
    fn default() -> Self {
        Self::new(Config::default())
    }
}

/// Validate configuration and input files
///
/// Configuration values that would be clamped are reported as warnings;
/// only a missing version is rejected.
pub fn validate_input<P: AsRef<Path>>(input_path: P, config: &Config) -> TranscriptionResult<()> {
    // Check input file exists and is valid audio
    audio::validate_audio_file(input_path)?;

    // Validate configuration
    let adjustments = config::validate_config(config)
        .map_err(|e| TranscriptionError::ConfigValidationFailed(e.to_string()))?;
    for adjustment in adjustments {
        log::warn!("Config: {}", adjustment);
    }

    Ok(())
}
