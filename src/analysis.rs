//! Data model shared by the passes, and analysis export

use crate::audio::AnalysisState;
use serde::{Deserialize, Serialize};

/// Pitch estimate for one analysis frame
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PitchObservation {
    pub frame_index: usize,
    /// Dominant frequency in Hz, 0 when the frame is unvoiced
    pub frequency_hz: f32,
    /// Normalized magnitude (>= 0); louder, more periodic frames score higher
    pub magnitude: f32,
    /// Time of the frame position in seconds
    pub timestamp_s: f32,
}

impl PitchObservation {
    pub fn unvoiced(frame_index: usize, timestamp_s: f32) -> Self {
        Self {
            frame_index,
            frequency_hz: 0.0,
            magnitude: 0.0,
            timestamp_s,
        }
    }

    pub fn is_voiced(&self) -> bool {
        self.frequency_hz > 0.0
    }
}

/// Committed note
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct NoteEvent {
    /// MIDI pitch 0-127
    pub pitch: u8,
    /// MIDI velocity 0-127
    pub velocity: u8,
    pub start_time_s: f32,
    /// Always > 0 once committed
    pub duration_s: f32,
}

impl NoteEvent {
    pub fn end_time_s(&self) -> f32 {
        self.start_time_s + self.duration_s
    }
}

/// Summary of one transcription run
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TranscriptionSummary {
    pub version: String,
    pub sample_rate: u32,
    pub duration_s: f32,
    pub frame_count: usize,
    pub voiced_frame_count: usize,
    pub segmented_note_count: usize,
    pub note_count: usize,
    pub mean_velocity: f32,
    /// Lowest and highest pitch, absent when no note was found
    pub pitch_range: Option<[u8; 2]>,
    pub notes: Vec<NoteEvent>,
}

/// Build the analysis summary from a finished pipeline state
pub fn build_summary(state: &AnalysisState) -> TranscriptionSummary {
    let notes = &state.notes;
    let mean_velocity = if notes.is_empty() {
        0.0
    } else {
        notes.iter().map(|n| n.velocity as f32).sum::<f32>() / notes.len() as f32
    };

    let pitch_range = notes
        .iter()
        .map(|n| n.pitch)
        .fold(None, |range: Option<[u8; 2]>, p| match range {
            None => Some([p, p]),
            Some([lo, hi]) => Some([lo.min(p), hi.max(p)]),
        });

    TranscriptionSummary {
        version: env!("CARGO_PKG_VERSION").to_string(),
        sample_rate: state.sample_rate(),
        duration_s: state.duration_sec(),
        frame_count: state.observations.len(),
        voiced_frame_count: state.observations.iter().filter(|o| o.is_voiced()).count(),
        segmented_note_count: state.segmented_notes.len(),
        note_count: notes.len(),
        mean_velocity,
        pitch_range,
        notes: notes.clone(),
    }
}

/// Export analysis results to JSON
pub fn export_analysis(
    state: &AnalysisState,
    output_dir: &std::path::Path,
) -> crate::TranscriptionResult<std::path::PathBuf> {
    std::fs::create_dir_all(output_dir).map_err(|e| {
        crate::TranscriptionError::AnalysisExportError(format!("{}: {}", output_dir.display(), e))
    })?;

    let analysis_path = output_dir.join("analysis.json");
    let summary = build_summary(state);

    let json = serde_json::to_string_pretty(&summary)?;
    std::fs::write(&analysis_path, json).map_err(|e| {
        crate::TranscriptionError::AnalysisExportError(format!(
            "{}: {}",
            analysis_path.display(),
            e
        ))
    })?;

    log::info!("Exported analysis results to {}", analysis_path.display());
    Ok(analysis_path)
}
