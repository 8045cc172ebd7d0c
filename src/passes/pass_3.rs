//! Pass 3: Note Post-Processing
//!
//! Filtering, legato overlap and beat quantization over the committed notes.
//! Every step returns a new list; the segmenter's output is kept as is so
//! thresholds can be changed and re-applied without re-running analysis.

use crate::analysis::NoteEvent;
use crate::audio::AnalysisState;
use crate::config::{Config, LegatoStage, PostProcessConfig};
use crate::error::Result as TranscriptionResult;

/// Apply filter, legato and quantization as configured
pub fn post_process(notes: &[NoteEvent], config: &PostProcessConfig) -> Vec<NoteEvent> {
    let mut processed = filter_notes(notes, config.velocity_threshold, config.min_duration_s);

    if config.legato_enabled && config.legato_stage == LegatoStage::PostProcess {
        processed = apply_legato(&processed, config.legato_overlap_ratio);
    }

    if config.quantize_enabled {
        processed = quantize(&processed, config.bpm, config.grid_subdivision);
    }

    processed
}

/// Drop notes below the velocity threshold or shorter than `min_duration_s`
pub fn filter_notes(notes: &[NoteEvent], velocity_threshold: u8, min_duration_s: f32) -> Vec<NoteEvent> {
    notes
        .iter()
        .filter(|note| {
            note.velocity >= velocity_threshold
                && note.duration_s.is_finite()
                && note.duration_s > 0.0
                && note.duration_s >= min_duration_s
        })
        .copied()
        .collect()
}

/// Extend the earlier of two adjacent same-pitch notes by `overlap_ratio`
///
/// Notes are walked in start-time order; the later note's start never moves
/// and no duration shrinks.
pub fn apply_legato(notes: &[NoteEvent], overlap_ratio: f32) -> Vec<NoteEvent> {
    let ratio = if overlap_ratio.is_finite() {
        overlap_ratio.max(0.0)
    } else {
        0.0
    };

    let mut ordered = sorted_by_start(notes);
    for i in 1..ordered.len() {
        if ordered[i - 1].pitch == ordered[i].pitch {
            ordered[i - 1].duration_s *= 1.0 + ratio;
        }
    }
    ordered
}

/// Length of one grid cell in seconds (a sixteenth note for `subdivision = 4`)
pub fn grid_step_s(bpm: u32, subdivision: u32) -> f32 {
    60.0 / bpm.max(1) as f32 / subdivision.max(1) as f32
}

/// Snap every start time to the nearest grid line; durations are unchanged
pub fn quantize(notes: &[NoteEvent], bpm: u32, subdivision: u32) -> Vec<NoteEvent> {
    let step = grid_step_s(bpm, subdivision);
    notes
        .iter()
        .map(|note| NoteEvent {
            start_time_s: snap_to_grid(note.start_time_s, step),
            ..*note
        })
        .collect()
}

fn snap_to_grid(time_s: f32, step: f32) -> f32 {
    if !time_s.is_finite() || step <= 0.0 {
        return time_s;
    }
    ((time_s / step).round() * step).max(0.0)
}

fn sorted_by_start(notes: &[NoteEvent]) -> Vec<NoteEvent> {
    let mut ordered = notes.to_vec();
    ordered.sort_by(|a, b| a.start_time_s.total_cmp(&b.start_time_s));
    ordered
}

pub fn run(state: &mut AnalysisState, config: &Config) -> TranscriptionResult<()> {
    log::info!("Pass 3: Note Post-Processing");

    let notes = post_process(&state.segmented_notes, &config.postprocess);

    log::debug!(
        "  {} -> {} notes (velocity >= {}, legato {}, quantize {})",
        state.segmented_notes.len(),
        notes.len(),
        config.postprocess.velocity_threshold,
        config.postprocess.legato_enabled,
        config.postprocess.quantize_enabled
    );

    state.notes = notes;
    Ok(())
}
