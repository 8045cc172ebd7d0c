//! Pass 2: Note Segmentation
//!
//! A streaming state machine over the frame-ordered pitch observations.
//! `Idle` means no note is sounding; `Active` owns the note under
//! construction, which is only turned into a `NoteEvent` when it closes.

use crate::analysis::{NoteEvent, PitchObservation};
use crate::audio::AnalysisState;
use crate::config::{Config, LegatoStage, SegmentationConfig, VelocityCurve};
use crate::error::Result as TranscriptionResult;
use crate::spectral::hz_to_midi;

/// Note under construction, private to the segmenter until committed
#[derive(Debug, Clone, Copy, PartialEq)]
struct CurrentNote {
    pitch: u8,
    start_time_s: f32,
    duration_s: f32,
    peak_magnitude: f32,
}

#[derive(Debug, Clone, Copy, PartialEq)]
enum SegmenterState {
    Idle,
    Active(CurrentNote),
}

/// Frame-by-frame note segmenter
#[derive(Debug, Clone)]
pub struct NoteSegmenter {
    config: SegmentationConfig,
    frame_duration_s: f32,
    commit_legato_ratio: Option<f32>,
    state: SegmenterState,
    last_frame_index: Option<usize>,
}

impl NoteSegmenter {
    pub fn new(config: &SegmentationConfig, frame_duration_s: f32) -> Self {
        Self {
            config: config.clone(),
            frame_duration_s: if frame_duration_s.is_finite() {
                frame_duration_s.max(0.0)
            } else {
                0.0
            },
            commit_legato_ratio: None,
            state: SegmenterState::Idle,
            last_frame_index: None,
        }
    }

    /// Stretch every committed note by `1 + ratio`
    pub fn with_commit_legato(mut self, ratio: f32) -> Self {
        self.commit_legato_ratio = Some(ratio.max(0.0));
        self
    }

    pub fn is_active(&self) -> bool {
        matches!(self.state, SegmenterState::Active(_))
    }

    /// Feed the next observation; returns the note it closed, if any
    ///
    /// Observations must arrive in frame order. A frame whose index does not
    /// advance is ignored.
    pub fn push(&mut self, observation: &PitchObservation) -> Option<NoteEvent> {
        if let Some(last) = self.last_frame_index {
            if observation.frame_index <= last {
                log::warn!(
                    "  Ignoring out-of-order frame {} (last was {})",
                    observation.frame_index,
                    last
                );
                return None;
            }
        }
        self.last_frame_index = Some(observation.frame_index);

        let voiced_pitch = self.voiced_pitch(observation);

        match (self.state, voiced_pitch) {
            (SegmenterState::Idle, None) => None,
            (SegmenterState::Idle, Some(midi)) => {
                self.open(observation, midi);
                None
            }
            (SegmenterState::Active(_), None) => self.close(),
            (SegmenterState::Active(mut note), Some(midi)) => {
                if (midi - note.pitch as f32).abs() <= self.config.pitch_tolerance_semitones {
                    note.duration_s =
                        observation.timestamp_s + self.frame_duration_s - note.start_time_s;
                    note.peak_magnitude = note.peak_magnitude.max(observation.magnitude);
                    self.state = SegmenterState::Active(note);
                    None
                } else {
                    // Pitch changed without a gap: offset and onset in the same frame
                    let committed = self.close();
                    self.open(observation, midi);
                    committed
                }
            }
        }
    }

    /// Close the note still sounding at end of stream
    pub fn finish(&mut self) -> Option<NoteEvent> {
        self.close()
    }

    /// Fractional MIDI pitch of a voiced observation, `None` when unvoiced
    fn voiced_pitch(&self, observation: &PitchObservation) -> Option<f32> {
        let frequency = observation.frequency_hz;
        let magnitude = observation.magnitude;

        if !frequency.is_finite() || !magnitude.is_finite() {
            return None;
        }
        if frequency <= self.config.pitch_threshold_hz || frequency <= 0.0 {
            return None;
        }
        if magnitude < self.config.amplitude_threshold {
            return None;
        }

        let midi = hz_to_midi(frequency);
        if !(-0.5..127.5).contains(&midi) {
            return None;
        }
        Some(midi)
    }

    fn open(&mut self, observation: &PitchObservation, midi: f32) {
        self.state = SegmenterState::Active(CurrentNote {
            pitch: midi.round() as u8,
            start_time_s: observation.timestamp_s.max(0.0),
            duration_s: self.frame_duration_s,
            peak_magnitude: observation.magnitude,
        });
    }

    fn close(&mut self) -> Option<NoteEvent> {
        let note = match std::mem::replace(&mut self.state, SegmenterState::Idle) {
            SegmenterState::Idle => return None,
            SegmenterState::Active(note) => note,
        };

        if note.duration_s <= 0.0 || note.duration_s < self.config.min_duration_s {
            return None;
        }

        let duration_s = match self.commit_legato_ratio {
            Some(ratio) => note.duration_s * (1.0 + ratio),
            None => note.duration_s,
        };

        Some(NoteEvent {
            pitch: note.pitch,
            velocity: map_velocity(note.peak_magnitude, self.config.velocity_curve),
            start_time_s: note.start_time_s,
            duration_s,
        })
    }
}

/// Map a peak magnitude in [0, 1] to a MIDI velocity
pub fn map_velocity(peak_magnitude: f32, curve: VelocityCurve) -> u8 {
    if !peak_magnitude.is_finite() || peak_magnitude <= 0.0 {
        return 0;
    }
    let velocity = match curve {
        VelocityCurve::Linear => peak_magnitude * 127.0,
        VelocityCurve::Logarithmic => 127.0 * (peak_magnitude * 9.0 + 1.0).log10(),
    };
    velocity.round().clamp(0.0, 127.0) as u8
}

/// Segment a frame-ordered observation sequence into committed notes
///
/// An empty sequence yields an empty list. A note still open at the end of
/// the stream is flushed through the same commit rules.
pub fn segment(
    observations: &[PitchObservation],
    frame_duration_s: f32,
    config: &SegmentationConfig,
) -> Vec<NoteEvent> {
    run_segmenter(NoteSegmenter::new(config, frame_duration_s), observations)
}

fn run_segmenter(mut segmenter: NoteSegmenter, observations: &[PitchObservation]) -> Vec<NoteEvent> {
    let mut notes: Vec<NoteEvent> = observations
        .iter()
        .filter_map(|observation| segmenter.push(observation))
        .collect();
    notes.extend(segmenter.finish());
    notes
}

pub fn run(state: &mut AnalysisState, config: &Config) -> TranscriptionResult<()> {
    log::info!("Pass 2: Note Segmentation");

    let mut segmenter = NoteSegmenter::new(&config.segmentation, state.frame_duration_s);
    let post = &config.postprocess;
    if post.legato_enabled && post.legato_stage == LegatoStage::Segmenter {
        segmenter = segmenter.with_commit_legato(post.legato_overlap_ratio);
    }

    state.segmented_notes = run_segmenter(segmenter, &state.observations);

    log::debug!(
        "  {} notes committed from {} observations",
        state.segmented_notes.len(),
        state.observations.len()
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    const HOP: f32 = 0.01;

    fn obs(frame_index: usize, frequency_hz: f32, magnitude: f32) -> PitchObservation {
        PitchObservation {
            frame_index,
            frequency_hz,
            magnitude,
            timestamp_s: frame_index as f32 * HOP,
        }
    }

    fn config() -> SegmentationConfig {
        SegmentationConfig {
            min_duration_s: 0.05,
            ..SegmentationConfig::default()
        }
    }

    #[test]
    fn test_empty_stream_yields_no_notes() {
        assert!(segment(&[], HOP, &config()).is_empty());
    }

    #[test]
    fn test_single_note_with_offset() {
        let mut stream: Vec<_> = (0..20).map(|i| obs(i, 440.0, 0.8)).collect();
        stream.push(obs(20, 0.0, 0.0));

        let notes = segment(&stream, HOP, &config());
        assert_eq!(notes.len(), 1);
        assert_eq!(notes[0].pitch, 69);
        assert_eq!(notes[0].velocity, 102);
        assert!((notes[0].start_time_s - 0.0).abs() < 1e-6);
        assert!((notes[0].duration_s - 0.2).abs() < 1e-5);
    }

    #[test]
    fn test_open_note_is_flushed_at_end_of_stream() {
        let stream: Vec<_> = (0..10).map(|i| obs(i, 220.0, 1.0)).collect();
        let notes = segment(&stream, HOP, &config());
        assert_eq!(notes.len(), 1);
        assert_eq!(notes[0].pitch, 57);
        assert!((notes[0].duration_s - 0.1).abs() < 1e-5);
    }

    #[test]
    fn test_short_note_is_discarded() {
        let mut stream: Vec<_> = (0..3).map(|i| obs(i, 440.0, 0.8)).collect();
        stream.push(obs(3, 0.0, 0.0));
        assert!(segment(&stream, HOP, &config()).is_empty());
    }

    #[test]
    fn test_pitch_change_splits_notes() {
        let mut stream: Vec<_> = (0..10).map(|i| obs(i, 440.0, 0.8)).collect();
        stream.extend((10..20).map(|i| obs(i, 554.37, 0.6)));

        let notes = segment(&stream, HOP, &config());
        assert_eq!(notes.len(), 2);
        assert_eq!(notes[0].pitch, 69);
        assert_eq!(notes[1].pitch, 73);
        assert!((notes[1].start_time_s - 0.1).abs() < 1e-6);
        assert!((notes[0].end_time_s() - notes[1].start_time_s).abs() < 1e-5);
    }

    #[test]
    fn test_small_pitch_drift_stays_in_one_note() {
        // 445 Hz is about +0.2 semitones from A4
        let stream: Vec<_> = (0..10)
            .map(|i| obs(i, if i % 2 == 0 { 440.0 } else { 445.0 }, 0.8))
            .collect();
        assert_eq!(segment(&stream, HOP, &config()).len(), 1);
    }

    #[test]
    fn test_quiet_or_low_frames_are_unvoiced() {
        let cfg = config();
        let mut stream: Vec<_> = (0..10).map(|i| obs(i, 440.0, 0.8)).collect();
        stream.push(obs(10, 440.0, cfg.amplitude_threshold / 2.0));
        stream.extend((11..21).map(|i| obs(i, 440.0, 0.8)));
        stream.push(obs(21, 40.0, 0.9));
        stream.extend((22..32).map(|i| obs(i, 440.0, 0.8)));

        assert_eq!(segment(&stream, HOP, &cfg).len(), 3);
    }

    #[test]
    fn test_non_finite_observations_are_unvoiced() {
        let mut stream: Vec<_> = (0..10).map(|i| obs(i, 440.0, 0.8)).collect();
        stream.push(obs(10, f32::NAN, 0.8));
        stream.extend((11..21).map(|i| obs(i, 440.0, f32::INFINITY)));

        let notes = segment(&stream, HOP, &config());
        assert_eq!(notes.len(), 1);
        assert!(notes[0].duration_s.is_finite());
    }

    #[test]
    fn test_peak_magnitude_drives_velocity() {
        let stream: Vec<_> = (0..10)
            .map(|i| obs(i, 440.0, if i == 4 { 1.0 } else { 0.3 }))
            .collect();
        let notes = segment(&stream, HOP, &config());
        assert_eq!(notes[0].velocity, 127);
    }

    #[test]
    fn test_velocity_curves() {
        assert_eq!(map_velocity(0.0, VelocityCurve::Linear), 0);
        assert_eq!(map_velocity(0.5, VelocityCurve::Linear), 64);
        assert_eq!(map_velocity(1.0, VelocityCurve::Linear), 127);
        assert_eq!(map_velocity(2.0, VelocityCurve::Linear), 127);
        assert_eq!(map_velocity(f32::NAN, VelocityCurve::Linear), 0);

        // 127 * log10(0.5 * 9 + 1) = 127 * 0.7404
        assert_eq!(map_velocity(0.5, VelocityCurve::Logarithmic), 94);
        assert_eq!(map_velocity(1.0, VelocityCurve::Logarithmic), 127);
        assert!(map_velocity(0.1, VelocityCurve::Logarithmic) > map_velocity(0.1, VelocityCurve::Linear));
    }

    #[test]
    fn test_commit_legato_stretches_every_note() {
        let mut stream: Vec<_> = (0..10).map(|i| obs(i, 440.0, 0.8)).collect();
        stream.extend((10..20).map(|i| obs(i, 330.0, 0.8)));

        let segmenter = NoteSegmenter::new(&config(), HOP).with_commit_legato(0.15);
        let notes = run_segmenter(segmenter, &stream);
        assert_eq!(notes.len(), 2);
        for note in &notes {
            assert!((note.duration_s - 0.115).abs() < 1e-5);
        }
    }

    #[test]
    fn test_out_of_order_frames_are_ignored() {
        let mut segmenter = NoteSegmenter::new(&config(), HOP);
        assert!(segmenter.push(&obs(5, 440.0, 0.8)).is_none());
        assert!(segmenter.push(&obs(3, 0.0, 0.0)).is_none());
        assert!(segmenter.is_active());
    }
}
