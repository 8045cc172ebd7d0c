//! Transcription session
//!
//! Holds the state a front end keeps between pipeline calls: the loaded
//! audio, the raw segmenter output and the final note list. Analyses are
//! handed out as tickets; a result is only stored if its ticket is still
//! current when it completes, so a new load silently invalidates any
//! analysis still in flight.

use crate::analysis::NoteEvent;
use crate::audio::AudioBuffer;
use crate::config::{clamp_config, Config};
use crate::error::Result as TranscriptionResult;
use crate::passes::pass_3;
use crate::MonoToMidi;
use std::path::Path;

/// A snapshot of the session handed to one analysis run
#[derive(Debug, Clone)]
pub struct AnalysisTicket {
    generation: u64,
    buffer: AudioBuffer,
    config: Config,
}

impl AnalysisTicket {
    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn buffer(&self) -> &AudioBuffer {
        &self.buffer
    }

    /// Run conditioning, estimation and segmentation on the snapshot
    ///
    /// Returns the segmenter's committed notes; post-processing is applied
    /// by the session on completion.
    pub fn analyze(&self) -> TranscriptionResult<Vec<NoteEvent>> {
        let state = MonoToMidi::new(self.config.clone()).analyze(self.buffer.clone())?;
        Ok(state.segmented_notes)
    }
}

/// Session state shared by a front end, usually behind a `Mutex`
#[derive(Debug, Clone, Default)]
pub struct TranscriptionSession {
    config: Config,
    audio: Option<AudioBuffer>,
    generation: u64,
    segmented_notes: Vec<NoteEvent>,
    notes: Vec<NoteEvent>,
}

impl TranscriptionSession {
    pub fn new(config: Config) -> Self {
        Self {
            config: clamp_config(&config).config,
            ..Self::default()
        }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn audio(&self) -> Option<&AudioBuffer> {
        self.audio.as_ref()
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// Replace the loaded audio; clears notes and invalidates open tickets
    pub fn load_audio(&mut self, buffer: AudioBuffer) {
        self.generation += 1;
        self.audio = Some(buffer);
        self.segmented_notes.clear();
        self.notes.clear();
        log::debug!("Session: audio loaded, generation {}", self.generation);
    }

    /// Issue a ticket for the current audio, or `None` when nothing is loaded
    pub fn begin_analysis(&self) -> Option<AnalysisTicket> {
        self.audio.as_ref().map(|buffer| AnalysisTicket {
            generation: self.generation,
            buffer: buffer.clone(),
            config: self.config.clone(),
        })
    }

    /// Store the segmenter output of a finished analysis
    ///
    /// Returns `false` and drops the result when the ticket is stale.
    pub fn complete(&mut self, ticket: &AnalysisTicket, segmented_notes: Vec<NoteEvent>) -> bool {
        if ticket.generation != self.generation {
            log::debug!(
                "Session: dropping stale result (generation {}, current {})",
                ticket.generation,
                self.generation
            );
            return false;
        }
        self.notes = pass_3::post_process(&segmented_notes, &self.config.postprocess);
        self.segmented_notes = segmented_notes;
        true
    }

    /// Analyze the loaded audio synchronously and store the result
    pub fn analyze(&mut self) -> TranscriptionResult<&[NoteEvent]> {
        if let Some(ticket) = self.begin_analysis() {
            let segmented = ticket.analyze()?;
            self.complete(&ticket, segmented);
        }
        Ok(&self.notes)
    }

    /// Apply a new configuration to the stored segmenter output
    ///
    /// Only post-processing is re-run. Conditioning, pitch and segmentation
    /// settings take effect on the next analysis.
    pub fn reprocess(&mut self, config: Config) -> &[NoteEvent] {
        let clamped = clamp_config(&config);
        for adjustment in &clamped.adjustments {
            log::warn!("Config: {}", adjustment);
        }
        self.config = clamped.config;
        self.notes = pass_3::post_process(&self.segmented_notes, &self.config.postprocess);
        &self.notes
    }

    /// Notes committed by the segmenter for the current audio
    pub fn segmented_notes(&self) -> &[NoteEvent] {
        &self.segmented_notes
    }

    /// Final notes for the current audio
    pub fn notes(&self) -> &[NoteEvent] {
        &self.notes
    }

    /// Write the current notes as a MIDI file
    pub fn export_midi(&self, path: &Path) -> TranscriptionResult<()> {
        crate::midi::export_midi(&self.notes, path, &self.config.export, self.config.postprocess.bpm)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn note(pitch: u8, velocity: u8) -> NoteEvent {
        NoteEvent {
            pitch,
            velocity,
            start_time_s: 0.0,
            duration_s: 0.5,
        }
    }

    #[test]
    fn test_session_is_send() {
        fn assert_send<T: Send>() {}
        assert_send::<TranscriptionSession>();
        assert_send::<AnalysisTicket>();
    }

    #[test]
    fn test_no_ticket_without_audio() {
        assert!(TranscriptionSession::default().begin_analysis().is_none());
    }

    #[test]
    fn test_stale_ticket_is_dropped() {
        let mut session = TranscriptionSession::default();
        session.load_audio(AudioBuffer::mono(vec![0.0; 16], 44100));
        let ticket = session.begin_analysis().unwrap();

        session.load_audio(AudioBuffer::mono(vec![0.0; 32], 44100));
        assert!(!session.complete(&ticket, vec![note(60, 100)]));
        assert!(session.notes().is_empty());

        let current = session.begin_analysis().unwrap();
        assert!(session.complete(&current, vec![note(60, 100)]));
        assert_eq!(session.notes().len(), 1);
    }

    #[test]
    fn test_reprocess_keeps_segmenter_output() {
        let mut session = TranscriptionSession::default();
        session.load_audio(AudioBuffer::mono(vec![0.0; 16], 44100));
        let ticket = session.begin_analysis().unwrap();
        session.complete(&ticket, vec![note(60, 100), note(62, 40)]);
        assert_eq!(session.notes().len(), 2);

        let mut strict = Config::default();
        strict.postprocess.velocity_threshold = 64;
        assert_eq!(session.reprocess(strict).len(), 1);

        assert_eq!(session.reprocess(Config::default()).len(), 2);
        assert_eq!(session.segmented_notes().len(), 2);
    }
}
