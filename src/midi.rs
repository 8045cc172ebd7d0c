//! MIDI export functionality

use crate::analysis::NoteEvent;
use crate::config::ExportConfig;
use crate::error::{Result as TranscriptionResult, TranscriptionError};
use midly::num::{u15, u24, u28, u4, u7};
use midly::{Format, Header, MetaMessage, MidiMessage, Smf, Timing, TrackEvent, TrackEventKind};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Tempo a MIDI reader assumes when the file carries no tempo event
const DEFAULT_FILE_BPM: u32 = 120;

const MAX_TEMPO_MICROS: u32 = 0x00FF_FFFF;

/// External note record: pitch, velocity and absolute start/end in seconds
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct NoteRecord {
    pub pitch: u8,
    pub velocity: u8,
    pub start_s: f32,
    pub end_s: f32,
}

/// Map notes to their external records
pub fn to_records(notes: &[NoteEvent]) -> Vec<NoteRecord> {
    notes
        .iter()
        .map(|note| NoteRecord {
            pitch: note.pitch.min(127),
            velocity: note.velocity.min(127),
            start_s: note.start_time_s,
            end_s: note.end_time_s(),
        })
        .collect()
}

/// Microseconds per beat, saturated to the 24 bits a tempo event can hold
///
/// Below 4 BPM the exact value no longer fits, so the slowest representable
/// tempo (about 3.58 BPM) is used instead.
fn tempo_micros_per_beat(bpm: u32) -> u32 {
    (60_000_000 / bpm.max(1)).min(MAX_TEMPO_MICROS)
}

#[derive(Debug, Clone, Copy)]
struct AbsoluteEvent {
    tick: u32,
    is_note_on: bool,
    pitch: u8,
    velocity: u8,
}

/// Encode a note list as a single-track Standard MIDI File
///
/// One program change on the configured channel, then NoteOn/NoteOff pairs.
/// At equal ticks NoteOff sorts first; overlapping notes of the same key
/// are merged so an early NoteOff never cuts a later note short.
pub fn encode_notes(notes: &[NoteEvent], config: &ExportConfig, bpm: u32) -> TranscriptionResult<Vec<u8>> {
    let ticks_per_beat = config.ticks_per_beat.clamp(1, 0x7FFF);
    let tempo = if config.emit_tempo_map {
        tempo_micros_per_beat(bpm)
    } else {
        tempo_micros_per_beat(DEFAULT_FILE_BPM)
    };
    // Ticks follow the tempo actually written, so a saturated tempo keeps note times right
    let ticks_per_second = ticks_per_beat as f64 * 1_000_000.0 / tempo as f64;
    let channel = u4::new(config.channel.min(15));

    let to_tick = |seconds: f32| -> u32 {
        if !seconds.is_finite() || seconds <= 0.0 {
            0
        } else {
            (seconds as f64 * ticks_per_second).round().min(0x0FFF_FFFF as f64) as u32
        }
    };

    let mut absolute = Vec::with_capacity(notes.len() * 2);
    for record in to_records(notes) {
        let start_tick = to_tick(record.start_s);
        let end_tick = to_tick(record.end_s).max(start_tick + 1);
        absolute.push(AbsoluteEvent {
            tick: start_tick,
            is_note_on: true,
            pitch: record.pitch,
            // velocity 0 would read as a NoteOff
            velocity: record.velocity.max(1),
        });
        absolute.push(AbsoluteEvent {
            tick: end_tick,
            is_note_on: false,
            pitch: record.pitch,
            velocity: 0,
        });
    }
    absolute.sort_by_key(|e| (e.tick, e.is_note_on, e.pitch));

    let mut track: Vec<TrackEvent<'static>> = Vec::with_capacity(absolute.len() + 4);
    track.push(TrackEvent {
        delta: u28::new(0),
        kind: TrackEventKind::Meta(MetaMessage::TrackName(b"mono2midi")),
    });
    if config.emit_tempo_map {
        track.push(TrackEvent {
            delta: u28::new(0),
            kind: TrackEventKind::Meta(MetaMessage::Tempo(u24::new(tempo))),
        });
    }
    track.push(TrackEvent {
        delta: u28::new(0),
        kind: TrackEventKind::Midi {
            channel,
            message: MidiMessage::ProgramChange {
                program: u7::new(config.program.min(127)),
            },
        },
    });

    let mut active = [0u32; 128];
    let mut current_tick = 0u32;
    for event in absolute {
        let key = event.pitch as usize;
        let message = if event.is_note_on {
            active[key] += 1;
            if active[key] > 1 {
                continue;
            }
            MidiMessage::NoteOn {
                key: u7::new(event.pitch),
                vel: u7::new(event.velocity),
            }
        } else {
            active[key] = active[key].saturating_sub(1);
            if active[key] > 0 {
                continue;
            }
            MidiMessage::NoteOff {
                key: u7::new(event.pitch),
                vel: u7::new(0),
            }
        };

        track.push(TrackEvent {
            delta: u28::new(event.tick - current_tick),
            kind: TrackEventKind::Midi { channel, message },
        });
        current_tick = event.tick;
    }

    track.push(TrackEvent {
        delta: u28::new(0),
        kind: TrackEventKind::Meta(MetaMessage::EndOfTrack),
    });

    let smf = Smf {
        header: Header {
            format: Format::SingleTrack,
            timing: Timing::Metrical(u15::new(ticks_per_beat)),
        },
        tracks: vec![track],
    };

    let mut bytes = Vec::new();
    smf.write_std(&mut bytes)
        .map_err(|e| TranscriptionError::MidiExportError(format!("Failed to encode MIDI data: {}", e)))?;
    Ok(bytes)
}

/// Encode notes and write them to `path`
pub fn export_midi(notes: &[NoteEvent], path: &Path, config: &ExportConfig, bpm: u32) -> TranscriptionResult<()> {
    if notes.is_empty() {
        log::warn!("No notes to export, writing an empty track");
    }

    let bytes = encode_notes(notes, config, bpm)?;

    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent).map_err(|e| {
                TranscriptionError::MidiExportError(format!("{}: {}", parent.display(), e))
            })?;
        }
    }
    std::fs::write(path, &bytes)
        .map_err(|e| TranscriptionError::MidiExportError(format!("{}: {}", path.display(), e)))?;

    log::info!("Exported {} notes to {}", notes.len(), path.display());
    Ok(())
}
