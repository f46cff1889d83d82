// Event Timeline Builder - Tick-based note events to wall-clock notes
// Pairs every note-on with its note-off per (channel, pitch) and converts ticks to ms

use midly::{MidiMessage, Smf, Timing, TrackEventKind};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum TimelineError {
    #[error("Tempo must be finite and positive, got {0} bpm")]
    InvalidTempo(f64),

    #[error("Ticks per beat must be positive")]
    InvalidResolution,

    #[error("Timecode-based MIDI timing is not supported")]
    UnsupportedTiming,

    #[error("Track {track}: note-off without note-on (channel {channel}, pitch {pitch}, tick {tick})")]
    UnmatchedNoteOff {
        track: usize,
        channel: u8,
        pitch: u8,
        tick: u64,
    },

    #[error("Track {track}: note-on while already sounding (channel {channel}, pitch {pitch}, tick {tick})")]
    OverlappingNoteOn {
        track: usize,
        channel: u8,
        pitch: u8,
        tick: u64,
    },

    #[error("Track {track}: note never released (channel {channel}, pitch {pitch}, started at tick {tick})")]
    UnterminatedNote {
        track: usize,
        channel: u8,
        pitch: u8,
        tick: u64,
    },
}

/// Kind of a track event, as far as the renderer cares
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum EventKind {
    NoteOn { channel: u8, pitch: u8, velocity: u8 },
    NoteOff { channel: u8, pitch: u8 },
    /// Meta, controller and other events still advance time
    Other,
}

/// One delta-timed event of a track
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct MidiEvent {
    pub delta_ticks: u32,
    pub kind: EventKind,
}

impl MidiEvent {
    pub fn note_on(delta_ticks: u32, channel: u8, pitch: u8) -> Self {
        MidiEvent {
            delta_ticks,
            kind: EventKind::NoteOn {
                channel,
                pitch,
                velocity: 64,
            },
        }
    }

    pub fn note_off(delta_ticks: u32, channel: u8, pitch: u8) -> Self {
        MidiEvent {
            delta_ticks,
            kind: EventKind::NoteOff { channel, pitch },
        }
    }

    pub fn other(delta_ticks: u32) -> Self {
        MidiEvent {
            delta_ticks,
            kind: EventKind::Other,
        }
    }
}

/// Tempo and resolution used for tick conversion
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TimelineConfig {
    pub tempo_bpm: f64,
    pub ticks_per_beat: u16,
}

impl TimelineConfig {
    pub fn new(tempo_bpm: f64, ticks_per_beat: u16) -> Result<Self, TimelineError> {
        if !tempo_bpm.is_finite() || tempo_bpm <= 0.0 {
            return Err(TimelineError::InvalidTempo(tempo_bpm));
        }
        if ticks_per_beat == 0 {
            return Err(TimelineError::InvalidResolution);
        }
        Ok(TimelineConfig {
            tempo_bpm,
            ticks_per_beat,
        })
    }

    /// Milliseconds spanned by `ticks`
    pub fn ticks_to_ms(&self, ticks: u64) -> f64 {
        let tick_ms = (60_000.0 / self.tempo_bpm) / self.ticks_per_beat as f64;
        ticks as f64 * tick_ms
    }
}

/// A note with resolved start time and duration
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TimedNote {
    pub track: usize,
    pub channel: u8,
    pub pitch: u8,
    pub start_ms: f64,
    pub duration_ms: f64,
}

impl TimedNote {
    pub fn end_ms(&self) -> f64 {
        self.start_ms + self.duration_ms
    }
}

/// All notes of one track plus the track's total length
#[derive(Debug, Clone, PartialEq)]
pub struct TrackTimeline {
    pub track: usize,
    pub notes: Vec<TimedNote>,
    pub length_ms: f64,
}

/// Pair note-on/note-off events of one track into timed notes.
///
/// Notes are emitted in note-off order. Zero-length notes are dropped.
pub fn build_timeline(
    track: usize,
    events: &[MidiEvent],
    config: &TimelineConfig,
) -> Result<TrackTimeline, TimelineError> {
    // (channel, pitch) -> (start tick, start ms)
    let mut open_notes: BTreeMap<(u8, u8), (u64, f64)> = BTreeMap::new();
    let mut notes = Vec::new();
    let mut tick: u64 = 0;

    for event in events {
        tick += event.delta_ticks as u64;
        let position_ms = config.ticks_to_ms(tick);

        match event.kind {
            EventKind::NoteOn {
                channel,
                pitch,
                velocity,
            } if velocity > 0 => {
                if open_notes.contains_key(&(channel, pitch)) {
                    return Err(TimelineError::OverlappingNoteOn {
                        track,
                        channel,
                        pitch,
                        tick,
                    });
                }
                open_notes.insert((channel, pitch), (tick, position_ms));
            }
            EventKind::NoteOn { channel, pitch, .. } | EventKind::NoteOff { channel, pitch } => {
                let (_, start_ms) = open_notes.remove(&(channel, pitch)).ok_or(
                    TimelineError::UnmatchedNoteOff {
                        track,
                        channel,
                        pitch,
                        tick,
                    },
                )?;

                let duration_ms = position_ms - start_ms;
                if duration_ms > 0.0 {
                    notes.push(TimedNote {
                        track,
                        channel,
                        pitch,
                        start_ms,
                        duration_ms,
                    });
                } else {
                    log::debug!("Track {}: dropping zero-length note {} at tick {}", track, pitch, tick);
                }
            }
            EventKind::Other => {}
        }
    }

    if let Some((&(channel, pitch), &(start_tick, _))) = open_notes.iter().next() {
        return Err(TimelineError::UnterminatedNote {
            track,
            channel,
            pitch,
            tick: start_tick,
        });
    }

    Ok(TrackTimeline {
        track,
        notes,
        length_ms: config.ticks_to_ms(tick),
    })
}

/// Build every track's timeline in parallel; the first error (in track order) wins
pub fn build_timelines(
    tracks: &[Vec<MidiEvent>],
    config: &TimelineConfig,
) -> Result<Vec<TrackTimeline>, TimelineError> {
    let timelines: Vec<Result<TrackTimeline, TimelineError>> = tracks
        .par_iter()
        .enumerate()
        .map(|(index, events)| build_timeline(index, events, config))
        .collect();

    timelines.into_iter().collect()
}

/// Resolution of a parsed file
pub fn ticks_per_beat(smf: &Smf<'_>) -> Result<u16, TimelineError> {
    match smf.header.timing {
        Timing::Metrical(tpb) if tpb.as_int() > 0 => Ok(tpb.as_int()),
        Timing::Metrical(_) => Err(TimelineError::InvalidResolution),
        Timing::Timecode(..) => Err(TimelineError::UnsupportedTiming),
    }
}

/// Flatten midly's track events into renderer events
pub fn tracks_from_smf(smf: &Smf<'_>) -> Vec<Vec<MidiEvent>> {
    smf.tracks
        .iter()
        .map(|track| {
            track
                .iter()
                .map(|event| {
                    let kind = match event.kind {
                        TrackEventKind::Midi {
                            channel,
                            message: MidiMessage::NoteOn { key, vel },
                        } => EventKind::NoteOn {
                            channel: channel.as_int(),
                            pitch: key.as_int(),
                            velocity: vel.as_int(),
                        },
                        TrackEventKind::Midi {
                            channel,
                            message: MidiMessage::NoteOff { key, .. },
                        } => EventKind::NoteOff {
                            channel: channel.as_int(),
                            pitch: key.as_int(),
                        },
                        _ => EventKind::Other,
                    };
                    MidiEvent {
                        delta_ticks: event.delta.as_int(),
                        kind,
                    }
                })
                .collect()
        })
        .collect()
}
