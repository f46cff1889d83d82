// MIDI Export - Write assembled melodies as Standard MIDI Files using midly
// One meta track (name, tempo, time signature) plus one melody track

use midly::{Header, MetaMessage, MidiMessage, Smf, Timing, Track, TrackEvent, TrackEventKind};
use serde::{Deserialize, Serialize};

use super::assembler::{ArrangeError, MusicalEvent};

/// MIDI export options
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MidiExportOptions {
    /// Pulses per quarter note (PPQ) - typically 480 or 960
    pub ppq: u16,

    /// Tempo written to the meta track
    pub tempo_bpm: f64,

    /// Note-on velocity (1-127)
    pub velocity: u8,

    /// MIDI channel of the melody (0-15)
    pub channel: u8,

    /// Include tempo metadata
    pub include_tempo: bool,

    /// Include 4/4 time signature metadata
    pub include_time_signature: bool,

    /// Name of the melody track (omitted when empty)
    pub track_name: String,
}

impl Default for MidiExportOptions {
    fn default() -> Self {
        MidiExportOptions {
            ppq: 480,
            tempo_bpm: 100.0,
            velocity: 90,
            channel: 0,
            include_tempo: true,
            include_time_signature: true,
            track_name: "Melody".to_string(),
        }
    }
}

impl MidiExportOptions {
    fn validate(&self) -> Result<(), ArrangeError> {
        if self.ppq == 0 || self.ppq > 0x7FFF {
            return Err(ArrangeError::InvalidOptions(format!("ppq {} out of range", self.ppq)));
        }
        if !self.tempo_bpm.is_finite() || self.tempo_bpm <= 0.0 {
            return Err(ArrangeError::InvalidOptions(format!("tempo {} bpm", self.tempo_bpm)));
        }
        if self.velocity == 0 || self.velocity > 127 {
            return Err(ArrangeError::InvalidOptions(format!("velocity {}", self.velocity)));
        }
        if self.channel > 15 {
            return Err(ArrangeError::InvalidOptions(format!("channel {}", self.channel)));
        }
        Ok(())
    }
}

/// Export a melody to MIDI file bytes
///
/// Notes become note-on/note-off pairs on `options.channel`; rests only
/// advance time. Durations are rounded to whole ticks.
pub fn export_melody_midi(events: &[MusicalEvent], options: &MidiExportOptions) -> Result<Vec<u8>, ArrangeError> {
    options.validate()?;

    let header = Header {
        format: midly::Format::Parallel,
        timing: Timing::Metrical(options.ppq.into()),
    };

    let mut meta_track = Track::new();
    if !options.track_name.is_empty() {
        add_track_name(&mut meta_track, 0, "META");
    }
    if options.include_tempo {
        add_tempo(&mut meta_track, 0, options.tempo_bpm);
    }
    if options.include_time_signature {
        add_time_signature(&mut meta_track, 0);
    }
    add_end_of_track(&mut meta_track, 0);

    let melody_track = create_melody_track(events, options);

    let smf = Smf {
        header,
        tracks: vec![meta_track, melody_track],
    };

    let mut bytes = Vec::new();
    smf.write_std(&mut bytes)?;

    log::info!(
        "Exported {} events to MIDI ({} bytes, {} ppq)",
        events.len(),
        bytes.len(),
        options.ppq
    );
    Ok(bytes)
}

/// Build the melody track with delta-encoded note events
fn create_melody_track<'a>(events: &[MusicalEvent], options: &'a MidiExportOptions) -> Track<'a> {
    let mut track = Track::new();
    if !options.track_name.is_empty() {
        add_track_name(&mut track, 0, &options.track_name);
    }

    let ppq = options.ppq as f64;
    let mut pending_delta: u32 = 0;
    // Accumulated position in quarter-lengths, converted once per event to avoid drift
    let mut position = 0.0;
    let mut last_tick: u32 = 0;

    for event in events {
        let start_tick = last_tick + pending_delta;
        position += event.duration();
        let end_tick = ((position * ppq).round() as u32).max(start_tick);

        match *event {
            MusicalEvent::Note { pitch, .. } => {
                track.push(TrackEvent {
                    delta: pending_delta.into(),
                    kind: TrackEventKind::Midi {
                        channel: options.channel.into(),
                        message: MidiMessage::NoteOn {
                            key: pitch.into(),
                            vel: options.velocity.into(),
                        },
                    },
                });
                track.push(TrackEvent {
                    delta: (end_tick - start_tick).into(),
                    kind: TrackEventKind::Midi {
                        channel: options.channel.into(),
                        message: MidiMessage::NoteOff {
                            key: pitch.into(),
                            vel: 0.into(),
                        },
                    },
                });
                last_tick = end_tick;
                pending_delta = 0;
            }
            MusicalEvent::Rest { .. } => {
                pending_delta = end_tick - last_tick;
            }
        }
    }

    add_end_of_track(&mut track, pending_delta);
    track
}

/// Add track name to track
fn add_track_name<'a>(track: &mut Track<'a>, delta: u32, name: &'a str) {
    track.push(TrackEvent {
        delta: delta.into(),
        kind: TrackEventKind::Meta(MetaMessage::TrackName(name.as_bytes())),
    });
}

/// Add tempo meta message
fn add_tempo(track: &mut Track<'_>, delta: u32, bpm: f64) {
    // Microseconds per quarter note, 24-bit
    let us_per_quarter = ((60_000_000.0 / bpm).round() as u32).min(0x00FF_FFFF);

    track.push(TrackEvent {
        delta: delta.into(),
        kind: TrackEventKind::Meta(MetaMessage::Tempo(us_per_quarter.into())),
    });
}

/// Add a 4/4 time signature meta message
fn add_time_signature(track: &mut Track<'_>, delta: u32) {
    track.push(TrackEvent {
        delta: delta.into(),
        // numerator, log2(denominator), clocks per click, 32nds per quarter
        kind: TrackEventKind::Meta(MetaMessage::TimeSignature(4, 2, 24, 8)),
    });
}

/// Add end of track message
fn add_end_of_track(track: &mut Track<'_>, delta: u32) {
    track.push(TrackEvent {
        delta: delta.into(),
        kind: TrackEventKind::Meta(MetaMessage::EndOfTrack),
    });
}
