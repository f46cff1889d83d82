// Render Engine - MIDI event timelines to audio
// Pairs note events, synthesizes sine tones and mixes tracks into one buffer

pub mod mixer;
pub mod synth;
pub mod timeline;
pub mod wav;

// Re-export main types
pub use mixer::{render_midi, render_timelines, AudioBuffer, RenderError, RenderSettings};
pub use synth::{midi_to_freq, ToneSettings};
pub use timeline::{build_timeline, build_timelines, EventKind, MidiEvent, TimedNote, TimelineConfig, TimelineError, TrackTimeline};
pub use wav::{encode_wav, write_wav};
