// Arranger - From decoded tokens to notation
// Run-length assembly of musical events and MIDI file export

pub mod assembler;
pub mod midi;

// Re-export main types
pub use assembler::{assemble_events, total_quarter_length, ArrangeError, MusicalEvent, DEFAULT_STEP_DURATION};
pub use midi::{export_melody_midi, MidiExportOptions};
