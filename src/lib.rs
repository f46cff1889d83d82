// Melodist - Token melody generation and MIDI-to-waveform rendering
// Module declarations

pub mod arranger;
pub mod generate;
pub mod pipeline;
pub mod render;
pub mod vocab;

pub use arranger::{assemble_events, export_melody_midi, MidiExportOptions, MusicalEvent};
pub use generate::{MarkovPredictor, MelodyDecoder, Predictor};
pub use pipeline::{generate_melody, render_midi_to_wav, PipelineError, PipelineSettings};
pub use render::{render_midi, RenderSettings};
pub use vocab::{parse_melody, Token, VocabularyCodec};
