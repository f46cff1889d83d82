// Pipeline execution and monitoring module
// Seed melody -> tokens -> MIDI, and MIDI -> WAV, with optional JSONL tracing

pub mod run;
pub mod settings;
pub mod trace;

pub use run::{
    generate_melody, generate_melody_timeboxed, render_midi_file, render_midi_to_wav, GeneratedMelody,
    PipelineError, DEFAULT_PREDICTOR_TIMEOUT,
};
pub use settings::{GenerationSettings, PipelineSettings, SettingsError};
pub use trace::{read_trace_file, record, Stage, TraceEntry, TraceError, TraceWriter};
