// Pipeline runs - Generate-then-save and MIDI-to-WAV orchestration
// Each run either completes fully or returns an error; no partial output is kept

use rand::rngs::StdRng;
use rand::SeedableRng;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

use super::settings::{PipelineSettings, SettingsError};
use super::trace::{record, Stage, TraceError, TraceWriter};
use crate::arranger::{assemble_events, export_melody_midi, total_quarter_length, ArrangeError, MusicalEvent};
use crate::generate::{DecodeError, MelodyDecoder, Predictor};
use crate::render::timeline::{ticks_per_beat, tracks_from_smf};
use crate::render::{build_timelines, encode_wav, render_timelines, RenderError, RenderSettings, TimelineConfig};
use crate::vocab::{format_melody, parse_melody, Token, VocabError, VocabularyCodec};

/// Predictor time limit when async generation has none configured
pub const DEFAULT_PREDICTOR_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Debug, Error)]
pub enum PipelineError {
    #[error(transparent)]
    Vocab(#[from] VocabError),

    #[error(transparent)]
    Decode(#[from] DecodeError),

    #[error(transparent)]
    Arrange(#[from] ArrangeError),

    #[error(transparent)]
    Render(#[from] RenderError),

    #[error("Trace error: {0}")]
    Trace(#[from] TraceError),

    #[error(transparent)]
    Settings(#[from] SettingsError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Everything produced by one generation run
#[derive(Debug, Clone)]
pub struct GeneratedMelody {
    /// Seed plus generated tokens
    pub tokens: Vec<Token>,

    /// Run-length decoded notes and rests
    pub events: Vec<MusicalEvent>,

    /// Standard MIDI File bytes
    pub midi: Vec<u8>,
}

impl GeneratedMelody {
    /// Melody in its textual token form
    pub fn text(&self) -> String {
        format_melody(&self.tokens)
    }
}

fn make_rng(seed: Option<u64>) -> StdRng {
    match seed {
        Some(seed) => StdRng::seed_from_u64(seed),
        None => StdRng::from_entropy(),
    }
}

/// Generate a melody with the configured seed and turn it into MIDI
pub fn generate_melody<P: Predictor>(
    codec: Arc<VocabularyCodec>,
    predictor: P,
    settings: &PipelineSettings,
    trace: Option<&TraceWriter>,
) -> Result<GeneratedMelody, PipelineError> {
    let generation = &settings.generation;
    let seed = parse_melody(&generation.seed_melody)?;
    let mut rng = make_rng(generation.rng_seed);

    record(trace, Stage::Decode.start(format!("Decoding up to {} steps", generation.num_steps)))?;
    let decoder = MelodyDecoder::new(codec, predictor, settings.decoder);
    let tokens = decoder.generate(&seed, generation.num_steps, generation.temperature, &mut rng)?;
    record_decoded(trace, &seed, &tokens)?;

    finish_melody(tokens, settings, trace)
}

/// Like [`generate_melody`], running each predictor call on the blocking
/// pool under the configured time limit
pub async fn generate_melody_timeboxed<P: Predictor + Send + Sync + 'static>(
    codec: Arc<VocabularyCodec>,
    predictor: P,
    settings: &PipelineSettings,
    trace: Option<&TraceWriter>,
) -> Result<GeneratedMelody, PipelineError> {
    let generation = &settings.generation;
    let seed = parse_melody(&generation.seed_melody)?;
    let mut rng = make_rng(generation.rng_seed);
    let timeout = generation
        .predictor_timeout_ms
        .map(Duration::from_millis)
        .unwrap_or(DEFAULT_PREDICTOR_TIMEOUT);

    record(trace, Stage::Decode.start(format!("Decoding up to {} steps", generation.num_steps)))?;
    let decoder = Arc::new(MelodyDecoder::new(codec, predictor, settings.decoder));
    let tokens = decoder
        .generate_timeboxed(&seed, generation.num_steps, generation.temperature, &mut rng, timeout, None)
        .await?;
    record_decoded(trace, &seed, &tokens)?;

    finish_melody(tokens, settings, trace)
}

fn record_decoded(trace: Option<&TraceWriter>, seed: &[Token], tokens: &[Token]) -> Result<(), TraceError> {
    record(
        trace,
        Stage::Decode.complete(
            "Decoding finished",
            serde_json::json!({ "seed_tokens": seed.len(), "generated_tokens": tokens.len() - seed.len() }),
        ),
    )
}

fn finish_melody(
    tokens: Vec<Token>,
    settings: &PipelineSettings,
    trace: Option<&TraceWriter>,
) -> Result<GeneratedMelody, PipelineError> {
    record(trace, Stage::Assemble.start("Collapsing hold markers"))?;
    let events = assemble_events(&tokens, settings.generation.step_duration)?;
    record(
        trace,
        Stage::Assemble.complete(
            "Assembled events",
            serde_json::json!({ "events": events.len(), "quarter_length": total_quarter_length(&events) }),
        ),
    )?;

    record(trace, Stage::ExportMidi.start("Writing MIDI"))?;
    let midi = export_melody_midi(&events, &settings.midi)?;
    record(
        trace,
        Stage::ExportMidi.complete("MIDI written", serde_json::json!({ "bytes": midi.len() })),
    )?;

    Ok(GeneratedMelody { tokens, events, midi })
}

/// Render MIDI bytes to WAV bytes
pub fn render_midi_to_wav(
    midi: &[u8],
    settings: &RenderSettings,
    trace: Option<&TraceWriter>,
) -> Result<Vec<u8>, PipelineError> {
    record(trace, Stage::Timeline.start("Pairing note events"))?;
    let smf = midly::Smf::parse(midi).map_err(RenderError::from)?;
    let config = TimelineConfig::new(settings.tempo_bpm, ticks_per_beat(&smf).map_err(RenderError::from)?)
        .map_err(RenderError::from)?;
    let timelines = build_timelines(&tracks_from_smf(&smf), &config).map_err(RenderError::from)?;
    record(
        trace,
        Stage::Timeline.complete(
            "Timelines built",
            serde_json::json!({
                "tracks": timelines.len(),
                "notes": timelines.iter().map(|t| t.notes.len()).sum::<usize>(),
            }),
        ),
    )?;

    record(trace, Stage::Render.start("Rendering MIDI"))?;
    let buffer = render_timelines(&timelines, settings)?;
    record(
        trace,
        Stage::Render.complete(
            "Rendered audio",
            serde_json::json!({ "samples": buffer.len(), "duration_ms": buffer.duration_ms(), "peak": buffer.peak() }),
        ),
    )?;

    record(trace, Stage::ExportWav.start("Encoding WAV"))?;
    let wav = encode_wav(&buffer)?;
    record(
        trace,
        Stage::ExportWav.complete("WAV encoded", serde_json::json!({ "bytes": wav.len() })),
    )?;

    Ok(wav)
}

/// Render a MIDI file on disk to a WAV file on disk
pub fn render_midi_file(
    input: &Path,
    output: &Path,
    settings: &RenderSettings,
    trace: Option<&TraceWriter>,
) -> Result<(), PipelineError> {
    let midi = std::fs::read(input)?;
    let wav = render_midi_to_wav(&midi, settings, trace)?;
    std::fs::write(output, wav)?;
    log::info!("Rendered {} -> {}", input.display(), output.display());
    Ok(())
}
