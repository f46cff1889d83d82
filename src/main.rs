// Melodist command line
// train / generate / render subcommands

use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;
use thiserror::Error;

use melodist_lib::generate::markov::{MarkovError, MarkovPredictor, DEFAULT_SMOOTHING};
use melodist_lib::pipeline::{
    generate_melody, generate_melody_timeboxed, render_midi_file, PipelineError, PipelineSettings, SettingsError,
    TraceWriter,
};
use melodist_lib::vocab::{parse_melody, VocabError, VocabularyCodec};

#[derive(Parser, Debug)]
#[command(name = "melodist")]
#[command(about = "Token melody generation and MIDI-to-WAV rendering", long_about = None)]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Fit a Markov model to a corpus with one melody per line
    Train {
        /// Vocabulary mapping (JSON)
        vocab: PathBuf,

        /// Corpus of whitespace-separated melodies
        corpus: PathBuf,

        /// Output model file (JSON)
        model: PathBuf,

        /// Additive smoothing for unseen transitions
        #[arg(long, default_value_t = DEFAULT_SMOOTHING)]
        smoothing: f64,
    },

    /// Generate a melody and write it as a MIDI file
    Generate {
        /// Vocabulary mapping (JSON)
        vocab: PathBuf,

        /// Trained model file (JSON)
        model: PathBuf,

        /// Output MIDI file
        output: PathBuf,

        /// Pipeline settings (JSON); defaults when omitted
        settings: Option<PathBuf>,
    },

    /// Render a MIDI file to WAV
    Render {
        /// Input MIDI file
        input: PathBuf,

        /// Output WAV file
        output: PathBuf,

        /// Pipeline settings (JSON); defaults when omitted
        settings: Option<PathBuf>,
    },
}

#[derive(Debug, Error)]
enum CliError {
    #[error("Corpus line {line}: {source}")]
    Corpus { line: usize, source: VocabError },

    #[error(transparent)]
    Vocab(#[from] VocabError),

    #[error(transparent)]
    Model(#[from] MarkovError),

    #[error(transparent)]
    Settings(#[from] SettingsError),

    #[error(transparent)]
    Pipeline(#[from] PipelineError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

fn load_settings(path: Option<&Path>) -> Result<PipelineSettings, SettingsError> {
    match path {
        Some(path) => PipelineSettings::load(path),
        None => Ok(PipelineSettings::default()),
    }
}

fn trace_writer(settings: &PipelineSettings) -> Option<TraceWriter> {
    settings.trace_path.clone().map(TraceWriter::new)
}

/// One melody per non-empty line
fn read_corpus(text: &str) -> Result<Vec<Vec<melodist_lib::Token>>, CliError> {
    let mut melodies = Vec::new();
    for (number, line) in text.lines().enumerate() {
        if line.trim().is_empty() {
            continue;
        }
        let melody = parse_melody(line).map_err(|source| CliError::Corpus { line: number + 1, source })?;
        melodies.push(melody);
    }
    Ok(melodies)
}

fn train(vocab: &Path, corpus: &Path, model: &Path, smoothing: f64) -> Result<(), CliError> {
    let codec = VocabularyCodec::load(vocab)?;
    let melodies = read_corpus(&std::fs::read_to_string(corpus)?)?;

    let padding = PipelineSettings::default().decoder.sequence_length;
    let predictor = MarkovPredictor::train(&codec, &melodies, padding, smoothing)?;
    predictor.save(model)?;

    log::info!("Saved model to {}", model.display());
    Ok(())
}

async fn generate(vocab: &Path, model: &Path, output: &Path, settings: &PipelineSettings) -> Result<(), CliError> {
    let codec = Arc::new(VocabularyCodec::load(vocab)?);
    let predictor = MarkovPredictor::load(model)?;
    let trace = trace_writer(settings);

    let melody = if settings.generation.predictor_timeout_ms.is_some() {
        generate_melody_timeboxed(codec, predictor, settings, trace.as_ref()).await?
    } else {
        generate_melody(codec, predictor, settings, trace.as_ref())?
    };

    std::fs::write(output, &melody.midi)?;
    println!("{}", melody.text());
    log::info!("Wrote {} events to {}", melody.events.len(), output.display());
    Ok(())
}

async fn run(cli: Cli) -> Result<(), CliError> {
    match cli.command {
        Commands::Train {
            vocab,
            corpus,
            model,
            smoothing,
        } => train(&vocab, &corpus, &model, smoothing),
        Commands::Generate {
            vocab,
            model,
            output,
            settings,
        } => {
            let settings = load_settings(settings.as_deref())?;
            generate(&vocab, &model, &output, &settings).await
        }
        Commands::Render {
            input,
            output,
            settings,
        } => {
            let settings = load_settings(settings.as_deref())?;
            let trace = trace_writer(&settings);
            render_midi_file(&input, &output, &settings.render, trace.as_ref())?;
            Ok(())
        }
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let cli = Cli::parse();
    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            log::error!("{}", e);
            eprintln!("error: {}", e);
            ExitCode::FAILURE
        }
    }
}
