// Melody Decoder - Autoregressive generation loop
// Feeds a rolling context window to the predictor, samples one token per step,
// and stops on the terminator symbol or the step limit

use rand::Rng;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

use super::predictor::{validate_distribution, ContextWindow, Predictor, PredictorError};
use super::sampler::{sample_with_temperature, validate_temperature, SamplerError};
use crate::vocab::{Token, VocabError, VocabularyCodec};

/// Errors that abort a generation run
#[derive(Debug, Error)]
pub enum DecodeError {
    #[error("Temperature must be finite and positive, got {0}")]
    InvalidTemperature(f64),

    #[error("Seed token not in vocabulary: {0}")]
    Seed(#[source] VocabError),

    #[error("Seed contains the terminator symbol at position {position}")]
    TerminatorInSeed { position: usize },

    #[error("Vocabulary lookup failed at step {step}: {source}")]
    Vocab {
        step: usize,
        #[source]
        source: VocabError,
    },

    #[error("Predictor failure at step {step}: {source}")]
    Predictor {
        step: usize,
        #[source]
        source: PredictorError,
    },

    #[error("Predictor exceeded {timeout_ms} ms at step {step}")]
    PredictorTimeout { step: usize, timeout_ms: u128 },

    #[error("Sampling failed at step {step}: {source}")]
    Sampler {
        step: usize,
        #[source]
        source: SamplerError,
    },

    #[error("Generation cancelled before step {step}")]
    Cancelled { step: usize },

    #[error("Decoder session already terminated")]
    AlreadyTerminated,
}

/// Context window geometry
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DecoderConfig {
    /// Number of terminator symbols padded in front of the seed
    pub sequence_length: usize,

    /// Window length handed to the predictor each step
    pub max_context_length: usize,
}

impl Default for DecoderConfig {
    fn default() -> Self {
        DecoderConfig {
            sequence_length: 64,
            max_context_length: 64,
        }
    }
}

/// Decoder lifecycle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DecoderState {
    Running,
    Terminated,
}

/// Cooperative cancellation shared between a caller and a running decoder
#[derive(Debug, Clone, Default)]
pub struct CancelFlag(Arc<AtomicBool>);

impl CancelFlag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// State of one generation run: the context window and the melody so far.
///
/// Drive it by alternating [`DecodeSession::next_window`] and
/// [`DecodeSession::advance`] until the state is `Terminated`.
#[derive(Debug)]
pub struct DecodeSession<'a> {
    codec: &'a VocabularyCodec,
    config: DecoderConfig,
    temperature: f64,
    context: Vec<usize>,
    melody: Vec<Token>,
    step: usize,
    max_steps: usize,
    state: DecoderState,
}

impl<'a> DecodeSession<'a> {
    /// Open a session: pad with start symbols, then append the encoded seed
    pub fn start(
        codec: &'a VocabularyCodec,
        config: DecoderConfig,
        seed: &[Token],
        max_steps: usize,
        temperature: f64,
    ) -> Result<Self, DecodeError> {
        validate_temperature(temperature).map_err(|_| DecodeError::InvalidTemperature(temperature))?;

        if let Some(position) = seed.iter().position(Token::is_terminator) {
            return Err(DecodeError::TerminatorInSeed { position });
        }

        let mut context = vec![codec.terminator_index(); config.sequence_length];
        context.extend(codec.encode_all(seed).map_err(DecodeError::Seed)?);

        let state = if max_steps == 0 {
            DecoderState::Terminated
        } else {
            DecoderState::Running
        };

        Ok(DecodeSession {
            codec,
            config,
            temperature,
            context,
            melody: seed.to_vec(),
            step: 0,
            max_steps,
            state,
        })
    }

    pub fn state(&self) -> DecoderState {
        self.state
    }

    /// Number of completed steps
    pub fn step(&self) -> usize {
        self.step
    }

    /// Melody so far (seed plus generated tokens)
    pub fn melody(&self) -> &[Token] {
        &self.melody
    }

    /// Drop everything but the most recent `max_context_length` indices
    /// and return the window for the next prediction
    pub fn next_window(&mut self) -> ContextWindow {
        let keep = self.config.max_context_length;
        if self.context.len() > keep {
            self.context.drain(..self.context.len() - keep);
        }
        ContextWindow::new(self.context.clone(), self.codec.vocabulary_size())
    }

    /// Consume one predicted distribution: sample, extend the context,
    /// and either grow the melody or terminate
    pub fn advance<R: Rng + ?Sized>(
        &mut self,
        distribution: &[f64],
        rng: &mut R,
    ) -> Result<DecoderState, DecodeError> {
        if self.state == DecoderState::Terminated {
            return Err(DecodeError::AlreadyTerminated);
        }
        let step = self.step;

        validate_distribution(distribution, self.codec.vocabulary_size())
            .map_err(|source| DecodeError::Predictor { step, source })?;

        let index = sample_with_temperature(distribution, self.temperature, rng)
            .map_err(|source| DecodeError::Sampler { step, source })?;

        self.context.push(index);
        let token = self
            .codec
            .decode(index)
            .map_err(|source| DecodeError::Vocab { step, source })?;
        self.step += 1;

        if token.is_terminator() {
            log::debug!("Terminator sampled at step {}", step);
            self.state = DecoderState::Terminated;
        } else {
            self.melody.push(token);
            if self.step >= self.max_steps {
                self.state = DecoderState::Terminated;
            }
        }

        Ok(self.state)
    }

    /// Seed followed by every generated token
    pub fn finish(self) -> Vec<Token> {
        self.melody
    }
}

/// Melody generator bound to one vocabulary and one predictor
pub struct MelodyDecoder<P> {
    codec: Arc<VocabularyCodec>,
    predictor: P,
    config: DecoderConfig,
}

impl<P: Predictor> MelodyDecoder<P> {
    pub fn new(codec: Arc<VocabularyCodec>, predictor: P, config: DecoderConfig) -> Self {
        MelodyDecoder {
            codec,
            predictor,
            config,
        }
    }

    pub fn codec(&self) -> &VocabularyCodec {
        &self.codec
    }

    pub fn config(&self) -> DecoderConfig {
        self.config
    }

    /// Generate up to `max_steps` tokens after `seed`
    pub fn generate<R: Rng + ?Sized>(
        &self,
        seed: &[Token],
        max_steps: usize,
        temperature: f64,
        rng: &mut R,
    ) -> Result<Vec<Token>, DecodeError> {
        self.run(seed, max_steps, temperature, rng, None)
    }

    /// Like [`MelodyDecoder::generate`], checking `cancel` before every
    /// predictor call
    pub fn generate_cancellable<R: Rng + ?Sized>(
        &self,
        seed: &[Token],
        max_steps: usize,
        temperature: f64,
        rng: &mut R,
        cancel: &CancelFlag,
    ) -> Result<Vec<Token>, DecodeError> {
        self.run(seed, max_steps, temperature, rng, Some(cancel))
    }

    fn run<R: Rng + ?Sized>(
        &self,
        seed: &[Token],
        max_steps: usize,
        temperature: f64,
        rng: &mut R,
        cancel: Option<&CancelFlag>,
    ) -> Result<Vec<Token>, DecodeError> {
        let mut session = DecodeSession::start(&self.codec, self.config, seed, max_steps, temperature)?;
        log::info!(
            "Generating up to {} steps from a {}-token seed (temperature {:.2})",
            max_steps,
            seed.len(),
            temperature
        );

        while session.state() == DecoderState::Running {
            let step = session.step();
            if cancel.is_some_and(CancelFlag::is_cancelled) {
                return Err(DecodeError::Cancelled { step });
            }

            let window = session.next_window();
            let distribution = self
                .predictor
                .predict(&window)
                .map_err(|source| DecodeError::Predictor { step, source })?;
            session.advance(&distribution, rng)?;
        }

        log::info!(
            "Generated {} tokens in {} steps",
            session.melody().len() - seed.len(),
            session.step()
        );
        Ok(session.finish())
    }
}

impl<P: Predictor + Send + Sync + 'static> MelodyDecoder<P> {
    /// Generate with every predictor call run on the blocking pool and
    /// bounded by `timeout`. Steps remain strictly sequential.
    pub async fn generate_timeboxed<R: Rng + ?Sized>(
        self: Arc<Self>,
        seed: &[Token],
        max_steps: usize,
        temperature: f64,
        rng: &mut R,
        timeout: Duration,
        cancel: Option<CancelFlag>,
    ) -> Result<Vec<Token>, DecodeError> {
        let mut session = DecodeSession::start(&self.codec, self.config, seed, max_steps, temperature)?;

        while session.state() == DecoderState::Running {
            let step = session.step();
            if cancel.as_ref().is_some_and(CancelFlag::is_cancelled) {
                return Err(DecodeError::Cancelled { step });
            }

            let window = session.next_window();
            let decoder = Arc::clone(&self);
            let call = tokio::task::spawn_blocking(move || decoder.predictor.predict(&window));

            let distribution = match tokio::time::timeout(timeout, call).await {
                Err(_) => {
                    return Err(DecodeError::PredictorTimeout {
                        step,
                        timeout_ms: timeout.as_millis(),
                    })
                }
                Ok(Err(join_error)) => {
                    return Err(DecodeError::Predictor {
                        step,
                        source: PredictorError::Failed(join_error.to_string()),
                    })
                }
                Ok(Ok(result)) => result.map_err(|source| DecodeError::Predictor { step, source })?,
            };

            session.advance(&distribution, rng)?;
        }

        Ok(session.finish())
    }
}
