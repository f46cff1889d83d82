// Generation - Temperature sampling and the autoregressive melody decoder
// The predictor trait is the only seam to the trained model

pub mod decoder;
pub mod markov;
pub mod predictor;
pub mod sampler;

pub use decoder::{CancelFlag, DecodeError, DecodeSession, DecoderConfig, DecoderState, MelodyDecoder};
pub use markov::{MarkovError, MarkovPredictor};
pub use predictor::{validate_distribution, ContextWindow, Predictor, PredictorError};
pub use sampler::{apply_temperature, sample_with_temperature, SamplerError};
