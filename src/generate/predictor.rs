// Predictor interface - The model seam of the melody decoder
// Anything that maps a context window to a next-step distribution can drive generation

use thiserror::Error;

/// Failures raised by, or detected in the output of, a predictor
#[derive(Debug, Error)]
pub enum PredictorError {
    #[error("Distribution has {actual} entries, expected {expected}")]
    WrongLength { expected: usize, actual: usize },

    #[error("Invalid probability {value} at index {index}")]
    InvalidProbability { index: usize, value: f64 },

    #[error("Distribution has no probability mass")]
    ZeroMass,

    #[error("Predictor failed: {0}")]
    Failed(String),
}

/// The bounded slice of recent indices handed to the predictor.
///
/// Shape follows the `(batch, time, classes)` convention of sequence models,
/// with a batch of one.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContextWindow {
    indices: Vec<usize>,
    vocabulary_size: usize,
}

impl ContextWindow {
    pub fn new(indices: Vec<usize>, vocabulary_size: usize) -> Self {
        ContextWindow {
            indices,
            vocabulary_size,
        }
    }

    /// Raw vocabulary indices, oldest first
    pub fn indices(&self) -> &[usize] {
        &self.indices
    }

    /// Most recent index, if any
    pub fn last(&self) -> Option<usize> {
        self.indices.last().copied()
    }

    pub fn len(&self) -> usize {
        self.indices.len()
    }

    pub fn is_empty(&self) -> bool {
        self.indices.is_empty()
    }

    pub fn vocabulary_size(&self) -> usize {
        self.vocabulary_size
    }

    /// `[1, window_len, vocabulary_size]`
    pub fn shape(&self) -> [usize; 3] {
        [1, self.indices.len(), self.vocabulary_size]
    }

    /// Dense one-hot expansion, row-major over the shape.
    /// Indices outside the vocabulary produce an all-zero row.
    pub fn one_hot(&self) -> Vec<f32> {
        let mut data = vec![0.0f32; self.indices.len() * self.vocabulary_size];
        for (row, &index) in self.indices.iter().enumerate() {
            if index < self.vocabulary_size {
                data[row * self.vocabulary_size + index] = 1.0;
            }
        }
        data
    }
}

/// Next-step distribution provider
pub trait Predictor {
    /// Return a probability for every vocabulary index given the window
    fn predict(&self, window: &ContextWindow) -> Result<Vec<f64>, PredictorError>;
}

impl<P: Predictor + ?Sized> Predictor for &P {
    fn predict(&self, window: &ContextWindow) -> Result<Vec<f64>, PredictorError> {
        (**self).predict(window)
    }
}

impl<P: Predictor + ?Sized> Predictor for Box<P> {
    fn predict(&self, window: &ContextWindow) -> Result<Vec<f64>, PredictorError> {
        (**self).predict(window)
    }
}

impl<P: Predictor + ?Sized> Predictor for std::sync::Arc<P> {
    fn predict(&self, window: &ContextWindow) -> Result<Vec<f64>, PredictorError> {
        (**self).predict(window)
    }
}

/// Check a predicted distribution before it reaches the sampler.
///
/// Length must match the vocabulary, every entry must be finite and
/// non-negative, and the total mass must be positive. The sum is not
/// required to be exactly one; the sampler renormalizes.
pub fn validate_distribution(
    distribution: &[f64],
    vocabulary_size: usize,
) -> Result<(), PredictorError> {
    if distribution.len() != vocabulary_size {
        return Err(PredictorError::WrongLength {
            expected: vocabulary_size,
            actual: distribution.len(),
        });
    }

    let mut total = 0.0;
    for (index, &value) in distribution.iter().enumerate() {
        if !value.is_finite() || value < 0.0 {
            return Err(PredictorError::InvalidProbability { index, value });
        }
        total += value;
    }

    if total <= 0.0 {
        return Err(PredictorError::ZeroMass);
    }

    Ok(())
}
