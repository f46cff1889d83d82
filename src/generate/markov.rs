// Markov table predictor - First-order transition model over vocabulary indices
//
// A lightweight stand-in for a trained network: counts which symbol follows
// which in a corpus of melodies, then serves smoothed rows as next-step
// distributions. Serialized as JSON next to the vocabulary mapping.

use serde::{Deserialize, Serialize};
use std::path::Path;
use thiserror::Error;

use super::predictor::{ContextWindow, Predictor, PredictorError};
use crate::vocab::{Token, VocabError, VocabularyCodec};

#[derive(Debug, Error)]
pub enum MarkovError {
    #[error("Corpus melody outside the vocabulary: {0}")]
    Vocab(#[from] VocabError),

    #[error("Model table is {rows} rows for {vocabulary_size} symbols")]
    Shape { rows: usize, vocabulary_size: usize },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid model file: {0}")]
    Parse(#[from] serde_json::Error),
}

/// Default additive smoothing applied to every transition count
pub const DEFAULT_SMOOTHING: f64 = 0.01;

/// First-order transition counts: `counts[previous][next]`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MarkovPredictor {
    /// Number of vocabulary symbols (row and column count)
    pub vocabulary_size: usize,

    /// Additive smoothing so unseen transitions keep a little mass
    pub smoothing: f64,

    /// Raw transition counts
    pub counts: Vec<Vec<f64>>,
}

impl MarkovPredictor {
    /// Empty model (uniform predictions until trained)
    pub fn new(vocabulary_size: usize, smoothing: f64) -> Self {
        MarkovPredictor {
            vocabulary_size,
            smoothing: smoothing.max(0.0),
            counts: vec![vec![0.0; vocabulary_size]; vocabulary_size],
        }
    }

    /// Count transitions in a set of melodies.
    ///
    /// Each melody is framed the way the decoder sees it: `padding`
    /// terminators in front and a single terminator at the end, so the model
    /// learns both how melodies start and when they stop.
    pub fn train(
        codec: &VocabularyCodec,
        melodies: &[Vec<Token>],
        padding: usize,
        smoothing: f64,
    ) -> Result<Self, MarkovError> {
        let mut model = Self::new(codec.vocabulary_size(), smoothing);
        let terminator = codec.terminator_index();

        for melody in melodies {
            let mut framed = vec![terminator; padding.max(1)];
            framed.extend(codec.encode_all(melody)?);
            framed.push(terminator);

            for pair in framed.windows(2) {
                model.counts[pair[0]][pair[1]] += 1.0;
            }
        }

        log::info!(
            "Trained Markov table on {} melodies ({} symbols)",
            melodies.len(),
            model.vocabulary_size
        );
        Ok(model)
    }

    /// Smoothed, normalized row for a previous index
    pub fn row(&self, previous: usize) -> Option<Vec<f64>> {
        let counts = self.counts.get(previous)?;
        let smoothed: Vec<f64> = counts.iter().map(|c| c + self.smoothing).collect();
        let total: f64 = smoothed.iter().sum();

        if total > 0.0 {
            Some(smoothed.into_iter().map(|c| c / total).collect())
        } else {
            let uniform = 1.0 / self.vocabulary_size.max(1) as f64;
            Some(vec![uniform; self.vocabulary_size])
        }
    }

    /// Load a model, checking the table is square over the vocabulary
    pub fn load(path: &Path) -> Result<Self, MarkovError> {
        let contents = std::fs::read_to_string(path)?;
        let model: Self = serde_json::from_str(&contents)?;

        let square = model.counts.len() == model.vocabulary_size
            && model.counts.iter().all(|row| row.len() == model.vocabulary_size);
        if !square {
            return Err(MarkovError::Shape {
                rows: model.counts.len(),
                vocabulary_size: model.vocabulary_size,
            });
        }
        Ok(model)
    }

    pub fn save(&self, path: &Path) -> Result<(), MarkovError> {
        let json = serde_json::to_string(self)?;
        std::fs::write(path, json)?;
        Ok(())
    }
}

impl Predictor for MarkovPredictor {
    fn predict(&self, window: &ContextWindow) -> Result<Vec<f64>, PredictorError> {
        if window.vocabulary_size() != self.vocabulary_size {
            return Err(PredictorError::Failed(format!(
                "model built for {} symbols, window uses {}",
                self.vocabulary_size,
                window.vocabulary_size()
            )));
        }

        let previous = window
            .last()
            .ok_or_else(|| PredictorError::Failed("empty context window".to_string()))?;

        self.row(previous)
            .ok_or_else(|| PredictorError::Failed(format!("index {} outside model", previous)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::vocab::parse_melody;
    use tempfile::TempDir;

    fn codec() -> VocabularyCodec {
        VocabularyCodec::from_tokens(vec![
            Token::Terminator,
            Token::Hold,
            Token::Rest,
            Token::Pitch(60),
            Token::Pitch(62),
        ])
        .unwrap()
    }

    #[test]
    fn test_train_counts_framed_transitions() {
        let codec = codec();
        let melody = parse_melody("60 _ 62").unwrap();
        let model = MarkovPredictor::train(&codec, &[melody], 2, 0.0).unwrap();

        // "/" -> "/" (padding), "/" -> 60, 60 -> _, _ -> 62, 62 -> "/"
        assert_eq!(model.counts[0][0], 1.0);
        assert_eq!(model.counts[0][3], 1.0);
        assert_eq!(model.counts[3][1], 1.0);
        assert_eq!(model.counts[1][4], 1.0);
        assert_eq!(model.counts[4][0], 1.0);
    }

    #[test]
    fn test_predict_uses_last_index() {
        let codec = codec();
        let melody = parse_melody("60 _ 62").unwrap();
        let model = MarkovPredictor::train(&codec, &[melody], 1, 0.0).unwrap();

        let window = ContextWindow::new(vec![0, 0, 3], 5);
        let dist = model.predict(&window).unwrap();
        assert_eq!(dist, vec![0.0, 1.0, 0.0, 0.0, 0.0]);
    }

    #[test]
    fn test_untrained_row_is_uniform() {
        let model = MarkovPredictor::new(4, 0.0);
        assert_eq!(model.row(2).unwrap(), vec![0.25; 4]);
        assert!(model.row(4).is_none());
    }

    #[test]
    fn test_rejects_mismatched_window() {
        let model = MarkovPredictor::new(4, 0.1);
        let window = ContextWindow::new(vec![0], 5);
        assert!(matches!(model.predict(&window), Err(PredictorError::Failed(_))));
    }

    #[test]
    fn test_save_and_load() {
        let codec = codec();
        let melody = parse_melody("60 62 r").unwrap();
        let model = MarkovPredictor::train(&codec, &[melody], 4, DEFAULT_SMOOTHING).unwrap();

        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("model.json");
        model.save(&path).unwrap();

        assert_eq!(MarkovPredictor::load(&path).unwrap(), model);
    }

    #[test]
    fn test_load_reports_model_errors() {
        let temp_dir = TempDir::new().unwrap();

        let garbage = temp_dir.path().join("garbage.json");
        std::fs::write(&garbage, "{ not a model").unwrap();
        assert!(matches!(MarkovPredictor::load(&garbage), Err(MarkovError::Parse(_))));

        let ragged = temp_dir.path().join("ragged.json");
        std::fs::write(&ragged, r#"{"vocabulary_size": 2, "smoothing": 0.0, "counts": [[1.0, 0.0]]}"#).unwrap();
        assert!(matches!(
            MarkovPredictor::load(&ragged),
            Err(MarkovError::Shape { rows: 1, vocabulary_size: 2 })
        ));

        let missing = temp_dir.path().join("missing.json");
        assert!(matches!(MarkovPredictor::load(&missing), Err(MarkovError::Io(_))));
    }

    #[test]
    fn test_train_rejects_unknown_tokens() {
        let melody = parse_melody("60 71").unwrap();
        assert!(matches!(
            MarkovPredictor::train(&codec(), &[melody], 1, 0.0),
            Err(MarkovError::Vocab(VocabError::UnknownToken(Token::Pitch(71))))
        ));
    }
}
