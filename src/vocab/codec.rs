// Vocabulary Codec - Bijective token <-> index mapping
// Loaded once from a JSON mapping file and immutable afterwards

use std::collections::{BTreeMap, HashMap};
use std::path::Path;
use thiserror::Error;

use super::token::Token;

/// Errors raised by vocabulary loading and lookups
#[derive(Debug, Error)]
pub enum VocabError {
    #[error("Unknown token: {0}")]
    UnknownToken(Token),

    #[error("Unknown index: {index} (vocabulary size {size})")]
    UnknownIndex { index: usize, size: usize },

    #[error("Invalid symbol: {0:?}")]
    InvalidSymbol(String),

    #[error("Index {index} assigned to both {first} and {second}")]
    DuplicateIndex {
        index: usize,
        first: Token,
        second: Token,
    },

    #[error("Token {token} mapped to both index {first} and index {second}")]
    DuplicateToken {
        token: Token,
        first: usize,
        second: usize,
    },

    #[error("Vocabulary indices are not contiguous: missing index {0}")]
    MissingIndex(usize),

    #[error("Vocabulary has no terminator symbol")]
    MissingTerminator,

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Two-way lookup between melody tokens and dense model indices
#[derive(Debug, Clone, PartialEq)]
pub struct VocabularyCodec {
    by_token: HashMap<Token, usize>,
    by_index: Vec<Token>,
    terminator: usize,
}

impl VocabularyCodec {
    /// Build a codec from tokens, assigning indices in iteration order.
    /// Repeated tokens keep their first index.
    pub fn from_tokens<I>(tokens: I) -> Result<Self, VocabError>
    where
        I: IntoIterator<Item = Token>,
    {
        let mut by_index = Vec::new();
        let mut seen = HashMap::new();
        for token in tokens {
            if !seen.contains_key(&token) {
                seen.insert(token, by_index.len());
                by_index.push(token);
            }
        }
        Self::from_table(by_index)
    }

    /// Build a codec from an explicit `(token, index)` table
    pub fn from_pairs<I>(pairs: I) -> Result<Self, VocabError>
    where
        I: IntoIterator<Item = (Token, usize)>,
    {
        let mut ordered: BTreeMap<usize, Token> = BTreeMap::new();
        for (token, index) in pairs {
            if let Some(&first) = ordered.get(&index) {
                return Err(VocabError::DuplicateIndex {
                    index,
                    first,
                    second: token,
                });
            }
            ordered.insert(index, token);
        }

        let mut by_index = Vec::with_capacity(ordered.len());
        for (expected, (index, token)) in ordered.into_iter().enumerate() {
            if index != expected {
                return Err(VocabError::MissingIndex(expected));
            }
            by_index.push(token);
        }

        Self::from_table(by_index)
    }

    fn from_table(by_index: Vec<Token>) -> Result<Self, VocabError> {
        let mut by_token = HashMap::with_capacity(by_index.len());
        for (index, &token) in by_index.iter().enumerate() {
            if let Some(first) = by_token.insert(token, index) {
                return Err(VocabError::DuplicateToken {
                    token,
                    first,
                    second: index,
                });
            }
        }

        let terminator = *by_token
            .get(&Token::Terminator)
            .ok_or(VocabError::MissingTerminator)?;

        Ok(VocabularyCodec {
            by_token,
            by_index,
            terminator,
        })
    }

    /// Parse a JSON mapping of the form `{"/": 0, "_": 1, "60": 2, ...}`
    pub fn from_json_str(json: &str) -> Result<Self, VocabError> {
        let raw: HashMap<String, usize> = serde_json::from_str(json)?;
        let pairs = raw
            .into_iter()
            .map(|(symbol, index)| symbol.parse::<Token>().map(|token| (token, index)))
            .collect::<Result<Vec<_>, _>>()?;
        Self::from_pairs(pairs)
    }

    /// Load a JSON mapping file
    pub fn load(path: &Path) -> Result<Self, VocabError> {
        let contents = std::fs::read_to_string(path)?;
        let codec = Self::from_json_str(&contents)?;
        log::info!(
            "Loaded vocabulary of {} symbols from {}",
            codec.vocabulary_size(),
            path.display()
        );
        Ok(codec)
    }

    /// Serialize back to the JSON mapping format
    pub fn to_json_string(&self) -> Result<String, VocabError> {
        let mut map = serde_json::Map::new();
        for (index, token) in self.by_index.iter().enumerate() {
            map.insert(token.to_string(), serde_json::Value::from(index));
        }
        Ok(serde_json::to_string_pretty(&map)?)
    }

    /// Index of a token
    pub fn encode(&self, token: Token) -> Result<usize, VocabError> {
        self.by_token
            .get(&token)
            .copied()
            .ok_or(VocabError::UnknownToken(token))
    }

    /// Token at an index
    pub fn decode(&self, index: usize) -> Result<Token, VocabError> {
        self.by_index
            .get(index)
            .copied()
            .ok_or(VocabError::UnknownIndex {
                index,
                size: self.by_index.len(),
            })
    }

    /// Encode a whole token sequence, failing on the first unknown token
    pub fn encode_all(&self, tokens: &[Token]) -> Result<Vec<usize>, VocabError> {
        tokens.iter().map(|&t| self.encode(t)).collect()
    }

    /// Number of symbols (the model's class count)
    pub fn vocabulary_size(&self) -> usize {
        self.by_index.len()
    }

    /// Index of the terminator / start padding symbol
    pub fn terminator_index(&self) -> usize {
        self.terminator
    }

    /// All tokens in index order
    pub fn tokens(&self) -> &[Token] {
        &self.by_index
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn small_codec() -> VocabularyCodec {
        VocabularyCodec::from_tokens(vec![
            Token::Terminator,
            Token::Hold,
            Token::Rest,
            Token::Pitch(60),
            Token::Pitch(62),
            Token::Pitch(64),
        ])
        .unwrap()
    }

    #[test]
    fn test_round_trip_every_token() {
        let codec = small_codec();
        for &token in codec.tokens() {
            let index = codec.encode(token).unwrap();
            assert_eq!(codec.decode(index).unwrap(), token);
        }
        for index in 0..codec.vocabulary_size() {
            let token = codec.decode(index).unwrap();
            assert_eq!(codec.encode(token).unwrap(), index);
        }
    }

    #[test]
    fn test_unknown_lookups() {
        let codec = small_codec();
        assert!(matches!(
            codec.encode(Token::Pitch(99)),
            Err(VocabError::UnknownToken(Token::Pitch(99)))
        ));
        assert!(matches!(
            codec.decode(6),
            Err(VocabError::UnknownIndex { index: 6, size: 6 })
        ));
    }

    #[test]
    fn test_from_json() {
        let codec = VocabularyCodec::from_json_str(r#"{"67": 2, "/": 0, "_": 1, "r": 3}"#).unwrap();
        assert_eq!(codec.vocabulary_size(), 4);
        assert_eq!(codec.terminator_index(), 0);
        assert_eq!(codec.decode(2).unwrap(), Token::Pitch(67));
        assert_eq!(codec.encode(Token::Rest).unwrap(), 3);
    }

    #[test]
    fn test_from_json_rejects_gaps_and_duplicates() {
        let gap = VocabularyCodec::from_json_str(r#"{"/": 0, "_": 2}"#);
        assert!(matches!(gap, Err(VocabError::MissingIndex(1))));

        let dup = VocabularyCodec::from_json_str(r#"{"/": 0, "_": 0}"#);
        assert!(matches!(dup, Err(VocabError::DuplicateIndex { index: 0, .. })));

        // "60" and "060" spell the same pitch
        let same_token = VocabularyCodec::from_json_str(r#"{"/": 0, "60": 1, "060": 2}"#);
        assert!(matches!(
            same_token,
            Err(VocabError::DuplicateToken {
                token: Token::Pitch(60),
                first: 1,
                second: 2
            })
        ));

        let bad = VocabularyCodec::from_json_str(r#"{"/": 0, "do": 1}"#);
        assert!(matches!(bad, Err(VocabError::InvalidSymbol(_))));
    }

    #[test]
    fn test_requires_terminator() {
        let result = VocabularyCodec::from_tokens(vec![Token::Hold, Token::Pitch(60)]);
        assert!(matches!(result, Err(VocabError::MissingTerminator)));
    }

    #[test]
    fn test_json_round_trip() {
        let codec = small_codec();
        let json = codec.to_json_string().unwrap();
        let reloaded = VocabularyCodec::from_json_str(&json).unwrap();
        assert_eq!(reloaded, codec);
    }

    #[test]
    fn test_load_from_file() {
        let mut file = NamedTempFile::new().unwrap();
        write!(file, r#"{{"/": 0, "_": 1, "r": 2, "72": 3}}"#).unwrap();

        let codec = VocabularyCodec::load(file.path()).unwrap();
        assert_eq!(codec.vocabulary_size(), 4);
        assert_eq!(codec.encode(Token::Pitch(72)).unwrap(), 3);
    }
}
