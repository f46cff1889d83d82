// Melody Tokens - Symbolic alphabet of the melody language
// Pitches are MIDI note numbers, the rest are single-character markers

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use super::codec::VocabError;

/// Textual form of the rest marker
pub const REST_SYMBOL: &str = "r";

/// Textual form of the hold (prolongation) marker
pub const HOLD_SYMBOL: &str = "_";

/// Textual form of the sequence terminator, also used as the start padding
pub const TERMINATOR_SYMBOL: &str = "/";

/// A single symbol of the melody vocabulary
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum Token {
    /// Sounding note at a MIDI pitch (0-127)
    Pitch(u8),

    /// Silence for one step
    Rest,

    /// Extend the previous note or rest by one step
    Hold,

    /// End of a melody (and start-of-sequence padding)
    Terminator,
}

impl Token {
    /// True for the hold marker
    pub fn is_hold(&self) -> bool {
        matches!(self, Token::Hold)
    }

    /// True for the sequence terminator
    pub fn is_terminator(&self) -> bool {
        matches!(self, Token::Terminator)
    }
}

impl fmt::Display for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Token::Pitch(pitch) => write!(f, "{}", pitch),
            Token::Rest => f.write_str(REST_SYMBOL),
            Token::Hold => f.write_str(HOLD_SYMBOL),
            Token::Terminator => f.write_str(TERMINATOR_SYMBOL),
        }
    }
}

impl FromStr for Token {
    type Err = VocabError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            REST_SYMBOL => Ok(Token::Rest),
            HOLD_SYMBOL => Ok(Token::Hold),
            TERMINATOR_SYMBOL => Ok(Token::Terminator),
            _ => match s.parse::<u8>() {
                Ok(pitch) if pitch <= 127 => Ok(Token::Pitch(pitch)),
                _ => Err(VocabError::InvalidSymbol(s.to_string())),
            },
        }
    }
}

impl TryFrom<String> for Token {
    type Error = VocabError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<Token> for String {
    fn from(token: Token) -> Self {
        token.to_string()
    }
}

/// Parse a whitespace-separated melody such as `"67 _ 67 _ r _ 65"`
pub fn parse_melody(text: &str) -> Result<Vec<Token>, VocabError> {
    text.split_whitespace().map(Token::from_str).collect()
}

/// Render tokens back to the whitespace-separated form
pub fn format_melody(tokens: &[Token]) -> String {
    tokens
        .iter()
        .map(|t| t.to_string())
        .collect::<Vec<_>>()
        .join(" ")
}
