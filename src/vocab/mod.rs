// Vocabulary - Melody tokens and the token <-> index codec
// Shared by the decoder (index space) and the arranger (token space)

pub mod codec;
pub mod token;

pub use codec::{VocabError, VocabularyCodec};
pub use token::{format_melody, parse_melody, Token};
