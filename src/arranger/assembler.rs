// Run-Length Note Assembler - Flat token stream to timed musical events
// Consecutive hold markers extend the preceding note or rest by one step each

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::vocab::Token;

/// Step length of one token in quarter-lengths (a sixteenth note)
pub const DEFAULT_STEP_DURATION: f64 = 0.25;

#[derive(Debug, Error)]
pub enum ArrangeError {
    #[error("Terminator symbol inside melody at position {position}")]
    UnexpectedTerminator { position: usize },

    #[error("Step duration must be finite and positive, got {0}")]
    InvalidStepDuration(f64),

    #[error("Invalid MIDI export options: {0}")]
    InvalidOptions(String),

    #[error("Failed to write MIDI: {0}")]
    MidiWrite(#[from] std::io::Error),
}

/// A note or rest with its length in quarter-lengths
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum MusicalEvent {
    Note { pitch: u8, duration: f64 },
    Rest { duration: f64 },
}

impl MusicalEvent {
    pub fn duration(&self) -> f64 {
        match self {
            MusicalEvent::Note { duration, .. } | MusicalEvent::Rest { duration } => *duration,
        }
    }

    pub fn pitch(&self) -> Option<u8> {
        match self {
            MusicalEvent::Note { pitch, .. } => Some(*pitch),
            MusicalEvent::Rest { .. } => None,
        }
    }
}

/// Collapse hold markers into note and rest durations.
///
/// A non-hold token closes the pending event with `step_duration * steps`.
/// The final token closes the pending event even when it is a hold marker
/// (that hold is not counted), and a final note or rest is then emitted as a
/// single step.
pub fn assemble_events(tokens: &[Token], step_duration: f64) -> Result<Vec<MusicalEvent>, ArrangeError> {
    if !step_duration.is_finite() || step_duration <= 0.0 {
        return Err(ArrangeError::InvalidStepDuration(step_duration));
    }

    let mut events = Vec::new();
    let mut pending: Option<Token> = None;
    let mut steps: u32 = 1;

    for (position, &token) in tokens.iter().enumerate() {
        if token.is_terminator() {
            return Err(ArrangeError::UnexpectedTerminator { position });
        }

        let is_last = position + 1 == tokens.len();
        if token.is_hold() && !is_last {
            steps += 1;
            continue;
        }

        if let Some(symbol) = pending {
            events.extend(close(symbol, steps, step_duration));
            steps = 1;
        }
        pending = Some(token);
    }

    if let Some(symbol) = pending {
        events.extend(close(symbol, steps, step_duration));
    }

    log::debug!("Assembled {} events from {} tokens", events.len(), tokens.len());
    Ok(events)
}

fn close(symbol: Token, steps: u32, step_duration: f64) -> Option<MusicalEvent> {
    let duration = step_duration * steps as f64;
    match symbol {
        Token::Pitch(pitch) => Some(MusicalEvent::Note { pitch, duration }),
        Token::Rest => Some(MusicalEvent::Rest { duration }),
        Token::Hold | Token::Terminator => None,
    }
}

/// Total length of a melody in quarter-lengths
pub fn total_quarter_length(events: &[MusicalEvent]) -> f64 {
    events.iter().map(MusicalEvent::duration).sum()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::vocab::parse_melody;

    fn note(pitch: u8, duration: f64) -> MusicalEvent {
        MusicalEvent::Note { pitch, duration }
    }

    #[test]
    fn test_holds_extend_notes() {
        let tokens = parse_melody("64 _ _ 67").unwrap();
        let events = assemble_events(&tokens, 0.25).unwrap();
        assert_eq!(events, vec![note(64, 0.75), note(67, 0.25)]);
    }

    #[test]
    fn test_rests() {
        let tokens = parse_melody("60 _ r _ _ _ 62 _").unwrap();
        let events = assemble_events(&tokens, 0.25).unwrap();
        assert_eq!(
            events,
            vec![
                note(60, 0.5),
                MusicalEvent::Rest { duration: 1.0 },
                note(62, 0.25),
            ]
        );
    }

    #[test]
    fn test_trailing_hold_closes_without_counting() {
        // The final hold only triggers closure of 62
        let tokens = parse_melody("60 62 _").unwrap();
        let events = assemble_events(&tokens, 0.5).unwrap();
        assert_eq!(events, vec![note(60, 0.5), note(62, 0.5)]);
    }

    #[test]
    fn test_repeated_pitches_stay_separate() {
        let tokens = parse_melody("67 _ 67 _ 67 _ _ 65").unwrap();
        let events = assemble_events(&tokens, 0.25).unwrap();
        assert_eq!(
            events,
            vec![note(67, 0.5), note(67, 0.5), note(67, 0.75), note(65, 0.25)]
        );
        assert!((total_quarter_length(&events) - 2.0).abs() < 1e-12);
    }

    #[test]
    fn test_single_and_empty() {
        assert!(assemble_events(&[], 0.25).unwrap().is_empty());
        assert_eq!(
            assemble_events(&[Token::Pitch(72)], 0.25).unwrap(),
            vec![note(72, 0.25)]
        );
        assert!(assemble_events(&[Token::Hold], 0.25).unwrap().is_empty());
    }

    #[test]
    fn test_rejects_terminator_and_bad_step() {
        let tokens = parse_melody("60 / 62").unwrap();
        assert!(matches!(
            assemble_events(&tokens, 0.25),
            Err(ArrangeError::UnexpectedTerminator { position: 1 })
        ));
        assert!(matches!(
            assemble_events(&[Token::Pitch(60)], 0.0),
            Err(ArrangeError::InvalidStepDuration(_))
        ));
    }

    #[test]
    fn test_event_accessors() {
        assert_eq!(note(60, 1.0).pitch(), Some(60));
        assert_eq!(MusicalEvent::Rest { duration: 0.5 }.pitch(), None);
        assert_eq!(MusicalEvent::Rest { duration: 0.5 }.duration(), 0.5);
    }
}
