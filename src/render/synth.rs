// Tone Synthesis - One shaped sine tone per timed note
// Constant-amplitude sine, shortened by a trailing gap, with linear fades

use serde::{Deserialize, Serialize};
use std::f64::consts::PI;

use super::timeline::TimedNote;

/// Shape of every rendered tone
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ToneSettings {
    /// Silence left at the end of each note so repeated pitches stay distinct
    pub gap_ms: f64,

    /// Linear fade-in at the start of the tone
    pub fade_in_ms: f64,

    /// Linear fade-out at the end of the tone
    pub fade_out_ms: f64,

    /// Tone level in dBFS
    pub volume_db: f64,
}

impl Default for ToneSettings {
    fn default() -> Self {
        ToneSettings {
            gap_ms: 50.0,
            fade_in_ms: 30.0,
            fade_out_ms: 100.0,
            volume_db: -20.0,
        }
    }
}

/// Convert MIDI note number to frequency (Hz)
pub fn midi_to_freq(midi_note: u8) -> f64 {
    // A4 = 440 Hz = MIDI note 69
    440.0 * 2.0_f64.powf((midi_note as f64 - 69.0) / 12.0)
}

/// Convert a dBFS level to a linear gain
pub fn db_to_gain(db: f64) -> f64 {
    10.0_f64.powf(db / 20.0)
}

/// Milliseconds to a whole number of samples
pub fn ms_to_samples(ms: f64, sample_rate: u32) -> usize {
    if ms <= 0.0 {
        return 0;
    }
    (ms * sample_rate as f64 / 1000.0).round() as usize
}

/// Constant-amplitude sine starting at zero phase
pub fn sine_tone(frequency: f64, length: usize, sample_rate: u32, amplitude: f64) -> Vec<f32> {
    let step = 2.0 * PI * frequency / sample_rate as f64;
    (0..length)
        .map(|n| (amplitude * (step * n as f64).sin()) as f32)
        .collect()
}

/// Apply linear fades in place.
///
/// When both windows together exceed the tone they are scaled down
/// proportionally so they fit exactly.
pub fn apply_fades(samples: &mut [f32], fade_in: usize, fade_out: usize) {
    let len = samples.len();
    let (fade_in, fade_out) = clamp_fades(len, fade_in, fade_out);

    for (i, sample) in samples.iter_mut().take(fade_in).enumerate() {
        *sample *= i as f32 / fade_in as f32;
    }

    if fade_out > 0 {
        let start = len - fade_out;
        for (k, sample) in samples[start..].iter_mut().enumerate() {
            *sample *= (fade_out - 1 - k) as f32 / fade_out as f32;
        }
    }
}

fn clamp_fades(len: usize, fade_in: usize, fade_out: usize) -> (usize, usize) {
    let total = fade_in + fade_out;
    if total <= len {
        return (fade_in, fade_out);
    }
    let fade_in = (len as f64 * fade_in as f64 / total as f64).round() as usize;
    (fade_in.min(len), len - fade_in.min(len))
}

/// Synthesize the shaped tone for one note.
/// Returns `None` when the gap leaves nothing to play.
pub fn render_tone(note: &TimedNote, settings: &ToneSettings, sample_rate: u32) -> Option<Vec<f32>> {
    let length = ms_to_samples(note.duration_ms - settings.gap_ms, sample_rate);
    if length == 0 {
        return None;
    }

    let mut tone = sine_tone(
        midi_to_freq(note.pitch),
        length,
        sample_rate,
        db_to_gain(settings.volume_db),
    );
    apply_fades(
        &mut tone,
        ms_to_samples(settings.fade_in_ms, sample_rate),
        ms_to_samples(settings.fade_out_ms, sample_rate),
    );
    Some(tone)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn note(pitch: u8, duration_ms: f64) -> TimedNote {
        TimedNote {
            track: 0,
            channel: 0,
            pitch,
            start_ms: 0.0,
            duration_ms,
        }
    }

    #[test]
    fn test_midi_to_freq() {
        assert_eq!(midi_to_freq(69), 440.0);
        assert!((midi_to_freq(81) - 880.0).abs() < 1e-9);
        assert!((midi_to_freq(57) - 220.0).abs() < 1e-9);
        assert!((midi_to_freq(60) - 261.6256).abs() < 1e-3);
    }

    #[test]
    fn test_db_to_gain() {
        assert!((db_to_gain(-20.0) - 0.1).abs() < 1e-12);
        assert!((db_to_gain(0.0) - 1.0).abs() < 1e-12);
    }

    #[test]
    fn test_ms_to_samples() {
        assert_eq!(ms_to_samples(1000.0, 44100), 44100);
        assert_eq!(ms_to_samples(10.0, 44100), 441);
        assert_eq!(ms_to_samples(-5.0, 44100), 0);
    }

    #[test]
    fn test_sine_tone_amplitude() {
        let tone = sine_tone(441.0, 100, 44100, 0.5);
        assert_eq!(tone[0], 0.0);
        // Quarter period of 441 Hz at 44.1 kHz is 25 samples
        assert!((tone[25] - 0.5).abs() < 1e-6);
        assert!(tone.iter().all(|s| s.abs() <= 0.5 + 1e-6));
    }

    #[test]
    fn test_fades_shape_edges() {
        let mut samples = vec![1.0f32; 100];
        apply_fades(&mut samples, 10, 20);

        assert_eq!(samples[0], 0.0);
        assert!((samples[5] - 0.5).abs() < 1e-6);
        assert_eq!(samples[50], 1.0);
        assert_eq!(samples[99], 0.0);
        assert!((samples[80] - 0.95).abs() < 1e-6);
    }

    #[test]
    fn test_fades_clamped_on_short_tone() {
        let mut samples = vec![1.0f32; 13];
        apply_fades(&mut samples, 30, 100);

        assert_eq!(clamp_fades(13, 30, 100), (3, 10));
        assert_eq!(samples[0], 0.0);
        assert_eq!(samples[12], 0.0);
        assert!(samples.iter().all(|s| (0.0..=1.0).contains(s)));
    }

    #[test]
    fn test_render_tone_length_and_gap() {
        let settings = ToneSettings::default();
        let tone = render_tone(&note(69, 600.0), &settings, 44100).unwrap();
        // 600 ms minus 50 ms gap
        assert_eq!(tone.len(), ms_to_samples(550.0, 44100));
        assert!(tone.iter().all(|s| s.abs() <= 0.1 + 1e-6));
    }

    #[test]
    fn test_render_tone_shorter_than_gap() {
        let settings = ToneSettings::default();
        assert!(render_tone(&note(60, 40.0), &settings, 44100).is_none());
    }
}
