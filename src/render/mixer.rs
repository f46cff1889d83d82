// Final Mix and Audio Rendering
// Overlays synthesized tones onto per-track buffers and sums tracks into the master

use midly::Smf;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::synth::{ms_to_samples, render_tone, ToneSettings};
use super::timeline::{build_timelines, ticks_per_beat, tracks_from_smf, TimelineConfig, TimelineError, TrackTimeline};

#[derive(Debug, Error)]
pub enum RenderError {
    #[error("Failed to parse MIDI: {0}")]
    Midi(#[from] midly::Error),

    #[error(transparent)]
    Timeline(#[from] TimelineError),

    #[error("Invalid render settings: {0}")]
    InvalidSettings(String),

    #[error("Failed to write WAV: {0}")]
    Wav(#[from] hound::Error),
}

/// Render settings for MIDI-to-audio conversion
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RenderSettings {
    /// Playback tempo; the file's own tempo events are not consulted
    pub tempo_bpm: f64,

    /// Output sample rate in Hz
    pub sample_rate: u32,

    /// Per-note tone shape
    pub tone: ToneSettings,
}

impl Default for RenderSettings {
    fn default() -> Self {
        RenderSettings {
            tempo_bpm: 100.0,
            sample_rate: 44100,
            tone: ToneSettings::default(),
        }
    }
}

impl RenderSettings {
    fn validate(&self) -> Result<(), RenderError> {
        if self.sample_rate == 0 {
            return Err(RenderError::InvalidSettings("sample rate must be positive".to_string()));
        }
        let tone = &self.tone;
        if [tone.gap_ms, tone.fade_in_ms, tone.fade_out_ms]
            .iter()
            .any(|v| !v.is_finite() || *v < 0.0)
        {
            return Err(RenderError::InvalidSettings(
                "gap and fade lengths must be finite and non-negative".to_string(),
            ));
        }
        if !tone.volume_db.is_finite() {
            return Err(RenderError::InvalidSettings(format!("volume {} dB", tone.volume_db)));
        }
        Ok(())
    }
}

/// Mono sample buffer spanning a whole render
#[derive(Debug, Clone, PartialEq)]
pub struct AudioBuffer {
    samples: Vec<f32>,
    sample_rate: u32,
}

impl AudioBuffer {
    /// Silence of the given length
    pub fn silent(duration_ms: f64, sample_rate: u32) -> Self {
        AudioBuffer {
            samples: vec![0.0; ms_to_samples(duration_ms, sample_rate)],
            sample_rate,
        }
    }

    pub fn samples(&self) -> &[f32] {
        &self.samples
    }

    pub fn into_samples(self) -> Vec<f32> {
        self.samples
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    pub fn duration_ms(&self) -> f64 {
        self.samples.len() as f64 * 1000.0 / self.sample_rate as f64
    }

    /// Largest absolute sample value
    pub fn peak(&self) -> f32 {
        self.samples.iter().map(|s| s.abs()).fold(0.0, f32::max)
    }

    /// Add `tone` into the buffer starting at `start_ms`.
    /// Samples past the end of the buffer are dropped.
    pub fn overlay(&mut self, tone: &[f32], start_ms: f64) {
        let offset = ms_to_samples(start_ms, self.sample_rate);
        if offset >= self.samples.len() {
            return;
        }
        for (dst, src) in self.samples[offset..].iter_mut().zip(tone) {
            *dst += *src;
        }
    }

    /// Sum another buffer of the same rate into this one
    pub fn mix(&mut self, other: &AudioBuffer) {
        for (dst, src) in self.samples.iter_mut().zip(&other.samples) {
            *dst += *src;
        }
    }
}

/// Render one track's notes into a private buffer of `length_ms`
pub fn render_track(timeline: &TrackTimeline, settings: &RenderSettings, length_ms: f64) -> AudioBuffer {
    let mut buffer = AudioBuffer::silent(length_ms, settings.sample_rate);
    let mut skipped = 0;

    for note in &timeline.notes {
        match render_tone(note, &settings.tone, settings.sample_rate) {
            Some(tone) => buffer.overlay(&tone, note.start_ms),
            None => skipped += 1,
        }
    }

    if skipped > 0 {
        log::warn!(
            "Track {}: skipped {} notes shorter than the {} ms gap",
            timeline.track,
            skipped,
            settings.tone.gap_ms
        );
    }
    buffer
}

/// Render all tracks in parallel, then sum them into the master buffer in
/// track order. The master spans the longest track.
pub fn render_timelines(timelines: &[TrackTimeline], settings: &RenderSettings) -> Result<AudioBuffer, RenderError> {
    settings.validate()?;

    let length_ms = timelines.iter().map(|t| t.length_ms).fold(0.0, f64::max);

    let track_buffers: Vec<AudioBuffer> = timelines
        .par_iter()
        .map(|timeline| render_track(timeline, settings, length_ms))
        .collect();

    let mut master = AudioBuffer::silent(length_ms, settings.sample_rate);
    for buffer in &track_buffers {
        master.mix(buffer);
    }

    log::info!(
        "Rendered {} tracks, {} notes, {:.2}s @ {}Hz (peak {:.3})",
        timelines.len(),
        timelines.iter().map(|t| t.notes.len()).sum::<usize>(),
        length_ms / 1000.0,
        settings.sample_rate,
        master.peak()
    );
    Ok(master)
}

/// Parse MIDI bytes and render every track
pub fn render_midi(bytes: &[u8], settings: &RenderSettings) -> Result<AudioBuffer, RenderError> {
    settings.validate()?;

    let smf = Smf::parse(bytes)?;
    let config = TimelineConfig::new(settings.tempo_bpm, ticks_per_beat(&smf)?)?;
    let timelines = build_timelines(&tracks_from_smf(&smf), &config)?;

    render_timelines(&timelines, settings)
}
