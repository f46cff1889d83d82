// Pipeline settings - JSON configuration for generation and rendering
// Every section has defaults, so a settings file only lists what it changes

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use thiserror::Error;

use crate::arranger::{MidiExportOptions, DEFAULT_STEP_DURATION};
use crate::generate::DecoderConfig;
use crate::render::RenderSettings;

#[derive(Debug, Error)]
pub enum SettingsError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid settings file: {0}")]
    Parse(#[from] serde_json::Error),
}

/// Parameters of one melody generation run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GenerationSettings {
    /// Whitespace-separated seed melody, e.g. `"67 _ 67 _ 65"`
    pub seed_melody: String,

    /// Maximum number of generated tokens
    pub num_steps: usize,

    /// Sampling temperature (> 0)
    pub temperature: f64,

    /// Fixed RNG seed for reproducible output; entropy when absent
    pub rng_seed: Option<u64>,

    /// Quarter-lengths per token step
    pub step_duration: f64,

    /// Per-step predictor time limit for async generation
    pub predictor_timeout_ms: Option<u64>,
}

impl Default for GenerationSettings {
    fn default() -> Self {
        GenerationSettings {
            seed_melody: "67 _ 67 _ 67 _ _ 65 64 _ 64 _ 64 _ _".to_string(),
            num_steps: 500,
            temperature: 0.9,
            rng_seed: None,
            step_duration: DEFAULT_STEP_DURATION,
            predictor_timeout_ms: None,
        }
    }
}

/// All pipeline configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineSettings {
    pub decoder: DecoderConfig,
    pub generation: GenerationSettings,
    pub midi: MidiExportOptions,
    pub render: RenderSettings,

    /// JSONL progress trace; disabled when absent
    pub trace_path: Option<PathBuf>,
}

impl PipelineSettings {
    pub fn from_json_str(json: &str) -> Result<Self, SettingsError> {
        Ok(serde_json::from_str(json)?)
    }

    pub fn load(path: &Path) -> Result<Self, SettingsError> {
        let contents = std::fs::read_to_string(path)?;
        let settings = Self::from_json_str(&contents)?;
        log::info!("Loaded settings from {}", path.display());
        Ok(settings)
    }

    pub fn save(&self, path: &Path) -> Result<(), SettingsError> {
        std::fs::write(path, serde_json::to_string_pretty(self)?)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_defaults() {
        let settings = PipelineSettings::default();
        assert_eq!(settings.decoder.sequence_length, 64);
        assert_eq!(settings.generation.num_steps, 500);
        assert_eq!(settings.generation.temperature, 0.9);
        assert_eq!(settings.midi.ppq, 480);
        assert_eq!(settings.render.tempo_bpm, 100.0);
        assert_eq!(settings.render.tone.gap_ms, 50.0);
        assert!(settings.trace_path.is_none());
    }

    #[test]
    fn test_partial_file_keeps_defaults() {
        let settings = PipelineSettings::from_json_str(
            r#"{ "generation": { "temperature": 0.3, "rng_seed": 7 }, "render": { "tone": { "fade_out_ms": 20.0 } } }"#,
        )
        .unwrap();

        assert_eq!(settings.generation.temperature, 0.3);
        assert_eq!(settings.generation.rng_seed, Some(7));
        assert_eq!(settings.generation.num_steps, 500);
        assert_eq!(settings.render.tone.fade_out_ms, 20.0);
        assert_eq!(settings.render.tone.fade_in_ms, 30.0);
        assert_eq!(settings.render.sample_rate, 44100);
    }

    #[test]
    fn test_rejects_malformed_json() {
        assert!(matches!(
            PipelineSettings::from_json_str("{ not json"),
            Err(SettingsError::Parse(_))
        ));
    }

    #[test]
    fn test_save_and_load() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("settings.json");

        let mut settings = PipelineSettings::default();
        settings.generation.seed_melody = "60 _ 62".to_string();
        settings.save(&path).unwrap();

        let loaded = PipelineSettings::load(&path).unwrap();
        assert_eq!(loaded.generation, settings.generation);
    }
}
