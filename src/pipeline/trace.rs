// Pipeline progress tracing
// Append-only JSONL trace file recording each generation / render stage

use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::fs::OpenOptions;
use std::io::Write;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Errors that can occur during trace operations
#[derive(Debug, Error)]
pub enum TraceError {
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),
}

/// Pipeline stages that report progress
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    Decode,
    Assemble,
    ExportMidi,
    Timeline,
    Render,
    ExportWav,
}

impl Stage {
    /// Entry marking the start of this stage (progress = 0.0)
    pub fn start(self, message: impl Into<String>) -> TraceEntry {
        TraceEntry::new(self, 0.0, message.into())
    }

    /// Entry marking completion (progress = 1.0) with structured data
    pub fn complete(self, message: impl Into<String>, data: serde_json::Value) -> TraceEntry {
        let mut entry = TraceEntry::new(self, 1.0, message.into());
        entry.data = Some(data);
        entry
    }
}

/// A single trace entry in the pipeline execution log
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TraceEntry {
    /// RFC 3339 timestamp of when this entry was created
    pub timestamp: String,

    pub stage: Stage,

    /// Progress within the stage [0.0, 1.0]
    pub progress: f32,

    pub message: String,

    /// Optional structured data (token counts, durations, ...)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<serde_json::Value>,
}

impl TraceEntry {
    pub fn new(stage: Stage, progress: f32, message: String) -> Self {
        TraceEntry {
            timestamp: Utc::now().to_rfc3339(),
            stage,
            progress: progress.clamp(0.0, 1.0),
            message,
            data: None,
        }
    }

    /// Serialize to JSON line (with newline)
    pub fn to_json_line(&self) -> Result<String, serde_json::Error> {
        let json = serde_json::to_string(self)?;
        Ok(format!("{}\n", json))
    }
}

/// Appends entries to a JSONL trace file
#[derive(Debug, Clone)]
pub struct TraceWriter {
    file_path: PathBuf,
}

impl TraceWriter {
    pub fn new(file_path: PathBuf) -> Self {
        TraceWriter { file_path }
    }

    /// Append a trace entry, creating the file if needed
    pub fn write(&self, entry: &TraceEntry) -> Result<(), TraceError> {
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.file_path)?;

        file.write_all(entry.to_json_line()?.as_bytes())?;
        file.flush()?;
        Ok(())
    }

    pub fn path(&self) -> &Path {
        &self.file_path
    }
}

/// Record an entry if tracing is enabled
pub fn record(trace: Option<&TraceWriter>, entry: TraceEntry) -> Result<(), TraceError> {
    match trace {
        Some(writer) => writer.write(&entry),
        None => Ok(()),
    }
}

/// Read trace entries from a JSONL file
pub fn read_trace_file(path: &Path) -> Result<Vec<TraceEntry>, TraceError> {
    let contents = std::fs::read_to_string(path)?;
    let mut entries = Vec::new();

    for line in contents.lines() {
        if line.trim().is_empty() {
            continue;
        }
        entries.push(serde_json::from_str(line)?);
    }

    Ok(entries)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_stage_entries() {
        let start = Stage::Decode.start("Generating");
        assert_eq!(start.stage, Stage::Decode);
        assert_eq!(start.progress, 0.0);
        assert!(start.data.is_none());

        let done = Stage::Render.complete("Rendered", serde_json::json!({ "tracks": 2 }));
        assert_eq!(done.progress, 1.0);
        assert_eq!(done.data.unwrap()["tracks"], 2);
    }

    #[test]
    fn test_progress_clamping() {
        assert_eq!(TraceEntry::new(Stage::Timeline, -0.5, String::new()).progress, 0.0);
        assert_eq!(TraceEntry::new(Stage::Timeline, 1.5, String::new()).progress, 1.0);
    }

    #[test]
    fn test_json_line_format() {
        let line = Stage::ExportMidi.start("Writing").to_json_line().unwrap();
        assert!(line.ends_with('\n'));
        assert!(line.contains(r#""stage":"export_midi""#));
        assert!(!line.contains("data"));
    }

    #[test]
    fn test_trace_writer_appends() {
        let temp_dir = TempDir::new().unwrap();
        let trace_path = temp_dir.path().join("trace.jsonl");
        let writer = TraceWriter::new(trace_path.clone());

        record(Some(&writer), Stage::Assemble.start("Start")).unwrap();
        record(Some(&writer), Stage::Assemble.complete("Done", serde_json::json!({}))).unwrap();
        record(None, Stage::Assemble.start("Ignored")).unwrap();

        let entries = read_trace_file(&trace_path).unwrap();
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].stage, Stage::Assemble);
        assert_eq!(entries[1].progress, 1.0);
    }
}
