//! Turns a capture on disk into one ordered [`EventStream`].
//!
//! Pre-converted JSON is read as-is. Raw captures go through the `jfr` tool:
//! large ones are split into segments first, each segment is printed to a
//! temporary JSON file, and the per-segment events are concatenated in
//! segment order. Segment failures are logged and skipped, so a raw capture
//! never fails the load; at worst the stream comes back empty.

use rayon::prelude::*;
use serde_json::Value;
use std::fs::File;
use std::io::{self, BufReader};
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{info, warn};

use crate::event::{Event, EventStream, SegmentFailure};
use crate::jfr_tool::{JfrCli, JfrTool, ToolError, DEFAULT_CATEGORIES};

pub const DEFAULT_CHUNK_THRESHOLD_MB: u64 = 50;

const MB: u64 = 1024 * 1024;

#[derive(Debug, Error)]
pub enum SourceError {
    #[error("failed to read {}: {source}", path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("invalid JSON in {}: {source}", path.display())]
    Json {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
    #[error("{}: expected a JSON array of events or a recording.events object", path.display())]
    Shape { path: PathBuf },
    #[error(transparent)]
    Tool(#[from] ToolError),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceConfig {
    /// Raw captures above this size (MB) are split before conversion.
    pub chunk_threshold_mb: u64,
    pub categories: Vec<String>,
    /// Convert segments on the rayon pool instead of one after another.
    pub parallel_segments: bool,
}

impl Default for SourceConfig {
    fn default() -> Self {
        SourceConfig {
            chunk_threshold_mb: DEFAULT_CHUNK_THRESHOLD_MB,
            categories: DEFAULT_CATEGORIES.iter().map(|s| s.to_string()).collect(),
            parallel_segments: false,
        }
    }
}

pub struct EventSource {
    tool: Box<dyn JfrTool>,
    config: SourceConfig,
}

impl Default for EventSource {
    fn default() -> Self {
        EventSource::new(JfrCli::default(), SourceConfig::default())
    }
}

impl EventSource {
    pub fn new(tool: impl JfrTool + 'static, config: SourceConfig) -> Self {
        EventSource { tool: Box::new(tool), config }
    }

    pub fn config(&self) -> &SourceConfig {
        &self.config
    }

    /// Load any supported capture.
    ///
    /// Only a structured (`.json`) input that cannot be read or parsed is an
    /// error; raw captures degrade to an empty stream instead.
    pub fn load(&self, path: &Path) -> Result<EventStream, SourceError> {
        if is_structured(path) {
            return load_structured(path);
        }
        Ok(self.load_capture(path))
    }

    /// Convert a raw capture. Never fails; failures are recorded on the stream.
    pub fn load_capture(&self, path: &Path) -> EventStream {
        let size = match std::fs::metadata(path) {
            Ok(m) => m.len(),
            Err(e) => {
                warn!(path = %path.display(), error = %e, "cannot stat capture; nothing to convert");
                return EventStream {
                    failed_segments: vec![SegmentFailure { segment: path.to_path_buf(), reason: e.to_string() }],
                    ..Default::default()
                };
            }
        };

        let threshold = self.config.chunk_threshold_mb;
        if size <= threshold.saturating_mul(MB) {
            return self.convert_all(&[path.to_path_buf()]);
        }

        // Holds the segment files; removed when it goes out of scope.
        let workdir = match tempfile::Builder::new().prefix("jfr_chunks_").tempdir() {
            Ok(d) => d,
            Err(e) => {
                warn!(error = %e, "cannot create segment directory; converting capture whole");
                return self.convert_all(&[path.to_path_buf()]);
            }
        };
        info!(
            path = %path.display(),
            size_mb = size / MB,
            threshold_mb = threshold,
            "splitting capture into segments"
        );
        let segments = match self.tool.disassemble(path, workdir.path(), threshold) {
            Ok(segs) => {
                info!(segments = segs.len(), "capture split");
                if segs.is_empty() {
                    warn!(path = %path.display(), "segmentation produced no segments");
                }
                segs
            }
            Err(e) => {
                warn!(error = %e, "segmentation failed; converting capture whole");
                vec![path.to_path_buf()]
            }
        };
        self.convert_all(&segments)
    }

    fn convert_all(&self, segments: &[PathBuf]) -> EventStream {
        let results: Vec<Result<Vec<Event>, SourceError>> = if self.config.parallel_segments && segments.len() > 1 {
            segments.par_iter().map(|s| self.convert_segment(s)).collect()
        } else {
            segments.iter().map(|s| self.convert_segment(s)).collect()
        };

        let mut stream = EventStream { segments_attempted: segments.len(), ..Default::default() };
        for (segment, result) in segments.iter().zip(results) {
            match result {
                Ok(events) => stream.events.extend(events),
                Err(e) => {
                    warn!(segment = %segment.display(), error = %e, "dropping segment");
                    stream.failed_segments.push(SegmentFailure { segment: segment.clone(), reason: e.to_string() });
                }
            }
        }
        info!(
            events = stream.events.len(),
            segments = stream.segments_attempted,
            failed = stream.failed_segments.len(),
            "capture converted"
        );
        stream
    }

    fn convert_segment(&self, segment: &Path) -> Result<Vec<Event>, SourceError> {
        // Deleted on drop, on success and on every error path alike.
        let json = tempfile::Builder::new()
            .prefix("jfr_segment_")
            .suffix(".json")
            .tempfile()
            .map_err(|source| SourceError::Read { path: segment.to_path_buf(), source })?;
        self.tool.print_json(segment, &self.config.categories, json.path())?;
        read_events(json.path())
    }
}

/// `.json` inputs are taken as already converted.
pub fn is_structured(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .is_some_and(|e| e.eq_ignore_ascii_case("json"))
}

/// Read a structured file without any conversion.
pub fn load_structured(path: &Path) -> Result<EventStream, SourceError> {
    let events = read_events(path)?;
    info!(path = %path.display(), events = events.len(), "loaded structured events");
    Ok(EventStream::from_events(events))
}

fn read_events(path: &Path) -> Result<Vec<Event>, SourceError> {
    let file = File::open(path).map_err(|source| SourceError::Read { path: path.to_path_buf(), source })?;
    let value: Value = serde_json::from_reader(BufReader::new(file))
        .map_err(|source| SourceError::Json { path: path.to_path_buf(), source })?;
    events_from_value(value)
        .map(|vals| vals.into_iter().map(Event::from).collect())
        .ok_or_else(|| SourceError::Shape { path: path.to_path_buf() })
}

/// Accepts a plain array of records or the `jfr print --json` document.
pub fn events_from_value(value: Value) -> Option<Vec<Value>> {
    match value {
        Value::Array(items) => Some(items),
        Value::Object(mut root) => match root.remove("recording")? {
            Value::Object(mut rec) => match rec.remove("events")? {
                Value::Array(items) => Some(items),
                _ => None,
            },
            _ => None,
        },
        _ => None,
    }
}
