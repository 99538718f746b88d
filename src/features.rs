use chrono::{DateTime, SecondsFormat, Utc};
use itertools::Itertools;
use serde::{Deserialize, Serialize};
use std::fmt::Write as _;
use tracing::debug;

use crate::detectors::{self, Detector};
use crate::event::{Event, EventStream};

/// Sentinels, field names and bounds used by the extraction pass.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExtractorConfig {
    /// Exact kind tag of a stuck-thread event.
    pub stuck_thread_kind: String,
    /// Kind tags starting with this are GC events.
    pub gc_kind_prefix: String,
    /// Pause fields in lookup order; the first present one is used.
    pub pause_keys: Vec<String>,
    pub time_key: String,
    pub sql_key: String,
    /// Cap for the stuck-thread and SQL exemplar lists.
    pub exemplar_limit: usize,
    /// How many SQL exemplars the text block previews.
    pub sql_preview_limit: usize,
    pub top_kinds_limit: usize,
    /// Distinct kinds counted individually; the rest share one bucket.
    pub max_tracked_kinds: usize,
}

pub const DEFAULT_SQL_PREVIEW_LIMIT: usize = 2;
pub const DEFAULT_MAX_TRACKED_KINDS: usize = 1024;

fn default_sql_preview_limit() -> usize {
    DEFAULT_SQL_PREVIEW_LIMIT
}

impl Default for ExtractorConfig {
    fn default() -> Self {
        ExtractorConfig {
            stuck_thread_kind: "jdk.ThreadStuck".to_string(),
            gc_kind_prefix: "jdk.GarbageCollection".to_string(),
            pause_keys: vec!["longestPause".to_string(), "pause".to_string()],
            time_key: "startTime".to_string(),
            sql_key: "sql".to_string(),
            exemplar_limit: 5,
            sql_preview_limit: DEFAULT_SQL_PREVIEW_LIMIT,
            top_kinds_limit: 5,
            max_tracked_kinds: DEFAULT_MAX_TRACKED_KINDS,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimeRange {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

impl std::fmt::Display for TimeRange {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{} --> {}",
            self.start.to_rfc3339_opts(SecondsFormat::AutoSi, true),
            self.end.to_rfc3339_opts(SecondsFormat::AutoSi, true)
        )
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KindCount {
    pub kind: String,
    pub count: usize,
}

/// Bounded digest of one event stream.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeatureSummary {
    pub total_events: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub time_range: Option<TimeRange>,
    /// All stuck-thread matches, not just the kept exemplars.
    pub stuck_thread_count: usize,
    pub stuck_threads: Vec<Event>,
    pub sql_event_count: usize,
    pub top_sql: Vec<String>,
    pub gc_event_count: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub longest_gc_pause_ms: Option<f64>,
    pub top_event_kinds: Vec<KindCount>,
    /// How many SQL exemplars `to_text` previews.
    #[serde(skip, default = "default_sql_preview_limit")]
    pub sql_preview_limit: usize,
}

impl Default for FeatureSummary {
    fn default() -> Self {
        FeatureSummary {
            total_events: 0,
            time_range: None,
            stuck_thread_count: 0,
            stuck_threads: Vec::new(),
            sql_event_count: 0,
            top_sql: Vec::new(),
            gc_event_count: 0,
            longest_gc_pause_ms: None,
            top_event_kinds: Vec::new(),
            sql_preview_limit: DEFAULT_SQL_PREVIEW_LIMIT,
        }
    }
}

impl FeatureSummary {
    pub fn time_range_text(&self) -> Option<String> {
        self.time_range.map(|r| r.to_string())
    }

    pub fn sql_preview(&self) -> &[String] {
        let n = self.top_sql.len().min(self.sql_preview_limit);
        &self.top_sql[..n]
    }

    /// The fixed-layout block handed to the prompt builder.
    pub fn to_text(&self) -> String {
        let none = || "none".to_string();
        let preview = serde_json::to_string(self.sql_preview()).unwrap_or_else(|_| "[]".into());
        let pause = self.longest_gc_pause_ms.map(|p| p.to_string()).unwrap_or_else(none);
        let kinds = if self.top_event_kinds.is_empty() {
            none()
        } else {
            self.top_event_kinds
                .iter()
                .map(|k| format!("{} ({})", k.kind, k.count))
                .join(", ")
        };

        let mut out = String::new();
        let _ = writeln!(out, "JFR Summary:");
        let _ = writeln!(out, "Events: {}", self.total_events);
        let _ = writeln!(out, "Time Range: {}", self.time_range_text().unwrap_or_else(none));
        let _ = writeln!(out, "Stuck Threads: {}", self.stuck_thread_count);
        let _ = writeln!(out, "Example Top SQL: {preview}");
        let _ = writeln!(out, "Longest GC Pause(ms): {pause}");
        let _ = writeln!(out, "SQL Events: {}", self.sql_event_count);
        let _ = writeln!(out, "GC Events: {}", self.gc_event_count);
        let _ = writeln!(out, "Top Event Kinds: {kinds}");
        out
    }
}

/// Runs the detector set over an event sequence in one pass.
#[derive(Debug, Clone, Default)]
pub struct FeatureExtractor {
    config: ExtractorConfig,
}

impl FeatureExtractor {
    pub fn new(config: ExtractorConfig) -> Self {
        FeatureExtractor { config }
    }

    pub fn config(&self) -> &ExtractorConfig {
        &self.config
    }

    pub fn extract<'a, I>(&self, events: I) -> FeatureSummary
    where
        I: IntoIterator<Item = &'a Event>,
    {
        self.extract_with(events, detectors::default_detectors(&self.config))
    }

    /// Like [`extract`](Self::extract) with a caller-chosen detector set.
    pub fn extract_with<'a, I>(&self, events: I, mut detectors: Vec<Box<dyn Detector>>) -> FeatureSummary
    where
        I: IntoIterator<Item = &'a Event>,
    {
        let cfg = &self.config;
        let mut total = 0usize;
        for event in events {
            total += 1;
            let kind = event.classify(&cfg.stuck_thread_kind, &cfg.gc_kind_prefix);
            for d in detectors.iter_mut() {
                d.observe(event, kind);
            }
        }

        let mut summary = FeatureSummary {
            total_events: total,
            sql_preview_limit: cfg.sql_preview_limit,
            ..Default::default()
        };
        for d in detectors {
            debug!(detector = d.name(), "merging detector output");
            d.merge_into(&mut summary);
        }
        summary
    }
}

pub fn extract_features(stream: &EventStream) -> FeatureSummary {
    FeatureExtractor::default().extract(stream)
}

pub fn extract_features_with_config(stream: &EventStream, config: ExtractorConfig) -> FeatureSummary {
    FeatureExtractor::new(config).extract(stream)
}

/// Text block for an event stream using the default configuration.
pub fn summarize(stream: &EventStream) -> String {
    extract_features(stream).to_text()
}
