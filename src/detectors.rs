use ahash::AHashMap;
use chrono::{DateTime, Utc};
use itertools::Itertools;
use once_cell::sync::Lazy;
use regex::Regex;

use crate::event::{Event, EventKind};
use crate::features::{ExtractorConfig, FeatureSummary, KindCount, TimeRange};
use crate::parser;

/// One classification concern of the extraction pass.
///
/// Every detector sees every event exactly once, in arrival order, together
/// with its classification, and then writes its findings into the summary.
/// `observe` must never panic on a malformed record; missing or odd fields
/// just mean "no signal".
pub trait Detector: Send {
    fn name(&self) -> &'static str;
    fn observe(&mut self, event: &Event, kind: EventKind<'_>);
    fn merge_into(self: Box<Self>, summary: &mut FeatureSummary);
}

/// The detector set the extractor runs for a given config.
pub fn default_detectors(config: &ExtractorConfig) -> Vec<Box<dyn Detector>> {
    vec![
        Box::new(TimeRangeDetector::new(config.time_key.clone())),
        Box::new(StuckThreadDetector::new(config.exemplar_limit)),
        Box::new(SqlDetector::new(config.sql_key.clone(), config.exemplar_limit)),
        Box::new(GcPauseDetector::new(config.pause_keys.clone())),
        Box::new(KindHistogramDetector::new(config.top_kinds_limit, config.max_tracked_kinds)),
    ]
}

/// Running min/max over parseable start times.
pub struct TimeRangeDetector {
    time_key: String,
    min: Option<DateTime<Utc>>,
    max: Option<DateTime<Utc>>,
}

impl TimeRangeDetector {
    pub fn new(time_key: String) -> Self {
        TimeRangeDetector { time_key, min: None, max: None }
    }
}

impl Detector for TimeRangeDetector {
    fn name(&self) -> &'static str {
        "time_range"
    }

    fn observe(&mut self, event: &Event, _kind: EventKind<'_>) {
        let Some(ts) = event.field(&self.time_key).and_then(parser::parse_time_value) else {
            return;
        };
        self.min = Some(self.min.map_or(ts, |m| m.min(ts)));
        self.max = Some(self.max.map_or(ts, |m| m.max(ts)));
    }

    fn merge_into(self: Box<Self>, summary: &mut FeatureSummary) {
        if let (Some(start), Some(end)) = (self.min, self.max) {
            summary.time_range = Some(TimeRange { start, end });
        }
    }
}

pub struct StuckThreadDetector {
    limit: usize,
    count: usize,
    exemplars: Vec<Event>,
}

impl StuckThreadDetector {
    pub fn new(limit: usize) -> Self {
        StuckThreadDetector { limit, count: 0, exemplars: Vec::new() }
    }
}

impl Detector for StuckThreadDetector {
    fn name(&self) -> &'static str {
        "stuck_threads"
    }

    fn observe(&mut self, event: &Event, kind: EventKind<'_>) {
        if !matches!(kind, EventKind::ThreadStuck(_)) {
            return;
        }
        self.count += 1;
        if self.exemplars.len() < self.limit {
            self.exemplars.push(event.clone());
        }
    }

    fn merge_into(self: Box<Self>, summary: &mut FeatureSummary) {
        summary.stuck_thread_count = self.count;
        summary.stuck_threads = self.exemplars;
    }
}

static RE_SQL: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?i)sql").unwrap());

/// Matches a direct `sql` field, or "sql" anywhere in the record text.
///
/// Unrelated records that merely mention SQL also match.
pub struct SqlDetector {
    sql_key: String,
    limit: usize,
    count: usize,
    exemplars: Vec<String>,
}

impl SqlDetector {
    pub fn new(sql_key: String, limit: usize) -> Self {
        SqlDetector { sql_key, limit, count: 0, exemplars: Vec::new() }
    }
}

impl Detector for SqlDetector {
    fn name(&self) -> &'static str {
        "sql"
    }

    fn observe(&mut self, event: &Event, _kind: EventKind<'_>) {
        let text = event.to_text();
        if !event.has_field(&self.sql_key) && !RE_SQL.is_match(&text) {
            return;
        }
        self.count += 1;
        if self.exemplars.len() < self.limit {
            self.exemplars.push(text);
        }
    }

    fn merge_into(self: Box<Self>, summary: &mut FeatureSummary) {
        summary.sql_event_count = self.count;
        summary.top_sql = self.exemplars;
    }
}

/// Largest positive pause across GC events. Zero pauses count as "no pause".
pub struct GcPauseDetector {
    pause_keys: Vec<String>,
    gc_events: usize,
    longest: Option<f64>,
}

impl GcPauseDetector {
    pub fn new(pause_keys: Vec<String>) -> Self {
        GcPauseDetector { pause_keys, gc_events: 0, longest: None }
    }

    fn pause_of(&self, event: &Event) -> f64 {
        self.pause_keys
            .iter()
            .find_map(|k| event.field(k).and_then(parser::parse_pause_millis))
            .unwrap_or(0.0)
    }
}

impl Detector for GcPauseDetector {
    fn name(&self) -> &'static str {
        "gc_pause"
    }

    fn observe(&mut self, event: &Event, kind: EventKind<'_>) {
        if !matches!(kind, EventKind::GarbageCollection(_)) {
            return;
        }
        self.gc_events += 1;
        let pause = self.pause_of(event);
        if pause > 0.0 {
            self.longest = Some(self.longest.map_or(pause, |m| m.max(pause)));
        }
    }

    fn merge_into(self: Box<Self>, summary: &mut FeatureSummary) {
        summary.gc_event_count = self.gc_events;
        summary.longest_gc_pause_ms = self.longest;
    }
}

/// Bucket that absorbs kinds seen after the tracking cap is reached.
pub const OVERFLOW_KIND: &str = "other";

/// Per-kind counts; only the top entries reach the summary.
///
/// At most `max_tracked` distinct kinds get their own counter. Later
/// newcomers are counted together under [`OVERFLOW_KIND`].
pub struct KindHistogramDetector {
    limit: usize,
    max_tracked: usize,
    counts: AHashMap<String, usize>,
    overflow: usize,
}

impl KindHistogramDetector {
    pub fn new(limit: usize, max_tracked: usize) -> Self {
        KindHistogramDetector { limit, max_tracked, counts: AHashMap::new(), overflow: 0 }
    }

    /// Number of kinds holding their own counter.
    pub fn tracked_kinds(&self) -> usize {
        self.counts.len()
    }

    pub fn overflow_count(&self) -> usize {
        self.overflow
    }
}

impl Detector for KindHistogramDetector {
    fn name(&self) -> &'static str {
        "kind_histogram"
    }

    fn observe(&mut self, _event: &Event, kind: EventKind<'_>) {
        let Some(kind) = kind.name() else {
            return;
        };
        if let Some(c) = self.counts.get_mut(kind) {
            *c += 1;
        } else if self.counts.len() < self.max_tracked {
            self.counts.insert(kind.to_string(), 1);
        } else {
            self.overflow += 1;
        }
    }

    fn merge_into(self: Box<Self>, summary: &mut FeatureSummary) {
        let KindHistogramDetector { limit, counts, overflow, .. } = *self;
        let mut entries: Vec<(String, usize)> = counts.into_iter().collect();
        if overflow > 0 {
            match entries.iter_mut().find(|(k, _)| k == OVERFLOW_KIND) {
                Some((_, c)) => *c += overflow,
                None => entries.push((OVERFLOW_KIND.to_string(), overflow)),
            }
        }
        summary.top_event_kinds = entries
            .into_iter()
            .sorted_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)))
            .take(limit)
            .map(|(kind, count)| KindCount { kind, count })
            .collect();
    }
}
