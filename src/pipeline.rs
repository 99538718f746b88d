use std::io;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{info, warn};

use crate::backend::{self, Backend, BackendConfig};
use crate::event::{EventStream, SegmentFailure};
use crate::features::{ExtractorConfig, FeatureExtractor, FeatureSummary};
use crate::jfr_tool::JfrCli;
use crate::report;
use crate::source::{EventSource, SourceConfig, SourceError};

#[derive(Debug, Error)]
pub enum PipelineError {
    #[error(transparent)]
    Source(#[from] SourceError),
    #[error("failed to write report to {}: {source}", path.display())]
    Write {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

/// Everything one analysis run needs. Nothing here is shared between runs.
#[derive(Debug, Clone)]
pub struct AnalysisRequest {
    pub capture: PathBuf,
    pub output: PathBuf,
    pub jfr_bin: PathBuf,
    pub source: SourceConfig,
    pub extractor: ExtractorConfig,
    pub backend: BackendConfig,
}

impl AnalysisRequest {
    pub fn new(capture: impl Into<PathBuf>, output: impl Into<PathBuf>, backend: BackendConfig) -> Self {
        AnalysisRequest {
            capture: capture.into(),
            output: output.into(),
            jfr_bin: PathBuf::from("jfr"),
            source: SourceConfig::default(),
            extractor: ExtractorConfig::default(),
            backend,
        }
    }
}

#[derive(Debug, Clone)]
pub struct AnalysisOutcome {
    pub summary: FeatureSummary,
    pub summary_text: String,
    pub findings: String,
    pub report_path: PathBuf,
    pub failed_segments: Vec<SegmentFailure>,
}

/// adapter -> extractor -> prompt -> backend -> writer, in order, on the
/// calling thread.
pub struct Pipeline {
    source: EventSource,
    extractor: FeatureExtractor,
}

impl Pipeline {
    pub fn new(source: EventSource, extractor: FeatureExtractor) -> Self {
        Pipeline { source, extractor }
    }

    pub fn for_request(request: &AnalysisRequest) -> Self {
        Pipeline::new(
            EventSource::new(JfrCli::new(&request.jfr_bin), request.source.clone()),
            FeatureExtractor::new(request.extractor.clone()),
        )
    }

    pub fn load(&self, capture: &Path) -> Result<EventStream, PipelineError> {
        info!(capture = %capture.display(), "loading capture");
        Ok(self.source.load(capture)?)
    }

    pub fn summarize(&self, capture: &Path) -> Result<(FeatureSummary, Vec<SegmentFailure>), PipelineError> {
        let stream = self.load(capture)?;
        info!(events = stream.len(), "extracting features");
        let summary = self.extractor.extract(&stream);
        Ok((summary, stream.failed_segments))
    }

    pub fn run(&self, capture: &Path, output: &Path, backend: &dyn Backend) -> Result<AnalysisOutcome, PipelineError> {
        let (summary, failed_segments) = self.summarize(capture)?;
        let summary_text = summary.to_text();
        info!(backend = %backend.name(), "analyzing summary");
        let findings = backend::analyze(backend, &summary_text);
        self.finish(summary, summary_text, findings, failed_segments, output)
    }

    fn finish(
        &self,
        summary: FeatureSummary,
        summary_text: String,
        findings: String,
        failed_segments: Vec<SegmentFailure>,
        output: &Path,
    ) -> Result<AnalysisOutcome, PipelineError> {
        info!(output = %output.display(), "writing report");
        report::write_report(&findings, output)
            .map_err(|source| PipelineError::Write { path: output.to_path_buf(), source })?;
        Ok(AnalysisOutcome {
            summary,
            summary_text,
            findings,
            report_path: output.to_path_buf(),
            failed_segments,
        })
    }
}

/// Run one request end to end against the configured backend.
pub fn run_analysis(request: &AnalysisRequest) -> Result<AnalysisOutcome, PipelineError> {
    let pipeline = Pipeline::for_request(request);
    match backend::backend_for(request.backend.clone()) {
        Ok(b) => pipeline.run(&request.capture, &request.output, b.as_ref()),
        Err(e) => {
            warn!(backend = %request.backend.label(), error = %e, "backend unavailable");
            let (summary, failed) = pipeline.summarize(&request.capture)?;
            let text = summary.to_text();
            let findings = format!("Error communicating with LLM ({}): {e}", request.backend.label());
            pipeline.finish(summary, text, findings, failed, &request.output)
        }
    }
}
