use jfrscope::backend::{Backend, BackendConfig, BackendError};
use jfrscope::features::{ExtractorConfig, FeatureExtractor};
use jfrscope::jfr_tool::JfrCli;
use jfrscope::pipeline::{self, AnalysisRequest, Pipeline, PipelineError};
use jfrscope::source::{EventSource, SourceConfig};
use serde_json::json;
use std::fs;
use std::sync::Mutex;
use tempfile::TempDir;

/// Backend that records the prompt and answers with a fixed reply.
struct MockBackend {
    reply: Result<String, String>,
    prompts: Mutex<Vec<String>>,
}

impl MockBackend {
    fn answering(text: &str) -> Self {
        MockBackend { reply: Ok(text.to_string()), prompts: Mutex::new(Vec::new()) }
    }

    fn failing(status: &str) -> Self {
        MockBackend { reply: Err(status.to_string()), prompts: Mutex::new(Vec::new()) }
    }
}

impl Backend for MockBackend {
    fn name(&self) -> String {
        "mock".to_string()
    }

    fn generate(&self, prompt: &str) -> Result<String, BackendError> {
        self.prompts.lock().unwrap().push(prompt.to_string());
        self.reply
            .clone()
            .map_err(|body| BackendError::Status { status: 401, body })
    }
}

fn pipeline() -> Pipeline {
    Pipeline::new(
        EventSource::new(JfrCli::new("jfr-binary-that-does-not-exist"), SourceConfig::default()),
        FeatureExtractor::new(ExtractorConfig::default()),
    )
}

#[test]
fn missing_capture_still_produces_a_report() {
    let dir = TempDir::new().unwrap();
    let out = dir.path().join("report.md");
    let backend = MockBackend::answering("No data was available to analyze.");

    let outcome = pipeline()
        .run(&dir.path().join("not_a_real_file.jfr"), &out, &backend)
        .unwrap();

    assert_eq!(outcome.summary.total_events, 0);
    assert!(outcome.summary_text.contains("Events: 0"));
    let report = fs::read_to_string(&out).unwrap();
    assert!(report.contains("JVM Diagnostics Report"));
    assert!(report.contains("Executive Summary"));
    assert!(report.contains("No data was available to analyze."));
}

#[test]
fn structured_capture_flows_through_to_prompt_and_report() {
    let dir = TempDir::new().unwrap();
    let capture = dir.path().join("event_snippets.json");
    fs::write(
        &capture,
        json!([
            {"event": "jdk.ThreadStuck", "threadName": "test-thread"},
            {"event": "jdk.GarbageCollection", "startTime": "2025-01-01T00:00:00.000Z", "longestPause": 150}
        ])
        .to_string(),
    )
    .unwrap();
    let out = dir.path().join("report.md");
    let findings = "## Risks\n* <b>long GC</b> & stuck `thread` {{ raw }}";
    let backend = MockBackend::answering(findings);

    let outcome = pipeline().run(&capture, &out, &backend).unwrap();

    let prompts = backend.prompts.lock().unwrap();
    assert_eq!(prompts.len(), 1);
    assert!(prompts[0].starts_with("You are an expert JVM performance and diagnostics assistant."));
    assert!(prompts[0].contains("Events: 2"));
    assert!(prompts[0].contains("Stuck Threads: 1"));
    assert!(prompts[0].contains("Longest GC Pause(ms): 150"));

    assert_eq!(outcome.findings, findings);
    let report = fs::read_to_string(&out).unwrap();
    assert!(report.contains(findings), "findings must be embedded verbatim");
}

#[test]
fn backend_failure_is_written_into_the_report() {
    let dir = TempDir::new().unwrap();
    let out = dir.path().join("report.md");
    let backend = MockBackend::failing("invalid api key");

    let outcome = pipeline().run(&dir.path().join("nothing.jfr"), &out, &backend).unwrap();

    assert!(outcome.findings.starts_with("Error communicating with LLM (mock):"));
    assert!(outcome.findings.contains("invalid api key"));
    let report = fs::read_to_string(&out).unwrap();
    assert!(report.contains("Error communicating with LLM"));
}

#[test]
fn unreadable_structured_input_is_an_input_error() {
    let dir = TempDir::new().unwrap();
    let capture = dir.path().join("broken.json");
    fs::write(&capture, "[{").unwrap();
    let out = dir.path().join("report.md");
    let backend = MockBackend::answering("unused");

    let err = pipeline().run(&capture, &out, &backend).unwrap_err();
    assert!(matches!(err, PipelineError::Source(_)));
    assert!(backend.prompts.lock().unwrap().is_empty());
    assert!(!out.exists());
}

#[test]
fn unwritable_destination_is_reported() {
    let dir = TempDir::new().unwrap();
    let out = dir.path().join("no-such-dir").join("report.md");
    let backend = MockBackend::answering("fine");

    let err = pipeline().run(&dir.path().join("x.jfr"), &out, &backend).unwrap_err();
    assert!(matches!(err, PipelineError::Write { .. }));
}

#[test]
fn run_analysis_without_api_key_still_completes() {
    let dir = TempDir::new().unwrap();
    let capture = dir.path().join("events.json");
    fs::write(&capture, "[]").unwrap();
    let out = dir.path().join("report.md");

    let mut request = AnalysisRequest::new(&capture, &out, BackendConfig::remote(None));
    request.jfr_bin = "jfr-binary-that-does-not-exist".into();
    let outcome = pipeline::run_analysis(&request).unwrap();

    assert!(outcome.findings.contains("OPENAI_API_KEY is not set"));
    let report = fs::read_to_string(&out).unwrap();
    assert!(report.contains("Executive Summary"));
    assert!(report.contains("OPENAI_API_KEY is not set"));
}

#[test]
fn requests_carry_their_own_backend_selection() {
    let a = AnalysisRequest::new("a.jfr", "a.md", BackendConfig::local("TinyLlama/TinyLlama-1.1B-Chat-v1.0"));
    let b = AnalysisRequest::new("b.jfr", "b.md", BackendConfig::remote(Some("k".into())));
    assert_eq!(a.backend.model(), "TinyLlama/TinyLlama-1.1B-Chat-v1.0");
    assert_eq!(b.backend.model(), "gpt-4");
    assert!(a.backend.is_local());
    assert!(!b.backend.is_local());
}
