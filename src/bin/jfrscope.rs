use anyhow::Context;
use clap::builder::PossibleValuesParser;
use clap::Parser;
use std::path::PathBuf;
use std::sync::Once;
use tracing_subscriber::EnvFilter;

use jfrscope::backend::{self, BackendConfig};
use jfrscope::features::ExtractorConfig;
use jfrscope::pipeline::{self, AnalysisRequest, Pipeline};
use jfrscope::source::{SourceConfig, DEFAULT_CHUNK_THRESHOLD_MB};

fn init_parallelism() {
    static START: Once = Once::new();
    START.call_once(|| {
        let n = num_cpus::get();
        let _ = rayon::ThreadPoolBuilder::new().num_threads(n).build_global();
    });
}

fn init_logging() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_ansi(atty::is(atty::Stream::Stderr))
        .try_init();
}

#[derive(Parser, Debug)]
#[command(name = "jfrscope", version, about = "LLM-assisted Java Flight Recorder analysis")]
struct Cli {
    /// Capture to analyze (.jfr, or pre-converted .json)
    #[arg(long = "jfr", required_unless_present = "list_models")]
    jfr: Option<PathBuf>,

    /// Report destination
    #[arg(long = "output", default_value = "analysis_report.md")]
    output: PathBuf,

    /// Use the local model backend instead of the remote API
    #[arg(long = "uselocal", default_value_t = false)]
    use_local: bool,

    /// Local model id (see --list-models)
    #[arg(
        long = "llmmodel",
        default_value = backend::DEFAULT_LOCAL_MODEL,
        value_parser = PossibleValuesParser::new(backend::SUPPORTED_LOCAL_MODELS.map(|(id, _)| id))
    )]
    llm_model: String,

    /// Captures larger than this many MB are split before conversion
    #[arg(long = "chunkthresh", default_value_t = DEFAULT_CHUNK_THRESHOLD_MB)]
    chunk_threshold_mb: u64,

    /// Path to the JDK `jfr` tool
    #[arg(long = "jfr-bin", env = "JFR_BIN", default_value = "jfr")]
    jfr_bin: PathBuf,

    /// Convert capture segments in parallel
    #[arg(long = "parallel-segments", default_value_t = false)]
    parallel_segments: bool,

    /// Print the feature summary and stop (no backend call, no report)
    #[arg(long = "summary-only", default_value_t = false)]
    summary_only: bool,

    /// Summary output format for --summary-only: text | json
    #[arg(long = "format", default_value = "text")]
    format: String,

    /// List the supported local models and exit
    #[arg(long = "list-models", default_value_t = false)]
    list_models: bool,

    /// Remote model id
    #[arg(long = "remote-model", env = "LLM_MODEL", default_value = backend::DEFAULT_REMOTE_MODEL)]
    remote_model: String,

    #[arg(long = "api-key", env = "OPENAI_API_KEY", hide_env_values = true)]
    api_key: Option<String>,

    /// Base URL of the remote chat-completions API
    #[arg(long = "remote-url", env = "OPENAI_BASE_URL", default_value = backend::DEFAULT_REMOTE_BASE_URL)]
    remote_url: String,

    /// Base URL of the local model server
    #[arg(long = "local-url", env = "LOCAL_LLM_ENDPOINT", default_value = backend::DEFAULT_LOCAL_BASE_URL)]
    local_url: String,
}

impl Cli {
    fn backend_config(&self) -> BackendConfig {
        if self.use_local {
            BackendConfig::local(&self.llm_model).with_base_url(self.local_url.clone())
        } else {
            BackendConfig::remote(self.api_key.clone())
                .with_model(self.remote_model.clone())
                .with_base_url(self.remote_url.clone())
        }
    }
}

fn main() -> anyhow::Result<()> {
    init_logging();
    init_parallelism();
    let cli = Cli::parse();

    if cli.list_models {
        println!("Supported local LLM models:\n{}", backend::list_local_models());
        return Ok(());
    }

    let Some(capture) = cli.jfr.clone() else {
        anyhow::bail!("--jfr is required");
    };
    if !capture.exists() {
        eprintln!("JFR file not found: {}", capture.display());
        std::process::exit(1);
    }

    let request = AnalysisRequest {
        capture,
        output: cli.output.clone(),
        jfr_bin: cli.jfr_bin.clone(),
        source: SourceConfig {
            chunk_threshold_mb: cli.chunk_threshold_mb,
            parallel_segments: cli.parallel_segments,
            ..Default::default()
        },
        extractor: ExtractorConfig::default(),
        backend: cli.backend_config(),
    };

    if cli.summary_only {
        let (summary, _) = Pipeline::for_request(&request)
            .summarize(&request.capture)
            .context("summarizing capture")?;
        if cli.format == "json" {
            println!("{}", serde_json::to_string_pretty(&summary)?);
        } else {
            print!("{}", summary.to_text());
        }
        return Ok(());
    }

    let outcome = pipeline::run_analysis(&request).context("analysis failed")?;
    if !outcome.failed_segments.is_empty() {
        eprintln!("{} capture segment(s) could not be converted", outcome.failed_segments.len());
    }
    eprintln!("Report written to {}", outcome.report_path.display());
    Ok(())
}
