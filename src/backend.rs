//! Text-generation backends.
//!
//! Both the remote (API-key) backend and the local model speak the OpenAI
//! chat-completions protocol; they differ in endpoint, auth and model id.
//! Which one runs is decided by a [`BackendConfig`] value handed to the
//! pipeline for each request.

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{info, warn};

use crate::prompt::{build_prompt, SYSTEM_PROMPT};

/// Local models offered to users: (model id, label).
pub const SUPPORTED_LOCAL_MODELS: [(&str, &str); 4] = [
    ("google/gemma-2b-it", "Gemma 2B (Google, Efficient)"),
    ("mistralai/Mistral-7B-Instruct", "Mistral 7B Instruct"),
    ("TinyLlama/TinyLlama-1.1B-Chat-v1.0", "TinyLlama 1.1B Chat v1.0"),
    ("meta-llama/Llama-2-7b-chat-hf", "Llama-2 7B Chat"),
];

pub const DEFAULT_LOCAL_MODEL: &str = SUPPORTED_LOCAL_MODELS[0].0;
pub const DEFAULT_REMOTE_MODEL: &str = "gpt-4";
pub const DEFAULT_REMOTE_BASE_URL: &str = "https://api.openai.com/v1";
pub const DEFAULT_LOCAL_BASE_URL: &str = "http://localhost:8000/v1";

pub const TEMPERATURE: f32 = 0.1;
pub const MAX_TOKENS: u32 = 700;

const MAX_ERROR_BODY: usize = 500;

#[derive(Debug, Error)]
pub enum BackendError {
    #[error("OPENAI_API_KEY is not set")]
    MissingApiKey,
    #[error("request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("backend returned HTTP {status}: {body}")]
    Status { status: u16, body: String },
    #[error("backend response contained no completion text")]
    EmptyResponse,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BackendConfig {
    Remote {
        model: String,
        api_key: Option<String>,
        base_url: String,
    },
    Local {
        model: String,
        base_url: String,
    },
}

impl BackendConfig {
    pub fn remote(api_key: Option<String>) -> Self {
        BackendConfig::Remote {
            model: DEFAULT_REMOTE_MODEL.to_string(),
            api_key,
            base_url: DEFAULT_REMOTE_BASE_URL.to_string(),
        }
    }

    /// Local backend for `model`; ids outside the supported list fall back
    /// to the default model.
    pub fn local(model: &str) -> Self {
        BackendConfig::Local {
            model: resolve_local_model(model).to_string(),
            base_url: DEFAULT_LOCAL_BASE_URL.to_string(),
        }
    }

    pub fn with_model(mut self, new_model: impl Into<String>) -> Self {
        match &mut self {
            BackendConfig::Remote { model, .. } => *model = new_model.into(),
            BackendConfig::Local { model, .. } => *model = resolve_local_model(&new_model.into()).to_string(),
        }
        self
    }

    pub fn with_base_url(mut self, url: impl Into<String>) -> Self {
        match &mut self {
            BackendConfig::Remote { base_url, .. } | BackendConfig::Local { base_url, .. } => {
                *base_url = url.into()
            }
        }
        self
    }

    pub fn model(&self) -> &str {
        match self {
            BackendConfig::Remote { model, .. } | BackendConfig::Local { model, .. } => model,
        }
    }

    pub fn base_url(&self) -> &str {
        match self {
            BackendConfig::Remote { base_url, .. } | BackendConfig::Local { base_url, .. } => base_url,
        }
    }

    pub fn is_local(&self) -> bool {
        matches!(self, BackendConfig::Local { .. })
    }

    pub fn label(&self) -> String {
        match self {
            BackendConfig::Remote { model, .. } => format!("remote:{model}"),
            BackendConfig::Local { model, .. } => format!("local:{model}"),
        }
    }
}

pub fn is_supported_local_model(model: &str) -> bool {
    SUPPORTED_LOCAL_MODELS.iter().any(|(id, _)| *id == model)
}

pub fn resolve_local_model(requested: &str) -> &'static str {
    match SUPPORTED_LOCAL_MODELS.iter().find(|(id, _)| *id == requested) {
        Some((id, _)) => id,
        None => {
            warn!(requested, fallback = DEFAULT_LOCAL_MODEL, "unsupported local model");
            DEFAULT_LOCAL_MODEL
        }
    }
}

/// Numbered listing of the supported local models.
pub fn list_local_models() -> String {
    SUPPORTED_LOCAL_MODELS
        .iter()
        .enumerate()
        .map(|(i, (id, label))| format!("  {}. {label} ({id})", i + 1))
        .collect::<Vec<_>>()
        .join("\n")
}

/// Given text, return text.
pub trait Backend: Send + Sync {
    fn name(&self) -> String;
    fn generate(&self, prompt: &str) -> Result<String, BackendError>;
}

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: [ChatMessage<'a>; 2],
    temperature: f32,
    max_tokens: u32,
}

#[derive(Debug, Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: Option<ChatChoiceMessage>,
}

#[derive(Debug, Deserialize)]
struct ChatChoiceMessage {
    content: Option<String>,
}

/// OpenAI-compatible `/chat/completions` client.
pub struct ChatCompletionsBackend {
    config: BackendConfig,
    http: reqwest::blocking::Client,
}

impl ChatCompletionsBackend {
    pub fn new(config: BackendConfig) -> Result<Self, BackendError> {
        let http = reqwest::blocking::Client::builder().build()?;
        Ok(ChatCompletionsBackend { config, http })
    }

    pub fn config(&self) -> &BackendConfig {
        &self.config
    }

    fn endpoint(&self) -> String {
        format!("{}/chat/completions", self.config.base_url().trim_end_matches('/'))
    }
}

impl Backend for ChatCompletionsBackend {
    fn name(&self) -> String {
        self.config.label()
    }

    fn generate(&self, prompt: &str) -> Result<String, BackendError> {
        let body = ChatRequest {
            model: self.config.model(),
            messages: [
                ChatMessage { role: "system", content: SYSTEM_PROMPT },
                ChatMessage { role: "user", content: prompt },
            ],
            temperature: TEMPERATURE,
            max_tokens: MAX_TOKENS,
        };
        let mut req = self.http.post(self.endpoint()).json(&body);
        if let BackendConfig::Remote { api_key, .. } = &self.config {
            let key = api_key.as_deref().filter(|k| !k.is_empty()).ok_or(BackendError::MissingApiKey)?;
            req = req.bearer_auth(key);
        }

        info!(backend = %self.name(), "requesting completion");
        let resp = req.send()?;
        let status = resp.status();
        if !status.is_success() {
            let mut text = resp.text().unwrap_or_default();
            if text.len() > MAX_ERROR_BODY {
                let cut = (0..=MAX_ERROR_BODY).rev().find(|i| text.is_char_boundary(*i)).unwrap_or(0);
                text.truncate(cut);
            }
            return Err(BackendError::Status { status: status.as_u16(), body: text });
        }
        let parsed: ChatResponse = resp.json()?;
        parsed
            .choices
            .into_iter()
            .find_map(|c| c.message.and_then(|m| m.content))
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .ok_or(BackendError::EmptyResponse)
    }
}

pub fn backend_for(config: BackendConfig) -> Result<Box<dyn Backend>, BackendError> {
    Ok(Box::new(ChatCompletionsBackend::new(config)?))
}

/// Ask the backend about a summary. Never fails: backend errors come back as
/// the findings text so they end up in the report.
pub fn analyze(backend: &dyn Backend, summary_text: &str) -> String {
    let prompt = build_prompt(summary_text);
    match backend.generate(&prompt) {
        Ok(text) => text,
        Err(e) => {
            warn!(backend = %backend.name(), error = %e, "backend call failed");
            format!("Error communicating with LLM ({}): {e}", backend.name())
        }
    }
}
