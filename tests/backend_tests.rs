use jfrscope::backend::{self, Backend, BackendConfig, BackendError, ChatCompletionsBackend};

struct Fixed(Result<&'static str, ()>);

impl Backend for Fixed {
    fn name(&self) -> String {
        "fixed".into()
    }

    fn generate(&self, _prompt: &str) -> Result<String, BackendError> {
        self.0.map(str::to_string).map_err(|_| BackendError::EmptyResponse)
    }
}

#[test]
fn analyze_returns_backend_text() {
    assert_eq!(backend::analyze(&Fixed(Ok("all good")), "JFR Summary:"), "all good");
}

#[test]
fn analyze_turns_errors_into_text() {
    let text = backend::analyze(&Fixed(Err(())), "JFR Summary:");
    assert_eq!(
        text,
        "Error communicating with LLM (fixed): backend response contained no completion text"
    );
}

#[test]
fn unsupported_local_models_fall_back_to_default() {
    assert_eq!(backend::resolve_local_model("meta-llama/Llama-2-7b-chat-hf"), "meta-llama/Llama-2-7b-chat-hf");
    assert_eq!(backend::resolve_local_model("evil/model"), backend::DEFAULT_LOCAL_MODEL);
    assert_eq!(BackendConfig::local("whatever").model(), "google/gemma-2b-it");
    let cfg = BackendConfig::local("google/gemma-2b-it").with_model("nope");
    assert_eq!(cfg.model(), backend::DEFAULT_LOCAL_MODEL);
    assert!(backend::is_supported_local_model("mistralai/Mistral-7B-Instruct"));
    assert!(!backend::is_supported_local_model("gpt-4"));
}

#[test]
fn remote_model_is_free_form() {
    let cfg = BackendConfig::remote(None).with_model("gpt-4o-mini").with_base_url("http://proxy/v1");
    assert_eq!(cfg.model(), "gpt-4o-mini");
    assert_eq!(cfg.base_url(), "http://proxy/v1");
    assert_eq!(cfg.label(), "remote:gpt-4o-mini");
    assert_eq!(BackendConfig::local("google/gemma-2b-it").label(), "local:google/gemma-2b-it");
}

#[test]
fn model_listing_is_numbered() {
    let listing = backend::list_local_models();
    let lines: Vec<&str> = listing.lines().collect();
    assert_eq!(lines.len(), backend::SUPPORTED_LOCAL_MODELS.len());
    assert_eq!(lines[0], "  1. Gemma 2B (Google, Efficient) (google/gemma-2b-it)");
}

#[test]
fn remote_backend_without_key_fails_before_any_request() {
    for key in [None, Some(String::new())] {
        let b = ChatCompletionsBackend::new(BackendConfig::remote(key).with_base_url("http://127.0.0.1:1/v1")).unwrap();
        assert!(matches!(b.generate("hi"), Err(BackendError::MissingApiKey)));
    }
}
