use super::*;
use tempfile::TempDir;

#[test]
fn api_key_prefers_config_then_environment() {
    assert_eq!(
        resolve_api_key(Some("sk-config"), Some("sk-env".to_string())),
        Some("sk-config".to_string())
    );
    assert_eq!(
        resolve_api_key(None, Some("sk-env".to_string())),
        Some("sk-env".to_string())
    );
    assert_eq!(
        resolve_api_key(Some("   "), Some(" sk-env ".to_string())),
        Some("sk-env".to_string())
    );
    assert_eq!(resolve_api_key(None, Some(String::new())), None);
    assert_eq!(resolve_api_key(None, None), None);
}

#[test]
fn generation_options_follow_config() {
    let config = LlmConfig {
        max_tokens: 512,
        temperature: 0.7,
        ..LlmConfig::default()
    };
    assert_eq!(
        GenerationOptions::from(&config),
        GenerationOptions {
            max_tokens: 512,
            temperature: 0.7
        }
    );
}

#[test]
fn ollama_backend_is_the_default() {
    let temp_dir = TempDir::new().expect("should create temp dir");
    let config = Config::with_base_dir(temp_dir.path());
    let model = from_config(&config).expect("ollama backend needs no credentials");
    assert_eq!(model.identifier(), "ollama: llama2");
}

#[test]
fn llama_cpp_requires_an_existing_model_file() {
    let temp_dir = TempDir::new().expect("should create temp dir");
    let mut config = Config::with_base_dir(temp_dir.path());
    config.llm.backend = LlmBackendKind::LlamaCpp;

    let unset = from_config(&config).err().expect("unset model path should fail");
    assert!(matches!(unset, RagError::Config(_)));

    config.llm.model_path = Some(temp_dir.path().join("missing.gguf"));
    let missing = from_config(&config).err().expect("missing file should fail");
    assert!(matches!(missing, RagError::Config(_)));

    let model_file = temp_dir.path().join("tiny.gguf");
    std::fs::write(&model_file, b"GGUF").expect("should write model file");
    config.llm.model_path = Some(model_file.clone());
    let model = from_config(&config).expect("existing model file should work");
    assert_eq!(
        model.identifier(),
        format!("llama_cpp: {}", model_file.display())
    );
}

#[test]
fn openai_with_configured_key() {
    let temp_dir = TempDir::new().expect("should create temp dir");
    let mut config = Config::with_base_dir(temp_dir.path());
    config.llm.backend = LlmBackendKind::Openai;
    config.llm.model = "gpt-4o-mini".to_string();
    config.openai.api_key = Some("sk-configured".to_string());

    let model = from_config(&config).expect("configured key should be enough");
    assert_eq!(model.identifier(), "openai: gpt-4o-mini");
}
