use std::io::Write;
use std::time::Duration;

use serial_test::serial;

use super::*;

const ENV_KEYS: [&str; 8] = [
    "SNAPSOLVE_PROVIDER",
    "SNAPSOLVE_API_KEY",
    "SNAPSOLVE_BASE_URL",
    "SNAPSOLVE_EXTRACTION_MODEL",
    "SNAPSOLVE_SOLUTION_MODEL",
    "SNAPSOLVE_DEBUGGING_MODEL",
    "SNAPSOLVE_LANGUAGE",
    "SNAPSOLVE_CHAT_TIMEOUT",
];

fn clear_env() {
    for key in ENV_KEYS {
        unsafe { std::env::remove_var(key) };
    }
}

#[test]
fn defaults_when_file_missing() {
    let config = Config::default();
    assert_eq!(config.provider.id, "ollama");
    assert!(config.provider.api_key.is_none());
    assert_eq!(config.provider.chat_timeout_secs, 60);
    assert_eq!(config.provider.validate_timeout_secs, 5);
    assert_eq!(config.pipeline.language, "python");
    assert!((config.pipeline.extraction_temperature - 0.2).abs() < f32::EPSILON);
    assert_eq!(config.pipeline.extraction_max_tokens, 4000);
    assert!(config.validate().is_ok());
}

#[test]
#[serial]
fn load_missing_file_uses_defaults() {
    clear_env();
    let dir = tempfile::tempdir().unwrap();
    let config = Config::load(&dir.path().join("absent.toml")).unwrap();
    assert_eq!(config.provider.id, "ollama");
}

#[test]
#[serial]
fn parse_valid_toml() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("test.toml");
    let mut f = std::fs::File::create(&path).unwrap();
    write!(
        f,
        r#"
[provider]
id = "anthropic"
api_key = "sk-ant-123"
chat_timeout_secs = 90

[models]
extraction = "claude-3-5-haiku-20241022"

[pipeline]
language = "java"
solution_temperature = 0.1
"#
    )
    .unwrap();

    clear_env();

    let config = Config::load(&path).unwrap();
    assert_eq!(config.provider.id, "anthropic");
    assert_eq!(config.provider.api_key.as_ref().unwrap().expose(), "sk-ant-123");
    assert_eq!(config.provider.chat_timeout_secs, 90);
    assert_eq!(config.pipeline.language, "java");
    assert_eq!(config.pipeline.extraction_max_tokens, 4000);

    let models = config.resolved_models();
    assert_eq!(models.extraction, "claude-3-5-haiku-20241022");
    assert_eq!(models.solution, "claude-sonnet-4-20250514");
}

#[test]
fn invalid_toml_is_error() {
    let err = Config::parse("[provider\nid = ").unwrap_err();
    assert!(err.to_string().contains("failed to parse config file"));
}

#[test]
#[serial]
fn env_overrides_file_values() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("env.toml");
    std::fs::write(&path, "[provider]\nid = \"openai\"\n").unwrap();

    clear_env();
    unsafe {
        std::env::set_var("SNAPSOLVE_PROVIDER", "Gemini");
        std::env::set_var("SNAPSOLVE_API_KEY", "AIza-env");
        std::env::set_var("SNAPSOLVE_SOLUTION_MODEL", "gemini-2.5-flash");
        std::env::set_var("SNAPSOLVE_LANGUAGE", "go");
        std::env::set_var("SNAPSOLVE_CHAT_TIMEOUT", "15");
    }

    let config = Config::load(&path).unwrap();
    clear_env();

    assert_eq!(config.provider.id, "gemini");
    assert_eq!(config.provider.api_key.as_ref().unwrap().expose(), "AIza-env");
    assert_eq!(config.pipeline.language, "go");
    let pc = config.provider_config();
    assert_eq!(pc.chat_timeout, Duration::from_secs(15));
    assert_eq!(pc.default_models.solution, "gemini-2.5-flash");
    assert_eq!(pc.default_models.extraction, "gemini-2.5-flash");
}

#[test]
#[serial]
fn invalid_env_timeout_ignored() {
    clear_env();
    unsafe { std::env::set_var("SNAPSOLVE_CHAT_TIMEOUT", "soon") };
    let dir = tempfile::tempdir().unwrap();
    let config = Config::load(&dir.path().join("none.toml")).unwrap();
    clear_env();
    assert_eq!(config.provider.chat_timeout_secs, 60);
}

#[test]
fn provider_config_trims_key_and_drops_blank_url() {
    let mut config = Config::default();
    config.provider.api_key = Some(crate::secret::Secret::new("  key  "));
    config.provider.base_url = Some("   ".into());
    let pc = config.provider_config();
    assert_eq!(pc.api_key, "key");
    assert!(pc.base_url.is_none());
}

#[test]
fn debug_redacts_api_key() {
    let mut config = Config::default();
    config.provider.api_key = Some(crate::secret::Secret::new("sk-very-secret"));
    let debug = format!("{config:?}");
    assert!(!debug.contains("sk-very-secret"));
    assert!(debug.contains("[REDACTED]"));
}

#[test]
fn validate_rejects_out_of_range_values() {
    let mut config = Config::default();
    config.provider.validate_timeout_secs = 30;
    assert!(config.validate().is_err());

    let mut config = Config::default();
    config.pipeline.solution_temperature = 3.5;
    assert!(config.validate().is_err());

    let mut config = Config::default();
    config.provider.chat_timeout_secs = 0;
    assert!(config.validate().is_err());

    let mut config = Config::default();
    config.pipeline.language = " ".into();
    assert!(config.validate().is_err());
}

#[test]
fn validate_rejects_schemeless_base_url() {
    let mut config = Config::default();
    config.provider.base_url = Some("localhost:11434".into());
    let err = config.validate().unwrap_err();
    assert!(err.to_string().contains("provider.base_url"));

    config.provider.base_url = Some("http://localhost:11434".into());
    assert!(config.validate().is_ok());

    config.provider.base_url = Some("  ".into());
    assert!(config.validate().is_ok());
}

#[test]
fn unknown_provider_gets_ollama_style_defaults() {
    let mut config = Config::default();
    config.provider.id = "custom".into();
    assert_eq!(config.resolved_models().extraction, "llava");
}

#[test]
fn shipped_default_config_is_valid() {
    let config = Config::parse(include_str!("../../../../config/default.toml")).unwrap();
    assert_eq!(config.provider.id, "ollama");
    assert_eq!(config.resolved_models().extraction, "llava");
    assert!(config.validate().is_ok());
}
