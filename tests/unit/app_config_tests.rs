/*!
 * Tests for the settings store
 */

use anyhow::Result;
use serde_json::{Value, json};
use std::fs;
use std::path::PathBuf;

use slidecast::app_config::{FailurePolicy, ModelKind, ScriptMode, SettingsManager, default_settings};
use slidecast::errors::SettingsError;

use crate::common;

#[test]
fn test_load_settings_withMissingFile_shouldWriteDefaults() -> Result<()> {
    let dir = common::create_temp_dir()?;
    let path = dir.path().join("settings.json");
    let settings = SettingsManager::new(&path, None);

    let loaded = settings.load_settings();

    assert_eq!(loaded, default_settings());
    assert!(path.exists());
    let on_disk: Value = serde_json::from_str(&fs::read_to_string(&path)?)?;
    assert_eq!(on_disk, default_settings());
    Ok(())
}

#[test]
fn test_load_settings_withPartialFile_shouldMergeDefaultsUnderPersistedValues() -> Result<()> {
    let dir = common::create_temp_dir()?;
    let settings = common::create_settings(
        dir.path(),
        &json!({
            "selected_llm": "ollama_llava",
            "general": {"preferred_language": "de", "failure_policy": "continue"}
        }),
    )?;

    assert_eq!(settings.selected_model_key(ModelKind::Llm).as_deref(), Some("ollama_llava"));
    assert_eq!(settings.selected_model_key(ModelKind::Tts).as_deref(), Some("kokoro"));

    let general = settings.general();
    assert_eq!(general.preferred_language, "de");
    assert_eq!(general.failure_policy, FailurePolicy::Continue);
    assert_eq!(general.script_mode, ScriptMode::PerUnit);
    Ok(())
}

#[test]
fn test_load_settings_withMalformedFile_shouldReturnDefaultsWithoutRewriting() -> Result<()> {
    let dir = common::create_temp_dir()?;
    let path = common::create_test_file(dir.path(), "settings.json", "{ not json")?;
    let settings = SettingsManager::new(&path, None);

    assert_eq!(settings.load_settings(), default_settings());
    assert_eq!(fs::read_to_string(&path)?, "{ not json");

    let result = settings.update("general.preferred_language", "fr");
    assert!(matches!(result, Err(SettingsError::Malformed(_))));
    assert_eq!(fs::read_to_string(&path)?, "{ not json");
    Ok(())
}

#[test]
fn test_update_withNestedKey_shouldBeVisibleToFreshManager() -> Result<()> {
    let dir = common::create_temp_dir()?;
    let path = dir.path().join("settings.json");

    SettingsManager::new(&path, None).update("general.max_workers", 3)?;
    SettingsManager::new(&path, None).update("custom.deeply.nested", "value")?;

    let fresh = SettingsManager::new(&path, None);
    assert_eq!(fresh.get("general.max_workers"), Some(json!(3)));
    assert_eq!(fresh.general().max_workers, Some(3));
    assert_eq!(fresh.get_or("custom.deeply.nested", String::new()), "value");
    assert_eq!(fresh.get_or("custom.missing", 7), 7);
    Ok(())
}

#[test]
fn test_update_withEmptySegment_shouldFail() -> Result<()> {
    let dir = common::create_temp_dir()?;
    let settings = SettingsManager::new(dir.path().join("settings.json"), None);
    assert!(matches!(settings.update("general..x", 1), Err(SettingsError::InvalidKey(_))));
    Ok(())
}

#[test]
fn test_resolve_model_config_withMissingModelPath_shouldFillDefaultAndAbsolutize() -> Result<()> {
    let dir = common::create_temp_dir()?;
    let root = dir.path().join("project");
    fs::create_dir_all(&root)?;
    let path = common::create_test_file(
        dir.path(),
        "settings.json",
        &json!({"tts_options": {"kokoro": {"default_voice": "am_adam"}}}).to_string(),
    )?;
    let settings = SettingsManager::new(&path, Some(root.clone()));

    let config = settings.resolve_model_config(ModelKind::Tts, "kokoro");

    let model_path = PathBuf::from(config["model_path"].as_str().unwrap_or_default());
    assert!(model_path.is_absolute());
    assert!(model_path.starts_with(settings.project_root()));
    assert!(model_path.ends_with("models/kokoro-v1.0.onnx"));
    assert_eq!(config["default_voice"], json!("am_adam"));
    Ok(())
}

#[test]
fn test_resolve_model_config_withAbsolutePath_shouldLeaveItUnchanged() -> Result<()> {
    let dir = common::create_temp_dir()?;
    let absolute = dir.path().join("elsewhere/model.onnx");
    let settings = common::create_settings(
        dir.path(),
        &json!({"tts_options": {"kokoro": {"model_path": absolute}}}),
    )?;

    let first = settings.tts_config("kokoro")?;
    assert_eq!(first.model_path.as_deref(), Some(absolute.as_path()));

    // resolving an already resolved path is a no-op
    let again = settings.resolve_path(first.model_path.as_deref().unwrap_or(absolute.as_path()));
    assert_eq!(again, absolute);
    Ok(())
}

#[test]
fn test_resolve_model_config_withApiKeyEnv_shouldReadEnvironmentAtCallTime() -> Result<()> {
    let dir = common::create_temp_dir()?;
    let variable = "SLIDECAST_TEST_API_KEY_RESOLUTION";
    let settings = common::create_settings(
        dir.path(),
        &json!({"llm_options": {"custom": {
            "display_name": "Custom",
            "provider": "openai",
            "model_name": "gpt-test",
            "endpoint": "http://localhost:9",
            "api_key_env": variable
        }}}),
    )?;

    unsafe { std::env::remove_var(variable) };
    assert!(settings.llm_config("custom")?.api_key.is_none());

    unsafe { std::env::set_var(variable, "sk-test") };
    assert_eq!(settings.llm_config("custom")?.api_key.as_deref(), Some("sk-test"));
    unsafe { std::env::remove_var(variable) };
    Ok(())
}

#[test]
fn test_available_models_shouldListDisplayNames() -> Result<()> {
    let dir = common::create_temp_dir()?;
    let settings = SettingsManager::new(dir.path().join("settings.json"), None);

    let llms = settings.available_models(ModelKind::Llm);
    assert_eq!(llms.get("openai_gpt4o").map(String::as_str), Some("OpenAI GPT-4o"));
    assert!(llms.contains_key("anthropic_claude"));

    let tts = settings.available_models(ModelKind::Tts);
    assert!(tts.contains_key("kokoro"));
    assert!(tts.contains_key("openai"));
    Ok(())
}

#[test]
fn test_resolve_model_config_withUnknownKey_shouldReturnEmptyMap() -> Result<()> {
    let dir = common::create_temp_dir()?;
    let settings = SettingsManager::new(dir.path().join("settings.json"), None);
    assert!(settings.resolve_model_config(ModelKind::Llm, "nope").is_empty());
    assert!(settings.llm_config("nope").is_err());
    Ok(())
}
