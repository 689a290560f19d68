use log::{debug, error, info, warn};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value, json};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Component, Path, PathBuf};

use crate::errors::SettingsError;

/// Application configuration module
/// This module owns the persisted settings store: default materialization,
/// deep-merging of persisted values over defaults, dot-path access and
/// call-scoped resolution of indirect values (environment secrets and
/// project-relative paths).

/// Model families that have a selectable backend
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ModelKind {
    /// Script provider (language model)
    Llm,
    /// Voice provider (speech synthesis)
    Tts,
}

impl ModelKind {
    // @returns: Key prefix used in the settings file
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Llm => "llm",
            Self::Tts => "tts",
        }
    }

    fn options_key(&self) -> String {
        format!("{}_options", self.as_str())
    }

    fn selected_key(&self) -> String {
        format!("selected_{}", self.as_str())
    }
}

impl std::fmt::Display for ModelKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Log verbosity level
#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Default)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Error,
    Warn,
    #[default]
    Info,
    Debug,
    Trace,
}

/// How the transcript is requested from the script provider
#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Default)]
#[serde(rename_all = "snake_case")]
pub enum ScriptMode {
    /// One request per unit, chained with the previous unit for continuity
    #[default]
    PerUnit,
    /// One request for the whole document
    Document,
}

/// What to do when a single unit fails to synthesize
#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Default)]
#[serde(rename_all = "snake_case")]
pub enum FailurePolicy {
    /// Fail the whole batch
    #[default]
    Strict,
    /// Substitute a zero-duration placeholder and keep going
    Continue,
}

/// Sample encoding of the combined audio file
#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Default)]
#[serde(rename_all = "snake_case")]
pub enum OutputEncoding {
    /// 16-bit signed integer PCM
    #[default]
    Pcm16,
    /// 32-bit IEEE float
    Float32,
}

/// Typed view over the `general` section
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct GeneralSettings {
    /// Language of the generated lecture (ISO 639-1)
    #[serde(default = "default_language")]
    pub preferred_language: String,

    /// Log level
    #[serde(default)]
    pub log_level: LogLevel,

    #[serde(default)]
    pub script_mode: ScriptMode,

    #[serde(default)]
    pub failure_policy: FailurePolicy,

    /// Cap on concurrent synthesis tasks; `None` uses available parallelism
    #[serde(default)]
    pub max_workers: Option<usize>,

    /// Retries for script provider calls (0 disables retrying)
    #[serde(default)]
    pub retry_count: u32,

    /// Base backoff for script retries, doubled on each attempt
    #[serde(default = "default_retry_backoff_ms")]
    pub retry_backoff_ms: u64,

    #[serde(default)]
    pub output_encoding: OutputEncoding,

    /// Target sample rate of the combined audio; `None` keeps the first segment's rate
    #[serde(default)]
    pub sample_rate: Option<u32>,
}

impl Default for GeneralSettings {
    fn default() -> Self {
        Self {
            preferred_language: default_language(),
            log_level: LogLevel::default(),
            script_mode: ScriptMode::default(),
            failure_policy: FailurePolicy::default(),
            max_workers: None,
            retry_count: 0,
            retry_backoff_ms: default_retry_backoff_ms(),
            output_encoding: OutputEncoding::default(),
            sample_rate: None,
        }
    }
}

/// Shared instruction and prompt for a run
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct LectureSettings {
    /// System-level persona directive
    #[serde(default = "default_instruction")]
    pub instruction: String,

    /// Task framing, may contain `{language}`
    #[serde(default = "default_prompt")]
    pub prompt: String,
}

impl Default for LectureSettings {
    fn default() -> Self {
        Self {
            instruction: default_instruction(),
            prompt: default_prompt(),
        }
    }
}

/// Resolved configuration of one language model backend
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct LlmModelConfig {
    #[serde(default)]
    pub display_name: String,

    /// Backend family: openai, anthropic or ollama
    pub provider: String,

    #[serde(default)]
    pub model_name: String,

    /// Resolved from `api_key_env` at retrieval time
    #[serde(default)]
    pub api_key: Option<String>,

    #[serde(default)]
    pub endpoint: String,

    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,

    #[serde(default)]
    pub temperature: Option<f32>,

    #[serde(default = "default_llm_timeout_secs")]
    pub timeout_secs: u64,
}

/// Resolved configuration of one speech synthesis backend
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct TtsModelConfig {
    #[serde(default)]
    pub display_name: String,

    /// Backend family: openai (hosted) or local
    pub provider: String,

    /// Hosted model name
    #[serde(default)]
    pub model: String,

    #[serde(default)]
    pub api_key: Option<String>,

    #[serde(default)]
    pub endpoint: String,

    #[serde(default = "default_tts_timeout_secs")]
    pub timeout_secs: u64,

    /// Longest text accepted per hosted request
    #[serde(default = "default_max_input_chars")]
    pub max_input_chars: usize,

    /// Optional delivery instructions for hosted models that accept them
    #[serde(default)]
    pub instructions: String,

    // Local model files, absolute after resolution
    #[serde(default)]
    pub model_path: Option<PathBuf>,
    #[serde(default)]
    pub voices_path: Option<PathBuf>,
    #[serde(default)]
    pub tokens_path: Option<PathBuf>,
    #[serde(default)]
    pub data_dir: Option<PathBuf>,

    #[serde(default)]
    pub num_threads: Option<usize>,

    /// Voice name to speaker id table for multi-speaker local models
    #[serde(default)]
    pub speaker_ids: BTreeMap<String, u32>,

    #[serde(default)]
    pub default_voice: Option<String>,
    #[serde(default)]
    pub default_speed: Option<f32>,
    #[serde(default)]
    pub default_language: Option<String>,
}

impl Default for LlmModelConfig {
    fn default() -> Self {
        Self {
            display_name: String::new(),
            provider: String::new(),
            model_name: String::new(),
            api_key: None,
            endpoint: String::new(),
            max_tokens: default_max_tokens(),
            temperature: None,
            timeout_secs: default_llm_timeout_secs(),
        }
    }
}

impl Default for TtsModelConfig {
    fn default() -> Self {
        Self {
            display_name: String::new(),
            provider: String::new(),
            model: String::new(),
            api_key: None,
            endpoint: String::new(),
            timeout_secs: default_tts_timeout_secs(),
            max_input_chars: default_max_input_chars(),
            instructions: String::new(),
            model_path: None,
            voices_path: None,
            tokens_path: None,
            data_dir: None,
            num_threads: None,
            speaker_ids: BTreeMap::new(),
            default_voice: None,
            default_speed: None,
            default_language: None,
        }
    }
}

fn default_language() -> String {
    "en".to_string()
}

fn default_retry_backoff_ms() -> u64 {
    1000 // 1 second base backoff time, doubled on each retry
}

fn default_max_tokens() -> u32 {
    2000
}

fn default_llm_timeout_secs() -> u64 {
    120
}

fn default_tts_timeout_secs() -> u64 {
    60
}

fn default_max_input_chars() -> usize {
    4096
}

pub fn default_instruction() -> String {
    "You are an AI assistant acting as a university professor delivering a lecture based on provided slide content. \
Transform the slide text and visuals into a natural-sounding, continuous spoken lecture transcript.\n\n\
Output requirements:\n\
1. Persona: maintain a professional, pedagogical and clear university professor tone. Aim to teach and clarify, not just present.\n\
2. Content coverage: incorporate every text element of each slide. If visuals are provided, explain what they show and why they matter.\n\
3. Natural flow: do not read the slide verbatim. Rephrase for spoken delivery, add transitions, briefly define key terms and explain the reasoning behind key concepts.\n\
4. No meta-commentary such as \"the next slide says\".\n\
5. Formatting: plain continuous text, no bullet points or speaker tags. Separate the text for each slide with exactly one newline character.\n\
6. Language: speak in the language requested by the prompt."
        .to_string()
}

pub fn default_prompt() -> String {
    "Please act as a university professor and transform the following lecture slide content into a spoken lecture transcript, following the system instructions precisely.\n\n\
Key requirements:\n\
* Cover ALL text from the slide.\n\
* Explain concepts thoroughly, providing context and motivation.\n\
* Integrate descriptions of relevant visuals while ignoring logos and stock images.\n\
* If previous slide data is provided, use it only to create a smooth transition; do not repeat it.\n\
* Generate the output in {language}.\n\
* Do not use bullet points or speaker tags."
        .to_string()
}

/// The structure written to disk when no settings file exists
pub fn default_settings() -> Value {
    json!({
        "selected_llm": "openai_gpt4o",
        "selected_tts": "kokoro",
        "general": {
            "preferred_language": default_language(),
            "log_level": "info",
            "script_mode": "per_unit",
            "failure_policy": "strict",
            "max_workers": null,
            "retry_count": 0,
            "retry_backoff_ms": default_retry_backoff_ms(),
            "output_encoding": "pcm16",
            "sample_rate": null
        },
        "lecture": {
            "instruction": default_instruction(),
            "prompt": default_prompt()
        },
        "llm_options": {
            "openai_gpt3.5": {
                "display_name": "OpenAI GPT-3.5 Turbo",
                "provider": "openai",
                "api_key_env": "OPENAI_API_KEY",
                "model_name": "gpt-3.5-turbo",
                "endpoint": "https://api.openai.com/v1",
                "max_tokens": 1500
            },
            "openai_gpt4o": {
                "display_name": "OpenAI GPT-4o",
                "provider": "openai",
                "api_key_env": "OPENAI_API_KEY",
                "model_name": "gpt-4o",
                "endpoint": "https://api.openai.com/v1",
                "max_tokens": 2000
            },
            "anthropic_claude": {
                "display_name": "Anthropic Claude",
                "provider": "anthropic",
                "api_key_env": "ANTHROPIC_API_KEY",
                "model_name": "claude-3-5-sonnet-latest",
                "endpoint": "https://api.anthropic.com",
                "max_tokens": 4096
            },
            "ollama_llava": {
                "display_name": "Ollama LLaVA (Local)",
                "provider": "ollama",
                "model_name": "llava",
                "endpoint": "http://localhost:11434",
                "max_tokens": 2000
            }
        },
        "tts_options": {
            "openai": {
                "display_name": "OpenAI TTS",
                "provider": "openai",
                "api_key_env": "OPENAI_API_KEY",
                "endpoint": "https://api.openai.com/v1",
                "model": "tts-1",
                "default_voice": "alloy",
                "default_speed": 1.0,
                "default_language": "en",
                "timeout_secs": default_tts_timeout_secs(),
                "max_input_chars": default_max_input_chars()
            },
            "kokoro": {
                "display_name": "Kokoro TTS (Local)",
                "provider": "local",
                "model_path": "models/kokoro-v1.0.onnx",
                "voices_path": "models/voices-v1.0.bin",
                "tokens_path": "models/tokens.txt",
                "data_dir": "models/espeak-ng-data",
                "default_voice": "af_sarah",
                "default_speed": 1.0,
                "default_language": "en-us",
                "num_threads": 2,
                "speaker_ids": {
                    "af_alloy": 0,
                    "af_bella": 2,
                    "af_heart": 3,
                    "af_nicole": 6,
                    "af_sarah": 9,
                    "af_sky": 10,
                    "am_adam": 11,
                    "am_michael": 16
                }
            }
        }
    })
}

/// Recursively fill keys missing from `target` with values from `defaults`.
/// Values already present in `target` always win; only object values are merged.
pub fn deep_merge_defaults(target: &mut Value, defaults: &Value) {
    let (Value::Object(target_map), Value::Object(default_map)) = (target, defaults) else {
        return;
    };

    for (key, default_value) in default_map {
        match target_map.get_mut(key) {
            Some(existing) => {
                if existing.is_object() && default_value.is_object() {
                    deep_merge_defaults(existing, default_value);
                }
            }
            None => {
                target_map.insert(key.clone(), default_value.clone());
            }
        }
    }
}

/// Lexically normalize a path, collapsing `.` and `..` components
pub fn normalize_path(path: &Path) -> PathBuf {
    let mut normalized = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                let popped = matches!(
                    normalized.components().next_back(),
                    Some(Component::Normal(_))
                ) && normalized.pop();
                if !popped && !normalized.has_root() {
                    normalized.push("..");
                }
            }
            other => normalized.push(other.as_os_str()),
        }
    }
    normalized
}

/// Result of reading the store from disk
struct LoadedSettings {
    value: Value,
    malformed: bool,
}

/// Manages loading, saving and resolving settings from a JSON file.
///
/// Nothing is cached: every accessor re-reads the file so that edits and
/// rotated secrets take effect on the next call.
#[derive(Debug, Clone)]
pub struct SettingsManager {
    settings_path: PathBuf,
    project_root: PathBuf,
}

impl SettingsManager {
    /// Create a manager for the given file. Without an explicit project root,
    /// the directory containing the settings file is used.
    pub fn new(settings_path: impl AsRef<Path>, project_root: Option<PathBuf>) -> Self {
        let settings_path = absolutize(settings_path.as_ref());
        let project_root = match project_root {
            Some(root) => absolutize(&root),
            None => settings_path
                .parent()
                .map(Path::to_path_buf)
                .unwrap_or_else(|| PathBuf::from("/")),
        };

        debug!(
            "Settings file: {:?}, project root: {:?}",
            settings_path, project_root
        );

        Self {
            settings_path,
            project_root,
        }
    }

    pub fn settings_path(&self) -> &Path {
        &self.settings_path
    }

    pub fn project_root(&self) -> &Path {
        &self.project_root
    }

    /// Load the settings, creating the file from defaults when it is absent.
    /// A malformed file yields the defaults without touching the file.
    pub fn load_settings(&self) -> Value {
        self.load().value
    }

    fn load(&self) -> LoadedSettings {
        if !self.settings_path.exists() {
            warn!(
                "Settings file not found at {:?}, creating it with defaults.",
                self.settings_path
            );
            let defaults = default_settings();
            if let Err(e) = self.save_settings(&defaults) {
                error!("Failed to create default settings file: {}", e);
            }
            return LoadedSettings {
                value: defaults,
                malformed: false,
            };
        }

        let parsed = fs::read_to_string(&self.settings_path)
            .map_err(|e| e.to_string())
            .and_then(|content| {
                serde_json::from_str::<Value>(&content).map_err(|e| e.to_string())
            });

        match parsed {
            Ok(mut value) if value.is_object() => {
                deep_merge_defaults(&mut value, &default_settings());
                LoadedSettings {
                    value,
                    malformed: false,
                }
            }
            Ok(_) => {
                error!(
                    "Settings file {:?} does not contain a JSON object, using defaults.",
                    self.settings_path
                );
                LoadedSettings {
                    value: default_settings(),
                    malformed: true,
                }
            }
            Err(e) => {
                error!(
                    "Error loading settings file {:?}: {}. Using defaults.",
                    self.settings_path, e
                );
                LoadedSettings {
                    value: default_settings(),
                    malformed: true,
                }
            }
        }
    }

    /// Write the full settings document to disk
    pub fn save_settings(&self, settings: &Value) -> Result<(), SettingsError> {
        let io_error = |reason: String| SettingsError::Io {
            path: self.settings_path.clone(),
            reason,
        };

        if let Some(parent) = self.settings_path.parent() {
            fs::create_dir_all(parent).map_err(|e| io_error(e.to_string()))?;
        }

        let content = serde_json::to_string_pretty(settings)
            .map_err(|e| SettingsError::Value(e.to_string()))?;
        fs::write(&self.settings_path, content).map_err(|e| io_error(e.to_string()))?;

        info!("Settings saved to {:?}", self.settings_path);
        Ok(())
    }

    /// Get a value by dot path, e.g. `general.preferred_language`
    pub fn get(&self, key: &str) -> Option<Value> {
        let settings = self.load_settings();
        lookup(&settings, key).cloned()
    }

    /// Get a typed value by dot path, falling back to `default` when the key
    /// is missing or has an incompatible type
    pub fn get_or<T: DeserializeOwned>(&self, key: &str, default: T) -> T {
        match self.get(key) {
            Some(value) => serde_json::from_value(value).unwrap_or_else(|e| {
                warn!("Setting '{}' has an unexpected type ({}), using default", key, e);
                default
            }),
            None => default,
        }
    }

    /// Set a value by dot path and persist the whole document.
    /// Intermediate objects are created as needed.
    pub fn update<T: Serialize>(&self, key: &str, value: T) -> Result<(), SettingsError> {
        let keys: Vec<&str> = key.split('.').collect();
        if keys.iter().any(|k| k.is_empty()) {
            return Err(SettingsError::InvalidKey(key.to_string()));
        }

        let loaded = self.load();
        if loaded.malformed {
            return Err(SettingsError::Malformed(self.settings_path.clone()));
        }
        let mut settings = loaded.value;

        let value = serde_json::to_value(value).map_err(|e| SettingsError::Value(e.to_string()))?;

        let (last, parents) = keys
            .split_last()
            .ok_or_else(|| SettingsError::InvalidKey(key.to_string()))?;

        let mut current = &mut settings;
        for part in parents {
            let map = current
                .as_object_mut()
                .ok_or_else(|| SettingsError::InvalidKey(key.to_string()))?;
            let entry = map
                .entry(part.to_string())
                .or_insert_with(|| Value::Object(Map::new()));
            if !entry.is_object() {
                *entry = Value::Object(Map::new());
            }
            current = entry;
        }

        current
            .as_object_mut()
            .ok_or_else(|| SettingsError::InvalidKey(key.to_string()))?
            .insert(last.to_string(), value);

        self.save_settings(&settings)
    }

    /// Typed `general` section
    pub fn general(&self) -> GeneralSettings {
        self.get_or("general", GeneralSettings::default())
    }

    /// Typed `lecture` section
    pub fn lecture(&self) -> LectureSettings {
        self.get_or("lecture", LectureSettings::default())
    }

    /// Key of the currently selected backend for a model family
    pub fn selected_model_key(&self, kind: ModelKind) -> Option<String> {
        self.get(&kind.selected_key())
            .and_then(|v| v.as_str().map(str::to_string))
    }

    /// Available backends for a family, keyed by configuration key
    pub fn available_models(&self, kind: ModelKind) -> BTreeMap<String, String> {
        let Some(Value::Object(options)) = self.get(&kind.options_key()) else {
            return BTreeMap::new();
        };

        options
            .iter()
            .map(|(key, config)| {
                let display = config
                    .get("display_name")
                    .and_then(Value::as_str)
                    .unwrap_or(key)
                    .to_string();
                (key.clone(), display)
            })
            .collect()
    }

    /// Configuration for a backend with indirect values resolved.
    /// Returns an empty map when the key is unknown.
    pub fn resolve_model_config(&self, kind: ModelKind, model_key: &str) -> Map<String, Value> {
        let options_key = kind.options_key();
        let Some(Value::Object(config)) = self
            .load_settings()
            .get(&options_key)
            .and_then(|options| options.get(model_key))
            .cloned()
        else {
            warn!("No configuration found for {} model '{}'.", kind, model_key);
            return Map::new();
        };

        self.resolve_config_values(config)
    }

    /// Resolved, typed configuration of a language model backend
    pub fn llm_config(&self, model_key: &str) -> Result<LlmModelConfig, SettingsError> {
        typed_config(self.resolve_model_config(ModelKind::Llm, model_key), model_key)
    }

    /// Resolved, typed configuration of a speech backend
    pub fn tts_config(&self, model_key: &str) -> Result<TtsModelConfig, SettingsError> {
        typed_config(self.resolve_model_config(ModelKind::Tts, model_key), model_key)
    }

    /// Resolve a single path against the project root
    pub fn resolve_path(&self, path: &Path) -> PathBuf {
        if path.is_absolute() {
            return path.to_path_buf();
        }
        normalize_path(&self.project_root.join(path))
    }

    fn resolve_config_values(&self, mut config: Map<String, Value>) -> Map<String, Value> {
        if let Some(env_name) = config.get("api_key_env").and_then(Value::as_str) {
            let display = config
                .get("display_name")
                .and_then(Value::as_str)
                .unwrap_or("unknown");
            let api_key = match std::env::var(env_name) {
                Ok(key) if !key.is_empty() => Value::String(key),
                _ => {
                    warn!(
                        "Environment variable '{}' not set for config: {}",
                        env_name, display
                    );
                    Value::Null
                }
            };
            config.insert("api_key".to_string(), api_key);
        }

        let path_keys: Vec<String> = config
            .keys()
            .filter(|k| k.ends_with("_path") || k.ends_with("_dir"))
            .cloned()
            .collect();

        for key in path_keys {
            let Some(relative) = config.get(&key).and_then(Value::as_str) else {
                continue;
            };
            if relative.is_empty() {
                continue;
            }
            let resolved = self.resolve_path(Path::new(relative));
            debug!("Resolved {} '{}' to {:?}", key, relative, resolved);
            config.insert(key, Value::String(resolved.to_string_lossy().into_owned()));
        }

        config
    }
}

fn typed_config<T: DeserializeOwned>(
    config: Map<String, Value>,
    model_key: &str,
) -> Result<T, SettingsError> {
    if config.is_empty() {
        return Err(SettingsError::InvalidKey(model_key.to_string()));
    }
    serde_json::from_value(Value::Object(config))
        .map_err(|e| SettingsError::Value(format!("{}: {}", model_key, e)))
}

fn lookup<'a>(settings: &'a Value, key: &str) -> Option<&'a Value> {
    key.split('.')
        .try_fold(settings, |value, part| value.as_object()?.get(part))
}

fn absolutize(path: &Path) -> PathBuf {
    let absolute = std::path::absolute(path).unwrap_or_else(|_| path.to_path_buf());
    normalize_path(&absolute)
}
