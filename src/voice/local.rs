/*!
 * Local model speech backend.
 *
 * The backend owns its runtime context explicitly: the model is loaded on the
 * first synthesis call through a `OnceCell`, so concurrent first calls load
 * it exactly once and every later call reuses it. Inference is blocking and
 * runs on tokio's blocking pool.
 *
 * Runtimes that cannot run several inferences at once are serialized behind
 * a lock and the backend reports a concurrency limit of one. The timeout only
 * covers the inference itself, not the wait for the lock. A blocking inference
 * cannot be interrupted, so a runtime that times out is retired: the next call
 * loads a fresh instance instead of queueing behind the hung one.
 */

use async_trait::async_trait;
use log::{debug, info, warn};
use once_cell::sync::OnceCell;
use parking_lot::{Mutex, RwLock};
use sherpa_rs::OnnxConfig;
use sherpa_rs::tts::{KokoroTts, KokoroTtsConfig};
use std::collections::BTreeMap;
use std::fmt::{self, Debug};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use crate::app_config::TtsModelConfig;
use crate::errors::ProviderError;
use crate::voice::{RawAudio, VoiceEngine, VoiceParams};

/// A loaded model able to synthesize speech on the calling thread
pub trait ModelRuntime: Send + Sync + Debug {
    /// Run one blocking inference
    fn infer(&self, text: &str, params: &VoiceParams) -> Result<RawAudio, ProviderError>;

    /// Whether `infer` may be called from several threads at once
    fn supports_concurrent_inference(&self) -> bool {
        true
    }
}

/// Loads a model runtime; called once per backend lifetime unless reloaded
pub trait RuntimeLoader: Send + Sync + Debug {
    fn load(&self) -> Result<Arc<dyn ModelRuntime>, ProviderError>;

    /// Concurrency hint known before the model is loaded.
    ///
    /// The dispatcher sizes its worker pool before the first call, so a loader
    /// whose runtime is not thread-safe must return `false` here for the
    /// worker count to be capped at one.
    fn supports_concurrent_inference(&self) -> bool {
        true
    }

    /// Upper bound for one inference call
    fn timeout(&self) -> Option<Duration> {
        None
    }
}

/// One loaded runtime with its own inference lock
#[derive(Debug)]
struct LoadedRuntime {
    runtime: Arc<dyn ModelRuntime>,
    inference_lock: Arc<tokio::sync::Mutex<()>>,
}

#[derive(Debug)]
struct BackendContext {
    loader: Box<dyn RuntimeLoader>,
    runtime: RwLock<OnceCell<Arc<LoadedRuntime>>>,
}

impl BackendContext {
    fn loaded(&self) -> Result<Arc<LoadedRuntime>, ProviderError> {
        let cell = self.runtime.read();
        cell.get_or_try_init(|| {
            info!("Loading local speech model");
            let runtime = self.loader.load()?;
            Ok(Arc::new(LoadedRuntime {
                runtime,
                inference_lock: Arc::new(tokio::sync::Mutex::new(())),
            }))
        })
        .cloned()
    }

    fn is_current(&self, loaded: &Arc<LoadedRuntime>) -> bool {
        self.runtime
            .read()
            .get()
            .is_some_and(|current| Arc::ptr_eq(current, loaded))
    }

    /// Drop `stale` if it is still the loaded runtime
    fn retire(&self, stale: &Arc<LoadedRuntime>) -> bool {
        let mut cell = self.runtime.write();
        if cell.get().is_some_and(|current| Arc::ptr_eq(current, stale)) {
            cell.take();
            true
        } else {
            false
        }
    }

    fn serialized(&self, loaded: &LoadedRuntime) -> bool {
        !(loaded.runtime.supports_concurrent_inference() && self.loader.supports_concurrent_inference())
    }
}

/// Speech engine backed by an on-machine model
#[derive(Debug, Clone)]
pub struct LocalModelBackend {
    name: String,
    context: Arc<BackendContext>,
}

impl LocalModelBackend {
    pub fn new(name: impl Into<String>, loader: Box<dyn RuntimeLoader>) -> Self {
        Self {
            name: name.into(),
            context: Arc::new(BackendContext {
                loader,
                runtime: RwLock::new(OnceCell::new()),
            }),
        }
    }

    /// Whether the model has been loaded
    pub fn is_loaded(&self) -> bool {
        self.context.runtime.read().get().is_some()
    }

    /// Drop the loaded model so the next call loads it again
    pub fn reload(&self) {
        let mut cell = self.context.runtime.write();
        if cell.take().is_some() {
            info!("Local speech model '{}' will be reloaded on next use", self.name);
        }
    }

    async fn load_runtime(&self) -> Result<Arc<LoadedRuntime>, ProviderError> {
        let context = Arc::clone(&self.context);
        tokio::task::spawn_blocking(move || context.loaded())
            .await
            .map_err(|e| ProviderError::Runtime(format!("Model loading task panicked: {}", e)))?
    }
}

#[async_trait]
impl VoiceEngine for LocalModelBackend {
    async fn synthesize(&self, text: &str, params: &VoiceParams) -> Result<RawAudio, ProviderError> {
        params.validate()?;
        if text.trim().is_empty() {
            return Ok(RawAudio::default());
        }

        // a runtime retired while we waited for its lock is skipped
        let (loaded, _guard) = loop {
            let loaded = self.load_runtime().await?;
            if !self.context.serialized(&loaded) {
                break (loaded, None);
            }
            let guard = Arc::clone(&loaded.inference_lock).lock_owned().await;
            if self.context.is_current(&loaded) {
                break (loaded, Some(guard));
            }
        };

        let runtime = Arc::clone(&loaded.runtime);
        let text = text.to_string();
        let params = params.clone();
        let task = tokio::task::spawn_blocking(move || runtime.infer(&text, &params));

        let joined = match self.context.loader.timeout() {
            Some(limit) => match tokio::time::timeout(limit, task).await {
                Ok(joined) => joined,
                Err(_) => {
                    if self.context.retire(&loaded) {
                        warn!(
                            "Local speech model '{}' did not answer within {}s; a fresh instance will be loaded",
                            self.name,
                            limit.as_secs()
                        );
                    }
                    return Err(ProviderError::Timeout(limit.as_secs()));
                }
            },
            None => task.await,
        };
        joined.map_err(|e| ProviderError::Runtime(format!("Inference task panicked: {}", e)))?
    }

    fn name(&self) -> &str {
        &self.name
    }

    fn concurrency_limit(&self) -> Option<usize> {
        let loaded_limit = self
            .context
            .runtime
            .read()
            .get()
            .is_some_and(|r| !r.runtime.supports_concurrent_inference());
        if loaded_limit || !self.context.loader.supports_concurrent_inference() {
            Some(1)
        } else {
            None
        }
    }
}

/// Loader for Kokoro models run in-process through sherpa-onnx
#[derive(Debug, Clone)]
pub struct KokoroLoader {
    config: TtsModelConfig,
}

impl KokoroLoader {
    pub fn new(config: TtsModelConfig) -> Self {
        Self { config }
    }
}

fn required_path(path: &Option<PathBuf>, field: &str) -> Result<String, ProviderError> {
    let path = path
        .as_ref()
        .ok_or_else(|| ProviderError::Runtime(format!("Missing '{}' in speech model configuration", field)))?;
    if !path.exists() {
        return Err(ProviderError::Runtime(format!(
            "Configured {} does not exist: {}",
            field,
            path.display()
        )));
    }
    Ok(path.to_string_lossy().into_owned())
}

impl RuntimeLoader for KokoroLoader {
    fn load(&self) -> Result<Arc<dyn ModelRuntime>, ProviderError> {
        let model = required_path(&self.config.model_path, "model_path")?;
        let tts_config = KokoroTtsConfig {
            voices: required_path(&self.config.voices_path, "voices_path")?,
            tokens: required_path(&self.config.tokens_path, "tokens_path")?,
            data_dir: required_path(&self.config.data_dir, "data_dir")?,
            length_scale: 1.0,
            onnx_config: OnnxConfig {
                num_threads: self.config.num_threads.unwrap_or(2) as i32,
                ..Default::default()
            },
            model: model.clone(),
            ..Default::default()
        };

        let tts = KokoroTts::new(tts_config);
        debug!("Loaded Kokoro model {}", model);
        Ok(Arc::new(KokoroRuntime {
            tts: Mutex::new(tts),
            speaker_ids: self.config.speaker_ids.clone(),
        }))
    }

    fn supports_concurrent_inference(&self) -> bool {
        false
    }

    fn timeout(&self) -> Option<Duration> {
        Some(Duration::from_secs(self.config.timeout_secs))
    }
}

/// A loaded Kokoro model; one inference at a time
pub struct KokoroRuntime {
    tts: Mutex<KokoroTts>,
    speaker_ids: BTreeMap<String, u32>,
}

impl Debug for KokoroRuntime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("KokoroRuntime")
            .field("speakers", &self.speaker_ids.len())
            .finish_non_exhaustive()
    }
}

impl KokoroRuntime {
    /// Map a voice name (or a numeric id) to a speaker id
    pub fn speaker_id(&self, voice: &str) -> Result<u32, ProviderError> {
        speaker_id(&self.speaker_ids, voice)
    }
}

/// Look up a speaker id by voice name, accepting raw numeric ids
pub fn speaker_id(table: &BTreeMap<String, u32>, voice: &str) -> Result<u32, ProviderError> {
    if let Some(id) = table.get(voice) {
        return Ok(*id);
    }
    voice.trim().parse::<u32>().map_err(|_| {
        ProviderError::InvalidParameter(format!("Unknown voice '{}' for local model", voice))
    })
}

impl ModelRuntime for KokoroRuntime {
    fn infer(&self, text: &str, params: &VoiceParams) -> Result<RawAudio, ProviderError> {
        let sid = self.speaker_id(&params.voice)?;
        let audio = self
            .tts
            .lock()
            .create(text, sid as i32, params.speed)
            .map_err(|e| ProviderError::Runtime(format!("Kokoro inference failed: {}", e)))?;
        Ok(RawAudio::new(audio.samples, audio.sample_rate))
    }

    fn supports_concurrent_inference(&self) -> bool {
        false
    }
}
