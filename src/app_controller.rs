use anyhow::{Context, Result, anyhow};
use indicatif::{ProgressBar, ProgressStyle};
use log::{debug, info, warn};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::app_config::{FailurePolicy, ModelKind, SettingsManager, TtsModelConfig};
use crate::audio::assemble;
use crate::errors::{AppError, UnitFailure};
use crate::extract::{DocumentExtractor, ExtractedDocument, ManifestExtractor, extractor_for};
use crate::file_utils::{FileManager, OutputPaths};
use crate::language_utils::prompt_language_name;
use crate::progress::{ProgressEvent, ProgressReporter, Stage};
use crate::providers::{ScriptProvider, script_provider_from_config};
use crate::script::{RetryPolicy, ScriptComposer, ScriptGenerator, Transcript};
use crate::synthesis::{DispatchOptions, SynthesisDispatcher};
use crate::voice::{VoiceEngine, VoiceParams, engine_from_config};

// @module: Application controller for the lecture pipeline

/// Placeholder for the lecture language in prompts
pub const LANGUAGE_PLACEHOLDER: &str = "{language}";

/// Legacy placeholder for inline slide data; content now travels as blocks
pub const SLIDE_DATA_PLACEHOLDER: &str = "{slide_data}";

/// Per-run overrides on top of the settings file
#[derive(Debug, Clone, Default)]
pub struct RunOptions {
    pub input: PathBuf,
    pub output_dir: Option<PathBuf>,
    pub visuals_dir: Option<PathBuf>,
    /// Regenerate every artifact even when a previous run left one behind
    pub force: bool,
    pub failure_policy: Option<FailurePolicy>,
    pub max_workers: Option<usize>,
    /// Script provider configuration key
    pub llm: Option<String>,
    /// Speech backend configuration key
    pub tts: Option<String>,
    pub voice: Option<String>,
    pub speed: Option<f32>,
    /// Lecture language (ISO code)
    pub language: Option<String>,
}

impl RunOptions {
    pub fn new(input: impl Into<PathBuf>) -> Self {
        Self {
            input: input.into(),
            ..Default::default()
        }
    }
}

/// What a finished run produced
#[derive(Debug, Clone)]
pub struct RunSummary {
    pub paths: OutputPaths,
    pub content_units: usize,
    pub transcript_lines: usize,
    pub transcript_reused: bool,
    pub resumed_segments: usize,
    /// Units replaced by silence under the continue policy
    pub failures: Vec<UnitFailure>,
    pub duration_seconds: f64,
}

/// Substitute the lecture language and drop the inline slide-data slot
pub fn render_prompt(prompt: &str, language_code: &str) -> String {
    prompt
        .replace(LANGUAGE_PLACEHOLDER, &prompt_language_name(language_code))
        .replace(SLIDE_DATA_PLACEHOLDER, "")
        .trim_end()
        .to_string()
}

/// Voice parameters from a backend's defaults and the run's overrides
pub fn voice_params(config: &TtsModelConfig, options: &RunOptions) -> Result<VoiceParams, AppError> {
    let voice = options
        .voice
        .clone()
        .or_else(|| config.default_voice.clone())
        .ok_or_else(|| AppError::Unknown("No voice configured; set default_voice or pass --voice".to_string()))?;
    let params = VoiceParams::new(
        voice,
        options.speed.or(config.default_speed).unwrap_or(1.0),
        config.default_language.clone().unwrap_or_else(|| "en".to_string()),
    );
    params.validate()?;
    Ok(params)
}

/// Progress reporter that renders stage progress with indicatif
pub fn progress_bar_reporter() -> ProgressReporter {
    let bar = ProgressBar::new(0);
    let style = ProgressStyle::default_bar()
        .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} {msg} ({percent}%) {eta}")
        .or_else(|_| ProgressStyle::default_bar().template("{spinner} [{elapsed_precise}] [{bar:40}] {pos}/{len} {msg}"))
        .unwrap_or_else(|_| ProgressStyle::default_bar());
    bar.set_style(style.progress_chars("█▓▒░"));

    ProgressReporter::new(move |event| match event {
        ProgressEvent::StageStarted { stage, total } => {
            bar.reset();
            bar.set_length(total as u64);
            bar.set_message(stage.to_string());
        }
        ProgressEvent::UnitCompleted { completed, .. } => bar.set_position(completed as u64),
        ProgressEvent::StageFinished { stage } => {
            bar.set_message(format!("{} done", stage));
            bar.tick();
        }
    })
}

/// Main application controller for lecture generation
pub struct Controller {
    settings: SettingsManager,
    script_provider: Option<Arc<dyn ScriptProvider>>,
    voice_engine: Option<Arc<dyn VoiceEngine>>,
    progress: ProgressReporter,
}

impl Controller {
    // @method: Create a controller that builds its backends from settings
    pub fn new(settings: SettingsManager) -> Self {
        Self {
            settings,
            script_provider: None,
            voice_engine: None,
            progress: ProgressReporter::silent(),
        }
    }

    /// Use this script provider instead of the configured one
    pub fn with_script_provider(mut self, provider: Arc<dyn ScriptProvider>) -> Self {
        self.script_provider = Some(provider);
        self
    }

    /// Use this voice engine instead of the configured one
    pub fn with_voice_engine(mut self, engine: Arc<dyn VoiceEngine>) -> Self {
        self.voice_engine = Some(engine);
        self
    }

    pub fn with_progress(mut self, progress: ProgressReporter) -> Self {
        self.progress = progress;
        self
    }

    pub fn settings(&self) -> &SettingsManager {
        &self.settings
    }

    /// Run the whole pipeline for one document
    pub async fn run(&self, options: &RunOptions) -> Result<RunSummary> {
        let start_time = Instant::now();
        let input = options.input.as_path();

        if !input.exists() {
            return Err(AppError::File(format!("Input document does not exist: {:?}", input)).into());
        }

        let mut paths = OutputPaths::for_input(input, options.output_dir.as_deref())?;
        if let Some(visuals) = &options.visuals_dir {
            paths = paths.with_visuals_dir(visuals);
        }
        FileManager::ensure_dir(&paths.output_dir)?;

        let general = self.settings.general();

        // Extraction
        self.progress.stage_started(Stage::Extraction, 1);
        let document = self.extract(input, &paths, options.force).await?;
        self.progress.unit_completed(Stage::Extraction, 1, 1);
        self.progress.stage_finished(Stage::Extraction);
        let scripted_units = document.units.iter().filter(|u| u.has_text()).count();
        info!(
            "Document has {} units, {} with text",
            document.units.len(),
            scripted_units
        );

        // Scripting
        let (transcript, transcript_reused) = match self.reusable_transcript(&paths, scripted_units, options.force)? {
            Some(transcript) => (transcript, true),
            None => {
                let language = options.language.as_deref().unwrap_or(&general.preferred_language);
                let transcript = self.generate_transcript(&document, language, options).await?;
                FileManager::write_to_file(&paths.transcript, transcript.as_str())?;
                info!("Transcript written to {}", paths.transcript.display());
                (transcript, false)
            }
        };

        if transcript.line_count() == 0 {
            return Err(anyhow!("Nothing to narrate: {} has no text", input.display()));
        }

        // Synthesis
        let (engine, params) = self.voice_backend(options)?;
        if options.force && paths.segments_dir.exists() {
            std::fs::remove_dir_all(&paths.segments_dir)
                .with_context(|| format!("Failed to clear {}", paths.segments_dir.display()))?;
        }
        let dispatcher = SynthesisDispatcher::new(
            engine,
            DispatchOptions {
                max_workers: options.max_workers.or(general.max_workers),
                failure_policy: options.failure_policy.unwrap_or(general.failure_policy),
                segment_dir: Some(paths.segments_dir.clone()),
            },
        )
        .with_progress(self.progress.clone());
        let report = dispatcher.synthesize_units(transcript.synthesis_units(), &params).await?;

        for failure in report.failures() {
            warn!("Unit {} replaced by silence: {}", failure.unit, failure.cause);
        }

        // Assembly
        self.progress.stage_started(Stage::Assembly, 1);
        let assembled = assemble(&report.segments, general.sample_rate)?;
        assembled.write(&paths.audio, general.output_encoding)?;
        assembled.write_timeline(&paths.timeline)?;
        self.progress.unit_completed(Stage::Assembly, 1, 1);
        self.progress.stage_finished(Stage::Assembly);

        info!(
            "Lecture audio ({}) written to {} in {}",
            format_duration(Duration::from_secs_f64(assembled.duration_seconds())),
            paths.audio.display(),
            format_duration(start_time.elapsed())
        );

        Ok(RunSummary {
            content_units: document.units.len(),
            transcript_lines: transcript.line_count(),
            transcript_reused,
            resumed_segments: report.resumed_count(),
            failures: report.failures(),
            duration_seconds: assembled.duration_seconds(),
            paths,
        })
    }

    /// Check that the selected script provider is reachable
    pub async fn check_script_provider(&self, llm: Option<&str>) -> Result<String> {
        let provider = self.script_provider(llm)?;
        provider.check_connection().await?;
        Ok(provider.name().to_string())
    }

    async fn extract(&self, input: &Path, paths: &OutputPaths, force: bool) -> Result<ExtractedDocument> {
        if paths.is_records_file(input) {
            debug!("Input is a page-records file, reading it directly");
            return ManifestExtractor::new().extract(input).await;
        }

        if !force && paths.records.is_file() {
            info!("Reusing page records from {}", paths.records.display());
            return ManifestExtractor::new().extract(&paths.records).await;
        }

        FileManager::ensure_dir(&paths.visuals_dir)?;
        let extractor = extractor_for(input, &paths.visuals_dir)?;
        let document = extractor
            .extract(input)
            .await
            .with_context(|| format!("Failed to extract {}", input.display()))?;
        document.write_page_records(&paths.records)?;
        debug!("Page records written to {}", paths.records.display());
        Ok(document)
    }

    fn reusable_transcript(&self, paths: &OutputPaths, expected_lines: usize, force: bool) -> Result<Option<Transcript>> {
        if force || !paths.transcript.is_file() {
            return Ok(None);
        }

        let transcript = Transcript::from_text(FileManager::read_to_string(&paths.transcript)?);
        match transcript.check_alignment(expected_lines) {
            Ok(()) => {
                info!("Reusing transcript from {}", paths.transcript.display());
                Ok(Some(transcript))
            }
            Err(e) => {
                warn!("Existing transcript does not match the document ({}), regenerating", e);
                Ok(None)
            }
        }
    }

    async fn generate_transcript(
        &self,
        document: &ExtractedDocument,
        language: &str,
        options: &RunOptions,
    ) -> Result<Transcript> {
        let lecture = self.settings.lecture();
        let general = self.settings.general();

        let instruction = document.directives.instruction.clone().unwrap_or(lecture.instruction);
        let prompt = document.directives.prompt.clone().unwrap_or(lecture.prompt);
        let composer = ScriptComposer::new(instruction, render_prompt(&prompt, language));

        let generator = ScriptGenerator::new(self.script_provider(options.llm.as_deref())?, composer)
            .with_retry(RetryPolicy::new(general.retry_count, general.retry_backoff_ms))
            .with_progress(self.progress.clone());

        Ok(generator.generate(&document.units, general.script_mode).await?)
    }

    fn script_provider(&self, llm: Option<&str>) -> Result<Arc<dyn ScriptProvider>> {
        if let Some(provider) = &self.script_provider {
            return Ok(Arc::clone(provider));
        }

        let key = self.model_key(ModelKind::Llm, llm)?;
        let config = self.settings.llm_config(&key)?;
        Ok(script_provider_from_config(&key, &config)?)
    }

    fn voice_backend(&self, options: &RunOptions) -> Result<(Arc<dyn VoiceEngine>, VoiceParams)> {
        let key = self.model_key(ModelKind::Tts, options.tts.as_deref())?;

        if let Some(engine) = &self.voice_engine {
            let config = self.settings.tts_config(&key).unwrap_or_default();
            return Ok((Arc::clone(engine), voice_params(&config, options)?));
        }

        let config = self.settings.tts_config(&key)?;
        let params = voice_params(&config, options)?;
        Ok((engine_from_config(&key, config)?, params))
    }

    fn model_key(&self, kind: ModelKind, requested: Option<&str>) -> Result<String> {
        requested
            .map(str::to_string)
            .or_else(|| self.settings.selected_model_key(kind))
            .ok_or_else(|| anyhow!("No {} model selected; set selected_{} in the settings file", kind, kind))
    }
}

// Format duration in a human-readable format (HH:MM:SS)
pub fn format_duration(duration: Duration) -> String {
    let total_seconds = duration.as_secs();
    let hours = total_seconds / 3600;
    let minutes = (total_seconds % 3600) / 60;
    let seconds = total_seconds % 60;

    if hours > 0 {
        format!("{}h {}m {}s", hours, minutes, seconds)
    } else if minutes > 0 {
        format!("{}m {}s", minutes, seconds)
    } else {
        format!("{}.{:03}s", seconds, duration.subsec_millis())
    }
}
