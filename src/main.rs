// Module-specific lints configuration
#![allow(clippy::uninlined_format_args)]

use anyhow::{Context, Result, anyhow};
use clap::{CommandFactory, Parser, Subcommand, ValueEnum};
use clap_complete::{Shell, generate};
use log::{Level, LevelFilter, Log, Metadata, Record, SetLoggerError, error, info, warn};
use serde_json::Value;
use std::io::Write;
use std::path::PathBuf;

use slidecast::app_config::{FailurePolicy, LogLevel, ModelKind, SettingsManager};
use slidecast::app_controller::{Controller, RunOptions, progress_bar_reporter};

/// CLI Wrapper for LogLevel to implement ValueEnum
#[derive(Debug, Clone, ValueEnum)]
enum CliLogLevel {
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

impl From<CliLogLevel> for LogLevel {
    fn from(cli_level: CliLogLevel) -> Self {
        match cli_level {
            CliLogLevel::Error => LogLevel::Error,
            CliLogLevel::Warn => LogLevel::Warn,
            CliLogLevel::Info => LogLevel::Info,
            CliLogLevel::Debug => LogLevel::Debug,
            CliLogLevel::Trace => LogLevel::Trace,
        }
    }
}

fn level_filter(level: LogLevel) -> LevelFilter {
    match level {
        LogLevel::Error => LevelFilter::Error,
        LogLevel::Warn => LevelFilter::Warn,
        LogLevel::Info => LevelFilter::Info,
        LogLevel::Debug => LevelFilter::Debug,
        LogLevel::Trace => LevelFilter::Trace,
    }
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Turn a slide deck into a narrated lecture (default command)
    #[command(alias = "run")]
    Generate(GenerateArgs),

    /// Inspect or change the settings file
    Settings {
        #[command(subcommand)]
        action: SettingsCommand,
    },

    /// Check that the selected script provider is reachable
    Check {
        /// Script provider configuration key (defaults to the selected one)
        #[arg(long)]
        llm: Option<String>,
    },

    /// Generate shell completions for slidecast
    Completions {
        /// Shell to generate completions for
        #[arg(value_enum)]
        shell: Shell,
    },
}

#[derive(Subcommand, Debug)]
enum SettingsCommand {
    /// Print a value by dot path (the whole file without a key)
    Get {
        key: Option<String>,
    },
    /// Set a value by dot path; the value is parsed as JSON, else kept as a string
    Set {
        key: String,
        value: String,
    },
    /// List the available script and speech backends
    List,
}

#[derive(Parser, Debug)]
struct GenerateArgs {
    /// Input deck (.pdf) or page records (.json)
    #[arg(value_name = "INPUT_PATH")]
    input_path: PathBuf,

    /// Directory for the generated files (defaults to the input's directory)
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Directory for extracted images
    #[arg(long)]
    visuals: Option<PathBuf>,

    /// Regenerate everything, ignoring results of earlier runs
    #[arg(short, long)]
    force: bool,

    /// Fail the run when any unit fails to synthesize
    #[arg(long, conflicts_with = "continue_on_error")]
    strict: bool,

    /// Replace units that fail to synthesize with silence
    #[arg(long = "continue")]
    continue_on_error: bool,

    /// Maximum concurrent synthesis tasks
    #[arg(short, long)]
    workers: Option<usize>,

    /// Script provider configuration key
    #[arg(long)]
    llm: Option<String>,

    /// Speech backend configuration key
    #[arg(long)]
    tts: Option<String>,

    /// Voice name
    #[arg(long)]
    voice: Option<String>,

    /// Speech speed multiplier
    #[arg(long)]
    speed: Option<f32>,

    /// Lecture language code (e.g., 'en', 'de')
    #[arg(short, long)]
    lang: Option<String>,

    /// Do not draw a progress bar
    #[arg(long)]
    no_progress: bool,
}

impl GenerateArgs {
    fn failure_policy(&self) -> Option<FailurePolicy> {
        if self.strict {
            Some(FailurePolicy::Strict)
        } else if self.continue_on_error {
            Some(FailurePolicy::Continue)
        } else {
            None
        }
    }

    fn into_run_options(self) -> RunOptions {
        RunOptions {
            failure_policy: self.failure_policy(),
            input: self.input_path,
            output_dir: self.output,
            visuals_dir: self.visuals,
            force: self.force,
            max_workers: self.workers,
            llm: self.llm,
            tts: self.tts,
            voice: self.voice,
            speed: self.speed,
            language: self.lang,
        }
    }
}

/// slidecast - narrated lectures from slide decks
///
/// Extracts the text and images of each slide, has a language model write a
/// spoken lecture for them and synthesizes the transcript into one audio file
/// with per-slide timestamps.
#[derive(Parser, Debug)]
#[command(name = "slidecast")]
#[command(version)]
#[command(about = "Narrated lectures from slide decks")]
#[command(long_about = "slidecast turns a slide deck into a narrated lecture.

EXAMPLES:
    slidecast generate week1.pdf                     # Use the selected backends
    slidecast generate -f week1.pdf                  # Regenerate every artifact
    slidecast generate --llm anthropic_claude week1.pdf
    slidecast generate --tts openai --voice nova --continue week1.pdf
    slidecast generate week1.json                    # Start from page records
    slidecast settings set general.preferred_language de
    slidecast settings list
    slidecast completions bash > slidecast.bash

OUTPUT:
    <name>.json             page records
    <name>.txt              lecture transcript, one line per narrated slide
    <name>.wav              combined audio
    <name>.timestamps.json  start/end of every line in the audio
    <name>_segments/        per-line audio, reused by later runs

CONFIGURATION:
    Settings are stored in settings.json by default. A missing file is created
    with defaults on first use. API keys are read from the environment variables
    named by api_key_env.")]
struct CommandLineOptions {
    #[command(subcommand)]
    command: Commands,

    /// Settings file path
    #[arg(short, long, global = true, default_value = "settings.json")]
    settings: PathBuf,

    /// Set logging level
    #[arg(long, global = true, value_enum)]
    log_level: Option<CliLogLevel>,
}

// @struct: Custom logger implementation
struct CustomLogger {
    level: LevelFilter,
}

impl CustomLogger {
    // @creates: New logger with specified level
    fn new(level: LevelFilter) -> Self {
        CustomLogger { level }
    }

    // @initializes: Global logger
    fn init(level: LevelFilter) -> Result<(), SetLoggerError> {
        // the logger passes everything; max_level does the filtering
        let logger = Box::new(CustomLogger::new(LevelFilter::Trace));
        log::set_boxed_logger(logger)?;
        log::set_max_level(level);
        Ok(())
    }

    // @returns: Emoji for log level
    fn get_emoji_for_level(level: Level) -> &'static str {
        match level {
            Level::Error => "❌",
            Level::Warn => "🚧",
            Level::Info => "",
            Level::Debug => "🔍",
            Level::Trace => "📋",
        }
    }

    // @returns: ANSI color for log level
    fn get_color_for_level(level: Level) -> &'static str {
        match level {
            Level::Error => "1;31",
            Level::Warn => "1;33",
            Level::Info => "1;32",
            Level::Debug => "1;36",
            Level::Trace => "1;35",
        }
    }
}

impl Log for CustomLogger {
    fn enabled(&self, metadata: &Metadata) -> bool {
        metadata.level() <= self.level
    }

    fn log(&self, record: &Record) {
        if self.enabled(record.metadata()) {
            let now = chrono::Local::now().format("%H:%M:%S.%3f");
            let level = record.level();

            let mut stderr = std::io::stderr();
            let _ = writeln!(
                stderr,
                "\x1B[{}m{} {} {}\x1B[0m",
                Self::get_color_for_level(level),
                now,
                Self::get_emoji_for_level(level),
                record.args()
            );
        }
    }

    fn flush(&self) {
        let _ = std::io::stderr().flush();
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize the logger once with info level by default
    // We'll update the level after loading the settings if needed
    CustomLogger::init(LevelFilter::Info)?;

    let cli = CommandLineOptions::parse();

    if let Commands::Completions { shell } = &cli.command {
        let mut cmd = CommandLineOptions::command();
        generate(*shell, &mut cmd, "slidecast", &mut std::io::stdout());
        return Ok(());
    }

    let settings = SettingsManager::new(&cli.settings, None);

    let log_level = match &cli.log_level {
        Some(level) => level.clone().into(),
        None => settings.general().log_level,
    };
    log::set_max_level(level_filter(log_level));

    let result = match cli.command {
        Commands::Generate(args) => run_generate(settings, args).await,
        Commands::Settings { action } => run_settings(&settings, action),
        Commands::Check { llm } => run_check(settings, llm).await,
        Commands::Completions { .. } => Ok(()),
    };

    if let Err(e) = &result {
        error!("{:#}", e);
    }
    result
}

async fn run_generate(settings: SettingsManager, args: GenerateArgs) -> Result<()> {
    let show_progress = !args.no_progress;
    let options = args.into_run_options();

    let mut controller = Controller::new(settings);
    if show_progress {
        controller = controller.with_progress(progress_bar_reporter());
    }

    let summary = controller.run(&options).await?;

    if summary.transcript_reused {
        info!("Transcript was reused from {}", summary.paths.transcript.display());
    }
    if summary.resumed_segments > 0 {
        info!("{} segment(s) resumed from an earlier run", summary.resumed_segments);
    }
    if !summary.failures.is_empty() {
        warn!(
            "{} line(s) are silent because synthesis failed: {}",
            summary.failures.len(),
            summary
                .failures
                .iter()
                .map(|f| f.unit.to_string())
                .collect::<Vec<_>>()
                .join(", ")
        );
    }
    info!(
        "Success: {} ({} lines, {:.1}s), timestamps in {}",
        summary.paths.audio.display(),
        summary.transcript_lines,
        summary.duration_seconds,
        summary.paths.timeline.display()
    );
    Ok(())
}

fn run_settings(settings: &SettingsManager, action: SettingsCommand) -> Result<()> {
    match action {
        SettingsCommand::Get { key } => {
            let value = match key.as_deref() {
                None | Some("") => settings.load_settings(),
                Some(key) => settings
                    .get(key)
                    .ok_or_else(|| anyhow!("No setting at '{}'", key))?,
            };
            println!("{}", serde_json::to_string_pretty(&value)?);
        }
        SettingsCommand::Set { key, value } => {
            let parsed = serde_json::from_str::<Value>(&value).unwrap_or(Value::String(value));
            settings
                .update(&key, parsed)
                .with_context(|| format!("Failed to update '{}'", key))?;
            info!("Updated {} in {}", key, settings.settings_path().display());
        }
        SettingsCommand::List => {
            for kind in [ModelKind::Llm, ModelKind::Tts] {
                let selected = settings.selected_model_key(kind);
                println!("{} models:", kind);
                for (key, display_name) in settings.available_models(kind) {
                    let marker = if selected.as_deref() == Some(key.as_str()) { "*" } else { " " };
                    println!("  {} {:<24} {}", marker, key, display_name);
                }
            }
        }
    }
    Ok(())
}

async fn run_check(settings: SettingsManager, llm: Option<String>) -> Result<()> {
    let controller = Controller::new(settings);
    let name = controller.check_script_provider(llm.as_deref()).await?;
    info!("Connection to {} OK", name);
    Ok(())
}
