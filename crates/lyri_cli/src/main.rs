//! Lyri command-line front end.
//!
//! Usage:
//!   lyri run --audio song.mp3 --text lyrics.txt
//!   lyri run --audio song.wav --mode stems
//!   lyri init-config

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use directories::ProjectDirs;

use lyri_core::config::ConfigManager;
use lyri_core::executor::TaskExecutor;
use lyri_core::logging::init_tracing;
use lyri_core::models::{InputKey, ProductionMode, TaskMetadata};
use lyri_core::orchestrator::{Orchestrator, StageEngines};
use lyri_core::tasks::{TaskState, TaskStore};

#[derive(Parser)]
#[command(name = "lyri", version, about = "Turn a song and its lyrics into a captioned video")]
struct Cli {
    /// Config file (default: platform config directory)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run one task to completion and print its results
    Run(RunArgs),
    /// Write a config file with default values
    InitConfig,
}

#[derive(clap::Args)]
struct RunArgs {
    /// Input audio file
    #[arg(short, long)]
    audio: PathBuf,

    /// Lyrics text file
    #[arg(short, long, alias = "lyrics")]
    text: Option<PathBuf>,

    /// Background image or video
    #[arg(short, long)]
    background: Option<PathBuf>,

    /// Metadata JSON (production_type, overlay_text, language)
    #[arg(long)]
    metadata: Option<PathBuf>,

    /// Production mode: music, karaoke or stems
    #[arg(short, long)]
    mode: Option<ProductionMode>,

    /// Overlay text; an empty string disables it
    #[arg(long)]
    overlay: Option<String>,

    /// Lyrics language (ISO 639-3), skipping detection
    #[arg(long)]
    language: Option<String>,

    /// Separation model checkpoint
    #[arg(long = "vocal-separator-model", alias = "vocal_separator_model")]
    vocal_separator_model: Option<String>,

    /// Folder for uploaded inputs
    #[arg(long = "inputs-cache", alias = "inputs_cache")]
    inputs_cache: Option<PathBuf>,

    /// Folder for stage artifacts and results
    #[arg(long = "outputs-cache", alias = "outputs_cache")]
    outputs_cache: Option<PathBuf>,
}

fn default_config_path() -> PathBuf {
    ProjectDirs::from("ai", "lyri", "lyri")
        .map(|dirs| dirs.config_dir().join("lyri.toml"))
        .unwrap_or_else(|| PathBuf::from("lyri.toml"))
}

fn path_string(path: &Path) -> String {
    path.to_string_lossy().to_string()
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let config_path = cli.config.unwrap_or_else(default_config_path);

    let mut config = ConfigManager::new(&config_path);
    config
        .load_or_create()
        .with_context(|| format!("Failed to load config {}", config_path.display()))?;
    init_tracing(config.settings().logging.level);

    match cli.command {
        Command::InitConfig => {
            println!("Config written to {}", config.path().display());
            Ok(())
        }
        Command::Run(args) => run(config, args).await,
    }
}

async fn run(mut config: ConfigManager, args: RunArgs) -> Result<()> {
    {
        let settings = config.settings_mut();
        if let Some(ref model) = args.vocal_separator_model {
            settings.separation.model_path = model.clone();
        }
        if let Some(ref dir) = args.inputs_cache {
            settings.paths.input_cache = path_string(dir);
        }
        if let Some(ref dir) = args.outputs_cache {
            settings.paths.output_cache = path_string(dir);
        }
    }
    config
        .ensure_dirs_exist()
        .context("Failed to create cache directories")?;

    let settings = config.settings().clone();
    let store = Arc::new(TaskStore::from_settings(&settings));
    let poll_interval = settings.executor.poll_interval();
    let engines = StageEngines::from_settings(&settings);
    let executor = TaskExecutor::new(Arc::clone(&store), Arc::new(Orchestrator::new(settings, engines)));

    let id = store.create(args.mode.unwrap_or_default());
    tracing::info!(task = %id, "Created task");

    store
        .import_input(&id, InputKey::Audio, &args.audio)
        .context("Failed to add audio")?;
    if let Some(ref lyrics) = args.text {
        store
            .import_input(&id, InputKey::Lyrics, lyrics)
            .context("Failed to add lyrics")?;
    }
    if let Some(ref background) = args.background {
        store
            .import_input(&id, InputKey::Background, background)
            .context("Failed to add background")?;
    }

    let metadata = task_metadata(&args)?;
    if metadata != TaskMetadata::default() {
        let path = PathBuf::from(&config.settings().paths.input_cache)
            .join(format!("{}-metadata.json", id));
        fs::write(&path, serde_json::to_string_pretty(&metadata)?)
            .with_context(|| format!("Failed to write {}", path.display()))?;
        let imported = store.import_input(&id, InputKey::Metadata, &path);
        let _ = fs::remove_file(&path);
        imported.context("Failed to apply metadata")?;
    }

    let handle = executor.run(&id).context("Task is missing inputs")?;
    let waiter = executor.wait_for_terminal(&id, poll_interval);
    tokio::pin!(waiter);

    let snapshot = tokio::select! {
        snapshot = &mut waiter => snapshot?,
        _ = tokio::signal::ctrl_c() => {
            eprintln!("Cancelling...");
            executor.cancel(&id)?;
            waiter.await?
        }
    };
    handle.await.context("Task worker panicked")?;

    match snapshot.state {
        TaskState::Completed => {
            for (kind, path) in &snapshot.results {
                println!("{}: {}", kind.as_str(), path.display());
            }
            Ok(())
        }
        TaskState::Cancelled => bail!("Task {} was cancelled", id),
        state => bail!(
            "Task {} {}: {}",
            id,
            state,
            snapshot.error_message.unwrap_or_default()
        ),
    }
}

/// Metadata file contents with command-line overrides applied.
fn task_metadata(args: &RunArgs) -> Result<TaskMetadata> {
    let mut metadata = match args.metadata {
        Some(ref path) => {
            let content = fs::read_to_string(path)
                .with_context(|| format!("Failed to read {}", path.display()))?;
            TaskMetadata::from_json(&content)
                .with_context(|| format!("Invalid metadata {}", path.display()))?
        }
        None => TaskMetadata::default(),
    };

    if let Some(mode) = args.mode {
        metadata.production_type = Some(mode);
    }
    if let Some(ref overlay) = args.overlay {
        metadata.overlay_text = Some(overlay.clone());
    }
    if let Some(ref language) = args.language {
        metadata.language = Some(language.clone());
    }
    Ok(metadata)
}
