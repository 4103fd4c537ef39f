//! Subcommand handlers.

use std::path::{Path, PathBuf};

use tokio::sync::mpsc::UnboundedReceiver;

use super::args::{ConfigAction, HistoryAction};
use crate::config::{default_path, Config};
use crate::credentials::{CredentialGate, EnvCredentials};
use crate::export::{self, AudioJoin, EXPORT_FAILED_MESSAGE};
use crate::gemini::{GeminiClient, GEMINI_API_KEY_ENV};
use crate::pipeline::setup_ctrlc_handler;
use crate::playback::{FfplayLauncher, PlayableAsset, Player};
use crate::progress::{Progress, ProgressUpdate};
use crate::store::{Creation, CreationId, CreationStore, DiskStore};
use crate::story::{GeminiStudio, Orchestrator, RunError};

/// Resolve the script from `--text` or `--file`.
pub fn read_script(text: Option<String>, file: Option<PathBuf>) -> Result<String, String> {
    let script = match (text, file) {
        (Some(text), _) => text,
        (None, Some(path)) => std::fs::read_to_string(&path)
            .map_err(|e| format!("Failed to read script '{}': {}", path.display(), e))?,
        (None, None) => return Err("Either --text or --file must be provided".to_string()),
    };

    if script.trim().is_empty() {
        return Err("The script is empty.".to_string());
    }
    Ok(script)
}

fn open_store(config: &Config) -> Result<DiskStore, String> {
    let dir = config.storage_dir();
    DiskStore::open(&dir).map_err(|e| format!("Failed to open creation store: {}", e))
}

fn load_creation(store: &DiskStore, id: CreationId) -> Result<Creation, String> {
    store
        .load(id)
        .map_err(|e| format!("Failed to load creation {}: {}", id, e))?
        .ok_or_else(|| format!("No creation with id {}. See 'storyreel history list'.", id))
}

async fn print_progress(mut rx: UnboundedReceiver<ProgressUpdate>) {
    while let Some(update) = rx.recv().await {
        println!("{}", update);
    }
}

/// Progress sender whose updates are printed from a plain thread.
fn threaded_progress() -> (Progress, std::thread::JoinHandle<()>) {
    let (progress, mut rx) = Progress::channel();
    let printer = std::thread::spawn(move || {
        while let Some(update) = rx.blocking_recv() {
            println!("{}", update);
        }
    });
    (progress, printer)
}

/// Run `generate`: produce, persist and optionally play a creation.
pub fn run_generate(config: &Config, script: &str, play: bool) -> Result<(), String> {
    let mut gate = EnvCredentials::from_env();
    if !gate.has_key() {
        eprintln!("No Gemini API key found ({} is not set).", GEMINI_API_KEY_ENV);
        gate.request_key_selection()
            .map_err(|e| format!("An API key is required to generate: {}", e))?;
    }
    let api_key = gate
        .api_key()
        .ok_or_else(|| RunError::MissingCredential.to_string())?;

    let client = GeminiClient::with_base_url(api_key, config.gemini.base_url.clone())
        .map_err(|e| format!("Failed to create Gemini client: {}", e))?;
    let studio = GeminiStudio::new(client, config.studio_settings());
    let store = open_store(config)?;

    let rt = tokio::runtime::Runtime::new()
        .map_err(|e| format!("Failed to create async runtime: {}", e))?;

    let (id, playable) = rt.block_on(async {
        let (progress, rx) = Progress::channel();
        let printer = tokio::spawn(print_progress(rx));

        let mut orchestrator = Orchestrator::new(studio, store, gate, progress);
        let result = orchestrator.run(script).await;
        let playable = orchestrator.take_playable();
        drop(orchestrator);
        let _ = printer.await;

        match result {
            Ok(id) => Ok((id, playable)),
            Err(RunError::InvalidCredential) => Err(format!(
                "{}\nUpdate {} in your environment or .env file.",
                RunError::InvalidCredential,
                GEMINI_API_KEY_ENV
            )),
            Err(e) => Err(e.to_string()),
        }
    })?;

    println!();
    println!("Creation saved!");
    println!("  Id: {}", id);
    println!("  Scenes: {}", playable.len());

    if play {
        play_assets(&playable, None)?;
    }
    Ok(())
}

fn play_assets(assets: &[PlayableAsset], loops: Option<u32>) -> Result<(), String> {
    if let Err(e) = setup_ctrlc_handler() {
        log::warn!("Failed to install Ctrl+C handler: {}", e);
    }

    println!("Playing {} scenes (Ctrl+C to stop)...", assets.len());
    let (progress, printer) = threaded_progress();
    let result = Player::new(loops, progress).run(assets, &mut FfplayLauncher::default());
    let _ = printer.join();

    let played = result.map_err(|e| format!("Playback failed: {}", e))?;
    log::info!("Played {} scenes", played);
    Ok(())
}

/// Run `play`.
pub fn run_play(config: &Config, id: CreationId, loops: Option<u32>) -> Result<(), String> {
    let store = open_store(config)?;
    let creation = load_creation(&store, id)?;
    let assets = PlayableAsset::from_scenes(&creation.assets)
        .map_err(|e| format!("Failed to prepare media: {}", e))?;
    play_assets(&assets, loops)
}

/// Run `history list|delete`.
pub fn run_history(config: &Config, action: HistoryAction) -> Result<(), String> {
    let store = open_store(config)?;

    match action {
        HistoryAction::List => {
            let summaries = store
                .list()
                .map_err(|e| format!("Failed to list creations: {}", e))?;

            if summaries.is_empty() {
                println!("No saved creations yet.");
                return Ok(());
            }

            println!("Saved creations:\n");
            for summary in &summaries {
                println!(
                    "  {:>4}  {}  {:>2} scene{}  \"{}\"",
                    summary.id,
                    summary
                        .created_at
                        .with_timezone(&chrono::Local)
                        .format("%Y-%m-%d %H:%M"),
                    summary.scene_count,
                    if summary.scene_count == 1 { " " } else { "s" },
                    truncate(&summary.script, 50)
                );
            }
            println!("\nTotal: {} creations", summaries.len());
            Ok(())
        }
        HistoryAction::Delete { id } => {
            let removed = store
                .delete(id)
                .map_err(|e| format!("Failed to delete creation {}: {}", id, e))?;
            println!("{}", delete_message(id, removed));
            Ok(())
        }
    }
}

fn delete_message(id: CreationId, removed: bool) -> String {
    if removed {
        format!("Deleted creation {}", id)
    } else {
        format!("No creation with id {}; nothing was deleted.", id)
    }
}

/// Shorten `text` to at most `max` characters on one line.
fn truncate(text: &str, max: usize) -> String {
    let flat: String = text.split_whitespace().collect::<Vec<_>>().join(" ");
    if flat.chars().count() <= max {
        return flat;
    }
    let cut: String = flat.chars().take(max.saturating_sub(3)).collect();
    format!("{}...", cut)
}

/// Run `export`.
pub fn run_export(
    config: &Config,
    id: CreationId,
    audio_only: bool,
    join: Option<AudioJoin>,
    out: Option<PathBuf>,
) -> Result<(), String> {
    let store = open_store(config)?;
    let creation = load_creation(&store, id)?;
    let assets = PlayableAsset::from_scenes(&creation.assets)
        .map_err(|e| format!("Failed to prepare media: {}", e))?;

    let mut options = config.export_options();
    if let Some(join) = join {
        options.join = join;
    }
    let out_dir = out.unwrap_or_else(|| config.output_dir());

    let path = if audio_only {
        export::export_audio(&assets, options.join, &out_dir)
            .map_err(|e| format!("Audio export failed: {}", e))?
    } else {
        let (progress, printer) = threaded_progress();
        let result = export::export_video(&assets, options, &out_dir, &progress);
        drop(progress);
        let _ = printer.join();
        result.map_err(|e| {
            log::error!("Video export failed: {}", e);
            EXPORT_FAILED_MESSAGE.to_string()
        })?
    };

    println!("Exported: {}", path.display());
    Ok(())
}

/// Handle config subcommand actions.
pub fn handle_config_action(config_path: Option<&Path>, action: ConfigAction) -> Result<(), String> {
    let path = config_path.map(PathBuf::from).unwrap_or_else(default_path);

    match action {
        ConfigAction::Show => {
            let config = Config::load(Some(path.as_path())).map_err(|e| e.to_string())?;
            if path.exists() {
                println!("Config file: {} (exists)", path.display());
            } else {
                println!("Config file: {} (not found, using defaults)", path.display());
            }
            println!("Store: {}", config.storage_dir().display());
            println!();
            print!("{}", config.to_toml().map_err(|e| e.to_string())?);
            Ok(())
        }
        ConfigAction::Init => {
            Config::write_default(&path).map_err(|e| match e {
                crate::config::ConfigError::AlreadyExists(_) => format!(
                    "{}\nUse 'storyreel config show' to view current settings.",
                    e
                ),
                other => other.to_string(),
            })?;
            println!("Created config file: {}", path.display());
            Ok(())
        }
    }
}
