use clap::Parser;
use tracing_subscriber::EnvFilter;

use storyreel::cli::{self, Args, Command};
use storyreel::config::Config;

/// Load environment variables from .env file
fn load_env() {
    // Existing env vars win; a missing .env is fine
    let _ = dotenv::dotenv();
}

fn init_logging() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("storyreel=info,warn"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

fn run(args: Args) -> Result<(), String> {
    let Args {
        command,
        config: config_path,
    } = args;
    let load_config = || Config::load(config_path.as_deref()).map_err(|e| e.to_string());

    match command {
        Command::Config { action } => cli::handle_config_action(config_path.as_deref(), action),
        Command::Generate { text, file, play } => {
            let config = load_config()?;
            let script = cli::read_script(text, file)?;
            cli::run_generate(&config, &script, play)
        }
        Command::History { action } => cli::run_history(&load_config()?, action),
        Command::Play { id, loops } => cli::run_play(&load_config()?, id, loops),
        Command::Export {
            id,
            audio_only,
            join,
            out,
        } => cli::run_export(&load_config()?, id, audio_only, join, out),
    }
}

fn main() {
    // Load .env file before anything else
    load_env();
    init_logging();

    let args = Args::parse();
    if let Err(e) = run(args) {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }
}
