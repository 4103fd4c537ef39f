//! CLI argument parsing with clap.

use clap::{Parser, Subcommand};
use std::path::PathBuf;

use crate::export::AudioJoin;
use crate::store::CreationId;

/// Turn a short script into a narrated multi-scene video
#[derive(Parser, Debug)]
#[command(name = "storyreel")]
#[command(version, about = "Turn a short script into a narrated multi-scene video", long_about = None)]
#[command(after_help = "EXAMPLES:
    # Generate from inline text and play the result
    storyreel generate --text \"The rocket stood on the launchpad...\" --play

    # Generate from a file
    storyreel generate --file story.txt

    # Browse and replay earlier creations
    storyreel history list
    storyreel play 3 --loops 2

    # Export narration only, or the combined video
    storyreel export 3 --audio-only
    storyreel export 3 --out ~/Movies")]
pub struct Args {
    #[command(subcommand)]
    pub command: Command,

    /// Config file path
    #[arg(long, short, global = true)]
    pub config: Option<PathBuf>,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Generate a new creation from a script
    Generate {
        /// Script text
        #[arg(long, short, required_unless_present = "file", conflicts_with = "file")]
        text: Option<String>,

        /// Read the script from a file
        #[arg(long, short)]
        file: Option<PathBuf>,

        /// Play the scenes once generation finishes
        #[arg(long)]
        play: bool,
    },
    /// Saved creations
    History {
        #[command(subcommand)]
        action: HistoryAction,
    },
    /// Play a saved creation, looping until Ctrl+C
    Play {
        /// Creation id (see `history list`)
        id: CreationId,

        /// Stop after this many passes over all scenes
        #[arg(long)]
        loops: Option<u32>,
    },
    /// Export a saved creation
    Export {
        /// Creation id (see `history list`)
        id: CreationId,

        /// Export only the joined narration as WAV
        #[arg(long)]
        audio_only: bool,

        /// How narration clips are joined (default from config)
        #[arg(long, value_enum)]
        join: Option<AudioJoin>,

        /// Output directory (default from config, else current directory)
        #[arg(long)]
        out: Option<PathBuf>,
    },
    /// Configuration management
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(Subcommand, Debug, Clone)]
pub enum HistoryAction {
    /// List saved creations, newest first
    List,
    /// Delete a saved creation
    Delete {
        id: CreationId,
    },
}

#[derive(Subcommand, Debug, Clone)]
pub enum ConfigAction {
    /// Show current configuration
    Show,
    /// Create default config file
    Init,
}
