//! CLI front door for Parley.

use std::path::PathBuf;

use clap::{Parser, Subcommand};

/// Parley conversational agent CLI
#[derive(Parser, Debug)]
#[command(name = "parley", version, about = "Parley: tool-using conversational agent")]
pub struct Cli {
    /// Path to a TOML config file
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

/// Top-level CLI commands.
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Send one message and print the reply as JSON
    Chat(ChatArgs),
    /// Start the runtime and list the registered tools
    Tools,
}

/// Arguments for the `chat` subcommand.
#[derive(Parser, Debug)]
pub struct ChatArgs {
    /// Conversation thread id
    #[arg(short, long)]
    pub thread: Option<String>,

    /// Print run events to stderr
    #[arg(short, long)]
    pub verbose: bool,

    /// User message (positional)
    pub message: Option<String>,
}

impl Cli {
    /// Parse CLI arguments.
    pub fn parse_args() -> Self {
        Self::parse()
    }
}
