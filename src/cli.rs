//! Command-line interface for mouthpiece
//!
//! Provides argument parsing using clap derive macros.

use crate::config::Provider;
use clap::{Parser, Subcommand};
use clap_complete::Shell;
use std::path::PathBuf;

/// Streaming speech-to-lipsync server for talking avatars
#[derive(Parser, Debug)]
#[command(
    name = "mouthpiece",
    version,
    about = "Streaming speech-to-lipsync server for talking avatars"
)]
pub struct Cli {
    /// Subcommand to execute (default: serve)
    #[command(subcommand)]
    pub command: Option<Commands>,

    /// Path to configuration file
    #[arg(long, global = true, value_name = "PATH")]
    pub config: Option<PathBuf>,

    /// Only log errors
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Verbose output (-v: debug, -vv: trace)
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    pub verbose: u8,
}

/// Available commands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Run the HTTP/WebSocket server
    Serve(ServeArgs),

    /// Check that ffmpeg and rhubarb are installed
    Check,

    /// Inspect configuration
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },

    /// Generate shell completions
    Completions {
        /// Shell to generate completions for
        shell: Shell,
    },
}

/// Overrides applied on top of the configuration file and environment.
#[derive(clap::Args, Debug, Default, Clone)]
pub struct ServeArgs {
    /// Address to bind (default: 127.0.0.1)
    #[arg(long, value_name = "HOST")]
    pub host: Option<String>,

    /// Port to listen on (default: 3100)
    #[arg(long, short = 'p', value_name = "PORT")]
    pub port: Option<u16>,

    /// Backend provider (openai, seline)
    #[arg(long, value_name = "PROVIDER", value_parser = parse_provider)]
    pub provider: Option<Provider>,
}

fn parse_provider(s: &str) -> Result<Provider, String> {
    s.parse().map_err(|e: crate::error::MouthpieceError| e.to_string())
}

/// Configuration inspection actions
#[derive(Subcommand, Debug)]
pub enum ConfigAction {
    /// Print the configuration file path
    Path,
    /// Print the effective configuration as TOML (API key redacted)
    Show,
}
