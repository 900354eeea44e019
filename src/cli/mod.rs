//! Command-line interface parsing and handling
//!
//! This module parses command-line arguments, loads configuration and hands
//! off to the server or to one of the offline helpers.

pub mod replay;

use std::error::Error;
use std::fs;
use std::io::{self, Read};
use std::path::PathBuf;

use clap::{Parser, Subcommand};
use tracing::debug;

use crate::core::config::Config;
use crate::logging;
use crate::server;

#[derive(Parser)]
#[command(name = "chatfolio", version)]
#[command(about = "Streaming chat backend for a portfolio site")]
#[command(
    long_about = "chatfolio serves POST /api/chat for a portfolio site's assistant. Each request \
is forwarded to an OpenAI-compatible chat completion API with streaming enabled, and the \
upstream token stream is re-framed into word-sized text pieces and whole function-call \
objects before it reaches the browser.\n\n\
Environment Variables:\n\
  OPENAI_API_KEY    API key for the upstream (required unless set in the config file)\n\
  OPENAI_BASE_URL   Custom API base URL (optional, defaults to https://api.openai.com/v1)\n\
  CHATFOLIO_MODEL   Model override (optional)\n\
  RUST_LOG          Log filter, overrides logging.filter from the config file"
)]
pub struct Args {
    #[command(subcommand)]
    pub command: Option<Commands>,

    /// Path to the config file (defaults to the platform config directory)
    #[arg(short = 'c', long, global = true, value_name = "PATH")]
    pub config: Option<PathBuf>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Run the HTTP server (default)
    Serve {
        /// Address to bind, overrides server.host
        #[arg(long)]
        host: Option<String>,
        /// Port to bind, overrides server.port
        #[arg(short = 'p', long)]
        port: Option<u16>,
    },
    /// Re-frame a captured upstream SSE stream offline and print the result
    Replay {
        /// Capture file; reads stdin when omitted
        file: Option<PathBuf>,
        /// Print one token per line instead of the joined text
        #[arg(long)]
        tokens: bool,
    },
    /// Show the effective configuration
    Config {
        #[command(subcommand)]
        action: Option<ConfigAction>,
    },
}

#[derive(Subcommand)]
pub enum ConfigAction {
    /// Write a default config file (never overwrites)
    Init,
}

pub fn main() -> Result<(), Box<dyn Error>> {
    run(Args::parse())
}

pub fn run(args: Args) -> Result<(), Box<dyn Error>> {
    let command = args.command.unwrap_or(Commands::Serve {
        host: None,
        port: None,
    });

    if let Commands::Config {
        action: Some(ConfigAction::Init),
    } = command
    {
        let path = match args.config {
            Some(path) => path,
            None => Config::default_path()?,
        };
        Config::default().write_new(&path)?;
        println!("✅ Wrote default configuration to {}", path.display());
        return Ok(());
    }

    let mut config = Config::load(args.config.as_deref())?;
    config.apply_process_env();
    logging::init(&config.logging.filter);

    match command {
        Commands::Serve { host, port } => {
            config.override_server(host, port);
            actix_web::rt::System::new().block_on(server::run(config))
        }
        Commands::Replay { file, tokens } => {
            let input = match file {
                Some(path) => fs::read(path)?,
                None => {
                    let mut buffer = Vec::new();
                    io::stdin().read_to_end(&mut buffer)?;
                    buffer
                }
            };
            let stdout = io::stdout();
            let mut out = stdout.lock();
            let stats = replay::replay(&input, tokens, &mut out)?;
            debug!(
                lines = stats.lines,
                skipped_lines = stats.skipped_lines,
                tokens = stats.tokens,
                "Replay finished"
            );
            Ok(())
        }
        Commands::Config { .. } => {
            config.print_all();
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests;
