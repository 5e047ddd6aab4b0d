//! dream: argument handling for the Stable Diffusion command shell.
//!
//! Parses the shell flags, checks the models registry, and then reads
//! dream> commands from the terminal, a file, or standard input.

use anyhow::{Context, Result, bail};
use log::{error, info, warn};
use std::fs::File;
use std::io::{BufReader, IsTerminal};

mod args;
mod cli;
mod config;
mod error;
mod metadata;
mod options;
mod repl;

/// Main entry point for dream.
///
/// Initializes logging, parses command-line arguments, resolves the model
/// against the registry, and hands control to the command loop.
fn main() -> Result<()> {
    env_logger::init();
    let startup = args::StartupArgs::parse_shell(std::env::args());

    if startup.web {
        bail!(
            "Web server mode is not available in this build (requested {}:{})",
            startup.host,
            startup.port
        );
    }

    match config::ModelsConfig::load(&startup.conf).map_err(|e| {
        error!("Failed to load models file: {:#}", e);
        e
    })? {
        Some(models) => {
            let entry = models.resolve(&startup.model)?;
            info!(
                "Model {}: config={} weights={}",
                startup.model, entry.config, entry.weights
            );
        }
        None => warn!(
            "Models file {} not found; model '{}' is not checked",
            startup.conf.display(),
            startup.model
        ),
    }

    let infile = startup.infile.clone();
    let mut options = options::Options::new(startup)?;
    let stdout = std::io::stdout();
    let mut out = stdout.lock();

    match infile {
        Some(path) if path.as_os_str() == "-" => {
            repl::run(&mut options, std::io::stdin().lock(), &mut out, false)
        }
        Some(path) => {
            let file = File::open(&path)
                .with_context(|| format!("Failed to open prompt file {}", path.display()))?;
            info!("Reading prompts from {}", path.display());
            repl::run(&mut options, BufReader::new(file), &mut out, false)
        }
        None => {
            let stdin = std::io::stdin();
            let interactive = stdin.is_terminal();
            repl::run(&mut options, stdin.lock(), &mut out, interactive)
        }
    }
}
