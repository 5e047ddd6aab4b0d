//! The dream> command loop.
//!
//! Reads one command per line, parses it into the shared [`Options`] and
//! writes the normalized prompt for every accepted command. Image generation
//! happens elsewhere; this loop only settles what would be generated.

use anyhow::{Context, Result, anyhow};
use log::{debug, info, trace};
use owo_colors::{OwoColorize, Stream};
use std::io::{BufRead, Write};

use crate::error::ArgsError;
use crate::metadata::format_metadata;
use crate::options::Options;

pub const PROMPT: &str = "dream> ";

/// Seeds used so far, for `-S -1` style back references.
#[derive(Debug, Default)]
pub struct SeedHistory {
    seeds: Vec<i64>,
}

impl SeedHistory {
    /// Non-negative seeds pass through; `-n` picks the n-th most recent seed.
    pub fn resolve(&self, seed: i64) -> Option<i64> {
        if seed >= 0 {
            return Some(seed);
        }
        let back = usize::try_from(seed.unsigned_abs()).ok()?;
        self.seeds
            .len()
            .checked_sub(back)
            .map(|idx| self.seeds[idx])
    }

    pub fn push(&mut self, seed: i64) {
        self.seeds.push(seed);
    }
}

/// Run the loop until end of input or `q`/`quit`/`exit`.
///
/// `interactive` controls whether the dream> prompt is written before each line.
pub fn run<R: BufRead, W: Write>(
    options: &mut Options,
    input: R,
    out: &mut W,
    interactive: bool,
) -> Result<()> {
    let mut history = SeedHistory::default();
    show_prompt(out, interactive)?;

    for line in input.lines() {
        let line = line.context("Failed to read command")?;
        let command = line.trim();
        match command {
            "q" | "quit" | "exit" => break,
            "" => {}
            _ => match handle_command(options, &mut history, command) {
                Ok(normalized) => writeln!(out, "{}", normalized)?,
                Err(e) => report(&e),
            },
        }
        show_prompt(out, interactive)?;
    }

    if interactive {
        writeln!(out)?;
    }
    Ok(())
}

/// Parse one command and return its normalized prompt string.
///
/// The command is staged on a copy of `options` and only committed once
/// every step succeeded, so a rejected command leaves `options` untouched.
pub fn handle_command(
    options: &mut Options,
    history: &mut SeedHistory,
    command: &str,
) -> Result<String> {
    let mut staged = options.clone();
    let cmd = staged.parse_cmd(command)?;
    let seed = cmd.seed;
    let upscale = cmd.upscale_params();
    let embiggen = cmd.embiggen_params();

    let mut resolved_seed = None;
    if let Some(seed) = seed {
        let resolved = history
            .resolve(seed)
            .ok_or_else(|| anyhow!("No previous seed at position {}", seed))?;
        if resolved != seed {
            info!("Seed {} resolves to {}", seed, resolved);
            staged.set("seed", resolved)?;
        }
        resolved_seed = Some(resolved);
    }
    if let Some(up) = upscale {
        debug!("Upscale x{} at strength {}", up.scale, up.strength);
    }
    if let Some(emb) = embiggen {
        debug!(
            "Embiggen x{} (esrgan strength {}, overlap {})",
            emb.scale, emb.esrgan_strength, emb.overlap
        );
    }

    let metadata = format_metadata(&staged)?;
    debug!("Metadata: {}", serde_json::to_string(&metadata)?);
    trace!("Effective configuration: {}", staged.json(&[])?);
    let normalized = staged.prompt_str(&[])?;

    *options = staged;
    if let Some(seed) = resolved_seed {
        history.push(seed);
    }
    Ok(normalized)
}

fn show_prompt<W: Write>(out: &mut W, interactive: bool) -> Result<()> {
    if interactive {
        write!(out, "{}", PROMPT.if_supports_color(Stream::Stdout, |t| t.green()))?;
        out.flush()?;
    }
    Ok(())
}

fn report(e: &anyhow::Error) {
    // clap renders its own usage errors and -h output
    if let Some(ArgsError::InvalidCommand(clap_err)) = e.downcast_ref::<ArgsError>()
        && clap_err.print().is_ok()
    {
        return;
    }
    eprintln!(
        "{} {}",
        "error:".if_supports_color(Stream::Stderr, |t| t.red()),
        e
    );
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::args::StartupArgs;

    fn options() -> Options {
        Options::new(StartupArgs::try_parse_shell(["dream"]).unwrap()).unwrap()
    }

    #[test]
    fn test_seed_history_resolve() {
        let mut history = SeedHistory::default();
        assert_eq!(history.resolve(5), Some(5));
        assert_eq!(history.resolve(-1), None);
        history.push(10);
        history.push(20);
        history.push(30);
        assert_eq!(history.resolve(-1), Some(30));
        assert_eq!(history.resolve(-3), Some(10));
        assert_eq!(history.resolve(-4), None);
        assert_eq!(history.resolve(i64::MIN), None);
    }

    #[test]
    fn test_handle_command_resolves_previous_seed() {
        let mut opts = options();
        let mut history = SeedHistory::default();
        handle_command(&mut opts, &mut history, "fox -S 42").unwrap();
        let second = handle_command(&mut opts, &mut history, "fox -s 10 -S -1").unwrap();
        assert!(second.ends_with("-S 42"));
        assert_eq!(opts.command().seed, Some(42));
    }

    #[test]
    fn test_handle_command_unknown_back_reference() {
        let mut opts = options();
        let mut history = SeedHistory::default();
        handle_command(&mut opts, &mut history, "a lighthouse -s 33 -S 5").unwrap();

        let err = handle_command(&mut opts, &mut history, "fox -s 10 -S -2").unwrap_err();
        assert!(err.to_string().contains("No previous seed"));
        assert_eq!(opts.command().prompt, "a lighthouse");
        assert_eq!(opts.command().steps, 33);
        assert_eq!(opts.command().seed, Some(5));

        // the rejected command did not enter the seed history either
        let next = handle_command(&mut opts, &mut history, "fox -S -1").unwrap();
        assert!(next.ends_with("-S 5"));
    }

    #[test]
    fn test_handle_command_rejects_non_finite_and_keeps_state() {
        let mut opts = options();
        let mut history = SeedHistory::default();
        handle_command(&mut opts, &mut history, "fox -C 9").unwrap();
        assert!(handle_command(&mut opts, &mut history, "fox -C inf").is_err());
        assert_eq!(opts.command().cfg_scale, 9.0);
    }

    #[test]
    fn test_run_writes_one_line_per_accepted_command() {
        let mut opts = options();
        let input = "a castle -s 5\n\na \"broken\n-A not_a_sampler\nq\nnever reached -s 1\n";
        let mut out = Vec::new();
        run(&mut opts, input.as_bytes(), &mut out, false).unwrap();
        let out = String::from_utf8(out).unwrap();
        assert_eq!(out, "\"a castle\" -s 5 -W 512 -H 512 -C 7.5 -A k_lms\n");
        assert_eq!(opts.command().prompt, "a castle");
    }

    #[test]
    fn test_run_interactive_shows_prompt() {
        let mut opts = options();
        let mut out = Vec::new();
        run(&mut opts, "fox\n".as_bytes(), &mut out, true).unwrap();
        let out = String::from_utf8(out).unwrap();
        assert!(out.contains("dream> "));
        assert!(out.contains("\"fox\" -s 50"));
    }
}
