//! The dream> command grammar.
//!
//! A command line is a free-text prompt followed by switches, e.g.
//! `a fantastic alien landscape -W1024 -H960 -s100 -n12`. The line is split
//! with POSIX shell quoting rules, everything before the first dash-prefixed
//! token becomes the prompt, and the remainder is handed to clap.

use clap::{ArgAction, Parser, ValueEnum};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;

use crate::args::{OutputArgs, expand_legacy_aliases};
use crate::error::ArgsError;

pub const DEFAULT_UPSCALE_STRENGTH: f64 = 0.75;
pub const DEFAULT_EMBIGGEN_STRENGTH: f64 = 0.75;
pub const DEFAULT_EMBIGGEN_OVERLAP: f64 = 0.25;

/// Single-dash long spellings accepted at the dream> prompt.
pub const COMMAND_ALIASES: &[(&str, &str)] = &[
    ("-fit", "--fit"),
    ("-save_orig", "--save_original"),
    ("-embiggen", "--embiggen"),
    ("-embiggen_tiles", "--embiggen_tiles"),
];

/// Samplers the generator knows about.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, ValueEnum, Serialize, Deserialize)]
pub enum Sampler {
    #[value(name = "ddim")]
    #[serde(rename = "ddim")]
    Ddim,
    #[value(name = "k_dpm_2_a")]
    #[serde(rename = "k_dpm_2_a")]
    KDpm2A,
    #[value(name = "k_dpm_2")]
    #[serde(rename = "k_dpm_2")]
    KDpm2,
    #[value(name = "k_euler_a")]
    #[serde(rename = "k_euler_a")]
    KEulerA,
    #[value(name = "k_euler")]
    #[serde(rename = "k_euler")]
    KEuler,
    #[value(name = "k_heun")]
    #[serde(rename = "k_heun")]
    KHeun,
    #[default]
    #[value(name = "k_lms")]
    #[serde(rename = "k_lms")]
    KLms,
    #[value(name = "plms")]
    #[serde(rename = "plms")]
    Plms,
}

impl Sampler {
    pub fn as_str(self) -> &'static str {
        match self {
            Sampler::Ddim => "ddim",
            Sampler::KDpm2A => "k_dpm_2_a",
            Sampler::KDpm2 => "k_dpm_2",
            Sampler::KEulerA => "k_euler_a",
            Sampler::KEuler => "k_euler",
            Sampler::KHeun => "k_heun",
            Sampler::KLms => "k_lms",
            Sampler::Plms => "plms",
        }
    }
}

impl fmt::Display for Sampler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One `seed:weight` entry of `--with_variations`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct VariationPair(pub u64, pub f64);

impl fmt::Display for VariationPair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{:?}", self.0, self.1)
    }
}

pub fn parse_variation_pair(s: &str) -> Result<VariationPair, String> {
    let (seed, weight) = s
        .split_once(':')
        .ok_or_else(|| format!("expected seed:weight, got '{}'", s))?;
    let seed = seed
        .trim()
        .parse::<u64>()
        .map_err(|e| format!("invalid seed '{}': {}", seed, e))?;
    let weight = parse_finite(weight).map_err(|e| format!("invalid weight: {}", e))?;
    Ok(VariationPair(seed, weight))
}

/// Resolved `--upscale` values.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct UpscaleParams {
    pub scale: f64,
    pub strength: f64,
}

/// Resolved `--embiggen` values.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EmbiggenParams {
    pub scale: f64,
    pub esrgan_strength: f64,
    /// Ratio (0 - 1.0) or a pixel count when greater than 1.
    pub overlap: f64,
}

#[derive(Parser, Debug, Clone, PartialEq, Serialize, Deserialize)]
#[command(
    name = "dream>",
    no_binary_name = true,
    disable_version_flag = true,
    args_override_self = true
)]
#[command(about = "Example: dream> a fantastic alien landscape -W1024 -H960 -s100 -n12")]
pub struct CommandArgs {
    /// Text prompt describing the image
    pub prompt: String,

    /// Number of steps
    #[arg(short = 's', long = "steps", default_value_t = 50)]
    pub steps: u32,

    /// Image seed; a +ve integer, or use -1 for the previous seed, -2 for the one before that, etc
    #[arg(short = 'S', long = "seed", allow_negative_numbers = true)]
    pub seed: Option<i64>,

    /// Number of samplings to perform (slower, but will provide seeds for individual images)
    #[arg(short = 'n', long = "iterations", default_value_t = 1)]
    pub iterations: u32,

    /// Image width, multiple of 64
    #[arg(short = 'W', long = "width", default_value_t = 512)]
    pub width: u32,

    /// Image height, multiple of 64
    #[arg(short = 'H', long = "height", default_value_t = 512)]
    pub height: u32,

    /// Classifier free guidance (CFG) scale - higher numbers cause generator to "try" harder
    #[arg(short = 'C', long = "cfg_scale", value_parser = parse_finite, default_value_t = 7.5)]
    pub cfg_scale: f64,

    #[command(flatten)]
    #[serde(flatten)]
    pub output: OutputArgs,

    /// Generate individual files (default)
    #[arg(short = 'i', long = "individual")]
    pub individual: bool,

    /// Path to input image for img2img mode (supersedes width and height)
    #[arg(short = 'I', long = "init_img", default_value = "")]
    pub init_img: String,

    /// Path to input mask for inpainting mode (supersedes width and height)
    #[arg(short = 'M', long = "init_mask", default_value = "")]
    pub init_mask: String,

    /// Resize the input image to fit within the dimensions of width x height
    #[arg(short = 'T', long = "fit")]
    pub fit: bool,

    /// Strength for noising/unnoising. 0.0 preserves image exactly, 1.0 replaces it completely
    #[arg(short = 'f', long = "strength", value_parser = parse_finite, default_value_t = 0.75)]
    pub strength: f64,

    /// Strength at which to apply the GFPGAN model to the result, in order to improve faces
    #[arg(short = 'G', long = "gfpgan_strength", value_parser = parse_finite, default_value_t = 0.0)]
    pub gfpgan_strength: f64,

    /// Scale factor (2, 4) for upscaling followed by upscaling strength (0-1.0, default 0.75)
    #[arg(
        short = 'U',
        long = "upscale",
        num_args = 1..,
        action = ArgAction::Set,
        value_parser = parse_finite
    )]
    pub upscale: Option<Vec<f64>>,

    /// Save original. Use it when upscaling to save both versions
    #[arg(long = "save_original")]
    pub save_original: bool,

    /// Embiggen tiled img2img: scale factor, ESRGAN strength (default 0.75), tile overlap (default 0.25)
    #[arg(long = "embiggen", num_args = 1.., action = ArgAction::Set, value_parser = parse_finite)]
    pub embiggen: Option<Vec<f64>>,

    /// Embiggen only these tiles, by number, e.g. `1 3 5`
    #[arg(long = "embiggen_tiles", num_args = 1.., action = ArgAction::Set)]
    pub embiggen_tiles: Option<Vec<u32>>,

    /// Skip subprompt weight normalization
    #[arg(short = 'x', long = "skip_normalize")]
    pub skip_normalize: bool,

    /// Switch to a different sampler
    #[arg(
        short = 'A',
        short_alias = 'm',
        long = "sampler",
        value_enum,
        value_name = "SAMPLER_NAME",
        default_value_t = Sampler::KLms
    )]
    pub sampler_name: Sampler,

    /// Show how the prompt is split into tokens
    #[arg(short = 't', long = "log_tokenization")]
    pub log_tokenization: bool,

    /// If > 0, generates variations on the initial seed instead of random seeds per iteration
    #[arg(short = 'v', long = "variation_amount", value_parser = parse_finite, default_value_t = 0.0)]
    pub variation_amount: f64,

    /// List of variations to apply, in the format `seed:weight,seed:weight,...`
    #[arg(
        short = 'V',
        long = "with_variations",
        value_delimiter = ',',
        action = ArgAction::Set,
        value_parser = parse_variation_pair
    )]
    pub with_variations: Vec<VariationPair>,

    /// Fields written through `Options::set` that the grammar does not declare.
    #[arg(skip)]
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl CommandArgs {
    /// Tokenize and parse one dream> command line.
    pub fn parse_line(line: &str) -> Result<Self, ArgsError> {
        let switches = split_command(line)?;
        Ok(Self::try_parse_from(switches)?)
    }

    pub fn upscale_params(&self) -> Option<UpscaleParams> {
        let (&scale, rest) = self.upscale.as_deref()?.split_first()?;
        Some(UpscaleParams {
            scale,
            strength: rest.first().copied().unwrap_or(DEFAULT_UPSCALE_STRENGTH),
        })
    }

    pub fn embiggen_params(&self) -> Option<EmbiggenParams> {
        let (&scale, rest) = self.embiggen.as_deref()?.split_first()?;
        Some(EmbiggenParams {
            scale,
            esrgan_strength: rest.first().copied().unwrap_or(DEFAULT_EMBIGGEN_STRENGTH),
            overlap: rest.get(1).copied().unwrap_or(DEFAULT_EMBIGGEN_OVERLAP),
        })
    }
}

/// Split a command line into `[prompt, switch, switch, ...]`.
///
/// Literal single quotes are escaped first so apostrophes in prompts
/// ("don't") never open a quoted section. `#` never starts a comment.
pub fn split_command(line: &str) -> Result<Vec<String>, ArgsError> {
    let escaped = escape_hashes(&line.replace('\'', "\\'"));
    let mut elements =
        shlex::split(&escaped).ok_or_else(|| ArgsError::Tokenize(line.to_string()))?;

    let first_switch = elements
        .iter()
        .position(|el| el.starts_with('-'))
        .unwrap_or(elements.len());
    let switches = elements.split_off(first_switch);

    let mut out = Vec::with_capacity(switches.len() + 1);
    out.push(elements.join(" "));
    out.extend(expand_legacy_aliases(switches, COMMAND_ALIASES));
    Ok(out)
}

// Backslash every '#' outside double quotes; inside them shlex already keeps
// it literal and would keep the backslash too.
fn escape_hashes(line: &str) -> String {
    let mut out = String::with_capacity(line.len());
    let mut in_double = false;
    let mut chars = line.chars();
    while let Some(ch) = chars.next() {
        match ch {
            '\\' => {
                out.push(ch);
                if let Some(next) = chars.next() {
                    out.push(next);
                }
            }
            '"' => {
                in_double = !in_double;
                out.push(ch);
            }
            '#' if !in_double => out.push_str("\\#"),
            _ => out.push(ch),
        }
    }
    out
}

/// Float switches must be finite: `inf` and `nan` have no JSON form.
pub fn parse_finite(s: &str) -> Result<f64, String> {
    let value = s
        .trim()
        .parse::<f64>()
        .map_err(|e| format!("invalid number '{}': {}", s, e))?;
    if value.is_finite() {
        Ok(value)
    } else {
        Err(format!("'{}' is not a finite number", s))
    }
}
