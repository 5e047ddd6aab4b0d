use clap::Parser;
use log::warn;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

pub const DEFAULT_OUTDIR: &str = "outputs/img-samples";

/// Single-dash long spellings accepted on the shell command line.
pub const STARTUP_ALIASES: &[(&str, &str)] = &[("-conf", "--conf")];

const LONG_ABOUT: &str = "Generate images using Stable Diffusion.
Use --web to launch the web interface.
Use --from_file to load prompts from a file path or standard input (\"-\").
Otherwise you will be dropped into an interactive command prompt (type -h for help.)
Other command-line arguments are defaults that can usually be overridden
at the command prompt.";

/// Output flags understood by both the shell command line and the dream> prompt.
#[derive(clap::Args, Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OutputArgs {
    /// Directory to save generated images and a log of prompts and seeds
    #[arg(short = 'o', long = "outdir", default_value = DEFAULT_OUTDIR)]
    pub outdir: String,

    /// Change the model to seamless tiling (circular) mode
    #[arg(long = "seamless")]
    pub seamless: bool,

    /// Generate a grid
    #[arg(short = 'g', long = "grid")]
    pub grid: bool,
}

impl Default for OutputArgs {
    fn default() -> Self {
        Self {
            outdir: DEFAULT_OUTDIR.to_string(),
            seamless: false,
            grid: false,
        }
    }
}

#[derive(Parser, Debug, Clone, PartialEq, Serialize, Deserialize)]
#[command(name = "dream")]
#[command(
    version,
    about = "Generate images using Stable Diffusion",
    long_about = LONG_ABOUT
)]
pub struct StartupArgs {
    #[arg(long = "laion400m", hide = true)]
    pub laion400m: Option<String>,

    #[arg(long = "weights", hide = true)]
    pub weights: Option<String>,

    /// Path to configuration file for alternate models
    #[arg(short = 'c', long = "conf", default_value = "./configs/models.yaml")]
    pub conf: PathBuf,

    /// Indicates which diffusion model to load
    #[arg(long = "model", default_value = "stable-diffusion-1.4")]
    pub model: String,

    /// If specified, load prompts from this file ("-" reads standard input)
    #[arg(long = "from_file")]
    pub infile: Option<PathBuf>,

    /// Use more memory-intensive full precision math for calculations
    #[arg(short = 'F', long = "full_precision")]
    pub full_precision: bool,

    #[command(flatten)]
    #[serde(flatten)]
    pub output: OutputArgs,

    /// Path to a pre-trained embedding manager checkpoint - can only be set on command line
    #[arg(long = "embedding_path")]
    pub embedding_path: Option<PathBuf>,

    /// Place images in subdirectories named after the prompt
    #[arg(short = 'p', long = "prompt_as_dir")]
    pub prompt_as_dir: bool,

    /// Background upsampler. Options: realesrgan, none
    #[arg(long = "gfpgan_bg_upsampler", default_value = "realesrgan")]
    pub gfpgan_bg_upsampler: String,

    /// Tile size for background sampler, 0 for no tile during testing
    #[arg(long = "gfpgan_bg_tile", default_value_t = 400)]
    pub gfpgan_bg_tile: u32,

    /// Path to the GFPGAN model, relative to --gfpgan_dir
    #[arg(
        long = "gfpgan_model_path",
        default_value = "experiments/pretrained_models/GFPGANv1.3.pth"
    )]
    pub gfpgan_model_path: String,

    /// Directory containing the GFPGAN code
    #[arg(long = "gfpgan_dir", default_value = "./src/gfpgan")]
    pub gfpgan_dir: String,

    /// Start in web server mode
    #[arg(long = "web")]
    pub web: bool,

    /// Web server: Host or IP to listen on. Set to 0.0.0.0 to accept traffic from other devices on your network
    #[arg(long = "host", default_value = "127.0.0.1")]
    pub host: String,

    /// Web server: Port to listen on
    #[arg(long = "port", default_value_t = 9090)]
    pub port: u16,
}

impl StartupArgs {
    /// Parse the given shell arguments (binary name first), exiting with a
    /// usage message on failure.
    pub fn parse_shell<I, S>(itr: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let args = Self::parse_from(expand_legacy_aliases(itr, STARTUP_ALIASES));
        args.warn_deprecated();
        args
    }

    /// Fallible counterpart of [`StartupArgs::parse_shell`].
    pub fn try_parse_shell<I, S>(itr: I) -> Result<Self, clap::Error>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let args = Self::try_parse_from(expand_legacy_aliases(itr, STARTUP_ALIASES))?;
        args.warn_deprecated();
        Ok(args)
    }

    fn warn_deprecated(&self) {
        if self.laion400m.is_some() {
            warn!("--laion400m is deprecated; use --model laion400m instead");
        }
        if self.weights.is_some() {
            warn!("--weights is deprecated; weights are now read from --conf");
        }
    }
}

/// Rewrite single-dash long spellings (e.g. `-conf`) into the `--long` form
/// clap understands. Only whole tokens are rewritten.
pub fn expand_legacy_aliases<I, S>(tokens: I, aliases: &[(&str, &str)]) -> Vec<String>
where
    I: IntoIterator<Item = S>,
    S: Into<String>,
{
    tokens
        .into_iter()
        .map(|token| {
            let token = token.into();
            aliases
                .iter()
                .find(|(legacy, _)| *legacy == token)
                .map(|(_, long)| long.to_string())
                .unwrap_or(token)
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_startup_defaults() {
        let args = StartupArgs::try_parse_shell(["dream"]).unwrap();
        assert_eq!(args.conf, PathBuf::from("./configs/models.yaml"));
        assert_eq!(args.model, "stable-diffusion-1.4");
        assert!(args.infile.is_none());
        assert!(!args.full_precision);
        assert_eq!(args.output, OutputArgs::default());
        assert_eq!(args.gfpgan_bg_upsampler, "realesrgan");
        assert_eq!(args.gfpgan_bg_tile, 400);
        assert_eq!(args.gfpgan_dir, "./src/gfpgan");
        assert!(!args.web);
        assert_eq!(args.host, "127.0.0.1");
        assert_eq!(args.port, 9090);
    }

    #[test]
    fn test_startup_short_flags() {
        let args =
            StartupArgs::try_parse_shell(["dream", "-F", "-g", "-p", "-o", "/tmp/out", "-c", "m.yaml"])
                .unwrap();
        assert!(args.full_precision);
        assert!(args.output.grid);
        assert!(args.prompt_as_dir);
        assert_eq!(args.output.outdir, "/tmp/out");
        assert_eq!(args.conf, PathBuf::from("m.yaml"));
    }

    #[test]
    fn test_startup_long_flags() {
        let args = StartupArgs::try_parse_shell([
            "dream",
            "--from_file",
            "-",
            "--seamless",
            "--web",
            "--host",
            "0.0.0.0",
            "--port",
            "8080",
            "--gfpgan_bg_tile",
            "0",
        ])
        .unwrap();
        assert_eq!(args.infile, Some(PathBuf::from("-")));
        assert!(args.output.seamless);
        assert!(args.web);
        assert_eq!(args.host, "0.0.0.0");
        assert_eq!(args.port, 8080);
        assert_eq!(args.gfpgan_bg_tile, 0);
    }

    #[test]
    fn test_startup_legacy_conf_alias() {
        let args = StartupArgs::try_parse_shell(["dream", "-conf", "alt.yaml"]).unwrap();
        assert_eq!(args.conf, PathBuf::from("alt.yaml"));
    }

    #[test]
    fn test_startup_invalid_port_is_rejected() {
        assert!(StartupArgs::try_parse_shell(["dream", "--port", "not-a-port"]).is_err());
        assert!(StartupArgs::try_parse_shell(["dream", "--port", "70000"]).is_err());
    }

    #[test]
    fn test_startup_deprecated_flags_accepted() {
        let args = StartupArgs::try_parse_shell(["dream", "--weights", "old.ckpt"]).unwrap();
        assert_eq!(args.weights.as_deref(), Some("old.ckpt"));
    }

    #[test]
    fn test_expand_legacy_aliases_whole_tokens_only() {
        let aliases = &[("-fit", "--fit")];
        let out = expand_legacy_aliases(["-fit", "-fitness", "fit"], aliases);
        assert_eq!(out, vec!["--fit", "-fitness", "fit"]);
    }
}
