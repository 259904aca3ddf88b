use clap::Parser;

use crate::io::DEFAULT_BLOCK_SIZE;
use crate::release::DEFAULT_API_URL;

#[derive(Parser, Debug)]
#[command(name = "relunzip")]
#[command(version)]
#[command(about = "Fetch a GitHub release asset and extract it using HTTP Range requests", long_about = None)]
#[command(after_help = "Examples:\n  \
  relunzip                                   install the nightly Neovim build into ~/path\n  \
  relunzip --tag v0.10.0 --path ~/opt/nvim   install a tagged release elsewhere\n  \
  relunzip --owner me --repo tool --release tool-linux.zip --staged")]
pub struct Cli {
    /// Repository's owner
    #[arg(long, default_value = "neovim")]
    pub owner: String,

    /// Repository's name
    #[arg(long, default_value = "neovim")]
    pub repo: String,

    /// Release tag to look for
    #[arg(long, default_value = "nightly")]
    pub tag: String,

    /// Release asset to fetch (default: the archive for this platform)
    #[arg(long, value_name = "ASSET")]
    pub release: Option<String>,

    /// Path to install to; a leading `~` is the home directory
    #[arg(long, value_name = "DIR", default_value = "~/path")]
    pub path: String,

    /// Base URL of the GitHub REST API
    #[arg(long, value_name = "URL", default_value = DEFAULT_API_URL)]
    pub api_url: String,

    /// API token, raises the anonymous rate limit
    #[arg(long, env = "GITHUB_TOKEN", hide_env_values = true)]
    pub token: Option<String>,

    /// Bytes fetched per Range request
    #[arg(long, value_name = "BYTES", default_value_t = DEFAULT_BLOCK_SIZE)]
    pub block_size: usize,

    /// Per-request timeout in seconds
    #[arg(long, value_name = "SECS", default_value_t = 30)]
    pub timeout: u64,

    /// Extract into a temporary sibling and swap it in only on success
    #[arg(long)]
    pub staged: bool,

    /// More log output (-vv => debug)
    #[arg(short = 'v', action = clap::ArgAction::Count)]
    pub verbose: u8,

    /// Quiet mode
    #[arg(short = 'q', action = clap::ArgAction::Count)]
    pub quiet: u8,
}

impl Cli {
    pub fn is_quiet(&self) -> bool {
        self.quiet > 0
    }

    /// Default `tracing` level when `RUST_LOG` is unset
    pub fn log_level(&self) -> &'static str {
        match (self.quiet, self.verbose) {
            (q, _) if q > 0 => "error",
            (_, 0) => "warn",
            (_, 1) => "info",
            _ => "debug",
        }
    }
}
