//! Command-line interface definitions.
//!
//! Defines the argument parser and subcommands using clap's derive API.
//! `pin` and `update` share their flags through [`RunArgs`]; `scan` works
//! offline, and `clear` and `rate-limit` manage the client side.

use clap::{Args as ClapArgs, Parser, Subcommand};
use std::path::PathBuf;

/// Pin GitHub Actions workflow references to immutable commit SHAs.
#[derive(Debug, Parser)]
#[command(author, version, about)]
pub struct Args {
    /// Increase log verbosity (-v debug, -vv trace).
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    pub verbose: u8,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Replace tag and branch refs with the commit SHA they point at.
    Pin(RunArgs),

    /// Move every reference to the SHA of its latest release or tag.
    Update(RunArgs),

    /// List every `uses:` reference and whether it is pinned. No network access.
    Scan {
        /// Workflow files or directories. Defaults to `.github/workflows`.
        paths: Vec<PathBuf>,

        /// Glob patterns for workflow file names to skip (e.g., "release-*.yml").
        #[arg(short, long)]
        exclude: Vec<String>,

        /// Emit JSON instead of human-readable output.
        #[arg(long)]
        json: bool,
    },

    /// Delete the local response cache.
    Clear {
        /// Skip the confirmation prompt.
        #[arg(short, long)]
        force: bool,
    },

    /// Show the current GitHub API rate limit.
    RateLimit {
        #[command(flatten)]
        client: ClientArgs,
    },
}

/// Flags shared by `pin` and `update`.
#[derive(Debug, ClapArgs)]
pub struct RunArgs {
    /// Workflow files or directories. Defaults to `.github/workflows`.
    pub paths: Vec<PathBuf>,

    /// Glob patterns for workflow file names to skip (e.g., "release-*.yml").
    #[arg(short, long)]
    pub exclude: Vec<String>,

    /// Report planned edits without writing files.
    #[arg(short = 'n', long)]
    pub dry_run: bool,

    /// Emit a JSON summary instead of human-readable output.
    #[arg(long)]
    pub json: bool,

    /// Spaces between the SHA and the `#` ref comment.
    #[arg(long, default_value_t = 1)]
    pub comment_spaces: usize,

    #[command(flatten)]
    pub client: ClientArgs,
}

/// GitHub client settings.
#[derive(Debug, ClapArgs)]
pub struct ClientArgs {
    /// API token. Without one, GitHub allows 60 requests per hour.
    #[arg(long, env = "GITHUB_TOKEN", hide_env_values = true)]
    pub token: Option<String>,

    /// API base URL, for GitHub Enterprise Server.
    #[arg(long, env = "GITHUB_API_URL", default_value = actlock::github::DEFAULT_API_URL)]
    pub api_url: String,

    /// Per-request timeout in seconds.
    #[arg(long, default_value_t = 30)]
    pub timeout: u64,

    /// Bypass the response cache.
    #[arg(long)]
    pub no_cache: bool,
}
