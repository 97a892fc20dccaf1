//! Command-line interface.

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand, ValueEnum};

#[derive(Parser, Debug)]
#[command(
    name = "reelsmith",
    version,
    about = "Generate scene images for every base that is ready for them"
)]
pub struct Cli {
    /// Status document path (overrides REELSMITH_MANIFEST).
    #[arg(long, global = true, value_name = "FILE")]
    pub manifest: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Acquire images for selected bases.
    Run(RunArgs),
    /// Print every base with its stage statuses.
    Status,
    /// Remove a finished base's images, suggestions and status record.
    Clean(CleanArgs),
}

#[derive(Args, Debug, Clone, Default)]
pub struct RunArgs {
    /// Base to process; repeat for several. Prompts when omitted.
    #[arg(long = "base", value_name = "NAME", conflicts_with = "all")]
    pub bases: Vec<String>,

    /// Process every candidate base.
    #[arg(long)]
    pub all: bool,

    /// Profiles to use, comma separated. Prompts when omitted.
    #[arg(long, value_delimiter = ',', value_name = "NAMES")]
    pub profiles: Vec<String>,

    /// Concurrent workers per profile (1-4).
    #[arg(long, value_name = "N")]
    pub workers: Option<usize>,

    /// Output variants kept per scene (1-4).
    #[arg(long, value_name = "N")]
    pub variants: Option<usize>,

    /// How retry rounds are approved.
    #[arg(long, value_enum, default_value = "ask")]
    pub retry: RetryMode,

    /// With `--retry always`, stop after this many retry rounds.
    #[arg(long, value_name = "N")]
    pub max_rounds: Option<u32>,

    /// Style pattern file prepended to every prompt.
    #[arg(long, value_name = "FILE", conflicts_with = "no_pattern")]
    pub pattern: Option<PathBuf>,

    /// Submit scene prompts without a style pattern.
    #[arg(long)]
    pub no_pattern: bool,
}

#[derive(Args, Debug, Clone)]
pub struct CleanArgs {
    /// Base to remove.
    pub base: String,

    /// Remove even when the video stage is not done.
    #[arg(long)]
    pub force: bool,
}

#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, ValueEnum)]
pub enum RetryMode {
    /// Ask on the terminal for each profile with failures.
    #[default]
    Ask,
    /// Retry without asking.
    Always,
    /// Never retry.
    Never,
}
