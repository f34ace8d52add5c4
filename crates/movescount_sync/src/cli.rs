//! CLI argument parsing using clap derive

use clap::Parser;

/// Fetch moves from movescount.com
#[derive(Parser, Debug, Default, PartialEq, Eq)]
#[command(name = "movescount-sync")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Verbose debugging output, including every HTTP request
    #[arg(long)]
    pub debug: bool,

    /// Recursive mode: fetch entire event stream instead of stopping at first page
    #[arg(long)]
    pub recursive: bool,

    /// Setup movescount-sync configuration options
    #[arg(long)]
    pub configure: bool,
}
