use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(
    name = "sitesnap",
    about = "Capture a web page and its same-host assets, with download statistics",
    version,
    long_about = "Fetches a single page plus the stylesheets, scripts, and images it references on the same host, mirrors them into a local directory tree, and records per-resource timing and size statistics for later reporting."
)]
pub struct Cli {
    /// Path to the history database (defaults to the XDG state directory)
    #[arg(long, global = true)]
    pub db: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Capture a page and its same-host resources
    Download {
        /// The page URL (scheme optional; https is assumed)
        url: String,

        /// Directory the captured files are written into
        #[arg(short, long, default_value = "./capture")]
        output_dir: PathBuf,

        /// Suppress per-resource progress output
        #[arg(short, long)]
        quiet: bool,
    },

    /// List past capture sessions, most recent first
    History {
        /// Emit JSON instead of a table
        #[arg(long)]
        json: bool,
    },

    /// Show one session and its resource records
    Report {
        /// Session id, or site name (most recent session wins)
        target: String,

        /// Emit JSON instead of a table
        #[arg(long)]
        json: bool,
    },
}
