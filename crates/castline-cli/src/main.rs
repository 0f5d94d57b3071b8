//! Castline CLI - broadcaster and diagnostics tool
//!
//! Features:
//! - Start and end live broadcasts over the realtime socket
//! - Read the authoritative view count for a video
//! - Preview the quality menu of an HLS master playlist

use clap::{Args, Parser, Subcommand};
use tracing_subscriber::EnvFilter;

mod commands;
mod output;

use output::OutputFormat;

/// Castline CLI - live streaming toolkit
#[derive(Parser)]
#[command(name = "castline")]
#[command(author = "Castline Developers")]
#[command(version)]
#[command(about = "Live control, view counts, and quality ladder inspection", long_about = None)]
struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Emit logs as JSON lines
    #[arg(long, global = true)]
    json_logs: bool,

    /// Output format
    #[arg(short, long, value_enum, default_value = "text", global = true)]
    format: OutputFormat,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start or end a broadcast
    Live {
        #[command(subcommand)]
        action: LiveAction,
    },

    /// Print the server's view count for a video
    Views {
        /// Numeric video id
        video_id: u64,

        /// Seconds to wait for the server's answer
        #[arg(short, long, default_value = "10")]
        timeout_secs: u64,
    },

    /// Show the quality levels of a master playlist
    Ladder {
        /// URL or path to the master playlist
        source: String,
    },
}

#[derive(Subcommand)]
pub enum LiveAction {
    /// Ask the server to start a broadcast
    Start(LiveArgs),
    /// Ask the server to end a broadcast
    End(LiveArgs),
}

#[derive(Args)]
pub struct LiveArgs {
    /// Stream identifier
    #[arg(long)]
    pub stream_id: String,

    /// Broadcast title
    #[arg(long)]
    pub title: String,

    /// Broadcast description
    #[arg(long, default_value = "")]
    pub description: String,

    /// Playback URL (defaults to CASTLINE_STREAM_URL_PREFIX/<stream-id>.m3u8)
    #[arg(long)]
    pub stream_url: Option<String>,

    /// Thumbnail image URL
    #[arg(long)]
    pub thumbnail_url: Option<String>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Initialize tracing; RUST_LOG wins over --verbose
    let level = if cli.verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    let subscriber = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr);
    if cli.json_logs {
        subscriber.json().init();
    } else {
        subscriber.init();
    }

    castline_core::init();

    match cli.command {
        Commands::Live { action } => {
            commands::live(action, cli.format).await?;
        }
        Commands::Views { video_id, timeout_secs } => {
            commands::views(video_id, timeout_secs, cli.format).await?;
        }
        Commands::Ladder { source } => {
            commands::ladder(&source, cli.format).await?;
        }
    }

    Ok(())
}
