use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// Command-line arguments for lyricsync
#[derive(Parser, Debug)]
#[command(name = "lyricsync")]
#[command(about = "Follow a playing track and print its lyrics line by line")]
#[command(version)]
pub struct Cli {
    /// Config file to use instead of ~/.config/lyricsync/config.toml
    #[arg(short, long, global = true, env = "LYRICSYNC_CONFIG")]
    pub config: Option<PathBuf>,

    /// Override `sync.timing_offset_ms`
    #[arg(long, global = true, allow_hyphen_values = true)]
    pub offset_ms: Option<i64>,

    /// Print events as JSON lines instead of plain text
    #[arg(long, global = true)]
    pub json: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Read presence updates from stdin, one JSON value per line
    /// (`null` or a Lanyard `spotify` object)
    Watch,

    /// Simulate a track that starts playing now
    Play {
        #[arg(long)]
        artist: String,

        #[arg(long)]
        song: String,

        #[arg(long, default_value = "")]
        album: String,

        /// Track length in seconds
        #[arg(long)]
        duration_secs: u64,
    },
}
