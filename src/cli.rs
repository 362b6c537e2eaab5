use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "cowatch")]
#[command(author, version, about = "Client-side playback synchronization for shared viewing rooms")]
pub struct Cli {
    /// Path to config file
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Replay a scripted timeline against the headless engine
    Simulate {
        /// Script file (JSON)
        #[arg(required = true)]
        script: PathBuf,

        /// Output the report as JSON
        #[arg(long)]
        json: bool,
    },

    /// Show how a source URL would be loaded
    Resolve {
        /// Requested source URL
        #[arg(required = true)]
        url: String,

        /// Force proxying on regardless of config
        #[arg(long)]
        proxy: bool,

        /// Look up sidecar subtitles over the network
        #[arg(long)]
        subtitles: bool,
    },

    /// Validate configuration file
    Validate {
        /// Config file to validate (uses default if not specified)
        config: Option<PathBuf>,
    },

    /// Write a config file with every default filled in
    InitConfig {
        /// Destination path
        #[arg(default_value = "cowatch.toml")]
        path: PathBuf,

        /// Overwrite an existing file
        #[arg(long)]
        force: bool,
    },

    /// Display version information
    Version,
}
