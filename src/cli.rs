//! Command-line interface for voxlink
//!
//! Provides argument parsing using clap derive macros.

use clap::Parser;
use std::path::PathBuf;

/// Live voice chat from the terminal
#[derive(Parser, Debug)]
#[command(name = "voxlink", version, about = "Live voice chat from the terminal")]
pub struct Cli {
    /// Path to configuration file
    #[arg(long, global = true, value_name = "PATH")]
    pub config: Option<PathBuf>,

    /// Suppress output (quiet mode)
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Verbose output (-v: session events, -vv: full diagnostics)
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    pub verbose: u8,

    /// Deployment to connect to
    #[arg(long, value_name = "ID")]
    pub deployment_id: Option<String>,

    /// Deployment region (default: fr-par)
    #[arg(long, value_name = "REGION")]
    pub region: Option<String>,

    /// API key for the deployment (also read from VOXLINK_API_KEY)
    #[arg(long, value_name = "KEY")]
    pub api_key: Option<String>,

    /// Audio input device (e.g., hw:0)
    #[arg(long, value_name = "DEVICE")]
    pub device: Option<String>,

    /// Save received audio to a WAV file when the session ends
    #[arg(long, value_name = "PATH")]
    pub save: Option<PathBuf>,

    /// Accept invalid TLS certificates (development servers only)
    #[arg(long)]
    pub insecure: bool,

    /// Audio sampling top-k
    #[arg(long, value_name = "K")]
    pub audio_topk: Option<u32>,

    /// Audio sampling temperature
    #[arg(long, value_name = "TEMP")]
    pub audio_temperature: Option<f32>,

    /// Text sampling top-k
    #[arg(long, value_name = "K")]
    pub text_topk: Option<u32>,

    /// Text sampling temperature
    #[arg(long, value_name = "TEMP")]
    pub text_temperature: Option<f32>,
}
