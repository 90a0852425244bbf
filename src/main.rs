use anyhow::Result;
use clap::Parser;
use tracing_subscriber::EnvFilter;
use voxlink::app::{apply_cli_overrides, build_endpoint, run_chat_command};
use voxlink::cli::Cli;
use voxlink::config::Config;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    init_tracing(cli.verbose);

    let config = load_config(cli.config.as_deref())?;
    let config = apply_cli_overrides(config, &cli);
    let endpoint = build_endpoint(&config, cli.insecure)?;
    run_chat_command(config, endpoint, cli.save.clone(), cli.quiet).await?;

    Ok(())
}

/// Default verbosity shows warnings and errors; -v adds session events,
/// -vv full diagnostics. RUST_LOG overrides everything.
fn init_tracing(verbosity: u8) {
    let default_level = match verbosity {
        0 => "voxlink=warn",
        1 => "voxlink=info",
        _ => "voxlink=debug",
    };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

/// Load configuration from file or use defaults.
///
/// Priority order:
/// 1. Custom config path from CLI (--config)
/// 2. Default config path (~/.config/voxlink/config.toml)
/// 3. Built-in defaults with environment variable overrides
fn load_config(custom_path: Option<&std::path::Path>) -> Result<Config> {
    let config = if let Some(path) = custom_path {
        Config::load(path)?
    } else if let Some(default_path) = Config::default_path() {
        Config::load_or_default(&default_path)?
    } else {
        Config::default()
    };

    Ok(config.with_env_overrides())
}
