//! Voice chat application entry point.
//!
//! Wires configuration and CLI overrides into a running [`Session`] backed
//! by the real devices: CPAL capture and playback, ffmpeg transforms, and
//! the WebSocket transport.

use crate::archive::PcmArchive;
use crate::audio::sink::CpalAudioSink;
use crate::audio::source::CpalAudioSource;
use crate::cli::Cli;
use crate::config::Config;
use crate::endpoint::{Endpoint, GenerationParams};
use crate::error::{Result, VoxlinkError};
use crate::session::text::StdoutTextSink;
use crate::session::{Session, SessionParts};
use crate::transform::FfmpegTransform;
use std::path::PathBuf;

/// Fold CLI flags over the loaded configuration. CLI wins.
pub fn apply_cli_overrides(mut config: Config, cli: &Cli) -> Config {
    if let Some(id) = &cli.deployment_id {
        config.connection.deployment_id = Some(id.clone());
    }
    if let Some(region) = &cli.region {
        config.connection.region = region.clone();
    }
    if let Some(key) = &cli.api_key {
        config.connection.api_key = Some(key.clone());
    }
    if let Some(device) = &cli.device {
        config.audio.input_device = Some(device.clone());
    }
    if let Some(k) = cli.audio_topk {
        config.generation.audio_topk = k;
    }
    if let Some(t) = cli.audio_temperature {
        config.generation.audio_temperature = t;
    }
    if let Some(k) = cli.text_topk {
        config.generation.text_topk = k;
    }
    if let Some(t) = cli.text_temperature {
        config.generation.text_temperature = t;
    }
    config
}

/// Build the endpoint description from the merged configuration.
pub fn build_endpoint(config: &Config, insecure: bool) -> Result<Endpoint> {
    let deployment_id = config.connection.deployment_id.clone().ok_or_else(|| {
        VoxlinkError::ConfigInvalidValue {
            key: "connection.deployment_id".to_string(),
            message: "no deployment configured; pass --deployment-id or set VOXLINK_DEPLOYMENT_ID"
                .to_string(),
        }
    })?;
    let api_key =
        config
            .connection
            .api_key
            .clone()
            .ok_or_else(|| VoxlinkError::ConfigInvalidValue {
                key: "connection.api_key".to_string(),
                message: "no API key configured; pass --api-key or set VOXLINK_API_KEY".to_string(),
            })?;

    Ok(Endpoint {
        deployment_id,
        region: config.connection.region.clone(),
        api_key: Some(api_key),
        token: None,
        insecure,
        generation: GenerationParams {
            audio_topk: config.generation.audio_topk,
            audio_temperature: config.generation.audio_temperature,
            text_topk: config.generation.text_topk,
            text_temperature: config.generation.text_temperature,
            audio_seed: config.generation.audio_seed,
            text_seed: config.generation.text_seed,
            repetition_penalty: config.generation.repetition_penalty,
            repetition_penalty_context: config.generation.repetition_penalty_context,
            pad_mult: config.generation.pad_mult,
        },
    })
}

/// Run one conversation: connect, talk until Ctrl-C or the server hangs up.
pub async fn run_chat_command(
    config: Config,
    endpoint: Endpoint,
    save: Option<PathBuf>,
    quiet: bool,
) -> Result<()> {
    let parts = SessionParts {
        source: Box::new(CpalAudioSource::new(config.audio.input_device.as_deref())?),
        sink: Box::new(CpalAudioSink::new()?),
        encoder: Box::new(FfmpegTransform::opus_encoder()?),
        decoder: Box::new(FfmpegTransform::opus_decoder()?),
        text_sink: Box::new(StdoutTextSink),
        archive: save.map(PcmArchive::new),
    };

    if !quiet {
        eprintln!("Connecting to {}...", endpoint.host());
    }

    let mut handle = Session::new(parts).start(&endpoint).await?;

    if !quiet {
        eprintln!("Connected. Speak, or press Ctrl-C to hang up.");
    }

    tokio::select! {
        _ = tokio::signal::ctrl_c() => {
            if !quiet {
                eprintln!("\nHanging up...");
            }
            handle.stop().await;
        }
        _ = handle.closed() => {
            if !quiet {
                eprintln!("\nSession ended.");
            }
            handle.stop().await;
        }
    }

    Ok(())
}
