//! piradio - Main entry point
//!
//! Plays one internet radio stream until interrupted.

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use piradio_ap::audio::{CpalSink, TsSegmentDecoder};
use piradio_ap::http::HttpClient;
use piradio_ap::scheduler::SegmentScheduler;
use piradio_ap::scratch::ScratchArea;
use piradio_ap::session::{LiveSession, SessionConfig};
use piradio_common::logging::init_logging;
use piradio_common::TomlConfig;
use tokio::signal;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

/// Command-line arguments for piradio
#[derive(Parser, Debug)]
#[command(name = "piradio")]
#[command(about = "Play a live internet radio stream (HLS, M3U or MP3)")]
#[command(version)]
struct Args {
    /// Root stream URL
    url: String,

    /// Configuration file (default: <config dir>/piradio/config.toml)
    #[arg(short, long, env = "PIRADIO_CONFIG")]
    config: Option<PathBuf>,

    /// Seconds to wait between polls that found no new segments
    #[arg(long)]
    poll_interval: Option<u64>,

    /// User-Agent header sent with every request
    #[arg(long)]
    user_agent: Option<String>,

    /// Audio output device name
    #[arg(short, long)]
    device: Option<String>,

    /// Log level or filter directive (overridden by RUST_LOG)
    #[arg(long)]
    log_level: Option<String>,
}

impl Args {
    /// Command-line values win over the file
    fn apply(&self, config: &mut TomlConfig) {
        if let Some(secs) = self.poll_interval {
            config.player.poll_interval_secs = secs.max(1);
        }
        if let Some(agent) = &self.user_agent {
            config.player.user_agent = agent.clone();
        }
        if let Some(device) = &self.device {
            config.player.output_device = Some(device.clone());
        }
        if let Some(level) = &self.log_level {
            config.logging.level = level.clone();
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let loaded =
        TomlConfig::load(args.config.as_deref()).context("Failed to load configuration")?;
    let mut config = loaded.config.clone();
    args.apply(&mut config);
    init_logging(&config.logging).context("Failed to initialize logging")?;
    loaded.log_source();

    let url = url::Url::parse(&args.url)
        .with_context(|| format!("Invalid stream URL '{}'", args.url))?;
    info!("Starting piradio for {}", url);

    let fetcher = HttpClient::from_config(&config.player).context("Failed to build HTTP client")?;
    let sink = CpalSink::new(
        config.player.output_device.as_deref(),
        config.player.sink_buffer_secs,
    )
    .context("Failed to open audio output")?;
    let scratch = ScratchArea::from_config(&config.player);
    scratch
        .prepare()
        .context("Failed to prepare scratch directory")?;
    let scheduler = SegmentScheduler::new(TsSegmentDecoder::new(), sink, scratch);

    let cancel = CancellationToken::new();
    let signal_cancel = cancel.clone();
    tokio::spawn(async move {
        shutdown_signal().await;
        signal_cancel.cancel();
    });

    // cpal streams are not Send, so the session runs on this task
    let mut session = LiveSession::new(
        url.as_str(),
        fetcher,
        scheduler,
        SessionConfig::from(&config.player),
        cancel,
    );
    let outcome = session.run().await.context("Playback failed")?;

    info!("piradio stopped ({:?})", outcome);
    Ok(())
}

/// Resolves on Ctrl+C or SIGTERM
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!("Failed to listen for Ctrl+C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(e) => {
                error!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C, shutting down");
        },
        _ = terminate => {
            info!("Received terminate signal, shutting down");
        },
    }
}
