//! # meshtap
//!
//! Binary entry point. `serve` pushes decoded packets to WebSocket
//! subscribers; `monitor` prints the same records as JSON lines on stdout.

#![deny(unsafe_code)]

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use meshtap_core::{SourceMode, SourceSpec};
use meshtap_logging::LogFormat;
use meshtap_server::{IngestEnd, Ingestor, JsonLinesSink, MeshtapServer, ServerConfig};
use meshtap_settings::MeshtapSettings;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

/// Real-time tap for mesh radio packets.
#[derive(Parser, Debug)]
#[command(name = "meshtap", version, about = "Real-time tap for mesh radio packets")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Serve decoded records to WebSocket subscribers on `/ws`.
    Serve(ServeArgs),
    /// Print decoded records to stdout, one JSON document per line.
    Monitor(CommonArgs),
}

#[derive(Args, Debug)]
struct ServeArgs {
    /// Host to bind.
    #[arg(long)]
    host: Option<String>,

    /// Port to bind (0 for auto-assign).
    #[arg(long)]
    port: Option<u16>,

    #[command(flatten)]
    common: CommonArgs,
}

#[derive(Args, Debug)]
struct CommonArgs {
    /// Packet source: `stdin`, `file:PATH` or `tcp:HOST:PORT`.
    #[arg(long)]
    source: Option<SourceSpec>,

    /// How source frames are interpreted: `node` or `companion`.
    #[arg(long)]
    mode: Option<SourceMode>,

    /// Settings file (defaults to `~/.meshtap/settings.json`).
    #[arg(long)]
    settings: Option<PathBuf>,

    /// Log filter used when `RUST_LOG` is unset.
    #[arg(long)]
    log_level: Option<String>,

    /// Log as JSON instead of compact text.
    #[arg(long)]
    json_logs: bool,
}

/// Load settings from file and environment, then apply flags on top.
fn resolve_settings<F>(common: &CommonArgs, lookup: F) -> Result<MeshtapSettings>
where
    F: Fn(&str) -> Option<String>,
{
    let path = common
        .settings
        .clone()
        .unwrap_or_else(meshtap_settings::settings_path);
    let mut settings = meshtap_settings::load_with_env(&path, lookup)
        .with_context(|| format!("failed to load settings from {}", path.display()))?;

    if let Some(spec) = &common.source {
        settings.source.spec = spec.to_string();
    }
    if let Some(mode) = common.mode {
        settings.source.mode = mode;
    }
    if let Some(level) = &common.log_level {
        settings.logging.level.clone_from(level);
    }
    if common.json_logs {
        settings.logging.format = LogFormat::Json;
    }
    Ok(settings)
}

fn apply_serve_flags(settings: &mut MeshtapSettings, args: &ServeArgs) {
    if let Some(host) = &args.host {
        settings.server.host.clone_from(host);
    }
    if let Some(port) = args.port {
        settings.server.port = port;
    }
}

/// Map how ingestion ended to the process result.
fn finish(end: IngestEnd) -> Result<()> {
    match end {
        IngestEnd::Exhausted | IngestEnd::Cancelled => Ok(()),
        IngestEnd::SourceFailed(e) => Err(e).context("packet source failed mid-run"),
        IngestEnd::SinkFailed(e) => Err(e).context("record output failed"),
    }
}

/// Cancel `token` on Ctrl-C.
fn cancel_on_ctrl_c(token: CancellationToken) {
    let _watcher = tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => {
                info!("shutdown signal received");
                token.cancel();
            }
            Err(e) => warn!(error = %e, "failed to listen for ctrl-c"),
        }
    });
}

async fn serve(args: ServeArgs) -> Result<()> {
    let mut settings = resolve_settings(&args.common, |key| std::env::var(key).ok())?;
    apply_serve_flags(&mut settings, &args);
    meshtap_logging::init(&settings.logging.level, settings.logging.format);

    let spec = settings.source.parsed_spec()?;
    let mode = settings.source.mode;
    let source = meshtap_core::source::open(&spec, mode)
        .await
        .with_context(|| format!("failed to open packet source {spec}"))?;

    let metrics = meshtap_server::metrics::install_recorder()?;
    let server = Arc::new(MeshtapServer::new(
        ServerConfig::from(&settings.server),
        metrics,
    ));
    let (addr, http) = server.listen().await?;
    info!(%addr, source = %spec, %mode, "meshtap serving subscribers on /ws");

    cancel_on_ctrl_c(server.shutdown().token());
    let report = server.run(source, http).await;
    finish(report.end)
}

async fn monitor(args: CommonArgs) -> Result<()> {
    let settings = resolve_settings(&args, |key| std::env::var(key).ok())?;
    meshtap_logging::init(&settings.logging.level, settings.logging.format);

    let spec = settings.source.parsed_spec()?;
    let mode = settings.source.mode;
    let mut source = meshtap_core::source::open(&spec, mode)
        .await
        .with_context(|| format!("failed to open packet source {spec}"))?;
    info!(source = %spec, %mode, "monitoring packets");

    let cancel = CancellationToken::new();
    cancel_on_ctrl_c(cancel.clone());

    let sink = JsonLinesSink::new(std::io::stdout());
    let report = Ingestor::run(source.as_mut(), &sink, &cancel).await;
    if let Err(e) = source.close().await {
        warn!(error = %e, "failed to close packet source");
    }
    finish(report.end)
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    match cli.command {
        Command::Serve(args) => serve(args).await,
        Command::Monitor(args) => monitor(args).await,
    }
}
