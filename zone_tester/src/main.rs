use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;
use zone_watch::{ConnectionState, RecordedEvent, SessionUpdate, ZoneSession};
use zone_watch_client::presentation::start_server;
use zone_watch_client::service::DEFAULT_VIDEO_STREAM_URL;
use zone_watch_client::{ClientConfig, ServiceClient, SessionRuntime, StreamChannel, ViewBus, ZoneSubmitter};

#[derive(Parser, Debug)]
#[command(name = "zone_tester", about = "Draw footfall zones over a live analysis stream")]
struct Cli {
    /// Analysis service base URL (overrides ZW_SERVICE_URL).
    #[arg(long, global = true, value_name = "URL")]
    service_url: Option<String>,
    /// Stream server URL (overrides ZW_STREAM_URL).
    #[arg(long, global = true, value_name = "URL")]
    stream_url: Option<String>,
    /// Address for the browser view (overrides ZW_BIND).
    #[arg(long, global = true, value_name = "ADDR")]
    bind: Option<String>,
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Ask the service to start processing a video, then watch it.
    Process {
        #[arg(long, default_value = DEFAULT_VIDEO_STREAM_URL)]
        video_stream_url: String,
    },
    /// Connect to the stream and serve the zone drawing view.
    Watch,
    /// Feed recorded stream events through a session and print the series.
    Replay {
        #[arg(long, value_name = "PATH")]
        input: PathBuf,
    },
}

fn init_logging() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let _ = tracing_subscriber::fmt().with_env_filter(filter).with_target(false).try_init();
}

#[tokio::main]
async fn main() -> Result<()> {
    init_logging();
    let cli = Cli::parse();

    match &cli.command {
        Command::Replay { input } => {
            let file = File::open(input).with_context(|| format!("opening {}", input.display()))?;
            let summary = replay(BufReader::new(file))?;
            tracing::info!(applied = summary.applied, skipped = summary.skipped, "Replay finished");
            println!("{}", serde_json::to_string_pretty(&summary.session.series())?);
            Ok(())
        }
        Command::Process { video_stream_url } => {
            let cfg = load_config(&cli)?;
            let service = ServiceClient::new(&cfg)?;
            let reply = service
                .start_processing(video_stream_url)
                .await
                .context("starting stream processing")?;
            tracing::info!("Processing started: {reply}");
            watch(cfg).await
        }
        Command::Watch => watch(load_config(&cli)?).await,
    }
}

/// Environment first, then command-line overrides.
fn load_config(cli: &Cli) -> Result<ClientConfig> {
    let cfg = ClientConfig::from_lookup(|key: &str| {
        let flag = match key {
            "ZW_SERVICE_URL" => cli.service_url.clone(),
            "ZW_STREAM_URL" => cli.stream_url.clone(),
            "ZW_BIND" => cli.bind.clone(),
            _ => None,
        };
        flag.or_else(|| std::env::var(key).ok())
    })?;
    Ok(cfg)
}

async fn watch(cfg: ClientConfig) -> Result<()> {
    let (mut channel, events) = StreamChannel::connect(&cfg.stream)
        .await
        .with_context(|| format!("connecting to {}", cfg.stream.url))?;

    let service = ServiceClient::new(&cfg)?;
    let bus = ViewBus::new(64);
    let mut runtime = SessionRuntime::spawn(
        ZoneSession::new(),
        events,
        ZoneSubmitter::new(service.clone()),
        service,
        bus.clone(),
    );
    let (addr, server) = start_server(bus, &cfg, runtime.commands()).await?;
    tracing::info!("Open http://{addr} to draw zones");

    let mut state = channel.subscribe_state();
    tokio::select! {
        signal = tokio::signal::ctrl_c() => signal?,
        lost = state.wait_for(|s| *s == ConnectionState::Disconnected) => {
            if lost.is_ok() {
                tracing::warn!("Stream lost; zones can still be drawn on the last frame");
            }
            tokio::signal::ctrl_c().await?;
        }
    }
    tracing::info!("Shutting down");

    if let Some(session) = runtime.shutdown().await {
        tracing::info!(zones = session.zones_committed(), "Session closed");
    }
    channel.close().await;
    server.abort();
    Ok(())
}

struct ReplaySummary {
    session: ZoneSession,
    applied: usize,
    skipped: usize,
}

fn replay<R: BufRead>(reader: R) -> Result<ReplaySummary> {
    let mut session = ZoneSession::new();
    let mut applied = 0;
    let mut skipped = 0;

    for (index, line) in reader.lines().enumerate() {
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }
        let recorded: RecordedEvent =
            serde_json::from_str(&line).with_context(|| format!("line {}: not a recorded event", index + 1))?;
        match recorded.into_stream_event() {
            Ok(Some(event)) => match session.handle_event(event) {
                SessionUpdate::Skipped(e) => {
                    tracing::warn!(line = index + 1, "Skipped event: {e}");
                    skipped += 1;
                }
                _ => applied += 1,
            },
            Ok(None) => skipped += 1,
            Err(e) => {
                tracing::warn!(line = index + 1, "Skipped event: {e}");
                skipped += 1;
            }
        }
    }
    Ok(ReplaySummary { session, applied, skipped })
}
