//! specdash - live system telemetry dashboard
//!
//! Serves local telemetry over HTTP, or follows a local/remote source in the
//! terminal with background refresh, pause/resume and manual refresh.

use anyhow::{bail, Context};
use chrono::{DateTime, Local, Utc};
use clap::{Args, Parser, Subcommand};
use specdash::{
    start_web_server, ErrorInfo, HttpSource, Renderer, Snapshot, SyncConfig, SyncController,
    SyncHandle, SyncState, SystemCollector, TelemetrySource, WebConfig, DEFAULT_FETCH_TIMEOUT_MS,
    DEFAULT_INTERVAL_MS, DEFAULT_WEB_PORT,
};
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::{info, Level};
use tracing_subscriber::{EnvFilter, FmtSubscriber};

const GB: f64 = 1024.0 * 1024.0 * 1024.0;

#[derive(Parser)]
#[command(name = "specdash")]
#[command(about = "Live system telemetry dashboard")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(long_about = "Loads a full system snapshot once, then keeps CPU load, temperature and memory fresh by polling")]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Enable debug logging
    #[arg(short, long, global = true)]
    debug: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Follow telemetry in the terminal (default)
    Watch(WatchArgs),

    /// Serve local telemetry at /api/specs and /api/specs/dynamic
    Serve(ServeArgs),

    /// Print a single full snapshot and exit
    Snapshot(SnapshotArgs),
}

#[derive(Args)]
struct SourceArgs {
    /// Base URL of a remote telemetry server; reads this machine when omitted
    #[arg(long)]
    source_url: Option<String>,

    /// Per-fetch timeout in milliseconds
    #[arg(long, default_value_t = DEFAULT_FETCH_TIMEOUT_MS)]
    timeout_ms: u64,
}

#[derive(Args)]
struct WatchArgs {
    #[command(flatten)]
    source: SourceArgs,

    /// Background refresh interval in milliseconds
    #[arg(short, long, default_value_t = DEFAULT_INTERVAL_MS)]
    interval_ms: u64,
}

#[derive(Args)]
struct ServeArgs {
    /// Bind address
    #[arg(long, default_value = "0.0.0.0")]
    host: String,

    /// Port
    #[arg(short, long, default_value_t = DEFAULT_WEB_PORT)]
    port: u16,

    /// Disable CORS headers
    #[arg(long)]
    no_cors: bool,
}

#[derive(Args)]
struct SnapshotArgs {
    #[command(flatten)]
    source: SourceArgs,

    /// Output format: json or pretty
    #[arg(short, long, default_value = "pretty")]
    format: String,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_logging(&cli)?;

    match cli.command {
        Some(Commands::Watch(args)) => watch_command(args).await,
        Some(Commands::Serve(args)) => serve_command(args).await,
        Some(Commands::Snapshot(args)) => snapshot_command(args).await,
        None => {
            let args = WatchArgs {
                source: SourceArgs {
                    source_url: None,
                    timeout_ms: DEFAULT_FETCH_TIMEOUT_MS,
                },
                interval_ms: DEFAULT_INTERVAL_MS,
            };
            watch_command(args).await
        }
    }
}

fn init_logging(cli: &Cli) -> anyhow::Result<()> {
    let level = if cli.debug {
        Level::DEBUG
    } else if cli.verbose {
        Level::INFO
    } else {
        Level::WARN
    };

    // RUST_LOG wins over the flags when set
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(level.as_str().to_lowercase()));

    let subscriber = FmtSubscriber::builder()
        .with_env_filter(filter)
        .with_target(false)
        .compact()
        .finish();

    tracing::subscriber::set_global_default(subscriber)?;

    Ok(())
}

fn build_source(args: &SourceArgs) -> anyhow::Result<Arc<dyn TelemetrySource>> {
    match &args.source_url {
        Some(url) => {
            let source = HttpSource::new(url.as_str(), Duration::from_millis(args.timeout_ms))?;
            info!("Reading telemetry from {}", source.base_url());
            Ok(Arc::new(source))
        }
        None => {
            let collector = SystemCollector::new().context("Failed to initialize collector")?;
            info!("Reading telemetry from this machine");
            Ok(Arc::new(collector))
        }
    }
}

async fn serve_command(args: ServeArgs) -> anyhow::Result<()> {
    let source: Arc<dyn TelemetrySource> = Arc::new(SystemCollector::new()?);
    let config = WebConfig::new(&args.host, args.port).with_cors(!args.no_cors);

    info!("Telemetry server configuration:");
    info!("  - Bind address: {}", config.bind_address());
    info!("  - CORS enabled: {}", config.enable_cors);

    start_web_server(config, source).await?;
    Ok(())
}

async fn snapshot_command(args: SnapshotArgs) -> anyhow::Result<()> {
    let source = build_source(&args.source)?;
    let snapshot = source.full_snapshot().await?;

    match args.format.as_str() {
        "json" => println!("{}", serde_json::to_string_pretty(&snapshot)?),
        "pretty" => print_pretty_snapshot(&snapshot, Utc::now()),
        other => bail!("Unsupported format: {}. Use 'json' or 'pretty'", other),
    }
    Ok(())
}

async fn watch_command(args: WatchArgs) -> anyhow::Result<()> {
    let source = build_source(&args.source)?;
    let config = SyncConfig::new(Duration::from_millis(args.interval_ms))
        .with_fetch_timeout(Duration::from_millis(args.source.timeout_ms));

    let handle = SyncController::spawn(source, Box::new(ConsoleRenderer::default()), config.clone())?;
    handle.start().await?;

    println!("Commands: [p]ause  [r]esume  [f] refresh  [s]tatus  [q]uit");

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut freshness = tokio::time::interval(config.interval);
    let mut reported_stale = false;
    let mut stdin_open = true;

    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => break,
            _ = freshness.tick() => {
                let stale = handle.status().is_stale(Utc::now());
                if stale && !reported_stale {
                    println!("⚠️  Data is stale (no successful refresh in {:?})", config.stale_after());
                }
                reported_stale = stale;
            }
            line = lines.next_line(), if stdin_open => match line? {
                Some(line) => {
                    if !handle_intent(&handle, line.trim()).await {
                        break;
                    }
                }
                // Keep following until Ctrl+C when stdin is closed
                None => stdin_open = false,
            },
        }
    }

    handle.stop().await?;
    Ok(())
}

/// Returns false when the user asked to quit.
async fn handle_intent(handle: &SyncHandle, input: &str) -> bool {
    let result = match input {
        "p" | "pause" => handle.pause().await,
        "r" | "resume" => handle.resume().await,
        "f" | "refresh" => handle.manual_refresh().await,
        "s" | "status" => {
            print_status(handle);
            Ok(())
        }
        "q" | "quit" => return false,
        "" => Ok(()),
        other => {
            println!("Unknown command: {}", other);
            Ok(())
        }
    };
    if let Err(err) = result {
        println!("❌ {}", err);
    }
    true
}

fn print_status(handle: &SyncHandle) {
    let status = handle.status();
    println!("State: {:?}{}", status.state, if status.paused { " (paused)" } else { "" });
    if let Some(at) = status.last_updated {
        println!("  Last updated: {}", local_time(at));
    }
    println!("  Consecutive poll failures: {}", status.consecutive_failures);
    if status.is_stale(Utc::now()) {
        println!("  ⚠️  Stale");
    }
    if let Some(err) = &status.last_error {
        println!("  Last error ({:?}): {}", err.fetch, err.message);
    }
}

/// Prints every change to stdout.
#[derive(Default)]
struct ConsoleRenderer {
    printed_inventory: bool,
}

impl Renderer for ConsoleRenderer {
    fn on_snapshot_changed(&mut self, snapshot: &Snapshot, last_updated: DateTime<Utc>) {
        if !self.printed_inventory {
            print_pretty_snapshot(snapshot, last_updated);
            self.printed_inventory = true;
            return;
        }

        let temperature = snapshot
            .cpu
            .temperature
            .map(|t| format!("{:.1}°C", t))
            .unwrap_or_else(|| "n/a".to_string());
        println!(
            "[{}] CPU {:5.1}% {} | Memory {:.1}/{:.1} GB",
            local_time(last_updated),
            snapshot.cpu.current_load,
            temperature,
            snapshot.memory.used as f64 / GB,
            snapshot.memory.total as f64 / GB,
        );
    }

    fn on_error(&mut self, error: &ErrorInfo) {
        println!("❌ Error loading system information ({:?}): {}", error.kind, error.message);
        println!("   Type 'f' to retry");
    }

    fn on_state_changed(&mut self, state: SyncState, paused: bool) {
        match (state, paused) {
            (SyncState::Loading, _) => {
                self.printed_inventory = false;
                println!("🔄 Loading system information...");
            }
            (SyncState::Ready, true) => println!("⏸️  Updates paused"),
            (SyncState::Ready, false) => println!("▶️  Live updates active"),
            _ => {}
        }
    }
}

fn local_time(at: DateTime<Utc>) -> String {
    at.with_timezone(&Local).format("%H:%M:%S").to_string()
}

fn print_pretty_snapshot(snapshot: &Snapshot, at: DateTime<Utc>) {
    println!("🖥️  System Snapshot ({})", at.format("%Y-%m-%d %H:%M:%S UTC"));
    println!("==========================================");
    println!();

    println!("⚡ CPU:");
    println!("  Model: {} {}", snapshot.cpu.manufacturer, snapshot.cpu.brand);
    println!(
        "  Cores: {} ({} physical)",
        snapshot.cpu.cores, snapshot.cpu.physical_cores
    );
    println!("  Speed: {:.2} GHz", snapshot.cpu.speed);
    println!("  Load: {:.1}%", snapshot.cpu.current_load);
    if let Some(temperature) = snapshot.cpu.temperature {
        println!("  Temperature: {:.1}°C", temperature);
    }
    println!();

    println!("🧠 Memory:");
    println!("  Total: {:.1} GB", snapshot.memory.total as f64 / GB);
    println!("  Used: {:.1} GB", snapshot.memory.used as f64 / GB);
    println!("  Free: {:.1} GB", snapshot.memory.free as f64 / GB);
    println!();

    if !snapshot.graphics.controllers.is_empty() {
        println!("🎮 Graphics:");
        for controller in &snapshot.graphics.controllers {
            println!(
                "  {} {} ({} MB VRAM)",
                controller.vendor, controller.model, controller.vram
            );
        }
        println!();
    }

    if !snapshot.storage.is_empty() {
        println!("💾 Storage:");
        for device in snapshot.storage.iter() {
            println!(
                "  {} [{}]: {:.1} GB",
                device.name,
                device.kind,
                device.size as f64 / GB
            );
        }
        println!();
    }

    println!("🐧 System:");
    println!("  Hostname: {}", snapshot.os.hostname);
    println!("  OS: {} ({})", snapshot.os.distro, snapshot.os.platform);
    println!("  Release: {}", snapshot.os.release);
    println!("  Kernel: {} ({})", snapshot.os.kernel, snapshot.os.arch);
    println!();
}
