//! Drowsiness Monitor - Main Entry Point

use std::fs::File;
use std::io::{self, BufRead, BufReader, Write};
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use api::{
    build_sink, init_logging, install_metrics, replay, run_server, AppState, ReplayOptions, Settings,
};
use clap::{Args, Parser, Subcommand};
use dms::{DrowsinessMonitor, SessionRecord};
use frame_queue::BackpressurePolicy;
use storage::Repository;
use tracing::{info, warn};

#[derive(Parser)]
#[command(name = "drowsiness-monitor")]
#[command(version, about = "Eye-aspect-ratio drowsiness monitor", long_about = None)]
struct Cli {
    /// Settings file (TOML, JSON or YAML)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Log filter, e.g. `info` or `dms=debug`
    #[arg(long, global = true, default_value = "info")]
    log_level: String,

    /// Log as JSON lines
    #[arg(long, global = true)]
    json_logs: bool,

    /// Session log file
    #[arg(long, global = true)]
    session_log: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Monitor a stream of landmark frames (JSON lines)
    Run(RunArgs),

    /// Show stored sessions
    History {
        /// Number of sessions to list
        #[arg(long, default_value = "10")]
        limit: usize,

        /// Print records as JSON instead of a table
        #[arg(long)]
        json: bool,
    },

    /// Serve the session log over HTTP
    Serve {
        /// Listen address
        #[arg(long)]
        addr: Option<String>,
    },
}

#[derive(Args)]
struct RunArgs {
    /// Frame input file, `-` or absent for stdin
    input: Option<PathBuf>,

    #[arg(long)]
    ear_threshold: Option<f64>,

    #[arg(long)]
    consecutive_frames: Option<u32>,

    #[arg(long)]
    sink_timeout_ms: Option<u64>,

    /// Stop after this many seconds
    #[arg(long)]
    auto_stop: Option<u64>,

    /// Stop after this many frames
    #[arg(long)]
    max_frames: Option<u64>,

    /// Alarm command started on alert and stopped when it clears
    #[arg(long)]
    alert_command: Option<String>,

    /// Ring the terminal bell on alert
    #[arg(long)]
    bell: bool,

    #[arg(long)]
    queue_capacity: Option<usize>,

    /// `block-producer` or `drop-oldest`
    #[arg(long)]
    backpressure: Option<BackpressurePolicy>,

    /// Print every frame report as a JSON line
    #[arg(long)]
    emit_frames: bool,

    /// Do not append the session to the log
    #[arg(long)]
    no_save: bool,

    /// Serve `/metrics` and the session API here while monitoring
    #[arg(long)]
    metrics_addr: Option<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(&cli.log_level, cli.json_logs);

    let mut settings = Settings::load(cli.config.as_deref()).context("Failed to load settings")?;
    if let Some(path) = cli.session_log {
        settings.storage.log_path = path;
    }

    match cli.command {
        Commands::Run(args) => cmd_run(settings, args).await,
        Commands::History { limit, json } => cmd_history(&settings, limit, json),
        Commands::Serve { addr } => cmd_serve(settings, addr).await,
    }
}

async fn cmd_run(mut settings: Settings, args: RunArgs) -> Result<()> {
    if let Some(t) = args.ear_threshold {
        settings.dms.ear_threshold = t;
    }
    if let Some(n) = args.consecutive_frames {
        settings.dms.consecutive_frames = n;
    }
    if let Some(ms) = args.sink_timeout_ms {
        settings.dms.alert_sink_timeout_ms = ms;
    }
    if let Some(capacity) = args.queue_capacity {
        settings.queue.capacity = capacity;
    }
    if let Some(policy) = args.backpressure {
        settings.queue.policy = policy;
    }
    if let Some(command) = &args.alert_command {
        settings.alert.command = command.split_whitespace().map(str::to_string).collect();
    }
    settings.alert.bell |= args.bell;
    if let Some(addr) = &args.metrics_addr {
        settings.server.metrics_addr = Some(addr.clone());
    }
    settings.validate().context("Invalid monitor configuration")?;

    info!(
        "=== Drowsiness Monitor v{} === threshold={} frames={}",
        env!("CARGO_PKG_VERSION"),
        settings.dms.ear_threshold,
        settings.dms.consecutive_frames
    );

    let input: Box<dyn BufRead + Send> = match &args.input {
        Some(path) if path.as_os_str() != "-" => Box::new(BufReader::new(
            File::open(path).with_context(|| format!("Failed to open {}", path.display()))?,
        )),
        _ => Box::new(BufReader::new(io::stdin())),
    };

    let repository = Arc::new(Repository::open(&settings.storage.log_path)?);
    let metrics = install_metrics().context("Failed to install metrics recorder")?;
    if let Some(addr) = settings.server.metrics_addr.clone() {
        let state = AppState::new(repository.clone()).with_metrics(metrics);
        tokio::spawn(async move {
            if let Err(e) = run_server(&addr, state).await {
                warn!("Metrics endpoint on {} failed: {}", addr, e);
            }
        });
    }

    let sink = build_sink(&settings.alert, &settings.dms).context("Failed to start alert sink")?;
    let monitor = DrowsinessMonitor::new(settings.dms.clone(), sink)?;
    let options = ReplayOptions {
        max_frames: args.max_frames,
        auto_stop: args.auto_stop.map(Duration::from_secs),
    };

    let stop = Arc::new(AtomicBool::new(false));
    {
        let stop = stop.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                info!("Interrupted, stopping at the next frame boundary");
                stop.store(true, Ordering::SeqCst);
            }
        });
    }

    let queue = settings.queue.clone();
    let emit_frames = args.emit_frames;
    let summary = tokio::task::spawn_blocking(move || {
        let mut stdout = io::stdout();
        replay(input, monitor, &queue, &options, stop, |report| {
            if emit_frames {
                if let Ok(line) = serde_json::to_string(report) {
                    let _ = writeln!(stdout, "{}", line);
                }
            }
        })
    })
    .await
    .context("Monitor task failed")??;

    if summary.malformed_lines > 0 {
        warn!("{} malformed input lines skipped", summary.malformed_lines);
    }
    if summary.dropped_frames > 0 {
        warn!("{} frames dropped by backpressure", summary.dropped_frames);
    }
    print_session(&summary.record);

    if !args.no_save {
        repository.insert_session(summary.record)?;
        info!("Session appended to {}", settings.storage.log_path.display());
    }
    Ok(())
}

fn cmd_history(settings: &Settings, limit: usize, json: bool) -> Result<()> {
    let repository = Repository::open(&settings.storage.log_path)?;
    let sessions = repository.get_sessions(limit)?;
    let summary = repository.summary()?;

    if json {
        println!(
            "{}",
            serde_json::to_string_pretty(&serde_json::json!({
                "sessions": sessions,
                "summary": summary,
            }))?
        );
        return Ok(());
    }

    if sessions.is_empty() {
        println!("No sessions recorded in {}", settings.storage.log_path.display());
        return Ok(());
    }

    println!(
        "{:<36}  {:<20}  {:>8}  {:>7}  {:>7}  {:>6}",
        "SESSION", "STARTED", "DURATION", "FRAMES", "DROWSY", "EVENTS"
    );
    for s in &sessions {
        println!(
            "{:<36}  {:<20}  {:>7}s  {:>7}  {:>6.1}%  {:>6}",
            s.session_id,
            s.start_time.format("%Y-%m-%d %H:%M:%S"),
            s.duration().num_seconds(),
            s.total_frames,
            s.drowsiness_percentage(),
            s.events.len()
        );
    }

    println!();
    println!(
        "{} sessions, {} frames, {} alert events, {:.1}% drowsy, mean EAR {}",
        summary.sessions,
        summary.total_frames,
        summary.events,
        summary.drowsiness_percentage,
        summary
            .mean_score
            .map(|m| format!("{:.3}", m))
            .unwrap_or_else(|| "n/a".to_string())
    );
    Ok(())
}

async fn cmd_serve(settings: Settings, addr: Option<String>) -> Result<()> {
    let handle = install_metrics().context("Failed to install metrics recorder")?;
    let repository = Arc::new(Repository::open(&settings.storage.log_path)?);

    let addr = addr.unwrap_or(settings.server.addr);
    let state = AppState::new(repository).with_metrics(handle);
    run_server(&addr, state).await?;
    Ok(())
}

fn print_session(record: &SessionRecord) {
    println!("Session {}", record.session_id);
    println!("  duration:      {}s", record.duration().num_seconds());
    println!(
        "  frames:        {} ({} drowsy, {} no face)",
        record.total_frames, record.drowsy_frames, record.no_face_frames
    );
    println!("  drowsiness:    {:.1}%", record.drowsiness_percentage());
    match record.mean_score {
        Some(mean) => println!("  mean EAR:      {:.3}", mean),
        None => println!("  mean EAR:      n/a"),
    }
    println!("  alert events:  {}", record.events.len());
    for (i, event) in record.events.iter().enumerate() {
        println!(
            "    #{} frames {}-{} ({} ms)",
            i + 1,
            event.start_frame_index,
            event
                .end_frame_index
                .map(|f| f.to_string())
                .unwrap_or_else(|| "?".to_string()),
            event.duration_ms().unwrap_or(0)
        );
    }
}
