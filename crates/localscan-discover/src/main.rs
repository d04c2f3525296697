//! CLI entry point for the localscan host scanner.

use std::fs::File;
use std::io::{self, BufWriter, Write};
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use indicatif::{ProgressBar, ProgressStyle};
use tokio::sync::mpsc;
use tracing_subscriber::{fmt, EnvFilter};

use localscan_core::{ProgressTracker, ScanEvent};
use localscan_history::{default_history_path, HistoryStore, JsonHistoryStore};

use localscan_discover::arp::SystemNeighbors;
use localscan_discover::config::{load_discover_config, OutputFormat};
use localscan_discover::enrich::SystemResolver;
use localscan_discover::network::{detect_interface, NetworkDescriptor};
use localscan_discover::pipeline::{run_scan, ScanPlan};
use localscan_discover::probe::{ProbeCascade, SystemTransport};
use localscan_discover::render;
use localscan_discover::scanner::HostScanner;

#[derive(Parser)]
#[command(name = "localscan")]
#[command(about = "Discover devices on the local IPv4 network")]
struct Cli {
    /// Network interface to scan from (auto-detected when omitted).
    #[arg(short, long)]
    interface: Option<String>,

    /// Scan this CIDR instead of the interface's network, e.g. 192.168.1.0/24.
    #[arg(short, long)]
    target: Option<String>,

    /// Per-probe timeout in milliseconds.
    #[arg(long)]
    timeout: Option<u64>,

    /// Number of concurrent workers.
    #[arg(long)]
    workers: Option<usize>,

    /// Output format: table, json, csv.
    #[arg(long)]
    format: Option<OutputFormat>,

    /// Write results to this file instead of stdout.
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Compare with the previous scan and mark NEW / GONE hosts.
    #[arg(long)]
    diff: bool,

    /// Config file prefix (default: localscan).
    #[arg(short, long, default_value = "localscan")]
    config: String,

    /// Emit logs as JSON lines.
    #[arg(long)]
    json_logs: bool,

    /// Do not draw the progress bar.
    #[arg(long)]
    no_progress: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_logging(cli.json_logs);

    let mut config = load_discover_config(&cli.config)?;
    if let Some(timeout) = cli.timeout {
        config.timeout_ms = timeout;
    }
    if let Some(workers) = cli.workers {
        config.workers = workers;
    }
    let format = cli.format.unwrap_or(config.format);

    let network = match cli.target.as_deref() {
        Some(target) => target.parse::<NetworkDescriptor>()?,
        None => {
            let iface = detect_interface(cli.interface.as_deref())?;
            tracing::info!(interface = %iface.name, address = %iface.address, "Using interface");
            iface.network
        }
    };
    let plan = ScanPlan::new(&network, config.max_hosts)?;

    // Open the destination before scanning so a bad path fails fast.
    let mut out: Box<dyn Write> = match &cli.output {
        Some(path) => Box::new(BufWriter::new(File::create(path).with_context(|| {
            format!("cannot create output file {}", path.display())
        })?)),
        None => Box::new(io::stdout().lock()),
    };

    let history = cli.diff.then(|| {
        JsonHistoryStore::new(
            config
                .history_path
                .clone()
                .unwrap_or_else(default_history_path),
        )
    });

    eprintln!("Scanning {} ({} hosts)...", plan.target, plan.len());

    let scanner = HostScanner::new(
        ProbeCascade::new(SystemTransport, config.timeout()),
        config.workers,
    );
    let (tx, rx) = mpsc::channel(config.workers.max(1));
    let display = tokio::spawn(display_progress(rx, plan.len() as u64, !cli.no_progress));

    let report = run_scan(
        &scanner,
        &SystemNeighbors,
        Arc::new(SystemResolver),
        history.as_ref().map(|h| h as &dyn HistoryStore),
        plan,
        tx,
    )
    .await;

    if let Err(e) = display.await {
        tracing::error!(error = %e, "Progress display task panicked");
    }

    tracing::info!(
        scan_id = %report.scan_id,
        started_at = %report.started_at,
        target = %report.target,
        discovered = report.results.len(),
        duration_ms = report.duration.as_millis(),
        "Scan finished"
    );

    render::render(format, &report.results, report.duration, &mut out)?;
    out.flush()?;

    Ok(())
}

fn init_logging(json: bool) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let builder = fmt().with_env_filter(filter).with_writer(io::stderr);
    if json {
        builder.json().init();
    } else {
        builder.init();
    }
}

fn progress_bar(total: u64, visible: bool) -> ProgressBar {
    if !visible {
        return ProgressBar::hidden();
    }
    let bar = ProgressBar::new(total);
    bar.set_style(
        ProgressStyle::with_template("[{bar:40}] {pos}/{len} {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_bar())
            .progress_chars("=> "),
    );
    bar
}

/// Draw progress from scan events until the scanner closes the channel.
async fn display_progress(mut events: mpsc::Receiver<ScanEvent>, total: u64, visible: bool) {
    let bar = progress_bar(total, visible);
    let mut tracker = ProgressTracker::new();

    while let Some(event) = events.recv().await {
        match event {
            ScanEvent::Probed(progress) => {
                if let Some(found) = &progress.found {
                    announce(&bar, format!("[+] Found: {} [{}]", found.address, found.method));
                }
                bar.set_position(tracker.observe(&progress) as u64);
                bar.set_message(format!("scanning {}", progress.address));
            }
            ScanEvent::Recovered(found) => {
                announce(&bar, format!("[+] Found: {} [{}]", found.address, found.method));
            }
            ScanEvent::Finished { discovered, .. } => {
                bar.finish_with_message(format!("Complete, {discovered} devices"));
            }
        }
    }
}

fn announce(bar: &ProgressBar, line: String) {
    if bar.is_hidden() {
        eprintln!("{line}");
    } else {
        bar.println(line);
    }
}
