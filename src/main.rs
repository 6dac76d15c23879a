//! Falcon Agent - live hardware inventory and CPU/memory history for one machine.
//!
//! A background sampler records CPU and memory utilization into bounded
//! histories; the dashboard, chart renderer and CSV/JSON exporter read
//! consistent snapshots of them at any time.

mod config;
mod display;
mod export;
mod history;
mod inventory;
mod logging;
mod metrics;
mod plot;
mod sampler;

use anyhow::{Context, Result};
use clap::Parser;
use config::Settings;
use crossterm::{
    event::{self, Event, KeyCode, KeyEventKind, KeyModifiers},
    execute,
    terminal::{disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen},
};
use export::ExportFormat;
use history::SystemMetrics;
use inventory::MachineInfo;
use ratatui::{
    layout::{Constraint, Direction, Layout},
    prelude::CrosstermBackend,
    style::Color,
    Terminal,
};
use sampler::{ProcSource, Sampler};
use std::io;
use std::path::{Path, PathBuf};
use std::sync::mpsc;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

/// Live hardware inventory and CPU/memory usage history
#[derive(Parser, Debug)]
#[command(name = "falcon-agent")]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Sampling interval in seconds
    #[arg(short = 'i', long, default_value = "5")]
    interval: f64,

    /// Number of samples kept per metric
    #[arg(short = 'c', long, default_value = "60")]
    capacity: usize,

    /// Directory that receives metric exports
    #[arg(long, default_value = "data")]
    data_dir: PathBuf,

    /// Directory for rotated log files
    #[arg(long, default_value = "logs")]
    log_dir: PathBuf,

    /// Log level (trace, debug, info, warn, error); FALCON_LOG overrides
    #[arg(long, default_value = "info")]
    log_level: String,

    /// Number of rotated log files to keep
    #[arg(long, default_value = "5")]
    log_files: usize,

    /// Format for periodic and on-exit exports (csv or json)
    #[arg(short = 'f', long, default_value = "csv")]
    export_format: ExportFormat,

    /// Export the histories every N seconds
    #[arg(long)]
    export_interval: Option<f64>,

    /// Export the histories once more on shutdown
    #[arg(long)]
    export_on_exit: bool,

    /// Output directory for generated charts
    #[arg(long, default_value = "charts")]
    chart_dir: PathBuf,

    /// Run for specified duration (seconds), then exit
    #[arg(short, long)]
    duration: Option<u64>,

    /// Disable TUI and print samples to stdout
    #[arg(long)]
    no_tui: bool,

    /// Print the hardware inventory as JSON and exit
    #[arg(long)]
    inventory_json: bool,
}

/// Dashboard state
struct App {
    metrics: Arc<SystemMetrics>,
    settings: Settings,
    inventory: MachineInfo,
    show_inventory: bool,
    status_message: Option<(String, Instant)>,
    // Outcomes of background exports/charts, shown as status messages
    job_tx: mpsc::Sender<String>,
    job_rx: mpsc::Receiver<String>,
}

impl App {
    fn new(metrics: Arc<SystemMetrics>, settings: Settings, inventory: MachineInfo) -> Self {
        let (job_tx, job_rx) = mpsc::channel();
        Self {
            metrics,
            settings,
            inventory,
            show_inventory: true,
            status_message: None,
            job_tx,
            job_rx,
        }
    }

    /// Export off the render thread; the result arrives through `job_rx`
    fn spawn_export(&self, format: ExportFormat) {
        let metrics = Arc::clone(&self.metrics);
        let dir = self.settings.data_dir.clone();
        let tx = self.job_tx.clone();
        tokio::task::spawn_blocking(move || {
            let msg = match export::export(&metrics, format, &dir) {
                Ok(path) => format!("Exported {}", path.display()),
                Err(e) => {
                    error!(error = %e, "Export failed");
                    format!("Export failed: {}", e)
                }
            };
            let _ = tx.send(msg);
        });
    }

    fn spawn_charts(&self) {
        let snapshot = self.metrics.snapshot();
        let dir = self.settings.chart_dir.clone();
        let tx = self.job_tx.clone();
        tokio::task::spawn_blocking(move || {
            let msg = match plot::render_charts(&snapshot, &dir) {
                Ok(paths) if paths.is_empty() => "No samples to chart yet".to_string(),
                Ok(paths) => format!("Wrote {} chart(s) to {}", paths.len(), dir.display()),
                Err(e) => {
                    error!(error = %e, "Chart rendering failed");
                    format!("Charts failed: {}", e)
                }
            };
            let _ = tx.send(msg);
        });
    }

    /// Pick up finished background jobs
    fn poll_jobs(&mut self) {
        while let Ok(msg) = self.job_rx.try_recv() {
            self.set_status(&msg);
        }
    }

    /// Set a temporary status message
    fn set_status(&mut self, msg: &str) {
        self.status_message = Some((msg.to_string(), Instant::now()));
    }

    /// Get current status message if not expired (3 seconds)
    fn get_status(&self) -> Option<&str> {
        self.status_message.as_ref().and_then(|(msg, time)| {
            if time.elapsed().as_secs() < 3 {
                Some(msg.as_str())
            } else {
                None
            }
        })
    }

    fn print_inventory(&self) {
        let info = &self.inventory;
        println!("=== Falcon Agent - {} ({}) ===", info.hostname, info.os);
        println!(
            "CPU: {} | {} cores / {} threads @ {:.2} GHz",
            info.cpu.model,
            info.cpu.cores,
            info.cpu.threads,
            info.cpu.frequency_mhz / 1000.0
        );
        println!("Memory: {}", display::format_megabytes(info.memory_total_bytes));
        println!(
            "BIOS: {} {} ({})",
            info.bios.vendor, info.bios.version, info.bios.release_date
        );
        for module in &info.memory_modules {
            println!(
                "DIMM: {} {} {} (S/N {})",
                module.slot,
                display::format_megabytes(module.size_bytes),
                module.vendor,
                module.serial
            );
        }
        for disk in &info.disks {
            println!(
                "Disk: {} on {} ({}) {}",
                disk.name,
                disk.mount_point.display(),
                disk.file_system,
                display::format_bytes(disk.size_bytes)
            );
        }
        for dev in &info.usb {
            println!("USB: {} {} {} (S/N {})", dev.id, dev.vendor, dev.product, dev.serial);
        }
        println!();
    }

    fn print_latest(&self) {
        match (self.metrics.cpu_usage.latest(), self.metrics.memory_usage.latest()) {
            (Some(cpu), Some(mem)) => println!(
                "{}  CPU: {:>6.2}%  Memory: {:>6.2}%  ({} samples)",
                cpu.timestamp.with_timezone(&chrono::Local).format("%H:%M:%S"),
                cpu.value,
                mem.value,
                self.metrics.cpu_usage.len()
            ),
            _ => println!("Waiting for first sample..."),
        }
    }
}

fn run_tui(mut app: App) -> Result<()> {
    enable_raw_mode()?;
    let mut stdout = io::stdout();
    execute!(stdout, EnterAlternateScreen)?;
    let backend = CrosstermBackend::new(stdout);
    let mut terminal = Terminal::new(backend)?;

    let result = tui_loop(&mut terminal, &mut app);

    // Restore terminal even if the loop failed
    disable_raw_mode()?;
    execute!(terminal.backend_mut(), LeaveAlternateScreen)?;
    terminal.show_cursor()?;

    result
}

fn tui_loop(terminal: &mut Terminal<CrosstermBackend<io::Stdout>>, app: &mut App) -> Result<()> {
    // Redraw faster than the sampling interval so new points show up promptly
    let refresh = app.settings.interval.min(Duration::from_millis(500));
    let start_time = Instant::now();

    loop {
        if let Some(dur) = app.settings.duration {
            if start_time.elapsed() >= dur {
                return Ok(());
            }
        }

        app.poll_jobs();
        let cpu = app.metrics.cpu_usage.snapshot();
        let memory = app.metrics.memory_usage.snapshot();

        terminal.draw(|f| {
            let main_chunks = Layout::default()
                .direction(Direction::Vertical)
                .constraints([
                    Constraint::Min(8),    // CPU + Memory
                    Constraint::Length(if app.show_inventory { 10 } else { 0 }),
                    Constraint::Length(1), // Help bar
                ])
                .split(f.area());

            let top = Layout::default()
                .direction(Direction::Horizontal)
                .constraints([Constraint::Percentage(50), Constraint::Percentage(50)])
                .split(main_chunks[0]);

            display::render_usage(f, top[0], "CPU", Color::Cyan, &cpu);
            display::render_usage(f, top[1], "Memory", Color::Magenta, &memory);

            if app.show_inventory {
                display::render_inventory(f, main_chunks[1], &app.inventory);
            }
            display::render_help_bar(f, main_chunks[2], app.get_status());
        })?;

        if event::poll(refresh)? {
            if let Event::Key(key) = event::read()? {
                if key.kind != KeyEventKind::Press {
                    continue;
                }
                if key.modifiers.contains(KeyModifiers::CONTROL) && key.code == KeyCode::Char('c') {
                    return Ok(());
                }
                match key.code {
                    KeyCode::Char('q') => return Ok(()),
                    KeyCode::Char('c') => {
                        app.set_status("Exporting CSV...");
                        app.spawn_export(ExportFormat::Csv);
                    }
                    KeyCode::Char('j') => {
                        app.set_status("Exporting JSON...");
                        app.spawn_export(ExportFormat::Json);
                    }
                    KeyCode::Char('g') => {
                        app.set_status("Rendering charts...");
                        app.spawn_charts();
                    }
                    KeyCode::Char('i') => app.show_inventory = !app.show_inventory,
                    _ => {}
                }
            }
        }
    }
}

async fn run_no_tui(app: App) -> Result<()> {
    app.print_inventory();

    let interval = app.settings.interval;
    // Trail the sampler slightly so each line shows the tick just recorded
    let mut ticker = tokio::time::interval_at(
        tokio::time::Instant::now() + Duration::from_millis(100),
        interval,
    );
    let duration = app.settings.duration;
    let deadline = async move {
        match duration {
            Some(dur) => tokio::time::sleep(dur).await,
            None => std::future::pending::<()>().await,
        }
    };
    tokio::pin!(deadline);

    loop {
        tokio::select! {
            _ = ticker.tick() => app.print_latest(),
            _ = &mut deadline => break,
            res = tokio::signal::ctrl_c() => {
                res.context("Failed to listen for Ctrl-C")?;
                break;
            }
        }
    }
    Ok(())
}

/// Export every `every` until shutdown
async fn periodic_export(
    metrics: Arc<SystemMetrics>,
    format: ExportFormat,
    dir: PathBuf,
    every: Duration,
    mut shutdown: watch::Receiver<bool>,
) {
    let mut ticker = tokio::time::interval_at(tokio::time::Instant::now() + every, every);
    loop {
        tokio::select! {
            _ = ticker.tick() => {
                if let Err(e) = export_blocking(Arc::clone(&metrics), format, dir.clone()).await {
                    warn!(error = %e, "Periodic export failed");
                }
            }
            changed = shutdown.changed() => {
                if changed.is_err() || *shutdown.borrow() {
                    break;
                }
            }
        }
    }
}

async fn export_blocking(metrics: Arc<SystemMetrics>, format: ExportFormat, dir: PathBuf) -> Result<PathBuf> {
    let path = tokio::task::spawn_blocking(move || export::export(&metrics, format, &dir))
        .await
        .context("Export task panicked")??;
    Ok(path)
}

async fn join_task<T>(name: &str, task: JoinHandle<T>) -> Option<T> {
    match task.await {
        Ok(value) => Some(value),
        Err(e) => {
            error!(task = name, error = %e, "Background task failed");
            None
        }
    }
}

fn log_startup(settings: &Settings, log_dir: &Path) {
    info!(
        data_dir = %settings.data_dir.display(),
        chart_dir = %settings.chart_dir.display(),
        log_dir = %log_dir.display(),
        interval_secs = settings.interval.as_secs_f64(),
        capacity = settings.capacity,
        "Starting Falcon Agent"
    );
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    let settings = Settings::from_args(&args)?;
    let log_handle = logging::init_logging(&settings.logging)?;
    log_startup(&settings, log_handle.directory());

    if args.inventory_json {
        let inventory = tokio::task::spawn_blocking(MachineInfo::collect)
            .await
            .context("Inventory collection panicked")?;
        println!("{}", serde_json::to_string_pretty(&inventory)?);
        return Ok(());
    }

    let metrics = Arc::new(SystemMetrics::with_capacity(settings.capacity));
    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    let sampler = Sampler::new(ProcSource::new(), settings.interval);
    let sampler_task = tokio::spawn(sampler.run(Arc::clone(&metrics), shutdown_rx.clone()));

    let export_task = settings.export_interval.map(|every| {
        tokio::spawn(periodic_export(
            Arc::clone(&metrics),
            settings.export_format,
            settings.data_dir.clone(),
            every,
            shutdown_rx.clone(),
        ))
    });

    let inventory = tokio::task::spawn_blocking(MachineInfo::collect)
        .await
        .context("Inventory collection panicked")?;

    let app = App::new(Arc::clone(&metrics), settings.clone(), inventory);
    let result = if settings.tui {
        run_tui(app)
    } else {
        run_no_tui(app).await
    };

    // Let an in-flight tick finish before tearing down
    shutdown_tx.send_replace(true);
    join_task("sampler", sampler_task).await;
    if let Some(task) = export_task {
        join_task("periodic export", task).await;
    }

    if settings.export_on_exit {
        match export_blocking(Arc::clone(&metrics), settings.export_format, settings.data_dir.clone()).await {
            Ok(path) => eprintln!("Metrics exported to: {}", path.display()),
            Err(e) => {
                error!(error = %e, "Export on exit failed");
                eprintln!("Export on exit failed: {:#}", e);
            }
        }
    }

    if let Err(ref e) = result {
        error!(error = %e, "Agent stopped with error");
    }
    info!("Falcon Agent stopped");
    drop(log_handle);
    result
}
