mod config;

use std::fs::OpenOptions;
use std::path::Path;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use chrono::TimeDelta;
use clap::Parser;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::filter::LevelFilter;

use httpscope_logs::{
    Clock, DirectTransport, LogParser, SharedCollector, SlidingWindow, SystemClock,
};
use httpscope_tail::{MonitorStats, NotifyWatcher, PollWatcher, TailMonitor, WatchSource};
use httpscope_tui::{
    Action, AppState, DashboardScreen, DisplayConfig, Event, EventHandler, HelpOverlay,
    KeyBindings, KeyContext, Tui,
};

use crate::config::{Args, Config};

/// Input poll and timer granularity of the dashboard
const TICK_RATE: Duration = Duration::from_millis(250);

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    init_tracing(args.log_file.as_deref())?;

    // Run the application
    let result = run_app(args).await;

    // Handle any errors
    if let Err(e) = &result {
        eprintln!("Error: {:#}", e);
    }

    result
}

/// The dashboard owns the terminal, so diagnostics go to a file when one is given
fn init_tracing(log_file: Option<&Path>) -> Result<()> {
    let filter = log_filter(std::env::var(EnvFilter::DEFAULT_ENV).ok().as_deref());

    match log_file {
        Some(path) => {
            let file = OpenOptions::new()
                .create(true)
                .append(true)
                .open(path)
                .with_context(|| format!("failed to open log file {}", path.display()))?;
            tracing_subscriber::fmt()
                .with_env_filter(filter)
                .with_ansi(false)
                .with_writer(Mutex::new(file))
                .init();
        }
        None => {
            tracing_subscriber::fmt()
                .with_env_filter(filter)
                .with_writer(std::io::stderr)
                .init();
        }
    }
    Ok(())
}

/// `RUST_LOG` directives when set, `warn` otherwise
fn log_filter(directives: Option<&str>) -> EnvFilter {
    EnvFilter::builder()
        .with_default_directive(LevelFilter::WARN.into())
        .parse_lossy(directives.unwrap_or_default())
}

async fn run_app(args: Args) -> Result<()> {
    let config = Config::load(&args).context("failed to load configuration")?;
    config.validate()?;

    // Everything below fails fast before any thread starts
    let parser = config
        .format
        .parser_for(&config.files[0])
        .with_context(|| format!("failed to set up {} parser", config.format.as_str()))?;

    let retention = TimeDelta::from_std(config.retention).context("interval is too large")?;
    let clock: Arc<dyn Clock> = Arc::new(SystemClock);
    let collector = SharedCollector::new(SlidingWindow::new(retention, clock));

    let cancel = CancellationToken::new();
    let transport = DirectTransport::new(collector.clone());
    let (monitor_task, stats) = if config.notify {
        let source = NotifyWatcher::new().context("failed to set up file notifications")?;
        spawn_monitor(&config, parser, transport, source, &cancel)?
    } else {
        let source = PollWatcher::new(config.poll_interval);
        spawn_monitor(&config, parser, transport, source, &cancel)?
    };

    let result = run_dashboard(
        config.display.clone(),
        &collector,
        &stats,
        &cancel,
        &monitor_task,
    )
    .await;

    // Stop the monitor and wait for it whatever the dashboard returned
    cancel.cancel();
    monitor_task.await.context("tail monitor panicked")?;

    result
}

/// Build the tail monitor and run it on the blocking pool
fn spawn_monitor<W>(
    config: &Config,
    parser: Box<dyn LogParser>,
    transport: DirectTransport,
    source: W,
    cancel: &CancellationToken,
) -> Result<(JoinHandle<()>, Arc<MonitorStats>)>
where
    W: WatchSource + 'static,
{
    let mut monitor = TailMonitor::new(
        config.files.clone(),
        parser,
        transport,
        source,
        config.monitor.clone(),
    )?
    .with_cancel_token(cancel.clone());
    let stats = monitor.stats();

    tracing::info!(
        files = config.files.len(),
        format = config.format.as_str(),
        retention_secs = config.retention.as_secs(),
        notify = config.notify,
        "starting tail monitor"
    );

    let task = tokio::task::spawn_blocking(move || monitor.run());
    Ok((task, stats))
}

async fn run_dashboard(
    config: DisplayConfig,
    collector: &SharedCollector,
    stats: &MonitorStats,
    cancel: &CancellationToken,
    monitor_task: &JoinHandle<()>,
) -> Result<()> {
    let mut state = AppState::new(config);
    let keybindings = KeyBindings::new();

    // Initialize TUI
    let mut tui = Tui::new().context("failed to initialise terminal")?;
    let mut events = EventHandler::new(TICK_RATE, cancel);
    let mut monitor_reported = false;

    loop {
        if state.should_quit {
            break;
        }

        if state.refresh_due(Instant::now()) {
            state.refresh(collector);
        }
        if state.render_dirty {
            render(&mut tui, &state, stats)?;
            state.render_dirty = false;
        }

        tokio::select! {
            _ = cancel.cancelled() => break,

            maybe_event = events.next() => {
                let Some(event) = maybe_event else { break };
                match event {
                    Event::Key(key) => {
                        let context = if state.ui_state.help_visible {
                            KeyContext::Help
                        } else {
                            KeyContext::Dashboard
                        };
                        if let Some(action) = keybindings.get_action(context, &key) {
                            state.apply(action);
                        }
                    }
                    Event::Tick => {
                        if !monitor_reported && monitor_task.is_finished() {
                            monitor_reported = true;
                            state.apply(Action::ShowError(
                                "tail monitor stopped: no file left to follow".to_string(),
                            ));
                        }
                    }
                    Event::Resize(_, _) => state.apply(Action::Render),
                    Event::Error(e) => state.apply(Action::ShowError(e)),
                }
            }
        }
    }

    events.shutdown().await;
    tui.restore().context("failed to restore terminal")?;
    Ok(())
}

fn render(tui: &mut Tui, state: &AppState, stats: &MonitorStats) -> Result<()> {
    tui.terminal().draw(|frame| {
        DashboardScreen::render(frame, state, stats);

        // Render help overlay if visible
        if state.ui_state.help_visible {
            HelpOverlay::render(frame);
        }
    })?;

    Ok(())
}
