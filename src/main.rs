use anyhow::{Context, Result};
use chrono::Local;
use clap::{Parser, Subcommand};
use std::{path::PathBuf, sync::Arc, time::Duration};
use tokio::io::{AsyncBufReadExt, BufReader};

use screenguard_lib::{
    init_logging,
    models::{MonitorTarget, RunSummary},
    poll_interval, resolve_data_dir,
    sensing::{capture::take_window_screenshot, locate},
    timer::{MonitorRun, Scheduler, SchedulerStatus, TimerLoop, TriggerSource},
    AppState,
};

// Grace period for the stdin reader thread once the watch loop is done.
const SHUTDOWN_GRACE: Duration = Duration::from_secs(1);

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Data directory (defaults to $SCREENGUARD_DATA_DIR, then ./data)
    #[arg(long, global = true)]
    data_dir: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Capture, analyze and summarize once, then print the summary
    RunOnce,
    /// Run the interval timer until Ctrl-C; press Enter for a manual run
    Watch,
    /// Find the visible window of an executable
    Locate { exe_path: String },
    /// Capture one application's window into the screenshot store
    TestCapture {
        #[arg(long)]
        name: String,
        exe_path: String,
    },
    /// Print the monitored application slots
    Targets,
    /// Delete the behavior log and all captured screenshots
    Clear,
}

fn main() -> Result<()> {
    let args = Args::parse();
    init_logging();

    let data_dir = resolve_data_dir(args.data_dir);
    let app = AppState::open(&data_dir)?;
    log::info!("ScreenGuard starting with data dir {}", app.paths.root().display());

    match args.command {
        Command::RunOnce => {
            let summary = app.pipeline.run_once();
            print_summary(&summary);
        }
        Command::Watch => watch(&app)?,
        Command::Locate { exe_path } => match locate(app.backend.as_ref(), &exe_path) {
            Some(window) => println!("{exe_path}: window {:#x}", window.0),
            None => println!("{exe_path}: no visible window"),
        },
        Command::TestCapture { name, exe_path } => {
            let adhoc = MonitorTarget::new(0, &name, &exe_path, "");
            let file_path = app.paths.capture_path(&adhoc, Local::now());
            let saved = take_window_screenshot(app.backend.as_ref(), &exe_path, &file_path)
                .with_context(|| format!("test capture of {exe_path} failed"))?;
            println!("Saved {}", saved.display());
        }
        Command::Targets => print_targets(&app),
        Command::Clear => {
            app.behavior_log.clear()?;
            println!("Behavior log and screenshots cleared");
        }
    }

    Ok(())
}

/// Runs outside any async context so the blocking HTTP client is never
/// created or dropped on a runtime thread.
fn watch(app: &AppState) -> Result<()> {
    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .context("failed to build tokio runtime")?;

    let result = runtime.block_on(watch_loop(app));
    runtime.shutdown_timeout(SHUTDOWN_GRACE);
    result
}

async fn watch_loop(app: &AppState) -> Result<()> {
    let runner: Arc<dyn MonitorRun> = app.pipeline.clone();
    let (scheduler, mut completed) = Scheduler::new(runner);
    let mut status = scheduler.subscribe();

    let mut timer = TimerLoop::new();
    timer.start(scheduler.clone(), Arc::clone(&app.intervals), poll_interval())?;

    let interval = app.intervals.snapshot();
    if interval.enabled {
        println!(
            "Watching; timer runs every {} minute(s). Enter = run now, Ctrl-C = quit.",
            interval.period().as_secs() / 60
        );
    } else {
        println!("Watching; interval timer is disabled. Enter = run now, Ctrl-C = quit.");
    }

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut stdin_open = true;

    loop {
        tokio::select! {
            line = lines.next_line(), if stdin_open => match line {
                Ok(Some(_)) => {
                    if !scheduler.trigger(TriggerSource::Manual) {
                        println!("A run is already in progress");
                    }
                }
                Ok(None) => stdin_open = false,
                Err(err) => {
                    log::warn!("Stopped reading stdin: {err}");
                    stdin_open = false;
                }
            },
            Some(done) = completed.recv() => {
                println!("[{:?} run finished]", done.source);
                print_summary(&done.summary);
            }
            _ = tokio::signal::ctrl_c() => break,
        }
    }

    timer.stop().await?;

    if *status.borrow() == SchedulerStatus::Running {
        println!("Waiting for the current run to finish...");
        status
            .wait_for(|s| *s == SchedulerStatus::Idle)
            .await
            .context("scheduler went away")?;
    }
    Ok(())
}

fn print_summary(summary: &RunSummary) {
    if summary.warned_empty {
        println!("(behavior log is empty: screenshot capture does not seem to work)");
    }
    if summary.summary_text.is_empty() {
        println!("(no summary)");
    } else {
        println!("{}", summary.summary_text);
    }
}

fn print_targets(app: &AppState) {
    for target in app.targets.load() {
        let state = if target.is_enabled() { "on " } else { "off" };
        println!("{} [{state}] {} {}", target.id, target.name, target.exe_path);
        if target.is_enabled() {
            println!("    prompt: {}", target.analysis_prompt());
        }
    }
}
