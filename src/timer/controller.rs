use std::{
    sync::{Arc, Mutex, PoisonError},
    time::Duration,
};

use anyhow::{bail, Context, Result};
use chrono::Local;
use tokio::{
    sync::{mpsc, watch},
    task::JoinHandle,
    time::Instant,
};
use tokio_util::sync::CancellationToken;

use crate::{
    models::RunSummary,
    sensing::MonitorPipeline,
    settings::{IntervalConfig, JsonStore},
};

use super::{SchedulerState, SchedulerStatus, TriggerSource};

const ENABLE_LOGS: bool = true;

use crate::{log_error, log_info, log_warn};

/// How often the timer loop wakes up to re-read the interval configuration
/// while the timer is disabled.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(60);

/// The unit of work the scheduler runs. Synchronous; it always executes on
/// a blocking worker.
pub trait MonitorRun: Send + Sync + 'static {
    fn run_once(&self) -> RunSummary;
}

impl MonitorRun for MonitorPipeline {
    fn run_once(&self) -> RunSummary {
        MonitorPipeline::run_once(self)
    }
}

#[derive(Debug, Clone)]
pub struct RunCompleted {
    pub source: TriggerSource,
    pub summary: RunSummary,
}

/// Single-flight run guard. Cloning shares the guard.
#[derive(Clone)]
pub struct Scheduler {
    runner: Arc<dyn MonitorRun>,
    state: Arc<Mutex<SchedulerState>>,
    status_tx: Arc<watch::Sender<SchedulerStatus>>,
    completed_tx: mpsc::UnboundedSender<RunCompleted>,
}

impl Scheduler {
    pub fn new(runner: Arc<dyn MonitorRun>) -> (Self, mpsc::UnboundedReceiver<RunCompleted>) {
        let (status_tx, _) = watch::channel(SchedulerStatus::Idle);
        let (completed_tx, completed_rx) = mpsc::unbounded_channel();

        let scheduler = Self {
            runner,
            state: Arc::new(Mutex::new(SchedulerState::new())),
            status_tx: Arc::new(status_tx),
            completed_tx,
        };
        (scheduler, completed_rx)
    }

    pub fn status(&self) -> SchedulerStatus {
        *self.status_tx.borrow()
    }

    pub fn subscribe(&self) -> watch::Receiver<SchedulerStatus> {
        self.status_tx.subscribe()
    }

    pub fn snapshot(&self) -> SchedulerState {
        self.lock_state().clone()
    }

    /// Start a run in the background. Returns false when one is already in
    /// flight; the trigger is then dropped. Must be called from within a
    /// tokio runtime.
    pub fn trigger(&self, source: TriggerSource) -> bool {
        {
            let mut state = self.lock_state();
            if !state.begin_run(source, Local::now()) {
                log_info!("{source:?} trigger ignored: a run is already in progress");
                return false;
            }
        }
        self.status_tx.send_replace(SchedulerStatus::Running);
        log_info!("Monitoring run triggered ({source:?})");

        let this = self.clone();
        tokio::spawn(async move {
            let runner = Arc::clone(&this.runner);
            let summary = match tokio::task::spawn_blocking(move || runner.run_once()).await {
                Ok(summary) => summary,
                Err(err) => {
                    log_error!("Monitoring run ({source:?}) aborted: {err}");
                    RunSummary::default()
                }
            };
            this.finish(source, summary);
        });

        true
    }

    fn finish(&self, source: TriggerSource, summary: RunSummary) {
        self.lock_state().finish_run(Local::now());
        self.status_tx.send_replace(SchedulerStatus::Idle);

        if self
            .completed_tx
            .send(RunCompleted { source, summary })
            .is_err()
        {
            log_warn!("Run completed but nobody is listening for results");
        }
    }

    fn lock_state(&self) -> std::sync::MutexGuard<'_, SchedulerState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Owns the background timer task.
pub struct TimerLoop {
    handle: Option<JoinHandle<()>>,
    cancel_token: Option<CancellationToken>,
}

impl Default for TimerLoop {
    fn default() -> Self {
        Self::new()
    }
}

impl TimerLoop {
    pub fn new() -> Self {
        Self {
            handle: None,
            cancel_token: None,
        }
    }

    pub fn is_active(&self) -> bool {
        self.handle.is_some()
    }

    pub fn start(
        &mut self,
        scheduler: Scheduler,
        intervals: Arc<JsonStore<IntervalConfig>>,
        poll_interval: Duration,
    ) -> Result<()> {
        if self.handle.is_some() {
            bail!("timer loop already active");
        }

        let cancel_token = CancellationToken::new();
        let handle = tokio::spawn(timer_loop(
            scheduler,
            intervals,
            poll_interval,
            cancel_token.clone(),
        ));

        self.handle = Some(handle);
        self.cancel_token = Some(cancel_token);
        Ok(())
    }

    pub async fn stop(&mut self) -> Result<()> {
        if let Some(token) = self.cancel_token.take() {
            token.cancel();
        }

        if let Some(handle) = self.handle.take() {
            handle.await.context("timer loop task failed to join")
        } else {
            Ok(())
        }
    }
}

/// Sleeps, re-reads the interval configuration, and triggers a run when the
/// timer is enabled. A disabled timer only polls. Changes to the
/// configuration apply at the next wake-up.
pub async fn timer_loop(
    scheduler: Scheduler,
    intervals: Arc<JsonStore<IntervalConfig>>,
    poll_interval: Duration,
    cancel_token: CancellationToken,
) {
    let mut wait = poll_interval;

    loop {
        let wake_at = Instant::now() + wait;
        tokio::select! {
            _ = tokio::time::sleep_until(wake_at) => {}
            _ = cancel_token.cancelled() => {
                log_info!("timer loop shutting down");
                break;
            }
        }

        let config = intervals.reload();
        wait = if config.enabled {
            scheduler.trigger(TriggerSource::Timer);
            config.period()
        } else {
            poll_interval
        };
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{
        atomic::{AtomicUsize, Ordering},
        mpsc as std_mpsc,
    };
    use tempfile::TempDir;

    struct CountingRun {
        runs: AtomicUsize,
    }

    impl CountingRun {
        fn new() -> Arc<Self> {
            Arc::new(Self {
                runs: AtomicUsize::new(0),
            })
        }

        fn runs(&self) -> usize {
            self.runs.load(Ordering::SeqCst)
        }
    }

    impl MonitorRun for CountingRun {
        fn run_once(&self) -> RunSummary {
            let run = self.runs.fetch_add(1, Ordering::SeqCst) + 1;
            RunSummary {
                warned_empty: false,
                summary_text: format!("run {run}"),
            }
        }
    }

    /// Blocks inside `run_once` until the test releases it.
    struct GatedRun {
        release: Mutex<std_mpsc::Receiver<()>>,
    }

    impl MonitorRun for GatedRun {
        fn run_once(&self) -> RunSummary {
            let _ = self.release.lock().unwrap().recv();
            RunSummary {
                warned_empty: true,
                summary_text: "done".into(),
            }
        }
    }

    struct PanickingRun;

    impl MonitorRun for PanickingRun {
        fn run_once(&self) -> RunSummary {
            panic!("capture exploded");
        }
    }

    fn interval_store(dir: &TempDir, config: IntervalConfig) -> Arc<JsonStore<IntervalConfig>> {
        let store = Arc::new(JsonStore::open(dir.path().join("interval_config.json")));
        store.replace(config).unwrap();
        store
    }

    #[tokio::test]
    async fn trigger_while_running_is_rejected() {
        let (release_tx, release_rx) = std_mpsc::channel();
        let runner = Arc::new(GatedRun {
            release: Mutex::new(release_rx),
        });
        let (scheduler, mut completed) = Scheduler::new(runner);
        let mut status = scheduler.subscribe();

        assert!(scheduler.trigger(TriggerSource::Manual));
        assert_eq!(scheduler.status(), SchedulerStatus::Running);
        assert!(!scheduler.trigger(TriggerSource::Manual));
        assert!(!scheduler.trigger(TriggerSource::Timer));

        release_tx.send(()).unwrap();
        let done = completed.recv().await.unwrap();
        assert_eq!(done.source, TriggerSource::Manual);
        assert_eq!(done.summary.summary_text, "done");
        assert!(done.summary.warned_empty);

        status
            .wait_for(|s| *s == SchedulerStatus::Idle)
            .await
            .unwrap();
        assert_eq!(scheduler.snapshot().completed_runs, 1);
        assert!(completed.try_recv().is_err());
    }

    #[tokio::test]
    async fn idle_again_after_completion() {
        let runner = CountingRun::new();
        let (scheduler, mut completed) = Scheduler::new(runner.clone());

        assert!(scheduler.trigger(TriggerSource::Manual));
        completed.recv().await.unwrap();
        assert!(scheduler.trigger(TriggerSource::Manual));
        let second = completed.recv().await.unwrap();

        assert_eq!(second.summary.summary_text, "run 2");
        assert_eq!(runner.runs(), 2);
        assert_eq!(scheduler.status(), SchedulerStatus::Idle);
    }

    #[tokio::test]
    async fn panicking_run_returns_to_idle() {
        let (scheduler, mut completed) = Scheduler::new(Arc::new(PanickingRun));

        assert!(scheduler.trigger(TriggerSource::Manual));
        let done = completed.recv().await.unwrap();

        assert_eq!(done.summary, RunSummary::default());
        assert_eq!(scheduler.status(), SchedulerStatus::Idle);
        assert!(scheduler.trigger(TriggerSource::Manual));
    }

    #[tokio::test(start_paused = true)]
    async fn disabled_timer_never_fires() {
        let dir = TempDir::new().unwrap();
        let intervals = interval_store(
            &dir,
            IntervalConfig {
                enabled: false,
                interval_minutes: 1,
            },
        );
        let runner = CountingRun::new();
        let (scheduler, mut completed) = Scheduler::new(runner.clone());
        let mut timer = TimerLoop::new();
        timer
            .start(scheduler, intervals, DEFAULT_POLL_INTERVAL)
            .unwrap();

        tokio::time::sleep(Duration::from_secs(60 * 30)).await;

        assert_eq!(runner.runs(), 0);
        assert!(completed.try_recv().is_err());
        timer.stop().await.unwrap();
        assert!(!timer.is_active());
    }

    #[tokio::test(start_paused = true)]
    async fn enabled_timer_fires_every_interval() {
        let dir = TempDir::new().unwrap();
        let intervals = interval_store(
            &dir,
            IntervalConfig {
                enabled: true,
                interval_minutes: 10,
            },
        );
        let (scheduler, mut completed) = Scheduler::new(CountingRun::new());
        let mut timer = TimerLoop::new();
        timer
            .start(scheduler, intervals, DEFAULT_POLL_INTERVAL)
            .unwrap();

        // First wake-up after one poll interval.
        tokio::time::sleep(Duration::from_secs(61)).await;
        let first = completed.recv().await.unwrap();
        assert_eq!(first.source, TriggerSource::Timer);
        assert_eq!(first.summary.summary_text, "run 1");

        tokio::time::sleep(Duration::from_secs(5 * 60)).await;
        assert!(completed.try_recv().is_err());

        tokio::time::sleep(Duration::from_secs(5 * 60)).await;
        let second = completed.recv().await.unwrap();
        assert_eq!(second.summary.summary_text, "run 2");

        timer.stop().await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn enabling_takes_effect_at_next_wake_up() {
        let dir = TempDir::new().unwrap();
        let intervals = interval_store(
            &dir,
            IntervalConfig {
                enabled: false,
                interval_minutes: 1,
            },
        );
        let runner = CountingRun::new();
        let (scheduler, mut completed) = Scheduler::new(runner.clone());
        let mut timer = TimerLoop::new();
        timer
            .start(scheduler, Arc::clone(&intervals), DEFAULT_POLL_INTERVAL)
            .unwrap();

        tokio::time::sleep(Duration::from_secs(90)).await;
        assert_eq!(runner.runs(), 0);

        intervals
            .replace(IntervalConfig {
                enabled: true,
                interval_minutes: 1,
            })
            .unwrap();

        tokio::time::sleep(Duration::from_secs(35)).await;
        let done = completed.recv().await.unwrap();
        assert_eq!(done.source, TriggerSource::Timer);

        timer.stop().await.unwrap();
    }

    #[tokio::test]
    async fn second_start_is_rejected() {
        let dir = TempDir::new().unwrap();
        let intervals = interval_store(&dir, IntervalConfig::default());
        let (scheduler, _completed) = Scheduler::new(CountingRun::new());
        let mut timer = TimerLoop::new();

        timer
            .start(scheduler.clone(), Arc::clone(&intervals), DEFAULT_POLL_INTERVAL)
            .unwrap();
        assert!(timer
            .start(scheduler, intervals, DEFAULT_POLL_INTERVAL)
            .is_err());

        timer.stop().await.unwrap();
        timer.stop().await.unwrap();
    }
}
