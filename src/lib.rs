pub mod analysis;
pub mod models;
pub mod sensing;
pub mod settings;
pub mod store;
pub mod timer;
pub mod utils;

#[cfg(windows)]
mod win_bridge;

use anyhow::{Context, Result};
use std::{
    path::{Path, PathBuf},
    sync::Arc,
    time::Duration,
};

use analysis::{AnalysisService, ChatCompletionsClient, RecordingAnalysis};
use sensing::{DesktopBackend, MonitorPipeline};
use settings::{IntervalConfig, JsonStore, ModelConfig};
use store::{BehaviorLog, ConversationLog, DataPaths, TargetRegistry};
use timer::DEFAULT_POLL_INTERVAL;

pub const DATA_DIR_ENV: &str = "SCREENGUARD_DATA_DIR";
pub const POLL_SECS_ENV: &str = "SCREENGUARD_POLL_SECS";
const DEFAULT_DATA_DIR: &str = "data";

/// Everything a front end needs, opened from one data directory.
pub struct AppState {
    pub paths: DataPaths,
    pub targets: Arc<TargetRegistry>,
    pub models: Arc<JsonStore<ModelConfig>>,
    pub intervals: Arc<JsonStore<IntervalConfig>>,
    pub behavior_log: Arc<BehaviorLog>,
    pub conversation_log: Arc<ConversationLog>,
    pub backend: Arc<dyn DesktopBackend>,
    pub pipeline: Arc<MonitorPipeline>,
}

impl AppState {
    /// Open the stores under `data_dir` with the platform's capture back end
    /// and the HTTP analysis client.
    pub fn open(data_dir: &Path) -> Result<Self> {
        let conversation_log = Arc::new(ConversationLog::new(
            DataPaths::new(data_dir).conversation_log(),
        ));
        let analysis = Arc::new(RecordingAnalysis::new(
            ChatCompletionsClient::new(),
            Arc::clone(&conversation_log),
        ));
        Self::with_services(data_dir, sensing::native_backend(), analysis, conversation_log)
    }

    pub fn with_services(
        data_dir: &Path,
        backend: Arc<dyn DesktopBackend>,
        analysis: Arc<dyn AnalysisService>,
        conversation_log: Arc<ConversationLog>,
    ) -> Result<Self> {
        std::fs::create_dir_all(data_dir)
            .with_context(|| format!("failed to create data dir {}", data_dir.display()))?;
        let paths = DataPaths::new(data_dir);

        let targets = Arc::new(TargetRegistry::open(paths.monitor_apps()));
        let models = Arc::new(JsonStore::open(paths.model_config()));
        let intervals = Arc::new(JsonStore::open(paths.interval_config()));
        let behavior_log = Arc::new(BehaviorLog::new(
            paths.behavior_log(),
            paths.screenshot_dir(),
        ));

        let pipeline = Arc::new(MonitorPipeline::new(
            Arc::clone(&backend),
            Arc::clone(&targets),
            Arc::clone(&models),
            Arc::clone(&behavior_log),
            analysis,
            paths.clone(),
        ));

        Ok(Self {
            paths,
            targets,
            models,
            intervals,
            behavior_log,
            conversation_log,
            backend,
            pipeline,
        })
    }
}

/// Initialize logging (reads RUST_LOG). Safe to call more than once.
pub fn init_logging() {
    let _ = env_logger::Builder::from_default_env()
        .filter_level(log::LevelFilter::Info)
        .try_init();
}

/// `--data-dir`, then `SCREENGUARD_DATA_DIR`, then `./data`.
pub fn resolve_data_dir(cli_value: Option<PathBuf>) -> PathBuf {
    cli_value
        .or_else(|| {
            std::env::var_os(DATA_DIR_ENV)
                .filter(|value| !value.is_empty())
                .map(PathBuf::from)
        })
        .unwrap_or_else(|| PathBuf::from(DEFAULT_DATA_DIR))
}

/// Timer-loop poll cadence. `SCREENGUARD_POLL_SECS` shortens it for
/// debugging; zero or garbage falls back to the default.
pub fn poll_interval() -> Duration {
    parse_poll_secs(std::env::var(POLL_SECS_ENV).ok().as_deref())
}

fn parse_poll_secs(raw: Option<&str>) -> Duration {
    match raw.map(str::trim).map(str::parse::<u64>) {
        Some(Ok(secs)) if secs > 0 => Duration::from_secs(secs),
        Some(_) => {
            log::warn!("Ignoring invalid {POLL_SECS_ENV}; using default poll interval");
            DEFAULT_POLL_INTERVAL
        }
        None => DEFAULT_POLL_INTERVAL,
    }
}
