//! On-disk state owned by the pipeline.
//!
//! Layout under the data directory:
//!
//! ```text
//! config/monitor_apps.json     target slots
//! config/model_config.json     endpoint, key, model roles
//! config/interval_config.json  timer settings
//! log/behavior-log.json        behavior log (JSON array)
//! log/logs.jsonl               one line per analysis call
//! screenshot/<app>/<date>/     captured frames
//! ```

use std::{
    fs,
    io::{self, Write},
    path::{Path, PathBuf},
};

use chrono::{DateTime, Local};

use crate::models::MonitorTarget;

pub mod behavior_log;
pub mod conversation_log;
pub mod targets;

pub use behavior_log::BehaviorLog;
pub use conversation_log::{ConversationLog, ConversationLogEntry};
pub use targets::TargetRegistry;

#[derive(Debug, Clone)]
pub struct DataPaths {
    root: PathBuf,
}

impl DataPaths {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn monitor_apps(&self) -> PathBuf {
        self.root.join("config").join("monitor_apps.json")
    }

    pub fn model_config(&self) -> PathBuf {
        self.root.join("config").join("model_config.json")
    }

    pub fn interval_config(&self) -> PathBuf {
        self.root.join("config").join("interval_config.json")
    }

    pub fn behavior_log(&self) -> PathBuf {
        self.root.join("log").join("behavior-log.json")
    }

    pub fn conversation_log(&self) -> PathBuf {
        self.root.join("log").join("logs.jsonl")
    }

    pub fn screenshot_dir(&self) -> PathBuf {
        self.root.join("screenshot")
    }

    /// `screenshot/<app>/<YYYY-MM-DD>/<app>-<unix seconds>.png`
    pub fn capture_path(&self, target: &MonitorTarget, now: DateTime<Local>) -> PathBuf {
        let stem = target.file_stem();
        self.screenshot_dir()
            .join(&stem)
            .join(now.format("%Y-%m-%d").to_string())
            .join(format!("{stem}-{}.png", now.timestamp()))
    }
}

/// Replace `path` with `bytes` via a sibling temp file and a rename, creating
/// parent directories as needed.
pub(crate) fn write_atomically(path: &Path, bytes: &[u8]) -> io::Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }

    let mut tmp_name = path.file_name().unwrap_or_default().to_os_string();
    tmp_name.push(".tmp");
    let tmp_path = path.with_file_name(tmp_name);

    {
        let mut file = fs::File::create(&tmp_path)?;
        file.write_all(bytes)?;
        file.sync_all()?;
    }
    fs::rename(&tmp_path, path)
}
