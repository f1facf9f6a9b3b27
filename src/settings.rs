use anyhow::{Context, Result};
use log::warn;
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use std::{
    fmt, fs,
    path::{Path, PathBuf},
    sync::{PoisonError, RwLock},
    time::Duration,
};

use crate::store::write_atomically;

const DEFAULT_INTERVAL_MINUTES: u32 = 10;

/// One model + system prompt pair. The capture analysis and the synthesis
/// call are configured independently.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ModelRole {
    pub model: String,
    pub system_prompt: String,
}

#[derive(Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ModelConfig {
    pub api_key: String,
    pub base_url: String,
    /// Text-only synthesis of recent behavior.
    pub system_call: ModelRole,
    /// Per-target screenshot analysis.
    pub behavior_analysis: ModelRole,
}

// Keep the key out of logs.
impl fmt::Debug for ModelConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ModelConfig")
            .field("api_key", &if self.api_key.is_empty() { "" } else { "***" })
            .field("base_url", &self.base_url)
            .field("system_call", &self.system_call)
            .field("behavior_analysis", &self.behavior_analysis)
            .finish()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct IntervalConfig {
    pub enabled: bool,
    pub interval_minutes: u32,
}

impl Default for IntervalConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            interval_minutes: DEFAULT_INTERVAL_MINUTES,
        }
    }
}

impl IntervalConfig {
    /// Time between timer-driven runs. Zero minutes is treated as one.
    pub fn period(&self) -> Duration {
        Duration::from_secs(u64::from(self.interval_minutes.max(1)) * 60)
    }
}

/// A JSON document on disk with an in-memory copy.
///
/// Missing or unparsable files load as `T::default()`: absent configuration
/// is a valid initial state. Readers always get a full clone taken under the
/// read lock, and writes go through a temp file + rename so an external
/// reader never sees half a document.
pub struct JsonStore<T> {
    path: PathBuf,
    data: RwLock<T>,
}

impl<T> JsonStore<T>
where
    T: Serialize + DeserializeOwned + Default + Clone,
{
    pub fn open(path: PathBuf) -> Self {
        let data = load_or_default(&path);
        Self {
            path,
            data: RwLock::new(data),
        }
    }

    pub fn snapshot(&self) -> T {
        self.data
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Re-read the file, for documents edited by another process, and return
    /// the fresh snapshot.
    pub fn reload(&self) -> T {
        let fresh: T = load_or_default(&self.path);
        let mut guard = self.data.write().unwrap_or_else(PoisonError::into_inner);
        *guard = fresh.clone();
        fresh
    }

    /// Read-modify-write under the write lock. Starts from the file, not the
    /// cache, so edits made by another process are kept.
    pub fn update<F>(&self, edit: F) -> Result<T>
    where
        F: FnOnce(&mut T),
    {
        let mut guard = self.data.write().unwrap_or_else(PoisonError::into_inner);
        let mut next: T = load_or_default(&self.path);
        edit(&mut next);
        self.persist(&next)?;
        *guard = next.clone();
        Ok(next)
    }

    pub fn replace(&self, value: T) -> Result<()> {
        self.update(|current| *current = value).map(|_| ())
    }

    fn persist(&self, data: &T) -> Result<()> {
        let serialized = serde_json::to_string_pretty(data)?;
        write_atomically(&self.path, serialized.as_bytes())
            .with_context(|| format!("Failed to write settings to {}", self.path.display()))
    }
}

fn load_or_default<T>(path: &Path) -> T
where
    T: DeserializeOwned + Default,
{
    let contents = match fs::read_to_string(path) {
        Ok(contents) => contents,
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => return T::default(),
        Err(err) => {
            warn!("Failed to read {}: {err}; using defaults", path.display());
            return T::default();
        }
    };

    serde_json::from_str(&contents).unwrap_or_else(|err| {
        warn!("Ignoring corrupt config {}: {err}", path.display());
        T::default()
    })
}
