use anyhow::{Context, Result};
use log::{info, warn};
use serde_json::Value;
use std::{
    fs, io,
    path::PathBuf,
    sync::{Mutex, MutexGuard, PoisonError},
};

use crate::models::BehaviorLogEntry;

use super::write_atomically;

/// Append-only behavior log backed by a pretty-printed JSON array.
///
/// Appends are read-modify-write of the whole file, so appends and `clear`
/// serialize on one lock. Share a single instance (`Arc`) between the
/// orchestrator and whatever surface offers clearing.
pub struct BehaviorLog {
    path: PathBuf,
    screenshot_dir: PathBuf,
    lock: Mutex<()>,
}

impl BehaviorLog {
    pub fn new(path: PathBuf, screenshot_dir: PathBuf) -> Self {
        Self {
            path,
            screenshot_dir,
            lock: Mutex::new(()),
        }
    }

    pub fn entries(&self) -> Result<Vec<BehaviorLogEntry>> {
        let _guard = self.guard();
        self.read_entries()
    }

    /// The last `count` entries, oldest first.
    pub fn tail(&self, count: usize) -> Result<Vec<BehaviorLogEntry>> {
        let entries = self.entries()?;
        Ok(tail_of(&entries, count).to_vec())
    }

    /// Append one entry per behavior, all stamped with `time`, in order.
    /// No merging: identical behaviors are stored again.
    pub fn append_batch(&self, time: &str, behaviors: &[String]) -> Result<usize> {
        if behaviors.is_empty() {
            return Ok(0);
        }

        let _guard = self.guard();
        let mut entries = self.read_entries()?;
        entries.extend(
            behaviors
                .iter()
                .map(|behavior| BehaviorLogEntry::new(time, behavior.as_str())),
        );

        let serialized = serde_json::to_string_pretty(&entries)?;
        write_atomically(&self.path, serialized.as_bytes())
            .with_context(|| format!("failed to write behavior log {}", self.path.display()))?;
        Ok(behaviors.len())
    }

    /// Drop every entry and every stored capture.
    pub fn clear(&self) -> Result<()> {
        let _guard = self.guard();

        remove_if_present(fs::remove_file(&self.path))
            .with_context(|| format!("failed to remove {}", self.path.display()))?;
        remove_if_present(fs::remove_dir_all(&self.screenshot_dir)).with_context(|| {
            format!(
                "failed to remove captures under {}",
                self.screenshot_dir.display()
            )
        })?;

        info!("Behavior log and captures cleared");
        Ok(())
    }

    fn guard(&self) -> MutexGuard<'_, ()> {
        self.lock.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn read_entries(&self) -> Result<Vec<BehaviorLogEntry>> {
        let contents = match fs::read_to_string(&self.path) {
            Ok(contents) => contents,
            Err(err) if err.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(err) => {
                return Err(err)
                    .with_context(|| format!("failed to read {}", self.path.display()))
            }
        };

        if contents.trim().is_empty() {
            return Ok(Vec::new());
        }

        let value: Value = serde_json::from_str(&contents)
            .with_context(|| format!("behavior log {} is not valid JSON", self.path.display()))?;

        let Value::Array(items) = value else {
            warn!(
                "Behavior log {} is not an array; treating as empty",
                self.path.display()
            );
            return Ok(Vec::new());
        };

        Ok(items.iter().map(entry_from_value).collect())
    }
}

/// Last `count` items of `entries`, in original order.
pub fn tail_of<T>(entries: &[T], count: usize) -> &[T] {
    &entries[entries.len().saturating_sub(count)..]
}

// Hand-edited files may hold numbers or nulls; keep whatever text is there.
fn entry_from_value(item: &Value) -> BehaviorLogEntry {
    let field = |key: &str| match item.get(key) {
        None | Some(Value::Null) => String::new(),
        Some(Value::String(text)) => text.clone(),
        Some(other) => other.to_string(),
    };
    BehaviorLogEntry::new(field("time"), field("behavior"))
}

fn remove_if_present(result: io::Result<()>) -> io::Result<()> {
    match result {
        Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(()),
        other => other,
    }
}
