use anyhow::{Context, Result};
use log::warn;
use serde::{Deserialize, Serialize};
use std::{
    fs::{self, OpenOptions},
    io::{self, BufRead, BufReader, Write},
    path::{Path, PathBuf},
    sync::{Mutex, PoisonError},
};

/// Stored in place of an image path for text-only calls.
pub const NO_IMAGE_MARKER: &str = "no image uploaded";

/// One analysis call, for audit and debugging.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConversationLogEntry {
    pub time: String,
    pub model: String,
    pub user_input_content: String,
    pub system_prompt: String,
    pub image: String,
    pub reply: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl ConversationLogEntry {
    pub fn image_label(image: Option<&Path>) -> String {
        image
            .map(|path| path.display().to_string())
            .unwrap_or_else(|| NO_IMAGE_MARKER.to_string())
    }
}

/// Append-only JSON-lines log of every analysis call.
pub struct ConversationLog {
    path: PathBuf,
    lock: Mutex<()>,
}

impl ConversationLog {
    pub fn new(path: PathBuf) -> Self {
        Self {
            path,
            lock: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn append(&self, entry: &ConversationLogEntry) -> Result<()> {
        let _guard = self.lock.lock().unwrap_or_else(PoisonError::into_inner);

        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)
                .with_context(|| format!("failed to create {}", parent.display()))?;
        }

        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .with_context(|| format!("failed to open {}", self.path.display()))?;

        let mut line = serde_json::to_vec(entry)?;
        line.push(b'\n');
        file.write_all(&line)
            .with_context(|| format!("failed to append to {}", self.path.display()))
    }

    /// All readable entries; malformed lines are skipped.
    pub fn entries(&self) -> Result<Vec<ConversationLogEntry>> {
        let _guard = self.lock.lock().unwrap_or_else(PoisonError::into_inner);

        let file = match fs::File::open(&self.path) {
            Ok(file) => file,
            Err(err) if err.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(err) => {
                return Err(err).with_context(|| format!("failed to open {}", self.path.display()))
            }
        };

        let mut entries = Vec::new();
        for (index, line) in BufReader::new(file).lines().enumerate() {
            let line = line.with_context(|| format!("failed to read {}", self.path.display()))?;
            if line.trim().is_empty() {
                continue;
            }
            match serde_json::from_str(&line) {
                Ok(entry) => entries.push(entry),
                Err(err) => warn!("Skipping conversation log line {}: {err}", index + 1),
            }
        }
        Ok(entries)
    }

    pub fn clear(&self) -> Result<()> {
        let _guard = self.lock.lock().unwrap_or_else(PoisonError::into_inner);
        match fs::remove_file(&self.path) {
            Err(err) if err.kind() != io::ErrorKind::NotFound => {
                Err(err).with_context(|| format!("failed to remove {}", self.path.display()))
            }
            _ => Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn entry(reply: &str, error: Option<&str>) -> ConversationLogEntry {
        ConversationLogEntry {
            time: "2026-02-04T12:35:00".into(),
            model: "vision-1".into(),
            user_input_content: "what is happening".into(),
            system_prompt: "be brief".into(),
            image: ConversationLogEntry::image_label(None),
            reply: reply.into(),
            error: error.map(String::from),
        }
    }

    #[test]
    fn appends_one_line_per_call() {
        let dir = TempDir::new().unwrap();
        let log = ConversationLog::new(dir.path().join("log").join("logs.jsonl"));

        log.append(&entry("first", None)).unwrap();
        log.append(&entry("", Some("HTTP 500"))).unwrap();

        let raw = fs::read_to_string(log.path()).unwrap();
        assert_eq!(raw.lines().count(), 2);
        assert!(!raw.lines().next().unwrap().contains("\"error\""));

        let entries = log.entries().unwrap();
        assert_eq!(entries, vec![entry("first", None), entry("", Some("HTTP 500"))]);
        assert_eq!(entries[0].image, NO_IMAGE_MARKER);
    }

    #[test]
    fn malformed_lines_are_skipped() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("logs.jsonl");
        let log = ConversationLog::new(path.clone());
        log.append(&entry("kept", None)).unwrap();
        let mut file = OpenOptions::new().append(true).open(&path).unwrap();
        writeln!(file, "not json").unwrap();

        assert_eq!(log.entries().unwrap().len(), 1);
    }

    #[test]
    fn clear_removes_the_file() {
        let dir = TempDir::new().unwrap();
        let log = ConversationLog::new(dir.path().join("logs.jsonl"));
        log.append(&entry("x", None)).unwrap();
        log.clear().unwrap();
        log.clear().unwrap();
        assert!(log.entries().unwrap().is_empty());
    }
}
