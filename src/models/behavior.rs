use serde::{Deserialize, Serialize};

/// Minute precision, local time. All entries appended by one run share it.
pub const BEHAVIOR_TIME_FORMAT: &str = "%Y-%m-%d %H:%M";

/// One analysis-derived description of what the user was doing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BehaviorLogEntry {
    pub time: String,
    pub behavior: String,
}

impl BehaviorLogEntry {
    pub fn new(time: impl Into<String>, behavior: impl Into<String>) -> Self {
        Self {
            time: time.into(),
            behavior: behavior.into(),
        }
    }
}

/// What a manual or timer-driven run hands back to its caller.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RunSummary {
    /// The behavior log was empty, so the user is told capture is not working.
    pub warned_empty: bool,
    /// Reply of the synthesis call; empty when that call failed.
    pub summary_text: String,
}
