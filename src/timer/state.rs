use chrono::{DateTime, Local};
use serde::Serialize;

#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub enum SchedulerStatus {
    Idle,
    Running,
}

impl Default for SchedulerStatus {
    fn default() -> Self {
        SchedulerStatus::Idle
    }
}

#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub enum TriggerSource {
    Manual,
    Timer,
}

#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SchedulerState {
    pub status: SchedulerStatus,
    /// Who started the run in flight, if any.
    pub current_trigger: Option<TriggerSource>,
    pub started_at: Option<DateTime<Local>>,
    pub last_finished_at: Option<DateTime<Local>>,
    pub completed_runs: u64,
}

impl SchedulerState {
    pub fn new() -> Self {
        Self::default()
    }

    /// `Idle → Running`. Returns false, leaving the state alone, when a run
    /// is already in flight.
    pub fn begin_run(&mut self, source: TriggerSource, now: DateTime<Local>) -> bool {
        if self.status == SchedulerStatus::Running {
            return false;
        }
        self.status = SchedulerStatus::Running;
        self.current_trigger = Some(source);
        self.started_at = Some(now);
        true
    }

    pub fn finish_run(&mut self, now: DateTime<Local>) {
        self.status = SchedulerStatus::Idle;
        self.current_trigger = None;
        self.started_at = None;
        self.last_finished_at = Some(now);
        self.completed_runs = self.completed_runs.saturating_add(1);
    }
}
