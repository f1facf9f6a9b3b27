pub mod controller;
pub mod state;

pub use controller::{
    MonitorRun, RunCompleted, Scheduler, TimerLoop, DEFAULT_POLL_INTERVAL,
};
pub use state::{SchedulerState, SchedulerStatus, TriggerSource};
