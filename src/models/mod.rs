pub mod behavior;
pub mod target;

pub use behavior::{BehaviorLogEntry, RunSummary, BEHAVIOR_TIME_FORMAT};
pub use target::{MonitorTarget, SLOT_COUNT};
