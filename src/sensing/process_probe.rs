use sysinfo::{ProcessRefreshKind, ProcessesToUpdate, System, UpdateKind};

use super::locator::normalize_exe_path;

/// Whether any running process has `exe_path` as its image.
///
/// Only used to explain a miss: "not running" and "running without a visible
/// window" call for different fixes by the user.
pub fn is_process_running(exe_path: &str) -> bool {
    let target = normalize_exe_path(exe_path);
    if target.is_empty() {
        return false;
    }

    let mut system = System::new();
    system.refresh_processes_specifics(
        ProcessesToUpdate::All,
        ProcessRefreshKind::new().with_exe(UpdateKind::OnlyIfNotSet),
    );

    system.processes().values().any(|process| {
        process
            .exe()
            .map(|exe| normalize_exe_path(&exe.to_string_lossy()) == target)
            .unwrap_or(false)
    })
}
