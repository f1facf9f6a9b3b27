use std::ops::ControlFlow;

use super::{DesktopBackend, WindowHandle};

const ENABLE_LOGS: bool = true;

use crate::{log_debug, log_warn};

/// First visible top-level window whose owning process runs `exe_path`.
///
/// Windows whose process cannot be opened or resolved are skipped. When one
/// executable owns several visible windows, the first one enumerated wins;
/// there is no attempt to pick the "main" one.
pub fn locate(backend: &dyn DesktopBackend, exe_path: &str) -> Option<WindowHandle> {
    let target = normalize_exe_path(exe_path);
    if target.is_empty() {
        return None;
    }

    let mut found = None;
    let scan = backend.for_each_window(&mut |window| {
        if !backend.is_visible(window) {
            return ControlFlow::Continue(());
        }

        match backend.owner_image_path(window) {
            Ok(path) if normalize_exe_path(&path.to_string_lossy()) == target => {
                found = Some(window);
                ControlFlow::Break(())
            }
            Ok(_) => ControlFlow::Continue(()),
            Err(err) => {
                log_debug!("Skipping window {:?}: {err:#}", window);
                ControlFlow::Continue(())
            }
        }
    });

    if let Err(err) = scan {
        // A partial scan still counts if it got as far as a match.
        log_warn!("Window enumeration failed while looking for {exe_path}: {err:#}");
    }

    found
}

/// Case-insensitive, separator-agnostic form of a Windows path.
///
/// `/` and `\` are equivalent, repeated separators collapse, `.` segments
/// disappear and `..` removes the previous segment (never the drive).
pub fn normalize_exe_path(raw: &str) -> String {
    let unified = raw.trim().replace('/', "\\");

    let (prefix, rest) = if let Some(rest) = unified.strip_prefix("\\\\") {
        ("\\\\", rest)
    } else if let Some(rest) = unified.strip_prefix('\\') {
        ("\\", rest)
    } else {
        ("", unified.as_str())
    };

    let mut parts: Vec<&str> = Vec::new();
    for part in rest.split('\\') {
        match part {
            "" | "." => {}
            ".." => match parts.last() {
                Some(last) if *last != ".." && !is_drive(last) => {
                    parts.pop();
                }
                Some(last) if is_drive(last) => {}
                _ if prefix.is_empty() => parts.push(".."),
                _ => {}
            },
            other => parts.push(other),
        }
    }

    format!("{prefix}{}", parts.join("\\")).to_lowercase()
}

fn is_drive(segment: &str) -> bool {
    segment.len() == 2 && segment.ends_with(':')
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sensing::fake::{FakeDesktop, FakeWindow};

    const NOTEPAD: &str = r"C:\Windows\System32\notepad.exe";

    #[test]
    fn normalization_ignores_case_and_separators() {
        assert_eq!(
            normalize_exe_path("C:/Program Files//App/APP.exe"),
            normalize_exe_path(r"c:\program files\app\app.EXE")
        );
        assert_eq!(normalize_exe_path(r"C:\a\.\b\..\app.exe"), r"c:\a\app.exe");
        assert_eq!(normalize_exe_path(r"C:\..\app.exe"), r"c:\app.exe");
        assert_eq!(
            normalize_exe_path(r"\\server\share\tool.exe"),
            r"\\server\share\tool.exe"
        );
        assert_eq!(normalize_exe_path("   "), "");
    }

    #[test]
    fn finds_first_visible_match() {
        let desktop = FakeDesktop::new(vec![
            FakeWindow::app(10, r"C:\Other\other.exe"),
            FakeWindow::app(11, NOTEPAD).hidden(),
            FakeWindow::app(12, "c:/windows/system32/NOTEPAD.EXE"),
            FakeWindow::app(13, NOTEPAD),
        ]);

        assert_eq!(locate(&desktop, NOTEPAD), Some(WindowHandle(12)));
        // Enumeration stops at the match.
        assert_eq!(desktop.visited(), 3);
    }

    #[test]
    fn unresolvable_processes_do_not_abort_the_scan() {
        let desktop = FakeDesktop::new(vec![
            FakeWindow::access_denied(20),
            FakeWindow::app(21, NOTEPAD),
        ]);

        assert_eq!(locate(&desktop, NOTEPAD), Some(WindowHandle(21)));
    }

    #[test]
    fn no_match_is_none_and_touches_nothing() {
        let desktop = FakeDesktop::new(vec![
            FakeWindow::app(30, r"C:\Other\other.exe"),
            FakeWindow::app(31, NOTEPAD).hidden(),
        ]);

        assert_eq!(locate(&desktop, NOTEPAD), None);
        assert_eq!(desktop.visited(), 2);
        assert_eq!(desktop.render_calls(), 0);
        assert_eq!(desktop.grab_calls(), 0);
    }

    #[test]
    fn empty_path_never_enumerates() {
        let desktop = FakeDesktop::new(vec![FakeWindow::app(40, NOTEPAD)]);
        assert_eq!(locate(&desktop, ""), None);
        assert_eq!(desktop.visited(), 0);
    }

    #[test]
    fn enumeration_failure_reads_as_not_found() {
        let desktop = FakeDesktop::new(vec![FakeWindow::app(50, NOTEPAD)]).failing_enumeration();
        assert_eq!(locate(&desktop, NOTEPAD), None);
    }
}
