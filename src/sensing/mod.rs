//! Window sensing: finding a target's window and turning it into pixels.
//!
//! Everything that talks to the window manager goes through
//! [`DesktopBackend`]. The Win32 implementation lives in `win_bridge`; other
//! platforms get [`UnsupportedBackend`], which sees no windows, so the
//! pipeline degrades to "nothing captured" instead of failing to build.

use anyhow::{bail, Result};
use image::RgbaImage;
use std::{ops::ControlFlow, path::PathBuf, sync::Arc};

pub mod capture;
pub mod locator;
pub mod orchestrator;
pub mod process_probe;

#[cfg(test)]
pub(crate) mod fake;

pub use capture::{CaptureFailure, CaptureOutcome};
pub use locator::locate;
pub use orchestrator::{MonitorPipeline, SYNTHESIS_TAIL_LEN};

/// Opaque top-level window identifier (an `HWND` on Windows).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct WindowHandle(pub isize);

pub trait DesktopBackend: Send + Sync {
    /// Visit top-level windows in enumeration (z-) order until `visit`
    /// breaks.
    fn for_each_window(
        &self,
        visit: &mut dyn FnMut(WindowHandle) -> ControlFlow<()>,
    ) -> Result<()>;

    fn is_visible(&self, window: WindowHandle) -> bool;

    /// Full image path of the process owning `window`.
    fn owner_image_path(&self, window: WindowHandle) -> Result<PathBuf>;

    fn is_minimized(&self, window: WindowHandle) -> bool;

    /// Off-screen render of the window, correct even when it is covered.
    fn render_window(&self, window: WindowHandle) -> Result<RgbaImage>;

    /// Copy of the screen area under the window's rectangle. May include
    /// whatever overlaps it.
    fn grab_screen_region(&self, window: WindowHandle) -> Result<RgbaImage>;
}

/// Back end for platforms without a supported window manager.
pub struct UnsupportedBackend;

impl DesktopBackend for UnsupportedBackend {
    fn for_each_window(
        &self,
        _visit: &mut dyn FnMut(WindowHandle) -> ControlFlow<()>,
    ) -> Result<()> {
        Ok(())
    }

    fn is_visible(&self, _window: WindowHandle) -> bool {
        false
    }

    fn owner_image_path(&self, _window: WindowHandle) -> Result<PathBuf> {
        bail!("window introspection is not supported on this platform")
    }

    fn is_minimized(&self, _window: WindowHandle) -> bool {
        false
    }

    fn render_window(&self, _window: WindowHandle) -> Result<RgbaImage> {
        bail!("window capture is not supported on this platform")
    }

    fn grab_screen_region(&self, _window: WindowHandle) -> Result<RgbaImage> {
        bail!("screen capture is not supported on this platform")
    }
}

/// The back end for the platform we were built for.
pub fn native_backend() -> Arc<dyn DesktopBackend> {
    #[cfg(windows)]
    {
        Arc::new(crate::win_bridge::Win32Backend)
    }

    #[cfg(not(windows))]
    {
        log::warn!("No window capture back end for this platform; targets will never be found");
        Arc::new(UnsupportedBackend)
    }
}
