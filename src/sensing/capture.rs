use anyhow::{bail, Context, Result};
use image::{ImageFormat, RgbaImage};
use std::{
    fs,
    path::{Path, PathBuf},
};
use thiserror::Error;

use super::{locator::locate, DesktopBackend, WindowHandle};

const ENABLE_LOGS: bool = true;

use crate::{log_info, log_warn};

/// Why a target produced no image this run.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CaptureFailure {
    #[error("no visible window for {0}")]
    WindowNotFound(String),
    #[error("window is minimized")]
    WindowMinimized,
    #[error("primary capture failed: {0}")]
    PrimaryFailed(String),
    #[error("fallback capture failed: {fallback} (primary: {primary})")]
    FallbackFailed { primary: String, fallback: String },
}

/// Result of trying one target in one run. Never persisted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CaptureOutcome {
    pub target_id: u8,
    pub result: Result<PathBuf, CaptureFailure>,
}

impl CaptureOutcome {
    pub fn is_success(&self) -> bool {
        self.result.is_ok()
    }

    pub fn image_path(&self) -> Option<&Path> {
        self.result.as_deref().ok()
    }
}

/// Off-screen render of `window`. A minimized window has nothing to render
/// and is rejected before the back end is asked.
pub fn capture(
    backend: &dyn DesktopBackend,
    window: WindowHandle,
) -> Result<RgbaImage, CaptureFailure> {
    if backend.is_minimized(window) {
        return Err(CaptureFailure::WindowMinimized);
    }

    backend
        .render_window(window)
        .map_err(|err| CaptureFailure::PrimaryFailed(format!("{err:#}")))
}

/// Encode `image` as PNG at `path`, creating parent directories.
pub fn save_png(image: &RgbaImage, path: &Path) -> Result<PathBuf> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)
            .with_context(|| format!("failed to create {}", parent.display()))?;
    }
    image
        .save_with_format(path, ImageFormat::Png)
        .with_context(|| format!("failed to write PNG {}", path.display()))?;
    Ok(path.to_path_buf())
}

/// Capture `window` into `file_path`: the off-screen render first, then the
/// screen-region grab if the render or its encoding fails.
pub fn capture_to_file(
    backend: &dyn DesktopBackend,
    window: WindowHandle,
    file_path: &Path,
) -> Result<PathBuf, CaptureFailure> {
    let primary = capture(backend, window).and_then(|image| {
        save_png(&image, file_path).map_err(|err| CaptureFailure::PrimaryFailed(format!("{err:#}")))
    });

    let primary_reason = match primary {
        Ok(path) => return Ok(path),
        Err(CaptureFailure::PrimaryFailed(reason)) => reason,
        Err(other) => return Err(other),
    };

    log_warn!("Off-screen render of {:?} failed ({primary_reason}); grabbing screen region", window);

    backend
        .grab_screen_region(window)
        .and_then(|image| save_png(&image, file_path))
        .map_err(|err| CaptureFailure::FallbackFailed {
            primary: primary_reason,
            fallback: format!("{err:#}"),
        })
}

/// Locate the window of `exe_path` and capture it into `file_path`.
pub fn take_window_screenshot(
    backend: &dyn DesktopBackend,
    exe_path: &str,
    file_path: &Path,
) -> Result<PathBuf, CaptureFailure> {
    let window = locate(backend, exe_path)
        .ok_or_else(|| CaptureFailure::WindowNotFound(exe_path.to_string()))?;
    let saved = capture_to_file(backend, window, file_path)?;
    log_info!("Captured {exe_path} to {}", saved.display());
    Ok(saved)
}

/// Build an RGBA frame from a top-down 32bpp BGRA buffer as GDI returns it.
/// GDI leaves the fourth byte undefined, so alpha is forced opaque.
pub fn frame_from_bgra(width: u32, height: u32, mut pixels: Vec<u8>) -> Result<RgbaImage> {
    let expected = width as usize * height as usize * 4;
    if pixels.len() != expected {
        bail!(
            "pixel buffer is {} bytes, expected {expected} for {width}x{height}",
            pixels.len()
        );
    }

    for px in pixels.chunks_exact_mut(4) {
        px.swap(0, 2);
        px[3] = u8::MAX;
    }

    RgbaImage::from_raw(width, height, pixels).context("pixel buffer does not match frame size")
}
