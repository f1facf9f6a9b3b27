//! Scripted desktop for tests.

use anyhow::{anyhow, bail, Result};
use image::{Rgba, RgbaImage};
use std::{
    ops::ControlFlow,
    path::PathBuf,
    sync::atomic::{AtomicUsize, Ordering},
};

use super::{DesktopBackend, WindowHandle};

#[derive(Debug, Clone)]
pub struct FakeWindow {
    pub handle: WindowHandle,
    pub visible: bool,
    /// `None` models a process we are not allowed to open.
    pub exe: Option<PathBuf>,
    pub minimized: bool,
    pub render_ok: bool,
    pub grab_ok: bool,
}

impl FakeWindow {
    pub fn app(handle: isize, exe: &str) -> Self {
        Self {
            handle: WindowHandle(handle),
            visible: true,
            exe: Some(PathBuf::from(exe)),
            minimized: false,
            render_ok: true,
            grab_ok: true,
        }
    }

    pub fn access_denied(handle: isize) -> Self {
        Self {
            exe: None,
            ..Self::app(handle, "")
        }
    }

    pub fn hidden(mut self) -> Self {
        self.visible = false;
        self
    }

    pub fn minimized(mut self) -> Self {
        self.minimized = true;
        self
    }

    pub fn render_fails(mut self) -> Self {
        self.render_ok = false;
        self
    }

    pub fn grab_fails(mut self) -> Self {
        self.grab_ok = false;
        self
    }
}

pub struct FakeDesktop {
    windows: Vec<FakeWindow>,
    enumeration_fails: bool,
    visited: AtomicUsize,
    render_calls: AtomicUsize,
    grab_calls: AtomicUsize,
}

impl FakeDesktop {
    pub fn new(windows: Vec<FakeWindow>) -> Self {
        Self {
            windows,
            enumeration_fails: false,
            visited: AtomicUsize::new(0),
            render_calls: AtomicUsize::new(0),
            grab_calls: AtomicUsize::new(0),
        }
    }

    pub fn failing_enumeration(mut self) -> Self {
        self.enumeration_fails = true;
        self
    }

    pub fn visited(&self) -> usize {
        self.visited.load(Ordering::SeqCst)
    }

    pub fn render_calls(&self) -> usize {
        self.render_calls.load(Ordering::SeqCst)
    }

    pub fn grab_calls(&self) -> usize {
        self.grab_calls.load(Ordering::SeqCst)
    }

    fn window(&self, handle: WindowHandle) -> Result<&FakeWindow> {
        self.windows
            .iter()
            .find(|w| w.handle == handle)
            .ok_or_else(|| anyhow!("no such window {handle:?}"))
    }
}

/// 4x3 frame filled with one colour, so tests can tell the two techniques
/// apart by pixel value.
pub fn solid_frame(value: u8) -> RgbaImage {
    RgbaImage::from_pixel(4, 3, Rgba([value, value, value, 255]))
}

pub const RENDERED_SHADE: u8 = 200;
pub const GRABBED_SHADE: u8 = 100;

impl DesktopBackend for FakeDesktop {
    fn for_each_window(
        &self,
        visit: &mut dyn FnMut(WindowHandle) -> ControlFlow<()>,
    ) -> Result<()> {
        if self.enumeration_fails {
            bail!("EnumWindows failed");
        }
        for window in &self.windows {
            self.visited.fetch_add(1, Ordering::SeqCst);
            if visit(window.handle).is_break() {
                break;
            }
        }
        Ok(())
    }

    fn is_visible(&self, window: WindowHandle) -> bool {
        self.window(window).map(|w| w.visible).unwrap_or(false)
    }

    fn owner_image_path(&self, window: WindowHandle) -> Result<PathBuf> {
        self.window(window)?
            .exe
            .clone()
            .ok_or_else(|| anyhow!("OpenProcess: access is denied"))
    }

    fn is_minimized(&self, window: WindowHandle) -> bool {
        self.window(window).map(|w| w.minimized).unwrap_or(false)
    }

    fn render_window(&self, window: WindowHandle) -> Result<RgbaImage> {
        self.render_calls.fetch_add(1, Ordering::SeqCst);
        if self.window(window)?.render_ok {
            Ok(solid_frame(RENDERED_SHADE))
        } else {
            bail!("PrintWindow returned FALSE")
        }
    }

    fn grab_screen_region(&self, window: WindowHandle) -> Result<RgbaImage> {
        self.grab_calls.fetch_add(1, Ordering::SeqCst);
        if self.window(window)?.grab_ok {
            Ok(solid_frame(GRABBED_SHADE))
        } else {
            bail!("BitBlt failed")
        }
    }
}
