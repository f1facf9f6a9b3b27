//! Win32 implementation of [`DesktopBackend`].
//!
//! Every GDI object and process handle acquired here is owned by a small
//! guard type whose `Drop` releases it, so early returns never leak.

use anyhow::{bail, Context, Result};
use image::RgbaImage;
use std::{ffi::c_void, ops::ControlFlow, path::PathBuf};

use windows::core::PWSTR;
use windows::Win32::Foundation::{CloseHandle, BOOL, FALSE, HANDLE, HWND, LPARAM, RECT, TRUE};
use windows::Win32::Graphics::Gdi::{
    BitBlt, CreateCompatibleBitmap, CreateCompatibleDC, DeleteDC, DeleteObject, GetDC, GetDIBits,
    GetWindowDC, ReleaseDC, SelectObject, BITMAPINFO, BITMAPINFOHEADER, BI_RGB, DIB_RGB_COLORS,
    HBITMAP, HDC, HGDIOBJ, SRCCOPY,
};
use windows::Win32::Storage::Xps::{PrintWindow, PRINT_WINDOW_FLAGS};
use windows::Win32::System::Threading::{
    OpenProcess, QueryFullProcessImageNameW, PROCESS_NAME_FORMAT,
    PROCESS_QUERY_LIMITED_INFORMATION,
};
use windows::Win32::UI::WindowsAndMessaging::{
    EnumWindows, GetWindowRect, GetWindowThreadProcessId, IsIconic, IsWindowVisible,
};

use crate::sensing::{capture::frame_from_bgra, DesktopBackend, WindowHandle};

// Renders DirectComposition content (browsers, UWP) instead of a black frame.
const PW_RENDERFULLCONTENT: PRINT_WINDOW_FLAGS = PRINT_WINDOW_FLAGS(2);
// Long-path aware buffer for QueryFullProcessImageNameW.
const IMAGE_PATH_CAPACITY: usize = 1024;

pub struct Win32Backend;

impl DesktopBackend for Win32Backend {
    fn for_each_window(
        &self,
        visit: &mut dyn FnMut(WindowHandle) -> ControlFlow<()>,
    ) -> Result<()> {
        let mut state = EnumState {
            visit,
            stopped: false,
        };
        let result = unsafe {
            EnumWindows(
                Some(enum_windows_cb),
                LPARAM(&mut state as *mut EnumState<'_> as isize),
            )
        };

        // EnumWindows reports failure when the callback stops it early.
        match result {
            Err(_) if state.stopped => Ok(()),
            other => other.context("EnumWindows failed"),
        }
    }

    fn is_visible(&self, window: WindowHandle) -> bool {
        unsafe { IsWindowVisible(hwnd(window)).as_bool() }
    }

    fn owner_image_path(&self, window: WindowHandle) -> Result<PathBuf> {
        let mut pid: u32 = 0;
        unsafe { GetWindowThreadProcessId(hwnd(window), Some(&mut pid)) };
        if pid == 0 {
            bail!("window {:#x} has no owning process", window.0);
        }

        let process = ProcessHandle::open(pid)?;
        let mut buf = vec![0u16; IMAGE_PATH_CAPACITY];
        let mut len = buf.len() as u32;
        unsafe {
            QueryFullProcessImageNameW(
                process.0,
                PROCESS_NAME_FORMAT(0),
                PWSTR(buf.as_mut_ptr()),
                &mut len,
            )
        }
        .with_context(|| format!("QueryFullProcessImageNameW failed for pid {pid}"))?;

        Ok(PathBuf::from(String::from_utf16_lossy(&buf[..len as usize])))
    }

    fn is_minimized(&self, window: WindowHandle) -> bool {
        unsafe { IsIconic(hwnd(window)).as_bool() }
    }

    fn render_window(&self, window: WindowHandle) -> Result<RgbaImage> {
        let target = hwnd(window);
        let (_, width, height) = window_rect(target)?;
        let window_dc = WindowDc::of_window(target)?;

        copy_via_bitmap(window_dc.dc, width, height, |memory_dc| {
            let printed = unsafe { PrintWindow(target, memory_dc, PW_RENDERFULLCONTENT) };
            if !printed.as_bool() {
                bail!("PrintWindow failed");
            }
            Ok(())
        })
    }

    fn grab_screen_region(&self, window: WindowHandle) -> Result<RgbaImage> {
        let (rect, width, height) = window_rect(hwnd(window))?;
        let screen_dc = WindowDc::of_screen()?;

        copy_via_bitmap(screen_dc.dc, width, height, |memory_dc| {
            unsafe {
                BitBlt(
                    memory_dc,
                    0,
                    0,
                    width,
                    height,
                    screen_dc.dc,
                    rect.left,
                    rect.top,
                    SRCCOPY,
                )
            }
            .context("BitBlt from screen failed")
        })
    }
}

fn hwnd(window: WindowHandle) -> HWND {
    HWND(window.0 as *mut c_void)
}

struct EnumState<'a> {
    visit: &'a mut dyn FnMut(WindowHandle) -> ControlFlow<()>,
    stopped: bool,
}

unsafe extern "system" fn enum_windows_cb(window: HWND, lparam: LPARAM) -> BOOL {
    let state = &mut *(lparam.0 as *mut EnumState<'_>);
    match (state.visit)(WindowHandle(window.0 as isize)) {
        ControlFlow::Continue(()) => TRUE,
        ControlFlow::Break(()) => {
            state.stopped = true;
            FALSE
        }
    }
}

/// Window rectangle plus its width and height, which must both be positive.
fn window_rect(window: HWND) -> Result<(RECT, i32, i32)> {
    let mut rect = RECT::default();
    unsafe { GetWindowRect(window, &mut rect) }.context("GetWindowRect failed")?;

    let width = rect.right - rect.left;
    let height = rect.bottom - rect.top;
    if width <= 0 || height <= 0 {
        bail!("window has empty rectangle {width}x{height}");
    }
    Ok((rect, width, height))
}

/// Draw into a bitmap compatible with `source_dc`, then read it back as RGBA.
fn copy_via_bitmap<F>(source_dc: HDC, width: i32, height: i32, draw: F) -> Result<RgbaImage>
where
    F: FnOnce(HDC) -> Result<()>,
{
    let memory = MemoryDc::compatible_with(source_dc)?;
    let bitmap = Bitmap::compatible_with(source_dc, width, height)?;

    {
        let _selected = Selection::select(memory.0, HGDIOBJ(bitmap.0 .0))?;
        draw(memory.0)?;
    }

    read_pixels(memory.0, &bitmap, width, height)
}

fn read_pixels(dc: HDC, bitmap: &Bitmap, width: i32, height: i32) -> Result<RgbaImage> {
    let mut info = BITMAPINFO {
        bmiHeader: BITMAPINFOHEADER {
            biSize: std::mem::size_of::<BITMAPINFOHEADER>() as u32,
            biWidth: width,
            // Negative height asks for top-down rows.
            biHeight: -height,
            biPlanes: 1,
            biBitCount: 32,
            biCompression: BI_RGB.0,
            ..Default::default()
        },
        ..Default::default()
    };

    let mut pixels = vec![0u8; width as usize * height as usize * 4];
    let lines = unsafe {
        GetDIBits(
            dc,
            bitmap.0,
            0,
            height as u32,
            Some(pixels.as_mut_ptr() as *mut c_void),
            &mut info,
            DIB_RGB_COLORS,
        )
    };
    if lines != height {
        bail!("GetDIBits copied {lines} of {height} scan lines");
    }

    frame_from_bgra(width as u32, height as u32, pixels)
}

struct ProcessHandle(HANDLE);

impl ProcessHandle {
    fn open(pid: u32) -> Result<Self> {
        let handle = unsafe { OpenProcess(PROCESS_QUERY_LIMITED_INFORMATION, FALSE, pid) }
            .with_context(|| format!("OpenProcess failed for pid {pid}"))?;
        Ok(Self(handle))
    }
}

impl Drop for ProcessHandle {
    fn drop(&mut self) {
        let _ = unsafe { CloseHandle(self.0) };
    }
}

/// A DC borrowed from a window (or the whole screen), given back on drop.
struct WindowDc {
    window: HWND,
    dc: HDC,
}

impl WindowDc {
    fn of_window(window: HWND) -> Result<Self> {
        let dc = unsafe { GetWindowDC(window) };
        if dc.is_invalid() {
            bail!("GetWindowDC failed");
        }
        Ok(Self { window, dc })
    }

    fn of_screen() -> Result<Self> {
        let window = HWND::default();
        let dc = unsafe { GetDC(window) };
        if dc.is_invalid() {
            bail!("GetDC for the screen failed");
        }
        Ok(Self { window, dc })
    }
}

impl Drop for WindowDc {
    fn drop(&mut self) {
        unsafe { ReleaseDC(self.window, self.dc) };
    }
}

struct MemoryDc(HDC);

impl MemoryDc {
    fn compatible_with(dc: HDC) -> Result<Self> {
        let memory = unsafe { CreateCompatibleDC(dc) };
        if memory.is_invalid() {
            bail!("CreateCompatibleDC failed");
        }
        Ok(Self(memory))
    }
}

impl Drop for MemoryDc {
    fn drop(&mut self) {
        let _ = unsafe { DeleteDC(self.0) };
    }
}

struct Bitmap(HBITMAP);

impl Bitmap {
    fn compatible_with(dc: HDC, width: i32, height: i32) -> Result<Self> {
        let bitmap = unsafe { CreateCompatibleBitmap(dc, width, height) };
        if bitmap.is_invalid() {
            bail!("CreateCompatibleBitmap failed for {width}x{height}");
        }
        Ok(Self(bitmap))
    }
}

impl Drop for Bitmap {
    fn drop(&mut self) {
        let _ = unsafe { DeleteObject(HGDIOBJ(self.0 .0)) };
    }
}

/// Puts the previously selected object back on drop.
struct Selection {
    dc: HDC,
    previous: HGDIOBJ,
}

impl Selection {
    fn select(dc: HDC, object: HGDIOBJ) -> Result<Self> {
        let previous = unsafe { SelectObject(dc, object) };
        if previous.is_invalid() {
            bail!("SelectObject failed");
        }
        Ok(Self { dc, previous })
    }
}

impl Drop for Selection {
    fn drop(&mut self) {
        unsafe { SelectObject(self.dc, self.previous) };
    }
}
