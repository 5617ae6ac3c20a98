use std::fmt;
use std::num::NonZeroU64;

use raw_window_handle::RawWindowHandle;

use crate::error::NativeError;

/// Windowing system a native handle belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Platform {
    Win32,
    X11,
    /// In-memory backend used for tests and dry runs.
    Headless,
}

impl fmt::Display for Platform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Platform::Win32 => f.write_str("win32"),
            Platform::X11 => f.write_str("x11"),
            Platform::Headless => f.write_str("headless"),
        }
    }
}

/// Opaque native handle tagged with the platform it came from.
///
/// Window ids, device contexts and GL contexts are all carried as this type.
/// Backends unwrap the raw value with [`NativeHandle::raw_for`], which is the
/// only place a handle is checked against the platform that consumes it.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct NativeHandle {
    platform: Platform,
    raw: NonZeroU64,
}

impl NativeHandle {
    /// Wraps a raw handle value; zero (the null handle on every platform) yields `None`.
    pub fn new(platform: Platform, raw: u64) -> Option<Self> {
        NonZeroU64::new(raw).map(|raw| Self { platform, raw })
    }

    /// Wraps a pointer-shaped handle (`HWND`, `HDC`, `GLXContext`, ...).
    pub fn from_ptr<T>(platform: Platform, ptr: *mut T) -> Option<Self> {
        Self::new(platform, ptr as usize as u64)
    }

    /// Converts a window handle produced by a windowing toolkit.
    ///
    /// Only window systems with a backend are accepted: Xlib, XCB (same
    /// server-side window id) and Win32.
    pub fn from_raw_window(handle: RawWindowHandle) -> Option<Self> {
        match handle {
            RawWindowHandle::Xlib(xlib) => Self::new(Platform::X11, xlib.window as u64),
            RawWindowHandle::Xcb(xcb) => Self::new(Platform::X11, u64::from(xcb.window.get())),
            RawWindowHandle::Win32(win32) => Self::new(Platform::Win32, win32.hwnd.get() as u64),
            _ => None,
        }
    }

    pub fn platform(&self) -> Platform {
        self.platform
    }

    pub fn raw(&self) -> u64 {
        self.raw.get()
    }

    /// Returns the raw value if the handle belongs to `expected`.
    pub fn raw_for(&self, expected: Platform) -> Result<u64, NativeError> {
        if self.platform == expected {
            Ok(self.raw.get())
        } else {
            Err(NativeError::new(
                0,
                format!("{self:?} handed to the {expected} backend"),
            ))
        }
    }

    /// Pointer view of [`NativeHandle::raw_for`].
    pub fn ptr_for<T>(&self, expected: Platform) -> Result<*mut T, NativeError> {
        self.raw_for(expected).map(|raw| raw as usize as *mut T)
    }
}

impl fmt::Debug for NativeHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{:#x}", self.platform, self.raw)
    }
}
