//! WGL backend.

use std::ffi::{c_void, CString};
use std::mem;

use tracing::{debug, trace, warn};
use windows::core::{s, PCSTR};
use windows::Win32::Foundation::{GetLastError, HMODULE, HWND, RECT};
use windows::Win32::Graphics::Gdi::{
    CreatePalette, DeleteObject, GetDC, GetDeviceCaps, GetStockObject, RealizePalette, ReleaseDC,
    SelectPalette, BITSPIXEL, DEFAULT_PALETTE, HDC, HGDIOBJ, HPALETTE, LOGPALETTE, PALETTEENTRY,
};
use windows::Win32::Graphics::OpenGL::{
    wglCreateContext, wglDeleteContext, wglGetCurrentContext, wglGetProcAddress, wglMakeCurrent,
    wglShareLists, ChoosePixelFormat, DescribePixelFormat, SetPixelFormat, HGLRC,
    PFD_DOUBLEBUFFER, PFD_DRAW_TO_WINDOW, PFD_MAIN_PLANE, PFD_NEED_PALETTE, PFD_SUPPORT_GDI,
    PFD_SUPPORT_OPENGL, PFD_TYPE_RGBA, PIXELFORMATDESCRIPTOR,
};
use windows::Win32::System::LibraryLoader::{GetProcAddress, LoadLibraryA};
use windows::Win32::UI::WindowsAndMessaging::{
    GetClientRect, SetWindowPos, SWP_NOACTIVATE, SWP_NOMOVE, SWP_NOZORDER,
};

use crate::backend::{Drawable, NativeSurfaceBackend};
use crate::error::NativeError;
use crate::gl::GlowCommands;
use crate::handle::{NativeHandle, Platform};
use crate::pixel_format::{self, FormatCandidate};
use crate::types::{FormatRequest, PixelFormat, Rgba, WindowDescriptor};

/// [`NativeSurfaceBackend`] over GDI pixel formats and WGL contexts.
#[derive(Debug, Default)]
pub struct Win32Backend;

impl Win32Backend {
    pub fn new() -> Self {
        Self
    }

    fn probe(&self, hdc: HDC, candidate: FormatCandidate) -> Option<PixelFormat> {
        let descriptor = requested_descriptor(candidate);
        let index = unsafe { ChoosePixelFormat(hdc, &descriptor) };
        if index == 0 {
            return None;
        }
        describe(hdc, index)
    }

    fn proc_address(&self, opengl32: Option<HMODULE>, name: &str) -> *const c_void {
        let Ok(name) = CString::new(name) else {
            return std::ptr::null();
        };
        let symbol = PCSTR(name.as_ptr().cast());
        let entry = unsafe { wglGetProcAddress(symbol) }
            .map(|entry| entry as usize)
            .filter(|&addr| !matches!(addr as isize, -1 | 0 | 1 | 2 | 3));
        match entry {
            Some(addr) => addr as *const c_void,
            // GL 1.1 entry points are only exported by opengl32.dll itself.
            None => opengl32
                .and_then(|module| unsafe { GetProcAddress(module, symbol) })
                .map_or(std::ptr::null(), |entry| entry as *const c_void),
        }
    }
}

fn last_error() -> i64 {
    i64::from(unsafe { GetLastError() }.0)
}

fn wgl_error(what: &str, err: windows::core::Error) -> NativeError {
    let code = match last_error() {
        0 => i64::from(err.code().0),
        code => code,
    };
    NativeError::new(code, format!("{what}: {}", err.message()))
}

fn hwnd(handle: &NativeHandle) -> Result<HWND, NativeError> {
    handle.ptr_for(Platform::Win32).map(HWND)
}

fn hdc(drawable: &Drawable) -> Result<HDC, NativeError> {
    drawable
        .device
        .ok_or_else(|| NativeError::new(0, "drawable has no device context"))?
        .ptr_for(Platform::Win32)
        .map(HDC)
}

fn hglrc(handle: &NativeHandle) -> Result<HGLRC, NativeError> {
    handle.ptr_for(Platform::Win32).map(HGLRC)
}

fn requested_descriptor(candidate: FormatCandidate) -> PIXELFORMATDESCRIPTOR {
    let mut flags = PFD_SUPPORT_OPENGL | PFD_DRAW_TO_WINDOW;
    if candidate.double_buffer {
        flags |= PFD_DOUBLEBUFFER;
    } else {
        flags |= PFD_SUPPORT_GDI;
    }
    PIXELFORMATDESCRIPTOR {
        nSize: mem::size_of::<PIXELFORMATDESCRIPTOR>() as u16,
        nVersion: 1,
        dwFlags: flags,
        iPixelType: PFD_TYPE_RGBA,
        cColorBits: candidate.color_bits,
        cDepthBits: candidate.depth_bits,
        iLayerType: PFD_MAIN_PLANE.0 as u8,
        ..Default::default()
    }
}

/// `LOGPALETTE` with room for a full 8-bit palette.
#[repr(C)]
struct LogPalette256 {
    version: u16,
    entries: u16,
    colors: [PALETTEENTRY; 256],
}

fn channel_level(index: usize, shift: u8, bits: u8) -> u8 {
    if bits == 0 || bits >= 8 {
        return 0;
    }
    let max = (1u32 << bits) - 1;
    let level = (index as u32 >> shift) & max;
    (level * 255 / max) as u8
}

/// Builds, selects and realizes the RGB palette `descriptor` lays out.
fn realize_palette(hdc: HDC, descriptor: &PIXELFORMATDESCRIPTOR) -> Result<HPALETTE, NativeError> {
    let count = 1usize << descriptor.cColorBits.min(8);
    let mut palette = LogPalette256 {
        version: 0x300,
        entries: count as u16,
        colors: [PALETTEENTRY::default(); 256],
    };
    for (index, entry) in palette.colors.iter_mut().take(count).enumerate() {
        entry.peRed = channel_level(index, descriptor.cRedShift, descriptor.cRedBits);
        entry.peGreen = channel_level(index, descriptor.cGreenShift, descriptor.cGreenBits);
        entry.peBlue = channel_level(index, descriptor.cBlueShift, descriptor.cBlueBits);
    }

    unsafe {
        let handle = CreatePalette(&palette as *const LogPalette256 as *const LOGPALETTE);
        if handle.is_invalid() {
            return Err(NativeError::new(last_error(), "CreatePalette failed"));
        }
        SelectPalette(hdc, handle, false);
        RealizePalette(hdc);
        Ok(handle)
    }
}

fn describe(hdc: HDC, index: i32) -> Option<PixelFormat> {
    let mut descriptor = PIXELFORMATDESCRIPTOR::default();
    let described = unsafe {
        DescribePixelFormat(
            hdc,
            index,
            mem::size_of::<PIXELFORMATDESCRIPTOR>() as u32,
            Some(&mut descriptor),
        )
    };
    if described == 0 {
        return None;
    }
    let flags = descriptor.dwFlags.0;
    Some(PixelFormat {
        id: u64::try_from(index).ok()?,
        color_bits: descriptor.cColorBits,
        depth_bits: descriptor.cDepthBits,
        double_buffer: flags & PFD_DOUBLEBUFFER.0 != 0,
        needs_palette: flags & PFD_NEED_PALETTE.0 != 0,
    })
}

impl NativeSurfaceBackend for Win32Backend {
    type Commands = GlowCommands;

    fn platform(&self) -> Platform {
        Platform::Win32
    }

    fn last_error(&self) -> i64 {
        last_error()
    }

    fn attach_window(&self, descriptor: &WindowDescriptor) -> Result<Drawable, NativeError> {
        let window = hwnd(&descriptor.parent)?;
        let dc = unsafe { GetDC(Some(window)) };
        let device = NativeHandle::from_ptr(Platform::Win32, dc.0)
            .ok_or_else(|| NativeError::new(last_error(), "GetDC returned no device context"))?;
        let depth = unsafe { GetDeviceCaps(Some(dc), BITSPIXEL) };
        trace!(parent = ?descriptor.parent, ?device, depth, "acquired device context");
        Ok(Drawable {
            device: Some(device),
            ..Drawable::parent_only(descriptor.parent, u8::try_from(depth).unwrap_or(u8::MAX))
        })
    }

    fn choose_pixel_format(&self, drawable: &Drawable, request: &FormatRequest) -> Option<PixelFormat> {
        let hdc = hdc(drawable).ok()?;
        pixel_format::search(request.double_buffer, |candidate| self.probe(hdc, candidate))
    }

    fn apply_pixel_format(&self, drawable: Drawable, format: &PixelFormat) -> Result<Drawable, NativeError> {
        let hdc = hdc(&drawable)?;
        let index = i32::try_from(format.id)
            .map_err(|_| NativeError::new(0, format!("pixel format index {} out of range", format.id)))?;
        let mut descriptor = PIXELFORMATDESCRIPTOR::default();
        unsafe {
            DescribePixelFormat(
                hdc,
                index,
                mem::size_of::<PIXELFORMATDESCRIPTOR>() as u32,
                Some(&mut descriptor),
            );
            SetPixelFormat(hdc, index, &descriptor).map_err(|err| wgl_error("SetPixelFormat", err))?;
        }
        if descriptor.dwFlags.0 & PFD_NEED_PALETTE.0 == 0 {
            return Ok(drawable);
        }
        match realize_palette(hdc, &descriptor) {
            Ok(palette) => {
                debug!(index, "realized logical palette");
                Ok(Drawable {
                    palette: NativeHandle::from_ptr(Platform::Win32, palette.0),
                    ..drawable
                })
            }
            Err(err) => {
                warn!(index, error = %err, "palette format without a palette; colours may be wrong");
                Ok(drawable)
            }
        }
    }

    fn create_context(
        &self,
        drawable: &Drawable,
        _format: &PixelFormat,
        _share: Option<&NativeHandle>,
    ) -> Result<NativeHandle, NativeError> {
        let hdc = hdc(drawable)?;
        let context = unsafe { wglCreateContext(hdc) }.map_err(|err| wgl_error("wglCreateContext", err))?;
        NativeHandle::from_ptr(Platform::Win32, context.0)
            .ok_or_else(|| NativeError::new(last_error(), "wglCreateContext returned no context"))
    }

    fn share_context(&self, share: &NativeHandle, context: &NativeHandle) -> Result<(), NativeError> {
        unsafe { wglShareLists(hglrc(share)?, hglrc(context)?) }
            .map_err(|err| wgl_error("wglShareLists", err))
    }

    fn realize_drawable(
        &self,
        drawable: Drawable,
        _format: &PixelFormat,
        _background: Rgba,
        _width: u32,
        _height: u32,
    ) -> Result<Drawable, NativeError> {
        // The pixel format was set on the parent's own device context.
        Ok(drawable)
    }

    fn make_current(&self, drawable: &Drawable, context: &NativeHandle) -> bool {
        let (Ok(hdc), Ok(context)) = (hdc(drawable), hglrc(context)) else {
            return false;
        };
        unsafe { wglMakeCurrent(hdc, context) }.is_ok()
    }

    fn query_geometry(&self, drawable: &Drawable) -> Option<(u32, u32)> {
        let window = hwnd(&drawable.window).ok()?;
        let mut rect = RECT::default();
        unsafe { GetClientRect(window, &mut rect) }.ok()?;
        Some((
            u32::try_from(rect.right - rect.left).unwrap_or(0),
            u32::try_from(rect.bottom - rect.top).unwrap_or(0),
        ))
    }

    fn resize_drawable(&self, drawable: &Drawable, width: u32, height: u32) -> Result<(), NativeError> {
        let window = hwnd(&drawable.window)?;
        unsafe {
            SetWindowPos(
                window,
                None,
                0,
                0,
                i32::try_from(width).unwrap_or(i32::MAX),
                i32::try_from(height).unwrap_or(i32::MAX),
                SWP_NOMOVE | SWP_NOZORDER | SWP_NOACTIVATE,
            )
        }
        .map_err(|err| wgl_error("SetWindowPos", err))
    }

    fn destroy_context(&self, _drawable: &Drawable, context: &NativeHandle) {
        let Ok(context) = hglrc(context) else {
            return;
        };
        unsafe {
            if wglGetCurrentContext() == context {
                let _ = wglMakeCurrent(HDC::default(), HGLRC::default());
            }
            if let Err(err) = wglDeleteContext(context) {
                debug!(error = %err, "wglDeleteContext failed");
            }
        }
    }

    fn can_destroy_context(&self) -> bool {
        !unsafe { wglGetCurrentContext() }.0.is_null()
    }

    fn release_drawable(&self, drawable: &Drawable) {
        let (Ok(window), Ok(hdc)) = (hwnd(&drawable.window), hdc(drawable)) else {
            return;
        };
        unsafe {
            if let Some(palette) = drawable.palette.and_then(|p| p.ptr_for(Platform::Win32).ok()) {
                SelectPalette(hdc, HPALETTE(GetStockObject(DEFAULT_PALETTE).0), false);
                let _ = DeleteObject(HGDIOBJ(palette));
            }
            ReleaseDC(Some(window), hdc);
        }
    }

    fn load_commands(&self, drawable: &Drawable, context: &NativeHandle) -> Result<GlowCommands, NativeError> {
        if !self.make_current(drawable, context) {
            return Err(NativeError::new(last_error(), "wglMakeCurrent failed"));
        }
        let opengl32 = unsafe { LoadLibraryA(s!("opengl32.dll")) }.ok();
        unsafe { GlowCommands::load(|name| self.proc_address(opengl32, name)) }
    }
}
