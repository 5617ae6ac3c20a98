//! Xlib/GLX backend.
//!
//! The backend opens its own display connection; window ids are server-side,
//! so windows created through any other connection (a toolkit's, for
//! instance) can be attached. When the parent's visual cannot carry the
//! negotiated GLX visual a child window with its own colormap is created,
//! mapped, and waited for before any context is bound to it.

use std::ffi::{c_void, CString};
use std::os::raw::{c_char, c_int, c_uint, c_ulong};
use std::ptr;
use std::sync::atomic::{AtomicI64, Ordering};

use tracing::{debug, trace, warn};
use x11_dl::glx::{self, Glx};
use x11_dl::xlib::{self, Display, XEvent, XVisualInfo, XWindowAttributes, Xlib};

use crate::backend::{Drawable, NativeSurfaceBackend};
use crate::error::NativeError;
use crate::gl::GlowCommands;
use crate::handle::{NativeHandle, Platform};
use crate::types::{FormatRequest, PixelFormat, Rgba, WindowDescriptor};

static LAST_X_ERROR: AtomicI64 = AtomicI64::new(0);

unsafe extern "C" fn record_x_error(_display: *mut Display, event: *mut xlib::XErrorEvent) -> c_int {
    if let Some(event) = event.as_ref() {
        LAST_X_ERROR.store(i64::from(event.error_code), Ordering::Relaxed);
        warn!(
            error_code = event.error_code,
            request_code = event.request_code,
            resource = event.resourceid,
            "X protocol error"
        );
    }
    0
}

/// Window attributes for a child window painted in `pixel`, border included.
fn child_window_attributes(
    colormap: xlib::Colormap,
    pixel: c_ulong,
) -> (xlib::XSetWindowAttributes, c_ulong) {
    let mut attrs: xlib::XSetWindowAttributes = unsafe { std::mem::zeroed() };
    attrs.background_pixel = pixel;
    attrs.border_pixel = pixel;
    attrs.colormap = colormap;
    attrs.event_mask = xlib::StructureNotifyMask;
    let mask = xlib::CWBackPixel | xlib::CWBorderPixel | xlib::CWColormap | xlib::CWEventMask;
    (attrs, mask)
}

unsafe extern "C" fn is_map_notify(
    _display: *mut Display,
    event: *mut XEvent,
    window: *mut c_char,
) -> c_int {
    let event = &*event;
    c_int::from(event.get_type() == xlib::MapNotify && event.map.window == window as c_ulong)
}

/// [`NativeSurfaceBackend`] over Xlib and GLX, both loaded at runtime.
pub struct X11Backend {
    xlib: Xlib,
    glx: Glx,
    display: *mut Display,
}

impl std::fmt::Debug for X11Backend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("X11Backend")
            .field("display", &self.display)
            .finish_non_exhaustive()
    }
}

impl X11Backend {
    /// Connects to `display_name`, or `$DISPLAY` when `None`.
    pub fn open(display_name: Option<&str>) -> Result<Self, NativeError> {
        let xlib = Xlib::open().map_err(|err| NativeError::new(0, format!("loading libX11: {err}")))?;
        let glx = Glx::open().map_err(|err| NativeError::new(0, format!("loading libGL: {err}")))?;

        let name = display_name
            .map(CString::new)
            .transpose()
            .map_err(|err| NativeError::new(0, format!("invalid display name: {err}")))?;
        let display = unsafe {
            (xlib.XOpenDisplay)(name.as_ref().map_or(ptr::null(), |name| name.as_ptr()))
        };
        if display.is_null() {
            return Err(NativeError::new(
                0,
                format!("cannot open X display {}", display_name.unwrap_or("$DISPLAY")),
            ));
        }
        unsafe {
            (xlib.XSetErrorHandler)(Some(record_x_error));
        }
        debug!(display = display_name.unwrap_or("$DISPLAY"), "opened X display");

        Ok(Self { xlib, glx, display })
    }

    fn window_attributes(&self, window: c_ulong) -> Result<XWindowAttributes, NativeError> {
        let mut attrs: XWindowAttributes = unsafe { std::mem::zeroed() };
        let ok = unsafe { (self.xlib.XGetWindowAttributes)(self.display, window, &mut attrs) };
        if ok == 0 {
            return Err(NativeError::new(
                self.last_error(),
                format!("cannot read attributes of window {window:#x}"),
            ));
        }
        Ok(attrs)
    }

    fn parent_visual_id(&self, drawable: &Drawable) -> Result<c_ulong, NativeError> {
        let attrs = self.window_attributes(window_id(&drawable.parent)?)?;
        if attrs.visual.is_null() {
            return Err(NativeError::new(0, "parent window has no visual"));
        }
        Ok(unsafe { (*attrs.visual).visualid })
    }

    /// Copies the visual info for `visual_id` on the default screen.
    fn visual_info(&self, visual_id: c_ulong) -> Option<XVisualInfo> {
        unsafe {
            let mut template: XVisualInfo = std::mem::zeroed();
            template.visualid = visual_id;
            template.screen = (self.xlib.XDefaultScreen)(self.display);
            let mut count = 0;
            let found = (self.xlib.XGetVisualInfo)(
                self.display,
                xlib::VisualIDMask | xlib::VisualScreenMask,
                &mut template,
                &mut count,
            );
            if found.is_null() {
                return None;
            }
            let info = *found;
            (self.xlib.XFree)(found.cast());
            (count > 0).then_some(info)
        }
    }

    fn glx_attribute(&self, info: &mut XVisualInfo, attribute: c_int) -> c_int {
        let mut value = 0;
        unsafe {
            (self.glx.glXGetConfig)(self.display, info, attribute, &mut value);
        }
        value
    }

    fn describe(&self, info: &mut XVisualInfo) -> PixelFormat {
        let bits = |value: c_int| u8::try_from(value.max(0)).unwrap_or(u8::MAX);
        PixelFormat {
            id: u64::from(info.visualid),
            color_bits: bits(self.glx_attribute(info, glx::GLX_BUFFER_SIZE)),
            depth_bits: bits(self.glx_attribute(info, glx::GLX_DEPTH_SIZE)),
            double_buffer: self.glx_attribute(info, glx::GLX_DOUBLEBUFFER) != 0,
            needs_palette: false,
        }
    }

    /// The parent's own visual, if it already renders GL the way `request` asks.
    fn reusable_parent_visual(&self, drawable: &Drawable, request: &FormatRequest) -> Option<PixelFormat> {
        let visual_id = self.parent_visual_id(drawable).ok()?;
        let mut info = self.visual_info(visual_id)?;
        let renders_gl = self.glx_attribute(&mut info, glx::GLX_USE_GL) != 0
            && self.glx_attribute(&mut info, glx::GLX_RGBA) != 0
            && self.glx_attribute(&mut info, glx::GLX_DEPTH_SIZE) >= 1;
        if !renders_gl {
            return None;
        }
        Some(self.describe(&mut info)).filter(|format| format.meets(request))
    }

    fn proc_address(&self, name: &str) -> *const c_void {
        let Ok(name) = CString::new(name) else {
            return ptr::null();
        };
        unsafe { (self.glx.glXGetProcAddress)(name.as_ptr().cast()) }
            .map_or(ptr::null(), |entry| entry as *const c_void)
    }
}

impl Drop for X11Backend {
    fn drop(&mut self) {
        unsafe {
            (self.xlib.XCloseDisplay)(self.display);
        }
    }
}

fn window_id(handle: &NativeHandle) -> Result<c_ulong, NativeError> {
    handle.raw_for(Platform::X11).map(|raw| raw as c_ulong)
}

fn context_ptr(handle: &NativeHandle) -> Result<glx::GLXContext, NativeError> {
    handle.ptr_for(Platform::X11)
}

impl NativeSurfaceBackend for X11Backend {
    type Commands = GlowCommands;

    fn platform(&self) -> Platform {
        Platform::X11
    }

    fn last_error(&self) -> i64 {
        LAST_X_ERROR.load(Ordering::Relaxed)
    }

    fn attach_window(&self, descriptor: &WindowDescriptor) -> Result<Drawable, NativeError> {
        let attrs = self.window_attributes(window_id(&descriptor.parent)?)?;
        let depth = u8::try_from(attrs.depth).unwrap_or(u8::MAX);
        trace!(parent = ?descriptor.parent, depth, "attached X window");
        Ok(Drawable::parent_only(descriptor.parent, depth))
    }

    fn choose_pixel_format(&self, drawable: &Drawable, request: &FormatRequest) -> Option<PixelFormat> {
        if let Some(format) = self.reusable_parent_visual(drawable, request) {
            debug!(visual = format.id, "parent visual supports GL");
            return Some(format);
        }

        let channel = if drawable.parent_depth <= 8 { 0 } else { 1 };
        let mut attribs = vec![
            glx::GLX_RGBA,
            glx::GLX_DEPTH_SIZE,
            1,
            glx::GLX_RED_SIZE,
            channel,
            glx::GLX_GREEN_SIZE,
            channel,
            glx::GLX_BLUE_SIZE,
            channel,
        ];
        if request.double_buffer {
            attribs.push(glx::GLX_DOUBLEBUFFER);
        }
        attribs.push(0);

        unsafe {
            let screen = (self.xlib.XDefaultScreen)(self.display);
            let chosen = (self.glx.glXChooseVisual)(self.display, screen, attribs.as_mut_ptr());
            if chosen.is_null() {
                return None;
            }
            let format = self.describe(&mut *chosen);
            (self.xlib.XFree)(chosen.cast());
            Some(format)
        }
    }

    fn apply_pixel_format(&self, drawable: Drawable, _format: &PixelFormat) -> Result<Drawable, NativeError> {
        // Visuals are fixed per window; the child window carries the format.
        Ok(drawable)
    }

    fn create_context(
        &self,
        _drawable: &Drawable,
        format: &PixelFormat,
        share: Option<&NativeHandle>,
    ) -> Result<NativeHandle, NativeError> {
        let mut info = self
            .visual_info(format.id as c_ulong)
            .ok_or_else(|| NativeError::new(self.last_error(), format!("visual {:#x} vanished", format.id)))?;
        let share = share.map(context_ptr).transpose()?.unwrap_or(ptr::null_mut());
        let context =
            unsafe { (self.glx.glXCreateContext)(self.display, &mut info, share, xlib::True) };
        NativeHandle::from_ptr(Platform::X11, context)
            .ok_or_else(|| NativeError::new(self.last_error(), "glXCreateContext returned no context"))
    }

    fn share_context(&self, share: &NativeHandle, context: &NativeHandle) -> Result<(), NativeError> {
        // GLX links share lists when the context is created.
        trace!(?share, ?context, "share list linked at creation");
        Ok(())
    }

    fn realize_drawable(
        &self,
        drawable: Drawable,
        format: &PixelFormat,
        background: Rgba,
        width: u32,
        height: u32,
    ) -> Result<Drawable, NativeError> {
        let parent = window_id(&drawable.parent)?;
        if self.parent_visual_id(&drawable)? == format.id as c_ulong {
            return Ok(drawable);
        }

        let info = self
            .visual_info(format.id as c_ulong)
            .ok_or_else(|| NativeError::new(self.last_error(), format!("visual {:#x} vanished", format.id)))?;

        unsafe {
            let colormap = (self.xlib.XCreateColormap)(self.display, parent, info.visual, xlib::AllocNone);
            let [red, green, blue] = background.to_u16_rgb();
            let mut color = xlib::XColor {
                pixel: 0,
                red,
                green,
                blue,
                flags: xlib::DoRed | xlib::DoGreen | xlib::DoBlue,
                pad: 0,
            };
            (self.xlib.XAllocColor)(self.display, colormap, &mut color);

            let (mut attrs, mask) = child_window_attributes(colormap, color.pixel);

            let window = (self.xlib.XCreateWindow)(
                self.display,
                parent,
                0,
                0,
                width.max(1) as c_uint,
                height.max(1) as c_uint,
                0,
                info.depth,
                xlib::InputOutput as c_uint,
                info.visual,
                mask,
                &mut attrs,
            );
            if window == 0 {
                (self.xlib.XFreeColormap)(self.display, colormap);
                return Err(NativeError::new(self.last_error(), "XCreateWindow failed"));
            }

            (self.xlib.XSetWindowBackground)(self.display, window, color.pixel);
            (self.xlib.XClearWindow)(self.display, window);
            (self.xlib.XMapWindow)(self.display, window);
            let mut event: XEvent = std::mem::zeroed();
            (self.xlib.XIfEvent)(self.display, &mut event, Some(is_map_notify), window as *mut c_char);

            let child = NativeHandle::new(Platform::X11, u64::from(window))
                .ok_or_else(|| NativeError::new(0, "XCreateWindow returned a null window"))?;
            debug!(window = ?child, visual = format.id, "mapped child window");
            Ok(Drawable {
                window: child,
                colormap: NativeHandle::new(Platform::X11, u64::from(colormap)),
                ..drawable
            })
        }
    }

    fn make_current(&self, drawable: &Drawable, context: &NativeHandle) -> bool {
        let (Ok(window), Ok(context)) = (window_id(&drawable.window), context_ptr(context)) else {
            return false;
        };
        unsafe { (self.glx.glXMakeCurrent)(self.display, window, context) != 0 }
    }

    fn query_geometry(&self, drawable: &Drawable) -> Option<(u32, u32)> {
        let window = window_id(&drawable.window).ok()?;
        let (mut root, mut x, mut y) = (0, 0, 0);
        let (mut width, mut height, mut border, mut depth) = (0, 0, 0, 0);
        let ok = unsafe {
            (self.xlib.XGetGeometry)(
                self.display,
                window,
                &mut root,
                &mut x,
                &mut y,
                &mut width,
                &mut height,
                &mut border,
                &mut depth,
            )
        };
        (ok != 0).then_some((width, height))
    }

    fn resize_drawable(&self, drawable: &Drawable, width: u32, height: u32) -> Result<(), NativeError> {
        let window = window_id(&drawable.window)?;
        unsafe {
            (self.xlib.XResizeWindow)(self.display, window, width.max(1), height.max(1));
            (self.xlib.XSync)(self.display, xlib::False);
        }
        Ok(())
    }

    fn destroy_context(&self, _drawable: &Drawable, context: &NativeHandle) {
        let Ok(context) = context_ptr(context) else {
            return;
        };
        unsafe {
            if (self.glx.glXGetCurrentContext)() == context {
                (self.glx.glXWaitGL)();
                (self.glx.glXMakeCurrent)(self.display, 0, ptr::null_mut());
            }
            (self.glx.glXDestroyContext)(self.display, context);
        }
    }

    fn release_drawable(&self, drawable: &Drawable) {
        unsafe {
            if drawable.is_child() {
                if let Ok(window) = window_id(&drawable.window) {
                    (self.xlib.XDestroyWindow)(self.display, window);
                }
            }
            if let Some(colormap) = drawable.colormap {
                (self.xlib.XFreeColormap)(self.display, colormap.raw() as c_ulong);
            }
            (self.xlib.XSync)(self.display, xlib::False);
        }
    }

    fn load_commands(&self, drawable: &Drawable, context: &NativeHandle) -> Result<GlowCommands, NativeError> {
        if !self.make_current(drawable, context) {
            return Err(NativeError::new(self.last_error(), "glXMakeCurrent failed"));
        }
        unsafe { GlowCommands::load(|name| self.proc_address(name)) }
    }
}
