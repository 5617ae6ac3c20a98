//! Capability seam between [`GraphicsSurface`](crate::GraphicsSurface) and a
//! windowing system.
//!
//! A backend answers two kinds of requests: native windowing/context calls
//! (`NativeSurfaceBackend`) and GL state calls issued while a context is
//! current (`GlCommands`). The surface only ever talks to these traits, so the
//! same construction, resize and teardown logic runs on Win32, X11 and the
//! in-memory headless backend.

use crate::error::NativeError;
use crate::handle::{NativeHandle, Platform};
use crate::types::{
    Capability, DrawBuffer, FormatRequest, PixelFormat, PixelTransfer, Rect, Rgba,
    WindowDescriptor,
};

/// Drawable a surface renders into.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Drawable {
    /// Window that GL commands target.
    pub window: NativeHandle,
    /// Platform device context, where the platform separates it from the window.
    pub device: Option<NativeHandle>,
    /// Window the drawable was attached to.
    pub parent: NativeHandle,
    /// Colour depth of the parent window in bits.
    pub parent_depth: u8,
    /// Colormap created for a child window, released with it.
    pub colormap: Option<NativeHandle>,
    /// Logical palette realized for a palette-indexed pixel format.
    pub palette: Option<NativeHandle>,
}

impl Drawable {
    /// Drawable that renders straight into `parent`.
    pub fn parent_only(parent: NativeHandle, parent_depth: u8) -> Self {
        Self {
            window: parent,
            device: None,
            parent,
            parent_depth,
            colormap: None,
            palette: None,
        }
    }

    /// True when the backend created a child window for this drawable.
    pub fn is_child(&self) -> bool {
        self.window != self.parent
    }
}

/// Windowing-system operations a surface needs.
///
/// All calls are synchronous. Making a context current is thread-affine in
/// every native API; callers keep a context current on at most one thread.
pub trait NativeSurfaceBackend {
    /// GL command table produced by [`NativeSurfaceBackend::load_commands`].
    type Commands: GlCommands;

    fn platform(&self) -> Platform;

    /// Platform last-error code, attached to construction failures.
    fn last_error(&self) -> i64;

    /// Acquires the drawable for `descriptor.parent`.
    fn attach_window(&self, descriptor: &WindowDescriptor) -> Result<Drawable, NativeError>;

    /// Selects a pixel format / visual meeting `request`, or `None` if the
    /// platform has nothing usable.
    fn choose_pixel_format(&self, drawable: &Drawable, request: &FormatRequest)
        -> Option<PixelFormat>;

    /// Assigns `format` to the drawable where the platform requires it and
    /// realizes a palette when the format renders through one.
    fn apply_pixel_format(&self, drawable: Drawable, format: &PixelFormat)
        -> Result<Drawable, NativeError>;

    /// Creates a context for `format`. `share` is passed to platforms that can
    /// only link share lists at creation time.
    fn create_context(
        &self,
        drawable: &Drawable,
        format: &PixelFormat,
        share: Option<&NativeHandle>,
    ) -> Result<NativeHandle, NativeError>;

    /// Links the resources of `context` with those of `share`.
    fn share_context(&self, share: &NativeHandle, context: &NativeHandle)
        -> Result<(), NativeError>;

    /// Produces the window the context renders into: the parent itself when
    /// its visual matches `format`, otherwise a mapped child window whose
    /// background is `background`.
    fn realize_drawable(
        &self,
        drawable: Drawable,
        format: &PixelFormat,
        background: Rgba,
        width: u32,
        height: u32,
    ) -> Result<Drawable, NativeError>;

    /// Makes `context` current on `drawable`; false if the platform refused.
    fn make_current(&self, drawable: &Drawable, context: &NativeHandle) -> bool;

    /// Actual geometry of the drawable in pixels.
    fn query_geometry(&self, drawable: &Drawable) -> Option<(u32, u32)>;

    /// Resizes the drawable and waits until the platform has applied it.
    fn resize_drawable(&self, drawable: &Drawable, width: u32, height: u32)
        -> Result<(), NativeError>;

    /// Destroys a context this process created.
    fn destroy_context(&self, drawable: &Drawable, context: &NativeHandle);

    /// Whether a finished surface may destroy its context now. Consulted on
    /// drop only; a surface that fails construction always destroys the
    /// context it created.
    fn can_destroy_context(&self) -> bool {
        true
    }

    /// Releases what [`attach_window`](Self::attach_window) and
    /// [`realize_drawable`](Self::realize_drawable) acquired.
    fn release_drawable(&self, drawable: &Drawable);

    /// Resolves the GL entry points for `context`. Backends whose loader
    /// needs a current context make it current on `drawable` first.
    fn load_commands(&self, drawable: &Drawable, context: &NativeHandle)
        -> Result<Self::Commands, NativeError>;
}

/// GL state calls issued against the current context.
pub trait GlCommands {
    fn viewport(&self, x: i32, y: i32, width: i32, height: i32);

    fn set_capability(&self, capability: Capability, enabled: bool);

    fn draw_buffer(&self, target: DrawBuffer);

    fn pixel_transfer(&self, param: PixelTransfer, value: i32);

    /// Loads an orthographic projection over `0..width` × `0..height` and an
    /// identity modelview.
    fn load_ortho_2d(&self, width: f64, height: f64);

    fn raster_pos(&self, x: i32, y: i32);

    /// Reads `rect` of the depth buffer as floats into `out`.
    fn read_depth_pixels(&self, rect: Rect, out: &mut [f32]);

    fn polygon_offset(&self, factor: f32, units: f32);
}
