use std::sync::Arc;

use tracing::{debug, trace, warn};

use crate::backend::{Drawable, GlCommands, NativeSurfaceBackend};
use crate::display::GraphicsDisplay;
use crate::error::SurfaceError;
use crate::handle::NativeHandle;
use crate::types::{Capability, DrawBuffer, PixelFormat, PixelTransfer, Rect, Rgba, WindowDescriptor};

/// Capabilities switched off before raw pixel reads.
const READBACK_DISABLED: [Capability; 16] = [
    Capability::Dither,
    Capability::AlphaTest,
    Capability::Blend,
    Capability::DepthTest,
    Capability::Fog,
    Capability::Lighting,
    Capability::LogicOp,
    Capability::StencilTest,
    Capability::Texture1d,
    Capability::Texture2d,
    Capability::Convolution1d,
    Capability::Convolution2d,
    Capability::Separable2d,
    Capability::Histogram,
    Capability::MinMax,
    Capability::Texture3d,
];

/// Pixel transfer state that leaves raw pixel values untouched.
const IDENTITY_TRANSFER: [(PixelTransfer, i32); 9] = [
    (PixelTransfer::MapColor, 0),
    (PixelTransfer::RedScale, 1),
    (PixelTransfer::RedBias, 0),
    (PixelTransfer::GreenScale, 1),
    (PixelTransfer::GreenBias, 0),
    (PixelTransfer::BlueScale, 1),
    (PixelTransfer::BlueBias, 0),
    (PixelTransfer::AlphaScale, 1),
    (PixelTransfer::AlphaBias, 0),
];

/// A native drawable paired with the GL context that renders into it.
///
/// The surface negotiates a pixel format with the display's backend, creates
/// (or borrows) a context, and keeps its stored size in step with the
/// drawable. Every GL-issuing method first makes the context current and
/// silently does nothing when that fails; callers that care check
/// [`GraphicsSurface::activate`] themselves.
///
/// Dropping a surface that created its context destroys the context and
/// releases the drawable. A surface built around a caller-supplied context
/// releases nothing.
pub struct GraphicsSurface<B: NativeSurfaceBackend> {
    display: Arc<GraphicsDisplay<B>>,
    gl: B::Commands,
    context: NativeHandle,
    owns_context: bool,
    drawable: Drawable,
    format: PixelFormat,
    width: u32,
    height: u32,
    background: Rgba,
    dither: bool,
    back_dither: bool,
}

/// Releases what a half-built surface acquired if construction bails out.
struct ConstructionGuard<'a, B: NativeSurfaceBackend> {
    backend: &'a B,
    drawable: Option<Drawable>,
    context: Option<NativeHandle>,
}

impl<B: NativeSurfaceBackend> ConstructionGuard<'_, B> {
    fn disarm(&mut self) {
        self.drawable = None;
        self.context = None;
    }
}

impl<B: NativeSurfaceBackend> Drop for ConstructionGuard<'_, B> {
    fn drop(&mut self) {
        if let (Some(drawable), Some(context)) = (self.drawable.as_ref(), self.context.as_ref()) {
            self.backend.destroy_context(drawable, context);
        }
        if let Some(drawable) = self.drawable.as_ref() {
            self.backend.release_drawable(drawable);
        }
    }
}

impl<B: NativeSurfaceBackend> GraphicsSurface<B> {
    /// Attaches a surface to `descriptor.parent`.
    ///
    /// With `context == None` a new context is created for the negotiated
    /// format; otherwise the given context is reused together with the parent
    /// window and stays owned by the caller. `share` links GPU resources
    /// (textures, display lists) with another surface's context.
    pub fn new(
        display: &Arc<GraphicsDisplay<B>>,
        descriptor: &WindowDescriptor,
        context: Option<NativeHandle>,
        share: Option<&GraphicsSurface<B>>,
    ) -> Result<Self, SurfaceError> {
        let backend = display.backend();
        let platform = backend.platform();
        descriptor
            .parent
            .raw_for(platform)
            .map_err(SurfaceError::backend)?;
        if let Some(context) = context.as_ref() {
            context.raw_for(platform).map_err(SurfaceError::backend)?;
        }

        let attached = backend
            .attach_window(descriptor)
            .map_err(SurfaceError::drawable)?;
        let mut guard = ConstructionGuard {
            backend,
            drawable: Some(attached),
            context: None,
        };

        let request = display.format_request();
        let Some(format) = backend.choose_pixel_format(&attached, &request) else {
            return Err(SurfaceError::NoPixelFormat {
                code: backend.last_error(),
                message: format!(
                    "nothing offers {} colour bits and {} depth bits{}",
                    request.color_bits,
                    request.depth_bits,
                    if request.double_buffer {
                        " with double buffering"
                    } else {
                        ""
                    }
                ),
            });
        };
        debug!(
            id = format.id,
            color_bits = format.color_bits,
            depth_bits = format.depth_bits,
            double_buffer = format.double_buffer,
            "negotiated pixel format"
        );
        if format.needs_palette {
            debug!(id = format.id, "pixel format renders through a palette");
        }

        let settings = display.settings();
        let dither = settings.dither && format.is_palette_depth();
        let back_dither = settings.back_dither && format.is_palette_depth();

        let attached = backend
            .apply_pixel_format(attached, &format)
            .map_err(SurfaceError::pixel_format_assignment)?;
        guard.drawable = Some(attached);

        let owns_context = context.is_none();
        let share_context = share.map(|surface| surface.context);
        let (context, drawable) = match context {
            Some(context) => (context, attached),
            None => {
                let created = backend
                    .create_context(&attached, &format, share_context.as_ref())
                    .map_err(SurfaceError::context_creation)?;
                guard.context = Some(created);
                let drawable = backend
                    .realize_drawable(
                        attached,
                        &format,
                        descriptor.background,
                        descriptor.width,
                        descriptor.height,
                    )
                    .map_err(SurfaceError::drawable)?;
                guard.drawable = Some(drawable);
                (created, drawable)
            }
        };

        if let Some(share) = share_context.as_ref() {
            backend
                .share_context(share, &context)
                .map_err(SurfaceError::context_sharing)?;
        }

        let gl = backend
            .load_commands(&drawable, &context)
            .map_err(SurfaceError::backend)?;
        guard.disarm();

        let mut surface = Self {
            display: Arc::clone(display),
            gl,
            context,
            owns_context,
            drawable,
            format,
            width: descriptor.width,
            height: descriptor.height,
            background: descriptor.background,
            dither,
            back_dither,
        };
        surface.init();
        debug!(
            context = ?surface.context,
            window = ?surface.drawable.window,
            child = surface.drawable.is_child(),
            owns_context,
            width = surface.width,
            height = surface.height,
            dither,
            back_dither,
            "graphics surface ready"
        );
        Ok(surface)
    }

    /// Makes this surface's context current on the calling thread.
    pub fn activate(&self) -> bool {
        self.display
            .backend()
            .make_current(&self.drawable, &self.context)
    }

    /// Resizes the drawable and resynchronises viewport and stored size.
    ///
    /// Asking for the current size does nothing.
    pub fn resize(&mut self, width: u32, height: u32) {
        if self.width == width && self.height == height {
            return;
        }

        self.width = width;
        self.height = height;
        if let Err(err) = self
            .display
            .backend()
            .resize_drawable(&self.drawable, width, height)
        {
            warn!(width, height, error = %err, "native resize failed; resynchronising from drawable");
        }
        self.init();
    }

    /// Reads depth samples of `rect` into `out`, row by row from the bottom.
    ///
    /// Returns false without touching GL when `out` is missing or shorter
    /// than `rect`, or when the context cannot be made current.
    pub fn read_depths(&self, rect: Rect, out: Option<&mut [f32]>) -> bool {
        let Some(out) = out else {
            return false;
        };
        let samples = rect.area();
        if out.len() < samples {
            warn!(
                needed = samples,
                provided = out.len(),
                "depth buffer too small; skipping readback"
            );
            return false;
        }
        if !self.activate() {
            return false;
        }

        self.gl.load_ortho_2d(f64::from(self.width), f64::from(self.height));
        self.gl.raster_pos(rect.x, rect.y);
        self.disable_features();
        self.gl.read_depth_pixels(rect, &mut out[..samples]);
        self.enable_features();
        true
    }

    pub fn select_front_buffer(&self) {
        self.gl.draw_buffer(DrawBuffer::Front);
    }

    pub fn select_back_buffer(&self) {
        self.gl.draw_buffer(DrawBuffer::Back);
    }

    pub fn select_both_buffers(&self) {
        self.gl.draw_buffer(DrawBuffer::FrontAndBack);
    }

    /// Sets the background colour; alpha is kept.
    pub fn set_background_color(&mut self, r: f32, g: f32, b: f32) {
        self.background = Rgba::new(r, g, b, self.background.a);
    }

    /// Applies the display's polygon offset to filled polygons.
    pub fn enable_polygon_offset(&self) {
        let offset = self.display.settings().polygon_offset;
        self.gl.polygon_offset(offset.factor, offset.units);
        self.gl.set_capability(Capability::PolygonOffsetFill, true);
    }

    pub fn disable_polygon_offset(&self) {
        self.gl.set_capability(Capability::PolygonOffsetFill, false);
    }

    /// Turns off every feature that would alter raw pixel values.
    pub fn disable_features(&self) {
        for capability in READBACK_DISABLED {
            self.gl.set_capability(capability, false);
        }
        for (param, value) in IDENTITY_TRANSFER {
            self.gl.pixel_transfer(param, value);
        }
    }

    /// Restores the features [`disable_features`](Self::disable_features) turned off.
    pub fn enable_features(&self) {
        self.gl.set_capability(Capability::Dither, self.dither);
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn background(&self) -> Rgba {
        self.background
    }

    pub fn dither_enabled(&self) -> bool {
        self.dither
    }

    pub fn back_dither_enabled(&self) -> bool {
        self.back_dither
    }

    pub fn owns_context(&self) -> bool {
        self.owns_context
    }

    /// Native context handle, for callers that share or borrow it.
    pub fn native_context(&self) -> NativeHandle {
        self.context
    }

    pub fn drawable(&self) -> &Drawable {
        &self.drawable
    }

    pub fn pixel_format(&self) -> &PixelFormat {
        &self.format
    }

    pub fn display(&self) -> &Arc<GraphicsDisplay<B>> {
        &self.display
    }

    fn init(&mut self) {
        match self.display.backend().query_geometry(&self.drawable) {
            Some((width, height)) => {
                self.width = width;
                self.height = height;
            }
            None => warn!(window = ?self.drawable.window, "drawable geometry unavailable"),
        }

        if !self.activate() {
            trace!(context = ?self.context, "context not current; skipping viewport setup");
            return;
        }

        self.gl
            .viewport(0, 0, clamp_dimension(self.width), clamp_dimension(self.height));
        self.gl.set_capability(Capability::ScissorTest, false);
        self.gl.draw_buffer(DrawBuffer::Back);
    }
}

impl<B: NativeSurfaceBackend> Drop for GraphicsSurface<B> {
    fn drop(&mut self) {
        if !self.owns_context {
            trace!(context = ?self.context, "context borrowed; leaving native resources to owner");
            return;
        }

        let backend = self.display.backend();
        if backend.can_destroy_context() {
            backend.destroy_context(&self.drawable, &self.context);
        } else {
            debug!(context = ?self.context, "no context current; leaving context alive");
        }
        backend.release_drawable(&self.drawable);
    }
}

impl<B: NativeSurfaceBackend> std::fmt::Debug for GraphicsSurface<B> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GraphicsSurface")
            .field("context", &self.context)
            .field("owns_context", &self.owns_context)
            .field("drawable", &self.drawable)
            .field("format", &self.format)
            .field("width", &self.width)
            .field("height", &self.height)
            .field("background", &self.background)
            .field("dither", &self.dither)
            .field("back_dither", &self.back_dither)
            .finish()
    }
}

fn clamp_dimension(value: u32) -> i32 {
    i32::try_from(value).unwrap_or(i32::MAX)
}
