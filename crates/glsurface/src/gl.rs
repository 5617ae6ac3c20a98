//! GL command table backed by `glow`, plus the fixed-function entry points
//! `glow` does not expose (matrix stack, raster position, pixel transfer).

use std::ffi::c_void;
use std::fmt;

use glow::HasContext;

use crate::backend::GlCommands;
use crate::error::NativeError;
use crate::types::{Capability, DrawBuffer, PixelTransfer, Rect};

// Compatibility-profile enums missing from glow's core tables.
const ALPHA_TEST: u32 = 0x0BC0;
const FOG: u32 = 0x0B60;
const LIGHTING: u32 = 0x0B50;
const MAP_COLOR: u32 = 0x0D10;
const RED_SCALE: u32 = 0x0D14;
const RED_BIAS: u32 = 0x0D15;
const GREEN_SCALE: u32 = 0x0D18;
const GREEN_BIAS: u32 = 0x0D19;
const BLUE_SCALE: u32 = 0x0D1A;
const BLUE_BIAS: u32 = 0x0D1B;
const ALPHA_SCALE: u32 = 0x0D1C;
const ALPHA_BIAS: u32 = 0x0D1D;
const CONVOLUTION_1D: u32 = 0x8010;
const CONVOLUTION_2D: u32 = 0x8011;
const SEPARABLE_2D: u32 = 0x8012;
const HISTOGRAM: u32 = 0x8024;
const MINMAX: u32 = 0x802E;
const PROJECTION: u32 = 0x1701;
const MODELVIEW: u32 = 0x1700;

impl Capability {
    pub fn gl_enum(self) -> u32 {
        match self {
            Capability::Dither => glow::DITHER,
            Capability::AlphaTest => ALPHA_TEST,
            Capability::Blend => glow::BLEND,
            Capability::DepthTest => glow::DEPTH_TEST,
            Capability::Fog => FOG,
            Capability::Lighting => LIGHTING,
            Capability::LogicOp => glow::COLOR_LOGIC_OP,
            Capability::StencilTest => glow::STENCIL_TEST,
            Capability::ScissorTest => glow::SCISSOR_TEST,
            Capability::Texture1d => glow::TEXTURE_1D,
            Capability::Texture2d => glow::TEXTURE_2D,
            Capability::Texture3d => glow::TEXTURE_3D,
            Capability::Convolution1d => CONVOLUTION_1D,
            Capability::Convolution2d => CONVOLUTION_2D,
            Capability::Separable2d => SEPARABLE_2D,
            Capability::Histogram => HISTOGRAM,
            Capability::MinMax => MINMAX,
            Capability::PolygonOffsetFill => glow::POLYGON_OFFSET_FILL,
        }
    }
}

impl DrawBuffer {
    pub fn gl_enum(self) -> u32 {
        match self {
            DrawBuffer::Front => glow::FRONT,
            DrawBuffer::Back => glow::BACK,
            DrawBuffer::FrontAndBack => glow::FRONT_AND_BACK,
        }
    }
}

impl PixelTransfer {
    pub fn gl_enum(self) -> u32 {
        match self {
            PixelTransfer::MapColor => MAP_COLOR,
            PixelTransfer::RedScale => RED_SCALE,
            PixelTransfer::RedBias => RED_BIAS,
            PixelTransfer::GreenScale => GREEN_SCALE,
            PixelTransfer::GreenBias => GREEN_BIAS,
            PixelTransfer::BlueScale => BLUE_SCALE,
            PixelTransfer::BlueBias => BLUE_BIAS,
            PixelTransfer::AlphaScale => ALPHA_SCALE,
            PixelTransfer::AlphaBias => ALPHA_BIAS,
        }
    }
}

type MatrixModeFn = unsafe extern "system" fn(u32);
type LoadIdentityFn = unsafe extern "system" fn();
type OrthoFn = unsafe extern "system" fn(f64, f64, f64, f64, f64, f64);
type RasterPos2iFn = unsafe extern "system" fn(i32, i32);
type PixelTransferiFn = unsafe extern "system" fn(u32, i32);

/// Fixed-function entry points; `None` on core-profile contexts.
struct LegacyEntryPoints {
    matrix_mode: Option<MatrixModeFn>,
    load_identity: Option<LoadIdentityFn>,
    ortho: Option<OrthoFn>,
    raster_pos_2i: Option<RasterPos2iFn>,
    pixel_transfer_i: Option<PixelTransferiFn>,
}

impl LegacyEntryPoints {
    unsafe fn load(loader: &mut dyn FnMut(&str) -> *const c_void) -> Self {
        Self {
            matrix_mode: resolve(loader, "glMatrixMode"),
            load_identity: resolve(loader, "glLoadIdentity"),
            ortho: resolve(loader, "glOrtho"),
            raster_pos_2i: resolve(loader, "glRasterPos2i"),
            pixel_transfer_i: resolve(loader, "glPixelTransferi"),
        }
    }

    fn missing(&self) -> Vec<&'static str> {
        let mut missing = Vec::new();
        if self.matrix_mode.is_none() {
            missing.push("glMatrixMode");
        }
        if self.load_identity.is_none() {
            missing.push("glLoadIdentity");
        }
        if self.ortho.is_none() {
            missing.push("glOrtho");
        }
        if self.raster_pos_2i.is_none() {
            missing.push("glRasterPos2i");
        }
        if self.pixel_transfer_i.is_none() {
            missing.push("glPixelTransferi");
        }
        missing
    }
}

/// Casts a loader result to a typed function pointer.
///
/// # Safety
/// `F` must be an `extern "system"` function pointer type matching the
/// signature of `name`.
unsafe fn resolve<F: Copy>(loader: &mut dyn FnMut(&str) -> *const c_void, name: &str) -> Option<F> {
    debug_assert_eq!(std::mem::size_of::<F>(), std::mem::size_of::<*const c_void>());
    let ptr = loader(name);
    if ptr.is_null() {
        None
    } else {
        Some(std::mem::transmute_copy::<*const c_void, F>(&ptr))
    }
}

/// [`GlCommands`] issued through `glow` against whatever context is current.
pub struct GlowCommands {
    gl: glow::Context,
    legacy: LegacyEntryPoints,
}

impl GlowCommands {
    /// Resolves every entry point through `loader`.
    ///
    /// # Safety
    /// A context must be current on the calling thread and `loader` must
    /// return entry points valid for it.
    pub unsafe fn load<F>(mut loader: F) -> Result<Self, NativeError>
    where
        F: FnMut(&str) -> *const c_void,
    {
        if loader("glGetString").is_null() {
            return Err(NativeError::new(0, "GL loader could not resolve glGetString"));
        }
        let gl = glow::Context::from_loader_function(&mut loader);
        let legacy = LegacyEntryPoints::load(&mut loader);
        let missing = legacy.missing();
        if !missing.is_empty() {
            tracing::warn!(?missing, "fixed-function entry points unavailable; depth readback will skip projection setup");
        }
        tracing::debug!(version = ?gl.version(), "loaded GL commands");
        Ok(Self { gl, legacy })
    }
}

impl fmt::Debug for GlowCommands {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GlowCommands")
            .field("version", self.gl.version())
            .field("missing", &self.legacy.missing())
            .finish()
    }
}

impl GlCommands for GlowCommands {
    fn viewport(&self, x: i32, y: i32, width: i32, height: i32) {
        unsafe { self.gl.viewport(x, y, width, height) }
    }

    fn set_capability(&self, capability: Capability, enabled: bool) {
        let cap = capability.gl_enum();
        unsafe {
            if enabled {
                self.gl.enable(cap);
            } else {
                self.gl.disable(cap);
            }
        }
    }

    fn draw_buffer(&self, target: DrawBuffer) {
        unsafe { self.gl.draw_buffer(target.gl_enum()) }
    }

    fn pixel_transfer(&self, param: PixelTransfer, value: i32) {
        if let Some(pixel_transfer_i) = self.legacy.pixel_transfer_i {
            unsafe { pixel_transfer_i(param.gl_enum(), value) }
        }
    }

    fn load_ortho_2d(&self, width: f64, height: f64) {
        let (Some(matrix_mode), Some(load_identity), Some(ortho)) =
            (self.legacy.matrix_mode, self.legacy.load_identity, self.legacy.ortho)
        else {
            return;
        };
        unsafe {
            matrix_mode(PROJECTION);
            load_identity();
            ortho(0.0, width, 0.0, height, -1.0, 1.0);
            matrix_mode(MODELVIEW);
            load_identity();
        }
    }

    fn raster_pos(&self, x: i32, y: i32) {
        if let Some(raster_pos_2i) = self.legacy.raster_pos_2i {
            unsafe { raster_pos_2i(x, y) }
        }
    }

    fn read_depth_pixels(&self, rect: Rect, out: &mut [f32]) {
        let bytes: &mut [u8] = bytemuck::cast_slice_mut(out);
        unsafe {
            self.gl.read_pixels(
                rect.x,
                rect.y,
                rect.width as i32,
                rect.height as i32,
                glow::DEPTH_COMPONENT,
                glow::FLOAT,
                glow::PixelPackData::Slice(bytes),
            );
        }
    }

    fn polygon_offset(&self, factor: f32, units: f32) {
        unsafe { self.gl.polygon_offset(factor, units) }
    }
}
