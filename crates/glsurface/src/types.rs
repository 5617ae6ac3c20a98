use crate::handle::NativeHandle;

/// RGBA colour with components in `0.0..=1.0`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Rgba {
    pub r: f32,
    pub g: f32,
    pub b: f32,
    pub a: f32,
}

impl Rgba {
    /// Background used when the caller does not pick one: opaque black.
    pub const DEFAULT_BACKGROUND: Rgba = Rgba::new(0.0, 0.0, 0.0, 1.0);

    pub const fn new(r: f32, g: f32, b: f32, a: f32) -> Self {
        Self { r, g, b, a }
    }

    pub const fn opaque(r: f32, g: f32, b: f32) -> Self {
        Self::new(r, g, b, 1.0)
    }

    /// Scales the colour channels to the 16-bit range used by X colormaps.
    pub fn to_u16_rgb(self) -> [u16; 3] {
        [self.r, self.g, self.b].map(|c| (c.clamp(0.0, 1.0) * f32::from(u16::MAX)) as u16)
    }
}

impl Default for Rgba {
    fn default() -> Self {
        Self::DEFAULT_BACKGROUND
    }
}

/// Screen-space rectangle in pixels, origin at the lower-left corner.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Rect {
    pub x: i32,
    pub y: i32,
    pub width: u32,
    pub height: u32,
}

impl Rect {
    pub const fn new(x: i32, y: i32, width: u32, height: u32) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }

    /// Number of samples a full readback of this rectangle produces.
    pub fn area(&self) -> usize {
        self.width as usize * self.height as usize
    }
}

/// Native window a surface attaches to, plus the placement it was asked for.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct WindowDescriptor {
    pub parent: NativeHandle,
    pub x: i32,
    pub y: i32,
    pub width: u32,
    pub height: u32,
    pub background: Rgba,
}

impl WindowDescriptor {
    pub fn new(parent: NativeHandle, width: u32, height: u32) -> Self {
        Self {
            parent,
            x: 0,
            y: 0,
            width,
            height,
            background: Rgba::DEFAULT_BACKGROUND,
        }
    }

    pub fn with_background(mut self, background: Rgba) -> Self {
        self.background = background;
        self
    }

    pub fn with_position(mut self, x: i32, y: i32) -> Self {
        self.x = x;
        self.y = y;
        self
    }
}

/// Colour buffer that subsequent draw calls target.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DrawBuffer {
    Front,
    Back,
    FrontAndBack,
}

/// Server-side GL capabilities toggled by the surface.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Capability {
    Dither,
    AlphaTest,
    Blend,
    DepthTest,
    Fog,
    Lighting,
    LogicOp,
    StencilTest,
    ScissorTest,
    Texture1d,
    Texture2d,
    Texture3d,
    Convolution1d,
    Convolution2d,
    Separable2d,
    Histogram,
    MinMax,
    PolygonOffsetFill,
}

/// Fixed-function pixel transfer parameters reset before raw pixel reads.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PixelTransfer {
    MapColor,
    RedScale,
    RedBias,
    GreenScale,
    GreenBias,
    BlueScale,
    BlueBias,
    AlphaScale,
    AlphaBias,
}

/// Depth offset applied to filled polygons, supplied by the display.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PolygonOffset {
    pub factor: f32,
    pub units: f32,
}

impl Default for PolygonOffset {
    fn default() -> Self {
        Self {
            factor: 1.0,
            units: 1.0,
        }
    }
}

/// Read-only preferences shared by every surface created on a display.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DisplaySettings {
    /// Request a double-buffered pixel format.
    pub double_buffer: bool,
    /// Allow dithering when the granted format is palette-indexed.
    pub dither: bool,
    /// Allow back-buffer dithering when the granted format is palette-indexed.
    pub back_dither: bool,
    pub polygon_offset: PolygonOffset,
}

impl Default for DisplaySettings {
    fn default() -> Self {
        Self {
            double_buffer: true,
            dither: true,
            back_dither: true,
            polygon_offset: PolygonOffset::default(),
        }
    }
}

/// Minimum pixel format the surface asks the backend for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FormatRequest {
    pub color_bits: u8,
    pub depth_bits: u8,
    pub double_buffer: bool,
}

impl Default for FormatRequest {
    fn default() -> Self {
        Self {
            color_bits: 24,
            depth_bits: 16,
            double_buffer: true,
        }
    }
}

/// Pixel format or visual granted by the backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PixelFormat {
    /// Backend-specific identifier (pixel format index, visual id, ...).
    pub id: u64,
    pub color_bits: u8,
    pub depth_bits: u8,
    pub double_buffer: bool,
    /// The format renders through a logical palette (Win32 `PFD_NEED_PALETTE`).
    pub needs_palette: bool,
}

impl PixelFormat {
    /// Whether the format meets both bit-depth minimums of `request`.
    pub fn satisfies(&self, color_bits: u8, depth_bits: u8) -> bool {
        self.color_bits >= color_bits && self.depth_bits >= depth_bits
    }

    /// Whether the format can stand in for `request` as-is: same buffering and
    /// at least the requested bit depths.
    pub fn meets(&self, request: &FormatRequest) -> bool {
        self.double_buffer == request.double_buffer
            && self.satisfies(request.color_bits, request.depth_bits)
    }

    /// Palette-indexed formats (8 bits of colour or fewer) are the only ones dithered.
    pub fn is_palette_depth(&self) -> bool {
        self.color_bits <= 8
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_background_is_opaque_black() {
        assert_eq!(Rgba::default(), Rgba::new(0.0, 0.0, 0.0, 1.0));
    }

    #[test]
    fn colormap_scaling_clamps() {
        assert_eq!(Rgba::opaque(1.0, 0.0, 2.0).to_u16_rgb(), [u16::MAX, 0, u16::MAX]);
        assert_eq!(Rgba::opaque(-1.0, 0.5, 0.0).to_u16_rgb()[0], 0);
    }

    #[test]
    fn palette_depth_threshold() {
        let mut format = PixelFormat {
            id: 1,
            color_bits: 8,
            depth_bits: 16,
            double_buffer: true,
            needs_palette: true,
        };
        assert!(format.is_palette_depth());
        format.color_bits = 16;
        assert!(!format.is_palette_depth());
    }

    #[test]
    fn format_meets_request_minimums_and_buffering() {
        let format = PixelFormat {
            id: 7,
            color_bits: 24,
            depth_bits: 24,
            double_buffer: true,
            needs_palette: false,
        };
        let request = FormatRequest::default();
        assert!(format.meets(&request));
        assert!(!format.meets(&FormatRequest {
            color_bits: 32,
            ..request
        }));
        assert!(!format.meets(&FormatRequest {
            double_buffer: false,
            ..request
        }));
    }
}
