//! OpenGL rendering surfaces over native windows.
//!
//! A [`GraphicsSurface`] binds a GL context to a window handed in by the
//! caller. Construction negotiates a pixel format (Win32) or visual (X11),
//! creates or borrows a context, optionally shares resources with another
//! surface, and leaves the context current with a full-window viewport:
//!
//! ```text
//!   WindowDescriptor ──▶ attach_window ──▶ choose_pixel_format ──▶ apply_pixel_format
//!                                                                        │
//!        GraphicsSurface ◀── init viewport ◀── share_context ◀── create_context + realize_drawable
//! ```
//!
//! Native calls go through [`NativeSurfaceBackend`]; GL state changes go
//! through [`GlCommands`]. [`HeadlessBackend`] implements both in memory and
//! records every call, which is how the surface logic is tested.

pub mod backend;
pub mod display;
pub mod error;
pub mod gl;
pub mod handle;
pub mod headless;
pub mod pixel_format;
pub mod surface;
pub mod types;
#[cfg(windows)]
pub mod win32;
#[cfg(all(feature = "x11", unix))]
pub mod x11;

pub use backend::{Drawable, GlCommands, NativeSurfaceBackend};
pub use display::GraphicsDisplay;
pub use error::{NativeError, SurfaceError};
pub use gl::GlowCommands;
pub use handle::{NativeHandle, Platform};
pub use headless::{GlCall, HeadlessBackend, HeadlessCommands, HeadlessFailure, NativeCall};
pub use pixel_format::FormatCandidate;
pub use surface::GraphicsSurface;
pub use types::{
    Capability, DisplaySettings, DrawBuffer, FormatRequest, PixelFormat, PixelTransfer,
    PolygonOffset, Rect, Rgba, WindowDescriptor,
};
#[cfg(windows)]
pub use win32::Win32Backend;
#[cfg(all(feature = "x11", unix))]
pub use x11::X11Backend;
