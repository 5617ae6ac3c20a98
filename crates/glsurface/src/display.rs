use std::sync::Arc;

use crate::backend::NativeSurfaceBackend;
use crate::types::{DisplaySettings, FormatRequest};

/// Connection to a windowing system shared by every surface created on it.
///
/// The display owns the backend and the read-only preferences surfaces
/// consult (buffering, dithering, polygon offset). It owns no surfaces.
#[derive(Debug)]
pub struct GraphicsDisplay<B> {
    backend: B,
    settings: DisplaySettings,
    min_color_bits: u8,
    min_depth_bits: u8,
}

impl<B: NativeSurfaceBackend> GraphicsDisplay<B> {
    pub fn new(backend: B, settings: DisplaySettings) -> Arc<Self> {
        let defaults = FormatRequest::default();
        Self::with_format_minimums(backend, settings, defaults.color_bits, defaults.depth_bits)
    }

    /// Like [`GraphicsDisplay::new`] with explicit colour/depth minimums for
    /// pixel-format negotiation.
    pub fn with_format_minimums(
        backend: B,
        settings: DisplaySettings,
        min_color_bits: u8,
        min_depth_bits: u8,
    ) -> Arc<Self> {
        Arc::new(Self {
            backend,
            settings,
            min_color_bits,
            min_depth_bits,
        })
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    pub fn settings(&self) -> &DisplaySettings {
        &self.settings
    }

    /// Format request derived from the display preferences.
    pub fn format_request(&self) -> FormatRequest {
        FormatRequest {
            color_bits: self.min_color_bits,
            depth_bits: self.min_depth_bits,
            double_buffer: self.settings.double_buffer,
        }
    }
}
