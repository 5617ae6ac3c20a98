use std::fmt::Write as _;

use glsurface::{GraphicsSurface, NativeSurfaceBackend, Rect};
use serde::Serialize;

/// What the driver granted for a probed surface.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProbeReport {
    pub platform: String,
    pub pixel_format: FormatReport,
    pub width: u32,
    pub height: u32,
    pub owns_context: bool,
    pub child_window: bool,
    pub dither: bool,
    pub back_dither: bool,
    pub background: [f32; 4],
    #[serde(skip_serializing_if = "Option::is_none")]
    pub depth: Option<DepthStats>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct FormatReport {
    pub id: u64,
    pub color_bits: u8,
    pub depth_bits: u8,
    pub double_buffer: bool,
    pub needs_palette: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct DepthStats {
    pub min: f32,
    pub max: f32,
    pub samples: usize,
}

impl DepthStats {
    pub fn from_samples(samples: &[f32]) -> Option<Self> {
        let (first, rest) = samples.split_first()?;
        let (min, max) = rest
            .iter()
            .fold((*first, *first), |(lo, hi), &v| (lo.min(v), hi.max(v)));
        Some(Self {
            min,
            max,
            samples: samples.len(),
        })
    }
}

pub fn capture<B: NativeSurfaceBackend>(surface: &GraphicsSurface<B>) -> ProbeReport {
    let format = surface.pixel_format();
    let background = surface.background();
    ProbeReport {
        platform: surface.display().backend().platform().to_string(),
        pixel_format: FormatReport {
            id: format.id,
            color_bits: format.color_bits,
            depth_bits: format.depth_bits,
            double_buffer: format.double_buffer,
            needs_palette: format.needs_palette,
        },
        width: surface.width(),
        height: surface.height(),
        owns_context: surface.owns_context(),
        child_window: surface.drawable().is_child(),
        dither: surface.dither_enabled(),
        back_dither: surface.back_dither_enabled(),
        background: [background.r, background.g, background.b, background.a],
        depth: None,
    }
}

/// Reads the whole depth buffer and summarises it; `None` if the readback failed.
pub fn sample_depth<B: NativeSurfaceBackend>(surface: &GraphicsSurface<B>) -> Option<DepthStats> {
    let rect = Rect::new(0, 0, surface.width(), surface.height());
    let mut samples = vec![0.0_f32; rect.area()];
    if !surface.read_depths(rect, Some(&mut samples)) {
        tracing::warn!(?rect, "depth readback failed");
        return None;
    }
    DepthStats::from_samples(&samples)
}

pub fn render_text(report: &ProbeReport) -> String {
    let format = &report.pixel_format;
    let mut out = String::new();
    let _ = writeln!(out, "platform:      {}", report.platform);
    let _ = writeln!(
        out,
        "pixel format:  #{} ({} colour / {} depth bits, {}{})",
        format.id,
        format.color_bits,
        format.depth_bits,
        if format.double_buffer {
            "double-buffered"
        } else {
            "single-buffered"
        },
        if format.needs_palette { ", palette" } else { "" }
    );
    let _ = writeln!(out, "size:          {}x{}", report.width, report.height);
    let _ = writeln!(
        out,
        "context:       {}",
        if report.owns_context { "owned" } else { "borrowed" }
    );
    let _ = writeln!(
        out,
        "drawable:      {}",
        if report.child_window {
            "child window"
        } else {
            "parent window"
        }
    );
    let _ = writeln!(
        out,
        "dither:        {} (back buffer {})",
        on_off(report.dither),
        on_off(report.back_dither)
    );
    let [r, g, b, a] = report.background;
    let _ = writeln!(out, "background:    {r:.3} {g:.3} {b:.3} {a:.3}");
    if let Some(depth) = report.depth {
        let _ = writeln!(
            out,
            "depth:         {:.4}..{:.4} over {} samples",
            depth.min, depth.max, depth.samples
        );
    }
    out
}

fn on_off(flag: bool) -> &'static str {
    if flag {
        "on"
    } else {
        "off"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use glsurface::{DisplaySettings, GraphicsDisplay, HeadlessBackend, Rgba, WindowDescriptor};

    fn headless_surface(depth_fill: f32) -> GraphicsSurface<HeadlessBackend> {
        let backend = HeadlessBackend::new().with_depth_fill(depth_fill);
        let parent = backend.parent_window();
        let display = GraphicsDisplay::new(backend, DisplaySettings::default());
        let descriptor =
            WindowDescriptor::new(parent, 4, 3).with_background(Rgba::opaque(0.5, 0.0, 1.0));
        GraphicsSurface::new(&display, &descriptor, None, None).unwrap()
    }

    #[test]
    fn depth_stats_cover_range() {
        let stats = DepthStats::from_samples(&[0.5, 0.25, 1.0]).unwrap();
        assert_eq!(stats.min, 0.25);
        assert_eq!(stats.max, 1.0);
        assert_eq!(stats.samples, 3);
        assert!(DepthStats::from_samples(&[]).is_none());
    }

    #[test]
    fn captures_headless_surface() {
        let surface = headless_surface(1.0);
        let mut report = capture(&surface);
        report.depth = sample_depth(&surface);

        assert_eq!(report.platform, "headless");
        assert_eq!((report.width, report.height), (4, 3));
        assert!(report.owns_context);
        assert!(!report.child_window);
        assert!(!report.dither);
        assert_eq!(report.background, [0.5, 0.0, 1.0, 1.0]);
        assert_eq!(
            report.depth,
            Some(DepthStats {
                min: 1.0,
                max: 1.0,
                samples: 12
            })
        );
    }

    #[test]
    fn text_and_json_renderings() {
        let surface = headless_surface(0.0);
        let report = capture(&surface);

        let text = render_text(&report);
        assert!(text.contains("4x3"), "{text}");
        assert!(text.contains("double-buffered"), "{text}");
        assert!(!text.contains("depth:"), "{text}");

        let json = serde_json::to_value(&report).unwrap();
        assert_eq!(json["pixel_format"]["color_bits"], 24);
        assert!(json.get("depth").is_none());
    }
}
