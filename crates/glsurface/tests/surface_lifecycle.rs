use std::sync::Arc;

use glsurface::{
    Capability, DisplaySettings, DrawBuffer, GlCall, GraphicsDisplay, GraphicsSurface,
    HeadlessBackend, HeadlessFailure, NativeCall, NativeHandle, PixelFormat, Platform,
    PolygonOffset, Rect, Rgba, SurfaceError, WindowDescriptor,
};

fn display(backend: &HeadlessBackend) -> Arc<GraphicsDisplay<HeadlessBackend>> {
    GraphicsDisplay::new(backend.clone(), DisplaySettings::default())
}

fn window(backend: &HeadlessBackend) -> WindowDescriptor {
    WindowDescriptor::new(backend.parent_window(), 640, 480)
}

fn format(id: u64, color_bits: u8, depth_bits: u8) -> PixelFormat {
    PixelFormat {
        id,
        color_bits,
        depth_bits,
        double_buffer: true,
        needs_palette: color_bits <= 8,
    }
}

fn surface(backend: &HeadlessBackend) -> GraphicsSurface<HeadlessBackend> {
    GraphicsSurface::new(&display(backend), &window(backend), None, None).expect("surface")
}

#[test]
fn construction_leaves_context_current_with_full_viewport() {
    let backend = HeadlessBackend::new();
    let surface = surface(&backend);

    assert!(surface.owns_context());
    assert_eq!(backend.current_context(), Some(surface.native_context()));
    assert_eq!((surface.width(), surface.height()), (640, 480));
    assert_eq!(
        backend.gl_calls(),
        vec![
            GlCall::Viewport {
                x: 0,
                y: 0,
                width: 640,
                height: 480
            },
            GlCall::Capability {
                capability: Capability::ScissorTest,
                enabled: false
            },
            GlCall::DrawBuffer(DrawBuffer::Back),
        ]
    );
}

#[test]
fn construction_runs_native_steps_in_order() {
    let backend = HeadlessBackend::new();
    let _surface = surface(&backend);

    let steps: Vec<&'static str> = backend
        .calls()
        .iter()
        .filter_map(|call| match call {
            NativeCall::AttachWindow { .. } => Some("attach"),
            NativeCall::ApplyPixelFormat { .. } => Some("apply"),
            NativeCall::CreateContext { .. } => Some("create"),
            NativeCall::RealizeDrawable { .. } => Some("realize"),
            NativeCall::LoadCommands => Some("load"),
            NativeCall::QueryGeometry => Some("geometry"),
            NativeCall::MakeCurrent { .. } => Some("current"),
            _ => None,
        })
        .collect();
    assert_eq!(
        steps,
        ["attach", "apply", "create", "realize", "load", "geometry", "current"]
    );
}

#[test]
fn stored_size_comes_from_the_drawable() {
    let backend = HeadlessBackend::new().with_max_geometry(500, 400);
    let surface = surface(&backend);
    assert_eq!((surface.width(), surface.height()), (500, 400));
}

#[test]
fn resize_to_current_size_is_a_no_op() {
    let backend = HeadlessBackend::new();
    let mut surface = surface(&backend);
    backend.clear_calls();

    surface.resize(640, 480);

    assert!(backend.calls().is_empty(), "{:?}", backend.calls());
    assert_eq!((surface.width(), surface.height()), (640, 480));
}

#[test]
fn resize_stores_queried_geometry_not_request() {
    let backend = HeadlessBackend::new().with_max_geometry(800, 600);
    let mut surface = surface(&backend);
    backend.clear_calls();

    surface.resize(1024, 768);

    assert_eq!((surface.width(), surface.height()), (800, 600));
    let calls = backend.calls();
    assert!(calls.contains(&NativeCall::ResizeDrawable {
        width: 1024,
        height: 768
    }));
    assert!(backend.gl_calls().contains(&GlCall::Viewport {
        x: 0,
        y: 0,
        width: 800,
        height: 600
    }));
}

#[test]
fn failed_native_resize_still_resynchronises() {
    let backend = HeadlessBackend::new();
    let mut surface = surface(&backend);
    backend.set_failure(HeadlessFailure::ResizeDrawable, true);
    backend.set_geometry(surface.drawable().window, 300, 200);

    surface.resize(1000, 1000);

    assert_eq!((surface.width(), surface.height()), (300, 200));
}

#[test]
fn palette_depth_enables_dithering() {
    let backend = HeadlessBackend::new().with_formats(vec![format(4, 8, 16)]);
    let red = WindowDescriptor::new(backend.parent_window(), 320, 240)
        .with_background(Rgba::opaque(1.0, 0.0, 0.0));
    let surface = GraphicsSurface::new(&display(&backend), &red, None, None).unwrap();

    assert_eq!(surface.pixel_format().color_bits, 8);
    assert!(surface.dither_enabled());
    assert!(surface.back_dither_enabled());
}

#[test]
fn true_colour_disables_dithering() {
    let backend = HeadlessBackend::new().with_formats(vec![format(4, 24, 24)]);
    let red = WindowDescriptor::new(backend.parent_window(), 320, 240)
        .with_background(Rgba::opaque(1.0, 0.0, 0.0));
    let surface = GraphicsSurface::new(&display(&backend), &red, None, None).unwrap();

    assert!(!surface.dither_enabled());
    assert!(!surface.back_dither_enabled());
}

#[test]
fn display_preference_can_veto_dithering() {
    let backend = HeadlessBackend::new().with_formats(vec![format(4, 8, 16)]);
    let settings = DisplaySettings {
        dither: false,
        ..DisplaySettings::default()
    };
    let display = GraphicsDisplay::new(backend.clone(), settings);
    let surface = GraphicsSurface::new(&display, &window(&backend), None, None).unwrap();

    assert!(!surface.dither_enabled());
    assert!(surface.back_dither_enabled());
}

#[test]
fn dither_flags_survive_resize_and_readback() {
    let backend = HeadlessBackend::new().with_formats(vec![format(4, 8, 16)]);
    let mut surface = surface(&backend);
    surface.resize(100, 100);
    let mut depths = vec![0.0; 4];
    assert!(surface.read_depths(Rect::new(0, 0, 2, 2), Some(&mut depths)));

    assert!(surface.dither_enabled());
    let last = backend.gl_calls().pop();
    assert_eq!(
        last,
        Some(GlCall::Capability {
            capability: Capability::Dither,
            enabled: true
        })
    );
}

#[test]
fn read_depths_without_buffer_issues_nothing() {
    let backend = HeadlessBackend::new();
    let surface = surface(&backend);
    backend.clear_calls();

    assert!(!surface.read_depths(Rect::new(0, 0, 4, 4), None));
    assert!(backend.calls().is_empty());
}

#[test]
fn read_depths_with_short_buffer_issues_nothing() {
    let backend = HeadlessBackend::new();
    let surface = surface(&backend);
    backend.clear_calls();

    let mut depths = vec![0.0; 15];
    assert!(!surface.read_depths(Rect::new(0, 0, 4, 4), Some(&mut depths)));
    assert!(backend.calls().is_empty());
    assert!(depths.iter().all(|&d| d == 0.0));
}

#[test]
fn read_depths_brackets_read_with_feature_reset() {
    let backend = HeadlessBackend::new().with_depth_fill(0.25);
    let surface = surface(&backend);
    backend.clear_calls();

    let rect = Rect::new(10, 20, 3, 2);
    let mut depths = vec![0.0; 8];
    assert!(surface.read_depths(rect, Some(&mut depths)));

    assert_eq!(&depths[..6], &[0.25; 6]);
    assert_eq!(&depths[6..], &[0.0; 2]);

    let gl = backend.gl_calls();
    assert_eq!(
        gl[0],
        GlCall::Ortho2d {
            width: 640.0,
            height: 480.0
        }
    );
    assert_eq!(gl[1], GlCall::RasterPos { x: 10, y: 20 });
    let read_at = gl
        .iter()
        .position(|call| *call == GlCall::ReadDepth(rect))
        .expect("depth read issued");
    let disabled: Vec<_> = gl[2..read_at]
        .iter()
        .filter(|call| matches!(call, GlCall::Capability { enabled: false, .. }))
        .collect();
    assert_eq!(disabled.len(), 16);
    assert!(gl[2..read_at].contains(&GlCall::PixelTransfer {
        param: glsurface::PixelTransfer::RedScale,
        value: 1
    }));
    assert_eq!(
        gl[read_at + 1..],
        [GlCall::Capability {
            capability: Capability::Dither,
            enabled: false
        }]
    );
}

#[test]
fn read_depths_skips_when_context_cannot_be_bound() {
    let backend = HeadlessBackend::new();
    let surface = surface(&backend);
    backend.set_failure(HeadlessFailure::MakeCurrent, true);
    backend.clear_calls();

    let mut depths = vec![0.0; 1];
    assert!(!surface.read_depths(Rect::new(0, 0, 1, 1), Some(&mut depths)));
    assert!(backend.gl_calls().is_empty());
}

#[test]
fn unbindable_context_skips_viewport_setup() {
    let backend = HeadlessBackend::new().failing(HeadlessFailure::MakeCurrent);
    let surface = surface(&backend);

    assert!(!surface.activate());
    assert!(backend.gl_calls().is_empty());
    assert_eq!((surface.width(), surface.height()), (640, 480));
}

#[test]
fn borrowed_context_is_never_released() {
    let backend = HeadlessBackend::new();
    let context = backend.external_context();
    let surface =
        GraphicsSurface::new(&display(&backend), &window(&backend), Some(context), None).unwrap();

    assert!(!surface.owns_context());
    assert_eq!(surface.native_context(), context);
    assert!(!surface.drawable().is_child());
    drop(surface);

    let calls = backend.calls();
    assert!(!calls
        .iter()
        .any(|call| matches!(call, NativeCall::CreateContext { .. })));
    assert!(!calls.iter().any(|call| matches!(
        call,
        NativeCall::DestroyContext { .. } | NativeCall::ReleaseDrawable { .. }
    )));
    assert!(backend.is_live_context(&context));
}

#[test]
fn owned_context_is_destroyed_then_drawable_released() {
    let backend = HeadlessBackend::new().with_formats(vec![format(9, 24, 24)]);
    let surface = surface(&backend);
    let context = surface.native_context();
    let window = surface.drawable().window;
    assert!(surface.drawable().is_child());
    assert_eq!(backend.live_windows(), 1);
    backend.clear_calls();

    drop(surface);

    assert_eq!(
        backend.calls(),
        vec![
            NativeCall::DestroyContext { context },
            NativeCall::ReleaseDrawable { window },
        ]
    );
    assert_eq!(backend.live_contexts(), 0);
    assert_eq!(backend.live_windows(), 0);
}

#[test]
fn child_window_gets_requested_background() {
    let backend = HeadlessBackend::new().with_formats(vec![format(9, 24, 24)]);
    let teal = Rgba::opaque(0.0, 0.5, 0.5);
    let descriptor = window(&backend).with_background(teal);
    let surface = GraphicsSurface::new(&display(&backend), &descriptor, None, None).unwrap();

    assert!(backend.calls().contains(&NativeCall::RealizeDrawable {
        child: true,
        background: teal
    }));
    assert_eq!(surface.background(), teal);
}

#[test]
fn shared_surface_links_contexts() {
    let backend = HeadlessBackend::new();
    let display = display(&backend);
    let first = GraphicsSurface::new(&display, &window(&backend), None, None).unwrap();
    let second = GraphicsSurface::new(&display, &window(&backend), None, Some(&first)).unwrap();

    let calls = backend.calls();
    assert!(calls.contains(&NativeCall::CreateContext {
        share: Some(first.native_context())
    }));
    assert!(calls.contains(&NativeCall::ShareContext {
        share: first.native_context(),
        context: second.native_context(),
    }));
    assert_ne!(first.native_context(), second.native_context());
}

#[test]
fn failed_sharing_aborts_construction_without_leaks() {
    let backend = HeadlessBackend::new().with_error_code(1282);
    let display = display(&backend);
    let first = GraphicsSurface::new(&display, &window(&backend), None, None).unwrap();
    backend.set_failure(HeadlessFailure::ShareContext, true);
    backend.clear_calls();

    let err = GraphicsSurface::new(&display, &window(&backend), None, Some(&first)).unwrap_err();

    assert!(matches!(err, SurfaceError::ContextSharing { code: 1282, .. }), "{err}");
    assert!(err.to_string().contains("share"), "{err}");
    assert_eq!(backend.live_contexts(), 1);
    assert!(backend.is_live_context(&first.native_context()));
    let calls = backend.calls();
    assert!(calls
        .iter()
        .any(|call| matches!(call, NativeCall::DestroyContext { .. })));
    assert!(calls
        .iter()
        .any(|call| matches!(call, NativeCall::ReleaseDrawable { .. })));
}

#[test]
fn missing_pixel_format_fails_before_context_creation() {
    let backend = HeadlessBackend::new()
        .with_formats(Vec::new())
        .with_error_code(2000);

    let err = GraphicsSurface::new(&display(&backend), &window(&backend), None, None).unwrap_err();

    assert!(matches!(err, SurfaceError::NoPixelFormat { code: 2000, .. }), "{err}");
    let calls = backend.calls();
    assert!(!calls
        .iter()
        .any(|call| matches!(call, NativeCall::CreateContext { .. })));
    assert!(matches!(
        calls.last(),
        Some(NativeCall::ReleaseDrawable { .. })
    ));
}

#[test]
fn context_creation_failure_is_reported() {
    let backend = HeadlessBackend::new()
        .with_error_code(8)
        .failing(HeadlessFailure::CreateContext);

    let err = GraphicsSurface::new(&display(&backend), &window(&backend), None, None).unwrap_err();

    assert!(matches!(err, SurfaceError::ContextCreation { code: 8, .. }), "{err}");
    assert!(!backend
        .calls()
        .iter()
        .any(|call| matches!(call, NativeCall::DestroyContext { .. })));
}

#[test]
fn pixel_format_assignment_failure_is_reported() {
    let backend = HeadlessBackend::new().failing(HeadlessFailure::ApplyPixelFormat);
    let err = GraphicsSurface::new(&display(&backend), &window(&backend), None, None).unwrap_err();
    assert!(matches!(err, SurfaceError::PixelFormatAssignment { .. }), "{err}");
}

#[test]
fn foreign_parent_handle_is_rejected_up_front() {
    let backend = HeadlessBackend::new();
    let foreign = NativeHandle::new(Platform::Win32, 0x10).unwrap();
    let descriptor = WindowDescriptor::new(foreign, 640, 480);

    let err = GraphicsSurface::new(&display(&backend), &descriptor, None, None).unwrap_err();

    assert!(matches!(err, SurfaceError::Backend { .. }), "{err}");
    assert!(backend.calls().is_empty());
}

#[test]
fn background_colour_keeps_alpha() {
    let backend = HeadlessBackend::new();
    let descriptor = window(&backend).with_background(Rgba::new(0.1, 0.2, 0.3, 0.5));
    let mut surface = GraphicsSurface::new(&display(&backend), &descriptor, None, None).unwrap();

    surface.set_background_color(1.0, 0.0, 0.0);

    assert_eq!(surface.background(), Rgba::new(1.0, 0.0, 0.0, 0.5));
}

#[test]
fn polygon_offset_uses_display_settings() {
    let backend = HeadlessBackend::new();
    let settings = DisplaySettings {
        polygon_offset: PolygonOffset {
            factor: 2.0,
            units: 3.0,
        },
        ..DisplaySettings::default()
    };
    let display = GraphicsDisplay::new(backend.clone(), settings);
    let surface = GraphicsSurface::new(&display, &window(&backend), None, None).unwrap();
    backend.clear_calls();

    surface.enable_polygon_offset();
    surface.disable_polygon_offset();

    assert_eq!(
        backend.gl_calls(),
        vec![
            GlCall::PolygonOffset {
                factor: 2.0,
                units: 3.0
            },
            GlCall::Capability {
                capability: Capability::PolygonOffsetFill,
                enabled: true
            },
            GlCall::Capability {
                capability: Capability::PolygonOffsetFill,
                enabled: false
            },
        ]
    );
}

#[test]
fn buffer_selection_targets_requested_buffer() {
    let backend = HeadlessBackend::new();
    let surface = surface(&backend);
    backend.clear_calls();

    surface.select_front_buffer();
    surface.select_both_buffers();
    surface.select_back_buffer();

    assert_eq!(
        backend.gl_calls(),
        vec![
            GlCall::DrawBuffer(DrawBuffer::Front),
            GlCall::DrawBuffer(DrawBuffer::FrontAndBack),
            GlCall::DrawBuffer(DrawBuffer::Back),
        ]
    );
}

#[test]
fn surfaces_on_different_windows_keep_their_own_size() {
    let backend = HeadlessBackend::new();
    let display = display(&backend);
    let mut first = GraphicsSurface::new(&display, &window(&backend), None, None).unwrap();
    let other = NativeHandle::new(Platform::Headless, 0x200).unwrap();
    let mut second =
        GraphicsSurface::new(&display, &WindowDescriptor::new(other, 320, 200), None, None)
            .unwrap();

    first.resize(800, 600);
    backend.set_failure(HeadlessFailure::ResizeDrawable, true);
    second.resize(400, 300);

    assert_eq!((first.width(), first.height()), (800, 600));
    assert_eq!((second.width(), second.height()), (320, 200));
}

#[test]
fn failed_sharing_never_destroys_a_borrowed_context() {
    let backend = HeadlessBackend::new();
    let display = display(&backend);
    let first = GraphicsSurface::new(&display, &window(&backend), None, None).unwrap();
    let borrowed = backend.external_context();
    backend.set_failure(HeadlessFailure::ShareContext, true);
    backend.clear_calls();

    let err = GraphicsSurface::new(&display, &window(&backend), Some(borrowed), Some(&first))
        .unwrap_err();

    assert!(matches!(err, SurfaceError::ContextSharing { .. }), "{err}");
    let calls = backend.calls();
    assert!(!calls
        .iter()
        .any(|call| matches!(call, NativeCall::DestroyContext { .. })));
    assert!(matches!(
        calls.last(),
        Some(NativeCall::ReleaseDrawable { .. })
    ));
    assert!(backend.is_live_context(&borrowed));
    assert!(backend.is_live_context(&first.native_context()));
}

#[test]
fn construction_failure_destroys_context_even_with_nothing_current() {
    let backend = HeadlessBackend::new()
        .with_teardown_needing_current()
        .with_error_code(6)
        .failing(HeadlessFailure::LoadCommands);

    let err = GraphicsSurface::new(&display(&backend), &window(&backend), None, None).unwrap_err();

    assert!(matches!(err, SurfaceError::Backend { code: 6, .. }), "{err}");
    assert_eq!(backend.current_context(), None);
    assert!(backend
        .calls()
        .iter()
        .any(|call| matches!(call, NativeCall::DestroyContext { .. })));
    assert_eq!(backend.live_contexts(), 0);
}

#[test]
fn drop_leaves_context_alive_when_teardown_needs_a_current_one() {
    let backend = HeadlessBackend::new()
        .with_teardown_needing_current()
        .failing(HeadlessFailure::MakeCurrent);
    let surface = surface(&backend);
    let context = surface.native_context();
    assert_eq!(backend.current_context(), None);
    backend.clear_calls();

    drop(surface);

    assert_eq!(
        backend.calls(),
        vec![NativeCall::ReleaseDrawable {
            window: backend.parent_window()
        }]
    );
    assert!(backend.is_live_context(&context));
}

#[test]
fn drop_destroys_context_when_teardown_finds_one_current() {
    let backend = HeadlessBackend::new().with_teardown_needing_current();
    let surface = surface(&backend);
    let context = surface.native_context();

    drop(surface);

    assert!(!backend.is_live_context(&context));
    assert_eq!(backend.live_contexts(), 0);
}

#[test]
fn palette_format_realizes_palette_released_on_drop() {
    let backend = HeadlessBackend::new().with_formats(vec![format(4, 8, 16)]);
    let surface = surface(&backend);
    let palette = surface.drawable().palette.expect("palette");

    assert!(backend
        .calls()
        .contains(&NativeCall::RealizePalette { palette }));
    assert_eq!(backend.live_palettes(), 1);
    drop(surface);
    assert_eq!(backend.live_palettes(), 0);
}

#[test]
fn palette_is_released_when_construction_fails() {
    let backend = HeadlessBackend::new()
        .with_formats(vec![format(4, 8, 16)])
        .failing(HeadlessFailure::CreateContext);

    let err = GraphicsSurface::new(&display(&backend), &window(&backend), None, None).unwrap_err();

    assert!(matches!(err, SurfaceError::ContextCreation { .. }), "{err}");
    assert_eq!(backend.live_palettes(), 0);
}

#[test]
fn true_colour_format_has_no_palette() {
    let backend = HeadlessBackend::new();
    let surface = surface(&backend);
    assert!(surface.drawable().palette.is_none());
    assert_eq!(backend.live_palettes(), 0);
}

#[test]
fn parent_format_below_display_minimums_is_not_reused() {
    let backend = HeadlessBackend::new();
    let lenient = GraphicsSurface::new(&display(&backend), &window(&backend), None, None).unwrap();
    assert!(!backend
        .calls()
        .iter()
        .any(|call| matches!(call, NativeCall::ProbeFormat(_))));
    drop(lenient);
    backend.clear_calls();

    let strict =
        GraphicsDisplay::with_format_minimums(backend.clone(), DisplaySettings::default(), 32, 24);
    let _surface = GraphicsSurface::new(&strict, &window(&backend), None, None).unwrap();

    assert!(backend
        .calls()
        .iter()
        .any(|call| matches!(call, NativeCall::ProbeFormat(_))));
}
