use std::time::Instant;

use anyhow::{anyhow, Context, Result};
use glsurface::{
    GraphicsDisplay, GraphicsSurface, HeadlessBackend, NativeHandle, NativeSurfaceBackend,
    WindowDescriptor,
};
use raw_window_handle::HasWindowHandle;
use surfconfig::SurfaceConfig;
use tracing_subscriber::EnvFilter;
use winit::dpi::PhysicalSize;
use winit::event::{Event, WindowEvent};
use winit::event_loop::{ControlFlow, EventLoopBuilder};
use winit::window::WindowBuilder;

use crate::bindings::{self, ProbePlan};
use crate::cli::Cli;
use crate::paths;
use crate::report::{self, ProbeReport};

pub fn run(args: Cli) -> Result<()> {
    initialise_tracing();

    let config = load_config(&args)?;
    let plan = bindings::plan(&args, &config);
    tracing::debug!(?plan, "resolved probe plan");

    let report = if args.headless {
        run_headless(&plan)?
    } else {
        run_native(&plan)?
    };
    print_report(&report, args.json)
}

fn initialise_tracing() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,winit=error"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();
}

fn load_config(args: &Cli) -> Result<SurfaceConfig> {
    match paths::resolve_config_file(args.config.as_deref())? {
        Some(path) => {
            tracing::info!(path = %path.display(), "loading surface config");
            SurfaceConfig::load(&path)
                .with_context(|| format!("failed to load {}", path.display()))
        }
        None => Ok(SurfaceConfig::default()),
    }
}

fn print_report(report: &ProbeReport, json: bool) -> Result<()> {
    if json {
        let rendered =
            serde_json::to_string_pretty(report).context("failed to serialise probe report")?;
        println!("{rendered}");
    } else {
        print!("{}", report::render_text(report));
    }
    Ok(())
}

fn create_display<B: NativeSurfaceBackend>(
    backend: B,
    plan: &ProbePlan,
) -> std::sync::Arc<GraphicsDisplay<B>> {
    GraphicsDisplay::with_format_minimums(backend, plan.settings, plan.color_bits, plan.depth_bits)
}

fn finish<B: NativeSurfaceBackend>(surface: &GraphicsSurface<B>, plan: &ProbePlan) -> ProbeReport {
    let mut report = report::capture(surface);
    if plan.read_depth {
        report.depth = report::sample_depth(surface);
    }
    report
}

fn run_headless(plan: &ProbePlan) -> Result<ProbeReport> {
    let backend = HeadlessBackend::new();
    let parent = backend.parent_window();
    let display = create_display(backend, plan);
    let descriptor = WindowDescriptor::new(parent, plan.size.width, plan.size.height)
        .with_background(plan.background);
    let surface = GraphicsSurface::new(&display, &descriptor, None, None)
        .context("failed to create headless surface")?;
    tracing::info!(?surface, "headless surface created");
    Ok(finish(&surface, plan))
}

#[cfg(windows)]
fn run_native(plan: &ProbePlan) -> Result<ProbeReport> {
    run_windowed(glsurface::Win32Backend::new(), plan)
}

#[cfg(all(unix, feature = "x11"))]
fn run_native(plan: &ProbePlan) -> Result<ProbeReport> {
    let backend = glsurface::X11Backend::open(None).context("failed to open X display")?;
    run_windowed(backend, plan)
}

#[cfg(not(any(windows, all(unix, feature = "x11"))))]
fn run_native(_plan: &ProbePlan) -> Result<ProbeReport> {
    anyhow::bail!("no native GL backend in this build; rerun with --headless")
}

/// Opens a window, binds a surface to it and runs the event loop until the
/// window closes or the deadline passes.
#[cfg_attr(not(any(windows, all(unix, feature = "x11"))), allow(dead_code))]
fn run_windowed<B: NativeSurfaceBackend>(backend: B, plan: &ProbePlan) -> Result<ProbeReport> {
    let mut builder = EventLoopBuilder::new();
    #[cfg(all(unix, not(target_os = "macos")))]
    {
        // The GLX backend needs an X11 window, even under a Wayland session.
        use winit::platform::x11::EventLoopBuilderExtX11;
        EventLoopBuilderExtX11::with_x11(&mut builder);
    }
    let event_loop = builder
        .build()
        .map_err(|err| anyhow!("failed to create event loop: {err}"))?;

    let window = WindowBuilder::new()
        .with_title("surfprobe")
        .with_inner_size(PhysicalSize::new(plan.size.width, plan.size.height))
        .build(&event_loop)
        .context("failed to create probe window")?;
    let raw = window
        .window_handle()
        .map_err(|err| anyhow!("window handle unavailable: {err}"))?
        .as_raw();
    let parent = NativeHandle::from_raw_window(raw)
        .ok_or_else(|| anyhow!("unsupported window system handle {raw:?}"))?;

    let display = create_display(backend, plan);
    let descriptor = WindowDescriptor::new(parent, plan.size.width, plan.size.height)
        .with_background(plan.background);
    let mut surface = GraphicsSurface::new(&display, &descriptor, None, None)
        .context("failed to create graphics surface")?;
    tracing::info!(?surface, "graphics surface bound to window");

    let deadline = plan.exit_after.map(|after| Instant::now() + after);
    let window_id = window.id();
    event_loop
        .run(|event, elwt| match event {
            Event::WindowEvent { window_id: id, event } if id == window_id => match event {
                WindowEvent::CloseRequested | WindowEvent::Destroyed => elwt.exit(),
                WindowEvent::Resized(size) => {
                    surface.resize(size.width, size.height);
                    tracing::debug!(
                        width = surface.width(),
                        height = surface.height(),
                        "surface resized"
                    );
                }
                _ => {}
            },
            Event::AboutToWait => match deadline {
                Some(deadline) if Instant::now() >= deadline => {
                    tracing::info!("probe deadline reached");
                    elwt.exit();
                }
                Some(deadline) => elwt.set_control_flow(ControlFlow::WaitUntil(deadline)),
                None => elwt.set_control_flow(ControlFlow::Wait),
            },
            _ => {}
        })
        .map_err(|err| anyhow!("event loop error: {err}"))?;

    Ok(finish(&surface, plan))
}
