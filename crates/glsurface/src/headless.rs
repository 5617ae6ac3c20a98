//! In-memory backend with a scripted driver.
//!
//! `HeadlessBackend` behaves like a tiny windowing system: it keeps a table of
//! pixel formats, hands out fresh handles for contexts and child windows, and
//! tracks which contexts are alive and current. Every native and GL call is
//! appended to a shared log so callers can assert on call order. Failures can
//! be injected per operation.

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use crate::backend::{Drawable, GlCommands, NativeSurfaceBackend};
use crate::error::NativeError;
use crate::handle::{NativeHandle, Platform};
use crate::pixel_format::{self, FormatCandidate};
use crate::types::{
    Capability, DrawBuffer, FormatRequest, PixelFormat, PixelTransfer, Rect, Rgba,
    WindowDescriptor,
};

/// Native operation a [`HeadlessBackend`] can be told to fail.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HeadlessFailure {
    AttachWindow,
    ApplyPixelFormat,
    CreateContext,
    ShareContext,
    RealizeDrawable,
    MakeCurrent,
    ResizeDrawable,
    LoadCommands,
}

/// One entry of the headless call log.
#[derive(Debug, Clone, PartialEq)]
pub enum NativeCall {
    AttachWindow { parent: NativeHandle },
    ProbeFormat(FormatCandidate),
    ApplyPixelFormat { format: u64 },
    RealizePalette { palette: NativeHandle },
    CreateContext { share: Option<NativeHandle> },
    ShareContext { share: NativeHandle, context: NativeHandle },
    RealizeDrawable { child: bool, background: Rgba },
    MakeCurrent { context: NativeHandle },
    QueryGeometry,
    ResizeDrawable { width: u32, height: u32 },
    DestroyContext { context: NativeHandle },
    ReleaseDrawable { window: NativeHandle },
    LoadCommands,
    Gl(GlCall),
}

/// GL command recorded by [`HeadlessCommands`].
#[derive(Debug, Clone, PartialEq)]
pub enum GlCall {
    Viewport { x: i32, y: i32, width: i32, height: i32 },
    Capability { capability: Capability, enabled: bool },
    DrawBuffer(DrawBuffer),
    PixelTransfer { param: PixelTransfer, value: i32 },
    Ortho2d { width: f64, height: f64 },
    RasterPos { x: i32, y: i32 },
    ReadDepth(Rect),
    PolygonOffset { factor: f32, units: f32 },
}

#[derive(Debug)]
struct HeadlessState {
    calls: Vec<NativeCall>,
    formats: Vec<PixelFormat>,
    parent_format: Option<u64>,
    parent_depth: u8,
    geometry: HashMap<NativeHandle, (u32, u32)>,
    max_geometry: Option<(u32, u32)>,
    failures: HashSet<HeadlessFailure>,
    error_code: i64,
    depth_fill: f32,
    next_handle: u64,
    live_contexts: HashSet<NativeHandle>,
    live_windows: HashSet<NativeHandle>,
    live_palettes: HashSet<NativeHandle>,
    current: Option<NativeHandle>,
    teardown_needs_current: bool,
}

impl HeadlessState {
    fn fresh_handle(&mut self) -> NativeHandle {
        self.next_handle += 1;
        NativeHandle::new(Platform::Headless, self.next_handle)
            .unwrap_or_else(|| unreachable!("handle counter starts above zero"))
    }

    fn fail(&self, op: HeadlessFailure) -> Result<(), NativeError> {
        if self.failures.contains(&op) {
            Err(NativeError::new(
                self.error_code,
                format!("{op:?} failed (injected)"),
            ))
        } else {
            Ok(())
        }
    }

    fn clamp(&self, width: u32, height: u32) -> (u32, u32) {
        match self.max_geometry {
            Some((max_w, max_h)) => (width.min(max_w), height.min(max_h)),
            None => (width, height),
        }
    }
}

/// Scripted in-memory [`NativeSurfaceBackend`].
#[derive(Debug, Clone)]
pub struct HeadlessBackend {
    state: Arc<Mutex<HeadlessState>>,
}

impl Default for HeadlessBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl HeadlessBackend {
    /// Parent window handle new backends report as attachable.
    pub const PARENT_WINDOW: u64 = 0x100;

    /// A backend offering one 24-bit colour / 24-bit depth double-buffered
    /// format that the parent window already uses.
    pub fn new() -> Self {
        let format = PixelFormat {
            id: 1,
            color_bits: 24,
            depth_bits: 24,
            double_buffer: true,
            needs_palette: false,
        };
        Self {
            state: Arc::new(Mutex::new(HeadlessState {
                calls: Vec::new(),
                formats: vec![format],
                parent_format: Some(format.id),
                parent_depth: 24,
                geometry: HashMap::new(),
                max_geometry: None,
                failures: HashSet::new(),
                error_code: 0,
                depth_fill: 1.0,
                next_handle: Self::PARENT_WINDOW,
                live_contexts: HashSet::new(),
                live_windows: HashSet::new(),
                live_palettes: HashSet::new(),
                current: None,
                teardown_needs_current: false,
            })),
        }
    }

    /// Replaces the driver's pixel-format table. The parent window keeps no
    /// format of its own, so surfaces get a child window.
    pub fn with_formats(self, formats: Vec<PixelFormat>) -> Self {
        {
            let mut state = self.lock();
            state.formats = formats;
            state.parent_format = None;
        }
        self
    }

    /// Declares which format id the parent window's visual already matches.
    pub fn with_parent_format(self, id: Option<u64>) -> Self {
        self.lock().parent_format = id;
        self
    }

    pub fn with_parent_depth(self, depth: u8) -> Self {
        self.lock().parent_depth = depth;
        self
    }

    /// Caps every drawable size the "window manager" accepts.
    pub fn with_max_geometry(self, width: u32, height: u32) -> Self {
        self.lock().max_geometry = Some((width, height));
        self
    }

    pub fn with_error_code(self, code: i64) -> Self {
        self.lock().error_code = code;
        self
    }

    /// Value written into every depth sample read back.
    pub fn with_depth_fill(self, value: f32) -> Self {
        self.lock().depth_fill = value;
        self
    }

    /// Lets finished surfaces destroy their context only while some context
    /// is current, the way WGL teardown behaves.
    pub fn with_teardown_needing_current(self) -> Self {
        self.lock().teardown_needs_current = true;
        self
    }

    pub fn failing(self, op: HeadlessFailure) -> Self {
        self.lock().failures.insert(op);
        self
    }

    /// Toggles an injected failure after construction.
    pub fn set_failure(&self, op: HeadlessFailure, fail: bool) {
        let mut state = self.lock();
        if fail {
            state.failures.insert(op);
        } else {
            state.failures.remove(&op);
        }
    }

    pub fn parent_window(&self) -> NativeHandle {
        NativeHandle::new(Platform::Headless, Self::PARENT_WINDOW)
            .unwrap_or_else(|| unreachable!("parent handle is non-zero"))
    }

    /// Creates a context the way a host application would, outside any surface.
    pub fn external_context(&self) -> NativeHandle {
        let mut state = self.lock();
        let handle = state.fresh_handle();
        state.live_contexts.insert(handle);
        handle
    }

    pub fn calls(&self) -> Vec<NativeCall> {
        self.lock().calls.clone()
    }

    pub fn gl_calls(&self) -> Vec<GlCall> {
        self.lock()
            .calls
            .iter()
            .filter_map(|call| match call {
                NativeCall::Gl(gl) => Some(gl.clone()),
                _ => None,
            })
            .collect()
    }

    pub fn clear_calls(&self) {
        self.lock().calls.clear();
    }

    pub fn is_live_context(&self, context: &NativeHandle) -> bool {
        self.lock().live_contexts.contains(context)
    }

    pub fn live_contexts(&self) -> usize {
        self.lock().live_contexts.len()
    }

    pub fn live_windows(&self) -> usize {
        self.lock().live_windows.len()
    }

    pub fn live_palettes(&self) -> usize {
        self.lock().live_palettes.len()
    }

    pub fn current_context(&self) -> Option<NativeHandle> {
        self.lock().current
    }

    /// Resizes `window` behind the surface's back, as a user dragging it would.
    pub fn set_geometry(&self, window: NativeHandle, width: u32, height: u32) {
        self.lock().geometry.insert(window, (width, height));
    }

    fn lock(&self) -> MutexGuard<'_, HeadlessState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Closest table entry to `candidate`, the way a driver's chooser answers.
    fn probe(&self, candidate: FormatCandidate) -> Option<PixelFormat> {
        let mut state = self.lock();
        state.calls.push(NativeCall::ProbeFormat(candidate));
        let buffering: Vec<PixelFormat> = state
            .formats
            .iter()
            .copied()
            .filter(|format| format.double_buffer == candidate.double_buffer)
            .collect();
        buffering
            .iter()
            .copied()
            .find(|format| format.satisfies(candidate.color_bits, candidate.depth_bits))
            .or_else(|| buffering.first().copied())
    }
}

impl NativeSurfaceBackend for HeadlessBackend {
    type Commands = HeadlessCommands;

    fn platform(&self) -> Platform {
        Platform::Headless
    }

    fn last_error(&self) -> i64 {
        self.lock().error_code
    }

    fn attach_window(&self, descriptor: &WindowDescriptor) -> Result<Drawable, NativeError> {
        let mut state = self.lock();
        state.calls.push(NativeCall::AttachWindow {
            parent: descriptor.parent,
        });
        state.fail(HeadlessFailure::AttachWindow)?;
        let size = state.clamp(descriptor.width, descriptor.height);
        state.geometry.insert(descriptor.parent, size);
        Ok(Drawable::parent_only(descriptor.parent, state.parent_depth))
    }

    fn choose_pixel_format(
        &self,
        drawable: &Drawable,
        request: &FormatRequest,
    ) -> Option<PixelFormat> {
        let parent = {
            let state = self.lock();
            state
                .parent_format
                .and_then(|id| state.formats.iter().copied().find(|f| f.id == id))
        };
        if let Some(format) = parent.filter(|format| format.meets(request)) {
            tracing::trace!(window = ?drawable.window, id = format.id, "parent format reused");
            return Some(format);
        }
        pixel_format::search(request.double_buffer, |candidate| self.probe(candidate))
    }

    fn apply_pixel_format(&self, drawable: Drawable, format: &PixelFormat) -> Result<Drawable, NativeError> {
        let mut state = self.lock();
        state
            .calls
            .push(NativeCall::ApplyPixelFormat { format: format.id });
        state.fail(HeadlessFailure::ApplyPixelFormat)?;
        if !format.needs_palette {
            return Ok(drawable);
        }
        let palette = state.fresh_handle();
        state.live_palettes.insert(palette);
        state.calls.push(NativeCall::RealizePalette { palette });
        Ok(Drawable {
            palette: Some(palette),
            ..drawable
        })
    }

    fn create_context(
        &self,
        _drawable: &Drawable,
        _format: &PixelFormat,
        share: Option<&NativeHandle>,
    ) -> Result<NativeHandle, NativeError> {
        let mut state = self.lock();
        state.calls.push(NativeCall::CreateContext {
            share: share.copied(),
        });
        state.fail(HeadlessFailure::CreateContext)?;
        let handle = state.fresh_handle();
        state.live_contexts.insert(handle);
        Ok(handle)
    }

    fn share_context(&self, share: &NativeHandle, context: &NativeHandle) -> Result<(), NativeError> {
        let mut state = self.lock();
        state.calls.push(NativeCall::ShareContext {
            share: *share,
            context: *context,
        });
        state.fail(HeadlessFailure::ShareContext)?;
        if !state.live_contexts.contains(share) {
            return Err(NativeError::new(
                state.error_code,
                format!("{share:?} is not a live context"),
            ));
        }
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
        let mut state = self.lock();
        let child = state.parent_format != Some(format.id);
        state
            .calls
            .push(NativeCall::RealizeDrawable { child, background });
        state.fail(HeadlessFailure::RealizeDrawable)?;
        if !child {
            return Ok(drawable);
        }
        let window = state.fresh_handle();
        let colormap = state.fresh_handle();
        state.live_windows.insert(window);
        let size = state.clamp(width, height);
        state.geometry.insert(window, size);
        Ok(Drawable {
            window,
            colormap: Some(colormap),
            ..drawable
        })
    }

    fn make_current(&self, _drawable: &Drawable, context: &NativeHandle) -> bool {
        let mut state = self.lock();
        state
            .calls
            .push(NativeCall::MakeCurrent { context: *context });
        if state.fail(HeadlessFailure::MakeCurrent).is_err() || !state.live_contexts.contains(context)
        {
            return false;
        }
        state.current = Some(*context);
        true
    }

    fn query_geometry(&self, drawable: &Drawable) -> Option<(u32, u32)> {
        let mut state = self.lock();
        state.calls.push(NativeCall::QueryGeometry);
        state.geometry.get(&drawable.window).copied()
    }

    fn resize_drawable(&self, drawable: &Drawable, width: u32, height: u32) -> Result<(), NativeError> {
        let mut state = self.lock();
        state
            .calls
            .push(NativeCall::ResizeDrawable { width, height });
        state.fail(HeadlessFailure::ResizeDrawable)?;
        let size = state.clamp(width, height);
        state.geometry.insert(drawable.window, size);
        Ok(())
    }

    fn destroy_context(&self, _drawable: &Drawable, context: &NativeHandle) {
        let mut state = self.lock();
        state
            .calls
            .push(NativeCall::DestroyContext { context: *context });
        state.live_contexts.remove(context);
        if state.current == Some(*context) {
            state.current = None;
        }
    }

    fn can_destroy_context(&self) -> bool {
        let state = self.lock();
        !state.teardown_needs_current || state.current.is_some()
    }

    fn release_drawable(&self, drawable: &Drawable) {
        let mut state = self.lock();
        state.calls.push(NativeCall::ReleaseDrawable {
            window: drawable.window,
        });
        if let Some(palette) = drawable.palette {
            state.live_palettes.remove(&palette);
        }
        if drawable.is_child() {
            state.live_windows.remove(&drawable.window);
            state.geometry.remove(&drawable.window);
        }
    }

    fn load_commands(
        &self,
        _drawable: &Drawable,
        _context: &NativeHandle,
    ) -> Result<HeadlessCommands, NativeError> {
        let mut state = self.lock();
        state.calls.push(NativeCall::LoadCommands);
        state.fail(HeadlessFailure::LoadCommands)?;
        Ok(HeadlessCommands {
            state: Arc::clone(&self.state),
        })
    }
}

/// GL command recorder paired with a [`HeadlessBackend`].
#[derive(Debug, Clone)]
pub struct HeadlessCommands {
    state: Arc<Mutex<HeadlessState>>,
}

impl HeadlessCommands {
    fn record(&self, call: GlCall) {
        self.state
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .calls
            .push(NativeCall::Gl(call));
    }
}

impl GlCommands for HeadlessCommands {
    fn viewport(&self, x: i32, y: i32, width: i32, height: i32) {
        self.record(GlCall::Viewport {
            x,
            y,
            width,
            height,
        });
    }

    fn set_capability(&self, capability: Capability, enabled: bool) {
        self.record(GlCall::Capability {
            capability,
            enabled,
        });
    }

    fn draw_buffer(&self, target: DrawBuffer) {
        self.record(GlCall::DrawBuffer(target));
    }

    fn pixel_transfer(&self, param: PixelTransfer, value: i32) {
        self.record(GlCall::PixelTransfer { param, value });
    }

    fn load_ortho_2d(&self, width: f64, height: f64) {
        self.record(GlCall::Ortho2d { width, height });
    }

    fn raster_pos(&self, x: i32, y: i32) {
        self.record(GlCall::RasterPos { x, y });
    }

    fn read_depth_pixels(&self, rect: Rect, out: &mut [f32]) {
        let fill = {
            let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
            state.calls.push(NativeCall::Gl(GlCall::ReadDepth(rect)));
            state.depth_fill
        };
        out.fill(fill);
    }

    fn polygon_offset(&self, factor: f32, units: f32) {
        self.record(GlCall::PolygonOffset { factor, units });
    }
}
