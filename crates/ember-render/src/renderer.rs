//! Frame orchestration.
//!
//! [`Renderer`] drives one frame at a time through
//! `Idle -> FrameStarted -> RenderPassActive -> FrameStarted -> Idle`,
//! cycling its frame slot after every submit. All device work goes through
//! a [`FrameBackend`], which is a [`SwapchainManager`] in the engine and a
//! scripted fake in tests.

use ash::vk;
use ember_core::constants::MAX_FRAMES_IN_FLIGHT;
use ember_gpu::command::{begin_command_buffer, end_command_buffer};
use ember_gpu::error::Result;
use ember_gpu::swapchain::{AcquireOutcome, PresentOutcome, SwapchainManager};
use ember_platform::SurfaceProvider;

/// Default clear color of the swapchain render pass.
pub const DEFAULT_CLEAR_COLOR: [f32; 4] = [0.01, 0.01, 0.01, 1.0];

/// Device operations the frame loop needs.
pub trait FrameBackend {
    /// Current swapchain extent.
    fn extent(&self) -> vk::Extent2D;

    /// Wait for `slot` to be free and acquire the next image.
    fn acquire_next_image(&mut self, slot: usize) -> Result<AcquireOutcome>;

    /// Submit `cmd` for `image_index` on `slot` and present it.
    fn submit_and_present(
        &mut self,
        cmd: vk::CommandBuffer,
        image_index: u32,
        slot: usize,
    ) -> Result<PresentOutcome>;

    /// Rebuild the swapchain at `extent`.
    fn recreate(&mut self, extent: vk::Extent2D) -> Result<()>;

    /// Allocate `count` primary command buffers.
    fn allocate_command_buffers(&mut self, count: usize) -> Result<Vec<vk::CommandBuffer>>;

    /// Return buffers from [`allocate_command_buffers`](Self::allocate_command_buffers).
    fn free_command_buffers(&mut self, buffers: &[vk::CommandBuffer]);

    /// Begin recording `cmd`.
    fn begin_commands(&mut self, cmd: vk::CommandBuffer) -> Result<()>;

    /// Finish recording `cmd`.
    fn end_commands(&mut self, cmd: vk::CommandBuffer) -> Result<()>;

    /// Begin the main render pass on the framebuffer of `image_index`.
    fn begin_render_pass(
        &mut self,
        cmd: vk::CommandBuffer,
        image_index: u32,
        clear_values: &[vk::ClearValue],
    );

    /// End the main render pass.
    fn end_render_pass(&mut self, cmd: vk::CommandBuffer);

    /// Set the dynamic viewport and scissor.
    fn set_viewport_scissor(&mut self, cmd: vk::CommandBuffer, viewport: vk::Viewport, scissor: vk::Rect2D);

    /// Block until the device has no pending work.
    fn wait_idle(&self) -> Result<()>;
}

impl FrameBackend for SwapchainManager {
    fn extent(&self) -> vk::Extent2D {
        Self::extent(self)
    }

    fn acquire_next_image(&mut self, slot: usize) -> Result<AcquireOutcome> {
        Self::acquire_next_image(self, slot)
    }

    fn submit_and_present(
        &mut self,
        cmd: vk::CommandBuffer,
        image_index: u32,
        slot: usize,
    ) -> Result<PresentOutcome> {
        Self::submit_and_present(self, cmd, image_index, slot)
    }

    fn recreate(&mut self, extent: vk::Extent2D) -> Result<()> {
        Self::recreate(self, extent)
    }

    fn allocate_command_buffers(&mut self, count: usize) -> Result<Vec<vk::CommandBuffer>> {
        let ctx = self.context();
        unsafe {
            ctx.command_pool().allocate_command_buffers(
                ctx.device(),
                vk::CommandBufferLevel::PRIMARY,
                count as u32,
            )
        }
    }

    fn free_command_buffers(&mut self, buffers: &[vk::CommandBuffer]) {
        let ctx = self.context();
        unsafe { ctx.command_pool().free_command_buffers(ctx.device(), buffers) };
    }

    fn begin_commands(&mut self, cmd: vk::CommandBuffer) -> Result<()> {
        unsafe {
            begin_command_buffer(
                self.context().device(),
                cmd,
                vk::CommandBufferUsageFlags::empty(),
            )
        }
    }

    fn end_commands(&mut self, cmd: vk::CommandBuffer) -> Result<()> {
        unsafe { end_command_buffer(self.context().device(), cmd) }
    }

    fn begin_render_pass(
        &mut self,
        cmd: vk::CommandBuffer,
        image_index: u32,
        clear_values: &[vk::ClearValue],
    ) {
        let begin_info = vk::RenderPassBeginInfo::default()
            .render_pass(self.render_pass())
            .framebuffer(self.framebuffer(image_index))
            .render_area(vk::Rect2D {
                offset: vk::Offset2D::default(),
                extent: self.extent(),
            })
            .clear_values(clear_values);

        unsafe {
            self.context()
                .device()
                .cmd_begin_render_pass(cmd, &begin_info, vk::SubpassContents::INLINE);
        }
    }

    fn end_render_pass(&mut self, cmd: vk::CommandBuffer) {
        unsafe { self.context().device().cmd_end_render_pass(cmd) };
    }

    fn set_viewport_scissor(&mut self, cmd: vk::CommandBuffer, viewport: vk::Viewport, scissor: vk::Rect2D) {
        let device = self.context().device();
        unsafe {
            device.cmd_set_viewport(cmd, 0, &[viewport]);
            device.cmd_set_scissor(cmd, 0, &[scissor]);
        }
    }

    fn wait_idle(&self) -> Result<()> {
        self.context().wait_idle()
    }
}

/// Where the renderer is within a frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameState {
    Idle,
    FrameStarted,
    RenderPassActive,
}

/// Frame orchestrator.
pub struct Renderer<B: FrameBackend> {
    backend: B,
    command_buffers: Vec<vk::CommandBuffer>,
    state: FrameState,
    frame_index: usize,
    image_index: u32,
    recreate_pending: bool,
    clear_color: [f32; 4],
    frames_started: u64,
    recreations: u64,
}

impl<B: FrameBackend> Renderer<B> {
    /// Create a renderer with one command buffer per frame slot.
    pub fn new(mut backend: B) -> Result<Self> {
        let command_buffers = backend.allocate_command_buffers(MAX_FRAMES_IN_FLIGHT)?;
        Ok(Self {
            backend,
            command_buffers,
            state: FrameState::Idle,
            frame_index: 0,
            image_index: 0,
            recreate_pending: false,
            clear_color: DEFAULT_CLEAR_COLOR,
            frames_started: 0,
            recreations: 0,
        })
    }

    /// Set the color the swapchain render pass clears to.
    pub fn set_clear_color(&mut self, color: [f32; 4]) {
        self.clear_color = color;
    }

    /// Start a frame.
    ///
    /// Returns the slot's command buffer in the recording state, or `None`
    /// when the frame must be skipped because the swapchain was (or still
    /// needs to be) recreated.
    ///
    /// # Panics
    /// If a frame is already in progress.
    #[cfg_attr(feature = "trace-spans", tracing::instrument(level = "trace", skip_all))]
    pub fn begin_frame(&mut self, surface: &impl SurfaceProvider) -> Result<Option<vk::CommandBuffer>> {
        assert!(
            self.state == FrameState::Idle,
            "Can't call begin_frame while already in progress"
        );

        if self.recreate_pending {
            surface.take_resized();
            self.recreate_swapchain(surface)?;
            return Ok(None);
        }

        let outcome = self.backend.acquire_next_image(self.frame_index)?;
        let resized = surface.take_resized();

        let image_index = match outcome {
            AcquireOutcome::Image(index) if !resized => index,
            _ => {
                self.recreate_swapchain(surface)?;
                return Ok(None);
            }
        };

        let cmd = self.command_buffers[self.frame_index];
        self.backend.begin_commands(cmd)?;

        self.image_index = image_index;
        self.state = FrameState::FrameStarted;
        self.frames_started += 1;
        Ok(Some(cmd))
    }

    /// Finish recording, submit and present.
    ///
    /// The frame slot advances even when presentation asks for a rebuild.
    ///
    /// # Panics
    /// If no frame is in progress or the swapchain render pass is still
    /// active.
    #[cfg_attr(feature = "trace-spans", tracing::instrument(level = "trace", skip_all))]
    pub fn end_frame(&mut self, surface: &impl SurfaceProvider) -> Result<()> {
        match self.state {
            FrameState::FrameStarted => {}
            FrameState::RenderPassActive => {
                panic!("Can't call end_frame while the swapchain render pass is active")
            }
            FrameState::Idle => panic!("Can't call end_frame while frame is not in progress"),
        }

        let cmd = self.command_buffers[self.frame_index];
        self.backend.end_commands(cmd)?;

        let presented = self
            .backend
            .submit_and_present(cmd, self.image_index, self.frame_index);

        self.state = FrameState::Idle;
        self.frame_index = (self.frame_index + 1) % MAX_FRAMES_IN_FLIGHT;

        let resized = surface.take_resized();
        if presented? == PresentOutcome::NeedsRecreate || resized {
            self.recreate_swapchain(surface)?;
        }
        Ok(())
    }

    /// Begin the swapchain render pass with a full-extent viewport and
    /// scissor.
    ///
    /// # Panics
    /// If no frame is in progress or `cmd` is not the current frame's
    /// command buffer.
    pub fn begin_swapchain_render_pass(&mut self, cmd: vk::CommandBuffer) {
        assert!(
            self.state == FrameState::FrameStarted,
            "Can't call begin_swapchain_render_pass if frame is not in progress"
        );
        assert!(
            cmd == self.command_buffers[self.frame_index],
            "Can't begin render pass on command buffer from a different frame"
        );

        let clear_values = [
            vk::ClearValue {
                color: vk::ClearColorValue {
                    float32: self.clear_color,
                },
            },
            vk::ClearValue {
                depth_stencil: vk::ClearDepthStencilValue {
                    depth: 1.0,
                    stencil: 0,
                },
            },
        ];
        self.backend
            .begin_render_pass(cmd, self.image_index, &clear_values);

        let (viewport, scissor) = full_viewport(self.backend.extent());
        self.backend.set_viewport_scissor(cmd, viewport, scissor);

        self.state = FrameState::RenderPassActive;
    }

    /// End the swapchain render pass.
    ///
    /// # Panics
    /// If the render pass is not active or `cmd` is not the current frame's
    /// command buffer.
    pub fn end_swapchain_render_pass(&mut self, cmd: vk::CommandBuffer) {
        assert!(
            self.state == FrameState::RenderPassActive,
            "Can't call end_swapchain_render_pass if the render pass is not active"
        );
        assert!(
            cmd == self.command_buffers[self.frame_index],
            "Can't end render pass on command buffer from a different frame"
        );

        self.backend.end_render_pass(cmd);
        self.state = FrameState::FrameStarted;
    }

    fn recreate_swapchain(&mut self, surface: &impl SurfaceProvider) -> Result<()> {
        let (width, height) = surface.extent();
        if width == 0 || height == 0 {
            // Minimized: try again on a later frame
            if !self.recreate_pending {
                tracing::debug!("Surface has zero extent, deferring swapchain recreation");
            }
            self.recreate_pending = true;
            return Ok(());
        }

        self.backend.recreate(vk::Extent2D { width, height })?;
        self.recreate_pending = false;
        self.recreations += 1;
        Ok(())
    }

    /// Get the current frame slot.
    pub const fn frame_index(&self) -> usize {
        self.frame_index
    }

    /// Get the frame state.
    pub const fn state(&self) -> FrameState {
        self.state
    }

    /// Whether a frame has begun and not yet ended.
    pub fn is_frame_in_progress(&self) -> bool {
        self.state != FrameState::Idle
    }

    /// Whether a rebuild is waiting for a nonzero surface extent.
    pub const fn is_recreate_pending(&self) -> bool {
        self.recreate_pending
    }

    /// Command buffer of the frame in progress.
    ///
    /// # Panics
    /// If no frame is in progress.
    pub fn current_command_buffer(&self) -> vk::CommandBuffer {
        assert!(
            self.is_frame_in_progress(),
            "Cannot get command buffer when frame not in progress"
        );
        self.command_buffers[self.frame_index]
    }

    /// Width over height of the swapchain.
    pub fn aspect_ratio(&self) -> f32 {
        let extent = self.backend.extent();
        extent.width as f32 / extent.height.max(1) as f32
    }

    /// Get the backend.
    pub const fn backend(&self) -> &B {
        &self.backend
    }

    /// Get the backend mutably.
    pub fn backend_mut(&mut self) -> &mut B {
        &mut self.backend
    }

    /// Frames that reached `FrameStarted`.
    pub const fn frames_started(&self) -> u64 {
        self.frames_started
    }

    /// Completed swapchain rebuilds.
    pub const fn recreation_count(&self) -> u64 {
        self.recreations
    }
}

impl<B: FrameBackend> Drop for Renderer<B> {
    fn drop(&mut self) {
        if let Err(e) = self.backend.wait_idle() {
            tracing::error!("Failed to wait for device idle: {e}");
        }
        self.backend.free_command_buffers(&self.command_buffers);
    }
}

/// Viewport and scissor covering `extent`.
pub fn full_viewport(extent: vk::Extent2D) -> (vk::Viewport, vk::Rect2D) {
    let viewport = vk::Viewport {
        x: 0.0,
        y: 0.0,
        width: extent.width as f32,
        height: extent.height as f32,
        min_depth: 0.0,
        max_depth: 1.0,
    };
    let scissor = vk::Rect2D {
        offset: vk::Offset2D { x: 0, y: 0 },
        extent,
    };
    (viewport, scissor)
}

#[cfg(test)]
mod tests {
    use super::*;
    use ash::vk::Handle;
    use ember_platform::ResizeLatch;
    use std::cell::{Cell, RefCell};
    use std::collections::VecDeque;
    use std::rc::Rc;

    #[derive(Debug, Clone, Copy)]
    enum Call {
        Acquire(usize),
        Submit { image: u32, slot: usize },
        Recreate(vk::Extent2D),
        BeginPass(u32),
        EndPass,
        Viewport(vk::Viewport, vk::Rect2D),
    }

    struct ScriptedBackend {
        extent: vk::Extent2D,
        image_count: u32,
        next_image: u32,
        acquire_script: VecDeque<AcquireOutcome>,
        present_script: VecDeque<PresentOutcome>,
        calls: Vec<Call>,
        freed: Rc<RefCell<Vec<vk::CommandBuffer>>>,
    }

    impl ScriptedBackend {
        fn new(width: u32, height: u32) -> Self {
            Self {
                extent: vk::Extent2D { width, height },
                image_count: 3,
                next_image: 0,
                acquire_script: VecDeque::new(),
                present_script: VecDeque::new(),
                calls: Vec::new(),
                freed: Rc::default(),
            }
        }

        fn count(&self, pred: impl Fn(&Call) -> bool) -> usize {
            self.calls.iter().filter(|c| pred(c)).count()
        }
    }

    impl FrameBackend for ScriptedBackend {
        fn extent(&self) -> vk::Extent2D {
            self.extent
        }

        fn acquire_next_image(&mut self, slot: usize) -> Result<AcquireOutcome> {
            self.calls.push(Call::Acquire(slot));
            Ok(self.acquire_script.pop_front().unwrap_or_else(|| {
                let image = self.next_image;
                self.next_image = (self.next_image + 1) % self.image_count;
                AcquireOutcome::Image(image)
            }))
        }

        fn submit_and_present(
            &mut self,
            _cmd: vk::CommandBuffer,
            image_index: u32,
            slot: usize,
        ) -> Result<PresentOutcome> {
            self.calls.push(Call::Submit {
                image: image_index,
                slot,
            });
            Ok(self
                .present_script
                .pop_front()
                .unwrap_or(PresentOutcome::Presented))
        }

        fn recreate(&mut self, extent: vk::Extent2D) -> Result<()> {
            self.calls.push(Call::Recreate(extent));
            self.extent = extent;
            self.next_image = 0;
            Ok(())
        }

        fn allocate_command_buffers(&mut self, count: usize) -> Result<Vec<vk::CommandBuffer>> {
            Ok((0..count as u64)
                .map(|i| vk::CommandBuffer::from_raw(100 + i))
                .collect())
        }

        fn free_command_buffers(&mut self, buffers: &[vk::CommandBuffer]) {
            self.freed.borrow_mut().extend_from_slice(buffers);
        }

        fn begin_commands(&mut self, _cmd: vk::CommandBuffer) -> Result<()> {
            Ok(())
        }

        fn end_commands(&mut self, _cmd: vk::CommandBuffer) -> Result<()> {
            Ok(())
        }

        fn begin_render_pass(
            &mut self,
            _cmd: vk::CommandBuffer,
            image_index: u32,
            _clear_values: &[vk::ClearValue],
        ) {
            self.calls.push(Call::BeginPass(image_index));
        }

        fn end_render_pass(&mut self, _cmd: vk::CommandBuffer) {
            self.calls.push(Call::EndPass);
        }

        fn set_viewport_scissor(
            &mut self,
            _cmd: vk::CommandBuffer,
            viewport: vk::Viewport,
            scissor: vk::Rect2D,
        ) {
            self.calls.push(Call::Viewport(viewport, scissor));
        }

        fn wait_idle(&self) -> Result<()> {
            Ok(())
        }
    }

    struct TestSurface {
        extent: Cell<(u32, u32)>,
        resized: ResizeLatch,
    }

    impl TestSurface {
        fn new(width: u32, height: u32) -> Self {
            Self {
                extent: Cell::new((width, height)),
                resized: ResizeLatch::new(),
            }
        }

        fn resize(&self, width: u32, height: u32) {
            self.extent.set((width, height));
            self.resized.set();
        }
    }

    impl SurfaceProvider for TestSurface {
        fn extent(&self) -> (u32, u32) {
            self.extent.get()
        }

        fn take_resized(&self) -> bool {
            self.resized.take()
        }
    }

    /// Run one frame; returns the slot it used, or `None` if skipped.
    fn run_frame(
        renderer: &mut Renderer<ScriptedBackend>,
        surface: &TestSurface,
    ) -> Option<usize> {
        let cmd = renderer.begin_frame(surface).unwrap()?;
        let slot = renderer.frame_index();
        renderer.begin_swapchain_render_pass(cmd);
        renderer.end_swapchain_render_pass(cmd);
        renderer.end_frame(surface).unwrap();
        Some(slot)
    }

    fn last_viewport(backend: &ScriptedBackend) -> Option<(vk::Viewport, vk::Rect2D)> {
        backend.calls.iter().rev().find_map(|call| match call {
            Call::Viewport(v, s) => Some((*v, *s)),
            _ => None,
        })
    }

    #[test]
    fn ten_frames_alternate_slots() {
        let surface = TestSurface::new(1280, 720);
        let mut renderer = Renderer::new(ScriptedBackend::new(1280, 720)).unwrap();

        let slots: Vec<_> = (0..10)
            .map(|_| run_frame(&mut renderer, &surface).unwrap())
            .collect();

        assert_eq!(slots, vec![0, 1, 0, 1, 0, 1, 0, 1, 0, 1]);
        let backend = renderer.backend();
        assert_eq!(backend.count(|c| matches!(c, Call::Acquire(_))), 10);
        assert_eq!(backend.count(|c| matches!(c, Call::Submit { .. })), 10);
        assert_eq!(backend.count(|c| matches!(c, Call::Recreate(_))), 0);
        assert_eq!(renderer.frames_started(), 10);
        assert_eq!(renderer.state(), FrameState::Idle);
    }

    #[test]
    fn submit_uses_the_slot_it_acquired_with() {
        let surface = TestSurface::new(1280, 720);
        let mut renderer = Renderer::new(ScriptedBackend::new(1280, 720)).unwrap();
        for _ in 0..4 {
            run_frame(&mut renderer, &surface);
        }

        let pairs: Vec<_> = renderer
            .backend()
            .calls
            .iter()
            .filter_map(|call| match call {
                Call::Acquire(slot) => Some(*slot),
                Call::Submit { slot, .. } => Some(*slot),
                _ => None,
            })
            .collect();
        assert_eq!(pairs, vec![0, 0, 1, 1, 0, 0, 1, 1]);
    }

    #[test]
    fn resize_between_frames_skips_once_and_recreates_once() {
        let surface = TestSurface::new(1280, 720);
        let mut renderer = Renderer::new(ScriptedBackend::new(1280, 720)).unwrap();

        let mut slots = Vec::new();
        for frame in 1..=10 {
            if frame == 4 {
                surface.resize(1920, 1080);
            }
            let slot = run_frame(&mut renderer, &surface);
            if frame == 4 {
                assert_eq!(slot, None, "frame 4 must be skipped");
                assert_eq!(renderer.recreation_count(), 1);
            } else {
                slots.push(slot.unwrap());
            }
        }

        assert_eq!(slots, vec![0, 1, 0, 1, 0, 1, 0, 1, 0]);
        assert_eq!(renderer.recreation_count(), 1);

        let backend = renderer.backend();
        let recreations: Vec<_> = backend
            .calls
            .iter()
            .filter_map(|call| match call {
                Call::Recreate(extent) => Some(*extent),
                _ => None,
            })
            .collect();
        assert_eq!(
            recreations,
            vec![vk::Extent2D {
                width: 1920,
                height: 1080
            }]
        );

        let (viewport, scissor) = last_viewport(backend).unwrap();
        assert_eq!(viewport.width, 1920.0);
        assert_eq!(viewport.height, 1080.0);
        assert_eq!(scissor.extent.width, 1920);
        assert_eq!(scissor.extent.height, 1080);
        assert_eq!(renderer.aspect_ratio(), 1920.0 / 1080.0);
    }

    #[test]
    fn slot_advances_when_present_requests_rebuild() {
        let surface = TestSurface::new(800, 600);
        let mut backend = ScriptedBackend::new(800, 600);
        backend.present_script = VecDeque::from([
            PresentOutcome::Presented,
            PresentOutcome::NeedsRecreate,
        ]);
        let mut renderer = Renderer::new(backend).unwrap();

        let slots: Vec<_> = (0..4)
            .map(|_| run_frame(&mut renderer, &surface).unwrap())
            .collect();

        assert_eq!(slots, vec![0, 1, 0, 1]);
        assert_eq!(renderer.recreation_count(), 1);
    }

    #[test]
    fn out_of_date_acquire_skips_frame() {
        let surface = TestSurface::new(800, 600);
        let mut backend = ScriptedBackend::new(800, 600);
        backend.acquire_script = VecDeque::from([AcquireOutcome::NeedsRecreate]);
        let mut renderer = Renderer::new(backend).unwrap();

        assert_eq!(run_frame(&mut renderer, &surface), None);
        assert_eq!(renderer.state(), FrameState::Idle);
        assert_eq!(renderer.frame_index(), 0);
        assert_eq!(renderer.recreation_count(), 1);
        assert_eq!(run_frame(&mut renderer, &surface), Some(0));
    }

    #[test]
    fn zero_extent_defers_recreation() {
        let surface = TestSurface::new(800, 600);
        let mut renderer = Renderer::new(ScriptedBackend::new(800, 600)).unwrap();
        run_frame(&mut renderer, &surface);

        surface.resize(0, 0);
        assert_eq!(run_frame(&mut renderer, &surface), None);
        assert!(renderer.is_recreate_pending());
        assert_eq!(run_frame(&mut renderer, &surface), None);
        assert_eq!(renderer.recreation_count(), 0);

        surface.resize(640, 480);
        assert_eq!(run_frame(&mut renderer, &surface), None);
        assert!(!renderer.is_recreate_pending());
        assert_eq!(renderer.recreation_count(), 1);

        assert_eq!(run_frame(&mut renderer, &surface), Some(1));
        let (viewport, _) = last_viewport(renderer.backend()).unwrap();
        assert_eq!(viewport.width, 640.0);
    }

    #[test]
    fn drop_frees_command_buffers() {
        let backend = ScriptedBackend::new(800, 600);
        let freed = Rc::clone(&backend.freed);
        drop(Renderer::new(backend).unwrap());
        assert_eq!(freed.borrow().len(), MAX_FRAMES_IN_FLIGHT);
    }

    #[test]
    #[should_panic(expected = "already in progress")]
    fn double_begin_frame_panics() {
        let surface = TestSurface::new(800, 600);
        let mut renderer = Renderer::new(ScriptedBackend::new(800, 600)).unwrap();
        let _ = renderer.begin_frame(&surface).unwrap();
        let _ = renderer.begin_frame(&surface);
    }

    #[test]
    #[should_panic(expected = "not in progress")]
    fn end_frame_without_begin_panics() {
        let surface = TestSurface::new(800, 600);
        let mut renderer = Renderer::new(ScriptedBackend::new(800, 600)).unwrap();
        let _ = renderer.end_frame(&surface);
    }

    #[test]
    #[should_panic(expected = "different frame")]
    fn foreign_command_buffer_panics() {
        let surface = TestSurface::new(800, 600);
        let mut renderer = Renderer::new(ScriptedBackend::new(800, 600)).unwrap();
        let _ = renderer.begin_frame(&surface).unwrap();
        renderer.begin_swapchain_render_pass(vk::CommandBuffer::from_raw(999));
    }

    #[test]
    #[should_panic(expected = "render pass is active")]
    fn end_frame_inside_render_pass_panics() {
        let surface = TestSurface::new(800, 600);
        let mut renderer = Renderer::new(ScriptedBackend::new(800, 600)).unwrap();
        let cmd = renderer.begin_frame(&surface).unwrap().unwrap();
        renderer.begin_swapchain_render_pass(cmd);
        let _ = renderer.end_frame(&surface);
    }

    #[test]
    fn full_viewport_covers_extent() {
        let (viewport, scissor) = full_viewport(vk::Extent2D {
            width: 1280,
            height: 720,
        });
        assert_eq!((viewport.x, viewport.y), (0.0, 0.0));
        assert_eq!((viewport.width, viewport.height), (1280.0, 720.0));
        assert_eq!((viewport.min_depth, viewport.max_depth), (0.0, 1.0));
        assert_eq!(scissor.offset, vk::Offset2D { x: 0, y: 0 });
    }
}
