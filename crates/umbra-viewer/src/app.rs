use anyhow::{Context, Result};
use ouroboros::self_referencing;

use winit::application::ApplicationHandler;
use winit::dpi::{LogicalSize, PhysicalSize};
use winit::event::{ElementState, KeyEvent, WindowEvent};
use winit::event_loop::{ActiveEventLoop, ControlFlow, EventLoop};
use winit::keyboard::{KeyCode, PhysicalKey};
use winit::window::{Window, WindowId};

use umbra_engine::backend::wgpu::{Gpu, GpuInit, SurfaceErrorAction, WgpuDevice};
use umbra_engine::renderer::{DeferredRenderer, GBuffer, GBufferClear, RendererConfig};

use crate::clock::FrameClock;
use crate::scene::Scene;

/// Window configuration for the viewer.
#[derive(Debug, Clone)]
pub struct ViewerConfig {
    pub title: String,
    pub initial_size: LogicalSize<f64>,
    pub renderer: RendererConfig,
    pub gpu: GpuInit,
}

impl Default for ViewerConfig {
    fn default() -> Self {
        Self {
            title: "umbra".to_string(),
            initial_size: LogicalSize::new(1280.0, 720.0),
            renderer: RendererConfig::default(),
            gpu: GpuInit::default(),
        }
    }
}

/// What ends up on screen.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
enum ViewMode {
    Lit,
    Channel(GBuffer),
}

#[self_referencing]
struct WindowEntry {
    window: Window,

    #[borrows(window)]
    #[covariant]
    gpu: Gpu<'this>,
}

struct Viewer {
    device: WgpuDevice,
    renderer: DeferredRenderer<WgpuDevice>,
    scene: Scene<WgpuDevice>,
    clock: FrameClock,
    view: ViewMode,
    // Declared last so GPU resources drop before the surface and window.
    entry: WindowEntry,
}

impl Viewer {
    fn new(event_loop: &ActiveEventLoop, config: &ViewerConfig) -> Result<Self> {
        let attrs = Window::default_attributes()
            .with_title(config.title.clone())
            .with_inner_size(config.initial_size);
        let window = event_loop
            .create_window(attrs)
            .context("failed to create window")?;

        let gpu_init = config.gpu.clone();
        let entry = WindowEntryTryBuilder {
            window,
            gpu_builder: |w| pollster::block_on(Gpu::new(w, gpu_init)),
        }
        .try_build()
        .context("GPU initialization failed for window")?;

        let size = entry.borrow_gpu().size();
        let mut device = entry.borrow_gpu().create_device();
        let renderer_config = config.renderer.clone().with_size(size.width, size.height);
        let mut renderer = DeferredRenderer::new(&mut device, renderer_config)
            .context("failed to create deferred renderer")?;
        let scene = Scene::new(&mut device, &mut renderer, size.width, size.height)
            .context("failed to build scene")?;

        log::info!(
            "viewer ready at {}x{} ({:?})",
            size.width,
            size.height,
            device.surface_format()
        );

        Ok(Self {
            device,
            renderer,
            scene,
            clock: FrameClock::default(),
            view: ViewMode::Lit,
            entry,
        })
    }

    fn request_redraw(&self) {
        self.entry.with_window(|w| w.request_redraw());
    }

    fn resize(&mut self, size: PhysicalSize<u32>) {
        self.entry.with_gpu_mut(|gpu| gpu.resize(size));
        if size.width == 0 || size.height == 0 {
            return;
        }

        self.device.resize(size.width, size.height);
        if let Err(e) = self
            .renderer
            .resize(&mut self.device, size.width, size.height)
        {
            log::error!("g-buffer resize failed, keeping previous size: {e:#}");
        }
        self.scene.set_aspect(size.width, size.height);
    }

    fn handle_key(&mut self, event: &KeyEvent) -> bool {
        if event.state != ElementState::Pressed || event.repeat {
            return false;
        }
        let PhysicalKey::Code(code) = event.physical_key else {
            return false;
        };

        match code {
            KeyCode::Escape => return true,
            KeyCode::KeyO => {
                let enabled = !self.renderer.ssao_toggle();
                self.renderer.toggle_ssao(enabled);
                log::info!("ssao {}", if enabled { "on" } else { "off" });
            }
            KeyCode::KeyB => {
                let shown = self.scene.toggle_bounds();
                log::info!("morph bounds {}", if shown { "shown" } else { "hidden" });
            }
            KeyCode::Digit0 => self.set_view(ViewMode::Lit),
            KeyCode::Digit1 => self.show_channel(0),
            KeyCode::Digit2 => self.show_channel(1),
            KeyCode::Digit3 => self.show_channel(2),
            KeyCode::Digit4 => self.show_channel(3),
            KeyCode::Digit5 => self.show_channel(4),
            KeyCode::Digit6 => self.show_channel(5),
            KeyCode::Digit7 => self.show_channel(6),
            _ => {}
        }
        false
    }

    fn show_channel(&mut self, index: u32) {
        match GBuffer::try_from(index) {
            Ok(kind) => self.set_view(ViewMode::Channel(kind)),
            Err(e) => log::warn!("{e}"),
        }
    }

    fn set_view(&mut self, view: ViewMode) {
        if self.view != view {
            log::info!("view mode {view:?}");
            self.view = view;
        }
    }

    /// Renders and presents one frame. Errors are fatal.
    fn redraw(&mut self) -> Result<()> {
        let time = self.clock.tick();
        self.scene.update(&mut self.renderer, time.dt);

        let frame = match self.entry.borrow_gpu().acquire() {
            Ok(frame) => frame,
            Err(err) => {
                log::warn!("surface error: {err}");
                return match self.entry.with_gpu_mut(|gpu| gpu.handle_surface_error(err)) {
                    SurfaceErrorAction::Fatal => Err(anyhow::anyhow!("surface is out of memory")),
                    SurfaceErrorAction::Reconfigured | SurfaceErrorAction::SkipFrame => {
                        self.clock.reset();
                        Ok(())
                    }
                };
            }
        };

        let device = &mut self.device;
        let renderer = &mut self.renderer;
        let scene = &mut self.scene;

        device.begin_frame(&frame.view);

        renderer.clear_geometry_buffers(device, &GBufferClear::default());
        renderer.begin_deferred_state(device);
        scene.draw_geometry(device);
        renderer.end_deferred_state(device, scene.camera(), scene.frustum());

        match self.view {
            ViewMode::Lit => {
                renderer.apply_lighting_phase(device, scene.camera());
                renderer.begin_forward_state(device);
                scene.draw_forward(device, renderer);
                renderer.end_forward_state(device);
            }
            ViewMode::Channel(kind) => renderer.show_gbuffer(device, kind),
        }

        device.end_frame();
        self.entry.borrow_gpu().present(frame);

        if time.frame_index % 600 == 0 {
            log::debug!(
                "frame {} at {:.1}s ({:.2} ms)",
                time.frame_index,
                self.scene.time(),
                time.dt * 1000.0
            );
        }
        Ok(())
    }
}

struct ViewerApp {
    config: ViewerConfig,
    viewer: Option<Viewer>,
    error: Option<anyhow::Error>,
}

impl ViewerApp {
    fn fail(&mut self, event_loop: &ActiveEventLoop, error: anyhow::Error) {
        log::error!("{error:#}");
        self.error = Some(error);
        self.viewer = None;
        event_loop.exit();
    }
}

impl ApplicationHandler for ViewerApp {
    fn resumed(&mut self, event_loop: &ActiveEventLoop) {
        if self.viewer.is_some() {
            return;
        }

        match Viewer::new(event_loop, &self.config) {
            Ok(viewer) => {
                viewer.request_redraw();
                self.viewer = Some(viewer);
            }
            Err(e) => self.fail(event_loop, e.context("failed to create viewer window")),
        }
    }

    fn about_to_wait(&mut self, event_loop: &ActiveEventLoop) {
        event_loop.set_control_flow(ControlFlow::Wait);

        // Continuous redraw; the scene animates every frame.
        if let Some(viewer) = &self.viewer {
            viewer.request_redraw();
        }
    }

    fn window_event(
        &mut self,
        event_loop: &ActiveEventLoop,
        _window_id: WindowId,
        event: WindowEvent,
    ) {
        let Some(viewer) = self.viewer.as_mut() else {
            return;
        };

        match event {
            WindowEvent::CloseRequested => {
                self.viewer = None;
                event_loop.exit();
            }

            WindowEvent::Resized(new_size) => {
                viewer.resize(new_size);
                viewer.request_redraw();
            }

            WindowEvent::ScaleFactorChanged { .. } => {
                let new_size = viewer.entry.with_window(|w| w.inner_size());
                viewer.resize(new_size);
                viewer.request_redraw();
            }

            WindowEvent::KeyboardInput { event, .. } => {
                if viewer.handle_key(&event) {
                    self.viewer = None;
                    event_loop.exit();
                }
            }

            WindowEvent::RedrawRequested => {
                if let Err(e) = viewer.redraw() {
                    self.fail(event_loop, e);
                }
            }

            _ => {}
        }
    }
}

/// Opens the viewer window and runs the event loop until it closes.
pub fn run(config: ViewerConfig) -> Result<()> {
    let event_loop = EventLoop::new().context("failed to create winit EventLoop")?;
    let mut app = ViewerApp {
        config,
        viewer: None,
        error: None,
    };

    event_loop
        .run_app(&mut app)
        .context("winit event loop terminated with error")?;

    match app.error {
        Some(e) => Err(e),
        None => Ok(()),
    }
}
