use std::sync::Arc;

use winit::{
    application::ApplicationHandler,
    event::{ElementState, MouseButton, MouseScrollDelta, WindowEvent},
    event_loop::{ActiveEventLoop, EventLoopProxy},
    window::{Window, WindowId},
};

use crate::clock::host_time_ms;
use crate::config::{DIMX, DIMY, SceneConfig};
use crate::controls::PointerButtons;
use crate::error::{RenderError, RenderResult};
use crate::orchestrator::SceneOrchestrator;
use crate::renderer::Renderer;
use crate::viewport::Viewport;

// Pixels per wheel "line" for touchpads reporting pixel deltas.
const PIXELS_PER_LINE: f64 = 100.0;

/// Events posted back into the loop from async work.
pub enum AppEvent {
    GpuReady(RenderResult<Renderer>),
}

/// winit application: owns the window and, once the GPU is up, the scene.
/// Dropping it releases the window, the surface and every input hook.
pub struct App {
    config: SceneConfig,
    #[cfg_attr(not(target_arch = "wasm32"), allow(dead_code))]
    proxy: EventLoopProxy<AppEvent>,
    window: Option<Arc<Window>>,
    scene: Option<SceneOrchestrator<Renderer>>,
}

impl App {
    pub fn new(config: SceneConfig, proxy: EventLoopProxy<AppEvent>) -> Self {
        Self {
            config,
            proxy,
            window: None,
            scene: None,
        }
    }

    fn viewport(window: &Window) -> Viewport {
        Viewport::from_physical(window.inner_size(), window.scale_factor())
    }

    fn install_renderer(&mut self, event_loop: &ActiveEventLoop, renderer: RenderResult<Renderer>) {
        match renderer {
            Ok(renderer) => {
                let viewport = Self::viewport(renderer.window());
                let window = renderer.window().clone();
                self.scene = Some(SceneOrchestrator::new(self.config.clone(), renderer, viewport));
                log::info!("Started {}", self.config.title);
                window.request_redraw();
            }
            Err(e) => {
                log::error!("GPU initialization failed: {}", e);
                event_loop.exit();
            }
        }
    }

    fn redraw(&mut self, event_loop: &ActiveEventLoop) {
        if let Some(scene) = &mut self.scene {
            match scene.frame(host_time_ms()) {
                Ok(()) => {}
                Err(RenderError::Surface(wgpu::SurfaceError::Lost | wgpu::SurfaceError::Outdated)) => {
                    scene.target_mut().reconfigure();
                }
                Err(RenderError::Surface(wgpu::SurfaceError::OutOfMemory)) => {
                    log::error!("Surface out of memory, exiting");
                    event_loop.exit();
                }
                Err(e) => log::warn!("Render error: {}", e),
            }
        }

        if let Some(window) = &self.window {
            window.request_redraw();
        }
    }
}

impl ApplicationHandler<AppEvent> for App {
    fn resumed(&mut self, event_loop: &ActiveEventLoop) {
        if self.window.is_some() {
            return;
        }

        let attributes = Window::default_attributes()
            .with_title(self.config.title.as_str())
            .with_inner_size(winit::dpi::LogicalSize::new(DIMX, DIMY));

        #[cfg(target_arch = "wasm32")]
        let attributes = {
            use winit::platform::web::WindowAttributesExtWebSys;
            attributes.with_append(true)
        };

        let window = match event_loop.create_window(attributes) {
            Ok(window) => Arc::new(window),
            Err(e) => {
                log::error!("Failed to create window: {}", e);
                event_loop.exit();
                return;
            }
        };
        self.window = Some(window.clone());
        let viewport = Self::viewport(&window);

        cfg_if::cfg_if! {
            if #[cfg(target_arch = "wasm32")] {
                fill_page(&window);
                let proxy = self.proxy.clone();
                wasm_bindgen_futures::spawn_local(async move {
                    let renderer = Renderer::new(window, viewport).await;
                    if proxy.send_event(AppEvent::GpuReady(renderer)).is_err() {
                        log::warn!("Event loop closed before the GPU was ready");
                    }
                });
            } else {
                let renderer = pollster::block_on(Renderer::new(window, viewport));
                self.install_renderer(event_loop, renderer);
            }
        }
    }

    fn user_event(&mut self, event_loop: &ActiveEventLoop, event: AppEvent) {
        match event {
            AppEvent::GpuReady(renderer) => self.install_renderer(event_loop, renderer),
        }
    }

    fn window_event(&mut self, event_loop: &ActiveEventLoop, id: WindowId, event: WindowEvent) {
        let Some(window) = self.window.clone() else {
            return;
        };
        if window.id() != id {
            return;
        }

        match event {
            WindowEvent::CloseRequested => event_loop.exit(),
            WindowEvent::RedrawRequested => self.redraw(event_loop),
            event => {
                let Some(scene) = &mut self.scene else {
                    return;
                };
                match event {
                    WindowEvent::Resized(size) => {
                        scene.resize(Viewport::from_physical(size, window.scale_factor()));
                    }
                    WindowEvent::ScaleFactorChanged { scale_factor, .. } => {
                        scene.resize(Viewport::from_physical(window.inner_size(), scale_factor));
                    }
                    WindowEvent::CursorMoved { position, .. } => {
                        let position = position.to_logical::<f32>(window.scale_factor());
                        scene.pointer_moved(position.x, position.y, host_time_ms());
                    }
                    WindowEvent::MouseInput { state, button, .. } => {
                        let button = match button {
                            MouseButton::Left => PointerButtons::PRIMARY,
                            MouseButton::Right => PointerButtons::SECONDARY,
                            MouseButton::Middle => PointerButtons::MIDDLE,
                            _ => return,
                        };
                        scene.pointer_button(button, state == ElementState::Pressed);
                    }
                    WindowEvent::MouseWheel { delta, .. } => {
                        let lines = match delta {
                            MouseScrollDelta::LineDelta(_, y) => y,
                            MouseScrollDelta::PixelDelta(position) => (position.y / PIXELS_PER_LINE) as f32,
                        };
                        scene.wheel(lines);
                    }
                    _ => {}
                }
            }
        }
    }
}

/// Stretches the canvas over the whole page.
#[cfg(target_arch = "wasm32")]
fn fill_page(window: &Window) {
    use winit::platform::web::WindowExtWebSys;

    if let Some(body) = web_sys::window().and_then(|w| w.document()).and_then(|d| d.body()) {
        let _ = body.style().set_property("margin", "0");
        let _ = body.style().set_property("overflow", "hidden");
    }
    if let Some(canvas) = window.canvas() {
        let style = canvas.style();
        let _ = style.set_property("width", "100vw");
        let _ = style.set_property("height", "100vh");
        let _ = style.set_property("display", "block");
    }
}
