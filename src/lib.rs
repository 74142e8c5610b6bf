pub mod app;
pub mod assets;
pub mod camera;
pub mod clock;
pub mod config;
pub mod controls;
pub mod draco;
pub mod error;
pub mod material;
pub mod model;
pub mod orchestrator;
pub mod pointer;
pub mod renderer;
pub mod scene;
pub mod shaders;
pub mod tween;
pub mod viewport;

pub use app::{App, AppEvent};
pub use config::SceneConfig;
pub use error::{AssetError, RenderError, SceneError};
pub use orchestrator::{Frame, ModelHandle, ModelState, RenderTarget, SceneOrchestrator};
pub use renderer::Renderer;
pub use viewport::Viewport;

use winit::event_loop::{ControlFlow, EventLoop};

#[cfg(target_arch = "wasm32")]
use wasm_bindgen::prelude::*;

// ======================================
// === MAIN ENTRY POINT ===
// ======================================

#[cfg_attr(target_arch = "wasm32", wasm_bindgen(start))]
pub fn run() {
    cfg_if::cfg_if! {
        if #[cfg(target_arch = "wasm32")] {
            std::panic::set_hook(Box::new(console_error_panic_hook::hook));
            if console_log::init_with_level(log::Level::Info).is_err() {
                web_sys::console::warn_1(&"Logger already initialized".into());
            }
        } else {
            env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
        }
    }

    let event_loop = match EventLoop::<AppEvent>::with_user_event().build() {
        Ok(event_loop) => event_loop,
        Err(e) => {
            log::error!("Failed to create event loop: {}", e);
            return;
        }
    };
    event_loop.set_control_flow(ControlFlow::Poll);

    let app = App::new(SceneConfig::default(), event_loop.create_proxy());

    cfg_if::cfg_if! {
        if #[cfg(target_arch = "wasm32")] {
            use winit::platform::web::EventLoopExtWebSys;
            event_loop.spawn_app(app);
        } else {
            let mut app = app;
            if let Err(e) = event_loop.run_app(&mut app) {
                log::error!("Event loop error: {}", e);
            }
        }
    }
}
