use std::any::Any;
use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::time::Instant;

use anyhow::{Context, Result};
use log::{error, info, warn};
use pollster::block_on;
use winit::application::ApplicationHandler;
use winit::dpi::PhysicalSize;
use winit::event::{DeviceEvent, DeviceId, ElementState, KeyEvent, WindowEvent};
use winit::event_loop::{ActiveEventLoop, ControlFlow, EventLoop};
use winit::keyboard::{KeyCode as WinitKey, PhysicalKey};
use winit::window::{CursorGrabMode, Window, WindowId};

use ray_tracer::app::{load_scene, print_summary};
use ray_tracer::{
    upload_scene, CliOptions, FrameContext, FrameStatus, GpuBackend, InputState, KeyCode,
    NamedKey, Scene, SceneDescription,
};

fn main() {
    env_logger::init();
    if let Err(err) = run() {
        eprintln!("Error: {err:?}");
        std::process::exit(1);
    }
}

fn run() -> Result<()> {
    let options = CliOptions::parse()?;
    let (description, scene) = load_scene(&options)?;
    println!(
        "Loaded {} triangles from {}",
        scene.totals().triangles,
        options.mesh.display()
    );

    if options.summary_only {
        print_summary(&description, &scene);
        return Ok(());
    }

    run_interactive(&description, scene).map_err(|err| {
        if err.downcast_ref::<WindowInitError>().is_some() {
            error!("{err}; use --summary-only to inspect the scene without a window");
        }
        err
    })
}

fn run_interactive(description: &SceneDescription, scene: Scene) -> Result<()> {
    let default_hook = panic::take_hook();
    panic::set_hook(Box::new(|_| {}));
    let event_loop = panic::catch_unwind(AssertUnwindSafe(EventLoop::new));
    panic::set_hook(default_hook);
    let event_loop = event_loop
        .map_err(|panic| WindowInitError::from_panic("event loop", panic))?
        .map_err(|err| WindowInitError::from_error("event loop", err))?;
    event_loop.set_control_flow(ControlFlow::Poll);

    let input = Arc::new(InputState::new());
    let mut app = AppState {
        context: FrameContext::new(description, scene, Arc::clone(&input)),
        input,
        backend: None,
        last_error: None,
    };
    event_loop
        .run_app(&mut app)
        .context("event loop terminated abnormally")?;

    if let Some(err) = app.last_error {
        return Err(err);
    }
    Ok(())
}

struct AppState {
    context: FrameContext,
    input: Arc<InputState>,
    backend: Option<GpuBackend>,
    last_error: Option<anyhow::Error>,
}

impl AppState {
    fn initialize(&mut self, event_loop: &ActiveEventLoop) -> Result<()> {
        let render = self.context.render;
        let window = event_loop
            .create_window(
                Window::default_attributes()
                    .with_title("Ray Tracer")
                    .with_inner_size(PhysicalSize::new(render.width, render.height)),
            )
            .map_err(|err| WindowInitError::from_error("window", err))?;
        let window = Arc::new(window);
        capture_cursor(&window);

        let mut backend = block_on(GpuBackend::new(Arc::clone(&window), render))
            .context("failed to initialize GPU backend")?;
        let outcomes = upload_scene(&mut backend, &self.context.scene)
            .context("failed to upload scene")?;
        info!("scene buffers: {outcomes:?}");
        self.backend = Some(backend);
        Ok(())
    }

    fn fail(&mut self, event_loop: &ActiveEventLoop, err: anyhow::Error) {
        error!("{err:#}");
        if let Some(backend) = self.backend.as_mut() {
            self.context.shutdown(backend);
        }
        self.backend = None;
        self.last_error = Some(err);
        event_loop.exit();
    }

    fn handle_keyboard(&self, event: &KeyEvent) {
        let PhysicalKey::Code(code) = event.physical_key else {
            return;
        };
        let Some(key) = map_keycode(code) else {
            return;
        };
        match event.state {
            ElementState::Pressed => self.input.set_key_down(key),
            ElementState::Released => self.input.set_key_up(key),
        }
    }
}

impl ApplicationHandler for AppState {
    fn resumed(&mut self, event_loop: &ActiveEventLoop) {
        if self.backend.is_some() || self.last_error.is_some() {
            return;
        }
        if let Err(err) = self.initialize(event_loop) {
            self.fail(event_loop, err);
        }
    }

    fn window_event(
        &mut self,
        event_loop: &ActiveEventLoop,
        window_id: WindowId,
        event: WindowEvent,
    ) {
        let Some(backend) = self.backend.as_mut() else {
            return;
        };
        if window_id != backend.window_id() {
            return;
        }
        match event {
            WindowEvent::CloseRequested => {
                self.input.request_exit();
                backend.window().request_redraw();
            }
            WindowEvent::Resized(size) => backend.resize(size),
            WindowEvent::KeyboardInput { event, .. } => self.handle_keyboard(&event),
            WindowEvent::RedrawRequested => {
                match self.context.step(backend, Instant::now()) {
                    Ok(FrameStatus::Continue) => {}
                    Ok(FrameStatus::Exit) => {
                        self.context.shutdown(backend);
                        self.backend = None;
                        event_loop.exit();
                    }
                    Err(err) => self.fail(event_loop, err.into()),
                }
            }
            _ => {}
        }
    }

    fn device_event(
        &mut self,
        _event_loop: &ActiveEventLoop,
        _device_id: DeviceId,
        event: DeviceEvent,
    ) {
        if let DeviceEvent::MouseMotion { delta: (dx, dy) } = event {
            // Screen y grows downwards; moving the pointer up pitches up.
            self.input.add_pointer_delta(dx as f32, -(dy as f32));
        }
    }

    fn about_to_wait(&mut self, _event_loop: &ActiveEventLoop) {
        if let Some(backend) = self.backend.as_ref() {
            backend.window().request_redraw();
        }
    }
}

fn capture_cursor(window: &Window) {
    let grabbed = window
        .set_cursor_grab(CursorGrabMode::Locked)
        .or_else(|_| window.set_cursor_grab(CursorGrabMode::Confined));
    if let Err(err) = grabbed {
        warn!("unable to capture the cursor: {err}");
    }
    window.set_cursor_visible(false);
}

#[derive(Debug)]
struct WindowInitError {
    message: String,
}

impl WindowInitError {
    fn from_panic(stage: &str, panic: Box<dyn Any + Send>) -> Self {
        Self {
            message: format!("failed to initialize {stage}: {}", panic_message(panic)),
        }
    }

    fn from_error(stage: &str, err: impl fmt::Display) -> Self {
        Self {
            message: format!("failed to initialize {stage}: {err}"),
        }
    }
}

impl fmt::Display for WindowInitError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.message)
    }
}

impl std::error::Error for WindowInitError {}

fn panic_message(panic: Box<dyn Any + Send>) -> String {
    match panic.downcast::<String>() {
        Ok(msg) => *msg,
        Err(panic) => match panic.downcast::<&'static str>() {
            Ok(msg) => (*msg).to_string(),
            Err(_) => "unknown panic".into(),
        },
    }
}

fn map_keycode(code: WinitKey) -> Option<KeyCode> {
    Some(match code {
        WinitKey::KeyW => KeyCode::Character('W'),
        WinitKey::KeyA => KeyCode::Character('A'),
        WinitKey::KeyS => KeyCode::Character('S'),
        WinitKey::KeyD => KeyCode::Character('D'),
        WinitKey::KeyC => KeyCode::Character('C'),
        WinitKey::Space => KeyCode::Named(NamedKey::Space),
        WinitKey::Escape => KeyCode::Named(NamedKey::Escape),
        _ => return None,
    })
}
