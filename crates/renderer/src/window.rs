use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use anyhow::{anyhow, Result};
use crossbeam_channel::{bounded, unbounded, Receiver, Sender};
use scheduler::RunId;
use winit::dpi::PhysicalSize;
use winit::event::{ElementState, Event, KeyEvent, WindowEvent};
use winit::event_loop::{ControlFlow, EventLoopBuilder, EventLoopProxy};
use winit::keyboard::{Key, NamedKey};
use winit::window::WindowBuilder;

use tracing::{error, info, warn};

use crate::controller::{create_dissolve, FrameOutcome};
use crate::types::{DissolveConfig, SurfaceAlpha};

/// How often the event loop wakes to check on a loading setup.
const SETUP_POLL_INTERVAL: Duration = Duration::from_millis(16);

/// Window-level knobs for [`DissolveElement`].
#[derive(Debug, Clone)]
pub struct ElementOptions {
    pub title: String,
    /// Size used until the source image is known.
    pub initial_size: (u32, u32),
    pub visible: bool,
    /// Start a run as soon as the surface exists.
    pub auto_run: bool,
    /// Close the window once a run finishes or fails.
    pub exit_on_finish: bool,
}

impl Default for ElementOptions {
    fn default() -> Self {
        Self {
            title: "Binary Dissolve".into(),
            initial_size: (800, 600),
            visible: true,
            auto_run: true,
            exit_on_finish: false,
        }
    }
}

/// Notifications emitted by the window thread.
#[derive(Debug, Clone, PartialEq)]
pub enum ElementEvent {
    Started { run: RunId, columns: u32, rows: u32 },
    Finished { run: RunId },
    SetupFailed { message: String },
    Closed,
}

#[derive(Debug, Clone)]
enum ElementCommand {
    Run,
    Clear,
    Shutdown,
}

/// Action bound to a key press inside the window.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum KeyAction {
    Run,
    Clear,
    Close,
}

fn key_action(key: &Key) -> Option<KeyAction> {
    match key {
        Key::Named(NamedKey::Escape) => Some(KeyAction::Close),
        Key::Character(value) if value.eq_ignore_ascii_case("r") => Some(KeyAction::Run),
        Key::Character(value) if value.eq_ignore_ascii_case("c") => Some(KeyAction::Clear),
        _ => None,
    }
}

fn pressed_action(event: &KeyEvent) -> Option<KeyAction> {
    if event.state != ElementState::Pressed || event.repeat {
        return None;
    }
    key_action(&event.logical_key)
}

/// A window hosting one dissolve, driven from its own thread.
///
/// The element owns the event loop; callers steer it with [`Self::run`] and
/// [`Self::clear`] and observe it through [`Self::recv_event`].
pub struct DissolveElement {
    proxy: EventLoopProxy<ElementCommand>,
    events: Receiver<ElementEvent>,
    join_handle: Option<JoinHandle<Result<()>>>,
}

impl DissolveElement {
    pub fn spawn(config: DissolveConfig, options: ElementOptions) -> Result<Self> {
        let (ready_tx, ready_rx) = bounded(1);
        let (event_tx, event_rx) = unbounded();
        let handle = thread::Builder::new()
            .name("dissolve-window".into())
            .spawn(move || run_window_thread(config, options, ready_tx, event_tx))
            .map_err(|err| anyhow!("failed to spawn window thread: {err}"))?;

        let proxy = ready_rx
            .recv()
            .map_err(|err| anyhow!("window thread failed to initialise: {err}"))??;

        Ok(Self {
            proxy,
            events: event_rx,
            join_handle: Some(handle),
        })
    }

    /// Restarts the dissolve with the current configuration.
    pub fn run(&self) -> Result<()> {
        self.proxy
            .send_event(ElementCommand::Run)
            .map_err(|err| anyhow!(err))
    }

    pub fn clear(&self) -> Result<()> {
        self.proxy
            .send_event(ElementCommand::Clear)
            .map_err(|err| anyhow!(err))
    }

    /// Blocks until the next event; `None` once the window thread is gone.
    pub fn recv_event(&self) -> Option<ElementEvent> {
        self.events.recv().ok()
    }

    /// Waits for the window to close on its own.
    pub fn join(mut self) -> Result<()> {
        match self.join_handle.take() {
            Some(handle) => handle
                .join()
                .map_err(|err| anyhow!("window thread panicked: {err:?}"))?,
            None => Ok(()),
        }
    }

    pub fn shutdown(mut self) -> Result<()> {
        if let Some(handle) = self.join_handle.take() {
            let _ = self.proxy.send_event(ElementCommand::Shutdown);
            handle
                .join()
                .map_err(|err| anyhow!("window thread panicked: {err:?}"))??;
        }
        Ok(())
    }
}

impl Drop for DissolveElement {
    fn drop(&mut self) {
        if let Some(handle) = self.join_handle.take() {
            let _ = self.proxy.send_event(ElementCommand::Shutdown);
            let _ = handle.join();
        }
    }
}

fn run_window_thread(
    config: DissolveConfig,
    options: ElementOptions,
    ready_tx: Sender<Result<EventLoopProxy<ElementCommand>, anyhow::Error>>,
    event_tx: Sender<ElementEvent>,
) -> Result<()> {
    let mut builder = EventLoopBuilder::<ElementCommand>::with_user_event();
    #[cfg(any(target_os = "linux", target_os = "android"))]
    {
        use winit::platform::wayland::EventLoopBuilderExtWayland;
        EventLoopBuilderExtWayland::with_any_thread(&mut builder, true);
    }
    let event_loop = match builder.build() {
        Ok(event_loop) => event_loop,
        Err(err) => {
            let message = format!("failed to create event loop: {err}");
            let _ = ready_tx.send(Err(anyhow!(message.clone())));
            return Err(anyhow!(message));
        }
    };
    let proxy = event_loop.create_proxy();

    let (width, height) = options.initial_size;
    let window = WindowBuilder::new()
        .with_title(options.title.clone())
        .with_inner_size(PhysicalSize::new(width.max(1), height.max(1)))
        .with_transparent(config.surface_alpha == SurfaceAlpha::Transparent)
        .with_visible(options.visible)
        .build(&event_loop);
    let window = match window {
        Ok(window) => Arc::new(window),
        Err(err) => {
            let message = format!("failed to create dissolve window: {err}");
            let _ = ready_tx.send(Err(anyhow!(message.clone())));
            return Err(anyhow!(message));
        }
    };

    let mut controller = match create_dissolve(Arc::clone(&window), window.inner_size(), config) {
        Ok(controller) => controller,
        Err(err) => {
            let message = format!("failed to initialise dissolve renderer: {err}");
            let _ = ready_tx.send(Err(anyhow!(message.clone())));
            return Err(anyhow!(message));
        }
    };

    if options.auto_run {
        controller.run();
    }
    let _ = ready_tx.send(Ok(proxy));

    let closed_tx = event_tx.clone();
    let run_result = event_loop.run(move |event, elwt| match event {
        Event::UserEvent(command) => match command {
            ElementCommand::Run => {
                controller.run();
            }
            ElementCommand::Clear => {
                if let Err(err) = controller.clear() {
                    warn!(error = %err, "failed to clear surface");
                }
            }
            ElementCommand::Shutdown => elwt.exit(),
        },
        Event::WindowEvent { window_id, event } if window_id == window.id() => match event {
            WindowEvent::CloseRequested | WindowEvent::Destroyed => elwt.exit(),
            WindowEvent::KeyboardInput { event, .. } => match pressed_action(&event) {
                Some(KeyAction::Run) => {
                    controller.run();
                }
                Some(KeyAction::Clear) => {
                    if let Err(err) = controller.clear() {
                        warn!(error = %err, "failed to clear surface");
                    }
                }
                Some(KeyAction::Close) => elwt.exit(),
                None => {}
            },
            WindowEvent::Resized(new_size) => {
                controller.resize(new_size);
                window.request_redraw();
            }
            WindowEvent::RedrawRequested => {
                let now = Instant::now();
                let outcome = if controller.wants_frame() {
                    controller.frame(now)
                } else {
                    controller.redraw(now).map(|_| FrameOutcome::Idle)
                };
                match outcome {
                    Ok(FrameOutcome::Presented {
                        run,
                        finished: true,
                        ..
                    }) => {
                        let _ = event_tx.send(ElementEvent::Finished { run });
                        if options.exit_on_finish {
                            elwt.exit();
                        }
                    }
                    Ok(_) => {}
                    Err(err) => match err.as_surface_error() {
                        Some(wgpu::SurfaceError::OutOfMemory) => {
                            error!("surface out of memory; closing dissolve window");
                            elwt.exit();
                        }
                        _ => warn!(error = %err, "failed to render frame"),
                    },
                }
            }
            _ => {}
        },
        Event::AboutToWait => {
            let now = Instant::now();
            match controller.poll_setup(now) {
                Ok(Some(run)) => {
                    let size = controller.surface_size();
                    if window.request_inner_size(size).is_some() {
                        controller.resize(window.inner_size());
                    }
                    let (columns, rows) = controller
                        .cell_size()
                        .map(|cell| cell.grid_dimensions())
                        .unwrap_or((0, 0));
                    let _ = event_tx.send(ElementEvent::Started { run, columns, rows });
                }
                Ok(None) => {}
                Err(err) => {
                    error!(error = %err, "dissolve setup failed");
                    let _ = event_tx.send(ElementEvent::SetupFailed {
                        message: err.to_string(),
                    });
                    if options.exit_on_finish {
                        elwt.exit();
                    }
                }
            }

            if controller.wants_frame() {
                window.request_redraw();
                elwt.set_control_flow(ControlFlow::Wait);
            } else if controller.is_loading() {
                elwt.set_control_flow(ControlFlow::WaitUntil(now + SETUP_POLL_INTERVAL));
            } else {
                elwt.set_control_flow(ControlFlow::Wait);
            }
        }
        _ => {}
    });

    let _ = closed_tx.send(ElementEvent::Closed);
    info!("dissolve window closed");
    run_result.map_err(|err| anyhow!("window event loop error: {err}"))
}
