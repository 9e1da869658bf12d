use std::sync::Arc;

use anyhow::{anyhow, Context, Result};
use tracing::{error, info, warn};
use tuning::ParameterSet;
use winit::dpi::PhysicalSize;
use winit::event::{ElementState, Event, KeyEvent, WindowEvent};
use winit::event_loop::{ControlFlow, EventLoop};
use winit::keyboard::{Key, NamedKey};
use winit::window::{Window, WindowBuilder};

use crate::clock::{SystemTimeSource, TimeSource};
use crate::gpu::{GpuDevice, GpuOptions};
use crate::pipeline::{FrameOutcome, Pipeline, PipelineOptions};
use crate::types::Viewport;

/// Re-reads the parameter file when the user presses `R`.
pub type ParameterReloader = Box<dyn FnMut() -> Result<ParameterSet>>;

pub struct PreviewConfig {
    pub size: (u32, u32),
    pub parameters: ParameterSet,
    pub options: PipelineOptions,
    pub gpu: GpuOptions,
    pub reload: Option<ParameterReloader>,
}

/// Window plus the pipeline presenting into it. Field order matters: the
/// pipeline owns the surface and must drop before the window.
struct PreviewState {
    pipeline: Pipeline<GpuDevice>,
    window: Arc<Window>,
    clock: SystemTimeSource,
    occluded: bool,
}

impl PreviewState {
    fn resize(&mut self, size: PhysicalSize<u32>) {
        // winit already reports device pixels.
        self.pipeline.resize(size.width, size.height, 1.0);
        self.window.request_redraw();
    }

    fn render(&mut self) -> Result<()> {
        let dt = self.clock.next_delta();
        match self.pipeline.render(dt).context("failed to render frame")? {
            FrameOutcome::Rendered(report) => {
                tracing::trace!(frame = report.frame_index, "presented frame");
            }
            FrameOutcome::Skipped(reason) => {
                tracing::trace!(?reason, "frame skipped");
            }
        }
        Ok(())
    }

    fn handle_key(&mut self, event: &KeyEvent, reload: &mut Option<ParameterReloader>) -> bool {
        if event.state != ElementState::Pressed || event.repeat {
            return false;
        }
        match &event.logical_key {
            Key::Named(NamedKey::Escape) => return true,
            Key::Character(value) if value.eq_ignore_ascii_case("r") => {
                let Some(reload) = reload.as_mut() else {
                    info!("no parameter source to reload");
                    return false;
                };
                match reload().and_then(|parameters| {
                    self.pipeline
                        .set_parameters(&parameters)
                        .context("failed to apply parameters")
                }) {
                    Ok(()) => info!("reloaded parameters"),
                    Err(err) => warn!("keeping previous parameters: {err:#}"),
                }
            }
            _ => {}
        }
        false
    }
}

/// Opens a window and renders into it until it is closed.
pub fn run_preview(config: PreviewConfig) -> Result<()> {
    let PreviewConfig {
        size,
        parameters,
        options,
        gpu,
        mut reload,
    } = config;

    let event_loop = EventLoop::new().map_err(|err| anyhow!("failed to create event loop: {err}"))?;
    let window = WindowBuilder::new()
        .with_title("singularity")
        .with_inner_size(PhysicalSize::new(size.0, size.1))
        .build(&event_loop)
        .map_err(|err| anyhow!("failed to create preview window: {err}"))?;
    let window = Arc::new(window);

    let inner = window.inner_size();
    let device = GpuDevice::new(window.as_ref(), inner, gpu)
        .context("failed to initialise GPU device")?;
    let pipeline = Pipeline::mount(
        device,
        Viewport::new(inner.width, inner.height, 1.0),
        parameters,
        options,
    )
    .context("failed to mount pipeline")?;
    info!(width = inner.width, height = inner.height, "preview window ready");

    let mut state = PreviewState {
        pipeline,
        window,
        clock: SystemTimeSource::new(),
        occluded: false,
    };
    state.window.request_redraw();

    let mut failure: Option<anyhow::Error> = None;
    let failure_slot = &mut failure;
    event_loop
        .run(move |event, elwt| match event {
            Event::WindowEvent { window_id, event } if window_id == state.window.id() => {
                match event {
                    WindowEvent::CloseRequested | WindowEvent::Destroyed => elwt.exit(),
                    WindowEvent::KeyboardInput { event, .. } => {
                        if state.handle_key(&event, &mut reload) {
                            elwt.exit();
                        }
                    }
                    WindowEvent::Resized(new_size) => state.resize(new_size),
                    WindowEvent::ScaleFactorChanged { .. } => {
                        let size = state.window.inner_size();
                        state.resize(size);
                    }
                    WindowEvent::Occluded(occluded) => {
                        state.occluded = occluded;
                        if occluded {
                            info!("preview hidden; pausing");
                        } else {
                            info!("preview visible; resuming");
                            state.clock.reset();
                            state.window.request_redraw();
                        }
                    }
                    WindowEvent::RedrawRequested => {
                        if let Err(err) = state.render() {
                            error!("{err:#}");
                            *failure_slot = Some(err);
                            elwt.exit();
                        }
                    }
                    _ => {}
                }
            }
            Event::AboutToWait => {
                if state.occluded {
                    elwt.set_control_flow(ControlFlow::Wait);
                } else {
                    state.window.request_redraw();
                    elwt.set_control_flow(ControlFlow::Poll);
                }
            }
            _ => {}
        })
        .map_err(|err| anyhow!("window event loop error: {err}"))?;

    match failure {
        Some(err) => Err(err),
        None => Ok(()),
    }
}
