use std::sync::Arc;
use std::time::{Duration, Instant};

use raw_window_handle::{HasDisplayHandle, HasWindowHandle};
use scheduler::{AnimationScheduler, Phase, RunId, RunSettings, SchedulerError};
use tracing::{debug, info, warn};
use winit::dpi::PhysicalSize;

use crate::assets::{DissolveAssets, PendingAssets};
use crate::error::DissolveError;
use crate::gpu::GpuState;
use crate::mask::CellSize;
use crate::types::{DissolveConfig, ImageSource};

/// Where a controller sends its pixels.
///
/// [`GpuState`] is the real implementation; tests drive the controller with a
/// recording fake.
pub trait RenderBackend {
    /// Binds the resources for a new run, replacing the previous run's.
    fn install(
        &mut self,
        assets: &DissolveAssets,
        settings: &RunSettings,
        cell_size: CellSize,
    ) -> Result<(), DissolveError>;

    /// Presents a frame holding only the clear colour.
    fn clear(&mut self) -> Result<(), DissolveError>;

    /// Presents the installed run at `progress`.
    fn present(&mut self, progress: f32) -> Result<(), DissolveError>;

    /// Drops whatever [`Self::install`] bound; later frames show only the
    /// clear colour.
    fn release(&mut self);
}

/// What a call to [`DissolveController::frame`] did.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum FrameOutcome {
    /// No frame was scheduled.
    Idle,
    /// A frame was presented; `finished` is set on the frame that reached 1.
    Presented {
        run: RunId,
        progress: f32,
        finished: bool,
    },
    /// Presentation failed transiently and a replacement frame was scheduled.
    Dropped { run: RunId },
}

/// Drives one dissolve surface: owns the configuration, the scheduler, and
/// whichever setup is currently loading.
pub struct DissolveController<B> {
    backend: B,
    config: DissolveConfig,
    scheduler: AnimationScheduler,
    pending: Option<PendingAssets>,
    cell_size: Option<CellSize>,
}

impl<B: RenderBackend> DissolveController<B> {
    pub fn new(backend: B, config: DissolveConfig) -> Self {
        Self {
            backend,
            config,
            scheduler: AnimationScheduler::new(),
            pending: None,
            cell_size: None,
        }
    }

    pub fn config(&self) -> &DissolveConfig {
        &self.config
    }

    pub fn set_duration(&mut self, duration: Duration) {
        self.config.duration = duration;
    }

    pub fn set_smoothness(&mut self, smoothness: f32) {
        self.config.smoothness = smoothness;
    }

    pub fn set_character_scaling(&mut self, character_scaling: f32) {
        self.config.character_scaling = character_scaling;
    }

    pub fn set_delay(&mut self, delay: Duration) {
        self.config.delay = delay;
    }

    pub fn set_sources(
        &mut self,
        image_src: impl Into<ImageSource>,
        characters_src: impl Into<ImageSource>,
    ) {
        self.config.image_src = image_src.into();
        self.config.characters_src = characters_src.into();
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    pub fn backend_mut(&mut self) -> &mut B {
        &mut self.backend
    }

    pub fn phase(&self) -> Phase {
        self.scheduler.phase()
    }

    pub fn current_run(&self) -> Option<RunId> {
        self.scheduler.current_run()
    }

    /// Cell size of the installed run.
    pub fn cell_size(&self) -> Option<CellSize> {
        self.cell_size
    }

    /// Whether a frame is scheduled and the host should call [`Self::frame`].
    pub fn wants_frame(&self) -> bool {
        self.scheduler.pending_frame().is_some()
    }

    /// Whether a setup is still loading.
    pub fn is_loading(&self) -> bool {
        self.pending.is_some()
    }

    /// Starts (or restarts) the dissolve.
    ///
    /// Settings are snapshotted now. Any frame or setup belonging to an earlier
    /// run is abandoned; the images load on a background thread after the
    /// configured delay and are picked up by [`Self::poll_setup`].
    pub fn run(&mut self) -> RunId {
        let settings = self.config.run_settings();
        let run = self.scheduler.begin_run(settings);
        let loader = PendingAssets::spawn(
            run,
            self.config.image_src.clone(),
            self.config.characters_src.clone(),
            settings.delay,
        );
        if let Some(previous) = self.pending.replace(loader) {
            debug!(stale = %previous.run(), %run, "abandoned in-flight setup");
        }
        info!(
            %run,
            image = %self.config.image_src.describe(),
            characters = %self.config.characters_src.describe(),
            duration = ?settings.duration,
            delay = ?settings.delay,
            smoothness = settings.smoothness,
            character_scaling = settings.character_scaling,
            "dissolve run requested"
        );
        run
    }

    /// Blanks the surface. Animation state is left alone, so a running
    /// dissolve paints over the cleared frame on its next tick.
    pub fn clear(&mut self) -> Result<(), DissolveError> {
        self.backend.clear()
    }

    /// Stops the current run and drops any setup still loading.
    pub fn cancel(&mut self) {
        self.pending = None;
        self.scheduler.cancel();
        self.release();
    }

    fn release(&mut self) {
        self.cell_size = None;
        self.backend.release();
    }

    /// Installs the current run's assets if the loader has delivered them.
    ///
    /// Returns the run whose first frame is now scheduled. Load or install
    /// failures return the run to idle and surface the error.
    pub fn poll_setup(&mut self, now: Instant) -> Result<Option<RunId>, DissolveError> {
        let Some(result) = self.pending.as_ref().and_then(PendingAssets::poll) else {
            return Ok(None);
        };
        self.finish_setup(result, now)
    }

    /// Blocks for up to `timeout` waiting on the loader, then behaves like
    /// [`Self::poll_setup`] with the current time.
    pub fn wait_for_setup(&mut self, timeout: Duration) -> Result<Option<RunId>, DissolveError> {
        let Some(result) = self
            .pending
            .as_ref()
            .and_then(|pending| pending.wait(timeout))
        else {
            return Ok(None);
        };
        self.finish_setup(result, Instant::now())
    }

    fn finish_setup(
        &mut self,
        result: Result<DissolveAssets, DissolveError>,
        now: Instant,
    ) -> Result<Option<RunId>, DissolveError> {
        let Some(pending) = self.pending.take() else {
            return Ok(None);
        };
        let run = pending.run();
        let settings = match (self.scheduler.current_run(), self.scheduler.current_settings()) {
            (Some(current), Some(settings)) if current == run => settings,
            (Some(current), _) => {
                debug!(stale = %run, %current, "discarding superseded setup");
                return Ok(None);
            }
            (None, _) => {
                debug!(%run, "setup finished after cancel; ignoring");
                return Ok(None);
            }
        };

        let installed = result.and_then(|assets| {
            let cell_size = CellSize::derive(
                assets.source_dimensions(),
                assets.glyph_dimensions(),
                settings.character_scaling,
            );
            self.backend.install(&assets, &settings, cell_size)?;
            Ok(cell_size)
        });

        match installed {
            Ok(cell_size) => {
                self.cell_size = Some(cell_size);
                self.scheduler.setup_complete(run, now)?;
                let (columns, rows) = cell_size.grid_dimensions();
                info!(%run, columns, rows, "dissolve started");
                Ok(Some(run))
            }
            Err(err) => {
                warn!(%run, error = %err, "dissolve setup failed");
                self.release();
                self.scheduler.setup_failed(run)?;
                Err(err)
            }
        }
    }

    /// Runs the scheduled frame, if any.
    ///
    /// Progress comes from `now`, not from how many frames ran, so a dropped
    /// frame only delays the picture and never the timeline.
    pub fn frame(&mut self, now: Instant) -> Result<FrameOutcome, DissolveError> {
        let Some(ticket) = self.scheduler.pending_frame() else {
            return Ok(FrameOutcome::Idle);
        };
        let tick = match self.scheduler.advance(ticket, now) {
            Ok(tick) => tick,
            Err(err @ SchedulerError::StaleFrame(_)) => {
                debug!(error = %err, "discarding stale frame");
                return Ok(FrameOutcome::Idle);
            }
            Err(err) => return Err(err.into()),
        };
        let finished = tick.next.is_none();

        match self.backend.present(tick.progress) {
            Ok(()) => {
                if finished {
                    info!(run = %tick.run, "dissolve finished");
                }
                Ok(FrameOutcome::Presented {
                    run: tick.run,
                    progress: tick.progress,
                    finished,
                })
            }
            Err(err @ DissolveError::Surface(wgpu::SurfaceError::OutOfMemory)) => Err(err),
            Err(err) if err.as_surface_error().is_some() => {
                warn!(run = %tick.run, error = %err, "frame dropped; retrying");
                self.scheduler.rearm();
                Ok(FrameOutcome::Dropped { run: tick.run })
            }
            Err(err) => Err(err),
        }
    }

    /// Repaints the current state after the surface was exposed or resized.
    pub fn redraw(&mut self, now: Instant) -> Result<FrameOutcome, DissolveError> {
        if self.scheduler.rearm().is_some() {
            return self.frame(now);
        }
        self.backend.clear()?;
        Ok(FrameOutcome::Idle)
    }
}

impl DissolveController<GpuState> {
    pub fn resize(&mut self, new_size: PhysicalSize<u32>) {
        self.backend.resize(new_size);
    }

    pub fn surface_size(&self) -> PhysicalSize<u32> {
        self.backend.surface_size()
    }
}

/// Creates a controller rendering into `target`.
///
/// The surface keeps `target` alive, so the window cannot be dropped while the
/// controller still presents to it. Fails with
/// [`DissolveError::ContextUnavailable`] when no GPU context can be created
/// for the surface.
pub fn create_dissolve<W>(
    target: Arc<W>,
    initial_size: PhysicalSize<u32>,
    config: DissolveConfig,
) -> Result<DissolveController<GpuState>, DissolveError>
where
    W: HasDisplayHandle + HasWindowHandle + Send + Sync + 'static,
{
    let backend = GpuState::new(target, initial_size, config.surface_alpha)
        .map_err(DissolveError::ContextUnavailable)?;
    Ok(DissolveController::new(backend, config))
}
