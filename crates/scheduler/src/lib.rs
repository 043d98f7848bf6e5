//! Run state machine for the dissolve animation.
//!
//! A run moves through `Idle → SettingUp → Running → Finished`. Every run gets a
//! fresh [`RunId`]; every scheduled frame is represented by a [`FrameTicket`]
//! (the animation handle). Starting a new run invalidates the previous run's
//! ticket and any setup result still in flight, so stale work is rejected with
//! [`SchedulerError`] instead of being applied.

use std::fmt;
use std::time::{Duration, Instant};

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SchedulerError {
    #[error("setup result for {stale} arrived after {current} superseded it")]
    StaleSetup { stale: RunId, current: RunId },
    #[error("frame ticket {0} is no longer scheduled")]
    StaleFrame(FrameTicket),
    #[error("setup completed for {0} while no setup was in flight")]
    NotSettingUp(RunId),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RunId(u64);

impl RunId {
    pub fn get(self) -> u64 {
        self.0
    }
}

impl fmt::Display for RunId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "run #{}", self.0)
    }
}

/// Cancellation token for the single frame callback a run may have pending.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct FrameTicket {
    run: RunId,
    sequence: u64,
}

impl FrameTicket {
    pub fn run(&self) -> RunId {
        self.run
    }
}

impl fmt::Display for FrameTicket {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/frame {}", self.run, self.sequence)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Idle,
    SettingUp,
    Running,
    Finished,
}

/// Configuration snapshot taken when a run starts.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RunSettings {
    pub duration: Duration,
    pub smoothness: f32,
    pub character_scaling: f32,
    pub delay: Duration,
}

impl Default for RunSettings {
    fn default() -> Self {
        Self {
            duration: Duration::from_millis(4000),
            smoothness: 0.2,
            character_scaling: 1.0,
            delay: Duration::ZERO,
        }
    }
}

/// Settings plus the wall-clock instant the animation began.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RunState {
    pub settings: RunSettings,
    pub started_at: Instant,
}

impl RunState {
    pub fn progress(&self, now: Instant) -> f32 {
        let elapsed = now.saturating_duration_since(self.started_at);
        derive_progress(elapsed.as_secs_f64(), self.settings.duration)
    }
}

/// Normalised progress for `elapsed_secs` into a run of `duration`.
///
/// Negative elapsed time (clock skew) maps to 0 and anything past the end maps
/// to 1. A zero duration completes immediately.
pub fn derive_progress(elapsed_secs: f64, duration: Duration) -> f32 {
    let total = duration.as_secs_f64();
    if total <= 0.0 {
        return 1.0;
    }
    let elapsed = if elapsed_secs.is_nan() {
        0.0
    } else {
        elapsed_secs.max(0.0)
    };
    (elapsed / total).min(1.0) as f32
}

/// Outcome of executing one scheduled frame.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FrameTick {
    pub run: RunId,
    pub progress: f32,
    /// Ticket for the next frame, or `None` once the run has finished.
    pub next: Option<FrameTicket>,
}

#[derive(Debug, Clone)]
struct ActiveRun {
    id: RunId,
    settings: RunSettings,
    started_at: Option<Instant>,
    last_progress: f32,
}

pub struct AnimationScheduler {
    phase: Phase,
    next_run: u64,
    next_sequence: u64,
    active: Option<ActiveRun>,
    pending: Option<FrameTicket>,
}

impl Default for AnimationScheduler {
    fn default() -> Self {
        Self::new()
    }
}

impl AnimationScheduler {
    pub fn new() -> Self {
        Self {
            phase: Phase::Idle,
            next_run: 1,
            next_sequence: 0,
            active: None,
            pending: None,
        }
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    pub fn current_run(&self) -> Option<RunId> {
        self.active.as_ref().map(|run| run.id)
    }

    pub fn pending_frame(&self) -> Option<FrameTicket> {
        self.pending
    }

    /// Settings snapshot of the current run, available from `begin_run` on.
    pub fn current_settings(&self) -> Option<RunSettings> {
        self.active.as_ref().map(|run| run.settings)
    }

    /// Starts a new run, cancelling whatever the previous run had scheduled.
    pub fn begin_run(&mut self, settings: RunSettings) -> RunId {
        if let Some(cancelled) = self.pending.take() {
            tracing::debug!(ticket = %cancelled, "cancelled pending frame for restart");
        }
        let id = RunId(self.next_run);
        self.next_run += 1;
        self.active = Some(ActiveRun {
            id,
            settings,
            started_at: None,
            last_progress: 0.0,
        });
        self.phase = Phase::SettingUp;
        id
    }

    /// Records a finished setup and schedules the run's first frame.
    pub fn setup_complete(
        &mut self,
        run: RunId,
        now: Instant,
    ) -> Result<FrameTicket, SchedulerError> {
        self.ensure_current(run)?;
        if self.phase != Phase::SettingUp {
            return Err(SchedulerError::NotSettingUp(run));
        }
        if let Some(active) = self.active.as_mut() {
            active.started_at = Some(now);
            active.last_progress = 0.0;
        }
        self.phase = Phase::Running;
        Ok(self.schedule(run))
    }

    /// Drops a run whose setup failed; nothing stays bound.
    pub fn setup_failed(&mut self, run: RunId) -> Result<(), SchedulerError> {
        self.ensure_current(run)?;
        self.active = None;
        self.pending = None;
        self.phase = Phase::Idle;
        Ok(())
    }

    /// Consumes `ticket`, derives progress at `now`, and schedules the next frame
    /// while the run is incomplete.
    pub fn advance(
        &mut self,
        ticket: FrameTicket,
        now: Instant,
    ) -> Result<FrameTick, SchedulerError> {
        if self.pending != Some(ticket) {
            return Err(SchedulerError::StaleFrame(ticket));
        }
        self.pending = None;

        let Some(active) = self.active.as_mut() else {
            return Err(SchedulerError::StaleFrame(ticket));
        };
        let Some(started_at) = active.started_at else {
            return Err(SchedulerError::StaleFrame(ticket));
        };

        let state = RunState {
            settings: active.settings,
            started_at,
        };
        let progress = state.progress(now).max(active.last_progress);
        active.last_progress = progress;
        let run = active.id;

        let next = if progress < 1.0 {
            Some(self.schedule(run))
        } else {
            self.phase = Phase::Finished;
            None
        };

        Ok(FrameTick {
            run,
            progress,
            next,
        })
    }

    /// Re-arms a frame for the current run after a presentation failure.
    pub fn rearm(&mut self) -> Option<FrameTicket> {
        let active = self.active.as_ref()?;
        active.started_at?;
        if let Some(ticket) = self.pending {
            return Some(ticket);
        }
        let run = active.id;
        self.phase = Phase::Running;
        Some(self.schedule(run))
    }

    /// Cancels everything; used when the surface is torn down.
    pub fn cancel(&mut self) {
        self.pending = None;
        self.active = None;
        self.phase = Phase::Idle;
    }

    fn schedule(&mut self, run: RunId) -> FrameTicket {
        let ticket = FrameTicket {
            run,
            sequence: self.next_sequence,
        };
        self.next_sequence += 1;
        self.pending = Some(ticket);
        ticket
    }

    fn ensure_current(&self, run: RunId) -> Result<(), SchedulerError> {
        match self.current_run() {
            Some(current) if current == run => Ok(()),
            Some(current) => Err(SchedulerError::StaleSetup {
                stale: run,
                current,
            }),
            None => Err(SchedulerError::NotSettingUp(run)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn settings(duration_ms: u64) -> RunSettings {
        RunSettings {
            duration: Duration::from_millis(duration_ms),
            ..RunSettings::default()
        }
    }

    #[test]
    fn progress_is_clamped_for_skewed_and_overlong_elapsed_times() {
        let duration = Duration::from_millis(4000);
        assert_eq!(derive_progress(-3.0, duration), 0.0);
        assert_eq!(derive_progress(f64::NAN, duration), 0.0);
        assert!((derive_progress(2.0, duration) - 0.5).abs() < 1e-6);
        assert_eq!(derive_progress(4.0, duration), 1.0);
        assert_eq!(derive_progress(1.0e9, duration), 1.0);
    }

    #[test]
    fn progress_is_monotonic_over_elapsed_time() {
        let duration = Duration::from_millis(4000);
        let mut last = 0.0;
        for step in -10..=60 {
            let progress = derive_progress(step as f64 * 0.1, duration);
            assert!(progress >= last);
            assert!((0.0..=1.0).contains(&progress));
            last = progress;
        }
    }

    #[test]
    fn run_walks_through_all_phases() {
        let mut scheduler = AnimationScheduler::new();
        assert_eq!(scheduler.phase(), Phase::Idle);

        let run = scheduler.begin_run(settings(4000));
        assert_eq!(scheduler.phase(), Phase::SettingUp);
        assert!(scheduler.pending_frame().is_none());

        let start = Instant::now();
        let ticket = scheduler.setup_complete(run, start).expect("setup");
        assert_eq!(scheduler.phase(), Phase::Running);

        let tick = scheduler
            .advance(ticket, start + Duration::from_millis(2000))
            .expect("mid frame");
        assert!((tick.progress - 0.5).abs() < 1e-3);
        let next = tick.next.expect("next frame scheduled");

        let tick = scheduler
            .advance(next, start + Duration::from_millis(4000))
            .expect("final frame");
        assert_eq!(tick.progress, 1.0);
        assert!(tick.next.is_none());
        assert_eq!(scheduler.phase(), Phase::Finished);
        assert!(scheduler.pending_frame().is_none());
    }

    #[test]
    fn restart_cancels_previous_frame_chain() {
        let mut scheduler = AnimationScheduler::new();
        let start = Instant::now();
        let first = scheduler.begin_run(settings(1000));
        let old_ticket = scheduler.setup_complete(first, start).expect("setup");

        let second = scheduler.begin_run(settings(1000));
        assert_ne!(first, second);
        assert!(scheduler.pending_frame().is_none());

        let new_ticket = scheduler.setup_complete(second, start).expect("setup");
        assert_eq!(old_ticket.run(), first);
        assert_eq!(new_ticket.run(), second);
        let tick = scheduler
            .advance(new_ticket, start + Duration::from_millis(10))
            .expect("new run frame");
        assert_eq!(tick.run, second);

        assert_eq!(
            scheduler.advance(old_ticket, start + Duration::from_millis(20)),
            Err(SchedulerError::StaleFrame(old_ticket))
        );
    }

    #[test]
    fn stale_setup_is_rejected_after_restart() {
        let mut scheduler = AnimationScheduler::new();
        let first = scheduler.begin_run(settings(1000));
        let second = scheduler.begin_run(settings(2000));
        let now = Instant::now();

        assert_eq!(
            scheduler.setup_complete(first, now),
            Err(SchedulerError::StaleSetup {
                stale: first,
                current: second,
            })
        );
        assert_eq!(scheduler.phase(), Phase::SettingUp);

        scheduler.setup_complete(second, now).expect("current setup");
        let settings = scheduler.current_settings().expect("current settings");
        assert_eq!(settings.duration, Duration::from_millis(2000));
    }

    #[test]
    fn failed_setup_returns_to_idle() {
        let mut scheduler = AnimationScheduler::new();
        let run = scheduler.begin_run(settings(1000));
        scheduler.setup_failed(run).expect("current run");
        assert_eq!(scheduler.phase(), Phase::Idle);
        assert!(scheduler.current_run().is_none());
        assert!(scheduler.setup_complete(run, Instant::now()).is_err());
    }

    #[test]
    fn progress_never_regresses_when_clock_goes_backwards() {
        let mut scheduler = AnimationScheduler::new();
        let start = Instant::now() + Duration::from_secs(1);
        let run = scheduler.begin_run(settings(1000));
        let ticket = scheduler.setup_complete(run, start).expect("setup");

        let tick = scheduler
            .advance(ticket, start + Duration::from_millis(600))
            .expect("frame");
        let next = tick.next.expect("next");
        let tick = scheduler
            .advance(next, start - Duration::from_millis(500))
            .expect("skewed frame");
        assert!(tick.progress >= 0.6 - 1e-6);
    }

    #[test]
    fn rearm_reissues_a_frame_for_a_finished_run() {
        let mut scheduler = AnimationScheduler::new();
        let start = Instant::now();
        let run = scheduler.begin_run(settings(10));
        let ticket = scheduler.setup_complete(run, start).expect("setup");
        scheduler
            .advance(ticket, start + Duration::from_millis(50))
            .expect("final frame");
        assert_eq!(scheduler.phase(), Phase::Finished);

        let ticket = scheduler.rearm().expect("re-armed");
        let tick = scheduler
            .advance(ticket, start + Duration::from_millis(60))
            .expect("redraw");
        assert_eq!(tick.progress, 1.0);
        assert_eq!(scheduler.phase(), Phase::Finished);
    }

    #[test]
    fn settings_are_visible_while_setting_up() {
        let mut scheduler = AnimationScheduler::new();
        assert!(scheduler.current_settings().is_none());
        scheduler.begin_run(settings(1234));
        let snapshot = scheduler.current_settings().expect("settings");
        assert_eq!(snapshot.duration, Duration::from_millis(1234));
        assert_eq!(scheduler.phase(), Phase::SettingUp);
    }

    #[test]
    fn rearm_is_a_no_op_before_the_run_starts() {
        let mut scheduler = AnimationScheduler::new();
        assert!(scheduler.rearm().is_none());
        scheduler.begin_run(settings(10));
        assert!(scheduler.rearm().is_none());
    }
}
