//! Frame pacing for the render loop
//!
//! [`RenderOptimizer`] turns "something changed" notifications into at most
//! one render per frame budget. Requests arriving between ticks collapse into
//! a single render; callbacks that overrun the budget are counted as dropped
//! frames. The loop is single-task: state lives behind `Rc` and [`run`] must be
//! polled on one task (a current-thread runtime or `LocalSet`).
//!
//! [`run`]: RenderOptimizer::run

mod clock;
mod frame_source;

pub use clock::{Clock, ManualClock, TokioClock};
pub use frame_source::{FrameSignal, FrameSource, IntervalFrameSource, SignalFrameSource};

use std::cell::Cell;
use std::rc::Rc;
use std::time::{Duration, Instant};

use serde::Serialize;
use tokio::sync::Notify;
use tracing::{debug, error, info};

use crate::config::{ConfigError, ScheduleMode, SchedulerConfig};

type RenderCallback = Box<dyn FnMut() -> anyhow::Result<()>>;
type ErrorHandler = Box<dyn FnMut(&anyhow::Error)>;

/// Render loop telemetry
#[derive(Debug, Clone, Default, Serialize)]
pub struct FrameStats {
    /// Callback invocations, failed ones included
    pub frame_count: u64,
    pub last_frame_time: Duration,
    pub total_frame_time: Duration,
    /// Invocations that took longer than the frame budget
    pub dropped_frames: u64,
    /// Ticks skipped because the budget had not elapsed yet
    pub throttled_ticks: u64,
    pub errors: u64,
    /// Achievable frame rate, capped at the target
    pub fps: f64,
}

impl FrameStats {
    #[must_use]
    pub fn average_frame_time(&self) -> Duration {
        if self.frame_count == 0 {
            return Duration::ZERO;
        }
        self.total_frame_time.div_f64(self.frame_count as f64)
    }
}

/// Result of a single tick
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TickOutcome {
    /// Loop is stopped
    Stopped,
    /// Nothing was requested
    Idle,
    /// Request pending but the frame budget has not elapsed
    Throttled,
    /// Callback ran and returned `Ok`
    Rendered(Duration),
    /// Callback ran and returned `Err`
    Failed,
}

#[derive(Debug)]
struct LoopState {
    running: Cell<bool>,
    pending: Cell<bool>,
    mode: Cell<ScheduleMode>,
    wake: Notify,
}

impl LoopState {
    fn start(&self) -> bool {
        if self.running.replace(true) {
            return false;
        }
        if self.mode.get() == ScheduleMode::Continuous {
            self.pending.set(true);
        }
        self.wake.notify_one();
        true
    }

    fn stop(&self) -> bool {
        if !self.running.replace(false) {
            return false;
        }
        self.wake.notify_one();
        true
    }

    fn request(&self) {
        self.pending.set(true);
        if self.start() {
            debug!("Render requested while stopped, starting loop");
        }
    }
}

/// Cloneable control surface for a [`RenderOptimizer`]
///
/// Hand this to whatever produces changes (terminal output, input, resize).
#[derive(Debug, Clone)]
pub struct RenderHandle {
    state: Rc<LoopState>,
}

impl RenderHandle {
    /// Ask for a render on the next eligible tick, starting the loop if needed
    pub fn request_render(&self) {
        self.state.request();
    }

    pub fn start(&self) {
        if self.state.start() {
            info!("Render loop started");
        }
    }

    pub fn stop(&self) {
        if self.state.stop() {
            info!("Render loop stopped");
        }
    }

    #[must_use]
    pub fn is_running(&self) -> bool {
        self.state.running.get()
    }

    #[must_use]
    pub fn is_pending(&self) -> bool {
        self.state.pending.get()
    }
}

/// Frame-paced scheduler for a render callback
pub struct RenderOptimizer<C: Clock = TokioClock> {
    state: Rc<LoopState>,
    callback: RenderCallback,
    on_error: Option<ErrorHandler>,
    target_fps: u32,
    frame_budget: Duration,
    clock: C,
    last_render: Option<Instant>,
    stats: FrameStats,
}

impl RenderOptimizer<TokioClock> {
    pub fn new(
        config: SchedulerConfig,
        callback: impl FnMut() -> anyhow::Result<()> + 'static,
    ) -> Result<Self, ConfigError> {
        Self::with_clock(config, TokioClock, callback)
    }
}

impl<C: Clock> RenderOptimizer<C> {
    pub fn with_clock(
        config: SchedulerConfig,
        clock: C,
        callback: impl FnMut() -> anyhow::Result<()> + 'static,
    ) -> Result<Self, ConfigError> {
        config.validate()?;

        Ok(Self {
            state: Rc::new(LoopState {
                running: Cell::new(false),
                pending: Cell::new(false),
                mode: Cell::new(config.mode),
                wake: Notify::new(),
            }),
            callback: Box::new(callback),
            on_error: None,
            target_fps: config.target_fps,
            frame_budget: frame_budget(config.target_fps),
            clock,
            last_render: None,
            stats: FrameStats::default(),
        })
    }

    #[must_use]
    pub fn handle(&self) -> RenderHandle {
        RenderHandle {
            state: Rc::clone(&self.state),
        }
    }

    /// Register the receiver for callback failures
    pub fn on_error(&mut self, handler: impl FnMut(&anyhow::Error) + 'static) {
        self.on_error = Some(Box::new(handler));
    }

    pub fn request_render(&self) {
        self.state.request();
    }

    pub fn start(&self) {
        self.handle().start();
    }

    pub fn stop(&self) {
        self.handle().stop();
    }

    #[must_use]
    pub fn is_running(&self) -> bool {
        self.state.running.get()
    }

    #[must_use]
    pub fn is_pending(&self) -> bool {
        self.state.pending.get()
    }

    pub fn set_target_fps(&mut self, fps: u32) -> Result<(), ConfigError> {
        if fps == 0 {
            return Err(ConfigError::ZeroFrameRate);
        }
        self.target_fps = fps;
        self.frame_budget = frame_budget(fps);
        debug!("Target frame rate set to {} ({:?} budget)", fps, self.frame_budget);
        Ok(())
    }

    #[must_use]
    pub fn target_fps(&self) -> u32 {
        self.target_fps
    }

    pub fn set_mode(&mut self, mode: ScheduleMode) {
        self.state.mode.set(mode);
        if mode == ScheduleMode::Continuous && self.is_running() {
            self.state.pending.set(true);
        }
    }

    #[must_use]
    pub fn mode(&self) -> ScheduleMode {
        self.state.mode.get()
    }

    #[must_use]
    pub fn frame_budget(&self) -> Duration {
        self.frame_budget
    }

    #[must_use]
    pub fn stats(&self) -> &FrameStats {
        &self.stats
    }

    pub fn reset_stats(&mut self) {
        self.stats = FrameStats::default();
    }

    /// Run one scheduling step at the current time
    pub fn tick(&mut self) -> TickOutcome {
        let now = self.clock.now();
        self.tick_at(now)
    }

    /// Run one scheduling step for a frame due at `frame_time`
    ///
    /// Pacing compares frame times, so a source that wakes late but keeps a
    /// regular schedule is not throttled by its wakeup jitter.
    pub fn tick_at(&mut self, frame_time: Instant) -> TickOutcome {
        if !self.state.running.get() {
            return TickOutcome::Stopped;
        }
        if !self.state.pending.get() {
            return TickOutcome::Idle;
        }

        if let Some(last) = self.last_render {
            if frame_time.saturating_duration_since(last) < self.frame_budget {
                self.stats.throttled_ticks += 1;
                return TickOutcome::Throttled;
            }
        }

        self.state.pending.set(false);
        self.last_render = Some(frame_time);
        let start = self.clock.now();
        let result = (self.callback)();
        let elapsed = self.clock.now().saturating_duration_since(start);

        self.record_frame(elapsed);
        if self.state.mode.get() == ScheduleMode::Continuous {
            self.state.pending.set(true);
        }

        match result {
            Ok(()) => TickOutcome::Rendered(elapsed),
            Err(err) => {
                self.stats.errors += 1;
                error!("Render callback failed: {:#}", err);
                if let Some(handler) = self.on_error.as_mut() {
                    handler(&err);
                }
                TickOutcome::Failed
            }
        }
    }

    /// Drive ticks from `source` forever
    ///
    /// Parks while stopped; `start`/`request_render` resume it and `stop`
    /// abandons the frame currently being awaited.
    pub async fn run<S: FrameSource>(&mut self, source: &mut S) {
        loop {
            self.step(source).await;
        }
    }

    /// Drive ticks from `source` until the loop is stopped
    pub async fn run_until_stopped<S: FrameSource>(&mut self, source: &mut S) {
        while self.is_running() {
            self.step(source).await;
        }
    }

    async fn step<S: FrameSource>(&mut self, source: &mut S) {
        let state = Rc::clone(&self.state);
        if !state.running.get() {
            state.wake.notified().await;
            return;
        }

        tokio::select! {
            frame_time = source.next_frame() => {
                self.tick_at(frame_time);
            }
            () = state.wake.notified() => {}
        }
    }

    fn record_frame(&mut self, elapsed: Duration) {
        let stats = &mut self.stats;
        stats.frame_count += 1;
        stats.last_frame_time = elapsed;
        stats.total_frame_time += elapsed;

        if elapsed > self.frame_budget {
            stats.dropped_frames += 1;
            debug!(
                "Frame took {:?}, over the {:?} budget ({} dropped)",
                elapsed, self.frame_budget, stats.dropped_frames
            );
        }

        let average = stats.average_frame_time().as_secs_f64();
        let target = f64::from(self.target_fps);
        stats.fps = if average > 0.0 {
            (1.0 / average).min(target)
        } else {
            target
        };

        if stats.frame_count % 1000 == 0 {
            debug!(
                "Rendered {} frames, {:.1} fps, {} dropped",
                stats.frame_count, stats.fps, stats.dropped_frames
            );
        }
    }
}

fn frame_budget(fps: u32) -> Duration {
    Duration::from_secs_f64(1.0 / f64::from(fps))
}
