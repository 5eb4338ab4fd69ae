//! "Next available frame" primitives that drive the render loop
//!
//! Hosts with a display-synchronized callback (vsync, presentation feedback)
//! feed a [`FrameSignal`]; everything else falls back to a timer at the
//! target interval.

use std::time::{Duration, Instant};

use tokio::sync::mpsc;
use tokio::time::{interval, Interval, MissedTickBehavior};

/// Something the render loop can wait on for its next tick
#[allow(async_fn_in_trait)]
pub trait FrameSource {
    /// Wait for the next frame and return the time it was due
    async fn next_frame(&mut self) -> Instant;
}

/// Fixed-delay timer approximating the target frame interval
#[derive(Debug)]
pub struct IntervalFrameSource {
    period: Duration,
    // created on first use so construction does not need a runtime
    interval: Option<Interval>,
}

impl IntervalFrameSource {
    #[must_use]
    pub fn new(target_fps: u32) -> Self {
        Self::with_period(Duration::from_secs_f64(1.0 / f64::from(target_fps.max(1))))
    }

    #[must_use]
    pub fn with_period(period: Duration) -> Self {
        Self {
            period,
            interval: None,
        }
    }

    #[must_use]
    pub fn period(&self) -> Duration {
        self.period
    }
}

impl FrameSource for IntervalFrameSource {
    async fn next_frame(&mut self) -> Instant {
        let period = self.period;
        let ticker = self.interval.get_or_insert_with(|| {
            let mut ticker = interval(period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
            ticker
        });
        // the scheduled deadline, not the wakeup time
        ticker.tick().await.into_std()
    }
}

/// Host-side handle that announces display refreshes
#[derive(Debug, Clone)]
pub struct FrameSignal {
    tx: mpsc::UnboundedSender<()>,
}

impl FrameSignal {
    /// Announce that the display can take a new frame
    pub fn notify(&self) {
        // receiver gone means the loop is gone; nothing to wake
        let _ = self.tx.send(());
    }
}

/// Display-synchronized frame source
///
/// Ticks once per burst of signals. When every [`FrameSignal`] has been
/// dropped the host has no refresh callback, and the source degrades to a
/// timer at `fallback_fps`.
#[derive(Debug)]
pub struct SignalFrameSource {
    rx: mpsc::UnboundedReceiver<()>,
    fallback: IntervalFrameSource,
    closed: bool,
}

impl SignalFrameSource {
    #[must_use]
    pub fn new(fallback_fps: u32) -> (Self, FrameSignal) {
        let (tx, rx) = mpsc::unbounded_channel();
        let source = Self {
            rx,
            fallback: IntervalFrameSource::new(fallback_fps),
            closed: false,
        };
        (source, FrameSignal { tx })
    }

    /// Whether the source has fallen back to its timer
    #[must_use]
    pub fn is_fallback(&self) -> bool {
        self.closed
    }
}

impl FrameSource for SignalFrameSource {
    async fn next_frame(&mut self) -> Instant {
        if !self.closed {
            if self.rx.recv().await.is_some() {
                // collapse signals that piled up while we were rendering
                while self.rx.try_recv().is_ok() {}
                return tokio::time::Instant::now().into_std();
            }
            tracing::debug!("Frame signal closed, falling back to timer pacing");
            self.closed = true;
        }
        self.fallback.next_frame().await
    }
}
