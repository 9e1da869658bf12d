use std::time::{Duration, Instant};

/// Time values for one frame.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FrameTime {
    pub elapsed: Duration,
    pub delta: Duration,
    /// Number of frames advanced before this one.
    pub frame: u64,
}

impl FrameTime {
    pub fn seconds(&self) -> f32 {
        self.elapsed.as_secs_f32()
    }
}

/// Monotonic elapsed time driven by per-frame deltas.
#[derive(Debug, Clone, Copy, Default)]
pub struct FrameClock {
    elapsed: Duration,
    frames: u64,
}

impl FrameClock {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds `delta` and returns the time for the frame being rendered.
    /// `Duration` cannot be negative, so elapsed time never decreases.
    pub fn advance(&mut self, delta: Duration) -> FrameTime {
        self.elapsed = self.elapsed.saturating_add(delta);
        let time = FrameTime {
            elapsed: self.elapsed,
            delta,
            frame: self.frames,
        };
        self.frames = self.frames.saturating_add(1);
        time
    }

    pub fn frames(&self) -> u64 {
        self.frames
    }
}

/// Where hosts get the `dt` they feed into the pipeline.
pub trait TimeSource: Send {
    fn reset(&mut self);
    /// Time passed since the previous call.
    fn next_delta(&mut self) -> Duration;
}

/// Wall-clock stopwatch.
#[derive(Debug, Clone, Copy)]
pub struct SystemTimeSource {
    last: Option<Instant>,
}

impl SystemTimeSource {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Default for SystemTimeSource {
    fn default() -> Self {
        Self { last: None }
    }
}

impl TimeSource for SystemTimeSource {
    fn reset(&mut self) {
        self.last = None;
    }

    /// The first sample after a reset is zero.
    fn next_delta(&mut self) -> Duration {
        let now = Instant::now();
        let delta = self
            .last
            .map(|last| now.saturating_duration_since(last))
            .unwrap_or_default();
        self.last = Some(now);
        delta
    }
}

/// Advances by the same step every frame; `Duration::ZERO` freezes time.
#[derive(Debug, Clone, Copy)]
pub struct FixedTimeSource {
    step: Duration,
}

impl FixedTimeSource {
    pub fn new(step: Duration) -> Self {
        Self { step }
    }
}

impl TimeSource for FixedTimeSource {
    fn reset(&mut self) {}

    fn next_delta(&mut self) -> Duration {
        self.step
    }
}
