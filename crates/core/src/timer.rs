//! Frame timing.

use std::time::{Duration, Instant};

/// Monotonic frame timer producing per-frame delta time and a smoothed
/// frames-per-second estimate.
#[derive(Debug)]
pub struct FrameTimer {
    start: Instant,
    last_tick: Instant,
    fps_accum: Duration,
    fps_frames: u32,
    fps: f32,
}

impl FrameTimer {
    pub fn new() -> Self {
        let now = Instant::now();
        Self {
            start: now,
            last_tick: now,
            fps_accum: Duration::ZERO,
            fps_frames: 0,
            fps: 0.0,
        }
    }

    /// Total time since the timer was created.
    pub fn elapsed(&self) -> Duration {
        self.start.elapsed()
    }

    /// Advance the timer by one frame and return the delta since the
    /// previous tick, in seconds. Updates the fps estimate once per second.
    pub fn tick(&mut self) -> f32 {
        let now = Instant::now();
        let delta = now - self.last_tick;
        self.last_tick = now;

        self.fps_accum += delta;
        self.fps_frames += 1;
        if self.fps_accum >= Duration::from_secs(1) {
            self.fps = self.fps_frames as f32 / self.fps_accum.as_secs_f32();
            self.fps_accum = Duration::ZERO;
            self.fps_frames = 0;
        }

        delta.as_secs_f32()
    }

    /// Smoothed frames-per-second over the last whole second. Zero until
    /// the first second has elapsed.
    pub fn fps(&self) -> f32 {
        self.fps
    }
}

impl Default for FrameTimer {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tick_returns_nonnegative_delta() {
        let mut timer = FrameTimer::new();
        let delta = timer.tick();
        assert!(delta >= 0.0);
    }

    #[test]
    fn fps_starts_at_zero() {
        let timer = FrameTimer::new();
        assert_eq!(timer.fps(), 0.0);
    }
}
