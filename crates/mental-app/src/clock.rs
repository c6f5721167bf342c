//! Variable-rate frame clock.
//!
//! Measures the time between frames, clamps long stalls, and keeps a
//! once-per-second FPS average for the window title.

use std::time::Instant;

use tracing::warn;

/// Longest frame the simulation will see, in seconds.
pub const MAX_FRAME_TIME: f64 = 0.25;

/// Interval between FPS reports, in seconds.
pub const FPS_WINDOW: f64 = 1.0;

pub struct FrameClock {
    previous: Instant,
    elapsed: f64,
    frame_count: u64,
    window_time: f64,
    window_frames: u32,
    fps: f32,
}

impl Default for FrameClock {
    fn default() -> Self {
        Self::new()
    }
}

impl FrameClock {
    pub fn new() -> Self {
        Self {
            previous: Instant::now(),
            elapsed: 0.0,
            frame_count: 0,
            window_time: 0.0,
            window_frames: 0,
            fps: 0.0,
        }
    }

    /// Measure the wall-clock time since the last tick and advance by it.
    pub fn tick(&mut self) -> FrameTick {
        let now = Instant::now();
        let frame_time = now.duration_since(self.previous).as_secs_f64();
        self.previous = now;
        self.advance(frame_time)
    }

    /// Advance by an explicit frame time.
    pub fn advance(&mut self, frame_time: f64) -> FrameTick {
        let mut dt = frame_time.max(0.0);
        if dt > MAX_FRAME_TIME {
            warn!(
                "Frame time {:.1}ms exceeds maximum, clamping to {:.1}ms",
                dt * 1000.0,
                MAX_FRAME_TIME * 1000.0
            );
            dt = MAX_FRAME_TIME;
        }
        self.elapsed += dt;
        self.frame_count += 1;

        self.window_time += dt;
        self.window_frames += 1;
        let fps_report = if self.window_time >= FPS_WINDOW {
            self.fps = (self.window_frames as f64 / self.window_time) as f32;
            self.window_time = 0.0;
            self.window_frames = 0;
            Some(self.fps)
        } else {
            None
        };

        FrameTick {
            dt: dt as f32,
            fps_report,
        }
    }

    /// Seconds since the clock started, excluding clamped stall time.
    pub fn elapsed(&self) -> f64 {
        self.elapsed
    }

    pub fn frame_count(&self) -> u64 {
        self.frame_count
    }

    /// Most recent FPS average.
    pub fn fps(&self) -> f32 {
        self.fps
    }
}

/// Result of one clock tick.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct FrameTick {
    /// Seconds to advance the simulation.
    pub dt: f32,
    /// Set once per [`FPS_WINDOW`].
    pub fps_report: Option<f32>,
}
