//! Frame timing for the simulation loop

use std::collections::VecDeque;
use std::time::{Duration, Instant};

/// Frame durations over a sliding window of the most recent frames.
///
/// `begin`/`end` bracket one simulation step. Statistics cover at most the
/// last `window` completed frames; `frames` counts every completed frame.
pub struct FrameTimer {
    started: Option<Instant>,
    window: usize,
    recent: VecDeque<Duration>,
    frames: u64,
}

impl FrameTimer {
    pub fn new(window: usize) -> Self {
        Self {
            started: None,
            window,
            recent: VecDeque::with_capacity(window),
            frames: 0,
        }
    }

    pub fn begin(&mut self) {
        self.started = Some(Instant::now());
    }

    /// Close the frame opened by `begin`. Does nothing without one.
    pub fn end(&mut self) {
        let Some(started) = self.started.take() else {
            return;
        };
        self.frames += 1;
        if self.window == 0 {
            return;
        }
        if self.recent.len() == self.window {
            self.recent.pop_front();
        }
        self.recent.push_back(started.elapsed());
    }

    fn mean(&self) -> Duration {
        match u32::try_from(self.recent.len()) {
            Ok(0) | Err(_) => Duration::ZERO,
            Ok(n) => self.recent.iter().sum::<Duration>() / n,
        }
    }

    /// Frames per second implied by the mean frame time, or 0 with no samples.
    pub fn fps(&self) -> f64 {
        let secs = self.mean().as_secs_f64();
        if secs > 0.0 {
            1.0 / secs
        } else {
            0.0
        }
    }

    pub fn frame_time_ms(&self) -> f64 {
        self.mean().as_secs_f64() * 1000.0
    }

    /// Fastest and slowest frame in the window, in milliseconds.
    pub fn frame_time_range_ms(&self) -> (f64, f64) {
        let min = self.recent.iter().min().copied().unwrap_or_default();
        let max = self.recent.iter().max().copied().unwrap_or_default();
        (min.as_secs_f64() * 1000.0, max.as_secs_f64() * 1000.0)
    }

    /// Frames completed since creation.
    pub fn frames(&self) -> u64 {
        self.frames
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn counts_completed_frames() {
        let mut timer = FrameTimer::new(4);
        assert_eq!(timer.fps(), 0.0);
        assert_eq!(timer.frame_time_range_ms(), (0.0, 0.0));

        for _ in 0..3 {
            timer.begin();
            std::thread::sleep(Duration::from_millis(1));
            timer.end();
        }

        assert_eq!(timer.frames(), 3);
        assert!(timer.frame_time_ms() >= 1.0);
        let (min, max) = timer.frame_time_range_ms();
        assert!(1.0 <= min && min <= max);
    }

    #[test]
    fn window_keeps_only_recent_frames() {
        let mut timer = FrameTimer::new(2);
        timer.begin();
        std::thread::sleep(Duration::from_millis(20));
        timer.end();
        for _ in 0..2 {
            timer.begin();
            timer.end();
        }

        assert_eq!(timer.frames(), 3);
        assert!(timer.frame_time_range_ms().1 < 20.0, "slow frame left the window");
    }

    #[test]
    fn end_without_begin_is_ignored() {
        let mut timer = FrameTimer::new(0);
        timer.end();
        timer.begin();
        timer.end();
        assert_eq!(timer.frames(), 1);
        assert_eq!(timer.fps(), 0.0);
    }
}
