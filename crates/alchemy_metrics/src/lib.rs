//! Alchemy Metrics - Frame and system timing
//!
//! Timing helpers used by the ECS system group and the runtime loop. With
//! the `metrics` feature off every type here is a zero-sized stub whose
//! methods do nothing, so call sites never need their own `cfg`.
//!
//! # Feature Flags
//!
//! - `metrics` - Enable metrics collection (default: disabled)
//!
//! # Usage
//!
//! ```ignore
//! use alchemy_metrics::{FrameTimer, SystemProfiler};
//!
//! let mut timer = FrameTimer::new(60); // Track last 60 frames
//! let mut profiler = SystemProfiler::new();
//! timer.begin();
//! profiler.time_system("movement", || run_movement());
//! timer.end();
//! println!("FPS: {:.1}", timer.fps());
//! ```

#[cfg(feature = "metrics")]
mod frame_timer;
#[cfg(feature = "metrics")]
mod system_profiler;

#[cfg(feature = "metrics")]
pub use frame_timer::FrameTimer;
#[cfg(feature = "metrics")]
pub use system_profiler::{SystemProfiler, SystemTiming};

/// Whether this build collects metrics.
pub const ENABLED: bool = cfg!(feature = "metrics");

// ============================================================================
// No-op stubs when metrics disabled
// ============================================================================

#[cfg(not(feature = "metrics"))]
pub struct FrameTimer;

#[cfg(not(feature = "metrics"))]
impl FrameTimer {
    pub fn new(_capacity: usize) -> Self { Self }
    pub fn begin(&mut self) {}
    pub fn end(&mut self) {}
    pub fn fps(&self) -> f64 { 0.0 }
    pub fn frame_time_ms(&self) -> f64 { 0.0 }
    pub fn frame_time_range_ms(&self) -> (f64, f64) { (0.0, 0.0) }
    pub fn frames(&self) -> u64 { 0 }
}

#[cfg(not(feature = "metrics"))]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SystemTiming {
    pub total: std::time::Duration,
    pub last: std::time::Duration,
    pub calls: u64,
}

#[cfg(not(feature = "metrics"))]
impl SystemTiming {
    pub fn average(&self) -> std::time::Duration { std::time::Duration::ZERO }
}

#[cfg(not(feature = "metrics"))]
#[derive(Default)]
pub struct SystemProfiler;

#[cfg(not(feature = "metrics"))]
impl SystemProfiler {
    pub fn new() -> Self { Self }
    pub fn time_system<F, R>(&mut self, _name: &str, f: F) -> R where F: FnOnce() -> R { f() }
    pub fn get_timing(&self, _name: &str) -> std::time::Duration { std::time::Duration::ZERO }
    pub fn timing(&self, _name: &str) -> Option<SystemTiming> { None }
    pub fn reset(&mut self) {}
    pub fn iter(&self) -> impl Iterator<Item = (&str, &SystemTiming)> { std::iter::empty() }
}
