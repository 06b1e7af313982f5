//! System profiler for timing named subsystems

use std::collections::HashMap;
use std::time::{Duration, Instant};

/// Accumulated timing for one named system.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SystemTiming {
    pub total: Duration,
    pub last: Duration,
    pub calls: u64,
}

impl SystemTiming {
    /// Mean duration per call.
    pub fn average(&self) -> Duration {
        match self.calls {
            0 => Duration::ZERO,
            calls => self.total / calls.min(u32::MAX as u64) as u32,
        }
    }
}

#[derive(Default)]
pub struct SystemProfiler {
    timings: HashMap<String, SystemTiming>,
}

impl SystemProfiler {
    pub fn new() -> Self {
        Self {
            timings: HashMap::new(),
        }
    }

    pub fn time_system<F, R>(&mut self, name: &str, f: F) -> R
    where
        F: FnOnce() -> R,
    {
        let start = Instant::now();
        let result = f();
        let elapsed = start.elapsed();

        let timing = self.timings.entry(name.to_string()).or_default();
        timing.total += elapsed;
        timing.last = elapsed;
        timing.calls += 1;
        result
    }

    /// Total time spent in `name` since the last reset.
    pub fn get_timing(&self, name: &str) -> Duration {
        self.timings.get(name).map(|t| t.total).unwrap_or(Duration::ZERO)
    }

    pub fn timing(&self, name: &str) -> Option<SystemTiming> {
        self.timings.get(name).copied()
    }

    pub fn reset(&mut self) {
        self.timings.clear();
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &SystemTiming)> {
        self.timings.iter().map(|(name, timing)| (name.as_str(), timing))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accumulates_per_name() {
        let mut profiler = SystemProfiler::new();
        profiler.time_system("physics", || std::thread::sleep(Duration::from_millis(2)));
        profiler.time_system("physics", || ());
        profiler.time_system("render", || ());

        let physics = profiler.timing("physics").unwrap();
        assert_eq!(physics.calls, 2);
        assert!(physics.total >= Duration::from_millis(2));
        assert_eq!(profiler.get_timing("physics"), physics.total);
        assert_eq!(profiler.iter().count(), 2);

        profiler.reset();
        assert!(profiler.timing("physics").is_none());
    }
}
