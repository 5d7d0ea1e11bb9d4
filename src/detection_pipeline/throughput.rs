//! Rolling frames-per-second counter

use std::time::{Duration, Instant};

const WINDOW: Duration = Duration::from_secs(1);

/// Counts frames in one-second windows.
///
/// The reported rate is the count of the last completed window; the
/// running count resets whenever a window closes.
#[derive(Debug)]
pub struct ThroughputMeter {
    window_start: Instant,
    count: u32,
    rate: u32,
}

impl ThroughputMeter {
    pub fn new() -> Self {
        Self::starting_at(Instant::now())
    }

    pub fn starting_at(start: Instant) -> Self {
        Self {
            window_start: start,
            count: 0,
            rate: 0,
        }
    }

    /// Record one frame at `now`; returns the current rate
    pub fn tick(&mut self, now: Instant) -> u32 {
        self.count += 1;
        let elapsed = now.saturating_duration_since(self.window_start);
        if elapsed >= WINDOW {
            self.rate = self.count;
            self.count = 0;
            self.window_start = now;
        }
        self.rate
    }

    pub fn rate(&self) -> u32 {
        self.rate
    }
}

impl Default for ThroughputMeter {
    fn default() -> Self {
        Self::new()
    }
}
