// Copyright (c) 2025 Jonathan Fontanez
// SPDX-License-Identifier: BUSL-1.1

use std::time::Instant;

use parking_lot::Mutex;

use super::{CorrelatedTime, PresentationClock};
use crate::core::Result;

#[derive(Debug, Clone, Copy)]
struct ClockAnchor {
    running: bool,
    /// Presentation position at `instant`.
    position_ns: i64,
    instant: Instant,
    rate: f64,
}

impl ClockAnchor {
    fn position_at(&self, now: Instant) -> i64 {
        if !self.running {
            return self.position_ns;
        }
        let elapsed = now.saturating_duration_since(self.instant).as_nanos() as f64;
        self.position_ns + (elapsed * self.rate) as i64
    }
}

/// Wall-clock presentation clock.
///
/// Starts stopped at position zero. While running, presentation time advances
/// at `rate` times wall time; a negative rate runs it backward.
pub struct SoftwareClock {
    origin: Instant,
    anchor: Mutex<ClockAnchor>,
    description: String,
}

impl SoftwareClock {
    pub fn new() -> Self {
        Self::with_description("Software Clock".to_string())
    }

    pub fn with_description(description: String) -> Self {
        let origin = Instant::now();
        Self {
            origin,
            anchor: Mutex::new(ClockAnchor {
                running: false,
                position_ns: 0,
                instant: origin,
                rate: 1.0,
            }),
            description,
        }
    }

    /// Start running from `position_ns`, or from the current position if `None`.
    pub fn start(&self, position_ns: Option<i64>) {
        let now = Instant::now();
        let mut anchor = self.anchor.lock();
        let position = position_ns.unwrap_or_else(|| anchor.position_at(now));
        anchor.position_ns = position;
        anchor.instant = now;
        anchor.running = true;
        tracing::debug!("[{}] started at {}ns", self.description, position);
    }

    /// Freeze at the current position.
    pub fn pause(&self) {
        let now = Instant::now();
        let mut anchor = self.anchor.lock();
        anchor.position_ns = anchor.position_at(now);
        anchor.instant = now;
        anchor.running = false;
    }

    /// Stop and rewind to zero.
    pub fn stop(&self) {
        let mut anchor = self.anchor.lock();
        anchor.position_ns = 0;
        anchor.instant = Instant::now();
        anchor.running = false;
    }

    /// Change the playback rate without a discontinuity in position.
    pub fn set_rate(&self, rate: f64) {
        let now = Instant::now();
        let mut anchor = self.anchor.lock();
        anchor.position_ns = anchor.position_at(now);
        anchor.instant = now;
        anchor.rate = rate;
    }

    pub fn rate(&self) -> f64 {
        self.anchor.lock().rate
    }

    pub fn is_running(&self) -> bool {
        self.anchor.lock().running
    }
}

impl Default for SoftwareClock {
    fn default() -> Self {
        Self::new()
    }
}

impl PresentationClock for SoftwareClock {
    fn correlated_time(&self) -> Result<CorrelatedTime> {
        let now = Instant::now();
        let presentation_ns = self.anchor.lock().position_at(now);
        Ok(CorrelatedTime {
            presentation_ns,
            system_ns: now.duration_since(self.origin).as_nanos() as i64,
        })
    }

    fn description(&self) -> &str {
        &self.description
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;
    use std::time::Duration;

    fn position(clock: &SoftwareClock) -> i64 {
        clock.correlated_time().unwrap().presentation_ns
    }

    #[test]
    fn test_stopped_clock_does_not_advance() {
        let clock = SoftwareClock::new();
        thread::sleep(Duration::from_millis(5));
        assert_eq!(position(&clock), 0);
        assert!(!clock.is_running());
    }

    #[test]
    fn test_running_clock_advances() {
        let clock = SoftwareClock::new();
        clock.start(Some(0));
        thread::sleep(Duration::from_millis(10));
        assert!(position(&clock) >= 10_000_000);
    }

    #[test]
    fn test_start_at_position() {
        let clock = SoftwareClock::new();
        clock.start(Some(2_000_000_000));
        assert!(position(&clock) >= 2_000_000_000);
    }

    #[test]
    fn test_pause_freezes_position() {
        let clock = SoftwareClock::new();
        clock.start(Some(0));
        thread::sleep(Duration::from_millis(5));
        clock.pause();
        let frozen = position(&clock);
        thread::sleep(Duration::from_millis(5));
        assert_eq!(position(&clock), frozen);

        // Resume from the frozen position
        clock.start(None);
        assert!(position(&clock) >= frozen);
    }

    #[test]
    fn test_negative_rate_runs_backward() {
        let clock = SoftwareClock::new();
        clock.start(Some(1_000_000_000));
        clock.set_rate(-1.0);
        let before = position(&clock);
        thread::sleep(Duration::from_millis(10));
        assert!(position(&clock) < before);
    }

    #[test]
    fn test_stop_rewinds() {
        let clock = SoftwareClock::new();
        clock.start(Some(500));
        clock.stop();
        assert_eq!(position(&clock), 0);
    }

    #[test]
    fn test_system_time_is_monotonic() {
        let clock = SoftwareClock::with_description("mono".to_string());
        let a = clock.correlated_time().unwrap().system_ns;
        let b = clock.correlated_time().unwrap().system_ns;
        assert!(b >= a);
        assert_eq!(clock.description(), "mono");
    }
}
