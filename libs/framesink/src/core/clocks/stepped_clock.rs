// Copyright (c) 2025 Jonathan Fontanez
// SPDX-License-Identifier: BUSL-1.1

//! Manually driven clock.

use std::sync::atomic::{AtomicI64, Ordering};

use super::{CorrelatedTime, PresentationClock};
use crate::core::Result;

/// Presentation clock that only moves when told to.
///
/// Useful wherever timing decisions must be reproducible, e.g. asserting
/// that a sample three frames ahead is held until the clock reaches it.
///
/// ```rust,ignore
/// let clock = Arc::new(SteppedClock::new());
/// scheduler.start(Some(clock.clone()))?;
/// clock.advance(frame_ns);
/// ```
pub struct SteppedClock {
    position_ns: AtomicI64,
    system_ns: AtomicI64,
    description: String,
}

impl SteppedClock {
    pub fn new() -> Self {
        Self::with_description("Stepped Clock".to_string())
    }

    pub fn with_description(description: String) -> Self {
        Self {
            position_ns: AtomicI64::new(0),
            system_ns: AtomicI64::new(0),
            description,
        }
    }

    /// Jump to an absolute position.
    pub fn set(&self, position_ns: i64) {
        self.position_ns.store(position_ns, Ordering::SeqCst);
    }

    /// Move by `delta_ns` (negative moves backward). System time always moves forward.
    pub fn advance(&self, delta_ns: i64) {
        self.position_ns.fetch_add(delta_ns, Ordering::SeqCst);
        self.system_ns.fetch_add(delta_ns.abs(), Ordering::SeqCst);
    }

    pub fn position_ns(&self) -> i64 {
        self.position_ns.load(Ordering::SeqCst)
    }
}

impl Default for SteppedClock {
    fn default() -> Self {
        Self::new()
    }
}

impl PresentationClock for SteppedClock {
    fn correlated_time(&self) -> Result<CorrelatedTime> {
        Ok(CorrelatedTime {
            presentation_ns: self.position_ns.load(Ordering::SeqCst),
            system_ns: self.system_ns.load(Ordering::SeqCst),
        })
    }

    fn description(&self) -> &str {
        &self.description
    }
}
