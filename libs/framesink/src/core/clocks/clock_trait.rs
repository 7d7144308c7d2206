// Copyright (c) 2025 Jonathan Fontanez
// SPDX-License-Identifier: BUSL-1.1

//! Presentation clock trait - the time source that decides when frames are due.
//!
//! Clocks are passive: the scheduler and stream controller query them, and
//! the clock never calls back into either.

use crate::core::Result;

/// A presentation time paired with the system time at which it was read.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CorrelatedTime {
    /// Current presentation position in nanoseconds.
    pub presentation_ns: i64,
    /// Monotonic system time in nanoseconds when the position was sampled.
    pub system_ns: i64,
}

/// External time source driving when queued samples become due.
///
/// ## Contract
///
/// - **Thread-safe**: queried concurrently from the scheduler worker and the
///   stream dispatcher.
/// - **Rate-aware**: under a negative playback rate the presentation time
///   runs backward. The scheduler relies on this when it flips the sign of
///   its timing delta for reverse playback.
/// - **Swapped wholesale**: holders keep their own `Arc` and replace it on
///   start/stop, never mutate it partially.
///
/// ## Implementations
///
/// - `SoftwareClock`: wall-clock driven, supports pause and signed rate
/// - `SteppedClock`: moved by hand, for deterministic tests
pub trait PresentationClock: Send + Sync {
    /// Current presentation time and the system time it corresponds to.
    fn correlated_time(&self) -> Result<CorrelatedTime>;

    /// Human-readable description for logs.
    fn description(&self) -> &str;
}
