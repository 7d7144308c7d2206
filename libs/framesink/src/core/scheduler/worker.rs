// Copyright (c) 2025 Jonathan Fontanez
// SPDX-License-Identifier: BUSL-1.1

//! Scheduler worker loop and the present/hold/drop decision.

use std::time::Duration;

use crossbeam_channel::{Receiver, RecvTimeoutError, Sender};

use super::sample_scheduler::SchedulerShared;
use crate::core::pool::PooledSample;

/// Control events consumed by the scheduler worker.
#[derive(Debug)]
pub enum ScheduleEvent {
    Terminate,
    /// A sample was queued; run the drain pass.
    Schedule,
    /// Drop everything queued, then acknowledge on the sender.
    Flush(Sender<()>),
}

/// Outcome of comparing one sample against the clock.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum PresentDecision {
    /// More than a quarter frame behind: present now.
    Late,
    /// Inside the tolerance window: present now.
    OnTime,
    /// More than three quarters ahead: hold and sleep.
    Early(Duration),
}

/// Decide what to do with a sample `delta_ns` ahead of the clock.
///
/// `delta_ns` must already be sign-flipped for reverse playback.
pub(crate) fn evaluate(delta_ns: i64, quarter_ns: i64, rate: f64) -> PresentDecision {
    if delta_ns < -quarter_ns {
        return PresentDecision::Late;
    }
    let hold_ns = 3 * quarter_ns;
    if delta_ns > hold_ns {
        let speed = effective_speed(rate);
        let ms = ((delta_ns - hold_ns) as f64 / 1_000_000.0 / speed) as u64;
        // Zero would read as "no wait"
        return PresentDecision::Early(Duration::from_millis(ms.max(1)));
    }
    PresentDecision::OnTime
}

fn effective_speed(rate: f64) -> f64 {
    let speed = rate.abs();
    if speed < f64::EPSILON { 1.0 } else { speed }
}

/// Worker thread body. Returns when `Terminate` arrives or every sender is gone.
pub(super) fn run_worker(shared: &SchedulerShared, events: Receiver<ScheduleEvent>) {
    tracing::debug!("[{}] Scheduler worker started", shared.id);

    // None means wait indefinitely
    let mut next_sleep: Option<Duration> = None;

    loop {
        let first = match next_sleep {
            None => match events.recv() {
                Ok(event) => Some(event),
                Err(_) => break,
            },
            Some(timeout) => match events.recv_timeout(timeout) {
                Ok(event) => Some(event),
                Err(RecvTimeoutError::Timeout) => None,
                Err(RecvTimeoutError::Disconnected) => break,
            },
        };

        let Some(first) = first else {
            next_sleep = drain_queue(shared);
            continue;
        };

        let mut processed = false;
        let mut pending = Some(first);
        while let Some(event) = pending.take() {
            match event {
                ScheduleEvent::Terminate => {
                    tracing::debug!("[{}] Scheduler worker terminating", shared.id);
                    return;
                }
                ScheduleEvent::Flush(ack) => {
                    let dropped = shared.clear_queue();
                    tracing::debug!("[{}] Flushed {} queued samples", shared.id, dropped);
                    next_sleep = None;
                    // Samples queued after the flush still need a pass
                    processed = false;
                    if ack.send(()).is_err() {
                        tracing::warn!("[{}] Flush requester went away", shared.id);
                    }
                }
                ScheduleEvent::Schedule => {
                    if !processed {
                        next_sleep = drain_queue(shared);
                        processed = true;
                    }
                }
            }
            pending = events.try_recv().ok();
        }
    }

    tracing::debug!("[{}] Scheduler worker exiting (channel closed)", shared.id);
}

/// Present every due sample in FIFO order; stop at the first early one.
///
/// Returns how long to sleep before the held sample is due, or `None` once
/// the queue is empty.
pub(super) fn drain_queue(shared: &SchedulerShared) -> Option<Duration> {
    loop {
        let sample = shared.queue.lock().pop_front()?;

        match decide(shared, &sample) {
            PresentDecision::Early(sleep) => {
                tracing::trace!(
                    "[{}] Sample at {:?} is early, sleeping {:?}",
                    shared.id,
                    sample.sample_time,
                    sleep
                );
                shared.queue.lock().push_front(sample);
                return Some(sleep);
            }
            PresentDecision::Late => {
                tracing::trace!("[{}] Sample at {:?} is late", shared.id, sample.sample_time);
                shared.present(sample);
            }
            PresentDecision::OnTime => shared.present(sample),
        }
    }
}

fn decide(shared: &SchedulerShared, sample: &PooledSample) -> PresentDecision {
    let Some(clock) = shared.clock.lock().clone() else {
        return PresentDecision::OnTime;
    };
    let now = match clock.correlated_time() {
        Ok(now) => now,
        Err(e) => {
            tracing::warn!("[{}] Clock read failed, presenting now: {}", shared.id, e);
            return PresentDecision::OnTime;
        }
    };

    let timing = *shared.timing.lock();
    // Untimed samples are treated as due at zero
    let mut delta = sample.sample_time.unwrap_or(0) - now.presentation_ns;
    if timing.rate < 0.0 {
        delta = -delta;
    }
    evaluate(delta, timing.quarter_interval_ns, timing.rate)
}

#[cfg(test)]
mod tests {
    use super::*;

    const FRAME: i64 = 33_333_333;
    const Q: i64 = FRAME / 4;

    #[test]
    fn test_late_sample_presents() {
        assert_eq!(evaluate(-Q - 1, Q, 1.0), PresentDecision::Late);
        assert_eq!(evaluate(-10 * FRAME, Q, 1.0), PresentDecision::Late);
    }

    #[test]
    fn test_window_presents() {
        assert_eq!(evaluate(-Q, Q, 1.0), PresentDecision::OnTime);
        assert_eq!(evaluate(0, Q, 1.0), PresentDecision::OnTime);
        assert_eq!(evaluate(3 * Q, Q, 1.0), PresentDecision::OnTime);
    }

    #[test]
    fn test_early_sample_sleeps_until_window() {
        // Three frames ahead: sleep (3F - 3Q) = 75ms at 30 fps
        let decision = evaluate(3 * FRAME, Q, 1.0);
        let expected_ms = ((3 * FRAME - 3 * Q) / 1_000_000) as u64;
        assert_eq!(decision, PresentDecision::Early(Duration::from_millis(expected_ms)));
    }

    #[test]
    fn test_sleep_scales_with_rate() {
        let normal = evaluate(3 * FRAME, Q, 1.0);
        let double = evaluate(3 * FRAME, Q, -2.0);
        match (normal, double) {
            (PresentDecision::Early(a), PresentDecision::Early(b)) => {
                assert!(b < a);
                assert!(b >= a / 2 - Duration::from_millis(1));
            }
            other => panic!("unexpected decisions {:?}", other),
        }
    }

    #[test]
    fn test_minimum_sleep_is_one_millisecond() {
        assert_eq!(
            evaluate(3 * Q + 10, Q, 1.0),
            PresentDecision::Early(Duration::from_millis(1))
        );
    }

    #[test]
    fn test_zero_rate_treated_as_normal_speed() {
        assert_eq!(evaluate(3 * FRAME, Q, 0.0), evaluate(3 * FRAME, Q, 1.0));
    }
}
