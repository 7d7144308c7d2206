// Copyright (c) 2025 Jonathan Fontanez
// SPDX-License-Identifier: BUSL-1.1

//! Scheduler - times the presentation of processed samples against a clock.
//!
//! ```text
//!   schedule_sample ──▶ presentation queue ──▶ worker ──▶ PresentCallback
//!          │                                     ▲
//!          └──── ScheduleEvent (wake) ───────────┘
//! ```
//!
//! The worker is the only consumer of the presentation queue. Control
//! events (`Schedule`, `Flush`, `Terminate`) travel over a channel whose
//! `recv_timeout` doubles as the worker's timed sleep.

use std::collections::VecDeque;
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;

use crossbeam_channel::Sender;
use parking_lot::Mutex;

use super::worker::{run_worker, ScheduleEvent};
use super::PresentCallback;
use crate::core::clocks::PresentationClock;
use crate::core::config::SinkConfig;
use crate::core::media_type::FrameRate;
use crate::core::pool::{PooledSample, SampleState};
use crate::core::{Result, StreamError};

#[derive(Debug, Clone, Copy)]
pub(super) struct Timing {
    pub(super) frame_interval_ns: i64,
    pub(super) quarter_interval_ns: i64,
    /// Signed playback rate; negative plays in reverse.
    pub(super) rate: f64,
}

impl Timing {
    fn for_rate(frame_rate: FrameRate, rate: f64) -> Self {
        let frame_interval_ns = frame_rate.frame_interval_ns().unwrap_or(0);
        Self {
            frame_interval_ns,
            quarter_interval_ns: frame_interval_ns / 4,
            rate,
        }
    }
}

pub(super) struct SchedulerShared {
    pub(super) id: String,
    pub(super) queue: Mutex<VecDeque<PooledSample>>,
    pub(super) timing: Mutex<Timing>,
    pub(super) clock: Mutex<Option<Arc<dyn PresentationClock>>>,
    callback: Arc<dyn PresentCallback>,
}

impl SchedulerShared {
    pub(super) fn present(&self, sample: PooledSample) {
        if let Err(e) = self.callback.present_frame(sample) {
            tracing::warn!("[{}] Present callback failed: {}", self.id, e);
        }
    }

    /// Drop every queued sample without presenting it. Returns how many were dropped.
    pub(super) fn clear_queue(&self) -> usize {
        let dropped: Vec<PooledSample> = self.queue.lock().drain(..).collect();
        dropped.len()
    }
}

struct Worker {
    thread: JoinHandle<()>,
    events: Sender<ScheduleEvent>,
}

/// Presentation scheduler with one dedicated worker thread.
pub struct Scheduler {
    shared: Arc<SchedulerShared>,
    worker: Mutex<Option<Worker>>,
    timeout: Duration,
}

impl Scheduler {
    pub fn new(callback: Arc<dyn PresentCallback>, config: &SinkConfig) -> Self {
        Self {
            shared: Arc::new(SchedulerShared {
                id: "scheduler".to_string(),
                queue: Mutex::new(VecDeque::new()),
                timing: Mutex::new(Timing::for_rate(config.default_frame_rate, 1.0)),
                clock: Mutex::new(None),
                callback,
            }),
            worker: Mutex::new(None),
            timeout: config.scheduler_timeout(),
        }
    }

    /// Derive the frame interval and its quarter-frame tolerance window.
    pub fn set_frame_rate(&self, frame_rate: FrameRate) {
        let mut timing = self.shared.timing.lock();
        *timing = Timing::for_rate(frame_rate, timing.rate);
        tracing::debug!(
            "[{}] Frame rate {} -> interval {}ns",
            self.shared.id,
            frame_rate,
            timing.frame_interval_ns
        );
    }

    /// Store the signed playback rate. Already queued samples are not re-timed.
    pub fn set_clock_rate(&self, rate: f64) {
        self.shared.timing.lock().rate = rate;
        tracing::debug!("[{}] Clock rate {}", self.shared.id, rate);
    }

    pub fn frame_interval(&self) -> Duration {
        Duration::from_nanos(self.shared.timing.lock().frame_interval_ns.max(0) as u64)
    }

    pub fn quarter_interval(&self) -> Duration {
        Duration::from_nanos(self.shared.timing.lock().quarter_interval_ns.max(0) as u64)
    }

    pub fn clock_rate(&self) -> f64 {
        self.shared.timing.lock().rate
    }

    /// Attach `clock` and spin up the worker.
    ///
    /// If the worker is already running only the clock is replaced. Returns
    /// once the worker has signalled that it is running.
    pub fn start(&self, clock: Option<Arc<dyn PresentationClock>>) -> Result<()> {
        *self.shared.clock.lock() = clock;

        let mut worker = self.worker.lock();
        if worker.is_some() {
            tracing::debug!("[{}] Already running, clock replaced", self.shared.id);
            return Ok(());
        }

        let (events_tx, events_rx) = crossbeam_channel::unbounded();
        let (started_tx, started_rx) = crossbeam_channel::bounded(1);
        let shared = Arc::clone(&self.shared);

        let thread = std::thread::Builder::new()
            .name("framesink-scheduler".to_string())
            .spawn(move || {
                // Receiver dropped only if start() already gave up
                let _ = started_tx.send(());
                run_worker(&shared, events_rx);
            })
            .map_err(|e| StreamError::Runtime(format!("Failed to spawn thread: {}", e)))?;

        if started_rx.recv_timeout(self.timeout).is_err() {
            let _ = events_tx.send(ScheduleEvent::Terminate);
            return Err(StreamError::Runtime(
                "Scheduler worker did not start in time".into(),
            ));
        }

        *worker = Some(Worker {
            thread,
            events: events_tx,
        });
        tracing::info!("[{}] Started", self.shared.id);
        Ok(())
    }

    /// Terminate the worker, drop queued samples and release the clock.
    ///
    /// Returns `Ok(false)` if the scheduler was not running.
    pub fn stop(&self) -> Result<bool> {
        let Some(worker) = self.worker.lock().take() else {
            return Ok(false);
        };

        // A send error means the worker already exited
        let _ = worker.events.send(ScheduleEvent::Terminate);
        if worker.thread.join().is_err() {
            tracing::error!("[{}] Scheduler worker panicked", self.shared.id);
        }

        let dropped = self.shared.clear_queue();
        *self.shared.clock.lock() = None;
        tracing::info!("[{}] Stopped ({} queued samples dropped)", self.shared.id, dropped);
        Ok(true)
    }

    /// Discard every queued sample, blocking until the worker confirms.
    ///
    /// After this returns no sample queued before the call will be presented.
    pub fn flush(&self) -> Result<()> {
        let events = self.worker.lock().as_ref().map(|w| w.events.clone());
        let Some(events) = events else {
            self.shared.clear_queue();
            return Ok(());
        };

        let (ack_tx, ack_rx) = crossbeam_channel::bounded(1);
        if events.send(ScheduleEvent::Flush(ack_tx)).is_err() {
            self.shared.clear_queue();
            return Ok(());
        }
        ack_rx.recv_timeout(self.timeout).map_err(|_| {
            StreamError::Timeout(format!(
                "Scheduler flush not acknowledged within {}ms",
                self.timeout.as_millis()
            ))
        })
    }

    /// Queue `sample` for timed presentation, or present it right away if
    /// `present_now` is set or no clock is attached.
    pub fn schedule_sample(&self, sample: PooledSample, present_now: bool) -> Result<()> {
        let has_clock = self.shared.clock.lock().is_some();
        if present_now || !has_clock {
            return self.shared.callback.present_frame(sample);
        }

        sample.set_state(SampleState::Scheduled);
        self.shared.queue.lock().push_back(sample);

        if let Some(worker) = self.worker.lock().as_ref() {
            if worker.events.send(ScheduleEvent::Schedule).is_err() {
                tracing::warn!("[{}] Worker gone, sample left queued", self.shared.id);
            }
        }
        Ok(())
    }

    pub fn is_running(&self) -> bool {
        self.worker.lock().is_some()
    }

    /// Samples waiting in the presentation queue.
    pub fn queued_len(&self) -> usize {
        self.shared.queue.lock().len()
    }
}

impl Drop for Scheduler {
    fn drop(&mut self) {
        if let Err(e) = self.stop() {
            tracing::warn!("[{}] Stop on drop failed: {}", self.shared.id, e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::clocks::SteppedClock;
    use crate::core::pool::SamplePool;
    use crate::core::rhi::SoftwareDevice;
    use crate::core::scheduler::PresentedSlot;
    use std::time::Instant;

    const FRAME_NS: i64 = 33_333_333;

    struct Fixture {
        pool: SamplePool,
        slot: Arc<PresentedSlot>,
        scheduler: Scheduler,
        clock: Arc<SteppedClock>,
    }

    fn fixture() -> Fixture {
        let device = SoftwareDevice::new();
        let pool = SamplePool::with_capacity(5, Duration::from_millis(100));
        pool.initialize(&device, 8, 8).unwrap();
        let slot = Arc::new(PresentedSlot::new());
        let scheduler = Scheduler::new(slot.clone(), &SinkConfig::default());
        scheduler.set_frame_rate(FrameRate::new(30, 1));
        Fixture {
            pool,
            slot,
            scheduler,
            clock: Arc::new(SteppedClock::new()),
        }
    }

    fn sample_at(pool: &SamplePool, time: i64) -> PooledSample {
        let mut sample = pool.acquire().unwrap();
        sample.sample_time = Some(time);
        sample
    }

    fn wait_for(mut condition: impl FnMut() -> bool) -> bool {
        let deadline = Instant::now() + Duration::from_secs(2);
        while Instant::now() < deadline {
            if condition() {
                return true;
            }
            std::thread::sleep(Duration::from_millis(2));
        }
        false
    }

    #[test]
    fn test_frame_rate_sets_quarter_window() {
        let f = fixture();
        assert_eq!(f.scheduler.frame_interval(), Duration::from_nanos(FRAME_NS as u64));
        assert_eq!(
            f.scheduler.quarter_interval(),
            Duration::from_nanos((FRAME_NS / 4) as u64)
        );
    }

    #[test]
    fn test_present_now_bypasses_queue() {
        let f = fixture();
        f.scheduler
            .schedule_sample(sample_at(&f.pool, 10 * FRAME_NS), true)
            .unwrap();
        assert_eq!(f.slot.presented_count(), 1);
        assert_eq!(f.scheduler.queued_len(), 0);
    }

    #[test]
    fn test_no_clock_presents_immediately() {
        let f = fixture();
        f.scheduler
            .schedule_sample(sample_at(&f.pool, 10 * FRAME_NS), false)
            .unwrap();
        assert_eq!(f.slot.presented_count(), 1);
    }

    #[test]
    fn test_due_sample_presents_and_early_sample_waits() {
        let f = fixture();
        f.scheduler.start(Some(f.clock.clone())).unwrap();

        f.scheduler.schedule_sample(sample_at(&f.pool, 0), false).unwrap();
        assert!(wait_for(|| f.slot.presented_count() == 1));

        f.scheduler
            .schedule_sample(sample_at(&f.pool, 3 * FRAME_NS), false)
            .unwrap();
        std::thread::sleep(Duration::from_millis(30));
        assert_eq!(f.slot.presented_count(), 1);
        assert_eq!(f.pool.stats().scheduled, 1);

        f.clock.set(3 * FRAME_NS);
        assert!(wait_for(|| f.slot.presented_count() == 2));
        assert!(f.scheduler.stop().unwrap());
    }

    #[test]
    fn test_flush_is_a_barrier() {
        let f = fixture();
        f.scheduler.start(Some(f.clock.clone())).unwrap();
        f.scheduler
            .schedule_sample(sample_at(&f.pool, 100 * FRAME_NS), false)
            .unwrap();
        f.scheduler
            .schedule_sample(sample_at(&f.pool, 101 * FRAME_NS), false)
            .unwrap();

        f.scheduler.flush().unwrap();
        assert_eq!(f.scheduler.queued_len(), 0);
        assert_eq!(f.pool.stats().ready, 5);

        f.clock.set(200 * FRAME_NS);
        std::thread::sleep(Duration::from_millis(20));
        assert_eq!(f.slot.presented_count(), 0);
    }

    #[test]
    fn test_stop_discards_queued_samples() {
        let f = fixture();
        f.scheduler.start(Some(f.clock.clone())).unwrap();
        f.scheduler
            .schedule_sample(sample_at(&f.pool, 50 * FRAME_NS), false)
            .unwrap();
        f.scheduler
            .schedule_sample(sample_at(&f.pool, 51 * FRAME_NS), false)
            .unwrap();

        assert!(f.scheduler.stop().unwrap());
        assert!(!f.scheduler.stop().unwrap());
        assert_eq!(f.slot.presented_count(), 0);
        assert_eq!(f.pool.stats().ready, 5);
        assert!(!f.scheduler.is_running());
    }

    #[test]
    fn test_reverse_playback_flips_delta() {
        let f = fixture();
        f.scheduler.set_clock_rate(-1.0);
        f.clock.set(10 * FRAME_NS);
        f.scheduler.start(Some(f.clock.clone())).unwrap();

        // Behind the clock in forward terms, ahead of it in reverse
        f.scheduler
            .schedule_sample(sample_at(&f.pool, 7 * FRAME_NS), false)
            .unwrap();
        std::thread::sleep(Duration::from_millis(30));
        assert_eq!(f.slot.presented_count(), 0);

        f.clock.set(7 * FRAME_NS);
        assert!(wait_for(|| f.slot.presented_count() == 1));
        f.scheduler.stop().unwrap();
    }

    #[test]
    fn test_flush_without_worker_clears_queue() {
        let f = fixture();
        f.scheduler.start(Some(f.clock.clone())).unwrap();
        f.scheduler.stop().unwrap();
        assert!(f.scheduler.flush().is_ok());
    }
}
