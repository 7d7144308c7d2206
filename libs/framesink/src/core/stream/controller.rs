// Copyright (c) 2025 Jonathan Fontanez
// SPDX-License-Identifier: BUSL-1.1

//! Stream controller.
//!
//! ```text
//!  producer ──process_sample──▶ WorkQueue ──(dispatch thread)──▶ FrameProcessor
//!                                                                     │
//!  consumer ◀──lock_presented_sample── PresentedSlot ◀── Scheduler ◀──┘
//! ```
//!
//! Public calls validate against the state matrix and mutate state under
//! one lock, then hand an [`AsyncOperation`] to the serial executor. Every
//! drain of the work queue happens on that executor.
//!
//! Events, scheduler hand-offs and scheduler flushes produced while the lock
//! is held go into an `Outbox` and run after it is released, so a consumer
//! holding the presented sample never blocks the controller lock. The
//! delivery lock keeps outboxes from different callers in order.
//!
//! Lock order: delivery, then inner, then executor.

use std::sync::{Arc, Weak};
use std::time::Duration;

use parking_lot::{MappedMutexGuard, Mutex};

use super::capabilities::{EventSource, StartPosition, StateMachine, TypeNegotiator};
use super::executor::{AsyncOperation, SerialExecutor};
use super::work_queue::{WorkItem, WorkQueue};
use super::{StreamOperation, StreamState};
use crate::core::clocks::PresentationClock;
use crate::core::config::SinkConfig;
use crate::core::events::{EventQueue, GetEventFlags, MarkerStatus, StreamEvent};
use crate::core::marker::{Marker, MarkerType};
use crate::core::media_type::{InputSample, InterlaceMode, MajorType, MediaType};
use crate::core::pool::PooledSample;
use crate::core::presenter::FrameProcessor;
use crate::core::rhi::SUPPORTED_SUBTYPES;
use crate::core::scheduler::{PresentedSlot, Scheduler};
use crate::core::{Result, StreamError};

/// Identifier of the only stream.
pub(crate) const STREAM_ID: u32 = 0;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum DrainMode {
    /// Process samples and complete markers normally.
    Process,
    /// Discard samples, abort markers.
    Drop,
}

struct ControllerInner {
    state: StreamState,
    shut_down: bool,
    media_type: Option<MediaType>,
    interlace_mode: InterlaceMode,
    required_sample_count: u32,
    outstanding_requests: u32,
    start_time: Option<i64>,
    /// Set by `preroll` until the clock actually starts.
    waiting_for_clock_start: bool,
    queue: WorkQueue,
    clock: Option<Arc<dyn PresentationClock>>,
    presenter: Option<Arc<dyn FrameProcessor>>,
    scheduler: Option<Arc<Scheduler>>,
}

impl ControllerInner {
    fn check_shutdown(&self) -> Result<()> {
        if self.shut_down {
            Err(StreamError::Shutdown)
        } else {
            Ok(())
        }
    }

    fn presenter(&self) -> Result<Arc<dyn FrameProcessor>> {
        self.presenter.clone().ok_or(StreamError::Shutdown)
    }

    fn scheduler(&self) -> Result<Arc<Scheduler>> {
        self.scheduler.clone().ok_or(StreamError::Shutdown)
    }

    /// Whether a sample stamped `sample_time` is already behind the clock.
    /// Untimed samples and a missing clock are never late.
    fn is_late(&self, id: &str, sample_time: Option<i64>) -> bool {
        let (Some(sample_time), Some(clock)) = (sample_time, self.clock.as_ref()) else {
            return false;
        };
        let reverse = self
            .scheduler
            .as_ref()
            .is_some_and(|scheduler| scheduler.clock_rate() < 0.0);
        match clock.correlated_time() {
            Ok(now) if reverse => sample_time > now.presentation_ns,
            Ok(now) => sample_time < now.presentation_ns,
            Err(e) => {
                tracing::warn!("[{}] Clock read failed: {}", id, e);
                false
            }
        }
    }
}

struct ControllerShared {
    id: String,
    config: SinkConfig,
    inner: Mutex<ControllerInner>,
    presented: Arc<PresentedSlot>,
    events: EventQueue,
    executor: Mutex<Option<SerialExecutor>>,
    /// Held from before `inner` is taken until the outbox has run.
    delivery: Mutex<()>,
}

enum Deferred {
    Event(StreamEvent),
    Schedule {
        scheduler: Arc<Scheduler>,
        sample: PooledSample,
        present_now: bool,
    },
    Flush {
        scheduler: Option<Arc<Scheduler>>,
        presenter: Option<Arc<dyn FrameProcessor>>,
    },
}

/// Work collected under the controller lock, run in order once it is released.
#[derive(Default)]
struct Outbox {
    steps: Vec<Deferred>,
}

impl Outbox {
    fn push(&mut self, event: StreamEvent) {
        self.steps.push(Deferred::Event(event));
    }

    fn schedule(&mut self, scheduler: Arc<Scheduler>, sample: PooledSample, present_now: bool) {
        self.steps.push(Deferred::Schedule {
            scheduler,
            sample,
            present_now,
        });
    }

    fn flush(&mut self, inner: &ControllerInner) {
        self.steps.push(Deferred::Flush {
            scheduler: inner.scheduler.clone(),
            presenter: inner.presenter.clone(),
        });
    }
}

impl ControllerShared {
    fn submit(&self, operation: AsyncOperation) -> Result<()> {
        match self.executor.lock().as_ref() {
            Some(executor) => executor.submit(operation),
            None => Err(StreamError::Shutdown),
        }
    }

    /// Run the outbox without the controller lock. Every step runs; the
    /// first failure is returned.
    fn deliver(&self, outbox: Outbox) -> Result<()> {
        let mut first_error = None;
        for step in outbox.steps {
            let result = match step {
                Deferred::Event(event) => {
                    if let Err(e) = self.events.queue_event(event) {
                        tracing::debug!("[{}] Event dropped: {}", self.id, e);
                    }
                    Ok(())
                }
                Deferred::Schedule {
                    scheduler,
                    sample,
                    present_now,
                } => scheduler.schedule_sample(sample, present_now),
                Deferred::Flush {
                    scheduler,
                    presenter,
                } => flush_pipeline(scheduler.as_deref(), presenter.as_deref()),
            };
            if let Err(e) = result {
                first_error.get_or_insert(e);
            }
        }
        first_error.map_or(Ok(()), Err)
    }

    /// Entry point for the dispatch thread.
    fn dispatch(&self, operation: AsyncOperation) {
        let _delivery = self.delivery.lock();
        let mut outbox = Outbox::default();
        {
            let mut inner = self.inner.lock();
            if inner.shut_down {
                return;
            }
            if let Err(e) = self.dispatch_locked(&mut inner, operation, &mut outbox) {
                tracing::warn!("[{}] {:?} failed: {}", self.id, operation, e);
                outbox.push(StreamEvent::error(&e));
            }
        }
        if let Err(e) = self.deliver(outbox) {
            tracing::warn!("[{}] {:?} failed: {}", self.id, operation, e);
            if let Err(e) = self.events.queue_event(StreamEvent::error(&e)) {
                tracing::debug!("[{}] Event dropped: {}", self.id, e);
            }
        }
    }

    fn dispatch_locked(
        &self,
        inner: &mut ControllerInner,
        operation: AsyncOperation,
        outbox: &mut Outbox,
    ) -> Result<()> {
        match operation {
            AsyncOperation::Start | AsyncOperation::Restart => {
                outbox.push(StreamEvent::Started);
                inner.outstanding_requests += 1;
                outbox.push(StreamEvent::RequestSample);
                self.drain(inner, DrainMode::Process, outbox)?;
            }
            AsyncOperation::Stop => {
                self.flush_locked(inner, outbox)?;
                inner.outstanding_requests = 0;
                outbox.push(StreamEvent::Stopped);
            }
            AsyncOperation::Pause => outbox.push(StreamEvent::Paused),
            AsyncOperation::ProcessSample | AsyncOperation::PlaceMarker => {
                if inner.waiting_for_clock_start {
                    return Ok(());
                }
                if inner.presenter()?.is_ready_next_sample() {
                    self.drain(inner, DrainMode::Process, outbox)?;
                }
                if operation == AsyncOperation::ProcessSample {
                    self.request_samples(inner, outbox);
                }
            }
        }
        Ok(())
    }

    /// Ask for input until queued plus requested samples reach the hi-water mark.
    fn request_samples(&self, inner: &mut ControllerInner, outbox: &mut Outbox) {
        let hi_water = self.config.hi_water_threshold as usize;
        while inner.queue.len() + (inner.outstanding_requests as usize) < hi_water {
            inner.outstanding_requests += 1;
            outbox.push(StreamEvent::RequestSample);
        }
    }

    /// Pop work items in order. In `Process` mode the pass stops once
    /// `samples_per_dispatch` samples have been scheduled.
    fn drain(&self, inner: &mut ControllerInner, mode: DrainMode, outbox: &mut Outbox) -> Result<()> {
        let mut scheduled = 0;
        while let Some(item) = inner.queue.pop_front() {
            match item {
                WorkItem::Marker(marker) => {
                    let status = match mode {
                        DrainMode::Process => MarkerStatus::Ok,
                        DrainMode::Drop => MarkerStatus::Aborted,
                    };
                    outbox.push(StreamEvent::Marker {
                        context: marker.context,
                        status,
                    });
                }
                WorkItem::Sample(sample) => {
                    if mode == DrainMode::Drop {
                        continue;
                    }
                    if self.process_sample(inner, sample, outbox)? {
                        scheduled += 1;
                        if scheduled >= self.config.samples_per_dispatch {
                            break;
                        }
                    }
                }
            }
        }
        Ok(())
    }

    /// Process one input sample and queue the output for the scheduler.
    ///
    /// Returns whether a sample was queued. Late samples and processor
    /// failures drop the sample without failing the pass.
    fn process_sample(
        &self,
        inner: &mut ControllerInner,
        sample: InputSample,
        outbox: &mut Outbox,
    ) -> Result<bool> {
        if inner.is_late(&self.id, sample.sample_time) {
            tracing::debug!("[{}] Dropping late sample {:?}", self.id, sample.sample_time);
            return Ok(false);
        }

        let presenter = inner.presenter()?;
        let Some(media_type) = inner.media_type.as_ref() else {
            return Err(StreamError::NotInitialized("No media type has been set".into()));
        };

        let frame = match presenter.process(media_type, &sample, inner.interlace_mode) {
            Ok(frame) => frame,
            Err(e) => {
                tracing::warn!("[{}] Dropping sample {:?}: {}", self.id, sample.sample_time, e);
                return Ok(false);
            }
        };

        if frame.device_changed {
            outbox.push(StreamEvent::DeviceChanged);
        }

        let sample_time = sample.sample_time;
        if frame.reprocess_input {
            inner.queue.push_front(WorkItem::Sample(sample));
        }

        if inner.is_late(&self.id, sample_time) {
            tracing::debug!(
                "[{}] Dropping sample {:?}, late after processing",
                self.id,
                sample_time
            );
            return Ok(false);
        }

        let Some(output) = frame.output else {
            return Ok(false);
        };
        let present_now = inner.state != StreamState::Started;
        outbox.schedule(inner.scheduler()?, output, present_now);
        Ok(true)
    }

    /// Drop pending work now; the scheduler and presenter flush from the outbox.
    fn flush_locked(&self, inner: &mut ControllerInner, outbox: &mut Outbox) -> Result<()> {
        self.drain(inner, DrainMode::Drop, outbox)?;
        outbox.flush(inner);
        Ok(())
    }

    fn check_supported(&self, inner: &ControllerInner, media_type: &MediaType) -> Result<()> {
        if !media_type.subtype.is_whitelisted() {
            return Err(StreamError::UnsupportedFormat(format!(
                "{} is not a preferred subtype",
                media_type.subtype
            )));
        }
        inner.presenter()?.is_supported(media_type)
    }
}

fn flush_pipeline(
    scheduler: Option<&Scheduler>,
    presenter: Option<&dyn FrameProcessor>,
) -> Result<()> {
    if let Some(scheduler) = scheduler {
        scheduler.flush()?;
    }
    if let Some(presenter) = presenter {
        presenter.flush()?;
    }
    Ok(())
}

/// Controller for the sink's single video stream.
///
/// Owns the pending work queue, the state machine and the event queue.
/// Dropping the controller shuts it down.
pub struct StreamController {
    shared: Arc<ControllerShared>,
}

impl StreamController {
    pub fn new(
        presenter: Arc<dyn FrameProcessor>,
        scheduler: Arc<Scheduler>,
        presented: Arc<PresentedSlot>,
        config: &SinkConfig,
    ) -> Result<Self> {
        let id = format!("stream-{}", STREAM_ID);
        let shared = Arc::new(ControllerShared {
            id: id.clone(),
            config: config.clone(),
            inner: Mutex::new(ControllerInner {
                state: StreamState::NotSet,
                shut_down: false,
                media_type: None,
                interlace_mode: InterlaceMode::Progressive,
                required_sample_count: config.hi_water_threshold,
                outstanding_requests: 0,
                start_time: None,
                waiting_for_clock_start: false,
                queue: WorkQueue::default(),
                clock: None,
                presenter: Some(presenter),
                scheduler: Some(scheduler),
            }),
            presented,
            events: EventQueue::new(),
            executor: Mutex::new(None),
            delivery: Mutex::new(()),
        });

        let weak: Weak<ControllerShared> = Arc::downgrade(&shared);
        let executor = SerialExecutor::spawn(&id, move |operation| {
            if let Some(shared) = weak.upgrade() {
                shared.dispatch(operation);
            }
        })?;
        *shared.executor.lock() = Some(executor);

        tracing::debug!("[{}] Created", id);
        Ok(Self { shared })
    }

    pub fn stream_id(&self) -> u32 {
        STREAM_ID
    }

    /// Started or paused, and not shut down.
    pub fn is_active(&self) -> bool {
        let inner = self.shared.inner.lock();
        !inner.shut_down && inner.state.is_active()
    }

    pub fn is_shut_down(&self) -> bool {
        self.shared.inner.lock().shut_down
    }

    /// Start position cached by the last explicit `start`.
    pub fn start_time(&self) -> Option<i64> {
        self.shared.inner.lock().start_time
    }

    /// Samples the producer must be able to keep in flight for the current type.
    pub fn required_sample_count(&self) -> u32 {
        self.shared.inner.lock().required_sample_count
    }

    /// Sample requests not yet answered by `process_sample`.
    pub fn outstanding_requests(&self) -> u32 {
        self.shared.inner.lock().outstanding_requests
    }

    /// Samples and markers waiting for a drain pass.
    pub fn pending_len(&self) -> usize {
        self.shared.inner.lock().queue.len()
    }

    /// Deliver a requested sample.
    pub fn process_sample(&self, sample: InputSample) -> Result<()> {
        let mut inner = self.shared.inner.lock();
        inner.check_shutdown()?;
        if inner.outstanding_requests == 0 {
            return Err(StreamError::NoSampleRequested);
        }
        if !inner.waiting_for_clock_start {
            inner.state.validate(StreamOperation::ProcessSample)?;
        }

        inner.outstanding_requests -= 1;
        inner.queue.push_back(WorkItem::Sample(sample));

        if !matches!(inner.state, StreamState::Paused | StreamState::Stopped) {
            self.shared.submit(AsyncOperation::ProcessSample)?;
        }
        Ok(())
    }

    /// Queue a marker behind every sample delivered so far.
    pub fn place_marker(
        &self,
        marker_type: MarkerType,
        value: serde_json::Value,
        context: serde_json::Value,
    ) -> Result<()> {
        let mut inner = self.shared.inner.lock();
        inner.check_shutdown()?;
        inner.state.validate(StreamOperation::PlaceMarker)?;

        inner
            .queue
            .push_back(WorkItem::Marker(Marker::new(marker_type, value, context)));

        if inner.state != StreamState::Paused {
            self.shared.submit(AsyncOperation::PlaceMarker)?;
        }
        Ok(())
    }

    /// Drop pending samples, abort pending markers and flush the scheduler.
    ///
    /// Blocks until the scheduler confirms. No sample delivered before the
    /// call is presented afterwards.
    pub fn flush(&self) -> Result<()> {
        let _delivery = self.shared.delivery.lock();
        let mut outbox = Outbox::default();
        let result = {
            let mut inner = self.shared.inner.lock();
            inner.check_shutdown()?;
            self.shared.flush_locked(&mut inner, &mut outbox)
        };
        let delivered = self.shared.deliver(outbox);
        result.and(delivered)
    }

    /// Request one sample ahead of the clock starting.
    ///
    /// Until `start`, delivered samples skip state validation and are held
    /// without being processed.
    pub fn preroll(&self) -> Result<()> {
        let mut outbox = Outbox::default();
        {
            let mut inner = self.shared.inner.lock();
            inner.check_shutdown()?;
            if inner.state.is_active() || inner.state == StreamState::NotSet {
                return Err(StreamError::InvalidRequest {
                    state: inner.state,
                    operation: StreamOperation::Start,
                });
            }
            inner.waiting_for_clock_start = true;
            inner.outstanding_requests += 1;
            outbox.push(StreamEvent::RequestSample);
        }
        tracing::debug!("[{}] Prerolling", self.shared.id);
        self.shared.deliver(outbox)
    }

    /// Borrow the most recently presented sample.
    ///
    /// The guard holds the presented-sample lock; the scheduler cannot
    /// present the next sample until it is dropped. State queries and
    /// transitions stay available meanwhile, but `flush` and
    /// `set_current_media_type` wait for pending presents and must not be
    /// called while holding the guard.
    pub fn lock_presented_sample(&self) -> Result<Option<MappedMutexGuard<'_, PooledSample>>> {
        self.shared.inner.lock().check_shutdown()?;
        Ok(self.shared.presented.lock())
    }

    /// Wait up to `timeout` for the next event.
    pub fn get_event_timeout(&self, timeout: Duration) -> Result<Option<StreamEvent>> {
        self.shared.events.get_event_timeout(timeout)
    }

    /// Tear the stream down. Returns `Ok(false)` if already shut down.
    pub fn shutdown(&self) -> Result<bool> {
        let released = {
            let mut inner = self.shared.inner.lock();
            if inner.shut_down {
                return Ok(false);
            }
            inner.shut_down = true;
            inner.queue.clear();
            inner.media_type = None;
            (
                inner.clock.take(),
                inner.presenter.take(),
                inner.scheduler.take(),
            )
        };

        self.shared.events.shutdown();
        let executor = self.shared.executor.lock().take();
        if let Some(executor) = executor {
            executor.shutdown();
        }
        self.shared.presented.clear();
        drop(released);

        tracing::info!("[{}] Shut down", self.shared.id);
        Ok(true)
    }
}

impl Drop for StreamController {
    fn drop(&mut self) {
        if let Err(e) = self.shutdown() {
            tracing::warn!("[{}] Shutdown on drop failed: {}", self.shared.id, e);
        }
    }
}

impl StateMachine for StreamController {
    fn start(
        &self,
        position: StartPosition,
        clock: Option<Arc<dyn PresentationClock>>,
    ) -> Result<()> {
        let mut inner = self.shared.inner.lock();
        inner.check_shutdown()?;
        inner.state.validate(StreamOperation::Start)?;

        if let StartPosition::At(time) = position {
            inner.start_time = Some(time);
        }
        inner.clock = clock;
        inner.state = StreamState::Started;
        inner.waiting_for_clock_start = false;
        tracing::debug!("[{}] Start {:?}", self.shared.id, position);

        self.shared.submit(AsyncOperation::Start)
    }

    fn restart(&self) -> Result<()> {
        let mut inner = self.shared.inner.lock();
        inner.check_shutdown()?;
        inner.state.validate(StreamOperation::Restart)?;
        inner.state = StreamState::Started;
        self.shared.submit(AsyncOperation::Restart)
    }

    fn pause(&self) -> Result<()> {
        let mut inner = self.shared.inner.lock();
        inner.check_shutdown()?;
        inner.state.validate(StreamOperation::Pause)?;
        inner.state = StreamState::Paused;
        self.shared.submit(AsyncOperation::Pause)
    }

    fn stop(&self) -> Result<()> {
        let mut inner = self.shared.inner.lock();
        inner.check_shutdown()?;
        inner.state.validate(StreamOperation::Stop)?;
        inner.clock = None;
        inner.state = StreamState::Stopped;
        self.shared.submit(AsyncOperation::Stop)
    }

    fn state(&self) -> StreamState {
        self.shared.inner.lock().state
    }
}

impl EventSource for StreamController {
    fn get_event(&self, flags: GetEventFlags) -> Result<StreamEvent> {
        self.shared.events.get_event(flags)
    }

    fn begin_get_event(
        &self,
        callback: Box<dyn FnOnce(Result<StreamEvent>) + Send>,
    ) -> Result<()> {
        self.shared.events.begin_get_event(callback)
    }

    fn queue_event(&self, event: StreamEvent) -> Result<()> {
        self.shared.events.queue_event(event)
    }
}

impl TypeNegotiator for StreamController {
    fn media_type_count(&self) -> Result<usize> {
        self.shared.inner.lock().check_shutdown()?;
        Ok(SUPPORTED_SUBTYPES.len())
    }

    fn media_type_by_index(&self, index: usize) -> Result<MediaType> {
        self.shared.inner.lock().check_shutdown()?;
        SUPPORTED_SUBTYPES
            .get(index)
            .map(|subtype| MediaType::video(*subtype, 0, 0))
            .ok_or_else(|| StreamError::NotFound(format!("No media type at index {}", index)))
    }

    fn is_media_type_supported(&self, media_type: &MediaType) -> Result<()> {
        let inner = self.shared.inner.lock();
        inner.check_shutdown()?;
        self.shared.check_supported(&inner, media_type)
    }

    fn set_current_media_type(&self, media_type: MediaType) -> Result<()> {
        let _delivery = self.shared.delivery.lock();
        let mut outbox = Outbox::default();
        let result = {
            let mut inner = self.shared.inner.lock();
            inner.check_shutdown()?;
            inner.state.validate(StreamOperation::SetType)?;
            self.shared.check_supported(&inner, &media_type)?;

            let config = &self.shared.config;
            let mode = media_type.interlace_mode;
            let required = if mode.is_progressive() {
                config.hi_water_threshold
            } else {
                config
                    .hi_water_threshold
                    .saturating_add(config.max_past_frames)
                    .saturating_sub(1)
            };
            let frame_rate = match media_type.frame_rate {
                Some(rate) if rate.frame_interval_ns().is_some() => {
                    if mode.doubles_frame_rate() {
                        rate.doubled()
                    } else {
                        rate
                    }
                }
                _ => config.default_frame_rate,
            };

            inner.presenter()?.set_media_type(Some(&media_type))?;
            inner.scheduler()?.set_frame_rate(frame_rate);

            tracing::info!(
                "[{}] Media type {} {}x{} {:?} @ {}",
                self.shared.id,
                media_type.subtype,
                media_type.width,
                media_type.height,
                mode,
                frame_rate
            );
            inner.interlace_mode = mode;
            inner.required_sample_count = required;
            inner.media_type = Some(media_type);

            if inner.state.is_active() {
                self.shared.flush_locked(&mut inner, &mut outbox)
            } else {
                inner.state = StreamState::Ready;
                Ok(())
            }
        };
        let delivered = self.shared.deliver(outbox);
        result.and(delivered)
    }

    fn current_media_type(&self) -> Result<MediaType> {
        let inner = self.shared.inner.lock();
        inner.check_shutdown()?;
        inner
            .media_type
            .clone()
            .ok_or_else(|| StreamError::NotInitialized("No media type has been set".into()))
    }

    fn major_type(&self) -> Result<MajorType> {
        self.current_media_type().map(|media_type| media_type.major_type())
    }
}
