// Copyright (c) 2025 Jonathan Fontanez
// SPDX-License-Identifier: BUSL-1.1

//! Stream notification channel.
//!
//! The controller queues events in the order it produces them; consumers
//! pull them with [`EventQueue::get_event`] or register a one-shot callback
//! with [`EventQueue::begin_get_event`]. After shutdown, already queued
//! events can still be drained; once empty, pulls fail with `Shutdown`.

use std::collections::VecDeque;
use std::time::{Duration, Instant};

use parking_lot::{Condvar, Mutex};
use serde::{Deserialize, Serialize};

use crate::core::{Result, StreamError};

/// Completion status reported with a marker.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum MarkerStatus {
    Ok,
    /// The marker was flushed before it was reached.
    Aborted,
}

/// Notifications produced by a stream.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum StreamEvent {
    Started,
    Stopped,
    Paused,
    /// The stream wants another input sample.
    RequestSample,
    Marker {
        context: serde_json::Value,
        status: MarkerStatus,
    },
    /// The GPU device was lost or replaced.
    DeviceChanged,
    /// An asynchronous operation failed.
    Error { error: String },
}

impl StreamEvent {
    pub fn error(error: &StreamError) -> Self {
        Self::Error {
            error: error.to_string(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GetEventFlags {
    /// Wait until an event arrives or the queue shuts down.
    Blocking,
    /// Fail with `NotFound` if nothing is queued.
    NoWait,
}

type EventCallback = Box<dyn FnOnce(Result<StreamEvent>) + Send>;

#[derive(Default)]
struct EventQueueState {
    events: VecDeque<StreamEvent>,
    pending: Option<EventCallback>,
    shut_down: bool,
}

/// Ordered, thread-safe notification queue.
#[derive(Default)]
pub struct EventQueue {
    state: Mutex<EventQueueState>,
    ready: Condvar,
}

impl EventQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append an event, or hand it straight to a pending callback.
    pub fn queue_event(&self, event: StreamEvent) -> Result<()> {
        let mut state = self.state.lock();
        if state.shut_down {
            return Err(StreamError::Shutdown);
        }
        tracing::trace!("Queueing stream event {:?}", event);

        if let Some(callback) = state.pending.take() {
            drop(state);
            callback(Ok(event));
            return Ok(());
        }

        state.events.push_back(event);
        drop(state);
        self.ready.notify_one();
        Ok(())
    }

    /// Pull the next event.
    pub fn get_event(&self, flags: GetEventFlags) -> Result<StreamEvent> {
        let mut state = self.state.lock();
        loop {
            if let Some(event) = state.events.pop_front() {
                return Ok(event);
            }
            if state.shut_down {
                return Err(StreamError::Shutdown);
            }
            if state.pending.is_some() {
                return Err(StreamError::Runtime(
                    "An asynchronous event request is pending".into(),
                ));
            }
            match flags {
                GetEventFlags::NoWait => {
                    return Err(StreamError::NotFound("No event available".into()));
                }
                GetEventFlags::Blocking => self.ready.wait(&mut state),
            }
        }
    }

    /// Pull the next event, waiting at most `timeout`. `Ok(None)` on timeout.
    pub fn get_event_timeout(&self, timeout: Duration) -> Result<Option<StreamEvent>> {
        let deadline = Instant::now() + timeout;
        let mut state = self.state.lock();
        loop {
            if let Some(event) = state.events.pop_front() {
                return Ok(Some(event));
            }
            if state.shut_down {
                return Err(StreamError::Shutdown);
            }
            if self.ready.wait_until(&mut state, deadline).timed_out() {
                return Ok(state.events.pop_front());
            }
        }
    }

    /// Register a one-shot callback for the next event.
    ///
    /// If an event is already queued the callback runs immediately on the
    /// calling thread. Only one callback may be outstanding.
    pub fn begin_get_event<F>(&self, callback: F) -> Result<()>
    where
        F: FnOnce(Result<StreamEvent>) + Send + 'static,
    {
        let mut state = self.state.lock();
        if state.pending.is_some() {
            return Err(StreamError::Runtime(
                "An asynchronous event request is already pending".into(),
            ));
        }
        if let Some(event) = state.events.pop_front() {
            drop(state);
            callback(Ok(event));
            return Ok(());
        }
        if state.shut_down {
            return Err(StreamError::Shutdown);
        }
        state.pending = Some(Box::new(callback));
        Ok(())
    }

    /// Number of events waiting to be pulled.
    pub fn len(&self) -> usize {
        self.state.lock().events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Reject new events. Queued events remain retrievable. A pending
    /// callback is completed with `Shutdown`.
    pub fn shutdown(&self) {
        let pending = {
            let mut state = self.state.lock();
            if state.shut_down {
                return;
            }
            state.shut_down = true;
            state.pending.take()
        };
        self.ready.notify_all();
        if let Some(callback) = pending {
            callback(Err(StreamError::Shutdown));
        }
    }

    pub fn is_shut_down(&self) -> bool {
        self.state.lock().shut_down
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::mpsc;
    use std::sync::Arc;
    use std::thread;

    #[test]
    fn test_events_are_fifo() {
        let queue = EventQueue::new();
        queue.queue_event(StreamEvent::Started).unwrap();
        queue.queue_event(StreamEvent::RequestSample).unwrap();

        assert_eq!(queue.len(), 2);
        assert_eq!(queue.get_event(GetEventFlags::NoWait).unwrap(), StreamEvent::Started);
        assert_eq!(
            queue.get_event(GetEventFlags::NoWait).unwrap(),
            StreamEvent::RequestSample
        );
        assert!(matches!(
            queue.get_event(GetEventFlags::NoWait),
            Err(StreamError::NotFound(_))
        ));
    }

    #[test]
    fn test_blocking_get_wakes_on_queue() {
        let queue = Arc::new(EventQueue::new());
        let reader = {
            let queue = Arc::clone(&queue);
            thread::spawn(move || queue.get_event(GetEventFlags::Blocking))
        };
        thread::sleep(Duration::from_millis(20));
        queue.queue_event(StreamEvent::Paused).unwrap();
        assert_eq!(reader.join().unwrap().unwrap(), StreamEvent::Paused);
    }

    #[test]
    fn test_begin_get_event_delivers_next_event() {
        let queue = EventQueue::new();
        let (tx, rx) = mpsc::channel();
        queue
            .begin_get_event(move |event| tx.send(event.unwrap()).unwrap())
            .unwrap();
        assert!(queue
            .begin_get_event(|_| {})
            .is_err());

        queue.queue_event(StreamEvent::Stopped).unwrap();
        assert_eq!(rx.recv().unwrap(), StreamEvent::Stopped);
        assert!(queue.is_empty());
    }

    #[test]
    fn test_drains_after_shutdown_then_rejects() {
        let queue = EventQueue::new();
        queue.queue_event(StreamEvent::Started).unwrap();
        queue.shutdown();

        assert!(matches!(
            queue.queue_event(StreamEvent::Paused),
            Err(StreamError::Shutdown)
        ));
        assert_eq!(
            queue.get_event(GetEventFlags::Blocking).unwrap(),
            StreamEvent::Started
        );
        assert!(matches!(
            queue.get_event(GetEventFlags::Blocking),
            Err(StreamError::Shutdown)
        ));
    }

    #[test]
    fn test_shutdown_completes_pending_callback() {
        let queue = EventQueue::new();
        let (tx, rx) = mpsc::channel();
        queue
            .begin_get_event(move |event| tx.send(event.is_err()).unwrap())
            .unwrap();
        queue.shutdown();
        assert!(rx.recv().unwrap());
    }

    #[test]
    fn test_get_event_timeout() {
        let queue = EventQueue::new();
        assert_eq!(queue.get_event_timeout(Duration::from_millis(5)).unwrap(), None);
        queue.queue_event(StreamEvent::DeviceChanged).unwrap();
        assert_eq!(
            queue.get_event_timeout(Duration::from_millis(5)).unwrap(),
            Some(StreamEvent::DeviceChanged)
        );
    }
}
