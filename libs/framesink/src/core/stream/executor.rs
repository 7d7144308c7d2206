// Copyright (c) 2025 Jonathan Fontanez
// SPDX-License-Identifier: BUSL-1.1

//! Serialized executor for asynchronous stream operations.
//!
//! One thread drains a channel of [`AsyncOperation`]s, so operations run in
//! submission order and never overlap.

use std::thread::{JoinHandle, ThreadId};

use crossbeam_channel::{Receiver, Sender};

use crate::core::{Result, StreamError};

/// Operation tags queued by the public controller API.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AsyncOperation {
    Start,
    Restart,
    Pause,
    Stop,
    /// Drain trigger after a sample arrived.
    ProcessSample,
    /// Drain trigger after a marker was placed.
    PlaceMarker,
}

pub(crate) struct SerialExecutor {
    id: String,
    operations: Sender<AsyncOperation>,
    shutdown: Sender<()>,
    thread: Option<JoinHandle<()>>,
    thread_id: ThreadId,
}

impl SerialExecutor {
    /// Spawn the executor thread, running `handler` for every submitted operation.
    pub(crate) fn spawn<F>(id: &str, handler: F) -> Result<Self>
    where
        F: Fn(AsyncOperation) + Send + 'static,
    {
        let (operations_tx, operations_rx) = crossbeam_channel::unbounded();
        let (shutdown_tx, shutdown_rx) = crossbeam_channel::bounded(1);
        let thread_label = id.to_string();

        let thread = std::thread::Builder::new()
            .name(format!("{}-dispatch", id))
            .spawn(move || run_executor(&thread_label, operations_rx, shutdown_rx, handler))
            .map_err(|e| StreamError::Runtime(format!("Failed to spawn thread: {}", e)))?;
        let thread_id = thread.thread().id();

        Ok(Self {
            id: id.to_string(),
            operations: operations_tx,
            shutdown: shutdown_tx,
            thread: Some(thread),
            thread_id,
        })
    }

    pub(crate) fn submit(&self, operation: AsyncOperation) -> Result<()> {
        self.operations
            .send(operation)
            .map_err(|_| StreamError::Shutdown)
    }

    /// Stop the thread. Operations still queued are discarded.
    ///
    /// Joins unless called from the executor thread itself.
    pub(crate) fn shutdown(mut self) {
        let _ = self.shutdown.send(());
        let Some(thread) = self.thread.take() else {
            return;
        };
        if std::thread::current().id() == self.thread_id {
            tracing::debug!("[{}] Shutdown from dispatch thread, not joining", self.id);
            return;
        }
        if thread.join().is_err() {
            tracing::error!("[{}] Dispatch thread panicked", self.id);
        }
    }
}

fn run_executor<F>(
    id: &str,
    operations: Receiver<AsyncOperation>,
    shutdown: Receiver<()>,
    handler: F,
) where
    F: Fn(AsyncOperation),
{
    tracing::debug!("[{}] Dispatch thread started", id);
    loop {
        crossbeam_channel::select! {
            recv(shutdown) -> _ => break,
            recv(operations) -> msg => {
                match msg {
                    Ok(operation) => {
                        tracing::trace!("[{}] Dispatching {:?}", id, operation);
                        handler(operation);
                    }
                    Err(_) => break,
                }
            }
        }
    }
    tracing::debug!("[{}] Dispatch thread stopped", id);
}
