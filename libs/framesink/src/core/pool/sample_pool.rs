// Copyright (c) 2025 Jonathan Fontanez
// SPDX-License-Identifier: BUSL-1.1

//! SamplePool - fixed set of output textures recycled for the lifetime of a stream.
//!
//! The pool is an index-addressed arena: `N` slots, each holding a texture
//! and a [`SampleState`] tag. A slot is lent out from the moment `acquire`
//! claims it until its [`PooledSample`] is released (explicitly or on Drop).
//! The pool never allocates after `initialize`; when every slot is lent out,
//! `acquire` blocks until one comes back or the timeout expires.

use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::{Condvar, Mutex};
use uuid::Uuid;

use super::PooledSample;
use crate::core::config::SinkConfig;
use crate::core::rhi::{BindFlags, GpuDevice, Texture, TextureDescriptor, TextureFormat};
use crate::core::{Result, StreamError};

/// Format of every pooled output texture.
pub const OUTPUT_FORMAT: TextureFormat = TextureFormat::B8G8R8A8Unorm;

/// Who currently holds a pooled sample.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SampleState {
    /// In the pool, free to hand out.
    Ready,
    /// Being written by the frame processor.
    Updating,
    /// Waiting in the scheduler's presentation queue.
    Scheduled,
    /// Retained as the currently presented frame.
    Present,
}

/// Identity of one pool instance. Samples remember the pool they came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PoolId(Uuid);

impl PoolId {
    fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl std::fmt::Display for PoolId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Statistics about pool usage.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct SamplePoolStats {
    pub total_samples: usize,
    pub ready: usize,
    pub updating: usize,
    pub scheduled: usize,
    pub present: usize,
}

impl SamplePoolStats {
    pub fn lent_out(&self) -> usize {
        self.total_samples - self.ready
    }
}

pub(crate) struct PoolSlot {
    pub(crate) texture: Texture,
    pub(crate) state: SampleState,
}

#[derive(Default)]
pub(crate) struct PoolState {
    pub(crate) slots: Vec<PoolSlot>,
    /// Bumped by every `initialize`; samples from an older generation are stale.
    pub(crate) generation: u64,
    pub(crate) initialized: bool,
    pub(crate) shut_down: bool,
    pub(crate) width: u32,
    pub(crate) height: u32,
}

pub(crate) struct SamplePoolInner {
    pub(crate) id: PoolId,
    pub(crate) state: Mutex<PoolState>,
    pub(crate) available: Condvar,
    pub(crate) capacity: usize,
    pub(crate) acquire_timeout: Duration,
}

impl SamplePoolInner {
    /// Return a slot to READY and wake one waiting acquirer.
    pub(crate) fn release_slot(&self, generation: u64, index: usize) -> Result<()> {
        let mut state = self.state.lock();
        if state.shut_down || state.generation != generation {
            return Err(StreamError::NotFound(format!(
                "Sample {} is not a member of pool {}",
                index, self.id
            )));
        }
        let slot = state.slots.get_mut(index).ok_or_else(|| {
            StreamError::NotFound(format!("Sample {} is not a member of pool {}", index, self.id))
        })?;
        slot.state = SampleState::Ready;
        drop(state);

        self.available.notify_one();
        Ok(())
    }

    pub(crate) fn set_state(&self, generation: u64, index: usize, new_state: SampleState) {
        let mut state = self.state.lock();
        if state.generation != generation {
            return;
        }
        if let Some(slot) = state.slots.get_mut(index) {
            slot.state = new_state;
        }
    }

    pub(crate) fn state_of(&self, generation: u64, index: usize) -> Option<SampleState> {
        let state = self.state.lock();
        if state.generation != generation {
            return None;
        }
        state.slots.get(index).map(|slot| slot.state)
    }
}

/// The public sample pool API. Clones share the same slots.
#[derive(Clone)]
pub struct SamplePool {
    inner: Arc<SamplePoolInner>,
}

impl SamplePool {
    /// Create an empty pool sized by `config`. Call [`initialize`](Self::initialize)
    /// before acquiring.
    pub fn new(config: &SinkConfig) -> Self {
        Self::with_capacity(config.pool_size, config.acquire_timeout())
    }

    pub fn with_capacity(capacity: usize, acquire_timeout: Duration) -> Self {
        Self {
            inner: Arc::new(SamplePoolInner {
                id: PoolId::new(),
                state: Mutex::new(PoolState::default()),
                available: Condvar::new(),
                capacity,
                acquire_timeout,
            }),
        }
    }

    pub fn id(&self) -> PoolId {
        self.inner.id
    }

    pub fn capacity(&self) -> usize {
        self.inner.capacity
    }

    /// Allocate every sample for `width` x `height`, replacing any previous set.
    ///
    /// All textures are created before the pool is touched, so a failed
    /// allocation leaves the previous contents (or the empty pool) in place.
    /// Samples still lent out from the previous set become stale: releasing
    /// them reports `NotFound` and has no effect.
    pub fn initialize(&self, device: &dyn GpuDevice, width: u32, height: u32) -> Result<()> {
        let desc = TextureDescriptor::new(width, height, OUTPUT_FORMAT)
            .with_label("framesink-pool")
            .with_bind_flags(BindFlags::SHADER_RESOURCE | BindFlags::RENDER_TARGET);

        let mut slots = Vec::with_capacity(self.inner.capacity);
        for index in 0..self.inner.capacity {
            let texture = device.create_texture(&desc).map_err(|e| {
                tracing::warn!(
                    "[{}] Sample {} allocation failed, aborting pool initialization: {}",
                    self.inner.id,
                    index,
                    e
                );
                e
            })?;
            slots.push(PoolSlot {
                texture,
                state: SampleState::Ready,
            });
        }

        {
            let mut state = self.inner.state.lock();
            state.slots = slots;
            state.generation += 1;
            state.initialized = true;
            state.shut_down = false;
            state.width = width;
            state.height = height;
        }
        self.inner.available.notify_all();

        tracing::debug!(
            "[{}] Initialized {} samples at {}x{}",
            self.inner.id,
            self.inner.capacity,
            width,
            height
        );
        Ok(())
    }

    /// Claim a READY sample, blocking up to the configured timeout.
    pub fn acquire(&self) -> Result<PooledSample> {
        self.acquire_with_timeout(self.inner.acquire_timeout)
    }

    /// Claim a READY sample, blocking up to `timeout`.
    ///
    /// The scan and the claim happen under one lock, so a slot is never
    /// handed to two callers; the returned sample is already tagged UPDATING.
    pub fn acquire_with_timeout(&self, timeout: Duration) -> Result<PooledSample> {
        let deadline = Instant::now() + timeout;
        let mut state = self.inner.state.lock();

        loop {
            if state.shut_down {
                return Err(StreamError::Shutdown);
            }
            if !state.initialized {
                return Err(StreamError::NotInitialized(format!(
                    "Sample pool {} has not been initialized",
                    self.inner.id
                )));
            }

            if let Some(sample) = self.claim_ready(&mut state) {
                return Ok(sample);
            }

            if self
                .inner
                .available
                .wait_until(&mut state, deadline)
                .timed_out()
            {
                // Check one more time before giving up
                if !state.shut_down {
                    if let Some(sample) = self.claim_ready(&mut state) {
                        return Ok(sample);
                    }
                }
                tracing::warn!(
                    "[{}] Sample pool exhausted (timeout after {}ms)",
                    self.inner.id,
                    timeout.as_millis()
                );
                return Err(StreamError::ResourceExhausted(format!(
                    "Sample pool exhausted (timeout after {}ms)",
                    timeout.as_millis()
                )));
            }
        }
    }

    fn claim_ready(&self, state: &mut PoolState) -> Option<PooledSample> {
        let index = state
            .slots
            .iter()
            .position(|slot| slot.state == SampleState::Ready)?;
        let slot = &mut state.slots[index];
        slot.state = SampleState::Updating;
        Some(PooledSample::new(
            Arc::clone(&self.inner),
            state.generation,
            index,
            slot.texture.clone(),
        ))
    }

    /// Return `sample` to the pool.
    ///
    /// Fails with `NotFound` if the sample came from a different pool or an
    /// earlier `initialize`. A foreign sample still goes back to its own pool
    /// when it is dropped.
    pub fn release(&self, mut sample: PooledSample) -> Result<()> {
        if sample.pool_id() != self.inner.id {
            return Err(StreamError::NotFound(format!(
                "Sample from pool {} is not a member of pool {}",
                sample.pool_id(),
                self.inner.id
            )));
        }
        sample.release_to_pool()
    }

    /// Drop every texture. Returns `false` if the pool was already shut down.
    pub fn shutdown(&self) -> bool {
        let mut state = self.inner.state.lock();
        if state.shut_down {
            return false;
        }
        state.shut_down = true;
        state.initialized = false;
        state.slots.clear();
        state.generation += 1;
        drop(state);

        // Wake every blocked acquirer so they observe the shutdown
        self.inner.available.notify_all();
        tracing::debug!("[{}] Sample pool shut down", self.inner.id);
        true
    }

    pub fn is_initialized(&self) -> bool {
        self.inner.state.lock().initialized
    }

    /// Dimensions of the current sample set.
    pub fn dimensions(&self) -> Option<(u32, u32)> {
        let state = self.inner.state.lock();
        state.initialized.then_some((state.width, state.height))
    }

    /// Get statistics about pool usage.
    pub fn stats(&self) -> SamplePoolStats {
        let state = self.inner.state.lock();
        let mut stats = SamplePoolStats {
            total_samples: state.slots.len(),
            ..Default::default()
        };
        for slot in &state.slots {
            match slot.state {
                SampleState::Ready => stats.ready += 1,
                SampleState::Updating => stats.updating += 1,
                SampleState::Scheduled => stats.scheduled += 1,
                SampleState::Present => stats.present += 1,
            }
        }
        stats
    }
}

impl std::fmt::Debug for SamplePool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let stats = self.stats();
        f.debug_struct("SamplePool")
            .field("id", &self.inner.id)
            .field("total_samples", &stats.total_samples)
            .field("ready", &stats.ready)
            .field("lent_out", &stats.lent_out())
            .finish()
    }
}
