// Copyright (c) 2025 Jonathan Fontanez
// SPDX-License-Identifier: BUSL-1.1

use std::sync::Arc;

use super::sample_pool::SamplePoolInner;
use super::{PoolId, SampleState};
use crate::core::media_type::SampleFlags;
use crate::core::rhi::Texture;
use crate::core::Result;

/// A sample lent out by a [`SamplePool`](super::SamplePool).
///
/// Exactly one holder owns it at a time; moving it between the processor,
/// the scheduler queue and the presented slot moves the lease. Dropping it
/// returns the slot to the pool.
pub struct PooledSample {
    pool: Arc<SamplePoolInner>,
    generation: u64,
    index: usize,
    texture: Texture,
    released: bool,
    /// Presentation timestamp in nanoseconds.
    pub sample_time: Option<i64>,
    pub duration: Option<i64>,
    pub flags: SampleFlags,
}

impl PooledSample {
    pub(crate) fn new(
        pool: Arc<SamplePoolInner>,
        generation: u64,
        index: usize,
        texture: Texture,
    ) -> Self {
        Self {
            pool,
            generation,
            index,
            texture,
            released: false,
            sample_time: None,
            duration: None,
            flags: SampleFlags::empty(),
        }
    }

    pub fn texture(&self) -> &Texture {
        &self.texture
    }

    /// Slot index within the pool.
    pub fn index(&self) -> usize {
        self.index
    }

    pub fn pool_id(&self) -> PoolId {
        self.pool.id
    }

    /// Current tag, or `None` if the pool has since been re-initialized or shut down.
    pub fn state(&self) -> Option<SampleState> {
        self.pool.state_of(self.generation, self.index)
    }

    pub fn set_state(&self, state: SampleState) {
        self.pool.set_state(self.generation, self.index, state);
    }

    pub(crate) fn release_to_pool(&mut self) -> Result<()> {
        self.released = true;
        self.pool.release_slot(self.generation, self.index)
    }
}

impl Drop for PooledSample {
    fn drop(&mut self) {
        if self.released {
            return;
        }
        if let Err(e) = self.release_to_pool() {
            tracing::trace!("[{}] Dropped stale sample {}: {}", self.pool.id, self.index, e);
        }
    }
}

impl std::fmt::Debug for PooledSample {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PooledSample")
            .field("pool", &self.pool.id)
            .field("index", &self.index)
            .field("sample_time", &self.sample_time)
            .field("state", &self.state())
            .finish()
    }
}
