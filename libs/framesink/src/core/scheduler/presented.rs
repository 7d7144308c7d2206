// Copyright (c) 2025 Jonathan Fontanez
// SPDX-License-Identifier: BUSL-1.1

use std::sync::atomic::{AtomicU64, Ordering};

use parking_lot::{MappedMutexGuard, Mutex, MutexGuard};

use crate::core::pool::{PooledSample, SampleState};
use crate::core::Result;

/// Receives samples from the scheduler when they are due.
///
/// Called on the scheduler worker thread (or the caller's thread for
/// immediate presents). Implementations must not block for long.
pub trait PresentCallback: Send + Sync {
    fn present_frame(&self, sample: PooledSample) -> Result<()>;
}

/// The single "currently presented" sample, double-buffered with the pool.
///
/// Guarded by its own lock so a slow consumer never stalls scheduling or
/// state transitions on the controller.
#[derive(Default)]
pub struct PresentedSlot {
    current: Mutex<Option<PooledSample>>,
    presented: AtomicU64,
}

impl PresentedSlot {
    pub fn new() -> Self {
        Self::default()
    }

    /// Borrow the presented sample. Hold the guard only as long as needed;
    /// the next present waits for it.
    pub fn lock(&self) -> Option<MappedMutexGuard<'_, PooledSample>> {
        MutexGuard::try_map(self.current.lock(), |sample| sample.as_mut()).ok()
    }

    /// Drop the presented sample, returning it to its pool.
    pub fn clear(&self) {
        let previous = self.current.lock().take();
        drop(previous);
    }

    /// Total samples presented through this slot.
    pub fn presented_count(&self) -> u64 {
        self.presented.load(Ordering::Relaxed)
    }
}

impl PresentCallback for PresentedSlot {
    fn present_frame(&self, sample: PooledSample) -> Result<()> {
        sample.set_state(SampleState::Present);
        tracing::trace!(
            "Presenting sample {} at {:?}",
            sample.index(),
            sample.sample_time
        );
        let previous = self.current.lock().replace(sample);
        self.presented.fetch_add(1, Ordering::Relaxed);

        // Released outside the slot lock
        drop(previous);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::pool::SamplePool;
    use crate::core::rhi::SoftwareDevice;
    use std::time::Duration;

    #[test]
    fn test_present_swaps_and_releases_previous() {
        let device = SoftwareDevice::new();
        let pool = SamplePool::with_capacity(2, Duration::from_millis(10));
        pool.initialize(&device, 4, 4).unwrap();
        let slot = PresentedSlot::new();
        assert!(slot.lock().is_none());

        let first = pool.acquire().unwrap();
        let first_index = first.index();
        slot.present_frame(first).unwrap();
        assert_eq!(slot.lock().unwrap().state(), Some(SampleState::Present));
        assert_eq!(pool.stats().present, 1);

        let second = pool.acquire().unwrap();
        slot.present_frame(second).unwrap();
        assert_ne!(slot.lock().unwrap().index(), first_index);

        let stats = pool.stats();
        assert_eq!(stats.ready, 1);
        assert_eq!(stats.present, 1);
        assert_eq!(slot.presented_count(), 2);

        slot.clear();
        assert_eq!(pool.stats().ready, 2);
    }
}
