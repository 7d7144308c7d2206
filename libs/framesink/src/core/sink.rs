// Copyright (c) 2025 Jonathan Fontanez
// SPDX-License-Identifier: BUSL-1.1

//! The video sink: one fixed stream wired to a presenter and a scheduler.

use std::sync::Arc;

use parking_lot::{MappedMutexGuard, Mutex};

use crate::core::clocks::PresentationClock;
use crate::core::config::SinkConfig;
use crate::core::media_type::MediaType;
use crate::core::pool::PooledSample;
use crate::core::presenter::{FrameProcessor, Presenter};
use crate::core::rhi::GpuDevice;
use crate::core::scheduler::{PresentedSlot, Scheduler};
use crate::core::stream::{StartPosition, StateMachine, StreamController};
use crate::core::{Result, StreamError};

struct SinkState {
    shut_down: bool,
    clock: Option<Arc<dyn PresentationClock>>,
}

/// Media sink with exactly one video stream (id 0).
///
/// The owner of the presentation clock forwards clock state changes to
/// the `on_clock_*` hooks. Frames come out through
/// [`VideoSink::lock_presented_sample`].
pub struct VideoSink {
    config: SinkConfig,
    state: Mutex<SinkState>,
    presenter: Arc<Presenter>,
    scheduler: Arc<Scheduler>,
    stream: StreamController,
}

impl VideoSink {
    pub fn new(device: Arc<dyn GpuDevice>, config: SinkConfig) -> Result<Self> {
        config.validate()?;

        let presenter = Arc::new(Presenter::new(device, &config));
        let presented = Arc::new(PresentedSlot::new());
        let scheduler = Arc::new(Scheduler::new(presented.clone(), &config));
        let stream =
            StreamController::new(presenter.clone(), scheduler.clone(), presented, &config)?;

        tracing::info!(
            "Video sink created on {} (pool of {})",
            presenter.device().description(),
            config.pool_size
        );

        Ok(Self {
            config,
            state: Mutex::new(SinkState {
                shut_down: false,
                clock: None,
            }),
            presenter,
            scheduler,
            stream,
        })
    }

    pub fn config(&self) -> &SinkConfig {
        &self.config
    }

    pub fn presenter(&self) -> &Arc<Presenter> {
        &self.presenter
    }

    pub fn scheduler(&self) -> &Arc<Scheduler> {
        &self.scheduler
    }

    fn check_shutdown(&self) -> Result<()> {
        if self.state.lock().shut_down {
            Err(StreamError::Shutdown)
        } else {
            Ok(())
        }
    }

    pub fn stream_count(&self) -> Result<usize> {
        self.check_shutdown()?;
        Ok(1)
    }

    pub fn stream_by_index(&self, index: usize) -> Result<&StreamController> {
        self.check_shutdown()?;
        if index != 0 {
            return Err(StreamError::InvalidStreamIndex(index as u32));
        }
        Ok(&self.stream)
    }

    pub fn stream_by_id(&self, id: u32) -> Result<&StreamController> {
        self.check_shutdown()?;
        if id != self.stream.stream_id() {
            return Err(StreamError::InvalidStreamIndex(id));
        }
        Ok(&self.stream)
    }

    /// The stream set is fixed.
    pub fn add_stream(&self, _id: u32, _media_type: Option<MediaType>) -> Result<&StreamController> {
        Err(StreamError::FixedStreams)
    }

    /// The stream set is fixed.
    pub fn remove_stream(&self, _id: u32) -> Result<()> {
        Err(StreamError::FixedStreams)
    }

    /// Attach the clock used by subsequent `on_clock_start` calls.
    pub fn set_presentation_clock(&self, clock: Option<Arc<dyn PresentationClock>>) -> Result<()> {
        let mut state = self.state.lock();
        if state.shut_down {
            return Err(StreamError::Shutdown);
        }
        state.clock = clock;
        Ok(())
    }

    pub fn presentation_clock(&self) -> Result<Option<Arc<dyn PresentationClock>>> {
        let state = self.state.lock();
        if state.shut_down {
            return Err(StreamError::Shutdown);
        }
        Ok(state.clock.clone())
    }

    /// The clock started, or was repositioned while running.
    ///
    /// A reposition of an active stream is a seek: pending work is flushed
    /// instead of restarting the scheduler.
    pub fn on_clock_start(&self, offset: StartPosition) -> Result<()> {
        let state = self.state.lock();
        if state.shut_down {
            return Err(StreamError::Shutdown);
        }

        if self.stream.is_active() && offset != StartPosition::Current {
            tracing::debug!("Seek to {:?}, flushing", offset);
            self.stream.flush()?;
        } else {
            self.scheduler.start(state.clock.clone())?;
        }
        self.stream.start(offset, state.clock.clone())
    }

    pub fn on_clock_stop(&self) -> Result<()> {
        let _state = self.lock_live()?;
        self.stream.stop()?;
        self.scheduler.stop()?;
        Ok(())
    }

    pub fn on_clock_pause(&self) -> Result<()> {
        let _state = self.lock_live()?;
        self.stream.pause()
    }

    pub fn on_clock_restart(&self) -> Result<()> {
        let _state = self.lock_live()?;
        self.stream.restart()
    }

    /// Forward a rate change to the scheduler. Negative rates play in reverse.
    pub fn on_clock_set_rate(&self, rate: f64) -> Result<()> {
        let _state = self.lock_live()?;
        self.scheduler.set_clock_rate(rate);
        Ok(())
    }

    fn lock_live(&self) -> Result<parking_lot::MutexGuard<'_, SinkState>> {
        let state = self.state.lock();
        if state.shut_down {
            return Err(StreamError::Shutdown);
        }
        Ok(state)
    }

    /// Borrow the most recently presented sample.
    pub fn lock_presented_sample(&self) -> Result<Option<MappedMutexGuard<'_, PooledSample>>> {
        self.check_shutdown()?;
        self.stream.lock_presented_sample()
    }

    /// Shut down the stream, scheduler and presenter. Returns `Ok(false)` if
    /// already shut down.
    pub fn shutdown(&self) -> Result<bool> {
        let clock = {
            let mut state = self.state.lock();
            if state.shut_down {
                return Ok(false);
            }
            state.shut_down = true;
            state.clock.take()
        };

        self.stream.shutdown()?;
        self.scheduler.stop()?;
        self.presenter.shutdown();
        drop(clock);

        tracing::info!("Video sink shut down");
        Ok(true)
    }

    pub fn is_shut_down(&self) -> bool {
        self.state.lock().shut_down
    }
}

impl Drop for VideoSink {
    fn drop(&mut self) {
        if let Err(e) = self.shutdown() {
            tracing::warn!("Video sink shutdown on drop failed: {}", e);
        }
    }
}
