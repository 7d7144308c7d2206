// Copyright (c) 2025 Jonathan Fontanez
// SPDX-License-Identifier: BUSL-1.1

//! Frame processing: turns a decoded input texture into a pooled BGRA sample.

use std::sync::Arc;

use parking_lot::Mutex;

use crate::core::config::SinkConfig;
use crate::core::media_type::{InputSample, InterlaceMode, MediaType, SampleFlags};
use crate::core::pool::{PooledSample, SamplePool, SampleState, OUTPUT_FORMAT};
use crate::core::rhi::{FormatSupport, FrameFormat, GpuDevice};
use crate::core::{Result, StreamError};

/// Result of processing one input sample.
#[derive(Debug, Default)]
pub struct ProcessedFrame {
    /// Converted sample, tagged UPDATING. `None` if nothing was produced.
    pub output: Option<PooledSample>,
    /// The device was replaced since the previous frame.
    pub device_changed: bool,
    /// The input must be processed again (e.g. a deinterlacer emitting a second field).
    pub reprocess_input: bool,
}

/// Converts input samples into presentable output samples.
pub trait FrameProcessor: Send + Sync {
    /// Probe whether `media_type` can be processed on the current device.
    fn is_supported(&self, media_type: &MediaType) -> Result<()>;

    /// Adopt a new media type, re-initializing the output pool for its size.
    /// `None` clears the current type.
    fn set_media_type(&self, media_type: Option<&MediaType>) -> Result<()>;

    /// Convert `input` using the resolved interlace mode.
    fn process(
        &self,
        media_type: &MediaType,
        input: &InputSample,
        interlace_mode: InterlaceMode,
    ) -> Result<ProcessedFrame>;

    fn flush(&self) -> Result<()>;

    /// Whether the processor can take another sample now.
    fn is_ready_next_sample(&self) -> bool;

    fn shutdown(&self);
}

/// Interlace mode for one sample, resolving mixed content from its flags.
pub fn resolve_interlace_mode(mode: InterlaceMode, flags: SampleFlags) -> InterlaceMode {
    if mode != InterlaceMode::MixedInterlaceOrProgressive {
        return mode;
    }
    if !flags.contains(SampleFlags::INTERLACED) {
        InterlaceMode::Progressive
    } else if flags.contains(SampleFlags::BOTTOM_FIELD_FIRST) {
        InterlaceMode::FieldInterleavedLowerFirst
    } else {
        InterlaceMode::FieldInterleavedUpperFirst
    }
}

/// Frame format the video processor is configured with for `mode`.
pub fn frame_format_for(mode: InterlaceMode) -> FrameFormat {
    match mode {
        InterlaceMode::FieldInterleavedUpperFirst
        | InterlaceMode::FieldSingleUpper
        | InterlaceMode::MixedInterlaceOrProgressive => FrameFormat::InterlacedTopFieldFirst,
        InterlaceMode::FieldInterleavedLowerFirst | InterlaceMode::FieldSingleLower => {
            FrameFormat::InterlacedBottomFieldFirst
        }
        InterlaceMode::Progressive => FrameFormat::Progressive,
    }
}

struct PresenterState {
    width: u32,
    height: u32,
    /// Video processing stage validated on the current device.
    processor_ready: bool,
    device_generation: u64,
    ready_next_sample: bool,
    shut_down: bool,
}

/// [`FrameProcessor`] backed by a [`GpuDevice`] video processor.
pub struct Presenter {
    device: Arc<dyn GpuDevice>,
    pool: SamplePool,
    state: Mutex<PresenterState>,
}

impl Presenter {
    pub fn new(device: Arc<dyn GpuDevice>, config: &SinkConfig) -> Self {
        let device_generation = device.generation();
        Self {
            device,
            pool: SamplePool::new(config),
            state: Mutex::new(PresenterState {
                width: 0,
                height: 0,
                processor_ready: false,
                device_generation,
                ready_next_sample: true,
                shut_down: false,
            }),
        }
    }

    /// Output pool shared with the scheduler and presented slot.
    pub fn pool(&self) -> &SamplePool {
        &self.pool
    }

    pub fn device(&self) -> &Arc<dyn GpuDevice> {
        &self.device
    }

    fn ensure_processor(&self, state: &mut PresenterState) -> Result<()> {
        if state.processor_ready {
            return Ok(());
        }
        if !self
            .device
            .format_support(OUTPUT_FORMAT)
            .contains(FormatSupport::OUTPUT)
        {
            return Err(StreamError::UnsupportedDevice(format!(
                "{} cannot output {:?}",
                self.device.description(),
                OUTPUT_FORMAT
            )));
        }
        if !self.device.supports_bob_deinterlace() {
            return Err(StreamError::UnsupportedDevice(format!(
                "{} has no BOB deinterlacer",
                self.device.description()
            )));
        }
        state.processor_ready = true;
        tracing::debug!("Video processor ready on {}", self.device.description());
        Ok(())
    }
}

impl FrameProcessor for Presenter {
    fn is_supported(&self, media_type: &MediaType) -> Result<()> {
        if self.state.lock().shut_down {
            return Err(StreamError::Shutdown);
        }
        let format = media_type.texture_format().ok_or_else(|| {
            StreamError::UnsupportedFormat(format!("No texture format for {}", media_type.subtype))
        })?;
        if !self
            .device
            .format_support(format)
            .contains(FormatSupport::INPUT)
        {
            return Err(StreamError::UnsupportedFormat(format!(
                "{} does not accept {:?} input",
                self.device.description(),
                format
            )));
        }
        Ok(())
    }

    fn set_media_type(&self, media_type: Option<&MediaType>) -> Result<()> {
        let mut state = self.state.lock();
        if state.shut_down {
            return Err(StreamError::Shutdown);
        }
        let Some(media_type) = media_type else {
            state.width = 0;
            state.height = 0;
            state.processor_ready = false;
            return Ok(());
        };

        state.processor_ready = false;
        self.pool
            .initialize(self.device.as_ref(), media_type.width, media_type.height)?;
        state.width = media_type.width;
        state.height = media_type.height;
        Ok(())
    }

    fn process(
        &self,
        media_type: &MediaType,
        input: &InputSample,
        interlace_mode: InterlaceMode,
    ) -> Result<ProcessedFrame> {
        let mut state = self.state.lock();
        if state.shut_down {
            return Err(StreamError::Shutdown);
        }
        if state.width == 0 || state.height == 0 {
            return Err(StreamError::NotInitialized(
                "No media type has been set".into(),
            ));
        }

        let mode = resolve_interlace_mode(interlace_mode, input.flags);

        let mut frame = ProcessedFrame::default();
        let generation = self.device.generation();
        if generation != state.device_generation {
            tracing::info!(
                "Device {} changed (generation {} -> {})",
                self.device.description(),
                state.device_generation,
                generation
            );
            state.device_generation = generation;
            state.processor_ready = false;
            self.pool
                .initialize(self.device.as_ref(), state.width, state.height)?;
            frame.device_changed = true;
        }

        let (width, height) = (input.texture.width(), input.texture.height());
        if width != media_type.width || height != media_type.height {
            return Err(StreamError::SizeMismatch {
                expected_width: media_type.width,
                expected_height: media_type.height,
                actual_width: width,
                actual_height: height,
            });
        }

        self.ensure_processor(&mut state)?;
        drop(state);

        let mut output = self.pool.acquire()?;
        output.set_state(SampleState::Updating);
        self.device.blit(
            &input.texture,
            input.subresource_index,
            output.texture(),
            frame_format_for(mode),
        )?;

        output.sample_time = input.sample_time;
        output.duration = input.duration;
        output.flags = input.flags;
        frame.output = Some(output);
        Ok(frame)
    }

    fn flush(&self) -> Result<()> {
        let mut state = self.state.lock();
        if state.shut_down {
            return Err(StreamError::Shutdown);
        }
        state.ready_next_sample = true;
        Ok(())
    }

    fn is_ready_next_sample(&self) -> bool {
        let state = self.state.lock();
        !state.shut_down && state.ready_next_sample
    }

    fn shutdown(&self) {
        let mut state = self.state.lock();
        if state.shut_down {
            return;
        }
        state.shut_down = true;
        state.processor_ready = false;
        drop(state);
        self.pool.shutdown();
    }
}
