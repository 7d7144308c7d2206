// Copyright (c) 2025 Jonathan Fontanez
// SPDX-License-Identifier: BUSL-1.1

pub mod clocks;
pub mod config;
pub mod error;
pub mod events;
pub mod marker;
pub mod media_type;
pub mod pool;
pub mod presenter;
pub mod rhi;
pub mod scheduler;
pub mod sink;
pub mod stream;

pub use clocks::{CorrelatedTime, PresentationClock, SoftwareClock, SteppedClock};
pub use config::SinkConfig;
pub use error::*;
pub use events::{EventQueue, GetEventFlags, MarkerStatus, StreamEvent};
pub use marker::{Marker, MarkerType};
pub use media_type::{FrameRate, InputSample, InterlaceMode, MajorType, MediaType, SampleFlags};
pub use pool::{PoolId, PooledSample, SamplePool, SamplePoolStats, SampleState};
pub use presenter::{FrameProcessor, ProcessedFrame, Presenter};
pub use rhi::{
    FormatSupport, FrameFormat, GpuDevice, SoftwareDevice, Texture, TextureDescriptor,
    TextureFormat, VideoSubtype,
};
pub use scheduler::{PresentCallback, PresentedSlot, Scheduler};
pub use sink::VideoSink;
pub use stream::{
    EventSource, StartPosition, StateMachine, StreamController, StreamOperation, StreamState,
    TypeNegotiator,
};
