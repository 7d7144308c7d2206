// Copyright (c) 2025 Jonathan Fontanez
// SPDX-License-Identifier: BUSL-1.1

//! Clock-driven video sink.
//!
//! Decoded frames enter through a [`StreamController`], are converted by a
//! [`FrameProcessor`] into textures drawn from a fixed [`SamplePool`], and are
//! presented by the [`Scheduler`] worker when the presentation clock says
//! they are due. [`VideoSink`] wires the three together behind a single
//! video stream.

#![allow(clippy::type_complexity)] // Complex types are clear in context

// Marker values and contexts are JSON.
pub use serde_json;

pub mod core;

pub use core::{
    CorrelatedTime, EventQueue, EventSource, FormatSupport, FrameFormat, FrameProcessor,
    FrameRate, GetEventFlags, GpuDevice, InputSample, InterlaceMode, MajorType, Marker,
    MarkerStatus, MarkerType, MediaType, PoolId, PooledSample, PresentCallback, PresentationClock,
    PresentedSlot, Presenter, ProcessedFrame, Result, SampleFlags, SamplePool, SamplePoolStats,
    SampleState, Scheduler, SinkConfig, SoftwareClock, SoftwareDevice, StartPosition,
    StateMachine, SteppedClock, StreamController, StreamError, StreamEvent, StreamOperation,
    StreamState, Texture, TextureDescriptor, TextureFormat, TypeNegotiator, VideoSink,
    VideoSubtype,
};
