// Copyright (c) 2025 Jonathan Fontanez
// SPDX-License-Identifier: BUSL-1.1

//! Role interfaces implemented by [`StreamController`](super::StreamController).

use std::sync::Arc;

use super::StreamState;
use crate::core::clocks::PresentationClock;
use crate::core::events::{GetEventFlags, StreamEvent};
use crate::core::media_type::{MajorType, MediaType};
use crate::core::Result;

/// Where playback resumes on `start`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StartPosition {
    /// Presentation time in nanoseconds.
    At(i64),
    /// Continue from wherever the clock is now.
    Current,
}

/// Clock-driven lifecycle transitions.
pub trait StateMachine {
    fn start(
        &self,
        position: StartPosition,
        clock: Option<Arc<dyn PresentationClock>>,
    ) -> Result<()>;

    /// Resume from `Paused` (or re-arm from `Ready`).
    fn restart(&self) -> Result<()>;

    fn pause(&self) -> Result<()>;

    /// Stop playback. Pending samples are flushed asynchronously.
    fn stop(&self) -> Result<()>;

    fn state(&self) -> StreamState;
}

/// Ordered notifications for the producer.
pub trait EventSource {
    fn get_event(&self, flags: GetEventFlags) -> Result<StreamEvent>;

    /// Register a one-shot callback for the next event.
    fn begin_get_event(
        &self,
        callback: Box<dyn FnOnce(Result<StreamEvent>) + Send>,
    ) -> Result<()>;

    fn queue_event(&self, event: StreamEvent) -> Result<()>;
}

/// Media type negotiation.
pub trait TypeNegotiator {
    /// Number of preferred types offered through `media_type_by_index`.
    fn media_type_count(&self) -> Result<usize>;

    /// Preferred type at `index`, in priority order. Only the subtype is
    /// meaningful; the producer fills in size and rate.
    fn media_type_by_index(&self, index: usize) -> Result<MediaType>;

    fn is_media_type_supported(&self, media_type: &MediaType) -> Result<()>;

    fn set_current_media_type(&self, media_type: MediaType) -> Result<()>;

    fn current_media_type(&self) -> Result<MediaType>;

    fn major_type(&self) -> Result<MajorType>;
}
