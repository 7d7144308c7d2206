// Copyright (c) 2025 Jonathan Fontanez
// SPDX-License-Identifier: BUSL-1.1

//! Stream state machine types
//!
//! - `StreamState` - lifecycle of the single video stream
//! - `StreamOperation` - the operations gated by state
//! - `VALID_STATE_MATRIX` - which operation is legal in which state

use serde::{Deserialize, Serialize};

use crate::core::{Result, StreamError};

/// Lifecycle state of a stream
///
/// # State Transitions
///
/// ```text
/// ┌────────┐ set_type ┌───────┐  start   ┌─────────┐
/// │ NotSet │─────────►│ Ready │─────────►│ Started │◄───┐
/// └────────┘          └───┬───┘          └────┬────┘    │
///                         │ pause             │ pause   │ start / restart
///                         ▼                   ▼         │
///                     ┌────────┐◄─────────────┘         │
///                     │ Paused │────────────────────────┘
///                     └───┬────┘
///                         │ stop (from any active state)
///                         ▼
///                     ┌─────────┐  start
///                     │ Stopped │──────────► Started
///                     └─────────┘
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum StreamState {
    /// No media type negotiated yet
    #[default]
    NotSet,
    /// Media type set, clock not running
    Ready,
    /// Normal clock-driven playback
    Started,
    /// Clock paused; samples queue up but are not processed
    Paused,
    /// Clock stopped; pending work flushed
    Stopped,
}

impl StreamState {
    /// Started or paused.
    pub fn is_active(&self) -> bool {
        matches!(self, Self::Started | Self::Paused)
    }

    pub fn allows(&self, operation: StreamOperation) -> bool {
        VALID_STATE_MATRIX[*self as usize][operation as usize]
    }

    /// `Ok` if `operation` is legal, otherwise an `InvalidRequest` error.
    pub fn validate(&self, operation: StreamOperation) -> Result<()> {
        if self.allows(operation) {
            Ok(())
        } else {
            Err(StreamError::InvalidRequest {
                state: *self,
                operation,
            })
        }
    }
}

impl std::fmt::Display for StreamState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        std::fmt::Debug::fmt(self, f)
    }
}

/// Operations validated against the current state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum StreamOperation {
    SetType,
    Start,
    Restart,
    Pause,
    Stop,
    ProcessSample,
    PlaceMarker,
}

impl StreamOperation {
    pub const ALL: [StreamOperation; 7] = [
        Self::SetType,
        Self::Start,
        Self::Restart,
        Self::Pause,
        Self::Stop,
        Self::ProcessSample,
        Self::PlaceMarker,
    ];
}

impl std::fmt::Display for StreamOperation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        std::fmt::Debug::fmt(self, f)
    }
}

/// Rows are `StreamState`, columns are `StreamOperation`, both in declaration order.
pub const VALID_STATE_MATRIX: [[bool; 7]; 5] = [
    //          SetType Start  Restart Pause  Stop   Sample Marker
    /* NotSet  */ [true, false, false, false, false, false, false],
    /* Ready   */ [true, true, true, true, true, false, true],
    /* Started */ [true, true, false, true, true, true, true],
    /* Paused  */ [true, true, true, true, true, true, true],
    /* Stopped */ [true, true, false, false, true, false, true],
];
