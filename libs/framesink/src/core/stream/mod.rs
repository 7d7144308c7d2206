// Copyright (c) 2025 Jonathan Fontanez
// SPDX-License-Identifier: BUSL-1.1

//! The stream controller: state machine, pending work queue and dispatch.

mod capabilities;
mod controller;
mod executor;
mod state;
mod work_queue;

pub use capabilities::{EventSource, StartPosition, StateMachine, TypeNegotiator};
pub use controller::StreamController;
pub use executor::AsyncOperation;
pub use state::{StreamOperation, StreamState, VALID_STATE_MATRIX};
