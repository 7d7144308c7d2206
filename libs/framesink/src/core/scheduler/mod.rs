// Copyright (c) 2025 Jonathan Fontanez
// SPDX-License-Identifier: BUSL-1.1

//! Clock-driven presentation scheduling.

mod presented;
mod sample_scheduler;
mod worker;

pub use presented::{PresentCallback, PresentedSlot};
pub use sample_scheduler::Scheduler;
pub use worker::ScheduleEvent;
