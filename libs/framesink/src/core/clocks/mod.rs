// Copyright (c) 2025 Jonathan Fontanez
// SPDX-License-Identifier: BUSL-1.1

mod clock_trait;
mod software_clock;
mod stepped_clock;

pub use clock_trait::{CorrelatedTime, PresentationClock};
pub use software_clock::SoftwareClock;
pub use stepped_clock::SteppedClock;
