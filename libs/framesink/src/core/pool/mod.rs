// Copyright (c) 2025 Jonathan Fontanez
// SPDX-License-Identifier: BUSL-1.1

mod pooled_sample;
mod sample_pool;

pub use pooled_sample::PooledSample;
pub use sample_pool::{PoolId, SamplePool, SamplePoolStats, SampleState, OUTPUT_FORMAT};
