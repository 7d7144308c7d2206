// Copyright (c) 2025 Jonathan Fontanez
// SPDX-License-Identifier: BUSL-1.1

//! Sink tuning via `framesink.yaml`.

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::core::media_type::FrameRate;
use crate::core::{Result, StreamError};

/// Tunables for the sample pool, scheduler and stream controller.
///
/// Every field has a default, so a YAML file only needs to name the values
/// it overrides:
///
/// ```yaml
/// pool_size: 8
/// samples_per_dispatch: 2
/// default_frame_rate: { numerator: 25, denominator: 1 }
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SinkConfig {
    /// Number of output samples allocated by the pool. Never grows.
    pub pool_size: usize,

    /// How long `SamplePool::acquire` waits for a free sample.
    pub acquire_timeout_ms: u64,

    /// Bound on the scheduler's flush barrier and worker start-up handshake.
    pub scheduler_timeout_ms: u64,

    /// Maximum queued plus requested samples before requests stop.
    pub hi_water_threshold: u32,

    /// Reference frames held back for deinterlacing.
    pub max_past_frames: u32,

    /// Samples handed to the scheduler per drain pass.
    pub samples_per_dispatch: usize,

    /// Frame rate assumed when the media type does not carry one.
    pub default_frame_rate: FrameRate,
}

impl Default for SinkConfig {
    fn default() -> Self {
        Self {
            pool_size: 5,
            acquire_timeout_ms: 5000,
            scheduler_timeout_ms: 5000,
            hi_water_threshold: 3,
            max_past_frames: 3,
            samples_per_dispatch: 1,
            default_frame_rate: FrameRate::new(30, 1),
        }
    }
}

impl SinkConfig {
    /// Configuration file name.
    pub const FILE_NAME: &'static str = "framesink.yaml";

    pub fn acquire_timeout(&self) -> Duration {
        Duration::from_millis(self.acquire_timeout_ms)
    }

    pub fn scheduler_timeout(&self) -> Duration {
        Duration::from_millis(self.scheduler_timeout_ms)
    }

    /// Reject values the pipeline cannot run with.
    pub fn validate(&self) -> Result<()> {
        if self.pool_size == 0 {
            return Err(StreamError::Configuration(
                "pool_size must be at least 1".into(),
            ));
        }
        if self.samples_per_dispatch == 0 {
            return Err(StreamError::Configuration(
                "samples_per_dispatch must be at least 1".into(),
            ));
        }
        if self.hi_water_threshold == 0 {
            return Err(StreamError::Configuration(
                "hi_water_threshold must be at least 1".into(),
            ));
        }
        if self.default_frame_rate.denominator == 0 || self.default_frame_rate.numerator == 0 {
            return Err(StreamError::Configuration(format!(
                "default_frame_rate {}/{} is not a valid rate",
                self.default_frame_rate.numerator, self.default_frame_rate.denominator
            )));
        }
        Ok(())
    }

    /// Parse and validate a YAML document.
    pub fn from_yaml(content: &str) -> Result<Self> {
        let config: Self = serde_yaml::from_str(content)
            .map_err(|e| StreamError::Configuration(format!("Failed to parse config: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from a directory. Returns error if the file is
    /// missing, cannot be parsed, or fails validation.
    pub fn load(dir: &Path) -> Result<Self> {
        let config_path = dir.join(Self::FILE_NAME);

        let content = std::fs::read_to_string(&config_path).map_err(|e| {
            StreamError::Configuration(format!("Failed to read {}: {}", config_path.display(), e))
        })?;

        let config: Self = serde_yaml::from_str(&content).map_err(|e| {
            StreamError::Configuration(format!("Failed to parse {}: {}", config_path.display(), e))
        })?;
        config.validate()?;

        tracing::info!("Loaded sink config from {}", config_path.display());
        Ok(config)
    }

    /// Load configuration from a directory, returning defaults if the file
    /// is missing or unusable.
    pub fn load_or_default(dir: &Path) -> Self {
        let config_path = dir.join(Self::FILE_NAME);

        if !config_path.exists() {
            tracing::debug!(
                "No {} found in {}, using defaults",
                Self::FILE_NAME,
                dir.display()
            );
            return Self::default();
        }

        match Self::load(dir) {
            Ok(config) => config,
            Err(e) => {
                tracing::warn!("{}, using defaults", e);
                Self::default()
            }
        }
    }
}
