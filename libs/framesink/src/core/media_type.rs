// Copyright (c) 2025 Jonathan Fontanez
// SPDX-License-Identifier: BUSL-1.1

//! Media types negotiated with the producer and the samples it delivers.

use bitflags::bitflags;
use serde::{Deserialize, Serialize};

use crate::core::rhi::{Texture, TextureFormat, VideoSubtype};

/// Frame rate as a ratio.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct FrameRate {
    pub numerator: u32,
    pub denominator: u32,
}

impl FrameRate {
    pub const fn new(numerator: u32, denominator: u32) -> Self {
        Self {
            numerator,
            denominator,
        }
    }

    /// Duration of one frame in nanoseconds, or `None` for a zero rate.
    pub fn frame_interval_ns(&self) -> Option<i64> {
        if self.numerator == 0 || self.denominator == 0 {
            return None;
        }
        Some((1_000_000_000u64 * self.denominator as u64 / self.numerator as u64) as i64)
    }

    /// Same rate with the numerator doubled (two fields per frame).
    pub fn doubled(&self) -> Self {
        Self::new(self.numerator.saturating_mul(2), self.denominator)
    }
}

impl std::fmt::Display for FrameRate {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}", self.numerator, self.denominator)
    }
}

/// How the fields of a frame are laid out.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum InterlaceMode {
    #[default]
    Progressive,
    FieldInterleavedUpperFirst,
    FieldInterleavedLowerFirst,
    FieldSingleUpper,
    FieldSingleLower,
    /// Decided per sample from its flags.
    MixedInterlaceOrProgressive,
}

impl InterlaceMode {
    pub const fn is_progressive(&self) -> bool {
        matches!(self, Self::Progressive)
    }

    /// Modes where each delivered frame carries two temporal fields.
    pub const fn doubles_frame_rate(&self) -> bool {
        matches!(
            self,
            Self::FieldInterleavedUpperFirst
                | Self::FieldInterleavedLowerFirst
                | Self::FieldSingleUpper
                | Self::FieldSingleLower
                | Self::MixedInterlaceOrProgressive
        )
    }
}

/// Major media type. This sink only handles video.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum MajorType {
    Video,
}

/// Format description of a video stream.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MediaType {
    pub subtype: VideoSubtype,
    pub width: u32,
    pub height: u32,
    pub frame_rate: Option<FrameRate>,
    pub interlace_mode: InterlaceMode,
}

impl MediaType {
    /// Progressive video of `subtype` with no frame rate attached.
    pub fn video(subtype: VideoSubtype, width: u32, height: u32) -> Self {
        Self {
            subtype,
            width,
            height,
            frame_rate: None,
            interlace_mode: InterlaceMode::Progressive,
        }
    }

    pub fn with_frame_rate(mut self, frame_rate: FrameRate) -> Self {
        self.frame_rate = Some(frame_rate);
        self
    }

    pub fn with_interlace_mode(mut self, interlace_mode: InterlaceMode) -> Self {
        self.interlace_mode = interlace_mode;
        self
    }

    pub fn major_type(&self) -> MajorType {
        MajorType::Video
    }

    pub fn texture_format(&self) -> Option<TextureFormat> {
        self.subtype.texture_format()
    }
}

bitflags! {
    /// Per-sample attributes set by the producer.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct SampleFlags: u32 {
        /// The frame holds two interlaced fields.
        const INTERLACED = 1 << 0;
        /// The lower field is temporally first.
        const BOTTOM_FIELD_FIRST = 1 << 1;
        const REPEAT_FIRST_FIELD = 1 << 2;
        /// The frame holds a single field.
        const SINGLE_FIELD = 1 << 3;
        /// First sample after a gap in the stream.
        const DISCONTINUITY = 1 << 4;
    }
}

/// A decoded frame delivered by the producer.
#[derive(Debug, Clone)]
pub struct InputSample {
    pub texture: Texture,
    /// Array slice of `texture` holding this frame.
    pub subresource_index: u32,
    /// Presentation timestamp in nanoseconds.
    pub sample_time: Option<i64>,
    pub duration: Option<i64>,
    pub flags: SampleFlags,
}

impl InputSample {
    pub fn new(texture: Texture) -> Self {
        Self {
            texture,
            subresource_index: 0,
            sample_time: None,
            duration: None,
            flags: SampleFlags::empty(),
        }
    }

    pub fn with_time(mut self, sample_time: i64) -> Self {
        self.sample_time = Some(sample_time);
        self
    }

    pub fn with_duration(mut self, duration: i64) -> Self {
        self.duration = Some(duration);
        self
    }

    pub fn with_flags(mut self, flags: SampleFlags) -> Self {
        self.flags = flags;
        self
    }

    pub fn with_subresource(mut self, subresource_index: u32) -> Self {
        self.subresource_index = subresource_index;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_frame_interval() {
        assert_eq!(FrameRate::new(30, 1).frame_interval_ns(), Some(33_333_333));
        assert_eq!(FrameRate::new(30000, 1001).frame_interval_ns(), Some(33_366_666));
        assert_eq!(FrameRate::new(0, 1).frame_interval_ns(), None);
        assert_eq!(FrameRate::new(25, 1).doubled(), FrameRate::new(50, 1));
    }

    #[test]
    fn test_interlace_doubling() {
        assert!(!InterlaceMode::Progressive.doubles_frame_rate());
        assert!(InterlaceMode::FieldInterleavedUpperFirst.doubles_frame_rate());
        assert!(InterlaceMode::FieldSingleLower.doubles_frame_rate());
        assert!(InterlaceMode::MixedInterlaceOrProgressive.doubles_frame_rate());
    }

    #[test]
    fn test_media_type_builders() {
        let mt = MediaType::video(VideoSubtype::Nv12, 1920, 1080)
            .with_frame_rate(FrameRate::new(60, 1))
            .with_interlace_mode(InterlaceMode::FieldInterleavedLowerFirst);
        assert_eq!(mt.major_type(), MajorType::Video);
        assert_eq!(mt.texture_format(), Some(TextureFormat::Nv12));
        assert_eq!(mt.frame_rate, Some(FrameRate::new(60, 1)));
    }
}
