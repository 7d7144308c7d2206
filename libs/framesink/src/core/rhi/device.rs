// Copyright (c) 2025 Jonathan Fontanez
// SPDX-License-Identifier: BUSL-1.1

//! GPU device seam.

use bitflags::bitflags;

use super::{Texture, TextureDescriptor, TextureFormat};
use crate::core::Result;

bitflags! {
    /// Video-processing support a device reports for a texture format.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct FormatSupport: u32 {
        /// The video processor accepts the format as input.
        const INPUT = 1 << 0;
        /// The video processor can write the format as output.
        const OUTPUT = 1 << 1;
    }
}

/// Field layout handed to the video processor for one blit.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameFormat {
    Progressive,
    InterlacedTopFieldFirst,
    InterlacedBottomFieldFirst,
}

/// The device operations the presenter and sample pool rely on.
///
/// Implementations wrap a real GPU video device or, for headless use, CPU
/// memory (`SoftwareDevice`).
pub trait GpuDevice: Send + Sync {
    /// Allocate a texture. Failures are reported, never retried.
    fn create_texture(&self, desc: &TextureDescriptor<'_>) -> Result<Texture>;

    /// Video-processor support for `format`.
    fn format_support(&self, format: TextureFormat) -> FormatSupport;

    /// Whether the video processor offers BOB deinterlacing.
    fn supports_bob_deinterlace(&self) -> bool;

    /// Convert one slice of `input` into `output`, deinterlacing per `frame_format`.
    fn blit(
        &self,
        input: &Texture,
        subresource: u32,
        output: &Texture,
        frame_format: FrameFormat,
    ) -> Result<()>;

    /// Changes whenever the underlying device is lost or replaced.
    fn generation(&self) -> u64;

    /// Human-readable description for logs.
    fn description(&self) -> &str;
}
