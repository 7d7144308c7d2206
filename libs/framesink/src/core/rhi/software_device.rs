// Copyright (c) 2025 Jonathan Fontanez
// SPDX-License-Identifier: BUSL-1.1

//! CPU-memory device for headless runs and tests.

use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};

use parking_lot::Mutex;

use super::{
    FormatSupport, FrameFormat, GpuDevice, NativeTextureHandle, Texture, TextureDescriptor,
    TextureFormat,
};
use crate::core::{Result, StreamError};

/// Device backed by plain byte buffers.
///
/// The blit reads luma (or RGB) from the input and writes opaque BGRA. Failure
/// knobs let callers exercise allocation and capability errors.
pub struct SoftwareDevice {
    description: String,
    allocations: AtomicUsize,
    allocation_limit: Mutex<Option<usize>>,
    unsupported: Mutex<HashSet<TextureFormat>>,
    bob: AtomicBool,
    generation: AtomicU64,
    blits: AtomicU64,
}

impl SoftwareDevice {
    pub fn new() -> Self {
        Self {
            description: "Software Device".to_string(),
            allocations: AtomicUsize::new(0),
            allocation_limit: Mutex::new(None),
            unsupported: Mutex::new(HashSet::new()),
            bob: AtomicBool::new(true),
            generation: AtomicU64::new(0),
            blits: AtomicU64::new(0),
        }
    }

    /// Fail every `create_texture` once `limit` textures have been created.
    pub fn with_allocation_limit(self, limit: usize) -> Self {
        *self.allocation_limit.lock() = Some(limit);
        self
    }

    /// Report no video-processor support for `format`.
    pub fn without_format(self, format: TextureFormat) -> Self {
        self.unsupported.lock().insert(format);
        self
    }

    pub fn without_bob(self) -> Self {
        self.bob.store(false, Ordering::SeqCst);
        self
    }

    pub fn set_allocation_limit(&self, limit: Option<usize>) {
        *self.allocation_limit.lock() = limit;
    }

    /// Simulate device loss and replacement.
    pub fn bump_generation(&self) {
        self.generation.fetch_add(1, Ordering::SeqCst);
    }

    pub fn allocations(&self) -> usize {
        self.allocations.load(Ordering::SeqCst)
    }

    pub fn blit_count(&self) -> u64 {
        self.blits.load(Ordering::SeqCst)
    }

    fn luma_at(format: TextureFormat, bytes: &[u8], width: u32, x: u32, y: u32) -> u8 {
        let w = width as usize;
        let (x, y) = (x as usize, y as usize);
        let index = match format {
            f if f.is_planar_yuv() => y * w + x,
            TextureFormat::Yuy2 => (y * w + x) * 2,
            // AYUV stores V, U, Y, A
            TextureFormat::Ayuv => (y * w + x) * 4 + 2,
            f if f.is_rgb() => (y * w + x) * 4 + 1,
            _ => y * w + x,
        };
        bytes.get(index).copied().unwrap_or(0)
    }

    /// Byte offset of pixel (`x`, `y`) in a tightly packed BGRA plane.
    fn bgra_offset(width: u32, x: u32, y: u32) -> usize {
        (y as usize * width as usize + x as usize) * 4
    }
}

impl Default for SoftwareDevice {
    fn default() -> Self {
        Self::new()
    }
}

impl GpuDevice for SoftwareDevice {
    fn create_texture(&self, desc: &TextureDescriptor<'_>) -> Result<Texture> {
        if let Some(limit) = *self.allocation_limit.lock() {
            if self.allocations.load(Ordering::SeqCst) >= limit {
                return Err(StreamError::GpuError(format!(
                    "Texture allocation failed: limit of {} reached",
                    limit
                )));
            }
        }
        if desc.width == 0 || desc.height == 0 {
            return Err(StreamError::GpuError(format!(
                "Invalid texture size {}x{}",
                desc.width, desc.height
            )));
        }
        self.allocations.fetch_add(1, Ordering::SeqCst);
        Ok(Texture::from_descriptor(desc, NativeTextureHandle::Cpu))
    }

    fn format_support(&self, format: TextureFormat) -> FormatSupport {
        if self.unsupported.lock().contains(&format) {
            FormatSupport::empty()
        } else {
            FormatSupport::INPUT | FormatSupport::OUTPUT
        }
    }

    fn supports_bob_deinterlace(&self) -> bool {
        self.bob.load(Ordering::SeqCst)
    }

    fn blit(
        &self,
        input: &Texture,
        subresource: u32,
        output: &Texture,
        frame_format: FrameFormat,
    ) -> Result<()> {
        if output.format() != TextureFormat::B8G8R8A8Unorm {
            return Err(StreamError::GpuError(format!(
                "Unsupported blit target format {:?}",
                output.format()
            )));
        }
        let src = input.read(subresource).ok_or_else(|| {
            StreamError::GpuError(format!("Subresource {} out of range", subresource))
        })?;
        let mut dst = output
            .write(0)
            .ok_or_else(|| StreamError::GpuError("Output texture has no storage".into()))?;

        let width = output.width().min(input.width());
        let height = output.height().min(input.height());
        for y in 0..height {
            // BOB: rebuild each line from the leading field's nearest line
            let src_y = match frame_format {
                FrameFormat::Progressive => y,
                FrameFormat::InterlacedTopFieldFirst => y & !1,
                FrameFormat::InterlacedBottomFieldFirst => (y | 1).min(input.height().saturating_sub(1)),
            };
            for x in 0..width {
                let luma = Self::luma_at(input.format(), &src, input.width(), x, src_y);
                let offset = Self::bgra_offset(output.width(), x, y);
                if let Some(px) = dst.get_mut(offset..offset + 4) {
                    px.copy_from_slice(&[luma, luma, luma, 0xff]);
                }
            }
        }
        self.blits.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }

    fn generation(&self) -> u64 {
        self.generation.load(Ordering::SeqCst)
    }

    fn description(&self) -> &str {
        &self.description
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::rhi::BindFlags;

    #[test]
    fn test_allocation_limit() {
        let device = SoftwareDevice::new().with_allocation_limit(2);
        let desc = TextureDescriptor::new(8, 8, TextureFormat::B8G8R8A8Unorm);
        assert!(device.create_texture(&desc).is_ok());
        assert!(device.create_texture(&desc).is_ok());
        assert!(matches!(
            device.create_texture(&desc),
            Err(StreamError::GpuError(_))
        ));
        assert_eq!(device.allocations(), 2);
    }

    #[test]
    fn test_format_support_knobs() {
        let device = SoftwareDevice::new().without_format(TextureFormat::Nv11).without_bob();
        assert!(device.format_support(TextureFormat::Nv12).contains(FormatSupport::INPUT));
        assert!(device.format_support(TextureFormat::Nv11).is_empty());
        assert!(!device.supports_bob_deinterlace());
    }

    #[test]
    fn test_blit_expands_luma_to_bgra() {
        let device = SoftwareDevice::new();
        let input = device
            .create_texture(&TextureDescriptor::new(2, 2, TextureFormat::Nv12))
            .unwrap();
        input.write(0).unwrap()[..4].copy_from_slice(&[10, 20, 30, 40]);
        let output = device
            .create_texture(
                &TextureDescriptor::new(2, 2, TextureFormat::B8G8R8A8Unorm)
                    .with_bind_flags(BindFlags::SHADER_RESOURCE | BindFlags::RENDER_TARGET),
            )
            .unwrap();

        device.blit(&input, 0, &output, FrameFormat::Progressive).unwrap();
        let out = output.read(0).unwrap();
        assert_eq!(&out[0..4], &[10, 10, 10, 0xff]);
        assert_eq!(&out[12..16], &[40, 40, 40, 0xff]);
        assert_eq!(device.blit_count(), 1);
    }

    #[test]
    fn test_blit_top_field_repeats_even_lines() {
        let device = SoftwareDevice::new();
        let input = device
            .create_texture(&TextureDescriptor::new(1, 2, TextureFormat::Nv12))
            .unwrap();
        input.write(0).unwrap()[..2].copy_from_slice(&[7, 99]);
        let output = device
            .create_texture(&TextureDescriptor::new(1, 2, TextureFormat::B8G8R8A8Unorm))
            .unwrap();

        device
            .blit(&input, 0, &output, FrameFormat::InterlacedTopFieldFirst)
            .unwrap();
        let out = output.read(0).unwrap();
        assert_eq!(out[0], 7);
        assert_eq!(out[4], 7);
    }

    #[test]
    fn test_bgra_offset_does_not_wrap_u32() {
        assert_eq!(SoftwareDevice::bgra_offset(64, 3, 2), (2 * 64 + 3) * 4);
        // 70000 * 70000 * 4 is well past u32::MAX
        assert_eq!(
            SoftwareDevice::bgra_offset(70_000, 69_999, 69_999),
            (69_999usize * 70_000 + 69_999) * 4
        );
    }

    #[test]
    fn test_generation_bump() {
        let device = SoftwareDevice::new();
        assert_eq!(device.generation(), 0);
        device.bump_generation();
        assert_eq!(device.generation(), 1);
    }
}
