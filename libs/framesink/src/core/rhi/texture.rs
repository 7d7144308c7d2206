// Copyright (c) 2025 Jonathan Fontanez
// SPDX-License-Identifier: BUSL-1.1

//! Device texture abstraction.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use bitflags::bitflags;
use parking_lot::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use super::TextureFormat;

static NEXT_TEXTURE_ID: AtomicU64 = AtomicU64::new(1);

/// Platform-specific native handle for sharing a texture with a consumer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NativeTextureHandle {
    /// CPU-resident storage owned by this process.
    Cpu,

    /// Windows: DXGI shared handle for cross-process GPU memory sharing.
    DxgiSharedHandle { handle: u64 },
}

bitflags! {
    /// How a texture may be bound on the device.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct BindFlags: u32 {
        /// Can be sampled by a shader.
        const SHADER_RESOURCE = 1 << 0;
        /// Can be used as a render target.
        const RENDER_TARGET = 1 << 1;
        /// Can be written by the video decoder.
        const DECODER = 1 << 2;
    }
}

/// Descriptor for creating a texture.
#[derive(Debug, Clone)]
pub struct TextureDescriptor<'a> {
    pub label: Option<&'a str>,
    pub width: u32,
    pub height: u32,
    pub format: TextureFormat,
    pub bind_flags: BindFlags,
    /// Texture array length; decoders hand out one slice per subresource.
    pub array_size: u32,
}

impl<'a> TextureDescriptor<'a> {
    pub fn new(width: u32, height: u32, format: TextureFormat) -> Self {
        Self {
            label: None,
            width,
            height,
            format,
            bind_flags: BindFlags::SHADER_RESOURCE,
            array_size: 1,
        }
    }

    /// Set the label for debugging.
    pub fn with_label(mut self, label: &'a str) -> Self {
        self.label = Some(label);
        self
    }

    pub fn with_bind_flags(mut self, bind_flags: BindFlags) -> Self {
        self.bind_flags = bind_flags;
        self
    }

    pub fn with_array_size(mut self, array_size: u32) -> Self {
        self.array_size = array_size.max(1);
        self
    }
}

struct TextureInner {
    id: u64,
    label: Option<String>,
    width: u32,
    height: u32,
    format: TextureFormat,
    bind_flags: BindFlags,
    array_size: u32,
    native: NativeTextureHandle,
    /// One byte buffer per array slice.
    slices: Vec<RwLock<Vec<u8>>>,
}

/// Device texture. Cloning shares the same underlying resource.
#[derive(Clone)]
pub struct Texture {
    inner: Arc<TextureInner>,
}

impl Texture {
    /// Wrap storage allocated by a device backend.
    pub(crate) fn from_descriptor(desc: &TextureDescriptor<'_>, native: NativeTextureHandle) -> Self {
        let slice_len = desc.format.frame_size(desc.width, desc.height);
        let slices = (0..desc.array_size.max(1))
            .map(|_| RwLock::new(vec![0u8; slice_len]))
            .collect();
        Self {
            inner: Arc::new(TextureInner {
                id: NEXT_TEXTURE_ID.fetch_add(1, Ordering::Relaxed),
                label: desc.label.map(str::to_string),
                width: desc.width,
                height: desc.height,
                format: desc.format,
                bind_flags: desc.bind_flags,
                array_size: desc.array_size.max(1),
                native,
                slices,
            }),
        }
    }

    /// Process-unique identifier.
    pub fn id(&self) -> u64 {
        self.inner.id
    }

    pub fn label(&self) -> Option<&str> {
        self.inner.label.as_deref()
    }

    pub fn width(&self) -> u32 {
        self.inner.width
    }

    pub fn height(&self) -> u32 {
        self.inner.height
    }

    pub fn format(&self) -> TextureFormat {
        self.inner.format
    }

    pub fn bind_flags(&self) -> BindFlags {
        self.inner.bind_flags
    }

    pub fn array_size(&self) -> u32 {
        self.inner.array_size
    }

    pub fn native_handle(&self) -> NativeTextureHandle {
        self.inner.native
    }

    /// Read access to one array slice's bytes.
    pub fn read(&self, subresource: u32) -> Option<RwLockReadGuard<'_, Vec<u8>>> {
        self.inner.slices.get(subresource as usize).map(|s| s.read())
    }

    /// Write access to one array slice's bytes.
    pub fn write(&self, subresource: u32) -> Option<RwLockWriteGuard<'_, Vec<u8>>> {
        self.inner.slices.get(subresource as usize).map(|s| s.write())
    }

    /// Whether both handles refer to the same resource.
    pub fn same_resource(&self, other: &Texture) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }
}

impl std::fmt::Debug for Texture {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Texture")
            .field("id", &self.id())
            .field("width", &self.width())
            .field("height", &self.height())
            .field("format", &self.format())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_descriptor_builders() {
        let desc = TextureDescriptor::new(64, 32, TextureFormat::Nv12)
            .with_label("decoder")
            .with_bind_flags(BindFlags::DECODER | BindFlags::SHADER_RESOURCE)
            .with_array_size(0);
        assert_eq!(desc.label, Some("decoder"));
        assert!(desc.bind_flags.contains(BindFlags::DECODER));
        assert_eq!(desc.array_size, 1);
    }

    #[test]
    fn test_texture_slices_and_identity() {
        let desc = TextureDescriptor::new(4, 4, TextureFormat::B8G8R8A8Unorm).with_array_size(2);
        let texture = Texture::from_descriptor(&desc, NativeTextureHandle::Cpu);
        let other = Texture::from_descriptor(&desc, NativeTextureHandle::Cpu);

        assert_eq!(texture.read(0).unwrap().len(), 64);
        assert!(texture.read(1).is_some());
        assert!(texture.read(2).is_none());

        let clone = texture.clone();
        assert!(clone.same_resource(&texture));
        assert!(!other.same_resource(&texture));
        assert_ne!(other.id(), texture.id());
    }
}
