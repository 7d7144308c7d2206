// Copyright (c) 2025 Jonathan Fontanez
// SPDX-License-Identifier: BUSL-1.1

//! Render hardware interface: the slice of a GPU video device the sink needs.

mod device;
mod format;
mod software_device;
mod texture;

pub use device::{FormatSupport, FrameFormat, GpuDevice};
pub use format::{TextureFormat, VideoSubtype, SUPPORTED_SUBTYPES};
pub use software_device::SoftwareDevice;
pub use texture::{BindFlags, NativeTextureHandle, Texture, TextureDescriptor};
