// Copyright (c) 2025 Jonathan Fontanez
// SPDX-License-Identifier: BUSL-1.1

//! Video subtypes and the texture formats they map onto.

use serde::{Deserialize, Serialize};

/// Texture formats the device layer understands.
///
/// Backends map these to native format constants.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(u32)]
pub enum TextureFormat {
    /// 8-bit BGRA, unsigned normalized. Every pooled output uses this.
    B8G8R8A8Unorm = 0,
    /// 8-bit BGR with an ignored alpha byte.
    B8G8R8X8Unorm = 1,
    /// 8-bit RGBA, unsigned normalized.
    R8G8B8A8Unorm = 2,
    /// Packed 4:4:4 YUV with alpha.
    Ayuv = 3,
    /// Packed 4:2:2 YUV.
    Yuy2 = 4,
    /// Bi-planar 4:2:0 YUV.
    Nv12 = 5,
    /// Bi-planar 4:1:1 YUV.
    Nv11 = 6,
    /// 4-bit alpha + 4-bit palette index.
    Ai44 = 7,
    P010 = 8,
    P016 = 9,
    Y210 = 10,
    Y216 = 11,
    Y410 = 12,
    Y416 = 13,
    /// Driver-private 4:2:0 layout.
    Opaque420 = 14,
}

impl TextureFormat {
    /// Bytes occupied by one `width` x `height` image in this format.
    pub const fn frame_size(&self, width: u32, height: u32) -> usize {
        let pixels = width as usize * height as usize;
        match self {
            Self::B8G8R8A8Unorm | Self::B8G8R8X8Unorm | Self::R8G8B8A8Unorm | Self::Ayuv => {
                pixels * 4
            }
            Self::Yuy2 => pixels * 2,
            Self::Nv12 | Self::Opaque420 => pixels + pixels / 2,
            Self::Nv11 => pixels + pixels / 2,
            Self::Ai44 => pixels,
            Self::P010 | Self::P016 => (pixels + pixels / 2) * 2,
            Self::Y210 | Self::Y216 => pixels * 4,
            Self::Y410 => pixels * 4,
            Self::Y416 => pixels * 8,
        }
    }

    /// Whether the format carries luma in a leading 8-bit plane.
    pub const fn is_planar_yuv(&self) -> bool {
        matches!(self, Self::Nv12 | Self::Nv11 | Self::Opaque420)
    }

    /// Whether the format is one of the 32-bit RGB layouts.
    pub const fn is_rgb(&self) -> bool {
        matches!(
            self,
            Self::B8G8R8A8Unorm | Self::B8G8R8X8Unorm | Self::R8G8B8A8Unorm
        )
    }
}

/// Media subtype identifiers negotiated with the producer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum VideoSubtype {
    Rgb32,
    Argb32,
    Ayuv,
    Yuy2,
    Nv12,
    Nv11,
    Ai44,
    P010,
    P016,
    Y210,
    Y216,
    Y410,
    Y416,
    /// Opaque 4:2:0 ("420O").
    Opaque420,
    /// A subtype with no texture mapping, identified by its FourCC.
    Other(u32),
}

/// Subtypes offered during negotiation, in preference order.
pub const SUPPORTED_SUBTYPES: [VideoSubtype; 7] = [
    VideoSubtype::Nv12,
    VideoSubtype::Yuy2,
    VideoSubtype::Rgb32,
    VideoSubtype::Argb32,
    VideoSubtype::Ayuv,
    VideoSubtype::Nv11,
    VideoSubtype::Opaque420,
];

impl VideoSubtype {
    /// Texture format backing this subtype, if any.
    pub const fn texture_format(&self) -> Option<TextureFormat> {
        Some(match self {
            Self::Rgb32 => TextureFormat::B8G8R8X8Unorm,
            Self::Argb32 => TextureFormat::R8G8B8A8Unorm,
            Self::Ayuv => TextureFormat::Ayuv,
            Self::Yuy2 => TextureFormat::Yuy2,
            Self::Nv12 => TextureFormat::Nv12,
            Self::Nv11 => TextureFormat::Nv11,
            Self::Ai44 => TextureFormat::Ai44,
            Self::P010 => TextureFormat::P010,
            Self::P016 => TextureFormat::P016,
            Self::Y210 => TextureFormat::Y210,
            Self::Y216 => TextureFormat::Y216,
            Self::Y410 => TextureFormat::Y410,
            Self::Y416 => TextureFormat::Y416,
            Self::Opaque420 => TextureFormat::Opaque420,
            Self::Other(_) => return None,
        })
    }

    /// Whether the subtype is in the negotiation whitelist.
    pub fn is_whitelisted(&self) -> bool {
        SUPPORTED_SUBTYPES.contains(self)
    }
}

impl std::fmt::Display for VideoSubtype {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Opaque420 => write!(f, "420O"),
            Self::Other(fourcc) => {
                let bytes = fourcc.to_le_bytes();
                if bytes.iter().all(|b| b.is_ascii_graphic()) {
                    write!(f, "{}", String::from_utf8_lossy(&bytes))
                } else {
                    write!(f, "0x{:08x}", fourcc)
                }
            }
            other => write!(f, "{}", format!("{:?}", other).to_uppercase()),
        }
    }
}
