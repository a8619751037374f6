// src/ops.rs
//
// Flags and tags shared by load, store and palette operations.
// The numeric values match the constants scripting front-ends already register.

use crate::engine::color::ColorFormat;
use crate::error::{PlumError, Result};
use bitflags::bitflags;
use image::ImageFormat;

bitflags! {
    /// Load-time flag space.
    ///
    /// The low three bits select the target [`ColorFormat`] (a value of zero is
    /// 32-bit RGBA with standard alpha); the remaining bits steer palette handling.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct LoadFlags: u32 {
        const COLOR_64 = 0x0001;
        const COLOR_16 = 0x0002;
        const COLOR_32X = 0x0003;
        const COLOR_MASK = 0x0003;
        const ALPHA_INVERT = 0x0004;
        const ALPHA_REMOVE = 0x0100;
        const PALETTE_LOAD = 0x0200;
        const PALETTE_GENERATE = 0x0400;
        const PALETTE_FORCE = 0x0600;
        const PALETTE_MASK = 0x0600;
        const SORT_DARK_FIRST = 0x0800;
        const SORT_EXISTING = 0x1000;
        const PALETTE_REDUCE = 0x2000;
    }
}

/// How a decoded image ends up paletted.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PaletteMode {
    /// Always produce direct-color pixels.
    None,
    /// Keep the palette of containers that store one (GIF).
    Load,
    /// Build a palette whenever the image has at most 256 colors.
    Generate,
    /// Always build a palette; too many colors is an error.
    Force,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub enum SortOrder {
    #[default]
    LightFirst,
    DarkFirst,
}

impl LoadFlags {
    /// Parse a raw flag word, rejecting bits outside the known flag space.
    pub fn from_raw(bits: u32) -> Result<Self> {
        Self::from_bits(bits).ok_or_else(|| {
            PlumError::invalid_argument("flags", format!("{bits:#x}"), "unknown flag bits set")
        })
    }

    pub fn color_format(self) -> ColorFormat {
        let bits = self.bits() & (Self::COLOR_MASK.bits() | Self::ALPHA_INVERT.bits());
        ColorFormat::from_bits_truncate(bits)
    }

    pub fn palette_mode(self) -> PaletteMode {
        let mode = self.bits() & Self::PALETTE_MASK.bits();
        if mode == Self::PALETTE_FORCE.bits() {
            PaletteMode::Force
        } else if mode == Self::PALETTE_GENERATE.bits() {
            PaletteMode::Generate
        } else if mode == Self::PALETTE_LOAD.bits() {
            PaletteMode::Load
        } else {
            PaletteMode::None
        }
    }

    pub fn sort_order(self) -> SortOrder {
        if self.contains(Self::SORT_DARK_FIRST) {
            SortOrder::DarkFirst
        } else {
            SortOrder::LightFirst
        }
    }

    /// Flags selecting `format` with every other option cleared.
    pub fn with_color_format(format: ColorFormat) -> Self {
        Self::from_bits_retain(format.bits())
    }
}

/// Number of container type tags, `None` included.
pub const NUM_IMAGE_TYPES: u32 = 7;

/// Container format an image was decoded from, or will be encoded to.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Default)]
#[repr(u32)]
pub enum ImageType {
    #[default]
    None = 0,
    Bmp = 1,
    Gif = 2,
    Png = 3,
    Apng = 4,
    Jpeg = 5,
    Pnm = 6,
}

impl ImageType {
    pub fn from_u32(value: u32) -> Option<Self> {
        match value {
            0 => Some(Self::None),
            1 => Some(Self::Bmp),
            2 => Some(Self::Gif),
            3 => Some(Self::Png),
            4 => Some(Self::Apng),
            5 => Some(Self::Jpeg),
            6 => Some(Self::Pnm),
            _ => None,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            Self::None => "<none>",
            Self::Bmp => "BMP",
            Self::Gif => "GIF",
            Self::Png => "PNG",
            Self::Apng => "APNG",
            Self::Jpeg => "JPEG",
            Self::Pnm => "PNM",
        }
    }

    /// Map a format detected by the codec backend.
    pub fn from_image_format(format: ImageFormat) -> Option<Self> {
        match format {
            ImageFormat::Bmp => Some(Self::Bmp),
            ImageFormat::Gif => Some(Self::Gif),
            ImageFormat::Png => Some(Self::Png),
            ImageFormat::Jpeg => Some(Self::Jpeg),
            ImageFormat::Pnm => Some(Self::Pnm),
            _ => None,
        }
    }

    /// Whether the container can hold more than one frame.
    pub fn supports_frames(self) -> bool {
        matches!(self, Self::Gif | Self::Apng)
    }
}

/// Display name for a numeric type tag; `None` for tags outside the table.
pub fn file_format_name(tag: u32) -> Option<&'static str> {
    ImageType::from_u32(tag).map(ImageType::name)
}
