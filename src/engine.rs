// src/engine.rs
//
// The core of plum-raster. Images live in an arena and are reached through
// reference-counted handles; pixels are stored in one of four packed color formats,
// either directly or as indexes into a palette of up to 256 colors.
//
// This file is a facade over the modules in engine/.

// =============================================================================
// MODULE DECOMPOSITION
// =============================================================================

pub mod color;
mod common;
pub mod decoder;
pub mod encoder;
mod handle;
mod io;
mod limits;
pub mod palette;
pub mod pixel;
pub mod raster;

pub use color::{convert, convert_colors, rescale, BaseFormat, Channel, ChannelLayout, ColorFormat};
pub use common::run_with_panic_policy;
pub use handle::{ImageArena, ImageHandle, ImageId, PaletteView, RegionValues};
pub use io::{write_file, Source};
pub use limits::{DecodeLimits, LimitPolicy};
pub use palette::MAX_ENTRIES as MAX_PALETTE_ENTRIES;
pub use raster::{check_valid_image_size, color_buffer_size, Raster};

/// Check a raster's buffers and palette indexes.
pub fn validate_image(raster: &Raster) -> crate::error::Result<()> {
    raster.validate()
}
