// lib.rs
//
// plum-raster: an in-memory raster image model
//
// - Four packed color formats (32, 64, 16 and 32X bits per pixel), each optionally
//   alpha-inverted
// - Direct or paletted pixels, multi-frame images
// - Reference-counted image handles sharing one arena-owned raster
// - BMP, GIF, PNG/APNG, JPEG and PNM through the image crate

// Memory allocator optimization - jemalloc for many short-lived buffers
// Note: jemalloc is not supported on Windows/MSVC, so we exclude it on that platform
#[cfg(all(feature = "jemalloc", not(target_env = "msvc")))]
#[global_allocator]
static ALLOC: tikv_jemallocator::Jemalloc = tikv_jemallocator::Jemalloc;

pub mod engine;
pub mod error;
pub mod ops;

pub use engine::{
    BaseFormat, Channel, ColorFormat, DecodeLimits, ImageArena, ImageHandle, ImageId,
    PaletteView, RegionValues, Source,
};
pub use error::{error_text, ErrorCategory, ErrorCode, PlumError, Result};
pub use ops::{file_format_name, ImageType, LoadFlags, PaletteMode, SortOrder};

const fn parse_decimal(digits: &str) -> u32 {
    let bytes = digits.as_bytes();
    let mut value = 0;
    let mut i = 0;
    while i < bytes.len() {
        value = value * 10 + (bytes[i] - b'0') as u32;
        i += 1;
    }
    value
}

/// Library version as `major * 10000 + minor * 100 + patch`.
pub const VERSION: u32 = parse_decimal(env!("CARGO_PKG_VERSION_MAJOR")) * 10000
    + parse_decimal(env!("CARGO_PKG_VERSION_MINOR")) * 100
    + parse_decimal(env!("CARGO_PKG_VERSION_PATCH"));

pub fn version() -> u32 {
    VERSION
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn version_matches_package() {
        let expected: Vec<u32> = env!("CARGO_PKG_VERSION")
            .split('.')
            .map(|part| part.parse().unwrap())
            .collect();
        assert_eq!(version(), expected[0] * 10000 + expected[1] * 100 + expected[2]);
    }
}
