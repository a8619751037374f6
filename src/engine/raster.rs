// src/engine/raster.rs
//
// The raster struct shared by every handle: geometry, color format, container tag,
// pixel buffer and optional palette buffer.
//
// Paletted rasters store one index byte per pixel; direct rasters store one encoded
// color per pixel at the format's storage width. Frames are stacked after each other.

use crate::engine::color::{self, Channel, ColorFormat};
use crate::engine::palette;
use crate::engine::pixel::{self, alloc_zeroed};
use crate::error::{PlumError, Result};
use crate::ops::ImageType;

/// Largest element any format stores per pixel.
const MAX_BYTES_PER_PIXEL: usize = 8;

/// Total pixel count, or `None` when a dimension is zero or the buffer could not be
/// addressed at the widest storage format.
fn checked_pixel_count(width: u32, height: u32, frames: u32) -> Option<usize> {
    if width == 0 || height == 0 || frames == 0 {
        return None;
    }
    let count = (width as usize)
        .checked_mul(height as usize)?
        .checked_mul(frames as usize)?;
    let bytes = count.checked_mul(MAX_BYTES_PER_PIXEL)?;
    (bytes <= isize::MAX as usize).then_some(count)
}

/// Whether a raster of this size can be represented at all.
pub fn check_valid_image_size(width: u32, height: u32, frames: u32) -> bool {
    checked_pixel_count(width, height, frames).is_some()
}

/// Bytes needed to store `count` colors in `format`.
pub fn color_buffer_size(count: usize, format: ColorFormat) -> Option<usize> {
    count.checked_mul(format.bytes_per_pixel())
}

#[derive(Debug, PartialEq, Eq)]
pub struct Raster {
    pub(crate) width: u32,
    pub(crate) height: u32,
    pub(crate) frames: u32,
    pub(crate) format: ColorFormat,
    pub(crate) image_type: ImageType,
    pub(crate) pixels: Vec<u8>,
    pub(crate) palette: Option<Vec<u8>>,
    /// Number of defined palette entries (exclusive upper bound for indexes).
    pub(crate) palette_len: usize,
}

impl Raster {
    /// Allocate a zero-filled raster.
    ///
    /// Paletted rasters start with room for one palette entry and no defined entries.
    pub fn new(
        width: u32,
        height: u32,
        frames: u32,
        format: ColorFormat,
        paletted: bool,
    ) -> Result<Self> {
        if width == 0 || height == 0 || frames == 0 {
            return Err(PlumError::invalid_argument(
                "dimensions",
                format!("{width}x{height}x{frames}"),
                "width, height and frames must be positive",
            ));
        }
        let count = checked_pixel_count(width, height, frames)
            .ok_or_else(|| PlumError::image_too_large(width, height, frames))?;

        let (pixels, palette) = if paletted {
            let indexes = alloc_zeroed(count)?;
            let palette = alloc_zeroed(format.bytes_per_pixel())?;
            (indexes, Some(palette))
        } else {
            let len = color_buffer_size(count, format)
                .ok_or_else(|| PlumError::image_too_large(width, height, frames))?;
            (alloc_zeroed(len)?, None)
        };

        Ok(Self {
            width,
            height,
            frames,
            format,
            image_type: ImageType::None,
            pixels,
            palette,
            palette_len: 0,
        })
    }

    /// Build a direct-color raster from already encoded pixels.
    pub(crate) fn from_direct(
        width: u32,
        height: u32,
        frames: u32,
        format: ColorFormat,
        image_type: ImageType,
        pixels: Vec<u8>,
    ) -> Result<Self> {
        let raster = Self {
            width,
            height,
            frames,
            format,
            image_type,
            pixels,
            palette: None,
            palette_len: 0,
        };
        raster.validate()?;
        Ok(raster)
    }

    /// Deep copy with fallible allocation.
    pub fn try_clone(&self) -> Result<Self> {
        let mut pixels = alloc_zeroed(self.pixels.len())?;
        pixels.copy_from_slice(&self.pixels);
        let palette = match &self.palette {
            Some(entries) => {
                let mut copy = alloc_zeroed(entries.len())?;
                copy.copy_from_slice(entries);
                Some(copy)
            }
            None => None,
        };
        Ok(Self {
            pixels,
            palette,
            ..*self
        })
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn frames(&self) -> u32 {
        self.frames
    }

    pub fn color_format(&self) -> ColorFormat {
        self.format
    }

    pub fn image_type(&self) -> ImageType {
        self.image_type
    }

    pub fn set_image_type(&mut self, image_type: ImageType) {
        self.image_type = image_type;
    }

    pub fn is_paletted(&self) -> bool {
        self.palette.is_some()
    }

    pub fn pixel_count(&self) -> usize {
        self.width as usize * self.height as usize * self.frames as usize
    }

    pub fn palette_len(&self) -> usize {
        if self.palette.is_some() {
            self.palette_len
        } else {
            0
        }
    }

    /// Linear offset of an in-bounds coordinate.
    fn offset(&self, x: usize, y: usize, z: usize) -> usize {
        (z * self.height as usize + y) * self.width as usize + x
    }

    fn checked_offset(&self, x: i64, y: i64, z: i64) -> Option<usize> {
        let in_range = |v: i64, limit: u32| v >= 0 && v < limit as i64;
        if in_range(x, self.width) && in_range(y, self.height) && in_range(z, self.frames) {
            Some(self.offset(x as usize, y as usize, z as usize))
        } else {
            None
        }
    }

    fn read_at(&self, offset: usize) -> u64 {
        if self.palette.is_some() {
            self.pixels[offset] as u64
        } else {
            pixel::read(&self.pixels, self.format, offset)
        }
    }

    fn write_at(&mut self, offset: usize, value: u64) {
        if self.palette.is_some() {
            self.pixels[offset] = value as u8;
        } else {
            pixel::write(&mut self.pixels, self.format, offset, value);
        }
    }

    /// Palette index (paletted) or encoded color (direct) at a coordinate.
    pub fn pixel_at(&self, x: i64, y: i64, z: i64) -> Option<u64> {
        self.checked_offset(x, y, z).map(|offset| self.read_at(offset))
    }

    /// Store a value at a coordinate; returns false when the coordinate is outside.
    ///
    /// Paletted rasters keep the low byte of `value`.
    pub fn set_pixel_at(&mut self, x: i64, y: i64, z: i64, value: u64) -> bool {
        match self.checked_offset(x, y, z) {
            Some(offset) => {
                self.write_at(offset, value);
                true
            }
            None => false,
        }
    }

    /// Color of a pixel regardless of representation.
    pub fn color_at(&self, x: i64, y: i64, z: i64) -> Option<u64> {
        let value = self.pixel_at(x, y, z)?;
        match &self.palette {
            Some(entries) => Some(palette::entry_or_zero(entries, self.format, value as usize)),
            None => Some(value),
        }
    }

    /// Check buffer sizes and palette indexes.
    pub fn validate(&self) -> Result<()> {
        let count = checked_pixel_count(self.width, self.height, self.frames)
            .ok_or_else(|| PlumError::image_too_large(self.width, self.height, self.frames))?;
        match &self.palette {
            Some(entries) => {
                if self.pixels.len() != count {
                    return Err(PlumError::invalid_argument(
                        "pixels",
                        self.pixels.len().to_string(),
                        format!("expected {count} index bytes"),
                    ));
                }
                if self.palette_len > palette::MAX_ENTRIES
                    || entries.len() < self.palette_len * self.format.bytes_per_pixel()
                {
                    return Err(PlumError::invalid_color_index(
                        self.palette_len,
                        entries.len() / self.format.bytes_per_pixel(),
                    ));
                }
                palette::check_indexes(&self.pixels, self.palette_len)
            }
            None => {
                let expected = color_buffer_size(count, self.format).ok_or_else(|| {
                    PlumError::image_too_large(self.width, self.height, self.frames)
                })?;
                if self.pixels.len() != expected {
                    return Err(PlumError::invalid_argument(
                        "pixels",
                        self.pixels.len().to_string(),
                        format!("expected {expected} bytes"),
                    ));
                }
                Ok(())
            }
        }
    }

    /// Re-encode the palette (paletted) or every pixel (direct) into `to`.
    ///
    /// The raster is untouched if the temporary allocation fails.
    pub fn convert_colors(&mut self, to: ColorFormat) -> Result<()> {
        if to == self.format {
            return Ok(());
        }
        let from = self.format;
        let pixel_count = self.pixel_count();
        match &mut self.palette {
            Some(entries) => {
                let count = entries.len() / from.bytes_per_pixel();
                *entries = color::convert_colors(entries, count, from, to)?;
            }
            None => {
                self.pixels = color::convert_colors(&self.pixels, pixel_count, from, to)?;
            }
        }
        self.format = to;
        Ok(())
    }

    /// Turn a direct raster into a paletted one whose palette is stored in `format`.
    ///
    /// Returns the highest palette index in use, or 0 if the raster already had a
    /// palette. With `quantize`, images with more than 256 colors are reduced
    /// instead of rejected.
    pub fn to_indexed(&mut self, format: ColorFormat, quantize: bool) -> Result<usize> {
        if self.palette.is_some() {
            return Ok(0);
        }
        let count = self.pixel_count();
        let converted;
        let colors = if format == self.format {
            &self.pixels
        } else {
            converted = color::convert_colors(&self.pixels, count, self.format, format)?;
            &converted
        };
        let indexed = match palette::colors_to_indexes(colors, count, format) {
            Ok(indexed) => indexed,
            Err(PlumError::TooManyColors { .. }) if quantize => {
                palette::quantize(colors, count, format)?
            }
            Err(err) => return Err(err),
        };
        let highest = indexed.entries - 1;
        self.pixels = indexed.indexes;
        self.palette = Some(indexed.palette);
        self.palette_len = indexed.entries;
        self.format = format;
        Ok(highest)
    }

    /// Expand a paletted raster into direct colors stored in `format`.
    ///
    /// Returns false if the raster had no palette.
    pub fn to_rgba(&mut self, format: ColorFormat) -> Result<bool> {
        let Some(entries) = &self.palette else {
            return Ok(false);
        };
        let colors = palette::indexes_to_colors(&self.pixels, entries, self.format)?;
        let colors = if format == self.format {
            colors
        } else {
            color::convert_colors(&colors, self.pixel_count(), self.format, format)?
        };
        self.pixels = colors;
        self.palette = None;
        self.palette_len = 0;
        self.format = format;
        Ok(true)
    }

    /// Rotate every frame clockwise by `quarter_turns`, then mirror left-right if `flip`.
    pub fn rotate(&mut self, quarter_turns: i32, flip: bool) -> Result<()> {
        let turns = quarter_turns.rem_euclid(4);
        if turns == 0 && !flip {
            return Ok(());
        }
        let element = if self.palette.is_some() {
            1
        } else {
            self.format.bytes_per_pixel()
        };
        let (w, h) = (self.width as usize, self.height as usize);
        let (new_w, new_h) = if turns % 2 == 1 { (h, w) } else { (w, h) };
        let frame_len = w * h * element;
        let mut out = alloc_zeroed(self.pixels.len())?;

        for (src_frame, dst_frame) in self
            .pixels
            .chunks_exact(frame_len)
            .zip(out.chunks_exact_mut(frame_len))
        {
            for y in 0..h {
                for x in 0..w {
                    let (mut dx, dy) = match turns {
                        0 => (x, y),
                        1 => (h - 1 - y, x),
                        2 => (w - 1 - x, h - 1 - y),
                        _ => (y, w - 1 - x),
                    };
                    if flip {
                        dx = new_w - 1 - dx;
                    }
                    let src = (y * w + x) * element;
                    let dst = (dy * new_w + dx) * element;
                    dst_frame[dst..dst + element].copy_from_slice(&src_frame[src..src + element]);
                }
            }
        }

        self.pixels = out;
        self.width = new_w as u32;
        self.height = new_h as u32;
        Ok(())
    }

    /// Make every color fully opaque.
    pub fn remove_alpha(&mut self) {
        let format = self.format;
        let opaque = format.opaque_alpha();
        let (buffer, count) = match &mut self.palette {
            Some(entries) => {
                let count = entries.len() / format.bytes_per_pixel();
                (entries, count)
            }
            None => {
                let count = self.pixel_count();
                (&mut self.pixels, count)
            }
        };
        for offset in 0..count {
            let value = pixel::read(buffer, format, offset);
            pixel::write(buffer, format, offset, format.insert(value, opaque, Channel::Alpha));
        }
    }

    /// One frame as 8-bit RGBA with standard alpha (0 = transparent).
    pub fn frame_rgba8(&self, frame: u32) -> Vec<u8> {
        let target = ColorFormat::C32.with_alpha_inverted(true);
        self.frame_colors(frame, target)
            .flat_map(|value| target.unpack(value).map(|c| c as u8))
            .collect()
    }

    /// One frame as 16-bit RGBA with standard alpha (0 = transparent).
    pub fn frame_rgba16(&self, frame: u32) -> Vec<u16> {
        let target = ColorFormat::C64.with_alpha_inverted(true);
        self.frame_colors(frame, target)
            .flat_map(|value| target.unpack(value).map(|c| c as u16))
            .collect()
    }

    fn frame_colors(&self, frame: u32, target: ColorFormat) -> impl Iterator<Item = u64> + '_ {
        let (w, h) = (self.width as i64, self.height as i64);
        let z = frame as i64;
        (0..h).flat_map(move |y| {
            (0..w).map(move |x| {
                let value = self.color_at(x, y, z).unwrap_or_default();
                color::convert(value, self.format, target)
            })
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn numbered(width: u32, height: u32) -> Raster {
        let mut raster = Raster::new(width, height, 1, ColorFormat::C32, false).unwrap();
        for y in 0..height as i64 {
            for x in 0..width as i64 {
                raster.set_pixel_at(x, y, 0, (y * width as i64 + x) as u64);
            }
        }
        raster
    }

    fn rows(raster: &Raster) -> Vec<Vec<u64>> {
        (0..raster.height as i64)
            .map(|y| {
                (0..raster.width as i64)
                    .map(|x| raster.pixel_at(x, y, 0).unwrap())
                    .collect()
            })
            .collect()
    }

    #[test]
    fn oversized_dimensions_are_rejected_before_allocation() {
        assert!(!check_valid_image_size(1 << 31, 1 << 31, 2));
        let err = Raster::new(1 << 31, 1 << 31, 2, ColorFormat::C32, false).unwrap_err();
        assert!(matches!(err, PlumError::ImageTooLarge { .. }));
    }

    #[test]
    fn zero_dimensions_are_invalid_arguments() {
        assert!(!check_valid_image_size(0, 10, 1));
        let err = Raster::new(10, 0, 1, ColorFormat::C32, false).unwrap_err();
        assert!(matches!(err, PlumError::InvalidArgument { .. }));
    }

    #[test]
    fn buffer_sizes_follow_representation() {
        let direct = Raster::new(3, 2, 2, ColorFormat::C16, false).unwrap();
        assert_eq!(direct.pixels.len(), 3 * 2 * 2 * 2);
        assert!(direct.palette.is_none());

        let paletted = Raster::new(3, 2, 2, ColorFormat::C64, true).unwrap();
        assert_eq!(paletted.pixels.len(), 12);
        assert_eq!(paletted.palette.as_ref().map(Vec::len), Some(8));
        assert_eq!(paletted.palette_len(), 0);
        assert_eq!(color_buffer_size(12, ColorFormat::C32X), Some(48));
    }

    #[test]
    fn coordinates_outside_are_absent() {
        let raster = numbered(4, 4);
        assert_eq!(raster.pixel_at(-1, 0, 0), None);
        assert_eq!(raster.pixel_at(4, 0, 0), None);
        assert_eq!(raster.pixel_at(0, 0, 1), None);
        assert_eq!(raster.pixel_at(3, 3, 0), Some(15));
    }

    #[test]
    fn rotate_quarter_turn_clockwise() {
        let mut raster = numbered(3, 2);
        raster.rotate(1, false).unwrap();
        assert_eq!((raster.width, raster.height), (2, 3));
        assert_eq!(rows(&raster), vec![vec![3, 0], vec![4, 1], vec![5, 2]]);
    }

    #[test]
    fn rotate_negative_and_flip() {
        let mut raster = numbered(3, 2);
        raster.rotate(-1, false).unwrap();
        assert_eq!(rows(&raster), vec![vec![2, 5], vec![1, 4], vec![0, 3]]);

        let mut raster = numbered(3, 2);
        raster.rotate(0, true).unwrap();
        assert_eq!(rows(&raster), vec![vec![2, 1, 0], vec![5, 4, 3]]);

        let mut raster = numbered(3, 2);
        raster.rotate(2, false).unwrap();
        assert_eq!(rows(&raster), vec![vec![5, 4, 3], vec![2, 1, 0]]);
    }

    #[test]
    fn rotate_keeps_palette() {
        let mut raster = Raster::new(2, 1, 1, ColorFormat::C32, true).unwrap();
        raster.set_pixel_at(1, 0, 0, 7);
        raster.rotate(1, false).unwrap();
        assert!(raster.is_paletted());
        assert_eq!(raster.pixels, vec![0, 7]);
        assert_eq!((raster.width, raster.height), (1, 2));
    }

    #[test]
    fn remove_alpha_sets_opaque() {
        let mut raster = Raster::new(2, 1, 1, ColorFormat::C32, false).unwrap();
        raster.set_pixel_at(0, 0, 0, 0xFF00_00FF);
        raster.remove_alpha();
        assert_eq!(raster.pixel_at(0, 0, 0), Some(0x0000_00FF));

        let inverted = ColorFormat::C16.with_alpha_inverted(true);
        let mut raster = Raster::new(1, 1, 1, inverted, false).unwrap();
        raster.remove_alpha();
        assert_eq!(raster.pixel_at(0, 0, 0), Some(0x8000));
    }

    #[test]
    fn validate_flags_dangling_indexes() {
        let mut raster = Raster::new(2, 2, 1, ColorFormat::C32, true).unwrap();
        assert!(matches!(
            raster.validate(),
            Err(PlumError::InvalidColorIndex { .. })
        ));
        palette::set(&mut raster, 0, 0x1234).unwrap();
        raster.validate().unwrap();
        raster.set_pixel_at(1, 1, 0, 3);
        assert!(raster.validate().is_err());
    }

    #[test]
    fn convert_colors_rewrites_pixels_and_format() {
        let mut raster = Raster::new(1, 1, 1, ColorFormat::C16, false).unwrap();
        raster.set_pixel_at(0, 0, 0, 0xFC1F);
        raster.convert_colors(ColorFormat::C32).unwrap();
        assert_eq!(raster.color_format(), ColorFormat::C32);
        assert_eq!(raster.pixels.len(), 4);
        assert_eq!(raster.pixel_at(0, 0, 0), Some(0xFFFF_00FF));
    }

    #[test]
    fn frames_as_rgba8_use_standard_alpha() {
        let mut raster = Raster::new(1, 1, 2, ColorFormat::C32, false).unwrap();
        raster.set_pixel_at(0, 0, 1, ColorFormat::C32.pack([1, 2, 3, 0xFF]));
        assert_eq!(raster.frame_rgba8(0), vec![0, 0, 0, 255]);
        assert_eq!(raster.frame_rgba8(1), vec![1, 2, 3, 0]);
        assert_eq!(raster.frame_rgba16(1), vec![0x0101, 0x0202, 0x0303, 0]);
    }
}
