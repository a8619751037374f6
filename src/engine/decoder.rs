// src/engine/decoder.rs
//
// Decoder operations: container detection, frame extraction through the image crate,
// and the load-time palette/alpha post-processing selected by LoadFlags.

use crate::engine::color::{self, ColorFormat};
use crate::engine::common::run_with_panic_policy;
use crate::engine::limits::DecodeLimits;
use crate::engine::palette;
use crate::engine::pixel::{self, alloc_zeroed};
use crate::engine::raster::{check_valid_image_size, color_buffer_size, Raster};
use crate::error::{PlumError, Result};
use crate::ops::{ImageType, LoadFlags, PaletteMode};
use image::codecs::gif::GifDecoder;
use image::codecs::png::PngDecoder;
use image::{AnimationDecoder, DynamicImage, ImageFormat, ImageReader, RgbaImage};
use std::io::Cursor;
use tracing::debug;

type DecoderResult<T> = std::result::Result<T, PlumError>;

/// Decoded frames before conversion into the requested color format.
enum Frames {
    Rgba8(Vec<RgbaImage>),
    Rgba16(DynamicImage),
}

/// Detect the container from magic bytes.
pub fn detect_format(bytes: &[u8]) -> Option<ImageType> {
    let format = image::guess_format(bytes).ok()?;
    ImageType::from_image_format(format)
}

/// Read the header and check the canvas size before any pixel is decoded.
pub fn ensure_dimensions_safe(bytes: &[u8], limits: &DecodeLimits) -> DecoderResult<()> {
    let cursor = Cursor::new(bytes);
    if let Ok(reader) = ImageReader::new(cursor).with_guessed_format() {
        if let Ok((width, height)) = reader.into_dimensions() {
            if !check_valid_image_size(width, height, 1) {
                return Err(PlumError::image_too_large(width, height, 1));
            }
            return limits.enforce_pixels(width, height, 1);
        }
    }
    Ok(())
}

fn codec_error(err: image::ImageError) -> PlumError {
    PlumError::invalid_file_format(err.to_string())
}

fn decode_gif(bytes: &[u8]) -> DecoderResult<Frames> {
    let decoder = GifDecoder::new(Cursor::new(bytes)).map_err(codec_error)?;
    let frames = decoder.into_frames().collect_frames().map_err(codec_error)?;
    Ok(Frames::Rgba8(frames.into_iter().map(|f| f.into_buffer()).collect()))
}

/// PNG input; returns whether the stream carried an animation control chunk.
fn decode_png(bytes: &[u8]) -> DecoderResult<(Frames, bool)> {
    let decoder = PngDecoder::new(Cursor::new(bytes)).map_err(codec_error)?;
    if decoder.is_apng().map_err(codec_error)? {
        let frames = decoder
            .apng()
            .map_err(codec_error)?
            .into_frames()
            .collect_frames()
            .map_err(codec_error)?;
        let buffers = frames.into_iter().map(|f| f.into_buffer()).collect();
        return Ok((Frames::Rgba8(buffers), true));
    }
    let img = DynamicImage::from_decoder(decoder).map_err(codec_error)?;
    Ok((still(img), false))
}

fn still(img: DynamicImage) -> Frames {
    let color = img.color();
    let bits_per_channel = color.bits_per_pixel() / color.channel_count() as u16;
    if bits_per_channel > 8 {
        Frames::Rgba16(img)
    } else {
        Frames::Rgba8(vec![img.to_rgba8()])
    }
}

fn decode_frames(bytes: &[u8], image_type: ImageType) -> DecoderResult<(Frames, ImageType)> {
    run_with_panic_policy("decode:image", || match image_type {
        ImageType::Gif => Ok((decode_gif(bytes)?, ImageType::Gif)),
        ImageType::Png | ImageType::Apng => {
            let (frames, animated) = decode_png(bytes)?;
            let image_type = if animated { ImageType::Apng } else { ImageType::Png };
            Ok((frames, image_type))
        }
        other => {
            let format = match other {
                ImageType::Bmp => ImageFormat::Bmp,
                ImageType::Jpeg => ImageFormat::Jpeg,
                _ => ImageFormat::Pnm,
            };
            let img = image::load_from_memory_with_format(bytes, format).map_err(codec_error)?;
            Ok((still(img), other))
        }
    })
}

/// Pack decoded frames into a direct-color raster in `target`.
fn frames_to_raster(frames: Frames, image_type: ImageType, target: ColorFormat) -> DecoderResult<Raster> {
    match frames {
        Frames::Rgba8(buffers) => {
            let first = buffers.first().ok_or_else(PlumError::no_data)?;
            let (width, height) = first.dimensions();
            if buffers.iter().any(|b| b.dimensions() != (width, height)) {
                return Err(PlumError::invalid_file_format("frames differ in size"));
            }
            let frames = u32::try_from(buffers.len())
                .map_err(|_| PlumError::image_too_large(width, height, u32::MAX))?;
            let source = ColorFormat::C32.with_alpha_inverted(true);
            let channels = buffers.iter().flat_map(|b| b.as_raw().chunks_exact(4));
            let pixels = pack_pixels(channels, width, height, frames, source, target, |c| c as u64)?;
            Raster::from_direct(width, height, frames, target, image_type, pixels)
        }
        Frames::Rgba16(img) => {
            let buffer = img.to_rgba16();
            let (width, height) = buffer.dimensions();
            let source = ColorFormat::C64.with_alpha_inverted(true);
            let channels = buffer.as_raw().chunks_exact(4);
            let pixels = pack_pixels(channels, width, height, 1, source, target, |c| c as u64)?;
            Raster::from_direct(width, height, 1, target, image_type, pixels)
        }
    }
}

fn pack_pixels<'a, T: Copy + 'a>(
    channels: impl Iterator<Item = &'a [T]>,
    width: u32,
    height: u32,
    frames: u32,
    source: ColorFormat,
    target: ColorFormat,
    widen: impl Fn(T) -> u64,
) -> DecoderResult<Vec<u8>> {
    if !check_valid_image_size(width, height, frames) {
        return Err(PlumError::image_too_large(width, height, frames));
    }
    let count = width as usize * height as usize * frames as usize;
    let len = color_buffer_size(count, target)
        .ok_or_else(|| PlumError::image_too_large(width, height, frames))?;
    let mut out = alloc_zeroed(len)?;
    for (offset, px) in channels.enumerate() {
        let value = source.pack([widen(px[0]), widen(px[1]), widen(px[2]), widen(px[3])]);
        pixel::write(&mut out, target, offset, color::convert(value, source, target));
    }
    Ok(out)
}

/// Apply the palette mode, palette reduction and alpha removal requested by `flags`.
fn post_process(raster: &mut Raster, flags: LoadFlags) -> DecoderResult<()> {
    let format = raster.color_format();
    let order = flags.sort_order();
    match flags.palette_mode() {
        PaletteMode::None => {}
        // The codec hands back composited RGBA frames, so the GIF palette is rebuilt
        // in first-appearance order rather than the order stored in the file.
        PaletteMode::Load => {
            if raster.image_type() == ImageType::Gif {
                match raster.to_indexed(format, false) {
                    Ok(_) => {
                        if flags.contains(LoadFlags::SORT_EXISTING) {
                            palette::sort(raster, order)?;
                        }
                    }
                    Err(PlumError::TooManyColors { .. }) => {}
                    Err(err) => return Err(err),
                }
            }
        }
        PaletteMode::Generate => match raster.to_indexed(format, false) {
            Ok(_) => palette::sort(raster, order)?,
            Err(PlumError::TooManyColors { .. }) => {}
            Err(err) => return Err(err),
        },
        PaletteMode::Force => {
            raster.to_indexed(format, false)?;
            palette::sort(raster, order)?;
        }
    }
    if flags.contains(LoadFlags::PALETTE_REDUCE) && raster.is_paletted() {
        palette::reduce(raster)?;
    }
    if flags.contains(LoadFlags::ALPHA_REMOVE) {
        raster.remove_alpha();
    }
    Ok(())
}

/// Decode a whole container into a raster in the format selected by `flags`.
pub fn decode(bytes: &[u8], flags: LoadFlags, limits: &DecodeLimits) -> DecoderResult<Raster> {
    if bytes.is_empty() {
        return Err(PlumError::no_data());
    }
    limits.enforce_source_len(bytes.len())?;
    let image_type = detect_format(bytes).ok_or_else(|| {
        PlumError::invalid_file_format("unrecognized or unsupported container")
    })?;
    ensure_dimensions_safe(bytes, limits)?;

    let (frames, image_type) = decode_frames(bytes, image_type)?;
    let mut raster = frames_to_raster(frames, image_type, flags.color_format())?;
    limits.enforce_pixels(raster.width(), raster.height(), raster.frames())?;
    post_process(&mut raster, flags)?;

    debug!(
        target: "plum_raster::decode",
        format = image_type.name(),
        width = raster.width(),
        height = raster.height(),
        frames = raster.frames(),
        paletted = raster.is_paletted(),
        "decoded"
    );
    Ok(raster)
}
