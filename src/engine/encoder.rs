// src/engine/encoder.rs
//
// Encoder operations: rasters to BMP, GIF (animated), PNG, JPEG and PNM through the
// image crate. The container is chosen by the raster's type tag.

use crate::engine::common::run_with_panic_policy;
use crate::engine::raster::Raster;
use crate::error::{PlumError, Result};
use crate::ops::ImageType;
use image::codecs::gif::{GifEncoder, Repeat};
use image::{DynamicImage, Frame, ImageBuffer, ImageFormat, Rgba, RgbaImage};
use std::io::Cursor;
use tracing::debug;

type EncoderResult<T> = std::result::Result<T, PlumError>;

fn rgba8_frame(raster: &Raster, frame: u32) -> EncoderResult<RgbaImage> {
    RgbaImage::from_raw(raster.width(), raster.height(), raster.frame_rgba8(frame))
        .ok_or_else(|| PlumError::encode_failed("rgba8", "frame buffer size mismatch"))
}

fn rgba16_frame(raster: &Raster, frame: u32) -> EncoderResult<ImageBuffer<Rgba<u16>, Vec<u16>>> {
    ImageBuffer::from_raw(raster.width(), raster.height(), raster.frame_rgba16(frame))
        .ok_or_else(|| PlumError::encode_failed("rgba16", "frame buffer size mismatch"))
}

fn write_still(img: &DynamicImage, format: ImageFormat, name: &'static str) -> EncoderResult<Vec<u8>> {
    let mut buf = Vec::new();
    img.write_to(&mut Cursor::new(&mut buf), format)
        .map_err(|e| PlumError::encode_failed(name, format!("{name} encode failed: {e}")))?;
    Ok(buf)
}

/// Encode to PNG, keeping 16 bits per channel for 64-bit rasters
pub fn encode_png(raster: &Raster) -> EncoderResult<Vec<u8>> {
    run_with_panic_policy("encode:png", || {
        let img = if raster.color_format().bytes_per_pixel() == 8 {
            DynamicImage::ImageRgba16(rgba16_frame(raster, 0)?)
        } else {
            DynamicImage::ImageRgba8(rgba8_frame(raster, 0)?)
        };
        write_still(&img, ImageFormat::Png, "PNG")
    })
}

pub fn encode_bmp(raster: &Raster) -> EncoderResult<Vec<u8>> {
    run_with_panic_policy("encode:bmp", || {
        let img = DynamicImage::ImageRgba8(rgba8_frame(raster, 0)?);
        write_still(&img, ImageFormat::Bmp, "BMP")
    })
}

/// JPEG and PNM carry no alpha; the channel is dropped.
pub fn encode_jpeg(raster: &Raster) -> EncoderResult<Vec<u8>> {
    run_with_panic_policy("encode:jpeg", || {
        let rgb = DynamicImage::ImageRgba8(rgba8_frame(raster, 0)?).to_rgb8();
        write_still(&DynamicImage::ImageRgb8(rgb), ImageFormat::Jpeg, "JPEG")
    })
}

pub fn encode_pnm(raster: &Raster) -> EncoderResult<Vec<u8>> {
    run_with_panic_policy("encode:pnm", || {
        let rgb = DynamicImage::ImageRgba8(rgba8_frame(raster, 0)?).to_rgb8();
        write_still(&DynamicImage::ImageRgb8(rgb), ImageFormat::Pnm, "PNM")
    })
}

/// Encode every frame into a looping GIF
pub fn encode_gif(raster: &Raster) -> EncoderResult<Vec<u8>> {
    run_with_panic_policy("encode:gif", || {
        let frames = (0..raster.frames())
            .map(|z| rgba8_frame(raster, z).map(Frame::new))
            .collect::<EncoderResult<Vec<_>>>()?;
        let mut buf = Vec::new();
        {
            let mut encoder = GifEncoder::new(&mut buf);
            encoder
                .set_repeat(Repeat::Infinite)
                .and_then(|_| encoder.encode_frames(frames))
                .map_err(|e| PlumError::encode_failed("GIF", format!("GIF encode failed: {e}")))?;
        }
        Ok(buf)
    })
}

/// Encode a raster into the container named by its type tag.
pub fn encode(raster: &Raster) -> Result<Vec<u8>> {
    let image_type = raster.image_type();
    if image_type == ImageType::None {
        return Err(PlumError::invalid_argument(
            "image type",
            image_type.name(),
            "set a file format before storing",
        ));
    }
    if raster.frames() > 1 && !image_type.supports_frames() {
        return Err(PlumError::no_multi_frame(image_type.name(), raster.frames()));
    }
    raster.validate()?;

    let data = match image_type {
        ImageType::Png => encode_png(raster)?,
        ImageType::Apng if raster.frames() == 1 => encode_png(raster)?,
        ImageType::Apng => {
            return Err(PlumError::encode_failed(
                "APNG",
                "animated PNG output is not supported by the codec backend",
            ))
        }
        ImageType::Gif => encode_gif(raster)?,
        ImageType::Bmp => encode_bmp(raster)?,
        ImageType::Jpeg => encode_jpeg(raster)?,
        ImageType::Pnm => encode_pnm(raster)?,
        ImageType::None => unreachable!("rejected above"),
    };
    debug!(
        target: "plum_raster::encode",
        format = image_type.name(),
        frames = raster.frames(),
        bytes = data.len(),
        "encoded"
    );
    Ok(data)
}
