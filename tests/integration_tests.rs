// tests/integration_tests.rs
//
// Integration tests for the public API: load, convert, store and reload images
// through real files.

use image::{DynamicImage, ImageFormat, Rgb, RgbImage};
use plum_raster::engine::{DecodeLimits, Source};
use plum_raster::{
    ColorFormat, ErrorCode, ImageArena, ImageHandle, ImageType, LoadFlags, PlumError,
    RegionValues, SortOrder,
};
use std::io::Cursor;

const RED: u64 = 0x0000_00FF;
const GREEN: u64 = 0x0000_FF00;
const BLUE: u64 = 0x00FF_0000;

// Helper to create an encoded PNG with two colors in vertical stripes
fn create_test_png(width: u32, height: u32) -> Vec<u8> {
    let img = RgbImage::from_fn(width, height, |x, _| {
        if x % 2 == 0 {
            Rgb([255, 0, 0])
        } else {
            Rgb([0, 0, 255])
        }
    });
    let mut buf = Vec::new();
    DynamicImage::ImageRgb8(img)
        .write_to(&mut Cursor::new(&mut buf), ImageFormat::Png)
        .unwrap();
    buf
}

fn create_animation(arena: &ImageArena, frames: u32) -> ImageHandle {
    let image = arena.create(4, 4, frames, ColorFormat::C32, false).unwrap();
    let colors = [RED, GREEN, BLUE];
    for z in 0..frames as i64 {
        image
            .set(0, 0, z, 4, 4, RegionValues::Fill(colors[z as usize % colors.len()]))
            .unwrap();
    }
    image.set_image_type(ImageType::Gif);
    image
}

mod load_tests {
    use super::*;

    #[test]
    fn test_load_from_memory_source() {
        let arena = ImageArena::new();
        let source = Source::from(create_test_png(6, 3));
        let image = arena.load(&source, LoadFlags::empty()).unwrap();
        assert_eq!((image.width(), image.height(), image.frames()), (6, 3, 1));
        assert_eq!(image.image_type(), ImageType::Png);
        assert_eq!(image.get(0, 0, 0, 2, 1), vec![vec![Some(RED), Some(BLUE)]]);
    }

    #[test]
    fn test_load_file_maps_and_decodes() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("stripes.png");
        std::fs::write(&path, create_test_png(4, 4)).unwrap();

        let arena = ImageArena::new();
        let image = arena
            .load_file(&path, LoadFlags::COLOR_64 | LoadFlags::ALPHA_INVERT)
            .unwrap();
        assert_eq!(image.color_format(), ColorFormat::C64.with_alpha_inverted(true));
        assert_eq!(image.pixel(0, 0, 0), Some(0xFFFF_0000_0000_FFFF));
    }

    #[test]
    fn test_load_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let arena = ImageArena::new();
        let err = arena
            .load_file(dir.path().join("absent.png"), LoadFlags::empty())
            .unwrap_err();
        assert!(matches!(err, PlumError::FileNotFound { .. }));
        assert_eq!(err.code(), ErrorCode::FileInaccessible);
    }

    #[test]
    fn test_load_with_force_palette() {
        let arena = ImageArena::new();
        let flags = LoadFlags::PALETTE_FORCE | LoadFlags::SORT_DARK_FIRST;
        let image = arena.load_bytes(&create_test_png(4, 2), flags).unwrap();
        assert!(image.is_paletted());
        let palette = image.palette().unwrap();
        assert_eq!(palette.len(), 2);
        // blue is darker than red
        assert_eq!(palette.get(0), Some(BLUE));
        assert_eq!(palette.get(1), Some(RED));
    }

    #[test]
    fn test_force_palette_with_too_many_colors() {
        let img = RgbImage::from_fn(20, 20, |x, y| Rgb([x as u8, y as u8, 0]));
        let mut png = Vec::new();
        DynamicImage::ImageRgb8(img)
            .write_to(&mut Cursor::new(&mut png), ImageFormat::Png)
            .unwrap();
        let arena = ImageArena::new();

        let err = arena.load_bytes(&png, LoadFlags::PALETTE_FORCE).unwrap_err();
        assert!(matches!(err, PlumError::TooManyColors { colors: 400 }));

        let image = arena.load_bytes(&png, LoadFlags::PALETTE_GENERATE).unwrap();
        assert!(!image.is_paletted());
    }

    #[test]
    fn test_decode_limits() {
        let arena = ImageArena::new();
        let source = Source::from(create_test_png(300, 300));
        let limits = DecodeLimits::custom(None, Some(50_000));
        let err = arena
            .load_with_limits(&source, LoadFlags::empty(), &limits)
            .unwrap_err();
        assert!(matches!(err, PlumError::PixelCountExceedsLimit { .. }));
        assert!(arena
            .load_with_limits(&source, LoadFlags::empty(), &DecodeLimits::lenient())
            .is_ok());
    }

    #[test]
    fn test_truncated_input() {
        let arena = ImageArena::new();
        let png = create_test_png(16, 16);
        let err = arena.load_bytes(&png[..png.len() / 2], LoadFlags::empty()).unwrap_err();
        assert_eq!(err.code(), ErrorCode::InvalidFileFormat);
        assert!(matches!(
            arena.load_bytes(&[], LoadFlags::empty()),
            Err(PlumError::NoData)
        ));
    }
}

mod store_tests {
    use super::*;

    #[test]
    fn test_png_file_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out.png");
        let arena = ImageArena::new();
        let image = arena.create(3, 2, 1, ColorFormat::C16, false).unwrap();
        image
            .set(0, 0, 0, 3, 2, RegionValues::Cells(&[0x001F, 0x03E0, 0x7C00, 0, 0x7FFF, 0x0421]))
            .unwrap();
        image.set_image_type(ImageType::Png);
        image.store_file(&path).unwrap();

        let loaded = arena.load_file(&path, LoadFlags::COLOR_16).unwrap();
        assert_eq!(loaded.get(0, 0, 0, 3, 2), image.get(0, 0, 0, 3, 2));
    }

    #[test]
    fn test_gif_animation_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("anim.gif");
        let arena = ImageArena::new();
        let image = create_animation(&arena, 3);
        image.store_file(&path).unwrap();

        let loaded = arena.load_file(&path, LoadFlags::empty()).unwrap();
        assert_eq!(loaded.frames(), 3);
        assert_eq!(loaded.image_type(), ImageType::Gif);
        for z in 0..3 {
            assert_eq!(loaded.pixel(2, 2, z), image.pixel(2, 2, z));
        }
    }

    #[test]
    fn test_gif_palette_load() {
        let arena = ImageArena::new();
        let data = create_animation(&arena, 2).store().unwrap();

        let flags = LoadFlags::PALETTE_LOAD | LoadFlags::SORT_EXISTING | LoadFlags::SORT_DARK_FIRST;
        let image = arena.load_bytes(&data, flags).unwrap();
        assert!(image.is_paletted());
        let palette = image.palette().unwrap();
        assert_eq!(palette.len(), 2);
        // red (luma 299) sorts before green (luma 587)
        assert_eq!(palette.get(0), Some(RED));
        assert_eq!(palette.get(1), Some(GREEN));
        assert_eq!(image.pixel(0, 0, 0), Some(0));
        assert_eq!(image.pixel(0, 0, 1), Some(1));

        let image = arena
            .load_bytes(&data, flags | LoadFlags::PALETTE_REDUCE | LoadFlags::ALPHA_REMOVE)
            .unwrap();
        assert_eq!(image.palette().unwrap().len(), 2);
    }

    #[test]
    fn test_multi_frame_png_is_rejected() {
        let arena = ImageArena::new();
        let image = create_animation(&arena, 2);
        image.set_image_type(ImageType::Png);
        let err = image.store().unwrap_err();
        assert!(matches!(err, PlumError::NoMultiFrame { frames: 2, .. }));
        assert_eq!(err.code(), ErrorCode::NoMultiFrame);
    }

    #[test]
    fn test_still_formats_reload() {
        let arena = ImageArena::new();
        for image_type in [ImageType::Bmp, ImageType::Pnm] {
            let image = arena.create(5, 5, 1, ColorFormat::C32, false).unwrap();
            image.set(0, 0, 0, 5, 5, RegionValues::Fill(GREEN)).unwrap();
            image.set_image_type(image_type);
            let loaded = arena.load_bytes(&image.store().unwrap(), LoadFlags::empty()).unwrap();
            assert_eq!(loaded.image_type(), image_type);
            assert_eq!(loaded.pixel(4, 4, 0), Some(GREEN));
        }

        let image = arena.create(8, 8, 1, ColorFormat::C32, false).unwrap();
        image.set_image_type(ImageType::Jpeg);
        let loaded = arena.load_bytes(&image.store().unwrap(), LoadFlags::empty()).unwrap();
        assert_eq!(loaded.image_type(), ImageType::Jpeg);
        assert_eq!((loaded.width(), loaded.height()), (8, 8));
    }

    #[test]
    fn test_rotate_then_store() {
        let arena = ImageArena::new();
        let image = arena.load_bytes(&create_test_png(4, 2), LoadFlags::empty()).unwrap();
        image.rotate(1, false).unwrap();
        let loaded = arena.load_bytes(&image.store().unwrap(), LoadFlags::empty()).unwrap();
        assert_eq!((loaded.width(), loaded.height()), (2, 4));
        assert_eq!(loaded.get(0, 0, 0, 2, 2), vec![vec![Some(RED), Some(RED)], vec![Some(BLUE), Some(BLUE)]]);
    }

    #[test]
    fn test_sort_then_store_keeps_colors() {
        let arena = ImageArena::new();
        let image = arena
            .load_bytes(&create_test_png(4, 4), LoadFlags::PALETTE_GENERATE)
            .unwrap();
        let before = image.get(0, 0, 0, 4, 4);
        image.sort_palette(SortOrder::DarkFirst).unwrap();
        image.reduce_palette().unwrap();
        let loaded = arena.load_bytes(&image.store().unwrap(), LoadFlags::PALETTE_GENERATE).unwrap();
        assert_eq!(loaded.get(0, 0, 0, 4, 4), before);
    }
}
