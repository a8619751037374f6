#![no_main]

use arbitrary::Arbitrary;
use libfuzzer_sys::fuzz_target;
use plum_raster::{BaseFormat, ColorFormat, ImageArena, RegionValues, SortOrder};

#[derive(Arbitrary, Debug)]
struct OperationSeed {
    kind: u8,
    x: i16,
    y: i16,
    w: i8,
    h: i8,
    value: u64,
}

#[derive(Arbitrary, Debug)]
struct Input {
    width: u8,
    height: u8,
    frames: u8,
    format: u8,
    paletted: bool,
    ops: Vec<OperationSeed>,
}

fn format_from_seed(seed: u8) -> ColorFormat {
    ColorFormat::new(BaseFormat::ALL[(seed & 3) as usize], seed & 4 != 0)
}

fuzz_target!(|input: Input| {
    let arena = ImageArena::new();
    let width = u32::from(input.width % 32) + 1;
    let height = u32::from(input.height % 32) + 1;
    let frames = u32::from(input.frames % 4) + 1;
    let Ok(image) = arena.create(width, height, frames, format_from_seed(input.format), input.paletted) else {
        return;
    };

    for seed in input.ops.into_iter().take(32) {
        let (x, y, w, h) = (
            i64::from(seed.x),
            i64::from(seed.y),
            i64::from(seed.w),
            i64::from(seed.h),
        );
        let z = i64::from(seed.kind >> 4);
        match seed.kind % 10 {
            0 => {
                let _ = image.get(x, y, z, w, h);
            }
            1 => {
                let _ = image.set(x, y, z, w, h, RegionValues::Fill(seed.value));
            }
            2 => {
                let _ = image.rotate(i32::from(seed.w), seed.h < 0);
            }
            3 => {
                let _ = image.to_indexed(format_from_seed(seed.value as u8), seed.w < 0);
            }
            4 => {
                let _ = image.to_rgba(format_from_seed(seed.value as u8));
            }
            5 => {
                let _ = image.convert_colors(format_from_seed(seed.value as u8));
            }
            6 => {
                if let Some(palette) = image.palette() {
                    let _ = palette.set(x, seed.value);
                }
            }
            7 => {
                let _ = image.reduce_palette();
            }
            8 => {
                let order = if seed.w < 0 { SortOrder::DarkFirst } else { SortOrder::LightFirst };
                let _ = image.sort_palette(order);
            }
            _ => image.remove_alpha(),
        }
    }

    let _ = image.validate();
    let _ = image.copy();
});
