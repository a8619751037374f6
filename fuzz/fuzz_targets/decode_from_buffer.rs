#![no_main]

use libfuzzer_sys::fuzz_target;
use plum_raster::{DecodeLimits, ImageArena, ImageType, LoadFlags, Source};

fuzz_target!(|data: &[u8]| {
    if data.len() < 3 {
        return;
    }

    // The first two bytes pick the load flags, the rest is the container.
    let flags = LoadFlags::from_bits_truncate(u32::from(u16::from_le_bytes([data[0], data[1]])));
    let source = Source::from(&data[2..]);
    let arena = ImageArena::new();

    let image = match arena.load_with_limits(&source, flags, &DecodeLimits::strict()) {
        Ok(image) => image,
        Err(_) => return,
    };
    image.validate().expect("decoded image must be consistent");

    if image.frames() > 1 {
        image.set_image_type(ImageType::Gif);
    }
    let _ = image.store();
});
