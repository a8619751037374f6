// src/engine/palette.rs
//
// Palette store and index/color conversion.
//
// A palette holds up to 256 encoded colors in the raster's own color format. The
// buffer may be longer than the defined range; `palette_len` is the exclusive bound
// for valid indexes.

use std::collections::HashMap;

use crate::engine::color::{self, Channel, ColorFormat};
use crate::engine::pixel::{self, alloc_zeroed};
use crate::engine::raster::Raster;
use crate::error::{PlumError, Result};
use crate::ops::SortOrder;

pub const MAX_ENTRIES: usize = 256;

/// Result of turning direct colors into indexes.
#[derive(Debug, PartialEq, Eq)]
pub struct Indexed {
    pub indexes: Vec<u8>,
    pub palette: Vec<u8>,
    /// Number of palette entries (always at least one).
    pub entries: usize,
}

/// Defined palette entry, `None` past the end or without a palette.
pub fn get(raster: &Raster, index: i64) -> Option<u64> {
    let entries = raster.palette.as_ref()?;
    let index = usize::try_from(index).ok()?;
    (index < raster.palette_len).then(|| pixel::read(entries, raster.format, index))
}

/// Store a palette entry, growing the palette to `index + 1` entries if needed.
///
/// Indexes outside 0..=255 and rasters without a palette are ignored. Returns
/// whether the entry was written.
pub fn set(raster: &mut Raster, index: i64, value: u64) -> Result<bool> {
    let format = raster.format;
    let Some(entries) = raster.palette.as_mut() else {
        return Ok(false);
    };
    let index = match usize::try_from(index) {
        Ok(index) if index < MAX_ENTRIES => index,
        _ => return Ok(false),
    };
    let bpp = format.bytes_per_pixel();
    let needed = (index + 1) * bpp;
    if entries.len() < needed {
        entries
            .try_reserve_exact(needed - entries.len())
            .map_err(|_| PlumError::out_of_memory(needed))?;
        entries.resize(needed, 0);
    }
    // entries between the old bound and the buffer end may hold stale data
    let old_len = raster.palette_len;
    if index >= old_len {
        entries[old_len * bpp..index * bpp].fill(0);
        raster.palette_len = index + 1;
    }
    pixel::write(entries, format, index, value);
    Ok(true)
}

pub fn len(raster: &Raster) -> usize {
    raster.palette_len()
}

/// Entry lookup used when rendering colors; dangling indexes read as zero.
pub(crate) fn entry_or_zero(entries: &[u8], format: ColorFormat, index: usize) -> u64 {
    if (index + 1) * format.bytes_per_pixel() <= entries.len() {
        pixel::read(entries, format, index)
    } else {
        0
    }
}

/// Every index must be below `palette_len`.
pub fn check_indexes(indexes: &[u8], palette_len: usize) -> Result<()> {
    match indexes.iter().find(|&&index| index as usize >= palette_len) {
        Some(&index) => Err(PlumError::invalid_color_index(index as usize, palette_len)),
        None => Ok(()),
    }
}

/// Build a palette from `count` colors in first-appearance order.
pub fn colors_to_indexes(colors: &[u8], count: usize, format: ColorFormat) -> Result<Indexed> {
    let mut lookup: HashMap<u64, u8> = HashMap::new();
    let mut order = Vec::new();
    let mut indexes = alloc_zeroed(count)?;
    let mut overflow = 0usize;

    for (offset, slot) in indexes.iter_mut().enumerate() {
        let value = pixel::read(colors, format, offset);
        if let Some(&index) = lookup.get(&value) {
            *slot = index;
            continue;
        }
        if order.len() == MAX_ENTRIES {
            overflow += 1;
            continue;
        }
        let index = order.len() as u8;
        lookup.insert(value, index);
        order.push(value);
        *slot = index;
    }

    if overflow > 0 {
        let distinct = count_distinct(colors, count, format);
        return Err(PlumError::too_many_colors(distinct));
    }
    if order.is_empty() {
        order.push(0);
    }
    Ok(Indexed {
        indexes,
        palette: pack_entries(&order, format)?,
        entries: order.len(),
    })
}

fn count_distinct(colors: &[u8], count: usize, format: ColorFormat) -> usize {
    let mut seen = std::collections::HashSet::new();
    for offset in 0..count {
        seen.insert(pixel::read(colors, format, offset));
    }
    seen.len()
}

fn pack_entries(values: &[u64], format: ColorFormat) -> Result<Vec<u8>> {
    let mut buffer = alloc_zeroed(values.len() * format.bytes_per_pixel())?;
    for (offset, &value) in values.iter().enumerate() {
        pixel::write(&mut buffer, format, offset, value);
    }
    Ok(buffer)
}

/// Expand indexes through a palette into packed colors.
pub fn indexes_to_colors(indexes: &[u8], entries: &[u8], format: ColorFormat) -> Result<Vec<u8>> {
    let mut out = alloc_zeroed(indexes.len() * format.bytes_per_pixel())?;
    for (offset, &index) in indexes.iter().enumerate() {
        pixel::write(&mut out, format, offset, entry_or_zero(entries, format, index as usize));
    }
    Ok(out)
}

/// Reduce colors to at most 256 by dropping low bits until few enough buckets remain.
///
/// Each palette entry is the rounded mean of the colors that fell into its bucket.
pub fn quantize(colors: &[u8], count: usize, format: ColorFormat) -> Result<Indexed> {
    let channels: Vec<[u64; 4]> = (0..count)
        .map(|offset| {
            let value = pixel::read(colors, format, offset);
            Channel::ALL.map(|ch| {
                color::rescale(format.extract(value, ch), format.layout(ch).width(), 16)
            })
        })
        .collect();

    let mut dropped = 0;
    let buckets = loop {
        let buckets = bucketize(&channels, dropped);
        if buckets.len() <= MAX_ENTRIES {
            break buckets;
        }
        dropped += 1;
    };
    tracing::trace!(target: "plum_raster::palette", dropped, buckets = buckets.len(), "quantized");

    let mut sums = vec![([0u64; 4], 0u64); buckets.len()];
    let mut indexes = alloc_zeroed(count)?;
    for (offset, slot) in indexes.iter_mut().enumerate() {
        let value = pixel::read(colors, format, offset);
        let bucket = buckets[&bucket_key(&channels[offset], dropped)];
        *slot = bucket as u8;
        let (sum, n) = &mut sums[bucket];
        for ch in Channel::ALL {
            sum[ch.index()] += format.extract(value, ch);
        }
        *n += 1;
    }

    let mut entries: Vec<u64> = sums
        .iter()
        .map(|(sum, n)| format.pack(sum.map(|total| (total + n / 2) / n)))
        .collect();
    if entries.is_empty() {
        entries.push(0);
    }
    Ok(Indexed {
        indexes,
        palette: pack_entries(&entries, format)?,
        entries: entries.len(),
    })
}

fn bucket_key(channels: &[u64; 4], dropped: u32) -> [u64; 4] {
    channels.map(|c| c >> dropped)
}

/// Bucket numbers in first-appearance order.
fn bucketize(channels: &[[u64; 4]], dropped: u32) -> HashMap<[u64; 4], usize> {
    let mut buckets = HashMap::new();
    for c in channels {
        let next = buckets.len();
        buckets.entry(bucket_key(c, dropped)).or_insert(next);
        if buckets.len() > MAX_ENTRIES {
            break;
        }
    }
    buckets
}

/// Require a palette and check every index against it.
fn require_valid_palette(raster: &Raster) -> Result<&[u8]> {
    let entries = raster
        .palette
        .as_deref()
        .ok_or_else(PlumError::undefined_palette)?;
    check_indexes(&raster.pixels, raster.palette_len)?;
    Ok(entries)
}

/// Drop duplicate and unused entries, keeping the first occurrence, and remap indexes.
pub fn reduce(raster: &mut Raster) -> Result<()> {
    let format = raster.format;
    let entries = require_valid_palette(raster)?;

    let mut used = [false; MAX_ENTRIES];
    for &index in &raster.pixels {
        used[index as usize] = true;
    }
    let mut remap = [0u8; MAX_ENTRIES];
    let mut kept: Vec<u64> = Vec::new();
    let mut first_slot: HashMap<u64, u8> = HashMap::new();
    for index in 0..raster.palette_len {
        if !used[index] {
            continue;
        }
        let value = pixel::read(entries, format, index);
        remap[index] = *first_slot.entry(value).or_insert_with(|| {
            kept.push(value);
            (kept.len() - 1) as u8
        });
    }
    if kept.is_empty() {
        kept.push(0);
    }

    let palette = pack_entries(&kept, format)?;
    tracing::debug!(
        target: "plum_raster::palette",
        before = raster.palette_len,
        after = kept.len(),
        "palette reduced"
    );
    for index in raster.pixels.iter_mut() {
        *index = remap[*index as usize];
    }
    raster.palette_len = kept.len();
    raster.palette = Some(palette);
    Ok(())
}

/// Palette entries as encoded colors, up to `palette_len`.
pub fn snapshot(raster: &Raster) -> Result<Vec<u64>> {
    let entries = require_valid_palette(raster)?;
    Ok((0..raster.palette_len)
        .map(|index| pixel::read(entries, raster.format, index))
        .collect())
}

/// Luminance-like sort key: 299 r + 587 g + 114 b on 16-bit channels.
pub fn luma_key(value: u64, format: ColorFormat) -> u64 {
    let channel = |ch: Channel| {
        color::rescale(format.extract(value, ch), format.layout(ch).width(), 16)
    };
    299 * channel(Channel::Red) + 587 * channel(Channel::Green) + 114 * channel(Channel::Blue)
}

/// Sort by brightness; light first unless `order` says otherwise.
pub fn sort(raster: &mut Raster, order: SortOrder) -> Result<()> {
    let format = raster.format;
    let keys: Vec<u64> = snapshot(raster)?
        .into_iter()
        .map(|value| match order {
            SortOrder::DarkFirst => luma_key(value, format),
            SortOrder::LightFirst => u64::MAX - luma_key(value, format),
        })
        .collect();
    reorder_by_keys(raster, &keys)
}

/// Stable ascending reorder of the defined entries by `keys`, remapping indexes.
pub fn reorder_by_keys(raster: &mut Raster, keys: &[u64]) -> Result<()> {
    let values = snapshot(raster)?;
    if keys.len() != values.len() {
        return Err(PlumError::invalid_argument(
            "keys",
            keys.len().to_string(),
            format!("expected one key per palette entry ({})", values.len()),
        ));
    }
    let mut order: Vec<usize> = (0..values.len()).collect();
    order.sort_by_key(|&index| keys[index]);

    let mut remap = [0u8; MAX_ENTRIES];
    let sorted: Vec<u64> = order
        .iter()
        .enumerate()
        .map(|(new, &old)| {
            remap[old] = new as u8;
            values[old]
        })
        .collect();
    let palette = pack_entries(&sorted, raster.format)?;
    for index in raster.pixels.iter_mut() {
        *index = remap[*index as usize];
    }
    if let Some(entries) = raster.palette.as_mut() {
        let defined = palette.len();
        entries[..defined].copy_from_slice(&palette);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn paletted(width: u32, height: u32) -> Raster {
        Raster::new(width, height, 1, ColorFormat::C32, true).unwrap()
    }

    fn colors_of(raster: &Raster) -> Vec<u64> {
        (0..raster.height() as i64)
            .flat_map(|y| (0..raster.width() as i64).map(move |x| (x, y)))
            .map(|(x, y)| raster.color_at(x, y, 0).unwrap())
            .collect()
    }

    mod store {
        use super::*;

        #[test]
        fn new_palette_is_empty() {
            let raster = paletted(2, 2);
            assert_eq!(len(&raster), 0);
            assert_eq!(get(&raster, 0), None);
        }

        #[test]
        fn set_grows_and_zero_fills() {
            let mut raster = paletted(2, 2);
            assert!(set(&mut raster, 4, 0xAABBCCDD).unwrap());
            assert_eq!(len(&raster), 5);
            assert_eq!(get(&raster, 4), Some(0xAABBCCDD));
            assert_eq!(get(&raster, 2), Some(0));
            assert_eq!(get(&raster, 5), None);

            assert!(set(&mut raster, 1, 7).unwrap());
            assert_eq!(len(&raster), 5);
            assert_eq!(get(&raster, 4), Some(0xAABBCCDD));
        }

        #[test]
        fn out_of_range_index_is_ignored() {
            let mut raster = paletted(1, 1);
            assert!(!set(&mut raster, 256, 1).unwrap());
            assert!(!set(&mut raster, -1, 1).unwrap());
            assert_eq!(len(&raster), 0);
            assert_eq!(get(&raster, -1), None);
            assert!(set(&mut raster, 255, 1).unwrap());
            assert_eq!(len(&raster), 256);
        }

        #[test]
        fn direct_raster_has_no_palette() {
            let mut raster = Raster::new(1, 1, 1, ColorFormat::C32, false).unwrap();
            assert!(!set(&mut raster, 0, 1).unwrap());
            assert_eq!(len(&raster), 0);
            assert_eq!(get(&raster, 0), None);
        }
    }

    mod conversion {
        use super::*;

        fn packed(values: &[u64], format: ColorFormat) -> Vec<u8> {
            pack_entries(values, format).unwrap()
        }

        #[test]
        fn first_appearance_order() {
            let colors = packed(&[9, 5, 9, 7, 5], ColorFormat::C32);
            let indexed = colors_to_indexes(&colors, 5, ColorFormat::C32).unwrap();
            assert_eq!(indexed.indexes, vec![0, 1, 0, 2, 1]);
            assert_eq!(indexed.entries, 3);
            let back = indexes_to_colors(&indexed.indexes, &indexed.palette, ColorFormat::C32)
                .unwrap();
            assert_eq!(back, colors);
        }

        #[test]
        fn too_many_colors_reports_count() {
            let values: Vec<u64> = (0..300).collect();
            let colors = packed(&values, ColorFormat::C32);
            let err = colors_to_indexes(&colors, 300, ColorFormat::C32).unwrap_err();
            assert!(matches!(err, PlumError::TooManyColors { colors: 300 }));
        }

        #[test]
        fn quantize_fits_in_palette() {
            let values: Vec<u64> = (0..1000u64)
                .map(|i| ColorFormat::C32.pack([i % 256, (i * 7) % 256, (i * 13) % 256, 0]))
                .collect();
            let colors = packed(&values, ColorFormat::C32);
            let indexed = quantize(&colors, values.len(), ColorFormat::C32).unwrap();
            assert!(indexed.entries <= MAX_ENTRIES);
            assert!(indexed
                .indexes
                .iter()
                .all(|&index| (index as usize) < indexed.entries));
        }

        #[test]
        fn quantize_keeps_small_images_exact() {
            let values = [0x10, 0x20, 0x10];
            let colors = packed(&values, ColorFormat::C32);
            let indexed = quantize(&colors, 3, ColorFormat::C32).unwrap();
            assert_eq!(indexed.entries, 2);
            let back = indexes_to_colors(&indexed.indexes, &indexed.palette, ColorFormat::C32)
                .unwrap();
            assert_eq!(back, colors);
        }
    }

    mod maintenance {
        use super::*;

        fn sample() -> Raster {
            let mut raster = paletted(4, 1);
            let white = ColorFormat::C32.pack([255, 255, 255, 0]);
            let black = 0;
            let grey = ColorFormat::C32.pack([128, 128, 128, 0]);
            for (index, value) in [grey, white, black, white, grey].into_iter().enumerate() {
                set(&mut raster, index as i64, value).unwrap();
            }
            for (x, index) in [0u64, 1, 2, 4].into_iter().enumerate() {
                raster.set_pixel_at(x as i64, 0, 0, index);
            }
            raster
        }

        #[test]
        fn reduce_drops_unused_and_duplicates() {
            let mut raster = sample();
            let before = colors_of(&raster);
            reduce(&mut raster).unwrap();
            assert_eq!(len(&raster), 3);
            assert_eq!(colors_of(&raster), before);
            assert_eq!(raster.pixels, vec![0, 1, 2, 0]);
        }

        #[test]
        fn reduce_rejects_dangling_indexes() {
            let mut raster = sample();
            raster.set_pixel_at(0, 0, 0, 9);
            assert!(matches!(
                reduce(&mut raster),
                Err(PlumError::InvalidColorIndex { index: 9, .. })
            ));
        }

        #[test]
        fn reduce_requires_palette() {
            let mut raster = Raster::new(1, 1, 1, ColorFormat::C32, false).unwrap();
            assert!(matches!(reduce(&mut raster), Err(PlumError::UndefinedPalette)));
        }

        #[test]
        fn sort_orders_by_brightness() {
            let mut raster = sample();
            let before = colors_of(&raster);
            sort(&mut raster, SortOrder::DarkFirst).unwrap();
            assert_eq!(get(&raster, 0), Some(0));
            assert_eq!(colors_of(&raster), before);

            sort(&mut raster, SortOrder::LightFirst).unwrap();
            assert_eq!(get(&raster, 0), Some(ColorFormat::C32.pack([255, 255, 255, 0])));
            assert_eq!(get(&raster, 4), Some(0));
            assert_eq!(colors_of(&raster), before);
        }

        #[test]
        fn reorder_is_stable() {
            let mut raster = sample();
            reorder_by_keys(&mut raster, &[1, 0, 1, 0, 1]).unwrap();
            let expected: Vec<u64> = [1, 3, 0, 2, 4]
                .iter()
                .map(|&i| sample_entry(i))
                .collect();
            let actual: Vec<u64> = (0..5).map(|i| get(&raster, i).unwrap()).collect();
            assert_eq!(actual, expected);
            assert!(reorder_by_keys(&mut raster, &[0]).is_err());
        }

        fn sample_entry(index: i64) -> u64 {
            get(&sample(), index).unwrap()
        }
    }
}
