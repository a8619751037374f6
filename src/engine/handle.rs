// src/engine/handle.rs
//
// Reference-counted image handles.
//
// Every raster lives in its own locked slot, registered in an `ImageArena` under an
// `ImageId` next to a count of live handles. Cloning a handle acquires a reference,
// dropping it releases one, and the raster is destroyed when the count reaches zero.
// Mutation through any handle is visible through all handles of the same image;
// `copy()` makes independent storage.
//
// Lock order: a slot lock may be held while the registry lock is taken, never the
// other way around.

use std::collections::HashMap;
use std::fmt;
use std::ops::Range;
use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;
use tracing::{debug, trace};

use crate::engine::color::ColorFormat;
use crate::engine::decoder;
use crate::engine::encoder;
use crate::engine::io::{self, Source};
use crate::engine::limits::DecodeLimits;
use crate::engine::palette;
use crate::engine::raster::Raster;
use crate::error::{PlumError, Result};
use crate::ops::{ImageType, LoadFlags, SortOrder};

/// Stable identifier of an image inside its arena.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ImageId(u64);

impl ImageId {
    pub fn get(self) -> u64 {
        self.0
    }
}

impl fmt::Display for ImageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

struct Slot {
    raster: Raster,
    /// Bumped on every mutation; lets callbacks run without the lock held.
    revision: u64,
}

type SharedSlot = Arc<Mutex<Slot>>;

struct Entry {
    slot: SharedSlot,
    refs: usize,
}

#[derive(Default)]
struct ArenaInner {
    entries: Mutex<HashMap<ImageId, Entry>>,
    next_id: AtomicU64,
}

impl ArenaInner {
    fn insert(self: &Arc<Self>, raster: Raster) -> ImageHandle {
        let id = ImageId(self.next_id.fetch_add(1, Ordering::Relaxed) + 1);
        debug!(
            target: "plum_raster::arena",
            %id,
            width = raster.width,
            height = raster.height,
            frames = raster.frames,
            paletted = raster.is_paletted(),
            "image created"
        );
        let slot = Arc::new(Mutex::new(Slot { raster, revision: 0 }));
        self.entries.lock().insert(id, Entry { slot, refs: 0 });
        self.acquire(id)
    }

    fn acquire(self: &Arc<Self>, id: ImageId) -> ImageHandle {
        let mut entries = self.entries.lock();
        let entry = live_entry(entries.get_mut(&id), id);
        entry.refs += 1;
        trace!(target: "plum_raster::arena", %id, refs = entry.refs, "acquired");
        ImageHandle {
            arena: Arc::clone(self),
            slot: Arc::clone(&entry.slot),
            id,
            released: false,
        }
    }

    /// Drop one reference; returns true when the image was destroyed.
    fn release(&self, id: ImageId) -> bool {
        let mut entries = self.entries.lock();
        let entry = live_entry(entries.get_mut(&id), id);
        assert!(entry.refs > 0, "reference count underflow on image {id}");
        entry.refs -= 1;
        trace!(target: "plum_raster::arena", %id, refs = entry.refs, "released");
        if entry.refs == 0 {
            entries.remove(&id);
            debug!(target: "plum_raster::arena", %id, "image destroyed");
            true
        } else {
            false
        }
    }

    fn refs(&self, id: ImageId) -> usize {
        self.entries.lock().get(&id).map_or(0, |entry| entry.refs)
    }
}

fn live_entry<E>(entry: Option<E>, id: ImageId) -> E {
    match entry {
        Some(entry) => entry,
        None => unreachable!("handle to image {id} outlived its slot"),
    }
}

/// Offsets `0..len` from `origin` whose coordinate lands in `0..bound`.
fn clamp_span(origin: i64, len: i64, bound: i64) -> Range<i64> {
    let start = 0i64.saturating_sub(origin).max(0);
    let end = bound.saturating_sub(origin).min(len);
    start..end.max(start)
}

/// Owner of every image created or loaded through it.
#[derive(Clone, Default)]
pub struct ImageArena {
    inner: Arc<ArenaInner>,
}

impl fmt::Debug for ImageArena {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ImageArena")
            .field("live_images", &self.live_images())
            .finish()
    }
}

impl ImageArena {
    pub fn new() -> Self {
        Self::default()
    }

    /// Allocate a zero-filled image.
    pub fn create(
        &self,
        width: u32,
        height: u32,
        frames: u32,
        format: ColorFormat,
        paletted: bool,
    ) -> Result<ImageHandle> {
        let raster = Raster::new(width, height, frames, format, paletted)?;
        Ok(self.inner.insert(raster))
    }

    /// Take ownership of a raster built elsewhere.
    pub fn adopt(&self, raster: Raster) -> Result<ImageHandle> {
        raster.validate()?;
        Ok(self.inner.insert(raster))
    }

    /// Decode an image without size limits.
    pub fn load(&self, source: &Source, flags: LoadFlags) -> Result<ImageHandle> {
        self.load_with_limits(source, flags, &DecodeLimits::unlimited())
    }

    pub fn load_with_limits(
        &self,
        source: &Source,
        flags: LoadFlags,
        limits: &DecodeLimits,
    ) -> Result<ImageHandle> {
        let raster = source.with_bytes(|bytes| decoder::decode(bytes, flags, limits))?;
        Ok(self.inner.insert(raster))
    }

    pub fn load_bytes(&self, bytes: &[u8], flags: LoadFlags) -> Result<ImageHandle> {
        let raster = decoder::decode(bytes, flags, &DecodeLimits::unlimited())?;
        Ok(self.inner.insert(raster))
    }

    /// Memory-map and decode a file.
    pub fn load_file(&self, path: impl AsRef<Path>, flags: LoadFlags) -> Result<ImageHandle> {
        let source = Source::map_file(path)?;
        self.load(&source, flags)
    }

    /// Number of images with at least one live handle.
    pub fn live_images(&self) -> usize {
        self.inner.entries.lock().len()
    }
}

/// Values written by [`ImageHandle::set`].
#[derive(Clone, Copy, Debug)]
pub enum RegionValues<'a> {
    /// The same value in every cell.
    Fill(u64),
    /// One value per cell, row-major.
    Cells(&'a [u64]),
}

/// Shared-ownership reference to one image.
pub struct ImageHandle {
    arena: Arc<ArenaInner>,
    slot: SharedSlot,
    id: ImageId,
    released: bool,
}

impl Clone for ImageHandle {
    fn clone(&self) -> Self {
        self.arena.acquire(self.id)
    }
}

impl Drop for ImageHandle {
    fn drop(&mut self) {
        if !self.released {
            self.arena.release(self.id);
        }
    }
}

impl fmt::Debug for ImageHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let refs = self.ref_count();
        self.with_raster(|raster| {
            f.debug_struct("ImageHandle")
                .field("id", &self.id)
                .field("width", &raster.width)
                .field("height", &raster.height)
                .field("frames", &raster.frames)
                .field("format", &raster.format)
                .field("paletted", &raster.is_paletted())
                .field("refs", &refs)
                .finish()
        })
    }
}

impl PartialEq for ImageHandle {
    /// Handles are equal when they share the same image.
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.slot, &other.slot)
    }
}

impl Eq for ImageHandle {}

impl ImageHandle {
    /// Read access to the raster under this image's lock.
    ///
    /// Other images, and clones or drops of any handle, are fine inside `f`. Calling
    /// back into this same image deadlocks.
    pub fn with_raster<T>(&self, f: impl FnOnce(&Raster) -> T) -> T {
        f(&self.slot.lock().raster)
    }

    /// Write access to the raster under this image's lock; same rules as
    /// [`with_raster`](Self::with_raster).
    pub fn with_raster_mut<T>(&self, f: impl FnOnce(&mut Raster) -> T) -> T {
        let mut slot = self.slot.lock();
        slot.revision += 1;
        f(&mut slot.raster)
    }

    pub fn id(&self) -> ImageId {
        self.id
    }

    pub fn arena(&self) -> ImageArena {
        ImageArena {
            inner: Arc::clone(&self.arena),
        }
    }

    /// Number of live handles to this image, this one included.
    pub fn ref_count(&self) -> usize {
        self.arena.refs(self.id)
    }

    /// Explicitly release this handle; returns true if it was the last one.
    pub fn release(mut self) -> bool {
        self.released = true;
        self.arena.release(self.id)
    }

    pub fn width(&self) -> u32 {
        self.with_raster(Raster::width)
    }

    pub fn height(&self) -> u32 {
        self.with_raster(Raster::height)
    }

    pub fn frames(&self) -> u32 {
        self.with_raster(Raster::frames)
    }

    pub fn color_format(&self) -> ColorFormat {
        self.with_raster(Raster::color_format)
    }

    pub fn image_type(&self) -> ImageType {
        self.with_raster(Raster::image_type)
    }

    pub fn set_image_type(&self, image_type: ImageType) {
        self.with_raster_mut(|raster| raster.set_image_type(image_type));
    }

    pub fn is_paletted(&self) -> bool {
        self.with_raster(Raster::is_paletted)
    }

    /// Deep copy into a new image with its own reference count.
    pub fn copy(&self) -> Result<ImageHandle> {
        let raster = self.with_raster(Raster::try_clone)?;
        Ok(self.arena.insert(raster))
    }

    /// Encode into the container named by the image type.
    pub fn store(&self) -> Result<Vec<u8>> {
        self.with_raster(encoder::encode)
    }

    pub fn store_file(&self, path: impl AsRef<Path>) -> Result<()> {
        let data = self.store()?;
        io::write_file(path, &data)
    }

    pub fn validate(&self) -> Result<()> {
        self.with_raster(Raster::validate)
    }

    /// Re-encode every color into `to`; the image is unchanged on failure.
    pub fn convert_colors(&self, to: ColorFormat) -> Result<()> {
        self.with_raster_mut(|raster| {
            let from = raster.color_format();
            raster.convert_colors(to)?;
            debug!(target: "plum_raster::convert", id = %self.id, ?from, ?to, "colors converted");
            Ok(())
        })
    }

    /// Convert to a paletted image whose palette is stored in `format`.
    ///
    /// Returns the highest palette index in use, or 0 when already paletted.
    pub fn to_indexed(&self, format: ColorFormat, quantize: bool) -> Result<usize> {
        self.with_raster_mut(|raster| raster.to_indexed(format, quantize))
    }

    /// Expand a paletted image into direct colors; false if there was no palette.
    pub fn to_rgba(&self, format: ColorFormat) -> Result<bool> {
        self.with_raster_mut(|raster| raster.to_rgba(format))
    }

    pub fn pixel(&self, x: i64, y: i64, z: i64) -> Option<u64> {
        self.with_raster(|raster| raster.pixel_at(x, y, z))
    }

    pub fn set_pixel(&self, x: i64, y: i64, z: i64, value: u64) -> bool {
        self.with_raster_mut(|raster| raster.set_pixel_at(x, y, z, value))
    }

    /// Read a `width` x `height` window of frame `z`, rows first.
    ///
    /// Cells outside the image are `None`; a non-positive size yields no rows.
    pub fn get(&self, x: i64, y: i64, z: i64, width: i64, height: i64) -> Vec<Vec<Option<u64>>> {
        if width <= 0 || height <= 0 {
            return Vec::new();
        }
        self.with_raster(|raster| {
            (0..height)
                .map(|row| {
                    (0..width)
                        .map(|col| {
                            let cx = x.checked_add(col)?;
                            let cy = y.checked_add(row)?;
                            raster.pixel_at(cx, cy, z)
                        })
                        .collect()
                })
                .collect()
        })
    }

    /// Write a window of frame `z`. Cells outside the image are skipped.
    pub fn set(
        &self,
        x: i64,
        y: i64,
        z: i64,
        width: i64,
        height: i64,
        values: RegionValues<'_>,
    ) -> Result<()> {
        if width <= 0 || height <= 0 {
            return Ok(());
        }
        if let RegionValues::Cells(cells) = values {
            let expected = (width as i128) * (height as i128);
            if cells.len() as i128 != expected {
                return Err(PlumError::invalid_argument(
                    "values",
                    cells.len().to_string(),
                    format!("expected {expected} values for a {width}x{height} region"),
                ));
            }
        }
        self.with_raster_mut(|raster| {
            if !(0..i64::from(raster.frames())).contains(&z) {
                return;
            }
            let cols = clamp_span(x, width, i64::from(raster.width()));
            let rows = clamp_span(y, height, i64::from(raster.height()));
            for row in rows {
                for col in cols.clone() {
                    let value = match values {
                        RegionValues::Fill(value) => value,
                        // indexed by the unclamped window position
                        RegionValues::Cells(cells) => cells[(row * width + col) as usize],
                    };
                    raster.set_pixel_at(x + col, y + row, z, value);
                }
            }
        });
        Ok(())
    }

    /// Rotate clockwise by quarter turns, then optionally mirror horizontally.
    pub fn rotate(&self, quarter_turns: i32, flip: bool) -> Result<()> {
        self.with_raster_mut(|raster| raster.rotate(quarter_turns, flip))
    }

    pub fn remove_alpha(&self) {
        self.with_raster_mut(Raster::remove_alpha);
    }

    pub fn reduce_palette(&self) -> Result<()> {
        self.with_raster_mut(palette::reduce)
    }

    pub fn sort_palette(&self, order: SortOrder) -> Result<()> {
        self.with_raster_mut(|raster| palette::sort(raster, order))
    }

    /// Sort the palette by a caller key, ascending and stable.
    ///
    /// `key` runs once per distinct color without the image lock held, so it may
    /// touch this image too. If this image is mutated meanwhile the sort is rejected.
    pub fn sort_palette_by(&self, mut key: impl FnMut(u64) -> u64) -> Result<()> {
        let (values, revision) = {
            let slot = self.slot.lock();
            (palette::snapshot(&slot.raster)?, slot.revision)
        };

        let mut cache: HashMap<u64, u64> = HashMap::new();
        let keys: Vec<u64> = values
            .iter()
            .map(|&value| *cache.entry(value).or_insert_with(|| key(value)))
            .collect();

        let mut slot = self.slot.lock();
        if slot.revision != revision {
            return Err(PlumError::invalid_argument(
                "palette",
                self.id.to_string(),
                "image was modified while sort keys were computed",
            ));
        }
        palette::reorder_by_keys(&mut slot.raster, &keys)?;
        slot.revision += 1;
        Ok(())
    }

    /// A view of the palette sharing ownership of this image.
    pub fn palette(&self) -> Option<PaletteView> {
        self.is_paletted().then(|| PaletteView {
            image: self.clone(),
        })
    }
}

/// Palette-entry access to a paletted image; keeps the image alive.
///
/// Once the image is expanded to direct colors the view reads as empty and
/// writes fail with `UndefinedPalette`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PaletteView {
    image: ImageHandle,
}

impl PaletteView {
    pub fn get(&self, index: i64) -> Option<u64> {
        self.image.with_raster(|raster| palette::get(raster, index))
    }

    /// Store an entry, growing the palette; indexes outside 0..=255 are ignored.
    pub fn set(&self, index: i64, value: u64) -> Result<bool> {
        self.image.with_raster_mut(|raster| {
            if !raster.is_paletted() {
                return Err(PlumError::UndefinedPalette);
            }
            palette::set(raster, index, value)
        })
    }

    pub fn len(&self) -> usize {
        self.image.with_raster(palette::len)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn image(&self) -> ImageHandle {
        self.image.clone()
    }
}
