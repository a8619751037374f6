// src/engine/pixel.rs
//
// Raw pixel access: one encoded color at a linear offset inside a byte buffer.
// Offsets are trusted; callers do the geometry checks.

use crate::engine::color::{BaseFormat, ColorFormat};
use crate::error::{PlumError, Result};

/// Read the encoded color at `offset` (in pixels, not bytes).
#[inline]
pub fn read(buffer: &[u8], format: ColorFormat, offset: usize) -> u64 {
    match format.base() {
        BaseFormat::C16 => {
            let at = offset * 2;
            u16::from_ne_bytes([buffer[at], buffer[at + 1]]) as u64
        }
        BaseFormat::C32 | BaseFormat::C32X => {
            let at = offset * 4;
            let mut bytes = [0u8; 4];
            bytes.copy_from_slice(&buffer[at..at + 4]);
            u32::from_ne_bytes(bytes) as u64
        }
        BaseFormat::C64 => {
            let at = offset * 8;
            let mut bytes = [0u8; 8];
            bytes.copy_from_slice(&buffer[at..at + 8]);
            u64::from_ne_bytes(bytes)
        }
    }
}

/// Write `value` at `offset`, truncated to the element width.
#[inline]
pub fn write(buffer: &mut [u8], format: ColorFormat, offset: usize, value: u64) {
    match format.base() {
        BaseFormat::C16 => {
            let at = offset * 2;
            buffer[at..at + 2].copy_from_slice(&(value as u16).to_ne_bytes());
        }
        BaseFormat::C32 | BaseFormat::C32X => {
            let at = offset * 4;
            buffer[at..at + 4].copy_from_slice(&(value as u32).to_ne_bytes());
        }
        BaseFormat::C64 => {
            let at = offset * 8;
            buffer[at..at + 8].copy_from_slice(&value.to_ne_bytes());
        }
    }
}

/// Allocate a zero-filled buffer, reporting allocation failure instead of aborting.
pub(crate) fn alloc_zeroed(len: usize) -> Result<Vec<u8>> {
    let mut buf = Vec::new();
    buf.try_reserve_exact(len)
        .map_err(|_| PlumError::out_of_memory(len))?;
    buf.resize(len, 0);
    Ok(buf)
}
