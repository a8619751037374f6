// src/engine/color.rs
//
// Color format codec: per-format bit layouts and pack/unpack/convert of encoded colors.
//
// An encoded color is a u64 laid out from the least significant bit as
// red, green, blue, alpha. Non-inverted formats store transparency in the alpha
// channel (0 = opaque); alpha-inverted formats store opacity (0 = transparent).

use crate::engine::pixel;
use crate::error::{PlumError, Result};

/// One of the four fixed storage layouts.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Default)]
#[repr(u32)]
pub enum BaseFormat {
    /// 8 bits per channel in a 32-bit word.
    #[default]
    C32 = 0,
    /// 16 bits per channel in a 64-bit word.
    C64 = 1,
    /// 5/5/5/1 bits in a 16-bit word.
    C16 = 2,
    /// 10/10/10/2 bits in a 32-bit word.
    C32X = 3,
}

/// Color channel, in packing order.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Channel {
    Red = 0,
    Green = 1,
    Blue = 2,
    Alpha = 3,
}

impl Channel {
    pub const ALL: [Channel; 4] = [Channel::Red, Channel::Green, Channel::Blue, Channel::Alpha];

    pub fn index(self) -> usize {
        self as usize
    }
}

impl TryFrom<usize> for Channel {
    type Error = PlumError;

    fn try_from(index: usize) -> Result<Self> {
        Self::ALL.get(index).copied().ok_or_else(|| {
            PlumError::invalid_argument("channel", index.to_string(), "expected 0..3")
        })
    }
}

/// Mask, shift and width of one channel inside the 64-bit backing integer.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ChannelLayout {
    mask: u64,
    shift: u32,
    width: u32,
}

impl ChannelLayout {
    const fn new(shift: u32, width: u32) -> Self {
        assert!(width > 0 && shift + width <= 64, "channel must fit the backing integer");
        let max = if width == 64 { u64::MAX } else { (1u64 << width) - 1 };
        Self {
            mask: max << shift,
            shift,
            width,
        }
    }

    pub fn mask(self) -> u64 {
        self.mask
    }

    pub fn shift(self) -> u32 {
        self.shift
    }

    pub fn width(self) -> u32 {
        self.width
    }

    /// Largest value the channel can hold.
    pub fn max(self) -> u64 {
        self.mask >> self.shift
    }
}

const fn layouts(widths: [u32; 4]) -> [ChannelLayout; 4] {
    let red = ChannelLayout::new(0, widths[0]);
    let green = ChannelLayout::new(widths[0], widths[1]);
    let blue = ChannelLayout::new(widths[0] + widths[1], widths[2]);
    let alpha = ChannelLayout::new(widths[0] + widths[1] + widths[2], widths[3]);
    [red, green, blue, alpha]
}

const C32_LAYOUT: [ChannelLayout; 4] = layouts([8, 8, 8, 8]);
const C64_LAYOUT: [ChannelLayout; 4] = layouts([16, 16, 16, 16]);
const C16_LAYOUT: [ChannelLayout; 4] = layouts([5, 5, 5, 1]);
const C32X_LAYOUT: [ChannelLayout; 4] = layouts([10, 10, 10, 2]);

impl BaseFormat {
    pub const ALL: [BaseFormat; 4] = [
        BaseFormat::C32,
        BaseFormat::C64,
        BaseFormat::C16,
        BaseFormat::C32X,
    ];

    pub fn layouts(self) -> &'static [ChannelLayout; 4] {
        match self {
            BaseFormat::C32 => &C32_LAYOUT,
            BaseFormat::C64 => &C64_LAYOUT,
            BaseFormat::C16 => &C16_LAYOUT,
            BaseFormat::C32X => &C32X_LAYOUT,
        }
    }

    /// Storage width of one pixel. C32 and C32X share the 32-bit element.
    pub fn bytes_per_pixel(self) -> usize {
        match self {
            BaseFormat::C16 => 2,
            BaseFormat::C32 | BaseFormat::C32X => 4,
            BaseFormat::C64 => 8,
        }
    }

    fn from_bits(bits: u32) -> Self {
        match bits & ColorFormat::BASE_MASK {
            0 => BaseFormat::C32,
            1 => BaseFormat::C64,
            2 => BaseFormat::C16,
            _ => BaseFormat::C32X,
        }
    }
}

/// A base layout plus the alpha-invert modifier.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Default)]
pub struct ColorFormat {
    base: BaseFormat,
    alpha_inverted: bool,
}

impl ColorFormat {
    pub const C32: Self = Self::new(BaseFormat::C32, false);
    pub const C64: Self = Self::new(BaseFormat::C64, false);
    pub const C16: Self = Self::new(BaseFormat::C16, false);
    pub const C32X: Self = Self::new(BaseFormat::C32X, false);

    pub(crate) const BASE_MASK: u32 = 0x3;
    pub(crate) const ALPHA_INVERT: u32 = 0x4;

    pub const fn new(base: BaseFormat, alpha_inverted: bool) -> Self {
        Self {
            base,
            alpha_inverted,
        }
    }

    pub fn base(self) -> BaseFormat {
        self.base
    }

    pub fn alpha_inverted(self) -> bool {
        self.alpha_inverted
    }

    pub fn with_alpha_inverted(self, alpha_inverted: bool) -> Self {
        Self::new(self.base, alpha_inverted)
    }

    /// Numeric format id (base variant in the low two bits, 4 = alpha inverted).
    pub fn bits(self) -> u32 {
        let invert = if self.alpha_inverted {
            Self::ALPHA_INVERT
        } else {
            0
        };
        self.base as u32 | invert
    }

    /// Parse a numeric format id; any bit outside the format space is an error.
    pub fn from_bits(bits: u32) -> Result<Self> {
        if bits & !(Self::BASE_MASK | Self::ALPHA_INVERT) != 0 {
            return Err(PlumError::invalid_argument(
                "color format",
                bits.to_string(),
                "expected a base format (0..3), optionally ORed with ALPHA_INVERT (4)",
            ));
        }
        Ok(Self::from_bits_truncate(bits))
    }

    pub(crate) fn from_bits_truncate(bits: u32) -> Self {
        Self::new(
            BaseFormat::from_bits(bits),
            bits & Self::ALPHA_INVERT != 0,
        )
    }

    pub fn layout(self, channel: Channel) -> ChannelLayout {
        self.base.layouts()[channel.index()]
    }

    pub fn bytes_per_pixel(self) -> usize {
        self.base.bytes_per_pixel()
    }

    /// Union of all channel masks.
    pub fn value_mask(self) -> u64 {
        self.base.layouts().iter().fold(0, |acc, l| acc | l.mask)
    }

    /// Alpha value meaning "fully opaque" in this format.
    pub fn opaque_alpha(self) -> u64 {
        if self.alpha_inverted {
            self.layout(Channel::Alpha).max()
        } else {
            0
        }
    }

    pub fn extract(self, value: u64, channel: Channel) -> u64 {
        let layout = self.layout(channel);
        (value & layout.mask) >> layout.shift
    }

    /// Replace one channel; out-of-range channel values are truncated by the mask.
    pub fn insert(self, value: u64, channel_value: u64, channel: Channel) -> u64 {
        let layout = self.layout(channel);
        (value & !layout.mask) | (channel_value.wrapping_shl(layout.shift) & layout.mask)
    }

    pub fn normalize(self, channel_value: u64, channel: Channel) -> f64 {
        channel_value as f64 / self.layout(channel).max() as f64
    }

    /// Scale a real back to the channel range, flooring.
    ///
    /// Inputs outside [0, 1] are not clamped: negative results wrap around as
    /// two's complement and are then truncated by the channel mask on insert.
    pub fn denormalize(self, real: f64, channel: Channel) -> u64 {
        (real * self.layout(channel).max() as f64).floor() as i64 as u64
    }

    pub fn insert_normalized(self, value: u64, real: f64, channel: Channel) -> u64 {
        self.insert(value, self.denormalize(real, channel), channel)
    }

    pub fn pack(self, channels: [u64; 4]) -> u64 {
        Channel::ALL
            .iter()
            .fold(0, |value, &ch| self.insert(value, channels[ch.index()], ch))
    }

    pub fn pack_normalized(self, channels: [f64; 4]) -> u64 {
        Channel::ALL.iter().fold(0, |value, &ch| {
            self.insert_normalized(value, channels[ch.index()], ch)
        })
    }

    pub fn unpack(self, value: u64) -> [u64; 4] {
        Channel::ALL.map(|ch| self.extract(value, ch))
    }

    pub fn unpack_normalized(self, value: u64) -> [f64; 4] {
        Channel::ALL.map(|ch| self.normalize(self.extract(value, ch), ch))
    }
}

/// Change the bit width of a channel value.
///
/// Widening replicates the bit pattern so that 0 and the maximum map exactly onto
/// 0 and the new maximum; narrowing keeps the high bits.
pub fn rescale(value: u64, from_width: u32, to_width: u32) -> u64 {
    if from_width == to_width {
        return value;
    }
    if to_width < from_width {
        return value >> (from_width - to_width);
    }
    let mut result = 0u64;
    let mut remaining = to_width;
    while remaining > 0 {
        if remaining >= from_width {
            remaining -= from_width;
            result |= value << remaining;
        } else {
            result |= value >> (from_width - remaining);
            remaining = 0;
        }
    }
    result
}

/// Convert one encoded color between formats.
pub fn convert(value: u64, from: ColorFormat, to: ColorFormat) -> u64 {
    if from == to {
        return value;
    }
    let flip_alpha = from.alpha_inverted != to.alpha_inverted;
    Channel::ALL.iter().fold(0, |packed, &ch| {
        let from_layout = from.layout(ch);
        let to_layout = to.layout(ch);
        let mut channel = rescale(from.extract(value, ch), from_layout.width, to_layout.width);
        if ch == Channel::Alpha && flip_alpha {
            channel = to_layout.max() - channel;
        }
        to.insert(packed, channel, ch)
    })
}

/// Convert `count` packed colors from `src` into a freshly allocated buffer.
///
/// The source is left untouched on failure.
pub fn convert_colors(
    src: &[u8],
    count: usize,
    from: ColorFormat,
    to: ColorFormat,
) -> Result<Vec<u8>> {
    let needed = count
        .checked_mul(from.bytes_per_pixel())
        .filter(|&needed| needed <= src.len())
        .ok_or_else(|| {
            PlumError::invalid_argument(
                "count",
                count.to_string(),
                format!("source buffer holds only {} bytes", src.len()),
            )
        })?;
    let out_len = count
        .checked_mul(to.bytes_per_pixel())
        .ok_or_else(|| PlumError::out_of_memory(usize::MAX))?;
    let mut out = pixel::alloc_zeroed(out_len)?;
    for offset in 0..count {
        let value = pixel::read(&src[..needed], from, offset);
        pixel::write(&mut out, to, offset, convert(value, from, to));
    }
    Ok(out)
}
