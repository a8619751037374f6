// src/engine/limits.rs
//
// Decode limits: caps on input size and decoded pixel count, checked before the
// codec allocates anything large.

use crate::error::{PlumError, Result};

const STRICT_MAX_PIXELS: u64 = 40_000_000; // ~8K x 5K across all frames
const LENIENT_MAX_PIXELS: u64 = 200_000_000;
const STRICT_MAX_BYTES: u64 = 32 * 1024 * 1024;
const LENIENT_MAX_BYTES: u64 = 256 * 1024 * 1024;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum LimitPolicy {
    Unlimited,
    Strict,
    Lenient,
    Custom,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DecodeLimits {
    pub policy: LimitPolicy,
    pub max_bytes: Option<u64>,
    /// Pixels summed over every frame.
    pub max_pixels: Option<u64>,
}

impl Default for DecodeLimits {
    fn default() -> Self {
        Self::unlimited()
    }
}

impl DecodeLimits {
    pub fn unlimited() -> Self {
        Self {
            policy: LimitPolicy::Unlimited,
            max_bytes: None,
            max_pixels: None,
        }
    }

    pub fn strict() -> Self {
        Self {
            policy: LimitPolicy::Strict,
            max_bytes: Some(STRICT_MAX_BYTES),
            max_pixels: Some(STRICT_MAX_PIXELS),
        }
    }

    pub fn lenient() -> Self {
        Self {
            policy: LimitPolicy::Lenient,
            max_bytes: Some(LENIENT_MAX_BYTES),
            max_pixels: Some(LENIENT_MAX_PIXELS),
        }
    }

    pub fn custom(max_bytes: Option<u64>, max_pixels: Option<u64>) -> Self {
        Self {
            policy: LimitPolicy::Custom,
            max_bytes,
            max_pixels,
        }
    }

    pub fn apply_policy(policy: LimitPolicy) -> Self {
        match policy {
            LimitPolicy::Unlimited => Self::unlimited(),
            LimitPolicy::Strict => Self::strict(),
            LimitPolicy::Lenient => Self::lenient(),
            LimitPolicy::Custom => Self::custom(None, None),
        }
    }

    pub fn enforce_source_len(&self, len: usize) -> Result<()> {
        match self.max_bytes {
            Some(limit) if len as u64 > limit => {
                Err(PlumError::input_too_large(len as u64, limit))
            }
            _ => Ok(()),
        }
    }

    pub fn enforce_pixels(&self, width: u32, height: u32, frames: u32) -> Result<()> {
        let Some(limit) = self.max_pixels else {
            return Ok(());
        };
        let pixels = (width as u64)
            .saturating_mul(height as u64)
            .saturating_mul(frames as u64);
        if pixels > limit {
            return Err(PlumError::pixel_count_exceeds_limit(pixels, limit));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unlimited_accepts_everything() {
        let limits = DecodeLimits::default();
        assert_eq!(limits.policy, LimitPolicy::Unlimited);
        assert!(limits.enforce_source_len(usize::MAX).is_ok());
        assert!(limits.enforce_pixels(u32::MAX, u32::MAX, u32::MAX).is_ok());
    }

    #[test]
    fn strict_policy_enforces_pixels_and_bytes() {
        let limits = DecodeLimits::strict();
        assert!(limits.enforce_pixels(2000, 2000, 1).is_ok());
        assert!(matches!(
            limits.enforce_pixels(2000, 2000, 20),
            Err(PlumError::PixelCountExceedsLimit { .. })
        ));
        assert!(matches!(
            limits.enforce_source_len(STRICT_MAX_BYTES as usize + 1),
            Err(PlumError::InputTooLarge { .. })
        ));
    }

    #[test]
    fn lenient_is_looser_than_strict() {
        let limits = DecodeLimits::lenient();
        assert!(limits.enforce_pixels(7000, 7000, 1).is_ok());
        assert!(limits.enforce_source_len(STRICT_MAX_BYTES as usize + 1).is_ok());
    }

    #[test]
    fn custom_limits() {
        let limits = DecodeLimits::custom(Some(10), None);
        assert!(limits.enforce_source_len(10).is_ok());
        assert!(limits.enforce_source_len(11).is_err());
        assert!(limits.enforce_pixels(100_000, 100_000, 1).is_ok());
        assert_eq!(
            DecodeLimits::apply_policy(LimitPolicy::Strict),
            DecodeLimits::strict()
        );
    }
}
