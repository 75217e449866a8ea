//! Bit reconstruction from level holds
//!
//! The capture device reports levels, not bits. A run of identical CAN bits
//! produces no edges, so the number of bits in a run is recovered from how
//! long the line held its level, quantized to the nominal bit period.

use crate::config::{DecoderConfig, LinePolarity};
use crate::types::{BitSample, Ticks};

/// Quantizes level holds into bit samples
#[derive(Debug, Clone, Copy)]
pub struct BitReconstructor {
    bit_period: i64,
    jitter_offset: i64,
    polarity: LinePolarity,
}

impl BitReconstructor {
    pub fn new(config: &DecoderConfig) -> Self {
        Self {
            bit_period: i64::from(config.bit_period_ticks),
            jitter_offset: i64::from(config.jitter_offset_ticks),
            polarity: config.polarity,
        }
    }

    /// Number of whole bit periods in a hold of `duration` ticks
    ///
    /// One bit is counted while more than the jitter margin remains, then a
    /// full period is consumed. Truncating: no fractional bits.
    pub fn bit_count(&self, duration: Ticks) -> usize {
        let mut remaining = i64::from(duration);
        let mut count = 0;
        while remaining > self.jitter_offset {
            count += 1;
            remaining -= self.bit_period;
        }
        count
    }

    /// Append the bits for a hold of `held_level` from `t_prev` to `t_new`
    ///
    /// Returns the number of samples appended.
    pub fn reconstruct(
        &self,
        held_level: u8,
        t_prev: Ticks,
        t_new: Ticks,
        edge_index: usize,
        out: &mut Vec<BitSample>,
    ) -> usize {
        let count = self.bit_count(t_new.saturating_sub(t_prev));
        let value = self.polarity.bit_for_level(held_level);
        out.extend(std::iter::repeat(BitSample { value, edge_index }).take(count));
        count
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn reconstructor() -> BitReconstructor {
        BitReconstructor::new(&DecoderConfig::default())
    }

    #[test]
    fn test_exact_periods() {
        let r = reconstructor();
        assert_eq!(r.bit_count(0), 0);
        assert_eq!(r.bit_count(20), 1);
        assert_eq!(r.bit_count(100), 5);
        assert_eq!(r.bit_count(200), 10);
    }

    #[test]
    fn test_jitter_margin() {
        let r = reconstructor();
        // Holds at or below the margin are noise
        assert_eq!(r.bit_count(8), 0);
        assert_eq!(r.bit_count(9), 1);
        // A period plus the margin minus one still counts as one bit
        assert_eq!(r.bit_count(27), 1);
        assert_eq!(r.bit_count(28), 1);
        assert_eq!(r.bit_count(29), 2);
        // Slightly short holds round up to the expected count
        assert_eq!(r.bit_count(57), 3);
    }

    #[test]
    fn test_reconstruct_polarity() {
        let mut out = Vec::new();
        let appended = reconstructor().reconstruct(0, 100, 160, 4, &mut out);
        assert_eq!(appended, 3);
        assert!(out.iter().all(|s| s.value == 1 && s.edge_index == 4));

        let direct = BitReconstructor::new(
            &DecoderConfig::new().with_polarity(LinePolarity::Direct),
        );
        let mut out = Vec::new();
        direct.reconstruct(0, 0, 40, 1, &mut out);
        assert_eq!(out.iter().map(|s| s.value).collect::<Vec<_>>(), vec![0, 0]);
    }

    #[test]
    fn test_custom_period() {
        let r = BitReconstructor::new(&DecoderConfig::new().with_bit_period(50).with_jitter_offset(10));
        assert_eq!(r.bit_count(50), 1);
        assert_eq!(r.bit_count(60), 1);
        assert_eq!(r.bit_count(61), 2);
    }
}
