//! CAN CRC-15
//!
//! Generator polynomial x^15 + x^14 + x^10 + x^8 + x^7 + x^4 + x^3 + 1
//! (0xC599 including the x^15 term). The register is updated one input bit
//! at a time, MSB first.

use crate::types::Bit;

/// Full generator polynomial, x^15 term included
pub const CRC15_POLY: u16 = 0xC599;

const REGISTER_MASK: u16 = 0x7FFF;

/// Compute the CAN CRC-15 of a bit sequence
///
/// Used to validate a frame by recomputing over SOF through the end of the
/// data field and comparing with the transmitted CRC field.
pub fn crc15(bits: &[Bit]) -> u16 {
    bits.iter().fold(0u16, |register, &bit| {
        let feedback = u16::from(bit & 1) ^ ((register >> 14) & 1);
        let shifted = (register << 1) & REGISTER_MASK;
        if feedback == 1 {
            shifted ^ (CRC15_POLY & REGISTER_MASK)
        } else {
            shifted
        }
    })
}
