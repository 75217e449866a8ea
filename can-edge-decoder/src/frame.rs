//! Decoded CAN frame types
//!
//! A frame is either a standard (11-bit ID) or an extended (29-bit ID) frame.
//! Every field keeps the bits exactly as observed on the line, including
//! malformed delimiters, so callers can flag violations themselves. The
//! field-name view (`CanFrame::fields`) is the boundary used by rendering
//! code that labels each field on a timeline.

use crate::crc::crc15;
use crate::types::{bits_to_u32, Bit};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::ops::Range;

/// Identifier format of a frame
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FrameType {
    Standard,
    Extended,
}

impl fmt::Display for FrameType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FrameType::Standard => write!(f, "Standard"),
            FrameType::Extended => write!(f, "Extended"),
        }
    }
}

/// Data or remote request
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FrameSubtype {
    Data,
    Remote,
}

impl fmt::Display for FrameSubtype {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FrameSubtype::Data => write!(f, "Data"),
            FrameSubtype::Remote => write!(f, "Remote"),
        }
    }
}

/// Control, data, CRC and trailer fields shared by both frame formats
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FrameBody {
    /// Data length code, 4 bits
    pub dlc: Vec<Bit>,
    /// Data field, `min(DLC, 8) * 8` bits (empty for remote frames)
    pub data: Vec<Bit>,
    /// CRC sequence, 15 bits
    pub crc: Vec<Bit>,
    pub crc_del: Bit,
    pub ack: Bit,
    pub ack_del: Bit,
    /// End of frame, 7 bits
    pub eof: Vec<Bit>,
    /// Inter-frame space, 3 bits
    pub ifs: Vec<Bit>,
}

/// Frame with an 11-bit identifier
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StandardFrame {
    pub sof: Bit,
    /// Identifier, 11 bits
    pub id: Vec<Bit>,
    pub rtr: Bit,
    pub ide: Bit,
    pub r0: Bit,
    pub body: FrameBody,
    /// Bit positions the frame occupied in the decoded stream
    pub bit_range: Range<usize>,
}

/// Frame with a 29-bit identifier
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExtendedFrame {
    pub sof: Bit,
    /// Base identifier, 11 bits
    pub base_id: Vec<Bit>,
    /// Substitute remote request (the standard frame's RTR slot)
    pub srr: Bit,
    pub ide: Bit,
    /// Identifier extension, 18 bits
    pub ext_id: Vec<Bit>,
    pub rtr: Bit,
    pub r1: Bit,
    pub r0: Bit,
    pub body: FrameBody,
    /// Bit positions the frame occupied in the decoded stream
    pub bit_range: Range<usize>,
}

/// A decoded CAN frame
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "format")]
pub enum CanFrame {
    Standard(StandardFrame),
    Extended(ExtendedFrame),
}

/// Value of a single named field
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FieldValue {
    Bit(Bit),
    Bits(Vec<Bit>),
}

impl FieldValue {
    /// Bits of the field, MSB first
    pub fn bits(&self) -> &[Bit] {
        match self {
            FieldValue::Bit(bit) => std::slice::from_ref(bit),
            FieldValue::Bits(bits) => bits,
        }
    }

    /// Field value as an unsigned integer (fields longer than 32 bits keep
    /// only their low 32 bits)
    pub fn value(&self) -> u32 {
        bits_to_u32(self.bits())
    }

    /// Hex label, e.g. `0x650`; empty fields render as `0x0`
    pub fn to_hex(&self) -> String {
        let bits = self.bits();
        if bits.len() <= 32 {
            return format!("{:#x}", bits_to_u32(bits));
        }
        // Wide fields (the data field) are rendered nibble by nibble.
        let lead = bits.len() % 4;
        let mut out = String::from("0x");
        let mut first = true;
        let mut push_nibble = |chunk: &[Bit]| {
            let nibble = bits_to_u32(chunk);
            if first && nibble == 0 {
                return;
            }
            first = false;
            out.push_str(&format!("{:x}", nibble));
        };
        if lead > 0 {
            push_nibble(&bits[..lead]);
        }
        for chunk in bits[lead..].chunks(4) {
            push_nibble(chunk);
        }
        if first {
            out.push('0');
        }
        out
    }
}

impl fmt::Display for FieldValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for bit in self.bits() {
            write!(f, "{}", bit)?;
        }
        Ok(())
    }
}

/// A named frame field, as labelled on a timeline
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Field {
    pub name: &'static str,
    pub value: FieldValue,
}

impl Field {
    fn bit(name: &'static str, bit: Bit) -> Self {
        Self { name, value: FieldValue::Bit(bit) }
    }

    fn bits(name: &'static str, bits: &[Bit]) -> Self {
        Self { name, value: FieldValue::Bits(bits.to_vec()) }
    }
}

/// Deviation from the fixed bit patterns of a CAN frame
///
/// Never fatal: the frame is still reported with its observed bits.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, thiserror::Error)]
pub enum ProtocolViolation {
    #[error("start of frame is recessive")]
    SofNotDominant,

    #[error("CRC delimiter is dominant")]
    CrcDelimiter,

    #[error("ACK slot is recessive (no receiver acknowledged)")]
    NotAcknowledged,

    #[error("ACK delimiter is dominant")]
    AckDelimiter,

    #[error("end of frame is not all recessive: {0:?}")]
    EndOfFrame(Vec<Bit>),

    #[error("inter-frame space is not all recessive: {0:?}")]
    InterFrameSpace(Vec<Bit>),

    #[error("CRC mismatch: transmitted 0x{transmitted:04X}, computed 0x{computed:04X}")]
    CrcMismatch { transmitted: u16, computed: u16 },
}

impl CanFrame {
    pub fn frame_type(&self) -> FrameType {
        match self {
            CanFrame::Standard(_) => FrameType::Standard,
            CanFrame::Extended(_) => FrameType::Extended,
        }
    }

    /// Remote when the effective RTR bit is recessive
    pub fn subtype(&self) -> FrameSubtype {
        let rtr = match self {
            CanFrame::Standard(frame) => frame.rtr,
            CanFrame::Extended(frame) => frame.rtr,
        };
        if rtr == 1 {
            FrameSubtype::Remote
        } else {
            FrameSubtype::Data
        }
    }

    pub fn is_remote(&self) -> bool {
        self.subtype() == FrameSubtype::Remote
    }

    pub fn body(&self) -> &FrameBody {
        match self {
            CanFrame::Standard(frame) => &frame.body,
            CanFrame::Extended(frame) => &frame.body,
        }
    }

    pub fn bit_range(&self) -> Range<usize> {
        match self {
            CanFrame::Standard(frame) => frame.bit_range.clone(),
            CanFrame::Extended(frame) => frame.bit_range.clone(),
        }
    }

    /// Identifier: 11 bits for standard frames, `base << 18 | ext` for extended
    pub fn id(&self) -> u32 {
        match self {
            CanFrame::Standard(frame) => bits_to_u32(&frame.id),
            CanFrame::Extended(frame) => {
                (bits_to_u32(&frame.base_id) << 18) | bits_to_u32(&frame.ext_id)
            }
        }
    }

    /// Data length code as transmitted (values above 8 are kept literally)
    pub fn dlc(&self) -> u8 {
        bits_to_u32(&self.body().dlc) as u8
    }

    /// Data field packed MSB first into bytes
    pub fn data_bytes(&self) -> Vec<u8> {
        self.body()
            .data
            .chunks(8)
            .map(|byte| bits_to_u32(byte) as u8)
            .collect()
    }

    /// Transmitted CRC field
    pub fn crc(&self) -> u16 {
        bits_to_u32(&self.body().crc) as u16
    }

    /// Bits covered by the CRC: SOF through the end of the data field
    pub fn crc_coverage(&self) -> Vec<Bit> {
        let mut bits = Vec::with_capacity(128);
        match self {
            CanFrame::Standard(frame) => {
                bits.push(frame.sof);
                bits.extend_from_slice(&frame.id);
                bits.extend([frame.rtr, frame.ide, frame.r0]);
            }
            CanFrame::Extended(frame) => {
                bits.push(frame.sof);
                bits.extend_from_slice(&frame.base_id);
                bits.extend([frame.srr, frame.ide]);
                bits.extend_from_slice(&frame.ext_id);
                bits.extend([frame.rtr, frame.r1, frame.r0]);
            }
        }
        let body = self.body();
        bits.extend_from_slice(&body.dlc);
        bits.extend_from_slice(&body.data);
        bits
    }

    /// CRC-15 recomputed over the received bits
    pub fn computed_crc(&self) -> u16 {
        crc15(&self.crc_coverage())
    }

    pub fn crc_ok(&self) -> bool {
        self.computed_crc() == self.crc()
    }

    /// All fixed-pattern deviations and CRC failures of this frame
    pub fn violations(&self) -> Vec<ProtocolViolation> {
        let mut violations = Vec::new();
        let sof = match self {
            CanFrame::Standard(frame) => frame.sof,
            CanFrame::Extended(frame) => frame.sof,
        };
        if sof != 0 {
            violations.push(ProtocolViolation::SofNotDominant);
        }

        let body = self.body();
        if !self.crc_ok() {
            violations.push(ProtocolViolation::CrcMismatch {
                transmitted: self.crc(),
                computed: self.computed_crc(),
            });
        }
        if body.crc_del != 1 {
            violations.push(ProtocolViolation::CrcDelimiter);
        }
        if body.ack != 0 {
            violations.push(ProtocolViolation::NotAcknowledged);
        }
        if body.ack_del != 1 {
            violations.push(ProtocolViolation::AckDelimiter);
        }
        if body.eof.iter().any(|&bit| bit != 1) {
            violations.push(ProtocolViolation::EndOfFrame(body.eof.clone()));
        }
        if body.ifs.iter().any(|&bit| bit != 1) {
            violations.push(ProtocolViolation::InterFrameSpace(body.ifs.clone()));
        }
        violations
    }

    /// Field-name view in wire order
    ///
    /// Standard frames use `ID`; extended frames use `BASE ID`, `SRR` and
    /// `EXT ID`. `Data` is omitted for remote frames.
    pub fn fields(&self) -> Vec<Field> {
        let mut fields = Vec::with_capacity(16);
        match self {
            CanFrame::Standard(frame) => {
                fields.push(Field::bit("SOF", frame.sof));
                fields.push(Field::bits("ID", &frame.id));
                fields.push(Field::bit("RTR", frame.rtr));
                fields.push(Field::bit("IDE", frame.ide));
                fields.push(Field::bit("r0", frame.r0));
            }
            CanFrame::Extended(frame) => {
                fields.push(Field::bit("SOF", frame.sof));
                fields.push(Field::bits("BASE ID", &frame.base_id));
                fields.push(Field::bit("SRR", frame.srr));
                fields.push(Field::bit("IDE", frame.ide));
                fields.push(Field::bits("EXT ID", &frame.ext_id));
                fields.push(Field::bit("RTR", frame.rtr));
                fields.push(Field::bit("r1", frame.r1));
                fields.push(Field::bit("r0", frame.r0));
            }
        }

        let body = self.body();
        fields.push(Field::bits("DLC", &body.dlc));
        if !self.is_remote() {
            fields.push(Field::bits("Data", &body.data));
        }
        fields.push(Field::bits("CRC", &body.crc));
        fields.push(Field::bit("CRC_DEL", body.crc_del));
        fields.push(Field::bit("ACK", body.ack));
        fields.push(Field::bit("ACK_DEL", body.ack_del));
        fields.push(Field::bits("EOF", &body.eof));
        fields.push(Field::bits("IFS", &body.ifs));
        fields
    }

    /// Look up one field of the name view
    pub fn field(&self, name: &str) -> Option<FieldValue> {
        self.fields()
            .into_iter()
            .find(|field| field.name == name)
            .map(|field| field.value)
    }
}

impl fmt::Display for CanFrame {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let width = match self.frame_type() {
            FrameType::Standard => 3,
            FrameType::Extended => 8,
        };
        write!(
            f,
            "{} {} 0x{:0width$X} [{}]",
            self.frame_type(),
            self.subtype(),
            self.id(),
            self.dlc(),
            width = width
        )?;
        for byte in self.data_bytes() {
            write!(f, " {:02X}", byte)?;
        }
        Ok(())
    }
}
