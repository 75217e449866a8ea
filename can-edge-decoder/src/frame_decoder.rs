//! Frame field decoding
//!
//! Walks a bit stream as a sequence of CAN frame state machines:
//! SOF, arbitration, control, data, CRC, ACK, EOF and IFS. The decoder
//! never rejects a frame for a protocol violation; it reports the bits it
//! saw. Decoding stops when the stream runs out in the middle of a frame,
//! and the partial frame is not emitted.

use crate::destuff::StuffingCursor;
use crate::frame::{CanFrame, ExtendedFrame, FrameBody, StandardFrame};
use crate::types::{bits_to_u32, Bit};
use serde::Serialize;
use std::cmp::min;

/// Maximum number of data bytes read, whatever the DLC says
pub const MAX_DATA_BYTES: usize = 8;

/// Where decoding ran out of bits
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct IncompleteFrame {
    /// Field that could not be read completely
    pub field: &'static str,
    /// Stream position of the partial frame's first bit
    pub frame_start: usize,
    /// Bits the field needed
    pub needed: usize,
    /// Stream bits left when the field started
    pub available: usize,
}

/// Result of one decode pass
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct FrameDecode {
    /// Complete frames in stream order
    pub frames: Vec<CanFrame>,
    /// Raw indices of removed stuff bits
    pub stuff_positions: Vec<usize>,
    /// Trailing partial frame, if the stream ended inside one
    pub incomplete: Option<IncompleteFrame>,
}

/// Decodes frames from a bit stream
#[derive(Debug, Clone, Copy, Default)]
pub struct FrameFieldDecoder {
    idle_sync: bool,
}

impl FrameFieldDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Skip recessive idle bits before each SOF
    pub fn with_idle_sync(mut self, enabled: bool) -> Self {
        self.idle_sync = enabled;
        self
    }

    /// Decode frames from an already destuffed payload
    pub fn decode(&self, payload: &[Bit]) -> FrameDecode {
        self.run(payload, false)
    }

    /// Decode frames from raw line bits, removing stuff bits from SOF
    /// through the CRC sequence of each frame
    pub fn decode_line(&self, raw: &[Bit]) -> FrameDecode {
        self.run(raw, true)
    }

    fn run(&self, bits: &[Bit], stuffed: bool) -> FrameDecode {
        let mut cursor = StuffingCursor::new(bits);
        let mut frames = Vec::new();
        let mut incomplete = None;

        loop {
            if self.idle_sync {
                while cursor.peek_raw() == Some(1) {
                    cursor.skip_raw();
                }
            }
            if cursor.remaining() == 0 {
                break;
            }

            match read_frame(&mut cursor, stuffed) {
                Ok(frame) => {
                    log::debug!("Decoded frame at bit {}: {}", frame.bit_range().start, frame);
                    frames.push(frame);
                }
                Err(partial) => {
                    log::trace!(
                        "Stream ends inside {} of frame at bit {} ({} of {} bits)",
                        partial.field,
                        partial.frame_start,
                        partial.available,
                        partial.needed
                    );
                    incomplete = Some(partial);
                    break;
                }
            }
        }

        FrameDecode {
            frames,
            stuff_positions: cursor.into_stuff_positions(),
            incomplete,
        }
    }
}

/// Field-by-field reader bound to one frame
struct FieldReader<'c, 'a> {
    cursor: &'c mut StuffingCursor<'a>,
    frame_start: usize,
}

impl FieldReader<'_, '_> {
    fn bits(&mut self, field: &'static str, count: usize) -> Result<Vec<Bit>, IncompleteFrame> {
        let available = self.cursor.remaining();
        self.cursor.take(count).ok_or(IncompleteFrame {
            field,
            frame_start: self.frame_start,
            needed: count,
            available,
        })
    }

    fn bit(&mut self, field: &'static str) -> Result<Bit, IncompleteFrame> {
        Ok(self.bits(field, 1)?[0])
    }
}

enum Arbitration {
    Standard {
        id: Vec<Bit>,
        rtr: Bit,
        ide: Bit,
        r0: Bit,
    },
    Extended {
        base_id: Vec<Bit>,
        srr: Bit,
        ide: Bit,
        ext_id: Vec<Bit>,
        rtr: Bit,
        r1: Bit,
        r0: Bit,
    },
}

impl Arbitration {
    fn rtr(&self) -> Bit {
        match self {
            Arbitration::Standard { rtr, .. } | Arbitration::Extended { rtr, .. } => *rtr,
        }
    }
}

fn read_frame(cursor: &mut StuffingCursor<'_>, stuffed: bool) -> Result<CanFrame, IncompleteFrame> {
    let frame_start = cursor.position();
    if stuffed {
        cursor.arm();
    }
    let mut reader = FieldReader { cursor, frame_start };

    let sof = reader.bit("SOF")?;
    let id = reader.bits("ID", 11)?;
    let rtr_or_srr = reader.bit("RTR")?;
    let ide = reader.bit("IDE")?;

    let arbitration = if ide == 1 {
        let ext_id = reader.bits("EXT ID", 18)?;
        let rtr = reader.bit("RTR")?;
        let r1 = reader.bit("r1")?;
        let r0 = reader.bit("r0")?;
        Arbitration::Extended {
            base_id: id,
            srr: rtr_or_srr,
            ide,
            ext_id,
            rtr,
            r1,
            r0,
        }
    } else {
        let r0 = reader.bit("r0")?;
        Arbitration::Standard {
            id,
            rtr: rtr_or_srr,
            ide,
            r0,
        }
    };

    let dlc = reader.bits("DLC", 4)?;
    let data_len = if arbitration.rtr() == 1 {
        0
    } else {
        min(bits_to_u32(&dlc) as usize, MAX_DATA_BYTES) * 8
    };
    let data = reader.bits("Data", data_len)?;
    let crc = reader.bits("CRC", 15)?;

    if stuffed {
        reader.cursor.disarm();
    }

    let crc_del = reader.bit("CRC_DEL")?;
    let ack = reader.bit("ACK")?;
    let ack_del = reader.bit("ACK_DEL")?;
    let eof = reader.bits("EOF", 7)?;
    let ifs = reader.bits("IFS", 3)?;
    let bit_range = frame_start..reader.cursor.position();

    let body = FrameBody {
        dlc,
        data,
        crc,
        crc_del,
        ack,
        ack_del,
        eof,
        ifs,
    };

    Ok(match arbitration {
        Arbitration::Standard { id, rtr, ide, r0 } => CanFrame::Standard(StandardFrame {
            sof,
            id,
            rtr,
            ide,
            r0,
            body,
            bit_range,
        }),
        Arbitration::Extended {
            base_id,
            srr,
            ide,
            ext_id,
            rtr,
            r1,
            r0,
        } => CanFrame::Extended(ExtendedFrame {
            sof,
            base_id,
            srr,
            ide,
            ext_id,
            rtr,
            r1,
            r0,
            body,
            bit_range,
        }),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frame::{FrameSubtype, FrameType};
    use crate::synth::FrameSpec;

    #[test]
    fn test_standard_data_frame_payload() {
        let payload = FrameSpec::standard(0x650, &[0xAB, 0xCD]).unstuffed_bits();
        assert_eq!(payload.len(), 63);

        let decoded = FrameFieldDecoder::new().decode(&payload);
        assert_eq!(decoded.frames.len(), 1);
        assert!(decoded.incomplete.is_none());
        assert!(decoded.stuff_positions.is_empty());

        let frame = &decoded.frames[0];
        assert_eq!(frame.frame_type(), FrameType::Standard);
        assert_eq!(frame.subtype(), FrameSubtype::Data);
        assert_eq!(frame.id(), 0x650);
        assert_eq!(frame.data_bytes(), vec![0xAB, 0xCD]);
        assert_eq!(frame.crc(), 0x6AFB);
        assert_eq!(frame.bit_range(), 0..63);
        assert!(frame.violations().is_empty());
    }

    #[test]
    fn test_line_bits_with_stuffing() {
        let raw = FrameSpec::standard(0x650, &[0xAB, 0xCD]).line_bits();
        assert_eq!(raw.len(), 65);

        let decoded = FrameFieldDecoder::new().decode_line(&raw);
        assert_eq!(decoded.frames.len(), 1);
        assert_eq!(decoded.stuff_positions, vec![13, 48]);
        assert_eq!(decoded.frames[0].bit_range(), 0..65);
        assert!(decoded.frames[0].crc_ok());
    }

    #[test]
    fn test_extended_and_remote_frames() {
        let mut raw = FrameSpec::extended(0x1ABC_DE12, &[0x01]).line_bits();
        raw.extend(FrameSpec::standard(0x7FF, &[]).remote().line_bits());

        let decoded = FrameFieldDecoder::new().decode_line(&raw);
        assert_eq!(decoded.frames.len(), 2);

        let extended = &decoded.frames[0];
        assert_eq!(extended.frame_type(), FrameType::Extended);
        assert_eq!(extended.subtype(), FrameSubtype::Data);
        assert_eq!(extended.id(), 0x1ABC_DE12);
        assert_eq!(extended.data_bytes(), vec![0x01]);
        assert_eq!(extended.crc(), 0x4766);

        let remote = &decoded.frames[1];
        assert_eq!(remote.frame_type(), FrameType::Standard);
        assert_eq!(remote.subtype(), FrameSubtype::Remote);
        assert_eq!(remote.id(), 0x7FF);
        assert!(remote.body().data.is_empty());
        assert_eq!(remote.crc(), 0x54EA);
        assert_eq!(remote.bit_range().start, extended.bit_range().end);
    }

    #[test]
    fn test_dlc_above_eight_reads_eight_bytes() {
        let spec = FrameSpec::standard(0x123, &[1, 2, 3, 4, 5, 6, 7, 8]).with_dlc(12);
        let decoded = FrameFieldDecoder::new().decode(&spec.unstuffed_bits());
        assert_eq!(decoded.frames.len(), 1);
        assert_eq!(decoded.frames[0].dlc(), 12);
        assert_eq!(decoded.frames[0].data_bytes(), vec![1, 2, 3, 4, 5, 6, 7, 8]);
        assert!(decoded.frames[0].crc_ok());
    }

    #[test]
    fn test_partial_trailing_frame_dropped() {
        let mut payload = FrameSpec::standard(0x100, &[0x55]).unstuffed_bits();
        let first_len = payload.len();
        let second = FrameSpec::standard(0x200, &[0x11, 0x22]).unstuffed_bits();
        payload.extend_from_slice(&second[..30]);

        let decoded = FrameFieldDecoder::new().decode(&payload);
        assert_eq!(decoded.frames.len(), 1);
        let partial = decoded.incomplete.unwrap();
        assert_eq!(partial.field, "Data");
        assert_eq!(partial.frame_start, first_len);
        assert_eq!(partial.needed, 16);
        assert_eq!(partial.available, 11);
    }

    #[test]
    fn test_malformed_trailer_is_reported_not_rejected() {
        let mut payload = FrameSpec::standard(0x0F0, &[0xFF]).unstuffed_bits();
        let len = payload.len();
        // ACK_DEL and one EOF bit forced dominant
        payload[len - 11] = 0;
        payload[len - 6] = 0;

        let decoded = FrameFieldDecoder::new().decode(&payload);
        assert_eq!(decoded.frames.len(), 1);
        let frame = &decoded.frames[0];
        assert_eq!(frame.body().ack_del, 0);
        assert_eq!(frame.body().eof, vec![1, 1, 1, 1, 0, 1, 1]);
        assert_eq!(frame.violations().len(), 2);
    }

    #[test]
    fn test_idle_sync_skips_recessive_gap() {
        let mut raw = vec![1; 9];
        raw.extend(FrameSpec::standard(0x321, &[0x42]).line_bits());
        raw.extend(vec![1; 4]);
        raw.extend(FrameSpec::standard(0x322, &[0x43]).line_bits());

        let decoded = FrameFieldDecoder::new().with_idle_sync(true).decode_line(&raw);
        assert_eq!(decoded.frames.len(), 2);
        assert_eq!(decoded.frames[0].bit_range().start, 9);
        assert_eq!(decoded.frames[1].id(), 0x322);
        assert!(decoded.incomplete.is_none());

        // Without idle sync the leading recessive bit is taken as SOF
        let unsynced = FrameFieldDecoder::new().decode_line(&raw);
        assert!(unsynced.frames.first().map_or(true, |f| f.id() != 0x321));
    }

    #[test]
    fn test_empty_stream() {
        let decoded = FrameFieldDecoder::new().decode(&[]);
        assert!(decoded.frames.is_empty());
        assert!(decoded.incomplete.is_none());
    }
}
