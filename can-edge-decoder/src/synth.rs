//! Capture synthesis
//!
//! Builds byte streams in the capture device's record format from frame
//! descriptions: frame bits with CRC, bit stuffing over SOF..CRC, level
//! holds at the nominal bit period, and 8-byte edge records. Used to
//! exercise the decoder without hardware.

use crate::config::{DecoderConfig, LinePolarity};
use crate::crc::crc15;
use crate::destuff::stuff;
use crate::ingest::{MARKER_PREFIX, MARKER_SUFFIX, RECORD_LEN};
use crate::types::{u32_to_bits, Bit, EdgeRecord, Ticks};
use byteorder::{ByteOrder, LittleEndian};

/// Description of one frame to synthesize
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FrameSpec {
    /// 11-bit or 29-bit identifier
    pub id: u32,
    pub extended: bool,
    pub remote: bool,
    /// Transmitted DLC; may exceed 8
    pub dlc: u8,
    pub data: Vec<u8>,
    /// ACK slot value (0 = acknowledged)
    pub ack: Bit,
}

impl FrameSpec {
    /// Standard data frame with DLC equal to the data length
    pub fn standard(id: u32, data: &[u8]) -> Self {
        Self {
            id: id & 0x7FF,
            extended: false,
            remote: false,
            dlc: data.len() as u8,
            data: data.to_vec(),
            ack: 0,
        }
    }

    /// Extended data frame with DLC equal to the data length
    pub fn extended(id: u32, data: &[u8]) -> Self {
        Self {
            id: id & 0x1FFF_FFFF,
            extended: true,
            ..Self::standard(0, data)
        }
    }

    /// Turn into a remote request; the DLC is kept, data is dropped
    pub fn remote(mut self) -> Self {
        self.remote = true;
        self.data.clear();
        self
    }

    pub fn with_dlc(mut self, dlc: u8) -> Self {
        self.dlc = dlc & 0x0F;
        self
    }

    /// Leave the ACK slot recessive
    pub fn unacknowledged(mut self) -> Self {
        self.ack = 1;
        self
    }

    /// SOF through the end of the data field
    fn crc_coverage(&self) -> Vec<Bit> {
        let mut bits = vec![0];
        let rtr = Bit::from(self.remote);
        if self.extended {
            bits.extend(u32_to_bits(self.id >> 18, 11));
            bits.extend([1, 1]);
            bits.extend(u32_to_bits(self.id & 0x3FFFF, 18));
            bits.extend([rtr, 0, 0]);
        } else {
            bits.extend(u32_to_bits(self.id, 11));
            bits.extend([rtr, 0, 0]);
        }
        bits.extend(u32_to_bits(u32::from(self.dlc), 4));
        if !self.remote {
            let len = usize::from(self.dlc).min(8);
            for index in 0..len {
                let byte = self.data.get(index).copied().unwrap_or(0);
                bits.extend(u32_to_bits(u32::from(byte), 8));
            }
        }
        bits
    }

    fn stuffed_region(&self) -> Vec<Bit> {
        let mut bits = self.crc_coverage();
        let crc = crc15(&bits);
        bits.extend(u32_to_bits(u32::from(crc), 15));
        bits
    }

    fn trailer(&self) -> Vec<Bit> {
        let mut bits = vec![1, self.ack, 1];
        bits.extend([1; 7]);
        bits.extend([1; 3]);
        bits
    }

    /// Frame bits as a receiver sees them after destuffing
    pub fn unstuffed_bits(&self) -> Vec<Bit> {
        let mut bits = self.stuffed_region();
        bits.extend(self.trailer());
        bits
    }

    /// Frame bits as transmitted on the line
    pub fn line_bits(&self) -> Vec<Bit> {
        let mut bits = stuff(&self.stuffed_region());
        bits.extend(self.trailer());
        bits
    }
}

/// Accumulates line bits and renders them as capture records
#[derive(Debug, Clone)]
pub struct CaptureSynth {
    bit_period: Ticks,
    polarity: LinePolarity,
    start: Ticks,
    bits: Vec<Bit>,
}

impl CaptureSynth {
    pub fn new(config: &DecoderConfig) -> Self {
        Self {
            bit_period: config.bit_period_ticks,
            polarity: config.polarity,
            start: 0,
            bits: Vec::new(),
        }
    }

    /// Tick of the first record
    pub fn starting_at(mut self, tick: Ticks) -> Self {
        self.start = tick;
        self
    }

    pub fn frame(&mut self, spec: &FrameSpec) -> &mut Self {
        self.bits.extend(spec.line_bits());
        self
    }

    /// Append raw line bits
    pub fn bits(&mut self, bits: &[Bit]) -> &mut Self {
        self.bits.extend_from_slice(bits);
        self
    }

    /// Append recessive bus-idle bits
    pub fn idle(&mut self, count: usize) -> &mut Self {
        self.bits.extend(std::iter::repeat(1).take(count));
        self
    }

    pub fn line_bits(&self) -> &[Bit] {
        &self.bits
    }

    /// One record at the start of every run of identical bits, plus a
    /// closing record that ends the last run
    pub fn records(&self) -> Vec<EdgeRecord> {
        let mut records = Vec::new();
        let mut tick = self.start;
        let mut previous: Option<Bit> = None;

        for &bit in &self.bits {
            if previous != Some(bit) {
                records.push(EdgeRecord::new(self.polarity.level_for_bit(bit), tick));
                previous = Some(bit);
            }
            tick += self.bit_period;
        }
        if let Some(last) = previous {
            records.push(EdgeRecord::new(self.polarity.level_for_bit(1 - last), tick));
        }
        records
    }

    /// Capture byte stream for all accumulated bits
    pub fn finish(&self) -> Vec<u8> {
        self.records().into_iter().flat_map(encode_record).collect()
    }
}

/// Serialize one record in the device format
pub fn encode_record(record: EdgeRecord) -> [u8; RECORD_LEN] {
    let mut bytes = [0u8; RECORD_LEN];
    bytes[0] = MARKER_PREFIX;
    bytes[1] = record.level & 1;
    bytes[2] = MARKER_SUFFIX;
    LittleEndian::write_u32(&mut bytes[4..8], record.timestamp);
    bytes
}
