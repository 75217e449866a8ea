//! Edge record ingestion
//!
//! The capture device streams fixed 8-byte records:
//!
//! | bytes | meaning |
//! |---|---|
//! | 0..3 | marker `11 00 01` or `11 01 01`; byte 1 doubles as the level |
//! | 3 | reserved |
//! | 4..8 | timestamp, little-endian `u32` ticks |
//!
//! Chunks from the transport are not aligned to records. Bytes that cannot
//! start a record are skipped one at a time; a record cut off at the end of
//! a chunk is kept and completed by the next chunk.

use crate::bits::BitReconstructor;
use crate::state::DecoderState;
use crate::types::{EdgeRecord, Ticks};
use byteorder::{ByteOrder, LittleEndian};

/// Size of one capture record in bytes
pub const RECORD_LEN: usize = 8;

/// First marker byte
pub const MARKER_PREFIX: u8 = 0x11;

/// Third marker byte
pub const MARKER_SUFFIX: u8 = 0x01;

const MARKER_LEN: usize = 3;

/// Records parsed from one chunk
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RecordScan {
    pub records: Vec<EdgeRecord>,
    /// Bytes dropped because they did not start a valid marker
    pub skipped_bytes: usize,
}

/// What applying one record did to the session
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecordOutcome {
    /// First record of the session; sets the time origin
    Origin,
    /// New level accepted; `bits` samples were appended
    Accepted { bits: usize },
    /// Same level as the previous record; dropped
    Duplicate,
    /// Timestamp earlier than the last accepted one; state untouched
    Regressed { last: Ticks, observed: Ticks },
}

/// Byte-stream scanner for capture records
#[derive(Debug, Clone, Default)]
pub struct EdgeRecordIngestor {
    pending: Vec<u8>,
}

fn is_marker(bytes: &[u8]) -> bool {
    matches!(bytes, [MARKER_PREFIX, 0x00 | 0x01, MARKER_SUFFIX])
}

fn is_marker_prefix(bytes: &[u8]) -> bool {
    match bytes {
        [] => true,
        [MARKER_PREFIX] => true,
        [MARKER_PREFIX, 0x00 | 0x01] => true,
        _ => false,
    }
}

/// Decode one complete record; the marker must already be validated
pub fn parse_record(bytes: &[u8]) -> EdgeRecord {
    EdgeRecord {
        level: bytes[1],
        timestamp: LittleEndian::read_u32(&bytes[4..RECORD_LEN]),
    }
}

impl EdgeRecordIngestor {
    pub fn new() -> Self {
        Self::default()
    }

    /// Bytes held back from previous chunks
    pub fn pending_len(&self) -> usize {
        self.pending.len()
    }

    /// Drop any held-back partial record
    pub fn clear(&mut self) {
        self.pending.clear();
    }

    /// Extract all complete records from `chunk`, prefixed by held-back bytes
    pub fn scan(&mut self, chunk: &[u8]) -> RecordScan {
        let mut buffer = std::mem::take(&mut self.pending);
        buffer.extend_from_slice(chunk);

        let mut scan = RecordScan::default();
        let mut offset = 0;
        while offset < buffer.len() {
            let rest = &buffer[offset..];
            if rest.len() < MARKER_LEN {
                if is_marker_prefix(rest) {
                    break;
                }
                scan.skipped_bytes += 1;
                offset += 1;
                continue;
            }
            if !is_marker(&rest[..MARKER_LEN]) {
                scan.skipped_bytes += 1;
                offset += 1;
                continue;
            }
            if rest.len() < RECORD_LEN {
                break;
            }
            scan.records.push(parse_record(&rest[..RECORD_LEN]));
            offset += RECORD_LEN;
        }

        if scan.skipped_bytes > 0 {
            log::trace!("Skipped {} bytes outside record markers", scan.skipped_bytes);
        }
        self.pending = buffer.split_off(offset);
        scan
    }

    /// Apply one record to the session state
    ///
    /// A record repeating the previous level is dropped. A new level first
    /// pushes a synthetic record carrying the previous level at the new
    /// timestamp, so the step history shows the hold, then quantizes the
    /// hold into bit samples. A timestamp regression leaves the state as it
    /// is; the caller decides whether to reset.
    pub fn apply(
        state: &mut DecoderState,
        reconstructor: &BitReconstructor,
        record: EdgeRecord,
    ) -> RecordOutcome {
        let Some(last) = state.last else {
            state.steps.push(record);
            state.origin = Some(record.timestamp);
            state.last = Some(record);
            return RecordOutcome::Origin;
        };

        if record.timestamp < last.timestamp {
            return RecordOutcome::Regressed {
                last: last.timestamp,
                observed: record.timestamp,
            };
        }
        if record.level == last.level {
            return RecordOutcome::Duplicate;
        }

        state.steps.push(EdgeRecord::new(last.level, record.timestamp));
        state.steps.push(record);
        let edge_index = state.steps.len() - 1;
        let bits = reconstructor.reconstruct(
            last.level,
            last.timestamp,
            record.timestamp,
            edge_index,
            &mut state.samples,
        );
        state.last = Some(record);
        RecordOutcome::Accepted { bits }
    }
}
