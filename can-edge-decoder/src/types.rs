//! Core types for the CAN edge decoder library
//!
//! This module defines the fundamental values that flow through the decode
//! pipeline: edge records parsed from the capture stream, the quantized bit
//! samples reconstructed from them, and the reports handed back to callers.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Wall-clock timestamp type used for session bookkeeping
pub type Timestamp = DateTime<Utc>;

/// Result type for decoder operations
pub type Result<T> = std::result::Result<T, DecoderError>;

/// A single logical bit value (0 = dominant, 1 = recessive)
pub type Bit = u8;

/// Device tick count carried in every capture record
pub type Ticks = u32;

/// One logic-level report from the capture device
///
/// Produced by parsing a fixed 8-byte record from the capture stream. Ticks
/// are monotonic within one capture session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct EdgeRecord {
    /// Electrical line level (0 or 1)
    pub level: u8,
    /// Device tick count at which the level was reported
    pub timestamp: Ticks,
}

impl EdgeRecord {
    /// Create a new edge record
    pub fn new(level: u8, timestamp: Ticks) -> Self {
        Self { level, timestamp }
    }
}

impl fmt::Display for EdgeRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "L{}@{}", self.level, self.timestamp)
    }
}

/// One decoded logic bit covering exactly one nominal bit period
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BitSample {
    /// Logical bit value
    pub value: Bit,
    /// Index into the session step history of the record that closed the
    /// hold this bit was quantized from
    pub edge_index: usize,
}

/// Paired level/tick arrays suitable for a stepped (`where='post'`) plot
///
/// Contains every accepted record plus the synthetic intermediate records
/// that materialize each level hold. Ticks are relative to the first record
/// of the session.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StepTrace {
    pub levels: Vec<u8>,
    pub ticks: Vec<Ticks>,
}

impl StepTrace {
    pub fn len(&self) -> usize {
        self.levels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.levels.is_empty()
    }
}

/// A timestamp regression that restarted the decode session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionRestart {
    /// Last accepted timestamp of the discarded session
    pub last: Ticks,
    /// Timestamp of the record that started the new session
    pub observed: Ticks,
}

/// Summary of one `ingest` call
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct IngestReport {
    /// Complete records found in the byte stream
    pub records: usize,
    /// Records that carried a new level and were applied
    pub accepted: usize,
    /// Records dropped because they repeated the previous level
    pub duplicates: usize,
    /// Bytes skipped while searching for a record marker
    pub skipped_bytes: usize,
    /// Bit samples appended to the session
    pub bits_appended: usize,
    /// Session restarts caused by timestamp regressions
    pub restarts: Vec<SessionRestart>,
}

impl IngestReport {
    /// Fold another report into this one
    pub fn merge(&mut self, other: IngestReport) {
        self.records += other.records;
        self.accepted += other.accepted;
        self.duplicates += other.duplicates;
        self.skipped_bytes += other.skipped_bytes;
        self.bits_appended += other.bits_appended;
        self.restarts.extend(other.restarts);
    }
}

/// Errors that can occur while configuring or feeding the decoder
#[derive(Debug, thiserror::Error)]
pub enum DecoderError {
    #[error("Timestamp regression: {observed} ticks after {last} ticks")]
    TimestampRegression { last: Ticks, observed: Ticks },

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Failed to parse configuration: {0}")]
    ConfigParse(String),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),
}

/// Pack a slice of bits into an unsigned integer, MSB first
pub fn bits_to_u32(bits: &[Bit]) -> u32 {
    bits.iter().fold(0u32, |acc, &bit| (acc << 1) | u32::from(bit & 1))
}

/// Unpack the low `width` bits of `value` into a bit vector, MSB first
pub fn u32_to_bits(value: u32, width: usize) -> Vec<Bit> {
    (0..width)
        .rev()
        .map(|shift| ((value >> shift) & 1) as Bit)
        .collect()
}
