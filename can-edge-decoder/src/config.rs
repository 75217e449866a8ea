//! Decoder configuration types
//!
//! This module defines the timing constants and policy switches of a decode
//! session. Defaults match the capture device: 20 ticks per CAN bit with an
//! 8 tick jitter margin, inverted line wiring.

use crate::types::{Bit, DecoderError, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

/// Nominal CAN bit period in device ticks
pub const DEFAULT_BIT_PERIOD_TICKS: u32 = 20;

/// Jitter margin absorbed when quantizing hold durations
pub const DEFAULT_JITTER_OFFSET_TICKS: u32 = 8;

/// Configuration for a decode session
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DecoderConfig {
    /// Nominal bit period in ticks (default: 20)
    #[serde(default = "default_bit_period")]
    pub bit_period_ticks: u32,

    /// Hold durations at or below this margin produce no further bit (default: 8)
    #[serde(default = "default_jitter_offset")]
    pub jitter_offset_ticks: u32,

    /// Mapping between electrical line level and logical bit value
    #[serde(default)]
    pub polarity: LinePolarity,

    /// Which part of the bit stream bit-stuffing is removed from
    #[serde(default)]
    pub destuff_scope: DestuffScope,

    /// What `ingest` does when a record's timestamp goes backwards
    #[serde(default)]
    pub regression_policy: RegressionPolicy,

    /// Skip recessive bus-idle bits before looking for a start-of-frame
    #[serde(default)]
    pub idle_sync: bool,
}

fn default_bit_period() -> u32 {
    DEFAULT_BIT_PERIOD_TICKS
}

fn default_jitter_offset() -> u32 {
    DEFAULT_JITTER_OFFSET_TICKS
}

impl Default for DecoderConfig {
    fn default() -> Self {
        Self {
            bit_period_ticks: DEFAULT_BIT_PERIOD_TICKS,
            jitter_offset_ticks: DEFAULT_JITTER_OFFSET_TICKS,
            polarity: LinePolarity::default(),
            destuff_scope: DestuffScope::default(),
            regression_policy: RegressionPolicy::default(),
            idle_sync: false,
        }
    }
}

/// Line wiring convention of the capture device
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LinePolarity {
    /// Logical bit is the complement of the held electrical level
    #[default]
    Inverted,
    /// Logical bit equals the held electrical level
    Direct,
}

impl LinePolarity {
    /// Logical bit carried by a held electrical level
    pub fn bit_for_level(self, level: u8) -> Bit {
        match self {
            LinePolarity::Inverted => 1 - (level & 1),
            LinePolarity::Direct => level & 1,
        }
    }

    /// Electrical level that transmits a logical bit
    pub fn level_for_bit(self, bit: Bit) -> u8 {
        // The mapping is an involution for both conventions.
        self.bit_for_level(bit)
    }
}

/// Range of the bit stream that stuff bits are removed from
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DestuffScope {
    /// Per frame, from SOF through the last CRC bit (ISO 11898-1)
    #[default]
    FrameBounded,
    /// Across the whole accumulated stream, including ACK/EOF/IFS
    WholeStream,
}

/// Handling of a record whose timestamp precedes the last accepted one
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RegressionPolicy {
    /// Discard the session and continue as a new capture
    #[default]
    Restart,
    /// Stop ingesting and return `DecoderError::TimestampRegression`
    Fail,
}

impl DecoderConfig {
    /// Create a new decoder configuration with default settings
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse a configuration from TOML text
    pub fn from_toml_str(content: &str) -> Result<Self> {
        let config: DecoderConfig =
            toml::from_str(content).map_err(|e| DecoderError::ConfigParse(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Load a configuration from a TOML file
    pub fn load(path: &Path) -> Result<Self> {
        log::info!("Loading decoder configuration: {:?}", path);
        let content = fs::read_to_string(path)?;
        Self::from_toml_str(&content)
    }

    /// Builder method: set the nominal bit period
    pub fn with_bit_period(mut self, ticks: u32) -> Self {
        self.bit_period_ticks = ticks;
        self
    }

    /// Builder method: set the jitter margin
    pub fn with_jitter_offset(mut self, ticks: u32) -> Self {
        self.jitter_offset_ticks = ticks;
        self
    }

    /// Builder method: set the line polarity
    pub fn with_polarity(mut self, polarity: LinePolarity) -> Self {
        self.polarity = polarity;
        self
    }

    /// Builder method: set the destuffing scope
    pub fn with_destuff_scope(mut self, scope: DestuffScope) -> Self {
        self.destuff_scope = scope;
        self
    }

    /// Builder method: set the timestamp regression policy
    pub fn with_regression_policy(mut self, policy: RegressionPolicy) -> Self {
        self.regression_policy = policy;
        self
    }

    /// Builder method: enable or disable idle skipping before SOF
    pub fn with_idle_sync(mut self, enabled: bool) -> Self {
        self.idle_sync = enabled;
        self
    }

    /// Check that the timing constants can quantize a hold
    pub fn validate(&self) -> Result<()> {
        if self.bit_period_ticks == 0 {
            return Err(DecoderError::InvalidConfig(
                "bit_period_ticks must be greater than zero".to_string(),
            ));
        }
        if self.jitter_offset_ticks >= self.bit_period_ticks {
            return Err(DecoderError::InvalidConfig(format!(
                "jitter_offset_ticks ({}) must be smaller than bit_period_ticks ({})",
                self.jitter_offset_ticks, self.bit_period_ticks
            )));
        }
        Ok(())
    }
}
