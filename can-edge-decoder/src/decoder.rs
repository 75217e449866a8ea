//! Main decoder API
//!
//! `CanDecoder` owns one capture session and wires the pipeline stages
//! together: byte scanning, record acceptance, bit reconstruction,
//! destuffing and frame decoding. Each call completes synchronously.

use crate::bits::BitReconstructor;
use crate::config::{DecoderConfig, DestuffScope, RegressionPolicy};
use crate::destuff::destuff;
use crate::frame::CanFrame;
use crate::frame_decoder::{FrameDecode, FrameFieldDecoder, IncompleteFrame};
use crate::ingest::{EdgeRecordIngestor, RecordOutcome};
use crate::state::DecoderState;
use crate::types::{
    Bit, BitSample, DecoderError, EdgeRecord, IngestReport, Result, SessionRestart, StepTrace,
    Ticks, Timestamp,
};
use serde::Serialize;
use std::collections::VecDeque;

/// Frames and diagnostics from one decode pass
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DecodeReport {
    /// Complete frames in stream order
    pub frames: Vec<CanFrame>,
    /// Indices of removed stuff bits in the session bit sequence
    pub stuff_positions: Vec<usize>,
    /// Trailing partial frame; its bits stay in the session
    pub incomplete: Option<IncompleteFrame>,
    /// Session bits the pass ran over
    pub bit_count: usize,
    pub scope: DestuffScope,
}

impl DecodeReport {
    /// Frames carrying at least one protocol violation
    pub fn flagged_frames(&self) -> impl Iterator<Item = &CanFrame> {
        self.frames.iter().filter(|frame| !frame.violations().is_empty())
    }
}

/// The main decoder struct - one capture session
pub struct CanDecoder {
    config: DecoderConfig,
    ingestor: EdgeRecordIngestor,
    reconstructor: BitReconstructor,
    frame_decoder: FrameFieldDecoder,
    state: DecoderState,
    /// Parsed records not yet applied, held after a failed regression check
    deferred: VecDeque<EdgeRecord>,
}

impl CanDecoder {
    /// Create a decoder with the default configuration
    pub fn new() -> Self {
        Self::build(DecoderConfig::default())
    }

    /// Create a decoder with a custom configuration
    ///
    /// # Example
    /// ```
    /// use can_edge_decoder::{CanDecoder, DecoderConfig, DestuffScope};
    ///
    /// let config = DecoderConfig::new()
    ///     .with_destuff_scope(DestuffScope::WholeStream)
    ///     .with_idle_sync(true);
    /// let decoder = CanDecoder::with_config(config).unwrap();
    /// assert!(decoder.bits().is_empty());
    /// ```
    pub fn with_config(config: DecoderConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self::build(config))
    }

    fn build(config: DecoderConfig) -> Self {
        Self {
            ingestor: EdgeRecordIngestor::new(),
            reconstructor: BitReconstructor::new(&config),
            frame_decoder: FrameFieldDecoder::new().with_idle_sync(config.idle_sync),
            state: DecoderState::new(),
            deferred: VecDeque::new(),
            config,
        }
    }

    pub fn config(&self) -> &DecoderConfig {
        &self.config
    }

    /// Feed a chunk of capture bytes
    ///
    /// Chunks need not be aligned to records. Under `RegressionPolicy::Fail`
    /// a timestamp regression stops ingestion; the offending record and the
    /// rest of the chunk are kept until `restart()` or `reset()`.
    pub fn ingest(&mut self, chunk: &[u8]) -> Result<IngestReport> {
        let scan = self.ingestor.scan(chunk);
        let mut report = IngestReport {
            records: scan.records.len(),
            skipped_bytes: scan.skipped_bytes,
            ..IngestReport::default()
        };
        self.deferred.extend(scan.records);
        self.apply_deferred(&mut report)?;
        Ok(report)
    }

    fn apply_deferred(&mut self, report: &mut IngestReport) -> Result<()> {
        while let Some(record) = self.deferred.pop_front() {
            let outcome = EdgeRecordIngestor::apply(&mut self.state, &self.reconstructor, record);
            match outcome {
                RecordOutcome::Origin => report.accepted += 1,
                RecordOutcome::Accepted { bits } => {
                    report.accepted += 1;
                    report.bits_appended += bits;
                }
                RecordOutcome::Duplicate => {
                    log::trace!("Dropping duplicate record {}", record);
                    report.duplicates += 1;
                }
                RecordOutcome::Regressed { last, observed } => match self.config.regression_policy {
                    RegressionPolicy::Restart => {
                        log::warn!(
                            "Timestamp regression ({} -> {} ticks), starting a new session",
                            last,
                            observed
                        );
                        self.state.reset();
                        EdgeRecordIngestor::apply(&mut self.state, &self.reconstructor, record);
                        report.accepted += 1;
                        report.restarts.push(SessionRestart { last, observed });
                    }
                    RegressionPolicy::Fail => {
                        log::warn!("Timestamp regression ({} -> {} ticks)", last, observed);
                        self.deferred.push_front(record);
                        return Err(DecoderError::TimestampRegression { last, observed });
                    }
                },
            }
        }
        Ok(())
    }

    /// Decode every frame in the session's bit sequence
    ///
    /// The whole sequence is decoded on each call, so a frame cut off by
    /// the end of one chunk is decoded once its remaining bits arrive.
    pub fn decode(&self) -> DecodeReport {
        let bits = self.state.bits();
        let decode = match self.config.destuff_scope {
            DestuffScope::FrameBounded => self.frame_decoder.decode_line(&bits),
            DestuffScope::WholeStream => {
                let (payload, stuff_positions) = destuff(&bits);
                FrameDecode {
                    stuff_positions,
                    ..self.frame_decoder.decode(&payload)
                }
            }
        };

        for frame in &decode.frames {
            for violation in frame.violations() {
                log::debug!("{}: {}", frame, violation);
            }
        }
        log::debug!(
            "Decoded {} frames from {} bits ({} stuff bits)",
            decode.frames.len(),
            bits.len(),
            decode.stuff_positions.len()
        );

        DecodeReport {
            frames: decode.frames,
            stuff_positions: decode.stuff_positions,
            incomplete: decode.incomplete,
            bit_count: bits.len(),
            scope: self.config.destuff_scope,
        }
    }

    /// Ingest a chunk and decode the session, as one poll cycle
    pub fn process(&mut self, chunk: &[u8]) -> Result<DecodeReport> {
        self.ingest(chunk)?;
        Ok(self.decode())
    }

    /// Discard all state, including buffered bytes and held records
    pub fn reset(&mut self) {
        log::info!(
            "Resetting decoder session ({} bits discarded)",
            self.state.samples().len()
        );
        self.state.reset();
        self.ingestor.clear();
        self.deferred.clear();
    }

    /// Start a new session from the held records after a failed ingest
    ///
    /// The record that regressed becomes the origin of the new session.
    pub fn restart(&mut self) -> Result<IngestReport> {
        log::info!("Restarting decoder session with {} held records", self.deferred.len());
        let mut report = IngestReport::default();
        if let (Some(last), Some(record)) = (self.state.last_timestamp(), self.deferred.front()) {
            report.restarts.push(SessionRestart {
                last,
                observed: record.timestamp,
            });
        }
        self.state.reset();
        self.apply_deferred(&mut report)?;
        Ok(report)
    }

    pub fn bit_samples(&self) -> &[BitSample] {
        self.state.samples()
    }

    pub fn bits(&self) -> Vec<Bit> {
        self.state.bits()
    }

    /// Accepted and synthetic hold records of the session
    pub fn steps(&self) -> &[EdgeRecord] {
        self.state.steps()
    }

    pub fn step_trace(&self) -> StepTrace {
        self.state.step_trace()
    }

    pub fn last_timestamp(&self) -> Option<Ticks> {
        self.state.last_timestamp()
    }

    /// Wall-clock time the current session started
    pub fn session_started(&self) -> Timestamp {
        self.state.started_at()
    }

    /// Bytes of an incomplete record waiting for the next chunk
    pub fn pending_bytes(&self) -> usize {
        self.ingestor.pending_len()
    }

    /// Records held back by a timestamp regression
    pub fn held_records(&self) -> usize {
        self.deferred.len()
    }
}

impl Default for CanDecoder {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frame::{FrameSubtype, FrameType};
    use crate::synth::{CaptureSynth, FrameSpec};

    fn capture(config: &DecoderConfig, start: Ticks, frames: &[FrameSpec]) -> Vec<u8> {
        let mut synth = CaptureSynth::new(config).starting_at(start);
        for spec in frames {
            synth.frame(spec);
        }
        synth.finish()
    }

    #[test]
    fn test_decoder_creation() {
        let decoder = CanDecoder::new();
        assert_eq!(decoder.config(), &DecoderConfig::default());
        assert!(decoder.bits().is_empty());
        assert_eq!(decoder.last_timestamp(), None);
    }

    #[test]
    fn test_invalid_config_rejected() {
        let config = DecoderConfig::new().with_bit_period(0);
        assert!(matches!(
            CanDecoder::with_config(config),
            Err(DecoderError::InvalidConfig(_))
        ));
    }

    #[test]
    fn test_decode_standard_frame() {
        let config = DecoderConfig::default();
        let bytes = capture(&config, 1000, &[FrameSpec::standard(0x650, &[0xAB, 0xCD])]);

        let mut decoder = CanDecoder::new();
        let report = decoder.process(&bytes).unwrap();
        assert_eq!(decoder.bits().len(), 65);
        assert_eq!(report.frames.len(), 1);
        assert_eq!(report.stuff_positions, vec![13, 48]);
        assert!(report.incomplete.is_none());

        let frame = &report.frames[0];
        assert_eq!(frame.frame_type(), FrameType::Standard);
        assert_eq!(frame.subtype(), FrameSubtype::Data);
        assert_eq!(frame.id(), 0x650);
        assert_eq!(frame.data_bytes(), vec![0xAB, 0xCD]);
        assert!(frame.crc_ok());
        assert_eq!(report.flagged_frames().count(), 0);
    }

    #[test]
    fn test_regression_restarts_session() {
        let config = DecoderConfig::default();
        let mut bytes = capture(&config, 50_000, &[FrameSpec::standard(0x123, &[0x01])]);
        bytes.extend(capture(&config, 10, &[FrameSpec::standard(0x650, &[0xAB, 0xCD])]));

        let mut decoder = CanDecoder::new();
        let ingest = decoder.ingest(&bytes).unwrap();
        assert_eq!(ingest.restarts.len(), 1);
        assert_eq!(ingest.restarts[0].observed, 10);

        let report = decoder.decode();
        assert_eq!(report.frames.len(), 1);
        assert_eq!(report.frames[0].id(), 0x650);
        assert_eq!(decoder.step_trace().ticks[0], 0);
    }

    #[test]
    fn test_fail_policy_holds_records() {
        let config = DecoderConfig::new().with_regression_policy(RegressionPolicy::Fail);
        let mut bytes = capture(&config, 50_000, &[FrameSpec::standard(0x123, &[0x01])]);
        let second = capture(&config, 10, &[FrameSpec::standard(0x650, &[0xAB, 0xCD])]);
        let second_records = second.len() / crate::ingest::RECORD_LEN;
        bytes.extend(second);

        let mut decoder = CanDecoder::with_config(config).unwrap();
        let err = decoder.ingest(&bytes).unwrap_err();
        assert!(matches!(
            err,
            DecoderError::TimestampRegression { observed: 10, .. }
        ));
        assert_eq!(decoder.held_records(), second_records);
        assert_eq!(decoder.decode().frames[0].id(), 0x123);

        let report = decoder.restart().unwrap();
        assert_eq!(report.accepted, second_records);
        assert_eq!(decoder.held_records(), 0);
        assert_eq!(decoder.decode().frames[0].id(), 0x650);
    }

    #[test]
    fn test_reset_clears_everything() {
        let mut decoder = CanDecoder::new();
        let bytes = capture(decoder.config(), 0, &[FrameSpec::standard(0x650, &[0xAB])]);
        decoder.ingest(&bytes[..bytes.len() - 3]).unwrap();
        assert_eq!(decoder.pending_bytes(), 5);
        let first_session = decoder.session_started();

        decoder.reset();
        assert!(decoder.bits().is_empty());
        assert!(decoder.steps().is_empty());
        assert_eq!(decoder.pending_bytes(), 0);
        assert!(decoder.session_started() >= first_session);
        assert!(decoder.decode().frames.is_empty());
    }
}
