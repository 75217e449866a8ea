//! Per-session decoder state
//!
//! Owned by one `CanDecoder`; there is no process-wide state. A reset clears
//! everything and stamps a new session start time.

use crate::types::{Bit, BitSample, EdgeRecord, StepTrace, Ticks, Timestamp};
use chrono::Utc;

/// Accumulated history of one capture session
#[derive(Debug, Clone)]
pub struct DecoderState {
    /// Accepted records interleaved with synthetic hold records
    pub(crate) steps: Vec<EdgeRecord>,
    /// One sample per elapsed bit period
    pub(crate) samples: Vec<BitSample>,
    /// Last accepted (non-synthetic) record
    pub(crate) last: Option<EdgeRecord>,
    /// Timestamp of the first record of the session
    pub(crate) origin: Option<Ticks>,
    started_at: Timestamp,
}

impl DecoderState {
    pub fn new() -> Self {
        Self {
            steps: Vec::new(),
            samples: Vec::new(),
            last: None,
            origin: None,
            started_at: Utc::now(),
        }
    }

    /// Discard all history and start a new session
    pub fn reset(&mut self) {
        self.steps.clear();
        self.samples.clear();
        self.last = None;
        self.origin = None;
        self.started_at = Utc::now();
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    pub fn steps(&self) -> &[EdgeRecord] {
        &self.steps
    }

    pub fn samples(&self) -> &[BitSample] {
        &self.samples
    }

    /// Bit values of all samples
    pub fn bits(&self) -> Vec<Bit> {
        self.samples.iter().map(|sample| sample.value).collect()
    }

    pub fn last_timestamp(&self) -> Option<Ticks> {
        self.last.map(|record| record.timestamp)
    }

    pub fn last_level(&self) -> Option<u8> {
        self.last.map(|record| record.level)
    }

    /// Ticks between the first and the last accepted record
    pub fn elapsed_ticks(&self) -> Ticks {
        match (self.origin, self.last_timestamp()) {
            (Some(origin), Some(last)) => last - origin,
            _ => 0,
        }
    }

    pub fn started_at(&self) -> Timestamp {
        self.started_at
    }

    /// Level/tick arrays for a stepped plot, ticks relative to the origin
    pub fn step_trace(&self) -> StepTrace {
        let origin = self.origin.unwrap_or(0);
        StepTrace {
            levels: self.steps.iter().map(|step| step.level).collect(),
            ticks: self.steps.iter().map(|step| step.timestamp - origin).collect(),
        }
    }
}

impl Default for DecoderState {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reset_clears_history() {
        let mut state = DecoderState::new();
        state.steps.push(EdgeRecord::new(1, 500));
        state.samples.push(BitSample { value: 0, edge_index: 0 });
        state.last = Some(EdgeRecord::new(1, 500));
        state.origin = Some(500);
        let first_start = state.started_at();

        state.reset();
        assert!(state.is_empty());
        assert!(state.samples().is_empty());
        assert_eq!(state.last_timestamp(), None);
        assert_eq!(state.elapsed_ticks(), 0);
        assert!(state.started_at() >= first_start);
    }

    #[test]
    fn test_step_trace_relative_ticks() {
        let mut state = DecoderState::new();
        state.steps = vec![
            EdgeRecord::new(1, 1000),
            EdgeRecord::new(1, 1040),
            EdgeRecord::new(0, 1040),
        ];
        state.origin = Some(1000);
        state.last = Some(EdgeRecord::new(0, 1040));

        let trace = state.step_trace();
        assert_eq!(trace.levels, vec![1, 1, 0]);
        assert_eq!(trace.ticks, vec![0, 40, 40]);
        assert_eq!(state.elapsed_ticks(), 40);
    }
}
