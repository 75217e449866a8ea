//! CAN bit stuffing
//!
//! After five consecutive bits of identical value the transmitter inserts one
//! bit of the opposite value. The inserted bit counts as the first bit of the
//! next run. Stuff positions are always reported in raw (line) coordinates.

use crate::types::Bit;

/// Run length that triggers a stuff bit
pub const STUFF_RUN: usize = 5;

/// Strip stuff bits from a whole bit sequence
///
/// Returns the payload and the raw indices of the removed bits. The rule is
/// applied uniformly; callers bound it to SOF..CRC where that matters.
pub fn destuff(bits: &[Bit]) -> (Vec<Bit>, Vec<usize>) {
    let mut cursor = StuffingCursor::new(bits);
    cursor.arm();
    let mut payload = Vec::with_capacity(bits.len());
    while let Some(bit) = cursor.next_bit() {
        payload.push(bit);
    }
    (payload, cursor.into_stuff_positions())
}

/// Insert stuff bits into a bit sequence (transmitter side)
pub fn stuff(bits: &[Bit]) -> Vec<Bit> {
    let mut out = Vec::with_capacity(bits.len() + bits.len() / STUFF_RUN);
    let mut run = RunTracker::default();
    for &bit in bits {
        out.push(bit);
        if run.push(bit) {
            let stuff_bit = 1 - (bit & 1);
            out.push(stuff_bit);
            run.restart(stuff_bit);
        }
    }
    out
}

#[derive(Debug, Clone, Copy, Default)]
struct RunTracker {
    value: Option<Bit>,
    len: usize,
}

impl RunTracker {
    /// Track one bit; true once the run reaches the stuff length
    fn push(&mut self, bit: Bit) -> bool {
        if self.value == Some(bit) {
            self.len += 1;
        } else {
            self.value = Some(bit);
            self.len = 1;
        }
        self.len == STUFF_RUN
    }

    fn restart(&mut self, bit: Bit) {
        self.value = Some(bit);
        self.len = 1;
    }

    fn is_complete(&self) -> bool {
        self.len == STUFF_RUN
    }
}

/// Sequential reader over a raw bit sequence with switchable destuffing
///
/// While armed, the bit following a run of five identical bits is recorded
/// as a stuff position and skipped. Disarmed, bits are passed through.
#[derive(Debug, Clone)]
pub struct StuffingCursor<'a> {
    bits: &'a [Bit],
    pos: usize,
    run: RunTracker,
    armed: bool,
    stuff_positions: Vec<usize>,
}

impl<'a> StuffingCursor<'a> {
    pub fn new(bits: &'a [Bit]) -> Self {
        Self {
            bits,
            pos: 0,
            run: RunTracker::default(),
            armed: false,
            stuff_positions: Vec::new(),
        }
    }

    /// Start destuffing with a fresh run count
    pub fn arm(&mut self) {
        self.armed = true;
        self.run = RunTracker::default();
    }

    /// Stop destuffing; following bits are read verbatim
    ///
    /// A stuff bit still owed to a completed run (the CRC may end on five
    /// identical bits) is consumed first.
    pub fn disarm(&mut self) {
        if self.armed && self.run.is_complete() && self.peek_raw().is_some() {
            self.stuff_positions.push(self.pos);
            self.pos += 1;
        }
        self.armed = false;
    }

    /// Raw index of the next bit to be read
    pub fn position(&self) -> usize {
        self.pos
    }

    /// Raw bits not yet consumed
    pub fn remaining(&self) -> usize {
        self.bits.len() - self.pos
    }

    /// Next raw bit without consuming it or applying destuffing
    pub fn peek_raw(&self) -> Option<Bit> {
        self.bits.get(self.pos).copied()
    }

    /// Consume one raw bit without destuffing
    pub fn skip_raw(&mut self) -> Option<Bit> {
        let bit = self.peek_raw()?;
        self.pos += 1;
        Some(bit)
    }

    /// Read the next logical bit
    pub fn next_bit(&mut self) -> Option<Bit> {
        if self.armed && self.run.is_complete() {
            let stuff_bit = self.peek_raw()?;
            self.stuff_positions.push(self.pos);
            self.pos += 1;
            self.run.restart(stuff_bit);
        }

        let bit = self.peek_raw()?;
        self.pos += 1;
        if self.armed {
            self.run.push(bit);
        }
        Some(bit)
    }

    /// Read `count` logical bits, or `None` if the stream ends first
    pub fn take(&mut self, count: usize) -> Option<Vec<Bit>> {
        (0..count).map(|_| self.next_bit()).collect()
    }

    pub fn stuff_positions(&self) -> &[usize] {
        &self.stuff_positions
    }

    pub fn into_stuff_positions(self) -> Vec<usize> {
        self.stuff_positions
    }
}
