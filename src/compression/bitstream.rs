//! Bit-level coding of sorted position lists.
//!
//! Values are written LSB first. `encode(value, outof)` uses the minimal
//! number of bits for a value known to lie in `0..outof`, with one bit
//! saved for the values in the middle of the range when `outof` isn't a
//! power of two. Sorted lists are coded interpolatively: the midpoint of a
//! run is coded relative to the bounds fixed by its neighbours, then each
//! half is coded recursively.

use crate::core::error::{Error, Result};
use crate::core::types::TermPos;

fn highest_order_bit(mask: TermPos) -> u32 {
    32 - mask.leading_zeros()
}

/// Number of unused codes when coding values `0..outof` in `bits` bits.
fn spare_codes(bits: u32, outof: TermPos) -> u64 {
    (1u64 << bits) - outof as u64
}

#[derive(Debug, Default)]
pub struct BitWriter {
    buf: Vec<u8>,
    acc: u64,
    n_bits: u32,
}

impl BitWriter {
    pub fn new() -> Self {
        BitWriter::default()
    }

    /// Continue after bytes already packed by the caller.
    pub fn with_prefix(buf: Vec<u8>) -> Self {
        BitWriter { buf, acc: 0, n_bits: 0 }
    }

    pub fn encode(&mut self, value: TermPos, outof: TermPos) {
        debug_assert!(value < outof);
        let mut bits = highest_order_bit(outof - 1);
        let mut value = value as u64;
        let spare = spare_codes(bits, outof);
        if spare != 0 {
            let mid_start = (outof as u64 - spare) / 2;
            if value >= mid_start + spare {
                value = (value - (mid_start + spare)) | (1u64 << (bits - 1));
            } else if value >= mid_start {
                bits -= 1;
            }
        }
        self.acc |= value << self.n_bits;
        self.n_bits += bits;
        while self.n_bits >= 8 {
            self.buf.push(self.acc as u8);
            self.acc >>= 8;
            self.n_bits -= 8;
        }
    }

    /// Code `pos[j+1..k]` given that `pos[j]` and `pos[k]` are known.
    pub fn encode_interpolative(&mut self, pos: &[TermPos], mut j: usize, k: usize) {
        while j + 1 < k {
            let mid = j + (k - j) / 2;
            let outof = pos[k] - pos[j] - (k - j) as TermPos + 1;
            let lowest = pos[j] + (mid - j) as TermPos;
            self.encode(pos[mid] - lowest, outof);
            self.encode_interpolative(pos, j, mid);
            j = mid;
        }
    }

    pub fn freeze(mut self) -> Vec<u8> {
        if self.n_bits > 0 {
            self.buf.push(self.acc as u8);
        }
        self.buf
    }
}

#[derive(Debug, Clone, Copy, Default)]
struct DiState {
    j: usize,
    k: usize,
    pos_j: TermPos,
    pos_k: TermPos,
}

impl DiState {
    fn is_next(&self) -> bool {
        self.j + 1 < self.k
    }

    fn outof(&self) -> TermPos {
        self.pos_k - self.pos_j - (self.k - self.j) as TermPos + 1
    }
}

/// Reader over any byte buffer, borrowed or owned.
#[derive(Debug, Clone)]
pub struct BitReader<B: AsRef<[u8]>> {
    buf: B,
    idx: usize,
    acc: u64,
    n_bits: u32,
    di_stack: Vec<DiState>,
    di_current: DiState,
}

impl<B: AsRef<[u8]>> BitReader<B> {
    pub fn new(buf: B) -> Self {
        BitReader {
            buf,
            idx: 0,
            acc: 0,
            n_bits: 0,
            di_stack: Vec::new(),
            di_current: DiState::default(),
        }
    }

    pub fn decode(&mut self, outof: TermPos) -> Result<TermPos> {
        let bits = highest_order_bit(outof - 1);
        let spare = spare_codes(bits, outof);
        let p = if spare != 0 {
            let mid_start = (outof as u64 - spare) / 2;
            let mut p = self.read_bits(bits - 1)?;
            if p < mid_start && self.read_bits(1)? != 0 {
                p += mid_start + spare;
            }
            p
        } else {
            self.read_bits(bits)?
        };
        if p >= outof as u64 {
            return Err(Error::corrupt("bitstream value out of range"));
        }
        Ok(p as TermPos)
    }

    pub fn read_bits(&mut self, count: u32) -> Result<u64> {
        while self.n_bits < count {
            let byte = *self.buf.as_ref().get(self.idx)
                .ok_or_else(|| Error::corrupt("bitstream ended early"))?;
            self.idx += 1;
            self.acc |= (byte as u64) << self.n_bits;
            self.n_bits += 8;
        }
        let result = self.acc & ((1u64 << count) - 1);
        self.acc >>= count;
        self.n_bits -= count;
        Ok(result)
    }

    pub fn decode_interpolative(&mut self, j: usize, k: usize, pos_j: TermPos, pos_k: TermPos) {
        self.di_stack.clear();
        self.di_current = DiState { j, k, pos_j, pos_k };
    }

    /// Next position in ascending order; after the inner positions this
    /// yields `pos_k`.
    pub fn decode_interpolative_next(&mut self) -> Result<TermPos> {
        while !self.di_stack.is_empty() || self.di_current.is_next() {
            if !self.di_current.is_next() {
                let pos_ret = self.di_current.pos_k;
                let Some(parent) = self.di_stack.pop() else { break };
                self.di_current = parent;
                self.di_current.j = (self.di_current.j + self.di_current.k) / 2;
                self.di_current.pos_j = pos_ret;
                return Ok(pos_ret);
            }
            self.di_stack.push(self.di_current);
            let cur = self.di_current;
            let mid = (cur.j + cur.k) / 2;
            let pos_mid = self.decode(cur.outof())? + cur.pos_j + (mid - cur.j) as TermPos;
            self.di_current.k = mid;
            self.di_current.pos_k = pos_mid;
        }
        Ok(self.di_current.pos_k)
    }

    /// True if only padding bits remain.
    pub fn check_all_gone(&self) -> bool {
        self.idx == self.buf.as_ref().len() && self.n_bits < 8
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn shortened_codes_for_eleven_values() {
        // 3..=7 take three bits, everything else four.
        for value in 0..11 {
            let mut wr = BitWriter::new();
            wr.encode(value, 11);
            let expected_bits = if (3..8).contains(&value) { 3 } else { 4 };
            assert_eq!(wr.n_bits, expected_bits, "value {}", value);
            let buf = wr.freeze();
            assert_eq!(BitReader::new(&buf).decode(11).unwrap(), value);
        }
    }

    #[test]
    fn interpolative_positions_come_back_in_order() {
        let pos: Vec<TermPos> = vec![1, 2, 3, 7, 20, 21, 22, 90, 91, 1000];
        let mut wr = BitWriter::new();
        wr.encode_interpolative(&pos, 0, pos.len() - 1);
        let buf = wr.freeze();

        let mut rd = BitReader::new(&buf);
        rd.decode_interpolative(0, pos.len() - 1, pos[0], pos[pos.len() - 1]);
        let mut got = vec![pos[0]];
        for _ in 1..pos.len() {
            got.push(rd.decode_interpolative_next().unwrap());
        }
        assert_eq!(got, pos);
        assert!(rd.check_all_gone());
    }

    #[test]
    fn dense_run_needs_no_bits() {
        let pos: Vec<TermPos> = (10..30).collect();
        let mut wr = BitWriter::new();
        wr.encode_interpolative(&pos, 0, pos.len() - 1);
        assert!(wr.freeze().is_empty());
    }
}
