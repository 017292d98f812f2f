//! Small shared types.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Size in bytes of every entry payload.
pub const BLOCK_LEN: usize = 32;

/// A fixed 32-byte payload block, plaintext or ciphertext.
pub type Block = [u8; BLOCK_LEN];

/// A half-open range of sequence numbers `[start, end)`.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SeqRange {
    /// First sequence number covered.
    pub start: u64,
    /// One past the last sequence number covered.
    pub end: u64,
}

impl SeqRange {
    /// Create a new range. `end < start` yields an empty range at `start`.
    pub const fn new(start: u64, end: u64) -> Self {
        if end < start {
            Self { start, end: start }
        } else {
            Self { start, end }
        }
    }

    /// A range covering `len` sequence numbers from `start`, saturating at `u64::MAX`.
    pub const fn with_len(start: u64, len: u64) -> Self {
        Self {
            start,
            end: start.saturating_add(len),
        }
    }

    /// Number of sequence numbers covered.
    pub const fn len(&self) -> u64 {
        self.end - self.start
    }

    pub const fn is_empty(&self) -> bool {
        self.end == self.start
    }

    pub const fn contains(&self, seq: u64) -> bool {
        seq >= self.start && seq < self.end
    }

    /// The smallest range covering both.
    pub fn union(&self, other: &SeqRange) -> SeqRange {
        if self.is_empty() {
            return *other;
        }
        if other.is_empty() {
            return *self;
        }
        SeqRange {
            start: self.start.min(other.start),
            end: self.end.max(other.end),
        }
    }

    /// Split into consecutive chunks of at most `size` sequence numbers.
    pub fn chunks(&self, size: u64) -> impl Iterator<Item = SeqRange> + '_ {
        let size = size.max(1);
        let end = self.end;
        let mut cursor = self.start;
        std::iter::from_fn(move || {
            if cursor >= end {
                return None;
            }
            let chunk = SeqRange::new(cursor, cursor.saturating_add(size).min(end));
            cursor = chunk.end;
            Some(chunk)
        })
    }
}

impl fmt::Debug for SeqRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}, {})", self.start, self.end)
    }
}

impl fmt::Display for SeqRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}, {})", self.start, self.end)
    }
}
