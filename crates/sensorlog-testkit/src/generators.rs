//! Proptest generators for property-based testing.

use proptest::prelude::*;

use sensorlog_core::{Identity, PhysicalQuantity, SeqRange};

/// A reading value. Comfortably inside the codec's 32-byte limit.
pub fn value() -> impl Strategy<Value = i64> {
    -1_000_000_000i64..=1_000_000_000
}

/// Between 1 and `max_len` reading values.
pub fn values(max_len: usize) -> impl Strategy<Value = Vec<i64>> {
    prop::collection::vec(value(), 1..=max_len.max(1))
}

/// A 32-byte key seed.
pub fn seed() -> impl Strategy<Value = [u8; 32]> {
    any::<[u8; 32]>()
}

pub fn identity() -> impl Strategy<Value = Identity> {
    seed().prop_map(|seed| Identity::from_seed(&seed))
}

/// A sequence number.
pub fn seq() -> impl Strategy<Value = u64> {
    any::<u64>()
}

/// Any 32-byte block.
pub fn block() -> impl Strategy<Value = [u8; 32]> {
    any::<[u8; 32]>()
}

pub fn quantity() -> impl Strategy<Value = PhysicalQuantity> {
    prop_oneof![
        Just(PhysicalQuantity::Temperature),
        Just(PhysicalQuantity::Humidity),
    ]
}

/// A range of at most `max_len` sequence numbers starting below 1024.
pub fn seq_range(max_len: u64) -> impl Strategy<Value = SeqRange> {
    (0u64..1024, 0..=max_len).prop_map(|(start, len)| SeqRange::with_len(start, len))
}
