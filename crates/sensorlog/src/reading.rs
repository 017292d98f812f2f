//! Decrypting raw log entries into readings.
//!
//! Shared by the batch engine and the browse layer. An entry that cannot be
//! turned into a reading is classified, never read as zero.

use sensorlog_core::{
    decode, transform, Address, ChannelKey, DecodeError, EntryCategory, LogEntry, PhysicalQuantity,
};
use serde::Serialize;

/// One decrypted raw reading.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Reading {
    /// The sensor's sequence number for the entry.
    pub seq: u64,
    /// Append time, Unix seconds.
    pub timestamp: i64,
    pub quantity: PhysicalQuantity,
    pub value: i64,
}

/// Why a raw entry was left out.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SkipReason {
    /// Addressed to someone other than the collector.
    WrongReceiver,
    /// Not a reading (an aggregate or an unrecognized tag).
    NotAReading,
    /// The payload did not decrypt to a decimal integer.
    Undecodable(DecodeError),
}

/// Decrypted readings plus the number of entries skipped.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReadingSet {
    pub readings: Vec<Reading>,
    pub skipped: usize,
}

impl ReadingSet {
    pub fn values(&self) -> impl Iterator<Item = i64> + '_ {
        self.readings.iter().map(|r| r.value)
    }

    pub fn len(&self) -> usize {
        self.readings.len()
    }

    pub fn is_empty(&self) -> bool {
        self.readings.is_empty()
    }
}

/// Decrypt a sensor's raw entry addressed to `collector`.
///
/// `key` is the sensor/collector channel key. The entry's own `seq` keys
/// the cipher.
pub fn classify_raw(
    entry: &LogEntry,
    collector: &Address,
    key: &ChannelKey,
) -> Result<Reading, SkipReason> {
    if entry.receiver != *collector {
        return Err(SkipReason::WrongReceiver);
    }
    let EntryCategory::Reading(quantity) = entry.category else {
        return Err(SkipReason::NotAReading);
    };
    let plain = transform(entry.seq, key, &entry.payload);
    let value = decode(&plain).map_err(SkipReason::Undecodable)?;
    Ok(Reading {
        seq: entry.seq,
        timestamp: entry.timestamp,
        quantity,
        value,
    })
}

/// Decrypt every usable entry, counting the rest.
pub fn collect_readings<'a, I>(entries: I, collector: &Address, key: &ChannelKey) -> ReadingSet
where
    I: IntoIterator<Item = &'a LogEntry>,
{
    let mut set = ReadingSet::default();
    for entry in entries {
        match classify_raw(entry, collector, key) {
            Ok(reading) => set.readings.push(reading),
            Err(reason) => {
                tracing::warn!(
                    sender = %entry.sender,
                    seq = entry.seq,
                    ?reason,
                    "skipping raw entry"
                );
                set.skipped += 1;
            }
        }
    }
    set
}

#[cfg(test)]
mod tests {
    use super::*;
    use sensorlog_core::{derive_shared_secret, encode, seal, AggregateFunction, Identity, SeqRange};

    fn setup() -> (Identity, Identity, ChannelKey) {
        let sensor = Identity::from_seed(&[1; 32]);
        let collector = Identity::from_seed(&[2; 32]);
        let key = derive_shared_secret(&sensor, &collector.address()).unwrap();
        (sensor, collector, key)
    }

    fn raw(sensor: &Identity, to: Address, seq: u64, value: i64) -> LogEntry {
        let payload = seal(sensor, &to, seq, &encode(value)).unwrap();
        LogEntry::reading(
            sensor.address(),
            to,
            seq,
            100 + seq as i64,
            PhysicalQuantity::Temperature,
            payload,
        )
    }

    #[test]
    fn test_classify_reading() {
        let (sensor, collector, key) = setup();
        let entry = raw(&sensor, collector.address(), 4, -17);
        let reading = classify_raw(&entry, &collector.address(), &key).unwrap();
        assert_eq!(reading.value, -17);
        assert_eq!(reading.seq, 4);
        assert_eq!(reading.timestamp, 104);
    }

    #[test]
    fn test_classify_skips() {
        let (sensor, collector, key) = setup();
        let stranger = Identity::from_seed(&[3; 32]).address();

        let misaddressed = raw(&sensor, stranger, 0, 5);
        assert_eq!(
            classify_raw(&misaddressed, &collector.address(), &key),
            Err(SkipReason::WrongReceiver)
        );

        let aggregate = LogEntry::aggregate(
            sensor.address(),
            collector.address(),
            1,
            0,
            AggregateFunction::Max,
            encode(5),
            SeqRange::new(0, 1),
        );
        assert_eq!(
            classify_raw(&aggregate, &collector.address(), &key),
            Err(SkipReason::NotAReading)
        );

        // Encrypted under the wrong sequence number: decrypts to noise.
        let mut shifted = raw(&sensor, collector.address(), 2, 5);
        shifted.seq = 3;
        assert!(matches!(
            classify_raw(&shifted, &collector.address(), &key),
            Err(SkipReason::Undecodable(_))
        ));
    }

    #[test]
    fn test_collect_counts_skips() {
        let (sensor, collector, key) = setup();
        let mut entries: Vec<LogEntry> = [10, 70, 40]
            .iter()
            .enumerate()
            .map(|(i, v)| raw(&sensor, collector.address(), i as u64, *v))
            .collect();
        entries[1].payload = [0xff; 32];

        let set = collect_readings(&entries, &collector.address(), &key);
        assert_eq!(set.values().collect::<Vec<_>>(), vec![10, 40]);
        assert_eq!(set.skipped, 1);
    }
}
