//! Log entries: the immutable records of the public log.
//!
//! An entry carries a 32-byte payload (a raw reading or an aggregate value,
//! always encrypted) and a category tag telling readers how to interpret it.
//! Aggregate entries additionally carry two range markers pinning the
//! `[start, end)` source range they cover, so readers never have to re-scan
//! raw entries to learn it.

use serde::{Deserialize, Serialize};

use crate::crypto::Address;
use crate::error::{CoreError, Result};
use crate::types::{Block, SeqRange};

/// The physical quantity a raw reading measures.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[repr(u16)]
pub enum PhysicalQuantity {
    /// TEMP
    Temperature = 0x0001,
    /// HUMD
    Humidity = 0x0002,
}

impl PhysicalQuantity {
    pub const ALL: [PhysicalQuantity; 2] = [Self::Temperature, Self::Humidity];

    /// The short code used on the log.
    pub fn code(self) -> &'static str {
        match self {
            Self::Temperature => "TEMP",
            Self::Humidity => "HUMD",
        }
    }

    /// The measurement unit readings of this quantity are reported in.
    pub fn unit(self) -> &'static str {
        match self {
            Self::Temperature => "celsius",
            Self::Humidity => "percent",
        }
    }
}

/// The statistic an aggregate entry reports.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[repr(u16)]
pub enum AggregateFunction {
    Avg = 0x0100,
    Min = 0x0101,
    Max = 0x0102,
}

impl AggregateFunction {
    /// Emission order.
    pub const ALL: [AggregateFunction; 3] = [Self::Avg, Self::Min, Self::Max];

    pub fn code(self) -> &'static str {
        match self {
            Self::Avg => "AVG",
            Self::Min => "MIN",
            Self::Max => "MAX",
        }
    }
}

/// Which end of a source range a marker records.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(u16)]
pub enum RangeBound {
    Start = 0x0200,
    End = 0x0201,
}

impl RangeBound {
    pub fn to_u16(self) -> u16 {
        self as u16
    }

    pub fn from_u16(value: u16) -> Option<Self> {
        match value {
            0x0200 => Some(Self::Start),
            0x0201 => Some(Self::End),
            _ => None,
        }
    }
}

/// A range marker attached to an aggregate entry.
///
/// The boundary sequence number lives here, never inside the payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RangeMarker {
    pub bound: RangeBound,
    pub seq: u64,
}

impl RangeMarker {
    /// The `[start, end)` marker pair for a range.
    pub fn pair(range: SeqRange) -> Vec<RangeMarker> {
        vec![
            RangeMarker {
                bound: RangeBound::Start,
                seq: range.start,
            },
            RangeMarker {
                bound: RangeBound::End,
                seq: range.end,
            },
        ]
    }
}

/// What an entry's payload means.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EntryCategory {
    /// A raw sensor reading.
    Reading(PhysicalQuantity),
    /// An aggregate computed by a window reporter.
    Aggregate(AggregateFunction),
    /// A tag this build does not understand. Scans skip it.
    Unrecognized(u16),
}

impl EntryCategory {
    /// Convert to u16 for storage.
    pub fn to_u16(self) -> u16 {
        match self {
            Self::Reading(q) => q as u16,
            Self::Aggregate(f) => f as u16,
            Self::Unrecognized(tag) => tag,
        }
    }

    /// Parse from u16. Never fails; unknown tags are kept verbatim.
    pub fn from_u16(value: u16) -> Self {
        match value {
            0x0001 => Self::Reading(PhysicalQuantity::Temperature),
            0x0002 => Self::Reading(PhysicalQuantity::Humidity),
            0x0100 => Self::Aggregate(AggregateFunction::Avg),
            0x0101 => Self::Aggregate(AggregateFunction::Min),
            0x0102 => Self::Aggregate(AggregateFunction::Max),
            other => Self::Unrecognized(other),
        }
    }

    pub fn is_reading(self) -> bool {
        matches!(self, Self::Reading(_))
    }

    pub fn is_aggregate(self) -> bool {
        matches!(self, Self::Aggregate(_))
    }
}

/// One immutable record of the public log.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogEntry {
    /// The submitting account.
    pub sender: Address,

    /// The addressee. Raw readings go to the collector; aggregates go to the sensor.
    pub receiver: Address,

    /// The sender's sequence number for this entry. Keys the payload cipher.
    pub seq: u64,

    /// Append time, Unix seconds.
    pub timestamp: i64,

    /// Encrypted payload.
    pub payload: Block,

    pub category: EntryCategory,

    /// Range markers; present on aggregate entries only.
    pub markers: Vec<RangeMarker>,
}

impl LogEntry {
    /// A raw reading entry.
    pub fn reading(
        sender: Address,
        receiver: Address,
        seq: u64,
        timestamp: i64,
        quantity: PhysicalQuantity,
        payload: Block,
    ) -> Self {
        Self {
            sender,
            receiver,
            seq,
            timestamp,
            payload,
            category: EntryCategory::Reading(quantity),
            markers: Vec::new(),
        }
    }

    /// An aggregate entry covering `range`.
    pub fn aggregate(
        sender: Address,
        receiver: Address,
        seq: u64,
        timestamp: i64,
        function: AggregateFunction,
        payload: Block,
        range: SeqRange,
    ) -> Self {
        Self {
            sender,
            receiver,
            seq,
            timestamp,
            payload,
            category: EntryCategory::Aggregate(function),
            markers: RangeMarker::pair(range),
        }
    }

    /// The `[start, end)` range recorded by this entry's markers.
    pub fn source_range(&self) -> Option<SeqRange> {
        let start = self
            .markers
            .iter()
            .find(|m| m.bound == RangeBound::Start)?;
        let end = self.markers.iter().find(|m| m.bound == RangeBound::End)?;
        Some(SeqRange {
            start: start.seq,
            end: end.seq,
        })
    }

    /// Structural checks a ledger applies before accepting an entry.
    pub fn validate(&self) -> Result<()> {
        match self.category {
            EntryCategory::Aggregate(_) => {
                if self.markers.len() != 2 {
                    return Err(CoreError::MalformedEntry(format!(
                        "aggregate entry carries {} markers, expected 2",
                        self.markers.len()
                    )));
                }
                let range = self.source_range().ok_or_else(|| {
                    CoreError::MalformedEntry("aggregate entry lacks a start or end marker".into())
                })?;
                if range.end < range.start {
                    return Err(CoreError::MalformedEntry(format!(
                        "range end {} precedes start {}",
                        range.end, range.start
                    )));
                }
            }
            EntryCategory::Reading(_) | EntryCategory::Unrecognized(_) => {
                if !self.markers.is_empty() {
                    return Err(CoreError::MalformedEntry(
                        "only aggregate entries carry range markers".into(),
                    ));
                }
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn addr(b: u8) -> Address {
        Address::from_bytes([b; 32])
    }

    #[test]
    fn test_category_roundtrip() {
        let categories = PhysicalQuantity::ALL
            .iter()
            .map(|&q| EntryCategory::Reading(q))
            .chain(AggregateFunction::ALL.iter().map(|&f| EntryCategory::Aggregate(f)));
        for category in categories {
            assert_eq!(EntryCategory::from_u16(category.to_u16()), category);
        }
    }

    #[test]
    fn test_unknown_tag_preserved() {
        let category = EntryCategory::from_u16(0x7777);
        assert_eq!(category, EntryCategory::Unrecognized(0x7777));
        assert_eq!(category.to_u16(), 0x7777);
        assert!(!category.is_reading());
    }

    #[test]
    fn test_range_bound_tags() {
        assert_eq!(RangeBound::from_u16(RangeBound::Start.to_u16()), Some(RangeBound::Start));
        assert_eq!(RangeBound::from_u16(RangeBound::End.to_u16()), Some(RangeBound::End));
        assert_eq!(RangeBound::from_u16(0x0001), None);
    }

    #[test]
    fn test_aggregate_source_range() {
        let entry = LogEntry::aggregate(
            addr(1),
            addr(2),
            7,
            0,
            AggregateFunction::Avg,
            [0; 32],
            SeqRange::new(0, 3),
        );
        assert_eq!(entry.source_range(), Some(SeqRange::new(0, 3)));
        assert!(entry.validate().is_ok());
    }

    #[test]
    fn test_reading_has_no_range() {
        let entry = LogEntry::reading(addr(1), addr(2), 0, 0, PhysicalQuantity::Temperature, [0; 32]);
        assert_eq!(entry.source_range(), None);
        assert!(entry.validate().is_ok());
    }

    #[test]
    fn test_validate_rejects_bad_markers() {
        let mut entry = LogEntry::aggregate(
            addr(1),
            addr(2),
            0,
            0,
            AggregateFunction::Max,
            [0; 32],
            SeqRange::new(0, 3),
        );
        entry.markers.pop();
        assert!(entry.validate().is_err());

        let mut reading =
            LogEntry::reading(addr(1), addr(2), 0, 0, PhysicalQuantity::Humidity, [0; 32]);
        reading.markers = RangeMarker::pair(SeqRange::new(0, 1));
        assert!(reading.validate().is_err());

        let mut inverted = LogEntry::aggregate(
            addr(1),
            addr(2),
            0,
            0,
            AggregateFunction::Min,
            [0; 32],
            SeqRange::new(0, 3),
        );
        inverted.markers[1].seq = 0;
        inverted.markers[0].seq = 5;
        assert!(inverted.validate().is_err());
    }

    #[test]
    fn test_entry_json_roundtrip() {
        let entry = LogEntry::aggregate(
            addr(3),
            addr(4),
            12,
            1_600_000_000,
            AggregateFunction::Avg,
            [9; 32],
            SeqRange::new(6, 12),
        );
        let json = serde_json::to_string(&entry).unwrap();
        let back: LogEntry = serde_json::from_str(&json).unwrap();
        assert_eq!(back, entry);
    }
}
