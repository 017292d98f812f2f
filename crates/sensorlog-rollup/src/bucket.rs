//! Calendar time buckets.
//!
//! A bucket key is a timestamp truncated to one of four precisions and
//! rendered as a string:
//!
//! | precision | key                |
//! |-----------|--------------------|
//! | minute    | `2021-06-05T18:04` |
//! | hour      | `2021-06-05T18`    |
//! | day       | `2021-06-05`       |
//! | month     | `2021-06`          |
//!
//! The precision of a key is recoverable from its shape alone.

use chrono::{DateTime, Duration, Months, NaiveDate, NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::{Result, RollupError};

/// Calendar precision of a bucket key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Precision {
    Minute,
    Hour,
    Day,
    Month,
}

impl Precision {
    /// Finest first, the order in which a reading's buckets are derived.
    pub const ALL: [Precision; 4] = [Self::Minute, Self::Hour, Self::Day, Self::Month];

    fn pattern(self) -> &'static str {
        match self {
            Self::Minute => "%Y-%m-%dT%H:%M",
            Self::Hour => "%Y-%m-%dT%H",
            Self::Day => "%Y-%m-%d",
            Self::Month => "%Y-%m",
        }
    }

    /// The key of the bucket containing `ts`.
    pub fn key(self, ts: DateTime<Utc>) -> String {
        ts.format(self.pattern()).to_string()
    }

    /// Infer the precision of a key from its length.
    pub fn of_key(key: &str) -> Result<Self> {
        match key.len() {
            16 => Ok(Self::Minute),
            13 => Ok(Self::Hour),
            10 => Ok(Self::Day),
            7 => Ok(Self::Month),
            _ => Err(RollupError::InvalidBucket(key.to_string())),
        }
    }

    /// The instant a bucket starts at.
    ///
    /// Rejects anything that does not render back to exactly `key`.
    pub fn start_of(self, key: &str) -> Result<DateTime<Utc>> {
        let invalid = || RollupError::InvalidBucket(key.to_string());
        let naive = match self {
            Self::Minute => NaiveDateTime::parse_from_str(key, "%Y-%m-%dT%H:%M"),
            Self::Hour => NaiveDateTime::parse_from_str(&format!("{}:00", key), "%Y-%m-%dT%H:%M"),
            Self::Day => NaiveDate::parse_from_str(key, "%Y-%m-%d")
                .map(|d| d.and_time(chrono::NaiveTime::MIN)),
            Self::Month => NaiveDate::parse_from_str(&format!("{}-01", key), "%Y-%m-%d")
                .map(|d| d.and_time(chrono::NaiveTime::MIN)),
        }
        .map_err(|_| invalid())?;
        let start = naive.and_utc();
        if self.key(start) != key {
            return Err(invalid());
        }
        Ok(start)
    }

    /// The start of the bucket after the one starting at `start`.
    ///
    /// Carries into the next larger unit at boundaries (minute 59 to the next
    /// hour, December to January of the next year, and so on).
    pub fn next(self, start: DateTime<Utc>) -> Option<DateTime<Utc>> {
        match self {
            Self::Minute => start.checked_add_signed(Duration::minutes(1)),
            Self::Hour => start.checked_add_signed(Duration::hours(1)),
            Self::Day => start.checked_add_signed(Duration::days(1)),
            Self::Month => start.checked_add_months(Months::new(1)),
        }
    }
}

impl fmt::Display for Precision {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Minute => "minute",
            Self::Hour => "hour",
            Self::Day => "day",
            Self::Month => "month",
        };
        f.write_str(name)
    }
}

/// The four bucket keys of a timestamp, finest first.
pub fn bucket_keys(ts: DateTime<Utc>) -> [String; 4] {
    Precision::ALL.map(|p| p.key(ts))
}

/// Every bucket key in `[from, to)`.
///
/// Both keys must share one precision. More than `max` buckets, or a
/// calendar overflow, is a [`RollupError::RangeArithmeticOverflow`]; the
/// listing is never silently truncated.
pub fn enumerate(from: &str, to: &str, max: usize) -> Result<(Precision, Vec<String>)> {
    let precision = Precision::of_key(from)?;
    let to_precision = Precision::of_key(to)?;
    if precision != to_precision {
        return Err(RollupError::MixedPrecision {
            from: from.to_string(),
            to: to.to_string(),
        });
    }

    let end = precision.start_of(to)?;
    let mut cursor = precision.start_of(from)?;
    let mut keys = Vec::new();
    while cursor < end {
        if keys.len() >= max {
            return Err(RollupError::RangeArithmeticOverflow(format!(
                "{} to {} spans more than {} {} buckets",
                from, to, max, precision
            )));
        }
        keys.push(precision.key(cursor));
        cursor = precision.next(cursor).ok_or_else(|| {
            RollupError::RangeArithmeticOverflow(format!("calendar overflow after {}", cursor))
        })?;
    }
    Ok((precision, keys))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn at(y: i32, mo: u32, d: u32, h: u32, mi: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(y, mo, d, h, mi, 30).unwrap()
    }

    #[test]
    fn test_bucket_keys() {
        let keys = bucket_keys(at(2021, 6, 5, 18, 4));
        assert_eq!(keys, ["2021-06-05T18:04", "2021-06-05T18", "2021-06-05", "2021-06"]);
    }

    #[test]
    fn test_precision_of_key() {
        assert_eq!(Precision::of_key("2021-06-05T18:04").unwrap(), Precision::Minute);
        assert_eq!(Precision::of_key("2021-06-05T18").unwrap(), Precision::Hour);
        assert_eq!(Precision::of_key("2021-06-05").unwrap(), Precision::Day);
        assert_eq!(Precision::of_key("2021-06").unwrap(), Precision::Month);
        assert!(Precision::of_key("2021").is_err());
    }

    #[test]
    fn test_start_of_rejects_non_canonical() {
        assert!(Precision::Day.start_of("2021-02-30").is_err());
        assert!(Precision::Minute.start_of("2021-06-05T18:61").is_err());
        assert!(Precision::Month.start_of("2021-13").is_err());
        assert_eq!(
            Precision::Hour.start_of("2021-06-05T18").unwrap(),
            Utc.with_ymd_and_hms(2021, 6, 5, 18, 0, 0).unwrap()
        );
    }

    #[test]
    fn test_enumerate_minutes_carry_hour() {
        let (precision, keys) = enumerate("2021-06-05T18:58", "2021-06-05T19:01", 100).unwrap();
        assert_eq!(precision, Precision::Minute);
        assert_eq!(
            keys,
            vec!["2021-06-05T18:58", "2021-06-05T18:59", "2021-06-05T19:00"]
        );
    }

    #[test]
    fn test_enumerate_days_carry_month_and_year() {
        let (_, keys) = enumerate("2021-12-30", "2022-01-02", 100).unwrap();
        assert_eq!(keys, vec!["2021-12-30", "2021-12-31", "2022-01-01"]);

        let (_, keys) = enumerate("2020-02-28", "2020-03-01", 100).unwrap();
        assert_eq!(keys, vec!["2020-02-28", "2020-02-29"]);
    }

    #[test]
    fn test_enumerate_months_carry_year() {
        let (_, keys) = enumerate("2021-11", "2022-02", 100).unwrap();
        assert_eq!(keys, vec!["2021-11", "2021-12", "2022-01"]);
    }

    #[test]
    fn test_enumerate_empty_and_inverted() {
        assert!(enumerate("2021-06", "2021-06", 10).unwrap().1.is_empty());
        assert!(enumerate("2021-06", "2021-01", 10).unwrap().1.is_empty());
    }

    #[test]
    fn test_enumerate_mixed_precision_rejected() {
        assert!(matches!(
            enumerate("2021-06", "2021-06-05", 10),
            Err(RollupError::MixedPrecision { .. })
        ));
    }

    #[test]
    fn test_enumerate_bound_enforced() {
        assert!(matches!(
            enumerate("2000-01-01T00:00", "2021-01-01T00:00", 1_000),
            Err(RollupError::RangeArithmeticOverflow(_))
        ));
    }
}
