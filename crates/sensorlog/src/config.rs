//! Window tiers and engine configuration.
//!
//! The window table is immutable once built and is handed to the engines
//! at construction. Reporter secrets are read through a lookup function so
//! the same code serves the process environment and tests.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use sensorlog_core::Identity;
use serde::Serialize;

use crate::error::{Error, Result};

/// Variable holding the collector's hex seed.
pub const COLLECTOR_SECRET_VAR: &str = "BATCH_SECRET_KEY";

/// An aggregation period with its own reporter identity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(into = "&'static str")]
pub enum Granularity {
    FiveSeconds,
    ThirtySeconds,
    OneMinute,
    FiveMinutes,
    ThirtyMinutes,
    OneHour,
    SixHours,
    TwelveHours,
    OneDay,
}

impl Granularity {
    /// Finest first.
    pub const ALL: [Granularity; 9] = [
        Self::FiveSeconds,
        Self::ThirtySeconds,
        Self::OneMinute,
        Self::FiveMinutes,
        Self::ThirtyMinutes,
        Self::OneHour,
        Self::SixHours,
        Self::TwelveHours,
        Self::OneDay,
    ];

    pub fn name(self) -> &'static str {
        match self {
            Self::FiveSeconds => "5s",
            Self::ThirtySeconds => "30s",
            Self::OneMinute => "1m",
            Self::FiveMinutes => "5m",
            Self::ThirtyMinutes => "30m",
            Self::OneHour => "1h",
            Self::SixHours => "6h",
            Self::TwelveHours => "12h",
            Self::OneDay => "1d",
        }
    }

    /// Wall-clock length of the window.
    pub fn period(self) -> Duration {
        let secs = match self {
            Self::FiveSeconds => 5,
            Self::ThirtySeconds => 30,
            Self::OneMinute => 60,
            Self::FiveMinutes => 300,
            Self::ThirtyMinutes => 1_800,
            Self::OneHour => 3_600,
            Self::SixHours => 21_600,
            Self::TwelveHours => 43_200,
            Self::OneDay => 86_400,
        };
        Duration::from_secs(secs)
    }

    /// Raw entries one window covers, at one reading per five seconds.
    pub fn default_block_size(self) -> u64 {
        self.period().as_secs() / 5
    }

    /// Name of the variable holding this tier's reporter seed.
    pub fn secret_var(self) -> &'static str {
        match self {
            Self::FiveSeconds => "FIVE_SECONDS_SECRET",
            Self::ThirtySeconds => "THIRTY_SECONDS_SECRET",
            Self::OneMinute => "ONE_MINUTE_SECRET",
            Self::FiveMinutes => "FIVE_MINUTES_SECRET",
            Self::ThirtyMinutes => "THIRTY_MINUTES_SECRET",
            Self::OneHour => "ONE_HOUR_SECRET",
            Self::SixHours => "SIX_HOURS_SECRET",
            Self::TwelveHours => "TWELVE_HOURS_SECRET",
            Self::OneDay => "ONE_DAY_SECRET",
        }
    }

    /// The next finer tier, if any.
    pub fn finer(self) -> Option<Granularity> {
        let index = Self::ALL.iter().position(|&g| g == self)?;
        index.checked_sub(1).map(|i| Self::ALL[i])
    }
}

impl fmt::Display for Granularity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl From<Granularity> for &'static str {
    fn from(granularity: Granularity) -> Self {
        granularity.name()
    }
}

impl FromStr for Granularity {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Self::ALL
            .iter()
            .copied()
            .find(|g| g.name() == s)
            .ok_or_else(|| Error::UnknownGranularity(s.to_string()))
    }
}

/// Where a window's inputs come from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WindowSource {
    /// Decrypt the sensor's raw readings.
    Raw,
    /// Combine aggregates already emitted by a finer tier.
    Finer(Granularity),
}

/// One window tier.
#[derive(Debug, Clone)]
pub struct WindowSpec {
    pub granularity: Granularity,
    /// Raw sequence numbers one aggregate covers.
    pub block_size: u64,
    /// Signs and encrypts this tier's aggregates.
    pub reporter: Identity,
    pub source: WindowSource,
}

impl WindowSpec {
    /// A tier computed from raw readings, with the default block size.
    pub fn raw(granularity: Granularity, reporter: Identity) -> Self {
        Self {
            granularity,
            block_size: granularity.default_block_size(),
            reporter,
            source: WindowSource::Raw,
        }
    }

    /// A tier computed from the aggregates of `finer`.
    pub fn tiered(granularity: Granularity, reporter: Identity, finer: Granularity) -> Self {
        Self {
            granularity,
            block_size: granularity.default_block_size(),
            reporter,
            source: WindowSource::Finer(finer),
        }
    }

    pub fn with_block_size(mut self, block_size: u64) -> Self {
        self.block_size = block_size;
        self
    }
}

/// The immutable set of configured tiers.
#[derive(Debug, Clone, Default)]
pub struct WindowTable {
    windows: BTreeMap<Granularity, WindowSpec>,
}

impl WindowTable {
    /// Build a table, checking block sizes and tier sources.
    pub fn new(specs: impl IntoIterator<Item = WindowSpec>) -> Result<Self> {
        let windows: BTreeMap<_, _> = specs.into_iter().map(|s| (s.granularity, s)).collect();
        for spec in windows.values() {
            if spec.block_size == 0 {
                return Err(Error::Config(format!(
                    "window {} has a zero block size",
                    spec.granularity
                )));
            }
            if let WindowSource::Finer(finer) = spec.source {
                if finer >= spec.granularity {
                    return Err(Error::Config(format!(
                        "window {} cannot be sourced from {}",
                        spec.granularity, finer
                    )));
                }
                if !windows.contains_key(&finer) {
                    return Err(Error::Config(format!(
                        "window {} is sourced from unconfigured {}",
                        spec.granularity, finer
                    )));
                }
            }
        }
        Ok(Self { windows })
    }

    /// Build the raw tiers whose seed variable `lookup` resolves.
    ///
    /// Absent variables leave their tier out; malformed seeds are errors.
    pub fn from_seed_lookup<F>(mut lookup: F) -> Result<Self>
    where
        F: FnMut(&str) -> Option<String>,
    {
        let mut specs = Vec::new();
        for granularity in Granularity::ALL {
            let Some(seed) = lookup(granularity.secret_var()) else {
                continue;
            };
            let reporter = Identity::from_hex_seed(&seed).map_err(|e| {
                Error::Config(format!("{}: {}", granularity.secret_var(), e))
            })?;
            specs.push(WindowSpec::raw(granularity, reporter));
        }
        Self::new(specs)
    }

    /// [`from_seed_lookup`](Self::from_seed_lookup) over the process environment.
    pub fn from_env() -> Result<Self> {
        Self::from_seed_lookup(|name| std::env::var(name).ok())
    }

    pub fn get(&self, granularity: Granularity) -> Result<&WindowSpec> {
        self.windows
            .get(&granularity)
            .ok_or_else(|| Error::UnknownGranularity(granularity.to_string()))
    }

    pub fn iter(&self) -> impl Iterator<Item = &WindowSpec> {
        self.windows.values()
    }

    pub fn len(&self) -> usize {
        self.windows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.windows.is_empty()
    }
}

/// Read the collector identity through `lookup`.
pub fn collector_from_lookup<F>(mut lookup: F) -> Result<Identity>
where
    F: FnMut(&str) -> Option<String>,
{
    let seed = lookup(COLLECTOR_SECRET_VAR)
        .ok_or_else(|| Error::Config(format!("{} is not set", COLLECTOR_SECRET_VAR)))?;
    Identity::from_hex_seed(&seed)
        .map_err(|e| Error::Config(format!("{}: {}", COLLECTOR_SECRET_VAR, e)))
}

/// Configuration for the batch aggregator and browser.
#[derive(Debug, Clone)]
pub struct AggregatorConfig {
    /// Resubmissions after a sequence conflict before giving up.
    pub max_submit_retries: u32,
    /// Bound on each ledger call.
    pub ledger_timeout: Duration,
    /// Parallel decrypt tasks per scan.
    pub scan_workers: usize,
}

impl Default for AggregatorConfig {
    fn default() -> Self {
        Self {
            max_submit_retries: 5,
            ledger_timeout: Duration::from_secs(30),
            scan_workers: 4,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn test_default_block_sizes() {
        let sizes: Vec<u64> = Granularity::ALL
            .iter()
            .map(|g| g.default_block_size())
            .collect();
        assert_eq!(sizes, vec![1, 6, 12, 60, 360, 720, 4320, 8640, 17280]);
    }

    #[test]
    fn test_granularity_names_roundtrip() {
        for g in Granularity::ALL {
            assert_eq!(g.name().parse::<Granularity>().unwrap(), g);
        }
        assert!(matches!(
            "2h".parse::<Granularity>(),
            Err(Error::UnknownGranularity(_))
        ));
    }

    #[test]
    fn test_finer() {
        assert_eq!(Granularity::FiveSeconds.finer(), None);
        assert_eq!(Granularity::OneHour.finer(), Some(Granularity::ThirtyMinutes));
    }

    #[test]
    fn test_from_seed_lookup() {
        let vars: HashMap<&str, String> = [
            ("FIVE_SECONDS_SECRET", "01".repeat(32)),
            ("ONE_HOUR_SECRET", "02".repeat(32)),
        ]
        .into_iter()
        .collect();

        let table = WindowTable::from_seed_lookup(|name| vars.get(name).cloned()).unwrap();
        assert_eq!(table.len(), 2);
        let hour = table.get(Granularity::OneHour).unwrap();
        assert_eq!(hour.block_size, 720);
        assert_eq!(hour.source, WindowSource::Raw);
        assert_eq!(
            hour.reporter.address(),
            Identity::from_seed(&[2; 32]).address()
        );
        assert!(table.get(Granularity::OneDay).is_err());
    }

    #[test]
    fn test_from_seed_lookup_rejects_bad_seed() {
        let result = WindowTable::from_seed_lookup(|name| {
            (name == "ONE_DAY_SECRET").then(|| "not-hex".to_string())
        });
        assert!(matches!(result, Err(Error::Config(_))));
    }

    #[test]
    fn test_table_validates_sources() {
        let hour = WindowSpec::tiered(
            Granularity::OneHour,
            Identity::generate(),
            Granularity::FiveMinutes,
        );
        assert!(WindowTable::new([hour.clone()]).is_err());

        let five = WindowSpec::raw(Granularity::FiveMinutes, Identity::generate());
        assert!(WindowTable::new([five, hour]).is_ok());

        let backwards = WindowSpec::tiered(
            Granularity::FiveMinutes,
            Identity::generate(),
            Granularity::OneHour,
        );
        let hour = WindowSpec::raw(Granularity::OneHour, Identity::generate());
        assert!(WindowTable::new([backwards, hour]).is_err());

        let empty = WindowSpec::raw(Granularity::OneDay, Identity::generate()).with_block_size(0);
        assert!(WindowTable::new([empty]).is_err());
    }

    #[test]
    fn test_collector_from_lookup() {
        let seed = "07".repeat(32);
        let collector = collector_from_lookup(|_| Some(seed.clone())).unwrap();
        assert_eq!(collector.address(), Identity::from_seed(&[7; 32]).address());
        assert!(collector_from_lookup(|_| None).is_err());
    }
}
