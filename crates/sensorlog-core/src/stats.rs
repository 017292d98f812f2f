//! Running min/max/sum/count statistics.

use serde::{Deserialize, Serialize};

use crate::error::{CoreError, Result};

/// A non-empty fold of integer readings.
///
/// Holds `min <= every value <= max`, `sum == Σ values`, `count == #values`.
/// An empty fold is represented as `Option<RunningStats>::None`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunningStats {
    pub count: u64,
    pub sum: i64,
    pub min: i64,
    pub max: i64,
}

impl RunningStats {
    /// Start a fold from its first value.
    pub const fn new(value: i64) -> Self {
        Self {
            count: 1,
            sum: value,
            min: value,
            max: value,
        }
    }

    /// Fold another value in.
    pub fn push(&mut self, value: i64) -> Result<()> {
        self.sum = self
            .sum
            .checked_add(value)
            .ok_or(CoreError::Overflow("sum"))?;
        self.count += 1;
        self.min = self.min.min(value);
        self.max = self.max.max(value);
        Ok(())
    }

    /// Combine two partial folds.
    pub fn merge(&mut self, other: &RunningStats) -> Result<()> {
        self.sum = self
            .sum
            .checked_add(other.sum)
            .ok_or(CoreError::Overflow("sum"))?;
        self.count = self
            .count
            .checked_add(other.count)
            .ok_or(CoreError::Overflow("count"))?;
        self.min = self.min.min(other.min);
        self.max = self.max.max(other.max);
        Ok(())
    }

    /// Fold a sequence of values. `Ok(None)` when there are none.
    pub fn from_values<I: IntoIterator<Item = i64>>(values: I) -> Result<Option<Self>> {
        let mut acc: Option<Self> = None;
        for v in values {
            match acc.as_mut() {
                Some(stats) => stats.push(v)?,
                None => acc = Some(Self::new(v)),
            }
        }
        Ok(acc)
    }

    /// Truncating mean, `sum / count`.
    pub fn avg(&self) -> i64 {
        // count is never zero; a count beyond i64::MAX can only average to 0
        match i64::try_from(self.count) {
            Ok(count) => self.sum / count,
            Err(_) => 0,
        }
    }
}

/// Merge optional partial folds, skipping empty ones.
pub fn merge_partials<I>(partials: I) -> Result<Option<RunningStats>>
where
    I: IntoIterator<Item = Option<RunningStats>>,
{
    let mut acc: Option<RunningStats> = None;
    for partial in partials.into_iter().flatten() {
        match acc.as_mut() {
            Some(stats) => stats.merge(&partial)?,
            None => acc = Some(partial),
        }
    }
    Ok(acc)
}
