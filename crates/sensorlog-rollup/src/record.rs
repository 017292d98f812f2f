//! Stored rollup documents.

use bytes::Bytes;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use sensorlog_core::RunningStats;

use crate::error::Result;

/// Running statistics for one `(subject, bucket)` pair.
///
/// Stored as JSON: `{"sensorId", "timeFrame", "count", "sum", "min", "max"}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AggregateRecord {
    #[serde(rename = "sensorId")]
    pub subject: String,

    #[serde(rename = "timeFrame")]
    pub bucket: String,

    #[serde(flatten)]
    pub stats: RunningStats,
}

impl AggregateRecord {
    /// A record holding its first value.
    pub fn first(subject: &str, bucket: &str, value: i64) -> Self {
        Self {
            subject: subject.to_string(),
            bucket: bucket.to_string(),
            stats: RunningStats::new(value),
        }
    }

    /// Fold `value` into an existing record, or start one.
    ///
    /// This is the whole streaming update rule; the engine only adds
    /// storage and locking around it.
    pub fn fold(existing: Option<Self>, subject: &str, bucket: &str, value: i64) -> Result<Self> {
        match existing {
            Some(mut record) => {
                record.stats.push(value)?;
                Ok(record)
            }
            None => Ok(Self::first(subject, bucket, value)),
        }
    }

    pub fn to_bytes(&self) -> Result<Bytes> {
        Ok(Bytes::from(serde_json::to_vec(self)?))
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        Ok(serde_json::from_slice(bytes)?)
    }
}

/// The most recent raw event seen for a subject.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LatestEvent {
    #[serde(rename = "sensorId")]
    pub subject: String,

    /// Serialized as RFC 3339.
    #[serde(rename = "creationTime")]
    pub creation_time: DateTime<Utc>,

    pub value: i64,

    #[serde(rename = "measurementUnit")]
    pub unit: String,
}

impl LatestEvent {
    pub fn to_bytes(&self) -> Result<Bytes> {
        Ok(Bytes::from(serde_json::to_vec(self)?))
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        Ok(serde_json::from_slice(bytes)?)
    }
}
