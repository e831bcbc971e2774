use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::utils::time::iso_millis;

/// Persisted half of tracking: closed sessions summed per host for the current period.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AccumulatorEntity {
    /// Accumulated milliseconds per host.
    pub durations: BTreeMap<String, i64>,
    /// Start of the accumulation window. Absent only if the store was never initialized.
    pub period_start: Option<DateTime<Utc>>,
}

impl AccumulatorEntity {
    pub fn total_ms(&self) -> i64 {
        self.durations.values().sum()
    }

    /// Projects the accumulator into the records sent to the ingestion endpoint. Every record
    /// carries the bounds of the whole period, not of the individual sessions.
    pub fn into_records(
        self,
        period_start: DateTime<Utc>,
        period_end: DateTime<Utc>,
    ) -> Vec<LogRecord> {
        self.durations
            .into_iter()
            .map(|(host, total_duration_ms)| LogRecord {
                host,
                total_duration_ms,
                period_start_time: period_start,
                period_end_time: period_end,
            })
            .collect()
    }
}

/// Wire representation of the time spent on one host during one period.
#[derive(PartialEq, Eq, Debug, Serialize, Deserialize, Clone)]
#[serde(rename_all = "camelCase")]
pub struct LogRecord {
    pub host: String,
    pub total_duration_ms: i64,
    #[serde(with = "iso_millis")]
    pub period_start_time: DateTime<Utc>,
    #[serde(with = "iso_millis")]
    pub period_end_time: DateTime<Utc>,
}
