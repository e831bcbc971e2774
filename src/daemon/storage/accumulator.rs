use std::collections::BTreeMap;

use anyhow::Result;
use chrono::{DateTime, Utc};
use serde_json::{Value, json};
use tracing::{debug, warn};

use crate::utils::time::datetime_from_millis;

use super::{entities::AccumulatorEntity, kv::KeyValueStore};

/// Key holding the start of the current period in milliseconds since epoch.
pub const PERIOD_START_KEY: &str = "periodStartTime";
/// Key holding the host -> milliseconds map.
pub const ACCUMULATOR_KEY: &str = "logAccumulator";

/// Typed view over a [KeyValueStore]. Every write is a single [KeyValueStore::modify], so a
/// running host and the cli can work on the same store.
pub struct AccumulatorStore<S> {
    store: S,
}

impl<S: KeyValueStore> AccumulatorStore<S> {
    pub fn new(store: S) -> Self {
        Self { store }
    }

    pub async fn load(&self) -> Result<AccumulatorEntity> {
        let values = self.store.get(&[ACCUMULATOR_KEY, PERIOD_START_KEY]).await?;
        Ok(AccumulatorEntity {
            durations: parse_durations(values.get(ACCUMULATOR_KEY)),
            period_start: values
                .get(PERIOD_START_KEY)
                .and_then(Value::as_i64)
                .and_then(datetime_from_millis),
        })
    }

    /// Writes `now` as the period start unless one is already stored. Returns whether anything
    /// was written.
    pub async fn ensure_period_start(&self, now: DateTime<Utc>) -> Result<bool> {
        self.store
            .modify(&[PERIOD_START_KEY], |values| {
                if values.get(PERIOD_START_KEY).and_then(Value::as_i64).is_some() {
                    return false;
                }
                values.insert(PERIOD_START_KEY.into(), json!(now.timestamp_millis()));
                true
            })
            .await
    }

    /// Adds `elapsed_ms` to the total of `host`.
    pub async fn add_duration(&self, host: &str, elapsed_ms: i64) -> Result<Accumulated> {
        let accumulated = self
            .store
            .modify(&[ACCUMULATOR_KEY], |values| {
                let mut durations = parse_durations(values.get(ACCUMULATOR_KEY));
                let host_total_ms = *durations
                    .entry(host.to_string())
                    .and_modify(|total| *total += elapsed_ms)
                    .or_insert(elapsed_ms);
                let hosts = durations.len();
                values.insert(ACCUMULATOR_KEY.into(), json!(durations));
                Accumulated {
                    host_total_ms,
                    hosts,
                }
            })
            .await?;
        debug!(
            "Stored {elapsed_ms}ms for {host}, total {}ms",
            accumulated.host_total_ms
        );
        Ok(accumulated)
    }

    /// Takes a delivered batch out of the store and starts a new period at `period_start`.
    /// Only the delivered amounts are subtracted, time added by someone else after the batch
    /// was read stays for the next one.
    pub async fn settle(
        &self,
        delivered: &BTreeMap<String, i64>,
        period_start: DateTime<Utc>,
    ) -> Result<()> {
        self.store
            .modify(&[ACCUMULATOR_KEY, PERIOD_START_KEY], |values| {
                let mut durations = parse_durations(values.get(ACCUMULATOR_KEY));
                for (host, sent) in delivered {
                    let remaining = durations.get(host).copied().unwrap_or(0) - sent;
                    if remaining > 0 {
                        durations.insert(host.clone(), remaining);
                    } else {
                        durations.remove(host);
                    }
                }
                values.insert(ACCUMULATOR_KEY.into(), json!(durations));
                values.insert(PERIOD_START_KEY.into(), json!(period_start.timestamp_millis()));
            })
            .await
    }
}

/// State of the accumulator right after a session was folded in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Accumulated {
    pub host_total_ms: i64,
    /// Hosts waiting for the next flush.
    pub hosts: usize,
}

fn parse_durations(value: Option<&Value>) -> BTreeMap<String, i64> {
    let Some(value) = value else {
        return BTreeMap::new();
    };
    match serde_json::from_value::<BTreeMap<String, i64>>(value.clone()) {
        Ok(v) => v,
        Err(e) => {
            warn!("Ignoring malformed accumulator {value}: {e}");
            BTreeMap::new()
        }
    }
}
