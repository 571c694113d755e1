//! Time-ordered, duplicate-free collection of anomaly records.

use std::collections::{BTreeMap, BTreeSet, HashMap};

use chrono::{DateTime, Duration, Utc};
use serde::Serialize;

use crate::anomaly::AnomalyRecord;

/// Append-only map from timestamp to record.
///
/// Records are only ever added; an instant already present is a collision and
/// the whole batch is refused.
#[derive(Debug, Clone, Default)]
pub struct Timeline {
    records: BTreeMap<DateTime<Utc>, AnomalyRecord>,
}

/// A run of consecutive anomalous records.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AnomalyEvent {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
    pub record_count: usize,
}

impl AnomalyEvent {
    pub fn duration(&self) -> Duration {
        self.end - self.start
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SensorRank {
    pub sensor: String,
    /// Mean contribution over every anomalous record in the timeline.
    pub mean_fraction: f64,
    /// Anomalous records in which this sensor appears.
    pub appearances: usize,
}

impl Timeline {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn get(&self, ts: &DateTime<Utc>) -> Option<&AnomalyRecord> {
        self.records.get(ts)
    }

    pub fn contains(&self, ts: &DateTime<Utc>) -> bool {
        self.records.contains_key(ts)
    }

    /// Records in ascending timestamp order.
    pub fn iter(&self) -> impl Iterator<Item = &AnomalyRecord> {
        self.records.values()
    }

    pub fn first(&self) -> Option<&AnomalyRecord> {
        self.records.values().next()
    }

    pub fn last(&self) -> Option<&AnomalyRecord> {
        self.records.values().next_back()
    }

    /// Find the first timestamp in `records` that would collide, either with
    /// the timeline or with another record of the same batch.
    pub fn first_collision(&self, records: &[AnomalyRecord]) -> Option<DateTime<Utc>> {
        let mut batch = BTreeSet::new();
        records
            .iter()
            .map(|r| r.timestamp)
            .find(|ts| self.records.contains_key(ts) || !batch.insert(*ts))
    }

    /// Merge a batch atomically. On collision nothing is inserted and the
    /// colliding instant is returned.
    pub fn merge(&mut self, records: Vec<AnomalyRecord>) -> Result<usize, DateTime<Utc>> {
        if let Some(ts) = self.first_collision(&records) {
            return Err(ts);
        }
        let added = records.len();
        for record in records {
            self.records.insert(record.timestamp, record);
        }
        Ok(added)
    }

    pub fn anomalies(&self) -> impl Iterator<Item = &AnomalyRecord> {
        self.records.values().filter(|r| r.is_anomaly)
    }

    pub fn anomaly_count(&self) -> usize {
        self.anomalies().count()
    }

    /// Records with `start <= timestamp < end`.
    pub fn range(
        &self,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> impl Iterator<Item = &AnomalyRecord> {
        let upper = if end < start { start } else { end };
        self.records.range(start..upper).map(|(_, r)| r)
    }

    /// Group consecutive anomalous records into events. A normal record or a
    /// gap longer than `max_gap` closes the current event.
    pub fn events(&self, max_gap: Duration) -> Vec<AnomalyEvent> {
        let mut events = Vec::new();
        let mut current: Option<AnomalyEvent> = None;

        for record in self.records.values() {
            if !record.is_anomaly {
                events.extend(current.take());
                continue;
            }
            match current.as_mut() {
                Some(ev) if record.timestamp - ev.end <= max_gap => {
                    ev.end = record.timestamp;
                    ev.record_count += 1;
                }
                _ => {
                    events.extend(current.take());
                    current = Some(AnomalyEvent {
                        start: record.timestamp,
                        end: record.timestamp,
                        record_count: 1,
                    });
                }
            }
        }
        events.extend(current);
        events
    }

    /// Sensors ranked by mean contribution across anomalous records.
    pub fn sensor_ranking(&self) -> Vec<SensorRank> {
        let mut totals: HashMap<&str, (f64, usize)> = HashMap::new();
        let mut anomalous = 0usize;

        for record in self.anomalies() {
            anomalous += 1;
            for c in &record.contributions {
                let entry = totals.entry(c.sensor.as_str()).or_insert((0.0, 0));
                entry.0 += c.fraction;
                entry.1 += 1;
            }
        }
        if anomalous == 0 {
            return Vec::new();
        }

        let mut ranking: Vec<SensorRank> = totals
            .into_iter()
            .map(|(sensor, (sum, appearances))| SensorRank {
                sensor: sensor.to_string(),
                mean_fraction: sum / anomalous as f64,
                appearances,
            })
            .collect();
        ranking.sort_by(|a, b| {
            b.mean_fraction
                .total_cmp(&a.mean_fraction)
                .then_with(|| a.sensor.cmp(&b.sensor))
        });
        ranking
    }

    /// One JSON object per line, ascending by timestamp.
    pub fn to_json_lines(&self) -> Result<String, serde_json::Error> {
        let mut out = String::new();
        for record in self.records.values() {
            out.push_str(&serde_json::to_string(record)?);
            out.push('\n');
        }
        Ok(out)
    }
}
