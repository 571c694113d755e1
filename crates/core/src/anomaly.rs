//! Anomaly records and strict parsing of per-execution result objects.
//!
//! Result objects are JSON lines (or a single JSON array) of
//! `{ "timestamp", "prediction", "diagnostics" }`. Parsing is schema-checked
//! and all-or-nothing: the first bad record rejects the whole object.

use std::collections::HashSet;

use chrono::{DateTime, NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};

/// Uniform share each sensor would get if responsibility were spread evenly.
pub fn uniform_baseline(sensor_count: usize) -> f64 {
    1.0 / sensor_count.max(1) as f64
}

/// A per-sensor fraction of responsibility for one anomaly.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DiagnosticContribution {
    /// `<component>\<tag>`
    pub sensor: String,
    pub fraction: f64,
}

impl DiagnosticContribution {
    pub fn component(&self) -> &str {
        self.sensor.split_once('\\').map(|(c, _)| c).unwrap_or("")
    }

    pub fn tag(&self) -> &str {
        self.sensor
            .split_once('\\')
            .map(|(_, t)| t)
            .unwrap_or(&self.sensor)
    }

    pub fn is_above_baseline(&self, sensor_count: usize) -> bool {
        self.fraction > uniform_baseline(sensor_count)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnomalyRecord {
    pub timestamp: DateTime<Utc>,
    pub is_anomaly: bool,
    /// In reported order; empty unless `is_anomaly`.
    pub contributions: Vec<DiagnosticContribution>,
}

impl AnomalyRecord {
    /// Contributions above the uniform baseline, strongest first.
    pub fn significant_contributions(&self, sensor_count: usize) -> Vec<&DiagnosticContribution> {
        let mut above: Vec<_> = self
            .contributions
            .iter()
            .filter(|c| c.is_above_baseline(sensor_count))
            .collect();
        above.sort_by(|a, b| b.fraction.total_cmp(&a.fraction));
        above
    }
}

// ── Wire format ───────────────────────────────────────────────

#[derive(Debug, Deserialize)]
struct RawDiagnostic {
    name: String,
    value: f64,
}

#[derive(Debug, Deserialize)]
struct RawRecord {
    timestamp: String,
    prediction: i64,
    #[serde(default)]
    diagnostics: Option<Vec<RawDiagnostic>>,
}

fn parse_result_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
        return Some(dt.with_timezone(&Utc));
    }
    // Naive timestamps in result files are UTC.
    ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f"]
        .iter()
        .find_map(|layout| NaiveDateTime::parse_from_str(raw, layout).ok())
        .map(|naive| naive.and_utc())
}

fn validate(raw: RawRecord) -> Result<AnomalyRecord, String> {
    let timestamp = parse_result_timestamp(&raw.timestamp)
        .ok_or_else(|| format!("timestamp {:?} is not ISO-8601", raw.timestamp))?;

    let is_anomaly = match raw.prediction {
        0 => false,
        1 => true,
        other => return Err(format!("prediction must be 0 or 1, got {other}")),
    };

    let diagnostics = raw.diagnostics.unwrap_or_default();
    match (is_anomaly, diagnostics.is_empty()) {
        (true, true) => return Err("anomalous record has no diagnostics".into()),
        (false, false) => return Err("normal record carries diagnostics".into()),
        _ => {}
    }

    let mut seen = HashSet::with_capacity(diagnostics.len());
    let mut contributions = Vec::with_capacity(diagnostics.len());
    for d in diagnostics {
        match d.name.split_once('\\') {
            Some((component, tag)) if !component.is_empty() && !tag.is_empty() => {}
            _ => return Err(format!("diagnostic name {:?} is not <component>\\<tag>", d.name)),
        }
        if !d.value.is_finite() || !(0.0..=1.0).contains(&d.value) {
            return Err(format!("diagnostic {} value {} outside [0, 1]", d.name, d.value));
        }
        if !seen.insert(d.name.clone()) {
            return Err(format!("diagnostic {} listed twice", d.name));
        }
        contributions.push(DiagnosticContribution {
            sensor: d.name,
            fraction: d.value,
        });
    }

    Ok(AnomalyRecord {
        timestamp,
        is_anomaly,
        contributions,
    })
}

/// Parse one result object. Errors name the offending line (1-based) or
/// array index (0-based).
pub fn parse_results(bytes: &[u8]) -> Result<Vec<AnomalyRecord>, String> {
    let text = std::str::from_utf8(bytes).map_err(|e| format!("not UTF-8: {e}"))?;
    let trimmed = text.trim_start();

    if trimmed.starts_with('[') {
        let raws: Vec<RawRecord> =
            serde_json::from_str(trimmed).map_err(|e| format!("invalid JSON array: {e}"))?;
        return raws
            .into_iter()
            .enumerate()
            .map(|(i, raw)| validate(raw).map_err(|e| format!("record {i}: {e}")))
            .collect();
    }

    let mut records = Vec::new();
    for (i, line) in text.lines().enumerate() {
        if line.trim().is_empty() {
            continue;
        }
        let raw: RawRecord =
            serde_json::from_str(line).map_err(|e| format!("line {}: {e}", i + 1))?;
        records.push(validate(raw).map_err(|e| format!("line {}: {e}", i + 1))?);
    }
    Ok(records)
}
