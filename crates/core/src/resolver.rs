//! Time & filename resolution for scheduled runs.
//!
//! A run firing at `T` reads the window `[T − frequency, T)` and expects an
//! input object named after the *start* of that window, rendered in the
//! configured local offset:
//!
//! ```text
//! <input_prefix><component><delimiter><timestamp>.csv
//! ```
//!
//! The delay offset does not change which file is expected. It only moves the
//! instant at which the remote is allowed to look for it (`T + delay`).

use chrono::{DateTime, Duration, NaiveDateTime, TimeZone, Utc};
use serde::Serialize;
use tracing::debug;

use crate::error::{LookoutError, Result};
use crate::schedule::{
    ComponentDelimiter, ScheduleConfig, ScheduleSettings, ScheduleTiming, TimestampFormat,
    TimezoneOffset, UploadFrequency,
};

const INPUT_EXTENSION: &str = ".csv";

/// Layouts accepted for the timestamp column of input CSV files.
const ROW_TIMESTAMP_LAYOUTS: &[&str] = &[
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y/%m/%d %H:%M:%S",
];

/// Everything a single run needs to know about its data.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RunPlan {
    pub fire_time: DateTime<Utc>,
    pub window_start: DateTime<Utc>,
    pub window_end: DateTime<Utc>,
    /// Earliest instant the remote looks for the file (`fire_time + delay`).
    pub search_at: DateTime<Utc>,
    /// Timestamp embedded in the expected file name (== `window_start`).
    pub filename_timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Resolver {
    frequency: UploadFrequency,
    delay_offset_minutes: u32,
    timezone_offset: TimezoneOffset,
    delimiter: ComponentDelimiter,
    format: TimestampFormat,
    input_prefix: String,
}

impl Resolver {
    pub fn new(
        frequency: UploadFrequency,
        delay_offset_minutes: u32,
        timezone_offset: TimezoneOffset,
        delimiter: ComponentDelimiter,
        format: TimestampFormat,
    ) -> Self {
        Self {
            frequency,
            delay_offset_minutes,
            timezone_offset,
            delimiter,
            format,
            input_prefix: String::new(),
        }
    }

    /// Build from raw option strings, rejecting anything outside the enums.
    pub fn parse(
        frequency: &str,
        delay_offset_minutes: u32,
        timezone_offset: &str,
        delimiter: &str,
        format: &str,
    ) -> Result<Self> {
        Ok(Self::new(
            frequency.parse()?,
            delay_offset_minutes,
            timezone_offset.parse()?,
            delimiter.parse()?,
            format.parse()?,
        ))
    }

    pub fn from_config(cfg: &ScheduleConfig) -> Self {
        Self::new(
            cfg.upload_frequency,
            cfg.delay_offset_minutes,
            cfg.timezone_offset,
            cfg.component_delimiter,
            cfg.timestamp_format,
        )
        .with_input_prefix(&cfg.input_prefix)
    }

    /// Resolver from raw settings alone; schedule identifiers may be absent.
    pub fn from_settings(settings: &ScheduleSettings) -> Result<Self> {
        let t = ScheduleTiming::from_settings(settings)?;
        Ok(Self::new(
            t.upload_frequency,
            t.delay_offset_minutes,
            t.timezone_offset,
            t.component_delimiter,
            t.timestamp_format,
        )
        .with_input_prefix(settings.input_prefix.as_deref().unwrap_or("")))
    }

    /// Directory prefix prepended by [`expected_object_key`](Self::expected_object_key).
    pub fn with_input_prefix(mut self, prefix: &str) -> Self {
        let trimmed = prefix.trim_start_matches('/');
        self.input_prefix = if trimmed.is_empty() || trimmed.ends_with('/') {
            trimmed.to_string()
        } else {
            format!("{trimmed}/")
        };
        self
    }

    pub fn frequency(&self) -> UploadFrequency {
        self.frequency
    }

    pub fn delay(&self) -> Duration {
        Duration::minutes(i64::from(self.delay_offset_minutes))
    }

    // ── Windows ──────────────────────────────────────────────

    pub fn plan(&self, fire_time: DateTime<Utc>) -> RunPlan {
        let window_start = self.filename_timestamp(fire_time);
        RunPlan {
            fire_time,
            window_start,
            window_end: fire_time,
            search_at: fire_time + self.delay(),
            filename_timestamp: window_start,
        }
    }

    /// The remote looks one period back: the file for a run at `T` is
    /// stamped `T − frequency`.
    pub fn filename_timestamp(&self, fire_time: DateTime<Utc>) -> DateTime<Utc> {
        fire_time - self.frequency.duration()
    }

    /// Next frequency-aligned fire time strictly after `now`.
    pub fn next_fire_time(&self, now: DateTime<Utc>) -> DateTime<Utc> {
        let period = self.frequency.minutes() * 60;
        let next = (now.timestamp().div_euclid(period) + 1) * period;
        Utc.timestamp_opt(next, 0).single().unwrap_or(now)
    }

    /// Latest aligned fire time whose search instant (`fire + delay`) has
    /// already passed at `now`.
    pub fn latest_due_fire_time(&self, now: DateTime<Utc>) -> DateTime<Utc> {
        let period = self.frequency.minutes() * 60;
        let shifted = (now - self.delay()).timestamp();
        let aligned = shifted.div_euclid(period) * period;
        Utc.timestamp_opt(aligned, 0).single().unwrap_or(now)
    }

    // ── Timestamps ───────────────────────────────────────────

    /// Render an instant the way it appears inside input keys.
    pub fn format_timestamp(&self, ts: DateTime<Utc>) -> String {
        match self.format.chrono_pattern() {
            None => ts.timestamp().to_string(),
            Some(pattern) => ts
                .with_timezone(&self.timezone_offset.fixed_offset())
                .format(pattern)
                .to_string(),
        }
    }

    /// Inverse of [`format_timestamp`](Self::format_timestamp).
    pub fn parse_timestamp(&self, raw: &str) -> Result<DateTime<Utc>> {
        let bad = |reason: &str| {
            LookoutError::invalid_config("timestamp", raw, format!("{reason} ({})", self.format))
        };
        match self.format.chrono_pattern() {
            None => {
                if raw.is_empty() || !raw.bytes().all(|b| b.is_ascii_digit()) {
                    return Err(bad("not epoch seconds"));
                }
                let secs: i64 = raw.parse().map_err(|_| bad("epoch out of range"))?;
                Utc.timestamp_opt(secs, 0)
                    .single()
                    .ok_or_else(|| bad("epoch out of range"))
            }
            Some(pattern) => {
                let naive = NaiveDateTime::parse_from_str(raw, pattern)
                    .map_err(|_| bad("does not match format"))?;
                self.timezone_offset
                    .fixed_offset()
                    .from_local_datetime(&naive)
                    .single()
                    .map(|dt| dt.with_timezone(&Utc))
                    .ok_or_else(|| bad("ambiguous local time"))
            }
        }
    }

    // ── Keys ─────────────────────────────────────────────────

    /// Expected key suffix `<component><delimiter><timestamp>.csv` for a run.
    pub fn expected_key(&self, component: &str, fire_time: DateTime<Utc>) -> Result<String> {
        if component.is_empty() {
            return Err(LookoutError::invalid_config("component", component, "empty component name"));
        }
        let stamp = self.filename_timestamp(fire_time);
        // Epoch keys carry unsigned seconds only.
        if self.format == TimestampFormat::Epoch && stamp.timestamp() < 0 {
            return Err(LookoutError::invalid_config(
                "fire_time",
                fire_time.to_rfc3339(),
                "EPOCH keys cannot name instants before 1970-01-01",
            ));
        }
        Ok(format!(
            "{}{}{}{}",
            component,
            self.delimiter.as_str(),
            self.format_timestamp(stamp),
            INPUT_EXTENSION
        ))
    }

    /// [`expected_key`](Self::expected_key) under the configured input prefix.
    pub fn expected_object_key(&self, component: &str, fire_time: DateTime<Utc>) -> Result<String> {
        Ok(format!("{}{}", self.input_prefix, self.expected_key(component, fire_time)?))
    }

    /// Split a key back into `(component, filename timestamp)`.
    ///
    /// Any directory prefix is ignored. The timestamp is taken from the end of
    /// the file stem so components may themselves contain the delimiter.
    pub fn parse_key(&self, key: &str) -> Result<(String, DateTime<Utc>)> {
        let file_name = key.rsplit('/').next().unwrap_or(key);
        let bad = |reason: &str| LookoutError::invalid_config("key", key, reason);

        let stem = file_name
            .strip_suffix(INPUT_EXTENSION)
            .ok_or_else(|| bad("missing .csv extension"))?;

        let delimiter = self.delimiter.as_char();
        let (component, raw_ts) = match self.format.rendered_len() {
            Some(width) => {
                let split = stem
                    .len()
                    .checked_sub(width)
                    .filter(|&at| at > 1 && stem.is_char_boundary(at))
                    .ok_or_else(|| bad("name too short for timestamp format"))?;
                let (head, ts) = stem.split_at(split);
                let component = head
                    .strip_suffix(delimiter)
                    .ok_or_else(|| bad("delimiter does not precede timestamp"))?;
                (component, ts)
            }
            None => stem
                .rsplit_once(delimiter)
                .ok_or_else(|| bad("delimiter not found"))?,
        };

        if component.is_empty() {
            return Err(bad("empty component name"));
        }
        Ok((component.to_string(), self.parse_timestamp(raw_ts)?))
    }

    /// Whether `key` is the file the run at `fire_time` consumes.
    ///
    /// A file stamped earlier than the run's window start is never matched;
    /// it waits for its own run.
    pub fn matches(&self, key: &str, component: &str, fire_time: DateTime<Utc>) -> bool {
        match self.parse_key(key) {
            Ok((c, ts)) => c == component && ts == self.filename_timestamp(fire_time),
            Err(_) => false,
        }
    }

    // ── Input data check ─────────────────────────────────────

    /// Count rows of an input CSV that fall in the run's window.
    ///
    /// First line is a header; the first column holds the row timestamp.
    /// Naive timestamps are read in the configured local offset. Zero rows
    /// fails with `NoDataInWindow`, matching what the remote run would report.
    pub fn count_rows_in_window(
        &self,
        key: &str,
        csv: &str,
        fire_time: DateTime<Utc>,
    ) -> Result<usize> {
        let plan = self.plan(fire_time);
        let mut count = 0usize;

        for (line_no, line) in csv.lines().enumerate().skip(1) {
            let first = line.split(',').next().unwrap_or("").trim().trim_matches('"');
            if first.is_empty() {
                continue;
            }
            match self.parse_row_timestamp(first) {
                Some(ts) if ts >= plan.window_start && ts < plan.window_end => count += 1,
                Some(_) => {}
                None => debug!(key = %key, line = line_no + 1, value = %first, "unparseable row timestamp"),
            }
        }

        if count == 0 {
            return Err(LookoutError::NoDataInWindow {
                key: key.to_string(),
                window_start: plan.window_start,
                window_end: plan.window_end,
            });
        }
        Ok(count)
    }

    fn parse_row_timestamp(&self, raw: &str) -> Option<DateTime<Utc>> {
        if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
            return Some(dt.with_timezone(&Utc));
        }
        let offset = self.timezone_offset.fixed_offset();
        ROW_TIMESTAMP_LAYOUTS.iter().find_map(|layout| {
            NaiveDateTime::parse_from_str(raw, layout)
                .ok()
                .and_then(|naive| offset.from_local_datetime(&naive).single())
                .map(|dt| dt.with_timezone(&Utc))
        })
    }
}
