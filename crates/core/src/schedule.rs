//! Schedule configuration and lifecycle state.
//!
//! Every recognised option is a closed enum. Parsing goes through
//! [`ScheduleConfig::from_settings`], which rejects out-of-enum values with
//! [`LookoutError::InvalidConfiguration`] instead of falling back to a default.

use std::fmt;
use std::str::FromStr;

use chrono::{Duration, FixedOffset, Offset, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{LookoutError, Result};

// ── Upload frequency ──────────────────────────────────────────

/// How often upstream producers drop a new input file.
///
/// Must match the sampling cadence the model was trained on. That cannot be
/// checked locally; the remote rejects a mismatch on create and the error is
/// surfaced as-is.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum UploadFrequency {
    #[serde(rename = "PT5M")]
    Pt5M,
    #[serde(rename = "PT10M")]
    Pt10M,
    #[serde(rename = "PT15M")]
    Pt15M,
    #[serde(rename = "PT30M")]
    Pt30M,
    #[serde(rename = "PT1H")]
    Pt1H,
}

impl UploadFrequency {
    pub const ALL: [UploadFrequency; 5] = [
        UploadFrequency::Pt5M,
        UploadFrequency::Pt10M,
        UploadFrequency::Pt15M,
        UploadFrequency::Pt30M,
        UploadFrequency::Pt1H,
    ];

    pub fn minutes(self) -> i64 {
        match self {
            UploadFrequency::Pt5M => 5,
            UploadFrequency::Pt10M => 10,
            UploadFrequency::Pt15M => 15,
            UploadFrequency::Pt30M => 30,
            UploadFrequency::Pt1H => 60,
        }
    }

    pub fn duration(self) -> Duration {
        Duration::minutes(self.minutes())
    }

    pub fn as_iso(self) -> &'static str {
        match self {
            UploadFrequency::Pt5M => "PT5M",
            UploadFrequency::Pt10M => "PT10M",
            UploadFrequency::Pt15M => "PT15M",
            UploadFrequency::Pt30M => "PT30M",
            UploadFrequency::Pt1H => "PT1H",
        }
    }
}

impl fmt::Display for UploadFrequency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_iso())
    }
}

impl FromStr for UploadFrequency {
    type Err = LookoutError;

    fn from_str(s: &str) -> Result<Self> {
        let upper = s.trim().to_ascii_uppercase();
        Self::ALL
            .into_iter()
            .find(|f| f.as_iso() == upper)
            .ok_or_else(|| {
                LookoutError::invalid_config(
                    "upload_frequency",
                    s,
                    "expected one of PT5M, PT10M, PT15M, PT30M, PT1H",
                )
            })
    }
}

// ── Component delimiter ───────────────────────────────────────

/// Separator between the component name and the timestamp in input keys.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ComponentDelimiter {
    #[serde(rename = "-")]
    Dash,
    #[serde(rename = "_")]
    Underscore,
    #[serde(rename = " ")]
    Space,
}

impl ComponentDelimiter {
    pub fn as_char(self) -> char {
        match self {
            ComponentDelimiter::Dash => '-',
            ComponentDelimiter::Underscore => '_',
            ComponentDelimiter::Space => ' ',
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            ComponentDelimiter::Dash => "-",
            ComponentDelimiter::Underscore => "_",
            ComponentDelimiter::Space => " ",
        }
    }
}

impl FromStr for ComponentDelimiter {
    type Err = LookoutError;

    // Not trimmed: a single space is a valid delimiter.
    fn from_str(s: &str) -> Result<Self> {
        match s {
            "-" => Ok(ComponentDelimiter::Dash),
            "_" => Ok(ComponentDelimiter::Underscore),
            " " => Ok(ComponentDelimiter::Space),
            other => Err(LookoutError::invalid_config(
                "component_delimiter",
                other,
                "expected '-', '_' or ' '",
            )),
        }
    }
}

// ── Timestamp format ──────────────────────────────────────────

/// How the timestamp is rendered inside input object keys.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TimestampFormat {
    /// Seconds since the Unix epoch.
    #[serde(rename = "EPOCH")]
    Epoch,
    #[serde(rename = "yyyy-MM-dd-HH-mm-ss")]
    Dashed,
    #[serde(rename = "yyyyMMddHHmmss")]
    Compact,
}

impl TimestampFormat {
    pub fn as_str(self) -> &'static str {
        match self {
            TimestampFormat::Epoch => "EPOCH",
            TimestampFormat::Dashed => "yyyy-MM-dd-HH-mm-ss",
            TimestampFormat::Compact => "yyyyMMddHHmmss",
        }
    }

    /// chrono pattern for the calendar formats; `None` for epoch seconds.
    pub fn chrono_pattern(self) -> Option<&'static str> {
        match self {
            TimestampFormat::Epoch => None,
            TimestampFormat::Dashed => Some("%Y-%m-%d-%H-%M-%S"),
            TimestampFormat::Compact => Some("%Y%m%d%H%M%S"),
        }
    }

    /// Fixed rendered width for the calendar formats.
    pub fn rendered_len(self) -> Option<usize> {
        match self {
            TimestampFormat::Epoch => None,
            TimestampFormat::Dashed => Some(19),
            TimestampFormat::Compact => Some(14),
        }
    }
}

impl fmt::Display for TimestampFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TimestampFormat {
    type Err = LookoutError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim() {
            "EPOCH" => Ok(TimestampFormat::Epoch),
            "yyyy-MM-dd-HH-mm-ss" => Ok(TimestampFormat::Dashed),
            "yyyyMMddHHmmss" => Ok(TimestampFormat::Compact),
            other => Err(LookoutError::invalid_config(
                "timestamp_format",
                other,
                "expected EPOCH, yyyy-MM-dd-HH-mm-ss or yyyyMMddHHmmss",
            )),
        }
    }
}

// ── Timezone offset ───────────────────────────────────────────

/// Signed offset from UTC, −12:00..=+12:00 in 30-minute steps.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct TimezoneOffset {
    minutes: i32,
}

impl TimezoneOffset {
    pub const UTC: TimezoneOffset = TimezoneOffset { minutes: 0 };

    pub fn from_minutes(minutes: i32) -> Result<Self> {
        if minutes.abs() > 12 * 60 {
            return Err(LookoutError::invalid_config(
                "timezone_offset",
                minutes.to_string(),
                "offset must lie within -12:00..+12:00",
            ));
        }
        if minutes % 30 != 0 {
            return Err(LookoutError::invalid_config(
                "timezone_offset",
                minutes.to_string(),
                "offset must be a multiple of 30 minutes",
            ));
        }
        Ok(Self { minutes })
    }

    pub fn minutes(self) -> i32 {
        self.minutes
    }

    pub fn fixed_offset(self) -> FixedOffset {
        // Range is validated on construction.
        FixedOffset::east_opt(self.minutes * 60).unwrap_or_else(|| Utc.fix())
    }
}

impl fmt::Display for TimezoneOffset {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let sign = if self.minutes < 0 { '-' } else { '+' };
        let abs = self.minutes.abs();
        write!(f, "{}{:02}:{:02}", sign, abs / 60, abs % 60)
    }
}

impl FromStr for TimezoneOffset {
    type Err = LookoutError;

    fn from_str(s: &str) -> Result<Self> {
        let raw = s.trim();
        let bad = |reason: &str| LookoutError::invalid_config("timezone_offset", s, reason);

        let (sign, rest) = match raw.chars().next() {
            Some('+') => (1, &raw[1..]),
            Some('-') => (-1, &raw[1..]),
            Some(_) => (1, raw),
            None => return Err(bad("empty offset")),
        };
        let (h, m) = rest.split_once(':').ok_or_else(|| bad("expected ±HH:MM"))?;
        let two_digits = |part: &str| part.len() == 2 && part.bytes().all(|b| b.is_ascii_digit());
        if !two_digits(h) || !two_digits(m) {
            return Err(bad("expected ±HH:MM"));
        }
        let hours: i32 = h.parse().map_err(|_| bad("hours are not numeric"))?;
        let minutes: i32 = m.parse().map_err(|_| bad("minutes are not numeric"))?;
        if minutes >= 60 {
            return Err(bad("minutes must be below 60"));
        }
        Self::from_minutes(sign * (hours * 60 + minutes))
            .map_err(|_| bad("offset must lie within -12:00..+12:00 in 30-minute steps"))
    }
}

impl TryFrom<String> for TimezoneOffset {
    type Error = LookoutError;

    fn try_from(value: String) -> Result<Self> {
        value.parse()
    }
}

impl From<TimezoneOffset> for String {
    fn from(value: TimezoneOffset) -> Self {
        value.to_string()
    }
}

// ── Schedule state ────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ScheduleState {
    Uncreated,
    Running,
    Stopped,
    Deleted,
}

impl fmt::Display for ScheduleState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            ScheduleState::Uncreated => "UNCREATED",
            ScheduleState::Running => "RUNNING",
            ScheduleState::Stopped => "STOPPED",
            ScheduleState::Deleted => "DELETED",
        })
    }
}

// ── Raw settings ──────────────────────────────────────────────

/// Unvalidated schedule settings as read from env / CLI.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ScheduleSettings {
    pub schedule_name: Option<String>,
    pub model_name: Option<String>,
    pub region: String,
    pub role_arn: Option<String>,
    pub input_bucket: Option<String>,
    pub input_prefix: Option<String>,
    pub output_bucket: Option<String>,
    pub output_prefix: Option<String>,
    pub upload_frequency: Option<String>,
    pub delay_offset_minutes: Option<String>,
    pub timezone_offset: Option<String>,
    pub component_delimiter: Option<String>,
    pub timestamp_format: Option<String>,
}

// ── Validated configuration ───────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScheduleConfig {
    pub schedule_name: String,
    pub model_name: String,
    pub region: String,
    /// IAM role the remote assumes to read inputs and write outputs.
    pub role_arn: String,
    pub input_bucket: String,
    pub input_prefix: String,
    pub output_bucket: String,
    pub output_prefix: String,
    pub upload_frequency: UploadFrequency,
    pub delay_offset_minutes: u32,
    pub timezone_offset: TimezoneOffset,
    pub component_delimiter: ComponentDelimiter,
    pub timestamp_format: TimestampFormat,
}

fn required(field: &'static str, value: &Option<String>) -> Result<String> {
    match value.as_deref().map(str::trim) {
        Some(v) if !v.is_empty() => Ok(v.to_string()),
        _ => Err(LookoutError::invalid_config(field, "", "required")),
    }
}

/// The naming and timing half of a schedule: everything the resolver needs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScheduleTiming {
    pub upload_frequency: UploadFrequency,
    pub delay_offset_minutes: u32,
    pub timezone_offset: TimezoneOffset,
    pub component_delimiter: ComponentDelimiter,
    pub timestamp_format: TimestampFormat,
}

impl ScheduleTiming {
    /// Absent keys take the documented defaults (PT5M, 0, +00:00, `_`,
    /// yyyyMMddHHmmss); present but invalid values are rejected.
    pub fn from_settings(s: &ScheduleSettings) -> Result<Self> {
        let upload_frequency = match &s.upload_frequency {
            Some(v) => v.parse()?,
            None => UploadFrequency::Pt5M,
        };
        let delay_offset_minutes = match &s.delay_offset_minutes {
            Some(v) => v.trim().parse::<u32>().map_err(|_| {
                LookoutError::invalid_config(
                    "delay_offset_minutes",
                    v.as_str(),
                    "expected a non-negative integer",
                )
            })?,
            None => 0,
        };
        let timezone_offset = match &s.timezone_offset {
            Some(v) => v.parse()?,
            None => TimezoneOffset::UTC,
        };
        let component_delimiter = match &s.component_delimiter {
            Some(v) => v.parse()?,
            None => ComponentDelimiter::Underscore,
        };
        let timestamp_format = match &s.timestamp_format {
            Some(v) => v.parse()?,
            None => TimestampFormat::Compact,
        };

        Ok(Self {
            upload_frequency,
            delay_offset_minutes,
            timezone_offset,
            component_delimiter,
            timestamp_format,
        })
    }
}

impl ScheduleConfig {
    /// Validate raw settings: identifiers and buckets are required, timing
    /// keys follow [`ScheduleTiming::from_settings`].
    pub fn from_settings(s: &ScheduleSettings) -> Result<Self> {
        let ScheduleTiming {
            upload_frequency,
            delay_offset_minutes,
            timezone_offset,
            component_delimiter,
            timestamp_format,
        } = ScheduleTiming::from_settings(s)?;

        Ok(Self {
            schedule_name: required("schedule_name", &s.schedule_name)?,
            model_name: required("model_name", &s.model_name)?,
            region: s.region.clone(),
            role_arn: required("role_arn", &s.role_arn)?,
            input_bucket: required("input_bucket", &s.input_bucket)?,
            input_prefix: s.input_prefix.clone().unwrap_or_default(),
            output_bucket: required("output_bucket", &s.output_bucket)?,
            output_prefix: s.output_prefix.clone().unwrap_or_default(),
            upload_frequency,
            delay_offset_minutes,
            timezone_offset,
            component_delimiter,
            timestamp_format,
        })
    }
}
