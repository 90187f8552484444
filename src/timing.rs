//! Time modes, units and wall-clock parsing shared by requests, preferences
//! and the snapshot.

use crate::error::{Result, TimerError};
use chrono::{DateTime, Duration, NaiveTime, TimeZone};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;

/// Largest accepted relative delay, in units.
pub const MAX_DELAY: u32 = 86_400;

/// How the end of a task is expressed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TimeMode {
    /// `delay` + `unit` from now.
    #[default]
    Relative,
    /// Next occurrence of a wall-clock `HH:MM`.
    Absolute,
}

impl TimeMode {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Relative => "relative",
            Self::Absolute => "absolute",
        }
    }
}

/// Unit of a relative delay.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TimeUnit {
    Seconds,
    #[default]
    Minutes,
    Hours,
}

impl TimeUnit {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Seconds => "seconds",
            Self::Minutes => "minutes",
            Self::Hours => "hours",
        }
    }

    /// Parse a unit name; unknown names are rejected.
    #[must_use]
    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "seconds" | "second" | "s" | "sec" => Some(Self::Seconds),
            "minutes" | "minute" | "m" | "min" => Some(Self::Minutes),
            "hours" | "hour" | "h" => Some(Self::Hours),
            _ => None,
        }
    }

    /// Convert a delay in this unit to seconds.
    #[must_use]
    pub fn to_seconds(self, delay: u32) -> u64 {
        let delay = u64::from(delay);
        match self {
            Self::Seconds => delay,
            Self::Minutes => delay * 60,
            Self::Hours => delay * 3600,
        }
    }
}

/// A wall-clock time of day, `HH:MM` on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct AtTime {
    hour: u8,
    minute: u8,
}

impl AtTime {
    pub const MIDNIGHT: Self = Self { hour: 0, minute: 0 };

    /// Build from components, rejecting out-of-range values.
    pub fn new(hour: u8, minute: u8) -> Result<Self> {
        if hour > 23 || minute > 59 {
            return Err(TimerError::Validation(format!(
                "time {hour:02}:{minute:02} is out of range"
            )));
        }
        Ok(Self { hour, minute })
    }

    #[must_use]
    pub fn hour(self) -> u8 {
        self.hour
    }

    #[must_use]
    pub fn minute(self) -> u8 {
        self.minute
    }

    fn naive(self) -> NaiveTime {
        NaiveTime::from_hms_opt(u32::from(self.hour), u32::from(self.minute), 0)
            .unwrap_or(NaiveTime::MIN)
    }
}

impl FromStr for AtTime {
    type Err = TimerError;

    fn from_str(raw: &str) -> Result<Self> {
        let raw = raw.trim();
        let invalid = || TimerError::Validation(format!("`{raw}` is not a HH:MM time"));
        let (h, m) = raw.split_once(':').ok_or_else(invalid)?;
        if h.is_empty() || h.len() > 2 || m.len() != 2 {
            return Err(invalid());
        }
        let hour: u8 = h.parse().map_err(|_| invalid())?;
        let minute: u8 = m.parse().map_err(|_| invalid())?;
        Self::new(hour, minute)
    }
}

impl fmt::Display for AtTime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:02}:{:02}", self.hour, self.minute)
    }
}

impl Serialize for AtTime {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for AtTime {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        raw.parse().map_err(serde::de::Error::custom)
    }
}

/// When a task ends: either a relative delay or an absolute wall-clock time.
///
/// The two shapes are exclusive so a form or request can never carry a
/// relative delay alongside an absolute time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "time_mode", rename_all = "snake_case", try_from = "WireTimeSpec")]
pub enum TimeSpec {
    Relative {
        delay: u32,
        #[serde(default)]
        unit: TimeUnit,
    },
    Absolute {
        at_time: AtTime,
    },
}

impl TimeSpec {
    /// Relative delay, validated against `1..=MAX_DELAY`.
    pub fn relative(delay: u32, unit: TimeUnit) -> Result<Self> {
        let spec = Self::Relative { delay, unit };
        spec.validate()?;
        Ok(spec)
    }

    /// Absolute time parsed from `HH:MM`.
    pub fn absolute(raw: &str) -> Result<Self> {
        Ok(Self::Absolute {
            at_time: raw.parse()?,
        })
    }

    #[must_use]
    pub fn mode(&self) -> TimeMode {
        match self {
            Self::Relative { .. } => TimeMode::Relative,
            Self::Absolute { .. } => TimeMode::Absolute,
        }
    }

    /// Reject delays outside `1..=MAX_DELAY`.
    pub fn validate(&self) -> Result<()> {
        match *self {
            Self::Relative { delay, .. } if delay == 0 || delay > MAX_DELAY => Err(
                TimerError::Validation(format!("delay must be between 1 and {MAX_DELAY}, got {delay}")),
            ),
            _ => Ok(()),
        }
    }

    /// Seconds from `now` until the task should end.
    pub fn duration_from<Tz: TimeZone>(&self, now: &DateTime<Tz>) -> u64 {
        match *self {
            Self::Relative { delay, unit } => unit.to_seconds(delay),
            Self::Absolute { at_time } => seconds_until(at_time, now),
        }
    }
}

impl Default for TimeSpec {
    fn default() -> Self {
        Self::Relative {
            delay: DEFAULT_DELAY,
            unit: TimeUnit::Minutes,
        }
    }
}

/// Delay used when a request names none.
pub const DEFAULT_DELAY: u32 = 15;

/// Inbound shape of a [`TimeSpec`]. A missing mode means relative, and a
/// relative spec without a delay or unit falls back to the defaults.
#[derive(Deserialize)]
struct WireTimeSpec {
    #[serde(default)]
    time_mode: TimeMode,
    #[serde(default)]
    delay: Option<u32>,
    #[serde(default)]
    unit: Option<TimeUnit>,
    #[serde(default)]
    at_time: Option<AtTime>,
}

impl TryFrom<WireTimeSpec> for TimeSpec {
    type Error = TimerError;

    fn try_from(wire: WireTimeSpec) -> Result<Self> {
        match wire.time_mode {
            TimeMode::Relative => Ok(Self::Relative {
                delay: wire.delay.unwrap_or(DEFAULT_DELAY),
                unit: wire.unit.unwrap_or_default(),
            }),
            TimeMode::Absolute => wire
                .at_time
                .map(|at_time| Self::Absolute { at_time })
                .ok_or_else(|| {
                    TimerError::Validation("absolute time mode requires at_time".to_owned())
                }),
        }
    }
}

/// Next occurrence of `at` after `now`, in `now`'s time zone.
///
/// A time at or before `now` on the current local day rolls over to the next
/// day. When the local time does not exist (DST gap) the instant one hour
/// later is used.
pub fn next_occurrence<Tz: TimeZone>(at: AtTime, now: &DateTime<Tz>) -> DateTime<Tz> {
    let tz = now.timezone();
    let resolve = |date: chrono::NaiveDate| {
        let naive = date.and_time(at.naive());
        tz.from_local_datetime(&naive)
            .earliest()
            .or_else(|| {
                tz.from_local_datetime(&(naive + Duration::hours(1)))
                    .earliest()
            })
            .unwrap_or_else(|| tz.from_utc_datetime(&naive))
    };

    let today = now.date_naive();
    let candidate = resolve(today);
    if candidate > *now {
        return candidate;
    }
    match today.succ_opt() {
        Some(tomorrow) => resolve(tomorrow),
        None => candidate,
    }
}

/// Seconds from `now` until the next occurrence of `at`.
pub fn seconds_until<Tz: TimeZone>(at: AtTime, now: &DateTime<Tz>) -> u64 {
    let target = next_occurrence(at, now);
    let secs = target.signed_duration_since(now.clone()).num_seconds();
    u64::try_from(secs).unwrap_or(0)
}
