//! Go-style durations (`10s`, `2m`, `1h30m`) as used in Kubernetes manifests
//! and controller flags.

use serde::{de, Deserialize, Deserializer, Serialize, Serializer};
use std::{fmt, str::FromStr, time::Duration};

/// A non-negative duration parsed from Go's `time.ParseDuration` format.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, PartialOrd, Ord)]
pub struct Interval(Duration);

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
#[non_exhaustive]
pub enum ParseError {
    #[error("invalid unit {:?}: {}", .0, EXPECTED_UNITS)]
    InvalidUnit(String),

    #[error("missing a unit: {}", EXPECTED_UNITS)]
    NoUnit,

    #[error("negative durations are not supported")]
    Negative,

    #[error("invalid number: {}", .0)]
    NotANumber(#[from] std::num::ParseFloatError),

    #[error("duration is too large")]
    Overflow,
}

const EXPECTED_UNITS: &str = "expected one of 'ns', 'us', '\u{00b5}s', 'ms', 's', 'm', or 'h'";

// === impl Interval ===

impl Interval {
    pub const ZERO: Self = Self(Duration::ZERO);

    pub const fn from_secs(secs: u64) -> Self {
        Self(Duration::from_secs(secs))
    }

    #[inline]
    pub fn as_duration(&self) -> Duration {
        self.0
    }

    #[inline]
    pub fn is_zero(&self) -> bool {
        self.0.is_zero()
    }

    fn unit(unit: &str) -> Result<Duration, ParseError> {
        Ok(match unit {
            "ns" => Duration::from_nanos(1),
            // U+00B5 is the micro sign; U+03BC is the Greek letter mu.
            "us" | "\u{00b5}s" | "\u{03bc}s" => Duration::from_micros(1),
            "ms" => Duration::from_millis(1),
            "s" => Duration::from_secs(1),
            "m" => Duration::from_secs(60),
            "h" => Duration::from_secs(60 * 60),
            _ => return Err(ParseError::InvalidUnit(unit.to_string())),
        })
    }
}

impl From<Duration> for Interval {
    fn from(d: Duration) -> Self {
        Self(d)
    }
}

impl From<Interval> for Duration {
    fn from(Interval(d): Interval) -> Self {
        d
    }
}

impl FromStr for Interval {
    type Err = ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut rest = s.trim();
        if let Some(unsigned) = rest.strip_prefix('-') {
            // Go accepts "-0"; there is nothing negative about it.
            if unsigned == "0" {
                return Ok(Self::ZERO);
            }
            return Err(ParseError::Negative);
        }
        rest = rest.strip_prefix('+').unwrap_or(rest);

        if rest == "0" {
            return Ok(Self::ZERO);
        }
        if rest.is_empty() {
            return Err(ParseError::NoUnit);
        }

        let mut total = Duration::ZERO;
        while !rest.is_empty() {
            let unit_start = rest
                .find(|c: char| c.is_alphabetic())
                .ok_or(ParseError::NoUnit)?;
            let (value, tail) = rest.split_at(unit_start);
            let value = value.parse::<f64>()?;
            // Only the leading sign is allowed (e.g. "1h-5m" is rejected).
            if value.is_sign_negative() {
                return Err(ParseError::Negative);
            }
            let unit_end = tail
                .find(|c: char| !c.is_alphabetic())
                .unwrap_or(tail.len());
            let (unit, tail) = tail.split_at(unit_end);
            let part = Duration::try_from_secs_f64(Self::unit(unit)?.as_secs_f64() * value)
                .map_err(|_| ParseError::Overflow)?;
            total = total.checked_add(part).ok_or(ParseError::Overflow)?;
            rest = tail;
        }

        Ok(Self(total))
    }
}

impl fmt::Display for Interval {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(&self.0, f)
    }
}

impl Serialize for Interval {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for Interval {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(de::Error::custom)
    }
}
