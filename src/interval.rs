//! Millisecond durations used for decay windows and simulated delays.
//!
//! Display follows the compact `h/m/s` notation used in generated feature
//! names (`1m0s`, `1h0m0s`, `720h0m0s`), so the column names stay stable
//! across runs and match previously produced datasets.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

pub const MS_PER_SECOND: i64 = 1_000;
pub const MS_PER_MINUTE: i64 = 60 * MS_PER_SECOND;
pub const MS_PER_HOUR: i64 = 60 * MS_PER_MINUTE;
pub const MS_PER_DAY: i64 = 24 * MS_PER_HOUR;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Interval(i64);

#[derive(Debug, Error, PartialEq, Eq)]
pub enum IntervalError {
    #[error("empty interval")]
    Empty,
    #[error("invalid interval '{0}'")]
    Invalid(String),
    #[error("unknown interval unit '{unit}' in '{raw}'")]
    UnknownUnit { raw: String, unit: String },
    #[error("interval '{0}' overflows i64 milliseconds")]
    Overflow(String),
}

impl Interval {
    pub const ZERO: Interval = Interval(0);

    pub const fn from_millis(ms: i64) -> Self {
        Self(ms)
    }

    pub const fn from_minutes(minutes: i64) -> Self {
        Self(minutes * MS_PER_MINUTE)
    }

    pub const fn from_hours(hours: i64) -> Self {
        Self(hours * MS_PER_HOUR)
    }

    pub const fn from_days(days: i64) -> Self {
        Self(days * MS_PER_DAY)
    }

    pub const fn as_millis(self) -> i64 {
        self.0
    }

    pub fn is_negative(self) -> bool {
        self.0 < 0
    }
}

impl fmt::Display for Interval {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.0 == 0 {
            return f.write_str("0s");
        }
        if self.0 < 0 {
            f.write_str("-")?;
        }

        let abs = self.0.unsigned_abs();
        if abs < MS_PER_SECOND as u64 {
            return write!(f, "{abs}ms");
        }

        let hours = abs / MS_PER_HOUR as u64;
        let minutes = (abs / MS_PER_MINUTE as u64) % 60;
        let seconds = (abs / MS_PER_SECOND as u64) % 60;
        let millis = abs % MS_PER_SECOND as u64;

        let seconds = if millis == 0 {
            seconds.to_string()
        } else {
            let frac = format!("{millis:03}");
            format!("{seconds}.{}", frac.trim_end_matches('0'))
        };

        if hours > 0 {
            write!(f, "{hours}h{minutes}m{seconds}s")
        } else if minutes > 0 {
            write!(f, "{minutes}m{seconds}s")
        } else {
            write!(f, "{seconds}s")
        }
    }
}

impl FromStr for Interval {
    type Err = IntervalError;

    // Parses concatenated `<number><unit>` terms, e.g. `30d`, `1h30m`,
    // `1.5s`, `500ms`. Units: `ms`, `s`, `m`, `h`, `d`. Fractions below one
    // millisecond are truncated.
    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        let input = raw.trim();
        if input.is_empty() {
            return Err(IntervalError::Empty);
        }

        let (negative, body) = match input.strip_prefix('-') {
            Some(rest) => (true, rest),
            None => (false, input),
        };
        if body.is_empty() {
            return Err(IntervalError::Invalid(raw.to_string()));
        }

        let mut total: i64 = 0;
        let mut rest = body;
        while !rest.is_empty() {
            let whole_end = rest
                .find(|c: char| !c.is_ascii_digit())
                .unwrap_or(rest.len());
            let whole = &rest[..whole_end];
            rest = &rest[whole_end..];

            let mut fraction = "";
            if let Some(after_dot) = rest.strip_prefix('.') {
                let fraction_end = after_dot
                    .find(|c: char| !c.is_ascii_digit())
                    .unwrap_or(after_dot.len());
                fraction = &after_dot[..fraction_end];
                rest = &after_dot[fraction_end..];
                if fraction.is_empty() && whole.is_empty() {
                    return Err(IntervalError::Invalid(raw.to_string()));
                }
            } else if whole.is_empty() {
                return Err(IntervalError::Invalid(raw.to_string()));
            }

            let amount: i64 = if whole.is_empty() {
                0
            } else {
                whole
                    .parse()
                    .map_err(|_| IntervalError::Overflow(raw.to_string()))?
            };

            let unit_end = rest
                .find(|c: char| c.is_ascii_digit() || c == '.')
                .unwrap_or(rest.len());
            let unit = &rest[..unit_end];
            rest = &rest[unit_end..];

            let scale = match unit {
                "ms" => 1,
                "s" => MS_PER_SECOND,
                "m" => MS_PER_MINUTE,
                "h" => MS_PER_HOUR,
                "d" => MS_PER_DAY,
                "" => return Err(IntervalError::Invalid(raw.to_string())),
                other => {
                    return Err(IntervalError::UnknownUnit {
                        raw: raw.to_string(),
                        unit: other.to_string(),
                    })
                }
            };

            total = amount
                .checked_mul(scale)
                .and_then(|term| term.checked_add(fraction_millis(fraction, scale)))
                .and_then(|term| total.checked_add(term))
                .ok_or_else(|| IntervalError::Overflow(raw.to_string()))?;
        }

        Ok(Self(if negative { -total } else { total }))
    }
}

// Digits past the twelfth are ignored.
fn fraction_millis(digits: &str, scale: i64) -> i64 {
    let digits = &digits[..digits.len().min(12)];
    let mut numerator: i128 = 0;
    let mut denominator: i128 = 1;
    for digit in digits.bytes() {
        numerator = numerator * 10 + i128::from(digit - b'0');
        denominator *= 10;
    }
    (numerator * i128::from(scale) / denominator) as i64
}

impl TryFrom<String> for Interval {
    type Error = IntervalError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<Interval> for String {
    fn from(value: Interval) -> Self {
        value.to_string()
    }
}
