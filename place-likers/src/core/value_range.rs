//! Count values configured either as a fixed number (`"40"`) or an inclusive
//! range (`"30-50"`).
//!
//! Ranges are resolved with a caller-provided random source so that every
//! consumer can be driven deterministically in tests.

use std::fmt;
use std::str::FromStr;

use anyhow::{Result, anyhow};
use rand::Rng;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "RawValue", into = "String")]
pub enum ValueRange {
    Fixed(u32),
    Between { min: u32, max: u32 },
}

/// TOML accepts both `likes_count = 2` and `likes_count = "1-2"`.
#[derive(Deserialize)]
#[serde(untagged)]
enum RawValue {
    Number(u32),
    Text(String),
}

impl ValueRange {
    /// Pick a concrete value. Fixed values never consume randomness.
    pub fn resolve<R: Rng + ?Sized>(&self, rng: &mut R) -> u32 {
        match *self {
            ValueRange::Fixed(value) => value,
            ValueRange::Between { min, max } => rng.gen_range(min..=max),
        }
    }

    /// Largest value this range can resolve to.
    pub fn upper_bound(&self) -> u32 {
        match *self {
            ValueRange::Fixed(value) => value,
            ValueRange::Between { max, .. } => max,
        }
    }

    pub fn is_zero(&self) -> bool {
        self.upper_bound() == 0
    }
}

/// Resolve an optional value, falling back to `default` when unset.
pub fn resolve_or<R: Rng + ?Sized>(value: Option<ValueRange>, default: u32, rng: &mut R) -> u32 {
    value.map_or(default, |value| value.resolve(rng))
}

impl FromStr for ValueRange {
    type Err = anyhow::Error;

    fn from_str(raw: &str) -> Result<Self> {
        let trimmed = raw.trim();
        let parse = |part: &str| {
            part.trim()
                .parse::<u32>()
                .map_err(|_| anyhow!("invalid value '{trimmed}': expected N or N-M"))
        };
        match trimmed.split_once('-') {
            None => Ok(ValueRange::Fixed(parse(trimmed)?)),
            Some((min, max)) => {
                let (min, max) = (parse(min)?, parse(max)?);
                if min > max {
                    return Err(anyhow!("invalid range '{trimmed}': {min} > {max}"));
                }
                if min == max {
                    return Ok(ValueRange::Fixed(min));
                }
                Ok(ValueRange::Between { min, max })
            }
        }
    }
}

impl TryFrom<RawValue> for ValueRange {
    type Error = anyhow::Error;

    fn try_from(raw: RawValue) -> Result<Self> {
        match raw {
            RawValue::Number(value) => Ok(ValueRange::Fixed(value)),
            RawValue::Text(text) => text.parse(),
        }
    }
}

impl From<ValueRange> for String {
    fn from(value: ValueRange) -> Self {
        value.to_string()
    }
}

impl fmt::Display for ValueRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ValueRange::Fixed(value) => write!(f, "{value}"),
            ValueRange::Between { min, max } => write!(f, "{min}-{max}"),
        }
    }
}
