// SPDX-License-Identifier: MIT OR Apache-2.0

//! Timestamps as an integer `(seconds, microseconds)` pair.
//!
//! Comparison is lexicographic, which the derived `Ord` provides since the
//! fields are declared most-significant first.

use std::fmt;
use std::ops::{Add, Sub};

use serde::{Deserialize, Serialize};

use crate::core::error::{EngineError, EngineResult};

const MICROS_PER_SEC: u32 = 1_000_000;

#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
pub struct Time {
    pub sec: i64,
    pub usec: u32,
}

impl Time {
    pub const ZERO: Time = Time { sec: 0, usec: 0 };

    pub fn new(sec: i64, usec: u32) -> Self {
        Self { sec, usec }
    }

    /// Parse a delta from a numeric string and a unit qualifier
    /// (`s`/`sec`/`secs` or `ms`/`msec`/`msecs`).
    pub fn from_str_with_unit(value: &str, unit: &str) -> EngineResult<Self> {
        let number: f64 = value
            .trim()
            .parse()
            .map_err(|_| EngineError::syntax(format!("invalid time value '{value}'")))?;
        if number < 0.0 {
            return Err(EngineError::syntax(format!(
                "negative time value '{value}'"
            )));
        }
        let micros = match unit.to_ascii_uppercase().as_str() {
            "S" | "SEC" | "SECS" => (number * f64::from(MICROS_PER_SEC)) as i64,
            "MS" | "MSEC" | "MSECS" => (number * 1_000.0) as i64,
            other => {
                return Err(EngineError::syntax(format!(
                    "invalid time qualifier '{other}'"
                )))
            }
        };
        Ok(Self::from_micros(micros))
    }

    fn from_micros(micros: i64) -> Self {
        Self {
            sec: micros.div_euclid(i64::from(MICROS_PER_SEC)),
            usec: micros.rem_euclid(i64::from(MICROS_PER_SEC)) as u32,
        }
    }

    fn as_micros(self) -> i64 {
        self.sec * i64::from(MICROS_PER_SEC) + i64::from(self.usec)
    }

    pub fn as_secs_f64(self) -> f64 {
        self.sec as f64 + f64::from(self.usec) / f64::from(MICROS_PER_SEC)
    }

    /// Difference from `earlier`, saturating at zero.
    pub fn since(self, earlier: Time) -> Time {
        let diff = self.as_micros() - earlier.as_micros();
        Self::from_micros(diff.max(0))
    }
}

impl Add for Time {
    type Output = Time;

    fn add(self, rhs: Time) -> Time {
        Time::from_micros(self.as_micros() + rhs.as_micros())
    }
}

impl Sub for Time {
    type Output = Time;

    fn sub(self, rhs: Time) -> Time {
        self.since(rhs)
    }
}

impl fmt::Display for Time {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{:06}", self.sec, self.usec)
    }
}
