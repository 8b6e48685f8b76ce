//! Simulation time with femtosecond precision and duration parsing.
//!
//! [`SimTime`] is used both for absolute edge instants on the scheduler
//! timeline and for spans such as "2us of PLL reset" in the configuration.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::ops::{Add, Mul, Sub};
use std::str::FromStr;

/// Femtoseconds per picosecond.
pub const FS_PER_PS: u64 = 1_000;
/// Femtoseconds per nanosecond.
pub const FS_PER_NS: u64 = 1_000_000;
/// Femtoseconds per microsecond.
pub const FS_PER_US: u64 = 1_000_000_000;
/// Femtoseconds per millisecond.
pub const FS_PER_MS: u64 = 1_000_000_000_000;
/// Femtoseconds per second.
pub const FS_PER_S: u64 = 1_000_000_000_000_000;

/// A point on (or a span of) the simulation timeline, in femtoseconds.
#[derive(
    Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
pub struct SimTime {
    /// Time in femtoseconds.
    pub fs: u64,
}

impl SimTime {
    /// Time zero.
    pub const ZERO: SimTime = SimTime { fs: 0 };

    /// Creates a time from a femtosecond value.
    pub fn from_fs(fs: u64) -> Self {
        Self { fs }
    }

    /// Creates a time from a picosecond value.
    pub fn from_ps(ps: u64) -> Self {
        Self { fs: ps * FS_PER_PS }
    }

    /// Creates a time from a nanosecond value.
    pub fn from_ns(ns: u64) -> Self {
        Self { fs: ns * FS_PER_NS }
    }

    /// Creates a time from a microsecond value.
    pub fn from_us(us: u64) -> Self {
        Self { fs: us * FS_PER_US }
    }

    /// Creates a time from a millisecond value.
    pub fn from_ms(ms: u64) -> Self {
        Self { fs: ms * FS_PER_MS }
    }

    /// Converts to nanoseconds (truncated).
    pub fn to_ns(&self) -> u64 {
        self.fs / FS_PER_NS
    }
}

impl Add for SimTime {
    type Output = SimTime;

    fn add(self, rhs: SimTime) -> SimTime {
        SimTime {
            fs: self.fs + rhs.fs,
        }
    }
}

impl Sub for SimTime {
    type Output = SimTime;

    fn sub(self, rhs: SimTime) -> SimTime {
        SimTime {
            fs: self.fs.saturating_sub(rhs.fs),
        }
    }
}

impl Mul<u64> for SimTime {
    type Output = SimTime;

    fn mul(self, rhs: u64) -> SimTime {
        SimTime { fs: self.fs * rhs }
    }
}

impl fmt::Display for SimTime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let fs = self.fs;
        if fs == 0 {
            write!(f, "0 fs")
        } else if fs >= FS_PER_MS && fs.is_multiple_of(FS_PER_MS) {
            write!(f, "{} ms", fs / FS_PER_MS)
        } else if fs >= FS_PER_US && fs.is_multiple_of(FS_PER_US) {
            write!(f, "{} us", fs / FS_PER_US)
        } else if fs >= FS_PER_NS && fs.is_multiple_of(FS_PER_NS) {
            write!(f, "{} ns", fs / FS_PER_NS)
        } else if fs >= FS_PER_PS && fs.is_multiple_of(FS_PER_PS) {
            write!(f, "{} ps", fs / FS_PER_PS)
        } else {
            write!(f, "{fs} fs")
        }
    }
}

/// Error returned when a duration string such as `"2us"` cannot be parsed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParseTimeError {
    /// Description of what is wrong with the input.
    pub reason: String,
}

impl fmt::Display for ParseTimeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.reason)
    }
}

impl std::error::Error for ParseTimeError {}

impl FromStr for SimTime {
    type Err = ParseTimeError;

    /// Parses `"<integer><unit>"` with unit one of fs, ps, ns, us, ms, s.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        let err = |reason: String| ParseTimeError { reason };
        if s.is_empty() {
            return Err(err("empty duration string".into()));
        }

        let digit_end = s.find(|c: char| !c.is_ascii_digit()).unwrap_or(s.len());
        if digit_end == 0 {
            return Err(err(format!(
                "invalid duration: no numeric value in '{s}'"
            )));
        }

        let number: u64 = s[..digit_end]
            .parse()
            .map_err(|_| err(format!("invalid number in duration '{s}'")))?;

        let unit = s[digit_end..].trim();
        let multiplier = match unit {
            "fs" => 1,
            "ps" => FS_PER_PS,
            "ns" => FS_PER_NS,
            "us" => FS_PER_US,
            "ms" => FS_PER_MS,
            "s" => FS_PER_S,
            "" => {
                return Err(err(format!(
                    "missing unit in duration '{s}' (use fs, ps, ns, us, ms, or s)"
                )))
            }
            _ => {
                return Err(err(format!(
                    "unknown duration unit '{unit}' (use fs, ps, ns, us, ms, or s)"
                )))
            }
        };

        number
            .checked_mul(multiplier)
            .map(SimTime::from_fs)
            .ok_or_else(|| err(format!("duration '{s}' is too large")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn constructors() {
        assert_eq!(SimTime::from_ns(10).fs, 10_000_000);
        assert_eq!(SimTime::from_ps(500).fs, 500_000);
        assert_eq!(SimTime::from_us(2).fs, 2 * FS_PER_US);
        assert_eq!(SimTime::from_ms(1).fs, FS_PER_MS);
    }

    #[test]
    fn arithmetic() {
        let t = SimTime::from_ns(8) * 3 + SimTime::from_ns(1);
        assert_eq!(t, SimTime::from_ns(25));
        assert_eq!(SimTime::from_ns(1) - SimTime::from_ns(5), SimTime::ZERO);
    }

    #[test]
    fn to_ns_truncates() {
        assert_eq!(SimTime::from_fs(1_500_000).to_ns(), 1);
    }

    #[test]
    fn display_units() {
        assert_eq!(SimTime::ZERO.to_string(), "0 fs");
        assert_eq!(SimTime::from_ns(10).to_string(), "10 ns");
        assert_eq!(SimTime::from_ps(500).to_string(), "500 ps");
        assert_eq!(SimTime::from_us(5).to_string(), "5 us");
        assert_eq!(SimTime::from_ms(2).to_string(), "2 ms");
        assert_eq!(SimTime::from_fs(1500).to_string(), "1500 fs");
    }

    #[test]
    fn parse_units() {
        assert_eq!("100ns".parse::<SimTime>().unwrap(), SimTime::from_ns(100));
        assert_eq!("2us".parse::<SimTime>().unwrap(), SimTime::from_us(2));
        assert_eq!("1ms".parse::<SimTime>().unwrap(), SimTime::from_ms(1));
        assert_eq!("250ps".parse::<SimTime>().unwrap(), SimTime::from_ps(250));
        assert_eq!("  50ns ".parse::<SimTime>().unwrap(), SimTime::from_ns(50));
    }

    #[test]
    fn parse_errors() {
        let err = "100xyz".parse::<SimTime>().unwrap_err();
        assert!(err.to_string().contains("unknown duration unit"));
        let err = "ns".parse::<SimTime>().unwrap_err();
        assert!(err.to_string().contains("no numeric value"));
        let err = "".parse::<SimTime>().unwrap_err();
        assert!(err.to_string().contains("empty"));
        let err = "100".parse::<SimTime>().unwrap_err();
        assert!(err.to_string().contains("missing unit"));
    }

    #[test]
    fn serde_roundtrip() {
        let t = SimTime::from_ns(12);
        let json = serde_json::to_string(&t).unwrap();
        let back: SimTime = serde_json::from_str(&json).unwrap();
        assert_eq!(t, back);
    }
}
