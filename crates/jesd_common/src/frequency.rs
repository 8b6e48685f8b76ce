//! Clock frequencies with unit parsing, display, and cycle arithmetic.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::time::{SimTime, FS_PER_S};

/// A clock frequency stored in Hertz.
///
/// Supports parsing from strings like "125MHz", "100KHz", "1GHz", "48000Hz",
/// and bare numeric values (interpreted as Hz). Displays using the most
/// appropriate unit for readability.
#[derive(Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Frequency(f64);

impl Frequency {
    /// Creates a new frequency from a value in Hertz.
    pub fn new(hz: f64) -> Self {
        Self(hz)
    }

    /// Creates a new frequency from a value in megahertz.
    pub fn from_mhz(mhz: f64) -> Self {
        Self(mhz * 1_000_000.0)
    }

    /// Returns the frequency in Hertz.
    pub fn hz(&self) -> f64 {
        self.0
    }

    /// Returns the frequency in megahertz.
    pub fn mhz(&self) -> f64 {
        self.0 / 1_000_000.0
    }

    /// Returns `true` if the frequency can clock a domain (finite and positive).
    pub fn is_usable(&self) -> bool {
        self.0.is_finite() && self.0 > 0.0
    }

    /// Returns the clock period, rounded to the nearest femtosecond.
    pub fn period(&self) -> SimTime {
        SimTime::from_fs((FS_PER_S as f64 / self.0).round() as u64)
    }

    /// Returns the number of whole cycles needed to cover `span`, rounding up.
    ///
    /// A 2 us span at 125 MHz is exactly 250 cycles. Products that land within
    /// floating-point noise of an integer are not bumped to the next cycle.
    pub fn cycles_in(&self, span: SimTime) -> u64 {
        let cycles = span.fs as f64 * self.0 / FS_PER_S as f64;
        let nearest = cycles.round();
        if (cycles - nearest).abs() < 1e-6 {
            nearest as u64
        } else {
            cycles.ceil() as u64
        }
    }
}

impl fmt::Debug for Frequency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Frequency({self})")
    }
}

/// Unit suffixes, largest first.
const UNITS: [(&str, f64); 4] = [
    ("GHz", 1e9),
    ("MHz", 1e6),
    ("KHz", 1e3),
    ("Hz", 1.0),
];

impl fmt::Display for Frequency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let (unit, scale) = UNITS
            .iter()
            .copied()
            .find(|&(_, scale)| self.0 >= scale)
            .unwrap_or(("Hz", 1.0));
        write!(f, "{}{unit}", self.0 / scale)
    }
}

/// Error returned when a clock frequency such as `"125MHz"` cannot be parsed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParseFrequencyError {
    /// The rejected text.
    pub input: String,
}

impl fmt::Display for ParseFrequencyError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "'{}' is not a clock frequency", self.input)
    }
}

impl std::error::Error for ParseFrequencyError {}

impl FromStr for Frequency {
    type Err = ParseFrequencyError;

    /// Parses a number with an optional, case-insensitive unit suffix.
    /// A bare number is in Hz.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let text = s.trim();
        let lower = text.to_ascii_lowercase();
        let (digits, scale) = UNITS
            .iter()
            .find_map(|&(unit, scale)| {
                lower
                    .strip_suffix(&unit.to_ascii_lowercase())
                    .map(|digits| (digits, scale))
            })
            .unwrap_or((lower.as_str(), 1.0));

        match digits.trim().parse::<f64>() {
            Ok(value) => Ok(Frequency(value * scale)),
            Err(_) => Err(ParseFrequencyError {
                input: text.to_string(),
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn freq(s: &str) -> Frequency {
        s.parse().unwrap()
    }

    #[test]
    fn parses_unit_suffixes() {
        assert_eq!(freq("250MHz").hz(), 250e6);
        assert_eq!(freq("1.25GHz").mhz(), 1250.0);
        assert_eq!(freq("100khz").hz(), 100e3);
        assert_eq!(freq(" 125 MHz ").mhz(), 125.0);
        assert_eq!(freq("10000000").mhz(), 10.0);
    }

    #[test]
    fn rejects_garbage() {
        let err = "quick".parse::<Frequency>().unwrap_err();
        assert_eq!(err.to_string(), "'quick' is not a clock frequency");
        assert!("MHz".parse::<Frequency>().is_err());
    }

    #[test]
    fn lane_and_device_clock_periods() {
        assert_eq!(Frequency::from_mhz(125.0).period(), SimTime::from_ns(8));
        assert_eq!(Frequency::from_mhz(250.0).period(), SimTime::from_ns(4));
        assert_eq!(Frequency::from_mhz(312.5).period(), SimTime::from_ps(3200));
    }

    #[test]
    fn pll_reset_hold_in_lane_cycles() {
        let hold = SimTime::from_us(2);
        assert_eq!(Frequency::from_mhz(125.0).cycles_in(hold), 250);
        assert_eq!(Frequency::from_mhz(250.0).cycles_in(hold), 500);
        assert_eq!(Frequency::from_mhz(312.5).cycles_in(hold), 625);
    }

    #[test]
    fn partial_cycles_round_up() {
        assert_eq!(Frequency::from_mhz(250.0).cycles_in(SimTime::from_ns(5)), 2);
        assert_eq!(Frequency::from_mhz(250.0).cycles_in(SimTime::ZERO), 0);
    }

    #[test]
    fn only_positive_finite_clocks_are_usable() {
        assert!(!Frequency::new(0.0).is_usable());
        assert!(!Frequency::new(-1.0).is_usable());
        assert!(!Frequency::new(f64::INFINITY).is_usable());
        assert!(Frequency::from_mhz(250.0).is_usable());
    }

    #[test]
    fn displays_in_largest_whole_unit() {
        assert_eq!(Frequency::from_mhz(250.0).to_string(), "250MHz");
        assert_eq!(Frequency::new(2.5e9).to_string(), "2.5GHz");
        assert_eq!(Frequency::new(32_768.0).to_string(), "32.768KHz");
        assert_eq!(Frequency::new(50.0).to_string(), "50Hz");
    }
}
