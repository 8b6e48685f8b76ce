//! Shared foundational types used across the JESD204B link model.
//!
//! This crate provides frequency values, femtosecond simulation time with
//! duration parsing, and the opaque identifiers used for lanes and clock domains.

#![warn(missing_docs)]

pub mod frequency;
pub mod ids;
pub mod time;

pub use frequency::{Frequency, ParseFrequencyError};
pub use ids::{DomainId, LaneId, SignalId};
pub use time::{ParseTimeError, SimTime};
