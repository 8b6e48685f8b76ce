//! Parsing and validation of `link.toml` link configuration files.
//!
//! This crate reads the link configuration file, validates it, and resolves
//! clock frequencies and durations into the per-domain cycle counts the
//! link model runs on.

#![warn(missing_docs)]

pub mod error;
pub mod loader;
pub mod resolve;
pub mod types;

pub use error::ConfigError;
pub use loader::{load_config, load_config_from_str, CONFIG_FILE_NAME};
pub use resolve::{resolve_link, ClockSpec, PhyTiming, ResolvedLink, MIN_PLL_RESET};
pub use types::*;
