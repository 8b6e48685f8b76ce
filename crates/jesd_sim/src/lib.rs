//! Cycle-level model of a multi-lane JESD204B transmit link core.
//!
//! The crate models the bring-up and supervision side of the core across
//! independent clock domains: the per-lane serializer bring-up state machine
//! ([`bringup`]), the cross-domain synchronizers ([`cdc`]), the boundary
//! buffers between the device and lane domains ([`ebuf`]), and the readiness
//! aggregation and restart broadcast that tie the lanes together
//! ([`aggregate`], [`controller`]).
//!
//! The serializer, the link-layer encoder, and the transport payload are
//! external collaborators, represented by the [`SerdesPhy`], [`LinkLayer`],
//! and [`PayloadSource`] traits with small behavioral models.
//!
//! ```no_run
//! use jesd_common::SimTime;
//! use jesd_config::{load_config, resolve_link};
//! use jesd_sim::{JsyncLevel, LinkBuilder};
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let config = load_config(std::path::Path::new("link.toml"))?;
//! let mut link = LinkBuilder::from_settings(resolve_link(&config)?).build()?;
//! link.drive_jsync(JsyncLevel::Signal(true))?;
//! link.set_enable(true);
//! link.run_until(|l| l.status().ready, SimTime::from_ms(1))?;
//! # Ok(())
//! # }
//! ```

#![warn(missing_docs)]

pub mod aggregate;
pub mod bringup;
pub mod cdc;
pub mod controller;
pub mod ebuf;
pub mod error;
pub mod event;
pub mod kernel;
pub mod link_layer;
pub mod phy;
pub mod timer;
pub mod transport;
pub mod waveform;

pub use aggregate::{LinkStatus, ReadinessAggregator};
pub use bringup::{BringupState, BringupStep, BringupTiming, LaneBringup};
pub use cdc::{BitSync, BusSync, MIN_SYNC_STAGES};
pub use controller::{lane_domain, JsyncLevel, Lane, Link, LinkBuilder, CONTROL_DOMAIN, DEVICE_DOMAIN};
pub use ebuf::BoundaryBuffer;
pub use error::LinkError;
pub use event::{EventKind, EventLog, LinkEvent, Severity};
pub use kernel::DomainScheduler;
pub use link_layer::{HandshakeState, LinkInputs, LinkLayer, SyncHandshake};
pub use phy::{GtxModel, PhyControl, PhyStatus, PrbsGenerator, PrbsKind, SerdesPhy};
pub use timer::WaitTimer;
pub use transport::{LaneWord, PayloadSource, RampSource, StplGenerator};
pub use waveform::{VcdRecorder, WaveformRecorder};
