//! A TR-451 ONU simulator speaking the ITU-T G.988 OMCI protocol over UDP.
//!
//! The simulator plays the ONU role for test purposes: an OLT-side
//! controller (or the bundled `onucli` client) sends OMCI management
//! commands, and the simulator maintains a MIB of managed entity instances
//! for one or more virtual ONUs behind a single channel termination,
//! responding as a real ONU would. A REST surface and an interactive
//! console inject autonomous messages (alarms) out of band.
//!
//! Layering, leaves first:
//!
//! * [`onusim_wire`]: bit-exact codecs for single typed fields.
//! * [`mib`] and [`mibs`]: the declarative schema and the G.988 class
//!   definitions loaded into it.
//! * [`message`]: framing, per-action payload codecs and dispatch.
//! * [`database`]: the per-ONU instance store and its operations.
//! * [`endpoint`]: the UDP endpoint tying wire to database.
//! * [`rest`] and [`console`]: thin out-of-band facades.

pub mod console;
pub mod database;
pub mod endpoint;
pub mod error;
pub mod message;
pub mod mib;
pub mod mibs;
pub mod rest;

pub use error::Error;

use mib::MibRegistry;
use std::sync::OnceLock;

static REGISTRY: OnceLock<MibRegistry> = OnceLock::new();

/// The process-wide MIB schema registry.
///
/// Built from [`mibs::standard`] on first use and immutable afterwards, so
/// it may be consulted from any thread without locking.
pub fn registry() -> &'static MibRegistry {
    REGISTRY.get_or_init(mibs::standard)
}
