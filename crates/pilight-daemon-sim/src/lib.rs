//! Simulated pilight daemon.
//!
//! Speaks the daemon's line-delimited JSON API closely enough to exercise a
//! client: identification, `send` acknowledgment for one accepted protocol,
//! `HEART`/`BEAT` liveness probes and an optional feed of receiver events.
//! [`SimServer`] runs inside an existing tokio runtime; [`SimDaemon`] owns a
//! runtime and is meant for blocking tests.

pub mod errors;
mod handle;
mod server;
mod session;
mod stats;
pub mod types;

pub use errors::SimError;
pub use handle::SimDaemon;
pub use server::{SeverHandle, SimServer};
pub use stats::SimStats;
pub use types::{EventFeed, SimConfig};
