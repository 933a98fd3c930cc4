//! Wire protocol shared by the pilight client engine and the daemon simulator.
//!
//! The daemon speaks one JSON object per `\n`-terminated line over plain TCP,
//! plus a non-JSON heartbeat (`HEART` / `BEAT`). This crate has no I/O: it
//! only builds outbound frames, parses inbound ones and assembles lines.

mod envelope;
mod errors;
mod framing;
mod messages;

pub use envelope::{Envelope, Status};
pub use errors::ProtocolError;
pub use framing::{HEARTBEAT_ACK, HEARTBEAT_PROBE, LineBuffer, MAX_PARTIAL_FRAME, encode_line};
pub use messages::{ClientMessage, IdentifyOptions};
