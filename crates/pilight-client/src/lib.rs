//! # pilight-client
//!
//! Protocol engine for the pilight home-automation daemon.
//!
//! The daemon is reached over two TCP connections: a command channel used for
//! `send` requests and heartbeat probes, and an event channel on which the
//! daemon pushes notifications. [`Client`] opens and identifies both, runs an
//! event receiver and a liveness watchdog on background threads, and offers a
//! synchronous [`Client::send_code`].
//!
//! ```no_run
//! use pilight_client::{Client, ClientConfig};
//! use serde_json::json;
//!
//! # fn main() -> Result<(), pilight_client::ClientError> {
//! let client = Client::connect(ClientConfig::default())?;
//! client.set_handler(|event| println!("{:?}", event))?;
//! client.start()?;
//! client.send_code(&json!({"protocol": ["kaku_switch"], "id": 1, "unit": 0, "off": 1}), true)?;
//! client.stop();
//! # Ok(())
//! # }
//! ```

mod client;
mod connection;
mod filter;
mod handshake;
mod receiver;
mod sender;
mod state;
mod transport;
mod watchdog;

pub mod config;
pub mod errors;
pub mod logging;

pub use client::Client;
pub use config::{ClientConfig, load_client_config};
pub use errors::{ChannelError, ClientError, ConfigError};
pub use filter::FilterPolicy;
pub use logging::{init_json_logging, init_logging};
pub use pilight_protocol::{Envelope, IdentifyOptions};
pub use state::EngineState;
pub use transport::{Endpoint, Role};
