use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Capabilities requested in an `identify` frame.
///
/// Each key is a daemon capability (`core`, `receiver`, `config`, `forward`)
/// mapped to `0` or `1`. The daemon decides which notifications a connection
/// receives from these flags.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct IdentifyOptions(BTreeMap<String, u8>);

impl IdentifyOptions {
    /// Identity of the command connection: subscribes to nothing.
    pub fn sender() -> Self {
        Self::default()
            .with("core", 0)
            .with("receiver", 0)
            .with("config", 0)
    }

    /// Default identity of the event connection: only received RF codes.
    pub fn receiver() -> Self {
        Self::default()
            .with("core", 0)
            .with("receiver", 1)
            .with("config", 0)
            .with("forward", 0)
    }

    /// Set one capability flag. Any non-zero value is sent as `1`.
    pub fn with(mut self, capability: impl Into<String>, enabled: u8) -> Self {
        self.0.insert(capability.into(), u8::from(enabled != 0));
        self
    }

    pub fn get(&self, capability: &str) -> Option<u8> {
        self.0.get(capability).copied()
    }

    /// Whether the given capability is requested.
    pub fn requests(&self, capability: &str) -> bool {
        self.get(capability) == Some(1)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

/// Client -> daemon frames.
///
/// Serialized with `"action"` as the tag field, matching the daemon API.
#[non_exhaustive]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "lowercase")]
pub enum ClientMessage {
    /// Identification exchange, sent once on a fresh connection.
    Identify { options: IdentifyOptions },

    /// Ask the daemon to transmit a code. `code` must carry a `protocol` key;
    /// the remaining fields are protocol specific.
    Send { code: Map<String, Value> },
}

impl ClientMessage {
    pub fn identify(options: IdentifyOptions) -> Self {
        ClientMessage::Identify { options }
    }

    pub fn send(code: Map<String, Value>) -> Self {
        ClientMessage::Send { code }
    }

    /// The `action` string this frame is tagged with.
    pub fn action(&self) -> &'static str {
        match self {
            ClientMessage::Identify { .. } => "identify",
            ClientMessage::Send { .. } => "send",
        }
    }
}
