use serde::{Deserialize, Serialize};
use serde_json::{Value, json};

/// How the simulated daemon behaves.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SimConfig {
    /// Address to bind.
    /// Default: `127.0.0.1`
    pub host: String,

    /// Port to bind. 0 picks a free port.
    /// Default: 0
    pub port: u16,

    /// `send` requests are acknowledged only for this protocol.
    /// Default: `daycom`
    pub accepted_protocol: String,

    /// Answer `failure` to identifications that ask for `receiver: 1`.
    pub reject_receivers: bool,

    /// Notifications pushed to connections identified as receivers.
    pub feed: Option<EventFeed>,

    /// Answer `HEART` with `BEAT`. When false, probes go unanswered.
    /// Default: true
    pub heartbeat: bool,
}

impl Default for SimConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 0,
            accepted_protocol: "daycom".to_string(),
            reject_receivers: false,
            feed: None,
            heartbeat: true,
        }
    }
}

impl SimConfig {
    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

/// A sequence of event notifications written to each receiver connection.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EventFeed {
    pub frames: Vec<Value>,
    /// Pause between two frames, in milliseconds.
    pub interval_ms: u64,
    /// How many times the whole sequence is sent. 0 repeats forever.
    pub repeat: u32,
}

impl EventFeed {
    /// Send `frames` once.
    pub fn once(frames: Vec<Value>) -> Self {
        Self {
            frames,
            interval_ms: 10,
            repeat: 1,
        }
    }

    /// A held remote button: the same `kaku_switch` code received ten times
    /// with `repeats` counting up from 1.
    pub fn button_press() -> Self {
        let frames = (1..=10)
            .map(|repeats| {
                json!({
                    "origin": "receiver",
                    "repeats": repeats,
                    "message": {
                        "protocol": ["kaku_switch"],
                        "id": 0,
                        "unit": 0,
                        "off": 1
                    }
                })
            })
            .collect();
        Self::once(frames)
    }

    pub fn with_interval_ms(mut self, interval_ms: u64) -> Self {
        self.interval_ms = interval_ms;
        self
    }

    pub fn with_repeat(mut self, repeat: u32) -> Self {
        self.repeat = repeat;
        self
    }
}

/// Position within an [`EventFeed`] for one connection.
#[derive(Debug, Clone)]
pub(crate) struct FeedCursor {
    feed: EventFeed,
    index: usize,
    passes: u32,
}

impl FeedCursor {
    pub(crate) fn new(feed: EventFeed) -> Self {
        Self {
            feed,
            index: 0,
            passes: 0,
        }
    }

    pub(crate) fn interval_ms(&self) -> u64 {
        self.feed.interval_ms.max(1)
    }

    pub(crate) fn is_exhausted(&self) -> bool {
        self.feed.frames.is_empty() || (self.feed.repeat != 0 && self.passes >= self.feed.repeat)
    }

    pub(crate) fn next_frame(&mut self) -> Option<Value> {
        if self.is_exhausted() {
            return None;
        }
        let frame = self.feed.frames[self.index].clone();
        self.index += 1;
        if self.index == self.feed.frames.len() {
            self.index = 0;
            self.passes += 1;
        }
        Some(frame)
    }
}
