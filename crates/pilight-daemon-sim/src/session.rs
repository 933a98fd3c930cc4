//! Per-connection protocol state, independent of the socket.

use std::sync::Arc;

use pilight_protocol::{ClientMessage, HEARTBEAT_ACK, HEARTBEAT_PROBE};
use serde_json::{Map, Value, json};
use tracing::debug;

use crate::stats::SimStats;
use crate::types::{FeedCursor, SimConfig};

/// What to write back for one inbound line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum Reply {
    Silent,
    Line(String),
    /// Write the line, then close the connection.
    Close(String),
}

fn status(success: bool) -> String {
    let status = if success { "success" } else { "failure" };
    json!({ "status": status }).to_string()
}

fn is_probe(line: &str) -> bool {
    line.as_bytes() == HEARTBEAT_PROBE.trim_ascii_end()
}

pub(crate) struct Session {
    config: Arc<SimConfig>,
    stats: Arc<SimStats>,
    identified: bool,
    receiver: bool,
}

impl Session {
    pub(crate) fn new(config: Arc<SimConfig>, stats: Arc<SimStats>) -> Self {
        Self {
            config,
            stats,
            identified: false,
            receiver: false,
        }
    }

    /// Feed to start once this connection identified as a receiver.
    pub(crate) fn feed(&self) -> Option<FeedCursor> {
        if !self.receiver {
            return None;
        }
        self.config.feed.clone().map(FeedCursor::new)
    }

    pub(crate) fn handle_line(&mut self, line: &str) -> Reply {
        if is_probe(line) {
            self.stats.record_heartbeat();
            return if self.config.heartbeat {
                Reply::Line(HEARTBEAT_ACK.to_string())
            } else {
                Reply::Silent
            };
        }

        let value: Value = match serde_json::from_str(line) {
            Ok(value) => value,
            Err(e) => {
                debug!(event = "sim.session.frame_malformed", error = %e);
                return Reply::Silent;
            }
        };
        self.stats.record_frame();

        let message = serde_json::from_value::<ClientMessage>(value).ok();
        if !self.identified {
            return self.identify(message);
        }

        match message {
            Some(ClientMessage::Identify { .. }) => Reply::Line(status(true)),
            Some(ClientMessage::Send { code }) => self.send(code),
            _ => Reply::Line(status(false)),
        }
    }

    fn identify(&mut self, message: Option<ClientMessage>) -> Reply {
        let Some(ClientMessage::Identify { options }) = message else {
            return Reply::Close(status(false));
        };

        let receiver = options.requests("receiver");
        self.stats.record_identification(options);
        if receiver && self.config.reject_receivers {
            return Reply::Close(status(false));
        }

        self.identified = true;
        self.receiver = receiver;
        Reply::Line(status(true))
    }

    fn send(&mut self, code: Map<String, Value>) -> Reply {
        let accepted = match code.get("protocol") {
            Some(Value::String(protocol)) => *protocol == self.config.accepted_protocol,
            Some(Value::Array(protocols)) => protocols
                .iter()
                .any(|p| p.as_str() == Some(self.config.accepted_protocol.as_str())),
            _ => false,
        };
        self.stats.record_code(Value::Object(code));
        Reply::Line(status(accepted))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::EventFeed;

    fn session(config: SimConfig) -> (Session, Arc<SimStats>) {
        let stats = Arc::new(SimStats::default());
        (Session::new(Arc::new(config), stats.clone()), stats)
    }

    const SUCCESS: &str = r#"{"status":"success"}"#;
    const FAILURE: &str = r#"{"status":"failure"}"#;
    const IDENT_SENDER: &str =
        r#"{"action":"identify","options":{"core":0,"receiver":0,"config":0}}"#;
    const IDENT_RECEIVER: &str =
        r#"{"action":"identify","options":{"core":0,"receiver":1,"config":0,"forward":0}}"#;

    #[test]
    fn test_identify_then_send() {
        let (mut s, stats) = session(SimConfig::default());
        assert_eq!(s.handle_line(IDENT_SENDER), Reply::Line(SUCCESS.to_string()));
        assert_eq!(
            s.handle_line(r#"{"action":"send","code":{"protocol":["daycom"],"id":1}}"#),
            Reply::Line(SUCCESS.to_string())
        );
        assert_eq!(
            s.handle_line(r#"{"action":"send","code":{"protocol":"kaku_switch"}}"#),
            Reply::Line(FAILURE.to_string())
        );

        assert_eq!(stats.frames_received(), 3);
        assert_eq!(stats.received_codes().len(), 2);
        assert_eq!(stats.received_codes()[0]["id"], 1);
        assert!(s.feed().is_none());
    }

    #[test]
    fn test_first_frame_must_identify() {
        let (mut s, _) = session(SimConfig::default());
        assert_eq!(
            s.handle_line(r#"{"action":"send","code":{"protocol":"daycom"}}"#),
            Reply::Close(FAILURE.to_string())
        );
    }

    #[test]
    fn test_reject_receivers() {
        let (mut s, stats) = session(SimConfig {
            reject_receivers: true,
            ..SimConfig::default()
        });
        assert_eq!(
            s.handle_line(IDENT_RECEIVER),
            Reply::Close(FAILURE.to_string())
        );
        assert!(stats.identifications()[0].requests("receiver"));
    }

    #[test]
    fn test_heartbeat() {
        let (mut s, stats) = session(SimConfig::default());
        assert_eq!(s.handle_line("HEART"), Reply::Line("BEAT".to_string()));

        let (mut silent, _) = session(SimConfig {
            heartbeat: false,
            ..SimConfig::default()
        });
        assert_eq!(silent.handle_line("HEART"), Reply::Silent);
        assert_eq!(stats.heartbeats(), 1);
        assert_eq!(stats.frames_received(), 0);
    }

    #[test]
    fn test_malformed_lines_are_ignored() {
        let (mut s, stats) = session(SimConfig::default());
        assert_eq!(s.handle_line("{not json"), Reply::Silent);
        assert_eq!(stats.frames_received(), 0);
    }

    #[test]
    fn test_receiver_gets_feed() {
        let (mut s, _) = session(SimConfig {
            feed: Some(EventFeed::button_press()),
            ..SimConfig::default()
        });
        s.handle_line(IDENT_RECEIVER);
        let mut cursor = s.feed().unwrap();
        assert_eq!(cursor.next_frame().unwrap()["repeats"], 1);
    }
}
