use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::ProtocolError;

/// Reply status carried by identification and send acknowledgments.
#[non_exhaustive]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Status {
    Success,
    Failure,
    Other,
}

impl Status {
    fn from_field(value: &str) -> Self {
        match value {
            "success" => Status::Success,
            "failure" => Status::Failure,
            _ => Status::Other,
        }
    }
}

/// One parsed inbound frame.
///
/// The daemon's replies and notifications share no common tag, so the frame
/// is kept as the raw JSON object with typed accessors for the fields the
/// client engine inspects. Handlers receive the object untouched.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Envelope(Map<String, Value>);

impl Envelope {
    /// Parse one line. Anything other than a JSON object is malformed.
    pub fn parse(line: &str) -> Result<Self, ProtocolError> {
        serde_json::from_str(line.trim()).map_err(|e| ProtocolError::Malformed {
            message: format!("{}: {}", e, line.trim()),
        })
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.0.get(key)
    }

    /// Raw `status` field of a reply frame.
    pub fn status(&self) -> Option<&str> {
        self.0.get("status").and_then(Value::as_str)
    }

    /// Classified `status` field, `None` when the frame carries no status.
    pub fn reply_status(&self) -> Option<Status> {
        self.status().map(Status::from_field)
    }

    pub fn is_success(&self) -> bool {
        self.reply_status() == Some(Status::Success)
    }

    /// `origin` of an event notification (`"receiver"`, `"sender"`, `"core"`, ...).
    pub fn origin(&self) -> Option<&str> {
        self.0.get("origin").and_then(Value::as_str)
    }

    /// Daemon repeat counter; `1` marks the first reception of a code.
    pub fn repeats(&self) -> Option<i64> {
        self.0.get("repeats").and_then(Value::as_i64)
    }

    pub fn message(&self) -> Option<&Value> {
        self.0.get("message")
    }

    pub fn as_map(&self) -> &Map<String, Value> {
        &self.0
    }

    pub fn into_value(self) -> Value {
        Value::Object(self.0)
    }
}

impl From<Map<String, Value>> for Envelope {
    fn from(map: Map<String, Value>) -> Self {
        Envelope(map)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_event_notification() {
        let env = Envelope::parse(
            r#"{"origin":"receiver","repeats":1,"message":{"id":0,"unit":0,"off":1},"protocol":"kaku_switch"}"#,
        )
        .unwrap();
        assert_eq!(env.origin(), Some("receiver"));
        assert_eq!(env.repeats(), Some(1));
        assert_eq!(env.message().unwrap()["off"], 1);
        assert_eq!(env.reply_status(), None);
        assert!(!env.is_success());
    }

    #[test]
    fn test_parse_reply_status() {
        let ok = Envelope::parse(r#"{"status":"success"}"#).unwrap();
        assert!(ok.is_success());
        assert_eq!(ok.reply_status(), Some(Status::Success));

        let failed = Envelope::parse(r#"{"status":"failure"}"#).unwrap();
        assert_eq!(failed.reply_status(), Some(Status::Failure));
        assert!(!failed.is_success());
    }

    #[test]
    fn test_status_must_match_exactly() {
        let env = Envelope::parse(r#"{"status":"no success"}"#).unwrap();
        assert_eq!(env.reply_status(), Some(Status::Other));
        assert!(!env.is_success());
    }

    #[test]
    fn test_parse_rejects_non_objects() {
        assert!(Envelope::parse("[1,2,3]").is_err());
        assert!(Envelope::parse("\"text\"").is_err());
        assert!(Envelope::parse("BEAT").is_err());
        assert!(Envelope::parse(r#"{"status":"#).is_err());
    }

    #[test]
    fn test_into_value_preserves_fields() {
        let raw = r#"{"origin":"core","values":{"cpu":1.5}}"#;
        let env = Envelope::parse(raw).unwrap();
        let value = env.into_value();
        assert_eq!(value, serde_json::from_str::<Value>(raw).unwrap());
    }
}
