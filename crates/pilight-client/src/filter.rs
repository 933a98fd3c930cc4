use pilight_protocol::Envelope;

/// Which event notifications reach the registered handler.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FilterPolicy {
    /// Only pass frames whose `origin` contains `"receiver"`, i.e. received
    /// RF codes, not core/config/sender status frames.
    pub restrict_to_events: bool,
    /// Only pass the first reception of a code (`repeats == 1`), not the
    /// echoes the daemon reports while a button is held.
    pub suppress_repeats: bool,
}

impl Default for FilterPolicy {
    fn default() -> Self {
        Self {
            restrict_to_events: true,
            suppress_repeats: true,
        }
    }
}

impl FilterPolicy {
    /// Pass everything through.
    pub fn passthrough() -> Self {
        Self {
            restrict_to_events: false,
            suppress_repeats: false,
        }
    }

    /// Whether `envelope` should be handed to the handler.
    ///
    /// Repeat suppression only applies to frames that survived the origin
    /// restriction, and only when that restriction is enabled.
    pub fn accepts(&self, envelope: &Envelope) -> bool {
        if !self.restrict_to_events {
            return true;
        }
        if !envelope.origin().is_some_and(|o| o.contains("receiver")) {
            return false;
        }
        !self.suppress_repeats || envelope.repeats() == Some(1)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn env(raw: &str) -> Envelope {
        Envelope::parse(raw).unwrap()
    }

    #[test]
    fn test_default_policy_passes_first_receiver_frame_only() {
        let policy = FilterPolicy::default();
        assert!(policy.accepts(&env(r#"{"origin":"receiver","repeats":1}"#)));
        assert!(!policy.accepts(&env(r#"{"origin":"receiver","repeats":2}"#)));
        assert!(!policy.accepts(&env(r#"{"origin":"core","repeats":1}"#)));
        assert!(!policy.accepts(&env(r#"{"status":"success"}"#)));
    }

    #[test]
    fn test_origin_match_is_substring() {
        let policy = FilterPolicy::default();
        assert!(policy.accepts(&env(r#"{"origin":"receiver-433","repeats":1}"#)));
    }

    #[test]
    fn test_repeats_kept_when_not_suppressed() {
        let policy = FilterPolicy {
            restrict_to_events: true,
            suppress_repeats: false,
        };
        assert!(policy.accepts(&env(r#"{"origin":"receiver","repeats":7}"#)));
        assert!(policy.accepts(&env(r#"{"origin":"receiver"}"#)));
        assert!(!policy.accepts(&env(r#"{"origin":"sender","repeats":1}"#)));
    }

    #[test]
    fn test_missing_repeats_is_suppressed() {
        let policy = FilterPolicy::default();
        assert!(!policy.accepts(&env(r#"{"origin":"receiver"}"#)));
        assert!(!policy.accepts(&env(r#"{"origin":"receiver","repeats":"1"}"#)));
    }

    #[test]
    fn test_passthrough_accepts_everything() {
        let policy = FilterPolicy::passthrough();
        assert!(policy.accepts(&env(r#"{"origin":"core","values":{"cpu":3}}"#)));
        assert!(policy.accepts(&env(r#"{"origin":"receiver","repeats":10}"#)));
        assert!(policy.accepts(&env(r#"{}"#)));
    }
}
