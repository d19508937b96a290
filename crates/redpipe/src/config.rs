//! Connection tuning and push-notification recognition policy.

use std::time::Duration;

use redpipe_resp::ParserLimits;
use redpipe_resp::Value;

/// Recognizes publish/subscribe traffic by the marker string in the first
/// element of an inbound array.
///
/// While subscribed, the server interleaves two kinds of arrays with
/// normal replies: push notifications (`["message", channel, payload]`,
/// `["pmessage", pattern, channel, payload]`) which belong to no request,
/// and subscription acknowledgements (`["subscribe", channel, count]` and
/// friends) which answer a specific request and carry the remaining
/// subscription count as their last integer element. The marker sets are
/// protocol convention, not negotiated, so they are configuration here.
#[derive(Debug, Clone)]
pub struct PushMatcher {
    /// First-element markers of unsolicited push notifications
    pub push_markers: Vec<String>,
    /// First-element markers of subscription acknowledgements; also the
    /// command names that enter/leave subscribed mode
    pub ack_markers: Vec<String>,
}

impl Default for PushMatcher {
    fn default() -> Self {
        Self {
            push_markers: vec!["message".into(), "pmessage".into()],
            ack_markers: vec![
                "subscribe".into(),
                "unsubscribe".into(),
                "psubscribe".into(),
                "punsubscribe".into(),
            ],
        }
    }
}

impl PushMatcher {
    fn first_marker<'a>(value: &'a Value) -> Option<&'a str> {
        value.as_array()?.first()?.as_str()
    }

    fn matches(markers: &[String], candidate: &str) -> bool {
        markers.iter().any(|m| m.eq_ignore_ascii_case(candidate))
    }

    /// Whether an inbound value is an unsolicited push notification.
    pub fn is_push(&self, value: &Value) -> bool {
        Self::first_marker(value)
            .is_some_and(|marker| Self::matches(&self.push_markers, marker))
    }

    /// Whether an inbound value is a subscription acknowledgement.
    pub fn is_subscription_ack(&self, value: &Value) -> bool {
        Self::first_marker(value)
            .is_some_and(|marker| Self::matches(&self.ack_markers, marker))
    }

    /// Whether submitting this command name changes the subscription set.
    pub fn is_subscription_command(&self, name: &str) -> bool {
        Self::matches(&self.ack_markers, name)
    }

    /// The remaining-subscription count carried by an acknowledgement:
    /// the last element, an integer.
    pub fn ack_count(&self, value: &Value) -> Option<i64> {
        if !self.is_subscription_ack(value) {
            return None;
        }
        value.as_array()?.last()?.as_integer()
    }
}

/// Per-connection configuration.
#[derive(Debug, Clone)]
pub struct ConnectionConfig {
    /// Initial capacity of the inbound read buffer
    pub read_buffer_capacity: usize,
    /// Fail the connection if no inbound bytes arrive within this duration
    /// while replies are expected. `None` disables the timeout.
    pub read_timeout: Option<Duration>,
    /// Parser length limits
    pub limits: ParserLimits,
    /// Push-notification recognition policy
    pub matcher: PushMatcher,
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        Self {
            read_buffer_capacity: 4096,
            read_timeout: None,
            limits: ParserLimits::default(),
            matcher: PushMatcher::default(),
        }
    }
}
