//! Topic layout for scanner traffic.
//!
//! ```text
//! [namespace/]device/{deviceId}/command      outbound
//! [namespace/]device/{deviceId}/response     inbound
//! [namespace/]device/{deviceId}/status       inbound
//! [namespace/]device/{deviceId}/heartbeat    inbound
//! [namespace/]device/{deviceId}/info         inbound
//! [namespace/]device/{deviceId}/fingerprint  inbound
//! ```
//!
//! # Example
//!
//! ```
//! use scanlink_protocol::{Channel, TopicScheme};
//! use scanlink_core::DeviceId;
//!
//! let scheme = TopicScheme::with_namespace("smashminton");
//! let device = DeviceId::new("esp01").unwrap();
//!
//! assert_eq!(scheme.command_topic(&device), "smashminton/device/esp01/command");
//!
//! let (id, channel) = scheme.parse("smashminton/device/esp01/response").unwrap();
//! assert_eq!(id, device);
//! assert_eq!(channel, Channel::Response);
//! ```

use scanlink_core::{
    DeviceId,
    constants::{DEVICE_SEGMENT, TOPIC_SEPARATOR, WILDCARD_MULTI, WILDCARD_SINGLE},
};
use std::fmt;

/// Last topic level, naming the kind of traffic.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Channel {
    Command,
    Response,
    Status,
    Heartbeat,
    Info,
    Fingerprint,
}

impl Channel {
    /// Channels the service subscribes to.
    pub const INBOUND: [Channel; 5] = [
        Channel::Response,
        Channel::Status,
        Channel::Heartbeat,
        Channel::Info,
        Channel::Fingerprint,
    ];

    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Channel::Command => "command",
            Channel::Response => "response",
            Channel::Status => "status",
            Channel::Heartbeat => "heartbeat",
            Channel::Info => "info",
            Channel::Fingerprint => "fingerprint",
        }
    }

    #[must_use]
    pub fn from_segment(segment: &str) -> Option<Self> {
        match segment {
            "command" => Some(Channel::Command),
            "response" => Some(Channel::Response),
            "status" => Some(Channel::Status),
            "heartbeat" => Some(Channel::Heartbeat),
            "info" => Some(Channel::Info),
            "fingerprint" => Some(Channel::Fingerprint),
            _ => None,
        }
    }

    #[must_use]
    pub fn is_inbound(self) -> bool {
        !matches!(self, Channel::Command)
    }
}

impl fmt::Display for Channel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Builds and parses topics, optionally under an application namespace.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TopicScheme {
    namespace: Option<String>,
}

impl TopicScheme {
    /// Scheme without a namespace (`device/{id}/...`).
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Scheme with a leading namespace level (`{namespace}/device/{id}/...`).
    ///
    /// Leading and trailing separators are stripped; an empty namespace is
    /// treated as no namespace.
    pub fn with_namespace(namespace: impl Into<String>) -> Self {
        let namespace = namespace.into();
        let trimmed = namespace.trim_matches(TOPIC_SEPARATOR);
        Self {
            namespace: (!trimmed.is_empty()).then(|| trimmed.to_string()),
        }
    }

    /// Scheme from an optional namespace (as found in configuration).
    pub fn from_option(namespace: Option<&str>) -> Self {
        namespace.map(Self::with_namespace).unwrap_or_default()
    }

    #[must_use]
    pub fn namespace(&self) -> Option<&str> {
        self.namespace.as_deref()
    }

    fn prefix(&self) -> String {
        match &self.namespace {
            Some(ns) => format!("{ns}{TOPIC_SEPARATOR}{DEVICE_SEGMENT}"),
            None => DEVICE_SEGMENT.to_string(),
        }
    }

    /// Concrete topic for a device and channel.
    #[must_use]
    pub fn topic(&self, device_id: &DeviceId, channel: Channel) -> String {
        format!(
            "{}{TOPIC_SEPARATOR}{device_id}{TOPIC_SEPARATOR}{channel}",
            self.prefix()
        )
    }

    /// Outbound command topic for a device.
    #[must_use]
    pub fn command_topic(&self, device_id: &DeviceId) -> String {
        self.topic(device_id, Channel::Command)
    }

    /// Wildcard filter matching a channel on every device.
    #[must_use]
    pub fn filter(&self, channel: Channel) -> String {
        format!(
            "{}{TOPIC_SEPARATOR}{WILDCARD_SINGLE}{TOPIC_SEPARATOR}{channel}",
            self.prefix()
        )
    }

    /// Filters for every inbound channel.
    #[must_use]
    pub fn inbound_filters(&self) -> Vec<String> {
        Channel::INBOUND.iter().map(|c| self.filter(*c)).collect()
    }

    /// Split a concrete topic into device id and channel.
    ///
    /// Returns `None` for topics outside this scheme.
    #[must_use]
    pub fn parse(&self, topic: &str) -> Option<(DeviceId, Channel)> {
        let mut levels = topic.split(TOPIC_SEPARATOR);

        if let Some(ns) = &self.namespace
            && levels.next()? != ns.as_str()
        {
            return None;
        }

        if levels.next()? != DEVICE_SEGMENT {
            return None;
        }

        let device_id = DeviceId::new(levels.next()?).ok()?;
        let channel = Channel::from_segment(levels.next()?)?;

        if levels.next().is_some() {
            return None;
        }

        Some((device_id, channel))
    }
}

/// MQTT-style filter matching.
///
/// `+` matches exactly one level, `#` (only as the last level) matches any
/// number of remaining levels including none.
///
/// ```
/// use scanlink_protocol::topic_matches;
///
/// assert!(topic_matches("device/+/response", "device/esp01/response"));
/// assert!(topic_matches("device/#", "device/esp01/status"));
/// assert!(!topic_matches("device/+/response", "device/esp01/status"));
/// ```
#[must_use]
pub fn topic_matches(filter: &str, topic: &str) -> bool {
    let mut filter_levels = filter.split(TOPIC_SEPARATOR);
    let mut topic_levels = topic.split(TOPIC_SEPARATOR);

    loop {
        match (filter_levels.next(), topic_levels.next()) {
            (Some(WILDCARD_MULTI), _) => return filter_levels.next().is_none(),
            (Some(WILDCARD_SINGLE), Some(_)) => {}
            (Some(f), Some(t)) if f == t => {}
            (None, None) => return true,
            _ => return false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    fn esp01() -> DeviceId {
        DeviceId::new("esp01").unwrap()
    }

    #[test]
    fn test_topics_without_namespace() {
        let scheme = TopicScheme::new();
        assert_eq!(scheme.command_topic(&esp01()), "device/esp01/command");
        assert_eq!(scheme.filter(Channel::Heartbeat), "device/+/heartbeat");
    }

    #[test]
    fn test_namespace_is_trimmed() {
        let scheme = TopicScheme::with_namespace("/smashminton/");
        assert_eq!(scheme.namespace(), Some("smashminton"));
        assert_eq!(
            scheme.topic(&esp01(), Channel::Fingerprint),
            "smashminton/device/esp01/fingerprint"
        );

        assert_eq!(TopicScheme::with_namespace("//"), TopicScheme::new());
        assert_eq!(TopicScheme::from_option(None), TopicScheme::new());
    }

    #[test]
    fn test_inbound_filters_exclude_command() {
        let filters = TopicScheme::new().inbound_filters();
        assert_eq!(filters.len(), 5);
        assert!(!filters.iter().any(|f| f.ends_with("command")));
    }

    #[rstest]
    #[case("device/esp01/response", Channel::Response)]
    #[case("device/esp01/status", Channel::Status)]
    #[case("device/esp01/heartbeat", Channel::Heartbeat)]
    #[case("device/esp01/info", Channel::Info)]
    #[case("device/esp01/fingerprint", Channel::Fingerprint)]
    #[case("device/esp01/command", Channel::Command)]
    fn test_parse_channels(#[case] topic: &str, #[case] expected: Channel) {
        let (device, channel) = TopicScheme::new().parse(topic).unwrap();
        assert_eq!(device, esp01());
        assert_eq!(channel, expected);
    }

    #[rstest]
    #[case("device/esp01")]
    #[case("device/esp01/response/extra")]
    #[case("devices/esp01/response")]
    #[case("device/esp01/unknown")]
    #[case("smashminton/device/esp01/response")]
    #[case("")]
    fn test_parse_rejects(#[case] topic: &str) {
        assert!(TopicScheme::new().parse(topic).is_none());
    }

    #[test]
    fn test_parse_requires_namespace() {
        let scheme = TopicScheme::with_namespace("smashminton");
        assert!(scheme.parse("device/esp01/response").is_none());
        assert!(scheme.parse("other/device/esp01/response").is_none());
        assert!(scheme.parse("smashminton/device/esp01/response").is_some());
    }

    #[rstest]
    #[case("device/+/response", "device/esp01/response", true)]
    #[case("device/+/response", "device/esp01/status", false)]
    #[case("device/+/response", "device/esp01/response/x", false)]
    #[case("device/#", "device", true)]
    #[case("device/#", "device/a/b/c", true)]
    #[case("#", "anything/at/all", true)]
    #[case("device/+", "device", false)]
    #[case("device/esp01/status", "device/esp01/status", true)]
    #[case("device/#/status", "device/esp01/status", false)]
    fn test_topic_matches(#[case] filter: &str, #[case] topic: &str, #[case] expected: bool) {
        assert_eq!(topic_matches(filter, topic), expected);
    }
}
