use scanlink_core::{ServiceConfig, constants::DEFAULT_CONFIRM_TIMEOUT_MS};
use scanlink_protocol::TopicScheme;
use std::time::Duration;

/// Settings for the fingerprint lifecycle manager.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LifecycleConfig {
    /// How long a blocking delete waits for the device.
    pub confirm_timeout: Duration,

    /// Topic layout used for commands.
    pub scheme: TopicScheme,
}

impl Default for LifecycleConfig {
    fn default() -> Self {
        Self {
            confirm_timeout: Duration::from_millis(DEFAULT_CONFIRM_TIMEOUT_MS),
            scheme: TopicScheme::new(),
        }
    }
}

impl LifecycleConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn confirm_timeout(mut self, timeout: Duration) -> Self {
        self.confirm_timeout = timeout;
        self
    }

    pub fn scheme(mut self, scheme: TopicScheme) -> Self {
        self.scheme = scheme;
        self
    }
}

impl From<&ServiceConfig> for LifecycleConfig {
    fn from(config: &ServiceConfig) -> Self {
        Self {
            confirm_timeout: config.confirm_timeout,
            scheme: TopicScheme::from_option(config.topic_namespace.as_deref()),
        }
    }
}
