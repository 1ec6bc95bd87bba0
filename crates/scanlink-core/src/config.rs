//! Service configuration.
//!
//! [`ServiceConfig`] gathers the settings shared by the scanlink crates. It is
//! built from defaults, optionally overlaid with `SCANLINK_*` environment
//! variables, and finally adjusted with the fluent setters (the binary applies
//! command-line flags this way).
//!
//! ```
//! use scanlink_core::ServiceConfig;
//! use std::time::Duration;
//!
//! let config = ServiceConfig::default()
//!     .topic_namespace("smashminton")
//!     .confirm_timeout(Duration::from_secs(5));
//!
//! assert_eq!(config.topic_namespace.as_deref(), Some("smashminton"));
//! assert_eq!(config.confirm_timeout, Duration::from_secs(5));
//! ```

use crate::{
    Result,
    constants::{DEFAULT_CONFIRM_TIMEOUT_MS, DEFAULT_GLOBAL_ROLES, DEFAULT_STAFF_ROLE},
    error::Error,
};
use std::time::Duration;

/// Environment variable overriding the topic namespace.
pub const ENV_TOPIC_NAMESPACE: &str = "SCANLINK_TOPIC_NAMESPACE";
/// Environment variable overriding the confirmation timeout (milliseconds).
pub const ENV_CONFIRM_TIMEOUT_MS: &str = "SCANLINK_CONFIRM_TIMEOUT_MS";
/// Environment variable overriding the SQLite database path.
pub const ENV_DATABASE_PATH: &str = "SCANLINK_DATABASE_PATH";
/// Environment variable overriding the global room roles (comma separated).
pub const ENV_GLOBAL_ROLES: &str = "SCANLINK_GLOBAL_ROLES";
/// Environment variable overriding the staff room role.
pub const ENV_STAFF_ROLE: &str = "SCANLINK_STAFF_ROLE";

/// Settings shared by the scanlink service components.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServiceConfig {
    /// Optional first topic level (e.g. `smashminton` → `smashminton/device/...`).
    pub topic_namespace: Option<String>,

    /// How long a blocking delete waits for the device before giving up.
    pub confirm_timeout: Duration,

    /// Path to the SQLite employee database.
    pub database_path: String,

    /// Roles allowed to join the global broadcast room.
    pub global_roles: Vec<String>,

    /// The single role allowed to join the scanning staff room.
    pub staff_role: String,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            topic_namespace: None,
            confirm_timeout: Duration::from_millis(DEFAULT_CONFIRM_TIMEOUT_MS),
            database_path: "scanlink.db".to_string(),
            global_roles: DEFAULT_GLOBAL_ROLES.iter().map(|r| r.to_string()).collect(),
            staff_role: DEFAULT_STAFF_ROLE.to_string(),
        }
    }
}

impl ServiceConfig {
    /// Build a configuration from defaults overlaid with `SCANLINK_*` variables.
    ///
    /// # Errors
    /// Returns `Error::Config` if a variable is present but malformed.
    pub fn from_env() -> Result<Self> {
        Self::default().overlay(|key| std::env::var(key).ok())
    }

    /// Overlay values produced by `lookup` (an environment-like source).
    ///
    /// # Errors
    /// Returns `Error::Config` if a value is present but malformed.
    pub fn overlay<F>(mut self, lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(namespace) = lookup(ENV_TOPIC_NAMESPACE) {
            let namespace = namespace.trim().trim_matches('/').to_string();
            self.topic_namespace = (!namespace.is_empty()).then_some(namespace);
        }

        if let Some(raw) = lookup(ENV_CONFIRM_TIMEOUT_MS) {
            let millis: u64 = raw.trim().parse().map_err(|_| {
                Error::Config(format!("{ENV_CONFIRM_TIMEOUT_MS} must be an integer, got {raw:?}"))
            })?;
            if millis == 0 {
                return Err(Error::Config(format!(
                    "{ENV_CONFIRM_TIMEOUT_MS} must be positive"
                )));
            }
            self.confirm_timeout = Duration::from_millis(millis);
        }

        if let Some(path) = lookup(ENV_DATABASE_PATH) {
            if path.trim().is_empty() {
                return Err(Error::Config(format!("{ENV_DATABASE_PATH} is empty")));
            }
            self.database_path = path;
        }

        if let Some(raw) = lookup(ENV_GLOBAL_ROLES) {
            self.global_roles = raw
                .split(',')
                .map(str::trim)
                .filter(|r| !r.is_empty())
                .map(str::to_string)
                .collect();
        }

        if let Some(role) = lookup(ENV_STAFF_ROLE) {
            let role = role.trim();
            if role.is_empty() {
                return Err(Error::Config(format!("{ENV_STAFF_ROLE} is empty")));
            }
            self.staff_role = role.to_string();
        }

        Ok(self)
    }

    /// Set the topic namespace.
    pub fn topic_namespace(mut self, namespace: impl Into<String>) -> Self {
        self.topic_namespace = Some(namespace.into());
        self
    }

    /// Set the blocking delete confirmation timeout.
    pub fn confirm_timeout(mut self, timeout: Duration) -> Self {
        self.confirm_timeout = timeout;
        self
    }

    /// Set the SQLite database path.
    pub fn database_path(mut self, path: impl Into<String>) -> Self {
        self.database_path = path.into();
        self
    }

    /// Set the roles allowed into the global room.
    pub fn global_roles<I, S>(mut self, roles: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.global_roles = roles.into_iter().map(Into::into).collect();
        self
    }

    /// Set the role allowed into the staff room.
    pub fn staff_role(mut self, role: impl Into<String>) -> Self {
        self.staff_role = role.into();
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn source(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_defaults() {
        let config = ServiceConfig::default();

        assert_eq!(config.topic_namespace, None);
        assert_eq!(config.confirm_timeout, Duration::from_secs(10));
        assert_eq!(config.database_path, "scanlink.db");
        assert_eq!(
            config.global_roles,
            vec!["employee", "wh_manager", "hr_manager", "admin"]
        );
        assert_eq!(config.staff_role, "employee");
    }

    #[test]
    fn test_overlay_all_values() {
        let config = ServiceConfig::default()
            .overlay(source(&[
                (ENV_TOPIC_NAMESPACE, "/smashminton/"),
                (ENV_CONFIRM_TIMEOUT_MS, "2500"),
                (ENV_DATABASE_PATH, "/tmp/scan.db"),
                (ENV_GLOBAL_ROLES, "admin, hr_manager,,"),
                (ENV_STAFF_ROLE, "scanner"),
            ]))
            .unwrap();

        assert_eq!(config.topic_namespace.as_deref(), Some("smashminton"));
        assert_eq!(config.confirm_timeout, Duration::from_millis(2500));
        assert_eq!(config.database_path, "/tmp/scan.db");
        assert_eq!(config.global_roles, vec!["admin", "hr_manager"]);
        assert_eq!(config.staff_role, "scanner");
    }

    #[test]
    fn test_overlay_empty_namespace_clears() {
        let config = ServiceConfig::default()
            .topic_namespace("old")
            .overlay(source(&[(ENV_TOPIC_NAMESPACE, "")]))
            .unwrap();
        assert_eq!(config.topic_namespace, None);
    }

    #[test]
    fn test_overlay_rejects_bad_timeout() {
        let result =
            ServiceConfig::default().overlay(source(&[(ENV_CONFIRM_TIMEOUT_MS, "soon")]));
        assert!(matches!(result, Err(Error::Config(_))));

        let result = ServiceConfig::default().overlay(source(&[(ENV_CONFIRM_TIMEOUT_MS, "0")]));
        assert!(matches!(result, Err(Error::Config(_))));
    }

    #[test]
    fn test_overlay_without_values_keeps_defaults() {
        let config = ServiceConfig::default().overlay(source(&[])).unwrap();
        assert_eq!(config, ServiceConfig::default());
    }

    #[test]
    fn test_fluent_api() {
        let config = ServiceConfig::default()
            .database_path("custom.db")
            .global_roles(["admin"])
            .staff_role("operator");

        assert_eq!(config.database_path, "custom.db");
        assert_eq!(config.global_roles, vec!["admin"]);
        assert_eq!(config.staff_role, "operator");
    }
}
