//! Client configuration.

use std::time::Duration;

use crate::call::media::MediaConstraints;

/// Default relay endpoint.
pub const DEFAULT_RELAY_URL: &str = "ws://localhost:5001/ws";

/// Default keep-alive interval for the relay connection.
pub const DEFAULT_KEEPALIVE: Duration = Duration::from_secs(25);

/// Configuration for a [`CallAgent`](crate::call::agent::CallAgent).
#[derive(Debug, Clone)]
pub struct CallConfig {
    /// WebSocket URL of the signaling relay.
    pub relay_url: String,
    /// Logged-in user id. Without one the client is reachable only by the
    /// connection id the relay assigns, and calls address peers the same way.
    pub user_id: Option<String>,
    /// Name shown to the callee in the incoming-call prompt.
    pub display_name: String,
    /// Local capture constraints.
    pub media: MediaConstraints,
    /// Interval between keep-alive pings; `None` disables them.
    pub keepalive: Option<Duration>,
}

impl Default for CallConfig {
    fn default() -> Self {
        Self {
            relay_url: DEFAULT_RELAY_URL.to_string(),
            user_id: None,
            display_name: String::new(),
            media: MediaConstraints::default(),
            keepalive: Some(DEFAULT_KEEPALIVE),
        }
    }
}

impl CallConfig {
    /// Config for a logged-in user; the display name defaults to the id.
    pub fn for_user(user_id: impl Into<String>) -> Self {
        let user_id = user_id.into();
        Self {
            display_name: user_id.clone(),
            user_id: Some(user_id),
            ..Self::default()
        }
    }

    pub fn with_relay_url(mut self, url: impl Into<String>) -> Self {
        self.relay_url = url.into();
        self
    }

    pub fn with_display_name(mut self, name: impl Into<String>) -> Self {
        self.display_name = name.into();
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = CallConfig::default();
        assert_eq!(config.relay_url, "ws://localhost:5001/ws");
        assert!(config.user_id.is_none());
        assert_eq!(config.keepalive, Some(Duration::from_secs(25)));
        assert!(config.media.audio);
    }

    #[test]
    fn test_for_user() {
        let config = CallConfig::for_user("12").with_display_name("Tutor Ann");
        assert_eq!(config.user_id.as_deref(), Some("12"));
        assert_eq!(config.display_name, "Tutor Ann");
    }
}
