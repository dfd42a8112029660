use serde::{Deserialize, Serialize};
use std::time::Duration;

/// A public reflection (STUN) server used to discover reachable network paths.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IceServer {
    pub urls: Vec<String>,
}

impl IceServer {
    pub fn stun(url: impl Into<String>) -> Self {
        Self {
            urls: vec![url.into()],
        }
    }
}

/// STUN-only: calls across restrictive NATs may fail to connect.
pub fn default_ice_servers() -> Vec<IceServer> {
    vec![
        IceServer::stun("stun:stun.l.google.com:19302"),
        IceServer::stun("stun:stun1.l.google.com:19302"),
        IceServer::stun("stun:stun2.l.google.com:19302"),
        IceServer::stun("stun:stun3.l.google.com:19302"),
        IceServer::stun("stun:stun4.l.google.com:19302"),
        IceServer::stun("stun:global.stun.twilio.com:3478"),
    ]
}

/// Configuration for the call manager.
#[derive(Clone, Debug)]
pub struct CallConfig {
    /// Reflection servers handed to every peer adapter.
    pub ice_servers: Vec<IceServer>,
    /// Tear the call down if the media path is not up within this window.
    pub negotiation_timeout: Duration,
    /// Period of the call duration timer.
    pub tick_interval: Duration,
    /// Capacity of the command queue feeding the session actor.
    pub command_capacity: usize,
}

impl Default for CallConfig {
    fn default() -> Self {
        Self {
            ice_servers: default_ice_servers(),
            negotiation_timeout: Duration::from_secs(30),
            tick_interval: Duration::from_secs(1),
            command_capacity: 64,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_stun_only() {
        let config = CallConfig::default();
        assert_eq!(config.ice_servers.len(), 6);
        assert!(
            config
                .ice_servers
                .iter()
                .flat_map(|s| s.urls.iter())
                .all(|u| u.starts_with("stun:"))
        );
        assert_eq!(config.negotiation_timeout, Duration::from_secs(30));
        assert_eq!(config.tick_interval, Duration::from_secs(1));
    }
}
