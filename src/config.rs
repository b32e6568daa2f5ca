//! Gateway configuration.
//!
//! Configuration is loaded from environment variables with fallback to defaults.

use std::env;
use std::net::{IpAddr, SocketAddr};
use std::str::FromStr;
use std::time::Duration;

use crate::broker::{BrokerSettings, SubscriberSettings};

/// Gateway configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GatewayConfig {
    /// Host the HTTP server binds to
    pub http_host: String,

    /// HTTP server port
    pub http_port: u16,

    /// Project used to qualify short topic and subscription names
    pub project_id: String,

    /// Upper bound on the batched ack wait in pull and multipull
    pub ack_timeout_ms: u64,

    /// Lease length of a pulled message before redelivery
    pub ack_deadline_secs: u64,

    /// Messages pulled per poll by push-style listeners
    pub subscriber_max_messages: usize,

    /// Idle wait between listener polls
    pub subscriber_poll_interval_ms: u64,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            http_host: "0.0.0.0".to_string(),
            http_port: 8080,
            project_id: "local-project".to_string(),
            ack_timeout_ms: 30_000,
            ack_deadline_secs: 10,
            subscriber_max_messages: 100,
            subscriber_poll_interval_ms: 100,
        }
    }
}

impl GatewayConfig {
    /// Load configuration from environment variables.
    pub fn load() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Load configuration from an arbitrary key lookup.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();

        let config = GatewayConfig {
            http_host: lookup("HTTP_HOST").unwrap_or(defaults.http_host),
            http_port: parse_or(&lookup, "HTTP_PORT", defaults.http_port)?,
            project_id: lookup("PUBSUB_PROJECT_ID").unwrap_or(defaults.project_id),
            ack_timeout_ms: parse_or(&lookup, "ACK_TIMEOUT_MS", defaults.ack_timeout_ms)?,
            ack_deadline_secs: parse_or(&lookup, "ACK_DEADLINE_SECS", defaults.ack_deadline_secs)?,
            subscriber_max_messages: parse_or(
                &lookup,
                "SUBSCRIBER_MAX_MESSAGES",
                defaults.subscriber_max_messages,
            )?,
            subscriber_poll_interval_ms: parse_or(
                &lookup,
                "SUBSCRIBER_POLL_INTERVAL_MS",
                defaults.subscriber_poll_interval_ms,
            )?,
        };

        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.project_id.trim().is_empty() {
            return Err(ConfigError::MissingRequired("PUBSUB_PROJECT_ID".to_string()));
        }
        let non_zero = [
            ("ACK_TIMEOUT_MS", self.ack_timeout_ms),
            ("ACK_DEADLINE_SECS", self.ack_deadline_secs),
            ("SUBSCRIBER_MAX_MESSAGES", self.subscriber_max_messages as u64),
            ("SUBSCRIBER_POLL_INTERVAL_MS", self.subscriber_poll_interval_ms),
        ];
        if let Some((key, _)) = non_zero.iter().find(|(_, value)| *value == 0) {
            return Err(ConfigError::InvalidValue(key.to_string()));
        }
        Ok(())
    }

    /// Address the HTTP server binds to.
    ///
    /// `HTTP_HOST` may be an IPv4 or IPv6 address or a hostname; hostnames
    /// bind to the first address they resolve to.
    pub async fn http_addr(&self) -> Result<SocketAddr, ConfigError> {
        let host = self.http_host.trim();
        if let Ok(ip) = host.parse::<IpAddr>() {
            return Ok(SocketAddr::new(ip, self.http_port));
        }
        tokio::net::lookup_host((host, self.http_port))
            .await
            .ok()
            .and_then(|mut addrs| addrs.next())
            .ok_or_else(|| ConfigError::InvalidValue("HTTP_HOST".to_string()))
    }

    pub fn ack_timeout(&self) -> Duration {
        Duration::from_millis(self.ack_timeout_ms)
    }

    /// Settings for the in-process broker.
    pub fn broker_settings(&self) -> BrokerSettings {
        BrokerSettings {
            project_id: self.project_id.clone(),
            ack_deadline: Duration::from_secs(self.ack_deadline_secs),
            subscriber: SubscriberSettings {
                max_messages: self.subscriber_max_messages,
                poll_interval: Duration::from_millis(self.subscriber_poll_interval_ms),
            },
            ..BrokerSettings::default()
        }
    }
}

fn parse_or<F, T>(lookup: &F, key: &str, default: T) -> Result<T, ConfigError>
where
    F: Fn(&str) -> Option<String>,
    T: FromStr,
{
    match lookup(key) {
        Some(raw) => raw
            .trim()
            .parse()
            .map_err(|_| ConfigError::InvalidValue(key.to_string())),
        None => Ok(default),
    }
}

/// Configuration error types.
#[derive(Debug, PartialEq, Eq, thiserror::Error)]
pub enum ConfigError {
    #[error("Invalid value for {0}")]
    InvalidValue(String),

    #[error("Missing required configuration: {0}")]
    MissingRequired(String),
}
