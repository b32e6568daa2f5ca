//! # pubsub_gateway
//!
//! A small HTTP service in front of a publish/subscribe broker: topic and
//! subscription lifecycle, fire-and-forget publish, pull-and-ack, and
//! push-style listeners.
//!
//! - [`broker`]: the collaborator traits and an in-memory implementation
//! - [`gateway`]: the operation dispatcher and its HTTP routes
//! - [`config`]: environment-driven settings

pub mod broker;
pub mod config;
pub mod gateway;

pub use broker::{BrokerError, InMemoryBroker, PubSubAdmin, PubSubTemplate};
pub use config::{ConfigError, GatewayConfig};
pub use gateway::{Gateway, GatewayError, PullOutcome};
