//! Broker: the publish/subscribe collaborator behind the gateway.
//!
//! The gateway never talks to a message service directly. It goes through
//! two traits, split the way managed pub/sub clients split them:
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                    Gateway (per process)                    │
//! │  create/delete topic + subscription, publish, pull, push    │
//! └─────────────────────────────────────────────────────────────┘
//!                 │                              │
//!                 ▼                              ▼
//! ┌───────────────────────────┐  ┌──────────────────────────────┐
//! │       PubSubAdmin         │  │        PubSubTemplate        │
//! │  topics / subscriptions   │  │  publish / pull / ack / nack │
//! │                           │  │  subscribe (push listener)   │
//! └───────────────────────────┘  └──────────────────────────────┘
//!                 │                              │
//!                 ▼                              ▼
//! ┌─────────────────────────────────────────────────────────────┐
//! │   InMemoryBroker (included)   │   managed service client    │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! Names may be short (`orders`) or fully qualified
//! (`projects/<project>/topics/orders`); see [`names`].

mod error;
mod in_memory;
mod message;
pub mod names;
pub mod subscriber;

use async_trait::async_trait;

pub use error::BrokerError;
pub use in_memory::{BrokerSettings, InMemoryBroker};
pub use message::{PublishCompleter, PublishReceipt, PubsubMessage, PulledMessage, Subscription, Topic};
pub use names::{SubscriptionName, TopicName};
pub use subscriber::{AckableMessage, MessageHandler, SubscriberHandle, SubscriberSettings, SubscriberStats};

/// Administrative operations: topic and subscription lifecycle.
#[async_trait]
pub trait PubSubAdmin: Send + Sync {
    /// Create a topic. `Ok(None)` means no topic was created.
    async fn create_topic(&self, topic: &str) -> Result<Option<Topic>, BrokerError>;

    /// Delete a topic.
    async fn delete_topic(&self, topic: &str) -> Result<(), BrokerError>;

    /// Create a subscription bound to `topic`.
    async fn create_subscription(
        &self,
        subscription: &str,
        topic: &str,
    ) -> Result<Subscription, BrokerError>;

    /// Delete a subscription.
    async fn delete_subscription(&self, subscription: &str) -> Result<(), BrokerError>;
}

/// Messaging operations: publish, pull-and-ack, push listeners.
#[async_trait]
pub trait PubSubTemplate: Send + Sync {
    /// Publish a message without waiting for confirmation.
    ///
    /// Failures surface only through the returned receipt.
    fn publish(&self, topic: &str, message: PubsubMessage) -> PublishReceipt;

    /// Pull up to `max_messages`, leasing them until acked or the lease expires.
    ///
    /// With `return_immediately` an empty subscription yields an empty batch
    /// at once; otherwise the broker may wait briefly for messages.
    async fn pull(
        &self,
        subscription: &str,
        max_messages: usize,
        return_immediately: bool,
    ) -> Result<Vec<PulledMessage>, BrokerError>;

    /// Acknowledge a batch of pulled messages as one operation.
    async fn ack(&self, messages: &[PulledMessage]) -> Result<(), BrokerError>;

    /// Return a batch of pulled messages for redelivery.
    async fn nack(&self, messages: &[PulledMessage]) -> Result<(), BrokerError>;

    /// Start a push-style listener on `subscription`.
    ///
    /// The handler runs on the broker's background task, not the caller's.
    fn subscribe(
        &self,
        subscription: &str,
        handler: MessageHandler,
    ) -> Result<SubscriberHandle, BrokerError>;
}
