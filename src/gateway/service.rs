//! Gateway: maps each inbound operation to one broker call.
//!
//! `Gateway` holds the admin and messaging collaborators plus the handles of
//! every push listener started through it. Each operation is a single
//! delegated call followed by status formatting.
//!
//! ## Example
//!
//! ```
//! use pubsub_gateway::broker::InMemoryBroker;
//! use pubsub_gateway::gateway::{Gateway, PullOutcome};
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() -> Result<(), pubsub_gateway::gateway::GatewayError> {
//! let gateway = Gateway::from_broker(InMemoryBroker::new());
//!
//! gateway.create_topic("orders").await?;
//! gateway.create_subscription("orders", "orders-sub").await?;
//! gateway.publish("orders", "m", 3);
//!
//! let outcome = gateway.pull("orders-sub").await?;
//! assert_eq!(outcome.acked_count(), 3);
//! # Ok(())
//! # }
//! ```

use std::collections::HashSet;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use tracing::{debug, info, warn};

use super::error::GatewayError;
use super::outcome::{self, PullOutcome};
use crate::broker::{
    AckableMessage, MessageHandler, PubSubAdmin, PubSubTemplate, PubsubMessage, PulledMessage,
    SubscriberHandle, SubscriberStats,
};

/// Messages requested by a single-subscription pull.
pub const PULL_MAX_MESSAGES: usize = 10;

/// Messages requested from each subscription by a multipull.
pub const MULTIPULL_MAX_MESSAGES: usize = 1000;

const DEFAULT_ACK_TIMEOUT: Duration = Duration::from_secs(30);

/// Request router / operation dispatcher over a publish/subscribe broker.
pub struct Gateway {
    admin: Arc<dyn PubSubAdmin>,
    template: Arc<dyn PubSubTemplate>,
    subscribers: Mutex<Vec<SubscriberHandle>>,
    ack_timeout: Duration,
}

impl Gateway {
    /// Create a gateway over separate admin and messaging collaborators.
    pub fn new(admin: Arc<dyn PubSubAdmin>, template: Arc<dyn PubSubTemplate>) -> Self {
        Self {
            admin,
            template,
            subscribers: Mutex::new(Vec::new()),
            ack_timeout: DEFAULT_ACK_TIMEOUT,
        }
    }

    /// Create a gateway from a broker that implements both collaborators.
    pub fn from_broker<B>(broker: B) -> Self
    where
        B: PubSubAdmin + PubSubTemplate + 'static,
    {
        let broker = Arc::new(broker);
        Self::new(broker.clone(), broker)
    }

    /// Bound the batched ack wait in `pull` and `multipull`.
    ///
    /// Builder style, returns `self` for chaining.
    pub fn with_ack_timeout(mut self, ack_timeout: Duration) -> Self {
        self.ack_timeout = ack_timeout;
        self
    }

    /// `CreateTopic(topicName)`.
    pub async fn create_topic(&self, topic: &str) -> Result<&'static str, GatewayError> {
        debug!(%topic, "create topic");
        match self.admin.create_topic(topic).await? {
            Some(created) => {
                info!(topic = %created.name, "topic created");
                Ok(outcome::TOPIC_CREATED)
            }
            None => {
                info!(%topic, "topic not created");
                Ok(outcome::TOPIC_NOT_CREATED)
            }
        }
    }

    /// `CreateSubscription(topicName, subscriptionName)`.
    pub async fn create_subscription(
        &self,
        topic: &str,
        subscription: &str,
    ) -> Result<&'static str, GatewayError> {
        debug!(%topic, %subscription, "create subscription");
        let created = self.admin.create_subscription(subscription, topic).await?;
        info!(subscription = %created.name, topic = %created.topic, "subscription created");
        Ok(outcome::SUBSCRIPTION_CREATED)
    }

    /// `Publish(topicName, message, count)`.
    ///
    /// Publishes `message1` .. `message<count>` and returns without waiting
    /// for any of them to be confirmed.
    pub fn publish(&self, topic: &str, message: &str, count: i32) -> &'static str {
        debug!(%topic, count, "publish");
        for i in 1..=count {
            let receipt = self
                .template
                .publish(topic, PubsubMessage::new(format!("{message}{i}")));
            // Receipts are dropped unobserved.
            drop(receipt);
        }
        outcome::PUBLISHED
    }

    /// `Pull(subscriptionName)`: up to ten messages, acked as one batch.
    pub async fn pull(&self, subscription: &str) -> Result<PullOutcome, GatewayError> {
        debug!(%subscription, "pull");
        let messages = self
            .template
            .pull(subscription, PULL_MAX_MESSAGES, true)
            .await?;
        Ok(self.acknowledge(messages).await)
    }

    /// `MultiPull(subscriptionName1, subscriptionName2)`.
    ///
    /// Pulls from both subscriptions, merges the deliveries into one set and
    /// acks the set as one batch.
    pub async fn multipull(
        &self,
        first: &str,
        second: &str,
    ) -> Result<PullOutcome, GatewayError> {
        debug!(%first, %second, "multipull");
        let mut merged: HashSet<PulledMessage> = HashSet::new();
        merged.extend(
            self.template
                .pull(first, MULTIPULL_MAX_MESSAGES, true)
                .await?,
        );
        merged.extend(
            self.template
                .pull(second, MULTIPULL_MAX_MESSAGES, true)
                .await?,
        );
        Ok(self.acknowledge(merged.into_iter().collect()).await)
    }

    /// `Subscribe(subscriptionName)`: log and ack everything that arrives.
    pub fn subscribe(&self, subscription: &str) -> Result<&'static str, GatewayError> {
        debug!(%subscription, "subscribe");
        let name = subscription.to_string();
        let handler: MessageHandler = Arc::new(move |message: AckableMessage| {
            info!(
                "Message received from {} subscription: {}",
                name,
                message.message().data_lossy()
            );
            message.ack();
        });

        let handle = self.template.subscribe(subscription, handler)?;
        info!(subscription = %handle.subscription(), "listener started");
        self.subscribers().push(handle);
        Ok(outcome::SUBSCRIBED)
    }

    /// `DeleteTopic(topicName)`.
    pub async fn delete_topic(&self, topic: &str) -> Result<&'static str, GatewayError> {
        debug!(%topic, "delete topic");
        self.admin.delete_topic(topic).await?;
        Ok(outcome::TOPIC_DELETED)
    }

    /// `DeleteSubscription(subscriptionName)`.
    pub async fn delete_subscription(&self, subscription: &str) -> Result<&'static str, GatewayError> {
        debug!(%subscription, "delete subscription");
        self.admin.delete_subscription(subscription).await?;
        Ok(outcome::SUBSCRIPTION_DELETED)
    }

    /// Number of push listeners started through this gateway.
    pub fn active_subscribers(&self) -> usize {
        self.subscribers().len()
    }

    /// Stop every push listener and return their stats.
    ///
    /// Only used when the process shuts down; no request can reach it.
    pub async fn shutdown(&self) -> Vec<SubscriberStats> {
        let handles = std::mem::take(&mut *self.subscribers());
        let mut stats = Vec::with_capacity(handles.len());
        for handle in handles {
            let subscription = handle.subscription().to_string();
            let stopped = handle.stop().await;
            info!(%subscription, delivered = stopped.delivered, acked = stopped.acked, "listener stopped");
            stats.push(stopped);
        }
        stats
    }

    async fn acknowledge(&self, messages: Vec<PulledMessage>) -> PullOutcome {
        if messages.is_empty() {
            return PullOutcome::Empty;
        }

        let count = messages.len();
        match tokio::time::timeout(self.ack_timeout, self.template.ack(&messages)).await {
            Ok(Ok(())) => {
                info!(count, "pulled and acked");
                PullOutcome::Acked(messages)
            }
            Ok(Err(e)) => {
                warn!(count, error = %e, "Acking failed.");
                PullOutcome::AckFailed
            }
            Err(_) => {
                warn!(
                    count,
                    timeout_ms = self.ack_timeout.as_millis() as u64,
                    "Acking failed: timed out"
                );
                PullOutcome::AckFailed
            }
        }
    }

    fn subscribers(&self) -> MutexGuard<'_, Vec<SubscriberHandle>> {
        self.subscribers.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
