//! In-memory broker for local runs and tests.
//!
//! This module provides a thread-safe, in-process stand-in for the managed
//! publish/subscribe service. It implements both `PubSubAdmin` and
//! `PubSubTemplate`, which is enough to run the gateway without a cloud
//! account:
//! - Topics fan out to every subscription attached at publish time
//! - Pulls lease messages for `ack_deadline`; expired leases are redelivered
//! - Acks and nacks are batched per call
//!
//! ## Example
//!
//! ```
//! use pubsub_gateway::broker::{InMemoryBroker, PubSubAdmin, PubSubTemplate, PubsubMessage};
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() -> Result<(), pubsub_gateway::broker::BrokerError> {
//! let broker = InMemoryBroker::new();
//! broker.create_topic("orders").await?;
//! broker.create_subscription("orders-audit", "orders").await?;
//!
//! drop(broker.publish("orders", PubsubMessage::new("hello")));
//!
//! let pulled = broker.pull("orders-audit", 10, true).await?;
//! assert_eq!(pulled.len(), 1);
//! broker.ack(&pulled).await?;
//! # Ok(())
//! # }
//! ```

use std::collections::{BTreeSet, HashMap, VecDeque};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::Notify;
use tokio::time::Instant;
use tracing::debug;

use super::error::BrokerError;
use super::message::{PublishReceipt, PubsubMessage, PulledMessage, Subscription, Topic};
use super::names::{SubscriptionName, TopicName};
use super::subscriber::{self, MessageHandler, SubscriberHandle, SubscriberSettings};
use super::{PubSubAdmin, PubSubTemplate};

/// Settings for the in-memory broker.
#[derive(Debug, Clone)]
pub struct BrokerSettings {
    /// Project used to qualify short names.
    pub project_id: String,
    /// How long a pulled message stays leased before it is redelivered.
    pub ack_deadline: Duration,
    /// How long a pull with `return_immediately = false` waits for a message.
    pub pull_wait: Duration,
    /// Settings for push-style listeners started by `subscribe`.
    pub subscriber: SubscriberSettings,
}

impl Default for BrokerSettings {
    fn default() -> Self {
        Self {
            project_id: "local-project".to_string(),
            ack_deadline: Duration::from_secs(10),
            pull_wait: Duration::from_secs(1),
            subscriber: SubscriberSettings::default(),
        }
    }
}

struct Pending {
    message: PubsubMessage,
    attempts: u32,
}

struct Lease {
    message: PubsubMessage,
    attempts: u32,
    deadline: Instant,
}

#[derive(Default)]
struct SubscriptionState {
    topic: Option<TopicName>,
    backlog: VecDeque<Pending>,
    leased: HashMap<String, Lease>,
    acknowledged: usize,
}

impl SubscriptionState {
    /// Return expired leases to the front of the backlog.
    fn reclaim_expired(&mut self, now: Instant) {
        let expired: Vec<String> = self
            .leased
            .iter()
            .filter(|(_, lease)| lease.deadline <= now)
            .map(|(ack_id, _)| ack_id.clone())
            .collect();

        for ack_id in expired {
            if let Some(lease) = self.leased.remove(&ack_id) {
                self.backlog.push_front(Pending {
                    message: lease.message,
                    attempts: lease.attempts,
                });
            }
        }
    }
}

#[derive(Default)]
struct BrokerState {
    topics: HashMap<TopicName, BTreeSet<SubscriptionName>>,
    subscriptions: HashMap<SubscriptionName, SubscriptionState>,
    next_message_id: u64,
    next_ack_id: u64,
}

/// In-memory publish/subscribe broker.
///
/// Cheap to clone; clones share the same topics and subscriptions.
#[derive(Clone)]
pub struct InMemoryBroker {
    settings: Arc<BrokerSettings>,
    state: Arc<Mutex<BrokerState>>,
    arrivals: Arc<Notify>,
}

impl Default for InMemoryBroker {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryBroker {
    /// Create a broker with default settings.
    pub fn new() -> Self {
        Self::with_settings(BrokerSettings::default())
    }

    /// Create a broker with the given settings.
    pub fn with_settings(settings: BrokerSettings) -> Self {
        Self {
            settings: Arc::new(settings),
            state: Arc::new(Mutex::new(BrokerState::default())),
            arrivals: Arc::new(Notify::new()),
        }
    }

    /// Number of messages waiting to be pulled from `subscription`.
    pub fn backlog_len(&self, subscription: &str) -> Result<usize, BrokerError> {
        let name = self.subscription_name(subscription)?;
        let mut state = self.state();
        let sub = lookup(&mut state, &name)?;
        sub.reclaim_expired(Instant::now());
        Ok(sub.backlog.len())
    }

    /// Number of messages currently leased (pulled, not yet acked).
    pub fn leased_len(&self, subscription: &str) -> Result<usize, BrokerError> {
        let name = self.subscription_name(subscription)?;
        let mut state = self.state();
        let sub = lookup(&mut state, &name)?;
        sub.reclaim_expired(Instant::now());
        Ok(sub.leased.len())
    }

    /// Total messages acknowledged on `subscription`.
    pub fn acknowledged(&self, subscription: &str) -> Result<usize, BrokerError> {
        let name = self.subscription_name(subscription)?;
        let mut state = self.state();
        Ok(lookup(&mut state, &name)?.acknowledged)
    }

    fn state(&self) -> MutexGuard<'_, BrokerState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn topic_name(&self, raw: &str) -> Result<TopicName, BrokerError> {
        TopicName::parse(&self.settings.project_id, raw)
    }

    fn subscription_name(&self, raw: &str) -> Result<SubscriptionName, BrokerError> {
        SubscriptionName::parse(&self.settings.project_id, raw)
    }

    fn try_publish(&self, topic: &str, mut message: PubsubMessage) -> Result<String, BrokerError> {
        let name = self.topic_name(topic)?;
        let mut state = self.state();
        let attached = state
            .topics
            .get(&name)
            .cloned()
            .ok_or_else(|| BrokerError::NotFound(name.to_string()))?;

        state.next_message_id += 1;
        message.message_id = state.next_message_id.to_string();
        message.publish_time = Some(Utc::now());

        for sub in &attached {
            if let Some(sub) = state.subscriptions.get_mut(sub) {
                sub.backlog.push_back(Pending {
                    message: message.clone(),
                    attempts: 0,
                });
            }
        }
        drop(state);

        debug!(topic = %name, message_id = %message.message_id, fanout = attached.len(), "published");
        self.arrivals.notify_waiters();
        Ok(message.message_id)
    }

    fn try_pull(
        &self,
        name: &SubscriptionName,
        max_messages: usize,
    ) -> Result<Vec<PulledMessage>, BrokerError> {
        let now = Instant::now();
        let deadline = now + self.settings.ack_deadline;

        let mut state = self.state();
        let state = &mut *state;
        let sub = state
            .subscriptions
            .get_mut(name)
            .ok_or_else(|| BrokerError::NotFound(name.to_string()))?;
        sub.reclaim_expired(now);

        let mut pulled = Vec::new();
        while pulled.len() < max_messages {
            let Some(pending) = sub.backlog.pop_front() else {
                break;
            };
            state.next_ack_id += 1;
            let ack_id = format!("{}-{}", name.name(), state.next_ack_id);
            let attempts = pending.attempts + 1;

            pulled.push(PulledMessage {
                subscription: name.clone(),
                ack_id: ack_id.clone(),
                message: pending.message.clone(),
                delivery_attempt: attempts,
            });
            sub.leased.insert(
                ack_id,
                Lease {
                    message: pending.message,
                    attempts,
                    deadline,
                },
            );
        }

        Ok(pulled)
    }

    /// Resolve every subscription named in `messages` before touching any of them.
    fn batch_names(&self, messages: &[PulledMessage]) -> Result<Vec<SubscriptionName>, BrokerError> {
        let state = self.state();
        let mut names: Vec<SubscriptionName> = Vec::new();
        for message in messages {
            let name = self.subscription_name(&message.subscription.to_string())?;
            if !state.subscriptions.contains_key(&name) {
                return Err(BrokerError::NotFound(name.to_string()));
            }
            if !names.contains(&name) {
                names.push(name);
            }
        }
        Ok(names)
    }
}

fn lookup<'a>(
    state: &'a mut BrokerState,
    name: &SubscriptionName,
) -> Result<&'a mut SubscriptionState, BrokerError> {
    state
        .subscriptions
        .get_mut(name)
        .ok_or_else(|| BrokerError::NotFound(name.to_string()))
}

#[async_trait]
impl PubSubAdmin for InMemoryBroker {
    async fn create_topic(&self, topic: &str) -> Result<Option<Topic>, BrokerError> {
        let name = self.topic_name(topic)?;
        let mut state = self.state();
        if state.topics.contains_key(&name) {
            return Ok(None);
        }
        state.topics.insert(name.clone(), BTreeSet::new());
        Ok(Some(Topic { name }))
    }

    async fn delete_topic(&self, topic: &str) -> Result<(), BrokerError> {
        let name = self.topic_name(topic)?;
        let mut state = self.state();
        if let Some(attached) = state.topics.remove(&name) {
            for sub in attached {
                if let Some(sub) = state.subscriptions.get_mut(&sub) {
                    sub.topic = None;
                }
            }
        }
        Ok(())
    }

    async fn create_subscription(
        &self,
        subscription: &str,
        topic: &str,
    ) -> Result<Subscription, BrokerError> {
        let sub_name = self.subscription_name(subscription)?;
        let topic_name = self.topic_name(topic)?;
        let mut state = self.state();

        if state.subscriptions.contains_key(&sub_name) {
            return Err(BrokerError::AlreadyExists(sub_name.to_string()));
        }
        let attached = state
            .topics
            .get_mut(&topic_name)
            .ok_or_else(|| BrokerError::NotFound(topic_name.to_string()))?;
        attached.insert(sub_name.clone());

        state.subscriptions.insert(
            sub_name.clone(),
            SubscriptionState {
                topic: Some(topic_name.clone()),
                ..SubscriptionState::default()
            },
        );

        Ok(Subscription {
            name: sub_name,
            topic: topic_name,
        })
    }

    async fn delete_subscription(&self, subscription: &str) -> Result<(), BrokerError> {
        let name = self.subscription_name(subscription)?;
        let mut state = self.state();
        if let Some(sub) = state.subscriptions.remove(&name) {
            if let Some(topic) = sub.topic {
                if let Some(attached) = state.topics.get_mut(&topic) {
                    attached.remove(&name);
                }
            }
        }
        Ok(())
    }
}

#[async_trait]
impl PubSubTemplate for InMemoryBroker {
    fn publish(&self, topic: &str, message: PubsubMessage) -> PublishReceipt {
        PublishReceipt::resolved(self.try_publish(topic, message))
    }

    async fn pull(
        &self,
        subscription: &str,
        max_messages: usize,
        return_immediately: bool,
    ) -> Result<Vec<PulledMessage>, BrokerError> {
        if max_messages == 0 {
            return Err(BrokerError::Rejected("max_messages must be positive".into()));
        }
        let name = self.subscription_name(subscription)?;

        let arrived = self.arrivals.notified();
        let pulled = self.try_pull(&name, max_messages)?;
        if !pulled.is_empty() || return_immediately {
            return Ok(pulled);
        }

        // Nothing yet: wait for the next publish or the pull wait, then try once more.
        let _ = tokio::time::timeout(self.settings.pull_wait, arrived).await;
        self.try_pull(&name, max_messages)
    }

    async fn ack(&self, messages: &[PulledMessage]) -> Result<(), BrokerError> {
        let names = self.batch_names(messages)?;
        let now = Instant::now();
        let mut state = self.state();

        for name in &names {
            if let Some(sub) = state.subscriptions.get_mut(name) {
                sub.reclaim_expired(now);
            }
        }
        for message in messages {
            if let Some(sub) = state.subscriptions.get_mut(&message.subscription) {
                // Stale ack ids (lease expired and redelivered) are ignored.
                if sub.leased.remove(&message.ack_id).is_some() {
                    sub.acknowledged += 1;
                }
            }
        }
        Ok(())
    }

    async fn nack(&self, messages: &[PulledMessage]) -> Result<(), BrokerError> {
        self.batch_names(messages)?;
        let mut state = self.state();

        for message in messages {
            if let Some(sub) = state.subscriptions.get_mut(&message.subscription) {
                if let Some(lease) = sub.leased.remove(&message.ack_id) {
                    sub.backlog.push_front(Pending {
                        message: lease.message,
                        attempts: lease.attempts,
                    });
                }
            }
        }
        drop(state);

        self.arrivals.notify_waiters();
        Ok(())
    }

    fn subscribe(
        &self,
        subscription: &str,
        handler: MessageHandler,
    ) -> Result<SubscriberHandle, BrokerError> {
        let name = self.subscription_name(subscription)?;
        if !self.state().subscriptions.contains_key(&name) {
            return Err(BrokerError::NotFound(name.to_string()));
        }

        Ok(subscriber::spawn(
            Arc::new(self.clone()),
            name,
            handler,
            self.settings.subscriber.clone(),
        ))
    }
}
