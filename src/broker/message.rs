//! Messages, pulled deliveries and publish receipts.

use std::hash::{Hash, Hasher};

use chrono::{DateTime, Utc};
use tokio::sync::oneshot;

use super::error::BrokerError;
use super::names::{SubscriptionName, TopicName};

/// A topic as returned by the admin collaborator.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Topic {
    pub name: TopicName,
}

/// A subscription as returned by the admin collaborator.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Subscription {
    pub name: SubscriptionName,
    /// The topic the subscription was bound to at creation.
    pub topic: TopicName,
}

/// A message as stored by the broker.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PubsubMessage {
    /// Server-assigned identifier (empty until published).
    pub message_id: String,
    /// Opaque payload.
    pub data: Vec<u8>,
    /// Server-assigned publish time.
    pub publish_time: Option<DateTime<Utc>>,
}

impl PubsubMessage {
    /// Create an unpublished message with the given payload.
    pub fn new(data: impl Into<Vec<u8>>) -> Self {
        Self {
            message_id: String::new(),
            data: data.into(),
            publish_time: None,
        }
    }

    /// Get the payload as a string (if valid UTF-8).
    pub fn data_str(&self) -> Option<&str> {
        std::str::from_utf8(&self.data).ok()
    }

    /// The payload as text, replacing invalid UTF-8.
    pub fn data_lossy(&self) -> String {
        String::from_utf8_lossy(&self.data).into_owned()
    }
}

/// A message leased from a subscription by a pull.
///
/// Two pulled messages are equal when they are the same delivery: same
/// subscription and same ack id. Identical payloads delivered to different
/// subscriptions are distinct.
#[derive(Clone, Debug)]
pub struct PulledMessage {
    pub subscription: SubscriptionName,
    pub ack_id: String,
    pub message: PubsubMessage,
    /// 1 on first delivery, incremented on every redelivery.
    pub delivery_attempt: u32,
}

impl PartialEq for PulledMessage {
    fn eq(&self, other: &Self) -> bool {
        self.subscription == other.subscription && self.ack_id == other.ack_id
    }
}

impl Eq for PulledMessage {}

impl Hash for PulledMessage {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.subscription.hash(state);
        self.ack_id.hash(state);
    }
}

/// Future outcome of a publish: resolves to the server-assigned message id.
///
/// Callers that do not care about delivery simply drop it.
#[derive(Debug)]
pub struct PublishReceipt {
    rx: oneshot::Receiver<Result<String, BrokerError>>,
}

/// Completion side of a [`PublishReceipt`].
#[derive(Debug)]
pub struct PublishCompleter {
    tx: oneshot::Sender<Result<String, BrokerError>>,
}

impl PublishReceipt {
    /// Create an unresolved receipt and the handle that resolves it.
    pub fn pending() -> (PublishCompleter, PublishReceipt) {
        let (tx, rx) = oneshot::channel();
        (PublishCompleter { tx }, PublishReceipt { rx })
    }

    /// Create a receipt that is already resolved.
    pub fn resolved(result: Result<String, BrokerError>) -> Self {
        let (completer, receipt) = Self::pending();
        completer.complete(result);
        receipt
    }

    /// Wait for the publish to be confirmed.
    pub async fn message_id(self) -> Result<String, BrokerError> {
        self.rx.await.unwrap_or_else(|_| {
            Err(BrokerError::ConnectionFailed(
                "publisher dropped before confirming".into(),
            ))
        })
    }
}

impl PublishCompleter {
    pub fn complete(self, result: Result<String, BrokerError>) {
        // Nobody listening is the fire-and-forget case.
        let _ = self.tx.send(result);
    }
}
