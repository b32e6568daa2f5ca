//! Test doubles: a recording broker whose answers are scripted per test.

use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use pubsub_gateway::broker::{
    self, BrokerError, MessageHandler, PubSubAdmin, PubSubTemplate, PublishReceipt, PubsubMessage,
    PulledMessage, SubscriberHandle, SubscriberSettings, Subscription, SubscriptionName, Topic,
    TopicName,
};

pub const PROJECT: &str = "test-project";

/// How the scripted broker answers an ack.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum AckBehaviour {
    Succeed,
    Fail,
    Hang,
}

#[derive(Default)]
struct Recorded {
    published: Vec<(String, PubsubMessage)>,
    pull_requests: Vec<(String, usize, bool)>,
    pull_results: HashMap<String, VecDeque<Vec<PulledMessage>>>,
    ack_batches: Vec<Vec<PulledMessage>>,
    admin_calls: Vec<String>,
    subscribe_calls: usize,
}

/// Broker double that records every call and answers from a script.
#[derive(Clone)]
pub struct ScriptedBroker {
    recorded: Arc<Mutex<Recorded>>,
    ack: Arc<Mutex<AckBehaviour>>,
    create_topic_returns_none: Arc<Mutex<bool>>,
    admin_error: Arc<Mutex<Option<BrokerError>>>,
}

impl ScriptedBroker {
    pub fn new() -> Self {
        Self {
            recorded: Arc::new(Mutex::new(Recorded::default())),
            ack: Arc::new(Mutex::new(AckBehaviour::Succeed)),
            create_topic_returns_none: Arc::new(Mutex::new(false)),
            admin_error: Arc::new(Mutex::new(None)),
        }
    }

    /// Queue the batch the next pull of `subscription` returns.
    pub fn will_pull(&self, subscription: &str, batch: Vec<PulledMessage>) {
        self.recorded
            .lock()
            .unwrap()
            .pull_results
            .entry(subscription.to_string())
            .or_default()
            .push_back(batch);
    }

    pub fn acks(&self, behaviour: AckBehaviour) {
        *self.ack.lock().unwrap() = behaviour;
    }

    pub fn create_topic_returns_none(&self) {
        *self.create_topic_returns_none.lock().unwrap() = true;
    }

    pub fn admin_fails_with(&self, error: BrokerError) {
        *self.admin_error.lock().unwrap() = Some(error);
    }

    pub fn published(&self) -> Vec<(String, String)> {
        self.recorded
            .lock()
            .unwrap()
            .published
            .iter()
            .map(|(topic, msg)| (topic.clone(), msg.data_lossy()))
            .collect()
    }

    pub fn pull_requests(&self) -> Vec<(String, usize, bool)> {
        self.recorded.lock().unwrap().pull_requests.clone()
    }

    pub fn ack_batches(&self) -> Vec<Vec<PulledMessage>> {
        self.recorded.lock().unwrap().ack_batches.clone()
    }

    pub fn admin_calls(&self) -> Vec<String> {
        self.recorded.lock().unwrap().admin_calls.clone()
    }

    pub fn subscribe_calls(&self) -> usize {
        self.recorded.lock().unwrap().subscribe_calls
    }

    fn admin(&self, call: String) -> Result<(), BrokerError> {
        self.recorded.lock().unwrap().admin_calls.push(call);
        match self.admin_error.lock().unwrap().clone() {
            Some(error) => Err(error),
            None => Ok(()),
        }
    }
}

/// Build a pulled message as if leased from `subscription`.
pub fn pulled(subscription: &str, ack_id: &str, data: &str) -> PulledMessage {
    PulledMessage {
        subscription: SubscriptionName::parse(PROJECT, subscription).unwrap(),
        ack_id: ack_id.to_string(),
        message: PubsubMessage::new(data),
        delivery_attempt: 1,
    }
}

#[async_trait]
impl PubSubAdmin for ScriptedBroker {
    async fn create_topic(&self, topic: &str) -> Result<Option<Topic>, BrokerError> {
        self.admin(format!("create_topic {topic}"))?;
        if *self.create_topic_returns_none.lock().unwrap() {
            return Ok(None);
        }
        Ok(Some(Topic {
            name: TopicName::parse(PROJECT, topic)?,
        }))
    }

    async fn delete_topic(&self, topic: &str) -> Result<(), BrokerError> {
        self.admin(format!("delete_topic {topic}"))
    }

    async fn create_subscription(
        &self,
        subscription: &str,
        topic: &str,
    ) -> Result<Subscription, BrokerError> {
        self.admin(format!("create_subscription {subscription} {topic}"))?;
        Ok(Subscription {
            name: SubscriptionName::parse(PROJECT, subscription)?,
            topic: TopicName::parse(PROJECT, topic)?,
        })
    }

    async fn delete_subscription(&self, subscription: &str) -> Result<(), BrokerError> {
        self.admin(format!("delete_subscription {subscription}"))
    }
}

#[async_trait]
impl PubSubTemplate for ScriptedBroker {
    fn publish(&self, topic: &str, message: PubsubMessage) -> PublishReceipt {
        let mut recorded = self.recorded.lock().unwrap();
        recorded.published.push((topic.to_string(), message));
        // Never resolved: the gateway must not wait on it.
        let (completer, receipt) = PublishReceipt::pending();
        std::mem::forget(completer);
        receipt
    }

    async fn pull(
        &self,
        subscription: &str,
        max_messages: usize,
        return_immediately: bool,
    ) -> Result<Vec<PulledMessage>, BrokerError> {
        let mut recorded = self.recorded.lock().unwrap();
        recorded
            .pull_requests
            .push((subscription.to_string(), max_messages, return_immediately));
        Ok(recorded
            .pull_results
            .get_mut(subscription)
            .and_then(VecDeque::pop_front)
            .unwrap_or_default())
    }

    async fn ack(&self, messages: &[PulledMessage]) -> Result<(), BrokerError> {
        self.recorded
            .lock()
            .unwrap()
            .ack_batches
            .push(messages.to_vec());
        let behaviour = *self.ack.lock().unwrap();
        match behaviour {
            AckBehaviour::Succeed => Ok(()),
            AckBehaviour::Fail => Err(BrokerError::ConnectionFailed("ack stream reset".into())),
            AckBehaviour::Hang => std::future::pending().await,
        }
    }

    async fn nack(&self, _messages: &[PulledMessage]) -> Result<(), BrokerError> {
        Ok(())
    }

    fn subscribe(
        &self,
        subscription: &str,
        handler: MessageHandler,
    ) -> Result<SubscriberHandle, BrokerError> {
        let name = SubscriptionName::parse(PROJECT, subscription)?;
        self.recorded.lock().unwrap().subscribe_calls += 1;
        Ok(broker::subscriber::spawn(
            Arc::new(self.clone()),
            name,
            handler,
            SubscriberSettings {
                max_messages: 10,
                poll_interval: Duration::from_millis(5),
            },
        ))
    }
}

/// Poll `check` until it holds or two seconds pass.
pub async fn eventually<F: FnMut() -> bool>(mut check: F) -> bool {
    for _ in 0..200 {
        if check() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    check()
}
