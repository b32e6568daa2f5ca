//! Push-style listeners registered through the gateway.

use std::time::Duration;

use pubsub_gateway::broker::{BrokerSettings, InMemoryBroker, SubscriberSettings};
use pubsub_gateway::gateway::{Gateway, GatewayError};

use crate::support::eventually;

fn broker() -> InMemoryBroker {
    InMemoryBroker::with_settings(BrokerSettings {
        project_id: "demo".to_string(),
        subscriber: SubscriberSettings {
            max_messages: 10,
            poll_interval: Duration::from_millis(5),
        },
        ..BrokerSettings::default()
    })
}

#[tokio::test]
async fn listener_acks_every_message() {
    let broker = broker();
    let gateway = Gateway::from_broker(broker.clone());
    gateway.create_topic("orders").await.unwrap();
    gateway.create_subscription("orders", "orders-sub").await.unwrap();

    assert_eq!(gateway.subscribe("orders-sub").unwrap(), "Subscribed.");
    assert_eq!(gateway.active_subscribers(), 1);

    gateway.publish("orders", "m", 5);

    assert!(eventually(|| broker.acknowledged("orders-sub").unwrap() == 5).await);
    assert_eq!(broker.backlog_len("orders-sub").unwrap(), 0);

    let stats = gateway.shutdown().await;
    assert_eq!(stats.len(), 1);
    assert_eq!(stats[0].delivered, 5);
    assert_eq!(stats[0].acked, 5);
}

#[tokio::test]
async fn subscribe_returns_before_any_message() {
    let broker = broker();
    let gateway = Gateway::from_broker(broker.clone());
    gateway.create_topic("orders").await.unwrap();
    gateway.create_subscription("orders", "quiet").await.unwrap();

    assert_eq!(gateway.subscribe("quiet").unwrap(), "Subscribed.");
    assert_eq!(gateway.subscribe("quiet").unwrap(), "Subscribed.");
    assert_eq!(gateway.active_subscribers(), 2);
}

#[tokio::test]
async fn subscribe_to_missing_subscription_propagates() {
    let gateway = Gateway::from_broker(broker());
    let err = gateway.subscribe("missing").unwrap_err();
    assert!(matches!(err, GatewayError::Broker(_)));
    assert_eq!(err.status_code(), 404);
    assert_eq!(gateway.active_subscribers(), 0);
}
