//! End-to-end dispatch over the in-memory broker.

use pubsub_gateway::broker::{BrokerError, BrokerSettings, InMemoryBroker};
use pubsub_gateway::gateway::{Gateway, GatewayError, PullOutcome};

fn broker() -> InMemoryBroker {
    InMemoryBroker::with_settings(BrokerSettings {
        project_id: "demo".to_string(),
        ..BrokerSettings::default()
    })
}

async fn gateway_with_subscriptions(broker: &InMemoryBroker, subs: &[&str]) -> Gateway {
    let gateway = Gateway::from_broker(broker.clone());
    gateway.create_topic("orders").await.unwrap();
    for sub in subs {
        gateway.create_subscription("orders", sub).await.unwrap();
    }
    gateway
}

#[tokio::test]
async fn topic_lifecycle_leaves_nothing_behind() {
    let gateway = Gateway::from_broker(broker());

    assert_eq!(gateway.create_topic("orders").await.unwrap(), "Topic creation successful.");
    assert_eq!(gateway.create_topic("orders").await.unwrap(), "Topic creation failed.");
    assert_eq!(gateway.delete_topic("orders").await.unwrap(), "Topic deleted successfully.");

    // Nothing can bind to the deleted topic, and the name is free again.
    let err = gateway.create_subscription("orders", "orders-sub").await.unwrap_err();
    assert_eq!(err.status_code(), 404);
    assert_eq!(gateway.create_topic("orders").await.unwrap(), "Topic creation successful.");
}

#[tokio::test]
async fn deleting_missing_resources_still_reports_success() {
    let gateway = Gateway::from_broker(broker());
    assert_eq!(gateway.delete_topic("ghost").await.unwrap(), "Topic deleted successfully.");
    assert_eq!(
        gateway.delete_subscription("ghost").await.unwrap(),
        "Subscription deleted successfully."
    );
}

#[tokio::test]
async fn invalid_topic_name_propagates() {
    let gateway = Gateway::from_broker(broker());
    let result = gateway.create_topic("9-lives").await;
    assert!(matches!(result, Err(GatewayError::Broker(BrokerError::InvalidName(_)))));
}

#[tokio::test]
async fn subscription_on_missing_topic_propagates() {
    let gateway = Gateway::from_broker(broker());
    let err = gateway.create_subscription("missing", "sub").await.unwrap_err();
    assert_eq!(err.status_code(), 404);
}

#[tokio::test]
async fn publish_then_pull_round_trip() {
    let broker = broker();
    let gateway = gateway_with_subscriptions(&broker, &["orders-sub"]).await;

    gateway.publish("orders", "m", 3);
    let outcome = gateway.pull("orders-sub").await.unwrap();

    assert_eq!(
        outcome.to_string(),
        "Pulled and acked 3 message(s)\
         \n Subscription: projects/demo/subscriptions/orders-sub, message: m1.\
         \n Subscription: projects/demo/subscriptions/orders-sub, message: m2.\
         \n Subscription: projects/demo/subscriptions/orders-sub, message: m3."
    );
    assert_eq!(broker.acknowledged("orders-sub").unwrap(), 3);
    assert_eq!(gateway.pull("orders-sub").await.unwrap(), PullOutcome::Empty);
}

#[tokio::test]
async fn pull_takes_at_most_ten() {
    let broker = broker();
    let gateway = gateway_with_subscriptions(&broker, &["orders-sub"]).await;

    gateway.publish("orders", "m", 12);
    assert_eq!(gateway.pull("orders-sub").await.unwrap().acked_count(), 10);
    assert_eq!(gateway.pull("orders-sub").await.unwrap().acked_count(), 2);
}

#[tokio::test]
async fn multipull_acks_both_subscriptions() {
    let broker = broker();
    let gateway = gateway_with_subscriptions(&broker, &["sub-a", "sub-b"]).await;

    gateway.publish("orders", "m", 4);
    let outcome = gateway.multipull("sub-a", "sub-b").await.unwrap();

    // Same payloads on two subscriptions are two deliveries.
    assert_eq!(outcome.acked_count(), 8);
    assert_eq!(broker.acknowledged("sub-a").unwrap(), 4);
    assert_eq!(broker.acknowledged("sub-b").unwrap(), 4);
}

#[tokio::test]
async fn pull_from_missing_subscription_propagates() {
    let gateway = Gateway::from_broker(broker());
    let err = gateway.pull("missing").await.unwrap_err();
    assert!(matches!(err, GatewayError::Broker(BrokerError::NotFound(_))));
}

#[tokio::test]
async fn publish_to_missing_topic_still_reports_unknown_status() {
    let gateway = Gateway::from_broker(broker());
    assert_eq!(
        gateway.publish("missing", "m", 2),
        "Messages published asynchronously; status unknown."
    );
}
