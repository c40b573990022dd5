//! Start/stop behaviour of the bridge.

use std::time::Duration;

use event_bridge::transport::Side;
use event_bridge::{BridgeError, ConnectionError, ConnectionState, TopicRegistry};

use crate::support::{harness, next_event, orders, Foo};

#[tokio::test]
async fn subscribes_once_per_bound_topic() {
    let h = harness(orders());

    h.bridge.on_start().await.unwrap();

    let mut subscriptions = h.broker.subscriptions();
    subscriptions.sort();
    assert_eq!(subscriptions, vec!["OrderCancelled", "OrderPlaced"]);
    // only events raised after start are wanted
    assert!(h
        .broker
        .subscription_requests()
        .iter()
        .all(|(_, from_beginning)| !from_beginning));
    assert_eq!(h.bridge.state(), ConnectionState::Connected);
    assert!(h.bus.has_publisher());

    h.bridge.on_stop().await;
}

#[tokio::test]
async fn empty_registry_subscribes_nothing() {
    let h = harness(TopicRegistry::new());

    h.bridge.on_start().await.unwrap();

    assert!(h.broker.subscriptions().is_empty());
    assert_eq!(h.bridge.state(), ConnectionState::Connected);
    assert!(h.bus.has_publisher());

    h.bridge.on_stop().await;
    assert_eq!(h.broker.connected_consumers(), 0);
}

#[tokio::test]
async fn stop_before_start_and_stop_twice() {
    let h = harness(orders());

    h.bridge.on_stop().await;
    assert_eq!(h.bridge.state(), ConnectionState::Disconnected);

    h.bridge.on_start().await.unwrap();
    h.bridge.on_stop().await;
    h.bridge.on_stop().await;

    assert_eq!(h.bridge.state(), ConnectionState::Disconnected);
    assert_eq!(h.broker.connected_producers(), 0);
    assert_eq!(h.broker.connected_consumers(), 0);
    assert!(!h.bus.has_publisher());
}

#[tokio::test]
async fn restart_after_stop() {
    let h = harness(orders());

    h.bridge.on_start().await.unwrap();
    h.bridge.on_stop().await;
    h.bridge.on_start().await.unwrap();

    assert_eq!(h.broker.subscriptions().len(), 4);
    assert_eq!(h.broker.connected_consumers(), 1);
    assert_eq!(h.bridge.state(), ConnectionState::Connected);

    h.bridge.on_stop().await;
}

#[tokio::test]
async fn dispatch_totals_span_restarts() {
    let mut h = harness(TopicRegistry::new().event::<Foo>());

    h.bridge.on_start().await.unwrap();
    h.broker.deliver("Foo", br#"{"id":"1","amount":"1"}"#.to_vec());
    next_event(&mut h.events).await;
    h.bridge.on_stop().await;
    assert_eq!(h.bridge.dispatch_stats().dispatched, 1);

    h.bridge.on_start().await.unwrap();
    h.broker.deliver("Foo", br#"{"id":"2","amount":"2"}"#.to_vec());
    next_event(&mut h.events).await;
    h.bridge.on_stop().await;
    assert_eq!(h.bridge.dispatch_stats().dispatched, 2);
}

#[tokio::test]
async fn start_recovers_after_lost_connection() {
    let mut h = harness(TopicRegistry::new().event::<Foo>());
    h.bridge.on_start().await.unwrap();

    h.broker.sever_consumers();
    tokio::time::timeout(Duration::from_secs(1), async {
        while h.bridge.state() != ConnectionState::Disconnected {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .expect("connection never marked lost");

    h.bridge.on_start().await.unwrap();

    assert_eq!(h.bridge.state(), ConnectionState::Connected);
    assert_eq!(h.broker.connected_producers(), 1);
    assert_eq!(h.broker.connected_consumers(), 1);
    assert!(h.bus.has_publisher());

    h.broker.deliver("Foo", br#"{"id":"1","amount":"1"}"#.to_vec());
    assert!(next_event(&mut h.events).await.is::<Foo>());

    h.bridge.on_stop().await;
}

#[tokio::test]
async fn consumer_connect_failure_is_surfaced() {
    let h = harness(orders());
    h.broker.fail_connect(Side::Consumer);

    let err = h.bridge.on_start().await.unwrap_err();

    assert!(matches!(
        err,
        BridgeError::Connection(ConnectionError::Consumer(_))
    ));
    assert_eq!(h.broker.connected_producers(), 0);
    assert!(!h.bus.has_publisher());

    h.broker.clear_faults();
    h.bridge.on_start().await.unwrap();
    assert_eq!(h.bridge.state(), ConnectionState::Connected);
    h.bridge.on_stop().await;
}

#[tokio::test]
async fn subscription_failure_leaves_nothing_open() {
    let h = harness(orders());
    h.broker.fail_subscribe("OrderCancelled");

    let err = h.bridge.on_start().await.unwrap_err();

    assert_eq!(
        err.to_string(),
        "failed to subscribe to topic `OrderCancelled`: rejected by broker: subscribe to OrderCancelled refused"
    );
    assert_eq!(h.bridge.state(), ConnectionState::Disconnected);
    assert_eq!(h.broker.connected_producers(), 0);
    assert_eq!(h.broker.connected_consumers(), 0);
}

#[tokio::test]
async fn stop_survives_failing_disconnect() {
    let h = harness(orders());
    h.bridge.on_start().await.unwrap();
    h.broker.fail_disconnect(Side::Producer);

    h.bridge.on_stop().await;

    assert_eq!(h.broker.connected_consumers(), 0);
    assert_eq!(h.bridge.state(), ConnectionState::Disconnected);
}
