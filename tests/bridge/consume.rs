//! Inbound path: broker messages → local event stream.

use std::sync::Arc;
use std::time::Duration;

use event_bridge::transport::{BrokerClient, Consumer, InMemoryBroker};
use event_bridge::{
    BridgeOptions, ClientConfig, ConsumerConfig, DispatchConfig, DispatchExit, InboundDispatcher,
    OnMessageError, SharedEvent, SinkHandle, TopicRegistry,
};
use tokio::sync::mpsc;

use crate::support::{
    assert_quiet, harness, harness_with, next_event, orders, Foo, OrderCancelled, OrderPlaced,
};

#[tokio::test]
async fn foo_is_rebuilt_in_field_order() {
    let mut h = harness(TopicRegistry::new().event::<Foo>());
    h.bridge.on_start().await.unwrap();

    h.broker.deliver("Foo", br#"{"id":"1","amount":"42"}"#.to_vec());

    let event = next_event(&mut h.events).await;
    assert_eq!(
        event.downcast_ref::<Foo>(),
        Some(&Foo {
            id: "1".into(),
            amount: "42".into()
        })
    );
    assert_quiet(&mut h.events).await;

    h.bridge.on_stop().await;
    assert_eq!(h.bridge.dispatch_stats().dispatched, 1);
}

#[tokio::test]
async fn fields_are_filled_by_wire_position() {
    let mut h = harness(TopicRegistry::new().event::<Foo>());
    h.bridge.on_start().await.unwrap();

    h.broker
        .deliver("Foo", br#"{"identifier":"7","total":"99"}"#.to_vec());

    let event = next_event(&mut h.events).await;
    let foo = event.downcast_ref::<Foo>().unwrap();
    assert_eq!(foo.id, "7");
    assert_eq!(foo.amount, "99");

    h.bridge.on_stop().await;
}

#[tokio::test]
async fn reordered_keys_keep_wire_order() {
    let mut h = harness(TopicRegistry::new().event::<Foo>());
    h.bridge.on_start().await.unwrap();

    h.broker.deliver("Foo", br#"{"amount":"42","id":"1"}"#.to_vec());
    h.broker.deliver("Foo", br#"{"amount":"42","ident":"1"}"#.to_vec());

    for _ in 0..2 {
        let event = next_event(&mut h.events).await;
        assert_eq!(
            event.downcast_ref::<Foo>(),
            Some(&Foo {
                id: "42".into(),
                amount: "1".into()
            })
        );
    }

    h.bridge.on_stop().await;
    assert_eq!(h.bridge.dispatch_stats().failed, 0);
}

#[tokio::test]
async fn delivery_order_is_preserved() {
    let mut h = harness(orders());
    h.bridge.on_start().await.unwrap();

    for amount in 0..5u64 {
        let payload = format!(r#"{{"order_id":"o-{}","amount":{}}}"#, amount, amount);
        h.broker.deliver("OrderPlaced", payload.into_bytes());
    }

    for expected in 0..5u64 {
        let event = next_event(&mut h.events).await;
        assert_eq!(event.downcast_ref::<OrderPlaced>().unwrap().amount, expected);
    }

    h.bridge.on_stop().await;
}

#[tokio::test]
async fn bad_message_does_not_stop_consumption() {
    let mut h = harness(orders());
    h.bridge.on_start().await.unwrap();

    h.broker.deliver("OrderCancelled", b"{not json".to_vec());
    h.broker.deliver("OrderCancelled", br#"{"order_id":"o-1"}"#.to_vec());
    h.broker.deliver(
        "OrderCancelled",
        br#"{"order_id":"o-1","reason":"changed mind"}"#.to_vec(),
    );

    let event = next_event(&mut h.events).await;
    assert_eq!(
        event.downcast_ref::<OrderCancelled>().unwrap().reason,
        "changed mind"
    );

    let stats = h.bridge.dispatch_stats();
    assert_eq!(stats.failed, 2);
    assert_eq!(stats.dispatched, 1);
    h.bridge.on_stop().await;
}

#[tokio::test]
async fn halt_policy_ends_consumption() {
    let options = BridgeOptions::from_json(r#"{ "dispatch": { "on_error": "halt" } }"#).unwrap();
    let mut h = harness_with(orders(), options);
    h.bridge.on_start().await.unwrap();

    h.broker.deliver("OrderPlaced", b"[]".to_vec());
    h.broker
        .deliver("OrderPlaced", br#"{"order_id":"o-1","amount":3}"#.to_vec());

    assert_quiet(&mut h.events).await;
    let stats = h.bridge.dispatch_stats();
    assert_eq!(stats.failed, 1);
    assert_eq!(stats.dispatched, 0);

    h.bridge.on_stop().await;
}

#[tokio::test]
async fn unrouted_topics_are_reported_and_skipped() {
    let broker = InMemoryBroker::new();
    let consumer = Arc::new(
        broker
            .connect_consumer(&ClientConfig::default(), &ConsumerConfig::default())
            .await
            .unwrap(),
    );
    // A topic nobody bound, e.g. from a wildcard subscription
    consumer.subscribe("OrderShipped", false).await.unwrap();

    let (tx, mut rx) = mpsc::unbounded_channel::<SharedEvent>();
    let dispatcher = InboundDispatcher::new(
        Arc::new(TopicRegistry::new().event::<OrderPlaced>()),
        SinkHandle::new(Arc::new(tx)),
        DispatchConfig {
            on_error: OnMessageError::Halt,
        },
    );
    let handle = dispatcher
        .start_consuming(consumer.clone(), false)
        .await
        .unwrap()
        .unwrap();

    broker.deliver("OrderShipped", br#"{"order_id":"o-1"}"#.to_vec());
    broker.deliver("OrderPlaced", br#"{"order_id":"o-1","amount":5}"#.to_vec());

    let event = tokio::time::timeout(Duration::from_secs(1), rx.recv())
        .await
        .unwrap()
        .unwrap();
    assert!(event.is::<OrderPlaced>());

    consumer.disconnect().await.unwrap();
    let (exit, stats) = handle.join().await;
    assert_eq!(exit, DispatchExit::Closed);
    assert_eq!(stats.unhandled, 1);
    assert_eq!(stats.dispatched, 1);
}

#[tokio::test]
async fn redirect_rebinds_without_restart() {
    let mut h = harness(orders());
    h.bridge.on_start().await.unwrap();

    h.broker
        .deliver("OrderPlaced", br#"{"order_id":"o-1","amount":1}"#.to_vec());
    next_event(&mut h.events).await;

    let (tx, mut rx) = mpsc::unbounded_channel::<SharedEvent>();
    h.bridge.redirect_events_to(Arc::new(tx));
    h.broker
        .deliver("OrderPlaced", br#"{"order_id":"o-2","amount":2}"#.to_vec());

    let event = tokio::time::timeout(Duration::from_secs(1), rx.recv())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(event.downcast_ref::<OrderPlaced>().unwrap().order_id, "o-2");
    assert_quiet(&mut h.events).await;
    assert_eq!(h.broker.subscriptions().len(), 2);

    h.bridge.on_stop().await;
}
