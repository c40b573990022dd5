//! Outbound path: application events → broker.

use std::sync::Arc;

use event_bridge::{dispatch_message, PublishError};

use crate::support::{assert_quiet, harness, next_event, orders, OrderCancelled, OrderPlaced};

fn placed(order_id: &str, amount: u64) -> OrderPlaced {
    OrderPlaced {
        order_id: order_id.into(),
        amount,
    }
}

#[tokio::test]
async fn absent_event_sends_nothing() {
    let h = harness(orders());
    h.bridge.on_start().await.unwrap();

    h.bridge.publish(None).await;
    assert_eq!(h.bridge.try_publish(None).await.unwrap(), None);

    assert!(h.broker.messages().is_empty());
    h.bridge.on_stop().await;
}

#[tokio::test]
async fn event_is_sent_once_to_its_type_topic() {
    let h = harness(orders());
    h.bridge.on_start().await.unwrap();
    let event = placed("o-1", 120);

    h.bridge.publish(Some(&event)).await;

    let sent = h.broker.messages();
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0].topic, "OrderPlaced");
    assert_eq!(
        sent[0].payload_str(),
        Some(r#"{"order_id":"o-1","amount":120}"#)
    );

    let rebuilt = dispatch_message(&orders(), &sent[0]).unwrap();
    assert_eq!(rebuilt.downcast_ref::<OrderPlaced>(), Some(&event));

    h.bridge.on_stop().await;
}

#[tokio::test]
async fn bus_publish_flows_through_the_broker_and_back() {
    let mut h = harness(orders());
    h.bridge.on_start().await.unwrap();
    let event = OrderCancelled {
        order_id: "o-2".into(),
        reason: "out of stock".into(),
    };

    h.bus.publish(Arc::new(event.clone())).await;

    assert_eq!(h.broker.messages_for("OrderCancelled").len(), 1);
    let received = next_event(&mut h.events).await;
    assert_eq!(received.downcast_ref::<OrderCancelled>(), Some(&event));
    assert_quiet(&mut h.events).await;

    h.bridge.on_stop().await;
}

#[tokio::test]
async fn send_failures_are_swallowed() {
    let h = harness(orders());
    h.bridge.on_start().await.unwrap();
    h.broker.fail_send();
    let event = placed("o-3", 1);

    h.bridge.publish(Some(&event)).await;
    let err = h.bridge.try_publish(Some(&event)).await.unwrap_err();

    assert!(matches!(err, PublishError::Send { topic: "OrderPlaced", .. }));
    assert!(h.broker.messages().is_empty());
    h.bridge.on_stop().await;
}

#[tokio::test]
async fn stopped_bridge_leaves_bus_local() {
    let mut h = harness(orders());
    h.bridge.on_start().await.unwrap();
    h.bridge.on_stop().await;

    h.bus.publish(Arc::new(placed("o-4", 7))).await;

    assert!(h.broker.messages().is_empty());
    let received = next_event(&mut h.events).await;
    assert_eq!(received.downcast_ref::<OrderPlaced>(), Some(&placed("o-4", 7)));
}
