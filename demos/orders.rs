//! Two services sharing one broker: `orders` raises events, `billing`
//! reacts to them.
//!
//! Run with `RUST_LOG=event_bridge=debug cargo run --example orders` to see
//! the bridge's own logging.

use std::sync::Arc;
use std::time::Duration;

use event_bridge::transport::InMemoryBroker;
use event_bridge::{BridgeOptions, DomainEvent, EventBridge, LocalEventBus, TopicRegistry};
use serde::Serialize;
use tokio::sync::broadcast::error::RecvError;
use tracing_subscriber::EnvFilter;

#[derive(Debug, Clone, Serialize, DomainEvent)]
struct OrderPlaced {
    order_id: String,
    customer: String,
    amount: u64,
}

#[derive(Debug, Clone, Serialize, DomainEvent)]
struct OrderCancelled {
    order_id: String,
    reason: String,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let broker = InMemoryBroker::new();

    // orders only publishes, so it binds nothing
    let orders_bus = Arc::new(LocalEventBus::new());
    let orders = EventBridge::builder(broker.clone(), orders_bus.clone())
        .options(BridgeOptions::from_json(r#"{ "client": { "client_id": "orders" } }"#)?)
        .build();

    let billing_bus = Arc::new(LocalEventBus::new());
    let billing = EventBridge::builder(broker.clone(), billing_bus.clone())
        .options(BridgeOptions::from_json(
            r#"{ "client": { "client_id": "billing" }, "consumer": { "group_id": "billing" } }"#,
        )?)
        .events(
            TopicRegistry::new()
                .event::<OrderPlaced>()
                .event::<OrderCancelled>(),
        )
        .build();

    let mut inbox = billing_bus.subscribe();
    let handler = tokio::spawn(async move {
        loop {
            match inbox.recv().await {
                Ok(event) => {
                    if let Some(placed) = event.downcast_ref::<OrderPlaced>() {
                        println!(
                            "billing: invoice {} for {} ({} cents)",
                            placed.order_id, placed.customer, placed.amount
                        );
                    } else if let Some(cancelled) = event.downcast_ref::<OrderCancelled>() {
                        println!(
                            "billing: void {} ({})",
                            cancelled.order_id, cancelled.reason
                        );
                    }
                }
                Err(RecvError::Lagged(missed)) => println!("billing: missed {} events", missed),
                Err(RecvError::Closed) => break,
            }
        }
    });

    orders.on_start().await?;
    billing.on_start().await?;

    orders_bus
        .publish(Arc::new(OrderPlaced {
            order_id: "o-1".into(),
            customer: "ada".into(),
            amount: 4200,
        }))
        .await;
    orders_bus
        .publish(Arc::new(OrderPlaced {
            order_id: "o-2".into(),
            customer: "grace".into(),
            amount: 1999,
        }))
        .await;
    orders_bus
        .publish(Arc::new(OrderCancelled {
            order_id: "o-1".into(),
            reason: "customer request".into(),
        }))
        .await;

    tokio::time::sleep(Duration::from_millis(100)).await;

    orders.on_stop().await;
    billing.on_stop().await;
    println!(
        "broker carried {} messages; billing stats: {:?}",
        broker.messages().len(),
        billing.dispatch_stats()
    );

    drop(billing);
    drop(billing_bus);
    handler.await?;
    Ok(())
}
