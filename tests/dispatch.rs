//! End-to-end handling of inbound records through [`Runtime::dispatch`].

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::json;
use statefold::{
    Changeset, DispatchError, Encoded, Entity, EntityState, Message, MemoryStore, MessageKind,
    Payload, Runtime, RuntimeConfig, SourceFormat, TargetFormat, encode, publish_request,
    to_store_item,
};

#[derive(Debug, Serialize, Deserialize)]
struct PlaceOrder {
    customer: String,
    total: u64,
}

#[derive(Debug, Serialize, Deserialize)]
struct Order {
    customer: String,
    total: u64,
}

impl EntityState for Order {
    const TYPE_NAME: &'static str = "Order";
}

#[derive(Debug, thiserror::Error)]
enum HandlerError {
    #[error("bad command payload: {0}")]
    Payload(#[from] serde_json::Error),
    #[error("order total must be positive")]
    EmptyOrder,
}

fn runtime() -> (Runtime, MemoryStore) {
    let config = RuntimeConfig::new("shop", "orders").with_handler_name("place-order");
    let store = MemoryStore::for_config(&config);
    (Runtime::new(Arc::new(store.clone()), config), store)
}

fn place_order(customer: &str, total: u64) -> Vec<u8> {
    let command = Message::builder(MessageKind::Command, "/orders/api", "cmd-1", "order.place.v1")
        .author("user-7")
        .transaction("tx-42")
        .data(
            Payload::json(&PlaceOrder {
                customer: customer.to_string(),
                total,
            })
            .expect("serialize should succeed"),
        )
        .build();
    publish_request(&command).notification().to_string().into_bytes()
}

/// Creates the order and asks billing for an invoice keyed by the trigger.
async fn handle(msg: Message, ctx: statefold::ExecutionContext) -> Result<Changeset, HandlerError> {
    let cmd: PlaceOrder = msg.data().decode()?;
    if cmd.total == 0 {
        return Err(HandlerError::EmptyOrder);
    }
    let order = Entity::create_state(
        &ctx,
        &Order {
            customer: cmd.customer.clone(),
            total: cmd.total,
        },
    )?
    .with_event("placed", 1, None)
    .with_index("by-customer", cmd.customer)
    .execute();
    let invoice = Message::command(
        &ctx,
        "/billing/invoices",
        msg.reference(),
        "invoice.issue.v1",
        Payload::from_value(&json!({"order": order.id(), "amount": cmd.total})),
    );

    let mut changeset = Changeset::new();
    changeset.add_entity(order).add_command(invoice);
    Ok(changeset)
}

#[tokio::test]
async fn command_creates_entity_and_follow_up_command() {
    let (runtime, store) = runtime();
    let changeset = runtime
        .dispatch(&place_order("c-1", 30), SourceFormat::PubSub, handle)
        .await
        .expect("dispatch should succeed");

    let order = &changeset.entities()[0];
    assert_eq!(order.created_by(), "user-7");
    assert_eq!(order.last_transaction(), "tx-42");
    assert_eq!(order.last_event_trigger(), Some("/orders/api/cmd-1"));

    let event = order.last_event();
    assert_eq!(event.message_type(), "order.placed.v1");
    assert_eq!(event.trigger(), Some("/orders/api/cmd-1"));
    assert_eq!(event.transaction(), "tx-42");

    let stored = runtime
        .reader()
        .find_one("Order", order.id())
        .await
        .expect("read should succeed")
        .expect("order should be stored");
    assert_eq!(&stored, order);

    let commands = store.scan(&runtime.config().command_store()).await;
    assert_eq!(commands.len(), 1);
    assert_eq!(commands[0]["author"].as_str(), Some("user-7"));
    assert_eq!(commands[0]["trigger"].as_str(), Some("/orders/api/cmd-1"));
}

#[tokio::test]
async fn redelivery_is_rejected_without_side_effects() {
    let (runtime, store) = runtime();
    let raw = place_order("c-1", 30);
    runtime
        .dispatch(&raw, SourceFormat::PubSub, handle)
        .await
        .expect("first delivery should succeed");

    let err = runtime
        .dispatch(&raw, SourceFormat::PubSub, handle)
        .await
        .expect_err("redelivery must conflict");
    match err {
        DispatchError::Write(write) => assert!(write.is_conflict()),
        other => panic!("expected a write conflict, got {other}"),
    }
    // The second order entity was rolled back with the duplicate command.
    assert_eq!(store.scan(&runtime.config().state_store()).await.len(), 1);
    assert_eq!(store.scan(&runtime.config().command_store()).await.len(), 1);
}

#[tokio::test]
async fn handler_error_writes_nothing() {
    let (runtime, store) = runtime();
    let err = runtime
        .dispatch(&place_order("c-1", 0), SourceFormat::PubSub, handle)
        .await
        .expect_err("empty order must be rejected");
    assert!(matches!(err, DispatchError::Handler(HandlerError::EmptyOrder)));
    assert!(store.scan(&runtime.config().state_store()).await.is_empty());
}

#[tokio::test]
async fn queue_wrapped_notification_dispatches() {
    let (runtime, _) = runtime();
    let body = String::from_utf8(place_order("c-9", 5)).expect("utf-8");
    let raw = json!({"messageId": "q-1", "receiptHandle": "r", "body": body}).to_string();
    let changeset = runtime
        .dispatch(raw.as_bytes(), SourceFormat::Queue, handle)
        .await
        .expect("dispatch should succeed");
    assert_eq!(changeset.entities().len(), 1);
}

#[tokio::test]
async fn change_stream_of_written_entity_yields_its_event() {
    let (runtime, _) = runtime();
    let changeset = runtime
        .dispatch(&place_order("c-1", 30), SourceFormat::PubSub, handle)
        .await
        .expect("dispatch should succeed");
    let order = &changeset.entities()[0];

    let mut image = to_store_item(order).expect("encode should succeed");
    image.retain(|_, value| !value.is_null());
    let record = json!({
        "eventID": "1",
        "eventName": "INSERT",
        "dynamodb": {"Keys": {"id": {"S": order.id()}}, "NewImage": image}
    })
    .to_string();

    let seen = runtime
        .dispatch(record.as_bytes(), SourceFormat::ChangeStream, |event, ctx| async move {
            let expected = order.last_event();
            assert_eq!(event.message_type(), expected.message_type());
            assert_eq!(event.source(), expected.source());
            assert_eq!(event.id(), expected.id());
            assert_eq!(event.time(), expected.time());
            assert_eq!(event.author(), expected.author());
            assert_eq!(event.trigger(), expected.trigger());
            assert_eq!(event.transaction(), expected.transaction());
            // Without explicit event data the stream publishes the public image.
            let data = event.data().to_value().expect("event data is JSON");
            assert_eq!(data["customer"], json!("c-1"));
            assert_eq!(data["version"], json!(1));
            assert_eq!(ctx.trigger(), Some(event.reference().as_str()));
            Ok::<_, HandlerError>(Changeset::new())
        })
        .await
        .expect("dispatch should succeed");
    assert!(seen.is_empty());
}

#[tokio::test]
async fn stored_command_replays_from_change_stream() {
    let (runtime, store) = runtime();
    runtime
        .dispatch(&place_order("c-1", 30), SourceFormat::PubSub, handle)
        .await
        .expect("dispatch should succeed");
    let stored = store.scan(&runtime.config().command_store()).await.remove(0);
    let record = json!({"eventName": "INSERT", "dynamodb": {"NewImage": stored}}).to_string();

    runtime
        .dispatch(record.as_bytes(), SourceFormat::ChangeStream, |command, _| async move {
            assert_eq!(command.kind(), MessageKind::Command);
            assert_eq!(command.source(), "/billing/invoices");
            assert_eq!(command.id(), "/orders/api/cmd-1");
            let Encoded::Item(again) = encode(&command, TargetFormat::StoreItem)
                .expect("encode should succeed")
            else {
                panic!("expected an item");
            };
            assert_eq!(again, stored);
            Ok::<_, HandlerError>(Changeset::new())
        })
        .await
        .expect("dispatch should succeed");
}
