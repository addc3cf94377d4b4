mod common;

use std::time::Duration;

use bytes::BytesMut;
use common::{framer, record_events, Counter};
use futures_util::StreamExt;
use serde_json::json;
use tokio::io::AsyncWriteExt;
use tokio::sync::mpsc;
use tokio_util::codec::FramedRead;
use wirerpc_channel::pipe;
use wirerpc_codec::{EncodeError, Value};
use wirerpc_frame::{encode_frame, LengthPrefixCodec};
use wirerpc_peer::{FailureError, Method, PeerError, ProviderEvent, RequestError, Rpc, RpcConfig};

fn config() -> RpcConfig {
    RpcConfig::default().with_timeout(Duration::from_secs(2))
}

fn rpc_pair() -> (Rpc, Rpc) {
    let (a, b) = pipe();
    let server = Rpc::with_framer(a, config().with_id("server"), framer());
    let client = Rpc::with_framer(b, config().with_id("client"), framer());
    server.methods(common::methods()).unwrap();
    (server, client)
}

#[tokio::test]
async fn should_add() {
    let (_server, client) = rpc_pair();
    let result = client.request("add", vec![1, 2], ()).await.unwrap();
    assert_eq!(result, Value::from(3));
}

#[tokio::test]
async fn should_add_slow() {
    let (_server, client) = rpc_pair();
    let params = vec![Value::from(1), Value::from(2), Value::from(true)];
    let result = client.request("addSlow", params, ()).await.unwrap();
    assert_eq!(result, Value::from(3));
}

#[tokio::test]
async fn should_increment_counter_by() {
    let (_server, client) = rpc_pair();
    let counter = Counter::new(1);
    let params = vec![Value::custom(counter.clone()), Value::from(2)];

    let result = client
        .request("incrementCounterBy", params, ())
        .await
        .unwrap();
    assert_eq!(result.as_custom::<Counter>(), Some(&Counter::new(3)));
    assert_eq!(counter.count, 1);
}

#[tokio::test]
async fn plain_object_is_not_a_counter() {
    let (_server, client) = rpc_pair();
    let params = vec![Value::from(json!({"count": 1})), Value::from(2)];

    let err = client
        .request("incrementCounterBy", params, ())
        .await
        .unwrap_err();
    let failure = err.failure().unwrap();
    assert_eq!(failure.code, -1000);
    assert_eq!(failure.message, "Argument not an instance of Counter");
}

#[tokio::test]
async fn unregistered_custom_type_fails_to_send() {
    #[derive(Debug, PartialEq)]
    struct Opaque;

    let (_server, client) = rpc_pair();
    let err = client
        .request("noArgs", vec![Value::custom(Opaque)], ())
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        RequestError::Dispatch {
            source: PeerError::Encode(EncodeError::UnregisteredType(_)),
            ..
        }
    ));
    assert_eq!(client.pending_requests(), 0);
}

#[tokio::test]
async fn unencodable_result_becomes_internal_error() {
    #[derive(Debug, PartialEq)]
    struct Opaque;

    let (server, client) = rpc_pair();
    let server_events = record_events(&server);
    server
        .method("opaque", Method::sync(|_, _| Ok(Value::custom(Opaque))))
        .unwrap();

    let err = client.request("opaque", Value::Null, ()).await.unwrap_err();
    let failure = err.failure().unwrap();
    assert!(failure.is_internal());
    let data = failure.data.as_ref().and_then(Value::as_str).unwrap();
    assert!(data.contains("no codec registered"));
    assert!(matches!(
        server_events.lock().first(),
        Some(ProviderEvent::Error { error, .. }) if error.is_internal()
    ));
}

#[tokio::test]
async fn oversized_result_becomes_internal_error() {
    let (a, b) = pipe();
    let server = Rpc::new(a, config().with_max_payload(96));
    let client = Rpc::new(b, config());
    server
        .method("big", Method::sync(|_, _| Ok(Value::from("x".repeat(200)))))
        .unwrap();

    let err = client.request("big", Value::Null, ()).await.unwrap_err();
    assert!(err.failure().is_some_and(FailureError::is_internal));
    assert_eq!(client.pending_requests(), 0);
}

#[tokio::test]
async fn should_throw_error() {
    let (_server, client) = rpc_pair();
    let err = client.request("error", Value::Null, ()).await.unwrap_err();
    let failure = err.failure().unwrap();
    assert_eq!(failure.message, "An error message");
    assert_eq!(failure.code, -1000);
    assert!(err.to_string().contains("An error message"));
}

#[tokio::test]
async fn empty_and_no_args() {
    let (_server, client) = rpc_pair();
    assert_eq!(client.request("empty", Value::Null, ()).await.unwrap(), Value::Null);
    assert_eq!(
        client.request("noArgs", Value::Null, ()).await.unwrap(),
        Value::from(true)
    );
}

#[tokio::test]
async fn signals_cross_the_channel() {
    let (server, client) = rpc_pair();
    let (tx, mut rx) = mpsc::unbounded_channel();
    server.on_signal("tick", move |payload, context| {
        let connection = context.and_then(|c| c.connection.clone());
        let _ = tx.send((payload.clone(), connection));
    });

    client.signal("tick", Value::custom(Counter::new(7))).unwrap();

    let (payload, connection) = rx.recv().await.unwrap();
    assert_eq!(payload.as_custom::<Counter>(), Some(&Counter::new(7)));
    assert_eq!(connection.as_deref(), Some("server"));
}

#[tokio::test]
async fn close_propagates_exit_to_the_remote() {
    let (mut server, mut client) = rpc_pair();
    let server_events = record_events(&server);

    client.close().await;
    server.closed().await;

    let names: Vec<&str> = server_events.lock().iter().map(ProviderEvent::name).collect();
    assert_eq!(names, vec!["exit"]);
    assert!(client.request("add", vec![1, 2], ()).await.is_err());
}

#[tokio::test]
async fn garbage_payload_gets_a_parse_error_with_null_id() {
    let (a, b) = pipe();
    let server = Rpc::new(a, RpcConfig::default());
    let server_events = record_events(&server);
    let (read, mut write) = tokio::io::split(b);

    let mut frame = BytesMut::new();
    encode_frame(b"abc", &mut frame).unwrap();
    write.write_all(&frame).await.unwrap();

    let mut replies = FramedRead::new(read, LengthPrefixCodec::new());
    let reply = replies.next().await.unwrap().unwrap();
    let reply: serde_json::Value = serde_json::from_slice(&reply).unwrap();
    assert_eq!(reply["error"]["code"], json!(-32700));
    assert_eq!(reply["id"], json!(null));
    assert!(matches!(
        server_events.lock().first(),
        Some(ProviderEvent::Error { error, .. }) if error.is_parse_error()
    ));
}
