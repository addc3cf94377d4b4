#![allow(dead_code)]

use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use serde_json::json;
use wirerpc_codec::{Framer, JsonFramer, Value};
use wirerpc_peer::{
    Context, FailureError, Message, Method, MethodError, Provider, ProviderConfig, ProviderEvent,
};

/// Application type carried as a tagged custom value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Counter {
    pub count: i64,
}

impl Counter {
    pub fn new(count: i64) -> Self {
        Self { count }
    }

    pub fn increment_by(&mut self, value: i64) {
        self.count += value;
    }
}

pub fn framer() -> Arc<dyn Framer> {
    let framer = JsonFramer::new();
    framer.register_type::<Counter>("Counter");
    Arc::new(framer)
}

fn int(params: &[Value], index: usize) -> Result<i64, MethodError> {
    params
        .get(index)
        .and_then(Value::as_i64)
        .ok_or_else(|| FailureError::invalid_params().with_data(index).into())
}

async fn add_slow(params: Vec<Value>) -> Result<Value, MethodError> {
    let sum = int(&params, 0)? + int(&params, 1)?;
    if params.get(2).and_then(Value::as_bool).unwrap_or(false) {
        tokio::time::sleep(Duration::from_millis(15)).await;
    }
    Ok(Value::from(sum))
}

async fn delay(params: Vec<Value>) -> Result<Value, MethodError> {
    let ms = int(&params, 0)?;
    tokio::time::sleep(Duration::from_millis(ms.max(0) as u64)).await;
    Ok(Value::from(ms))
}

/// The shared test method table.
pub fn methods() -> Vec<(&'static str, Method)> {
    vec![
        (
            "add",
            Method::sync(|_, params| Ok(Value::from(int(&params, 0)? + int(&params, 1)?))),
        ),
        ("addSlow", Method::new(|_, params| add_slow(params))),
        (
            "error",
            Method::sync(|ctx, _| Err(ctx.error(-1000, "An error message", None))),
        ),
        (
            "exception",
            Method::sync(|_, _| Err(MethodError::exception("Error", "An exception message"))),
        ),
        (
            "incrementCounterBy",
            Method::sync(|ctx, params| {
                let Some(counter) = params.first().and_then(Value::as_custom::<Counter>) else {
                    return Err(ctx.error(-1000, "Argument not an instance of Counter", None));
                };
                let mut counter = counter.clone();
                counter.increment_by(int(&params, 1)?);
                Ok(Value::custom(counter))
            }),
        ),
        ("empty", Method::sync(|_, _| Ok(Value::Null))),
        ("noArgs", Method::sync(|_, _| Ok(Value::from(true)))),
        (
            "invalidError",
            Method::sync(|_, _| Err(MethodError::raw(json!({"invalid": true})))),
        ),
        ("delay", Method::new(|_, params| delay(params))),
    ]
}

/// Two providers dispatching straight into each other.
pub fn provider_pair(timeout: Duration) -> (Provider, Provider) {
    let config = ProviderConfig::default().with_default_timeout(timeout);
    let server = Provider::new(config.clone());
    let client = Provider::new(config);

    let to_client = client.clone();
    server.set_dispatcher(move |message: Message, _: Option<&Context>| {
        to_client.handle(message, None);
        Ok(())
    });
    let to_server = server.clone();
    client.set_dispatcher(move |message: Message, _: Option<&Context>| {
        to_server.handle(message, None);
        Ok(())
    });
    (server, client)
}

pub type Recorded = Arc<Mutex<Vec<ProviderEvent>>>;

pub fn record_events(provider: &Provider) -> Recorded {
    let events = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&events);
    provider.on_event(move |event| sink.lock().push(event.clone()));
    events
}

pub fn errors(events: &Recorded) -> usize {
    events
        .lock()
        .iter()
        .filter(|event| matches!(event, ProviderEvent::Error { .. }))
        .count()
}
