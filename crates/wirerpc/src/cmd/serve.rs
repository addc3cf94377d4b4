use std::time::Duration;

use tracing::{info, warn};
use wirerpc::codec::{Map, Value};
use wirerpc::peer::{
    FailureError, Method, MethodError, ProviderEvent, Rpc, RpcConfig, RpcListener,
};

use crate::cmd::{parse_endpoint, ServeArgs};
use crate::exit::{peer_error, CliResult, SUCCESS};

pub async fn run(args: ServeArgs) -> CliResult<i32> {
    let endpoint = parse_endpoint(&args.endpoint)?;
    let mut config = RpcConfig::default();
    if let Some(max_payload) = args.max_payload {
        config = config.with_max_payload(max_payload);
    }

    let listener = RpcListener::bind(&endpoint)
        .await
        .map_err(|err| peer_error("bind failed", err))?
        .with_config(config);
    for (name, method) in demo_methods() {
        listener
            .method(name, method)
            .map_err(|err| peer_error("method registration failed", err))?;
    }

    let local = listener
        .local_endpoint()
        .map_err(|err| peer_error("bind failed", err))?;
    info!(endpoint = %local, methods = ?listener.method_names(), "serving");

    loop {
        tokio::select! {
            accepted = listener.accept() => {
                let rpc = match accepted {
                    Ok(rpc) => rpc,
                    Err(err) => {
                        warn!(error = %err, "accept failed");
                        continue;
                    }
                };
                watch(&rpc);
                if args.once {
                    serve_connection(rpc).await;
                    break;
                }
                tokio::spawn(serve_connection(rpc));
            }
            _ = tokio::signal::ctrl_c() => {
                info!("interrupted, shutting down");
                break;
            }
        }
    }

    Ok(SUCCESS)
}

async fn serve_connection(mut rpc: Rpc) {
    rpc.closed().await;
}

fn watch(rpc: &Rpc) {
    let id = rpc.id().to_string();
    rpc.on_event(move |event| match event {
        ProviderEvent::Error { error, .. } => warn!(connection = %id, %error, "protocol error"),
        ProviderEvent::Signal { name, payload, .. } => {
            info!(connection = %id, signal = %name, ?payload, "signal received")
        }
        ProviderEvent::ResponseInvalidId { response, .. } => {
            warn!(connection = %id, ?response, "response for unknown request")
        }
        ProviderEvent::Exit { .. } => info!(connection = %id, "connection closed"),
    });
}

fn invalid_param(index: usize) -> MethodError {
    FailureError::invalid_params().with_data(index).into()
}

async fn delay(params: Vec<Value>) -> Result<Value, MethodError> {
    let ms = params
        .first()
        .and_then(Value::as_u64)
        .ok_or_else(|| invalid_param(0))?;
    tokio::time::sleep(Duration::from_millis(ms)).await;
    Ok(Value::from(ms))
}

/// Methods every served connection answers.
fn demo_methods() -> Vec<(&'static str, Method)> {
    vec![
        (
            "add",
            Method::sync(|_, params| {
                let mut sum = 0.0;
                for (index, param) in params.iter().enumerate() {
                    sum += param.as_f64().ok_or_else(|| invalid_param(index))?;
                }
                if sum.fract() == 0.0 && sum.abs() < i64::MAX as f64 {
                    Ok(Value::from(sum as i64))
                } else {
                    Ok(Value::from(sum))
                }
            }),
        ),
        ("echo", Method::sync(|_, params| Ok(Value::Array(params)))),
        ("delay", Method::new(|_, params| delay(params))),
        (
            "error",
            Method::sync(|ctx, _| Err(ctx.error(-1000, "An error message", None))),
        ),
        (
            "exception",
            Method::sync(|_, _| Err(MethodError::exception("Error", "An exception message"))),
        ),
        (
            "invalidError",
            Method::sync(|_, _| {
                let mut invalid = Map::new();
                invalid.insert("invalid".to_string(), Value::from(true));
                Err(MethodError::raw(invalid))
            }),
        ),
        ("noArgs", Method::sync(|_, _| Ok(Value::from(true)))),
    ]
}
