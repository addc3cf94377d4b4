use std::time::Instant;

use tracing::debug;
use wirerpc::codec::Value;
use wirerpc::peer::{connect_with_config, RpcConfig};

use crate::cmd::{parse_arg, parse_duration, parse_endpoint, parse_json, CallArgs};
use crate::exit::{encode_error, peer_error, request_error, CliResult, SUCCESS};
use crate::output::{print_result, OutputFormat};

pub async fn run(args: CallArgs, format: OutputFormat) -> CliResult<i32> {
    let endpoint = parse_endpoint(&args.endpoint)?;
    let timeout = parse_duration(&args.timeout)?;
    let params = match &args.params {
        Some(json) => parse_json("params", json)?,
        None if args.args.is_empty() => Value::Null,
        None => Value::Array(args.args.iter().map(|arg| parse_arg(arg)).collect()),
    };

    let config = RpcConfig::default().with_timeout(timeout);
    let mut rpc = connect_with_config(&endpoint, config, None)
        .await
        .map_err(|err| peer_error("connect failed", err))?;

    let started = Instant::now();
    let outcome = rpc.request(&args.method, params, ()).await;
    let elapsed = started.elapsed();
    debug!(method = %args.method, ?elapsed, ok = outcome.is_ok(), "call finished");
    rpc.close().await;

    let result = outcome.map_err(|err| request_error("call failed", err))?;
    let json = result
        .to_json()
        .map_err(|err| encode_error("unprintable result", err))?;
    print_result(
        &endpoint.to_string(),
        &args.method,
        elapsed.as_millis(),
        &json,
        format,
    );
    Ok(SUCCESS)
}
