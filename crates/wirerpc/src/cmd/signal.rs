use wirerpc::codec::Value;
use wirerpc::peer::connect;

use crate::cmd::{parse_endpoint, parse_json, SignalArgs};
use crate::exit::{peer_error, CliResult, SUCCESS};
use crate::output::{print_signal_sent, OutputFormat};

pub async fn run(args: SignalArgs, format: OutputFormat) -> CliResult<i32> {
    let endpoint = parse_endpoint(&args.endpoint)?;
    let payload = match &args.payload {
        Some(json) => parse_json("payload", json)?,
        None => Value::Null,
    };

    let mut rpc = connect(&endpoint)
        .await
        .map_err(|err| peer_error("connect failed", err))?;
    let sent = rpc.signal(&args.name, payload);
    rpc.close().await;
    sent.map_err(|err| peer_error("signal failed", err))?;

    print_signal_sent(&endpoint.to_string(), &args.name, format);
    Ok(SUCCESS)
}
