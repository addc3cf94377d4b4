use std::time::Duration;

use clap::{Args, Subcommand};
use wirerpc::channel::Endpoint;
use wirerpc::codec::Value;

use crate::exit::{channel_error, CliError, CliResult, DATA_INVALID, USAGE};
use crate::output::OutputFormat;

pub mod call;
pub mod serve;
pub mod signal;
pub mod version;

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Serve the built-in demo methods.
    Serve(ServeArgs),
    /// Call a remote method and print its result.
    Call(CallArgs),
    /// Send a one-way signal.
    Signal(SignalArgs),
    /// Show version information.
    Version(VersionArgs),
}

pub async fn run(command: Command, format: OutputFormat) -> CliResult<i32> {
    match command {
        Command::Serve(args) => serve::run(args).await,
        Command::Call(args) => call::run(args, format).await,
        Command::Signal(args) => signal::run(args, format).await,
        Command::Version(args) => version::run(args),
    }
}

#[derive(Args, Debug)]
pub struct ServeArgs {
    /// Endpoint to bind (host:port, tcp://host:port, unix:///path or a socket path).
    pub endpoint: String,
    /// Exit after the first connection closes.
    #[arg(long)]
    pub once: bool,
    /// Largest accepted payload in bytes.
    #[arg(long, value_name = "BYTES")]
    pub max_payload: Option<usize>,
}

#[derive(Args, Debug)]
pub struct CallArgs {
    /// Endpoint to connect to.
    pub endpoint: String,
    /// Method name.
    pub method: String,
    /// Positional parameters; each is parsed as JSON, falling back to a string.
    #[arg(conflicts_with = "params")]
    pub args: Vec<String>,
    /// Parameters as a single JSON document.
    #[arg(long, value_name = "JSON")]
    pub params: Option<String>,
    /// Maximum time to wait for the response (e.g. 5s, 500ms).
    #[arg(long, default_value = "5s")]
    pub timeout: String,
}

#[derive(Args, Debug)]
pub struct SignalArgs {
    /// Endpoint to connect to.
    pub endpoint: String,
    /// Signal name.
    pub name: String,
    /// Payload as JSON.
    #[arg(long, value_name = "JSON")]
    pub payload: Option<String>,
}

#[derive(Args, Debug)]
pub struct VersionArgs {
    /// Show extended build provenance.
    #[arg(long)]
    pub extended: bool,
}

pub(crate) fn parse_endpoint(input: &str) -> CliResult<Endpoint> {
    input
        .parse()
        .map_err(|err| channel_error("invalid endpoint", err))
}

pub(crate) fn parse_json(label: &str, input: &str) -> CliResult<Value> {
    serde_json::from_str::<serde_json::Value>(input)
        .map(Value::from_json)
        .map_err(|err| CliError::new(DATA_INVALID, format!("invalid {label} JSON: {err}")))
}

/// Bare words that are not JSON travel as strings.
pub(crate) fn parse_arg(input: &str) -> Value {
    serde_json::from_str::<serde_json::Value>(input)
        .map(Value::from_json)
        .unwrap_or_else(|_| Value::from(input))
}

pub(crate) fn parse_duration(input: &str) -> CliResult<Duration> {
    let input = input.trim();
    if input.is_empty() {
        return Err(CliError::new(USAGE, "duration must not be empty"));
    }

    let (number, unit) = if let Some(num) = input.strip_suffix("ms") {
        (num, "ms")
    } else if let Some(num) = input.strip_suffix('s') {
        (num, "s")
    } else {
        (input, "s")
    };

    let value: u64 = number
        .trim()
        .parse()
        .map_err(|_| CliError::new(USAGE, format!("invalid duration: {input}")))?;
    if value == 0 {
        return Err(CliError::new(USAGE, "duration must be greater than zero"));
    }

    Ok(match unit {
        "ms" => Duration::from_millis(value),
        _ => Duration::from_secs(value),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn durations_accept_ms_and_seconds() {
        assert_eq!(parse_duration("250ms").unwrap(), Duration::from_millis(250));
        assert_eq!(parse_duration("3s").unwrap(), Duration::from_secs(3));
        assert_eq!(parse_duration("7").unwrap(), Duration::from_secs(7));
    }

    #[test]
    fn durations_reject_zero_and_garbage() {
        assert_eq!(parse_duration("0s").unwrap_err().code, USAGE);
        assert_eq!(parse_duration("").unwrap_err().code, USAGE);
        assert_eq!(parse_duration("soon").unwrap_err().code, USAGE);
    }

    #[test]
    fn args_fall_back_to_strings() {
        assert_eq!(parse_arg("12"), Value::from(12));
        assert_eq!(parse_arg("true"), Value::from(true));
        assert_eq!(parse_arg("hello"), Value::from("hello"));
        assert_eq!(parse_arg("\"12\""), Value::from("12"));
    }

    #[test]
    fn invalid_json_is_data_error() {
        assert_eq!(parse_json("params", "{").unwrap_err().code, DATA_INVALID);
    }

    #[test]
    fn endpoints_parse_or_fail_as_usage() {
        assert!(matches!(
            parse_endpoint("127.0.0.1:9000").unwrap(),
            Endpoint::Tcp(_)
        ));
        assert!(matches!(
            parse_endpoint("/tmp/wirerpc.sock").unwrap(),
            Endpoint::Unix(_)
        ));
        assert_eq!(parse_endpoint("nonsense").unwrap_err().code, USAGE);
    }
}
