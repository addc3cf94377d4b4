use std::io::IsTerminal;

use clap::ValueEnum;
use comfy_table::{presets::UTF8_FULL, ContentArrangement, Table};
use serde::Serialize;

#[derive(Clone, Debug, Copy, ValueEnum)]
pub enum OutputFormat {
    Json,
    Table,
    Pretty,
    Raw,
}

impl OutputFormat {
    pub fn default_for_stdout() -> Self {
        if std::io::stdout().is_terminal() {
            Self::Table
        } else {
            Self::Json
        }
    }
}

#[derive(Serialize)]
struct CallOutput<'a> {
    endpoint: &'a str,
    method: &'a str,
    elapsed_ms: u128,
    result: &'a serde_json::Value,
}

/// Print the result of a successful call.
pub fn print_result(
    endpoint: &str,
    method: &str,
    elapsed_ms: u128,
    result: &serde_json::Value,
    format: OutputFormat,
) {
    match format {
        OutputFormat::Json => {
            let out = CallOutput {
                endpoint,
                method,
                elapsed_ms,
                result,
            };
            println!(
                "{}",
                serde_json::to_string(&out).unwrap_or_else(|_| "{}".to_string())
            );
        }
        OutputFormat::Table => {
            let mut table = Table::new();
            table
                .load_preset(UTF8_FULL)
                .set_content_arrangement(ContentArrangement::Dynamic)
                .set_header(vec!["ENDPOINT", "METHOD", "ELAPSED", "RESULT"])
                .add_row(vec![
                    endpoint.to_string(),
                    method.to_string(),
                    format!("{elapsed_ms}ms"),
                    result.to_string(),
                ]);
            println!("{table}");
        }
        OutputFormat::Pretty => {
            println!(
                "{}",
                serde_json::to_string_pretty(result).unwrap_or_else(|_| result.to_string())
            );
        }
        OutputFormat::Raw => match result {
            serde_json::Value::String(text) => println!("{text}"),
            other => println!("{other}"),
        },
    }
}

#[derive(Serialize)]
struct SignalOutput<'a> {
    endpoint: &'a str,
    signal: &'a str,
    sent: bool,
}

/// Print the acknowledgement of a sent signal.
pub fn print_signal_sent(endpoint: &str, signal: &str, format: OutputFormat) {
    match format {
        OutputFormat::Json => {
            let out = SignalOutput {
                endpoint,
                signal,
                sent: true,
            };
            println!(
                "{}",
                serde_json::to_string(&out).unwrap_or_else(|_| "{}".to_string())
            );
        }
        OutputFormat::Table => {
            let mut table = Table::new();
            table
                .load_preset(UTF8_FULL)
                .set_header(vec!["ENDPOINT", "SIGNAL", "SENT"])
                .add_row(vec![endpoint, signal, "yes"]);
            println!("{table}");
        }
        OutputFormat::Pretty | OutputFormat::Raw => println!("sent {signal} to {endpoint}"),
    }
}
