//! Command-line front end for the built-in workers.
//!
//! ```text
//! threadlet [--config FILE] ping [TEXT]
//! threadlet [--config FILE] kv put KEY JSON
//! threadlet [--config FILE] kv append KEY JSON
//! threadlet [--config FILE] kv get KEY
//! threadlet [--config FILE] kv has KEY
//! threadlet [--config FILE] kv find GLOB
//! threadlet [--config FILE] kv clear
//! ```
//!
//! Every command launches its worker in a `with_worker` scope, so the worker is
//! closed and joined before the process exits.
//!
//! # Exit Codes
//!
//! - `0`: success
//! - `1`: the operation failed (message on stderr)
//! - `2`: usage error

use serde_json::Value;
use std::path::PathBuf;
use std::process::ExitCode;
use threadlet::builtin::{builtin_registry, echo, kv, KvRequest, KvResponse};
use threadlet::observability::init_tracing;
use threadlet::storage::Record;
use threadlet::{with_worker, Config};

const USAGE: &str = "usage: threadlet [--config FILE] <command>

commands:
  ping [TEXT]           round-trip TEXT (default \"ping\") through the echo worker
  kv put KEY JSON       store JSON as the only record of KEY
  kv append KEY JSON    append JSON to the log of KEY
  kv get KEY            print the records of KEY
  kv has KEY            print whether KEY exists
  kv find GLOB          print the records of every key matching GLOB
  kv clear              erase the store";

/// A parsed command line.
#[derive(Debug, PartialEq)]
struct Invocation {
    config: Option<PathBuf>,
    command: Command,
}

#[derive(Debug, PartialEq)]
enum Command {
    Help,
    Ping(String),
    Kv(KvRequest),
}

fn main() -> ExitCode {
    let args: Vec<String> = std::env::args().skip(1).collect();
    let invocation = match parse_args(&args) {
        Ok(invocation) => invocation,
        Err(message) => {
            eprintln!("threadlet: {message}\n\n{USAGE}");
            return ExitCode::from(2);
        }
    };

    if invocation.command == Command::Help {
        println!("{USAGE}");
        return ExitCode::SUCCESS;
    }

    let config = match invocation.config.as_deref().map_or_else(|| Ok(Config::default()), Config::load) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("threadlet: {e}");
            return ExitCode::FAILURE;
        }
    };
    init_tracing(&config);

    let runtime = match tokio::runtime::Builder::new_multi_thread().enable_all().build() {
        Ok(runtime) => runtime,
        Err(e) => {
            eprintln!("threadlet: failed to start runtime: {e}");
            return ExitCode::FAILURE;
        }
    };

    match runtime.block_on(run(&config, invocation.command)) {
        Ok(output) => {
            if !output.is_empty() {
                println!("{output}");
            }
            ExitCode::SUCCESS
        }
        Err(e) => {
            tracing::debug!(error = %e, "command failed");
            eprintln!("threadlet: {e}");
            ExitCode::FAILURE
        }
    }
}

fn parse_args(args: &[String]) -> Result<Invocation, String> {
    let mut config = None;
    let mut rest = args;

    while let Some(first) = rest.first() {
        match first.as_str() {
            "--config" | "-c" => {
                let path = rest.get(1).ok_or("--config needs a file")?;
                config = Some(PathBuf::from(path));
                rest = &rest[2..];
            }
            "--help" | "-h" => {
                return Ok(Invocation {
                    config,
                    command: Command::Help,
                })
            }
            _ => break,
        }
    }

    let command = match rest.iter().map(String::as_str).collect::<Vec<_>>().as_slice() {
        [] => return Err("missing command".into()),
        ["help"] => Command::Help,
        ["ping"] => Command::Ping("ping".into()),
        ["ping", text] => Command::Ping((*text).to_string()),
        ["kv", "put", key, data] => Command::Kv(KvRequest::Write {
            key: (*key).to_string(),
            data: parse_json(data)?,
        }),
        ["kv", "append", key, data] => Command::Kv(KvRequest::Append {
            key: (*key).to_string(),
            data: parse_json(data)?,
        }),
        ["kv", "get", key] => Command::Kv(KvRequest::Read { key: (*key).to_string() }),
        ["kv", "has", key] => Command::Kv(KvRequest::Has { key: (*key).to_string() }),
        ["kv", "find", pattern] => Command::Kv(KvRequest::Find {
            pattern: (*pattern).to_string(),
        }),
        ["kv", "clear"] => Command::Kv(KvRequest::Clear),
        other => return Err(format!("unrecognized command: {}", other.join(" "))),
    };

    Ok(Invocation { config, command })
}

fn parse_json(data: &str) -> Result<Value, String> {
    serde_json::from_str(data).map_err(|e| format!("invalid JSON '{data}': {e}"))
}

async fn run(config: &Config, command: Command) -> threadlet::Result<String> {
    let registry = builtin_registry();

    match command {
        Command::Help => Ok(USAGE.to_string()),
        Command::Ping(text) => {
            let reply: Value = with_worker(&registry, config.worker_options(echo::SCRIPT), |worker| async move {
                worker.send(&text).await
            })
            .await?;
            Ok(render_value(&reply))
        }
        Command::Kv(request) => {
            let options = config.worker_options(kv::SCRIPT).with_data(&config.store_path())?;
            tracing::debug!(operation = request.operation(), store = ?config.store_path(), "running kv command");
            let response: KvResponse =
                with_worker(&registry, options, |worker| async move { worker.send(&request).await }).await?;
            Ok(render_kv(response))
        }
    }
}

fn render_value(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

fn render_kv(response: KvResponse) -> String {
    match response {
        KvResponse::Done => String::new(),
        KvResponse::Exists { exists } => exists.to_string(),
        KvResponse::Records { records } => records
            .iter()
            .map(|Record { key, data, .. }| format!("{key}\t{data}"))
            .collect::<Vec<_>>()
            .join("\n"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn args(line: &str) -> Vec<String> {
        line.split_whitespace().map(String::from).collect()
    }

    #[test]
    fn parses_config_and_kv_commands() {
        let invocation = parse_args(&args("--config /etc/threadlet.toml kv put answer 42")).unwrap();
        assert_eq!(invocation.config, Some(PathBuf::from("/etc/threadlet.toml")));
        assert_eq!(
            invocation.command,
            Command::Kv(KvRequest::Write {
                key: "answer".into(),
                data: json!(42),
            })
        );
    }

    #[test]
    fn ping_defaults_to_ping() {
        assert_eq!(parse_args(&args("ping")).unwrap().command, Command::Ping("ping".into()));
    }

    #[test]
    fn usage_errors_are_reported() {
        assert!(parse_args(&args("")).is_err());
        assert!(parse_args(&args("kv put key {not-json")).is_err());
        assert!(parse_args(&args("kv frobnicate")).is_err());
        assert!(parse_args(&args("--config")).is_err());
    }

    #[test]
    fn records_render_one_per_line() {
        let response = KvResponse::Records {
            records: vec![Record::new("a", json!(1)), Record::new("b", json!("x"))],
        };
        assert_eq!(render_kv(response), "a\t1\nb\t\"x\"");
    }
}
