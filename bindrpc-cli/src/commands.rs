//! Command execution.

use crate::Commands;
use bindrpc_client::Client;
use bindrpc_protocol::Response;
use colored::Colorize;
use serde_json::{json, Value};

/// Executes a command and returns the formatted output.
pub async fn execute(client: &Client, cmd: Commands) -> Result<String, Box<dyn std::error::Error>> {
    match cmd {
        Commands::Repl => unreachable!(),

        Commands::Ping => {
            if client.ping().await? {
                Ok("PONG".green().to_string())
            } else {
                Ok("Ping returned false".yellow().to_string())
            }
        }

        Commands::Version => {
            let version = client.version().await?;
            Ok(format_json(&version))
        }

        Commands::Methods => {
            let methods = client.methods().await?;
            Ok(format_methods(&methods))
        }

        Commands::Call { method, params } => {
            let params = parse_params(params.as_deref())?;
            let result = client.call(&method, params).await?;
            Ok(format_json(&result))
        }

        Commands::Notify { method, params } => {
            let params = parse_params(params.as_deref())?;
            client.notify(&method, params).await?;
            Ok(format!("{} {}", "Notified".green(), method.cyan()))
        }

        Commands::Raw { payload } => {
            let payload = read_arg(&payload)?;
            let response = client.call_raw(payload.as_bytes()).await?;
            Ok(format_response(&response))
        }
    }
}

/// Lists methods one per line, grouped by class.
pub fn format_methods(methods: &[String]) -> String {
    if methods.is_empty() {
        return "No methods exposed".yellow().to_string();
    }

    let mut output = String::new();
    let mut current_class = "";
    for method in methods {
        let (class, member) = method.split_once('.').unwrap_or((method.as_str(), ""));
        if class != current_class {
            output.push_str(&format!("{}\n", class.cyan().bold()));
            current_class = class;
        }
        output.push_str(&format!("  .{}\n", member));
    }
    output
}

/// Formats a response envelope, colouring the outcome.
pub fn format_response(response: &Response) -> String {
    let status = match response.error {
        Some(ref error) => format!("{} {} {}", "ERROR".red(), error.code.code(), error.code),
        None => "OK".green().to_string(),
    };
    let body = serde_json::to_value(response).unwrap_or_else(|_| json!(null));
    format!("{}\n{}", status, format_json(&body))
}

/// Parses optional params. Absent params mean `{}`.
pub fn parse_params(arg: Option<&str>) -> Result<Value, Box<dyn std::error::Error>> {
    match arg {
        Some(arg) => parse_json_arg(arg),
        None => Ok(json!({})),
    }
}

/// Parses a JSON argument (either inline JSON or @file.json).
pub fn parse_json_arg(arg: &str) -> Result<Value, Box<dyn std::error::Error>> {
    Ok(serde_json::from_str(&read_arg(arg)?)?)
}

/// Returns the argument, or the contents of the file it names with `@`.
fn read_arg(arg: &str) -> Result<String, std::io::Error> {
    match arg.strip_prefix('@') {
        Some(path) => std::fs::read_to_string(path),
        None => Ok(arg.to_string()),
    }
}

/// Formats JSON for display.
pub fn format_json(value: &Value) -> String {
    serde_json::to_string_pretty(value).unwrap_or_else(|_| value.to_string())
}
