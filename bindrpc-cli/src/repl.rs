//! Interactive REPL.

use crate::commands::{format_json, format_methods, format_response, parse_params};
use bindrpc_client::Client;
use colored::Colorize;
use rustyline::error::ReadlineError;
use rustyline::history::DefaultHistory;
use rustyline::{Config, Editor};
use std::net::SocketAddr;

const HELP_TEXT: &str = r#"
Available commands:
  help                          Show this help
  ping                          Ping the server
  version                       Get the server version
  methods                       List exposed methods

  call <method> [params_json]   Call a method
  notify <method> [params_json] Send a notification
  raw <payload>                 Send a payload verbatim in one frame

  quit, exit                    Exit the REPL

Any other input of the form Class.member [params_json] is a call.
"#;

pub async fn run(client: Client, addr: SocketAddr) -> Result<(), Box<dyn std::error::Error>> {
    println!("{}", "bindrpc CLI".bold().cyan());
    println!("Connecting to {}...", addr);

    client.connect().await?;
    println!("{}", "Connected!".green());

    let config = Config::builder()
        .history_ignore_space(true)
        .auto_add_history(true)
        .build();
    let mut rl: Editor<(), DefaultHistory> = Editor::with_config(config)?;

    // Load history
    let history_path = std::env::var("HOME")
        .map(|h| std::path::PathBuf::from(h).join(".bindrpc_history"))
        .unwrap_or_else(|_| ".bindrpc_history".into());
    let _ = rl.load_history(&history_path);

    println!("Type 'help' for available commands.\n");

    loop {
        let prompt = format!("{} ", "bindrpc>".cyan());
        match rl.readline(&prompt) {
            Ok(line) => {
                let line = line.trim();
                if line.is_empty() {
                    continue;
                }

                // A closed or desynchronized connection is reopened once
                if !client.is_connected() {
                    println!("{}", "Reconnecting...".dimmed());
                    if let Err(e) = client.connect().await {
                        println!("{}: {}\n", "Connection failed".red(), e);
                        continue;
                    }
                }

                match execute_repl_command(&client, line).await {
                    Ok(Some(output)) => println!("{}\n", output),
                    Ok(None) => break, // Exit command
                    Err(e) => println!("{}: {}\n", "Error".red(), e),
                }
            }
            Err(ReadlineError::Interrupted) => {
                println!("^C");
                continue;
            }
            Err(ReadlineError::Eof) => {
                println!("^D");
                break;
            }
            Err(err) => {
                println!("{}: {:?}", "Error".red(), err);
                break;
            }
        }
    }

    let _ = rl.save_history(&history_path);

    let _ = client.close().await;
    println!("{}", "Disconnected.".dimmed());

    Ok(())
}

/// Splits a line into its command word and the untouched remainder, so JSON
/// arguments keep their spaces.
fn split_command(line: &str) -> (String, &str) {
    match line.split_once(char::is_whitespace) {
        Some((cmd, rest)) => (cmd.to_string(), rest.trim()),
        None => (line.to_string(), ""),
    }
}

/// Splits `Class.member [params]`.
fn split_call(rest: &str) -> (&str, Option<&str>) {
    match rest.split_once(char::is_whitespace) {
        Some((method, params)) if !params.trim().is_empty() => (method, Some(params.trim())),
        Some((method, _)) => (method, None),
        None => (rest, None),
    }
}

async fn execute_repl_command(
    client: &Client,
    line: &str,
) -> Result<Option<String>, Box<dyn std::error::Error>> {
    let (cmd, rest) = split_command(line);

    match cmd.to_lowercase().as_str() {
        "help" | "?" => Ok(Some(HELP_TEXT.to_string())),

        "quit" | "exit" | "q" => Ok(None),

        "ping" => {
            if client.ping().await? {
                Ok(Some("PONG".green().to_string()))
            } else {
                Ok(Some("Ping returned false".yellow().to_string()))
            }
        }

        "version" => {
            let version = client.version().await?;
            Ok(Some(format_json(&version)))
        }

        "methods" | "m" => {
            let methods = client.methods().await?;
            Ok(Some(format_methods(&methods)))
        }

        "call" | "c" => {
            if rest.is_empty() {
                return Ok(Some("Usage: call <method> [params_json]".to_string()));
            }
            let (method, params) = split_call(rest);
            let result = client.call(method, parse_params(params)?).await?;
            Ok(Some(format_json(&result)))
        }

        "notify" | "n" => {
            if rest.is_empty() {
                return Ok(Some("Usage: notify <method> [params_json]".to_string()));
            }
            let (method, params) = split_call(rest);
            client.notify(method, parse_params(params)?).await?;
            Ok(Some(format!("{} {}", "Notified".green(), method.cyan())))
        }

        "raw" => {
            if rest.is_empty() {
                return Ok(Some("Usage: raw <payload>".to_string()));
            }
            let response = client.call_raw(rest.as_bytes()).await?;
            Ok(Some(format_response(&response)))
        }

        _ if cmd.contains('.') => {
            let (method, params) = split_call(line);
            let result = client.call(method, parse_params(params)?).await?;
            Ok(Some(format_json(&result)))
        }

        _ => Ok(Some(format!(
            "Unknown command: {}. Type 'help' for help.",
            cmd
        ))),
    }
}
