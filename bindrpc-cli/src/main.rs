//! bindrpc-cli - Command-line caller for bindrpc servers
//!
//! Provides both a REPL and one-shot command execution.

mod commands;
mod repl;

use bindrpc_client::{Client, ConnectionConfig};
use clap::{Parser, Subcommand};
use colored::Colorize;
use std::net::SocketAddr;
use std::time::Duration;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "bindrpc-cli")]
#[command(about = "Command-line caller for bindrpc JSON-RPC servers")]
#[command(version)]
struct Cli {
    /// Server address
    #[arg(short, long, default_value = "127.0.0.1:4044", env = "BINDRPC_SERVER")]
    server: SocketAddr,

    /// Seconds to wait for each response
    #[arg(short, long, default_value = "30")]
    timeout: u64,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Start interactive REPL
    Repl,

    /// Ping the server
    Ping,

    /// Get the server version
    Version,

    /// List the methods the server exposes
    Methods,

    /// Call a method and print its result
    Call {
        /// Dotted method name, e.g. Host.ping
        method: String,

        /// Params JSON, object or array (or @file.json to read from file)
        params: Option<String>,
    },

    /// Send a notification (no response is read)
    Notify {
        /// Dotted method name
        method: String,

        /// Params JSON, object or array (or @file.json to read from file)
        params: Option<String>,
    },

    /// Send a payload verbatim in one frame and print the raw response
    Raw {
        /// Frame payload (or @file to read from file)
        payload: String,
    },
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .init();

    let cli = Cli::parse();

    let config = ConnectionConfig::new(cli.server)
        .with_request_timeout(Duration::from_secs(cli.timeout));
    let client = Client::new(config);

    match cli.command {
        Some(Commands::Repl) | None => {
            repl::run(client, cli.server).await?;
        }
        Some(cmd) => {
            // Connect for one-shot command
            client.connect().await.map_err(|e| {
                eprintln!("{}: {}", "Connection failed".red(), e);
                e
            })?;

            let result = commands::execute(&client, cmd).await;

            match result {
                Ok(output) => {
                    if !output.is_empty() {
                        println!("{}", output);
                    }
                }
                Err(e) => {
                    eprintln!("{}: {}", "Error".red(), e);
                    let _ = client.close().await;
                    std::process::exit(1);
                }
            }

            client.close().await?;
        }
    }

    Ok(())
}
