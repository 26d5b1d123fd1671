//! snapkv - A Small In-Memory Key-Value Server
//!
//! This is the main entry point for the snapkv server.
//! It parses the command line, sets up logging, and runs the server until
//! Ctrl+C.

use anyhow::Context;
use snapkv::config::{RuntimeConfig, ServerConfig};
use snapkv::server::Server;
use tokio::signal;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

/// Parse configuration from command-line arguments
fn config_from_args() -> ServerConfig {
    let mut config = ServerConfig::default();
    let mut runtime = RuntimeConfig::default();
    let args: Vec<String> = std::env::args().collect();

    let mut i = 1;
    while i < args.len() {
        match args[i].as_str() {
            "--host" | "-h" => {
                config.host = required_value(&args, i, "--host");
                i += 2;
            }
            "--port" | "-p" => {
                config.port = required_value(&args, i, "--port")
                    .parse()
                    .unwrap_or_else(|_| {
                        eprintln!("Error: invalid port number");
                        std::process::exit(1);
                    });
                i += 2;
            }
            "--dir" => {
                runtime.dir = Some(required_value(&args, i, "--dir"));
                i += 2;
            }
            "--dbfilename" => {
                runtime.dbfilename = Some(required_value(&args, i, "--dbfilename"));
                i += 2;
            }
            "--help" => {
                print_help();
                std::process::exit(0);
            }
            "--version" | "-v" => {
                println!("snapkv version {}", snapkv::VERSION);
                std::process::exit(0);
            }
            _ => {
                eprintln!("Unknown argument: {}", args[i]);
                print_help();
                std::process::exit(1);
            }
        }
    }

    config.with_runtime(runtime)
}

fn required_value(args: &[String], i: usize, flag: &str) -> String {
    match args.get(i + 1) {
        Some(value) => value.clone(),
        None => {
            eprintln!("Error: {} requires a value", flag);
            std::process::exit(1);
        }
    }
}

fn print_help() {
    println!(
        r#"
snapkv - A Small In-Memory Key-Value Server

USAGE:
    snapkv [OPTIONS]

OPTIONS:
    -h, --host <HOST>          Host to bind to (default: 127.0.0.1)
    -p, --port <PORT>          Port to listen on (default: 6379)
        --dir <DIR>            Directory SAVE writes into (created if missing)
        --dbfilename <NAME>    Snapshot file name inside --dir
    -v, --version              Print version information
        --help                 Print this help message

ENVIRONMENT:
    RUST_LOG                   Log filter (default: info)

EXAMPLES:
    snapkv                                      # Start on 127.0.0.1:6379
    snapkv --port 6380                          # Start on port 6380
    snapkv --dir /tmp/data --dbfilename dump.rdb

CONNECTING:
    $ redis-cli -p 6379
    127.0.0.1:6379> SET name "snap" PX 5000
    OK
    127.0.0.1:6379> GET name
    "snap"
    127.0.0.1:6379> SAVE
    OK
"#
    );
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = config_from_args();

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false)
        .init();

    if let Some(dir) = &config.runtime.dir {
        std::fs::create_dir_all(dir)
            .with_context(|| format!("failed to create snapshot directory {}", dir))?;
    }

    info!(
        version = snapkv::VERSION,
        dir = config.runtime.dir.as_deref().unwrap_or("-"),
        dbfilename = config.runtime.dbfilename.as_deref().unwrap_or("-"),
        "Starting snapkv"
    );

    let server = Server::bind(config).await?;
    info!("Ready to accept connections on {}", server.local_addr());

    let shutdown = server.shutdown_handle();
    tokio::spawn(async move {
        match signal::ctrl_c().await {
            Ok(()) => {
                info!("Shutdown signal received, stopping server...");
                shutdown.shutdown();
            }
            Err(e) => error!(error = %e, "Failed to install Ctrl+C handler"),
        }
    });

    server.run().await?;

    info!("Server shutdown complete");
    Ok(())
}
