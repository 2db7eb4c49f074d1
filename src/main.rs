// src/main.rs

//! The main entry point for the chatrelay server.

use anyhow::Result;
use chatrelay::config::Config;
use chatrelay::server;
use std::env;
use std::path::Path;
use tracing::{error, info};
use tracing_subscriber::{filter::EnvFilter, prelude::*};

/// Used when no `--config` flag is given and the file exists.
const DEFAULT_CONFIG_PATH: &str = "chatrelay.toml";

#[tokio::main]
async fn main() -> Result<()> {
    const VERSION: &str = env!("CHATRELAY_BUILD_VERSION");

    let args: Vec<String> = env::args().collect();

    // Handle the --version flag.
    if args.contains(&"--version".to_string()) {
        println!("chatrelay version {VERSION}");
        return Ok(());
    }

    // An explicit --config must load; the default path is optional.
    let explicit_config = args
        .iter()
        .position(|arg| arg == "--config")
        .map(|i| args.get(i + 1).map(|s| s.as_str()));
    let config_result = match explicit_config {
        Some(Some(path)) => Config::from_file(path).map_err(|e| (path.to_string(), e)),
        Some(None) => {
            eprintln!("--config flag requires a value");
            std::process::exit(1);
        }
        None if Path::new(DEFAULT_CONFIG_PATH).exists() => {
            Config::from_file(DEFAULT_CONFIG_PATH).map_err(|e| (DEFAULT_CONFIG_PATH.to_string(), e))
        }
        None => Ok(Config::default()),
    };
    let mut config = match config_result {
        Ok(cfg) => cfg,
        Err((path, e)) => {
            eprintln!("Failed to load configuration from \"{path}\": {e:#}");
            std::process::exit(1);
        }
    };

    // Override host and port if provided as command-line arguments.
    if let Some(host) = flag_value(&args, "--host") {
        config.host = host.to_string();
    }
    if let Some(port_str) = flag_value(&args, "--port") {
        match port_str.parse::<u16>() {
            Ok(port) if port != 0 => config.port = port,
            _ => {
                eprintln!("Invalid port number: {port_str}");
                std::process::exit(1);
            }
        }
    }
    if let Err(e) = config.validate() {
        eprintln!("Invalid configuration: {e}");
        std::process::exit(1);
    }

    // Initial log level from env var or config.
    let log_level = std::env::var("RUST_LOG").unwrap_or_else(|_| config.log_level.clone());
    tracing_subscriber::registry()
        .with(EnvFilter::new(log_level))
        .with(
            tracing_subscriber::fmt::layer()
                .compact() // Use the compact, single-line format.
                .with_ansi(true), // Enable ANSI color codes for log levels.
        )
        .init();

    info!("Starting chatrelay {VERSION} on {}", config.bind_address());
    if let Err(e) = server::run(config).await {
        error!("Server runtime error: {:#}", e);
        return Err(e);
    }

    Ok(())
}

/// Returns the value following `flag`, exiting if the flag has none.
fn flag_value<'a>(args: &'a [String], flag: &str) -> Option<&'a str> {
    let index = args.iter().position(|arg| arg == flag)?;
    match args.get(index + 1) {
        Some(value) => Some(value.as_str()),
        None => {
            eprintln!("{flag} flag requires a value");
            std::process::exit(1);
        }
    }
}
