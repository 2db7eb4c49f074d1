// src/bin/chatrelay-client.rs

//! Interactive command-line client for a chatrelay server.

use anyhow::{Result, anyhow};
use chatrelay::client::{self, ClientOptions};
use chatrelay::core::protocol::Framing;
use std::env;
use tracing_subscriber::filter::EnvFilter;

#[tokio::main]
async fn main() -> Result<()> {
    let args: Vec<String> = env::args().collect();

    if args.iter().any(|arg| arg == "--help" || arg == "-h") {
        println!("Usage: chatrelay-client [--host HOST] [--port PORT] [--framing raw|lines]");
        return Ok(());
    }

    let options = match parse_options(&args) {
        Ok(options) => options,
        Err(e) => {
            eprintln!("{e}");
            std::process::exit(1);
        }
    };

    // Stay quiet unless asked: stdout belongs to the conversation.
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "warn".to_string()),
        ))
        .with_writer(std::io::stderr)
        .compact()
        .init();

    if let Err(e) = client::run(&options).await {
        eprintln!("Error: {e:#}");
        std::process::exit(1);
    }
    Ok(())
}

fn parse_options(args: &[String]) -> Result<ClientOptions> {
    let mut options = ClientOptions::default();
    let mut iter = args.iter().skip(1);
    while let Some(arg) = iter.next() {
        let mut value = || {
            iter.next()
                .ok_or_else(|| anyhow!("{arg} flag requires a value"))
        };
        match arg.as_str() {
            "--host" => options.host = value()?.clone(),
            "--port" => {
                let raw = value()?;
                options.port = raw
                    .parse()
                    .map_err(|_| anyhow!("Invalid port number: {raw}"))?;
            }
            "--framing" => options.framing = value()?.parse::<Framing>().map_err(|e| anyhow!(e))?,
            other => return Err(anyhow!("Unknown argument: {other}")),
        }
    }
    Ok(options)
}
