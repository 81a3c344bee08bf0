//! Status command implementation.
//!
//! Talks plain HTTP to the server's metrics endpoint; no extra client
//! dependency needed for two GETs.

use anyhow::{Context, Result};
use clap::Args;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;

/// Show server status.
#[derive(Args, Debug)]
pub struct StatusArgs {
    /// Metrics endpoint address.
    #[arg(short, long, default_value = "localhost:2112")]
    pub endpoint: String,

    /// Also dump raw metrics.
    #[arg(short, long)]
    pub verbose: bool,
}

/// Run the status command.
pub async fn run_status(args: StatusArgs) -> Result<()> {
    println!("Voyager Server Status");
    println!("=====================");
    println!("Endpoint: {}", args.endpoint);
    println!();

    match http_get(&args.endpoint, "/healthz").await {
        Ok(body) if body.trim() == "ok" => println!("Health:   ok"),
        Ok(body) => println!("Health:   {}", body.trim()),
        Err(e) => {
            println!("Health:   unreachable ({e})");
            return Ok(());
        }
    }

    let metrics = http_get(&args.endpoint, "/metrics").await?;
    let mut registrations = 0u64;
    let mut services = 0usize;
    for line in metrics.lines() {
        if line.starts_with("voyager_registrations_total") {
            if let Some(value) = line.rsplit(' ').next().and_then(|v| v.parse::<u64>().ok()) {
                registrations += value;
            }
        }
        if line.starts_with("voyager_service_instances") {
            services += 1;
        }
    }
    println!("Registrations: {registrations}");
    println!("Services:      {services}");

    if args.verbose {
        println!();
        println!("{metrics}");
    }
    Ok(())
}

async fn http_get(endpoint: &str, path: &str) -> Result<String> {
    let mut stream = TcpStream::connect(endpoint)
        .await
        .with_context(|| format!("cannot connect to {endpoint}"))?;
    let request = format!("GET {path} HTTP/1.1\r\nHost: {endpoint}\r\nConnection: close\r\n\r\n");
    stream.write_all(request.as_bytes()).await?;

    let mut response = String::new();
    stream.read_to_string(&mut response).await?;

    let body = response
        .split_once("\r\n\r\n")
        .map(|(_, body)| body)
        .unwrap_or("");
    Ok(body.to_string())
}
