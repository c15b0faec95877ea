use std::path::PathBuf;
use std::sync::Arc;

use clap::{Parser, Subcommand};
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION};
use serde_json::Value;

use uptime_sentinel::config::{loader, ClientConfig, SentinelConfig};
use uptime_sentinel::connectivity::{ConnectivityMonitor, EndpointProbe};
use uptime_sentinel::lifecycle::Shutdown;
use uptime_sentinel::resilience::{ApiRequest, CallClass, CallObserver, MemoryCredentials, ResilientClient};

#[derive(Parser)]
#[command(name = "sentinel-cli")]
#[command(about = "Operator CLI for uptime-sentinel", long_about = None)]
struct Cli {
    /// Admin API base URL
    #[arg(short, long, default_value = "http://localhost:8081")]
    url: String,

    /// Admin API key
    #[arg(short, long, default_value = "")]
    key: String,

    /// Configuration file for client timeouts and retry settings
    #[arg(short, long)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Show supervisor status
    Status,
    /// Show the current metrics snapshot
    Metrics,
    /// Force an immediate health check
    Check,
    /// Reset the consecutive failure count
    Reset,
    /// Perform one resilient GET and print the classified outcome
    Probe { url: String },
    /// Track connectivity to a backend and print every transition
    Watch {
        base_url: String,
        #[arg(long)]
        path: Option<String>,
    },
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Status => admin_call(&cli.url, &cli.key, reqwest::Method::GET, "status").await?,
        Commands::Metrics => admin_call(&cli.url, &cli.key, reqwest::Method::GET, "metrics").await?,
        Commands::Check => admin_call(&cli.url, &cli.key, reqwest::Method::POST, "check").await?,
        Commands::Reset => admin_call(&cli.url, &cli.key, reqwest::Method::POST, "reset").await?,
        Commands::Probe { ref url } => {
            let config = client_settings(cli.config.as_deref())?;
            probe(config.client, url).await?;
        }
        Commands::Watch { ref base_url, ref path } => {
            let mut config = client_settings(cli.config.as_deref())?;
            config.client.base_url = base_url.clone();
            let path = path.clone().unwrap_or_else(|| config.connectivity.health_path.clone());
            watch(config, path).await?;
        }
    }

    Ok(())
}

fn client_settings(path: Option<&std::path::Path>) -> Result<SentinelConfig, Box<dyn std::error::Error>> {
    Ok(match path {
        Some(_) => loader::load(path)?,
        None => SentinelConfig::default(),
    })
}

async fn admin_call(
    base: &str,
    key: &str,
    method: reqwest::Method,
    endpoint: &str,
) -> Result<(), Box<dyn std::error::Error>> {
    let mut headers = HeaderMap::new();
    headers.insert(AUTHORIZATION, HeaderValue::from_str(&format!("Bearer {}", key))?);

    let res = reqwest::Client::new()
        .request(method, format!("{}/admin/{}", base.trim_end_matches('/'), endpoint))
        .headers(headers)
        .send()
        .await?;
    print_response(res).await
}

async fn print_response(res: reqwest::Response) -> Result<(), Box<dyn std::error::Error>> {
    let status = res.status();
    if !status.is_success() {
        eprintln!("Error: Admin API returned status {}", status);
        if let Ok(text) = res.text().await {
            eprintln!("Response: {}", text);
        }
        return Ok(());
    }

    let json: Value = res.json().await?;
    println!("{}", serde_json::to_string_pretty(&json)?);
    Ok(())
}

async fn probe(config: ClientConfig, url: &str) -> Result<(), Box<dyn std::error::Error>> {
    let client = ResilientClient::new(&config, Arc::new(MemoryCredentials::default()))?;
    match client.execute(ApiRequest::get(url).class(CallClass::HealthCheck)).await {
        Ok(response) => {
            println!(
                "OK {} in {} ms after {} attempt(s) [request {}]",
                response.status,
                response.latency.as_millis(),
                response.attempts,
                response.request_id
            );
            match response.json::<Value>() {
                Ok(body) => println!("{}", serde_json::to_string_pretty(&body)?),
                Err(_) => println!("{}", response.text()),
            }
            Ok(())
        }
        Err(err) => {
            eprintln!("FAILED: {}", err);
            eprintln!(
                "kind={} status={:?} network={} timeout={} retryable={} attempts={}",
                err.kind, err.status, err.is_network_error, err.is_timeout_error, err.retryable, err.attempts
            );
            for retry in &err.retries {
                eprintln!(
                    "  attempt {} failed ({}), waited {} ms",
                    retry.attempt_number, retry.cause, retry.delay_ms
                );
            }
            eprintln!("detail: {}", err.detail());
            std::process::exit(1);
        }
    }
}

async fn watch(config: SentinelConfig, path: String) -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| config.observability.log_level.as_str().into()),
        )
        .with_writer(std::io::stderr)
        .init();

    let client = Arc::new(ResilientClient::new(&config.client, Arc::new(MemoryCredentials::default()))?);
    let probe = Arc::new(EndpointProbe::new(Arc::clone(&client), path));
    let monitor = ConnectivityMonitor::new(probe, &config.connectivity);

    let observer: Arc<dyn CallObserver> = monitor.clone();
    client.set_observer(Arc::downgrade(&observer));

    let subscription = monitor.subscribe(|change| match serde_json::to_string(change) {
        Ok(line) => println!("{}", line),
        Err(e) => eprintln!("failed to encode change: {}", e),
    });

    println!("Watching {} (Ctrl-C to stop)", client.base_url());
    let shutdown = Shutdown::new();
    let task = tokio::spawn(Arc::clone(&monitor).run(shutdown.subscribe()));

    tokio::signal::ctrl_c().await?;
    shutdown.trigger();
    task.await?;
    subscription.unsubscribe();

    println!("Final state: {}", monitor.state());
    Ok(())
}
