//! Entry point for the hostpulse agent. Parses args, wires the service
//! together explicitly (provider → state → sampler → router), and serves
//! until interrupted.

use std::env;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use hostpulse_agent::api::build_router;
use hostpulse_agent::provider::{MetricsProvider, SysinfoProvider};
use hostpulse_agent::sampler::spawn_sampler;
use hostpulse_agent::AppState;

const DEFAULT_PORT: u16 = 8080;
const DEFAULT_INTERVAL_MS: u64 = 1_000;

#[derive(Debug)]
struct ParsedArgs {
    host: String,
    port: u16,
    interval_ms: u64,
}

fn parse_args<I: IntoIterator<Item = String>>(args: I) -> Result<ParsedArgs, String> {
    let mut it = args.into_iter();
    let prog = it.next().unwrap_or_else(|| "hostpulse_agent".into());
    let usage =
        format!("Usage: {prog} [--host ADDR] [--port PORT|-p PORT] [--interval MS|-i MS]");

    let mut host = "0.0.0.0".to_string();
    let mut port = DEFAULT_PORT;
    let mut interval_ms = DEFAULT_INTERVAL_MS;

    while let Some(arg) = it.next() {
        match arg.as_str() {
            "-h" | "--help" => return Err(usage),
            "--host" => {
                host = it.next().ok_or_else(|| usage.clone())?;
            }
            "--port" | "-p" => {
                port = it
                    .next()
                    .and_then(|v| v.parse().ok())
                    .ok_or_else(|| usage.clone())?;
            }
            "--interval" | "-i" => {
                interval_ms = it
                    .next()
                    .and_then(|v| v.parse().ok())
                    .filter(|&ms| ms > 0)
                    .ok_or_else(|| usage.clone())?;
            }
            _ if arg.starts_with("--port=") => {
                if let Some((_, v)) = arg.split_once('=') {
                    port = v.parse().map_err(|_| usage.clone())?;
                }
            }
            _ if arg.starts_with("--interval=") => {
                if let Some((_, v)) = arg.split_once('=') {
                    interval_ms = v.parse().map_err(|_| usage.clone())?;
                }
            }
            _ => return Err(usage),
        }
    }

    Ok(ParsedArgs {
        host,
        port,
        interval_ms,
    })
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = match parse_args(env::args()) {
        Ok(v) => v,
        Err(msg) => {
            eprintln!("{msg}");
            return Ok(());
        }
    };

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "hostpulse_agent=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let provider: Arc<dyn MetricsProvider> = Arc::new(SysinfoProvider::new());
    let state = AppState::new(provider);

    let sampler = spawn_sampler(
        Arc::clone(&state.provider),
        state.cache.clone(),
        Arc::clone(&state.hub),
        Duration::from_millis(args.interval_ms),
    );

    let app = build_router(state.clone());
    let addr: SocketAddr = format!("{}:{}", args.host, args.port).parse()?;
    let listener = tokio::net::TcpListener::bind(addr).await?;
    tracing::info!(%addr, interval_ms = args.interval_ms, "hostpulse agent listening");

    tokio::select! {
        res = async { axum::serve(listener, app).await } => res?,
        _ = tokio::signal::ctrl_c() => tracing::info!("shutdown signal received"),
    }

    sampler.stop().await;
    if let Some(snapshot) = state.cache.latest().await {
        tracing::info!(last_sample_ms = snapshot.timestamp, "sampler stopped");
    }
    Ok(())
}
