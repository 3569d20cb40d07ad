//! Entry point for the hostpulse consumer CLI. Connects to an agent and
//! prints one line per received snapshot.

use std::env;
use std::time::Duration;

use anyhow::Context;
use tokio::sync::mpsc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use hostpulse::poller::{http_base, StatsPoller};
use hostpulse::session::{ClientSession, SessionEvent};
use hostpulse::types::SystemSnapshot;
use hostpulse::ws::{stream_url, DEFAULT_GROUP};

const DEFAULT_POLL_INTERVAL_MS: u64 = 1_000;

struct ParsedArgs {
    url: String,
    group: String,
    poll: bool,
    interval_ms: u64,
}

fn parse_args<I: IntoIterator<Item = String>>(args: I) -> Result<ParsedArgs, String> {
    let mut it = args.into_iter();
    let prog = it.next().unwrap_or_else(|| "hostpulse".into());
    let usage = format!(
        "Usage: {prog} [--group NAME|-g NAME] [--poll] [--interval MS|-i MS] ws://HOST:PORT/ws/stats"
    );

    let mut url: Option<String> = None;
    let mut group = DEFAULT_GROUP.to_string();
    let mut poll = false;
    let mut interval_ms = DEFAULT_POLL_INTERVAL_MS;

    while let Some(arg) = it.next() {
        match arg.as_str() {
            "-h" | "--help" => return Err(usage),
            "--group" | "-g" => {
                group = it.next().ok_or_else(|| usage.clone())?;
            }
            "--poll" => poll = true,
            "--interval" | "-i" => {
                interval_ms = it
                    .next()
                    .and_then(|v| v.parse().ok())
                    .filter(|&ms| ms > 0)
                    .ok_or_else(|| usage.clone())?;
            }
            _ if arg.starts_with("--group=") => {
                if let Some((_, v)) = arg.split_once('=') {
                    group = v.to_string();
                }
            }
            _ if arg.starts_with('-') => return Err(usage),
            _ => {
                if url.is_none() {
                    url = Some(arg);
                } else {
                    return Err(usage);
                }
            }
        }
    }

    let url = url.ok_or(usage)?;
    Ok(ParsedArgs {
        url,
        group,
        poll,
        interval_ms,
    })
}

fn gib(bytes: u64) -> f64 {
    bytes as f64 / (1024.0 * 1024.0 * 1024.0)
}

fn format_line(s: &SystemSnapshot) -> String {
    let temp = match s.cpu.temperature {
        Some(t) => format!(" {t:.0}°C"),
        None => String::new(),
    };
    format!(
        "cpu {:5.1}%{} @ {} MHz ({} cores) | mem {:5.1}% ({:.2}/{:.2} GiB)",
        s.cpu.overall,
        temp,
        s.cpu.average_frequency,
        s.cpu.cores.len(),
        s.memory.usage_percent,
        gib(s.memory.used),
        gib(s.memory.total),
    )
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
                .unwrap_or_else(|_| "hostpulse=info".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let (tx, mut rx) = mpsc::unbounded_channel();
    tokio::spawn(async move {
        while let Some(event) = rx.recv().await {
            match event {
                SessionEvent::Stats(snapshot) => println!("{}", format_line(&snapshot)),
                SessionEvent::Error(e) => eprintln!("agent error: {} ({})", e.message, e.code),
                SessionEvent::Heartbeat => tracing::debug!("heartbeat"),
                SessionEvent::StateChanged(state) => tracing::info!(?state, "session state"),
            }
        }
    });

    let stream = stream_url(&args.url, &args.group)
        .with_context(|| format!("invalid url: {}", args.url))?;

    if args.poll {
        let base = http_base(&stream).context("cannot derive http base from url")?;
        let poller = StatsPoller::new(&base, Duration::from_millis(args.interval_ms));
        tokio::select! {
            _ = poller.run(tx) => {}
            _ = tokio::signal::ctrl_c() => {}
        }
        return Ok(());
    }

    let mut session = ClientSession::new(stream, tx);
    tokio::select! {
        res = session.run() => {
            // Terminal but retryable: rerun the command to retry.
            res.context("stream session ended")?;
        }
        _ = tokio::signal::ctrl_c() => {}
    }
    Ok(())
}
