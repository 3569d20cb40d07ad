//! Point-polling fallback: fixed-interval `/api/stats` reads for when a
//! persistent connection is unavailable. "Connected" here means the last
//! poll succeeded.

use std::time::Duration;

use tokio::sync::mpsc;
use tokio::time::{interval, MissedTickBehavior};
use url::Url;

use crate::session::SessionEvent;
use crate::types::SystemSnapshot;

/// Derives the HTTP base from a streaming URL (ws → http, wss → https,
/// path and query dropped).
pub fn http_base(stream_url: &Url) -> Option<Url> {
    let scheme = match stream_url.scheme() {
        "ws" => "http",
        "wss" => "https",
        other => other,
    };
    let host = stream_url.host_str()?;
    let mut base = format!("{scheme}://{host}");
    if let Some(port) = stream_url.port() {
        base.push_str(&format!(":{port}"));
    }
    Url::parse(&base).ok()
}

pub struct StatsPoller {
    client: reqwest::Client,
    endpoint: String,
    period: Duration,
    connected: bool,
}

impl StatsPoller {
    pub fn new(base_url: &Url, period: Duration) -> Self {
        let endpoint = format!("{}/api/stats", base_url.as_str().trim_end_matches('/'));
        Self {
            client: reqwest::Client::new(),
            endpoint,
            period,
            connected: false,
        }
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    pub fn is_connected(&self) -> bool {
        self.connected
    }

    /// Polls until the event receiver goes away.
    pub async fn run(mut self, events: mpsc::UnboundedSender<SessionEvent>) {
        let mut ticker = interval(self.period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            ticker.tick().await;
            match self.poll_once().await {
                Ok(stats) => {
                    self.connected = true;
                    if events.send(SessionEvent::Stats(stats)).is_err() {
                        return;
                    }
                }
                Err(e) => {
                    if self.connected {
                        tracing::warn!(error = %e, "poll failed");
                    }
                    self.connected = false;
                }
            }
        }
    }

    pub async fn poll_once(&self) -> Result<SystemSnapshot, reqwest::Error> {
        self.client
            .get(&self.endpoint)
            .send()
            .await?
            .error_for_status()?
            .json()
            .await
    }
}
