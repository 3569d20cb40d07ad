//! Client session: a persistent connection to the agent's streaming
//! endpoint, modeled as an explicit state machine with exponential-backoff
//! reconnect. One timer drives the whole thing; there is no nested
//! rescheduling.

use std::time::Duration;

use futures_util::StreamExt;
use thiserror::Error;
use tokio::sync::mpsc;
use tokio::time::sleep;
use tokio_tungstenite::tungstenite::{self, Message};
use url::Url;

use crate::types::{Envelope, ErrorInfo, SystemSnapshot};
use crate::ws::{self, WsStream};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Connecting,
    Open,
    Backoff,
    /// Terminal until `retry` is called.
    Failed,
}

#[derive(Debug, Error)]
pub enum SessionError {
    #[error("transport error: {0}")]
    Transport(#[from] tungstenite::Error),

    /// Terminal at the session level; the caller decides whether to retry.
    #[error("connection lost after {attempts} reconnect attempts")]
    ConnectionLost { attempts: u32 },
}

/// What the session surfaces to its consumer.
#[derive(Debug)]
pub enum SessionEvent {
    StateChanged(SessionState),
    Stats(SystemSnapshot),
    /// Server-pushed error; the connection stays open.
    Error(ErrorInfo),
    Heartbeat,
}

#[derive(Debug, Clone, Copy)]
pub struct BackoffPolicy {
    pub base: Duration,
    pub cap: Duration,
    pub max_attempts: u32,
}

impl Default for BackoffPolicy {
    fn default() -> Self {
        Self {
            base: Duration::from_millis(1_000),
            cap: Duration::from_millis(30_000),
            max_attempts: 5,
        }
    }
}

impl BackoffPolicy {
    /// `min(base * 2^attempt, cap)`.
    pub fn delay(&self, attempt: u32) -> Duration {
        let factor = 1u64 << attempt.min(16);
        let ms = (self.base.as_millis() as u64).saturating_mul(factor);
        Duration::from_millis(ms.min(self.cap.as_millis() as u64))
    }
}

/// Reconnect bookkeeping: the attempt counter starts at 0, increments on
/// every failure, and resets on a successful open.
#[derive(Debug)]
struct Reconnect {
    policy: BackoffPolicy,
    attempt: u32,
}

impl Reconnect {
    fn new(policy: BackoffPolicy) -> Self {
        Self { policy, attempt: 0 }
    }

    /// Delay before the next attempt, or None once retries are exhausted.
    fn next_delay(&mut self) -> Option<Duration> {
        if self.attempt >= self.policy.max_attempts {
            return None;
        }
        let delay = self.policy.delay(self.attempt);
        self.attempt += 1;
        Some(delay)
    }

    fn reset(&mut self) {
        self.attempt = 0;
    }
}

pub struct ClientSession {
    url: Url,
    events: mpsc::UnboundedSender<SessionEvent>,
    reconnect: Reconnect,
    state: SessionState,
}

impl ClientSession {
    pub fn new(url: Url, events: mpsc::UnboundedSender<SessionEvent>) -> Self {
        Self::with_policy(url, events, BackoffPolicy::default())
    }

    pub fn with_policy(
        url: Url,
        events: mpsc::UnboundedSender<SessionEvent>,
        policy: BackoffPolicy,
    ) -> Self {
        Self {
            url,
            events,
            reconnect: Reconnect::new(policy),
            state: SessionState::Connecting,
        }
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    /// Runs until reconnect attempts are exhausted. The returned
    /// `ConnectionLost` is terminal but retryable: call `retry` to start
    /// over with a fresh attempt counter.
    pub async fn run(&mut self) -> Result<(), SessionError> {
        loop {
            self.set_state(SessionState::Connecting);
            match ws::connect(self.url.as_str()).await {
                Ok(stream) => {
                    self.reconnect.reset();
                    self.set_state(SessionState::Open);
                    if let Err(e) = self.pump(stream).await {
                        tracing::warn!(error = %e, "connection lost");
                    }
                }
                Err(e) => tracing::warn!(error = %e, url = %self.url, "connect failed"),
            }

            match self.reconnect.next_delay() {
                Some(delay) => {
                    self.set_state(SessionState::Backoff);
                    sleep(delay).await;
                }
                None => {
                    self.set_state(SessionState::Failed);
                    return Err(SessionError::ConnectionLost {
                        attempts: self.reconnect.attempt,
                    });
                }
            }
        }
    }

    /// Manual retry after `Failed`: resets the attempt counter and
    /// re-enters the connect loop.
    pub async fn retry(&mut self) -> Result<(), SessionError> {
        self.reconnect.reset();
        self.run().await
    }

    /// Reads envelopes until the connection closes. Returns Ok on a clean
    /// close, Err on a transport failure.
    async fn pump(&mut self, mut stream: WsStream) -> Result<(), SessionError> {
        while let Some(msg) = stream.next().await {
            match msg {
                Ok(Message::Text(text)) => self.dispatch(&text),
                Ok(Message::Close(_)) => return Ok(()),
                Ok(_) => {}
                Err(e) => return Err(SessionError::Transport(e)),
            }
        }
        Ok(())
    }

    fn dispatch(&self, text: &str) {
        match serde_json::from_str::<Envelope>(text) {
            Ok(Envelope::Stats { data, .. }) => {
                let _ = self.events.send(SessionEvent::Stats(data));
            }
            Ok(Envelope::Error { data, .. }) => {
                let _ = self.events.send(SessionEvent::Error(data));
            }
            Ok(Envelope::Heartbeat { .. }) => {
                let _ = self.events.send(SessionEvent::Heartbeat);
            }
            Err(e) => tracing::debug!(error = %e, "ignoring malformed envelope"),
        }
    }

    fn set_state(&mut self, state: SessionState) {
        if self.state != state {
            self.state = state;
            let _ = self.events.send(SessionEvent::StateChanged(state));
        }
    }
}
