//! End-to-end streaming: run the full agent service on an ephemeral port,
//! subscribe over WebSocket, and exercise the stats push and the
//! ping/heartbeat exchange.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use tokio_tungstenite::{connect_async, tungstenite::Message};

use hostpulse_agent::api::build_router;
use hostpulse_agent::provider::{MetricsProvider, SysinfoProvider};
use hostpulse_agent::sampler::{spawn_sampler, SamplerHandle};
use hostpulse_agent::snapshot::Envelope;
use hostpulse_agent::AppState;

async fn start_agent(interval: Duration) -> (SocketAddr, SamplerHandle) {
    let provider: Arc<dyn MetricsProvider> = Arc::new(SysinfoProvider::new());
    let state = AppState::new(provider);
    let sampler = spawn_sampler(
        Arc::clone(&state.provider),
        state.cache.clone(),
        Arc::clone(&state.hub),
        interval,
    );

    let app = build_router(state);
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
        .await
        .expect("bind ephemeral port");
    let addr = listener.local_addr().expect("local addr");
    tokio::spawn(async move {
        let _ = axum::serve(listener, app).await;
    });

    (addr, sampler)
}

#[tokio::test]
async fn subscriber_receives_stats_pushes() {
    let (addr, sampler) = start_agent(Duration::from_millis(100)).await;

    let (mut ws, _) = connect_async(format!("ws://{addr}/ws/stats"))
        .await
        .expect("connect ws");

    let stats = tokio::time::timeout(Duration::from_secs(10), async {
        while let Some(Ok(msg)) = ws.next().await {
            if let Message::Text(text) = msg {
                if let Ok(Envelope::Stats { data, .. }) = serde_json::from_str(&text) {
                    return data;
                }
            }
        }
        panic!("stream closed before a stats envelope arrived");
    })
    .await
    .expect("stats envelope within timeout");

    assert!(stats.cpu.overall >= 0.0 && stats.cpu.overall <= 100.0);
    assert!(stats.memory.used <= stats.memory.total);
    assert!(stats.timestamp > 0);

    sampler.stop().await;
}

#[tokio::test]
async fn ping_gets_an_immediate_heartbeat() {
    let (addr, sampler) = start_agent(Duration::from_secs(60)).await;

    let (mut ws, _) = connect_async(format!("ws://{addr}/ws/stats?group=probes"))
        .await
        .expect("connect ws");

    ws.send(Message::Text("ping".into())).await.expect("send ping");

    // The long sampling interval means the only expected frame is the
    // heartbeat reply.
    let got_heartbeat = tokio::time::timeout(Duration::from_secs(5), async {
        while let Some(Ok(msg)) = ws.next().await {
            if let Message::Text(text) = msg {
                if matches!(serde_json::from_str(&text), Ok(Envelope::Heartbeat { .. })) {
                    return true;
                }
            }
        }
        false
    })
    .await
    .expect("heartbeat within timeout");

    assert!(got_heartbeat);
    sampler.stop().await;
}
