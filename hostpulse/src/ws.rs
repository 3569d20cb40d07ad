//! Minimal WebSocket client helpers for the agent's streaming endpoint.

use tokio::net::TcpStream;
use tokio_tungstenite::{connect_async, tungstenite, MaybeTlsStream, WebSocketStream};
use url::Url;

pub type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

pub const DEFAULT_GROUP: &str = "default";

/// Connect to the agent and return the WS stream.
pub async fn connect(url: &str) -> Result<WsStream, tungstenite::Error> {
    let (ws, _) = connect_async(url).await?;
    Ok(ws)
}

/// Builds the streaming URL for `group`. The default group needs no query
/// parameter; the agent falls back to it on its own.
pub fn stream_url(base: &str, group: &str) -> Result<Url, url::ParseError> {
    let mut url = Url::parse(base)?;
    if group != DEFAULT_GROUP {
        url.query_pairs_mut().append_pair("group", group);
    }
    Ok(url)
}
