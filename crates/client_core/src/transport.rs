//! Outbound channel seam and the websocket implementation behind it.

use std::sync::atomic::{AtomicBool, Ordering};

use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use futures::{
    stream::{SplitSink, SplitStream},
    SinkExt, StreamExt,
};
use shared::{domain::SessionId, protocol::ClientRequest};
use tokio::{net::TcpStream, sync::Mutex};
use tokio_tungstenite::{
    connect_async, tungstenite::Message, MaybeTlsStream, WebSocketStream,
};
use tracing::{debug, info};
use url::Url;

pub type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;
pub type WsReader = SplitStream<WsStream>;

#[async_trait]
pub trait OutboundChannel: Send + Sync {
    fn is_open(&self) -> bool;
    fn mark_closed(&self);
    async fn send(&self, request: &ClientRequest) -> Result<()>;
}

/// Derives the per-session websocket endpoint from the server origin.
pub fn session_ws_url(server_origin: &str, session_id: SessionId) -> Result<Url> {
    let origin = server_origin.trim().trim_end_matches('/');
    let ws_origin = if let Some(rest) = origin.strip_prefix("https://") {
        format!("wss://{rest}")
    } else if let Some(rest) = origin.strip_prefix("http://") {
        format!("ws://{rest}")
    } else if origin.starts_with("ws://") || origin.starts_with("wss://") {
        origin.to_string()
    } else {
        return Err(anyhow!(
            "server url must start with http://, https://, ws:// or wss://"
        ));
    };
    Url::parse(&format!("{ws_origin}/ws/{session_id}"))
        .with_context(|| format!("invalid server url: {server_origin}"))
}

pub struct WsOutbound {
    sink: Mutex<SplitSink<WsStream, Message>>,
    open: AtomicBool,
}

impl WsOutbound {
    pub fn new(sink: SplitSink<WsStream, Message>) -> Self {
        Self {
            sink: Mutex::new(sink),
            open: AtomicBool::new(true),
        }
    }
}

#[async_trait]
impl OutboundChannel for WsOutbound {
    fn is_open(&self) -> bool {
        self.open.load(Ordering::Acquire)
    }

    fn mark_closed(&self) {
        self.open.store(false, Ordering::Release);
    }

    async fn send(&self, request: &ClientRequest) -> Result<()> {
        let text = serde_json::to_string(request)?;
        let mut sink = self.sink.lock().await;
        if let Err(err) = sink.send(Message::Text(text)).await {
            self.mark_closed();
            return Err(err).context("websocket send failed");
        }
        debug!(?request, "frame sent");
        Ok(())
    }
}

pub async fn connect(url: &Url) -> Result<(WsOutbound, WsReader)> {
    let (ws_stream, _) = connect_async(url.as_str())
        .await
        .with_context(|| format!("failed to connect websocket: {url}"))?;
    info!(%url, "websocket connected");
    let (sink, reader) = ws_stream.split();
    Ok((WsOutbound::new(sink), reader))
}
