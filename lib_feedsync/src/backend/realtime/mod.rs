//! # Realtime Push Channel
//!
//! `PushChannel` over a Phoenix-protocol websocket (the realtime server of a
//! Supabase project). Each subscription runs its own connection task:
//!
//! 1.  Connect to `<url>?apikey=<key>&vsn=1.0.0` and send `phx_join` for the topic.
//! 2.  Forward every `postgres_changes` frame on the topic as an `Invalidation`.
//!     The row payload is ignored.
//! 3.  Heartbeat on the `phoenix` topic; a heartbeat left unanswered until the
//!     next one is due counts as a lost connection.
//! 4.  On loss, reconnect with exponential backoff and re-join. Changes made
//!     while disconnected were missed, so a re-join emits `Invalidation { table: None }`.
//! 5.  On cancellation, send `phx_leave`, close the socket and exit.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use futures_util::{Sink, SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio::time::{interval_at, sleep, Instant};
use tokio_tungstenite::{connect_async, tungstenite::protocol::Message, MaybeTlsStream, WebSocketStream};
use tokio_util::sync::CancellationToken;
use url::Url;

use crate::backend::{ChannelTopic, Invalidation, PushChannel, Subscription};
use crate::error::{BackendError, BackendResult};

/// Phoenix frame encoding and classification.
pub mod frames;

use frames::{classify, heartbeat_frame, join_frame, leave_frame, Inbound, PhoenixFrame};

const PROTOCOL_VSN: &str = "1.0.0";

/// Settings of the realtime connection.
#[derive(Debug, Clone)]
pub struct RealtimeConfig {
    /// Websocket endpoint, e.g. `wss://xyz.supabase.co/realtime/v1/websocket`.
    pub url: String,
    pub api_key: String,
    /// The viewer's access token; sent with the join so row-level policies apply.
    pub access_token: Option<String>,
    pub heartbeat_interval: Duration,
    pub reconnect_base_delay: Duration,
    pub reconnect_max_delay: Duration,
}

impl RealtimeConfig {
    pub fn new(url: impl Into<String>, api_key: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            api_key: api_key.into(),
            access_token: None,
            heartbeat_interval: Duration::from_secs(25),
            reconnect_base_delay: Duration::from_millis(1000),
            reconnect_max_delay: Duration::from_millis(30_000),
        }
    }

    /// The URL actually dialled, with the key and protocol version.
    pub fn socket_url(&self) -> BackendResult<Url> {
        let mut url = Url::parse(&self.url)
            .map_err(|e| BackendError::Channel(format!("Invalid realtime URL: {}", e)))?;
        url.query_pairs_mut()
            .append_pair("apikey", &self.api_key)
            .append_pair("vsn", PROTOCOL_VSN);
        Ok(url)
    }
}

/// Push channel over the realtime websocket.
pub struct RealtimeChannel {
    config: Arc<RealtimeConfig>,
}

impl RealtimeChannel {
    pub fn new(config: RealtimeConfig) -> BackendResult<Self> {
        config.socket_url()?;
        Ok(Self {
            config: Arc::new(config),
        })
    }
}

#[async_trait]
impl PushChannel for RealtimeChannel {
    async fn subscribe(&self, topic: ChannelTopic) -> BackendResult<Subscription> {
        let url = self.config.socket_url()?;
        let (subscription, signals, cancel) = Subscription::channel(topic.clone());
        let worker = ChannelWorker {
            config: self.config.clone(),
            url,
            topic,
            signals,
            cancel,
            next_ref: 0,
        };
        tokio::spawn(worker.run());
        Ok(subscription)
    }
}

/// Why a connection ended.
enum SessionEnd {
    Cancelled,
    /// Nobody holds the subscription any more.
    Abandoned,
    Lost(String),
}

struct ChannelWorker {
    config: Arc<RealtimeConfig>,
    url: Url,
    topic: ChannelTopic,
    signals: mpsc::Sender<Invalidation>,
    cancel: CancellationToken,
    next_ref: u64,
}

impl ChannelWorker {
    fn next_ref(&mut self) -> String {
        self.next_ref += 1;
        self.next_ref.to_string()
    }

    async fn run(mut self) {
        let mut backoff = self.config.reconnect_base_delay;
        let mut joined_before = false;

        loop {
            log::info!("Connecting realtime channel {}", self.topic);
            let connected = tokio::select! {
                _ = self.cancel.cancelled() => break,
                res = connect_async(self.url.as_str()) => res,
            };

            match connected {
                Ok((ws, _)) => {
                    match self.session(ws, &mut joined_before).await {
                        SessionEnd::Cancelled | SessionEnd::Abandoned => break,
                        SessionEnd::Lost(reason) => {
                            log::warn!("Realtime channel {} lost: {}", self.topic, reason);
                            if joined_before {
                                backoff = self.config.reconnect_base_delay;
                            }
                        }
                    }
                }
                Err(e) => {
                    log::error!(
                        "Failed to connect realtime channel {}: {}. Retrying in {}ms...",
                        self.topic,
                        e,
                        backoff.as_millis()
                    );
                }
            }

            tokio::select! {
                _ = self.cancel.cancelled() => break,
                _ = sleep(backoff) => {}
            }
            backoff = std::cmp::min(backoff * 2, self.config.reconnect_max_delay);
        }

        log::info!("Realtime channel {} stopped", self.topic);
    }

    async fn session(
        &mut self,
        ws: WebSocketStream<MaybeTlsStream<TcpStream>>,
        joined_before: &mut bool,
    ) -> SessionEnd {
        let (mut write, mut read) = ws.split();
        let topic_name = self.topic.name();

        let join_ref = self.next_ref();
        let join = join_frame(&self.topic, self.config.access_token.as_deref(), &join_ref);
        if let Err(e) = send(&mut write, &join).await {
            return SessionEnd::Lost(e.to_string());
        }

        let period = self.config.heartbeat_interval;
        let mut heartbeat = interval_at(Instant::now() + period, period);
        let mut awaiting_heartbeat = false;

        loop {
            tokio::select! {
                _ = self.cancel.cancelled() => {
                    let leave_ref = self.next_ref();
                    let leave = leave_frame(&self.topic, &leave_ref);
                    let _ = send(&mut write, &leave).await;
                    let _ = write.send(Message::Close(None)).await;
                    log::info!("Left realtime channel {}", self.topic);
                    return SessionEnd::Cancelled;
                }
                _ = heartbeat.tick() => {
                    if awaiting_heartbeat {
                        return SessionEnd::Lost("heartbeat timed out".to_string());
                    }
                    let beat = heartbeat_frame(&self.next_ref());
                    if let Err(e) = send(&mut write, &beat).await {
                        return SessionEnd::Lost(e.to_string());
                    }
                    awaiting_heartbeat = true;
                }
                msg = read.next() => {
                    let text = match msg {
                        Some(Ok(Message::Text(text))) => text,
                        Some(Ok(Message::Close(_))) | None => {
                            return SessionEnd::Lost("socket closed by remote host".to_string());
                        }
                        Some(Err(e)) => return SessionEnd::Lost(e.to_string()),
                        Some(Ok(_)) => continue,
                    };
                    let frame = match PhoenixFrame::parse(&text) {
                        Ok(frame) => frame,
                        Err(e) => {
                            log::debug!("Skipping frame on {}: {}", self.topic, e);
                            continue;
                        }
                    };

                    match classify(&frame, &topic_name) {
                        Inbound::Joined { reference } if reference.as_deref() == Some(join_ref.as_str()) => {
                            log::info!("Joined realtime channel {}", self.topic);
                            if *joined_before {
                                // Changes made while disconnected were missed.
                                if let Some(end) = self.forward(Invalidation { table: None }) {
                                    return end;
                                }
                            }
                            *joined_before = true;
                        }
                        Inbound::Joined { .. } | Inbound::Ignored => {}
                        Inbound::HeartbeatAck => awaiting_heartbeat = false,
                        Inbound::Change(table) => {
                            if let Some(end) = self.forward(Invalidation { table }) {
                                return end;
                            }
                        }
                        Inbound::Rejected(reason) => {
                            return SessionEnd::Lost(format!("join rejected: {}", reason));
                        }
                        Inbound::Closed(reason) => return SessionEnd::Lost(reason),
                    }
                }
            }
        }
    }

    /// Queues `signal` for the subscriber. A full queue already holds a pending
    /// signal, so dropping this one loses nothing.
    fn forward(&self, signal: Invalidation) -> Option<SessionEnd> {
        match self.signals.try_send(signal) {
            Ok(()) | Err(mpsc::error::TrySendError::Full(_)) => None,
            Err(mpsc::error::TrySendError::Closed(_)) => Some(SessionEnd::Abandoned),
        }
    }
}

async fn send<S>(write: &mut S, frame: &PhoenixFrame) -> BackendResult<()>
where
    S: Sink<Message> + Unpin,
    S::Error: std::fmt::Display,
{
    let text = frame.to_text()?;
    write
        .send(Message::Text(text.into()))
        .await
        .map_err(|e| BackendError::Channel(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::EdgeTable;
    use crate::model::Category;
    use serde_json::json;
    use tokio::net::TcpListener;

    type ServerSocket = WebSocketStream<TcpStream>;

    async fn next_frame(ws: &mut ServerSocket) -> Option<PhoenixFrame> {
        while let Some(msg) = ws.next().await {
            if let Ok(Message::Text(text)) = msg {
                let frame = PhoenixFrame::parse(&text).unwrap();
                if frame.event != "heartbeat" {
                    return Some(frame);
                }
            }
        }
        None
    }

    async fn reply(ws: &mut ServerSocket, to: &PhoenixFrame, payload: serde_json::Value) {
        let frame = PhoenixFrame {
            topic: to.topic.clone(),
            event: "phx_reply".to_string(),
            payload,
            reference: to.reference.clone(),
        };
        ws.send(Message::Text(frame.to_text().unwrap().into()))
            .await
            .unwrap();
    }

    async fn push_change(ws: &mut ServerSocket, topic: &str, table: &str) {
        let frame = PhoenixFrame {
            topic: topic.to_string(),
            event: "postgres_changes".to_string(),
            payload: json!({"data": {"table": table, "type": "DELETE"}}),
            reference: None,
        };
        ws.send(Message::Text(frame.to_text().unwrap().into()))
            .await
            .unwrap();
    }

    fn test_config(addr: std::net::SocketAddr) -> RealtimeConfig {
        let mut config = RealtimeConfig::new(format!("ws://{}/realtime/v1/websocket", addr), "anon");
        config.reconnect_base_delay = Duration::from_millis(10);
        config.reconnect_max_delay = Duration::from_millis(50);
        config
    }

    #[test]
    fn socket_url_carries_key_and_version() {
        let config = RealtimeConfig::new("wss://xyz.supabase.co/realtime/v1/websocket", "anon-key");
        assert_eq!(
            config.socket_url().unwrap().as_str(),
            "wss://xyz.supabase.co/realtime/v1/websocket?apikey=anon-key&vsn=1.0.0"
        );
        assert!(RealtimeChannel::new(RealtimeConfig::new("nope", "k")).is_err());
    }

    #[tokio::test]
    async fn changes_become_invalidations_and_close_leaves() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let server = tokio::spawn(async move {
            let (stream, _) = listener.accept().await.unwrap();
            let mut ws = tokio_tungstenite::accept_async(stream).await.unwrap();
            let join = next_frame(&mut ws).await.unwrap();
            assert_eq!(join.event, "phx_join");
            reply(&mut ws, &join, json!({"status": "ok", "response": {}})).await;
            push_change(&mut ws, &join.topic, "follows").await;
            next_frame(&mut ws).await.map(|f| f.event)
        });

        let channel = RealtimeChannel::new(test_config(addr)).unwrap();
        let mut sub = channel
            .subscribe(ChannelTopic::engagement(Category::Resources))
            .await
            .unwrap();
        let signal = tokio::time::timeout(Duration::from_secs(5), sub.recv())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(signal.table, Some(EdgeTable::Follows));

        sub.close();
        let last = tokio::time::timeout(Duration::from_secs(5), server)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(last.as_deref(), Some("phx_leave"));
    }

    #[tokio::test]
    async fn rejoin_after_loss_asks_for_a_resync() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            for _ in 0..2 {
                let (stream, _) = listener.accept().await.unwrap();
                let mut ws = tokio_tungstenite::accept_async(stream).await.unwrap();
                let join = next_frame(&mut ws).await.unwrap();
                reply(&mut ws, &join, json!({"status": "ok", "response": {}})).await;
                // Drop the first connection right after the join.
                let _ = ws.close(None).await;
            }
        });

        let channel = RealtimeChannel::new(test_config(addr)).unwrap();
        let mut sub = channel
            .subscribe(ChannelTopic::engagement(Category::Stream))
            .await
            .unwrap();
        let signal = tokio::time::timeout(Duration::from_secs(5), sub.recv())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(signal, Invalidation { table: None });
    }
}
