//! Realtime Channel Client
//!
//! Opens one websocket per subscription, joins a postgres-changes channel
//! and forwards matching row changes to the subscriber. Implements
//! [`ChangeFeed`].

use async_trait::async_trait;
use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use std::collections::HashMap;
use std::time::Duration;
use tokio::net::TcpStream;
use tokio::sync::{mpsc, oneshot, Mutex};
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};

use super::messages::{InboundMessage, PhoenixMessage};
use crate::backend::{
    BackendError, BackendResult, ChangeEvent, ChangeFeed, ChangeFilter, Subscription,
    SubscriptionHandle,
};

type Socket = WebSocketStream<MaybeTlsStream<TcpStream>>;
type SocketSink = SplitSink<Socket, Message>;
type SocketStream = SplitStream<Socket>;

const JOIN_REF: &str = "1";

/// Configuration for the realtime client
#[derive(Debug, Clone)]
pub struct RealtimeConfig {
    /// Project URL; `http(s)` is rewritten to `ws(s)`
    pub base_url: String,
    /// Public anon key, sent as a query parameter
    pub anon_key: String,
    /// Channel name; the topic is `realtime:<channel>`
    pub channel: String,
    pub heartbeat_interval: Duration,
    /// How long to wait for the join reply
    pub join_timeout: Duration,
}

impl Default for RealtimeConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:54321".to_string(),
            anon_key: String::new(),
            channel: "bookmarks-channel".to_string(),
            heartbeat_interval: Duration::from_secs(30),
            join_timeout: Duration::from_secs(10),
        }
    }
}

impl RealtimeConfig {
    /// Websocket endpoint derived from the project URL
    pub fn socket_url(&self) -> String {
        let base = self
            .base_url
            .trim_end_matches('/')
            .replacen("https://", "wss://", 1)
            .replacen("http://", "ws://", 1);

        format!(
            "{}/realtime/v1/websocket?apikey={}&vsn=1.0.0",
            base,
            urlencoding::encode(&self.anon_key)
        )
    }

    pub fn topic(&self) -> String {
        format!("realtime:{}", self.channel)
    }
}

/// A running channel task
struct ChannelTask {
    leave_tx: oneshot::Sender<()>,
    task: JoinHandle<()>,
}

/// Change feed backed by the realtime websocket
pub struct RealtimeClient {
    config: RealtimeConfig,
    access_token: Option<String>,
    channels: Mutex<HashMap<SubscriptionHandle, ChannelTask>>,
}

impl RealtimeClient {
    pub fn new(config: RealtimeConfig, access_token: Option<String>) -> Self {
        Self {
            config,
            access_token,
            channels: Mutex::new(HashMap::new()),
        }
    }

    pub fn config(&self) -> &RealtimeConfig {
        &self.config
    }

    /// Number of channels currently open
    pub async fn open_channels(&self) -> usize {
        self.channels.lock().await.len()
    }

    /// Wait for the reply to our join
    async fn await_join(stream: &mut SocketStream) -> BackendResult<()> {
        while let Some(frame) = stream.next().await {
            let text = match frame? {
                Message::Text(text) => text,
                Message::Close(_) => return Err(BackendError::Closed),
                _ => continue,
            };

            match InboundMessage::decode(&text) {
                Ok(InboundMessage::Reply {
                    reference, ok, response, ..
                }) if reference.as_deref() == Some(JOIN_REF) => {
                    return if ok {
                        Ok(())
                    } else {
                        Err(BackendError::Realtime(format!("join rejected: {}", response)))
                    };
                }
                Ok(_) => continue,
                Err(e) => {
                    tracing::debug!(error = %e, "Ignoring undecodable realtime frame");
                }
            }
        }

        Err(BackendError::Closed)
    }
}

#[async_trait]
impl ChangeFeed for RealtimeClient {
    async fn subscribe(&self, filter: ChangeFilter) -> BackendResult<Subscription> {
        let url = self.config.socket_url();
        let topic = self.config.topic();

        let (socket, _) = tokio_tungstenite::connect_async(url.as_str()).await?;
        let (mut sink, mut stream) = socket.split();

        let join = PhoenixMessage::join(&topic, &filter, self.access_token.as_deref(), JOIN_REF);
        sink.send(Message::Text(serde_json::to_string(&join)?))
            .await?;

        tokio::time::timeout(self.config.join_timeout, Self::await_join(&mut stream))
            .await
            .map_err(|_| BackendError::Timeout)??;

        let handle = SubscriptionHandle::generate();
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        let (leave_tx, leave_rx) = oneshot::channel();

        tracing::info!(
            subscription = %handle,
            topic = %topic,
            table = %filter.table,
            "Realtime channel joined"
        );

        let task = tokio::spawn(run_channel(
            sink,
            stream,
            topic,
            filter,
            events_tx,
            leave_rx,
            self.config.heartbeat_interval,
        ));

        self.channels
            .lock()
            .await
            .insert(handle.clone(), ChannelTask { leave_tx, task });

        Ok(Subscription {
            handle,
            events: events_rx,
        })
    }

    async fn unsubscribe(&self, handle: SubscriptionHandle) -> BackendResult<()> {
        let channel = self
            .channels
            .lock()
            .await
            .remove(&handle)
            .ok_or(BackendError::Closed)?;

        // The task may already have exited on its own
        let _ = channel.leave_tx.send(());

        let mut task = channel.task;
        if tokio::time::timeout(Duration::from_secs(2), &mut task)
            .await
            .is_err()
        {
            task.abort();
        }

        tracing::info!(subscription = %handle, "Realtime channel left");
        Ok(())
    }
}

impl Drop for RealtimeClient {
    fn drop(&mut self) {
        for (_, channel) in self.channels.get_mut().drain() {
            channel.task.abort();
        }
    }
}

/// Pump one channel until it is left or the socket dies
async fn run_channel(
    mut sink: SocketSink,
    mut stream: SocketStream,
    topic: String,
    filter: ChangeFilter,
    events: mpsc::UnboundedSender<ChangeEvent>,
    mut leave_rx: oneshot::Receiver<()>,
    heartbeat_interval: Duration,
) {
    let mut heartbeat = tokio::time::interval(heartbeat_interval);
    // Skip the first immediate tick
    heartbeat.tick().await;

    let mut next_ref: u64 = 2;

    loop {
        tokio::select! {
            _ = &mut leave_rx => {
                let leave = PhoenixMessage::leave(&topic, &next_ref.to_string());
                if let Ok(text) = serde_json::to_string(&leave) {
                    let _ = sink.send(Message::Text(text)).await;
                }
                let _ = sink.close().await;
                break;
            }

            _ = heartbeat.tick() => {
                let beat = PhoenixMessage::heartbeat(&next_ref.to_string());
                next_ref += 1;

                let sent = match serde_json::to_string(&beat) {
                    Ok(text) => sink.send(Message::Text(text)).await,
                    Err(_) => continue,
                };
                if let Err(e) = sent {
                    tracing::warn!(topic = %topic, error = %e, "Realtime heartbeat failed");
                    break;
                }
            }

            frame = stream.next() => {
                let text = match frame {
                    Some(Ok(Message::Text(text))) => text,
                    Some(Ok(Message::Close(_))) | None => {
                        tracing::warn!(topic = %topic, "Realtime socket closed");
                        break;
                    }
                    Some(Ok(_)) => continue,
                    Some(Err(e)) => {
                        tracing::warn!(topic = %topic, error = %e, "Realtime socket error");
                        break;
                    }
                };

                match InboundMessage::decode(&text) {
                    Ok(InboundMessage::Change(event)) => {
                        if !filter.matches(&event) {
                            continue;
                        }
                        tracing::trace!(topic = %topic, kind = ?event.kind, "Row change");
                        if events.send(event).is_err() {
                            // Subscriber went away
                            break;
                        }
                    }
                    Ok(InboundMessage::ChannelError { .. }) | Ok(InboundMessage::ChannelClosed { .. }) => {
                        tracing::warn!(topic = %topic, "Realtime channel closed by server");
                        break;
                    }
                    Ok(InboundMessage::System { status, message }) => {
                        if status == "ok" {
                            tracing::debug!(topic = %topic, message = %message, "Realtime system event");
                        } else {
                            tracing::warn!(topic = %topic, status = %status, message = %message, "Realtime system error");
                        }
                    }
                    Ok(_) => {}
                    Err(e) => {
                        tracing::debug!(error = %e, "Ignoring undecodable realtime frame");
                    }
                }
            }
        }
    }
}
