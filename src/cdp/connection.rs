//! CDP WebSocket connection implementation
//!
//! One connection per DevTools target. Outgoing commands go through the write half of the
//! socket; a reader task owns the read half and routes responses to their waiters and
//! events to every live subscriber.

use super::traits::{CdpConnection, CdpError as CdpErrorResponse, CdpEvent, CdpResponse};
use super::types::*;
use crate::Error;
use async_trait::async_trait;
use futures::stream::{SplitSink, SplitStream};
use futures::{SinkExt, StreamExt};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpStream;
use tokio::sync::{mpsc, oneshot, Mutex};
use tokio::task::JoinHandle;
use tokio_tungstenite::{connect_async, tungstenite::Message, MaybeTlsStream, WebSocketStream};
use tracing::{debug, error, info, warn};

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;
type PendingMap = Arc<Mutex<HashMap<u64, PendingCommand>>>;
type Subscribers = Arc<Mutex<Vec<mpsc::UnboundedSender<CdpEvent>>>>;

/// Upper bound on how long a command may wait for its response.
///
/// Only domain enables issued while a session is set up are capped. Page work runs under an
/// attempt scope whose deadline bounds every wait, so it gets no cap here.
#[derive(Debug, Clone)]
struct CdpTimeoutConfig {
    setup_timeout: Duration,
}

impl Default for CdpTimeoutConfig {
    fn default() -> Self {
        Self {
            setup_timeout: Duration::from_secs(30),
        }
    }
}

impl CdpTimeoutConfig {
    fn for_method(&self, method: &str) -> Option<Duration> {
        method.ends_with(".enable").then_some(self.setup_timeout)
    }
}

/// Pending command response
#[derive(Debug)]
struct PendingCommand {
    /// Response channel sender
    sender: oneshot::Sender<CdpResponse>,
    /// Command method (for logging)
    method: String,
}

/// Drops a command's waiter when the caller stops waiting before the response arrives
struct PendingGuard {
    id: u64,
    pending_commands: PendingMap,
    armed: bool,
}

impl PendingGuard {
    fn new(id: u64, pending_commands: PendingMap) -> Self {
        Self {
            id,
            pending_commands,
            armed: true,
        }
    }

    fn disarm(&mut self) {
        self.armed = false;
    }
}

impl Drop for PendingGuard {
    fn drop(&mut self) {
        if !self.armed {
            return;
        }
        if let Ok(mut pending) = self.pending_commands.try_lock() {
            pending.remove(&self.id);
            return;
        }
        // The reader holds the map; finish the removal once it lets go
        if let Ok(runtime) = tokio::runtime::Handle::try_current() {
            let pending_commands = Arc::clone(&self.pending_commands);
            let id = self.id;
            runtime.spawn(async move {
                pending_commands.lock().await.remove(&id);
            });
        }
    }
}

/// CDP WebSocket connection implementation
#[derive(Debug)]
pub struct CdpWebSocketConnection {
    /// WebSocket URL
    url: String,
    /// Write half of the socket
    sink: Mutex<Option<SplitSink<WsStream, Message>>>,
    /// Next command ID
    next_id: AtomicU64,
    /// Pending commands (ID -> response sender)
    pending_commands: PendingMap,
    /// Event subscribers
    event_subscribers: Subscribers,
    /// Is connection active
    is_active: Arc<AtomicBool>,
    /// Reader task
    reader: Mutex<Option<JoinHandle<()>>>,
    /// Timeout configuration
    timeout_config: CdpTimeoutConfig,
}

impl CdpWebSocketConnection {
    /// Connect to a DevTools WebSocket endpoint
    ///
    /// # Arguments
    /// * `url` - WebSocket URL (e.g., "ws://localhost:9222/devtools/page/ABC123")
    pub async fn connect<S: Into<String>>(url: S) -> Result<Arc<Self>, Error> {
        let url = url.into();
        info!("Connecting to DevTools endpoint {}", url);

        let (ws_stream, _) = connect_async(url.as_str())
            .await
            .map_err(|e| Error::websocket(format!("Failed to connect: {}", e)))?;
        let (sink, stream) = ws_stream.split();

        let connection = Arc::new(Self {
            url,
            sink: Mutex::new(Some(sink)),
            next_id: AtomicU64::new(1),
            pending_commands: Arc::new(Mutex::new(HashMap::new())),
            event_subscribers: Arc::new(Mutex::new(Vec::new())),
            is_active: Arc::new(AtomicBool::new(true)),
            reader: Mutex::new(None),
            timeout_config: CdpTimeoutConfig::default(),
        });

        let handle = tokio::spawn(Self::read_loop(
            stream,
            Arc::clone(&connection.pending_commands),
            Arc::clone(&connection.event_subscribers),
            Arc::clone(&connection.is_active),
        ));
        *connection.reader.lock().await = Some(handle);

        Ok(connection)
    }

    /// WebSocket URL this connection talks to
    pub fn url(&self) -> &str {
        &self.url
    }

    /// Commands sent and still waiting for a response
    pub async fn pending_commands(&self) -> usize {
        self.pending_commands.lock().await.len()
    }

    /// Event subscriptions whose receiver is still alive
    pub async fn live_subscribers(&self) -> usize {
        self.event_subscribers
            .lock()
            .await
            .iter()
            .filter(|sender| !sender.is_closed())
            .count()
    }

    async fn read_loop(
        mut stream: SplitStream<WsStream>,
        pending_commands: PendingMap,
        event_subscribers: Subscribers,
        is_active: Arc<AtomicBool>,
    ) {
        while let Some(message) = stream.next().await {
            match message {
                Ok(Message::Text(text)) => {
                    Self::handle_message(&text, &pending_commands, &event_subscribers).await;
                }
                Ok(Message::Close(_)) => {
                    debug!("WebSocket close frame received");
                    break;
                }
                Ok(_) => {}
                Err(e) => {
                    warn!("WebSocket read failed: {}", e);
                    break;
                }
            }
        }

        is_active.store(false, Ordering::SeqCst);
        // Dropping the senders wakes every waiter with a closed channel
        pending_commands.lock().await.clear();
        event_subscribers.lock().await.clear();
        debug!("CDP reader task exited");
    }

    async fn handle_message(text: &str, pending_commands: &PendingMap, event_subscribers: &Subscribers) {
        if let Ok(response) = serde_json::from_str::<CdpRpcResponse>(text) {
            Self::handle_response(response, pending_commands).await;
            return;
        }

        if let Ok(notification) = serde_json::from_str::<CdpNotification>(text) {
            Self::handle_notification(notification, event_subscribers).await;
            return;
        }

        warn!("Unknown message format: {}", text);
    }

    async fn handle_response(response: CdpRpcResponse, pending_commands: &PendingMap) {
        let pending = pending_commands.lock().await.remove(&response.id);

        match pending {
            Some(pending_cmd) => {
                debug!("Response for command {}: {}", response.id, pending_cmd.method);
                let cdp_response = CdpResponse {
                    id: response.id,
                    result: Some(response.result),
                    error: response.error.map(|e| CdpErrorResponse {
                        code: e.code,
                        message: e.message,
                        data: e.data,
                    }),
                };
                let _ = pending_cmd.sender.send(cdp_response);
            }
            None => warn!("Received response for unknown command ID: {}", response.id),
        }
    }

    async fn handle_notification(notification: CdpNotification, event_subscribers: &Subscribers) {
        debug!("Received event: {}", notification.method);

        let event = CdpEvent {
            method: notification.method,
            params: notification.params,
            session_id: notification.session_id,
        };

        let mut subscribers = event_subscribers.lock().await;
        subscribers.retain(|sender| sender.send(event.clone()).is_ok());
    }

    async fn send_message(&self, message: Message) -> Result<(), Error> {
        let mut sink_guard = self.sink.lock().await;
        let sink = sink_guard
            .as_mut()
            .ok_or_else(|| Error::websocket("WebSocket stream not available"))?;

        sink.send(message)
            .await
            .map_err(|e| Error::websocket(format!("Failed to send message: {}", e)))
    }
}

#[async_trait]
impl CdpConnection for CdpWebSocketConnection {
    async fn send_command(&self, method: &str, params: serde_json::Value) -> Result<CdpResponse, Error> {
        if !self.is_active() {
            return Err(Error::websocket("Connection is not active"));
        }

        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        let request = CdpRequest {
            id,
            method: method.to_string(),
            params: if params.is_null() { None } else { Some(params) },
            session_id: None,
        };
        let json = serde_json::to_string(&request)?;

        debug!("Sending CDP command {}: {}", id, method);

        let (sender, receiver) = oneshot::channel();
        self.pending_commands.lock().await.insert(
            id,
            PendingCommand {
                sender,
                method: method.to_string(),
            },
        );
        let mut guard = PendingGuard::new(id, Arc::clone(&self.pending_commands));

        self.send_message(Message::Text(json)).await?;

        let received = match self.timeout_config.for_method(method) {
            Some(limit) => tokio::time::timeout(limit, receiver)
                .await
                .map_err(|_| Error::cdp(format!("Command {} ({}) got no response within {:?}", id, method, limit)))?,
            None => receiver.await,
        };
        guard.disarm();

        let response =
            received.map_err(|_| Error::websocket(format!("Connection closed while waiting for {}", method)))?;
        if let Some(error) = &response.error {
            return Err(Error::cdp(format!(
                "{}: {} (code: {})",
                method, error.message, error.code
            )));
        }
        Ok(response)
    }

    async fn listen_events(&self) -> Result<mpsc::Receiver<CdpEvent>, Error> {
        let (sender, receiver) = mpsc::channel(100);
        let (unbounded_sender, mut unbounded_receiver) = mpsc::unbounded_channel();

        {
            let mut subscribers = self.event_subscribers.lock().await;
            subscribers.retain(|s| !s.is_closed());
            subscribers.push(unbounded_sender);
        }

        // Forward events to bounded channel until the receiver goes away
        tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = sender.closed() => break,
                    event = unbounded_receiver.recv() => match event {
                        Some(event) => {
                            if sender.send(event).await.is_err() {
                                break;
                            }
                        }
                        None => break,
                    },
                }
            }
        });

        Ok(receiver)
    }

    async fn close(&self) -> Result<(), Error> {
        if !self.is_active.swap(false, Ordering::SeqCst) {
            return Ok(());
        }
        let pending = self.pending_commands().await;
        let subscribers = self.live_subscribers().await;
        info!(
            pending = pending,
            subscribers = subscribers,
            "Closing CDP connection to {}",
            self.url
        );

        if let Some(mut sink) = self.sink.lock().await.take() {
            if let Err(e) = sink.close().await {
                error!("Failed to close WebSocket: {}", e);
            }
        }
        if let Some(reader) = self.reader.lock().await.take() {
            reader.abort();
        }
        self.pending_commands.lock().await.clear();
        self.event_subscribers.lock().await.clear();

        Ok(())
    }

    fn is_active(&self) -> bool {
        self.is_active.load(Ordering::SeqCst)
    }
}
