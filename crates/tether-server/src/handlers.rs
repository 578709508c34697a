//! Connection handlers for the Tether server.
//!
//! This module handles the connection lifecycle: credential handshake,
//! registration, event dispatch, and cleanup on disconnect.

use crate::config::Config;
use crate::metrics::{self, ConnectionMetricsGuard};
use anyhow::Result;
use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        State,
    },
    response::IntoResponse,
    routing::get,
    Router,
};
use bytes::BytesMut;
use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tether_core::{
    Authenticator, ChannelKey, ConnectionId, Envelope, Hub, MessagePipeline, UserRecord,
};
use tether_protocol::{codec, ClientEvent, ServerEvent};
use tokio::net::TcpListener;
use tokio::sync::{broadcast, mpsc};
use tracing::{debug, error, info, warn};

type WsSender = SplitSink<WebSocket, Message>;
type WsReceiver = SplitStream<WebSocket>;

/// Shared server state.
pub struct AppState {
    /// The connection hub.
    pub hub: Arc<Hub>,
    /// Session authenticator.
    pub authenticator: Authenticator,
    /// Message pipeline.
    pub pipeline: MessagePipeline,
    /// Server configuration.
    pub config: Config,
}

/// Run the HTTP/WebSocket server.
///
/// # Errors
///
/// Returns an error if the server fails to start.
pub async fn run_server(state: Arc<AppState>) -> Result<()> {
    // Start metrics server if enabled
    if state.config.metrics.enabled {
        if let Err(e) = metrics::start_metrics_server(state.config.metrics.port) {
            error!("Failed to start metrics server: {}", e);
        }
    }

    // Build router
    let app = Router::new()
        .route(&state.config.websocket_path, get(ws_handler))
        .route("/health", get(health_handler))
        .with_state(state.clone());

    // Bind and serve
    let addr = state.config.bind_addr();
    let listener = TcpListener::bind(addr).await?;

    info!("Tether server listening on {}", addr);
    info!(
        "WebSocket endpoint: ws://{}{}",
        addr, state.config.websocket_path
    );

    axum::serve(listener, app).await?;

    Ok(())
}

/// Health check handler.
async fn health_handler() -> impl IntoResponse {
    axum::Json(serde_json::json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION")
    }))
}

/// WebSocket upgrade handler.
async fn ws_handler(ws: WebSocketUpgrade, State(state): State<Arc<AppState>>) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_socket(socket, state))
}

/// Handle a WebSocket connection.
async fn handle_socket(socket: WebSocket, state: Arc<AppState>) {
    // Split the WebSocket
    let (mut sender, mut receiver) = socket.split();

    // The credential must arrive before anything else happens; a refused
    // connection never touches the hub.
    let user = match authenticate_socket(&mut sender, &mut receiver, &state).await {
        Some(user) => user,
        None => return,
    };

    // Record connection metrics
    let _metrics_guard = ConnectionMetricsGuard::new();

    let connection_id = ConnectionId::generate();
    debug!(connection = %connection_id, user = user.id, "Connection admitted");

    // Register presence and the private notification channel
    let private_rx = state.hub.register(&connection_id, user.id);

    let hello = ServerEvent::Authenticated {
        connection_id: connection_id.to_string(),
        user_id: user.id,
        username: user.username.clone(),
        heartbeat_ms: state.config.heartbeat.interval_ms as u32,
    };
    if send_event(&mut sender, &hello).await.is_err() {
        error!(connection = %connection_id, "Failed to send Authenticated event");
        state.hub.deregister(&connection_id);
        return;
    }

    // Read buffer for partial frames
    let mut read_buffer = BytesMut::with_capacity(4096);

    // Track forwarder task handles for cleanup
    let mut forward_tasks: HashMap<ChannelKey, tokio::task::JoinHandle<()>> = HashMap::new();

    // Merge all channel subscriptions into one stream
    let (sub_tx, mut sub_rx) = mpsc::unbounded_channel::<Arc<Envelope>>();
    forward_tasks.insert(
        ChannelKey::User(user.id),
        spawn_forwarder(private_rx, sub_tx.clone()),
    );

    // Event processing loop
    loop {
        tokio::select! {
            biased;

            // Deliver events from subscribed channels (via mpsc)
            Some(envelope) = sub_rx.recv() => {
                if !envelope.delivers_to(&connection_id) {
                    continue;
                }
                match codec::encode(&envelope.event) {
                    Ok(data) => {
                        metrics::record_message(data.len(), "outbound");
                        if sender.send(Message::Binary(data.to_vec())).await.is_err() {
                            break;
                        }
                    }
                    Err(e) => {
                        error!(connection = %connection_id, error = %e, "Failed to encode outbound event");
                    }
                }
            }

            // Receive from WebSocket
            msg = receiver.next() => {
                match msg {
                    Some(Ok(Message::Binary(data))) => {
                        let start = Instant::now();
                        read_buffer.extend_from_slice(&data);

                        // Try to decode events
                        loop {
                            match codec::decode_from::<ClientEvent>(&mut read_buffer) {
                                Ok(Some(event)) => {
                                    metrics::record_message(data.len(), "inbound");

                                    if let Err(e) = handle_event(
                                        event,
                                        &connection_id,
                                        &user,
                                        &state,
                                        &mut sender,
                                        &mut forward_tasks,
                                        &sub_tx,
                                    ).await {
                                        error!(connection = %connection_id, error = %e, "Event handling error");
                                        break;
                                    }
                                }
                                Ok(None) => break,
                                Err(e) => {
                                    warn!(connection = %connection_id, error = %e, "Undecodable event");
                                    metrics::record_error("protocol");
                                    read_buffer.clear();
                                    break;
                                }
                            }
                        }

                        metrics::record_latency(start.elapsed().as_secs_f64());
                    }
                    Some(Ok(Message::Text(text))) => {
                        // Treat text as binary
                        read_buffer.extend_from_slice(text.as_bytes());
                    }
                    Some(Ok(Message::Ping(data))) => {
                        if sender.send(Message::Pong(data)).await.is_err() {
                            break;
                        }
                    }
                    Some(Ok(Message::Pong(_))) => {
                        // Ignore pongs
                    }
                    Some(Ok(Message::Close(_))) => {
                        debug!(connection = %connection_id, "Received close frame");
                        break;
                    }
                    Some(Err(e)) => {
                        warn!(connection = %connection_id, error = %e, "WebSocket error");
                        metrics::record_error("websocket");
                        break;
                    }
                    None => {
                        debug!(connection = %connection_id, "WebSocket stream ended");
                        break;
                    }
                }
            }
        }
    }

    // Cleanup: abort all forwarder tasks
    for (_, handle) in forward_tasks {
        handle.abort();
    }

    // Cleanup: leave every channel and the presence registry
    state.hub.deregister(&connection_id);
    metrics::set_active_channels(state.hub.stats().channel_count);

    debug!(connection = %connection_id, "WebSocket disconnected");
}

/// Wait for the opening `Authenticate` event and resolve it to a user.
///
/// Returns `None` if the handshake times out, the first event is not an
/// authentication request, or the credential is rejected. The client sees
/// only a generic error before the socket closes.
async fn authenticate_socket(
    sender: &mut WsSender,
    receiver: &mut WsReceiver,
    state: &Arc<AppState>,
) -> Option<UserRecord> {
    let deadline = Duration::from_millis(state.config.auth.handshake_timeout_ms);
    let mut read_buffer = BytesMut::with_capacity(1024);

    let first_event = tokio::time::timeout(deadline, async {
        loop {
            let msg = receiver.next().await?;
            let data = match msg {
                Ok(Message::Binary(data)) => data,
                Ok(Message::Text(text)) => text.into_bytes(),
                Ok(Message::Ping(_)) | Ok(Message::Pong(_)) => continue,
                _ => return None,
            };

            read_buffer.extend_from_slice(&data);
            match codec::decode_from::<ClientEvent>(&mut read_buffer) {
                Ok(Some(event)) => return Some(event),
                Ok(None) => continue,
                Err(_) => return None,
            }
        }
    })
    .await;

    let event = match first_event {
        Ok(Some(event)) => event,
        Ok(None) => return None,
        Err(_) => {
            debug!("Authentication handshake timed out");
            refuse(sender).await;
            return None;
        }
    };

    let token = match event {
        ClientEvent::Authenticate { token } => token,
        other => {
            warn!(event = ?other, "First event was not an authentication request");
            refuse(sender).await;
            return None;
        }
    };

    match state.authenticator.authenticate(&token).await {
        Ok(user) => Some(user),
        Err(err) => {
            warn!(error = %err, "Connection refused");
            metrics::record_error("authentication");
            refuse(sender).await;
            None
        }
    }
}

/// Send the generic authentication error and close the socket.
async fn refuse(sender: &mut WsSender) {
    let event = ServerEvent::error("authentication error");
    if let Ok(data) = codec::encode(&event) {
        let _ = sender.send(Message::Binary(data.to_vec())).await;
    }
    let _ = sender.close().await;
}

/// Forward events from a channel subscription into the connection's
/// outbound queue.
fn spawn_forwarder(
    mut rx: broadcast::Receiver<Arc<Envelope>>,
    tx: mpsc::UnboundedSender<Arc<Envelope>>,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        loop {
            match rx.recv().await {
                Ok(envelope) => {
                    if tx.send(envelope).is_err() {
                        break; // Receiver dropped
                    }
                }
                Err(broadcast::error::RecvError::Closed) => break,
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    warn!(skipped, "Slow subscriber, dropping events");
                    continue;
                }
            }
        }
    })
}

/// Handle a decoded client event.
async fn handle_event(
    event: ClientEvent,
    connection_id: &ConnectionId,
    user: &UserRecord,
    state: &Arc<AppState>,
    sender: &mut WsSender,
    forward_tasks: &mut HashMap<ChannelKey, tokio::task::JoinHandle<()>>,
    sub_tx: &mpsc::UnboundedSender<Arc<Envelope>>,
) -> Result<()> {
    match event {
        ClientEvent::Authenticate { .. } => {
            debug!(connection = %connection_id, "Authenticate on established connection, ignoring");
        }

        ClientEvent::JoinConversation { conversation_id } => {
            debug!(connection = %connection_id, conversation = conversation_id, "Join request");

            match state.pipeline.join(connection_id, user.id, conversation_id).await {
                Ok(Some(rx)) => {
                    forward_tasks.insert(
                        ChannelKey::Conversation(conversation_id),
                        spawn_forwarder(rx, sub_tx.clone()),
                    );
                    metrics::record_join();
                    metrics::set_active_channels(state.hub.stats().channel_count);
                }
                Ok(None) => {
                    debug!(connection = %connection_id, conversation = conversation_id, "Already joined");
                }
                Err(e) => {
                    // Refused joins get no reply; the log is the only trace.
                    warn!(connection = %connection_id, conversation = conversation_id, error = %e, "Join refused");
                }
            }
        }

        ClientEvent::SendMessage {
            conversation_id,
            content,
        } => {
            if let Err(e) = state
                .pipeline
                .send(connection_id, user, conversation_id, &content)
                .await
            {
                warn!(connection = %connection_id, conversation = conversation_id, error = %e, "Send rejected");
                metrics::record_error("send");
                send_event(sender, &ServerEvent::error(e.to_string())).await?;
            }
        }

        ClientEvent::TypingStart { conversation_id } => {
            state.pipeline.typing(connection_id, user, conversation_id, true);
        }

        ClientEvent::TypingStop { conversation_id } => {
            state.pipeline.typing(connection_id, user, conversation_id, false);
        }

        ClientEvent::MarkMessagesRead { conversation_id } => {
            if let Err(e) = state
                .pipeline
                .mark_read(connection_id, user, conversation_id)
                .await
            {
                warn!(connection = %connection_id, conversation = conversation_id, error = %e, "Mark read rejected");
                metrics::record_error("mark_read");
                send_event(sender, &ServerEvent::error(e.to_string())).await?;
            }
        }
    }

    Ok(())
}

/// Send an event to the WebSocket.
async fn send_event(sender: &mut WsSender, event: &ServerEvent) -> Result<()> {
    let data = codec::encode(event)?;
    metrics::record_message(data.len(), "outbound");
    sender.send(Message::Binary(data.to_vec())).await?;
    Ok(())
}
