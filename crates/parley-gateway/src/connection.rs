use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use axum::extract::ws::{Message, WebSocket};
use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use tracing::{debug, info, warn};
use uuid::Uuid;

use parley_db::Database;
use parley_types::api::Claims;
use parley_types::events::{GatewayCommand, GatewayEvent};

use crate::auth::{AuthError, TokenValidator};
use crate::presence::{ConnectionHandle, Outbound, PresenceRegistry};

/// Heartbeat interval: server sends a Ping every 15 seconds.
/// If 2 consecutive Pongs are missed (~30s), the connection is dropped.
const HEARTBEAT_INTERVAL: Duration = Duration::from_secs(15);

/// How long a fresh socket may take to send its Identify frame.
const IDENTIFY_TIMEOUT: Duration = Duration::from_secs(10);

/// Lifecycle of one gateway connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Connecting,
    Authenticated,
    Active,
    Closed,
}

impl ConnectionState {
    /// Apply a transition. Anything not on the happy path collapses to Closed.
    pub fn advance(self, next: ConnectionState) -> ConnectionState {
        use ConnectionState::*;
        match (self, next) {
            (Connecting, Authenticated) => Authenticated,
            (Authenticated, Active) => Active,
            _ => Closed,
        }
    }
}

/// Everything a connection needs from the rest of the server.
#[derive(Clone)]
pub struct GatewayContext {
    pub presence: PresenceRegistry,
    pub validator: TokenValidator,
    pub db: Arc<Database>,
}

type WsSink = SplitSink<WebSocket, Message>;
type WsStream = SplitStream<WebSocket>;

/// Drive one WebSocket from handshake to close.
pub async fn handle_connection(socket: WebSocket, ctx: GatewayContext) {
    let (mut sender, mut receiver) = socket.split();
    let mut state = ConnectionState::Connecting;

    // Step 1: Identify handshake. No shared state is touched until it passes.
    let claims = match wait_for_identify(&mut receiver, &ctx.validator).await {
        Ok(claims) => claims,
        Err(e) => {
            state = state.advance(ConnectionState::Closed);
            warn!("Gateway handshake rejected: {} ({:?})", e, state);
            let _ = sender.send(Message::Close(None)).await;
            return;
        }
    };
    state = state.advance(ConnectionState::Authenticated);

    let user_id = claims.sub;
    let username = claims.username.clone();
    info!("{} ({}) connected to gateway", username, user_id);

    // Step 2: Ready + directory entry
    if send_event(&mut sender, &GatewayEvent::Ready { user_id }).await.is_err() {
        return;
    }
    record_user(&ctx.db, &claims).await;

    // Step 3: take over presence for this user
    let (handle, outbound_rx) = ConnectionHandle::new();
    if let Some(previous) = ctx.presence.register(user_id, handle.clone()).await {
        info!("{} ({}) reconnected, closing conn {}", username, user_id, previous.conn_id());
        previous.close();
    }
    state = state.advance(ConnectionState::Active);
    debug!("{} ({}) conn {} is {:?}", username, user_id, handle.conn_id(), state);

    run_connection_loop(sender, receiver, outbound_rx, user_id, &username).await;

    ctx.presence.deregister(user_id, &handle).await;
    state = state.advance(ConnectionState::Closed);
    info!("{} ({}) disconnected from gateway ({:?})", username, user_id, state);
}

/// Parse and validate a handshake frame.
pub fn authenticate_frame(text: &str, validator: &TokenValidator) -> Result<Claims, AuthError> {
    match serde_json::from_str::<GatewayCommand>(text) {
        Ok(GatewayCommand::Identify { token }) => validator.validate(&token),
        _ => Err(AuthError::MissingToken),
    }
}

/// At most `max_chars` characters of `text`, cut on a char boundary.
fn preview(text: &str, max_chars: usize) -> &str {
    text.char_indices()
        .nth(max_chars)
        .map_or(text, |(i, _)| &text[..i])
}

async fn wait_for_identify(
    receiver: &mut WsStream,
    validator: &TokenValidator,
) -> Result<Claims, AuthError> {
    let first_text = tokio::time::timeout(IDENTIFY_TIMEOUT, async {
        while let Some(Ok(msg)) = receiver.next().await {
            match msg {
                Message::Text(text) => return Some(text),
                Message::Close(_) => return None,
                // Pings before Identify are answered by axum
                _ => continue,
            }
        }
        None
    })
    .await
    .map_err(|_| AuthError::Timeout)?
    .ok_or(AuthError::MissingToken)?;

    authenticate_frame(&first_text, validator)
}

async fn record_user(db: &Arc<Database>, claims: &Claims) {
    let db = db.clone();
    let id = claims.sub.to_string();
    let username = claims.username.clone();
    let result = tokio::task::spawn_blocking(move || db.upsert_user(&id, &username)).await;
    match result {
        Ok(Ok(())) => {}
        Ok(Err(e)) => warn!("Failed to record user {}: {}", claims.sub, e),
        Err(e) => warn!("spawn_blocking join error: {}", e),
    }
}

async fn send_event(sender: &mut WsSink, event: &GatewayEvent) -> Result<(), ()> {
    let text = serde_json::to_string(event).map_err(|e| warn!("Failed to encode event: {}", e))?;
    sender.send(Message::Text(text.into())).await.map_err(|_| ())
}

async fn run_connection_loop(
    mut sender: WsSink,
    mut receiver: WsStream,
    mut outbound_rx: tokio::sync::mpsc::UnboundedReceiver<Outbound>,
    user_id: Uuid,
    username: &str,
) {
    let pong_received = Arc::new(AtomicBool::new(true));
    let pong_flag_send = pong_received.clone();
    let pong_flag_recv = pong_received.clone();

    // Forward queued events -> client, with heartbeat
    let mut send_task = tokio::spawn(async move {
        let mut heartbeat = tokio::time::interval(HEARTBEAT_INTERVAL);
        heartbeat.tick().await;
        let mut missed_heartbeats: u8 = 0;

        loop {
            tokio::select! {
                msg = outbound_rx.recv() => {
                    match msg {
                        Some(Outbound::Event(event)) => {
                            if send_event(&mut sender, &event).await.is_err() {
                                break;
                            }
                        }
                        Some(Outbound::Close) | None => {
                            let _ = sender.send(Message::Close(None)).await;
                            break;
                        }
                    }
                }
                _ = heartbeat.tick() => {
                    if pong_flag_send.swap(false, Ordering::Acquire) {
                        missed_heartbeats = 0;
                    } else {
                        missed_heartbeats += 1;
                        if missed_heartbeats >= 2 {
                            warn!("Heartbeat timeout (missed {} pongs), dropping connection", missed_heartbeats);
                            break;
                        }
                    }
                    if sender.send(Message::Ping(Vec::new().into())).await.is_err() {
                        break;
                    }
                }
            }
        }
    });

    // Read commands from client
    let username_recv = username.to_string();
    let mut recv_task = tokio::spawn(async move {
        while let Some(Ok(msg)) = receiver.next().await {
            match msg {
                Message::Text(text) => match serde_json::from_str::<GatewayCommand>(&text) {
                    Ok(GatewayCommand::Disconnect) => {
                        info!("{} ({}) requested disconnect", username_recv, user_id);
                        break;
                    }
                    Ok(GatewayCommand::Identify { .. }) => {} // Already handled
                    Err(e) => {
                        warn!(
                            "{} ({}) bad command: {} -- raw: {}",
                            username_recv,
                            user_id,
                            e,
                            preview(&text, 200)
                        );
                    }
                },
                Message::Pong(_) => {
                    pong_flag_recv.store(true, Ordering::Release);
                }
                Message::Close(_) => break,
                _ => {}
            }
        }
    });

    // Wait for either task to finish
    tokio::select! {
        _ = &mut send_task => recv_task.abort(),
        _ = &mut recv_task => send_task.abort(),
    }
}
