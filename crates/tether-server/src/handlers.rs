//! Connection handlers for the tether server.
//!
//! This module handles the HTTP routes, the WebSocket connection
//! lifecycle, and inbound event dispatch into the hub.

use crate::config::Config;
use crate::metrics::{self, ConnectionMetricsGuard};
use crate::session::SessionStore;
use anyhow::Result;
use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        State,
    },
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use futures_util::{
    stream::{SplitSink, SplitStream},
    SinkExt, StreamExt,
};
use serde::Deserialize;
use std::sync::Arc;
use std::time::Instant;
use tether_core::{Authenticator, ClientHandle, Hub, SessionIdentity, UserId};
use tether_protocol::{codec, ClientEvent, ServerEvent};
use tokio::net::TcpListener;
use tracing::{debug, error, info, warn};

/// Shared server state.
pub struct AppState {
    /// The routing hub.
    pub hub: Hub,
    /// The credential/session store.
    pub sessions: SessionStore,
    /// Server configuration.
    pub config: Config,
}

impl AppState {
    /// Create new app state.
    #[must_use]
    pub fn new(config: Config) -> Self {
        Self {
            hub: Hub::new(),
            sessions: SessionStore::new(config.session_ttl()),
            config,
        }
    }
}

/// Run the HTTP/WebSocket server.
///
/// # Errors
///
/// Returns an error if the server fails to start.
pub async fn run_server(config: Config) -> Result<()> {
    let state = Arc::new(AppState::new(config.clone()));

    // Start metrics server if enabled
    if config.metrics.enabled {
        if let Err(e) = metrics::start_metrics_server(config.metrics.port) {
            error!("Failed to start metrics server: {}", e);
        }
    }

    // Build router
    let app = Router::new()
        .route(&config.transport.websocket_path, get(ws_handler))
        .route("/api/register", post(register_handler))
        .route("/api/login", post(login_handler))
        .route("/api/logout", post(logout_handler))
        .route("/api/validate-session", post(validate_session_handler))
        .route("/api/health", get(health_handler))
        .with_state(state);

    // Bind and serve
    let addr = config.bind_addr()?;
    let listener = TcpListener::bind(addr).await?;

    info!("tether server listening on {}", addr);
    info!(
        "WebSocket endpoint: ws://{}{}",
        addr, config.transport.websocket_path
    );

    axum::serve(listener, app).await?;

    Ok(())
}

#[derive(Debug, Deserialize)]
struct CredentialsRequest {
    username: String,
    password: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SessionRequest {
    session_id: String,
}

/// Health check handler.
async fn health_handler() -> impl IntoResponse {
    Json(serde_json::json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION")
    }))
}

/// Create a new user account.
async fn register_handler(
    State(state): State<Arc<AppState>>,
    Json(req): Json<CredentialsRequest>,
) -> impl IntoResponse {
    match state.sessions.register(&req.username, &req.password) {
        Ok(()) => (
            StatusCode::CREATED,
            Json(serde_json::json!({
                "success": true,
                "message": "User registered successfully"
            })),
        ),
        Err(e) => (
            StatusCode::BAD_REQUEST,
            Json(serde_json::json!({ "success": false, "error": e.to_string() })),
        ),
    }
}

/// Verify credentials and issue a session token.
async fn login_handler(
    State(state): State<Arc<AppState>>,
    Json(req): Json<CredentialsRequest>,
) -> impl IntoResponse {
    match state.sessions.login(&req.username, &req.password) {
        Ok(session) => (
            StatusCode::OK,
            Json(serde_json::json!({
                "success": true,
                "sessionId": session.token,
                "username": session.username
            })),
        ),
        Err(e) => (
            StatusCode::UNAUTHORIZED,
            Json(serde_json::json!({ "success": false, "error": e.to_string() })),
        ),
    }
}

/// Discard a session token.
async fn logout_handler(
    State(state): State<Arc<AppState>>,
    Json(req): Json<SessionRequest>,
) -> impl IntoResponse {
    state.sessions.logout(&req.session_id);
    Json(serde_json::json!({ "success": true }))
}

/// Validate a session token without opening a connection.
async fn validate_session_handler(
    State(state): State<Arc<AppState>>,
    Json(req): Json<SessionRequest>,
) -> impl IntoResponse {
    match state.sessions.validate(&req.session_id).await {
        Ok(identity) => (
            StatusCode::OK,
            Json(serde_json::json!({
                "success": true,
                "userId": identity.user_id.as_str(),
                "username": identity.display_name
            })),
        ),
        Err(e) => (
            StatusCode::UNAUTHORIZED,
            Json(serde_json::json!({ "success": false, "error": e.to_string() })),
        ),
    }
}

/// WebSocket upgrade handler.
async fn ws_handler(ws: WebSocketUpgrade, State(state): State<Arc<AppState>>) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_websocket(socket, state))
}

/// Handle a WebSocket connection.
async fn handle_websocket(socket: WebSocket, state: Arc<AppState>) {
    // Record connection metrics
    let _metrics_guard = ConnectionMetricsGuard::new();

    // Split the WebSocket
    let (mut sender, mut receiver) = socket.split();

    // The first event must be a register carrying a valid session token;
    // anything else closes the transport.
    let Some((identity, token)) = authenticate(&mut sender, &mut receiver, &state).await else {
        return;
    };

    let SessionIdentity {
        user_id,
        display_name,
    } = identity;

    debug!(user = %user_id, "WebSocket authenticated");

    // All pushes flow through one queue so per-connection ordering holds:
    // authSuccess first, then the snapshots that bind() queues.
    let (handle, mut outbound) = ClientHandle::channel();
    let reply = handle.clone();
    let _ = reply.push(ServerEvent::auth_success(
        user_id.as_str(),
        display_name.clone(),
    ));
    let epoch = state.hub.bind(user_id.clone(), display_name, token, handle);

    // Event loop
    loop {
        tokio::select! {
            biased;

            // Forward hub pushes to the WebSocket client
            event = outbound.recv() => {
                let Some(event) = event else { break };
                match codec::encode(&event) {
                    Ok(text) => {
                        metrics::record_event(text.len(), "outbound");
                        if sender.send(Message::Text(text)).await.is_err() {
                            break;
                        }
                    }
                    Err(e) => {
                        error!(user = %user_id, error = %e, "Failed to encode event");
                    }
                }
            }

            // Receive from WebSocket
            msg = receiver.next() => {
                match msg {
                    Some(Ok(Message::Text(text))) => {
                        if text.len() > state.config.limits.max_event_size {
                            warn!(user = %user_id, size = text.len(), "Dropping oversized event");
                            metrics::record_error("oversized");
                            continue;
                        }

                        let start = Instant::now();
                        metrics::record_event(text.len(), "inbound");

                        match codec::decode(&text) {
                            Ok(event) => dispatch_event(&state, &user_id, &reply, event),
                            Err(e) => {
                                warn!(user = %user_id, error = %e, "Undecodable event");
                                metrics::record_error("decode");
                            }
                        }

                        metrics::record_latency(start.elapsed().as_secs_f64());
                    }
                    Some(Ok(Message::Ping(data))) => {
                        if sender.send(Message::Pong(data)).await.is_err() {
                            break;
                        }
                    }
                    Some(Ok(Message::Pong(_))) => {
                        // Ignore pongs
                    }
                    Some(Ok(Message::Binary(_))) => {
                        warn!(user = %user_id, "Ignoring binary frame");
                    }
                    Some(Ok(Message::Close(_))) => {
                        debug!(user = %user_id, "Received close frame");
                        break;
                    }
                    Some(Err(e)) => {
                        warn!(user = %user_id, error = %e, "WebSocket error");
                        metrics::record_error("websocket");
                        break;
                    }
                    None => {
                        debug!(user = %user_id, "WebSocket stream ended");
                        break;
                    }
                }
            }
        }
    }

    // Cleanup: a stale close after a rebind is a no-op inside the hub.
    state.hub.unbind(&user_id, epoch);

    let stats = state.hub.stats();
    metrics::set_active_rooms(stats.room_count);
    metrics::set_active_friendships(stats.friendship_count);

    debug!(user = %user_id, "WebSocket disconnected");
}

/// Drive the authentication handshake.
///
/// Returns the validated identity and its token, or `None` after pushing
/// an `authError` (the connection is then dropped).
async fn authenticate(
    sender: &mut SplitSink<WebSocket, Message>,
    receiver: &mut SplitStream<WebSocket>,
    state: &Arc<AppState>,
) -> Option<(SessionIdentity, String)> {
    loop {
        match receiver.next().await {
            Some(Ok(Message::Text(text))) => {
                let event = match codec::decode(&text) {
                    Ok(event) => event,
                    Err(e) => {
                        warn!(error = %e, "Undecodable handshake event");
                        let _ =
                            send_event(sender, &ServerEvent::auth_error("Session token required"))
                                .await;
                        return None;
                    }
                };

                return match event {
                    ClientEvent::Register { token } => {
                        match state.sessions.validate(&token).await {
                            Ok(identity) => Some((identity, token)),
                            Err(e) => {
                                metrics::record_error("auth");
                                let _ =
                                    send_event(sender, &ServerEvent::auth_error(e.to_string()))
                                        .await;
                                None
                            }
                        }
                    }
                    _ => {
                        // Any event preceding authentication closes the transport.
                        let _ =
                            send_event(sender, &ServerEvent::auth_error("Authentication required"))
                                .await;
                        None
                    }
                };
            }
            Some(Ok(Message::Ping(data))) => {
                if sender.send(Message::Pong(data)).await.is_err() {
                    return None;
                }
            }
            Some(Ok(Message::Pong(_))) => {}
            Some(Ok(_)) => {
                let _ =
                    send_event(sender, &ServerEvent::auth_error("Authentication required")).await;
                return None;
            }
            Some(Err(_)) | None => return None,
        }
    }
}

/// Dispatch a decoded client event into the hub.
///
/// Routing always uses the authenticated identity of the connection; any
/// `from`/`userId` claimed in the payload is ignored.
fn dispatch_event(state: &AppState, user: &UserId, reply: &ClientHandle, event: ClientEvent) {
    match event {
        ClientEvent::Register { .. } => {
            debug!(user = %user, "Register on authenticated connection, ignoring");
        }

        ClientEvent::Message {
            to,
            room_key,
            body,
            timestamp,
            ..
        } => {
            let delivered =
                state
                    .hub
                    .route_message(user, to.as_deref(), room_key.as_deref(), &body, timestamp);
            debug!(user = %user, recipients = delivered, "Routed message");
        }

        ClientEvent::Typing {
            to,
            room_key,
            is_typing,
            ..
        } => {
            state
                .hub
                .route_typing(user, to.as_deref(), room_key.as_deref(), is_typing);
        }

        ClientEvent::JoinRoom { room_key, .. } => match state.hub.join_room(user, &room_key) {
            Ok(_) => {
                metrics::set_active_rooms(state.hub.stats().room_count);
            }
            Err(e) => {
                warn!(user = %user, room = %room_key, error = %e, "Join failed");
                metrics::record_error("join_room");
                let _ = reply.push(ServerEvent::room_join_failed(room_key, e.to_string()));
            }
        },

        ClientEvent::LeaveRoom { room_key, .. } => {
            state.hub.leave_room(user, &room_key);
            metrics::set_active_rooms(state.hub.stats().room_count);
        }

        ClientEvent::SendFriendRequest { target_user_id, .. } => {
            let target = UserId::new(&target_user_id);
            match state.hub.send_request(user, &target) {
                Ok(()) => {
                    let _ = reply.push(ServerEvent::request_ok("Friend request sent successfully"));
                }
                Err(e) => {
                    metrics::record_error("friend_request");
                    let _ = reply.push(ServerEvent::request_failed(e.to_string()));
                }
            }
        }

        ClientEvent::AcceptFriendRequest { requester_id, .. } => {
            let requester = UserId::new(&requester_id);
            match state.hub.accept_request(user, &requester) {
                Ok(()) => {
                    metrics::set_active_friendships(state.hub.stats().friendship_count);
                }
                Err(e) => {
                    metrics::record_error("friend_request");
                    let _ = reply.push(ServerEvent::request_failed(e.to_string()));
                }
            }
        }

        ClientEvent::RejectFriendRequest {
            reject_requester_id,
            ..
        } => {
            state
                .hub
                .reject_request(user, &UserId::new(&reject_requester_id));
        }

        ClientEvent::GetFriendsList { .. } => state.hub.push_friends_list(user),

        ClientEvent::GetPendingRequests { .. } => state.hub.push_pending_requests(user),
    }
}

/// Send an event straight to the WebSocket, bypassing the outbound queue.
/// Only used during the handshake, before the queue exists.
async fn send_event(
    sender: &mut SplitSink<WebSocket, Message>,
    event: &ServerEvent,
) -> Result<()> {
    let text = codec::encode(event)?;
    metrics::record_event(text.len(), "outbound");
    sender.send(Message::Text(text)).await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_dispatch_self_request_replies_with_error() {
        let state = AppState::new(Config::default());
        let alice = UserId::new("alice");
        let (reply, mut rx) = ClientHandle::channel();

        dispatch_event(
            &state,
            &alice,
            &reply,
            ClientEvent::SendFriendRequest {
                from: "alice".into(),
                target_user_id: "alice".into(),
            },
        );

        let event = rx.try_recv().unwrap();
        assert!(matches!(
            event,
            ServerEvent::FriendRequestResult { success: false, .. }
        ));
    }

    #[test]
    fn test_dispatch_join_with_bad_key_replies_with_error() {
        let state = AppState::new(Config::default());
        let alice = UserId::new("alice");
        let (reply, mut rx) = ClientHandle::channel();

        dispatch_event(
            &state,
            &alice,
            &reply,
            ClientEvent::JoinRoom {
                user_id: "alice".into(),
                room_key: "short".into(),
                is_creating: true,
            },
        );

        let event = rx.try_recv().unwrap();
        assert!(matches!(
            event,
            ServerEvent::RoomJoined { success: false, .. }
        ));
    }
}
