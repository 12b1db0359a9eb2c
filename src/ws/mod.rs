pub mod handlers;

use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        State,
    },
    response::IntoResponse,
};
use futures::{sink::SinkExt, stream::StreamExt};
use std::sync::Arc;
use tokio::sync::broadcast;
use ulid::Ulid;

use crate::protocol::{ClientMessage, ServerMessage};
use crate::state::AppState;

/// WebSocket upgrade handler
pub async fn ws_handler(
    ws: WebSocketUpgrade,
    State(state): State<Arc<AppState>>,
) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_socket(socket, state))
}

/// Handle individual WebSocket connection
async fn handle_socket(socket: WebSocket, state: Arc<AppState>) {
    let conn_id = Ulid::new().to_string();
    tracing::info!("WebSocket connected: {}", conn_id);

    // Direct channel for messages addressed to this connection only
    let mut direct_rx = state.register_conn(&conn_id).await;

    let (mut sender, mut receiver) = socket.split();

    // Populated once the client joins a session
    let mut room_rx: Option<broadcast::Receiver<ServerMessage>> = None;

    loop {
        tokio::select! {
            // Messages addressed to this connection (replies, kick notices)
            direct_msg = direct_rx.recv() => {
                let Some(msg) = direct_msg else { break };
                if let Ok(json) = serde_json::to_string(&msg) {
                    if sender.send(Message::Text(json.into())).await.is_err() {
                        break;
                    }
                }
            }

            // Session-room broadcasts, once joined
            room_msg = async {
                match &mut room_rx {
                    Some(rx) => rx.recv().await.ok(),
                    None => {
                        // Not in a session yet: wait forever
                        std::future::pending::<Option<ServerMessage>>().await
                    }
                }
            } => {
                if let Some(msg) = room_msg {
                    if let Ok(json) = serde_json::to_string(&msg) {
                        if sender.send(Message::Text(json.into())).await.is_err() {
                            break;
                        }
                    }
                }
            }

            // Client messages
            ws_msg = receiver.next() => {
                match ws_msg {
                    Some(Ok(Message::Text(text))) => {
                        tracing::debug!("Received message: {}", text);

                        match serde_json::from_str::<ClientMessage>(&text) {
                            // Joining wires this socket into the session room
                            Ok(ClientMessage::JoinSession { code, username }) => {
                                if let Some(rx) =
                                    handlers::handle_join(&state, &conn_id, &code, &username).await
                                {
                                    room_rx = Some(rx);
                                }
                            }
                            Ok(client_msg) => {
                                handlers::handle_message(&state, &conn_id, client_msg).await;
                            }
                            Err(e) => {
                                tracing::error!("Failed to parse client message: {}", e);
                                let error = ServerMessage::Error {
                                    message: format!("Invalid message format: {}", e),
                                };
                                if let Ok(json) = serde_json::to_string(&error) {
                                    let _ = sender.send(Message::Text(json.into())).await;
                                }
                            }
                        }
                    }
                    Some(Ok(Message::Close(_))) => {
                        tracing::info!("WebSocket closed: {}", conn_id);
                        break;
                    }
                    Some(Ok(Message::Ping(data))) => {
                        if sender.send(Message::Pong(data)).await.is_err() {
                            break;
                        }
                    }
                    Some(Ok(_)) => {}
                    Some(Err(e)) => {
                        tracing::error!("WebSocket error: {}", e);
                        break;
                    }
                    None => break,
                }
            }
        }
    }

    state.unregister_conn(&conn_id).await;
    handlers::handle_disconnect(&state, &conn_id).await;
    tracing::info!("WebSocket connection closed: {}", conn_id);
}
