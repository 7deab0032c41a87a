//! WebSocket `/ws`: pushes `{type:"new_event", event}` for every bus
//! publish, replays recent history on connect, and answers `"ping"` with
//! `"pong"` — both the legacy plain-text form and the JSON
//! `{"type":"ping"}` form this codebase's dashboard already speaks.

use super::AppState;
use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::State;
use axum::response::Response;
use tracing::warn;

const REPLAY_ON_CONNECT: usize = 100;

pub async fn websocket_handler(ws: WebSocketUpgrade, State(state): State<AppState>) -> Response {
    ws.on_upgrade(move |socket| handle_socket(socket, state))
}

async fn handle_socket(mut socket: WebSocket, state: AppState) {
    let mut rx = state.bus.subscribe();

    for event in state.event_store.recent(REPLAY_ON_CONNECT) {
        let msg = serde_json::json!({"type": "new_event", "event": event});
        if socket.send(Message::Text(msg.to_string())).await.is_err() {
            return;
        }
    }

    loop {
        tokio::select! {
            result = rx.recv() => {
                match result {
                    Ok(event) => {
                        let msg = serde_json::json!({"type": "new_event", "event": event});
                        if socket.send(Message::Text(msg.to_string())).await.is_err() {
                            break;
                        }
                    }
                    Err(tokio::sync::broadcast::error::RecvError::Lagged(skipped)) => {
                        warn!(skipped, "ws subscriber lagged, dropping to resync via id-range query");
                        let err = serde_json::json!({
                            "type": "error",
                            "kind": "lagged",
                            "message": format!("missed {skipped} events, resync via /api/events?limit=N")
                        });
                        if socket.send(Message::Text(err.to_string())).await.is_err() {
                            break;
                        }
                    }
                    Err(tokio::sync::broadcast::error::RecvError::Closed) => break,
                }
            }
            incoming = socket.recv() => {
                match incoming {
                    Some(Ok(Message::Text(text))) => {
                        if let Ok(json) = serde_json::from_str::<serde_json::Value>(&text) {
                            if json.get("type").and_then(|t| t.as_str()) == Some("ping") {
                                let _ = socket.send(Message::Text(r#"{"type":"pong"}"#.to_string())).await;
                            }
                        } else if text == "ping" {
                            let _ = socket.send(Message::Text("pong".to_string())).await;
                        }
                    }
                    Some(Ok(Message::Close(_))) | None => break,
                    Some(Err(_)) => break,
                    _ => {}
                }
            }
        }
    }
}
