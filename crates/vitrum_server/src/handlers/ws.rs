//! The live channel.
//!
//! Each WebSocket session subscribes to the engine bus and receives every
//! emission as a JSON text frame, in enqueue order. A session that stops
//! reading lags out of the broadcast buffer and is dropped. The literal
//! text `"ping"` is answered with `"pong"`.

use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::State;
use axum::response::Response;
use futures::{SinkExt, StreamExt};
use tokio::sync::broadcast::error::RecvError;
use tracing::debug;

use crate::state::AppState;

/// GET /ws - upgrade to the live channel.
pub async fn ws_handler(State(state): State<AppState>, ws: WebSocketUpgrade) -> Response {
    ws.on_upgrade(move |socket| handle_socket(socket, state))
}

async fn handle_socket(socket: WebSocket, state: AppState) {
    let (mut ws_tx, mut ws_rx) = socket.split();
    let mut events = state.engine.bus.subscribe();
    debug!("live channel session opened");

    loop {
        tokio::select! {
            emission = events.recv() => match emission {
                Ok(emission) => {
                    let Ok(text) = serde_json::to_string(&emission) else {
                        continue;
                    };
                    if ws_tx.send(Message::Text(text.into())).await.is_err() {
                        break;
                    }
                }
                // Missed some events while busy; the session stays alive
                // and picks up from the current position.
                Err(RecvError::Lagged(skipped)) => {
                    debug!("live channel lagged, skipped {skipped} events");
                }
                Err(RecvError::Closed) => break,
            },
            incoming = ws_rx.next() => match incoming {
                Some(Ok(Message::Text(text))) => {
                    if text.as_str() == "ping"
                        && ws_tx.send(Message::Text("pong".into())).await.is_err()
                    {
                        break;
                    }
                }
                Some(Ok(Message::Close(_))) | None => break,
                Some(Ok(_)) => {}
                Some(Err(_)) => break,
            },
        }
    }

    debug!("live channel session closed");
}
