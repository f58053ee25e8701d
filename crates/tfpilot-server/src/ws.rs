//! WebSocket endpoint for deployment progress
//!
//! A client connects to `/ws`, sends a join message naming the deployment it
//! wants, and then receives that deployment's events as JSON text frames.
//! The connection closes after the terminal event.

use crate::hub::EventHub;
use crate::AppState;
use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::State;
use axum::response::Response;
use futures_util::{Sink, SinkExt, StreamExt};
use serde::Deserialize;
use serde_json::json;
use std::sync::Arc;
use tfpilot_core::DeployEvent;
use tokio::sync::broadcast;

#[derive(Debug, Deserialize)]
struct JoinMessage {
    #[serde(rename = "type")]
    kind: String,
    deployment_id: String,
}

pub async fn ws_handler(State(state): State<AppState>, ws: WebSocketUpgrade) -> Response {
    ws.on_upgrade(move |socket| handle_socket(socket, state.hub.clone()))
}

async fn handle_socket(socket: WebSocket, hub: Arc<EventHub>) {
    let (mut sink, mut stream) = socket.split();

    // The first text frame must be a join naming a deployment.
    let join = loop {
        match stream.next().await {
            Some(Ok(Message::Text(text))) => match serde_json::from_str::<JoinMessage>(&text) {
                Ok(join) if join.kind == "join" => break join,
                _ => {
                    let _ = send_json(
                        &mut sink,
                        json!({"type": "error", "message": "expected a join message"}),
                    )
                    .await;
                    return;
                }
            },
            Some(Ok(Message::Ping(_) | Message::Pong(_))) => continue,
            _ => return,
        }
    };

    log::info!("WebSocket joined deployment {}", join.deployment_id);
    let subscription = match hub.subscribe(&join.deployment_id).await {
        Some(subscription) => subscription,
        None => {
            let _ = send_json(
                &mut sink,
                json!({"type": "error", "message": "unknown deployment identifier"}),
            )
            .await;
            return;
        }
    };

    for event in &subscription.replay {
        if send_event(&mut sink, event).await.is_err() {
            return;
        }
        if event.is_terminal() {
            let _ = sink.close().await;
            return;
        }
    }

    let Some(mut live) = subscription.live else {
        let _ = sink.close().await;
        return;
    };

    loop {
        tokio::select! {
            received = live.recv() => match received {
                Ok(event) => {
                    let terminal = event.is_terminal();
                    if send_event(&mut sink, &event).await.is_err() {
                        return;
                    }
                    if terminal {
                        let _ = sink.close().await;
                        return;
                    }
                }
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    log::warn!(
                        "WebSocket for {} lagged, {} event(s) skipped",
                        join.deployment_id,
                        skipped
                    );
                }
                Err(broadcast::error::RecvError::Closed) => {
                    let _ = sink.close().await;
                    return;
                }
            },
            incoming = stream.next() => match incoming {
                None | Some(Ok(Message::Close(_))) | Some(Err(_)) => return,
                Some(Ok(_)) => {}
            },
        }
    }
}

async fn send_event(
    sink: &mut (impl Sink<Message, Error = axum::Error> + Unpin),
    event: &DeployEvent,
) -> Result<(), axum::Error> {
    let payload = serde_json::to_string(event).unwrap_or_default();
    sink.send(Message::Text(payload.into())).await
}

async fn send_json(
    sink: &mut (impl Sink<Message, Error = axum::Error> + Unpin),
    value: serde_json::Value,
) -> Result<(), axum::Error> {
    sink.send(Message::Text(value.to_string().into())).await
}
