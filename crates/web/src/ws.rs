//! The playground WebSocket: snapshot replay, live event streaming, and run
//! requests.
//!
//! On attach the handler triggers the lazy lifecycle start, sends one
//! `snapshot` frame (phase, transcript so far, preview URL), then forwards
//! live [`PlaygroundEvent`]s as JSON frames. Chunk events already covered by
//! the snapshot are filtered by sequence number so clients see every chunk
//! exactly once, in order.

use {
    axum::{
        extract::{
            State, WebSocketUpgrade,
            ws::{Message, WebSocket},
        },
        http::StatusCode,
        response::IntoResponse,
    },
    futures::{SinkExt, StreamExt},
    sandpit_playground::PlaygroundEvent,
    tokio::sync::broadcast,
    tracing::{debug, warn},
};

use crate::AppState;

const MAX_CLIENT_MESSAGE_BYTES: usize = 1024 * 1024;

#[derive(Debug, serde::Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum PlaygroundClientMessage {
    /// Run the submitted editor text.
    Run { code: String },
    Ping,
}

/// Check whether a WebSocket `Origin` header matches the request `Host`.
///
/// Loopback spellings (`localhost`, `127.0.0.1`, `[::1]`) are treated as
/// interchangeable so `http://localhost:4815` matches a Host of
/// `127.0.0.1:4815`.
fn is_same_origin(origin: &str, host: &str) -> bool {
    let origin_host = origin
        .split("://")
        .nth(1)
        .unwrap_or(origin)
        .split('/')
        .next()
        .unwrap_or("");

    fn strip_port(h: &str) -> &str {
        if h.starts_with('[') {
            h.rsplit_once("]:")
                .map_or(h, |(addr, _)| addr)
                .trim_start_matches('[')
                .trim_end_matches(']')
        } else {
            h.rsplit_once(':').map_or(h, |(addr, _)| addr)
        }
    }
    fn get_port(h: &str) -> Option<&str> {
        if h.starts_with('[') {
            h.rsplit_once("]:").map(|(_, p)| p)
        } else {
            h.rsplit_once(':').map(|(_, p)| p)
        }
    }

    let is_loopback = |h: &str| matches!(h, "localhost" | "127.0.0.1" | "::1");

    let oh = strip_port(origin_host);
    let hh = strip_port(host);
    (oh == hh || (is_loopback(oh) && is_loopback(hh))) && get_port(origin_host) == get_port(host)
}

pub async fn playground_ws_upgrade_handler(
    ws: WebSocketUpgrade,
    headers: axum::http::HeaderMap,
    State(state): State<AppState>,
) -> impl IntoResponse {
    // CSWSH protection: only same-origin browser upgrades are allowed.
    if let Some(origin) = headers
        .get(axum::http::header::ORIGIN)
        .and_then(|v| v.to_str().ok())
    {
        let host = headers
            .get(axum::http::header::HOST)
            .and_then(|v| v.to_str().ok())
            .unwrap_or("");
        if !is_same_origin(origin, host) {
            warn!(origin, host, "rejected cross-origin playground WebSocket upgrade");
            return (
                StatusCode::FORBIDDEN,
                "cross-origin WebSocket connections are not allowed",
            )
                .into_response();
        }
    }

    ws.on_upgrade(move |socket| handle_playground_socket(socket, state))
        .into_response()
}

async fn send_json(
    ws_tx: &mut futures::stream::SplitSink<WebSocket, Message>,
    payload: serde_json::Value,
) -> bool {
    match serde_json::to_string(&payload) {
        Ok(text) => ws_tx.send(Message::Text(text.into())).await.is_ok(),
        Err(err) => {
            warn!(error = %err, "failed to serialize playground ws payload");
            false
        },
    }
}

async fn send_event(
    ws_tx: &mut futures::stream::SplitSink<WebSocket, Message>,
    event: &PlaygroundEvent,
) -> bool {
    match serde_json::to_string(event) {
        Ok(text) => ws_tx.send(Message::Text(text.into())).await.is_ok(),
        Err(err) => {
            warn!(error = %err, "failed to serialize playground event");
            false
        },
    }
}

async fn handle_playground_socket(socket: WebSocket, state: AppState) {
    let conn_id = uuid::Uuid::new_v4();
    debug!(%conn_id, "playground ws: new connection");

    // First attach starts the boot/install pipeline; later attaches share it.
    state.playground.ensure_started();

    let (snapshot, mut events) = state.playground.attach();
    let replayed_up_to = snapshot.chunks.last().map(|c| c.seq);

    let (mut ws_tx, mut ws_rx) = socket.split();
    if !send_json(
        &mut ws_tx,
        serde_json::json!({
            "type": "snapshot",
            "phase": snapshot.phase,
            "chunks": snapshot.chunks,
            "preview_url": snapshot.preview_url,
        }),
    )
    .await
    {
        return;
    }

    loop {
        tokio::select! {
            event = events.recv() => {
                match event {
                    // Already delivered inside the snapshot.
                    Ok(PlaygroundEvent::Chunk { ref chunk })
                        if replayed_up_to.is_some_and(|seq| chunk.seq <= seq) => {},
                    Ok(ref event) => {
                        if !send_event(&mut ws_tx, event).await {
                            break;
                        }
                    },
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        warn!(%conn_id, skipped, "playground ws fell behind the event stream");
                        if !send_json(
                            &mut ws_tx,
                            serde_json::json!({
                                "type": "error",
                                "message": format!("output stream lagged, {skipped} events skipped"),
                            }),
                        )
                        .await
                        {
                            break;
                        }
                    },
                    Err(broadcast::error::RecvError::Closed) => break,
                }
            }
            maybe_msg = ws_rx.next() => {
                let Some(Ok(msg)) = maybe_msg else {
                    break;
                };
                match msg {
                    Message::Text(text) => {
                        if text.len() > MAX_CLIENT_MESSAGE_BYTES {
                            if !send_json(
                                &mut ws_tx,
                                serde_json::json!({
                                    "type": "error",
                                    "message": "message too large",
                                }),
                            )
                            .await
                            {
                                break;
                            }
                            continue;
                        }
                        match serde_json::from_str::<PlaygroundClientMessage>(&text) {
                            Ok(PlaygroundClientMessage::Run { code }) => {
                                if let Err(err) = state.playground.run(&code).await {
                                    // Run-time failures are already in the
                                    // transcript; the frame covers phase
                                    // rejections too.
                                    if !send_json(
                                        &mut ws_tx,
                                        serde_json::json!({
                                            "type": "error",
                                            "message": err.to_string(),
                                        }),
                                    )
                                    .await
                                    {
                                        break;
                                    }
                                }
                            },
                            Ok(PlaygroundClientMessage::Ping) => {
                                if !send_json(&mut ws_tx, serde_json::json!({ "type": "pong" }))
                                    .await
                                {
                                    break;
                                }
                            },
                            Err(err) => {
                                debug!(%conn_id, error = %err, "ignoring malformed ws message");
                            },
                        }
                    },
                    Message::Close(_) => break,
                    _ => {},
                }
            }
        }
    }

    debug!(%conn_id, "playground ws: connection closed");
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn same_origin_accepts_loopback_variants() {
        assert!(is_same_origin("http://localhost:4815", "127.0.0.1:4815"));
        assert!(is_same_origin("http://127.0.0.1:4815", "localhost:4815"));
        assert!(is_same_origin("https://example.com", "example.com"));
    }

    #[test]
    fn same_origin_rejects_foreign_hosts_and_ports() {
        assert!(!is_same_origin("http://evil.test:4815", "localhost:4815"));
        assert!(!is_same_origin("http://localhost:9999", "localhost:4815"));
    }

    #[test]
    fn client_messages_parse() {
        let run: PlaygroundClientMessage =
            serde_json::from_str(r#"{"type":"run","code":"console.log(1);"}"#)
                .expect("run message parses");
        assert!(matches!(run, PlaygroundClientMessage::Run { code } if code == "console.log(1);"));

        let ping: PlaygroundClientMessage =
            serde_json::from_str(r#"{"type":"ping"}"#).expect("ping message parses");
        assert!(matches!(ping, PlaygroundClientMessage::Ping));
    }
}
