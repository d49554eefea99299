#![allow(clippy::unwrap_used, clippy::expect_used)]
//! Integration tests for the playground page and WebSocket protocol.

use std::{net::SocketAddr, sync::Arc, time::Duration};

use {
    futures::{SinkExt, StreamExt},
    tokio::net::TcpListener,
    tokio_tungstenite::{connect_async, tungstenite::Message},
};

use {
    sandpit_playground::Playground,
    sandpit_runtime::{
        DEFAULT_SOURCE, ProcessPlan, SandboxSession, ScriptedRuntime, SessionManager,
    },
    sandpit_web::{AppState, build_app},
};

/// Spin up a playground server on an ephemeral port, backed by a scripted
/// sandbox, and return the bound address plus the script handle.
async fn start_test_server() -> (SocketAddr, Arc<ScriptedRuntime>) {
    let runtime = Arc::new(ScriptedRuntime::new());
    let boot_runtime = Arc::clone(&runtime);
    let manager = SessionManager::new(move || {
        let runtime = Arc::clone(&boot_runtime);
        Box::pin(async move { Ok(SandboxSession::new(runtime)) })
    });
    let playground = Playground::new(manager, DEFAULT_SOURCE.to_string());
    let app = build_app(AppState { playground });

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    (addr, runtime)
}

type WsStream = tokio_tungstenite::WebSocketStream<
    tokio_tungstenite::MaybeTlsStream<tokio::net::TcpStream>,
>;

/// Read frames until one satisfies `pred`, with a timeout.
async fn next_frame_matching(
    ws: &mut WsStream,
    pred: impl Fn(&serde_json::Value) -> bool,
) -> serde_json::Value {
    tokio::time::timeout(Duration::from_secs(2), async {
        loop {
            let msg = ws.next().await.expect("ws closed early").unwrap();
            if let Ok(text) = msg.to_text()
                && let Ok(frame) = serde_json::from_str::<serde_json::Value>(text)
                && pred(&frame)
            {
                return frame;
            }
        }
    })
    .await
    .expect("timed out waiting for matching frame")
}

#[tokio::test]
async fn health_endpoint_returns_json() {
    let (addr, _runtime) = start_test_server().await;
    let resp = reqwest::get(format!("http://{addr}/health")).await.unwrap();
    assert_eq!(resp.status(), 200);
    let json: serde_json::Value = resp.json().await.unwrap();
    assert_eq!(json["status"], "ok");
    assert!(json["version"].is_string());
    assert!(json["phase"].is_string());
}

#[tokio::test]
async fn page_renders_editor_with_injected_source() {
    let (addr, _runtime) = start_test_server().await;
    let resp = reqwest::get(format!("http://{addr}/")).await.unwrap();
    assert_eq!(resp.status(), 200);
    assert!(
        resp.headers()
            .get("content-security-policy")
            .is_some_and(|v| v.to_str().unwrap().contains("frame-src"))
    );

    let body = resp.text().await.unwrap();
    assert!(body.contains("id=\"editor\""));
    assert!(body.contains("id=\"run\""));
    assert!(body.contains("id=\"output\""));
    assert!(body.contains("id=\"preview\""));
    assert!(body.contains("window.__SANDPIT__"));
    // The default source rides in as gon data, JSON-escaped.
    assert!(body.contains("default_source"));
    assert!(body.contains(r#"<span class="lang">typescript</span>"#));
}

#[tokio::test]
async fn assets_are_served_with_content_types() {
    let (addr, _runtime) = start_test_server().await;
    let resp = reqwest::get(format!("http://{addr}/assets/app.js"))
        .await
        .unwrap();
    assert_eq!(resp.status(), 200);
    assert!(
        resp.headers()
            .get("content-type")
            .is_some_and(|v| v.to_str().unwrap().contains("javascript"))
    );

    let resp = reqwest::get(format!("http://{addr}/assets/no-such-file.js"))
        .await
        .unwrap();
    assert_eq!(resp.status(), 404);
}

#[tokio::test]
async fn ws_attach_receives_snapshot_then_ready_phase() {
    let (addr, runtime) = start_test_server().await;
    runtime.plan(ProcessPlan::succeeds(&["added 12 packages"]));

    let (mut ws, _) = connect_async(format!("ws://{addr}/api/playground/ws"))
        .await
        .expect("ws connect failed");

    // The very first frame is always the snapshot.
    let msg = ws.next().await.unwrap().unwrap();
    let snapshot: serde_json::Value = serde_json::from_str(msg.to_text().unwrap()).unwrap();
    assert_eq!(snapshot["type"], "snapshot");
    assert!(snapshot["chunks"].is_array());

    // The install pipeline runs to completion and announces ready.
    let ready = next_frame_matching(&mut ws, |f| {
        f["type"] == "phase" && f["phase"] == "ready"
    })
    .await;
    assert_eq!(ready["phase"], "ready");

    ws.close(None).await.ok();
}

#[tokio::test]
async fn ws_run_streams_output_chunks() {
    let (addr, runtime) = start_test_server().await;
    runtime.plan(ProcessPlan::succeeds(&[]));
    runtime.plan(ProcessPlan::server(&["listening on 3000"]));

    let (mut ws, _) = connect_async(format!("ws://{addr}/api/playground/ws"))
        .await
        .expect("ws connect failed");
    let _ = next_frame_matching(&mut ws, |f| {
        f["type"] == "phase" && f["phase"] == "ready"
    })
    .await;

    let run = serde_json::json!({ "type": "run", "code": "console.log('edited');" });
    ws.send(Message::Text(run.to_string().into())).await.unwrap();

    let separator = next_frame_matching(&mut ws, |f| {
        f["type"] == "chunk" && f["chunk"]["kind"] == "separator"
    })
    .await;
    assert_eq!(separator["chunk"]["text"], "--- run ---");

    let output = next_frame_matching(&mut ws, |f| {
        f["type"] == "chunk" && f["chunk"]["text"] == "listening on 3000"
    })
    .await;
    assert_eq!(output["chunk"]["kind"], "output");

    ws.close(None).await.ok();
}

#[tokio::test]
async fn ws_forwards_server_ready_with_exact_url() {
    let (addr, runtime) = start_test_server().await;
    runtime.plan(ProcessPlan::succeeds(&[]));

    let (mut ws, _) = connect_async(format!("ws://{addr}/api/playground/ws"))
        .await
        .expect("ws connect failed");
    let _ = next_frame_matching(&mut ws, |f| {
        f["type"] == "phase" && f["phase"] == "ready"
    })
    .await;

    runtime.emit_server_ready(3000, "http://127.0.0.1:3000");

    let ready = next_frame_matching(&mut ws, |f| f["type"] == "server_ready").await;
    assert_eq!(ready["port"], 3000);
    assert_eq!(ready["url"], "http://127.0.0.1:3000");

    ws.close(None).await.ok();
}

#[tokio::test]
async fn ws_run_before_ready_yields_error_frame() {
    let (addr, runtime) = start_test_server().await;
    // No install plan queued: the pipeline errors, runs stay rejected.
    runtime.fail_next_mount("scratch directory vanished");

    let (mut ws, _) = connect_async(format!("ws://{addr}/api/playground/ws"))
        .await
        .expect("ws connect failed");
    let _ = next_frame_matching(&mut ws, |f| {
        f["type"] == "phase" && f["phase"] == "errored"
    })
    .await;

    let run = serde_json::json!({ "type": "run", "code": "x" });
    ws.send(Message::Text(run.to_string().into())).await.unwrap();

    let err = next_frame_matching(&mut ws, |f| f["type"] == "error").await;
    assert!(err["message"].is_string());

    ws.close(None).await.ok();
}

#[tokio::test]
async fn ws_ping_gets_pong() {
    let (addr, runtime) = start_test_server().await;
    runtime.plan(ProcessPlan::succeeds(&[]));

    let (mut ws, _) = connect_async(format!("ws://{addr}/api/playground/ws"))
        .await
        .expect("ws connect failed");
    // Snapshot first.
    let _ = ws.next().await.unwrap().unwrap();

    ws.send(Message::Text(
        serde_json::json!({ "type": "ping" }).to_string().into(),
    ))
    .await
    .unwrap();
    let pong = next_frame_matching(&mut ws, |f| f["type"] == "pong").await;
    assert_eq!(pong["type"], "pong");

    ws.close(None).await.ok();
}

#[tokio::test]
async fn late_attach_replays_the_full_transcript_without_duplicates() {
    let (addr, runtime) = start_test_server().await;
    runtime.plan(ProcessPlan::succeeds(&["chunk a", "chunk b"]));

    // First client triggers the pipeline and waits for ready.
    let (mut first, _) = connect_async(format!("ws://{addr}/api/playground/ws"))
        .await
        .expect("ws connect failed");
    let _ = next_frame_matching(&mut first, |f| {
        f["type"] == "phase" && f["phase"] == "ready"
    })
    .await;

    // Second client gets everything in its snapshot.
    let (mut second, _) = connect_async(format!("ws://{addr}/api/playground/ws"))
        .await
        .expect("ws connect failed");
    let msg = second.next().await.unwrap().unwrap();
    let snapshot: serde_json::Value = serde_json::from_str(msg.to_text().unwrap()).unwrap();
    assert_eq!(snapshot["type"], "snapshot");
    assert_eq!(snapshot["phase"], "ready");
    let chunks = snapshot["chunks"].as_array().unwrap();
    let texts: Vec<&str> = chunks
        .iter()
        .filter_map(|c| c["text"].as_str())
        .collect();
    assert!(texts.contains(&"chunk a"));
    assert!(texts.contains(&"chunk b"));

    // Sequence numbers are contiguous from zero: the full log, exactly once.
    let seqs: Vec<u64> = chunks.iter().filter_map(|c| c["seq"].as_u64()).collect();
    let expected: Vec<u64> = (0..seqs.len() as u64).collect();
    assert_eq!(seqs, expected);

    first.close(None).await.ok();
    second.close(None).await.ok();
}
