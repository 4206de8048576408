//! End-to-end tests over a real listener: HTTP control surface plus
//! the WebSocket viewer stream, backed by a scripted runtime and the
//! in-memory broker.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use futures::StreamExt;
use tokio_tungstenite::tungstenite::Message;
use tokio_util::sync::CancellationToken;

use hive_broker::{Broker, MemoryBroker};
use hive_core::{AgentEvent, AgentId, ServerMessage};
use hive_runtime::{AgentConfig, AgentPool, ScriptedRuntime};
use hive_server::AppState;

struct TestServer {
    addr: SocketAddr,
    pool: Arc<AgentPool>,
    runtime: ScriptedRuntime,
    shutdown: CancellationToken,
}

impl Drop for TestServer {
    fn drop(&mut self) {
        self.shutdown.cancel();
    }
}

async fn spawn_server() -> TestServer {
    let runtime = ScriptedRuntime::new();
    let broker = Arc::new(MemoryBroker::new());
    let configs = AgentId::ALL
        .into_iter()
        .map(|id| AgentConfig::new(id, "test-model", "/tmp"))
        .collect();
    let pool = AgentPool::start(
        Arc::new(runtime.clone()),
        broker as Arc<dyn Broker>,
        configs,
    )
    .await
    .unwrap();

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let shutdown = CancellationToken::new();
    let state = AppState::new(Arc::clone(&pool), None);
    drop(tokio::spawn(hive_server::serve(
        listener,
        state,
        shutdown.clone(),
    )));

    TestServer {
        addr,
        pool,
        runtime,
        shutdown,
    }
}

fn url(server: &TestServer, path: &str) -> String {
    format!("http://{}{path}", server.addr)
}

type WsStream = tokio_tungstenite::WebSocketStream<
    tokio_tungstenite::MaybeTlsStream<tokio::net::TcpStream>,
>;

async fn connect_viewer(server: &TestServer) -> WsStream {
    let (stream, _) = tokio_tungstenite::connect_async(format!("ws://{}/ws", server.addr))
        .await
        .expect("websocket connect");
    stream
}

async fn next_server_message(stream: &mut WsStream) -> ServerMessage {
    loop {
        let msg = tokio::time::timeout(Duration::from_secs(2), stream.next())
            .await
            .expect("timed out waiting for server message")
            .expect("stream closed")
            .expect("websocket error");
        if let Message::Text(text) = msg {
            return serde_json::from_str(&text).expect("valid server message");
        }
    }
}

#[tokio::test]
async fn health_reports_ok() {
    let server = spawn_server().await;
    let response = reqwest::get(url(&server, "/health")).await.unwrap();
    assert_eq!(response.status(), 200);
    let body: serde_json::Value = response.json().await.unwrap();
    assert_eq!(body["status"], "ok");
}

#[tokio::test]
async fn pool_snapshot_lists_all_agents() {
    let server = spawn_server().await;
    let body: serde_json::Value = reqwest::get(url(&server, "/pool"))
        .await
        .unwrap()
        .json()
        .await
        .unwrap();

    assert_eq!(body["running"], false);
    let agents = body["agents"].as_array().unwrap();
    assert_eq!(agents.len(), 4);
    assert_eq!(agents[0]["id"], "supervisor");
    assert_eq!(agents[0]["role"], "supervisor");
    assert_eq!(agents[1]["id"], "worker-0");
    assert_eq!(agents[1]["status"], "idle");
}

#[tokio::test]
async fn send_message_starts_a_turn() {
    let server = spawn_server().await;
    let client = reqwest::Client::new();

    let response = client
        .post(url(&server, "/agents/worker-1/message"))
        .json(&serde_json::json!({ "text": "summarize the doc" }))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 200);

    let deadline = tokio::time::Instant::now() + Duration::from_secs(2);
    while server.runtime.turn_count() == 0 {
        assert!(tokio::time::Instant::now() < deadline);
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    assert_eq!(server.runtime.requests()[0].prompt, "summarize the doc");
    assert_eq!(server.runtime.requests()[0].config.id, AgentId::Worker1);
}

#[tokio::test]
async fn unknown_agent_is_404_with_stable_code() {
    let server = spawn_server().await;
    let client = reqwest::Client::new();

    let response = client
        .post(url(&server, "/agents/worker-9/message"))
        .json(&serde_json::json!({ "text": "hi" }))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 404);
    let body: serde_json::Value = response.json().await.unwrap();
    assert_eq!(body["code"], "AGENT_NOT_FOUND");
}

#[tokio::test]
async fn empty_message_is_rejected() {
    let server = spawn_server().await;
    let client = reqwest::Client::new();

    let response = client
        .post(url(&server, "/agents/worker-0/message"))
        .json(&serde_json::json!({ "text": "   " }))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 400);
    let body: serde_json::Value = response.json().await.unwrap();
    assert_eq!(body["code"], "INVALID_PARAMS");
}

#[tokio::test]
async fn interrupt_idle_agent_acknowledges() {
    let server = spawn_server().await;
    let client = reqwest::Client::new();

    let response = client
        .post(url(&server, "/agents/supervisor/interrupt"))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 200);
    let body: serde_json::Value = response.json().await.unwrap();
    assert_eq!(body["ok"], true);
}

#[tokio::test]
async fn running_flag_round_trips() {
    let server = spawn_server().await;
    let client = reqwest::Client::new();

    let response = client
        .post(url(&server, "/running"))
        .json(&serde_json::json!({ "running": true }))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 200);

    let body: serde_json::Value = reqwest::get(url(&server, "/pool"))
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(body["running"], true);
}

#[tokio::test]
async fn viewer_gets_snapshot_first() {
    let server = spawn_server().await;
    let mut viewer = connect_viewer(&server).await;

    let first = next_server_message(&mut viewer).await;
    let ServerMessage::PoolState { pool } = first else {
        panic!("expected pool snapshot, got {first:?}");
    };
    assert_eq!(pool.agents.len(), 4);
}

#[tokio::test]
async fn viewer_receives_turn_events_in_order() {
    let server = spawn_server().await;
    let mut viewer = connect_viewer(&server).await;
    let _snapshot = next_server_message(&mut viewer).await;

    server
        .pool
        .inject_message(AgentId::Worker0, "go".into())
        .unwrap();

    let mut events = Vec::new();
    loop {
        match next_server_message(&mut viewer).await {
            ServerMessage::AgentEvent { agent_id, event } => {
                assert_eq!(agent_id, AgentId::Worker0);
                let done = matches!(event, AgentEvent::TurnEnd);
                events.push(event);
                if done {
                    break;
                }
            }
            other => panic!("unexpected message: {other:?}"),
        }
    }
    assert_eq!(
        events,
        vec![AgentEvent::Inject { text: "go".into() }, AgentEvent::TurnEnd]
    );
}

#[tokio::test]
async fn every_viewer_sees_the_same_events() {
    let server = spawn_server().await;
    let mut viewer_a = connect_viewer(&server).await;
    let mut viewer_b = connect_viewer(&server).await;
    let _ = next_server_message(&mut viewer_a).await;
    let _ = next_server_message(&mut viewer_b).await;

    server
        .pool
        .inject_message(AgentId::Worker2, "fan out".into())
        .unwrap();

    let a = next_server_message(&mut viewer_a).await;
    let b = next_server_message(&mut viewer_b).await;
    assert_eq!(a, b);
}

#[tokio::test]
async fn disconnect_unregisters_the_listener() {
    let server = spawn_server().await;
    let mut viewer = connect_viewer(&server).await;
    let _ = next_server_message(&mut viewer).await;
    assert_eq!(server.pool.subscriber_count(), 1);

    drop(viewer);

    // The forward loop notices the closed socket and drops its
    // broadcast receiver; later events go nowhere.
    let deadline = tokio::time::Instant::now() + Duration::from_secs(2);
    while server.pool.subscriber_count() != 0 {
        assert!(
            tokio::time::Instant::now() < deadline,
            "listener still registered after disconnect"
        );
        server
            .pool
            .inject_message(AgentId::Worker1, "tick".into())
            .unwrap();
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
}

#[tokio::test]
async fn metrics_endpoint_404s_without_recorder() {
    let server = spawn_server().await;
    let response = reqwest::get(url(&server, "/metrics")).await.unwrap();
    assert_eq!(response.status(), 404);
}
