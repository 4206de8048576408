//! Consumer + API client against a real server instance.

use std::net::SocketAddr;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use assert_matches::assert_matches;
use tokio_util::sync::CancellationToken;

use hive_broker::{Broker, MemoryBroker};
use hive_client::{ApiClient, ClientError, StreamConsumer};
use hive_core::{AgentId, ChatMessage, Status};
use hive_runtime::{AgentConfig, AgentPool, RuntimeMessage, ScriptedRuntime, StreamPayload};
use hive_server::AppState;

struct TestServer {
    addr: SocketAddr,
    runtime: ScriptedRuntime,
    shutdown: CancellationToken,
}

impl Drop for TestServer {
    fn drop(&mut self) {
        self.shutdown.cancel();
    }
}

async fn spawn_server_on(listener: tokio::net::TcpListener) -> TestServer {
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

    let addr = listener.local_addr().unwrap();
    let shutdown = CancellationToken::new();
    drop(tokio::spawn(hive_server::serve(
        listener,
        AppState::new(pool, None),
        shutdown.clone(),
    )));
    TestServer {
        addr,
        runtime,
        shutdown,
    }
}

async fn spawn_server() -> TestServer {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    spawn_server_on(listener).await
}

async fn wait_until(mut predicate: impl FnMut() -> bool, timeout: Duration) {
    let deadline = tokio::time::Instant::now() + timeout;
    while !predicate() {
        assert!(
            tokio::time::Instant::now() < deadline,
            "condition not reached in time"
        );
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
}

#[tokio::test]
async fn consumer_receives_snapshot_on_connect() {
    let server = spawn_server().await;
    let consumer = StreamConsumer::connect(format!("ws://{}/ws", server.addr));

    wait_until(|| consumer.pool().is_some(), Duration::from_secs(2)).await;
    let pool = consumer.pool().unwrap();
    assert_eq!(pool.agents.len(), 4);
    assert!(pool.agents.iter().all(|a| a.status == Status::Idle));
}

#[tokio::test]
async fn consumer_folds_turn_into_chat_state() {
    let server = spawn_server().await;
    server.runtime.push_script(vec![
        RuntimeMessage::StreamEvent {
            event: StreamPayload::TextDelta {
                text: "work ".into(),
            },
        },
        RuntimeMessage::StreamEvent {
            event: StreamPayload::TextDelta {
                text: "done".into(),
            },
        },
    ]);
    let consumer = StreamConsumer::connect(format!("ws://{}/ws", server.addr));
    wait_until(|| consumer.pool().is_some(), Duration::from_secs(2)).await;

    let api = ApiClient::new(format!("http://{}", server.addr));
    api.send_message(AgentId::Worker0, "do the work")
        .await
        .unwrap();

    wait_until(
        || {
            let chat = consumer.chat(AgentId::Worker0);
            !chat.busy && !chat.messages.is_empty()
        },
        Duration::from_secs(2),
    )
    .await;

    let chat = consumer.chat(AgentId::Worker0);
    assert_eq!(
        chat.messages[0],
        ChatMessage::User {
            text: "do the work".into()
        }
    );
    let ChatMessage::Assistant { blocks } = &chat.messages[1] else {
        panic!("expected assistant message");
    };
    assert_eq!(
        blocks[0],
        hive_core::Block::Text {
            text: "work done".into()
        }
    );
}

#[tokio::test]
async fn api_rejects_empty_message_with_structured_error() {
    let server = spawn_server().await;
    let api = ApiClient::new(format!("http://{}", server.addr));

    let err = api.send_message(AgentId::Worker1, "  ").await.unwrap_err();
    assert_matches!(err, ClientError::Api { code, .. } if code == "INVALID_PARAMS");
}

#[tokio::test]
async fn api_interrupt_and_running_round_trip() {
    let server = spawn_server().await;
    let api = ApiClient::new(format!("http://{}", server.addr));

    api.interrupt(AgentId::Supervisor).await.unwrap();
    api.set_running(true).await.unwrap();
    let pool = api.fetch_pool().await.unwrap();
    assert!(pool.running);
}

#[tokio::test]
async fn consumer_connects_once_server_appears() {
    // Reserve an address, then release it so the consumer's first
    // attempts fail with connection refused.
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);

    let consumer = StreamConsumer::connect(format!("ws://{addr}/ws"));
    tokio::time::sleep(Duration::from_millis(100)).await;
    assert!(consumer.pool().is_none());

    let listener = tokio::net::TcpListener::bind(addr).await.unwrap();
    let _server = spawn_server_on(listener).await;

    // First retry lands after the 1s base delay.
    wait_until(|| consumer.pool().is_some(), Duration::from_secs(10)).await;
}

/// Raw WebSocket server sending a fixed frame list to each connection.
async fn spawn_raw_ws(frames: Vec<String>) -> SocketAddr {
    use futures::SinkExt;

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(tokio::spawn(async move {
        while let Ok((socket, _)) = listener.accept().await {
            let frames = frames.clone();
            drop(tokio::spawn(async move {
                let mut ws = tokio_tungstenite::accept_async(socket).await.unwrap();
                for frame in frames {
                    ws.send(tokio_tungstenite::tungstenite::Message::Text(frame.into()))
                        .await
                        .unwrap();
                }
                // Hold the connection open so the consumer stays attached.
                tokio::time::sleep(Duration::from_secs(30)).await;
            }));
        }
    }));
    addr
}

/// Raw WebSocket server that serves each connection the frame list,
/// then closes it. Returns the count of accepted connections.
async fn spawn_closing_ws(frames: Vec<String>) -> (SocketAddr, Arc<AtomicUsize>) {
    use futures::SinkExt;

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let connections = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&connections);
    drop(tokio::spawn(async move {
        while let Ok((socket, _)) = listener.accept().await {
            let _ = counter.fetch_add(1, Ordering::SeqCst);
            let frames = frames.clone();
            drop(tokio::spawn(async move {
                let mut ws = tokio_tungstenite::accept_async(socket).await.unwrap();
                for frame in frames {
                    ws.send(tokio_tungstenite::tungstenite::Message::Text(frame.into()))
                        .await
                        .unwrap();
                }
                let _ = ws.close(None).await;
            }));
        }
    }));
    (addr, connections)
}

#[tokio::test]
async fn backoff_resets_after_each_successful_open() {
    let snapshot = serde_json::json!({
        "type": "pool_state",
        "pool": { "running": false, "agents": [] }
    });
    let (addr, connections) = spawn_closing_ws(vec![snapshot.to_string()]).await;

    let consumer = StreamConsumer::connect(format!("ws://{addr}/ws"));

    // Every open succeeds, delivers one snapshot, and drops. With the
    // delay reset on each open the reconnects stay one second apart,
    // so the fourth connection lands around t=3s. An escalating delay
    // (1s, 2s, 4s) would not produce it until t=7s.
    wait_until(
        || connections.load(Ordering::SeqCst) >= 4,
        Duration::from_millis(5_500),
    )
    .await;
    assert!(consumer.pool().is_some());
}

#[tokio::test]
async fn malformed_and_unknown_messages_are_skipped() {
    let snapshot = serde_json::json!({
        "type": "pool_state",
        "pool": { "running": false, "agents": [] }
    });
    let addr = spawn_raw_ws(vec![
        "not json".into(),
        r#"{"type":"mystery"}"#.into(),
        // Unknown agent id: outside the fixed pool, ignored wholesale.
        r#"{"type":"agent_event","agentId":"worker-9","event":{"type":"turn_end"}}"#.into(),
        snapshot.to_string(),
    ])
    .await;

    let consumer = StreamConsumer::connect(format!("ws://{addr}/ws"));
    wait_until(|| consumer.pool().is_some(), Duration::from_secs(2)).await;

    // Only the well-formed snapshot was applied.
    assert_eq!(consumer.revision(), 1);
    for id in AgentId::ALL {
        assert!(consumer.events(id).is_empty());
    }
}

#[tokio::test]
async fn status_tracks_the_connection() {
    use hive_client::ConnectionStatus;

    let server = spawn_server().await;
    let consumer = StreamConsumer::connect(format!("ws://{}/ws", server.addr));
    wait_until(
        || consumer.status() == ConnectionStatus::Connected,
        Duration::from_secs(2),
    )
    .await;

    consumer.teardown();
    wait_until(
        || consumer.status() == ConnectionStatus::Stopped,
        Duration::from_secs(2),
    )
    .await;
}

#[tokio::test]
async fn teardown_stops_applying_events() {
    let server = spawn_server().await;
    let consumer = StreamConsumer::connect(format!("ws://{}/ws", server.addr));
    wait_until(|| consumer.pool().is_some(), Duration::from_secs(2)).await;

    consumer.teardown();
    tokio::time::sleep(Duration::from_millis(100)).await;
    let settled = consumer.revision();

    let api = ApiClient::new(format!("http://{}", server.addr));
    api.send_message(AgentId::Worker2, "after teardown")
        .await
        .unwrap();
    tokio::time::sleep(Duration::from_millis(200)).await;
    assert_eq!(consumer.revision(), settled);
}
