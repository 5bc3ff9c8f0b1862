//! End-to-end tests against a real listener on an OS-assigned port.

#![allow(clippy::panic)]

use std::collections::HashSet;
use std::net::{Ipv4Addr, SocketAddr};
use std::time::Duration;

use chat_ws::api::handlers::system::HealthResponse;
use chat_ws::domain::{ChatMessage, MessageBody};
use chat_ws::{ChatClient, ChatError, ChatServer, ServerConfig};
use futures_util::{SinkExt, StreamExt};
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::{self, Message, protocol::frame::coding::CloseCode};

const PATH: &str = "/chat/ws";
const WAIT: Duration = Duration::from_secs(5);

struct Running {
    server: ChatServer,
    addr: SocketAddr,
    serve: JoinHandle<Result<(), ChatError>>,
}

impl Running {
    fn ws_url(&self) -> String {
        format!("ws://{}{PATH}", self.addr)
    }

    fn http_url(&self, path: &str) -> String {
        format!("http://{}{path}", self.addr)
    }

    async fn shutdown(self) {
        tokio_test::assert_ok!(self.server.stop().await);
        let Ok(joined) = tokio::time::timeout(WAIT, self.serve).await else {
            panic!("listener did not shut down");
        };
        let Ok(served) = joined else {
            panic!("serve task panicked");
        };
        tokio_test::assert_ok!(served);
    }
}

async fn start(config: ServerConfig) -> Running {
    let config = config.with_host(Ipv4Addr::LOCALHOST.into()).with_port(0);
    let Ok(server) = ChatServer::new(config) else {
        panic!("valid config");
    };
    let Ok(listener) = server.bind().await else {
        panic!("bind failed");
    };
    let Ok(addr) = listener.local_addr() else {
        panic!("no local addr");
    };
    let serve = tokio::spawn({
        let server = server.clone();
        async move { server.serve(listener).await }
    });
    Running {
        server,
        addr,
        serve,
    }
}

async fn subscribe(server: &ChatServer) -> broadcast::Receiver<ChatMessage> {
    let Some(rx) = server.messages().subscribe().await else {
        panic!("bus should be open");
    };
    rx
}

async fn next_message(rx: &mut broadcast::Receiver<ChatMessage>) -> ChatMessage {
    let Ok(received) = tokio::time::timeout(WAIT, rx.recv()).await else {
        panic!("no message within timeout");
    };
    let Ok(message) = received else {
        panic!("bus closed early");
    };
    message
}

async fn wait_for_connections(server: &ChatServer, expected: usize) {
    let waited = tokio::time::timeout(WAIT, async {
        while server.connection_count().await != expected {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await;
    if waited.is_err() {
        panic!(
            "expected {expected} connection(s), found {}",
            server.connection_count().await
        );
    }
}

async fn connect(running: &Running) -> ChatClient {
    let Ok(client) = ChatClient::connect(&running.ws_url()).await else {
        panic!("connect failed");
    };
    client
}

#[tokio::test]
async fn text_frame_arrives_byte_for_byte() {
    let running = start(ServerConfig::new(PATH)).await;
    let mut rx = subscribe(&running.server).await;

    let mut client = connect(&running).await;
    tokio_test::assert_ok!(client.send_text("Hello, world!").await);

    let message = next_message(&mut rx).await;
    assert_eq!(message.body, MessageBody::Text("Hello, world!".to_string()));
    assert_eq!(running.server.connection_ids().await, vec![message.author]);

    tokio_test::assert_ok!(client.close().await);
    running.shutdown().await;
}

#[tokio::test]
async fn binary_frame_arrives_byte_for_byte() {
    let running = start(ServerConfig::new(PATH)).await;
    let mut rx = subscribe(&running.server).await;

    let Ok((mut stream, _)) = tokio_tungstenite::connect_async(running.ws_url()).await else {
        panic!("connect failed");
    };
    let payload = vec![0u8, 159, 146, 150];
    let Ok(()) = stream.send(Message::binary(payload.clone())).await else {
        panic!("send failed");
    };

    let message = next_message(&mut rx).await;
    assert_eq!(message.body, MessageBody::Binary(payload));
    assert_eq!(message.body.kind(), "binary");

    let Ok(()) = stream.close(None).await else {
        panic!("close failed");
    };
    wait_for_connections(&running.server, 0).await;
    running.shutdown().await;
}

#[tokio::test]
async fn five_concurrent_clients_each_deliver_one_message() {
    let running = start(ServerConfig::new(PATH)).await;
    let mut rx = subscribe(&running.server).await;

    let mut tasks = Vec::new();
    for i in 0..5 {
        let url = running.ws_url();
        tasks.push(tokio::spawn(async move {
            let mut client = ChatClient::connect(&url).await?;
            client.send_text(format!("Hello, world! from {i}")).await?;
            client.close().await
        }));
    }
    for task in tasks {
        let Ok(result) = task.await else {
            panic!("client task panicked");
        };
        tokio_test::assert_ok!(result);
    }

    let mut bodies = HashSet::new();
    let mut authors = HashSet::new();
    for _ in 0..5 {
        let message = next_message(&mut rx).await;
        let Some(text) = message.body.as_text() else {
            panic!("expected a text frame");
        };
        bodies.insert(text.to_string());
        authors.insert(message.author);
    }
    let expected: HashSet<String> = (0..5).map(|i| format!("Hello, world! from {i}")).collect();
    assert_eq!(bodies, expected);
    assert_eq!(authors.len(), 5);
    assert!(rx.try_recv().is_err());

    running.shutdown().await;
}

#[tokio::test]
async fn read_loop_ends_after_client_close() {
    let running = start(ServerConfig::new(PATH)).await;

    let client = connect(&running).await;
    wait_for_connections(&running.server, 1).await;

    tokio_test::assert_ok!(client.close().await);
    wait_for_connections(&running.server, 0).await;

    running.shutdown().await;
}

#[tokio::test]
async fn read_loop_ends_after_abrupt_disconnect() {
    let running = start(ServerConfig::new(PATH)).await;

    let client = connect(&running).await;
    wait_for_connections(&running.server, 1).await;

    drop(client);
    wait_for_connections(&running.server, 0).await;

    running.shutdown().await;
}

#[tokio::test]
async fn stop_cancels_and_drains_open_connections() {
    let running = start(ServerConfig::new(PATH)).await;

    let Ok((mut stream, _)) = tokio_tungstenite::connect_async(running.ws_url()).await else {
        panic!("connect failed");
    };
    wait_for_connections(&running.server, 1).await;

    let server = running.server.clone();
    running.shutdown().await;
    assert_eq!(server.connection_count().await, 0);
    assert!(server.messages().is_closed().await);

    let Ok(Some(Ok(Message::Close(Some(frame))))) = tokio::time::timeout(WAIT, stream.next()).await
    else {
        panic!("expected a close frame from the server");
    };
    assert_eq!(frame.code, CloseCode::Away);

    // A second stop is a no-op.
    tokio_test::assert_ok!(server.stop().await);
}

#[tokio::test]
async fn disconnect_ends_one_connection() {
    let running = start(ServerConfig::new(PATH)).await;
    let mut rx = subscribe(&running.server).await;

    let other = connect(&running).await;
    let Ok((mut target, _)) = tokio_tungstenite::connect_async(running.ws_url()).await else {
        panic!("connect failed");
    };
    wait_for_connections(&running.server, 2).await;

    let Ok(()) = target.send(Message::text("ping".to_string())).await else {
        panic!("send failed");
    };
    let target_id = next_message(&mut rx).await.author;

    assert!(running.server.disconnect(target_id).await);
    wait_for_connections(&running.server, 1).await;
    assert!(!running.server.connection_ids().await.contains(&target_id));

    let Ok(Some(Ok(Message::Close(_)))) = tokio::time::timeout(WAIT, target.next()).await else {
        panic!("expected a close frame on the disconnected socket");
    };

    tokio_test::assert_ok!(other.close().await);
    running.shutdown().await;
}

#[tokio::test]
async fn malformed_upgrade_fails_only_that_request() {
    let running = start(ServerConfig::new(PATH)).await;

    let Ok(response) = reqwest::get(running.http_url(PATH)).await else {
        panic!("http request failed");
    };
    assert!(response.status().is_client_error());

    let mut client = connect(&running).await;
    tokio_test::assert_ok!(client.send_text("still serving").await);
    tokio_test::assert_ok!(client.close().await);

    running.shutdown().await;
}

#[tokio::test]
async fn connections_beyond_the_limit_are_refused() {
    let running = start(ServerConfig::new(PATH).with_max_connections(1)).await;

    let first = connect(&running).await;
    wait_for_connections(&running.server, 1).await;

    match ChatClient::connect(&running.ws_url()).await {
        Err(ChatError::Dial(tungstenite::Error::Http(response))) => {
            assert_eq!(response.status().as_u16(), 503);
        }
        Err(other) => panic!("unexpected error: {other}"),
        Ok(_) => panic!("second connection should be refused"),
    }

    tokio_test::assert_ok!(first.close().await);
    wait_for_connections(&running.server, 0).await;

    let second = connect(&running).await;
    tokio_test::assert_ok!(second.close().await);

    running.shutdown().await;
}

#[tokio::test]
async fn health_counts_open_connections() {
    let running = start(ServerConfig::new(PATH)).await;
    let client = connect(&running).await;
    wait_for_connections(&running.server, 1).await;

    let Ok(response) = reqwest::get(running.http_url("/health")).await else {
        panic!("http request failed");
    };
    assert!(response.status().is_success());
    let Ok(health) = response.json::<HealthResponse>().await else {
        panic!("body is not a health response");
    };
    assert_eq!(health.status, "healthy");
    assert_eq!(health.connections, 1);

    tokio_test::assert_ok!(client.close().await);
    running.shutdown().await;
}

#[tokio::test]
async fn no_connections_after_stop() {
    let running = start(ServerConfig::new(PATH)).await;
    let url = running.ws_url();
    running.shutdown().await;

    let result = ChatClient::connect(&url).await;
    assert!(matches!(result, Err(ChatError::Dial(_))));
}
