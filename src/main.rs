//! chat-ws demo driver.
//!
//! Starts the chat server, connects a handful of clients concurrently that
//! each send one message and disconnect, then stops the server.

use std::time::Duration;

use anyhow::Context;
use tokio::task::JoinSet;
use tracing_subscriber::EnvFilter;

use chat_ws::{ChatClient, ChatServer, ServerConfig};

const CLIENT_COUNT: usize = 5;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    // Load configuration
    let config = ServerConfig::from_env().context("loading configuration")?;
    let server = ChatServer::new(config)?;

    // Start server
    let listener = server.bind().await?;
    let port = listener.local_addr()?.port();
    let serve = tokio::spawn({
        let server = server.clone();
        async move { server.serve(listener).await }
    });

    let address = format!("ws://127.0.0.1:{port}{}", server.config().path);
    let mut clients = JoinSet::new();
    for i in 0..CLIENT_COUNT {
        let address = address.clone();
        clients.spawn(async move {
            let mut client = ChatClient::connect(&address).await?;
            tracing::info!(client = i, "connected");
            client.send_text(format!("Hello, world! from {i}")).await?;
            client.close().await
        });
    }

    while let Some(joined) = clients.join_next().await {
        match joined {
            Ok(Ok(())) => {}
            Ok(Err(error)) => tracing::error!(%error, "client failed"),
            Err(error) => tracing::error!(%error, "client task panicked"),
        }
    }

    tokio::time::sleep(Duration::from_secs(1)).await;

    server.stop().await?;
    serve.await.context("joining server task")??;

    Ok(())
}
