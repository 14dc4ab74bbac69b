//! WebSocket round-trip tests against a server bound to `127.0.0.1:0`.

use std::sync::Arc;
use std::time::Duration;

use futures::{SinkExt, StreamExt};
use serde_json::Value;
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};

use pascfeed_core::node::BlockRecord;
use pascfeed_core::{Block, Channel, ChannelConfig, Event};
use pascfeed_server::{FeedServer, ServerConfig};

type Client = WebSocketStream<MaybeTlsStream<TcpStream>>;

// ─── Helpers ──────────────────────────────────────────────────────────────────

async fn start(heartbeat_interval_ms: u64) -> (Arc<Channel>, String) {
    let channel = Arc::new(Channel::new(ChannelConfig::default()));
    let config = ServerConfig {
        listen_addr: "127.0.0.1:0".into(),
        heartbeat_interval_ms,
    };
    let server = FeedServer::bind(config, Arc::clone(&channel)).await.unwrap();
    let url = format!("ws://{}", server.local_addr().unwrap());
    tokio::spawn(server.run(std::future::pending()));
    (channel, url)
}

async fn next_json(ws: &mut Client) -> Value {
    loop {
        let msg = tokio::time::timeout(Duration::from_secs(5), ws.next())
            .await
            .expect("timed out waiting for a message")
            .expect("stream ended")
            .expect("websocket error");
        if let Message::Text(text) = msg {
            return serde_json::from_str(&text).unwrap();
        }
    }
}

async fn send(ws: &mut Client, text: &str) {
    ws.send(Message::Text(text.to_string())).await.unwrap();
}

fn block(number: u64) -> Arc<Block> {
    Arc::new(Block::from(BlockRecord {
        block: number,
        ..Default::default()
    }))
}

// ─── Tests ────────────────────────────────────────────────────────────────────

#[tokio::test]
async fn welcome_subscribe_and_receive() {
    let (channel, url) = start(0).await;
    let (mut ws, _) = connect_async(url.as_str()).await.unwrap();

    let welcome = next_json(&mut ws).await;
    assert_eq!(welcome["event"], "welcome");

    send(
        &mut ws,
        r#"{"action":"subscribe","ident":"b","event":"block-mined"}"#,
    )
    .await;
    let ack = next_json(&mut ws).await;
    assert_eq!(ack["event"], "subscription-succeeded");
    assert_eq!(ack["ident"], "b");

    channel.publish(Event::block_mined(block(42), None)).unwrap();
    channel.publish(Event::seal(block(42))).unwrap();

    let mined = next_json(&mut ws).await;
    assert_eq!(mined["event"], "block-mined");
    assert_eq!(mined["ident"], "b");
    assert_eq!(mined["block"]["number"], 42);
}

#[tokio::test]
async fn invalid_message_gets_inline_error() {
    let (channel, url) = start(0).await;
    let (mut ws, _) = connect_async(url.as_str()).await.unwrap();
    next_json(&mut ws).await;

    send(&mut ws, "{not json").await;
    let reply = next_json(&mut ws).await;
    assert_eq!(reply["error"], true);
    assert!(reply["message"].as_str().unwrap().contains("invalid JSON"));
    assert_eq!(channel.subscription_count(), 0);
}

#[tokio::test]
async fn heartbeat_reaches_ping_subscribers() {
    let (_channel, url) = start(20).await;
    let (mut ws, _) = connect_async(url.as_str()).await.unwrap();
    next_json(&mut ws).await;

    send(&mut ws, r#"{"action":"subscribe","ident":"hb","event":"ping"}"#).await;
    assert_eq!(next_json(&mut ws).await["event"], "subscription-succeeded");

    let ping = next_json(&mut ws).await;
    assert_eq!(ping["event"], "ping");
    assert_eq!(ping["ident"], "hb");
    assert!(ping["timestamp"].is_i64());
}

#[tokio::test]
async fn closing_the_socket_drops_subscriptions() {
    let (channel, url) = start(0).await;
    let (mut ws, _) = connect_async(url.as_str()).await.unwrap();
    next_json(&mut ws).await;
    send(&mut ws, r#"{"action":"subscribe","ident":"p","event":"ping"}"#).await;
    next_json(&mut ws).await;
    assert_eq!(channel.subscription_count(), 1);

    ws.close(None).await.unwrap();

    for _ in 0..100 {
        if channel.client_count() == 0 {
            break;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    assert_eq!(channel.client_count(), 0);
    assert_eq!(channel.subscription_count(), 0);
}
