//! WebSocket accept loop, per-connection tasks and the heartbeat task.
//!
//! Each connection runs in its own task that multiplexes two directions:
//! inbound text frames are handed to [`Channel::handle_message`], and messages
//! queued for the client by the channel are written out as text frames. The
//! client is disconnected from the channel when either side closes.

use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use futures::{SinkExt, StreamExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::task::JoinHandle;
use tokio_tungstenite::{accept_async, tungstenite::Message};

use pascfeed_core::{Channel, Event};

use crate::config::ServerConfig;
use crate::error::ServerError;

pub struct FeedServer {
    listener: TcpListener,
    channel: Arc<Channel>,
    config: ServerConfig,
}

impl FeedServer {
    /// Bind the listening socket.
    pub async fn bind(config: ServerConfig, channel: Arc<Channel>) -> Result<Self, ServerError> {
        let listener = TcpListener::bind(&config.listen_addr).await?;
        Ok(Self {
            listener,
            channel,
            config,
        })
    }

    pub fn local_addr(&self) -> Result<SocketAddr, ServerError> {
        Ok(self.listener.local_addr()?)
    }

    /// Accept connections until `shutdown` resolves.
    pub async fn run(self, shutdown: impl Future<Output = ()>) -> Result<(), ServerError> {
        tokio::pin!(shutdown);
        let addr = self.local_addr()?;
        tracing::info!(addr = %addr, "websocket server listening");

        let heartbeat = self
            .config
            .heartbeat_interval()
            .map(|every| spawn_heartbeat(Arc::clone(&self.channel), every));

        loop {
            tokio::select! {
                _ = &mut shutdown => break,
                accepted = self.listener.accept() => match accepted {
                    Ok((stream, peer)) => {
                        let channel = Arc::clone(&self.channel);
                        tokio::spawn(async move {
                            if let Err(e) = handle_connection(stream, peer, channel).await {
                                tracing::debug!(peer = %peer, error = %e, "connection closed with error");
                            }
                        });
                    }
                    Err(e) => tracing::warn!(error = %e, "accept failed"),
                },
            }
        }

        if let Some(heartbeat) = heartbeat {
            heartbeat.abort();
        }
        tracing::info!("websocket server stopped");
        Ok(())
    }
}

/// Serve one client until it disconnects.
pub async fn handle_connection(
    stream: TcpStream,
    peer: SocketAddr,
    channel: Arc<Channel>,
) -> Result<(), ServerError> {
    let ws = accept_async(stream).await?;
    let (mut write, mut read) = ws.split();
    let (client, mut outbound) = channel.connect();
    tracing::info!(client = %client, peer = %peer, "client connected");

    let result = loop {
        tokio::select! {
            queued = outbound.recv() => match queued {
                Some(msg) => {
                    if let Err(e) = write.send(Message::Text(msg.to_text())).await {
                        break Err(e.into());
                    }
                }
                None => break Ok(()),
            },
            incoming = read.next() => match incoming {
                Some(Ok(Message::Text(text))) => channel.handle_message(client, &text),
                Some(Ok(Message::Binary(bytes))) => {
                    channel.handle_message(client, &String::from_utf8_lossy(&bytes))
                }
                Some(Ok(Message::Close(_))) | None => break Ok(()),
                Some(Ok(_)) => {}
                Some(Err(e)) => break Err(e.into()),
            },
        }
    };

    channel.disconnect(client);
    tracing::info!(client = %client, "client disconnected");
    result
}

/// Publish a `ping` event every `every`.
pub fn spawn_heartbeat(channel: Arc<Channel>, every: Duration) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(every);
        interval.tick().await;
        loop {
            interval.tick().await;
            if let Err(e) = channel.publish(Event::ping()) {
                tracing::warn!(error = %e, "heartbeat publish failed");
            }
        }
    })
}
