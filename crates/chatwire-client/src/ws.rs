//! Raw WebSocket transport.
//!
//! One text message per chat payload. The username is carried in the URL
//! path, so there is no handshake beyond the WebSocket upgrade.

use crate::transport::{self, Connector, Link, LinkEvent, LinkPeer, Outbound};
use chatwire_core::{SessionConfig, TransportError};
use futures_util::future::BoxFuture;
use futures_util::{SinkExt, StreamExt};
use std::time::Duration;
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async};

pub(crate) type Socket = WebSocketStream<MaybeTlsStream<TcpStream>>;

pub struct WebSocketConnector {
    config: SessionConfig,
}

impl WebSocketConnector {
    pub fn new(config: SessionConfig) -> Self {
        Self { config }
    }
}

impl Connector for WebSocketConnector {
    fn open(&self, nickname: &str) -> BoxFuture<'static, Result<Link, TransportError>> {
        let url = self.config.endpoint_for(nickname);
        let timeout = self.config.connect_timeout();
        let outgoing_ms = self.config.heartbeat.outgoing_ms;
        let ping_every = (outgoing_ms > 0).then(|| Duration::from_millis(outgoing_ms));

        Box::pin(async move {
            let url = url?;
            tracing::debug!(%url, "opening websocket");
            let (socket, _response) = tokio::time::timeout(timeout, connect_async(url.to_string()))
                .await
                .map_err(|_| TransportError::Timeout)?
                .map_err(|e| TransportError::Connect(e.to_string()))?;

            let (link, peer) = Link::channel();
            tokio::spawn(run(socket, peer, ping_every));
            Ok(link)
        })
    }
}

async fn run(socket: Socket, mut peer: LinkPeer, ping_every: Option<Duration>) {
    let (mut sink, mut stream) = socket.split();
    let mut ping = ping_every.map(transport::every);

    loop {
        tokio::select! {
            command = peer.outbound.recv() => match command {
                Some(Outbound::Publish(text)) => {
                    if let Err(e) = sink.send(Message::Text(text.into())).await {
                        tracing::warn!("WebSocket send failed: {}", e);
                        peer.emit(LinkEvent::Closed { clean: false });
                        return;
                    }
                }
                // The URL already selects the room.
                Some(Outbound::Subscribe { .. }) => {}
                Some(Outbound::Close) | None => {
                    let _ = sink.send(Message::Close(None)).await;
                    let _ = sink.close().await;
                    peer.emit(LinkEvent::Closed { clean: true });
                    return;
                }
            },

            msg = stream.next() => match msg {
                Some(Ok(Message::Text(text))) => {
                    peer.emit(LinkEvent::Frame(text.as_str().to_owned()));
                }
                Some(Ok(Message::Close(frame))) => {
                    tracing::debug!(?frame, "server closed websocket");
                    peer.emit(LinkEvent::Closed { clean: true });
                    return;
                }
                Some(Ok(_)) => {}
                Some(Err(e)) => {
                    tracing::debug!("WebSocket error: {}", e);
                    peer.emit(LinkEvent::Closed { clean: false });
                    return;
                }
                None => {
                    peer.emit(LinkEvent::Closed { clean: false });
                    return;
                }
            },

            () = transport::tick(&mut ping) => {
                if sink.send(Message::Ping(Vec::<u8>::new().into())).await.is_err() {
                    peer.emit(LinkEvent::Closed { clean: false });
                    return;
                }
            }
        }
    }
}
