//! STOMP over WebSocket.
//!
//! The open future performs the CONNECT/CONNECTED exchange, so a broker that
//! rejects us with ERROR fails the attempt instead of producing a link. After
//! that, one background task owns the socket: it turns [`Outbound`] commands
//! into SUBSCRIBE/SEND/DISCONNECT frames, forwards MESSAGE bodies, sends
//! heart-beats and watches for the broker's.

use crate::transport::{self, Connector, Link, LinkEvent, LinkPeer, Outbound};
use crate::ws::Socket;
use chatwire_core::stomp::{self, Command, Frame, Negotiated};
use chatwire_core::{Heartbeat, SessionConfig, TransportError};
use futures_util::future::BoxFuture;
use futures_util::{SinkExt, StreamExt};
use tokio::time::Instant;
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::Message;

pub struct StompConnector {
    config: SessionConfig,
}

impl StompConnector {
    pub fn new(config: SessionConfig) -> Self {
        Self { config }
    }
}

impl Connector for StompConnector {
    fn open(&self, nickname: &str) -> BoxFuture<'static, Result<Link, TransportError>> {
        let url = self.config.endpoint_for(nickname);
        let timeout = self.config.connect_timeout();
        let heartbeat = self.config.heartbeat;
        let host = self.config.stomp.host.clone();
        let publish = self.config.stomp.publish.clone();

        Box::pin(async move {
            let url = url?;
            let host = host
                .or_else(|| url.host_str().map(str::to_string))
                .unwrap_or_else(|| "localhost".to_string());
            tracing::debug!(%url, %host, "opening STOMP session");

            let (socket, connected) =
                tokio::time::timeout(timeout, handshake(url.to_string(), &host, heartbeat))
                    .await
                    .map_err(|_| TransportError::Timeout)??;

            let negotiated = stomp::negotiate(heartbeat, connected.get("heart-beat"))
                .map_err(|e| TransportError::Connect(e.to_string()))?;
            tracing::debug!(
                version = connected.get("version").unwrap_or("1.0"),
                ?negotiated,
                "STOMP session established"
            );

            let (link, peer) = Link::channel();
            tokio::spawn(run(socket, peer, negotiated, publish));
            Ok(link)
        })
    }
}

async fn handshake(
    url: String,
    host: &str,
    heartbeat: Heartbeat,
) -> Result<(Socket, Frame), TransportError> {
    let (mut socket, _response) = connect_async(url)
        .await
        .map_err(|e| TransportError::Connect(e.to_string()))?;

    let connect = Frame::connect(host, heartbeat).encode();
    socket
        .send(Message::Text(connect.into()))
        .await
        .map_err(|e| TransportError::Connect(e.to_string()))?;

    loop {
        let msg = match socket.next().await {
            Some(Ok(msg)) => msg,
            Some(Err(e)) => return Err(TransportError::Connect(e.to_string())),
            None => return Err(TransportError::Connect("closed during STOMP handshake".into())),
        };
        let text = match msg {
            Message::Text(text) => text,
            Message::Close(_) => {
                return Err(TransportError::Connect("closed during STOMP handshake".into()));
            }
            _ => continue,
        };
        let frame = match Frame::decode(text.as_str()) {
            Ok(Some(frame)) => frame,
            Ok(None) => continue,
            Err(e) => return Err(TransportError::Connect(e.to_string())),
        };
        match frame.command() {
            Command::Connected => return Ok((socket, frame)),
            Command::Error => {
                let reason = frame.get("message").unwrap_or(frame.body()).to_string();
                return Err(TransportError::Connect(format!("broker refused: {reason}")));
            }
            other => tracing::debug!("ignoring {} frame during handshake", other),
        }
    }
}

async fn run(socket: Socket, mut peer: LinkPeer, negotiated: Negotiated, publish: String) {
    let (mut sink, mut stream) = socket.split();
    let mut heartbeat = negotiated.send_every.map(transport::every);
    // The broker may be late by up to one extra interval before we give up.
    let silence_limit = negotiated.expect_every.map(|every| every * 2);
    let mut last_seen = Instant::now();
    let mut next_subscription = 0u32;

    loop {
        let deadline = silence_limit.map(|limit| last_seen + limit);

        tokio::select! {
            command = peer.outbound.recv() => {
                let frame = match command {
                    Some(Outbound::Subscribe { destination }) => {
                        let id = format!("sub-{next_subscription}");
                        next_subscription += 1;
                        Frame::subscribe(&id, &destination)
                    }
                    Some(Outbound::Publish(json)) => Frame::send(&publish, json),
                    Some(Outbound::Close) | None => {
                        let bye = Frame::disconnect("bye").encode();
                        let _ = sink.send(Message::Text(bye.into())).await;
                        let _ = sink.close().await;
                        peer.emit(LinkEvent::Closed { clean: true });
                        return;
                    }
                };
                if let Err(e) = sink.send(Message::Text(frame.encode().into())).await {
                    tracing::warn!("STOMP send failed: {}", e);
                    peer.emit(LinkEvent::Closed { clean: false });
                    return;
                }
            }

            msg = stream.next() => {
                last_seen = Instant::now();
                match msg {
                    Some(Ok(Message::Text(text))) => {
                        if let Some(event) = inbound(text.as_str()) {
                            let fatal = matches!(event, LinkEvent::Error(_));
                            peer.emit(event);
                            if fatal {
                                let _ = sink.close().await;
                                return;
                            }
                        }
                    }
                    Some(Ok(Message::Close(frame))) => {
                        tracing::debug!(?frame, "broker closed websocket");
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
                }
            }

            () = transport::tick(&mut heartbeat) => {
                if sink.send(Message::Text(stomp::HEARTBEAT.to_string().into())).await.is_err() {
                    peer.emit(LinkEvent::Closed { clean: false });
                    return;
                }
            }

            () = transport::until(deadline) => {
                tracing::warn!("no heart-beat from broker, dropping connection");
                let _ = sink.close().await;
                peer.emit(LinkEvent::Closed { clean: false });
                return;
            }
        }
    }
}

/// Map one inbound WebSocket text message to a link event.
fn inbound(text: &str) -> Option<LinkEvent> {
    let frame = match Frame::decode(text) {
        Ok(Some(frame)) => frame,
        Ok(None) => return None,
        Err(e) => {
            tracing::warn!("dropping malformed STOMP frame: {}", e);
            return None;
        }
    };
    match frame.command() {
        Command::Message => Some(LinkEvent::Frame(frame.body().to_string())),
        Command::Error => {
            let message = frame.get("message").unwrap_or("unknown error");
            tracing::error!("Broker reported error: {}", message);
            if !frame.body().is_empty() {
                tracing::error!("Additional details: {}", frame.body());
            }
            Some(LinkEvent::Error(message.to_string()))
        }
        other => {
            tracing::debug!("ignoring {} frame", other);
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn message_frames_become_chat_payloads() {
        let raw = Frame::new(Command::Message)
            .header("destination", "/topic/messages")
            .with_body(r#"{"sender":"bob","content":"hey"}"#)
            .encode();
        assert_eq!(
            inbound(&raw),
            Some(LinkEvent::Frame(r#"{"sender":"bob","content":"hey"}"#.into()))
        );
    }

    #[test]
    fn error_frames_carry_the_message_header() {
        let raw = Frame::new(Command::Error)
            .header("message", "no such destination")
            .encode();
        assert_eq!(
            inbound(&raw),
            Some(LinkEvent::Error("no such destination".into()))
        );
    }

    #[test]
    fn heartbeats_receipts_and_garbage_are_swallowed() {
        assert_eq!(inbound("\n"), None);
        let receipt = Frame::new(Command::Receipt).header("receipt-id", "bye");
        assert_eq!(inbound(&receipt.encode()), None);
        assert_eq!(inbound("BOGUS\n\n\0"), None);
    }
}
