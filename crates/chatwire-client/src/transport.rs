//! The seam between a session and a concrete messaging channel.
//!
//! A [`Connector`] opens a [`Link`]: a pair of channels to a background task
//! that owns the socket. The session pushes [`Outbound`] commands in and
//! receives [`LinkEvent`]s out, so it never touches the socket directly.

use chatwire_core::TransportError;
use futures_util::future::BoxFuture;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::{Instant, Interval};

/// Command for the socket task.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outbound {
    /// Subscribe to the inbound topic. Ignored by transports without topics.
    Subscribe { destination: String },
    /// Publish one JSON payload.
    Publish(String),
    /// Close the channel cleanly.
    Close,
}

/// Something that happened on the channel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LinkEvent {
    /// One inbound chat payload.
    Frame(String),
    /// The broker reported a protocol-level error and dropped us.
    Error(String),
    /// The channel is gone. `clean` is false when it dropped without a
    /// close handshake.
    Closed { clean: bool },
}

/// The session's end of an open channel.
#[derive(Debug)]
pub struct Link {
    outbound: mpsc::UnboundedSender<Outbound>,
    events: mpsc::UnboundedReceiver<LinkEvent>,
}

/// The socket task's end of an open channel.
#[derive(Debug)]
pub struct LinkPeer {
    pub outbound: mpsc::UnboundedReceiver<Outbound>,
    pub events: mpsc::UnboundedSender<LinkEvent>,
}

impl Link {
    pub fn channel() -> (Link, LinkPeer) {
        let (outbound_tx, outbound_rx) = mpsc::unbounded_channel();
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        (
            Link {
                outbound: outbound_tx,
                events: events_rx,
            },
            LinkPeer {
                outbound: outbound_rx,
                events: events_tx,
            },
        )
    }

    pub fn into_parts(
        self,
    ) -> (
        mpsc::UnboundedSender<Outbound>,
        mpsc::UnboundedReceiver<LinkEvent>,
    ) {
        (self.outbound, self.events)
    }

    /// Ask the socket task to close.
    pub fn close(self) {
        let _ = self.outbound.send(Outbound::Close);
    }
}

impl LinkPeer {
    /// Report an event. Returns false once the session has hung up.
    pub fn emit(&self, event: LinkEvent) -> bool {
        self.events.send(event).is_ok()
    }
}

/// Opens channels for a nickname.
pub trait Connector: Send + Sync + 'static {
    fn open(&self, nickname: &str) -> BoxFuture<'static, Result<Link, TransportError>>;
}

/// Resolves on the next tick, or never when there is no interval.
pub(crate) async fn tick(interval: &mut Option<Interval>) {
    match interval {
        Some(interval) => {
            interval.tick().await;
        }
        None => std::future::pending().await,
    }
}

/// Resolves at `deadline`, or never when there is none.
pub(crate) async fn until(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => tokio::time::sleep_until(deadline).await,
        None => std::future::pending().await,
    }
}

/// An interval whose first tick is one period from now.
pub(crate) fn every(period: Duration) -> Interval {
    let mut interval = tokio::time::interval_at(Instant::now() + period, period);
    interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
    interval
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn link_and_peer_are_wired_crosswise() {
        let (link, mut peer) = Link::channel();
        let (outbound, mut events) = link.into_parts();

        outbound.send(Outbound::Publish("{}".into())).unwrap();
        assert_eq!(peer.outbound.recv().await, Some(Outbound::Publish("{}".into())));

        assert!(peer.emit(LinkEvent::Frame("x".into())));
        assert_eq!(events.recv().await, Some(LinkEvent::Frame("x".into())));

        drop(events);
        assert!(!peer.emit(LinkEvent::Closed { clean: true }));
    }

    #[tokio::test]
    async fn close_sends_close_command() {
        let (link, mut peer) = Link::channel();
        link.close();
        assert_eq!(peer.outbound.recv().await, Some(Outbound::Close));
        assert_eq!(peer.outbound.recv().await, None);
    }
}
