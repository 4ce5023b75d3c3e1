//! The chat session: one channel handle, its lifecycle, and reconnection.
//!
//! All state lives in [`ChatSession`] and is only mutated from the task that
//! owns it. Background tasks (the open attempt, the link-event forwarder and
//! the timers) never touch the session; they post [`SessionEvent`]s that the
//! owner applies through [`ChatSession::pump`].
//!
//! Each event is stamped with the generation current when it was scheduled.
//! Connecting, tearing down and disconnecting bump the generation, so a stale
//! timer or a late event from a dropped link is ignored.

use crate::transport::{Connector, Link, LinkEvent, Outbound};
use crate::view::View;
use chatwire_core::{
    ChatError, ChatMessage, ConnectionState, MessageLog, ReconnectState, Reconnector,
    RetryDecision, SessionConfig, TransportError, ValidationError,
};
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

const STATUS_CONNECTED: &str = "Connected to chat";
const STATUS_DISCONNECTED: &str = "Disconnected from chat";

#[derive(Debug)]
enum SessionEvent {
    Opened {
        generation: u64,
        result: Result<Link, TransportError>,
    },
    Link {
        generation: u64,
        event: LinkEvent,
    },
    RetryDue {
        generation: u64,
    },
    LeaveGraceElapsed {
        generation: u64,
    },
}

#[derive(Default)]
struct Tasks {
    opening: Option<JoinHandle<()>>,
    forwarding: Option<JoinHandle<()>>,
    retry: Option<JoinHandle<()>>,
    leave: Option<JoinHandle<()>>,
}

impl Tasks {
    fn abort_all(&mut self) {
        for slot in [
            &mut self.opening,
            &mut self.forwarding,
            &mut self.retry,
            &mut self.leave,
        ] {
            abort(slot);
        }
    }
}

/// Abort a pending task. Returns whether there was one.
fn abort(slot: &mut Option<JoinHandle<()>>) -> bool {
    match slot.take() {
        Some(handle) => {
            handle.abort();
            true
        }
        None => false,
    }
}

/// A single user's connection to the chat.
///
/// Operations must be called from within a tokio runtime.
pub struct ChatSession<V> {
    config: SessionConfig,
    connector: Arc<dyn Connector>,
    view: V,
    state: ConnectionState,
    reconnector: Reconnector,
    log: MessageLog,
    nickname: Option<String>,
    generation: u64,
    outbound: Option<mpsc::UnboundedSender<Outbound>>,
    leaving: bool,
    tasks: Tasks,
    events_tx: mpsc::UnboundedSender<SessionEvent>,
    events_rx: mpsc::UnboundedReceiver<SessionEvent>,
}

impl<V: View> ChatSession<V> {
    pub fn new(config: SessionConfig, connector: Arc<dyn Connector>, view: V) -> Self {
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        Self {
            reconnector: Reconnector::new(config.retry),
            log: MessageLog::new(config.order(), config.history_limit),
            config,
            connector,
            view,
            state: ConnectionState::Disconnected,
            nickname: None,
            generation: 0,
            outbound: None,
            leaving: false,
            tasks: Tasks::default(),
            events_tx,
            events_rx,
        }
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    pub fn state(&self) -> ConnectionState {
        self.state
    }

    pub fn reconnect_state(&self) -> ReconnectState {
        self.reconnector.state()
    }

    pub fn retry_attempts(&self) -> u32 {
        self.reconnector.attempts()
    }

    /// Whether a reconnect timer is pending.
    pub fn retry_pending(&self) -> bool {
        self.tasks.retry.is_some()
    }

    /// Whether a leave notice has been sent and teardown is pending.
    pub fn is_leaving(&self) -> bool {
        self.leaving
    }

    pub fn nickname(&self) -> Option<&str> {
        self.nickname.as_deref()
    }

    pub fn messages(&self) -> &MessageLog {
        &self.log
    }

    pub fn view(&self) -> &V {
        &self.view
    }

    pub fn view_mut(&mut self) -> &mut V {
        &mut self.view
    }

    /// Open a channel for `nickname`.
    ///
    /// Returns immediately; the outcome arrives through [`pump`](Self::pump).
    /// A call while connecting or connected is a no-op.
    pub fn connect(&mut self, nickname: &str) -> Result<(), ChatError> {
        let nickname = nickname.trim();
        if nickname.is_empty() {
            return Err(ValidationError::MissingNickname.into());
        }
        if self.state != ConnectionState::Disconnected || self.leaving {
            tracing::debug!(state = %self.state, "connect ignored, session already active");
            return Ok(());
        }

        abort(&mut self.tasks.retry);
        self.nickname = Some(nickname.to_string());
        self.open();
        Ok(())
    }

    /// Leave the chat.
    ///
    /// When connected, a leave notice is published and the channel is torn
    /// down after the configured grace period. Otherwise any half-open
    /// channel is dropped at once. Pending reconnects are always cancelled.
    pub fn disconnect(&mut self) {
        let had_retry = abort(&mut self.tasks.retry);

        if self.leaving {
            tracing::debug!("disconnect already in progress");
            return;
        }

        if self.state == ConnectionState::Connected {
            if let Some(nickname) = self.nickname.clone() {
                self.send_system(format!("{nickname} left the chat"));
            }
            self.leaving = true;
            let generation = self.generation;
            let grace = self.config.leave_grace();
            let events = self.events_tx.clone();
            self.tasks.leave = Some(tokio::spawn(async move {
                tokio::time::sleep(grace).await;
                let _ = events.send(SessionEvent::LeaveGraceElapsed { generation });
            }));
            return;
        }

        if self.state == ConnectionState::Disconnected
            && !had_retry
            && self.outbound.is_none()
            && self.log.is_empty()
        {
            tracing::debug!("disconnect ignored, not connected");
            return;
        }

        self.finish_disconnect();
    }

    /// Publish a chat message.
    ///
    /// Nothing is sent when either field is blank or the session is not
    /// connected. A transport failure is reported to the view and returned;
    /// the connection state is left alone.
    pub fn send_message(&mut self, sender: &str, text: &str) -> Result<(), ChatError> {
        let sender = sender.trim();
        let text = text.trim();
        if sender.is_empty() {
            return Err(ValidationError::MissingNickname.into());
        }
        if text.is_empty() {
            return Err(ValidationError::MissingText.into());
        }
        if self.state != ConnectionState::Connected || self.leaving {
            return Err(ChatError::NotConnected);
        }

        let payload = ChatMessage::new(sender, text).encode_for(self.config.transport)?;
        if let Err(e) = self.publish(Outbound::Publish(payload)) {
            tracing::warn!("Error sending message: {}", e);
            self.view.error("Failed to send message. Please try again.");
            return Err(e.into());
        }
        Ok(())
    }

    /// Apply one raw inbound payload.
    ///
    /// Malformed payloads are logged and dropped without touching the log or
    /// the connection state.
    pub fn on_inbound_frame(&mut self, raw: &str) {
        match ChatMessage::from_json(raw) {
            Ok(message) => {
                self.log.push(message);
                if let Some(newest) = self.log.newest() {
                    self.view.render(newest, &self.log);
                }
            }
            Err(e) => tracing::warn!("Error parsing message: {}", e),
        }
    }

    /// Wait for the next background event and apply it.
    ///
    /// Cancel-safe: dropping the future before it resolves loses nothing.
    pub async fn pump(&mut self) {
        if let Some(event) = self.events_rx.recv().await {
            self.handle(event);
        }
    }

    fn handle(&mut self, event: SessionEvent) {
        match event {
            SessionEvent::Opened { generation, result } => {
                if generation != self.generation {
                    if let Ok(link) = result {
                        link.close();
                    }
                    return;
                }
                self.tasks.opening = None;
                match result {
                    Ok(link) => self.on_open(link),
                    Err(e) => {
                        tracing::warn!("Connection error: {}", e);
                        self.on_failure("Connection failed");
                    }
                }
            }

            SessionEvent::Link { generation, event } => {
                if generation != self.generation {
                    return;
                }
                match event {
                    LinkEvent::Frame(raw) => self.on_inbound_frame(&raw),
                    _ if self.leaving => self.finish_disconnect(),
                    LinkEvent::Error(message) => {
                        tracing::warn!("Broker reported error: {}", message);
                        self.on_failure("Server error occurred");
                    }
                    LinkEvent::Closed { clean: true } => {
                        tracing::info!("connection closed by server");
                        self.finish_disconnect();
                    }
                    LinkEvent::Closed { clean: false } => {
                        tracing::warn!("connection lost");
                        self.on_failure("Connection lost");
                    }
                }
            }

            SessionEvent::RetryDue { generation } => {
                if generation != self.generation || self.state != ConnectionState::Disconnected {
                    return;
                }
                self.tasks.retry = None;
                self.open();
            }

            SessionEvent::LeaveGraceElapsed { generation } => {
                if generation != self.generation {
                    return;
                }
                self.tasks.leave = None;
                self.finish_disconnect();
            }
        }
    }

    fn open(&mut self) {
        let Some(nickname) = self.nickname.clone() else {
            return;
        };
        self.teardown();
        self.set_state(ConnectionState::Connecting);
        self.view.loading(true);

        tracing::info!(%nickname, endpoint = self.config.endpoint(), "connecting");
        let generation = self.generation;
        let attempt = self.connector.open(&nickname);
        let events = self.events_tx.clone();
        self.tasks.opening = Some(tokio::spawn(async move {
            let result = attempt.await;
            let _ = events.send(SessionEvent::Opened { generation, result });
        }));
    }

    fn on_open(&mut self, link: Link) {
        let (outbound, mut link_events) = link.into_parts();
        let generation = self.generation;
        let events = self.events_tx.clone();
        self.tasks.forwarding = Some(tokio::spawn(async move {
            while let Some(event) = link_events.recv().await {
                if events.send(SessionEvent::Link { generation, event }).is_err() {
                    return;
                }
            }
            // The socket task went away without saying goodbye.
            let _ = events.send(SessionEvent::Link {
                generation,
                event: LinkEvent::Closed { clean: false },
            });
        }));
        self.outbound = Some(outbound);

        self.reconnector.reset();
        self.view.loading(false);
        self.set_state(ConnectionState::Connected);
        self.view.status(STATUS_CONNECTED);

        let nickname = self.nickname.clone().unwrap_or_default();
        tracing::info!(%nickname, "connected");
        if let Err(e) = self.publish(Outbound::Subscribe {
            destination: self.config.stomp.subscribe.clone(),
        }) {
            tracing::warn!("Error subscribing: {}", e);
        }
        self.send_system(format!("{nickname} joined the chat"));
    }

    fn on_failure(&mut self, reason: &str) {
        self.teardown();
        self.view.loading(false);
        self.set_state(ConnectionState::Disconnected);
        self.clear_log();
        self.view.error(reason);
        self.schedule_reconnect();
    }

    fn schedule_reconnect(&mut self) {
        let decision = self.reconnector.on_failure();
        match decision {
            RetryDecision::Retry {
                attempt,
                max,
                delay,
            } => {
                tracing::info!(
                    "Attempting to reconnect in {}ms (attempt {}/{})",
                    delay.as_millis(),
                    attempt,
                    max
                );
                self.view.status(&decision.status_text());
                let generation = self.generation;
                let events = self.events_tx.clone();
                abort(&mut self.tasks.retry);
                self.tasks.retry = Some(tokio::spawn(async move {
                    tokio::time::sleep(delay).await;
                    let _ = events.send(SessionEvent::RetryDue { generation });
                }));
            }
            RetryDecision::GiveUp => {
                tracing::warn!("Max reconnection attempts reached");
                self.view.error(&decision.status_text());
            }
        }
    }

    fn finish_disconnect(&mut self) {
        self.teardown();
        self.view.loading(false);
        self.set_state(ConnectionState::Disconnected);
        self.clear_log();
        self.view.status(STATUS_DISCONNECTED);
        tracing::info!("Disconnected");
    }

    /// Drop the channel handle and any in-flight attempt, and invalidate
    /// events scheduled against them.
    fn teardown(&mut self) {
        abort(&mut self.tasks.opening);
        abort(&mut self.tasks.forwarding);
        abort(&mut self.tasks.leave);
        if let Some(outbound) = self.outbound.take() {
            let _ = outbound.send(Outbound::Close);
        }
        self.leaving = false;
        self.generation += 1;
    }

    fn clear_log(&mut self) {
        self.log.clear();
        self.view.cleared();
    }

    fn set_state(&mut self, state: ConnectionState) {
        if self.state != state {
            tracing::debug!(from = %self.state, to = %state, "connection state changed");
            self.state = state;
            self.view.state_changed(state);
        }
    }

    fn publish(&self, outbound: Outbound) -> Result<(), TransportError> {
        let sender = self.outbound.as_ref().ok_or(TransportError::Closed)?;
        sender.send(outbound).map_err(|_| TransportError::Closed)
    }

    fn send_system(&self, content: String) {
        let result = ChatMessage::system(content)
            .encode_for(self.config.transport)
            .map_err(ChatError::from)
            .and_then(|payload| Ok(self.publish(Outbound::Publish(payload))?));
        if let Err(e) = result {
            tracing::warn!("Error sending system message: {}", e);
        }
    }
}

impl<V> Drop for ChatSession<V> {
    fn drop(&mut self) {
        self.tasks.abort_all();
        if let Some(outbound) = self.outbound.take() {
            let _ = outbound.send(Outbound::Close);
        }
    }
}
