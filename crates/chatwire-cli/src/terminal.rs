//! Line-oriented terminal rendering.
//!
//! Chat lines go to stdout; tracing output goes to stderr, so the transcript
//! can be piped on its own.

use chatwire_client::View;
use chatwire_core::{ChatMessage, ConnectionState, MessageLog, TransportKind};
use chrono::{Local, NaiveDateTime};
use std::io::Write;

const TIME_FORMAT: &str = "%H:%M:%S";

pub struct TerminalView<W> {
    transport: TransportKind,
    out: W,
}

impl TerminalView<std::io::Stdout> {
    pub fn stdout(transport: TransportKind) -> Self {
        Self::new(transport, std::io::stdout())
    }
}

impl<W: Write> TerminalView<W> {
    pub fn new(transport: TransportKind, out: W) -> Self {
        Self { transport, out }
    }

    pub fn line(&mut self, text: &str) {
        let _ = writeln!(self.out, "{text}");
        let _ = self.out.flush();
    }
}

impl<W: Write> View for TerminalView<W> {
    fn state_changed(&mut self, state: ConnectionState) {
        tracing::debug!(%state, "state changed");
    }

    fn loading(&mut self, loading: bool) {
        if loading {
            self.line("* connecting...");
        }
    }

    fn status(&mut self, text: &str) {
        self.line(&format!("* {text}"));
    }

    fn error(&mut self, text: &str) {
        self.line(&format!("! {text}"));
    }

    fn render(&mut self, message: &ChatMessage, _log: &MessageLog) {
        let received = Local::now().naive_local();
        let line = format_message(self.transport, message, received);
        self.line(&line);
    }

    fn cleared(&mut self) {
        self.line("* message history cleared");
    }
}

/// Render one message. `received` stands in for a missing send time.
pub fn format_message(
    transport: TransportKind,
    message: &ChatMessage,
    received: NaiveDateTime,
) -> String {
    let time = message.sent_at().unwrap_or(received).format(TIME_FORMAT);
    match transport {
        TransportKind::Stomp => format!("{}: {}  ({time})", message.sender(), message.content()),
        TransportKind::WebSocket => format!(
            "[{time}] {} says: '{}'",
            message.sender(),
            message.content()
        ),
    }
}
