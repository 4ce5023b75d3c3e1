use chatwire_core::{ChatMessage, ConnectionState, MessageLog};

/// The presentation side of a session: status line, connect affordance and
/// message list.
///
/// Every callback runs synchronously on the task that drives the session.
pub trait View {
    fn state_changed(&mut self, _state: ConnectionState) {}

    /// Show or hide the "connecting" affordance.
    fn loading(&mut self, _loading: bool) {}

    fn status(&mut self, text: &str);

    fn error(&mut self, text: &str) {
        self.status(text);
    }

    /// `message` has just been inserted into `log`.
    fn render(&mut self, message: &ChatMessage, log: &MessageLog);

    /// The message list was emptied.
    fn cleared(&mut self) {}
}
