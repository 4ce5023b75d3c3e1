//! Client side of chatwire: transports and the chat session.
//!
//! ```no_run
//! # async fn demo(view: impl chatwire_client::View) -> Result<(), chatwire_core::ChatError> {
//! use chatwire_client::{ChatSession, connector_for};
//! use chatwire_core::SessionConfig;
//!
//! let config = SessionConfig::default();
//! let mut session = ChatSession::new(config.clone(), connector_for(&config), view);
//! session.connect("alice")?;
//! loop {
//!     session.pump().await;
//!     if session.state().is_connected() {
//!         session.send_message("alice", "hi")?;
//!         break;
//!     }
//! }
//! # Ok(())
//! # }
//! ```

mod session;
mod stomp_link;
mod transport;
mod view;
mod ws;

pub use session::ChatSession;
pub use stomp_link::StompConnector;
pub use transport::{Connector, Link, LinkEvent, LinkPeer, Outbound};
pub use view::View;
pub use ws::WebSocketConnector;

use chatwire_core::{SessionConfig, TransportKind};
use std::sync::Arc;

/// The connector matching `config.transport`.
pub fn connector_for(config: &SessionConfig) -> Arc<dyn Connector> {
    match config.transport {
        TransportKind::Stomp => Arc::new(StompConnector::new(config.clone())),
        TransportKind::WebSocket => Arc::new(WebSocketConnector::new(config.clone())),
    }
}
