//! Error taxonomy shared by the session and its transports.
//!
//! Nothing here is fatal: validation and not-connected errors are recovered
//! by re-prompting the user, transport errors feed the reconnect policy, and
//! protocol errors on inbound frames are logged and the frame dropped.

/// A required field was empty after trimming.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum ValidationError {
    #[error("please choose a nickname")]
    MissingNickname,
    #[error("please enter a message")]
    MissingText,
}

/// Socket-level failure.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TransportError {
    #[error("connection failed: {0}")]
    Connect(String),
    #[error("connection attempt timed out")]
    Timeout,
    #[error("channel is closed")]
    Closed,
}

/// A frame or payload that could not be understood.
#[derive(Debug, thiserror::Error)]
pub enum ProtocolError {
    #[error("malformed chat message: {0}")]
    Json(#[from] serde_json::Error),
    #[error("malformed STOMP frame: {0}")]
    Frame(String),
}

/// Error returned by session operations.
#[derive(Debug, thiserror::Error)]
pub enum ChatError {
    #[error(transparent)]
    Validation(#[from] ValidationError),
    #[error("not connected to chat, please connect first")]
    NotConnected,
    #[error(transparent)]
    Transport(#[from] TransportError),
    #[error(transparent)]
    Protocol(#[from] ProtocolError),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn validation_converts_into_chat_error() {
        let err: ChatError = ValidationError::MissingText.into();
        assert!(matches!(err, ChatError::Validation(ValidationError::MissingText)));
        assert_eq!(err.to_string(), "please enter a message");
    }

    #[test]
    fn json_error_converts_into_protocol_error() {
        let json_err = serde_json::from_str::<serde_json::Value>("{").unwrap_err();
        let err: ChatError = ProtocolError::from(json_err).into();
        assert!(err.to_string().starts_with("malformed chat message"));
    }
}
