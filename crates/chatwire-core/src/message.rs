//! Chat messages and their wire encodings.
//!
//! Inbound payloads from both transports are read through one canonical
//! schema: `{sender, content, sentAt?}`, where `username` is accepted in
//! place of `sender` and `timestamp` in place of `sentAt`. Outbound payloads
//! differ per transport and are produced by [`ChatMessage::encode_for`].

use crate::{ProtocolError, TransportKind};
use chrono::{Local, NaiveDateTime};
use serde::{Deserialize, Serialize, Serializer};

/// Sender name used for join/leave notices generated by the client.
pub const SYSTEM_SENDER: &str = "System";

/// Timestamp layout used on the raw WebSocket transport.
const TIMESTAMP_FORMAT: &str = "%Y-%m-%dT%H:%M:%S";

/// A chat message. Immutable once constructed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatMessage {
    #[serde(alias = "username")]
    sender: String,
    content: String,
    #[serde(default, alias = "timestamp", skip_serializing_if = "Option::is_none")]
    sent_at: Option<NaiveDateTime>,
}

impl ChatMessage {
    pub fn new(sender: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            sender: sender.into(),
            content: content.into(),
            sent_at: None,
        }
    }

    /// A notice generated by the client itself, such as a join or leave.
    pub fn system(content: impl Into<String>) -> Self {
        Self::new(SYSTEM_SENDER, content)
    }

    pub fn with_sent_at(mut self, sent_at: NaiveDateTime) -> Self {
        self.sent_at = Some(sent_at);
        self
    }

    pub fn sender(&self) -> &str {
        &self.sender
    }

    pub fn content(&self) -> &str {
        &self.content
    }

    pub fn sent_at(&self) -> Option<NaiveDateTime> {
        self.sent_at
    }

    pub fn is_system(&self) -> bool {
        self.sender == SYSTEM_SENDER
    }

    /// Parse an inbound payload from either transport.
    pub fn from_json(raw: &str) -> Result<Self, ProtocolError> {
        Ok(serde_json::from_str(raw)?)
    }

    /// Serialize in the canonical schema.
    pub fn to_json(&self) -> Result<String, ProtocolError> {
        Ok(serde_json::to_string(self)?)
    }

    /// Serialize as an outbound payload for the given transport.
    ///
    /// The STOMP transport carries `{sender, content}`. The raw WebSocket
    /// transport carries `{content, timestamp}`, the username being part of
    /// the connection URL; a message without `sent_at` is stamped with the
    /// local time.
    pub fn encode_for(&self, transport: TransportKind) -> Result<String, ProtocolError> {
        let encoded = match transport {
            TransportKind::Stomp => serde_json::to_string(&BrokerOutbound {
                sender: &self.sender,
                content: &self.content,
            })?,
            TransportKind::WebSocket => serde_json::to_string(&DirectOutbound {
                content: &self.content,
                timestamp: self.sent_at.unwrap_or_else(|| Local::now().naive_local()),
            })?,
        };
        Ok(encoded)
    }
}

#[derive(Serialize)]
struct BrokerOutbound<'a> {
    sender: &'a str,
    content: &'a str,
}

#[derive(Serialize)]
struct DirectOutbound<'a> {
    content: &'a str,
    #[serde(serialize_with = "serialize_seconds")]
    timestamp: NaiveDateTime,
}

fn serialize_seconds<S: Serializer>(ts: &NaiveDateTime, serializer: S) -> Result<S::Ok, S::Error> {
    serializer.collect_str(&ts.format(TIMESTAMP_FORMAT))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{NaiveDate, Timelike};
    use serde_json::{Value, json};

    fn new_year() -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2024, 1, 1)
            .unwrap()
            .and_hms_opt(0, 0, 0)
            .unwrap()
    }

    #[test]
    fn stomp_outbound_carries_sender_and_content_only() {
        let msg = ChatMessage::new("alice", "hi");
        let encoded = msg.encode_for(TransportKind::Stomp).unwrap();
        assert_eq!(encoded, r#"{"sender":"alice","content":"hi"}"#);
    }

    #[test]
    fn websocket_outbound_carries_content_and_timestamp() {
        let msg = ChatMessage::new("alice", "hi").with_sent_at(new_year());
        let encoded: Value =
            serde_json::from_str(&msg.encode_for(TransportKind::WebSocket).unwrap()).unwrap();
        assert_eq!(encoded, json!({"content": "hi", "timestamp": "2024-01-01T00:00:00"}));
    }

    #[test]
    fn websocket_outbound_stamps_missing_time() {
        let msg = ChatMessage::new("alice", "hi");
        let encoded: Value =
            serde_json::from_str(&msg.encode_for(TransportKind::WebSocket).unwrap()).unwrap();
        let stamp = encoded["timestamp"].as_str().unwrap();
        assert!(NaiveDateTime::parse_from_str(stamp, TIMESTAMP_FORMAT).is_ok());
    }

    #[test]
    fn parses_broker_inbound() {
        let msg = ChatMessage::from_json(
            r#"{"sender":"bob","content":"hey","sentAt":"2024-01-01T00:00:00"}"#,
        )
        .unwrap();
        assert_eq!(msg.sender(), "bob");
        assert_eq!(msg.content(), "hey");
        assert_eq!(msg.sent_at(), Some(new_year()));
    }

    #[test]
    fn parses_broker_inbound_with_fractional_seconds() {
        let msg = ChatMessage::from_json(
            r#"{"sender":"bob","content":"hey","sentAt":"2024-01-01T00:00:00.123456"}"#,
        )
        .unwrap();
        assert_eq!(msg.sent_at().unwrap().nanosecond(), 123_456_000);
    }

    #[test]
    fn parses_direct_inbound() {
        let msg = ChatMessage::from_json(
            r#"{"username":"carol","content":"yo","timestamp":"2024-01-01T00:00:00"}"#,
        )
        .unwrap();
        assert_eq!(msg.sender(), "carol");
        assert_eq!(msg.sent_at(), Some(new_year()));
    }

    #[test]
    fn sent_at_is_optional() {
        let msg = ChatMessage::from_json(r#"{"sender":"bob","content":"hey"}"#).unwrap();
        assert_eq!(msg.sent_at(), None);
    }

    #[test]
    fn rejects_malformed_payload() {
        assert!(matches!(
            ChatMessage::from_json("not json"),
            Err(ProtocolError::Json(_))
        ));
        assert!(ChatMessage::from_json(r#"{"content":"no sender"}"#).is_err());
    }

    #[test]
    fn canonical_json_roundtrip() {
        let msg = ChatMessage::new("bob", "hey").with_sent_at(new_year());
        let parsed = ChatMessage::from_json(&msg.to_json().unwrap()).unwrap();
        assert_eq!(parsed, msg);

        let plain = ChatMessage::new("bob", "hey");
        let json = plain.to_json().unwrap();
        assert!(!json.contains("sentAt"));
        assert_eq!(ChatMessage::from_json(&json).unwrap(), plain);
    }

    #[test]
    fn system_messages_use_reserved_sender() {
        let msg = ChatMessage::system("alice joined the chat");
        assert!(msg.is_system());
        assert_eq!(msg.sender(), SYSTEM_SENDER);
    }
}
