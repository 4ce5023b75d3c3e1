//! STOMP 1.2 frames as carried in WebSocket text messages.
//!
//! Frame layout: `COMMAND EOL *(header EOL) EOL body NUL`. Header values are
//! escaped (`\\`, `\n`, `\r`, `\c`) on every command except CONNECT and
//! CONNECTED. A message consisting only of EOLs is a heart-beat.

use crate::{Heartbeat, ProtocolError};
use std::fmt;
use std::str::FromStr;
use std::time::Duration;

/// A client heart-beat: a single end-of-line.
pub const HEARTBEAT: &str = "\n";

/// Protocol versions offered in CONNECT.
pub const ACCEPT_VERSION: &str = "1.2,1.1";

/// Frame command.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Command {
    Connect,
    Stomp,
    Connected,
    Send,
    Subscribe,
    Unsubscribe,
    Message,
    Receipt,
    Error,
    Disconnect,
}

impl Command {
    pub fn as_str(self) -> &'static str {
        match self {
            Command::Connect => "CONNECT",
            Command::Stomp => "STOMP",
            Command::Connected => "CONNECTED",
            Command::Send => "SEND",
            Command::Subscribe => "SUBSCRIBE",
            Command::Unsubscribe => "UNSUBSCRIBE",
            Command::Message => "MESSAGE",
            Command::Receipt => "RECEIPT",
            Command::Error => "ERROR",
            Command::Disconnect => "DISCONNECT",
        }
    }

    fn escapes_headers(self) -> bool {
        !matches!(self, Command::Connect | Command::Connected)
    }
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Command {
    type Err = ProtocolError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let command = match s {
            "CONNECT" => Command::Connect,
            "STOMP" => Command::Stomp,
            "CONNECTED" => Command::Connected,
            "SEND" => Command::Send,
            "SUBSCRIBE" => Command::Subscribe,
            "UNSUBSCRIBE" => Command::Unsubscribe,
            "MESSAGE" => Command::Message,
            "RECEIPT" => Command::Receipt,
            "ERROR" => Command::Error,
            "DISCONNECT" => Command::Disconnect,
            other => return Err(ProtocolError::Frame(format!("unknown command '{other}'"))),
        };
        Ok(command)
    }
}

/// A single STOMP frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    command: Command,
    headers: Vec<(String, String)>,
    body: String,
}

impl Frame {
    pub fn new(command: Command) -> Self {
        Self {
            command,
            headers: Vec::new(),
            body: String::new(),
        }
    }

    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    pub fn with_body(mut self, body: impl Into<String>) -> Self {
        self.body = body.into();
        self
    }

    /// CONNECT frame offering `heartbeat` as `outgoing,incoming`.
    pub fn connect(host: &str, heartbeat: Heartbeat) -> Self {
        Frame::new(Command::Connect)
            .header("accept-version", ACCEPT_VERSION)
            .header("host", host)
            .header(
                "heart-beat",
                format!("{},{}", heartbeat.outgoing_ms, heartbeat.incoming_ms),
            )
    }

    pub fn subscribe(id: &str, destination: &str) -> Self {
        Frame::new(Command::Subscribe)
            .header("id", id)
            .header("destination", destination)
            .header("ack", "auto")
    }

    pub fn send(destination: &str, json: impl Into<String>) -> Self {
        Frame::new(Command::Send)
            .header("destination", destination)
            .header("content-type", "application/json")
            .with_body(json)
    }

    pub fn disconnect(receipt: &str) -> Self {
        Frame::new(Command::Disconnect).header("receipt", receipt)
    }

    pub fn command(&self) -> Command {
        self.command
    }

    /// Value of the first header named `name`; later repeats are ignored.
    pub fn get(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k == name)
            .map(|(_, v)| v.as_str())
    }

    pub fn headers(&self) -> &[(String, String)] {
        &self.headers
    }

    pub fn body(&self) -> &str {
        &self.body
    }

    pub fn encode(&self) -> String {
        let escape = self.command.escapes_headers();
        let mut out = String::with_capacity(self.body.len() + 64);
        out.push_str(self.command.as_str());
        out.push('\n');
        for (name, value) in &self.headers {
            if escape {
                out.push_str(&escape_header(name));
                out.push(':');
                out.push_str(&escape_header(value));
            } else {
                out.push_str(name);
                out.push(':');
                out.push_str(value);
            }
            out.push('\n');
        }
        if !self.body.is_empty() && self.get("content-length").is_none() {
            out.push_str(&format!("content-length:{}\n", self.body.len()));
        }
        out.push('\n');
        out.push_str(&self.body);
        out.push('\0');
        out
    }

    /// Decode one frame. `Ok(None)` means the message was a heart-beat.
    pub fn decode(raw: &str) -> Result<Option<Frame>, ProtocolError> {
        let raw = raw.trim_start_matches(['\r', '\n']);
        if raw.is_empty() {
            return Ok(None);
        }

        let (command_line, mut rest) = split_line(raw)
            .ok_or_else(|| ProtocolError::Frame("missing end of command line".into()))?;
        let command: Command = command_line.parse()?;
        let unescape = command.escapes_headers();

        let mut headers = Vec::new();
        loop {
            let (line, tail) = split_line(rest)
                .ok_or_else(|| ProtocolError::Frame("unterminated header block".into()))?;
            rest = tail;
            if line.is_empty() {
                break;
            }
            let (name, value) = line
                .split_once(':')
                .ok_or_else(|| ProtocolError::Frame(format!("header without ':': {line}")))?;
            if unescape {
                headers.push((unescape_header(name)?, unescape_header(value)?));
            } else {
                headers.push((name.to_string(), value.to_string()));
            }
        }

        let mut frame = Frame {
            command,
            headers,
            body: String::new(),
        };

        let body_len = match frame.get("content-length") {
            Some(len) => {
                let len: usize = len
                    .trim()
                    .parse()
                    .map_err(|_| ProtocolError::Frame(format!("bad content-length '{len}'")))?;
                if rest.as_bytes().get(len) != Some(&0) {
                    return Err(ProtocolError::Frame(
                        "body does not match content-length".into(),
                    ));
                }
                len
            }
            None => rest
                .find('\0')
                .ok_or_else(|| ProtocolError::Frame("missing NUL terminator".into()))?,
        };
        let body = rest
            .get(..body_len)
            .ok_or_else(|| ProtocolError::Frame("body is not valid UTF-8".into()))?;
        frame.body = body.to_string();
        Ok(Some(frame))
    }
}

fn split_line(s: &str) -> Option<(&str, &str)> {
    let (line, rest) = s.split_once('\n')?;
    Some((line.strip_suffix('\r').unwrap_or(line), rest))
}

fn escape_header(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        match c {
            '\\' => out.push_str("\\\\"),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            ':' => out.push_str("\\c"),
            c => out.push(c),
        }
    }
    out
}

fn unescape_header(s: &str) -> Result<String, ProtocolError> {
    let mut out = String::with_capacity(s.len());
    let mut chars = s.chars();
    while let Some(c) = chars.next() {
        if c != '\\' {
            out.push(c);
            continue;
        }
        match chars.next() {
            Some('\\') => out.push('\\'),
            Some('n') => out.push('\n'),
            Some('r') => out.push('\r'),
            Some('c') => out.push(':'),
            other => {
                return Err(ProtocolError::Frame(format!(
                    "invalid header escape '\\{}'",
                    other.map(String::from).unwrap_or_default()
                )));
            }
        }
    }
    Ok(out)
}

/// Heart-beat intervals agreed with the broker.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Negotiated {
    /// How often the client must send something.
    pub send_every: Option<Duration>,
    /// How often the broker promised to send something.
    pub expect_every: Option<Duration>,
}

/// Parse a `heart-beat` header value (`sx,sy`).
pub fn parse_heartbeat(value: &str) -> Result<(u64, u64), ProtocolError> {
    let bad = || ProtocolError::Frame(format!("bad heart-beat header '{value}'"));
    let (x, y) = value.split_once(',').ok_or_else(bad)?;
    let x = x.trim().parse().map_err(|_| bad())?;
    let y = y.trim().parse().map_err(|_| bad())?;
    Ok((x, y))
}

/// Combine the client's offer with the broker's CONNECTED `heart-beat`.
///
/// Each direction uses the larger of the two intervals, and is disabled
/// when either side sent `0`. A missing header means `0,0`.
pub fn negotiate(client: Heartbeat, server: Option<&str>) -> Result<Negotiated, ProtocolError> {
    let (sx, sy) = match server {
        Some(value) => parse_heartbeat(value)?,
        None => (0, 0),
    };
    let pick = |ours: u64, theirs: u64| {
        (ours != 0 && theirs != 0).then(|| Duration::from_millis(ours.max(theirs)))
    };
    Ok(Negotiated {
        send_every: pick(client.outgoing_ms, sy),
        expect_every: pick(client.incoming_ms, sx),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[test]
    fn encodes_send_frame() {
        let frame = Frame::send("/app/chat", r#"{"sender":"alice","content":"hi"}"#);
        assert_eq!(
            frame.encode(),
            "SEND\ndestination:/app/chat\ncontent-type:application/json\ncontent-length:33\n\n{\"sender\":\"alice\",\"content\":\"hi\"}\0"
        );
    }

    #[test]
    fn decodes_message_frame() {
        let raw = "MESSAGE\ndestination:/topic/messages\nsubscription:sub-0\nmessage-id:7\n\n{\"sender\":\"bob\"}\0\n";
        let frame = Frame::decode(raw).unwrap().unwrap();
        assert_eq!(frame.command(), Command::Message);
        assert_eq!(frame.get("destination"), Some("/topic/messages"));
        assert_eq!(frame.body(), "{\"sender\":\"bob\"}");
    }

    #[test]
    fn honours_content_length_with_embedded_nul() {
        let raw = "MESSAGE\ncontent-length:3\n\na\0b\0";
        let frame = Frame::decode(raw).unwrap().unwrap();
        assert_eq!(frame.body(), "a\0b");
    }

    #[test]
    fn rejects_wrong_content_length() {
        let raw = "MESSAGE\ncontent-length:10\n\nabc\0";
        assert!(Frame::decode(raw).is_err());
    }

    #[test]
    fn accepts_crlf_line_endings() {
        let raw = "CONNECTED\r\nversion:1.2\r\nheart-beat:0,0\r\n\r\n\0";
        let frame = Frame::decode(raw).unwrap().unwrap();
        assert_eq!(frame.command(), Command::Connected);
        assert_eq!(frame.get("version"), Some("1.2"));
    }

    #[rstest]
    #[case("\n")]
    #[case("\r\n")]
    #[case("\n\n")]
    fn end_of_line_alone_is_heartbeat(#[case] raw: &str) {
        assert_eq!(Frame::decode(raw).unwrap(), None);
    }

    #[test]
    fn header_values_are_escaped_and_unescaped() {
        let frame = Frame::new(Command::Error).header("message", "bad: line\nbreak\\");
        let encoded = frame.encode();
        assert!(encoded.contains("message:bad\\c line\\nbreak\\\\\n"));
        assert_eq!(Frame::decode(&encoded).unwrap().unwrap(), frame);
    }

    #[test]
    fn connect_headers_are_not_escaped() {
        let frame = Frame::connect("broker:61613", Heartbeat::default());
        let encoded = frame.encode();
        assert!(encoded.starts_with("CONNECT\naccept-version:1.2,1.1\nhost:broker:61613\n"));
        assert!(encoded.contains("heart-beat:4000,4000\n"));
    }

    #[test]
    fn first_repeated_header_wins() {
        let raw = "MESSAGE\nfoo:first\nfoo:second\n\n\0";
        let frame = Frame::decode(raw).unwrap().unwrap();
        assert_eq!(frame.get("foo"), Some("first"));
    }

    #[rstest]
    #[case("BOGUS\n\n\0")]
    #[case("MESSAGE\nnocolon\n\n\0")]
    #[case("MESSAGE\n\nbody without terminator")]
    #[case("MESSAGE\nbad:\\t\n\n\0")]
    fn malformed_frames_are_rejected(#[case] raw: &str) {
        assert!(matches!(Frame::decode(raw), Err(ProtocolError::Frame(_))));
    }

    #[rstest]
    #[case(Some("4000,4000"), Some(4000), Some(4000))]
    #[case(Some("10000,0"), None, Some(10000))]
    #[case(Some("0,1000"), Some(4000), None)]
    #[case(None, None, None)]
    fn negotiates_heartbeat(
        #[case] server: Option<&str>,
        #[case] send_ms: Option<u64>,
        #[case] expect_ms: Option<u64>,
    ) {
        let negotiated = negotiate(Heartbeat::default(), server).unwrap();
        assert_eq!(negotiated.send_every, send_ms.map(Duration::from_millis));
        assert_eq!(negotiated.expect_every, expect_ms.map(Duration::from_millis));
    }

    #[test]
    fn disabled_client_heartbeat_stays_disabled() {
        let client = Heartbeat {
            outgoing_ms: 0,
            incoming_ms: 0,
        };
        let negotiated = negotiate(client, Some("5000,5000")).unwrap();
        assert_eq!(negotiated.send_every, None);
        assert_eq!(negotiated.expect_every, None);
    }

    #[test]
    fn bad_heartbeat_header_is_a_protocol_error() {
        assert!(negotiate(Heartbeat::default(), Some("fast")).is_err());
    }
}
