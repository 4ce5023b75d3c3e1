use anyhow::Context;
use chatwire_core::{SessionConfig, TransportKind};
use clap::Parser;
use std::path::{Path, PathBuf};

#[derive(Debug, Parser)]
#[command(name = "chatwire")]
#[command(version)]
#[command(about = "Terminal client for a STOMP or raw WebSocket chat room")]
pub struct Args {
    /// TOML configuration file
    #[arg(long, short, env = "CHATWIRE_CONFIG")]
    pub config: Option<PathBuf>,

    /// WebSocket endpoint, e.g. ws://localhost:8080/chat
    #[arg(long, env = "CHATWIRE_ENDPOINT")]
    pub endpoint: Option<String>,

    /// Messaging channel: stomp or websocket
    #[arg(long, short, env = "CHATWIRE_TRANSPORT")]
    pub transport: Option<TransportKind>,

    /// Join immediately under this nickname
    #[arg(long, short, env = "CHATWIRE_NICKNAME")]
    pub nickname: Option<String>,

    /// Automatic reconnection attempts before giving up
    #[arg(long)]
    pub max_retries: Option<u32>,
}

impl Args {
    /// Load the configuration file, if any, and apply flag overrides.
    pub fn session_config(&self) -> anyhow::Result<SessionConfig> {
        let config = match &self.config {
            Some(path) => read_config(path)?,
            None => SessionConfig::default(),
        };
        Ok(self.overlay(config))
    }

    fn overlay(&self, mut config: SessionConfig) -> SessionConfig {
        if let Some(endpoint) = &self.endpoint {
            config.endpoint = Some(endpoint.clone());
        }
        if let Some(transport) = self.transport {
            config.transport = transport;
        }
        if let Some(max) = self.max_retries {
            config.retry.max_attempts = max;
        }
        config
    }
}

fn read_config(path: &Path) -> anyhow::Result<SessionConfig> {
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("reading config {}", path.display()))?;
    parse_config(&text).with_context(|| format!("parsing config {}", path.display()))
}

pub fn parse_config(text: &str) -> anyhow::Result<SessionConfig> {
    Ok(toml::from_str(text)?)
}

/// One line typed at the prompt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Input {
    Connect(Option<String>),
    Disconnect,
    Status,
    Quit,
    Say(String),
    Empty,
    Unknown(String),
}

impl Input {
    pub fn parse(line: &str) -> Input {
        let line = line.trim();
        if line.is_empty() {
            return Input::Empty;
        }
        let Some(command) = line.strip_prefix('/') else {
            return Input::Say(line.to_string());
        };

        let (name, rest) = match command.split_once(char::is_whitespace) {
            Some((name, rest)) => (name, rest.trim()),
            None => (command, ""),
        };
        match name {
            "connect" | "join" => Input::Connect((!rest.is_empty()).then(|| rest.to_string())),
            "disconnect" | "leave" => Input::Disconnect,
            "status" => Input::Status,
            "quit" | "exit" => Input::Quit,
            other => Input::Unknown(other.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chatwire_core::RenderOrder;
    use rstest::rstest;

    #[test]
    fn args_parse_minimal() {
        let args = Args::parse_from(["chatwire"]);
        assert!(args.config.is_none());
        assert!(args.endpoint.is_none());
        assert!(args.transport.is_none());
        assert!(args.nickname.is_none());
        assert!(args.max_retries.is_none());
    }

    #[test]
    fn args_parse_everything() {
        let args = Args::parse_from([
            "chatwire",
            "--endpoint",
            "ws://chat.example:9000/room",
            "--transport",
            "ws",
            "--nickname",
            "alice",
            "--max-retries",
            "2",
        ]);
        assert_eq!(args.transport, Some(TransportKind::WebSocket));
        assert_eq!(args.nickname.as_deref(), Some("alice"));

        let config = args.overlay(SessionConfig::default());
        assert_eq!(config.endpoint(), "ws://chat.example:9000/room");
        assert_eq!(config.transport, TransportKind::WebSocket);
        assert_eq!(config.order(), RenderOrder::NewestFirst);
        assert_eq!(config.retry.max_attempts, 2);
    }

    #[test]
    fn unknown_transport_is_rejected() {
        assert!(Args::try_parse_from(["chatwire", "--transport", "carrier-pigeon"]).is_err());
    }

    #[test]
    fn flags_override_file() {
        let file = parse_config(
            r#"
            endpoint = "ws://broker:61614/ws"
            transport = "stomp"

            [retry]
            max_attempts = 9
            "#,
        )
        .unwrap();
        let args = Args::parse_from(["chatwire", "--max-retries", "1"]);

        let config = args.overlay(file);

        assert_eq!(config.endpoint(), "ws://broker:61614/ws");
        assert_eq!(config.retry.max_attempts, 1);
        assert_eq!(config.retry.base_delay_ms, 1000);
    }

    #[test]
    fn full_config_file() {
        let config = parse_config(
            r#"
            transport = "websocket"
            leave_grace_ms = 250
            history_limit = 20
            order = "newest_last"

            [heartbeat]
            outgoing_ms = 10000
            incoming_ms = 0

            [stomp]
            subscribe = "/topic/lobby"
            "#,
        )
        .unwrap();

        assert_eq!(config.endpoint(), "ws://localhost:10000/chat");
        assert_eq!(config.leave_grace_ms, 250);
        assert_eq!(config.history_limit, 20);
        assert_eq!(config.order(), RenderOrder::NewestLast);
        assert_eq!(config.heartbeat.outgoing_ms, 10000);
        assert_eq!(config.heartbeat.incoming_ms, 0);
        assert_eq!(config.stomp.subscribe, "/topic/lobby");
        assert_eq!(config.stomp.publish, "/app/chat");
    }

    #[test]
    fn bad_config_is_an_error() {
        assert!(parse_config("transport = \"smoke-signals\"").is_err());
        assert!(parse_config("retry = 5").is_err());
    }

    #[rstest]
    #[case("", Input::Empty)]
    #[case("   ", Input::Empty)]
    #[case("hello there", Input::Say("hello there".into()))]
    #[case("  padded  ", Input::Say("padded".into()))]
    #[case("/connect", Input::Connect(None))]
    #[case("/connect   bob ", Input::Connect(Some("bob".into())))]
    #[case("/join carol smith", Input::Connect(Some("carol smith".into())))]
    #[case("/disconnect", Input::Disconnect)]
    #[case("/leave", Input::Disconnect)]
    #[case("/status", Input::Status)]
    #[case("/quit", Input::Quit)]
    #[case("/exit", Input::Quit)]
    #[case("/dance", Input::Unknown("dance".into()))]
    fn input_parsing(#[case] line: &str, #[case] expected: Input) {
        assert_eq!(Input::parse(line), expected);
    }
}
