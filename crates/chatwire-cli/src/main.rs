//! Terminal chat client.
//!
//! Join a STOMP broker:
//!   chatwire --nickname alice
//!
//! Join a raw WebSocket room:
//!   chatwire --transport websocket --endpoint ws://localhost:10000/chat --nickname carol

mod cli;
mod terminal;

use chatwire_client::{ChatSession, connector_for};
use chatwire_core::{ChatError, ConnectionState, ReconnectState};
use clap::Parser;
use cli::{Args, Input};
use std::io::Write;
use terminal::TerminalView;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing_subscriber::EnvFilter;

type Session = ChatSession<TerminalView<std::io::Stdout>>;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive("chatwire=info".parse()?))
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();
    let config = args.session_config()?;
    tracing::info!(
        transport = %config.transport,
        endpoint = config.endpoint(),
        "starting"
    );

    let connector = connector_for(&config);
    let view = TerminalView::stdout(config.transport);
    let mut session = ChatSession::new(config, connector, view);
    let mut last_nickname = args.nickname.clone();

    if let Some(nickname) = &last_nickname {
        let result = session.connect(nickname);
        report(&mut session, result);
    } else {
        session
            .view_mut()
            .line("* type /connect <nickname> to join, /quit to leave");
    }

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        tokio::select! {
            line = lines.next_line() => {
                let Some(line) = line? else { break };
                match Input::parse(&line) {
                    Input::Quit => break,
                    input => handle(&mut session, &mut last_nickname, input),
                }
            }
            () = session.pump() => {}
        }
    }

    leave(&mut session).await;
    Ok(())
}

fn handle(session: &mut Session, last_nickname: &mut Option<String>, input: Input) {
    match input {
        Input::Connect(nickname) => {
            let Some(nickname) = nickname.or_else(|| last_nickname.clone()) else {
                session.view_mut().line("! please choose a nickname");
                return;
            };
            let result = session.connect(&nickname);
            if result.is_ok() {
                *last_nickname = Some(nickname);
            }
            report(session, result);
        }
        Input::Disconnect => session.disconnect(),
        Input::Status => status(session),
        Input::Say(text) => {
            let Some(nickname) = session.nickname().map(str::to_string) else {
                session.view_mut().line("! not connected, use /connect <nickname>");
                return;
            };
            let result = session.send_message(&nickname, &text);
            report(session, result);
        }
        Input::Empty => session.view_mut().line("! please enter a message"),
        Input::Unknown(name) => session
            .view_mut()
            .line(&format!("! unknown command /{name}")),
        Input::Quit => {}
    }
}

/// Print validation and state errors. Transport failures were already
/// reported by the session.
fn report(session: &mut Session, result: Result<(), ChatError>) {
    match result {
        Ok(()) | Err(ChatError::Transport(_)) => {}
        Err(ChatError::NotConnected) => session.view_mut().line("! not connected"),
        Err(e) => session.view_mut().line(&format!("! {e}")),
    }
}

fn status(session: &mut Session) {
    let retry = match session.reconnect_state() {
        ReconnectState::Idle => String::new(),
        ReconnectState::Retrying(n) => {
            format!(", reconnecting ({n}/{})", session.config().retry.max_attempts)
        }
        ReconnectState::GivenUp => ", gave up reconnecting".to_string(),
    };
    let line = format!(
        "* {} as {} to {}{retry}, {} message(s)",
        session.state(),
        session.nickname().unwrap_or("-"),
        session.config().endpoint(),
        session.messages().len(),
    );
    session.view_mut().line(&line);
}

/// Disconnect and wait out the leave grace period so the notice is sent.
async fn leave(session: &mut Session) {
    session.disconnect();
    let wait = session.config().leave_grace() * 4;
    let _ = tokio::time::timeout(wait, async {
        while session.state() != ConnectionState::Disconnected {
            session.pump().await;
        }
    })
    .await;
    let _ = std::io::stdout().flush();
}
