//! Interactive console: reads commands from stdin and prints node events.

use std::io::Write;

use anyhow::Result;
use lanbeat_network::{ChatEntry, Contact, NetworkError, Node, NodeEvent, PeerId};
use tokio::io::{AsyncBufRead, AsyncBufReadExt};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

const PROMPT: &str = "cmd> ";

/// A parsed console line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    List,
    Msg { to: PeerId, text: String },
    Broadcast { text: String },
    History,
    Help,
    Exit,
    /// Blank line.
    Empty,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CommandError {
    #[error("Usage: msg <id> <text>")]
    MsgUsage,
    #[error("Usage: broadcast <text>")]
    BroadcastUsage,
    #[error("Unknown command: {0}. Type 'help' for commands.")]
    Unknown(String),
}

/// Parse one input line.
pub fn parse_command(line: &str) -> Result<Command, CommandError> {
    let line = line.trim();
    let (word, rest) = match line.split_once(char::is_whitespace) {
        Some((word, rest)) => (word, rest.trim_start()),
        None => (line, ""),
    };

    match word {
        "" => Ok(Command::Empty),
        "list" if rest.is_empty() => Ok(Command::List),
        "help" if rest.is_empty() => Ok(Command::Help),
        "history" if rest.is_empty() => Ok(Command::History),
        "exit" if rest.is_empty() => Ok(Command::Exit),
        "msg" => {
            let (id, text) = rest.split_once(char::is_whitespace).ok_or(CommandError::MsgUsage)?;
            let to = id.parse::<PeerId>().map_err(|_| CommandError::MsgUsage)?;
            let text = text.trim_start();
            if text.is_empty() {
                return Err(CommandError::MsgUsage);
            }
            Ok(Command::Msg {
                to,
                text: text.to_string(),
            })
        }
        "broadcast" if rest.is_empty() => Err(CommandError::BroadcastUsage),
        "broadcast" => Ok(Command::Broadcast {
            text: rest.to_string(),
        }),
        _ => Err(CommandError::Unknown(line.to_string())),
    }
}

pub fn help_text() -> String {
    [
        "Commands:",
        " list            -> show available nodes",
        " msg <id> <txt>  -> send message to node <id>",
        " broadcast <txt> -> send message to every node",
        " history         -> show recent group messages",
        " help            -> show this help",
        " exit            -> close",
    ]
    .join("\n")
}

/// Directory listing as printed by `list`.
pub fn render_listing(local_id: PeerId, unicast_port: u16, entries: &[(PeerId, Contact)]) -> String {
    let mut out = format!("Current node: {local_id} unicastPort={unicast_port}");
    for (id, contact) in entries {
        out.push_str(&format!("\nNode {id} -> {contact}"));
    }
    out
}

/// Chat history as printed by `history`.
pub fn render_history(entries: &[ChatEntry]) -> String {
    if entries.is_empty() {
        return "No group messages yet".to_string();
    }
    entries
        .iter()
        .map(|entry| format!("[CHAT] #{}: {}", entry.from, entry.text))
        .collect::<Vec<_>>()
        .join("\n")
}

pub fn render_event(event: &NodeEvent) -> String {
    match event {
        NodeEvent::Message { from, text } => format!("[MSG] from #{from}: {text}"),
        NodeEvent::Chat { from, text } => format!("[CHAT] #{from}: {text}"),
        NodeEvent::PeerJoined { peer_id, contact } => format!("[JOIN] Node {peer_id} at {contact}"),
        NodeEvent::PeerDead {
            peer_id,
            silent_for_ms,
        } => format!("[ALERT] Node {peer_id} considered DEAD ({silent_for_ms} ms no heartbeat)"),
    }
}

/// Whether the console keeps reading after a command.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Flow {
    Continue,
    Exit,
}

/// Run one console line against `node`, writing the response to `out`.
pub async fn execute(node: &Node, line: &str, out: &mut impl Write) -> Result<Flow> {
    let command = match parse_command(line) {
        Ok(command) => command,
        Err(e) => {
            writeln!(out, "{e}")?;
            return Ok(Flow::Continue);
        }
    };

    match command {
        Command::Empty => {}
        Command::Help => writeln!(out, "{}", help_text())?,
        Command::Exit => return Ok(Flow::Exit),
        Command::List => {
            let port = node
                .contact()
                .map(|c| c.port)
                .unwrap_or(node.config().unicast_port);
            writeln!(out, "{}", render_listing(node.peer_id(), port, &node.dump()))?;
        }
        Command::Msg { to, text } => match node.send_message(to, &text).await {
            Ok(addr) => debug!("Message to {to} sent via {addr}"),
            Err(NetworkError::PeerNotFound(id)) => writeln!(out, "Not found node #{id}")?,
            Err(e) => {
                warn!("Send to {to} failed: {e}");
                writeln!(out, "Send failed: {e}")?;
            }
        },
        Command::Broadcast { text } => match node.broadcast(&text).await {
            Ok(addr) => debug!("Chat line sent via {addr}"),
            Err(e) => {
                warn!("Broadcast failed: {e}");
                writeln!(out, "Send failed: {e}")?;
            }
        },
        Command::History => writeln!(out, "{}", render_history(&node.chat_history()))?,
    }
    Ok(Flow::Continue)
}

/// Drive the console until `exit`, end of input, or Ctrl+C, then shut the node down.
///
/// The node is shut down however the loop ends, including on a read or
/// write error, which is then returned.
pub async fn run<R, W>(
    node: &mut Node,
    events: mpsc::Receiver<NodeEvent>,
    input: R,
    out: &mut W,
) -> Result<()>
where
    R: AsyncBufRead + Unpin,
    W: Write,
{
    let result = drive(node, events, input, out).await;
    if let Err(e) = &result {
        warn!("Console stopped: {e}");
    }

    // Output may be what failed; shutdown goes ahead regardless.
    let _ = writeln!(out, "Shutting down node {}", node.peer_id());
    node.shutdown().await;
    result
}

async fn drive<R, W>(
    node: &Node,
    mut events: mpsc::Receiver<NodeEvent>,
    mut input: R,
    out: &mut W,
) -> Result<()>
where
    R: AsyncBufRead + Unpin,
    W: Write,
{
    writeln!(out, "{}", help_text())?;
    prompt(out)?;

    // Kept across iterations: a read cancelled by another branch resumes here.
    let mut line = Vec::new();
    loop {
        tokio::select! {
            read = input.read_until(b'\n', &mut line) => {
                let read = read?;
                if read == 0 && line.is_empty() {
                    debug!("End of input");
                    break;
                }
                let text = String::from_utf8_lossy(&line).into_owned();
                line.clear();
                if execute(node, &text, out).await? == Flow::Exit || read == 0 {
                    break;
                }
                prompt(out)?;
            }

            Some(event) = events.recv() => {
                writeln!(out, "\n{}", render_event(&event))?;
                prompt(out)?;
            }

            _ = tokio::signal::ctrl_c() => {
                info!("Interrupt received");
                break;
            }
        }
    }
    Ok(())
}

fn prompt(out: &mut impl Write) -> Result<()> {
    write!(out, "{PROMPT}")?;
    out.flush()?;
    Ok(())
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
