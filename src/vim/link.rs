//! Single-client line transport toward the in-process Vim hook.

use std::sync::Arc;

use tokio::{
    io::{AsyncBufReadExt, AsyncWrite, AsyncWriteExt, BufReader},
    net::TcpListener,
    sync::mpsc,
};
use tracing::{debug, info, warn};

use super::protocol::{HookFunction, HookMessage, MessageType, PushMode};
use crate::session::DebugSession;

/// Write handle for the hook connection. Cloning shares the underlying
/// writer task; sends are fire-and-forget so they can happen while the
/// session lock is held.
#[derive(Clone, Debug)]
pub struct Link {
    sender: mpsc::UnboundedSender<String>,
}

impl Link {
    pub fn start<W>(mut output: W) -> Self
    where
        W: AsyncWrite + Unpin + Send + 'static,
    {
        let (sender, mut receiver) = mpsc::unbounded_channel::<String>();
        tokio::spawn(async move {
            while let Some(mut line) = receiver.recv().await {
                line.push('\n');
                if let Err(error) = output.write_all(line.as_bytes()).await {
                    warn!(%error, "hook channel write failed");
                    break;
                }
                if let Err(error) = output.flush().await {
                    warn!(%error, "hook channel flush failed");
                    break;
                }
            }
        });
        Self { sender }
    }

    pub fn send(&self, envelope_id: i64, message: &HookMessage) {
        match serde_json::to_string(&(envelope_id, message)) {
            Ok(line) => self.send_line(line),
            Err(error) => warn!(%error, "failed to encode hook message"),
        }
    }

    /// Replies into the envelope the hook is blocked on.
    pub fn reply(&self, envelope_id: i64, function: HookFunction, arguments: serde_json::Value) {
        self.send(
            envelope_id,
            &HookMessage {
                message_type: MessageType::Reply,
                function,
                arguments,
            },
        );
    }

    /// Sends a raw `[mode, command]` push, outside any envelope.
    pub fn push(&self, mode: PushMode, command: &str) {
        let mode: &'static str = mode.into();
        match serde_json::to_string(&(mode, command)) {
            Ok(line) => self.send_line(line),
            Err(error) => warn!(%error, "failed to encode push"),
        }
    }

    fn send_line(&self, line: String) {
        debug!(%line, "-> hook");
        if self.sender.send(line).is_err() {
            warn!("hook writer is gone, dropping outgoing line");
        }
    }
}

/// Accepts the first hook connection and feeds its lines to the session.
///
/// Later connection attempts are dropped with a warning; once the active
/// connection closes the session is torn down and nothing reconnects.
pub async fn serve(listener: TcpListener, session: Arc<DebugSession>) {
    let (stream, peer) = match listener.accept().await {
        Ok(accepted) => accepted,
        Err(error) => {
            warn!(%error, "hook listener failed");
            return;
        }
    };
    info!(%peer, "hook connected");
    tokio::spawn(async move {
        loop {
            match listener.accept().await {
                Ok((_, rejected)) => warn!(%rejected, "rejecting extra hook connection"),
                Err(error) => {
                    debug!(%error, "hook listener closed");
                    break;
                }
            }
        }
    });

    let (read_half, write_half) = stream.into_split();
    let link = Link::start(write_half);
    if !session.on_link_connected(link) {
        return;
    }

    let mut lines = BufReader::new(read_half).lines();
    loop {
        match lines.next_line().await {
            Ok(Some(line)) => session.handle_hook_line(&line),
            Ok(None) => break,
            Err(error) => {
                warn!(%error, "hook channel read failed");
                break;
            }
        }
    }
    info!("hook disconnected");
    session.on_link_closed();
}
