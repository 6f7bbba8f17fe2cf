//! A Debug Adapter Protocol bridge for Vim's built-in script debugger.
//!
//! The bridge terminates DAP toward the editor (stdio, `Content-Length`
//! framing) and drives a hook running inside the Vim process over a
//! private newline-delimited JSON TCP channel. The hook long-polls for
//! debugger commands; the bridge translates editor requests into replies
//! to those polls and into correlated request/reply calls.

pub mod dap;
pub mod session;
pub mod vim;

use std::{io, net::SocketAddr, sync::Arc, time::Duration};

use tokio::{
    io::{AsyncRead, AsyncWrite, BufReader},
    net::TcpListener,
};
use tracing::{info, warn};

use dap::{requests::Command, FramingError};
use session::DebugSession;

#[derive(Clone, Debug)]
pub struct BridgeConfig {
    /// Address the hook link listens on.
    pub listen: SocketAddr,
    /// How long to wait for the hook's `Initialize` after launch/attach.
    pub handshake_timeout: Duration,
    /// Per-call reply timeout for correlated hook requests.
    pub request_timeout: Duration,
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            listen: ([127, 0, 0, 1], 8765).into(),
            handshake_timeout: Duration::from_secs(20),
            request_timeout: Duration::from_secs(10),
        }
    }
}

/// Runs one debug session over the given editor transport until the
/// editor disconnects or closes its stream.
///
/// The listener is taken pre-bound so callers (and tests) can pick the
/// port before the editor is told where the hook should connect.
pub async fn run<R, W>(
    listener: TcpListener,
    editor_in: R,
    editor_out: W,
    config: BridgeConfig,
) -> io::Result<()>
where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin + Send + 'static,
{
    let editor = dap::spawn_writer(editor_out);
    let session = Arc::new(DebugSession::new(editor.clone(), config));
    tokio::spawn(vim::link::serve(listener, Arc::clone(&session)));

    let mut input = BufReader::new(editor_in);
    loop {
        match dap::read_request(&mut input).await {
            Ok(Some(request)) => {
                let last = matches!(request.command, Command::Disconnect(_));
                let response = session.handle(request).await;
                editor.respond(response);
                if last {
                    info!("editor disconnected");
                    break;
                }
            }
            Ok(None) => {
                info!("editor stream closed");
                break;
            }
            // One unparseable request must not take the session down.
            Err(FramingError::Payload(error)) => {
                warn!(%error, "dropping malformed editor request");
            }
            Err(FramingError::Header(line)) => {
                warn!(%line, "editor stream desynchronized");
                break;
            }
            Err(FramingError::Io(error)) => {
                session.shutdown();
                return Err(error);
            }
        }
    }
    session.shutdown();
    Ok(())
}
