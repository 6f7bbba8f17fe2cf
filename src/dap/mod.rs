//! The editor-facing half of the bridge: a typed subset of the Debug
//! Adapter Protocol plus `Content-Length` framing over arbitrary async
//! byte streams.

pub mod events;
pub mod requests;
pub mod responses;
pub mod types;

use serde::Serialize;
use thiserror::Error;
use tokio::{
    io::{AsyncBufRead, AsyncBufReadExt, AsyncReadExt, AsyncWrite, AsyncWriteExt},
    sync::mpsc,
};
use tracing::{debug, warn};

use events::{Event, EventBody};
use requests::Request;
use responses::Response;

#[derive(Debug, Error)]
pub enum FramingError {
    #[error("i/o error on the editor stream: {0}")]
    Io(#[from] std::io::Error),
    #[error("malformed header line: {0:?}")]
    Header(String),
    #[error("malformed request payload: {0}")]
    Payload(#[source] serde_json::Error),
}

/// Reads one framed request. `Ok(None)` means the editor closed the stream
/// at a message boundary.
pub async fn read_request<R>(input: &mut R) -> Result<Option<Request>, FramingError>
where
    R: AsyncBufRead + Unpin,
{
    let mut content_length: Option<usize> = None;
    let mut line = String::new();
    loop {
        line.clear();
        if input.read_line(&mut line).await? == 0 {
            return Ok(None);
        }
        let trimmed = line.trim_end();
        if trimmed.is_empty() {
            let Some(length) = content_length else {
                // Stray blank line between messages.
                continue;
            };
            let mut payload = vec![0; length];
            input.read_exact(&mut payload).await?;
            let request = serde_json::from_slice(&payload).map_err(FramingError::Payload)?;
            return Ok(Some(request));
        }

        match trimmed.split_once(':') {
            Some(("Content-Length", value)) => {
                let length = value
                    .trim()
                    .parse()
                    .map_err(|_| FramingError::Header(trimmed.to_string()))?;
                content_length = Some(length);
            }
            Some((name, _)) => debug!(header = name, "ignoring unknown header"),
            None => return Err(FramingError::Header(trimmed.to_string())),
        }
    }
}

#[derive(Debug, Serialize)]
#[serde(untagged)]
enum Sendable {
    Response(Response),
    Event(Event),
}

/// Handle for sending messages back to the editor.
///
/// All writes funnel through a single task that owns the outgoing `seq`
/// counter, so responses and events interleave with consistent numbering
/// no matter which task produced them.
#[derive(Clone, Debug)]
pub struct EditorClient {
    sender: mpsc::UnboundedSender<Sendable>,
}

impl EditorClient {
    pub fn respond(&self, response: Response) {
        self.send(Sendable::Response(response));
    }

    pub fn event(&self, body: EventBody) {
        self.send(Sendable::Event(Event::new(body)));
    }

    fn send(&self, message: Sendable) {
        if self.sender.send(message).is_err() {
            warn!("editor writer is gone, dropping outgoing message");
        }
    }
}

pub fn spawn_writer<W>(mut output: W) -> EditorClient
where
    W: AsyncWrite + Unpin + Send + 'static,
{
    let (sender, mut receiver) = mpsc::unbounded_channel::<Sendable>();
    tokio::spawn(async move {
        let mut next_seq = 1;
        while let Some(mut message) = receiver.recv().await {
            match &mut message {
                Sendable::Response(response) => response.seq = next_seq,
                Sendable::Event(event) => event.seq = next_seq,
            }
            next_seq += 1;
            let payload = match serde_json::to_string(&message) {
                Ok(payload) => payload,
                Err(error) => {
                    warn!(%error, "failed to encode outgoing message");
                    continue;
                }
            };
            let framed = format!("Content-Length: {}\r\n\r\n{payload}", payload.len());
            if let Err(error) = output.write_all(framed.as_bytes()).await {
                warn!(%error, "editor stream write failed");
                break;
            }
            if let Err(error) = output.flush().await {
                warn!(%error, "editor stream flush failed");
                break;
            }
        }
    });
    EditorClient { sender }
}

#[cfg(test)]
mod tests {
    use super::*;
    use requests::Command;
    use tokio::io::BufReader;

    fn frame(payload: &str) -> Vec<u8> {
        format!("Content-Length: {}\r\n\r\n{payload}", payload.len()).into_bytes()
    }

    #[tokio::test]
    async fn reads_back_to_back_requests() {
        let mut bytes = frame(r#"{"seq":1,"type":"request","command":"threads"}"#);
        bytes.extend(frame(
            r#"{"seq":2,"type":"request","command":"configurationDone"}"#,
        ));
        let mut input = BufReader::new(bytes.as_slice());

        let first = read_request(&mut input).await.unwrap().unwrap();
        assert!(matches!(first.command, Command::Threads));
        let second = read_request(&mut input).await.unwrap().unwrap();
        assert!(matches!(second.command, Command::ConfigurationDone));
        assert!(read_request(&mut input).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn rejects_garbage_header() {
        let mut input = BufReader::new(&b"not a header\r\n\r\n"[..]);
        assert!(matches!(
            read_request(&mut input).await,
            Err(FramingError::Header(_))
        ));
    }

    #[tokio::test]
    async fn writer_assigns_increasing_seq() {
        let (client_side, mut test_side) = tokio::io::duplex(4096);
        let client = spawn_writer(client_side);
        client.event(EventBody::Initialized);
        client.respond(Response::success(1, responses::ResponseBody::Launch));

        let mut buffer = vec![0; 1024];
        let mut text = String::new();
        while !text.contains(r#""seq":2"#) {
            let n = test_side.read(&mut buffer).await.unwrap();
            assert!(n > 0, "stream closed before both messages arrived");
            text.push_str(std::str::from_utf8(&buffer[..n]).unwrap());
        }
        assert!(text.contains(r#""seq":1"#));
        assert!(text.contains(r#""event":"initialized""#));
    }
}
