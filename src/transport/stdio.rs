//! Worker-side NDJSON endpoint.

use async_trait::async_trait;
use tokio::io::{
    AsyncBufReadExt, AsyncRead, AsyncWrite, AsyncWriteExt, BufReader, BufWriter, Lines, Stdin,
    Stdout,
};

use crate::protocol::{encode_line, WorkerInbound, WorkerOutbound};

use super::error::{TransportError, TransportResult};
use super::WorkerEndpoint;

/// Reads inbound messages line by line and writes outbound ones the same way.
///
/// Lines that do not parse are logged and skipped.
pub struct StdioEndpoint<R, W> {
    lines: Lines<BufReader<R>>,
    writer: BufWriter<W>,
}

impl StdioEndpoint<Stdin, Stdout> {
    /// Endpoint over the process's own stdin/stdout.
    pub fn stdio() -> Self {
        Self::new(tokio::io::stdin(), tokio::io::stdout())
    }
}

impl<R, W> StdioEndpoint<R, W>
where
    R: AsyncRead + Unpin + Send,
    W: AsyncWrite + Unpin + Send,
{
    pub fn new(reader: R, writer: W) -> Self {
        Self {
            lines: BufReader::new(reader).lines(),
            writer: BufWriter::new(writer),
        }
    }
}

#[async_trait]
impl<R, W> WorkerEndpoint for StdioEndpoint<R, W>
where
    R: AsyncRead + Unpin + Send,
    W: AsyncWrite + Unpin + Send,
{
    async fn recv(&mut self) -> Option<WorkerInbound> {
        loop {
            match self.lines.next_line().await {
                Ok(Some(line)) => {
                    if line.trim().is_empty() {
                        continue;
                    }
                    match serde_json::from_str(&line) {
                        Ok(message) => return Some(message),
                        Err(e) => tracing::warn!(error = %e, "skipping malformed message"),
                    }
                }
                Ok(None) => return None,
                Err(e) => {
                    tracing::warn!(error = %e, "failed to read from stdin");
                    return None;
                }
            }
        }
    }

    async fn post(&mut self, message: WorkerOutbound) -> TransportResult<()> {
        let line = encode_line(&message)?;
        self.writer
            .write_all(line.as_bytes())
            .await
            .map_err(TransportError::WriteFailed)?;
        self.writer.flush().await.map_err(TransportError::WriteFailed)
    }
}
