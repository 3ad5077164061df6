//! Child-process transport: NDJSON over the worker's stdin/stdout.

use std::io;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader, BufWriter};
use tokio::process::{Child, ChildStdin, ChildStdout, Command};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::protocol::{encode_line, WorkerInbound, WorkerOutbound};

use super::error::{TransportError, TransportResult};
use super::{WorkerEvent, WorkerLink, WorkerPort, WorkerSpawner};

/// Spawns the worker as a child process.
///
/// Stderr is inherited so worker logs reach the parent's terminal.
#[derive(Debug, Clone)]
pub struct ProcessSpawner {
    program: PathBuf,
}

impl ProcessSpawner {
    pub fn new<P: AsRef<Path>>(program: P) -> Self {
        Self {
            program: program.as_ref().to_path_buf(),
        }
    }
}

struct ProcessPort {
    tx: mpsc::UnboundedSender<WorkerInbound>,
    shutdown: CancellationToken,
}

impl WorkerPort for ProcessPort {
    fn post(&self, message: WorkerInbound) -> TransportResult<()> {
        if self.shutdown.is_cancelled() {
            return Err(TransportError::Closed);
        }
        self.tx.send(message).map_err(|_| TransportError::Closed)
    }

    fn terminate(&self) {
        self.shutdown.cancel();
    }
}

#[async_trait]
impl WorkerSpawner for ProcessSpawner {
    async fn spawn(&self) -> TransportResult<WorkerLink> {
        let mut child = Command::new(&self.program)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::inherit())
            .kill_on_drop(true)
            .spawn()
            .map_err(TransportError::SpawnFailed)?;

        let stdin = child.stdin.take().ok_or_else(|| not_captured("stdin"))?;
        let stdout = child.stdout.take().ok_or_else(|| not_captured("stdout"))?;

        let (inbound_tx, inbound_rx) = mpsc::unbounded_channel();
        let (event_tx, event_rx) = mpsc::unbounded_channel();
        let shutdown = CancellationToken::new();

        tokio::spawn(write_loop(
            stdin,
            inbound_rx,
            event_tx.clone(),
            shutdown.clone(),
        ));
        tokio::spawn(read_loop(stdout, event_tx, shutdown.clone()));
        tokio::spawn(supervise(child, shutdown.clone()));

        tracing::debug!(program = %self.program.display(), "spawned worker process");

        Ok(WorkerLink {
            port: Arc::new(ProcessPort {
                tx: inbound_tx,
                shutdown,
            }),
            events: event_rx,
        })
    }
}

fn not_captured(stream: &str) -> TransportError {
    TransportError::SpawnFailed(io::Error::new(
        io::ErrorKind::Other,
        format!("{} not captured", stream),
    ))
}

/// Serialize posted messages onto the child's stdin, one line each.
async fn write_loop(
    stdin: ChildStdin,
    mut inbound: mpsc::UnboundedReceiver<WorkerInbound>,
    events: mpsc::UnboundedSender<WorkerEvent>,
    shutdown: CancellationToken,
) {
    let mut writer = BufWriter::new(stdin);

    loop {
        let message = tokio::select! {
            biased;
            _ = shutdown.cancelled() => break,
            message = inbound.recv() => match message {
                Some(message) => message,
                None => break,
            },
        };

        let line = match encode_line(&message) {
            Ok(line) => line,
            Err(e) => {
                tracing::warn!(error = %e, "failed to encode message for worker");
                continue;
            }
        };

        let written = async {
            writer.write_all(line.as_bytes()).await?;
            writer.flush().await
        }
        .await;

        if let Err(e) = written {
            let _ = events.send(WorkerEvent::Failed(
                TransportError::WriteFailed(e).to_string(),
            ));
            break;
        }
    }
}

/// Parse NDJSON lines from the child's stdout into events.
///
/// Worker exit is reported only after every buffered line was delivered, so a
/// response written just before exit still reaches its caller.
async fn read_loop(
    stdout: ChildStdout,
    events: mpsc::UnboundedSender<WorkerEvent>,
    shutdown: CancellationToken,
) {
    let mut reader = BufReader::new(stdout);
    let mut line = String::new();

    loop {
        line.clear();
        let read = tokio::select! {
            biased;
            _ = shutdown.cancelled() => return,
            read = reader.read_line(&mut line) => read,
        };

        match read {
            Ok(0) => {
                let _ = events.send(WorkerEvent::Failed(
                    "worker process exited".to_string(),
                ));
                break;
            }
            Ok(_) => {
                if line.trim().is_empty() {
                    continue;
                }
                match serde_json::from_str::<WorkerOutbound>(&line) {
                    Ok(message) => {
                        if events.send(WorkerEvent::Message(message)).is_err() {
                            break;
                        }
                    }
                    Err(e) => {
                        tracing::warn!(error = %e, "failed to parse worker message");
                    }
                }
            }
            Err(e) => {
                let _ = events.send(WorkerEvent::Failed(
                    TransportError::ReadFailed(e).to_string(),
                ));
                break;
            }
        }
    }
}

/// Kill the child on terminate; otherwise just log its exit.
async fn supervise(mut child: Child, shutdown: CancellationToken) {
    tokio::select! {
        status = child.wait() => match status {
            Ok(status) => tracing::info!(%status, "worker process exited"),
            Err(e) => tracing::warn!(error = %e, "failed to wait for worker process"),
        },
        _ = shutdown.cancelled() => {
            if let Err(e) = child.kill().await {
                tracing::warn!(error = %e, "failed to kill worker process");
            }
        }
    }
}
