//! The backend child process and the tasks bridging its stdio.

use std::process::Stdio;
use std::time::Duration;

use anyhow::{Context, Result};
use cean_comm::ChannelTransport;
use cean_types::Envelope;
use tokio::io::{AsyncBufReadExt, AsyncWrite, AsyncWriteExt, BufReader};
use tokio::process::{Child, ChildStderr, ChildStdout, Command};
use tokio::sync::mpsc::{self, UnboundedReceiver};
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

const EXIT_GRACE: Duration = Duration::from_secs(2);

pub struct Backend {
    child: Child,
    writer: JoinHandle<Result<()>>,
    input_done: Option<oneshot::Sender<()>>,
}

/// Spawns `command` and returns it with its stdout and the transport that
/// writes to its stdin.
pub fn spawn(command: &str, args: &[String]) -> Result<(Backend, BufReader<ChildStdout>, ChannelTransport)> {
    let mut child = Command::new(command)
        .args(args)
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true)
        .spawn()
        .with_context(|| format!("spawning backend {command}"))?;
    info!(command, pid = ?child.id(), "backend started");

    let stdin = child.stdin.take().context("backend stdin was not captured")?;
    let stdout = child.stdout.take().context("backend stdout was not captured")?;
    if let Some(stderr) = child.stderr.take() {
        spawn_stderr_logger(stderr);
    }

    let (sender, receiver) = mpsc::unbounded_channel();
    let (done_sender, done_receiver) = oneshot::channel();
    let writer = tokio::spawn(forward_requests(receiver, stdin, done_receiver));

    let backend = Backend {
        child,
        writer,
        input_done: Some(done_sender),
    };
    Ok((backend, BufReader::new(stdout), ChannelTransport::new(sender)))
}

impl Backend {
    /// Signal that no further requests will be produced. The writer flushes
    /// what is queued and closes the backend's stdin.
    pub fn take_input_done(&mut self) -> Option<oneshot::Sender<()>> {
        self.input_done.take()
    }

    /// Closes stdin and waits briefly for the backend to exit, killing it
    /// otherwise.
    pub async fn shutdown(mut self) -> Result<()> {
        if let Some(done) = self.input_done.take() {
            let _ = done.send(());
        }
        match self.writer.await {
            Ok(Ok(())) => {}
            Ok(Err(err)) => warn!(error = %err, "backend writer failed"),
            Err(err) => warn!(error = %err, "backend writer task panicked"),
        }
        match tokio::time::timeout(EXIT_GRACE, self.child.wait()).await {
            Ok(status) => {
                let status = status.context("waiting for backend")?;
                info!(%status, "backend exited");
            }
            Err(_) => {
                warn!("backend did not exit, killing it");
                self.child.kill().await.context("killing backend")?;
            }
        }
        Ok(())
    }
}

async fn forward_requests<W>(
    mut receiver: UnboundedReceiver<Envelope>,
    mut stdin: W,
    mut input_done: oneshot::Receiver<()>,
) -> Result<()>
where
    W: AsyncWrite + Unpin,
{
    loop {
        tokio::select! {
            envelope = receiver.recv() => {
                let Some(envelope) = envelope else { break };
                write_envelope(&mut stdin, &envelope).await?;
            }
            _ = &mut input_done => {
                while let Ok(envelope) = receiver.try_recv() {
                    write_envelope(&mut stdin, &envelope).await?;
                }
                break;
            }
        }
    }
    debug!("closing backend stdin");
    stdin.shutdown().await.context("closing backend stdin")?;
    Ok(())
}

/// Writes one envelope as a single JSON line.
pub async fn write_envelope<W>(writer: &mut W, envelope: &Envelope) -> Result<()>
where
    W: AsyncWrite + Unpin,
{
    let mut line = serde_json::to_vec(envelope)?;
    line.push(b'\n');
    writer.write_all(&line).await.context("writing to backend")?;
    writer.flush().await.context("flushing backend stdin")?;
    debug!(kind = %envelope.kind, key = %envelope.key, "request sent");
    Ok(())
}

fn spawn_stderr_logger(stderr: ChildStderr) {
    tokio::spawn(async move {
        let mut lines = BufReader::new(stderr).lines();
        while let Ok(Some(line)) = lines.next_line().await {
            info!(target: "cean::backend", "{line}");
        }
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use cean_types::WidgetKey;
    use serde_json::json;

    #[tokio::test]
    async fn envelopes_are_written_as_json_lines() {
        let mut out = Vec::new();
        let envelope = Envelope::new(
            "req:inspect-file",
            WidgetKey::from("files.0"),
            json!({"filename": "/data/run.h5"}),
        );
        write_envelope(&mut out, &envelope).await.unwrap();
        let text = String::from_utf8(out).unwrap();
        assert!(text.ends_with('\n'));
        assert_eq!(text.lines().count(), 1);
        let decoded: Envelope = serde_json::from_str(text.trim_end()).unwrap();
        assert_eq!(decoded, envelope);
    }

    #[tokio::test]
    async fn queued_requests_are_flushed_before_stdin_closes() {
        let (sender, receiver) = mpsc::unbounded_channel();
        let (done_sender, done_receiver) = oneshot::channel();
        let (writer, reader) = tokio::io::duplex(4096);

        for n in 0..3 {
            let key = WidgetKey::from(format!("files.{n}"));
            sender.send(Envelope::new("req:browse-files", key, json!({}))).unwrap();
        }
        done_sender.send(()).unwrap();
        forward_requests(receiver, writer, done_receiver).await.unwrap();

        let mut lines = BufReader::new(reader).lines();
        let mut keys = Vec::new();
        while let Some(line) = lines.next_line().await.unwrap() {
            let envelope: Envelope = serde_json::from_str(&line).unwrap();
            keys.push(envelope.key.to_string());
        }
        assert_eq!(keys, ["files.0", "files.1", "files.2"]);
    }
}
