//! The event loop of a form session.
//!
//! Three inputs feed one form: scripted UI events, backend responses and due
//! debounce timers. After each processed input the form is refreshed and a
//! snapshot is written as one JSON line.

use std::io::Write;

use anyhow::{Context, Result};
use cean_form::{DatasetForm, UiEvent};
use tokio::io::{AsyncBufRead, AsyncBufReadExt, Lines};
use tokio::sync::oneshot;
use tokio::time::{Instant, sleep_until};
use tracing::{debug, info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopReason {
    BackendClosed,
    Interrupted,
}

pub struct Session<W> {
    form: DatasetForm,
    out: W,
}

impl<W: Write> Session<W> {
    pub fn new(form: DatasetForm, out: W) -> Self {
        Self { form, out }
    }

    pub fn form(&self) -> &DatasetForm {
        &self.form
    }

    /// Disposes the form and hands back the snapshot sink.
    pub fn finish(mut self) -> W {
        self.form.dispose();
        self.out
    }

    pub fn emit_snapshot(&mut self) -> Result<()> {
        let snapshot = serde_json::to_string(&self.form.snapshot())?;
        writeln!(self.out, "{snapshot}").context("writing snapshot")?;
        self.out.flush().context("flushing snapshot")
    }

    /// Applies one line of UI input. Blank lines are skipped; malformed
    /// events and unknown targets are logged and skipped.
    pub fn handle_event_line(&mut self, line: &str) -> Result<()> {
        let line = line.trim();
        if line.is_empty() {
            return Ok(());
        }
        let event: UiEvent = match serde_json::from_str(line) {
            Ok(event) => event,
            Err(err) => {
                warn!(error = %err, line, "skipping malformed event");
                return Ok(());
            }
        };
        if let Err(err) = self.form.handle_event(event) {
            warn!(error = %err, "event not handled");
            return Ok(());
        }
        self.form.refresh();
        self.emit_snapshot()
    }

    /// Routes one line from the backend to the callback waiting for it.
    pub fn handle_backend_line(&mut self, line: &str) -> Result<()> {
        let line = line.trim();
        if line.is_empty() {
            return Ok(());
        }
        let outcome = self.form.context().comm.dispatch_json(line);
        debug!(?outcome, "backend message");
        self.form.refresh();
        self.emit_snapshot()
    }

    /// Runs the timers due at `now`. A snapshot follows only when one fired.
    pub fn fire_timers(&mut self, now: Instant) -> Result<()> {
        let fired = self.form.context().timers.fire_due(now);
        if fired == 0 {
            return Ok(());
        }
        self.form.refresh();
        self.emit_snapshot()
    }

    /// Nothing left that could still produce a request.
    fn is_idle(&self) -> bool {
        let ctx = self.form.context();
        ctx.timers.is_empty() && !ctx.comm.has_outstanding()
    }

    /// Processes input until the backend closes its stdout or the process is
    /// interrupted.
    ///
    /// Once `events` is exhausted, no timer is pending and every request has
    /// been answered, `input_done` is signalled so the backend can see the end
    /// of its input.
    pub async fn run<E, B>(
        &mut self,
        events: Option<E>,
        backend: B,
        mut input_done: Option<oneshot::Sender<()>>,
    ) -> Result<StopReason>
    where
        E: AsyncBufRead + Unpin,
        B: AsyncBufRead + Unpin,
    {
        let mut events = events.map(AsyncBufReadExt::lines);
        let mut backend = backend.lines();
        self.emit_snapshot()?;

        let reason = loop {
            if events.is_none()
                && self.is_idle()
                && let Some(done) = input_done.take()
            {
                debug!("input exhausted");
                let _ = done.send(());
            }
            let deadline = self.form.context().timers.next_deadline();

            tokio::select! {
                biased;
                line = next_line(&mut events), if events.is_some() => {
                    match line.context("reading events")? {
                        Some(line) => self.handle_event_line(&line)?,
                        None => {
                            debug!("event stream ended");
                            events = None;
                        }
                    }
                }
                line = backend.next_line() => {
                    match line.context("reading backend output")? {
                        Some(line) => self.handle_backend_line(&line)?,
                        None => break StopReason::BackendClosed,
                    }
                }
                _ = sleep_until(deadline.unwrap_or_else(Instant::now)), if deadline.is_some() => {
                    self.fire_timers(Instant::now())?;
                }
                _ = tokio::signal::ctrl_c() => break StopReason::Interrupted,
            }
        };
        info!(?reason, "session ended");
        Ok(reason)
    }
}

async fn next_line<R>(lines: &mut Option<Lines<R>>) -> std::io::Result<Option<String>>
where
    R: AsyncBufRead + Unpin,
{
    match lines {
        Some(lines) => lines.next_line().await,
        None => Ok(None),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    use cean_comm::{BackendComm, MemoryTransport};
    use cean_form::{FormContext, FormSetup, TimerQueue, UploadState};
    use cean_util::FormConfig;
    use serde_json::Value;
    use tokio::io::{AsyncWriteExt, BufReader};

    fn session() -> (Session<Vec<u8>>, MemoryTransport) {
        let transport = MemoryTransport::new();
        let comm = BackendComm::new(transport.clone());
        let ctx = FormContext::new(comm, TimerQueue::new(), FormConfig::default());
        let form = DatasetForm::standard(ctx, FormSetup::default()).unwrap();
        (Session::new(form, Vec::new()), transport)
    }

    fn snapshots(out: Vec<u8>) -> Vec<Value> {
        String::from_utf8(out)
            .unwrap()
            .lines()
            .map(|line| serde_json::from_str(line).unwrap())
            .collect()
    }

    #[tokio::test]
    async fn scripted_upload_reaches_the_backend() {
        let (mut session, transport) = session();
        let events = concat!(
            "{\"target\": \"name\", \"action\": {\"input\": \"run 1\"}}\n",
            "\n",
            "not an event\n",
            "{\"target\": \"upload\", \"action\": \"click\"}\n",
            "{\"target\": \"upload\", \"action\": \"enter\"}\n",
        );
        let backend =
            "{\"type\": \"res:upload-dataset\", \"key\": \"upload\", \"payload\": {\"datasetName\": \"run 1\", \"pid\": \"p/1\"}}\n";

        let reason = session
            .run(Some(events.as_bytes()), backend.as_bytes(), None)
            .await
            .unwrap();
        assert_eq!(reason, StopReason::BackendClosed);

        let sent = transport.take_sent();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].kind, "req:upload-dataset");
        assert_eq!(sent[0].payload["name"], "run 1");
        assert!(matches!(session.form().upload_state(), UploadState::Succeeded { .. }));

        let snapshots = snapshots(session.finish());
        // initial + three events + one response
        assert_eq!(snapshots.len(), 5);
        assert_eq!(snapshots[2]["upload"]["state"], "confirming");
        assert_eq!(snapshots[4]["upload"]["pid"], "p/1");
    }

    #[tokio::test]
    async fn input_done_is_signalled_when_events_end() {
        let (mut session, _) = session();
        let (done_sender, done_receiver) = oneshot::channel();
        session
            .run(Some("".as_bytes()), "".as_bytes(), Some(done_sender))
            .await
            .unwrap();
        assert!(done_receiver.await.is_ok());
    }

    #[tokio::test]
    async fn input_stays_open_while_a_browse_is_answered() {
        let (mut session, transport) = session();
        let (done_sender, mut done_receiver) = oneshot::channel();
        let (mut backend_writer, backend_reader) = tokio::io::duplex(4096);
        let events = "{\"target\": \"files.0\", \"action\": \"browse\"}\n";

        let run = session.run(
            Some(events.as_bytes()),
            BufReader::new(backend_reader),
            Some(done_sender),
        );
        let drive = async {
            while transport.is_empty() {
                tokio::task::yield_now().await;
            }
            assert!(done_receiver.try_recv().is_err(), "browse still unanswered");
            backend_writer
                .write_all(b"{\"type\": \"res:browse-files\", \"key\": \"files.0\", \"payload\": {\"selected\": \"/picked.h5\"}}\n")
                .await
                .unwrap();

            while transport.len() < 2 {
                tokio::task::yield_now().await;
            }
            assert!(done_receiver.try_recv().is_err(), "inspection still unanswered");
            backend_writer
                .write_all(b"{\"type\": \"res:inspect-file\", \"key\": \"files.0\", \"payload\": {\"success\": true, \"size\": 10}}\n")
                .await
                .unwrap();

            (&mut done_receiver).await.unwrap();
            drop(backend_writer);
        };
        let (reason, ()) = tokio::join!(run, drive);
        assert_eq!(reason.unwrap(), StopReason::BackendClosed);

        let sent = transport.take_sent();
        assert_eq!(sent[0].kind, "req:browse-files");
        assert_eq!(sent[1].kind, "req:inspect-file");
        assert_eq!(sent[1].payload["filename"], "/picked.h5");
    }

    #[test]
    fn due_timers_send_the_debounced_inspection() {
        let (mut session, transport) = session();
        session
            .handle_event_line(r#"{"target": "files.0", "action": {"input": "/data/run.h5"}}"#)
            .unwrap();
        assert!(transport.is_empty());

        session.fire_timers(Instant::now()).unwrap();
        assert!(transport.is_empty());
        session
            .fire_timers(Instant::now() + Duration::from_secs(1))
            .unwrap();
        let sent = transport.take_sent();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].payload["filename"], "/data/run.h5");

        let snapshots = snapshots(session.finish());
        assert_eq!(snapshots.len(), 2);
    }
}
