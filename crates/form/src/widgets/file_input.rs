//! File path field backed by backend inspection.
//!
//! Typing arms a debounce timer; when it fires and the path differs from the
//! last inspected one, `req:inspect-file` goes out. The response fills in size
//! and creation time and confirms the field. `Browse` asks the backend for a
//! path and inspects the result immediately.

use std::cell::RefCell;
use std::rc::{Rc, Weak};

use cean_comm::{BackendComm, SendOutcome};
use cean_types::WidgetKey;
use cean_types::wire::{ReqBrowseFiles, ReqInspectFile, ResBrowseFiles, ResInspectFile};
use cean_util::{format_local_datetime, human_size, parse_timestamp};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use tracing::{debug, warn};

use crate::cell::{Field, StatusLine, ValueCell};
use crate::timer::Debouncer;
use crate::widget::{EventOutcome, FormContext, InputWidget, UiAction, decode};
use crate::{FormError, TextBuffer};

const INSPECTION_FAILED: &str = "Could not inspect file";

/// What the backend reported about the current path.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FileDetails {
    pub local_path: String,
    #[serde(default)]
    pub remote_path: Option<String>,
    #[serde(default)]
    pub size: Option<u64>,
    #[serde(default)]
    pub creation_time: Option<DateTime<Utc>>,
}

#[derive(Default)]
struct InspectionState {
    /// Last path a response was received for.
    previous_value: Option<String>,
    /// Path of the request awaiting its response.
    requested: Option<String>,
    /// Path parked behind `requested`; it goes out when that response lands.
    parked: Option<String>,
    size: Option<u64>,
    creation_time: Option<DateTime<Utc>>,
    remote_path: Option<String>,
}

struct FileInner {
    field: Field<String>,
    text: RefCell<TextBuffer>,
    comm: BackendComm,
    debouncer: Debouncer,
    state: RefCell<InspectionState>,
}

impl FileInner {
    fn key(&self) -> &WidgetKey {
        self.field.key()
    }

    fn schedule_inspection(self: &Rc<Self>) {
        let weak: Weak<FileInner> = Rc::downgrade(self);
        self.debouncer.call(move || {
            if let Some(inner) = weak.upgrade() {
                inner.inspect();
            }
        });
    }

    fn inspect(&self) {
        let Some(path) = self.field.value() else {
            debug!(key = %self.key(), "path cleared, dropping inspection state");
            *self.state.borrow_mut() = InspectionState::default();
            self.field.with_mut(|cell| {
                cell.set_external_error(None);
                cell.status_mut().clear_lines();
            });
            self.field.confirm();
            return;
        };
        if self.state.borrow().previous_value.as_deref() == Some(path.as_str()) {
            debug!(key = %self.key(), path = %path, "path already inspected");
            return;
        }
        let request = ReqInspectFile { filename: path.clone() };
        match self.comm.send_req_inspect_file(self.key(), &request) {
            Ok(SendOutcome::Sent) => self.state.borrow_mut().requested = Some(path),
            Ok(SendOutcome::Parked) => self.state.borrow_mut().parked = Some(path),
            Err(err) => warn!(key = %self.key(), error = %err, "failed to send inspection request"),
        }
    }

    fn on_inspected(self: &Rc<Self>, response: ResInspectFile) {
        let current = self.field.value();
        let (inspected, awaiting) = {
            let mut state = self.state.borrow_mut();
            let inspected = state.requested.take().or_else(|| current.clone());
            state.requested = state.parked.take();
            state.previous_value = inspected.clone();
            (inspected, state.requested.is_some())
        };
        if inspected != current {
            debug!(key = %self.key(), inspected = ?inspected, "response is for an older path");
            {
                let mut state = self.state.borrow_mut();
                state.size = None;
                state.creation_time = None;
                state.remote_path = None;
            }
            if !awaiting && !self.debouncer.is_pending() {
                self.schedule_inspection();
            }
            return;
        }
        let lines = {
            let mut state = self.state.borrow_mut();
            if response.success {
                state.size = response.size;
                state.creation_time = response.creation_time.as_deref().and_then(parse_timestamp);
                state.remote_path = response.remote_path.clone();
                vec![
                    StatusLine::new("Size", state.size.map(human_size).unwrap_or_default()),
                    StatusLine::new(
                        "Creation time",
                        state
                            .creation_time
                            .as_ref()
                            .map_or_else(|| "ERROR".to_string(), format_local_datetime),
                    ),
                ]
            } else {
                state.size = None;
                state.creation_time = None;
                state.remote_path = None;
                Vec::new()
            }
        };
        let error = (!response.success).then(|| response.error.unwrap_or_else(|| INSPECTION_FAILED.to_string()));
        debug!(key = %self.key(), success = response.success, "inspection result");
        self.field.with_mut(|cell| {
            cell.set_external_error(error);
            cell.status_mut().set_lines(lines);
        });
        self.field.confirm();
    }

    fn on_browsed(&self, response: ResBrowseFiles) {
        self.debouncer.cancel();
        self.text.borrow_mut().set_text(response.selected);
        let value = self.text.borrow().value();
        self.field.with_mut(|cell| {
            cell.set_value(value);
            cell.set_external_error(None);
        });
        self.inspect();
    }
}

pub struct FileInput {
    inner: Rc<FileInner>,
}

impl FileInput {
    pub fn new(ctx: &FormContext, key: WidgetKey, required: bool) -> Self {
        let inner = Rc::new(FileInner {
            field: Field::new(&ctx.bus, ctx.scope, ValueCell::new(key.clone()).required(required)),
            text: RefCell::new(TextBuffer::new()),
            comm: ctx.comm.clone(),
            debouncer: Debouncer::new(ctx.timers.clone(), ctx.debounce()),
            state: RefCell::new(InspectionState::default()),
        });

        let weak = Rc::downgrade(&inner);
        ctx.comm.on_res_inspect_file(&key, move |response| {
            if let Some(inner) = weak.upgrade() {
                inner.on_inspected(response);
            }
        });
        let weak = Rc::downgrade(&inner);
        ctx.comm.on_res_browse_files(&key, move |response| {
            if let Some(inner) = weak.upgrade() {
                inner.on_browsed(response);
            }
        });
        Self { inner }
    }

    pub fn field(&self) -> &Field<String> {
        &self.inner.field
    }

    pub fn value(&self) -> Option<String> {
        self.inner.field.value()
    }

    pub fn text(&self) -> String {
        self.inner.text.borrow().text().to_string()
    }

    /// Size of the current path, once the backend has reported on it.
    pub fn size(&self) -> Option<u64> {
        let state = self.inner.state.borrow();
        state.size.filter(|_| state.previous_value == self.value())
    }

    /// Whether the backend has reported on the current path.
    pub fn is_inspected(&self) -> bool {
        let state = self.inner.state.borrow();
        state.size.is_some() && state.previous_value == self.value()
    }

    pub fn details(&self) -> Option<FileDetails> {
        let local_path = self.value()?;
        let state = self.inner.state.borrow();
        if state.previous_value.as_deref() != Some(local_path.as_str()) {
            return Some(FileDetails {
                local_path,
                ..FileDetails::default()
            });
        }
        Some(FileDetails {
            local_path,
            remote_path: state.remote_path.clone(),
            size: state.size,
            creation_time: state.creation_time,
        })
    }

    pub fn is_debouncing(&self) -> bool {
        self.inner.debouncer.is_pending()
    }

    fn edit(&self, action: UiAction) {
        {
            let mut text = self.inner.text.borrow_mut();
            match action {
                UiAction::Input(value) => text.set_text(value),
                UiAction::Char(c) => text.insert_char(c),
                UiAction::Backspace => text.backspace(),
                UiAction::Left => text.move_left(),
                UiAction::Right => text.move_right(),
                _ => return,
            }
        }
        let value = self.inner.text.borrow().value();
        self.inner.field.with_mut(|cell| {
            cell.set_value(value);
            cell.set_external_error(None);
        });
        self.inner.schedule_inspection();
    }

    fn browse(&self) {
        if let Err(err) = self.inner.comm.send_req_browse_files(self.key(), &ReqBrowseFiles {}) {
            warn!(key = %self.key(), error = %err, "failed to send browse request");
        }
    }
}

impl InputWidget for FileInput {
    fn key(&self) -> &WidgetKey {
        self.inner.key()
    }

    fn value_json(&self) -> Value {
        self.inner.field.value_json()
    }

    fn set_value_json(&mut self, value: Value) -> Result<(), FormError> {
        let path: Option<String> = decode(self.key(), value)?;
        self.inner.text.borrow_mut().set_text(path.clone().unwrap_or_default());
        self.inner.field.set_value(path.filter(|p| !p.is_empty()));
        Ok(())
    }

    fn validation_error(&self) -> Option<String> {
        self.inner.field.check()
    }

    fn handle(&mut self, target: &WidgetKey, action: UiAction) -> EventOutcome {
        if target != self.key() {
            return EventOutcome::Ignored;
        }
        match action {
            action if action.is_text_edit() => {
                self.edit(action);
                EventOutcome::Handled
            }
            UiAction::Enter | UiAction::Blur => {
                self.inner.field.confirm();
                EventOutcome::Committed
            }
            UiAction::Browse => {
                self.browse();
                EventOutcome::Handled
            }
            UiAction::Focus | UiAction::Click => EventOutcome::Handled,
            _ => EventOutcome::Ignored,
        }
    }

    fn apply_backend_error(&mut self, field: &WidgetKey, message: &str) -> bool {
        if field != self.key() {
            return false;
        }
        self.inner.field.report_error(Some(message.to_string()));
        true
    }

    fn dispose(&mut self) {
        self.inner.debouncer.cancel();
        self.inner.comm.off_res_inspect_file(self.key());
        self.inner.comm.off_res_browse_files(self.key());
        self.inner.field.dispose();
    }

    fn snapshot(&self) -> Value {
        let cell = self.inner.field.borrow();
        json!({
            "text": self.text(),
            "value": cell.value_json(),
            "details": self.details(),
            "status": cell.status(),
        })
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::testing::context;
    use cean_types::Envelope;
    use tokio::time::Instant;

    fn later() -> Instant {
        Instant::now() + Duration::from_secs(5)
    }

    #[test]
    fn rapid_edits_send_one_request_with_the_last_value() {
        let (ctx, transport) = context();
        let mut input = FileInput::new(&ctx, "files.0".into(), false);
        let key = input.key().clone();

        for c in ['a', 'b', 'c'] {
            input.handle(&key, UiAction::Char(c));
        }
        assert!(transport.is_empty());
        assert!(input.is_debouncing());

        assert_eq!(ctx.timers.fire_due(later()), 1);
        let sent = transport.take_sent();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].kind, "req:inspect-file");
        assert_eq!(sent[0].payload, json!({"filename": "abc"}));
    }

    #[test]
    fn successful_inspection_renders_size() {
        let (ctx, transport) = context();
        let mut input = FileInput::new(&ctx, "files.0".into(), false);
        let key = input.key().clone();
        input.handle(&key, UiAction::Input("/data/run.h5".into()));
        ctx.timers.fire_due(later());
        transport.take_sent();

        let outcome = ctx.comm.dispatch(Envelope::new(
            "res:inspect-file",
            key.clone(),
            json!({"success": true, "size": 1024, "creationTime": "2024-01-01T00:00:00Z"}),
        ));
        assert!(outcome.is_delivered());
        let cell = input.field().borrow();
        let lines = cell.status().lines();
        assert_eq!(lines[0], StatusLine::new("Size", "1.00 kiB"));
        assert_eq!(lines[1].label, "Creation time");
        assert_ne!(lines[1].text, "ERROR");
        drop(cell);
        assert!(input.is_inspected());
        assert!(input.is_valid());
    }

    #[test]
    fn failed_inspection_shows_error_and_same_path_is_not_resent() {
        let (ctx, transport) = context();
        let mut input = FileInput::new(&ctx, "files.0".into(), false);
        let key = input.key().clone();
        input.handle(&key, UiAction::Input("/missing".into()));
        ctx.timers.fire_due(later());
        ctx.comm.dispatch(Envelope::new(
            "res:inspect-file",
            key.clone(),
            json!({"success": false, "error": "No such file"}),
        ));
        assert_eq!(input.validation_error().as_deref(), Some("No such file"));

        transport.take_sent();
        input.handle(&key, UiAction::Input("/missing".into()));
        ctx.timers.fire_due(later());
        assert!(transport.is_empty());
    }

    #[test]
    fn response_for_an_older_path_is_not_applied_to_the_new_one() {
        let (ctx, transport) = context();
        let mut input = FileInput::new(&ctx, "files.0".into(), false);
        let key = input.key().clone();
        input.handle(&key, UiAction::Input("/a".into()));
        ctx.timers.fire_due(later());
        assert_eq!(transport.take_sent().len(), 1);

        input.handle(&key, UiAction::Input("/b".into()));
        ctx.comm.dispatch(Envelope::new(
            "res:inspect-file",
            key.clone(),
            json!({"success": true, "size": 7}),
        ));
        assert!(!input.is_inspected());
        assert_eq!(input.size(), None);
        assert_eq!(input.details().and_then(|details| details.size), None);

        ctx.timers.fire_due(later());
        let sent = transport.take_sent();
        assert_eq!(sent.len(), 1, "the new path must still be inspected: {sent:?}");
        assert_eq!(sent[0].payload, json!({"filename": "/b"}));

        ctx.comm.dispatch(Envelope::new(
            "res:inspect-file",
            key.clone(),
            json!({"success": true, "size": 9}),
        ));
        assert!(input.is_inspected());
        assert_eq!(input.size(), Some(9));
    }

    #[test]
    fn parked_inspection_goes_out_after_the_stale_response() {
        let (ctx, transport) = context();
        let mut input = FileInput::new(&ctx, "files.0".into(), false);
        let key = input.key().clone();
        input.handle(&key, UiAction::Input("/a".into()));
        ctx.timers.fire_due(later());
        input.handle(&key, UiAction::Input("/b".into()));
        ctx.timers.fire_due(later());
        assert_eq!(transport.take_sent().len(), 1);

        ctx.comm.dispatch(Envelope::new(
            "res:inspect-file",
            key.clone(),
            json!({"success": true, "size": 7}),
        ));
        assert_eq!(input.size(), None);
        let sent = transport.take_sent();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].payload, json!({"filename": "/b"}));

        ctx.comm.dispatch(Envelope::new(
            "res:inspect-file",
            key.clone(),
            json!({"success": true, "size": 9}),
        ));
        assert_eq!(input.size(), Some(9));
        assert!(transport.is_empty());
    }

    #[test]
    fn clearing_the_path_sends_nothing() {
        let (ctx, transport) = context();
        let mut input = FileInput::new(&ctx, "files.0".into(), false);
        let key = input.key().clone();
        input.handle(&key, UiAction::Input("x".into()));
        input.handle(&key, UiAction::Backspace);
        ctx.timers.fire_due(later());
        assert!(transport.is_empty());
        assert_eq!(input.value_json(), Value::Null);
    }

    #[test]
    fn browse_result_is_inspected_immediately() {
        let (ctx, transport) = context();
        let mut input = FileInput::new(&ctx, "files.0".into(), false);
        let key = input.key().clone();
        input.handle(&key, UiAction::Browse);
        assert_eq!(transport.take_sent()[0].kind, "req:browse-files");

        ctx.comm
            .dispatch(Envelope::new("res:browse-files", key.clone(), json!({"selected": "/picked"})));
        assert_eq!(input.text(), "/picked");
        let sent = transport.take_sent();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].payload, json!({"filename": "/picked"}));
    }

    #[test]
    fn dispose_unregisters_callbacks_and_cancels_timer() {
        let (ctx, transport) = context();
        let mut input = FileInput::new(&ctx, "files.0".into(), false);
        let key = input.key().clone();
        input.handle(&key, UiAction::Char('a'));
        input.dispose();

        assert_eq!(ctx.timers.fire_due(later()), 0);
        assert!(transport.is_empty());
        assert_eq!(ctx.comm.registration_count(), 0);
    }
}
