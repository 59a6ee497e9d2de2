//! Upload of the gathered dataset.
//!
//! The controller asks for confirmation unless the configuration skips it and
//! the form is valid, then sends `req:upload-dataset`. Field errors in the
//! response are queued for the form to route to its widgets.

use std::cell::RefCell;
use std::rc::{Rc, Weak};

use cean_comm::BackendComm;
use cean_types::wire::{ReqUploadDataset, ResUploadDataset};
use cean_types::{FieldError, WidgetKey};
use serde::Serialize;
use serde_json::{Map as JsonMap, Value};
use tracing::{debug, info, warn};

use crate::FormError;
use crate::widget::FormContext;

pub const UPLOAD_KEY: &str = "upload";

/// Data collected from every widget, ready to send.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GatherResult {
    pub data: JsonMap<String, Value>,
    /// Some widget failed validation.
    pub validation_errors: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "state", rename_all = "camelCase", rename_all_fields = "camelCase")]
pub enum UploadState {
    Idle,
    Confirming {
        validation_errors: bool,
        message: String,
    },
    Uploading,
    Succeeded {
        dataset_name: String,
        pid: Option<String>,
        dataset_url: Option<String>,
    },
    Failed {
        errors: Vec<FieldError>,
    },
}

#[derive(Default)]
struct Outcome {
    state: Option<UploadState>,
    field_errors: Vec<FieldError>,
}

pub struct UploadController {
    key: WidgetKey,
    comm: BackendComm,
    scicat_url: String,
    skip_confirmation: bool,
    state: UploadState,
    pending: Option<JsonMap<String, Value>>,
    outcome: Rc<RefCell<Outcome>>,
}

impl UploadController {
    pub fn new(ctx: &FormContext) -> Self {
        let key = WidgetKey::from(UPLOAD_KEY);
        let outcome = Rc::new(RefCell::new(Outcome::default()));
        let weak: Weak<RefCell<Outcome>> = Rc::downgrade(&outcome);
        ctx.comm.on_res_upload_dataset(&key, move |response: ResUploadDataset| {
            if let Some(outcome) = weak.upgrade() {
                record_response(&mut outcome.borrow_mut(), response);
            }
        });
        Self {
            key,
            comm: ctx.comm.clone(),
            scicat_url: ctx.config.scicat_url.clone(),
            skip_confirmation: ctx.config.skip_confirmation,
            state: UploadState::Idle,
            pending: None,
            outcome,
        }
    }

    pub fn key(&self) -> &WidgetKey {
        &self.key
    }

    pub fn state(&self) -> &UploadState {
        &self.state
    }

    /// Starts an upload: either shows the confirmation or sends right away.
    pub fn request_upload(&mut self, gathered: GatherResult) -> Result<&UploadState, FormError> {
        if gathered.validation_errors || !self.skip_confirmation {
            self.state = UploadState::Confirming {
                validation_errors: gathered.validation_errors,
                message: self.dialog_message(gathered.validation_errors),
            };
            self.pending = Some(gathered.data);
            return Ok(&self.state);
        }
        self.send(gathered.data)?;
        Ok(&self.state)
    }

    /// Sends the data awaiting confirmation.
    pub fn confirm(&mut self) -> Result<&UploadState, FormError> {
        let Some(data) = self.pending.take() else {
            debug!("nothing awaiting confirmation");
            return Ok(&self.state);
        };
        self.send(data)?;
        Ok(&self.state)
    }

    pub fn cancel(&mut self) {
        if self.pending.take().is_some() {
            debug!("upload cancelled");
        }
        self.state = UploadState::Idle;
    }

    pub fn dialog_message(&self, validation_errors: bool) -> String {
        let mut message = format!(
            "Are you sure you want to upload this dataset to {}? This cannot be undone!",
            self.scicat_url
        );
        if validation_errors {
            message.push_str(" There are validation errors. The upload may fail.");
        }
        message
    }

    /// Applies a response received since the last call and hands back the
    /// field errors it carried.
    pub fn take_field_errors(&mut self) -> Vec<FieldError> {
        let mut outcome = self.outcome.borrow_mut();
        if let Some(state) = outcome.state.take() {
            self.state = state;
        }
        std::mem::take(&mut outcome.field_errors)
    }

    pub fn dispose(&mut self) {
        self.pending = None;
        self.comm.off_res_upload_dataset(&self.key);
    }

    fn send(&mut self, data: JsonMap<String, Value>) -> Result<(), FormError> {
        info!(fields = data.len(), "uploading dataset");
        self.comm.send_req_upload_dataset(&self.key, &ReqUploadDataset(data))?;
        self.state = UploadState::Uploading;
        Ok(())
    }
}

fn record_response(outcome: &mut Outcome, response: ResUploadDataset) {
    if response.is_success() {
        info!(dataset = %response.dataset_name, pid = ?response.pid, "dataset uploaded");
        outcome.state = Some(UploadState::Succeeded {
            dataset_name: response.dataset_name,
            pid: response.pid,
            dataset_url: response.dataset_url,
        });
        return;
    }
    let errors = response.errors.unwrap_or_default();
    warn!(dataset = %response.dataset_name, errors = errors.len(), "upload rejected");
    outcome.field_errors.extend(errors.iter().cloned());
    outcome.state = Some(UploadState::Failed { errors });
}
