//! The dataset form: every widget of a session, in display order.

use cean_types::{Choice, TechniqueCatalog, WidgetKey};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_json::{Map as JsonMap, Value, json};
use tracing::{debug, warn};

use crate::FormError;
use crate::bus::ScopeId;
use crate::upload::{GatherResult, UploadController, UploadState};
use crate::widget::{EventOutcome, FormContext, InputWidget, UiAction};
use crate::widgets::{
    AttachmentsInput, CheckboxInput, ComboboxInput, ComboboxOptions, DatetimeInput, DropdownInput, FileInput,
    FilesInput, OwnersInput, PersonInput, RelationshipsInput, ScientificMetadataInput, StringListInput,
    TechniquesInput, TextInput, TextOptions,
};

/// A user interaction as delivered by the host.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UiEvent {
    pub target: WidgetKey,
    pub action: UiAction,
}

/// Which widget to build for a key.
#[derive(Clone)]
pub enum FieldKind {
    Text(TextOptions),
    Checkbox,
    Dropdown(Vec<String>),
    Datetime { required: bool },
    Combobox(ComboboxOptions),
    File { required: bool },
    Person { required: bool },
    Owners { required: bool },
    Files,
    Attachments,
    Relationships,
    ScientificMetadata,
    StringList,
    Techniques(TechniqueCatalog),
}

impl FieldKind {
    pub fn build(self, ctx: &FormContext, key: WidgetKey) -> Box<dyn InputWidget> {
        match self {
            FieldKind::Text(options) => Box::new(TextInput::new(ctx, key, options)),
            FieldKind::Checkbox => Box::new(CheckboxInput::new(ctx, key)),
            FieldKind::Dropdown(options) => Box::new(DropdownInput::new(ctx, key, options)),
            FieldKind::Datetime { required } => Box::new(DatetimeInput::new(ctx, key, required)),
            FieldKind::Combobox(options) => Box::new(ComboboxInput::new(ctx, key, options)),
            FieldKind::File { required } => Box::new(FileInput::new(ctx, key, required)),
            FieldKind::Person { required } => Box::new(PersonInput::new(ctx, key, required)),
            FieldKind::Owners { required } => Box::new(OwnersInput::new(ctx, key, required)),
            FieldKind::Files => Box::new(FilesInput::new(ctx, key)),
            FieldKind::Attachments => Box::new(AttachmentsInput::new(ctx, key)),
            FieldKind::Relationships => Box::new(RelationshipsInput::new(ctx, key)),
            FieldKind::ScientificMetadata => Box::new(ScientificMetadataInput::new(ctx, key)),
            FieldKind::StringList => Box::new(StringListInput::new(ctx, key)),
            FieldKind::Techniques(catalog) => Box::new(TechniquesInput::new(ctx, key, catalog)),
        }
    }
}

/// Catalogues offered by the standard layout, plus initial values.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct FormSetup {
    pub proposals: Vec<Choice>,
    pub instruments: Vec<Choice>,
    pub access_groups: Vec<String>,
    pub techniques: TechniqueCatalog,
    pub initial: JsonMap<String, Value>,
}

pub const DATASET_TYPES: [&str; 2] = ["derived", "raw"];

pub struct DatasetForm {
    ctx: FormContext,
    widgets: IndexMap<WidgetKey, Box<dyn InputWidget>>,
    upload: UploadController,
}

impl DatasetForm {
    pub fn new(ctx: FormContext) -> Self {
        let upload = UploadController::new(&ctx);
        Self {
            ctx,
            widgets: IndexMap::new(),
            upload,
        }
    }

    /// The full dataset layout.
    pub fn standard(ctx: FormContext, setup: FormSetup) -> Result<Self, FormError> {
        let mut form = Self::new(ctx);
        form.add("name", FieldKind::Text(TextOptions::default().required()))?;
        form.add("description", FieldKind::Text(TextOptions::default().multiline()))?;
        form.add(
            "proposal_id",
            FieldKind::Combobox(ComboboxOptions::new(setup.proposals).allow_arbitrary()),
        )?;
        form.add("instrument_id", FieldKind::Combobox(ComboboxOptions::new(setup.instruments)))?;

        let location = TextInput::new(&form.ctx, "creation_location".into(), TextOptions::default().required());
        location
            .field()
            .derive_from(&"instrument_id".into(), ScopeId::ROOT, |instrument| {
                instrument.as_str().map(|id| format!("ESS:{id}"))
            });
        form.insert(Box::new(location))?;

        form.add("run_number", FieldKind::Text(TextOptions::default()))?;
        form.add("start_time", FieldKind::Datetime { required: false })?;
        form.add("end_time", FieldKind::Datetime { required: false })?;
        form.add("owners", FieldKind::Owners { required: true })?;
        form.add("principal_investigator", FieldKind::Person { required: false })?;
        form.add("owner_group", FieldKind::Dropdown(setup.access_groups.clone()))?;
        form.add("access_groups", FieldKind::StringList)?;
        form.add("license", FieldKind::Text(TextOptions::default()))?;
        form.add("is_published", FieldKind::Checkbox)?;
        form.add("techniques", FieldKind::Techniques(setup.techniques))?;
        form.add("used_software", FieldKind::StringList)?;
        form.add("sample_id", FieldKind::Text(TextOptions::default()))?;
        form.add("keywords", FieldKind::StringList)?;
        form.add(
            "type",
            FieldKind::Dropdown(DATASET_TYPES.iter().map(|kind| kind.to_string()).collect()),
        )?;
        form.add("relationships", FieldKind::Relationships)?;
        form.add("scientific_metadata", FieldKind::ScientificMetadata)?;
        form.add("files", FieldKind::Files)?;
        form.add("attachments", FieldKind::Attachments)?;

        form.set_values(setup.initial)?;
        Ok(form)
    }

    pub fn context(&self) -> &FormContext {
        &self.ctx
    }

    pub fn add(&mut self, key: impl Into<WidgetKey>, kind: FieldKind) -> Result<(), FormError> {
        let key = key.into();
        if self.widgets.contains_key(&key) {
            return Err(FormError::duplicate_key(&key));
        }
        let widget = kind.build(&self.ctx, key);
        self.insert(widget)
    }

    pub fn insert(&mut self, mut widget: Box<dyn InputWidget>) -> Result<(), FormError> {
        let key = widget.key().clone();
        if self.widgets.contains_key(&key) {
            widget.dispose();
            return Err(FormError::duplicate_key(&key));
        }
        self.widgets.insert(key, widget);
        Ok(())
    }

    pub fn keys(&self) -> impl Iterator<Item = &WidgetKey> {
        self.widgets.keys()
    }

    pub fn widget(&self, key: &WidgetKey) -> Option<&dyn InputWidget> {
        self.widgets.get(key).map(|widget| widget.as_ref())
    }

    pub fn upload_state(&self) -> &UploadState {
        self.upload.state()
    }

    /// Routes a user interaction to the widget owning its target.
    pub fn handle_event(&mut self, event: UiEvent) -> Result<EventOutcome, FormError> {
        let UiEvent { target, action } = event;
        if target.is_within(self.upload.key()) {
            return self.handle_upload(action);
        }
        let widget = self
            .widgets
            .values_mut()
            .find(|widget| target.is_within(widget.key()))
            .ok_or_else(|| FormError::unknown_widget(&target))?;
        let outcome = widget.handle(&target, action);
        debug!(target = %target, outcome = ?outcome, "handled event");
        Ok(outcome)
    }

    fn handle_upload(&mut self, action: UiAction) -> Result<EventOutcome, FormError> {
        match action {
            UiAction::Click => {
                let gathered = self.gather();
                self.upload.request_upload(gathered)?;
            }
            UiAction::Enter => {
                self.upload.confirm()?;
            }
            UiAction::Escape => self.upload.cancel(),
            _ => return Ok(EventOutcome::Ignored),
        }
        Ok(EventOutcome::Handled)
    }

    /// Non-empty values keyed by widget, plus whether any widget is invalid.
    pub fn gather(&self) -> GatherResult {
        let mut data = JsonMap::new();
        let mut validation_errors = false;
        for (key, widget) in &self.widgets {
            if !widget.is_valid() {
                debug!(key = %key, error = ?widget.validation_error(), "invalid field");
                validation_errors = true;
            }
            let value = widget.value_json();
            if !value.is_null() {
                data.insert(key.to_string(), value);
            }
        }
        GatherResult { data, validation_errors }
    }

    pub fn set_value(&mut self, key: &WidgetKey, value: Value) -> Result<(), FormError> {
        self.widgets
            .get_mut(key)
            .ok_or_else(|| FormError::unknown_widget(key))?
            .set_value_json(value)
    }

    /// Assigns several values at once. Unknown keys are skipped.
    pub fn set_values(&mut self, values: JsonMap<String, Value>) -> Result<(), FormError> {
        for (key, value) in values {
            let key = WidgetKey::from(key);
            if !self.widgets.contains_key(&key) {
                warn!(key = %key, "initial value for unknown widget, skipping");
                continue;
            }
            self.set_value(&key, value)?;
        }
        Ok(())
    }

    /// Catches up with backend responses and timers: re-normalizes composite
    /// widgets and routes upload errors to their fields.
    pub fn refresh(&mut self) {
        for widget in self.widgets.values_mut() {
            widget.refresh();
        }
        for error in self.upload.take_field_errors() {
            let field = WidgetKey::from(error.field.as_str());
            let routed = self
                .widgets
                .values_mut()
                .any(|widget| widget.apply_backend_error(&field, &error.error));
            if !routed {
                warn!(field = %field, error = %error.error, "upload error for unknown field");
            }
        }
    }

    pub fn snapshot(&self) -> Value {
        let widgets: JsonMap<String, Value> = self
            .widgets
            .iter()
            .map(|(key, widget)| (key.to_string(), widget.snapshot()))
            .collect();
        json!({
            "widgets": widgets,
            "upload": self.upload.state(),
            "valid": !self.gather().validation_errors,
        })
    }

    pub fn dispose(&mut self) {
        for (_, mut widget) in self.widgets.drain(..) {
            widget.dispose();
        }
        self.upload.dispose();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::context;
    use cean_types::Envelope;

    fn event(target: &str, action: UiAction) -> UiEvent {
        UiEvent {
            target: target.into(),
            action,
        }
    }

    fn standard() -> (DatasetForm, cean_comm::MemoryTransport) {
        let (ctx, transport) = context();
        let setup = FormSetup {
            instruments: vec![Choice::new("dream", "DREAM"), Choice::new("loki", "LoKI")],
            access_groups: vec!["ess".into(), "dmsc".into()],
            ..FormSetup::default()
        };
        (DatasetForm::standard(ctx, setup).unwrap(), transport)
    }

    #[test]
    fn duplicate_keys_are_rejected() {
        let (ctx, _) = context();
        let mut form = DatasetForm::new(ctx);
        form.add("name", FieldKind::Checkbox).unwrap();
        let error = form.add("name", FieldKind::StringList).unwrap_err();
        assert!(matches!(error, FormError::DuplicateKey { .. }));
    }

    #[test]
    fn events_route_to_nested_parts_and_unknown_targets_fail() {
        let (mut form, _) = standard();
        let outcome = form
            .handle_event(event("owners.0.name", UiAction::Input("Ada".into())))
            .unwrap();
        assert_eq!(outcome, EventOutcome::Handled);
        assert!(form.handle_event(event("nonexistent", UiAction::Click)).is_err());
    }

    #[test]
    fn creation_location_follows_instrument_until_edited() {
        let (mut form, _) = standard();
        form.handle_event(event("instrument_id", UiAction::Select("dream".into())))
            .unwrap();
        let location = WidgetKey::from("creation_location");
        assert_eq!(form.widget(&location).unwrap().value_json(), json!("ESS:dream"));

        form.handle_event(event("creation_location", UiAction::Input("lab 3".into())))
            .unwrap();
        form.handle_event(event("creation_location", UiAction::Blur)).unwrap();
        form.handle_event(event("instrument_id", UiAction::Select("loki".into())))
            .unwrap();
        assert_eq!(form.widget(&location).unwrap().value_json(), json!("lab 3"));
    }

    #[test]
    fn gather_reports_required_fields() {
        let (mut form, _) = standard();
        let gathered = form.gather();
        assert!(gathered.validation_errors);
        assert_eq!(gathered.data["type"], "derived");
        assert_eq!(gathered.data["is_published"], false);
        assert!(!gathered.data.contains_key("name"));

        form.set_value(&"name".into(), json!("run 42")).unwrap();
        form.set_value(&"creation_location".into(), json!("ESS:dream")).unwrap();
        form.set_value(&"owners".into(), json!([{"name": "Ada", "email": "ada@ess.eu"}]))
            .unwrap();
        let gathered = form.gather();
        assert!(!gathered.validation_errors, "{:?}", gathered);
        assert_eq!(gathered.data["owners"][0]["name"], "Ada");
    }

    #[test]
    fn upload_errors_are_routed_to_fields() {
        let (mut form, transport) = standard();
        form.handle_event(event("upload", UiAction::Click)).unwrap();
        assert!(matches!(form.upload_state(), UploadState::Confirming { .. }));
        form.handle_event(event("upload", UiAction::Enter)).unwrap();
        assert_eq!(transport.take_sent()[0].kind, "req:upload-dataset");

        form.context().comm.dispatch(Envelope::new(
            "res:upload-dataset",
            "upload".into(),
            json!({"datasetName": "", "errors": [
                {"field": "license", "error": "unknown license"},
                {"field": "bogus", "error": "ignored"}
            ]}),
        ));
        form.refresh();
        let license = form.widget(&"license".into()).unwrap();
        assert_eq!(license.validation_error().as_deref(), Some("unknown license"));
        assert!(matches!(form.upload_state(), UploadState::Failed { errors } if errors.len() == 2));
    }

    #[test]
    fn initial_values_are_applied() {
        let (ctx, _) = context();
        let mut initial = JsonMap::new();
        initial.insert("name".into(), json!("preset"));
        initial.insert("unknown".into(), json!(1));
        let form = DatasetForm::standard(
            ctx,
            FormSetup {
                initial,
                ..FormSetup::default()
            },
        )
        .unwrap();
        assert_eq!(form.widget(&"name".into()).unwrap().value_json(), json!("preset"));
    }
}
