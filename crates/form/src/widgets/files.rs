use cean_types::WidgetKey;
use cean_util::human_size;
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};

use crate::FormError;
use crate::cell::{Field, ValueCell};
use crate::widget::{EventOutcome, FormContext, InputWidget, UiAction, decode};
use crate::widgets::dropdown::DropdownInput;
use crate::widgets::file_input::{FileDetails, FileInput};
use crate::widgets::list::{GrowableList, ListItem, RemovalPolicy};
use crate::widgets::text::{TextInput, TextOptions};

impl ListItem for FileInput {
    fn has_value(&self) -> bool {
        self.value().is_some()
    }
}

/// Value published by [`FilesInput`].
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FilesValue {
    #[serde(default)]
    pub files: Vec<FileDetails>,
    #[serde(default)]
    pub source_folder: Option<String>,
    #[serde(default)]
    pub checksum_algorithm: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct FilesSummary {
    /// Files the backend has reported on.
    pub count: usize,
    pub total_size: u64,
    pub text: String,
}

/// Data files of the dataset, where they go, and how to checksum them.
///
/// Files are keyed `{key}.{n}`; the other parts are `{key}.source_folder` and
/// `{key}.checksum_algorithm`.
pub struct FilesInput {
    field: Field<FilesValue>,
    list: GrowableList<FileInput>,
    source_folder: TextInput,
    checksum_algorithm: DropdownInput,
}

impl FilesInput {
    pub fn new(ctx: &FormContext, key: WidgetKey) -> Self {
        let parts = ctx.child_scope();
        let items = parts.clone();
        let list = GrowableList::new(key.clone(), RemovalPolicy::KeepSole, move |item_key| {
            FileInput::new(&items, item_key, false)
        });
        let source_folder = TextInput::new(&parts, key.child("source_folder"), TextOptions::default());
        let checksum_algorithm = DropdownInput::new(
            &parts,
            key.child("checksum_algorithm"),
            ctx.config.checksum_algorithms.clone(),
        );
        let field = Field::new(&ctx.bus, ctx.scope, ValueCell::new(key));
        let files = Self {
            field,
            list,
            source_folder,
            checksum_algorithm,
        };
        files.collect();
        files
    }

    pub fn list(&self) -> &GrowableList<FileInput> {
        &self.list
    }

    pub fn summary(&self) -> FilesSummary {
        let sizes: Vec<u64> = self
            .list
            .filled()
            .filter(|file| file.is_inspected())
            .filter_map(FileInput::size)
            .collect();
        let total_size = sizes.iter().sum();
        let count = sizes.len();
        let noun = if count == 1 { "file" } else { "files" };
        FilesSummary {
            count,
            total_size,
            text: format!("{count} {noun}, {}", human_size(total_size)),
        }
    }

    fn collect(&self) {
        let value = FilesValue {
            files: self.list.filled().filter_map(FileInput::details).collect(),
            source_folder: self.source_folder.value(),
            checksum_algorithm: self.checksum_algorithm.selected(),
        };
        let error = self.part_error();
        self.field.with_mut(|cell| {
            cell.set_value(Some(value));
            cell.set_external_error(error);
        });
    }

    fn part_error(&self) -> Option<String> {
        self.list
            .validation_error()
            .or_else(|| self.source_folder.validation_error())
            .or_else(|| self.checksum_algorithm.validation_error())
    }
}

impl InputWidget for FilesInput {
    fn key(&self) -> &WidgetKey {
        self.field.key()
    }

    fn value_json(&self) -> Value {
        self.field.value_json()
    }

    fn set_value_json(&mut self, value: Value) -> Result<(), FormError> {
        let value: Option<FilesValue> = decode(self.key(), value)?;
        let value = value.unwrap_or_default();
        let paths = value.files.into_iter().map(|file| Value::String(file.local_path)).collect();
        self.list.set_values(paths)?;
        self.source_folder
            .set_value_json(value.source_folder.map_or(Value::Null, Value::String))?;
        if let Some(algorithm) = value.checksum_algorithm {
            self.checksum_algorithm.set_value_json(Value::String(algorithm))?;
        }
        self.collect();
        Ok(())
    }

    fn validation_error(&self) -> Option<String> {
        self.part_error().or_else(|| self.field.check())
    }

    fn handle(&mut self, target: &WidgetKey, action: UiAction) -> EventOutcome {
        if !target.is_within(self.key()) {
            return EventOutcome::Ignored;
        }
        let outcome = match self.source_folder.handle(target, action.clone()) {
            EventOutcome::Ignored => match self.checksum_algorithm.handle(target, action.clone()) {
                EventOutcome::Ignored => self.list.handle(target, action),
                outcome => outcome,
            },
            outcome => outcome,
        };
        if !outcome.is_ignored() {
            self.collect();
        }
        if outcome.is_committed() {
            self.field.confirm();
        }
        outcome
    }

    fn apply_backend_error(&mut self, field: &WidgetKey, message: &str) -> bool {
        if field == self.key() {
            self.field.report_error(Some(message.to_string()));
            return true;
        }
        self.source_folder.apply_backend_error(field, message)
            || self.checksum_algorithm.apply_backend_error(field, message)
            || self.list.apply_backend_error(field, message)
    }

    fn refresh(&mut self) {
        self.list.refresh();
        self.collect();
    }

    fn dispose(&mut self) {
        self.list.dispose();
        self.source_folder.dispose();
        self.checksum_algorithm.dispose();
        self.field.dispose();
    }

    fn snapshot(&self) -> Value {
        let items: Vec<Value> = self
            .list
            .items()
            .iter()
            .enumerate()
            .map(|(index, file)| {
                let mut snapshot = file.snapshot();
                snapshot["key"] = json!(file.key());
                snapshot["removable"] = json!(self.list.can_remove(index));
                snapshot
            })
            .collect();
        json!({
            "value": self.value_json(),
            "items": items,
            "sourceFolder": self.source_folder.snapshot(),
            "checksumAlgorithm": self.checksum_algorithm.snapshot(),
            "summary": self.summary(),
            "error": self.validation_error(),
        })
    }
}
