use cean_types::{MetadataEntry, WidgetKey};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};

use crate::FormError;
use crate::cell::{Field, ValueCell};
use crate::widget::{EventOutcome, FormContext, InputWidget, UiAction, decode};
use crate::widgets::list::{GrowableList, ListItem, RemovalPolicy};
use crate::widgets::text::{TextInput, TextOptions};

pub type ScientificMetadata = IndexMap<String, MetadataEntry>;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MetadataRow {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub value: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub unit: Option<String>,
}

pub struct MetadataItem {
    key: WidgetKey,
    name: TextInput,
    value: TextInput,
    unit: TextInput,
}

impl MetadataItem {
    pub fn new(ctx: &FormContext, key: WidgetKey) -> Self {
        Self {
            name: TextInput::new(ctx, key.child("name"), TextOptions::default()),
            value: TextInput::new(ctx, key.child("value"), TextOptions::default()),
            unit: TextInput::new(ctx, key.child("unit"), TextOptions::default()),
            key,
        }
    }

    fn parts(&self) -> [&TextInput; 3] {
        [&self.name, &self.value, &self.unit]
    }

    fn parts_mut(&mut self) -> [&mut TextInput; 3] {
        [&mut self.name, &mut self.value, &mut self.unit]
    }

    fn row(&self) -> MetadataRow {
        MetadataRow {
            name: self.name.text().trim().to_string(),
            value: self.value.text().trim().to_string(),
            unit: self
                .unit
                .value()
                .map(|unit| unit.trim().to_string())
                .filter(|unit| !unit.is_empty()),
        }
    }

    /// The row as a map entry, when both name and value are filled in.
    pub fn entry(&self) -> Option<(String, MetadataEntry)> {
        let row = self.row();
        if row.name.is_empty() || row.value.is_empty() {
            return None;
        }
        Some((
            row.name,
            MetadataEntry {
                value: row.value,
                unit: row.unit,
            },
        ))
    }
}

impl InputWidget for MetadataItem {
    fn key(&self) -> &WidgetKey {
        &self.key
    }

    fn value_json(&self) -> Value {
        if self.is_blank() {
            return Value::Null;
        }
        json!(self.row())
    }

    fn set_value_json(&mut self, value: Value) -> Result<(), FormError> {
        let row: Option<MetadataRow> = decode(&self.key, value)?;
        let row = row.unwrap_or_default();
        self.name.set_text(row.name);
        self.value.set_text(row.value);
        self.unit.set_text(row.unit.unwrap_or_default());
        Ok(())
    }

    fn validation_error(&self) -> Option<String> {
        self.parts().iter().find_map(|part| part.validation_error())
    }

    fn handle(&mut self, target: &WidgetKey, action: UiAction) -> EventOutcome {
        self.parts_mut()
            .into_iter()
            .map(|part| part.handle(target, action.clone()))
            .find(|outcome| !outcome.is_ignored())
            .unwrap_or(EventOutcome::Ignored)
    }

    fn apply_backend_error(&mut self, field: &WidgetKey, message: &str) -> bool {
        self.parts_mut()
            .into_iter()
            .any(|part| part.apply_backend_error(field, message))
    }

    fn dispose(&mut self) {
        for part in self.parts_mut() {
            part.dispose();
        }
    }

    fn snapshot(&self) -> Value {
        json!({
            "key": self.key,
            "name": self.name.snapshot(),
            "value": self.value.snapshot(),
            "unit": self.unit.snapshot(),
        })
    }
}

impl ListItem for MetadataItem {
    fn has_value(&self) -> bool {
        !self.is_blank()
    }

    fn is_blank(&self) -> bool {
        self.parts().iter().all(|part| part.is_blank())
    }
}

/// Free-form `name = value [unit]` rows.
pub struct ScientificMetadataInput {
    field: Field<ScientificMetadata>,
    list: GrowableList<MetadataItem>,
}

impl ScientificMetadataInput {
    pub fn new(ctx: &FormContext, key: WidgetKey) -> Self {
        let items = ctx.child_scope();
        let list = GrowableList::new(key.clone(), RemovalPolicy::Free, move |item_key| {
            MetadataItem::new(&items, item_key)
        });
        Self {
            field: Field::new(&ctx.bus, ctx.scope, ValueCell::new(key)),
            list,
        }
    }

    pub fn list(&self) -> &GrowableList<MetadataItem> {
        &self.list
    }

    fn collect(&self) {
        let metadata: ScientificMetadata = self.list.filled().filter_map(MetadataItem::entry).collect();
        let error = self.list.validation_error();
        self.field.with_mut(|cell| {
            cell.set_value((!metadata.is_empty()).then_some(metadata));
            cell.set_external_error(error);
        });
    }
}

impl InputWidget for ScientificMetadataInput {
    fn key(&self) -> &WidgetKey {
        self.field.key()
    }

    fn value_json(&self) -> Value {
        self.field.value_json()
    }

    fn set_value_json(&mut self, value: Value) -> Result<(), FormError> {
        let metadata: Option<ScientificMetadata> = decode(self.key(), value)?;
        let rows = metadata
            .unwrap_or_default()
            .into_iter()
            .map(|(name, entry)| {
                json!(MetadataRow {
                    name,
                    value: entry.value,
                    unit: entry.unit,
                })
            })
            .collect();
        self.list.set_values(rows)?;
        self.collect();
        Ok(())
    }

    fn validation_error(&self) -> Option<String> {
        self.list.validation_error().or_else(|| self.field.check())
    }

    fn handle(&mut self, target: &WidgetKey, action: UiAction) -> EventOutcome {
        if !target.is_within(self.key()) {
            return EventOutcome::Ignored;
        }
        let outcome = self.list.handle(target, action);
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
        self.list.apply_backend_error(field, message)
    }

    fn refresh(&mut self) {
        self.list.refresh();
        self.collect();
    }

    fn dispose(&mut self) {
        self.list.dispose();
        self.field.dispose();
    }

    fn snapshot(&self) -> Value {
        let items: Vec<Value> = self.list.items().iter().map(InputWidget::snapshot).collect();
        json!({
            "value": self.value_json(),
            "items": items,
            "error": self.validation_error(),
        })
    }
}
