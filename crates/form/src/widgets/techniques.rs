use cean_types::{TechniqueCatalog, WidgetKey};
use serde_json::{Value, json};
use tracing::debug;

use crate::FormError;
use crate::cell::{Field, ValueCell};
use crate::widget::{EventOutcome, FormContext, InputWidget, UiAction, decode};
use crate::widgets::combobox::{ComboboxInput, ComboboxOptions};

/// Techniques picked from a catalogue.
///
/// Selecting in the combobox (`{key}.selection`) appends the technique and
/// clears the combobox. Values are reported as `{prefix}/{id}`.
pub struct TechniquesInput {
    field: Field<Vec<String>>,
    catalog: TechniqueCatalog,
    selection: ComboboxInput,
    ids: Vec<String>,
}

impl TechniquesInput {
    pub fn new(ctx: &FormContext, key: WidgetKey, catalog: TechniqueCatalog) -> Self {
        let selection = ComboboxInput::new(
            &ctx.child_scope(),
            key.child("selection"),
            ComboboxOptions::new(catalog.choices()),
        );
        Self {
            field: Field::new(&ctx.bus, ctx.scope, ValueCell::new(key)),
            catalog,
            selection,
            ids: Vec::new(),
        }
    }

    /// Selected ids, without the catalogue prefix.
    pub fn ids(&self) -> &[String] {
        &self.ids
    }

    fn sync(&self) {
        let qualified: Vec<String> = self.ids.iter().map(|id| self.catalog.qualified_id(id)).collect();
        self.field.set_value((!qualified.is_empty()).then_some(qualified));
    }

    fn add_selected(&mut self) -> EventOutcome {
        let Some(id) = self.selection.value() else {
            return EventOutcome::Handled;
        };
        self.selection.clear();
        if self.ids.contains(&id) {
            debug!(key = %self.key(), id = %id, "technique already selected");
            return EventOutcome::Handled;
        }
        self.ids.push(id);
        self.sync();
        self.field.confirm();
        EventOutcome::Committed
    }

    fn remove(&mut self, index: usize) -> EventOutcome {
        if index >= self.ids.len() {
            return EventOutcome::Ignored;
        }
        self.ids.remove(index);
        self.sync();
        self.field.confirm();
        EventOutcome::Committed
    }

    fn strip_prefix<'a>(&self, value: &'a str) -> &'a str {
        value
            .strip_prefix(self.catalog.prefix.as_str())
            .and_then(|rest| rest.strip_prefix('/'))
            .unwrap_or(value)
    }
}

impl InputWidget for TechniquesInput {
    fn key(&self) -> &WidgetKey {
        self.field.key()
    }

    fn value_json(&self) -> Value {
        self.field.value_json()
    }

    fn set_value_json(&mut self, value: Value) -> Result<(), FormError> {
        let values: Option<Vec<String>> = decode(self.key(), value)?;
        let mut ids: Vec<String> = Vec::new();
        for value in values.unwrap_or_default() {
            let id = self.strip_prefix(&value).to_string();
            if !ids.contains(&id) {
                ids.push(id);
            }
        }
        self.ids = ids;
        self.sync();
        Ok(())
    }

    fn validation_error(&self) -> Option<String> {
        self.field.check()
    }

    fn handle(&mut self, target: &WidgetKey, action: UiAction) -> EventOutcome {
        if !target.is_within(self.key()) {
            return EventOutcome::Ignored;
        }
        if target == self.selection.key() {
            return match self.selection.handle(target, action) {
                EventOutcome::Committed => self.add_selected(),
                outcome => outcome,
            };
        }
        let index = target
            .as_str()
            .strip_prefix(self.key().as_str())
            .and_then(|rest| rest.strip_prefix('.'))
            .and_then(|rest| rest.parse::<usize>().ok());
        match (index, action) {
            (Some(index), UiAction::Remove) => self.remove(index),
            _ => EventOutcome::Ignored,
        }
    }

    fn apply_backend_error(&mut self, field: &WidgetKey, message: &str) -> bool {
        if !field.is_within(self.key()) {
            return false;
        }
        self.field.report_error(Some(message.to_string()));
        true
    }

    fn dispose(&mut self) {
        self.selection.dispose();
        self.field.dispose();
    }

    fn snapshot(&self) -> Value {
        let items: Vec<Value> = self
            .ids
            .iter()
            .map(|id| {
                let name = self
                    .catalog
                    .techniques
                    .iter()
                    .find(|technique| &technique.id == id)
                    .map_or(id.as_str(), |technique| technique.name.as_str());
                json!({"id": id, "name": name, "url": self.catalog.qualified_id(id)})
            })
            .collect();
        json!({
            "value": self.value_json(),
            "items": items,
            "selection": self.selection.snapshot(),
            "error": self.validation_error(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::context;
    use cean_types::Technique;

    fn catalog() -> TechniqueCatalog {
        TechniqueCatalog {
            prefix: "http://purl.org/pan-science/PaNET".into(),
            techniques: vec![
                Technique {
                    id: "PaNET01188".into(),
                    name: "small angle neutron scattering".into(),
                },
                Technique {
                    id: "PaNET01102".into(),
                    name: "neutron diffraction".into(),
                },
            ],
        }
    }

    #[test]
    fn selecting_appends_once_and_clears_the_combobox() {
        let (ctx, _) = context();
        let mut techniques = TechniquesInput::new(&ctx, "techniques".into(), catalog());
        let selection = WidgetKey::from("techniques.selection");

        techniques.handle(&selection, UiAction::Input("neutron diffraction".into()));
        assert!(techniques.handle(&selection, UiAction::Enter).is_committed());
        assert_eq!(
            techniques.value_json(),
            json!(["http://purl.org/pan-science/PaNET/PaNET01102"])
        );
        assert_eq!(techniques.selection.value(), None);

        techniques.handle(&selection, UiAction::Select("PaNET01102".into()));
        assert_eq!(techniques.ids().len(), 1);

        assert!(techniques.handle(&"techniques.0".into(), UiAction::Remove).is_committed());
        assert_eq!(techniques.value_json(), Value::Null);
    }

    #[test]
    fn assigned_values_lose_their_prefix() {
        let (ctx, _) = context();
        let mut techniques = TechniquesInput::new(&ctx, "techniques".into(), catalog());
        techniques
            .set_value_json(json!(["http://purl.org/pan-science/PaNET/PaNET01188", "PaNET01102"]))
            .unwrap();
        assert_eq!(techniques.ids(), ["PaNET01188", "PaNET01102"]);
    }
}
