use cean_types::WidgetKey;
use serde_json::{Value, json};
use tracing::debug;

use crate::cell::{Field, ValueCell};
use crate::widget::{EventOutcome, FormContext, InputWidget, UiAction, decode};
use crate::{FormError, TextBuffer};

pub const ADD_PLACEHOLDER: &str = "Add new item...";

/// Free-text chips. Text typed into `{key}.input` is added on Enter or `Add`;
/// `Remove` on `{key}.{n}` drops the n-th chip. Duplicates are allowed.
pub struct StringListInput {
    field: Field<Vec<String>>,
    input_key: WidgetKey,
    input: TextBuffer,
}

impl StringListInput {
    pub fn new(ctx: &FormContext, key: WidgetKey) -> Self {
        Self {
            input_key: key.child("input"),
            field: Field::new(&ctx.bus, ctx.scope, ValueCell::new(key)),
            input: TextBuffer::new(),
        }
    }

    pub fn items(&self) -> Vec<String> {
        self.field.value().unwrap_or_default()
    }

    fn store(&self, items: Vec<String>) {
        self.field.set_value((!items.is_empty()).then_some(items));
    }

    fn add(&mut self) -> EventOutcome {
        let text = self.input.text().trim().to_string();
        if text.is_empty() {
            return EventOutcome::Handled;
        }
        let mut items = self.items();
        items.push(text);
        self.store(items);
        self.input.clear();
        self.field.confirm();
        EventOutcome::Committed
    }

    fn remove(&mut self, index: usize) -> EventOutcome {
        let mut items = self.items();
        if index >= items.len() {
            debug!(key = %self.key(), index, "no item to remove");
            return EventOutcome::Ignored;
        }
        items.remove(index);
        self.store(items);
        self.field.confirm();
        EventOutcome::Committed
    }

    /// Index of the chip a key addresses, e.g. `keywords.2` -> 2.
    fn chip_index(&self, target: &WidgetKey) -> Option<usize> {
        let prefix = format!("{}.", self.key());
        target.as_str().strip_prefix(prefix.as_str())?.parse().ok()
    }
}

impl InputWidget for StringListInput {
    fn key(&self) -> &WidgetKey {
        self.field.key()
    }

    fn value_json(&self) -> Value {
        self.field.value_json()
    }

    fn set_value_json(&mut self, value: Value) -> Result<(), FormError> {
        let items: Option<Vec<String>> = decode(self.key(), value)?;
        self.store(items.unwrap_or_default());
        Ok(())
    }

    fn validation_error(&self) -> Option<String> {
        self.field.check()
    }

    fn handle(&mut self, target: &WidgetKey, action: UiAction) -> EventOutcome {
        if let Some(index) = self.chip_index(target) {
            return match action {
                UiAction::Remove => self.remove(index),
                _ => EventOutcome::Ignored,
            };
        }
        if target != self.key() && target != &self.input_key {
            return EventOutcome::Ignored;
        }
        match action {
            UiAction::Input(text) => self.input.set_text(text),
            UiAction::Char(c) => self.input.insert_char(c),
            UiAction::Backspace => self.input.backspace(),
            UiAction::Left => self.input.move_left(),
            UiAction::Right => self.input.move_right(),
            UiAction::Enter | UiAction::Add => return self.add(),
            UiAction::Focus | UiAction::Blur | UiAction::Click => {}
            _ => return EventOutcome::Ignored,
        }
        EventOutcome::Handled
    }

    fn apply_backend_error(&mut self, field: &WidgetKey, message: &str) -> bool {
        if !field.is_within(self.key()) {
            return false;
        }
        self.field.report_error(Some(message.to_string()));
        true
    }

    fn dispose(&mut self) {
        self.field.dispose();
    }

    fn snapshot(&self) -> Value {
        json!({
            "value": self.value_json(),
            "input": self.input.text(),
            "placeholder": ADD_PLACEHOLDER,
            "error": self.validation_error(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::context;

    #[test]
    fn enter_adds_trimmed_text_and_remove_drops_by_index() {
        let (ctx, _) = context();
        let mut keywords = StringListInput::new(&ctx, "keywords".into());
        let input = WidgetKey::from("keywords.input");

        keywords.handle(&input, UiAction::Input("  neutron ".into()));
        assert!(keywords.handle(&input, UiAction::Enter).is_committed());
        keywords.handle(&input, UiAction::Input("neutron".into()));
        keywords.handle(&input, UiAction::Add);
        assert_eq!(keywords.value_json(), json!(["neutron", "neutron"]));

        keywords.handle(&input, UiAction::Input("   ".into()));
        assert_eq!(keywords.handle(&input, UiAction::Enter), EventOutcome::Handled);
        assert_eq!(keywords.items().len(), 2);

        assert!(keywords.handle(&"keywords.0".into(), UiAction::Remove).is_committed());
        assert!(keywords.handle(&"keywords.5".into(), UiAction::Remove).is_ignored());
        keywords.handle(&"keywords.0".into(), UiAction::Remove);
        assert_eq!(keywords.value_json(), Value::Null);
    }
}
