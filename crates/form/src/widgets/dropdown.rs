use cean_types::WidgetKey;
use serde_json::{Value, json};
use tracing::{debug, warn};

use crate::FormError;
use crate::cell::{Field, ValueCell};
use crate::widget::{EventOutcome, FormContext, InputWidget, UiAction, decode};

/// A fixed list of options; the first one starts selected.
pub struct DropdownInput {
    field: Field<String>,
    options: Vec<String>,
    enabled: bool,
}

impl DropdownInput {
    pub fn new(ctx: &FormContext, key: WidgetKey, options: Vec<String>) -> Self {
        let field = Field::new(&ctx.bus, ctx.scope, ValueCell::new(key));
        field.set_value(options.first().cloned());
        Self {
            field,
            options,
            enabled: true,
        }
    }

    pub fn options(&self) -> &[String] {
        &self.options
    }

    /// Replaces the options. A selection that is no longer offered falls back
    /// to the first option.
    pub fn set_options(&mut self, options: Vec<String>) {
        let keep = self.field.value().filter(|current| options.contains(current));
        self.field.set_value(keep.or_else(|| options.first().cloned()));
        self.options = options;
    }

    pub fn selected(&self) -> Option<String> {
        self.field.value()
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    pub fn set_enabled(&mut self, enabled: bool) {
        self.enabled = enabled;
    }
}

impl InputWidget for DropdownInput {
    fn key(&self) -> &WidgetKey {
        self.field.key()
    }

    fn value_json(&self) -> Value {
        self.field.value_json()
    }

    fn set_value_json(&mut self, value: Value) -> Result<(), FormError> {
        let option: Option<String> = decode(self.key(), value)?;
        match option {
            Some(option) if self.options.contains(&option) => self.field.set_value(Some(option)),
            Some(option) => {
                debug!(key = %self.key(), option = %option, "unknown option, clearing selection");
                self.field.set_value(None);
            }
            None => self.field.set_value(None),
        }
        Ok(())
    }

    fn validation_error(&self) -> Option<String> {
        self.field.check()
    }

    fn handle(&mut self, target: &WidgetKey, action: UiAction) -> EventOutcome {
        if target != self.key() || !self.enabled {
            return EventOutcome::Ignored;
        }
        match action {
            UiAction::Select(option) if self.options.contains(&option) => {
                self.field.set_value(Some(option));
                self.field.confirm();
                EventOutcome::Committed
            }
            UiAction::Select(option) => {
                warn!(key = %self.key(), option = %option, "selection is not one of the options");
                EventOutcome::Ignored
            }
            _ => EventOutcome::Ignored,
        }
    }

    fn apply_backend_error(&mut self, field: &WidgetKey, message: &str) -> bool {
        if field != self.key() {
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
            "options": self.options,
            "enabled": self.enabled,
            "error": self.validation_error(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::context;

    fn dropdown() -> DropdownInput {
        let (ctx, _) = context();
        DropdownInput::new(&ctx, "type".into(), vec!["derived".into(), "raw".into()])
    }

    #[test]
    fn first_option_is_preselected_and_unknown_values_clear() {
        let mut dropdown = dropdown();
        assert_eq!(dropdown.value_json(), json!("derived"));
        dropdown.set_value_json(json!("raw")).unwrap();
        assert_eq!(dropdown.selected().as_deref(), Some("raw"));
        dropdown.set_value_json(json!("cooked")).unwrap();
        assert_eq!(dropdown.value_json(), Value::Null);
    }

    #[test]
    fn disabled_dropdown_ignores_selection() {
        let mut dropdown = dropdown();
        let key = dropdown.key().clone();
        dropdown.set_enabled(false);
        assert!(dropdown.handle(&key, UiAction::Select("raw".into())).is_ignored());
        dropdown.set_enabled(true);
        assert!(dropdown.handle(&key, UiAction::Select("raw".into())).is_committed());
    }

    #[test]
    fn replacing_options_keeps_a_still_offered_selection() {
        let mut dropdown = dropdown();
        dropdown.set_value_json(json!("raw")).unwrap();
        dropdown.set_options(vec!["raw".into(), "simulated".into()]);
        assert_eq!(dropdown.selected().as_deref(), Some("raw"));
        dropdown.set_options(vec!["simulated".into()]);
        assert_eq!(dropdown.selected().as_deref(), Some("simulated"));
    }
}
