use cean_types::WidgetKey;
use serde_json::Value;

use crate::FormError;
use crate::cell::{Field, ValueCell};
use crate::widget::{EventOutcome, FormContext, InputWidget, UiAction, decode};

/// A boolean that reads `false` until set.
pub struct CheckboxInput {
    field: Field<bool>,
}

impl CheckboxInput {
    pub fn new(ctx: &FormContext, key: WidgetKey) -> Self {
        let field = Field::new(&ctx.bus, ctx.scope, ValueCell::new(key));
        field.set_value(Some(false));
        Self { field }
    }

    pub fn checked(&self) -> bool {
        self.field.value().unwrap_or(false)
    }

    fn commit(&self, checked: bool) -> EventOutcome {
        self.field.set_value(Some(checked));
        self.field.confirm();
        EventOutcome::Committed
    }
}

impl InputWidget for CheckboxInput {
    fn key(&self) -> &WidgetKey {
        self.field.key()
    }

    fn value_json(&self) -> Value {
        Value::Bool(self.checked())
    }

    fn set_value_json(&mut self, value: Value) -> Result<(), FormError> {
        let checked: Option<bool> = decode(self.key(), value)?;
        self.field.set_value(Some(checked.unwrap_or(false)));
        Ok(())
    }

    fn validation_error(&self) -> Option<String> {
        self.field.check()
    }

    fn handle(&mut self, target: &WidgetKey, action: UiAction) -> EventOutcome {
        if target != self.key() {
            return EventOutcome::Ignored;
        }
        match action {
            UiAction::Toggle(checked) => self.commit(checked),
            UiAction::Click => self.commit(!self.checked()),
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
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::context;

    #[test]
    fn unset_reads_false_and_click_toggles() {
        let (ctx, _) = context();
        let mut checkbox = CheckboxInput::new(&ctx, "is_published".into());
        let key = checkbox.key().clone();
        assert_eq!(checkbox.value_json(), Value::Bool(false));

        checkbox.handle(&key, UiAction::Click);
        assert!(checkbox.checked());
        checkbox.set_value_json(Value::Null).unwrap();
        assert!(!checkbox.checked());
    }
}
