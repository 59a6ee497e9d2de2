use cean_types::WidgetKey;
use serde_json::{Value, json};

use crate::cell::{Field, ValueCell};
use crate::validation::Validator;
use crate::widget::{EventOutcome, FormContext, InputWidget, UiAction, decode};
use crate::{FormError, TextBuffer};

#[derive(Clone, Default)]
pub struct TextOptions {
    pub required: bool,
    /// Enter inserts a newline instead of confirming.
    pub multiline: bool,
    pub validator: Option<Validator<String>>,
}

impl TextOptions {
    pub fn required(mut self) -> Self {
        self.required = true;
        self
    }

    pub fn multiline(mut self) -> Self {
        self.multiline = true;
        self
    }

    pub fn validator(mut self, validator: impl Fn(&String) -> Result<(), String> + 'static) -> Self {
        self.validator = Some(std::rc::Rc::new(validator));
        self
    }
}

/// Free text. Empty text is no value.
pub struct TextInput {
    field: Field<String>,
    buffer: TextBuffer,
    multiline: bool,
}

impl TextInput {
    pub fn new(ctx: &FormContext, key: WidgetKey, options: TextOptions) -> Self {
        let cell = ValueCell::new(key)
            .required(options.required)
            .with_validator(options.validator);
        Self {
            field: Field::new(&ctx.bus, ctx.scope, cell),
            buffer: TextBuffer::new(),
            multiline: options.multiline,
        }
    }

    pub fn field(&self) -> &Field<String> {
        &self.field
    }

    pub fn value(&self) -> Option<String> {
        self.field.value()
    }

    /// Displayed text. The cell wins when something assigned it from outside.
    pub fn text(&self) -> String {
        self.field.value().unwrap_or_default()
    }

    pub fn is_blank(&self) -> bool {
        self.field.value().is_none_or(|text| text.trim().is_empty())
    }

    pub fn set_text(&mut self, text: impl Into<String>) {
        self.buffer.set_text(text);
        self.field.set_value(self.buffer.value());
    }

    pub fn confirm(&self) -> Option<String> {
        self.field.confirm()
    }

    fn reconcile(&mut self) {
        let value = self.field.value();
        if self.buffer.value() != value {
            self.buffer.set_text(value.unwrap_or_default());
        }
    }

    fn edit(&mut self, action: UiAction) {
        match action {
            UiAction::Input(text) => self.buffer.set_text(text),
            UiAction::Char(c) => self.buffer.insert_char(c),
            UiAction::Backspace => self.buffer.backspace(),
            UiAction::Left => self.buffer.move_left(),
            UiAction::Right => self.buffer.move_right(),
            _ => return,
        }
        let value = self.buffer.value();
        self.field.with_mut(|cell| {
            cell.set_value(value);
            cell.set_external_error(None);
        });
    }
}

impl InputWidget for TextInput {
    fn key(&self) -> &WidgetKey {
        self.field.key()
    }

    fn value_json(&self) -> Value {
        self.field.value_json()
    }

    fn set_value_json(&mut self, value: Value) -> Result<(), FormError> {
        let text: Option<String> = decode(self.key(), value)?;
        self.buffer.set_text(text.clone().unwrap_or_default());
        self.field.set_value(text.filter(|t| !t.is_empty()));
        Ok(())
    }

    fn validation_error(&self) -> Option<String> {
        self.field.check()
    }

    fn handle(&mut self, target: &WidgetKey, action: UiAction) -> EventOutcome {
        if target != self.key() {
            return EventOutcome::Ignored;
        }
        self.reconcile();
        match action {
            action if action.is_text_edit() => {
                self.edit(action);
                EventOutcome::Handled
            }
            UiAction::Enter if self.multiline => {
                self.edit(UiAction::Char('\n'));
                EventOutcome::Handled
            }
            UiAction::Enter | UiAction::Blur => {
                self.confirm();
                EventOutcome::Committed
            }
            UiAction::Focus | UiAction::Click => EventOutcome::Handled,
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
        let cell = self.field.borrow();
        json!({
            "text": self.text(),
            "value": cell.value_json(),
            "status": cell.status(),
        })
    }
}
