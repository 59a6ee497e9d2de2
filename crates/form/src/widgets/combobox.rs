//! Searchable choice selector.
//!
//! The widget is either showing its current choice (`Display`) or an editable
//! search field with a dropdown (`Edit`). Items are picked on mouse-down so the
//! pick lands before the blur that follows it. A blur while the mouse is held
//! inside the widget (a scrollbar drag, say) keeps the dropdown open.

use cean_types::{Choice, WidgetKey};
use serde::Serialize;
use serde_json::{Value, json};
use tracing::debug;

use crate::cell::{Field, ValueCell};
use crate::widget::{EventOutcome, FormContext, InputWidget, UiAction, decode};
use crate::{FormError, TextBuffer};

pub const ARBITRARY_PLACEHOLDER: &str = "Search…";
pub const SELECT_PLACEHOLDER: &str = "Select…";

#[derive(Clone, Default)]
pub struct ComboboxOptions {
    pub choices: Vec<Choice>,
    /// Typed text that matches no choice is kept as the value.
    pub allow_arbitrary: bool,
    /// Typed text narrows the dropdown.
    pub filter: bool,
    pub required: bool,
}

impl ComboboxOptions {
    pub fn new(choices: Vec<Choice>) -> Self {
        Self {
            choices,
            filter: true,
            ..Self::default()
        }
    }

    pub fn allow_arbitrary(mut self) -> Self {
        self.allow_arbitrary = true;
        self
    }

    pub fn required(mut self) -> Self {
        self.required = true;
        self
    }

    pub fn without_filter(mut self) -> Self {
        self.filter = false;
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum ComboboxMode {
    Display,
    Edit,
}

pub struct ComboboxInput {
    field: Field<String>,
    choices: Vec<Choice>,
    allow_arbitrary: bool,
    filter: bool,
    mode: ComboboxMode,
    dropdown_open: bool,
    mouse_down_inside: bool,
    search: TextBuffer,
}

impl ComboboxInput {
    pub fn new(ctx: &FormContext, key: WidgetKey, options: ComboboxOptions) -> Self {
        Self {
            field: Field::new(&ctx.bus, ctx.scope, ValueCell::new(key).required(options.required)),
            choices: options.choices,
            allow_arbitrary: options.allow_arbitrary,
            filter: options.filter,
            mode: ComboboxMode::Display,
            dropdown_open: false,
            mouse_down_inside: false,
            search: TextBuffer::new(),
        }
    }

    pub fn field(&self) -> &Field<String> {
        &self.field
    }

    pub fn value(&self) -> Option<String> {
        self.field.value()
    }

    pub fn mode(&self) -> ComboboxMode {
        self.mode
    }

    pub fn is_open(&self) -> bool {
        self.dropdown_open
    }

    pub fn search_text(&self) -> &str {
        self.search.text()
    }

    pub fn choices(&self) -> &[Choice] {
        &self.choices
    }

    pub fn set_choices(&mut self, choices: Vec<Choice>) {
        self.choices = choices;
    }

    pub fn placeholder(&self) -> &'static str {
        if self.allow_arbitrary {
            ARBITRARY_PLACEHOLDER
        } else {
            SELECT_PLACEHOLDER
        }
    }

    /// Text shown in display mode: the choice text, the raw value, or nothing.
    pub fn display_text(&self) -> Option<String> {
        let value = self.field.value()?;
        Some(
            self.choices
                .iter()
                .find(|choice| choice.key == value)
                .map_or(value, |choice| choice.text.clone()),
        )
    }

    /// Choices currently listed in the dropdown.
    pub fn visible_choices(&self) -> Vec<&Choice> {
        let needle = self.search.text().to_lowercase();
        if !self.filter || self.mode != ComboboxMode::Edit || needle.is_empty() {
            return self.choices.iter().collect();
        }
        self.choices
            .iter()
            .filter(|choice| choice.text.to_lowercase().contains(&needle))
            .collect()
    }

    /// Empties the selection and the search text without publishing.
    pub fn clear(&mut self) {
        self.field.set_value(None);
        self.search.clear();
    }

    /// Resolves typed text: key match, then text match, then the raw text
    /// when arbitrary values are allowed. Matching is exact, whitespace
    /// included.
    fn resolve(&self, text: &str) -> Option<String> {
        if text.is_empty() {
            return None;
        }
        if let Some(choice) = self.choices.iter().find(|choice| choice.key == text) {
            return Some(choice.key.clone());
        }
        if let Some(choice) = self.choices.iter().find(|choice| choice.text == text) {
            return Some(choice.key.clone());
        }
        self.allow_arbitrary.then(|| text.to_string())
    }

    fn open(&mut self) -> EventOutcome {
        if self.mode == ComboboxMode::Display {
            self.search.set_text(self.display_text().unwrap_or_default());
        }
        self.mode = ComboboxMode::Edit;
        self.dropdown_open = true;
        EventOutcome::Handled
    }

    fn close_to_display(&mut self) {
        self.dropdown_open = false;
        self.mode = ComboboxMode::Display;
        self.mouse_down_inside = false;
    }

    fn commit(&mut self, value: Option<String>) -> EventOutcome {
        debug!(key = %self.key(), value = ?value, "combobox commit");
        let text = value.as_deref().map(|v| self.text_for(v)).unwrap_or_default();
        self.search.set_text(text);
        self.field.set_value(value);
        self.close_to_display();
        self.field.confirm();
        EventOutcome::Committed
    }

    fn commit_from_search(&mut self) -> EventOutcome {
        let value = self.resolve(self.search.text());
        self.commit(value)
    }

    fn text_for(&self, value: &str) -> String {
        self.choices
            .iter()
            .find(|choice| choice.key == value)
            .map_or_else(|| value.to_string(), |choice| choice.text.clone())
    }
}

impl InputWidget for ComboboxInput {
    fn key(&self) -> &WidgetKey {
        self.field.key()
    }

    fn value_json(&self) -> Value {
        self.field.value_json()
    }

    fn set_value_json(&mut self, value: Value) -> Result<(), FormError> {
        let value: Option<String> = decode(self.key(), value)?;
        let text = value.as_deref().map(|v| self.text_for(v)).unwrap_or_default();
        self.search.set_text(text);
        self.field.set_value(value);
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
            UiAction::Click | UiAction::ArrowClick | UiAction::Focus => self.open(),
            action if action.is_text_edit() => {
                self.open();
                match action {
                    UiAction::Input(text) => self.search.set_text(text),
                    UiAction::Char(c) => self.search.insert_char(c),
                    UiAction::Backspace => self.search.backspace(),
                    UiAction::Left => self.search.move_left(),
                    UiAction::Right => self.search.move_right(),
                    _ => {}
                }
                self.field.with_mut(|cell| cell.set_external_error(None));
                EventOutcome::Handled
            }
            UiAction::Enter if self.mode == ComboboxMode::Edit => self.commit_from_search(),
            UiAction::Escape => {
                self.dropdown_open = false;
                EventOutcome::Handled
            }
            UiAction::Blur if self.mode == ComboboxMode::Edit => {
                if self.mouse_down_inside {
                    debug!(key = %self.key(), "blur during mouse interaction, keeping dropdown");
                    self.dropdown_open = true;
                    return EventOutcome::Handled;
                }
                self.commit_from_search()
            }
            UiAction::MouseDown => {
                self.mouse_down_inside = true;
                EventOutcome::Handled
            }
            UiAction::MouseUp => {
                self.mouse_down_inside = false;
                EventOutcome::Handled
            }
            UiAction::ItemMouseDown(index) => {
                let Some(choice) = self.visible_choices().get(index).map(|choice| choice.key.clone()) else {
                    debug!(key = %self.key(), index, "no visible item at index");
                    return EventOutcome::Ignored;
                };
                self.commit(Some(choice))
            }
            UiAction::ClickOutside => {
                self.dropdown_open = false;
                EventOutcome::Handled
            }
            UiAction::Select(key) => {
                let value = self.resolve(&key);
                self.commit(value)
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
        let cell = self.field.borrow();
        let visible: Vec<&str> = self
            .visible_choices()
            .into_iter()
            .map(|choice| choice.key.as_str())
            .collect();
        json!({
            "value": cell.value_json(),
            "mode": self.mode,
            "open": self.dropdown_open,
            "display": self.display_text(),
            "placeholder": self.placeholder(),
            "search": self.search.text(),
            "visible": visible,
            "status": cell.status(),
        })
    }
}
