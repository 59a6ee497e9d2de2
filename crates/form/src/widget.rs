//! The seam every widget implements, plus the shared construction context.

use std::rc::Rc;
use std::time::Duration;

use cean_comm::BackendComm;
use cean_types::WidgetKey;
use cean_util::FormConfig;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};

use crate::FormError;
use crate::bus::{ScopeId, UpdateBus};
use crate::timer::TimerQueue;

/// A user interaction aimed at one widget (or one part of a composite).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum UiAction {
    /// Replace the text of the target with this string.
    Input(String),
    Char(char),
    Backspace,
    Left,
    Right,
    Enter,
    Escape,
    Focus,
    Blur,
    Click,
    ArrowClick,
    MouseDown,
    /// Document-level mouse release.
    MouseUp,
    /// Mouse pressed on the n-th visible dropdown item.
    ItemMouseDown(usize),
    ClickOutside,
    Toggle(bool),
    Select(String),
    Browse,
    Remove,
    Add,
}

impl UiAction {
    /// Whether this action edits text, as opposed to moving focus.
    pub fn is_text_edit(&self) -> bool {
        matches!(
            self,
            UiAction::Input(_) | UiAction::Char(_) | UiAction::Backspace | UiAction::Left | UiAction::Right
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventOutcome {
    /// The target is not this widget or the action does not apply.
    Ignored,
    /// State changed, nothing was published.
    Handled,
    /// A value was confirmed and published.
    Committed,
}

impl EventOutcome {
    pub fn is_ignored(self) -> bool {
        self == EventOutcome::Ignored
    }

    pub fn is_committed(self) -> bool {
        self == EventOutcome::Committed
    }
}

/// Behaviour shared by every form widget.
pub trait InputWidget {
    fn key(&self) -> &WidgetKey;

    /// Current value as JSON; `Null` when empty.
    fn value_json(&self) -> Value;

    /// Silent assignment: no validation, no publication.
    fn set_value_json(&mut self, value: Value) -> Result<(), FormError>;

    /// Current validation result, including nested parts.
    fn validation_error(&self) -> Option<String>;

    fn is_valid(&self) -> bool {
        self.validation_error().is_none()
    }

    fn handle(&mut self, target: &WidgetKey, action: UiAction) -> EventOutcome;

    /// Shows a backend-reported error on the part keyed `field`. Returns
    /// whether some part of this widget took it.
    fn apply_backend_error(&mut self, field: &WidgetKey, message: &str) -> bool;

    /// Reconciles structure after asynchronous updates (backend responses,
    /// timers). Most widgets have nothing to do.
    fn refresh(&mut self) {}

    fn dispose(&mut self);

    /// JSON view for hosts that render the form.
    fn snapshot(&self) -> Value {
        json!({
            "value": self.value_json(),
            "error": self.validation_error(),
        })
    }
}

/// Everything a widget needs from its form session.
#[derive(Clone)]
pub struct FormContext {
    pub bus: UpdateBus,
    pub scope: ScopeId,
    pub comm: BackendComm,
    pub timers: TimerQueue,
    pub config: Rc<FormConfig>,
}

impl FormContext {
    pub fn new(comm: BackendComm, timers: TimerQueue, config: FormConfig) -> Self {
        Self {
            bus: UpdateBus::new(),
            scope: ScopeId::ROOT,
            comm,
            timers,
            config: Rc::new(config),
        }
    }

    /// Same session, publishing into a fresh child scope.
    pub fn child_scope(&self) -> Self {
        Self {
            scope: self.bus.new_scope(self.scope),
            ..self.clone()
        }
    }

    pub fn debounce(&self) -> Duration {
        Duration::from_millis(self.config.debounce_ms)
    }
}

/// Decodes a JSON value for `key`; `Null` means empty.
pub(crate) fn decode<T: DeserializeOwned>(key: &WidgetKey, value: Value) -> Result<Option<T>, FormError> {
    if value.is_null() {
        return Ok(None);
    }
    serde_json::from_value(value)
        .map(Some)
        .map_err(|err| FormError::invalid_value(key, err.to_string()))
}
