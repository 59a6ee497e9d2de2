//! Update-bus message payloads.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::WidgetKey;

/// Why a cell published an update.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum UpdateCause {
    /// The user confirmed the value (blur, Enter, selection).
    Confirmed,
    /// The cell re-published while running one of its own dependency handlers.
    Derived,
    /// The cell was disposed; `value` is always `Null`.
    Removed,
}

/// One publication on the update bus.
///
/// `value` is `Null` when the cell is empty. `valid` reports the result of the
/// validation run that preceded the publication; listeners that need a
/// successful value must check it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UpdateMessage {
    pub key: WidgetKey,
    pub value: Value,
    pub valid: bool,
    pub cause: UpdateCause,
}

impl UpdateMessage {
    pub fn confirmed(key: WidgetKey, value: Value, valid: bool) -> Self {
        Self {
            key,
            value,
            valid,
            cause: UpdateCause::Confirmed,
        }
    }

    pub fn removed(key: WidgetKey) -> Self {
        Self {
            key,
            value: Value::Null,
            valid: true,
            cause: UpdateCause::Removed,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.value.is_null()
    }
}
