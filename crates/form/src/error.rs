use cean_comm::CommError;
use cean_types::WidgetKey;
use thiserror::Error;

/// Errors returned by form-level operations.
///
/// Field validation failures are not errors; they live on each field's
/// status surface.
#[derive(Debug, Error)]
pub enum FormError {
    #[error("Unknown widget: {key}")]
    UnknownWidget { key: WidgetKey },

    #[error("Duplicate widget key: {key}")]
    DuplicateKey { key: WidgetKey },

    #[error("Invalid value for {key}: {reason}")]
    InvalidValue { key: WidgetKey, reason: String },

    #[error("Widget already disposed: {key}")]
    Disposed { key: WidgetKey },

    #[error(transparent)]
    Comm(#[from] CommError),
}

impl FormError {
    /// Create an unknown widget error.
    pub fn unknown_widget(key: &WidgetKey) -> Self {
        Self::UnknownWidget { key: key.clone() }
    }

    /// Create a duplicate key error.
    pub fn duplicate_key(key: &WidgetKey) -> Self {
        Self::DuplicateKey { key: key.clone() }
    }

    /// Create an invalid value error.
    pub fn invalid_value(key: &WidgetKey, reason: impl Into<String>) -> Self {
        Self::InvalidValue {
            key: key.clone(),
            reason: reason.into(),
        }
    }

    /// Create a disposed widget error.
    pub fn disposed(key: &WidgetKey) -> Self {
        Self::Disposed { key: key.clone() }
    }
}
