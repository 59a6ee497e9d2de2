//! Reactive form framework for dataset metadata entry.
//!
//! Widgets own [`ValueCell`]s through shared [`Field`] handles. Confirming a
//! field validates it and publishes an update on the [`UpdateBus`], where
//! other fields may follow it. Widgets that need the backend talk to it
//! through the session's `BackendComm`; the [`DatasetForm`] routes user
//! events, gathers values and drives the upload.

pub mod bus;
pub mod cell;
mod error;
pub mod form;
mod text_buffer;
pub mod timer;
pub mod upload;
pub mod validation;
pub mod widget;
pub mod widgets;

pub use bus::{DependencyEdge, DependencyId, KeyFilter, ScopeId, Subscription, UpdateBus};
pub use cell::{Field, StatusLine, StatusSurface, ValueCell, WeakField};
pub use error::FormError;
pub use form::{DatasetForm, FieldKind, FormSetup, UiEvent};
pub use text_buffer::TextBuffer;
pub use timer::{Debouncer, TimerId, TimerQueue};
pub use upload::{GatherResult, UploadController, UploadState};
pub use widget::{EventOutcome, FormContext, InputWidget, UiAction};

#[cfg(test)]
pub(crate) mod testing {
    use cean_comm::{BackendComm, MemoryTransport};
    use cean_util::FormConfig;

    use crate::timer::TimerQueue;
    use crate::widget::FormContext;

    pub fn context() -> (FormContext, MemoryTransport) {
        context_with(FormConfig::default())
    }

    pub fn context_with(config: FormConfig) -> (FormContext, MemoryTransport) {
        let transport = MemoryTransport::new();
        let comm = BackendComm::new(transport.clone());
        (FormContext::new(comm, TimerQueue::new(), config), transport)
    }
}
