//! Value cells and their shared handles.
//!
//! A [`ValueCell`] is plain data: a nullable value, a required flag, an
//! optional validator and the status surface it renders into. A [`Field`]
//! wraps a cell in a shared handle and connects it to the update bus:
//! confirming, listening to other fields and teardown all go through it.

use std::cell::{Cell, Ref, RefCell};
use std::rc::{Rc, Weak};

use cean_types::{UpdateCause, UpdateMessage, WidgetKey};
use serde::Serialize;
use serde_json::Value;
use tracing::{debug, warn};

use crate::bus::{DependencyId, KeyFilter, ScopeId, Subscription, UpdateBus};
use crate::validation::{Validator, validate};

/// One labelled line of auxiliary status text, e.g. `Size: 1.00 kiB`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StatusLine {
    pub label: String,
    pub text: String,
}

impl StatusLine {
    pub fn new(label: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            label: label.into(),
            text: text.into(),
        }
    }
}

/// What a field shows next to its input.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct StatusSurface {
    error: Option<String>,
    lines: Vec<StatusLine>,
}

impl StatusSurface {
    pub fn error(&self) -> Option<&str> {
        self.error.as_deref()
    }

    pub fn set_error(&mut self, error: Option<String>) {
        self.error = error;
    }

    pub fn lines(&self) -> &[StatusLine] {
        &self.lines
    }

    pub fn set_lines(&mut self, lines: Vec<StatusLine>) {
        self.lines = lines;
    }

    pub fn clear_lines(&mut self) {
        self.lines.clear();
    }

    pub fn is_clear(&self) -> bool {
        self.error.is_none() && self.lines.is_empty()
    }
}

/// Smallest reactive unit of a form.
pub struct ValueCell<T> {
    key: WidgetKey,
    value: Option<T>,
    required: bool,
    validator: Option<Validator<T>>,
    /// Message reported from outside the validator: backend responses,
    /// unparsable text, errors of nested parts.
    external_error: Option<String>,
    status: StatusSurface,
}

impl<T> ValueCell<T> {
    pub fn new(key: WidgetKey) -> Self {
        Self {
            key,
            value: None,
            required: false,
            validator: None,
            external_error: None,
            status: StatusSurface::default(),
        }
    }

    pub fn required(mut self, required: bool) -> Self {
        self.required = required;
        self
    }

    pub fn with_validator(mut self, validator: Option<Validator<T>>) -> Self {
        self.validator = validator;
        self
    }

    pub fn key(&self) -> &WidgetKey {
        &self.key
    }

    pub fn value(&self) -> Option<&T> {
        self.value.as_ref()
    }

    /// Replaces the value without validating or publishing.
    pub fn set_value(&mut self, value: Option<T>) {
        self.value = value;
    }

    pub fn is_required(&self) -> bool {
        self.required
    }

    pub fn external_error(&self) -> Option<&str> {
        self.external_error.as_deref()
    }

    pub fn set_external_error(&mut self, error: Option<String>) {
        self.external_error = error;
    }

    /// Current validation result, without touching the status surface.
    pub fn check(&self) -> Option<String> {
        self.external_error
            .clone()
            .or_else(|| validate(self.required, self.validator.as_ref(), self.value.as_ref()))
    }

    pub fn is_valid(&self) -> bool {
        self.check().is_none()
    }

    /// Runs validation and writes the result to the status surface.
    pub fn validate(&mut self) -> Option<String> {
        let result = self.check();
        self.status.set_error(result.clone());
        result
    }

    pub fn status(&self) -> &StatusSurface {
        &self.status
    }

    pub fn status_mut(&mut self) -> &mut StatusSurface {
        &mut self.status
    }
}

impl<T: Serialize> ValueCell<T> {
    /// The value as JSON; `Null` when empty.
    pub fn value_json(&self) -> Value {
        let Some(value) = &self.value else {
            return Value::Null;
        };
        match serde_json::to_value(value) {
            Ok(json) => json,
            Err(err) => {
                warn!(key = %self.key, error = %err, "value does not serialize, publishing null");
                Value::Null
            }
        }
    }
}

impl<T: std::fmt::Debug> std::fmt::Debug for ValueCell<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ValueCell")
            .field("key", &self.key)
            .field("value", &self.value)
            .field("required", &self.required)
            .field("status", &self.status)
            .finish()
    }
}

type DependencyHandler<T> = Rc<dyn Fn(&mut ValueCell<T>, &Value)>;

struct Dependency {
    id: DependencyId,
    _source: Subscription,
    _teardown: Subscription,
}

struct FieldInner<T> {
    key: WidgetKey,
    cell: RefCell<ValueCell<T>>,
    bus: UpdateBus,
    scope: ScopeId,
    dependencies: RefCell<Vec<Dependency>>,
    /// Set while the field re-publishes from one of its dependency handlers.
    deriving: Cell<bool>,
    disposed: Cell<bool>,
}

/// Shared handle on a value cell living on an update bus.
pub struct Field<T> {
    inner: Rc<FieldInner<T>>,
}

impl<T> Clone for Field<T> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
        }
    }
}

/// Non-owning handle, for callbacks that must not keep a field alive.
pub struct WeakField<T> {
    inner: Weak<FieldInner<T>>,
}

impl<T> Clone for WeakField<T> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
        }
    }
}

impl<T> WeakField<T> {
    pub fn upgrade(&self) -> Option<Field<T>> {
        self.inner.upgrade().map(|inner| Field { inner })
    }
}

impl<T: Serialize + 'static> Field<T> {
    pub fn new(bus: &UpdateBus, scope: ScopeId, cell: ValueCell<T>) -> Self {
        Self {
            inner: Rc::new(FieldInner {
                key: cell.key().clone(),
                cell: RefCell::new(cell),
                bus: bus.clone(),
                scope,
                dependencies: RefCell::new(Vec::new()),
                deriving: Cell::new(false),
                disposed: Cell::new(false),
            }),
        }
    }

    pub fn key(&self) -> &WidgetKey {
        &self.inner.key
    }

    pub fn scope(&self) -> ScopeId {
        self.inner.scope
    }

    pub fn downgrade(&self) -> WeakField<T> {
        WeakField {
            inner: Rc::downgrade(&self.inner),
        }
    }

    pub fn borrow(&self) -> Ref<'_, ValueCell<T>> {
        self.inner.cell.borrow()
    }

    pub fn with_mut<R>(&self, f: impl FnOnce(&mut ValueCell<T>) -> R) -> R {
        f(&mut self.inner.cell.borrow_mut())
    }

    pub fn value(&self) -> Option<T>
    where
        T: Clone,
    {
        self.inner.cell.borrow().value().cloned()
    }

    /// Silent assignment: no validation, no publication.
    pub fn set_value(&self, value: Option<T>) {
        self.inner.cell.borrow_mut().set_value(value);
    }

    pub fn value_json(&self) -> Value {
        self.inner.cell.borrow().value_json()
    }

    pub fn check(&self) -> Option<String> {
        self.inner.cell.borrow().check()
    }

    /// Sets or clears the external error and re-renders the status surface
    /// without publishing.
    pub fn report_error(&self, message: Option<String>) {
        let mut cell = self.inner.cell.borrow_mut();
        cell.set_external_error(message);
        cell.validate();
    }

    pub fn is_disposed(&self) -> bool {
        self.inner.disposed.get()
    }

    /// Validates, updates the status surface and publishes the value.
    ///
    /// The publication happens even when validation fails; its `valid` flag
    /// carries the outcome. Returns the validation message, if any.
    pub fn confirm(&self) -> Option<String> {
        if self.is_disposed() {
            debug!(key = %self.inner.key, "ignoring confirm on disposed field");
            return None;
        }
        let (message, error) = {
            let Ok(mut cell) = self.inner.cell.try_borrow_mut() else {
                warn!(key = %self.inner.key, "confirm re-entered a borrowed field, skipping");
                return None;
            };
            let error = cell.validate();
            let cause = if self.inner.deriving.get() {
                UpdateCause::Derived
            } else {
                UpdateCause::Confirmed
            };
            let message = UpdateMessage {
                key: self.inner.key.clone(),
                value: cell.value_json(),
                valid: error.is_none(),
                cause,
            };
            (message, error)
        };
        self.inner.bus.publish(self.inner.scope, &message);
        error
    }

    /// Runs `handler` against this cell whenever `source` publishes through
    /// `scope`. The handler assigns silently.
    ///
    /// The dependency is retracted when this field confirms a value of its
    /// own or is disposed. Registering the same pair twice creates two
    /// dependencies.
    pub fn listen_to_widget(
        &self,
        source: &WidgetKey,
        scope: ScopeId,
        handler: impl Fn(&mut ValueCell<T>, &Value) + 'static,
    ) -> DependencyId {
        self.register_dependency(source, scope, Rc::new(handler), false)
    }

    /// Like [`Field::listen_to_widget`], but re-publishes the derived value so
    /// that fields following this one update too.
    pub fn derive_from(&self, source: &WidgetKey, scope: ScopeId, derive: impl Fn(&Value) -> Option<T> + 'static) -> DependencyId {
        let handler: DependencyHandler<T> = Rc::new(move |cell, value| cell.set_value(derive(value)));
        self.register_dependency(source, scope, handler, true)
    }

    fn register_dependency(&self, source: &WidgetKey, scope: ScopeId, handler: DependencyHandler<T>, republish: bool) -> DependencyId {
        let bus = &self.inner.bus;
        let id = bus.register_dependency(&self.inner.key, source);

        let weak = Rc::downgrade(&self.inner);
        let source_sub = bus.subscribe(scope, KeyFilter::Key(source.clone()), move |message| {
            if let Some(inner) = weak.upgrade() {
                Field { inner }.run_dependency(&handler, message, republish);
            }
        });

        let weak = Rc::downgrade(&self.inner);
        let teardown_sub = bus.subscribe(self.inner.scope, KeyFilter::Key(self.inner.key.clone()), move |message| {
            if message.cause == UpdateCause::Derived {
                return;
            }
            if let Some(inner) = weak.upgrade() {
                Field { inner }.unlisten(id);
            }
        });

        debug!(listener = %self.inner.key, source = %source, "registered dependency");
        self.inner.dependencies.borrow_mut().push(Dependency {
            id,
            _source: source_sub,
            _teardown: teardown_sub,
        });
        id
    }

    fn run_dependency(&self, handler: &DependencyHandler<T>, message: &UpdateMessage, republish: bool) {
        if self.inner.deriving.get() {
            warn!(listener = %self.inner.key, source = %message.key, "dependency cycle detected, skipping handler");
            return;
        }
        {
            let Ok(mut cell) = self.inner.cell.try_borrow_mut() else {
                warn!(listener = %self.inner.key, source = %message.key, "dependency re-entered a borrowed field, skipping");
                return;
            };
            handler(&mut cell, &message.value);
        }
        if republish {
            self.inner.deriving.set(true);
            self.confirm();
            self.inner.deriving.set(false);
        }
    }

    /// Retracts one dependency. Returns whether it was still live.
    pub fn unlisten(&self, id: DependencyId) -> bool {
        let removed = {
            let mut dependencies = self.inner.dependencies.borrow_mut();
            let position = dependencies.iter().position(|dependency| dependency.id == id);
            position.map(|index| dependencies.remove(index))
        };
        let Some(dependency) = removed else {
            return false;
        };
        self.inner.bus.retract_dependency(dependency.id);
        debug!(listener = %self.inner.key, "retracted dependency");
        drop(dependency);
        true
    }

    pub fn dependency_count(&self) -> usize {
        self.inner.dependencies.borrow().len()
    }

    /// Retracts every dependency and publishes a `Removed` update once.
    pub fn dispose(&self) {
        if self.inner.disposed.replace(true) {
            return;
        }
        let dependencies = std::mem::take(&mut *self.inner.dependencies.borrow_mut());
        for dependency in &dependencies {
            self.inner.bus.retract_dependency(dependency.id);
        }
        drop(dependencies);
        self.inner
            .bus
            .publish(self.inner.scope, &UpdateMessage::removed(self.inner.key.clone()));
    }
}

impl<T: std::fmt::Debug> std::fmt::Debug for Field<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Field")
            .field("cell", &*self.inner.cell.borrow())
            .field("scope", &self.inner.scope)
            .field("disposed", &self.inner.disposed.get())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::validation::REQUIRED_MESSAGE;
    use serde_json::json;

    fn recorder(bus: &UpdateBus, key: &str) -> (Subscription, Rc<RefCell<Vec<UpdateMessage>>>) {
        let seen = Rc::new(RefCell::new(Vec::new()));
        let sink = seen.clone();
        let sub = bus.subscribe(ScopeId::ROOT, KeyFilter::Key(key.into()), move |m| sink.borrow_mut().push(m.clone()));
        (sub, seen)
    }

    #[test]
    fn required_empty_cell_publishes_invalid_null() {
        let bus = UpdateBus::new();
        let field = Field::new(&bus, ScopeId::ROOT, ValueCell::<String>::new("name".into()).required(true));
        let (_sub, seen) = recorder(&bus, "name");

        assert_eq!(field.confirm(), Some(REQUIRED_MESSAGE.to_string()));
        assert_eq!(field.borrow().status().error(), Some(REQUIRED_MESSAGE));
        let seen = seen.borrow();
        assert_eq!(seen.len(), 1);
        assert!(seen[0].value.is_null());
        assert!(!seen[0].valid);
    }

    #[test]
    fn silent_assignment_does_not_publish_and_confirm_is_repeatable() {
        let bus = UpdateBus::new();
        let field = Field::new(&bus, ScopeId::ROOT, ValueCell::<String>::new("name".into()));
        let (_sub, seen) = recorder(&bus, "name");

        field.set_value(Some("x".into()));
        assert!(seen.borrow().is_empty());

        field.confirm();
        field.confirm();
        let seen = seen.borrow();
        assert_eq!(seen.len(), 2);
        assert_eq!(seen[0], seen[1]);
        assert_eq!(seen[0].value, json!("x"));
    }

    #[test]
    fn external_error_overrides_validator() {
        let mut cell = ValueCell::<String>::new("path".into());
        cell.set_value(Some("/nope".into()));
        cell.set_external_error(Some("No such file".into()));
        assert_eq!(cell.validate(), Some("No such file".to_string()));
        cell.set_external_error(None);
        assert!(cell.validate().is_none());
        assert!(cell.status().is_clear());
    }

    #[test]
    fn listener_follows_source_until_it_confirms_itself() {
        let bus = UpdateBus::new();
        let source = Field::new(&bus, ScopeId::ROOT, ValueCell::<String>::new("instrument".into()));
        let listener = Field::new(&bus, ScopeId::ROOT, ValueCell::<String>::new("location".into()));
        let calls = Rc::new(Cell::new(0));
        let counter = calls.clone();
        listener.listen_to_widget(source.key(), ScopeId::ROOT, move |cell, value| {
            counter.set(counter.get() + 1);
            cell.set_value(value.as_str().map(|id| format!("ESS:{id}")));
        });

        source.set_value(Some("dream".into()));
        source.confirm();
        assert_eq!(calls.get(), 1);
        assert_eq!(listener.value().as_deref(), Some("ESS:dream"));

        listener.set_value(Some("elsewhere".into()));
        listener.confirm();
        assert_eq!(listener.dependency_count(), 0);
        assert!(bus.dependencies().is_empty());

        source.confirm();
        assert_eq!(calls.get(), 1);
        assert_eq!(listener.value().as_deref(), Some("elsewhere"));
    }

    #[test]
    fn derived_republication_keeps_the_dependency() {
        let bus = UpdateBus::new();
        let source = Field::new(&bus, ScopeId::ROOT, ValueCell::<String>::new("a".into()));
        let middle = Field::new(&bus, ScopeId::ROOT, ValueCell::<String>::new("b".into()));
        let last = Field::new(&bus, ScopeId::ROOT, ValueCell::<String>::new("c".into()));
        middle.derive_from(source.key(), ScopeId::ROOT, |v| v.as_str().map(str::to_uppercase));
        last.derive_from(middle.key(), ScopeId::ROOT, |v| v.as_str().map(|s| format!("{s}!")));

        source.set_value(Some("x".into()));
        source.confirm();
        assert_eq!(last.value().as_deref(), Some("X!"));
        assert_eq!(middle.dependency_count(), 1);
        assert_eq!(bus.dependencies().len(), 2);
    }

    #[test]
    fn cycles_are_cut_instead_of_recursing() {
        let bus = UpdateBus::new();
        let start = Field::new(&bus, ScopeId::ROOT, ValueCell::<u64>::new("start".into()));
        let a = Field::new(&bus, ScopeId::ROOT, ValueCell::<u64>::new("a".into()));
        let b = Field::new(&bus, ScopeId::ROOT, ValueCell::<u64>::new("b".into()));
        a.derive_from(start.key(), ScopeId::ROOT, |v| v.as_u64().map(|n| n + 1));
        a.derive_from(b.key(), ScopeId::ROOT, |v| v.as_u64().map(|n| n + 1));
        b.derive_from(a.key(), ScopeId::ROOT, |v| v.as_u64().map(|n| n + 1));

        start.set_value(Some(1));
        start.confirm();
        assert_eq!(a.value(), Some(2));
        assert_eq!(b.value(), Some(3));
        assert_eq!(a.dependency_count(), 2);
    }

    #[test]
    fn dispose_publishes_removed_once_and_drops_subscriptions() {
        let bus = UpdateBus::new();
        let source = Field::new(&bus, ScopeId::ROOT, ValueCell::<String>::new("a".into()));
        let listener = Field::new(&bus, ScopeId::ROOT, ValueCell::<String>::new("b".into()));
        listener.listen_to_widget(source.key(), ScopeId::ROOT, |_, _| panic!("disposed listener ran"));
        let (_sub, seen) = recorder(&bus, "b");
        let before = bus.subscription_count();

        listener.dispose();
        listener.dispose();
        source.confirm();

        assert_eq!(bus.subscription_count(), before - 2);
        let seen = seen.borrow();
        assert_eq!(seen.len(), 1);
        assert_eq!(seen[0].cause, UpdateCause::Removed);
    }
}
