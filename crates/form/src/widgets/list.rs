//! Repeating items that always end in one empty row.
//!
//! Typing into the trailing row and committing it appends a fresh empty row.
//! Emptying a row that is not the last removes it. Removing rows never leaves
//! the list without its trailing empty row.

use cean_types::{KeyAllocator, WidgetKey};
use serde_json::Value;
use tracing::debug;

use crate::widget::{EventOutcome, InputWidget, UiAction};

/// An item of a [`GrowableList`].
pub trait ListItem: InputWidget {
    /// Whether the item holds a committed value.
    fn has_value(&self) -> bool;

    /// Whether the item can be dropped without losing input.
    fn is_blank(&self) -> bool {
        !self.has_value()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RemovalPolicy {
    /// The only remaining row cannot be removed.
    KeepSole,
    /// Any row can be removed; the trailing empty row is re-created.
    Free,
}

pub struct GrowableList<I: ListItem> {
    keys: KeyAllocator,
    items: Vec<I>,
    policy: RemovalPolicy,
    factory: Box<dyn Fn(WidgetKey) -> I>,
}

impl<I: ListItem> GrowableList<I> {
    pub fn new(prefix: WidgetKey, policy: RemovalPolicy, factory: impl Fn(WidgetKey) -> I + 'static) -> Self {
        let mut list = Self {
            keys: KeyAllocator::new(prefix),
            items: Vec::new(),
            policy,
            factory: Box::new(factory),
        };
        list.push_empty();
        list
    }

    pub fn items(&self) -> &[I] {
        &self.items
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Items holding a value, in order.
    pub fn filled(&self) -> impl Iterator<Item = &I> {
        self.items.iter().filter(|item| item.has_value())
    }

    pub fn can_remove(&self, index: usize) -> bool {
        index < self.items.len() && !(self.policy == RemovalPolicy::KeepSole && self.items.len() == 1)
    }

    pub fn remove(&mut self, index: usize) -> bool {
        if !self.can_remove(index) {
            debug!(list = %self.keys.prefix(), index, "item cannot be removed");
            return false;
        }
        let mut item = self.items.remove(index);
        debug!(list = %self.keys.prefix(), key = %item.key(), "removing item");
        item.dispose();
        self.normalize();
        true
    }

    /// Replaces every item with one per value, followed by an empty row.
    /// Values that leave an item blank are skipped.
    pub fn set_values(&mut self, values: Vec<Value>) -> Result<(), crate::FormError> {
        self.clear();
        for value in values {
            let mut item = (self.factory)(self.keys.allocate());
            item.set_value_json(value)?;
            if item.is_blank() {
                debug!(list = %self.keys.prefix(), key = %item.key(), "skipping blank value");
                item.dispose();
                continue;
            }
            self.items.push(item);
        }
        self.normalize();
        Ok(())
    }

    pub fn values(&self) -> Vec<Value> {
        self.filled().map(InputWidget::value_json).collect()
    }

    pub fn validation_error(&self) -> Option<String> {
        self.items.iter().find_map(InputWidget::validation_error)
    }

    pub fn position(&self, target: &WidgetKey) -> Option<usize> {
        self.items.iter().position(|item| target.is_within(item.key()))
    }

    pub fn item_mut(&mut self, index: usize) -> Option<&mut I> {
        self.items.get_mut(index)
    }

    /// Routes an action to the item that owns `target`. `Remove` aimed at an
    /// item's own key removes it.
    pub fn handle(&mut self, target: &WidgetKey, action: UiAction) -> EventOutcome {
        let Some(index) = self.position(target) else {
            return EventOutcome::Ignored;
        };
        if action == UiAction::Remove && target == self.items[index].key() {
            return if self.remove(index) {
                EventOutcome::Committed
            } else {
                EventOutcome::Ignored
            };
        }
        let outcome = self.items[index].handle(target, action);
        if outcome.is_committed() {
            self.after_commit(index);
        }
        outcome
    }

    pub fn apply_backend_error(&mut self, field: &WidgetKey, message: &str) -> bool {
        self.items
            .iter_mut()
            .any(|item| item.apply_backend_error(field, message))
    }

    pub fn refresh(&mut self) {
        for item in &mut self.items {
            item.refresh();
        }
        self.normalize();
    }

    pub fn dispose(&mut self) {
        self.clear();
    }

    fn clear(&mut self) {
        for mut item in self.items.drain(..) {
            item.dispose();
        }
    }

    fn after_commit(&mut self, index: usize) {
        let is_tail = index + 1 == self.items.len();
        if !is_tail && self.items[index].is_blank() {
            let mut item = self.items.remove(index);
            debug!(list = %self.keys.prefix(), key = %item.key(), "pruning emptied item");
            item.dispose();
        }
        self.normalize();
    }

    /// Restores the trailing empty row.
    fn normalize(&mut self) {
        if self.items.last().is_none_or(|item| item.has_value()) {
            self.push_empty();
        }
    }

    fn push_empty(&mut self) {
        let key = self.keys.allocate();
        debug!(list = %self.keys.prefix(), key = %key, "appending empty item");
        self.items.push((self.factory)(key));
    }
}
