//! Keyed publish/subscribe bus for field-to-field reactivity.
//!
//! Scopes form a tree rooted at [`ScopeId::ROOT`]. A publication made in a
//! scope is offered to that scope's subscriptions first, then to each
//! ancestor's, up to the root. Within a scope, subscriptions run in the order
//! they were registered.
//!
//! Handlers always run with the bus unborrowed, so they may publish,
//! subscribe or drop subscriptions themselves.

use std::cell::RefCell;
use std::collections::BTreeMap;
use std::rc::{Rc, Weak};

use cean_types::{UpdateMessage, WidgetKey};
use serde::Serialize;
use tracing::{debug, trace};

/// Node in the scope tree.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ScopeId(usize);

impl ScopeId {
    /// The whole form.
    pub const ROOT: ScopeId = ScopeId(0);
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SubscriptionId(u64);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct DependencyId(u64);

/// Which publications a subscription receives.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum KeyFilter {
    Key(WidgetKey),
    Any,
}

impl KeyFilter {
    fn matches(&self, key: &WidgetKey) -> bool {
        match self {
            KeyFilter::Key(expected) => expected == key,
            KeyFilter::Any => true,
        }
    }
}

/// A live "listener follows source" edge in the dependency graph.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DependencyEdge {
    pub id: DependencyId,
    pub listener: WidgetKey,
    pub source: WidgetKey,
}

type Handler = Rc<dyn Fn(&UpdateMessage)>;

struct Entry {
    id: SubscriptionId,
    scope: ScopeId,
    filter: KeyFilter,
    handler: Handler,
}

struct BusState {
    /// Parent of each scope, indexed by `ScopeId`; the root has none.
    parents: Vec<Option<ScopeId>>,
    entries: Vec<Entry>,
    next_subscription: u64,
    edges: BTreeMap<DependencyId, DependencyEdge>,
    next_dependency: u64,
}

impl BusState {
    fn scope_chain(&self, scope: ScopeId) -> Vec<ScopeId> {
        let mut chain = Vec::new();
        let mut current = Some(scope);
        while let Some(id) = current {
            chain.push(id);
            current = self.parents.get(id.0).copied().flatten();
        }
        chain
    }

    fn is_live(&self, id: SubscriptionId) -> bool {
        self.entries.iter().any(|entry| entry.id == id)
    }
}

/// Cheap-to-clone handle on one form's update bus.
#[derive(Clone)]
pub struct UpdateBus {
    state: Rc<RefCell<BusState>>,
}

impl Default for UpdateBus {
    fn default() -> Self {
        Self::new()
    }
}

impl UpdateBus {
    pub fn new() -> Self {
        Self {
            state: Rc::new(RefCell::new(BusState {
                parents: vec![None],
                entries: Vec::new(),
                next_subscription: 0,
                edges: BTreeMap::new(),
                next_dependency: 0,
            })),
        }
    }

    /// Creates a child scope below `parent`.
    pub fn new_scope(&self, parent: ScopeId) -> ScopeId {
        let mut state = self.state.borrow_mut();
        let parent = if parent.0 < state.parents.len() {
            parent
        } else {
            debug!(scope = parent.0, "unknown parent scope, attaching to root");
            ScopeId::ROOT
        };
        state.parents.push(Some(parent));
        ScopeId(state.parents.len() - 1)
    }

    /// Registers `handler` for publications matching `filter` that pass
    /// through `scope`.
    pub fn subscribe(&self, scope: ScopeId, filter: KeyFilter, handler: impl Fn(&UpdateMessage) + 'static) -> Subscription {
        let mut state = self.state.borrow_mut();
        let id = SubscriptionId(state.next_subscription);
        state.next_subscription += 1;
        state.entries.push(Entry {
            id,
            scope,
            filter,
            handler: Rc::new(handler),
        });
        Subscription {
            bus: Rc::downgrade(&self.state),
            id,
            active: true,
        }
    }

    /// Delivers `message` from `scope` upwards. Returns how many handlers ran.
    pub fn publish(&self, scope: ScopeId, message: &UpdateMessage) -> usize {
        let chain = self.state.borrow().scope_chain(scope);
        let mut delivered = 0;
        for scope in chain {
            let handlers: Vec<(SubscriptionId, Handler)> = self
                .state
                .borrow()
                .entries
                .iter()
                .filter(|entry| entry.scope == scope && entry.filter.matches(&message.key))
                .map(|entry| (entry.id, entry.handler.clone()))
                .collect();
            for (id, handler) in handlers {
                // An earlier handler may have retracted this one.
                if !self.state.borrow().is_live(id) {
                    continue;
                }
                handler(message);
                delivered += 1;
            }
        }
        trace!(key = %message.key, cause = ?message.cause, delivered, "published update");
        delivered
    }

    pub fn subscription_count(&self) -> usize {
        self.state.borrow().entries.len()
    }

    pub(crate) fn register_dependency(&self, listener: &WidgetKey, source: &WidgetKey) -> DependencyId {
        let mut state = self.state.borrow_mut();
        let id = DependencyId(state.next_dependency);
        state.next_dependency += 1;
        state.edges.insert(
            id,
            DependencyEdge {
                id,
                listener: listener.clone(),
                source: source.clone(),
            },
        );
        id
    }

    pub(crate) fn retract_dependency(&self, id: DependencyId) -> bool {
        self.state.borrow_mut().edges.remove(&id).is_some()
    }

    /// Live dependency edges, oldest first.
    pub fn dependencies(&self) -> Vec<DependencyEdge> {
        self.state.borrow().edges.values().cloned().collect()
    }
}

/// Handle for one subscription; dropping it unsubscribes.
#[must_use = "dropping a Subscription unsubscribes immediately"]
pub struct Subscription {
    bus: Weak<RefCell<BusState>>,
    id: SubscriptionId,
    active: bool,
}

impl Subscription {
    pub fn id(&self) -> SubscriptionId {
        self.id
    }

    pub fn unsubscribe(mut self) {
        self.release();
    }

    fn release(&mut self) {
        if !std::mem::take(&mut self.active) {
            return;
        }
        let Some(state) = self.bus.upgrade() else {
            return;
        };
        let removed = {
            let mut state = state.borrow_mut();
            let position = state.entries.iter().position(|entry| entry.id == self.id);
            position.map(|index| state.entries.remove(index))
        };
        // The handler may own captures whose drop touches the bus again.
        drop(removed);
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.release();
    }
}

impl std::fmt::Debug for Subscription {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Subscription")
            .field("id", &self.id)
            .field("active", &self.active)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;

    fn message(key: &str) -> UpdateMessage {
        UpdateMessage::confirmed(WidgetKey::from(key), serde_json::json!("x"), true)
    }

    #[test]
    fn publication_bubbles_from_origin_scope_to_root() {
        let bus = UpdateBus::new();
        let panel = bus.new_scope(ScopeId::ROOT);
        let sibling = bus.new_scope(ScopeId::ROOT);
        let order = Rc::new(RefCell::new(Vec::new()));

        let log = order.clone();
        let _root = bus.subscribe(ScopeId::ROOT, KeyFilter::Any, move |_| log.borrow_mut().push("root"));
        let log = order.clone();
        let _panel = bus.subscribe(panel, KeyFilter::Any, move |_| log.borrow_mut().push("panel"));
        let log = order.clone();
        let _sibling = bus.subscribe(sibling, KeyFilter::Any, move |_| log.borrow_mut().push("sibling"));

        assert_eq!(bus.publish(panel, &message("name")), 2);
        assert_eq!(*order.borrow(), vec!["panel", "root"]);
    }

    #[test]
    fn key_filter_selects_topic() {
        let bus = UpdateBus::new();
        let hits = Rc::new(Cell::new(0));
        let counter = hits.clone();
        let _sub = bus.subscribe(ScopeId::ROOT, KeyFilter::Key("a".into()), move |_| counter.set(counter.get() + 1));

        bus.publish(ScopeId::ROOT, &message("b"));
        bus.publish(ScopeId::ROOT, &message("a"));
        assert_eq!(hits.get(), 1);
    }

    #[test]
    fn dropping_the_handle_unsubscribes() {
        let bus = UpdateBus::new();
        let sub = bus.subscribe(ScopeId::ROOT, KeyFilter::Any, |_| {});
        assert_eq!(bus.subscription_count(), 1);
        drop(sub);
        assert_eq!(bus.subscription_count(), 0);
    }

    #[test]
    fn handler_retracted_mid_publication_does_not_run() {
        let bus = UpdateBus::new();
        let victim: Rc<RefCell<Option<Subscription>>> = Rc::new(RefCell::new(None));
        let ran = Rc::new(Cell::new(false));

        let slot = victim.clone();
        let _first = bus.subscribe(ScopeId::ROOT, KeyFilter::Any, move |_| {
            slot.borrow_mut().take();
        });
        let flag = ran.clone();
        *victim.borrow_mut() = Some(bus.subscribe(ScopeId::ROOT, KeyFilter::Any, move |_| flag.set(true)));

        assert_eq!(bus.publish(ScopeId::ROOT, &message("x")), 1);
        assert!(!ran.get());
    }

    #[test]
    fn handlers_may_publish_reentrantly() {
        let bus = UpdateBus::new();
        let seen = Rc::new(RefCell::new(Vec::new()));

        let inner_bus = bus.clone();
        let _relay = bus.subscribe(ScopeId::ROOT, KeyFilter::Key("a".into()), move |_| {
            inner_bus.publish(ScopeId::ROOT, &message("b"));
        });
        let log = seen.clone();
        let _sink = bus.subscribe(ScopeId::ROOT, KeyFilter::Any, move |m| log.borrow_mut().push(m.key.to_string()));

        bus.publish(ScopeId::ROOT, &message("a"));
        assert_eq!(*seen.borrow(), vec!["b".to_string(), "a".to_string()]);
    }
}
