//! Single-threaded timers driven by the host loop.
//!
//! Nothing here sleeps. The host asks for [`TimerQueue::next_deadline`],
//! waits however it likes, then calls [`TimerQueue::fire_due`].

use std::cell::{Cell, RefCell};
use std::rc::Rc;
use std::time::Duration;

use tokio::time::Instant;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TimerId(u64);

struct Timer {
    id: TimerId,
    deadline: Instant,
    callback: Box<dyn FnOnce()>,
}

#[derive(Default)]
struct TimerState {
    timers: Vec<Timer>,
    next_id: u64,
}

/// Cheap-to-clone handle on the form session's timer queue.
#[derive(Clone, Default)]
pub struct TimerQueue {
    state: Rc<RefCell<TimerState>>,
}

impl TimerQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn schedule(&self, delay: Duration, callback: impl FnOnce() + 'static) -> TimerId {
        self.schedule_at(Instant::now() + delay, callback)
    }

    pub fn schedule_at(&self, deadline: Instant, callback: impl FnOnce() + 'static) -> TimerId {
        let mut state = self.state.borrow_mut();
        let id = TimerId(state.next_id);
        state.next_id += 1;
        state.timers.push(Timer {
            id,
            deadline,
            callback: Box::new(callback),
        });
        id
    }

    /// Returns whether the timer was still pending.
    pub fn cancel(&self, id: TimerId) -> bool {
        let removed = {
            let mut state = self.state.borrow_mut();
            let position = state.timers.iter().position(|timer| timer.id == id);
            position.map(|index| state.timers.remove(index))
        };
        removed.is_some()
    }

    pub fn is_pending(&self, id: TimerId) -> bool {
        self.state.borrow().timers.iter().any(|timer| timer.id == id)
    }

    pub fn next_deadline(&self) -> Option<Instant> {
        self.state.borrow().timers.iter().map(|timer| timer.deadline).min()
    }

    pub fn len(&self) -> usize {
        self.state.borrow().timers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.state.borrow().timers.is_empty()
    }

    /// Runs every timer due at `now`, earliest first. Callbacks run with the
    /// queue unborrowed and may schedule or cancel timers.
    pub fn fire_due(&self, now: Instant) -> usize {
        let mut fired = 0;
        loop {
            let next = {
                let mut state = self.state.borrow_mut();
                let due = state
                    .timers
                    .iter()
                    .enumerate()
                    .filter(|(_, timer)| timer.deadline <= now)
                    .min_by_key(|(_, timer)| (timer.deadline, timer.id))
                    .map(|(index, _)| index);
                due.map(|index| state.timers.remove(index))
            };
            let Some(timer) = next else {
                break;
            };
            (timer.callback)();
            fired += 1;
        }
        fired
    }
}

/// Cancel-and-reschedule wrapper: at most one pending call.
pub struct Debouncer {
    queue: TimerQueue,
    delay: Duration,
    pending: Rc<Cell<Option<TimerId>>>,
}

impl Debouncer {
    pub fn new(queue: TimerQueue, delay: Duration) -> Self {
        Self {
            queue,
            delay,
            pending: Rc::new(Cell::new(None)),
        }
    }

    pub fn delay(&self) -> Duration {
        self.delay
    }

    /// Schedules `f` after the quiet period, replacing any pending call.
    pub fn call(&self, f: impl FnOnce() + 'static) {
        self.cancel();
        let pending = self.pending.clone();
        let id = self.queue.schedule(self.delay, move || {
            pending.set(None);
            f();
        });
        self.pending.set(Some(id));
    }

    pub fn cancel(&self) {
        if let Some(id) = self.pending.take() {
            self.queue.cancel(id);
        }
    }

    pub fn is_pending(&self) -> bool {
        self.pending.get().is_some()
    }
}

impl Drop for Debouncer {
    fn drop(&mut self) {
        self.cancel();
    }
}
