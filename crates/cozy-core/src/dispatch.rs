#![forbid(unsafe_code)]

//! Notification dispatch: immediate delivery or a FIFO microtask queue.
//!
//! The queue is thread-local and drained explicitly by the host at the end of
//! its synchronous turn ([`drain`] or [`turn`]). Tasks queued while draining
//! run in the same drain, after everything queued before them.
//!
//! [`Notifier`] is the delivery point facades write into. Each registration
//! records the dispatch mode chosen when its callback was observed; deferred
//! registrations are resolved when the queued task runs, so a callback removed
//! before the drain is never invoked.

use std::cell::RefCell;
use std::collections::VecDeque;
use std::rc::Rc;

use serde_json::Value;

use crate::callback::Callback;

type Microtask = Box<dyn FnOnce()>;

thread_local! {
    static QUEUE: RefCell<VecDeque<Microtask>> = RefCell::new(VecDeque::new());
}

/// How a notification reaches its callback.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Dispatch {
    /// In-line with the mutation, before the write returns.
    #[default]
    Immediate,
    /// Queued as a microtask.
    Deferred,
}

impl Dispatch {
    #[must_use]
    pub const fn from_async(is_async: bool) -> Self {
        if is_async {
            Self::Deferred
        } else {
            Self::Immediate
        }
    }

    #[must_use]
    pub const fn is_deferred(self) -> bool {
        matches!(self, Self::Deferred)
    }
}

/// Queue `task` behind every microtask already pending.
pub fn queue_microtask(task: impl FnOnce() + 'static) {
    QUEUE.with(|q| q.borrow_mut().push_back(Box::new(task)));
}

/// Number of queued microtasks.
#[must_use]
pub fn pending() -> usize {
    QUEUE.with(|q| q.borrow().len())
}

/// Run queued microtasks until the queue is empty. Returns how many ran.
///
/// If a task panics, the tasks behind it stay queued.
pub fn drain() -> usize {
    let mut ran = 0;
    loop {
        let Some(task) = QUEUE.with(|q| q.borrow_mut().pop_front()) else {
            break;
        };
        task();
        ran += 1;
    }
    if ran > 0 {
        tracing::trace!(message = "dispatch.drain", ran);
    }
    ran
}

/// Run `f` as one synchronous execution unit, then drain the microtask queue.
pub fn turn<R>(f: impl FnOnce() -> R) -> R {
    let result = f();
    drain();
    result
}

#[derive(Clone)]
struct Registration {
    callback: Callback,
    mode: Dispatch,
}

/// Callback set attached to a facade.
#[derive(Default)]
pub(crate) struct Notifier {
    registrations: RefCell<Vec<Registration>>,
}

impl Notifier {
    pub(crate) fn new() -> Rc<Self> {
        Rc::new(Self::default())
    }

    pub(crate) fn with_callback(callback: Callback, mode: Dispatch) -> Rc<Self> {
        let notifier = Self::new();
        notifier.push(callback, mode);
        notifier
    }

    /// Add `callback`; a callback already present keeps its original mode.
    pub(crate) fn push(&self, callback: Callback, mode: Dispatch) {
        let mut regs = self.registrations.borrow_mut();
        if regs.iter().any(|r| r.callback == callback) {
            return;
        }
        regs.push(Registration { callback, mode });
    }

    pub(crate) fn remove(&self, callback: &Callback) -> bool {
        let mut regs = self.registrations.borrow_mut();
        let before = regs.len();
        regs.retain(|r| r.callback != *callback);
        regs.len() != before
    }

    pub(crate) fn clear(&self) {
        self.registrations.borrow_mut().clear();
    }

    pub(crate) fn len(&self) -> usize {
        self.registrations.borrow().len()
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Deliver `(new, old)` to every registration.
    ///
    /// Deferred registrations are queued before any immediate callback runs.
    pub(crate) fn emit(self: &Rc<Self>, new: &Value, old: &Value) {
        let regs: Vec<Registration> = self.registrations.borrow().clone();
        if regs.iter().any(|r| r.mode.is_deferred()) {
            let notifier = Rc::clone(self);
            let (new, old) = (new.clone(), old.clone());
            tracing::trace!(message = "dispatch.enqueue");
            queue_microtask(move || notifier.deliver(Dispatch::Deferred, &new, &old));
        }
        for reg in regs.iter().filter(|r| r.mode == Dispatch::Immediate) {
            reg.callback.call(new, old);
        }
    }

    fn deliver(&self, mode: Dispatch, new: &Value, old: &Value) {
        let regs: Vec<Registration> = self.registrations.borrow().clone();
        for reg in regs.iter().filter(|r| r.mode == mode) {
            reg.callback.call(new, old);
        }
    }
}
