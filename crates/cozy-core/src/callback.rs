#![forbid(unsafe_code)]

//! Callback and subscription plumbing shared by every observable kind.
//!
//! # Design
//!
//! A [`Callback`] is a reference-counted `(new, old)` closure with identity:
//! clones compare equal, separately constructed callbacks never do. The
//! registry uses that identity to remove one specific callback from a facade.
//!
//! [`SubscriberList`] is the ordered subscriber set behind the cells. Each
//! registration carries a liveness flag, so a callback removed while a
//! notification is in flight is skipped for the rest of that notification.
//! The list is never borrowed while a callback runs.

use std::cell::{Cell, RefCell};
use std::fmt;
use std::rc::{Rc, Weak};

use serde_json::Value;

/// A change callback invoked with `(new, old)`.
pub struct Callback<T = Value> {
    f: Rc<dyn Fn(&T, &T)>,
}

impl<T> Callback<T> {
    pub fn new(f: impl Fn(&T, &T) + 'static) -> Self {
        Self { f: Rc::new(f) }
    }

    #[inline]
    pub fn call(&self, new: &T, old: &T) {
        (self.f)(new, old);
    }

    /// Whether both handles refer to the same callback.
    #[must_use]
    pub fn ptr_eq(&self, other: &Self) -> bool {
        Rc::ptr_eq(&self.f, &other.f)
    }
}

impl<T> Clone for Callback<T> {
    fn clone(&self) -> Self {
        Self {
            f: Rc::clone(&self.f),
        }
    }
}

impl<T> PartialEq for Callback<T> {
    fn eq(&self, other: &Self) -> bool {
        self.ptr_eq(other)
    }
}

impl<T> Eq for Callback<T> {}

impl<T> fmt::Debug for Callback<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Callback")
            .field("addr", &Rc::as_ptr(&self.f).cast::<()>())
            .finish()
    }
}

struct Registration<T> {
    id: u64,
    live: Rc<Cell<bool>>,
    callback: Callback<T>,
}

impl<T> Clone for Registration<T> {
    fn clone(&self) -> Self {
        Self {
            id: self.id,
            live: Rc::clone(&self.live),
            callback: self.callback.clone(),
        }
    }
}

/// Ordered set of subscribers.
pub(crate) struct SubscriberList<T> {
    next_id: Cell<u64>,
    entries: RefCell<Vec<Registration<T>>>,
}

impl<T: 'static> SubscriberList<T> {
    pub(crate) fn new() -> Rc<Self> {
        Rc::new(Self {
            next_id: Cell::new(0),
            entries: RefCell::new(Vec::new()),
        })
    }

    /// Register `callback` and hand back the guard that removes it.
    pub(crate) fn add(self: &Rc<Self>, callback: Callback<T>) -> Subscription {
        let id = self.next_id.get();
        self.next_id.set(id + 1);
        self.entries.borrow_mut().push(Registration {
            id,
            live: Rc::new(Cell::new(true)),
            callback,
        });
        let list: Weak<Self> = Rc::downgrade(self);
        Subscription::new(move || {
            if let Some(list) = list.upgrade() {
                list.remove(id);
            }
        })
    }

    fn remove(&self, id: u64) -> bool {
        let mut entries = self.entries.borrow_mut();
        let Some(pos) = entries.iter().position(|r| r.id == id) else {
            return false;
        };
        let reg = entries.remove(pos);
        reg.live.set(false);
        true
    }

    pub(crate) fn len(&self) -> usize {
        self.entries.borrow().len()
    }

    /// Invoke every live subscriber in registration order.
    ///
    /// A panicking subscriber aborts the remaining deliveries of this call.
    pub(crate) fn notify(&self, new: &T, old: &T) {
        let snapshot: Vec<Registration<T>> = self.entries.borrow().clone();
        for reg in &snapshot {
            if reg.live.get() {
                reg.callback.call(new, old);
            }
        }
    }
}

/// Guard for a registered callback.
///
/// Dropping the guard, or calling [`unsubscribe`](Subscription::unsubscribe),
/// removes exactly the callback it was issued for. Both are idempotent.
/// [`detach`](Subscription::detach) keeps the callback registered for the
/// lifetime of its source instead.
#[must_use = "dropping a Subscription unsubscribes immediately"]
pub struct Subscription {
    cancel: Cell<Option<Box<dyn FnOnce()>>>,
}

impl Subscription {
    pub(crate) fn new(cancel: impl FnOnce() + 'static) -> Self {
        Self {
            cancel: Cell::new(Some(Box::new(cancel))),
        }
    }

    /// Remove the callback. Later calls are no-ops.
    pub fn unsubscribe(&self) {
        if let Some(cancel) = self.cancel.take() {
            cancel();
        }
    }

    /// Whether the callback is still registered through this guard.
    #[must_use]
    pub fn is_active(&self) -> bool {
        let cancel = self.cancel.take();
        let active = cancel.is_some();
        self.cancel.set(cancel);
        active
    }

    /// Give up the ability to unsubscribe; the callback stays registered.
    pub fn detach(self) {
        drop(self.cancel.take());
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.unsubscribe();
    }
}

impl fmt::Debug for Subscription {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Subscription")
            .field("active", &self.is_active())
            .finish()
    }
}

/// The `{get, subscribe}` contract consumed by binding adapters.
pub trait Subscribable {
    type Output: Clone + 'static;

    /// Current value, without side effects.
    fn current(&self) -> Self::Output;

    /// Register `callback` for change notifications.
    fn watch(&self, callback: Callback<Self::Output>) -> Subscription;
}
