#![forbid(unsafe_code)]

//! Observable value holder with `(new, old)` change notification.
//!
//! # Design
//!
//! [`ValueCell<T>`] keeps its value in shared, reference-counted storage
//! (`Rc<RefCell<..>>`). When a write changes the value (by `PartialEq`), every
//! live subscriber is called with `(new, old)` in registration order before
//! the write returns.
//!
//! # Performance
//!
//! | Operation     | Complexity                 |
//! |---------------|----------------------------|
//! | `get()`       | O(1) + clone               |
//! | `set()`       | O(S) where S = subscribers |
//! | `subscribe()` | O(1) amortized             |
//!
//! # Failure Modes
//!
//! - **Re-entrant set**: the value borrow is released before subscribers run,
//!   so a subscriber may write the cell again. The nested write notifies
//!   before the outer notification finishes; ordering across the two is not
//!   guaranteed beyond that.
//! - **Panicking subscriber**: the value is already swapped; subscribers after
//!   the panicking one are not called for that write.

use std::cell::RefCell;
use std::fmt;
use std::rc::Rc;

use crate::callback::{Callback, SubscriberList, Subscribable, Subscription};

struct CellInner<T> {
    value: T,
    version: u64,
}

/// A shared value with change notification.
///
/// Cloning a `ValueCell` creates a new handle to the **same** state: both
/// handles see the same value and share subscribers.
///
/// # Invariants
///
/// 1. `set(v)` where `v == current` is a no-op.
/// 2. Subscribers are notified in registration order with `(new, old)`.
/// 3. `version` increments by exactly 1 on each value-changing write.
pub struct ValueCell<T> {
    inner: Rc<RefCell<CellInner<T>>>,
    subscribers: Rc<SubscriberList<T>>,
}

impl<T> Clone for ValueCell<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Rc::clone(&self.inner),
            subscribers: Rc::clone(&self.subscribers),
        }
    }
}

impl<T: fmt::Debug + 'static> fmt::Debug for ValueCell<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let inner = self.inner.borrow();
        f.debug_struct("ValueCell")
            .field("value", &inner.value)
            .field("version", &inner.version)
            .field("subscriber_count", &self.subscribers.len())
            .finish()
    }
}

impl<T: Clone + PartialEq + 'static> ValueCell<T> {
    #[must_use]
    pub fn new(value: T) -> Self {
        Self {
            inner: Rc::new(RefCell::new(CellInner { value, version: 0 })),
            subscribers: SubscriberList::new(),
        }
    }

    /// Get a clone of the current value.
    #[must_use]
    pub fn get(&self) -> T {
        self.inner.borrow().value.clone()
    }

    /// Access the current value by reference without cloning.
    pub fn with<R>(&self, f: impl FnOnce(&T) -> R) -> R {
        f(&self.inner.borrow().value)
    }

    /// Replace the value, notifying subscribers if it changed.
    pub fn set(&self, value: T) {
        let old = {
            let mut inner = self.inner.borrow_mut();
            if inner.value == value {
                return;
            }
            inner.version += 1;
            std::mem::replace(&mut inner.value, value)
        };
        let new = self.get();
        self.subscribers.notify(&new, &old);
    }

    /// Modify the value in place. Subscribers are notified if the result
    /// differs from the value before `f` ran.
    pub fn update(&self, f: impl FnOnce(&mut T)) {
        let old = {
            let mut inner = self.inner.borrow_mut();
            let old = inner.value.clone();
            f(&mut inner.value);
            if inner.value == old {
                return;
            }
            inner.version += 1;
            old
        };
        let new = self.get();
        self.subscribers.notify(&new, &old);
    }

    /// Subscribe to changes. The callback receives `(new, old)`.
    pub fn subscribe(&self, callback: impl Fn(&T, &T) + 'static) -> Subscription {
        self.subscribers.add(Callback::new(callback))
    }

    /// Number of value-changing writes so far.
    #[must_use]
    pub fn version(&self) -> u64 {
        self.inner.borrow().version
    }

    #[must_use]
    pub fn subscriber_count(&self) -> usize {
        self.subscribers.len()
    }
}

impl<T: Clone + PartialEq + 'static> Subscribable for ValueCell<T> {
    type Output = T;

    fn current(&self) -> T {
        self.get()
    }

    fn watch(&self, callback: Callback<T>) -> Subscription {
        self.subscribers.add(callback)
    }
}
