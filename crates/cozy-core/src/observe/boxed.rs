#![forbid(unsafe_code)]

//! Boxed primitives: an observable `{value, id}` record around a scalar.
//!
//! A primitive has no identity to intercept, so the registry boxes it into a
//! fresh [`BoxedPrimitive`] on every observation. Like an object node, a box
//! carries one notifier per registry observing it. The box holds `None` once
//! the last of them is torn down; writes to a torn-down box are stored but
//! reach nobody.

use std::cell::RefCell;
use std::fmt;
use std::rc::Rc;
use std::sync::atomic::{AtomicU64, Ordering};

use serde_json::Value;

use crate::dispatch::Notifier;

static NEXT_BOX_ID: AtomicU64 = AtomicU64::new(1);

/// Opaque unique token of a [`BoxedPrimitive`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct BoxId(u64);

impl BoxId {
    fn next() -> Self {
        Self(NEXT_BOX_ID.fetch_add(1, Ordering::Relaxed))
    }

    #[must_use]
    pub const fn raw(self) -> u64 {
        self.0
    }
}

struct BoxInner {
    id: BoxId,
    value: RefCell<Option<Value>>,
    notifiers: RefCell<Vec<Rc<Notifier>>>,
}

/// Facade over a single primitive value.
///
/// Cloning a `BoxedPrimitive` creates another handle to the **same** box.
#[derive(Clone)]
pub struct BoxedPrimitive {
    inner: Rc<BoxInner>,
}

impl BoxedPrimitive {
    pub(crate) fn new(value: Value) -> Self {
        Self {
            inner: Rc::new(BoxInner {
                id: BoxId::next(),
                value: RefCell::new(Some(value)),
                notifiers: RefCell::new(Vec::new()),
            }),
        }
    }

    #[must_use]
    pub fn id(&self) -> BoxId {
        self.inner.id
    }

    /// Current value; `None` after the box was torn down and not written since.
    #[must_use]
    pub fn get(&self) -> Option<Value> {
        self.inner.value.borrow().clone()
    }

    /// Write a new value. Returns whether it differed from the current one.
    ///
    /// Callbacks receive `(new, old)`; an unset old value is reported as
    /// `null`.
    pub fn set(&self, value: impl Into<Value>) -> bool {
        let value = value.into();
        let old = {
            let mut slot = self.inner.value.borrow_mut();
            if slot.as_ref() == Some(&value) {
                return false;
            }
            slot.replace(value.clone())
        };
        let old = old.unwrap_or(Value::Null);
        let notifiers: Vec<Rc<Notifier>> = self.inner.notifiers.borrow().clone();
        for notifier in notifiers.iter().filter(|n| !n.is_empty()) {
            notifier.emit(&value, &old);
        }
        true
    }

    /// Whether the box was cleared by teardown.
    #[must_use]
    pub fn is_unset(&self) -> bool {
        self.inner.value.borrow().is_none()
    }

    /// Whether both handles refer to the same box.
    #[must_use]
    pub fn ptr_eq(&self, other: &Self) -> bool {
        Rc::ptr_eq(&self.inner, &other.inner)
    }

    pub(crate) fn attach(&self, notifier: Rc<Notifier>) {
        let mut notifiers = self.inner.notifiers.borrow_mut();
        if !notifiers.iter().any(|n| Rc::ptr_eq(n, &notifier)) {
            notifiers.push(notifier);
        }
    }

    /// Remove `notifier`; returns whether any notifier is still attached.
    pub(crate) fn detach(&self, notifier: &Rc<Notifier>) -> bool {
        let mut notifiers = self.inner.notifiers.borrow_mut();
        notifiers.retain(|n| !Rc::ptr_eq(n, notifier));
        !notifiers.is_empty()
    }

    /// Number of registries currently observing this box.
    #[must_use]
    pub fn notifier_count(&self) -> usize {
        self.inner.notifiers.borrow().len()
    }

    pub(crate) fn holds(&self, value: &Value) -> bool {
        self.inner.value.borrow().as_ref() == Some(value)
    }

    pub(crate) fn clear_value(&self) {
        self.inner.value.borrow_mut().take();
    }
}

impl fmt::Debug for BoxedPrimitive {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BoxedPrimitive")
            .field("id", &self.inner.id)
            .field("value", &self.inner.value.borrow())
            .finish()
    }
}
