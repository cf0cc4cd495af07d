#![forbid(unsafe_code)]

//! Bindings from observable values to a host component's lifecycle.
//!
//! A [`Binding`] takes anything that implements [`Subscribable`] (the
//! `{get, subscribe}` contract) and keeps a local copy of its current value.
//! The host calls [`mount`](Binding::mount) when its component appears and
//! [`unmount`](Binding::unmount) when it goes away; between the two, every
//! change re-reads the source and raises a flag the host polls with
//! [`take_changed`](Binding::take_changed) to decide whether to re-render.
//!
//! The binding always re-reads `current()` instead of trusting the
//! notification payload. Deep object notifications carry only the enclosing
//! node, not the whole graph.
//!
//! # Example
//!
//! ```
//! use cozy_bindings::ValueBinding;
//! use cozy_core::ValueCell;
//!
//! let count = ValueCell::new(0);
//! let mut binding = ValueBinding::new(count.clone());
//! binding.mount();
//!
//! count.set(3);
//! assert!(binding.take_changed());
//! assert_eq!(binding.current(), 3);
//! ```

use std::cell::{Cell, RefCell};
use std::fmt;
use std::rc::Rc;

use cozy_core::{AsyncCell, Callback, DerivedCell, Object, Subscribable, Subscription, ValueCell};

/// Binding to a [`ValueCell`].
pub type ValueBinding<T> = Binding<ValueCell<T>>;
/// Binding to a [`DerivedCell`].
pub type DerivedBinding<T> = Binding<DerivedCell<T>>;
/// Binding to an [`AsyncCell`]; the current value is `None` until settled.
pub type AsyncBinding<T> = Binding<AsyncCell<T>>;
/// Binding to a deeply observed [`Object`]; the current value is a snapshot
/// of the whole graph.
pub type DeepBinding = Binding<Object>;

struct Shared<T> {
    value: RefCell<T>,
    changed: Cell<bool>,
    notifications: Cell<u64>,
}

/// Local mirror of a [`Subscribable`] source, tied to a mount lifecycle.
pub struct Binding<S: Subscribable> {
    source: S,
    shared: Rc<Shared<S::Output>>,
    subscription: Option<Subscription>,
}

impl<S> Binding<S>
where
    S: Subscribable + Clone + 'static,
    S::Output: PartialEq,
{
    /// Capture the source's current value. Nothing is subscribed until
    /// [`mount`](Self::mount).
    pub fn new(source: S) -> Self {
        let value = source.current();
        Self {
            source,
            shared: Rc::new(Shared {
                value: RefCell::new(value),
                changed: Cell::new(false),
                notifications: Cell::new(0),
            }),
            subscription: None,
        }
    }

    /// Start tracking the source. Mounting twice is a no-op.
    ///
    /// A change made while unmounted is picked up here and reported by the
    /// next [`take_changed`](Self::take_changed).
    pub fn mount(&mut self) {
        if self.is_mounted() {
            return;
        }
        refresh(&self.source, &self.shared);

        let source = self.source.clone();
        let shared = Rc::clone(&self.shared);
        let callback = Callback::new(move |_: &S::Output, _: &S::Output| {
            shared.notifications.set(shared.notifications.get() + 1);
            refresh(&source, &shared);
        });
        self.subscription = Some(self.source.watch(callback));
        tracing::trace!(message = "binding.mount");
    }

    /// Stop tracking the source. The last seen value is kept.
    pub fn unmount(&mut self) {
        if let Some(subscription) = self.subscription.take() {
            subscription.unsubscribe();
            tracing::trace!(message = "binding.unmount");
        }
    }

    #[must_use]
    pub fn is_mounted(&self) -> bool {
        self.subscription.as_ref().is_some_and(Subscription::is_active)
    }

    /// The most recently observed value.
    #[must_use]
    pub fn current(&self) -> S::Output {
        self.shared.value.borrow().clone()
    }

    /// Whether the value changed since the last call; clears the flag.
    pub fn take_changed(&self) -> bool {
        self.shared.changed.replace(false)
    }

    /// Notifications received while mounted, including ones that left the
    /// value unchanged.
    #[must_use]
    pub fn notification_count(&self) -> u64 {
        self.shared.notifications.get()
    }

    #[must_use]
    pub fn source(&self) -> &S {
        &self.source
    }

    /// Switch to a different source, re-subscribing if mounted.
    pub fn set_source(&mut self, source: S) {
        let was_mounted = self.is_mounted();
        self.unmount();
        self.source = source;
        refresh(&self.source, &self.shared);
        if was_mounted {
            self.mount();
        }
    }
}

fn refresh<S>(source: &S, shared: &Shared<S::Output>)
where
    S: Subscribable,
    S::Output: PartialEq,
{
    let next = source.current();
    let mut value = shared.value.borrow_mut();
    if *value != next {
        *value = next;
        shared.changed.set(true);
    }
}

impl<S> fmt::Debug for Binding<S>
where
    S: Subscribable,
    S::Output: fmt::Debug,
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Binding")
            .field("value", &self.shared.value.borrow())
            .field("changed", &self.shared.changed.get())
            .field("mounted", &self.subscription.is_some())
            .finish()
    }
}
