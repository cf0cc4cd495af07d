#![forbid(unsafe_code)]

//! Caller-driven derived values.
//!
//! # Design
//!
//! [`DerivedCell<T>`] wraps a zero-argument compute function and caches its
//! result in an inner [`ValueCell`]. The function runs once at construction
//! and again on every [`update()`](DerivedCell::update); the fresh result goes
//! through `ValueCell::set`, so subscribers only hear about results that
//! differ from the cache.
//!
//! There is no dependency tracking. Whoever changes an input the compute
//! function reads is responsible for calling `update()`.
//!
//! # Invariants
//!
//! 1. `get()` returns the result of the most recent compute call.
//! 2. `get()` never runs the compute function.
//! 3. `update()` with an unchanged result notifies nobody.
//!
//! # Failure Modes
//!
//! - **Compute function panics**: the cache keeps the previous result and no
//!   subscriber is called.

use std::fmt;
use std::rc::Rc;

use crate::callback::{Callback, Subscribable, Subscription};
use crate::reactive::cell::ValueCell;

/// A cached value recomputed on demand.
///
/// Cloning a `DerivedCell` creates a new handle to the **same** state.
pub struct DerivedCell<T> {
    compute: Rc<dyn Fn() -> T>,
    cache: ValueCell<T>,
}

impl<T> Clone for DerivedCell<T> {
    fn clone(&self) -> Self {
        Self {
            compute: Rc::clone(&self.compute),
            cache: self.cache.clone(),
        }
    }
}

impl<T: fmt::Debug + 'static> fmt::Debug for DerivedCell<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DerivedCell")
            .field("cache", &self.cache)
            .finish_non_exhaustive()
    }
}

impl<T: Clone + PartialEq + 'static> DerivedCell<T> {
    /// Create a derived value, evaluating `compute` once to seed the cache.
    pub fn new(compute: impl Fn() -> T + 'static) -> Self {
        let seed = compute();
        Self {
            compute: Rc::new(compute),
            cache: ValueCell::new(seed),
        }
    }

    /// The cached result.
    #[must_use]
    pub fn get(&self) -> T {
        self.cache.get()
    }

    /// Access the cached result by reference without cloning.
    pub fn with<R>(&self, f: impl FnOnce(&T) -> R) -> R {
        self.cache.with(f)
    }

    /// Re-run the compute function and notify subscribers if the result
    /// differs from the cache.
    pub fn update(&self) {
        let next = (self.compute)();
        self.cache.set(next);
    }

    /// Subscribe to changes of the cached result.
    pub fn subscribe(&self, callback: impl Fn(&T, &T) + 'static) -> Subscription {
        self.cache.subscribe(callback)
    }

    /// Number of updates that changed the cached result.
    #[must_use]
    pub fn version(&self) -> u64 {
        self.cache.version()
    }
}

impl<T: Clone + PartialEq + 'static> Subscribable for DerivedCell<T> {
    type Output = T;

    fn current(&self) -> T {
        self.get()
    }

    fn watch(&self, callback: Callback<T>) -> Subscription {
        self.cache.watch(callback)
    }
}
