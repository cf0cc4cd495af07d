#![forbid(unsafe_code)]

//! Values that settle once from a pending computation.
//!
//! # Design
//!
//! [`AsyncCell<T>`] holds a `ValueCell<Option<T>>` that starts unset (`None`).
//! Constructing one yields a [`Settle`] future alongside it; driving that
//! future to completion awaits the wrapped computation and writes `Some(v)`
//! into the cell exactly once. [`AsyncCell::spawn_local`] hands the driver to
//! a `futures` local spawner.
//!
//! [`await_value()`](AsyncCell::await_value) is broadcast: every waiter gets
//! its own subscription, resolves on the first settled value, and drops that
//! subscription immediately.
//!
//! # Failure Modes
//!
//! - **Never settles**: waiters never resolve. No timeout is applied here.
//! - **Driver dropped**: same as never settling; waiters stay pending until
//!   the cell itself is dropped, at which point they resolve to `None`.

use std::cell::RefCell;
use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::rc::Rc;
use std::task::{Context, Poll};

use futures::channel::oneshot;
use futures::future::LocalBoxFuture;
use futures::task::{LocalSpawn, LocalSpawnExt};

use crate::callback::{Callback, Subscribable, Subscription};
use crate::error::Result;
use crate::reactive::cell::ValueCell;

/// A value produced by an asynchronous computation.
///
/// Cloning an `AsyncCell` creates a new handle to the **same** state.
pub struct AsyncCell<T> {
    cell: ValueCell<Option<T>>,
}

impl<T> Clone for AsyncCell<T> {
    fn clone(&self) -> Self {
        Self {
            cell: self.cell.clone(),
        }
    }
}

impl<T: fmt::Debug + 'static> fmt::Debug for AsyncCell<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AsyncCell").field("cell", &self.cell).finish()
    }
}

/// Driver future that settles an [`AsyncCell`].
#[must_use = "the cell only settles when this future is driven"]
pub struct Settle {
    inner: LocalBoxFuture<'static, ()>,
}

impl Future for Settle {
    type Output = ();

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<()> {
        self.inner.as_mut().poll(cx)
    }
}

impl fmt::Debug for Settle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Settle").finish_non_exhaustive()
    }
}

impl<T: Clone + PartialEq + 'static> AsyncCell<T> {
    /// Wrap `pending`, returning the unset cell and the future that settles it.
    pub fn new(pending: impl Future<Output = T> + 'static) -> (Self, Settle) {
        let cell = ValueCell::new(None);
        let target = cell.clone();
        let inner = Box::pin(async move {
            let value = pending.await;
            if target.with(Option::is_some) {
                tracing::debug!(message = "async_cell.settle_ignored");
                return;
            }
            tracing::trace!(message = "async_cell.settle");
            target.set(Some(value));
        });
        (Self { cell }, Settle { inner })
    }

    /// Wrap `pending` and spawn its driver on `spawner`.
    pub fn spawn_local<S>(spawner: &S, pending: impl Future<Output = T> + 'static) -> Result<Self>
    where
        S: LocalSpawn + ?Sized,
    {
        let (cell, settle) = Self::new(pending);
        spawner.spawn_local(settle)?;
        Ok(cell)
    }

    /// The settled value, or `None` while pending.
    #[must_use]
    pub fn get(&self) -> Option<T> {
        self.cell.get()
    }

    #[must_use]
    pub fn is_settled(&self) -> bool {
        self.cell.with(Option::is_some)
    }

    /// Subscribe to the unset→settled transition.
    pub fn subscribe(&self, callback: impl Fn(&Option<T>, &Option<T>) + 'static) -> Subscription {
        self.cell.subscribe(callback)
    }

    /// Wait for the first settled value.
    ///
    /// Resolves immediately when the cell has already settled. Resolves to
    /// `None` only if the cell is dropped before settling.
    pub fn await_value(&self) -> impl Future<Output = Option<T>> + 'static {
        let (tx, rx) = oneshot::channel::<T>();
        let guard: Rc<RefCell<Option<Subscription>>> = Rc::new(RefCell::new(None));

        match self.cell.get() {
            Some(value) => {
                let _ = tx.send(value);
            }
            None => {
                let tx = RefCell::new(Some(tx));
                let weak_guard = Rc::downgrade(&guard);
                let sub = self.cell.subscribe(move |new: &Option<T>, _| {
                    let Some(value) = new else {
                        return;
                    };
                    if let Some(tx) = tx.borrow_mut().take() {
                        let _ = tx.send(value.clone());
                    }
                    let finished = weak_guard.upgrade().and_then(|g| g.borrow_mut().take());
                    if let Some(sub) = finished {
                        sub.unsubscribe();
                    }
                });
                *guard.borrow_mut() = Some(sub);
            }
        }

        async move {
            let result = rx.await.ok();
            drop(guard);
            result
        }
    }
}

impl<T: Clone + PartialEq + 'static> Subscribable for AsyncCell<T> {
    type Output = Option<T>;

    fn current(&self) -> Option<T> {
        self.get()
    }

    fn watch(&self, callback: Callback<Option<T>>) -> Subscription {
        self.cell.watch(callback)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::executor::LocalPool;
    use std::cell::Cell;

    #[test]
    fn starts_unset_and_settles_once_driven() {
        let (cell, settle) = AsyncCell::new(async { 5 });
        assert_eq!(cell.get(), None);
        assert!(!cell.is_settled());

        futures::executor::block_on(settle);
        assert_eq!(cell.get(), Some(5));
        assert!(cell.is_settled());
    }

    #[test]
    fn subscriber_sees_unset_to_settled() {
        let (cell, settle) = AsyncCell::new(async { "hello".to_string() });
        let seen = Rc::new(RefCell::new(Vec::new()));
        let seen_clone = Rc::clone(&seen);
        let _sub = cell.subscribe(move |new, old| {
            seen_clone.borrow_mut().push((new.clone(), old.clone()));
        });

        futures::executor::block_on(settle);
        assert_eq!(
            *seen.borrow(),
            vec![(Some("hello".to_string()), None)]
        );
    }

    #[test]
    fn broadcast_to_every_waiter() {
        let mut pool = LocalPool::new();
        let (tx, rx) = oneshot::channel::<&'static str>();
        let cell =
            AsyncCell::spawn_local(&pool.spawner(), async move { rx.await.unwrap_or("dropped") })
                .expect("spawn");

        let results = Rc::new(RefCell::new(Vec::new()));
        for _ in 0..2 {
            let waiter = cell.await_value();
            let results = Rc::clone(&results);
            pool.spawner()
                .spawn_local(async move {
                    let value = waiter.await;
                    results.borrow_mut().push(value);
                })
                .expect("spawn waiter");
        }

        pool.run_until_stalled();
        assert!(results.borrow().is_empty());

        tx.send("hello").expect("send");
        pool.run();
        assert_eq!(*results.borrow(), vec![Some("hello"), Some("hello")]);
    }

    #[test]
    fn waiters_unsubscribe_after_resolving() {
        let mut pool = LocalPool::new();
        let (cell, settle) = AsyncCell::new(async { 1 });
        let waiter = cell.await_value();
        assert_eq!(cell.cell.subscriber_count(), 1);

        pool.spawner().spawn_local(settle).expect("spawn");
        pool.run();
        assert_eq!(cell.cell.subscriber_count(), 0);
        assert_eq!(pool.run_until(waiter), Some(1));
    }

    #[test]
    fn await_after_settle_resolves_immediately() {
        let (cell, settle) = AsyncCell::new(async { 9 });
        futures::executor::block_on(settle);
        assert_eq!(futures::executor::block_on(cell.await_value()), Some(9));
    }

    #[test]
    fn dropped_waiter_releases_subscription() {
        let (cell, _settle) = AsyncCell::new(std::future::pending::<u8>());
        let waiter = cell.await_value();
        assert_eq!(cell.cell.subscriber_count(), 1);
        drop(waiter);
        assert_eq!(cell.cell.subscriber_count(), 0);
    }

    #[test]
    fn pending_forever_never_resolves() {
        let mut pool = LocalPool::new();
        let cell = AsyncCell::spawn_local(&pool.spawner(), std::future::pending::<u8>())
            .expect("spawn");
        let done = Rc::new(Cell::new(false));
        let done_clone = Rc::clone(&done);
        let waiter = cell.await_value();
        pool.spawner()
            .spawn_local(async move {
                let _ = waiter.await;
                done_clone.set(true);
            })
            .expect("spawn waiter");
        pool.run_until_stalled();
        assert!(!done.get());
    }
}
