#![forbid(unsafe_code)]

//! Value-level reactive primitives.
//!
//! - [`ValueCell`]: a shared, version-tracked value with `(new, old)` change
//!   notification.
//! - [`DerivedCell`]: a cached result of a compute function, refreshed by an
//!   explicit `update()`.
//! - [`AsyncCell`]: a value that settles once from a future.
//!
//! # Architecture
//!
//! All three share one `Rc<RefCell<..>>` cell design for single-threaded
//! ownership. `DerivedCell` and `AsyncCell` are thin layers over an inner
//! `ValueCell`, so equality, ordering and unsubscribe behaviour are the
//! same everywhere.
//!
//! # Invariants
//!
//! 1. Version increments exactly once per `set` that changes the value.
//! 2. Subscribers are notified in registration order, before `set` returns.
//! 3. Setting a value equal to the current value is a no-op.
//! 4. A subscriber removed during a notification is not called again within
//!    that notification.

pub mod async_cell;
pub mod cell;
pub mod derived;

pub use async_cell::{AsyncCell, Settle};
pub use cell::ValueCell;
pub use derived::DerivedCell;
