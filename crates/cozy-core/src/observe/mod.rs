#![forbid(unsafe_code)]

//! Object-graph interception and the observation registry.
//!
//! - [`Object`]: an identity-bearing JSON object or array whose writes, at
//!   any depth, are reported as `(after, before)` snapshots of the enclosing
//!   node.
//! - [`deep_observe`]: attach one callback to a graph directly.
//! - [`BoxedPrimitive`]: observable box around a scalar.
//! - [`Registry`]: deduplicates facades per object and tears observation
//!   down when the last callback goes.
//!
//! # Invariants
//!
//! 1. Every container reachable from an `Object` is itself a node; there is
//!    no lazily wrapped state.
//! 2. Observing the same object twice yields the same facade.
//! 3. A torn-down facade accepts writes and notifies nobody.

pub mod boxed;
pub mod deep;
pub mod registry;
pub mod target;

pub use boxed::{BoxId, BoxedPrimitive};
pub use deep::{DeepObservation, Object, ObjectId, deep_observe};
pub use registry::{Registry, global, with_global};
pub use target::{ObserveOptions, Observed, Target};
