#![forbid(unsafe_code)]

//! cozy-observe public facade crate.
//!
//! This crate provides the stable, ergonomic surface area for users.

pub use cozy_core::*;

#[cfg(feature = "bindings")]
pub use cozy_bindings as bindings;

pub mod prelude {
    pub use cozy_core as core;
    pub use cozy_core::dispatch::{drain, queue_microtask, turn};
    pub use cozy_core::observe::registry;
    pub use cozy_core::{
        AsyncCell, Callback, DerivedCell, Key, Object, ObserveError, ObserveOptions, Observed,
        Registry, Subscribable, Subscription, Target, ValueCell, deep_observe,
    };

    #[cfg(feature = "bindings")]
    pub use cozy_bindings::{AsyncBinding, Binding, DeepBinding, DerivedBinding, ValueBinding};
}
