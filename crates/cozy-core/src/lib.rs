#![forbid(unsafe_code)]

//! Core: change notification for values, derived values, async values and
//! deeply nested object graphs.

pub mod callback;
pub mod config;
pub mod dispatch;
pub mod error;
#[cfg(feature = "tracing-json")]
pub mod logging;
pub mod observe;
pub mod reactive;
pub mod value;

pub use callback::{Callback, Subscribable, Subscription};
pub use config::RegistryConfig;
pub use dispatch::Dispatch;
pub use error::{ObserveError, Result};
pub use observe::{
    BoxedPrimitive, DeepObservation, Object, ObserveOptions, Observed, Registry, Target,
    deep_observe,
};
pub use reactive::{AsyncCell, DerivedCell, ValueCell};
pub use value::Key;
