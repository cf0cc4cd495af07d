#![forbid(unsafe_code)]

use thiserror::Error;

use crate::value::Key;

pub type Result<T> = std::result::Result<T, ObserveError>;

#[derive(Debug, Error)]
pub enum ObserveError {
    #[error("cannot observe a void target")]
    InvalidTarget,

    #[error("value is not an object or array: {found}")]
    NotAContainer { found: &'static str },

    #[error("operation requires an array, found an object")]
    NotAnArray,

    #[error("key {key} does not address an element of this container")]
    KeyKind { key: Key },

    #[error("index {index} out of bounds for array of length {len}")]
    OutOfBounds { index: usize, len: usize },

    #[error("failed to spawn async cell driver: {0}")]
    Spawn(#[from] futures::task::SpawnError),
}

impl ObserveError {
    #[must_use]
    pub fn not_a_container(value: &serde_json::Value) -> Self {
        Self::NotAContainer {
            found: crate::value::kind_name(value),
        }
    }
}
