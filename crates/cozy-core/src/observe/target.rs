#![forbid(unsafe_code)]

//! What can be observed, and what observing it hands back.

use serde_json::Value;

use crate::callback::Callback;
use crate::observe::boxed::BoxedPrimitive;
use crate::observe::deep::Object;
use crate::value::is_primitive;

/// Observation target, resolved once at the call site.
#[derive(Debug, Clone)]
pub enum Target {
    /// An object or array graph, matched by node identity.
    Object(Object),
    /// A string, number or boolean. Boxed anew on every observation; matched
    /// against the current value of live boxes when unobserving.
    Primitive(Value),
    /// An existing box, matched by identity.
    Boxed(BoxedPrimitive),
    /// Nothing to observe.
    Void,
}

impl Target {
    #[must_use]
    pub fn is_void(&self) -> bool {
        matches!(self, Target::Void)
    }
}

impl From<Object> for Target {
    fn from(object: Object) -> Self {
        Target::Object(object)
    }
}

impl From<&Object> for Target {
    fn from(object: &Object) -> Self {
        Target::Object(object.clone())
    }
}

impl From<BoxedPrimitive> for Target {
    fn from(boxed: BoxedPrimitive) -> Self {
        Target::Boxed(boxed)
    }
}

impl From<&BoxedPrimitive> for Target {
    fn from(boxed: &BoxedPrimitive) -> Self {
        Target::Boxed(boxed.clone())
    }
}

impl From<Observed> for Target {
    fn from(observed: Observed) -> Self {
        match observed {
            Observed::Object(object) => Target::Object(object),
            Observed::Primitive(boxed) => Target::Boxed(boxed),
        }
    }
}

impl From<&Observed> for Target {
    fn from(observed: &Observed) -> Self {
        observed.clone().into()
    }
}

/// Plain JSON: containers become a fresh [`Object`], `null` is void.
impl From<Value> for Target {
    fn from(value: Value) -> Self {
        if is_primitive(&value) {
            return Target::Primitive(value);
        }
        Object::try_from(value).map_or(Target::Void, Target::Object)
    }
}

impl From<()> for Target {
    fn from((): ()) -> Self {
        Target::Void
    }
}

impl<T: Into<Target>> From<Option<T>> for Target {
    fn from(value: Option<T>) -> Self {
        value.map_or(Target::Void, Into::into)
    }
}

macro_rules! primitive_target {
    ($($ty:ty),*) => {
        $(
            impl From<$ty> for Target {
                fn from(value: $ty) -> Self {
                    Value::from(value).into()
                }
            }
        )*
    };
}

primitive_target!(bool, i32, i64, u32, u64, f64, &str, String);

/// Facade returned by the registry, typed after its target.
#[derive(Debug, Clone)]
pub enum Observed {
    Object(Object),
    Primitive(BoxedPrimitive),
}

impl Observed {
    #[must_use]
    pub fn as_object(&self) -> Option<&Object> {
        match self {
            Observed::Object(object) => Some(object),
            Observed::Primitive(_) => None,
        }
    }

    #[must_use]
    pub fn as_primitive(&self) -> Option<&BoxedPrimitive> {
        match self {
            Observed::Primitive(boxed) => Some(boxed),
            Observed::Object(_) => None,
        }
    }

    #[must_use]
    pub fn into_object(self) -> Option<Object> {
        match self {
            Observed::Object(object) => Some(object),
            Observed::Primitive(_) => None,
        }
    }

    #[must_use]
    pub fn into_primitive(self) -> Option<BoxedPrimitive> {
        match self {
            Observed::Primitive(boxed) => Some(boxed),
            Observed::Object(_) => None,
        }
    }

    /// Whether both facades are the same object node or the same box.
    #[must_use]
    pub fn ptr_eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Observed::Object(a), Observed::Object(b)) => a.ptr_eq(b),
            (Observed::Primitive(a), Observed::Primitive(b)) => a.ptr_eq(b),
            _ => false,
        }
    }

    /// Current value as plain JSON; `null` for a torn-down box.
    #[must_use]
    pub fn snapshot(&self) -> Value {
        match self {
            Observed::Object(object) => object.snapshot(),
            Observed::Primitive(boxed) => boxed.get().unwrap_or(Value::Null),
        }
    }
}

/// Options for [`Registry::observe`](crate::observe::registry::Registry::observe).
#[derive(Debug, Clone)]
pub struct ObserveOptions {
    /// What to observe.
    pub target: Target,
    /// Called with `(new, old)` on every change.
    pub callback: Callback,
    /// Deliver through the microtask queue. `None` uses the registry default.
    pub is_async: Option<bool>,
}

impl ObserveOptions {
    #[must_use]
    pub fn new(target: impl Into<Target>, callback: Callback) -> Self {
        Self {
            target: target.into(),
            callback,
            is_async: None,
        }
    }

    /// Choose deferred (`true`) or in-line (`false`) delivery.
    #[must_use]
    pub fn with_async(mut self, is_async: bool) -> Self {
        self.is_async = Some(is_async);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn json_targets_are_classified() {
        assert!(matches!(Target::from(json!({"a": 1})), Target::Object(_)));
        assert!(matches!(Target::from(json!([1])), Target::Object(_)));
        assert!(matches!(Target::from(json!(1)), Target::Primitive(_)));
        assert!(Target::from(Value::Null).is_void());
        assert!(Target::from(()).is_void());
        assert!(Target::from(None::<i64>).is_void());
        assert!(matches!(Target::from(Some("x")), Target::Primitive(_)));
    }

    #[test]
    fn options_builder() {
        let cb = Callback::new(|_: &Value, _: &Value| {});
        let opts = ObserveOptions::new(10, cb.clone()).with_async(true);
        assert_eq!(opts.is_async, Some(true));
        assert_eq!(opts.callback, cb);
        assert!(matches!(opts.target, Target::Primitive(ref v) if *v == json!(10)));
    }
}
