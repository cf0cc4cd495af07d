#![forbid(unsafe_code)]

//! Eager deep interception over JSON object graphs.
//!
//! # Design
//!
//! An [`Object`] is a reference-counted node holding either a map or an
//! array. Construction wraps every nested object or array reachable from the
//! seed value in its own node, so each container in the graph is its own
//! facade and nested handles returned by [`Object::child`] are stable.
//!
//! Every node keeps a weak link to its parent and a list of notifiers. A
//! write at any node walks the parent chain, collecting the notifiers of the
//! node and all of its ancestors, and emits one `(after, before)` pair to each
//! of them. Both snapshots are structural clones of the node that was written,
//! not of the root: a write three levels down reports that inner object only.
//!
//! A nested object that is replaced or removed loses its parent link. Writes
//! through a stale handle to it still apply to the detached subtree but no
//! longer reach notifiers on the graph it was removed from.
//!
//! # Equality
//!
//! Writing a scalar compares by value. Writing an object or array always
//! counts as a change: the incoming value becomes a new node, and a new node
//! is never identical to the one it replaces.
//!
//! # Failure Modes
//!
//! - **Write during notification**: node borrows are released before any
//!   notifier runs, so callbacks may read or write the graph.
//! - **Wrong key kind**: field keys on arrays and out-of-range indices are
//!   reported as [`ObserveError`] values; the graph is left unchanged.

use std::cell::RefCell;
use std::collections::BTreeMap;
use std::fmt;
use std::rc::{Rc, Weak};
use std::cmp::Ordering;
use std::sync::atomic::{self, AtomicU64};

use serde_json::Value;

use crate::callback::{Callback, Subscribable, Subscription};
use crate::dispatch::{Dispatch, Notifier};
use crate::error::{ObserveError, Result};
use crate::value::{Key, is_container};

static NEXT_OBJECT_ID: AtomicU64 = AtomicU64::new(1);

/// Stable identity of an [`Object`] node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ObjectId(u64);

impl ObjectId {
    fn next() -> Self {
        Self(NEXT_OBJECT_ID.fetch_add(1, atomic::Ordering::Relaxed))
    }

    #[must_use]
    pub const fn raw(self) -> u64 {
        self.0
    }
}

enum Slot {
    Scalar(Value),
    Node(Object),
}

impl Slot {
    fn wrap(value: Value, parent: &Weak<RefCell<Node>>) -> Self {
        if is_container(&value) {
            match Object::build(value, parent.clone()) {
                Ok(object) => Slot::Node(object),
                Err(scalar) => Slot::Scalar(scalar),
            }
        } else {
            Slot::Scalar(value)
        }
    }

    fn snapshot(&self) -> Value {
        match self {
            Slot::Scalar(v) => v.clone(),
            Slot::Node(object) => object.snapshot(),
        }
    }

    fn detach(self) {
        if let Slot::Node(object) = self {
            object.node.borrow_mut().parent = Weak::new();
        }
    }
}

enum Body {
    Map(BTreeMap<String, Slot>),
    List(Vec<Slot>),
}

impl Body {
    fn slot(&self, key: &Key) -> Option<&Slot> {
        match self {
            Body::Map(map) => map.get(key.as_field().as_ref()),
            Body::List(items) => key.as_index().and_then(|i| items.get(i)),
        }
    }

    fn len(&self) -> usize {
        match self {
            Body::Map(map) => map.len(),
            Body::List(items) => items.len(),
        }
    }
}

struct Node {
    id: ObjectId,
    body: Body,
    parent: Weak<RefCell<Node>>,
    notifiers: Vec<Rc<Notifier>>,
}

/// Outcome of one structural edit on a node body.
enum Change<R> {
    Unchanged(R),
    /// The edit happened; the slots it displaced must be detached.
    Changed(R, Vec<Slot>),
}

/// A mutable, identity-bearing object or array whose writes are intercepted.
///
/// Cloning an `Object` creates another handle to the **same** node.
#[derive(Clone)]
pub struct Object {
    node: Rc<RefCell<Node>>,
}

impl Object {
    /// An empty map.
    #[must_use]
    pub fn new() -> Self {
        Self::with_body(Body::Map(BTreeMap::new()), Weak::new())
    }

    /// An empty array.
    #[must_use]
    pub fn array() -> Self {
        Self::with_body(Body::List(Vec::new()), Weak::new())
    }

    fn with_body(body: Body, parent: Weak<RefCell<Node>>) -> Self {
        Self {
            node: Rc::new(RefCell::new(Node {
                id: ObjectId::next(),
                body,
                parent,
                notifiers: Vec::new(),
            })),
        }
    }

    /// Wrap a container and, recursively, every container inside it.
    /// Scalars are handed back unchanged.
    fn build(value: Value, parent: Weak<RefCell<Node>>) -> std::result::Result<Self, Value> {
        let object = Self::with_body(Body::Map(BTreeMap::new()), parent);
        let weak = Rc::downgrade(&object.node);
        let body = match value {
            Value::Object(map) => Body::Map(
                map.into_iter()
                    .map(|(k, v)| (k, Slot::wrap(v, &weak)))
                    .collect(),
            ),
            Value::Array(items) => {
                Body::List(items.into_iter().map(|v| Slot::wrap(v, &weak)).collect())
            }
            scalar => return Err(scalar),
        };
        object.node.borrow_mut().body = body;
        Ok(object)
    }

    #[must_use]
    pub fn id(&self) -> ObjectId {
        self.node.borrow().id
    }

    /// Whether both handles refer to the same node.
    #[must_use]
    pub fn ptr_eq(&self, other: &Self) -> bool {
        Rc::ptr_eq(&self.node, &other.node)
    }

    #[must_use]
    pub fn is_array(&self) -> bool {
        matches!(self.node.borrow().body, Body::List(_))
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.node.borrow().body.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    #[must_use]
    pub fn contains(&self, key: impl Into<Key>) -> bool {
        self.node.borrow().body.slot(&key.into()).is_some()
    }

    /// Keys in iteration order: sorted field names, or ascending indices.
    #[must_use]
    pub fn keys(&self) -> Vec<Key> {
        match &self.node.borrow().body {
            Body::Map(map) => map.keys().cloned().map(Key::Field).collect(),
            Body::List(items) => (0..items.len()).map(Key::Index).collect(),
        }
    }

    /// Structural clone of the member at `key`.
    #[must_use]
    pub fn get(&self, key: impl Into<Key>) -> Option<Value> {
        self.node.borrow().body.slot(&key.into()).map(Slot::snapshot)
    }

    /// The wrapped node at `key`, if that member is an object or array.
    ///
    /// Repeated calls return handles to the same node.
    #[must_use]
    pub fn child(&self, key: impl Into<Key>) -> Option<Object> {
        match self.node.borrow().body.slot(&key.into()) {
            Some(Slot::Node(object)) => Some(object.clone()),
            _ => None,
        }
    }

    /// The containing node, unless this is a root or was detached.
    #[must_use]
    pub fn parent(&self) -> Option<Object> {
        self.node
            .borrow()
            .parent
            .upgrade()
            .map(|node| Object { node })
    }

    /// Structural clone of the whole subtree as plain JSON.
    #[must_use]
    pub fn snapshot(&self) -> Value {
        match &self.node.borrow().body {
            Body::Map(map) => Value::Object(
                map.iter()
                    .map(|(k, slot)| (k.clone(), slot.snapshot()))
                    .collect(),
            ),
            Body::List(items) => Value::Array(items.iter().map(Slot::snapshot).collect()),
        }
    }

    /// Write `value` at `key`. Returns whether the write changed anything.
    ///
    /// On arrays, an index equal to the length appends; anything further is
    /// [`ObserveError::OutOfBounds`].
    pub fn set(&self, key: impl Into<Key>, value: impl Into<Value>) -> Result<bool> {
        let key = key.into();
        let value = value.into();
        {
            let node = self.node.borrow();
            if matches!(node.body, Body::List(_)) && key.as_index().is_none() {
                return Err(ObserveError::KeyKind { key });
            }
            if let Some(Slot::Scalar(current)) = node.body.slot(&key)
                && !is_container(&value)
                && *current == value
            {
                return Ok(false);
            }
        }
        self.mutate(|body, weak| {
            let slot = Slot::wrap(value, weak);
            let displaced = match body {
                Body::Map(map) => map.insert(key.as_field().into_owned(), slot),
                Body::List(items) => {
                    let index = key
                        .as_index()
                        .ok_or_else(|| ObserveError::KeyKind { key: key.clone() })?;
                    match index.cmp(&items.len()) {
                        Ordering::Less => Some(std::mem::replace(&mut items[index], slot)),
                        Ordering::Equal => {
                            items.push(slot);
                            None
                        }
                        Ordering::Greater => {
                            return Err(ObserveError::OutOfBounds {
                                index,
                                len: items.len(),
                            });
                        }
                    }
                }
            };
            Ok(Change::Changed(true, displaced.into_iter().collect()))
        })
    }

    /// Append to an array.
    pub fn push(&self, value: impl Into<Value>) -> Result<()> {
        let value = value.into();
        self.mutate(|body, weak| match body {
            Body::List(items) => {
                items.push(Slot::wrap(value, weak));
                Ok(Change::Changed((), Vec::new()))
            }
            Body::Map(_) => Err(ObserveError::NotAnArray),
        })
    }

    /// Remove and return the last element of an array.
    ///
    /// Popping an empty array changes nothing and notifies nobody.
    pub fn pop(&self) -> Result<Option<Value>> {
        self.mutate(|body, _| match body {
            Body::List(items) => Ok(match items.pop() {
                Some(slot) => Change::Changed(Some(slot.snapshot()), vec![slot]),
                None => Change::Unchanged(None),
            }),
            Body::Map(_) => Err(ObserveError::NotAnArray),
        })
    }

    /// Insert into an array at `index`, shifting later elements.
    pub fn insert(&self, index: usize, value: impl Into<Value>) -> Result<()> {
        let value = value.into();
        self.mutate(|body, weak| match body {
            Body::List(items) => {
                if index > items.len() {
                    return Err(ObserveError::OutOfBounds {
                        index,
                        len: items.len(),
                    });
                }
                items.insert(index, Slot::wrap(value, weak));
                Ok(Change::Changed((), Vec::new()))
            }
            Body::Map(_) => Err(ObserveError::NotAnArray),
        })
    }

    /// Remove and return the array element at `index`.
    pub fn remove(&self, index: usize) -> Result<Value> {
        self.mutate(|body, _| match body {
            Body::List(items) => {
                if index >= items.len() {
                    return Err(ObserveError::OutOfBounds {
                        index,
                        len: items.len(),
                    });
                }
                let slot = items.remove(index);
                Ok(Change::Changed(slot.snapshot(), vec![slot]))
            }
            Body::Map(_) => Err(ObserveError::NotAnArray),
        })
    }

    /// Remove every member of a map or array.
    pub fn clear(&self) -> Result<()> {
        self.mutate(|body, _| {
            let displaced: Vec<Slot> = match body {
                Body::Map(map) => std::mem::take(map).into_values().collect(),
                Body::List(items) => std::mem::take(items),
            };
            Ok(if displaced.is_empty() {
                Change::Unchanged(())
            } else {
                Change::Changed((), displaced)
            })
        })
    }

    /// Apply `edit` to this node and notify every notifier in scope once.
    fn mutate<R>(
        &self,
        edit: impl FnOnce(&mut Body, &Weak<RefCell<Node>>) -> Result<Change<R>>,
    ) -> Result<R> {
        let notifiers = self.notifiers_in_scope();
        let before = (!notifiers.is_empty()).then(|| self.snapshot());
        let weak = Rc::downgrade(&self.node);
        let change = {
            let mut node = self.node.borrow_mut();
            edit(&mut node.body, &weak)?
        };
        let result = match change {
            Change::Unchanged(result) => return Ok(result),
            Change::Changed(result, displaced) => {
                displaced.into_iter().for_each(Slot::detach);
                result
            }
        };
        if let Some(before) = before {
            let after = self.snapshot();
            tracing::trace!(
                message = "object.write",
                object = self.id().raw(),
                notifiers = notifiers.len()
            );
            for notifier in &notifiers {
                notifier.emit(&after, &before);
            }
        }
        Ok(result)
    }

    /// Live notifiers of this node and all its ancestors, innermost first.
    fn notifiers_in_scope(&self) -> Vec<Rc<Notifier>> {
        let mut out = Vec::new();
        let mut cursor = Some(Rc::clone(&self.node));
        while let Some(node) = cursor {
            let inner = node.borrow();
            out.extend(inner.notifiers.iter().filter(|n| !n.is_empty()).cloned());
            cursor = inner.parent.upgrade();
        }
        out
    }

    pub(crate) fn attach(&self, notifier: Rc<Notifier>) {
        let mut node = self.node.borrow_mut();
        if !node.notifiers.iter().any(|n| Rc::ptr_eq(n, &notifier)) {
            node.notifiers.push(notifier);
        }
    }

    pub(crate) fn detach(&self, notifier: &Rc<Notifier>) {
        self.node
            .borrow_mut()
            .notifiers
            .retain(|n| !Rc::ptr_eq(n, notifier));
    }

    /// Number of notifiers attached directly to this node.
    #[must_use]
    pub fn notifier_count(&self) -> usize {
        self.node.borrow().notifiers.len()
    }
}

impl Default for Object {
    fn default() -> Self {
        Self::new()
    }
}

impl TryFrom<Value> for Object {
    type Error = ObserveError;

    fn try_from(value: Value) -> Result<Self> {
        if !is_container(&value) {
            return Err(ObserveError::not_a_container(&value));
        }
        Self::build(value, Weak::new()).map_err(|v| ObserveError::not_a_container(&v))
    }
}

impl fmt::Debug for Object {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Object")
            .field("id", &self.id())
            .field("value", &self.snapshot())
            .finish()
    }
}

impl Subscribable for Object {
    type Output = Value;

    fn current(&self) -> Value {
        self.snapshot()
    }

    fn watch(&self, callback: Callback) -> Subscription {
        let notifier = Notifier::with_callback(callback, Dispatch::Immediate);
        self.attach(Rc::clone(&notifier));
        let node = Rc::downgrade(&self.node);
        Subscription::new(move || {
            if let Some(node) = node.upgrade() {
                Object { node }.detach(&notifier);
            }
            notifier.clear();
        })
    }
}

/// Handle returned by [`deep_observe`].
pub struct DeepObservation {
    /// The intercepting facade. Writes through it, or through any nested
    /// handle taken from it, reach the callback.
    pub observer: Object,
    notifier: Rc<Notifier>,
}

impl DeepObservation {
    /// Stop delivering to the callback. Idempotent.
    pub fn unsubscribe(&self) {
        self.observer.detach(&self.notifier);
        self.notifier.clear();
    }

    #[must_use]
    pub fn is_active(&self) -> bool {
        !self.notifier.is_empty()
    }
}

impl fmt::Debug for DeepObservation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DeepObservation")
            .field("observer", &self.observer)
            .field("active", &self.is_active())
            .finish()
    }
}

/// Observe every write anywhere under `target`.
///
/// The callback receives `(after, before)` snapshots of the object that was
/// written, which for nested writes is the nested object, not `target`.
pub fn deep_observe(
    target: &Object,
    callback: impl Fn(&Value, &Value) + 'static,
) -> DeepObservation {
    let notifier = Notifier::with_callback(Callback::new(callback), Dispatch::Immediate);
    target.attach(Rc::clone(&notifier));
    DeepObservation {
        observer: target.clone(),
        notifier,
    }
}
