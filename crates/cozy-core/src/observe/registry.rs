#![forbid(unsafe_code)]

//! Observation registry: one facade per target, many callbacks per facade.
//!
//! # Design
//!
//! Every live observation is a registry entry pairing a facade with the
//! [`Notifier`] that carries its callbacks. Object entries are keyed by the
//! node's [`ObjectId`], so observing the same [`Object`] twice reuses its
//! entry and returns the same handle. Primitive observations box the value
//! into a fresh [`BoxedPrimitive`] each time and are keyed by [`BoxId`].
//!
//! Each registry attaches its own notifier to an object node or box, so
//! several registries can observe one target without sharing callbacks.
//! An entry whose callback set becomes empty is torn down: its notifier is
//! detached from the node or box. A box left with no notifier at all is
//! cleared to unset.
//!
//! # Invariants
//!
//! 1. An object node has at most one entry.
//! 2. No entry has an empty callback set.
//! 3. No registry borrow is held while a caller callback runs; observe,
//!    unobserve and teardown never invoke callbacks.

use std::cell::RefCell;
use std::fmt;
use std::rc::Rc;

use ahash::AHashMap;

use crate::callback::Callback;
use crate::config::RegistryConfig;
use crate::dispatch::{Dispatch, Notifier};
use crate::error::{ObserveError, Result};
use crate::observe::boxed::{BoxId, BoxedPrimitive};
use crate::observe::deep::{Object, ObjectId};
use crate::observe::target::{ObserveOptions, Observed, Target};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
struct EntryId(u64);

struct RegistryEntry {
    facade: Observed,
    notifier: Rc<Notifier>,
}

impl RegistryEntry {
    fn teardown(self) {
        self.notifier.clear();
        match &self.facade {
            Observed::Object(object) => object.detach(&self.notifier),
            Observed::Primitive(boxed) => {
                if !boxed.detach(&self.notifier) {
                    boxed.clear_value();
                }
            }
        }
    }
}

#[derive(Default)]
struct RegistryState {
    next_id: u64,
    entries: AHashMap<EntryId, RegistryEntry>,
    objects: AHashMap<ObjectId, EntryId>,
    boxes: AHashMap<BoxId, EntryId>,
}

impl RegistryState {
    fn insert(&mut self, facade: Observed, notifier: Rc<Notifier>) -> EntryId {
        self.next_id += 1;
        let id = EntryId(self.next_id);
        match &facade {
            Observed::Object(object) => self.objects.insert(object.id(), id),
            Observed::Primitive(boxed) => self.boxes.insert(boxed.id(), id),
        };
        self.entries.insert(id, RegistryEntry { facade, notifier });
        id
    }

    fn remove(&mut self, id: EntryId) -> Option<RegistryEntry> {
        let entry = self.entries.remove(&id)?;
        match &entry.facade {
            Observed::Object(object) => self.objects.remove(&object.id()),
            Observed::Primitive(boxed) => self.boxes.remove(&boxed.id()),
        };
        Some(entry)
    }

    /// Entries whose target matches: object and box targets by identity,
    /// raw primitives by the current value of each live box.
    fn matching(&self, target: &Target) -> Vec<EntryId> {
        match target {
            Target::Object(object) => self.objects.get(&object.id()).copied().into_iter().collect(),
            Target::Boxed(boxed) => self.boxes.get(&boxed.id()).copied().into_iter().collect(),
            Target::Primitive(value) => {
                let mut ids: Vec<EntryId> = self
                    .entries
                    .iter()
                    .filter(|(_, entry)| {
                        matches!(&entry.facade, Observed::Primitive(b) if b.holds(value))
                    })
                    .map(|(id, _)| *id)
                    .collect();
                ids.sort_by_key(|id| id.0);
                ids
            }
            Target::Void => Vec::new(),
        }
    }
}

/// Store of live observations.
///
/// A `Registry` is confined to the thread that created it. Use
/// [`with_global`] for the per-thread default instance.
pub struct Registry {
    state: RefCell<RegistryState>,
    config: RegistryConfig,
}

impl Registry {
    #[must_use]
    pub fn new() -> Self {
        Self::with_config(RegistryConfig::default())
    }

    #[must_use]
    pub fn with_config(config: RegistryConfig) -> Self {
        Self {
            state: RefCell::new(RegistryState::default()),
            config,
        }
    }

    #[must_use]
    pub fn config(&self) -> RegistryConfig {
        self.config
    }

    /// Observe `options.target`, returning its facade.
    ///
    /// An object already observed returns its existing facade with the
    /// callback added. A primitive is boxed anew. A callback already attached
    /// to the target keeps the dispatch mode it was first observed with.
    pub fn try_observe(&self, options: ObserveOptions) -> Result<Observed> {
        let ObserveOptions {
            target,
            callback,
            is_async,
        } = options;
        let mode = Dispatch::from_async(is_async.unwrap_or(self.config.default_async));

        match target {
            Target::Void => {
                tracing::debug!(message = "registry.observe", outcome = "invalid_target");
                Err(ObserveError::InvalidTarget)
            }
            Target::Object(object) => {
                Ok(Observed::Object(self.observe_node(object, callback, mode)))
            }
            Target::Primitive(value) => {
                let notifier = Notifier::with_callback(callback, mode);
                let boxed = BoxedPrimitive::new(value);
                boxed.attach(Rc::clone(&notifier));
                let facade = Observed::Primitive(boxed.clone());
                self.state.borrow_mut().insert(facade.clone(), notifier);
                tracing::debug!(
                    message = "registry.observe",
                    outcome = "boxed",
                    box_id = boxed.id().raw(),
                    deferred = mode.is_deferred()
                );
                Ok(facade)
            }
            Target::Boxed(boxed) => {
                let mut state = self.state.borrow_mut();
                let existing = state
                    .boxes
                    .get(&boxed.id())
                    .and_then(|id| state.entries.get(id));
                let adopted = match existing {
                    Some(entry) => {
                        entry.notifier.push(callback, mode);
                        false
                    }
                    None => {
                        let notifier = Notifier::with_callback(callback, mode);
                        boxed.attach(Rc::clone(&notifier));
                        state.insert(Observed::Primitive(boxed.clone()), notifier);
                        true
                    }
                };
                drop(state);
                let outcome = if adopted { "adopted" } else { "reused" };
                tracing::debug!(
                    message = "registry.observe",
                    outcome,
                    box_id = boxed.id().raw(),
                    deferred = mode.is_deferred()
                );
                Ok(Observed::Primitive(boxed))
            }
        }
    }

    /// Like [`try_observe`](Self::try_observe), with a void target observing
    /// nothing.
    pub fn observe(&self, options: ObserveOptions) -> Option<Observed> {
        self.try_observe(options).ok()
    }

    /// Observe an object with the registry's default dispatch mode.
    pub fn observe_object(&self, object: &Object, callback: Callback) -> Object {
        let mode = Dispatch::from_async(self.config.default_async);
        self.observe_node(object.clone(), callback, mode)
    }

    fn observe_node(&self, object: Object, callback: Callback, mode: Dispatch) -> Object {
        let mut state = self.state.borrow_mut();
        let existing = state
            .objects
            .get(&object.id())
            .and_then(|id| state.entries.get(id));
        if let Some(entry) = existing {
            entry.notifier.push(callback, mode);
            drop(state);
            tracing::debug!(
                message = "registry.observe",
                outcome = "reused",
                object = object.id().raw(),
                deferred = mode.is_deferred()
            );
            return object;
        }

        let notifier = Notifier::with_callback(callback, mode);
        object.attach(Rc::clone(&notifier));
        state.insert(Observed::Object(object.clone()), notifier);
        drop(state);
        tracing::debug!(
            message = "registry.observe",
            outcome = "created",
            object = object.id().raw(),
            deferred = mode.is_deferred()
        );
        object
    }

    /// Remove `callback` (or every callback, if `None`) from each entry
    /// matching `target`. Entries left without callbacks are torn down.
    ///
    /// Returns the number of entries torn down.
    pub fn unobserve(&self, target: impl Into<Target>, callback: Option<&Callback>) -> usize {
        let target = target.into();
        let torn_down: Vec<RegistryEntry> = {
            let mut state = self.state.borrow_mut();
            let matched = state.matching(&target);
            let mut empty = Vec::new();
            for id in &matched {
                let Some(entry) = state.entries.get(id) else {
                    continue;
                };
                match callback {
                    Some(cb) => {
                        entry.notifier.remove(cb);
                    }
                    None => entry.notifier.clear(),
                }
                if entry.notifier.is_empty() {
                    empty.push(*id);
                }
            }
            tracing::debug!(
                message = "registry.unobserve",
                matched = matched.len(),
                filtered = callback.is_some(),
                emptied = empty.len()
            );
            empty.into_iter().filter_map(|id| state.remove(id)).collect()
        };

        let count = torn_down.len();
        for entry in torn_down {
            tracing::trace!(message = "registry.teardown");
            entry.teardown();
        }
        count
    }

    /// Tear down every entry, leaving the registry as if freshly created.
    pub fn remove_all_observers(&self) {
        let state = std::mem::take(&mut *self.state.borrow_mut());
        tracing::debug!(message = "registry.remove_all", entries = state.entries.len());
        for (_, entry) in state.entries {
            entry.teardown();
        }
    }

    /// Facades of every entry matching `target`.
    #[must_use]
    pub fn find_facades(&self, target: impl Into<Target>) -> Vec<Observed> {
        let target = target.into();
        let state = self.state.borrow();
        state
            .matching(&target)
            .iter()
            .filter_map(|id| state.entries.get(id))
            .map(|entry| entry.facade.clone())
            .collect()
    }

    /// The raw target behind a registered facade.
    ///
    /// Object facades are their own target. Box facades resolve to their
    /// current primitive value.
    #[must_use]
    pub fn target_of(&self, facade: &Observed) -> Option<Target> {
        let state = self.state.borrow();
        match facade {
            Observed::Object(object) => state
                .objects
                .contains_key(&object.id())
                .then(|| Target::Object(object.clone())),
            Observed::Primitive(boxed) => {
                if !state.boxes.contains_key(&boxed.id()) {
                    return None;
                }
                Some(boxed.get().map_or(Target::Void, Target::Primitive))
            }
        }
    }

    /// Total callbacks across every entry matching `target`.
    #[must_use]
    pub fn callback_count(&self, target: impl Into<Target>) -> usize {
        let target = target.into();
        let state = self.state.borrow();
        state
            .matching(&target)
            .iter()
            .filter_map(|id| state.entries.get(id))
            .map(|entry| entry.notifier.len())
            .sum()
    }

    /// Whether `target` currently has a live entry.
    #[must_use]
    pub fn is_observed(&self, target: impl Into<Target>) -> bool {
        !self.state.borrow().matching(&target.into()).is_empty()
    }

    /// Number of live entries.
    #[must_use]
    pub fn len(&self) -> usize {
        self.state.borrow().entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for Registry {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for Registry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Registry")
            .field("entries", &self.len())
            .field("config", &self.config)
            .finish()
    }
}

thread_local! {
    static GLOBAL: Rc<Registry> = Rc::new(Registry::with_config(RegistryConfig::from_env()));
}

/// The calling thread's default registry, configured from the environment
/// on first use.
#[must_use]
pub fn global() -> Rc<Registry> {
    GLOBAL.with(Rc::clone)
}

/// Run `f` against the calling thread's default registry.
pub fn with_global<R>(f: impl FnOnce(&Registry) -> R) -> R {
    GLOBAL.with(|registry| f(registry))
}

/// Observe through the default registry.
pub fn observe(options: ObserveOptions) -> Option<Observed> {
    with_global(|registry| registry.observe(options))
}

/// Unobserve through the default registry.
pub fn unobserve(target: impl Into<Target>, callback: Option<&Callback>) -> usize {
    let target = target.into();
    with_global(|registry| registry.unobserve(target, callback))
}

/// Tear down every observation in the default registry.
pub fn remove_all_observers() {
    with_global(Registry::remove_all_observers);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dispatch;
    use serde_json::{Value, json};
    use std::cell::Cell;

    type Log = Rc<RefCell<Vec<(Value, Value)>>>;

    fn recorder() -> (Log, Callback) {
        let log: Log = Rc::default();
        let log_clone = Rc::clone(&log);
        let cb = Callback::new(move |new: &Value, old: &Value| {
            log_clone.borrow_mut().push((new.clone(), old.clone()))
        });
        (log, cb)
    }

    fn counter() -> (Rc<Cell<u32>>, Callback) {
        let count = Rc::new(Cell::new(0u32));
        let count_clone = Rc::clone(&count);
        let cb = Callback::new(move |_: &Value, _: &Value| count_clone.set(count_clone.get() + 1));
        (count, cb)
    }

    fn object(value: Value) -> Object {
        Object::try_from(value).expect("container")
    }

    #[test]
    fn re_observation_returns_same_facade() {
        let registry = Registry::new();
        let target = object(json!({"n": 0}));
        let (a, cb_a) = counter();
        let (b, cb_b) = counter();

        let first = registry.observe(ObserveOptions::new(&target, cb_a)).expect("facade");
        let second = registry.observe(ObserveOptions::new(&target, cb_b)).expect("facade");
        assert!(first.ptr_eq(&second));
        assert_eq!(registry.len(), 1);
        assert_eq!(registry.callback_count(&target), 2);

        first.as_object().expect("object").set("n", 1).unwrap();
        assert_eq!((a.get(), b.get()), (1, 1));
    }

    #[test]
    fn duplicate_callback_is_registered_once() {
        let registry = Registry::new();
        let target = object(json!({"n": 0}));
        let (count, cb) = counter();
        registry.observe(ObserveOptions::new(&target, cb.clone()));
        registry.observe(ObserveOptions::new(&target, cb));
        target.set("n", 1).unwrap();
        assert_eq!(count.get(), 1);
        assert_eq!(registry.callback_count(&target), 1);
    }

    #[test]
    fn void_target_is_invalid() {
        let registry = Registry::new();
        let (_, cb) = counter();
        assert!(matches!(
            registry.try_observe(ObserveOptions::new((), cb.clone())),
            Err(ObserveError::InvalidTarget)
        ));
        assert!(registry.observe(ObserveOptions::new(Value::Null, cb)).is_none());
        assert!(registry.is_empty());
    }

    #[test]
    fn primitive_boxing_and_teardown() {
        let registry = Registry::new();
        let (log, cb) = recorder();
        let facade = registry
            .observe(ObserveOptions::new(10, cb))
            .and_then(Observed::into_primitive)
            .expect("box");

        facade.set(20);
        assert_eq!(*log.borrow(), vec![(json!(20), json!(10))]);

        assert_eq!(registry.unobserve(20, None), 1);
        assert!(facade.is_unset());
        facade.set(30);
        assert_eq!(log.borrow().len(), 1);
        assert_eq!(facade.get(), Some(json!(30)));
        assert!(registry.is_empty());
    }

    #[test]
    fn each_primitive_observation_is_a_new_box() {
        let registry = Registry::new();
        let (_, cb) = counter();
        let a = registry.observe(ObserveOptions::new("x", cb.clone())).expect("box");
        let b = registry.observe(ObserveOptions::new("x", cb)).expect("box");
        assert!(!a.ptr_eq(&b));
        assert_eq!(registry.find_facades("x").len(), 2);
        assert_eq!(registry.unobserve("x", None), 2);
    }

    #[test]
    fn unobserve_one_callback_keeps_the_rest() {
        let registry = Registry::new();
        let target = object(json!({"n": 0}));
        let (a, cb_a) = counter();
        let (b, cb_b) = counter();
        registry.observe(ObserveOptions::new(&target, cb_a.clone()));
        registry.observe(ObserveOptions::new(&target, cb_b));

        assert_eq!(registry.unobserve(&target, Some(&cb_a)), 0);
        target.set("n", 1).unwrap();
        assert_eq!((a.get(), b.get()), (0, 1));
        assert!(registry.is_observed(&target));

        assert_eq!(registry.unobserve(&target, None), 1);
        target.set("n", 2).unwrap();
        assert_eq!(b.get(), 1);
        assert_eq!(target.notifier_count(), 0);
        assert!(!registry.is_observed(&target));
    }

    #[test]
    fn unobserve_unknown_target_is_a_no_op() {
        let registry = Registry::new();
        let (_, cb) = counter();
        assert_eq!(registry.unobserve(object(json!({})), Some(&cb)), 0);
        assert_eq!(registry.unobserve(5, None), 0);
        assert_eq!(registry.unobserve((), None), 0);
    }

    #[test]
    fn remove_all_silences_everything() {
        let registry = Registry::new();
        let first = object(json!({"a": 1}));
        let second = object(json!([1]));
        let (count, cb) = counter();
        registry.observe(ObserveOptions::new(&first, cb.clone()));
        registry.observe(ObserveOptions::new(&second, cb.clone()));
        let boxed = registry
            .observe(ObserveOptions::new(true, cb))
            .and_then(Observed::into_primitive)
            .expect("box");

        registry.remove_all_observers();
        assert!(registry.is_empty());
        first.set("a", 2).unwrap();
        second.push(2).unwrap();
        boxed.set(false);
        assert_eq!(count.get(), 0);
        assert_eq!(boxed.get(), Some(json!(false)));
    }

    #[test]
    fn torn_down_object_can_be_observed_again() {
        let registry = Registry::new();
        let target = object(json!({"n": 0}));
        let (count, cb) = counter();
        registry.observe(ObserveOptions::new(&target, cb.clone()));
        registry.unobserve(&target, None);
        registry.observe(ObserveOptions::new(&target, cb));
        target.set("n", 1).unwrap();
        assert_eq!(count.get(), 1);
        assert_eq!(target.notifier_count(), 1);
    }

    #[test]
    fn dead_box_revives_when_observed_again() {
        let registry = Registry::new();
        let (count, cb) = counter();
        let facade = registry.observe(ObserveOptions::new(1, cb.clone())).expect("box");
        registry.unobserve(&facade, None);
        let again = registry.observe(ObserveOptions::new(&facade, cb)).expect("box");
        assert!(again.ptr_eq(&facade));
        again.as_primitive().expect("box").set(2);
        assert_eq!(count.get(), 1);
    }

    #[test]
    fn registries_sharing_a_box_keep_separate_callbacks() {
        let first = Registry::new();
        let second = Registry::new();
        let (a, cb_a) = counter();
        let (b, cb_b) = counter();
        let facade = first.observe(ObserveOptions::new(1, cb_a)).expect("box");
        second.observe(ObserveOptions::new(&facade, cb_b));
        let boxed = facade.as_primitive().expect("box");
        assert_eq!(boxed.notifier_count(), 2);

        assert_eq!(second.unobserve(&facade, None), 1);
        assert!(second.is_empty());
        assert_eq!(first.len(), 1);
        assert_eq!(first.callback_count(&facade), 1);
        assert_eq!(boxed.get(), Some(json!(1)), "still live in the first registry");

        boxed.set(2);
        assert_eq!((a.get(), b.get()), (1, 0));

        first.unobserve(&facade, None);
        assert!(boxed.is_unset());
    }

    #[test]
    fn async_primitive_observation_defers_to_drain() {
        let registry = Registry::new();
        let (log, cb) = recorder();
        let boxed = registry
            .observe(ObserveOptions::new("draft", cb).with_async(true))
            .and_then(Observed::into_primitive)
            .expect("box");

        boxed.set("sent");
        assert!(log.borrow().is_empty());
        assert_eq!(dispatch::drain(), 1);
        assert_eq!(*log.borrow(), vec![(json!("sent"), json!("draft"))]);
    }

    #[test]
    fn async_observation_defers_to_drain() {
        let registry = Registry::new();
        let target = object(json!({"n": 0}));
        let (log, cb) = recorder();
        registry.observe(ObserveOptions::new(&target, cb).with_async(true));

        target.set("n", 1).unwrap();
        assert!(log.borrow().is_empty());
        dispatch::drain();
        assert_eq!(*log.borrow(), vec![(json!({"n": 1}), json!({"n": 0}))]);
    }

    #[test]
    fn deferred_callback_removed_before_drain_is_skipped() {
        let registry = Registry::new();
        let target = object(json!({"n": 0}));
        let (count, cb) = counter();
        registry.observe(ObserveOptions::new(&target, cb.clone()).with_async(true));
        target.set("n", 1).unwrap();
        registry.unobserve(&target, Some(&cb));
        dispatch::drain();
        assert_eq!(count.get(), 0);
    }

    #[test]
    fn config_default_async_applies_when_unspecified() {
        let registry = Registry::with_config(RegistryConfig::default().with_default_async(true));
        let target = object(json!({"n": 0}));
        let (count, cb) = counter();
        let facade = registry.observe_object(&target, cb);
        facade.set("n", 1).unwrap();
        assert_eq!(count.get(), 0);
        dispatch::drain();
        assert_eq!(count.get(), 1);
    }

    #[test]
    fn target_of_resolves_raw_targets() {
        let registry = Registry::new();
        let target = object(json!({}));
        let (_, cb) = counter();
        let facade = registry.observe(ObserveOptions::new(&target, cb.clone())).expect("facade");
        assert!(matches!(
            registry.target_of(&facade),
            Some(Target::Object(o)) if o.ptr_eq(&target)
        ));

        let boxed = registry.observe(ObserveOptions::new(7, cb)).expect("box");
        assert!(matches!(registry.target_of(&boxed), Some(Target::Primitive(v)) if v == json!(7)));
        registry.unobserve(&boxed, None);
        assert!(registry.target_of(&boxed).is_none());
    }

    #[test]
    fn callback_may_unobserve_itself() {
        let registry = Rc::new(Registry::new());
        let target = object(json!({"n": 0}));
        let count = Rc::new(Cell::new(0u32));
        let slot: Rc<RefCell<Option<Callback>>> = Rc::default();

        let (reg, tgt, cnt, me) = (
            Rc::clone(&registry),
            target.clone(),
            Rc::clone(&count),
            Rc::clone(&slot),
        );
        let cb = Callback::new(move |_: &Value, _: &Value| {
            cnt.set(cnt.get() + 1);
            if let Some(me) = me.borrow().as_ref() {
                reg.unobserve(&tgt, Some(me));
            }
        });
        *slot.borrow_mut() = Some(cb.clone());
        registry.observe(ObserveOptions::new(&target, cb));

        target.set("n", 1).unwrap();
        target.set("n", 2).unwrap();
        assert_eq!(count.get(), 1);
        assert!(registry.is_empty());
        slot.borrow_mut().take();
    }

    #[test]
    fn global_registry_round_trip() {
        let target = object(json!({"n": 0}));
        let (count, cb) = counter();
        observe(ObserveOptions::new(&target, cb).with_async(false));
        assert!(with_global(|r| r.is_observed(&target)));
        target.set("n", 1).unwrap();
        assert_eq!(count.get(), 1);
        assert_eq!(unobserve(&target, None), 1);
        assert!(Rc::ptr_eq(&global(), &global()));
    }
}
