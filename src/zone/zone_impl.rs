// SPDX-License-Identifier: MIT OR Apache-2.0

//! Core Zone implementation.

use super::callback::{Callback, CallbackResult, TaskId};
use super::spec::{Entry, HookTable, ZoneSpec};
use serde_json::Value;
use std::any::{Any, TypeId};
use std::cell::{OnceCell, RefCell};
use std::collections::{BTreeMap, HashMap};
use std::fmt::{Debug, Display};
use std::hash::{Hash, Hasher};
use std::rc::Rc;
use std::sync::atomic::{AtomicU64, Ordering};

pub(crate) static ZONE_ID: AtomicU64 = AtomicU64::new(0);

/// Unique identifier for a zone.
///
/// IDs are assigned in creation order and never reused within a process.
#[derive(Copy, Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ZoneId(pub(crate) u64);

impl ZoneId {
    /// The raw numeric value.
    pub fn get(self) -> u64 {
        self.0
    }
}

impl Display for ZoneId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

type Extensions = HashMap<TypeId, Rc<dyn Any>>;

/// Internal zone data, shared between clones of a [`Zone`].
pub(crate) struct ZoneInner {
    pub(crate) parent: Option<Zone>,
    pub(crate) zone_id: u64,
    pub(crate) hooks: HookTable,
    pub(crate) data: Rc<BTreeMap<String, Value>>,
    pub(crate) delegates: Rc<BTreeMap<String, Callback>>,
    pub(crate) extensions: Rc<Extensions>,
}

/// A dynamically-scoped execution context that follows callbacks across
/// asynchronous boundaries.
///
/// Zones form a tree. Every zone except the root was forked from a parent and
/// inherits its hooks and data, overriding or composing with them according to the
/// [`ZoneSpec`] given at fork time. A zone never changes after it is created.
///
/// Exactly one zone is *current* on each thread. [`run`](Zone::run) makes a zone
/// current for the duration of a closure and always restores the previous zone
/// afterwards, even if the closure fails or panics.
///
/// # Examples
///
/// ## Forking and running
///
/// ```rust
/// use zonewise::zone::{Zone, ZoneSpec};
/// use serde_json::json;
///
/// let root = Zone::current();
/// let child = root.fork(ZoneSpec::new().data("user", json!("alice")));
///
/// let seen = child.run(|| Ok(Zone::current().data("user").cloned().unwrap_or_default())).unwrap();
/// assert_eq!(seen, json!("alice"));
/// assert_eq!(Zone::current(), root);
/// ```
///
/// ## Binding a callback
///
/// ```rust
/// use zonewise::zone::{Callback, Zone, ZoneSpec};
/// use serde_json::json;
///
/// let zone = Zone::current().fork(ZoneSpec::new().data("origin", json!("click")));
/// let bound = zone.run(|| {
///     let report = Callback::new(|_| Ok(Zone::current().data("origin").cloned().unwrap_or_default()));
///     Ok(json!(Zone::current().bind(&report, false).id().get()))
/// });
/// assert!(bound.is_ok());
/// ```
#[derive(Clone)]
pub struct Zone {
    pub(crate) inner: Rc<ZoneInner>,
}

impl PartialEq for Zone {
    fn eq(&self, other: &Self) -> bool {
        Rc::ptr_eq(&self.inner, &other.inner)
    }
}

impl Eq for Zone {}

impl Hash for Zone {
    fn hash<H: Hasher>(&self, state: &mut H) {
        Rc::as_ptr(&self.inner).hash(state);
    }
}

impl Debug for Zone {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Zone")
            .field("id", &self.inner.zone_id)
            .field("parent", &self.inner.parent.as_ref().map(|p| p.inner.zone_id))
            .field("data", &self.inner.data)
            .finish()
    }
}

impl Display for Zone {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}zone {}", "  ".repeat(self.depth()), self.id())
    }
}

thread_local! {
    static ROOT: OnceCell<Zone> = const { OnceCell::new() };
    static CURRENT: RefCell<Option<Zone>> = const { RefCell::new(None) };
}

/// Restores the previously current zone when dropped.
struct Restore(Option<Zone>);

impl Drop for Restore {
    fn drop(&mut self) {
        if let Some(prior) = self.0.take() {
            Zone::swap_current(prior);
        }
    }
}

/// Holds a zone current between `before_task` and `after_task`.
///
/// `after_task` runs in `drop`, and the prior zone is restored by the `Restore`
/// field afterwards, so restoration also happens if `after_task` panics.
pub(crate) struct Activation {
    zone: Zone,
    _restore: Restore,
}

impl Activation {
    pub(crate) fn begin(zone: &Zone) -> Activation {
        let prior = Zone::swap_current(zone.clone());
        let activation = Activation {
            zone: zone.clone(),
            _restore: Restore(Some(prior)),
        };
        (activation.zone.inner.hooks.before_task)(&activation.zone);
        activation
    }
}

impl Drop for Activation {
    fn drop(&mut self) {
        (self.zone.inner.hooks.after_task)(&self.zone);
    }
}

impl Zone {
    fn new_root() -> Zone {
        Zone {
            inner: Rc::new(ZoneInner {
                parent: None,
                zone_id: ZONE_ID.fetch_add(1, Ordering::Relaxed),
                hooks: HookTable::default(),
                data: Rc::new(BTreeMap::new()),
                delegates: Rc::new(BTreeMap::new()),
                extensions: Rc::new(HashMap::new()),
            }),
        }
    }

    /// Returns the root zone of this thread.
    ///
    /// The root zone has no parent and only default (no-op) hooks. It is created
    /// lazily the first time any zone is requested on a thread.
    pub fn root() -> Zone {
        ROOT.with(|once| once.get_or_init(Zone::new_root).clone())
    }

    /// Returns the zone that is current on this thread.
    ///
    /// Outside of any [`run`](Zone::run), this is the [root](Zone::root) zone.
    ///
    /// ```rust
    /// use zonewise::zone::Zone;
    ///
    /// assert_eq!(Zone::current(), Zone::root());
    /// ```
    #[inline]
    pub fn current() -> Zone {
        let current = CURRENT.with(|slot| slot.borrow().clone());
        current.unwrap_or_else(Zone::root)
    }

    /// Makes `zone` current and returns the zone that was current before.
    pub(crate) fn swap_current(zone: Zone) -> Zone {
        let prior = CURRENT.with(|slot| slot.borrow_mut().replace(zone));
        prior.unwrap_or_else(Zone::root)
    }

    /// Returns this zone's unique id.
    ///
    /// ```rust
    /// use zonewise::zone::{Zone, ZoneSpec};
    ///
    /// let a = Zone::current().fork(ZoneSpec::new());
    /// let b = Zone::current().fork(ZoneSpec::new());
    /// assert_ne!(a.id(), b.id());
    /// assert_eq!(a.id(), a.clone().id());
    /// ```
    #[inline]
    pub fn id(&self) -> ZoneId {
        ZoneId(self.inner.zone_id)
    }

    /// The zone this one was forked from, or `None` for the root.
    pub fn parent(&self) -> Option<&Zone> {
        self.inner.parent.as_ref()
    }

    /// Whether this is the thread's root zone.
    ///
    /// ```rust
    /// use zonewise::zone::{Zone, ZoneSpec};
    ///
    /// assert!(Zone::root().is_root());
    /// assert!(!Zone::root().fork(ZoneSpec::new()).is_root());
    /// ```
    pub fn is_root(&self) -> bool {
        self.inner.parent.is_none()
    }

    /// Iterates over this zone's ancestors, nearest first, ending at the root.
    pub fn ancestors(&self) -> impl Iterator<Item = &Zone> {
        std::iter::successors(self.parent(), |zone| zone.parent())
    }

    /// Returns the number of forks between the root and this zone.
    ///
    /// ```rust
    /// use zonewise::zone::{Zone, ZoneSpec};
    ///
    /// let root = Zone::root();
    /// assert_eq!(root.depth(), 0);
    /// let grandchild = root.fork(ZoneSpec::new()).fork(ZoneSpec::new());
    /// assert_eq!(grandchild.depth(), 2);
    /// ```
    pub fn depth(&self) -> usize {
        self.ancestors().count()
    }

    /// Looks up a user data field set on this zone or inherited from an ancestor.
    pub fn data(&self, key: &str) -> Option<&Value> {
        self.inner.data.get(key)
    }

    /// Looks up a blocking-delegate override such as `alert`.
    pub fn delegate(&self, name: &str) -> Option<&Callback> {
        self.inner.delegates.get(name)
    }

    /// Returns consumer bookkeeping of type `T` attached to this zone or an ancestor.
    pub fn extension<T: 'static>(&self) -> Option<Rc<T>> {
        self.inner
            .extensions
            .get(&TypeId::of::<T>())
            .cloned()
            .and_then(|any| any.downcast::<T>().ok())
    }

    /// Creates a child zone.
    ///
    /// The `on_zone_created` hook of `self` is notified first. The child starts
    /// from `self`'s resolved hooks and data and applies `spec` on top; nothing in
    /// `self` is modified.
    ///
    /// ```rust
    /// use zonewise::zone::{Zone, ZoneSpec};
    ///
    /// let parent = Zone::current();
    /// let child = parent.fork(ZoneSpec::new());
    /// assert_eq!(child.parent(), Some(&parent));
    /// ```
    pub fn fork(&self, spec: ZoneSpec) -> Zone {
        (self.inner.hooks.on_zone_created)(self);

        let mut hooks = self.inner.hooks.clone();
        let mut data = self.inner.data.clone();
        let mut delegates = self.inner.delegates.clone();
        let mut extensions = self.inner.extensions.clone();
        for entry in spec.entries {
            match entry {
                Entry::Hook(compose, hook) => hooks.apply(compose, hook),
                Entry::Decorate(decorator) => hooks.decorate(decorator),
                Entry::Data(key, value) => {
                    Rc::make_mut(&mut data).insert(key, value);
                }
                Entry::Delegate(name, callback) => {
                    Rc::make_mut(&mut delegates).insert(name, callback);
                }
                Entry::Extension(type_id, value) => {
                    Rc::make_mut(&mut extensions).insert(type_id, value);
                }
            }
        }

        let zone_id = ZONE_ID.fetch_add(1, Ordering::Relaxed);
        let parent_id = self.inner.zone_id;
        logwise::debuginternal_sync!("fork zone {child} from {parent}", child = zone_id, parent = parent_id);
        Zone {
            inner: Rc::new(ZoneInner {
                parent: Some(self.clone()),
                zone_id,
                hooks,
                data,
                delegates,
                extensions,
            }),
        }
    }

    /// Wraps `callback` so that it later runs inside a child of this zone.
    ///
    /// The child is forked now, at bind time, so the callback sees the zone that
    /// was current when it was registered rather than when it is invoked. Unless
    /// `skip_enqueue` is set, the `enqueue_task` hook is notified with the
    /// callback's [`TaskId`].
    ///
    /// ```rust
    /// use zonewise::zone::{Callback, Zone, ZoneSpec};
    /// use serde_json::json;
    ///
    /// let registering = Zone::current().fork(ZoneSpec::new().data("phase", json!("register")));
    /// let bound = registering.bind(&Callback::new(|_| Ok(Zone::current().data("phase").cloned().unwrap_or_default())), false);
    ///
    /// let invoking = Zone::current().fork(ZoneSpec::new().data("phase", json!("invoke")));
    /// let seen = invoking.run(|| bound.call(&[])).unwrap();
    /// assert_eq!(seen, json!("register"));
    /// ```
    pub fn bind(&self, callback: &Callback, skip_enqueue: bool) -> Callback {
        if !skip_enqueue {
            self.enqueue_task(Some(callback.id()));
        }
        let zone = self.fork(ZoneSpec::new());
        let task = callback.clone();
        Callback::wrapping(callback, move |args| zone.run(|| task.call(args)))
    }

    /// Like [`bind`](Zone::bind), for callbacks that fire exactly once.
    ///
    /// After the callback returns, whether it succeeded or failed, the
    /// `dequeue_task` hook of this (the binding) zone is notified with the same
    /// [`TaskId`] that was enqueued.
    pub fn bind_once(&self, callback: &Callback) -> Callback {
        let task_id = callback.id();
        self.enqueue_task(Some(task_id));
        let binding = self.clone();
        let zone = self.fork(ZoneSpec::new());
        let task = callback.clone();
        Callback::wrapping(callback, move |args| {
            zone.run(|| {
                let result = task.call(args);
                binding.dequeue_task(Some(task_id));
                result
            })
        })
    }

    /// Runs `f` with this zone current.
    ///
    /// The previous zone is saved, this zone becomes current, `before_task` runs,
    /// then `f`. If `f` fails and this zone has an `on_error` hook, the hook's
    /// value becomes the result; otherwise the failure is returned to the caller.
    /// `after_task` and restoration of the previous zone happen on every exit path,
    /// including panics.
    ///
    /// ```rust
    /// use zonewise::zone::{Failure, Hook, Zone, ZoneSpec};
    /// use serde_json::json;
    ///
    /// let guarded = Zone::current().fork(ZoneSpec::new().hook(Hook::on_error(|_, f| json!(f.message()))));
    /// assert_eq!(guarded.run(|| Err(Failure::new("boom"))).unwrap(), json!("boom"));
    ///
    /// let unguarded = Zone::current().fork(ZoneSpec::new());
    /// assert!(unguarded.run(|| Err(Failure::new("boom"))).is_err());
    /// ```
    pub fn run<F>(&self, f: F) -> CallbackResult
    where
        F: FnOnce() -> CallbackResult,
    {
        let _activation = Activation::begin(self);
        match f() {
            Err(failure) => match &self.inner.hooks.on_error {
                Some(on_error) => Ok(on_error(self, &failure)),
                None => Err(failure),
            },
            ok => ok,
        }
    }

    /// Invokes `callback` with `args` inside this zone.
    pub fn run_callback(&self, callback: &Callback, args: &[Value]) -> CallbackResult {
        self.run(|| callback.call(args))
    }

    /// Runs an infallible closure with this zone current.
    ///
    /// The same activation discipline as [`run`](Zone::run) applies, but no error
    /// handling is involved, so any return type is allowed.
    pub fn enter<R>(&self, f: impl FnOnce() -> R) -> R {
        let _activation = Activation::begin(self);
        f()
    }

    /// Whether this zone, or an ancestor it inherits from, has an `on_error` hook.
    pub fn has_error_handler(&self) -> bool {
        self.inner.hooks.on_error.is_some()
    }

    /// Invokes the resolved `before_task` hook without activating the zone.
    ///
    /// [`run`](Zone::run) and [`enter`](Zone::enter) call this themselves.
    pub fn before_task(&self) {
        (self.inner.hooks.before_task)(self);
    }

    /// Invokes the resolved `after_task` hook.
    pub fn after_task(&self) {
        (self.inner.hooks.after_task)(self);
    }

    /// Notifies the `enqueue_task` hook that asynchronous work was registered.
    pub fn enqueue_task(&self, task: Option<TaskId>) {
        (self.inner.hooks.enqueue_task)(self, task);
    }

    /// Notifies the `dequeue_task` hook that asynchronous work completed or was cancelled.
    pub fn dequeue_task(&self, task: Option<TaskId>) {
        (self.inner.hooks.dequeue_task)(self, task);
    }
}
