// SPDX-License-Identifier: MIT OR Apache-2.0

//! Fork-time zone descriptions and hook composition.

use super::callback::{Callback, Failure, TaskId};
use super::zone_impl::Zone;
use crate::error::Error;
use serde_json::Value;
use std::any::{Any, TypeId};
use std::fmt::{Debug, Display};
use std::rc::Rc;

/// A hook that observes a zone: `before_task`, `after_task`, `on_zone_created`.
pub type TaskHook = Rc<dyn Fn(&Zone)>;
/// A hook that observes queued work: `enqueue_task`, `dequeue_task`.
pub type QueueHook = Rc<dyn Fn(&Zone, Option<TaskId>)>;
/// A hook that recovers from a callback failure; its value becomes the result.
pub type ErrorHook = Rc<dyn Fn(&Zone, &Failure) -> Value>;

/// The closed set of extension points a zone exposes.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum HookKind {
    BeforeTask,
    AfterTask,
    OnZoneCreated,
    EnqueueTask,
    DequeueTask,
    OnError,
}

impl HookKind {
    pub const ALL: [HookKind; 6] = [
        HookKind::BeforeTask,
        HookKind::AfterTask,
        HookKind::OnZoneCreated,
        HookKind::EnqueueTask,
        HookKind::DequeueTask,
        HookKind::OnError,
    ];

    /// The conventional camel-case name, as used in sigil keys like `+beforeTask`.
    pub fn name(self) -> &'static str {
        match self {
            HookKind::BeforeTask => "beforeTask",
            HookKind::AfterTask => "afterTask",
            HookKind::OnZoneCreated => "onZoneCreated",
            HookKind::EnqueueTask => "enqueueTask",
            HookKind::DequeueTask => "dequeueTask",
            HookKind::OnError => "onError",
        }
    }

    pub fn from_name(name: &str) -> Option<HookKind> {
        HookKind::ALL.into_iter().find(|kind| kind.name() == name)
    }
}

impl Display for HookKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// How a hook supplied at fork time combines with the parent's hook of the same kind.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Default)]
pub enum Compose {
    /// Replace the parent's hook outright.
    #[default]
    Replace,
    /// Run the parent's hook first, then this one. The parent's result wins.
    After,
    /// Run this hook first, then the parent's. The parent's result wins.
    Before,
}

impl Compose {
    /// Splits a sigil key such as `+beforeTask` into its combinator and hook name.
    pub fn split_key(key: &str) -> (Compose, &str) {
        if let Some(rest) = key.strip_prefix('+') {
            (Compose::After, rest)
        } else if let Some(rest) = key.strip_prefix('-') {
            (Compose::Before, rest)
        } else {
            (Compose::Replace, key)
        }
    }
}

/// A hook implementation, tagged with the extension point it fills.
#[derive(Clone)]
pub enum Hook {
    BeforeTask(TaskHook),
    AfterTask(TaskHook),
    OnZoneCreated(TaskHook),
    EnqueueTask(QueueHook),
    DequeueTask(QueueHook),
    OnError(ErrorHook),
}

impl Hook {
    /// Runs each time a zone is activated by [`Zone::run`] or [`Zone::enter`].
    ///
    /// ```rust
    /// use zonewise::zone::{Hook, Zone, ZoneSpec};
    /// use std::cell::Cell;
    /// use std::rc::Rc;
    ///
    /// let turns = Rc::new(Cell::new(0));
    /// let counter = turns.clone();
    /// let zone = Zone::current().fork(ZoneSpec::new().hook(Hook::before_task(move |_| counter.set(counter.get() + 1))));
    /// zone.enter(|| ());
    /// zone.enter(|| ());
    /// assert_eq!(turns.get(), 2);
    /// ```
    pub fn before_task(f: impl Fn(&Zone) + 'static) -> Hook {
        Hook::BeforeTask(Rc::new(f))
    }

    /// Runs when an activation ends, including by panic.
    pub fn after_task(f: impl Fn(&Zone) + 'static) -> Hook {
        Hook::AfterTask(Rc::new(f))
    }

    /// Runs on a zone each time it forks a child. Receives the forking zone.
    pub fn on_zone_created(f: impl Fn(&Zone) + 'static) -> Hook {
        Hook::OnZoneCreated(Rc::new(f))
    }

    /// Runs when asynchronous work is registered from the zone.
    pub fn enqueue_task(f: impl Fn(&Zone, Option<TaskId>) + 'static) -> Hook {
        Hook::EnqueueTask(Rc::new(f))
    }

    /// Runs when registered work completes or is cancelled.
    pub fn dequeue_task(f: impl Fn(&Zone, Option<TaskId>) + 'static) -> Hook {
        Hook::DequeueTask(Rc::new(f))
    }

    /// Recovers a failure raised inside [`Zone::run`]. The returned value
    /// becomes the run's result.
    pub fn on_error(f: impl Fn(&Zone, &Failure) -> Value + 'static) -> Hook {
        Hook::OnError(Rc::new(f))
    }

    pub fn kind(&self) -> HookKind {
        match self {
            Hook::BeforeTask(_) => HookKind::BeforeTask,
            Hook::AfterTask(_) => HookKind::AfterTask,
            Hook::OnZoneCreated(_) => HookKind::OnZoneCreated,
            Hook::EnqueueTask(_) => HookKind::EnqueueTask,
            Hook::DequeueTask(_) => HookKind::DequeueTask,
            Hook::OnError(_) => HookKind::OnError,
        }
    }
}

impl Debug for Hook {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Hook({})", self.kind())
    }
}

/// A function that receives the parent's hook (or a no-op) and returns the new hook.
pub enum Decorator {
    BeforeTask(Box<dyn FnOnce(TaskHook) -> TaskHook>),
    AfterTask(Box<dyn FnOnce(TaskHook) -> TaskHook>),
    OnZoneCreated(Box<dyn FnOnce(TaskHook) -> TaskHook>),
    EnqueueTask(Box<dyn FnOnce(QueueHook) -> QueueHook>),
    DequeueTask(Box<dyn FnOnce(QueueHook) -> QueueHook>),
    OnError(Box<dyn FnOnce(ErrorHook) -> ErrorHook>),
}

impl Decorator {
    pub fn kind(&self) -> HookKind {
        match self {
            Decorator::BeforeTask(_) => HookKind::BeforeTask,
            Decorator::AfterTask(_) => HookKind::AfterTask,
            Decorator::OnZoneCreated(_) => HookKind::OnZoneCreated,
            Decorator::EnqueueTask(_) => HookKind::EnqueueTask,
            Decorator::DequeueTask(_) => HookKind::DequeueTask,
            Decorator::OnError(_) => HookKind::OnError,
        }
    }
}

pub(crate) enum Entry {
    Hook(Compose, Hook),
    Decorate(Decorator),
    Data(String, Value),
    Delegate(String, Callback),
    Extension(TypeId, Rc<dyn Any>),
}

/// Everything a forked zone adds on top of its parent.
///
/// Entries are applied in the order they were added, so a later entry for the
/// same hook composes with the result of an earlier one.
///
/// ```rust
/// use zonewise::zone::{Hook, Zone, ZoneSpec};
/// use serde_json::json;
/// use std::cell::Cell;
/// use std::rc::Rc;
///
/// let runs = Rc::new(Cell::new(0));
/// let counter = runs.clone();
/// let zone = Zone::current().fork(
///     ZoneSpec::new()
///         .data("request", json!({"id": 7}))
///         .hook_after(Hook::before_task(move |_| counter.set(counter.get() + 1))),
/// );
/// zone.run(|| Ok(json!(null))).unwrap();
/// assert_eq!(runs.get(), 1);
/// assert_eq!(zone.data("request").unwrap()["id"], json!(7));
/// ```
#[derive(Default)]
pub struct ZoneSpec {
    pub(crate) entries: Vec<Entry>,
}

impl ZoneSpec {
    /// An empty spec. Forking with it yields a child identical to its parent.
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether nothing has been added to the spec.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Replaces the parent's hook of the same kind.
    pub fn hook(self, hook: Hook) -> Self {
        self.compose(Compose::Replace, hook)
    }

    /// Runs `hook` after the parent's hook of the same kind.
    pub fn hook_after(self, hook: Hook) -> Self {
        self.compose(Compose::After, hook)
    }

    /// Runs `hook` before the parent's hook of the same kind.
    pub fn hook_before(self, hook: Hook) -> Self {
        self.compose(Compose::Before, hook)
    }

    /// Adds `hook`, combined with the parent's hook as `compose` says.
    pub fn compose(mut self, compose: Compose, hook: Hook) -> Self {
        self.entries.push(Entry::Hook(compose, hook));
        self
    }

    /// Adds a decorator. It receives the parent's hook of its kind, if any, and
    /// returns the hook this zone uses.
    pub fn decorate(mut self, decorator: Decorator) -> Self {
        self.entries.push(Entry::Decorate(decorator));
        self
    }

    /// Adds a hook using the sigil key form: `name`, `+name` or `-name`.
    ///
    /// ```rust
    /// use zonewise::zone::{Hook, ZoneSpec};
    ///
    /// assert!(ZoneSpec::new().with_key("+afterTask", Hook::after_task(|_| {})).is_ok());
    /// assert!(ZoneSpec::new().with_key("-beforeTask", Hook::after_task(|_| {})).is_err());
    /// ```
    pub fn with_key(self, key: &str, hook: Hook) -> Result<Self, Error> {
        let (compose, name) = Compose::split_key(key);
        let kind = HookKind::from_name(name).ok_or_else(|| Error::UnknownHook(key.to_string()))?;
        if kind != hook.kind() {
            return Err(Error::HookMismatch {
                key: key.to_string(),
                kind: hook.kind(),
            });
        }
        Ok(self.compose(compose, hook))
    }

    /// Sets a user data field. The value is owned by the new zone.
    pub fn data(mut self, key: impl Into<String>, value: Value) -> Self {
        self.entries.push(Entry::Data(key.into(), value));
        self
    }

    /// Overrides a blocking delegate (such as `alert`) for code running in the new zone.
    pub fn delegate(mut self, name: impl Into<String>, callback: Callback) -> Self {
        self.entries.push(Entry::Delegate(name.into(), callback));
        self
    }

    /// Attaches consumer bookkeeping, retrievable with [`Zone::extension`].
    pub fn extension<T: 'static>(mut self, value: T) -> Self {
        self.entries
            .push(Entry::Extension(TypeId::of::<T>(), Rc::new(value)));
        self
    }
}

impl Debug for ZoneSpec {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut list = f.debug_list();
        for entry in &self.entries {
            match entry {
                Entry::Hook(compose, hook) => list.entry(&(compose, hook.kind())),
                Entry::Decorate(d) => list.entry(&("decorate", d.kind())),
                Entry::Data(key, _) => list.entry(&("data", key)),
                Entry::Delegate(name, _) => list.entry(&("delegate", name)),
                Entry::Extension(id, _) => list.entry(&("extension", id)),
            };
        }
        list.finish()
    }
}

fn noop_task() -> TaskHook {
    Rc::new(|_| {})
}

fn noop_queue() -> QueueHook {
    Rc::new(|_, _| {})
}

fn compose_task(compose: Compose, parent: TaskHook, child: TaskHook) -> TaskHook {
    match compose {
        Compose::Replace => child,
        Compose::After => Rc::new(move |zone| {
            parent(zone);
            child(zone);
        }),
        Compose::Before => Rc::new(move |zone| {
            child(zone);
            parent(zone);
        }),
    }
}

fn compose_queue(compose: Compose, parent: QueueHook, child: QueueHook) -> QueueHook {
    match compose {
        Compose::Replace => child,
        Compose::After => Rc::new(move |zone, task| {
            parent(zone, task);
            child(zone, task);
        }),
        Compose::Before => Rc::new(move |zone, task| {
            child(zone, task);
            parent(zone, task);
        }),
    }
}

fn compose_error(compose: Compose, parent: Option<ErrorHook>, child: ErrorHook) -> ErrorHook {
    let Some(parent) = parent else {
        return child;
    };
    match compose {
        Compose::Replace => child,
        Compose::After => Rc::new(move |zone, failure| {
            let result = parent(zone, failure);
            child(zone, failure);
            result
        }),
        Compose::Before => Rc::new(move |zone, failure| {
            child(zone, failure);
            parent(zone, failure)
        }),
    }
}

/// The fully resolved hooks of one zone.
#[derive(Clone)]
pub(crate) struct HookTable {
    pub(crate) before_task: TaskHook,
    pub(crate) after_task: TaskHook,
    pub(crate) on_zone_created: TaskHook,
    pub(crate) enqueue_task: QueueHook,
    pub(crate) dequeue_task: QueueHook,
    pub(crate) on_error: Option<ErrorHook>,
}

impl Default for HookTable {
    fn default() -> Self {
        HookTable {
            before_task: noop_task(),
            after_task: noop_task(),
            on_zone_created: noop_task(),
            enqueue_task: noop_queue(),
            dequeue_task: noop_queue(),
            on_error: None,
        }
    }
}

impl HookTable {
    pub(crate) fn apply(&mut self, compose: Compose, hook: Hook) {
        match hook {
            Hook::BeforeTask(h) => {
                self.before_task = compose_task(compose, self.before_task.clone(), h)
            }
            Hook::AfterTask(h) => self.after_task = compose_task(compose, self.after_task.clone(), h),
            Hook::OnZoneCreated(h) => {
                self.on_zone_created = compose_task(compose, self.on_zone_created.clone(), h)
            }
            Hook::EnqueueTask(h) => {
                self.enqueue_task = compose_queue(compose, self.enqueue_task.clone(), h)
            }
            Hook::DequeueTask(h) => {
                self.dequeue_task = compose_queue(compose, self.dequeue_task.clone(), h)
            }
            Hook::OnError(h) => self.on_error = Some(compose_error(compose, self.on_error.take(), h)),
        }
    }

    pub(crate) fn decorate(&mut self, decorator: Decorator) {
        match decorator {
            Decorator::BeforeTask(d) => self.before_task = d(self.before_task.clone()),
            Decorator::AfterTask(d) => self.after_task = d(self.after_task.clone()),
            Decorator::OnZoneCreated(d) => self.on_zone_created = d(self.on_zone_created.clone()),
            Decorator::EnqueueTask(d) => self.enqueue_task = d(self.enqueue_task.clone()),
            Decorator::DequeueTask(d) => self.dequeue_task = d(self.dequeue_task.clone()),
            Decorator::OnError(d) => {
                let parent = self
                    .on_error
                    .take()
                    .unwrap_or_else(|| Rc::new(|_, _| Value::Null));
                self.on_error = Some(d(parent));
            }
        }
    }
}
