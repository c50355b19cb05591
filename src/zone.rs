// SPDX-License-Identifier: MIT OR Apache-2.0

//! Thread-local zones: dynamically-scoped contexts that follow callbacks.
//!
//! A [`Zone`] is a node in a tree of execution contexts. Zones carry lifecycle
//! hooks and user data, and one of them is *current* on each thread. When a
//! callback is [bound](Zone::bind) it captures the current zone, so that when the
//! host environment eventually invokes it, it runs inside that zone again.
//!
//! # Overview
//!
//! - [`Zone`]: the context itself, with the fork / bind / run protocol
//! - [`ZoneSpec`]: what a forked zone adds to its parent (hooks, data, delegates,
//!   consumer extensions)
//! - [`Hook`] and [`Decorator`]: the closed set of extension points and the ways
//!   they compose with a parent's hooks
//! - [`Callback`]: a function a host API will invoke later
//! - [`ApplyZone`]: a [`Future`](std::future::Future) wrapper that keeps a zone
//!   current while the future is polled
//!
//! # Hook composition
//!
//! Each hook supplied at fork time combines with the parent's hook of the same kind:
//!
//! | Sigil  | API                      | Behavior                                         |
//! |--------|--------------------------|--------------------------------------------------|
//! | `name` | [`ZoneSpec::hook`]        | replaces the parent's hook                       |
//! | `+name`| [`ZoneSpec::hook_after`]  | parent first, then this; parent's result returned |
//! | `-name`| [`ZoneSpec::hook_before`] | this first, then parent; parent's result returned |
//! | `$name`| [`ZoneSpec::decorate`]    | receives the parent's hook, returns the new one  |
//!
//! ```rust
//! use zonewise::zone::{Hook, Zone, ZoneSpec};
//! use std::cell::RefCell;
//! use std::rc::Rc;
//!
//! let order = Rc::new(RefCell::new(Vec::new()));
//! let (a, b) = (order.clone(), order.clone());
//! let parent = Zone::current().fork(ZoneSpec::new().hook(Hook::before_task(move |_| a.borrow_mut().push("parent"))));
//! let child = parent.fork(ZoneSpec::new().hook_before(Hook::before_task(move |_| b.borrow_mut().push("child"))));
//!
//! child.enter(|| ());
//! assert_eq!(*order.borrow(), vec!["child", "parent"]);
//! ```
//!
//! # Pending work
//!
//! `enqueue_task` and `dequeue_task` let a zone count outstanding asynchronous
//! work. [`Zone::bind`] enqueues, [`Zone::bind_once`] enqueues and dequeues when
//! the callback has run, and the interception layer dequeues when pending work is
//! cancelled.

mod apply_zone;
mod callback;
mod spec;
mod zone_impl;


pub use apply_zone::ApplyZone;
pub use callback::{Callback, CallbackResult, Failure, TaskId};
pub use spec::{Compose, Decorator, ErrorHook, Hook, HookKind, QueueHook, TaskHook, ZoneSpec};
pub use zone_impl::{Zone, ZoneId};
