// SPDX-License-Identifier: MIT OR Apache-2.0

//! Callbacks handed to host APIs, and the failures they can raise.

use serde_json::Value;
use std::fmt::{Debug, Display};
use std::rc::Rc;
use std::sync::atomic::{AtomicU64, Ordering};

pub(crate) static TASK_ID: AtomicU64 = AtomicU64::new(0);

/// Unique identifier for a callback.
///
/// Every [`Callback`] gets a monotonically increasing ID that is unique across the
/// process lifetime. Zones receive it in their `enqueue_task` and `dequeue_task`
/// hooks, so bookkeeping can pair registrations with completions.
#[derive(Copy, Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct TaskId(pub(crate) u64);

impl TaskId {
    /// The raw numeric value.
    pub fn get(self) -> u64 {
        self.0
    }
}

impl Display for TaskId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// An error raised by a callback while it runs.
///
/// This is the analog of a thrown exception. A zone with an `on_error` hook
/// recovers from it; otherwise it propagates to whoever invoked the callback.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
#[error("{message}")]
pub struct Failure {
    message: String,
    payload: Value,
}

impl Failure {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            payload: Value::Null,
        }
    }

    /// Attaches a structured payload to the failure.
    pub fn with_payload(mut self, payload: Value) -> Self {
        self.payload = payload;
        self
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    pub fn payload(&self) -> &Value {
        &self.payload
    }
}

/// The result every callback produces.
pub type CallbackResult = Result<Value, Failure>;

struct CallbackInner {
    id: TaskId,
    func: Box<dyn Fn(&[Value]) -> CallbackResult>,
    unbound: Option<Callback>,
}

/// A reference-counted function that a host API can invoke later.
///
/// Cloning a callback is cheap and preserves its identity: clones share the same
/// [`TaskId`] and compare equal. Callbacks produced by [`Zone::bind`](super::Zone::bind)
/// remember the callback they wrap, which lets listener removal find the wrapper
/// that was actually registered.
///
/// ```rust
/// use zonewise::zone::Callback;
/// use serde_json::json;
///
/// let double = Callback::new(|args| Ok(json!(args[0].as_i64().unwrap_or(0) * 2)));
/// assert_eq!(double.call(&[json!(21)]).unwrap(), json!(42));
/// ```
#[derive(Clone)]
pub struct Callback {
    inner: Rc<CallbackInner>,
}

impl Callback {
    pub fn new<F>(f: F) -> Self
    where
        F: Fn(&[Value]) -> CallbackResult + 'static,
    {
        Self::build(f, None)
    }

    /// A callback that ignores its arguments and always succeeds with `null`.
    pub fn from_fn<F>(f: F) -> Self
    where
        F: Fn() + 'static,
    {
        Self::new(move |_| {
            f();
            Ok(Value::Null)
        })
    }

    /// Creates a wrapper around `original` that keeps a back-reference to it.
    pub(crate) fn wrapping<F>(original: &Callback, f: F) -> Self
    where
        F: Fn(&[Value]) -> CallbackResult + 'static,
    {
        Self::build(f, Some(original.clone()))
    }

    fn build<F>(f: F, unbound: Option<Callback>) -> Self
    where
        F: Fn(&[Value]) -> CallbackResult + 'static,
    {
        Callback {
            inner: Rc::new(CallbackInner {
                id: TaskId(TASK_ID.fetch_add(1, Ordering::Relaxed)),
                func: Box::new(f),
                unbound,
            }),
        }
    }

    #[inline]
    pub fn call(&self, args: &[Value]) -> CallbackResult {
        (self.inner.func)(args)
    }

    #[inline]
    pub fn id(&self) -> TaskId {
        self.inner.id
    }

    /// The callback this one wraps, if it was produced by binding.
    pub fn unbound(&self) -> Option<&Callback> {
        self.inner.unbound.as_ref()
    }

    /// Follows `unbound` links back to the callback the user originally supplied.
    pub fn original(&self) -> &Callback {
        let mut current = self;
        while let Some(inner) = current.unbound() {
            current = inner;
        }
        current
    }

    pub fn is_bound(&self) -> bool {
        self.inner.unbound.is_some()
    }
}

impl PartialEq for Callback {
    fn eq(&self, other: &Self) -> bool {
        Rc::ptr_eq(&self.inner, &other.inner)
    }
}

impl Eq for Callback {}

impl Debug for Callback {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Callback")
            .field("id", &self.inner.id)
            .field("unbound", &self.inner.unbound.as_ref().map(|c| c.id()))
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn clones_share_identity() {
        let a = Callback::from_fn(|| {});
        let b = a.clone();
        let c = Callback::from_fn(|| {});
        assert_eq!(a, b);
        assert_eq!(a.id(), b.id());
        assert_ne!(a, c);
        assert!(a.id() < c.id());
    }

    #[test]
    fn wrapping_keeps_back_reference() {
        let original = Callback::new(|_| Ok(json!("inner")));
        let inner = original.clone();
        let wrapper = Callback::wrapping(&original, move |args| inner.call(args));
        let outer = Callback::wrapping(&wrapper, |_| Ok(Value::Null));

        assert!(wrapper.is_bound());
        assert_eq!(wrapper.unbound(), Some(&original));
        assert_eq!(outer.original(), &original);
        assert_eq!(wrapper.call(&[]).unwrap(), json!("inner"));
        assert!(!original.is_bound());
    }

    #[test]
    fn failure_carries_payload() {
        let failure = Failure::new("boom").with_payload(json!({"code": 7}));
        assert_eq!(failure.to_string(), "boom");
        assert_eq!(failure.payload()["code"], json!(7));
    }
}
