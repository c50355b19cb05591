// SPDX-License-Identifier: MIT OR Apache-2.0

//! The host environment surface that zones intercept.
//!
//! A host (a browser window, a test harness, an embedding runtime) exposes its
//! asynchronous registration APIs to zonewise through the traits in this module,
//! one trait per API family. [`Host`] gathers them into optional slots, the
//! analog of properties on a global object: a slot that is `None` is an API the
//! host does not have.
//!
//! [`patch::install`](crate::patch::install) swaps each present slot for an
//! intercepting wrapper. Code that registers callbacks through the `Host` after
//! installation gets zone propagation without knowing about it.
//!
//! [`sim::SimHost`] is a complete in-process implementation of every trait.

pub mod sim;

use crate::error::Error;
use crate::sys::Duration;
use crate::zone::{Callback, CallbackResult};
use serde_json::Value;
use std::collections::BTreeMap;
use std::fmt::{Debug, Display};
use std::rc::Rc;

macro_rules! handle_type {
    ($(#[$meta:meta])* $name:ident, $prefix:literal) => {
        $(#[$meta])*
        #[derive(Copy, Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
        pub struct $name(pub u64);

        impl Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                write!(f, concat!($prefix, "#{}"), self.0)
            }
        }
    };
}

handle_type!(
    /// A pending timer, immediate or animation frame, as returned by its `set` call.
    HandleId,
    "handle"
);
handle_type!(
    /// A node in the host's document tree. Nodes are also event targets.
    NodeId,
    "node"
);
handle_type!(
    /// An object in the host's property model.
    ObjectId,
    "object"
);
handle_type!(PromiseId, "promise");

/// A value stored in a host property or passed as an argument: plain data, or a function.
#[derive(Clone, Debug, PartialEq)]
pub enum Slot {
    Value(Value),
    Callback(Callback),
}

impl Slot {
    pub fn as_callback(&self) -> Option<&Callback> {
        match self {
            Slot::Callback(callback) => Some(callback),
            Slot::Value(_) => None,
        }
    }

    pub fn as_value(&self) -> Option<&Value> {
        match self {
            Slot::Value(value) => Some(value),
            Slot::Callback(_) => None,
        }
    }
}

impl Default for Slot {
    fn default() -> Self {
        Slot::Value(Value::Null)
    }
}

impl From<Value> for Slot {
    fn from(value: Value) -> Self {
        Slot::Value(value)
    }
}

impl From<Callback> for Slot {
    fn from(callback: Callback) -> Self {
        Slot::Callback(callback)
    }
}

/// A property descriptor.
///
/// A descriptor with `get` or `set` is an accessor; otherwise it is a data
/// property holding `value`.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Descriptor {
    pub value: Option<Slot>,
    pub writable: bool,
    pub enumerable: bool,
    pub configurable: bool,
    pub get: Option<Callback>,
    pub set: Option<Callback>,
}

impl Descriptor {
    /// A writable, enumerable, configurable data property.
    pub fn data(value: impl Into<Slot>) -> Self {
        Descriptor {
            value: Some(value.into()),
            writable: true,
            enumerable: true,
            configurable: true,
            get: None,
            set: None,
        }
    }

    pub fn configurable(mut self, configurable: bool) -> Self {
        self.configurable = configurable;
        self
    }

    pub fn is_accessor(&self) -> bool {
        self.get.is_some() || self.set.is_some()
    }
}

/// Which set/clear pair a [`SetClear`] slot implements.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum TimerKind {
    Timeout,
    Interval,
    Immediate,
}

impl TimerKind {
    pub const ALL: [TimerKind; 3] = [TimerKind::Timeout, TimerKind::Interval, TimerKind::Immediate];

    /// Whether a callback registered with this kind fires more than once.
    pub fn repeats(self) -> bool {
        matches!(self, TimerKind::Interval)
    }

    pub fn name(self) -> &'static str {
        match self {
            TimerKind::Timeout => "timeout",
            TimerKind::Interval => "interval",
            TimerKind::Immediate => "immediate",
        }
    }
}

/// A set/clear pair such as `setTimeout`/`clearTimeout`.
pub trait SetClear {
    fn set(&self, callback: Callback, delay: Duration) -> HandleId;
    fn clear(&self, handle: HandleId);
}

/// A single-shot registration such as `requestAnimationFrame`.
pub trait FrameRequest {
    fn request(&self, callback: Callback) -> HandleId;
    fn cancel(&self, handle: HandleId);
}

/// A blocking function such as `alert` or `prompt`.
pub trait BlockingCall {
    fn call(&self, args: &[Value]) -> CallbackResult;
}

/// Listener registration on event targets.
///
/// Listeners are identified by the callback passed in, so removal must pass a
/// callback equal to the one that was added.
pub trait EventTargetApi {
    fn add_event_listener(&self, target: NodeId, event: &str, listener: Callback, capture: bool);
    fn remove_event_listener(&self, target: NodeId, event: &str, listener: &Callback, capture: bool);
}

/// Inline `on*` handler properties of nodes, such as `onclick`.
pub trait HandlerProperties {
    fn get_handler(&self, node: NodeId, property: &str) -> Option<Callback>;
    fn set_handler(&self, node: NodeId, property: &str, handler: Option<Callback>);
    /// Whether the host lets handler properties be replaced with accessors per instance.
    fn supports_accessor_override(&self) -> bool;
}

/// Navigation of the document tree.
pub trait DocumentApi {
    /// The document node, where capture-phase dispatch starts.
    fn root(&self) -> NodeId;
    fn parent_element(&self, node: NodeId) -> Option<NodeId>;
}

/// `then`/`catch` registration on promises.
pub trait PromiseApi {
    fn then(&self, promise: PromiseId, on_fulfilled: Option<Callback>, on_rejected: Option<Callback>) -> PromiseId;
    fn catch(&self, promise: PromiseId, on_rejected: Callback) -> PromiseId;
}

/// A constructible host class, such as `XMLHttpRequest`.
pub trait HostClass {
    fn construct(&self, args: &[Slot]) -> Rc<dyn HostObject>;
}

/// An instance of a [`HostClass`].
pub trait HostObject {
    fn call(&self, method: &str, args: &[Slot]) -> CallbackResult;
    fn get(&self, property: &str) -> Slot;
    fn set(&self, property: &str, value: Slot);
}

/// An observer class, such as `MutationObserver`.
pub trait ObserverClass {
    fn construct(&self, callback: Callback) -> Rc<dyn ObserverInstance>;
}

pub trait ObserverInstance {
    fn observe(&self, target: NodeId, options: &Value) -> Result<(), Error>;
    fn disconnect(&self);
    /// Removes and returns the records not yet delivered to the callback.
    fn take_records(&self) -> Vec<Value>;
}

/// Property-definition primitives: `defineProperty` and friends.
pub trait PropertyModel {
    fn define_property(&self, object: ObjectId, property: &str, descriptor: Descriptor) -> Result<(), Error>;
    fn define_properties(&self, object: ObjectId, properties: Vec<(String, Descriptor)>) -> Result<(), Error>;
    fn get_own_property_descriptor(&self, object: ObjectId, property: &str) -> Option<Descriptor>;
    /// Creates an object with the given prototype and own properties.
    fn create(&self, prototype: Option<ObjectId>, properties: Vec<(String, Descriptor)>) -> Result<ObjectId, Error>;
}

/// Custom-element registration, such as `document.registerElement`.
pub trait ElementRegistry {
    fn register_element(&self, name: &str, prototype: ObjectId) -> Result<(), Error>;
}

/// The host global object: every API family the host provides, or `None` if it
/// does not provide it.
///
/// ```rust
/// use zonewise::host::Host;
///
/// let bare = Host::default();
/// assert!(bare.timeout.is_none());
/// assert!(!bare.is_installed());
/// ```
#[derive(Clone, Default)]
pub struct Host {
    pub timeout: Option<Rc<dyn SetClear>>,
    pub interval: Option<Rc<dyn SetClear>>,
    pub immediate: Option<Rc<dyn SetClear>>,
    pub request_animation_frame: Option<Rc<dyn FrameRequest>>,
    pub moz_request_animation_frame: Option<Rc<dyn FrameRequest>>,
    pub webkit_request_animation_frame: Option<Rc<dyn FrameRequest>>,
    pub alert: Option<Rc<dyn BlockingCall>>,
    pub prompt: Option<Rc<dyn BlockingCall>>,
    /// The shared event-target prototype, when the host has one.
    pub event_target: Option<Rc<dyn EventTargetApi>>,
    /// Per-class listener APIs, for hosts without a shared event-target prototype.
    pub event_target_classes: BTreeMap<String, Rc<dyn EventTargetApi>>,
    pub handlers: Option<Rc<dyn HandlerProperties>>,
    pub document: Option<Rc<dyn DocumentApi>>,
    pub xml_http_request: Option<Rc<dyn HostClass>>,
    pub promise: Option<Rc<dyn PromiseApi>>,
    pub mutation_observer: Option<Rc<dyn ObserverClass>>,
    pub webkit_mutation_observer: Option<Rc<dyn ObserverClass>>,
    pub properties: Option<Rc<dyn PropertyModel>>,
    pub elements: Option<Rc<dyn ElementRegistry>>,
    pub(crate) installed: bool,
}

impl Host {
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether zone interception has been installed into this host.
    pub fn is_installed(&self) -> bool {
        self.installed
    }

    pub fn set_clear(&self, kind: TimerKind) -> Option<&Rc<dyn SetClear>> {
        match kind {
            TimerKind::Timeout => self.timeout.as_ref(),
            TimerKind::Interval => self.interval.as_ref(),
            TimerKind::Immediate => self.immediate.as_ref(),
        }
    }

    pub(crate) fn set_clear_mut(&mut self, kind: TimerKind) -> &mut Option<Rc<dyn SetClear>> {
        match kind {
            TimerKind::Timeout => &mut self.timeout,
            TimerKind::Interval => &mut self.interval,
            TimerKind::Immediate => &mut self.immediate,
        }
    }

    /// The listener API to use for `target`s of any class: the shared prototype
    /// if present, else the `Node` class.
    pub fn node_events(&self) -> Option<&Rc<dyn EventTargetApi>> {
        self.event_target
            .as_ref()
            .or_else(|| self.event_target_classes.get("Node"))
    }
}

impl Debug for Host {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Host")
            .field("timeout", &self.timeout.is_some())
            .field("interval", &self.interval.is_some())
            .field("immediate", &self.immediate.is_some())
            .field("request_animation_frame", &self.request_animation_frame.is_some())
            .field("alert", &self.alert.is_some())
            .field("prompt", &self.prompt.is_some())
            .field("event_target", &self.event_target.is_some())
            .field("event_target_classes", &self.event_target_classes.keys().collect::<Vec<_>>())
            .field("handlers", &self.handlers.is_some())
            .field("xml_http_request", &self.xml_http_request.is_some())
            .field("promise", &self.promise.is_some())
            .field("mutation_observer", &self.mutation_observer.is_some())
            .field("properties", &self.properties.is_some())
            .field("elements", &self.elements.is_some())
            .field("installed", &self.installed)
            .finish()
    }
}
