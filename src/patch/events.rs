// SPDX-License-Identifier: MIT OR Apache-2.0

//! Event-target listeners and inline `on*` handler properties.

use super::PatchReport;
use crate::config::{Config, InlineHandlerStrategy};
use crate::host::{DocumentApi, EventTargetApi, HandlerProperties, Host, NodeId};
use crate::zone::{Callback, TaskId, Zone};
use serde_json::Value;
use std::cell::RefCell;
use std::collections::{HashMap, HashSet};
use std::rc::Rc;

/// Host classes that carry listener methods when there is no shared prototype.
pub const EVENT_TARGET_CLASSES: &[&str] = &[
    "ApplicationCache",
    "EventSource",
    "FileReader",
    "InputMethodContext",
    "MediaController",
    "MessagePort",
    "Node",
    "Performance",
    "SVGElementInstance",
    "SharedWorker",
    "TextTrack",
    "TextTrackCue",
    "TextTrackList",
    "WebKitNamedFlow",
    "Window",
    "Worker",
    "WorkerGlobalScope",
    "XMLHttpRequestEventTarget",
    "XMLHttpRequestUpload",
];

type ListenerKey = (NodeId, String, TaskId, bool);

/// Binds listeners on add and finds the bound wrapper again on remove.
struct PatchedEventTarget {
    delegate: Rc<dyn EventTargetApi>,
    bound: RefCell<HashMap<ListenerKey, Callback>>,
}

impl PatchedEventTarget {
    fn wrap(delegate: Rc<dyn EventTargetApi>) -> Rc<dyn EventTargetApi> {
        Rc::new(PatchedEventTarget {
            delegate,
            bound: RefCell::new(HashMap::new()),
        })
    }
}

impl EventTargetApi for PatchedEventTarget {
    fn add_event_listener(&self, target: NodeId, event: &str, listener: Callback, capture: bool) {
        let key = (target, event.to_string(), listener.id(), capture);
        // adding the same listener twice is a no-op for the host too
        if self.bound.borrow().contains_key(&key) {
            return;
        }
        let bound = Zone::current().bind(&listener, false);
        self.bound.borrow_mut().insert(key, bound.clone());
        self.delegate.add_event_listener(target, event, bound, capture)
    }

    fn remove_event_listener(&self, target: NodeId, event: &str, listener: &Callback, capture: bool) {
        let key = (target, event.to_string(), listener.id(), capture);
        let bound = self.bound.borrow_mut().remove(&key);
        self.delegate
            .remove_event_listener(target, event, bound.as_ref().unwrap_or(listener), capture);
        if bound.is_some() {
            Zone::current().dequeue_task(Some(listener.id()));
        }
    }
}

pub(super) fn patch_event_targets(host: &mut Host, report: &mut PatchReport) {
    if let Some(delegate) = host.event_target.take() {
        host.event_target = Some(PatchedEventTarget::wrap(delegate));
        report.patched("EventTarget");
        return;
    }
    let mut any = false;
    for name in EVENT_TARGET_CLASSES {
        if let Some(api) = host.event_target_classes.get_mut(*name) {
            *api = PatchedEventTarget::wrap(api.clone());
            report.patched(name);
            any = true;
        }
    }
    if !any {
        report.skipped("EventTarget");
    }
}

/// Descriptor strategy: handler properties become accessors over tracked listeners.
///
/// The setter removes the listener added for the previous handler, stores the
/// raw handler and adds it as a listener, so it goes through the same bind and
/// dequeue bookkeeping as any other listener. The getter returns the raw handler.
struct TrackedHandlers {
    delegate: Rc<dyn HandlerProperties>,
    events: Rc<dyn EventTargetApi>,
    properties: HashSet<String>,
    raw: RefCell<HashMap<(NodeId, String), Callback>>,
}

impl HandlerProperties for TrackedHandlers {
    fn get_handler(&self, node: NodeId, property: &str) -> Option<Callback> {
        if !self.properties.contains(property) {
            return self.delegate.get_handler(node, property);
        }
        self.raw.borrow().get(&(node, property.to_string())).cloned()
    }

    fn set_handler(&self, node: NodeId, property: &str, handler: Option<Callback>) {
        if !self.properties.contains(property) {
            return self.delegate.set_handler(node, property, handler);
        }
        let event = &property[2..];
        let key = (node, property.to_string());
        let previous = self.raw.borrow_mut().remove(&key);
        if let Some(previous) = previous {
            self.events.remove_event_listener(node, event, &previous, false);
        }
        if let Some(handler) = handler {
            self.raw.borrow_mut().insert(key, handler.clone());
            self.events.add_event_listener(node, event, handler, false);
        }
    }

    fn supports_accessor_override(&self) -> bool {
        self.delegate.supports_accessor_override()
    }
}

/// Capture strategy: handler properties stay native, and the zone each one was
/// assigned in is remembered so the capture listener can bind it.
struct CapturedHandlers {
    delegate: Rc<dyn HandlerProperties>,
    properties: HashSet<String>,
    origins: Rc<RefCell<HashMap<(NodeId, String), Zone>>>,
}

impl HandlerProperties for CapturedHandlers {
    fn get_handler(&self, node: NodeId, property: &str) -> Option<Callback> {
        self.delegate.get_handler(node, property)
    }

    fn set_handler(&self, node: NodeId, property: &str, handler: Option<Callback>) {
        if self.properties.contains(property) {
            let key = (node, property.to_string());
            if handler.is_some() {
                self.origins.borrow_mut().insert(key, Zone::current());
            } else {
                self.origins.borrow_mut().remove(&key);
            }
        }
        self.delegate.set_handler(node, property, handler)
    }

    fn supports_accessor_override(&self) -> bool {
        self.delegate.supports_accessor_override()
    }
}

/// The capture-phase listener for one event: walks from the target up through
/// its ancestors and binds every handler that is not bound yet.
fn capture_listener(
    property: String,
    handlers: Rc<dyn HandlerProperties>,
    document: Rc<dyn DocumentApi>,
    origins: Rc<RefCell<HashMap<(NodeId, String), Zone>>>,
) -> Callback {
    Callback::new(move |args| {
        let mut node = args
            .first()
            .and_then(|event| event.get("target"))
            .and_then(Value::as_u64)
            .map(NodeId);
        while let Some(current) = node {
            if let Some(handler) = handlers.get_handler(current, &property) {
                if !handler.is_bound() {
                    let origin = origins.borrow().get(&(current, property.clone())).cloned();
                    let zone = origin.unwrap_or_else(Zone::current);
                    let bound = zone.bind(&handler, false);
                    handlers.set_handler(current, &property, Some(bound));
                }
            }
            node = document.parent_element(current);
        }
        Ok(Value::Null)
    })
}

pub(super) fn patch_inline_handlers(host: &mut Host, config: &Config, report: &mut PatchReport) {
    let Some(delegate) = host.handlers.clone() else {
        report.skipped("onevent properties");
        return;
    };
    let Some(events) = host.node_events().cloned() else {
        report.skipped_because("onevent properties", "no event target");
        return;
    };
    let descriptor = match config.inline_handlers {
        InlineHandlerStrategy::Descriptor => true,
        InlineHandlerStrategy::Capture => false,
        InlineHandlerStrategy::Auto => delegate.supports_accessor_override(),
    };
    let properties: HashSet<String> = config.handler_properties().collect();

    if descriptor {
        host.handlers = Some(Rc::new(TrackedHandlers {
            delegate,
            events,
            properties,
            raw: RefCell::new(HashMap::new()),
        }));
        report.patched("onevent properties (descriptor)");
        return;
    }

    let Some(document) = host.document.clone() else {
        report.skipped_because("onevent properties", "no document for capture listeners");
        return;
    };
    let origins = Rc::new(RefCell::new(HashMap::new()));
    let root = document.root();
    for name in &config.event_names {
        let listener = capture_listener(format!("on{name}"), delegate.clone(), document.clone(), origins.clone());
        events.add_event_listener(root, name, listener, true);
    }
    host.handlers = Some(Rc::new(CapturedHandlers {
        delegate,
        properties,
        origins,
    }));
    report.patched("onevent properties (capture)");
}
