// SPDX-License-Identifier: MIT OR Apache-2.0

//! Proxies for constructible host classes: the request class and observers.

use super::PatchReport;
use crate::error::Error;
use crate::host::{Host, HostClass, HostObject, NodeId, ObserverClass, ObserverInstance, Slot};
use crate::zone::{Callback, CallbackResult, Zone};
use serde_json::Value;
use std::cell::Cell;
use std::rc::Rc;

fn bind_slot(slot: Slot) -> Slot {
    match slot {
        Slot::Callback(callback) => Slot::Callback(Zone::current().bind(&callback, false)),
        value => value,
    }
}

struct PatchedRequestClass {
    delegate: Rc<dyn HostClass>,
}

impl HostClass for PatchedRequestClass {
    fn construct(&self, args: &[Slot]) -> Rc<dyn HostObject> {
        let args: Vec<Slot> = args.iter().cloned().map(bind_slot).collect();
        Rc::new(PatchedRequest {
            inner: self.delegate.construct(&args),
        })
    }
}

/// Forwards everything to the wrapped instance, binding callbacks assigned to it.
struct PatchedRequest {
    inner: Rc<dyn HostObject>,
}

impl HostObject for PatchedRequest {
    fn call(&self, method: &str, args: &[Slot]) -> CallbackResult {
        self.inner.call(method, args)
    }

    fn get(&self, property: &str) -> Slot {
        self.inner.get(property)
    }

    fn set(&self, property: &str, value: Slot) {
        self.inner.set(property, bind_slot(value))
    }
}

pub(super) fn patch_request_class(host: &mut Host, report: &mut PatchReport) {
    match host.xml_http_request.take() {
        Some(delegate) => {
            host.xml_http_request = Some(Rc::new(PatchedRequestClass { delegate }));
            report.patched("XMLHttpRequest");
        }
        None => report.skipped("XMLHttpRequest"),
    }
}

struct PatchedObserverClass {
    delegate: Rc<dyn ObserverClass>,
}

impl ObserverClass for PatchedObserverClass {
    fn construct(&self, callback: Callback) -> Rc<dyn ObserverInstance> {
        let bound = Zone::current().bind(&callback, true);
        Rc::new(PatchedObserver {
            inner: self.delegate.construct(bound),
            active: Cell::new(false),
        })
    }
}

/// An observer counts as one pending task from its first `observe` until `disconnect`.
struct PatchedObserver {
    inner: Rc<dyn ObserverInstance>,
    active: Cell<bool>,
}

impl ObserverInstance for PatchedObserver {
    fn observe(&self, target: NodeId, options: &Value) -> Result<(), Error> {
        if !self.active.replace(true) {
            Zone::current().enqueue_task(None);
        }
        self.inner.observe(target, options)
    }

    fn disconnect(&self) {
        self.inner.disconnect();
        if self.active.replace(false) {
            Zone::current().dequeue_task(None);
        }
    }

    fn take_records(&self) -> Vec<Value> {
        self.inner.take_records()
    }
}

pub(super) fn patch_observer_classes(host: &mut Host, report: &mut PatchReport) {
    let slots = [
        ("MutationObserver", &mut host.mutation_observer),
        ("WebKitMutationObserver", &mut host.webkit_mutation_observer),
    ];
    for (name, slot) in slots {
        match slot.take() {
            Some(delegate) => {
                *slot = Some(Rc::new(PatchedObserverClass { delegate }));
                report.patched(name);
            }
            None => report.skipped(name),
        }
    }
}
