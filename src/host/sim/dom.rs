// SPDX-License-Identifier: MIT OR Apache-2.0

//! The document tree: event dispatch, handler properties, mutation observers
//! and custom elements.

use super::SimHost;
use crate::error::Error;
use crate::host::{
    DocumentApi, ElementRegistry, EventTargetApi, HandlerProperties, NodeId, ObjectId, ObserverClass,
    ObserverInstance, Slot,
};
use crate::zone::Callback;
use serde_json::{Value, json};
use std::collections::BTreeMap;
use std::rc::Rc;

const DOCUMENT: NodeId = NodeId(0);

struct Listener {
    event: String,
    callback: Callback,
    capture: bool,
}

struct NodeData {
    name: String,
    parent: Option<NodeId>,
    children: Vec<NodeId>,
    attributes: BTreeMap<String, String>,
    listeners: Vec<Listener>,
    handlers: BTreeMap<String, Callback>,
    /// Prototype of a registered custom element.
    prototype: Option<ObjectId>,
}

impl NodeData {
    fn new(name: &str) -> Self {
        NodeData {
            name: name.to_string(),
            parent: None,
            children: Vec::new(),
            attributes: BTreeMap::new(),
            listeners: Vec::new(),
            handlers: BTreeMap::new(),
            prototype: None,
        }
    }
}

struct ObserverData {
    callback: Callback,
    /// Observed nodes, and whether their subtree is included.
    targets: Vec<(NodeId, bool)>,
    records: Vec<Value>,
    delivery_queued: bool,
}

pub(super) struct Dom {
    nodes: Vec<NodeData>,
    observers: Vec<ObserverData>,
    registry: BTreeMap<String, ObjectId>,
}

impl Dom {
    pub(super) fn new() -> Self {
        Dom {
            nodes: vec![NodeData::new("#document")],
            observers: Vec::new(),
            registry: BTreeMap::new(),
        }
    }

    fn node(&self, id: NodeId) -> Result<&NodeData, Error> {
        self.nodes.get(id.0 as usize).ok_or(Error::UnknownNode(id))
    }

    fn node_mut(&mut self, id: NodeId) -> Result<&mut NodeData, Error> {
        self.nodes.get_mut(id.0 as usize).ok_or(Error::UnknownNode(id))
    }

    /// `node` followed by its ancestors.
    fn path(&self, node: NodeId) -> Vec<NodeId> {
        std::iter::successors(Some(node), |id| self.node(*id).ok().and_then(|n| n.parent)).collect()
    }

    fn is_connected(&self, node: NodeId) -> bool {
        self.path(node).last() == Some(&DOCUMENT)
    }

    fn listeners(&self, node: NodeId, event: &str, capture: bool) -> Vec<Callback> {
        self.node(node)
            .map(|n| {
                n.listeners
                    .iter()
                    .filter(|l| l.event == event && l.capture == capture)
                    .map(|l| l.callback.clone())
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Records a mutation of `target`, returning the observers that need a delivery queued.
    fn record_mutation(&mut self, target: NodeId, record: Value) -> Vec<usize> {
        let path = self.path(target);
        let mut queue = Vec::new();
        for (index, observer) in self.observers.iter_mut().enumerate() {
            let interested = observer
                .targets
                .iter()
                .any(|(observed, subtree)| *observed == target || (*subtree && path.contains(observed)));
            if !interested {
                continue;
            }
            observer.records.push(record.clone());
            if !observer.delivery_queued {
                observer.delivery_queued = true;
                queue.push(index);
            }
        }
        queue
    }
}

impl SimHost {
    /// The document node.
    pub fn document(&self) -> NodeId {
        DOCUMENT
    }

    /// Creates a detached element. A registered custom element gets its
    /// `createdCallback`.
    pub fn create_element(&self, name: &str) -> NodeId {
        let (id, prototype) = {
            let mut dom = self.inner.dom.borrow_mut();
            let mut node = NodeData::new(name);
            node.prototype = dom.registry.get(name).copied();
            let prototype = node.prototype;
            dom.nodes.push(node);
            (NodeId(dom.nodes.len() as u64 - 1), prototype)
        };
        if let Some(prototype) = prototype {
            self.lifecycle(prototype, "createdCallback", &[json!(id.0)]);
        }
        id
    }

    pub fn node_name(&self, node: NodeId) -> Option<String> {
        self.inner.dom.borrow().node(node).ok().map(|n| n.name.clone())
    }

    pub fn children(&self, node: NodeId) -> Vec<NodeId> {
        self.inner
            .dom
            .borrow()
            .node(node)
            .map(|n| n.children.clone())
            .unwrap_or_default()
    }

    pub fn append_child(&self, parent: NodeId, child: NodeId) -> Result<(), Error> {
        let (observers, attached) = {
            let mut dom = self.inner.dom.borrow_mut();
            dom.node(parent)?;
            dom.node(child)?;
            if dom.path(parent).contains(&child) {
                return Err(Error::Hierarchy { parent, child });
            }
            let old_parent = dom.node(child)?.parent;
            if let Some(old_parent) = old_parent {
                dom.node_mut(old_parent)?.children.retain(|c| *c != child);
            }
            dom.node_mut(child)?.parent = Some(parent);
            dom.node_mut(parent)?.children.push(child);
            let observers = dom.record_mutation(
                parent,
                json!({"type": "childList", "target": parent.0, "addedNodes": [child.0]}),
            );
            let attached = if dom.is_connected(child) {
                dom.node(child)?.prototype
            } else {
                None
            };
            (observers, attached)
        };
        self.queue_deliveries(observers);
        if let Some(prototype) = attached {
            self.lifecycle(prototype, "attachedCallback", &[json!(child.0)]);
        }
        Ok(())
    }

    pub fn remove_child(&self, parent: NodeId, child: NodeId) -> Result<(), Error> {
        let (observers, detached) = {
            let mut dom = self.inner.dom.borrow_mut();
            if dom.node(child)?.parent != Some(parent) {
                return Err(Error::Hierarchy { parent, child });
            }
            let detached = if dom.is_connected(child) {
                dom.node(child)?.prototype
            } else {
                None
            };
            dom.node_mut(parent)?.children.retain(|c| *c != child);
            dom.node_mut(child)?.parent = None;
            let observers = dom.record_mutation(
                parent,
                json!({"type": "childList", "target": parent.0, "removedNodes": [child.0]}),
            );
            (observers, detached)
        };
        self.queue_deliveries(observers);
        if let Some(prototype) = detached {
            self.lifecycle(prototype, "detachedCallback", &[json!(child.0)]);
        }
        Ok(())
    }

    pub fn set_attribute(&self, node: NodeId, name: &str, value: &str) -> Result<(), Error> {
        let (observers, old, prototype) = {
            let mut dom = self.inner.dom.borrow_mut();
            let old = dom
                .node_mut(node)?
                .attributes
                .insert(name.to_string(), value.to_string());
            let observers = dom.record_mutation(
                node,
                json!({"type": "attributes", "target": node.0, "attributeName": name, "oldValue": old}),
            );
            (observers, old, dom.node(node)?.prototype)
        };
        self.queue_deliveries(observers);
        if let Some(prototype) = prototype {
            self.lifecycle(
                prototype,
                "attributeChangedCallback",
                &[json!(node.0), json!(name), json!(old), json!(value)],
            );
        }
        Ok(())
    }

    pub fn attribute(&self, node: NodeId, name: &str) -> Option<String> {
        self.inner
            .dom
            .borrow()
            .node(node)
            .ok()
            .and_then(|n| n.attributes.get(name).cloned())
    }

    /// Number of listeners registered on `node` for `event`, in either phase.
    pub fn listener_count(&self, node: NodeId, event: &str) -> usize {
        self.inner
            .dom
            .borrow()
            .node(node)
            .map(|n| n.listeners.iter().filter(|l| l.event == event).count())
            .unwrap_or(0)
    }

    /// Dispatches an event at `target`.
    ///
    /// Capture listeners run from the document down to the target, then bubble
    /// listeners and `on*` handler properties from the target up to the document.
    /// The microtask queue is drained afterwards.
    pub fn dispatch_event(&self, target: NodeId, event: &str) -> Result<(), Error> {
        let path = {
            let dom = self.inner.dom.borrow();
            dom.node(target)?;
            dom.path(target)
        };
        let handler = format!("on{event}");
        let make_event = |current: NodeId, phase: &str| {
            json!({"type": event, "target": target.0, "currentTarget": current.0, "phase": phase})
        };

        for node in path.iter().rev() {
            let listeners = self.inner.dom.borrow().listeners(*node, event, true);
            for listener in listeners {
                self.invoke(&listener, &[make_event(*node, "capture")]);
            }
        }
        for node in &path {
            let listeners = self.inner.dom.borrow().listeners(*node, event, false);
            for listener in listeners {
                self.invoke(&listener, &[make_event(*node, "bubble")]);
            }
            // read at invocation time; a capture listener may have replaced it
            if let Some(handler) = self.get_handler(*node, &handler) {
                self.invoke(&handler, &[make_event(*node, "bubble")]);
            }
        }
        self.run_microtasks();
        Ok(())
    }

    fn queue_deliveries(&self, observers: Vec<usize>) {
        for index in observers {
            self.queue_microtask(move |sim| sim.deliver_records(index));
        }
    }

    fn deliver_records(&self, index: usize) {
        let delivery = {
            let mut dom = self.inner.dom.borrow_mut();
            dom.observers.get_mut(index).and_then(|observer| {
                observer.delivery_queued = false;
                let records = std::mem::take(&mut observer.records);
                (!records.is_empty()).then(|| (observer.callback.clone(), records))
            })
        };
        if let Some((callback, records)) = delivery {
            self.invoke(&callback, &[Value::Array(records)]);
        }
    }

    fn lifecycle(&self, prototype: ObjectId, name: &str, args: &[Value]) {
        if let Some(Slot::Callback(callback)) = self.property(prototype, name) {
            self.invoke(&callback, args);
        }
    }
}

impl EventTargetApi for SimHost {
    fn add_event_listener(&self, target: NodeId, event: &str, listener: Callback, capture: bool) {
        let mut dom = self.inner.dom.borrow_mut();
        let Ok(node) = dom.node_mut(target) else {
            return;
        };
        let duplicate = node
            .listeners
            .iter()
            .any(|l| l.event == event && l.capture == capture && l.callback == listener);
        if !duplicate {
            node.listeners.push(Listener {
                event: event.to_string(),
                callback: listener,
                capture,
            });
        }
    }

    fn remove_event_listener(&self, target: NodeId, event: &str, listener: &Callback, capture: bool) {
        let mut dom = self.inner.dom.borrow_mut();
        if let Ok(node) = dom.node_mut(target) {
            node.listeners
                .retain(|l| !(l.event == event && l.capture == capture && &l.callback == listener));
        }
    }
}

impl HandlerProperties for SimHost {
    fn get_handler(&self, node: NodeId, property: &str) -> Option<Callback> {
        self.inner
            .dom
            .borrow()
            .node(node)
            .ok()
            .and_then(|n| n.handlers.get(property).cloned())
    }

    fn set_handler(&self, node: NodeId, property: &str, handler: Option<Callback>) {
        let mut dom = self.inner.dom.borrow_mut();
        let Ok(node) = dom.node_mut(node) else {
            return;
        };
        match handler {
            Some(handler) => {
                node.handlers.insert(property.to_string(), handler);
            }
            None => {
                node.handlers.remove(property);
            }
        }
    }

    fn supports_accessor_override(&self) -> bool {
        self.inner.accessor_override.get()
    }
}

impl DocumentApi for SimHost {
    fn root(&self) -> NodeId {
        DOCUMENT
    }

    fn parent_element(&self, node: NodeId) -> Option<NodeId> {
        self.inner.dom.borrow().node(node).ok().and_then(|n| n.parent)
    }
}

impl ElementRegistry for SimHost {
    fn register_element(&self, name: &str, prototype: ObjectId) -> Result<(), Error> {
        if !self.has_object(prototype) {
            return Err(Error::UnknownObject(prototype));
        }
        logwise::debuginternal_sync!("register element {name}", name = name);
        self.inner
            .dom
            .borrow_mut()
            .registry
            .insert(name.to_string(), prototype);
        Ok(())
    }
}

pub(super) struct SimObserverClass {
    sim: SimHost,
}

impl SimObserverClass {
    pub(super) fn new(sim: SimHost) -> Self {
        SimObserverClass { sim }
    }
}

impl ObserverClass for SimObserverClass {
    fn construct(&self, callback: Callback) -> Rc<dyn ObserverInstance> {
        let mut dom = self.sim.inner.dom.borrow_mut();
        dom.observers.push(ObserverData {
            callback,
            targets: Vec::new(),
            records: Vec::new(),
            delivery_queued: false,
        });
        Rc::new(SimObserver {
            sim: self.sim.clone(),
            index: dom.observers.len() - 1,
        })
    }
}

struct SimObserver {
    sim: SimHost,
    index: usize,
}

impl SimObserver {
    fn with<R>(&self, f: impl FnOnce(&mut ObserverData) -> R) -> Option<R> {
        self.sim.inner.dom.borrow_mut().observers.get_mut(self.index).map(f)
    }
}

impl ObserverInstance for SimObserver {
    fn observe(&self, target: NodeId, options: &Value) -> Result<(), Error> {
        self.sim.inner.dom.borrow().node(target)?;
        let subtree = options.get("subtree").and_then(Value::as_bool).unwrap_or(false);
        self.with(|observer| {
            observer.targets.retain(|(node, _)| *node != target);
            observer.targets.push((target, subtree));
        });
        Ok(())
    }

    fn disconnect(&self) {
        self.with(|observer| {
            observer.targets.clear();
            observer.records.clear();
        });
    }

    fn take_records(&self) -> Vec<Value> {
        self.with(|observer| std::mem::take(&mut observer.records))
            .unwrap_or_default()
    }
}
