// SPDX-License-Identifier: MIT OR Apache-2.0

//! Interception installed into the simulated host.

use super::*;
use crate::error::Error;
use crate::host::sim::SimHost;
use crate::host::{
    Descriptor, ElementRegistry, EventTargetApi, HandlerProperties, Host, PromiseApi, PropertyModel, Slot,
};
use crate::sys::Duration;
use crate::zone::{Callback, Failure, Hook, TaskId, Zone, ZoneSpec};
use std::cell::Cell;
use serde_json::{Value, json};
use std::cell::RefCell;
use std::rc::Rc;

#[cfg(target_arch = "wasm32")]
use wasm_bindgen_test::*;
#[cfg(target_arch = "wasm32")]
wasm_bindgen_test::wasm_bindgen_test_configure!(run_in_browser);

#[derive(Default)]
struct Tasks {
    enqueued: RefCell<Vec<Option<TaskId>>>,
    dequeued: RefCell<Vec<Option<TaskId>>>,
}

/// A zone tagged with `data("tag", tag)` that records its task notifications.
fn tracking_zone(tag: &str) -> (Zone, Rc<Tasks>) {
    let tasks = Rc::new(Tasks::default());
    let enqueued = tasks.clone();
    let dequeued = tasks.clone();
    let zone = Zone::current().fork(
        ZoneSpec::new()
            .data("tag", json!(tag))
            .hook(Hook::enqueue_task(move |_, task| enqueued.enqueued.borrow_mut().push(task)))
            .hook(Hook::dequeue_task(move |_, task| dequeued.dequeued.borrow_mut().push(task))),
    );
    (zone, tasks)
}

/// A callback that records the `tag` of the zone it runs in.
fn tagged_callback() -> (Callback, Rc<RefCell<Vec<Value>>>) {
    let seen = Rc::new(RefCell::new(Vec::new()));
    let sink = seen.clone();
    let callback = Callback::from_fn(move || {
        let tag = Zone::current().data("tag").cloned().unwrap_or_default();
        sink.borrow_mut().push(tag);
    });
    (callback, seen)
}

fn installed() -> (SimHost, Host) {
    let sim = SimHost::new();
    let mut host = sim.host();
    install(&mut host, &Config::default());
    (sim, host)
}

#[cfg_attr(not(target_arch = "wasm32"), test)]
#[cfg_attr(target_arch = "wasm32", wasm_bindgen_test)]
fn test_timeout_runs_in_registering_zone() {
    let (sim, host) = installed();
    let (zone, tasks) = tracking_zone("request");
    let (tagged, seen) = tagged_callback();
    zone.enter(|| host.timeout.as_ref().unwrap().set(tagged.clone(), Duration::from_millis(10)));
    assert_eq!(*tasks.enqueued.borrow(), vec![Some(tagged.id())]);
    assert!(tasks.dequeued.borrow().is_empty());

    sim.advance(Duration::from_millis(10));
    assert_eq!(*seen.borrow(), vec![json!("request")]);
    assert_eq!(*tasks.dequeued.borrow(), vec![Some(tagged.id())]);
}

#[cfg_attr(not(target_arch = "wasm32"), test)]
#[cfg_attr(target_arch = "wasm32", wasm_bindgen_test)]
fn test_clear_dequeues_pending_timeout_once() {
    let (sim, host) = installed();
    let (zone, tasks) = tracking_zone("cleared");
    let (tagged, seen) = tagged_callback();
    let timeout = host.timeout.as_ref().unwrap();
    let handle = zone.enter(|| timeout.set(tagged.clone(), Duration::from_millis(10)));
    zone.enter(|| timeout.clear(handle));
    assert_eq!(*tasks.dequeued.borrow(), vec![Some(tagged.id())]);

    sim.advance(Duration::from_millis(20));
    assert!(seen.borrow().is_empty());
    zone.enter(|| timeout.clear(handle));
    assert_eq!(tasks.dequeued.borrow().len(), 1);
}

#[cfg_attr(not(target_arch = "wasm32"), test)]
#[cfg_attr(target_arch = "wasm32", wasm_bindgen_test)]
fn test_clear_of_another_kind_dequeues() {
    let (sim, host) = installed();
    let (zone, tasks) = tracking_zone("crossed");
    let (tagged, seen) = tagged_callback();
    let handle = zone.enter(|| host.interval.as_ref().unwrap().set(tagged.clone(), Duration::from_millis(10)));
    zone.enter(|| host.timeout.as_ref().unwrap().clear(handle));
    assert_eq!(*tasks.dequeued.borrow(), vec![Some(tagged.id())]);

    sim.advance(Duration::from_millis(30));
    assert!(seen.borrow().is_empty());
    zone.enter(|| host.interval.as_ref().unwrap().clear(handle));
    assert_eq!(tasks.dequeued.borrow().len(), 1);
}

#[cfg_attr(not(target_arch = "wasm32"), test)]
#[cfg_attr(target_arch = "wasm32", wasm_bindgen_test)]
fn test_fired_timeout_is_no_longer_pending() {
    let (sim, host) = installed();
    let (zone, tasks) = tracking_zone("fired");
    let (tagged, _seen) = tagged_callback();
    let timeout = host.timeout.as_ref().unwrap();
    let handle = zone.enter(|| timeout.set(tagged, Duration::ZERO));
    sim.advance(Duration::ZERO);
    assert_eq!(tasks.dequeued.borrow().len(), 1);
    zone.enter(|| timeout.clear(handle));
    assert_eq!(tasks.dequeued.borrow().len(), 1);
}

#[cfg_attr(not(target_arch = "wasm32"), test)]
#[cfg_attr(target_arch = "wasm32", wasm_bindgen_test)]
fn test_interval_stays_pending_until_cleared() {
    let (sim, host) = installed();
    let (zone, tasks) = tracking_zone("ticker");
    let (tagged, seen) = tagged_callback();
    let interval = host.interval.as_ref().unwrap();
    let handle = zone.enter(|| interval.set(tagged.clone(), Duration::from_millis(10)));

    sim.advance(Duration::from_millis(25));
    assert_eq!(*seen.borrow(), vec![json!("ticker"), json!("ticker")]);
    assert!(tasks.dequeued.borrow().is_empty());

    zone.enter(|| interval.clear(handle));
    assert_eq!(*tasks.dequeued.borrow(), vec![Some(tagged.id())]);
    sim.advance(Duration::from_millis(50));
    assert_eq!(seen.borrow().len(), 2);
}

#[cfg_attr(not(target_arch = "wasm32"), test)]
#[cfg_attr(target_arch = "wasm32", wasm_bindgen_test)]
fn test_animation_frame_bound_once() {
    let (sim, host) = installed();
    let (zone, tasks) = tracking_zone("frame");
    let (tagged, seen) = tagged_callback();
    zone.enter(|| host.webkit_request_animation_frame.as_ref().unwrap().request(tagged.clone()));
    sim.run_animation_frames();
    assert_eq!(*seen.borrow(), vec![json!("frame")]);
    assert_eq!(*tasks.enqueued.borrow(), vec![Some(tagged.id())]);
    assert_eq!(*tasks.dequeued.borrow(), vec![Some(tagged.id())]);
}

#[cfg_attr(not(target_arch = "wasm32"), test)]
#[cfg_attr(target_arch = "wasm32", wasm_bindgen_test)]
fn test_blocking_call_uses_zone_override() {
    let (sim, host) = installed();
    let quiet = Zone::current().fork(ZoneSpec::new().delegate(
        "alert",
        Callback::new(|args| Ok(json!(format!("suppressed {}", args[0])))),
    ));
    let alert = host.alert.as_ref().unwrap();

    let result = quiet.enter(|| alert.call(&[json!("hello")])).unwrap();
    assert_eq!(result, json!("suppressed \"hello\""));
    assert!(sim.alerts().is_empty());

    alert.call(&[json!("hello")]).unwrap();
    assert_eq!(sim.alerts(), vec!["hello"]);
}

#[cfg_attr(not(target_arch = "wasm32"), test)]
#[cfg_attr(target_arch = "wasm32", wasm_bindgen_test)]
fn test_blocking_call_is_not_a_task_turn() {
    let (sim, host) = installed();
    let turns = Rc::new(Cell::new(0));
    let counter = turns.clone();
    let zone = Zone::current().fork(
        ZoneSpec::new()
            .hook(Hook::before_task(move |_| counter.set(counter.get() + 1)))
            .hook(Hook::on_error(|_, _| json!("recovered"))),
    );
    let alert = host.alert.as_ref().unwrap();

    let result = zone.run(|| alert.call(&[json!("hi")]));
    assert!(result.is_ok());
    assert_eq!(turns.get(), 1);
    assert_eq!(sim.alerts(), vec!["hi"]);

    let refusing = zone.fork(ZoneSpec::new().delegate("alert", Callback::new(|_| Err(Failure::new("denied")))));
    let failed = refusing.enter(|| alert.call(&[json!("hi")]));
    assert_eq!(failed.unwrap_err().message(), "denied");
    // the turn `enter` itself starts
    assert_eq!(turns.get(), 2);
}

#[cfg_attr(not(target_arch = "wasm32"), test)]
#[cfg_attr(target_arch = "wasm32", wasm_bindgen_test)]
fn test_listener_add_and_remove() {
    let (sim, host) = installed();
    let button = sim.create_element("button");
    let (zone, tasks) = tracking_zone("listener");
    let (tagged, seen) = tagged_callback();
    let events = host.event_target.as_ref().unwrap();

    zone.enter(|| {
        events.add_event_listener(button, "click", tagged.clone(), false);
        events.add_event_listener(button, "click", tagged.clone(), false);
    });
    assert_eq!(sim.listener_count(button, "click"), 1);
    assert_eq!(tasks.enqueued.borrow().len(), 1);

    sim.dispatch_event(button, "click").unwrap();
    assert_eq!(*seen.borrow(), vec![json!("listener")]);

    zone.enter(|| events.remove_event_listener(button, "click", &tagged, false));
    assert_eq!(sim.listener_count(button, "click"), 0);
    assert_eq!(*tasks.dequeued.borrow(), vec![Some(tagged.id())]);
    sim.dispatch_event(button, "click").unwrap();
    assert_eq!(seen.borrow().len(), 1);
}

#[cfg_attr(not(target_arch = "wasm32"), test)]
#[cfg_attr(target_arch = "wasm32", wasm_bindgen_test)]
fn test_removing_unknown_listener_does_not_dequeue() {
    let (sim, host) = installed();
    let button = sim.create_element("button");
    let (zone, tasks) = tracking_zone("listener");
    let (tagged, _seen) = tagged_callback();
    let (stranger, _) = tagged_callback();
    let events = host.event_target.as_ref().unwrap();

    zone.enter(|| {
        events.add_event_listener(button, "click", tagged.clone(), false);
        events.remove_event_listener(button, "click", &tagged, false);
        events.remove_event_listener(button, "click", &tagged, false);
        events.remove_event_listener(button, "click", &stranger, false);
    });
    assert_eq!(tasks.enqueued.borrow().len(), 1);
    assert_eq!(*tasks.dequeued.borrow(), vec![Some(tagged.id())]);
}

#[cfg_attr(not(target_arch = "wasm32"), test)]
#[cfg_attr(target_arch = "wasm32", wasm_bindgen_test)]
fn test_per_class_event_targets() {
    let sim = SimHost::new();
    let mut host = sim.host();
    let shared = host.event_target.take().unwrap();
    host.event_target_classes.insert("Node".to_string(), shared.clone());
    host.event_target_classes.insert("Worker".to_string(), shared);
    let report = install(&mut host, &Config::default());
    assert!(report.is_patched("Node"));
    assert!(report.is_patched("Worker"));
    assert!(!report.is_patched("EventTarget"));

    let node = sim.create_element("div");
    let (zone, _tasks) = tracking_zone("classy");
    let (tagged, seen) = tagged_callback();
    zone.enter(|| host.node_events().unwrap().add_event_listener(node, "input", tagged, false));
    sim.dispatch_event(node, "input").unwrap();
    assert_eq!(*seen.borrow(), vec![json!("classy")]);
}

#[cfg_attr(not(target_arch = "wasm32"), test)]
#[cfg_attr(target_arch = "wasm32", wasm_bindgen_test)]
fn test_inline_handlers_with_accessors() {
    let (sim, host) = installed();
    let link = sim.create_element("a");
    let (zone, tasks) = tracking_zone("inline");
    let (first, seen) = tagged_callback();
    let handlers = host.handlers.as_ref().unwrap();

    zone.enter(|| handlers.set_handler(link, "onclick", Some(first.clone())));
    assert_eq!(handlers.get_handler(link, "onclick"), Some(first.clone()));
    assert!(sim.get_handler(link, "onclick").is_none());
    assert_eq!(sim.listener_count(link, "click"), 1);

    sim.dispatch_event(link, "click").unwrap();
    assert_eq!(*seen.borrow(), vec![json!("inline")]);

    let (second, _) = tagged_callback();
    zone.enter(|| handlers.set_handler(link, "onclick", Some(second.clone())));
    assert_eq!(sim.listener_count(link, "click"), 1);
    assert_eq!(*tasks.dequeued.borrow(), vec![Some(first.id())]);

    zone.enter(|| handlers.set_handler(link, "onclick", None));
    assert_eq!(sim.listener_count(link, "click"), 0);
    assert_eq!(handlers.get_handler(link, "onclick"), None);
}

#[cfg_attr(not(target_arch = "wasm32"), test)]
#[cfg_attr(target_arch = "wasm32", wasm_bindgen_test)]
fn test_inline_handlers_bound_by_capture() {
    let sim = SimHost::new();
    sim.set_accessor_override(false);
    let mut host = sim.host();
    let report = install(&mut host, &Config::default());
    assert!(report.is_patched("onevent properties (capture)"));

    let outer = sim.create_element("form");
    let inner = sim.create_element("input");
    sim.append_child(sim.document(), outer).unwrap();
    sim.append_child(outer, inner).unwrap();

    let (zone, _tasks) = tracking_zone("captured");
    let (tagged, seen) = tagged_callback();
    let handlers = host.handlers.as_ref().unwrap();
    zone.enter(|| handlers.set_handler(outer, "onchange", Some(tagged.clone())));
    assert!(!handlers.get_handler(outer, "onchange").unwrap().is_bound());

    sim.dispatch_event(inner, "change").unwrap();
    assert_eq!(*seen.borrow(), vec![json!("captured")]);
    let stored = handlers.get_handler(outer, "onchange").unwrap();
    assert!(stored.is_bound());
    assert_eq!(stored.original(), &tagged);

    // already bound handlers are left alone
    sim.dispatch_event(inner, "change").unwrap();
    assert_eq!(handlers.get_handler(outer, "onchange").unwrap(), stored);
    assert_eq!(seen.borrow().len(), 2);
}

#[cfg_attr(not(target_arch = "wasm32"), test)]
#[cfg_attr(target_arch = "wasm32", wasm_bindgen_test)]
fn test_config_forces_capture_strategy() {
    let sim = SimHost::new();
    let mut host = sim.host();
    let config = Config {
        inline_handlers: crate::config::InlineHandlerStrategy::Capture,
        ..Config::default()
    };
    let report = install(&mut host, &config);
    assert!(report.is_patched("onevent properties (capture)"));
    assert!(!report.is_patched("onevent properties (descriptor)"));
    assert_eq!(sim.listener_count(sim.document(), "click"), 1);
}

#[cfg_attr(not(target_arch = "wasm32"), test)]
#[cfg_attr(target_arch = "wasm32", wasm_bindgen_test)]
fn test_request_callbacks_are_bound() {
    let (sim, host) = installed();
    sim.route("/status", "ok");
    let (zone, tasks) = tracking_zone("xhr");
    let (tagged, seen) = tagged_callback();
    let request = zone.enter(|| {
        let request = host.xml_http_request.as_ref().unwrap().construct(&[]);
        request.set("onload", Slot::Callback(tagged.clone()));
        request
    });
    assert_eq!(*tasks.enqueued.borrow(), vec![Some(tagged.id())]);
    assert!(request.get("onload").as_callback().unwrap().is_bound());

    request.call("open", &[json!("GET").into(), json!("/status").into()]).unwrap();
    request.call("send", &[]).unwrap();
    sim.advance(Duration::ZERO);
    assert_eq!(*seen.borrow(), vec![json!("xhr")]);
    assert_eq!(request.get("responseText"), Slot::Value(json!("ok")));
}

#[cfg_attr(not(target_arch = "wasm32"), test)]
#[cfg_attr(target_arch = "wasm32", wasm_bindgen_test)]
fn test_observer_counts_as_one_task() {
    let (sim, host) = installed();
    let list = sim.create_element("ul");
    let (zone, tasks) = tracking_zone("observer");
    let (tagged, seen) = tagged_callback();
    let observer = zone.enter(|| {
        let observer = host.mutation_observer.as_ref().unwrap().construct(tagged);
        observer.observe(list, &json!({})).unwrap();
        observer.observe(list, &json!({"subtree": true})).unwrap();
        observer
    });
    assert_eq!(*tasks.enqueued.borrow(), vec![None]);

    sim.append_child(list, sim.create_element("li")).unwrap();
    sim.run_microtasks();
    assert_eq!(*seen.borrow(), vec![json!("observer")]);

    zone.enter(|| {
        observer.disconnect();
        observer.disconnect();
    });
    assert_eq!(*tasks.dequeued.borrow(), vec![None]);
}

#[cfg_attr(not(target_arch = "wasm32"), test)]
#[cfg_attr(target_arch = "wasm32", wasm_bindgen_test)]
fn test_promise_reactions_are_bound() {
    let (sim, host) = installed();
    let (zone, tasks) = tracking_zone("promise");
    let (fulfilled, seen) = tagged_callback();
    let (rejected, caught) = tagged_callback();
    let source = sim.pending_promise();
    let failing = sim.rejected_promise(json!("no"));
    zone.enter(|| {
        let promises = host.promise.as_ref().unwrap();
        promises.then(source, Some(fulfilled.clone()), None);
        promises.catch(failing, rejected.clone());
    });
    assert_eq!(tasks.enqueued.borrow().len(), 2);

    sim.resolve_promise(source, json!(1));
    sim.run_microtasks();
    assert_eq!(*seen.borrow(), vec![json!("promise")]);
    assert_eq!(*caught.borrow(), vec![json!("promise")]);
}

#[cfg_attr(not(target_arch = "wasm32"), test)]
#[cfg_attr(target_arch = "wasm32", wasm_bindgen_test)]
fn test_promises_can_be_left_alone() {
    let sim = SimHost::new();
    let mut host = sim.host();
    let config = Config {
        patch_promises: false,
        ..Config::default()
    };
    let report = install(&mut host, &config);
    assert!(!report.is_patched("Promise"));
    assert!(!report.skipped.iter().any(|t| t == "Promise"));
}

#[cfg_attr(not(target_arch = "wasm32"), test)]
#[cfg_attr(target_arch = "wasm32", wasm_bindgen_test)]
fn test_unconfigurable_marker() {
    let (sim, host) = installed();
    let properties = host.properties.as_ref().unwrap();
    let object = sim.create_object();
    properties
        .define_property(object, "id", Descriptor::data(json!(1)).configurable(false))
        .unwrap();

    assert!(!properties.get_own_property_descriptor(object, "id").unwrap().configurable);
    assert!(sim.get_own_property_descriptor(object, "id").unwrap().configurable);
    let err = properties
        .define_property(object, "id", Descriptor::data(json!(2)))
        .unwrap_err();
    assert!(matches!(err, Error::CannotRedefine { ref property, .. } if property == "id"));
    assert_eq!(err.to_string(), format!("Cannot redefine property: id of {object}"));

    let err = properties
        .define_properties(object, vec![("id".to_string(), Descriptor::data(json!(3)))])
        .unwrap_err();
    assert!(matches!(err, Error::CannotRedefine { .. }));
}

#[cfg_attr(not(target_arch = "wasm32"), test)]
#[cfg_attr(target_arch = "wasm32", wasm_bindgen_test)]
fn test_create_and_prototype_definitions() {
    let (sim, host) = installed();
    let properties = host.properties.as_ref().unwrap();
    let object = properties
        .create(None, vec![("frozen".to_string(), Descriptor::data(json!(true)).configurable(false))])
        .unwrap();
    assert!(sim.get_own_property_descriptor(object, "frozen").unwrap().configurable);
    assert!(properties.define_property(object, "frozen", Descriptor::data(json!(false))).is_err());

    properties
        .define_property(object, "prototype", Descriptor::data(json!(null)).configurable(false))
        .unwrap();
    assert!(!sim.get_own_property_descriptor(object, "prototype").unwrap().configurable);
}

#[cfg_attr(not(target_arch = "wasm32"), test)]
#[cfg_attr(target_arch = "wasm32", wasm_bindgen_test)]
fn test_custom_element_callbacks_are_rebound() {
    let (sim, host) = installed();
    let properties = host.properties.as_ref().unwrap();
    let (created, seen) = tagged_callback();
    let prototype = properties
        .create(
            None,
            vec![
                ("createdCallback".to_string(), Descriptor::data(created.clone()).configurable(false)),
                ("label".to_string(), Descriptor::data(json!("card"))),
            ],
        )
        .unwrap();
    let (zone, _tasks) = tracking_zone("element");
    zone.enter(|| host.elements.as_ref().unwrap().register_element("x-card", prototype))
        .unwrap();

    let descriptor = properties.get_own_property_descriptor(prototype, "createdCallback").unwrap();
    let stored = descriptor.value.as_ref().and_then(Slot::as_callback).unwrap();
    assert!(stored.is_bound());
    assert_eq!(stored.original(), &created);
    assert!(!descriptor.configurable);

    sim.create_element("x-card");
    assert_eq!(*seen.borrow(), vec![json!("element")]);
}

#[cfg_attr(not(target_arch = "wasm32"), test)]
#[cfg_attr(target_arch = "wasm32", wasm_bindgen_test)]
fn test_second_install_is_a_no_op() {
    let sim = SimHost::new();
    let mut host = sim.host();
    let first = install(&mut host, &Config::default());
    assert!(!first.already_installed);
    assert!(first.is_patched("setTimeout"));
    assert!(host.is_installed());

    let second = patch(&mut host);
    assert!(second.already_installed);
    assert!(second.patched.is_empty());

    let (zone, tasks) = tracking_zone("once");
    let (tagged, _) = tagged_callback();
    zone.enter(|| host.timeout.as_ref().unwrap().set(tagged, Duration::ZERO));
    assert_eq!(tasks.enqueued.borrow().len(), 1);
}

#[cfg_attr(not(target_arch = "wasm32"), test)]
#[cfg_attr(target_arch = "wasm32", wasm_bindgen_test)]
fn test_absent_targets_are_skipped() {
    let mut host = Host::new();
    let report = install(&mut host, &Config::default());
    assert!(report.patched.is_empty());
    for target in ["setTimeout", "alert", "EventTarget", "XMLHttpRequest", "Promise", "registerElement"] {
        assert!(report.skipped.iter().any(|t| t == target), "{target} not skipped");
    }
    assert!(host.timeout.is_none());
    assert!(host.handlers.is_none());
    assert!(host.elements.is_none());
    assert!(host.is_installed());
}

#[cfg_attr(not(target_arch = "wasm32"), test)]
#[cfg_attr(target_arch = "wasm32", wasm_bindgen_test)]
fn test_registry_needs_property_model() {
    let sim = SimHost::new();
    let full = sim.host();
    let mut host = Host::new();
    host.elements = full.elements.clone();
    let report = install(&mut host, &Config::default());
    assert!(!report.is_patched("registerElement"));
    assert!(host.elements.is_some());
}
