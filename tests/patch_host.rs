// SPDX-License-Identifier: MIT OR Apache-2.0

//! Installing interception into hosts, end to end.

use serde_json::{Value, json};
use std::cell::RefCell;
use std::rc::Rc;
use zonewise::host::sim::SimHost;
use zonewise::host::{Host, Slot};
use zonewise::sys::Duration;
use zonewise::zone::{ApplyZone, Callback, Failure, Hook, TaskId, Zone, ZoneSpec};
use zonewise::{Config, install};

#[cfg(target_arch = "wasm32")]
use wasm_bindgen_test::*;
#[cfg(target_arch = "wasm32")]
wasm_bindgen_test::wasm_bindgen_test_configure!(run_in_browser);

#[cfg_attr(not(target_arch = "wasm32"), test)]
#[cfg_attr(target_arch = "wasm32", wasm_bindgen_test)]
fn test_bare_host_is_untouched() {
    let mut host = Host::new();
    let report = install(&mut host, &Config::default());
    assert!(report.patched.is_empty());
    assert!(!report.skipped.is_empty());
    assert!(host.timeout.is_none());
    assert!(host.request_animation_frame.is_none());
    assert!(host.event_target.is_none());
    assert!(host.event_target_classes.is_empty());
    assert!(host.promise.is_none());
    assert!(host.properties.is_none());

    let again = install(&mut host, &Config::default());
    assert!(again.already_installed);
}

#[cfg_attr(not(target_arch = "wasm32"), test)]
#[cfg_attr(target_arch = "wasm32", wasm_bindgen_test)]
fn test_partial_host_patches_what_exists() {
    let sim = SimHost::new();
    let full = sim.host();
    let mut host = Host::new();
    host.timeout = full.timeout.clone();
    host.promise = full.promise.clone();
    let report = install(&mut host, &Config::default());
    assert_eq!(report.patched, vec!["setTimeout", "Promise"]);
    assert!(host.interval.is_none());
}

/// Counts outstanding tasks per zone, the way a test harness waits for
/// asynchronous work to settle.
#[cfg_attr(not(target_arch = "wasm32"), test)]
#[cfg_attr(target_arch = "wasm32", wasm_bindgen_test)]
fn test_pending_work_settles() {
    let sim = SimHost::new();
    let mut host = sim.host();
    install(&mut host, &Config::default());
    sim.route("/data", "{\"n\":1}");

    let pending: Rc<RefCell<Vec<TaskId>>> = Rc::new(RefCell::new(Vec::new()));
    let (enqueue, dequeue) = (pending.clone(), pending.clone());
    let zone = Zone::current().fork(
        ZoneSpec::new()
            .hook(Hook::enqueue_task(move |_, task| {
                if let Some(task) = task {
                    enqueue.borrow_mut().push(task);
                }
            }))
            .hook(Hook::dequeue_task(move |_, task| {
                dequeue.borrow_mut().retain(|t| Some(*t) != task);
            })),
    );

    let responses = Rc::new(RefCell::new(Vec::new()));
    let sink = responses.clone();
    let timeout = host.timeout.clone().unwrap();
    let class = host.xml_http_request.clone().unwrap();
    zone.enter(|| {
        timeout.set(
            Callback::from_fn(move || {
                let request = class.construct(&[]);
                let reader = request.clone();
                let sink = sink.clone();
                request.set(
                    "onload",
                    Slot::Callback(Callback::from_fn(move || {
                        sink.borrow_mut().push(reader.get("responseText"));
                    })),
                );
                let _ = request.call("open", &[json!("GET").into(), json!("/data").into()]);
                let _ = request.call("send", &[]);
            }),
            Duration::from_millis(10),
        )
    });
    assert_eq!(pending.borrow().len(), 1);

    sim.advance(Duration::from_millis(10));
    assert_eq!(responses.borrow().len(), 1);
    assert_eq!(responses.borrow()[0], Slot::Value(json!("{\"n\":1}")));
    // the timer is done; the request handler stays registered on its instance
    assert_eq!(pending.borrow().len(), 1);
}

#[cfg_attr(not(target_arch = "wasm32"), test)]
#[cfg_attr(target_arch = "wasm32", wasm_bindgen_test)]
fn test_error_handler_catches_async_failures() {
    let sim = SimHost::new();
    let mut host = sim.host();
    install(&mut host, &Config::default());

    let caught = Rc::new(RefCell::new(Vec::new()));
    let sink = caught.clone();
    let guarded = Zone::current().fork(ZoneSpec::new().hook(Hook::on_error(move |_, failure| {
        sink.borrow_mut().push(failure.message().to_string());
        Value::Null
    })));
    guarded.enter(|| {
        host.timeout
            .as_ref()
            .unwrap()
            .set(Callback::new(|_| Err(Failure::new("late failure"))), Duration::ZERO)
    });
    host.timeout
        .as_ref()
        .unwrap()
        .set(Callback::new(|_| Err(Failure::new("unguarded failure"))), Duration::ZERO);

    sim.advance(Duration::ZERO);
    assert_eq!(*caught.borrow(), vec!["late failure"]);
    let uncaught = sim.uncaught();
    assert_eq!(uncaught.len(), 1);
    assert_eq!(uncaught[0].message(), "unguarded failure");
}

#[test_executors::async_test]
async fn test_futures_keep_their_zone() {
    let zone = Zone::current().fork(ZoneSpec::new().data("job", json!("import")));
    let job = ApplyZone::new(zone, async {
        let first = Zone::current().data("job").cloned();
        std::future::ready(()).await;
        (first, Zone::current().data("job").cloned())
    })
    .await;
    assert_eq!(job, (Some(json!("import")), Some(json!("import"))));
    assert!(Zone::current().data("job").is_none());
}
