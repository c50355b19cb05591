// SPDX-License-Identifier: MIT OR Apache-2.0

//! An `XMLHttpRequest`-like class answered from a route table.

use super::SimHost;
use crate::host::{HostClass, HostObject, Slot};
use crate::sys::Duration;
use crate::zone::{CallbackResult, Failure};
use serde_json::{Value, json};
use std::collections::BTreeMap;
use std::rc::Rc;

const DONE: u8 = 4;

#[derive(Default)]
struct RequestData {
    method: String,
    url: String,
    ready_state: u8,
    status: u16,
    response_text: String,
    properties: BTreeMap<String, Slot>,
    /// Bumped by `abort` and `open`, so a stale completion is ignored.
    generation: u64,
}

#[derive(Default)]
pub(super) struct Requests {
    routes: BTreeMap<String, String>,
    requests: Vec<RequestData>,
}

impl SimHost {
    /// Serves `body` with status 200 for requests to `url`. Other URLs get a 404.
    pub fn route(&self, url: &str, body: &str) {
        self.inner
            .requests
            .borrow_mut()
            .routes
            .insert(url.to_string(), body.to_string());
    }

    fn complete_request(&self, index: usize, generation: u64) {
        let handlers = {
            let mut requests = self.inner.requests.borrow_mut();
            let url = requests.requests.get(index).map(|r| r.url.clone()).unwrap_or_default();
            let body = requests.routes.get(&url).cloned();
            let Some(request) = requests.requests.get_mut(index) else {
                return;
            };
            if request.generation != generation {
                return;
            }
            let (status, text) = match body {
                Some(text) => (200, text),
                None => (404, String::new()),
            };
            request.status = status;
            request.response_text = text;
            request.ready_state = DONE;
            ["onreadystatechange", "onload"]
                .iter()
                .filter_map(|name| request.properties.get(*name).and_then(Slot::as_callback).cloned())
                .collect::<Vec<_>>()
        };
        let event = json!({"type": "load", "target": index});
        for handler in handlers {
            self.invoke(&handler, std::slice::from_ref(&event));
        }
    }
}

pub(super) struct SimRequestClass {
    sim: SimHost,
}

impl SimRequestClass {
    pub(super) fn new(sim: SimHost) -> Self {
        SimRequestClass { sim }
    }
}

impl HostClass for SimRequestClass {
    fn construct(&self, _args: &[Slot]) -> Rc<dyn HostObject> {
        let mut requests = self.sim.inner.requests.borrow_mut();
        requests.requests.push(RequestData::default());
        Rc::new(SimRequest {
            sim: self.sim.clone(),
            index: requests.requests.len() - 1,
        })
    }
}

struct SimRequest {
    sim: SimHost,
    index: usize,
}

fn text_arg(args: &[Slot], position: usize) -> String {
    match args.get(position).and_then(Slot::as_value) {
        Some(Value::String(text)) => text.clone(),
        Some(other) => other.to_string(),
        None => String::new(),
    }
}

impl SimRequest {
    fn with<R>(&self, f: impl FnOnce(&mut RequestData) -> R) -> Option<R> {
        self.sim
            .inner
            .requests
            .borrow_mut()
            .requests
            .get_mut(self.index)
            .map(f)
    }
}

impl HostObject for SimRequest {
    fn call(&self, method: &str, args: &[Slot]) -> CallbackResult {
        match method {
            "open" => {
                self.with(|request| {
                    request.method = text_arg(args, 0);
                    request.url = text_arg(args, 1);
                    request.ready_state = 1;
                    request.generation += 1;
                });
                Ok(Value::Null)
            }
            "send" => {
                let generation = self.with(|request| request.generation).unwrap_or(0);
                let index = self.index;
                self.sim
                    .schedule_internal(Duration::ZERO, move |sim| sim.complete_request(index, generation));
                Ok(Value::Null)
            }
            "abort" => {
                self.with(|request| {
                    request.generation += 1;
                    request.ready_state = 0;
                });
                Ok(Value::Null)
            }
            "setRequestHeader" => Ok(Value::Null),
            other => Err(Failure::new(format!("{other} is not a function"))),
        }
    }

    fn get(&self, property: &str) -> Slot {
        self.with(|request| match property {
            "readyState" => Slot::Value(json!(request.ready_state)),
            "status" => Slot::Value(json!(request.status)),
            "responseText" => Slot::Value(json!(request.response_text)),
            "method" => Slot::Value(json!(request.method)),
            "url" => Slot::Value(json!(request.url)),
            other => request.properties.get(other).cloned().unwrap_or_default(),
        })
        .unwrap_or_default()
    }

    fn set(&self, property: &str, value: Slot) {
        if matches!(property, "readyState" | "status" | "responseText") {
            return;
        }
        self.with(|request| {
            request.properties.insert(property.to_string(), value);
        });
    }
}
