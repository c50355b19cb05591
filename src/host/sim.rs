// SPDX-License-Identifier: MIT OR Apache-2.0

/*!
A deterministic, in-process host.

`SimHost` implements every host API family with a virtual clock and explicit
turns of the event loop, so interception can be exercised without a browser:

- timers, intervals and immediates ordered by due time, plus animation frames
- a document tree with capture and bubble dispatch and `on*` handler properties
- promises whose reactions run as microtasks
- mutation observers that batch records into a microtask
- an `XMLHttpRequest`-like class served from a route table
- an object store that enforces configurable property semantics
- a custom-element registry with lifecycle callbacks
- `alert` and `prompt`

Nothing happens until the test drives it: [`SimHost::advance`] moves the clock
and runs due tasks, [`SimHost::run_animation_frames`] runs one frame, and
[`SimHost::run_microtasks`] drains the microtask queue. Failures that escape a
callback the host invoked are collected in [`SimHost::uncaught`].

```rust
use zonewise::host::sim::SimHost;
use zonewise::sys::Duration;
use zonewise::zone::Callback;
use std::cell::Cell;
use std::rc::Rc;

let sim = SimHost::new();
let host = sim.host();
let fired = Rc::new(Cell::new(false));
let flag = fired.clone();
host.timeout.as_ref().unwrap().set(Callback::from_fn(move || flag.set(true)), Duration::from_millis(10));

sim.advance(Duration::from_millis(9));
assert!(!fired.get());
sim.advance(Duration::from_millis(1));
assert!(fired.get());
```
*/

mod dom;
mod objects;
mod promise;
mod request;
mod scheduler;


pub use promise::PromiseState;

use super::{BlockingCall, Host, TimerKind};
use crate::zone::{Callback, CallbackResult, Failure};
use serde_json::Value;
use std::cell::{Cell, RefCell};
use std::rc::Rc;

#[derive(Default)]
struct Dialogs {
    alerts: Vec<String>,
    prompts: Vec<String>,
    prompt_answer: Value,
}

struct SimInner {
    scheduler: RefCell<scheduler::Scheduler>,
    dom: RefCell<dom::Dom>,
    promises: RefCell<promise::Promises>,
    requests: RefCell<request::Requests>,
    objects: RefCell<objects::Objects>,
    dialogs: RefCell<Dialogs>,
    uncaught: RefCell<Vec<Failure>>,
    accessor_override: Cell<bool>,
}

/// The simulated host. Clones share the same state.
#[derive(Clone)]
pub struct SimHost {
    inner: Rc<SimInner>,
}

impl Default for SimHost {
    fn default() -> Self {
        Self::new()
    }
}

impl SimHost {
    pub fn new() -> SimHost {
        SimHost {
            inner: Rc::new(SimInner {
                scheduler: RefCell::new(scheduler::Scheduler::default()),
                dom: RefCell::new(dom::Dom::new()),
                promises: RefCell::new(promise::Promises::default()),
                requests: RefCell::new(request::Requests::default()),
                objects: RefCell::new(objects::Objects::default()),
                dialogs: RefCell::new(Dialogs::default()),
                uncaught: RefCell::new(Vec::new()),
                accessor_override: Cell::new(true),
            }),
        }
    }

    /// A [`Host`] with every slot filled by this simulation.
    ///
    /// The host uses a shared event-target prototype. Tests that need the
    /// per-class fallback can move it into `event_target_classes`.
    pub fn host(&self) -> Host {
        let mut host = Host::new();
        for kind in TimerKind::ALL {
            *host.set_clear_mut(kind) = Some(Rc::new(scheduler::SimTimer::new(self.clone(), kind)));
        }
        host.request_animation_frame = Some(Rc::new(scheduler::SimFrames::new(self.clone())));
        host.moz_request_animation_frame = Some(Rc::new(scheduler::SimFrames::new(self.clone())));
        host.webkit_request_animation_frame = Some(Rc::new(scheduler::SimFrames::new(self.clone())));
        host.alert = Some(Rc::new(SimDialog {
            sim: self.clone(),
            kind: DialogKind::Alert,
        }));
        host.prompt = Some(Rc::new(SimDialog {
            sim: self.clone(),
            kind: DialogKind::Prompt,
        }));
        host.event_target = Some(Rc::new(self.clone()));
        host.handlers = Some(Rc::new(self.clone()));
        host.document = Some(Rc::new(self.clone()));
        host.xml_http_request = Some(Rc::new(request::SimRequestClass::new(self.clone())));
        host.promise = Some(Rc::new(self.clone()));
        host.mutation_observer = Some(Rc::new(dom::SimObserverClass::new(self.clone())));
        host.webkit_mutation_observer = Some(Rc::new(dom::SimObserverClass::new(self.clone())));
        host.properties = Some(Rc::new(self.clone()));
        host.elements = Some(Rc::new(self.clone()));
        host
    }

    /// Controls whether handler properties can be overridden with per-instance accessors.
    pub fn set_accessor_override(&self, supported: bool) {
        self.inner.accessor_override.set(supported);
    }

    /// Failures that escaped callbacks invoked by the host, oldest first.
    pub fn uncaught(&self) -> Vec<Failure> {
        self.inner.uncaught.borrow().clone()
    }

    /// Messages passed to `alert`.
    pub fn alerts(&self) -> Vec<String> {
        self.inner.dialogs.borrow().alerts.clone()
    }

    /// Messages passed to `prompt`.
    pub fn prompts(&self) -> Vec<String> {
        self.inner.dialogs.borrow().prompts.clone()
    }

    /// The value every later `prompt` call returns.
    pub fn set_prompt_answer(&self, answer: Value) {
        self.inner.dialogs.borrow_mut().prompt_answer = answer;
    }

    fn report(&self, failure: Failure) {
        let message = failure.message().to_string();
        logwise::warn_sync!("uncaught failure in host callback: {message}", message = message);
        self.inner.uncaught.borrow_mut().push(failure);
    }

    /// Invokes a callback on behalf of the host, collecting a failure that escapes it.
    pub(crate) fn invoke(&self, callback: &Callback, args: &[Value]) -> Option<Value> {
        match callback.call(args) {
            Ok(value) => Some(value),
            Err(failure) => {
                self.report(failure);
                None
            }
        }
    }
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
enum DialogKind {
    Alert,
    Prompt,
}

/// `alert` or `prompt`.
struct SimDialog {
    sim: SimHost,
    kind: DialogKind,
}

fn message_of(args: &[Value]) -> String {
    match args.first() {
        Some(Value::String(message)) => message.clone(),
        Some(other) => other.to_string(),
        None => String::new(),
    }
}

impl BlockingCall for SimDialog {
    fn call(&self, args: &[Value]) -> CallbackResult {
        let mut dialogs = self.sim.inner.dialogs.borrow_mut();
        match self.kind {
            DialogKind::Alert => {
                dialogs.alerts.push(message_of(args));
                Ok(Value::Null)
            }
            DialogKind::Prompt => {
                dialogs.prompts.push(message_of(args));
                Ok(dialogs.prompt_answer.clone())
            }
        }
    }
}
