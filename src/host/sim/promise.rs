// SPDX-License-Identifier: MIT OR Apache-2.0

//! Promises settled through the microtask queue.

use super::SimHost;
use crate::host::{PromiseApi, PromiseId};
use crate::zone::{Callback, Failure};
use serde_json::Value;

#[derive(Clone, Debug, PartialEq)]
pub enum PromiseState {
    Pending,
    Fulfilled(Value),
    Rejected(Value),
}

struct Reaction {
    on_fulfilled: Option<Callback>,
    on_rejected: Option<Callback>,
    derived: PromiseId,
}

struct PromiseData {
    state: PromiseState,
    reactions: Vec<Reaction>,
}

#[derive(Default)]
pub(super) struct Promises {
    promises: Vec<PromiseData>,
}

impl Promises {
    fn create(&mut self, state: PromiseState) -> PromiseId {
        self.promises.push(PromiseData {
            state,
            reactions: Vec::new(),
        });
        PromiseId(self.promises.len() as u64 - 1)
    }
}

/// The rejection reason a failed reaction produces.
fn rejection_reason(failure: &Failure) -> Value {
    match failure.payload() {
        Value::Null => Value::String(failure.message().to_string()),
        payload => payload.clone(),
    }
}

impl SimHost {
    pub fn pending_promise(&self) -> PromiseId {
        self.inner.promises.borrow_mut().create(PromiseState::Pending)
    }

    pub fn resolved_promise(&self, value: Value) -> PromiseId {
        self.inner.promises.borrow_mut().create(PromiseState::Fulfilled(value))
    }

    pub fn rejected_promise(&self, reason: Value) -> PromiseId {
        self.inner.promises.borrow_mut().create(PromiseState::Rejected(reason))
    }

    pub fn resolve_promise(&self, promise: PromiseId, value: Value) {
        self.settle(promise, PromiseState::Fulfilled(value));
    }

    pub fn reject_promise(&self, promise: PromiseId, reason: Value) {
        self.settle(promise, PromiseState::Rejected(reason));
    }

    pub fn promise_state(&self, promise: PromiseId) -> Option<PromiseState> {
        self.inner
            .promises
            .borrow()
            .promises
            .get(promise.0 as usize)
            .map(|p| p.state.clone())
    }

    /// Settles a pending promise and queues its reactions. Settled promises are left alone.
    fn settle(&self, promise: PromiseId, state: PromiseState) {
        let reactions = {
            let mut promises = self.inner.promises.borrow_mut();
            let Some(data) = promises.promises.get_mut(promise.0 as usize) else {
                return;
            };
            if data.state != PromiseState::Pending {
                return;
            }
            data.state = state.clone();
            std::mem::take(&mut data.reactions)
        };
        for reaction in reactions {
            self.queue_reaction(reaction, state.clone());
        }
    }

    fn queue_reaction(&self, reaction: Reaction, state: PromiseState) {
        self.queue_microtask(move |sim| {
            let (handler, value, fulfilled) = match state {
                PromiseState::Fulfilled(value) => (reaction.on_fulfilled, value, true),
                PromiseState::Rejected(reason) => (reaction.on_rejected, reason, false),
                PromiseState::Pending => return,
            };
            let outcome = match handler {
                Some(handler) => match handler.call(&[value]) {
                    Ok(value) => PromiseState::Fulfilled(value),
                    Err(failure) => PromiseState::Rejected(rejection_reason(&failure)),
                },
                None if fulfilled => PromiseState::Fulfilled(value),
                None => PromiseState::Rejected(value),
            };
            sim.settle(reaction.derived, outcome);
        });
    }
}

impl PromiseApi for SimHost {
    fn then(&self, promise: PromiseId, on_fulfilled: Option<Callback>, on_rejected: Option<Callback>) -> PromiseId {
        let (derived, settled) = {
            let mut promises = self.inner.promises.borrow_mut();
            let derived = promises.create(PromiseState::Pending);
            let settled = promises
                .promises
                .get(promise.0 as usize)
                .map(|p| p.state.clone())
                .unwrap_or(PromiseState::Pending);
            (derived, settled)
        };
        let reaction = Reaction {
            on_fulfilled,
            on_rejected,
            derived,
        };
        match settled {
            PromiseState::Pending => {
                if let Some(data) = self.inner.promises.borrow_mut().promises.get_mut(promise.0 as usize) {
                    data.reactions.push(reaction);
                }
            }
            state => self.queue_reaction(reaction, state),
        }
        derived
    }

    fn catch(&self, promise: PromiseId, on_rejected: Callback) -> PromiseId {
        self.then(promise, None, Some(on_rejected))
    }
}
