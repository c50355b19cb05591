// SPDX-License-Identifier: MIT OR Apache-2.0

use super::PatchReport;
use crate::host::{Host, PromiseApi, PromiseId};
use crate::zone::{Callback, Zone};
use std::rc::Rc;

/// `then` and `catch` with their reactions bound to the registering zone.
struct PatchedPromise {
    delegate: Rc<dyn PromiseApi>,
}

impl PromiseApi for PatchedPromise {
    fn then(&self, promise: PromiseId, on_fulfilled: Option<Callback>, on_rejected: Option<Callback>) -> PromiseId {
        let zone = Zone::current();
        let on_fulfilled = on_fulfilled.map(|callback| zone.bind(&callback, false));
        let on_rejected = on_rejected.map(|callback| zone.bind(&callback, false));
        self.delegate.then(promise, on_fulfilled, on_rejected)
    }

    fn catch(&self, promise: PromiseId, on_rejected: Callback) -> PromiseId {
        self.delegate
            .catch(promise, Zone::current().bind(&on_rejected, false))
    }
}

pub(super) fn patch_promise(host: &mut Host, report: &mut PatchReport) {
    match host.promise.take() {
        Some(delegate) => {
            host.promise = Some(Rc::new(PatchedPromise { delegate }));
            report.patched("Promise");
        }
        None => report.skipped("Promise"),
    }
}
