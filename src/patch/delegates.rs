// SPDX-License-Identifier: MIT OR Apache-2.0

//! Blocking delegates such as `alert` and `prompt`.

use super::PatchReport;
use crate::host::{BlockingCall, Host};
use crate::zone::{CallbackResult, Zone};
use serde_json::Value;
use std::rc::Rc;

/// Calls through the current zone's override for this name if it has one.
///
/// The caller's zone is already current, so no task turn is started.
struct PatchedBlocking {
    name: &'static str,
    delegate: Rc<dyn BlockingCall>,
}

impl BlockingCall for PatchedBlocking {
    fn call(&self, args: &[Value]) -> CallbackResult {
        match Zone::current().delegate(self.name).cloned() {
            Some(replacement) => replacement.call(args),
            None => self.delegate.call(args),
        }
    }
}

pub(super) fn patch_blocking(host: &mut Host, report: &mut PatchReport) {
    for (name, slot) in [("alert", &mut host.alert), ("prompt", &mut host.prompt)] {
        match slot.take() {
            Some(delegate) => {
                *slot = Some(Rc::new(PatchedBlocking { name, delegate }));
                report.patched(name);
            }
            None => report.skipped(name),
        }
    }
}
