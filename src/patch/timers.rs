// SPDX-License-Identifier: MIT OR Apache-2.0

//! Set/clear pairs and animation-frame requests.

use super::PatchReport;
use crate::host::{FrameRequest, HandleId, Host, SetClear, TimerKind};
use crate::sys::Duration;
use crate::zone::{Callback, TaskId, Zone};
use std::cell::{Cell, RefCell};
use std::collections::HashMap;
use std::rc::Rc;

fn set_name(kind: TimerKind) -> &'static str {
    match kind {
        TimerKind::Timeout => "setTimeout",
        TimerKind::Interval => "setInterval",
        TimerKind::Immediate => "setImmediate",
    }
}

/// A set/clear pair that binds callbacks and tracks which ids are still pending.
///
/// One-shot ids leave the table when they fire. Repeating ids stay until cleared.
/// The table is shared by every kind, since hosts hand out ids from one sequence
/// and any clear function cancels any id.
struct PatchedSetClear {
    delegate: Rc<dyn SetClear>,
    kind: TimerKind,
    pending: Rc<RefCell<HashMap<HandleId, TaskId>>>,
}

impl SetClear for PatchedSetClear {
    fn set(&self, callback: Callback, delay: Duration) -> HandleId {
        let zone = Zone::current();
        let handle = Rc::new(Cell::new(None));
        let scheduled = if self.kind.repeats() {
            zone.bind(&callback, false)
        } else {
            let bound = zone.bind_once(&callback);
            let pending = self.pending.clone();
            let fired = handle.clone();
            let task = bound.clone();
            Callback::wrapping(&bound, move |args| {
                if let Some(handle) = fired.get() {
                    pending.borrow_mut().remove(&handle);
                }
                task.call(args)
            })
        };
        let id = self.delegate.set(scheduled, delay);
        handle.set(Some(id));
        self.pending.borrow_mut().insert(id, callback.id());
        id
    }

    fn clear(&self, handle: HandleId) {
        let task = self.pending.borrow_mut().remove(&handle);
        if let Some(task) = task {
            Zone::current().dequeue_task(Some(task));
        }
        self.delegate.clear(handle)
    }
}

pub(super) fn patch_set_clear(host: &mut Host, report: &mut PatchReport) {
    let pending = Rc::new(RefCell::new(HashMap::new()));
    for kind in TimerKind::ALL {
        let slot = host.set_clear_mut(kind);
        match slot.take() {
            Some(delegate) => {
                *slot = Some(Rc::new(PatchedSetClear {
                    delegate,
                    kind,
                    pending: pending.clone(),
                }));
                report.patched(set_name(kind));
            }
            None => report.skipped(set_name(kind)),
        }
    }
}

/// A single-shot request whose callback is bound once.
struct PatchedFrames {
    delegate: Rc<dyn FrameRequest>,
}

impl FrameRequest for PatchedFrames {
    fn request(&self, callback: Callback) -> HandleId {
        self.delegate.request(Zone::current().bind_once(&callback))
    }

    fn cancel(&self, handle: HandleId) {
        self.delegate.cancel(handle)
    }
}

pub(super) fn patch_frames(host: &mut Host, report: &mut PatchReport) {
    let slots = [
        ("requestAnimationFrame", &mut host.request_animation_frame),
        ("mozRequestAnimationFrame", &mut host.moz_request_animation_frame),
        ("webkitRequestAnimationFrame", &mut host.webkit_request_animation_frame),
    ];
    for (name, slot) in slots {
        match slot.take() {
            Some(delegate) => {
                *slot = Some(Rc::new(PatchedFrames { delegate }));
                report.patched(name);
            }
            None => report.skipped(name),
        }
    }
}
