// SPDX-License-Identifier: MIT OR Apache-2.0

//! The virtual clock: timers, animation frames and the microtask queue.

use super::SimHost;
use crate::host::{FrameRequest, HandleId, SetClear, TimerKind};
use crate::sys::Duration;
use crate::zone::Callback;
use serde_json::json;
use std::collections::{BTreeMap, HashMap, VecDeque};

/// Intervals shorter than this are clamped, so a zero-delay interval cannot
/// starve the clock.
const MIN_INTERVAL: Duration = Duration::from_millis(1);

pub(super) type Job = Box<dyn FnOnce(&SimHost)>;

pub(super) enum Task {
    Timer {
        handle: HandleId,
        callback: Callback,
        period: Option<Duration>,
    },
    /// Host-internal work, such as completing a request.
    Internal(Job),
}

type Key = (Duration, u64);

#[derive(Default)]
pub(super) struct Scheduler {
    now: Duration,
    next_handle: u64,
    sequence: u64,
    queue: BTreeMap<Key, Task>,
    handles: HashMap<HandleId, Key>,
    frames: BTreeMap<HandleId, Callback>,
    microtasks: VecDeque<Job>,
}

impl Scheduler {
    fn next_handle(&mut self) -> HandleId {
        self.next_handle += 1;
        HandleId(self.next_handle)
    }

    fn push(&mut self, delay: Duration, task: Task) {
        let key = (self.now + delay, self.sequence);
        self.sequence += 1;
        if let Task::Timer { handle, .. } = &task {
            self.handles.insert(*handle, key);
        }
        self.queue.insert(key, task);
    }

    fn cancel(&mut self, handle: HandleId) {
        if let Some(key) = self.handles.remove(&handle) {
            self.queue.remove(&key);
        }
    }

    /// Removes the earliest task due at or before `deadline` and moves the clock to it.
    fn pop_due(&mut self, deadline: Duration) -> Option<Task> {
        let key = *self.queue.keys().next()?;
        if key.0 > deadline {
            return None;
        }
        let task = self.queue.remove(&key)?;
        if let Task::Timer { handle, .. } = &task {
            self.handles.remove(handle);
        }
        self.now = key.0;
        Some(task)
    }
}

impl SimHost {
    /// Time elapsed on the virtual clock.
    pub fn now(&self) -> Duration {
        self.inner.scheduler.borrow().now
    }

    /// Number of timers, intervals and immediates still scheduled.
    pub fn pending_timers(&self) -> usize {
        self.inner.scheduler.borrow().handles.len()
    }

    pub fn pending_frames(&self) -> usize {
        self.inner.scheduler.borrow().frames.len()
    }

    pub(super) fn set_timer(&self, kind: TimerKind, callback: Callback, delay: Duration) -> HandleId {
        let delay = match kind {
            TimerKind::Immediate => Duration::ZERO,
            _ => delay,
        };
        let period = kind.repeats().then(|| delay.max(MIN_INTERVAL));
        let mut scheduler = self.inner.scheduler.borrow_mut();
        let handle = scheduler.next_handle();
        scheduler.push(
            period.unwrap_or(delay),
            Task::Timer {
                handle,
                callback,
                period,
            },
        );
        handle
    }

    pub(super) fn clear_timer(&self, handle: HandleId) {
        self.inner.scheduler.borrow_mut().cancel(handle);
    }

    pub(super) fn schedule_internal(&self, delay: Duration, job: impl FnOnce(&SimHost) + 'static) {
        self.inner
            .scheduler
            .borrow_mut()
            .push(delay, Task::Internal(Box::new(job)));
    }

    pub(super) fn queue_microtask(&self, job: impl FnOnce(&SimHost) + 'static) {
        self.inner.scheduler.borrow_mut().microtasks.push_back(Box::new(job));
    }

    /// Runs queued microtasks, including ones they queue, until the queue is empty.
    ///
    /// Returns the number of microtasks run.
    pub fn run_microtasks(&self) -> usize {
        let mut ran = 0;
        loop {
            let job = self.inner.scheduler.borrow_mut().microtasks.pop_front();
            let Some(job) = job else {
                return ran;
            };
            job(self);
            ran += 1;
        }
    }

    /// Moves the virtual clock forward by `by`, running every task that becomes due
    /// in order, with a microtask checkpoint after each.
    ///
    /// Returns the number of tasks and microtasks run.
    pub fn advance(&self, by: Duration) -> usize {
        let deadline = self.now() + by;
        let mut ran = self.run_microtasks();
        loop {
            let task = self.inner.scheduler.borrow_mut().pop_due(deadline);
            let Some(task) = task else {
                break;
            };
            match task {
                Task::Timer {
                    handle,
                    callback,
                    period,
                } => {
                    if let Some(period) = period {
                        self.inner.scheduler.borrow_mut().push(
                            period,
                            Task::Timer {
                                handle,
                                callback: callback.clone(),
                                period: Some(period),
                            },
                        );
                    }
                    self.invoke(&callback, &[]);
                }
                Task::Internal(job) => job(self),
            }
            ran += 1 + self.run_microtasks();
        }
        self.inner.scheduler.borrow_mut().now = deadline;
        ran
    }

    /// Runs every animation frame callback requested so far.
    ///
    /// Callbacks requested while the frame runs wait for the next frame.
    pub fn run_animation_frames(&self) -> usize {
        let (frames, timestamp) = {
            let mut scheduler = self.inner.scheduler.borrow_mut();
            (std::mem::take(&mut scheduler.frames), scheduler.now.as_secs_f64() * 1000.0)
        };
        let ran = frames.len();
        for callback in frames.values() {
            self.invoke(callback, &[json!(timestamp)]);
            self.run_microtasks();
        }
        ran
    }
}

/// One of the set/clear pairs.
pub(super) struct SimTimer {
    sim: SimHost,
    kind: TimerKind,
}

impl SimTimer {
    pub(super) fn new(sim: SimHost, kind: TimerKind) -> Self {
        SimTimer { sim, kind }
    }
}

impl SetClear for SimTimer {
    fn set(&self, callback: Callback, delay: Duration) -> HandleId {
        self.sim.set_timer(self.kind, callback, delay)
    }

    fn clear(&self, handle: HandleId) {
        self.sim.clear_timer(handle)
    }
}

pub(super) struct SimFrames {
    sim: SimHost,
}

impl SimFrames {
    pub(super) fn new(sim: SimHost) -> Self {
        SimFrames { sim }
    }
}

impl FrameRequest for SimFrames {
    fn request(&self, callback: Callback) -> HandleId {
        let mut scheduler = self.sim.inner.scheduler.borrow_mut();
        let handle = scheduler.next_handle();
        scheduler.frames.insert(handle, callback);
        handle
    }

    fn cancel(&self, handle: HandleId) {
        self.sim.inner.scheduler.borrow_mut().frames.remove(&handle);
    }
}
