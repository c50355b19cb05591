// SPDX-License-Identifier: MIT OR Apache-2.0

/*!
Causality trees built on zones.

A [`Recorder`] turns nested operations into trees of [`Occurrence`]s. Each call
to [`record`] appends an occurrence and runs its function in a forked zone that
remembers it; anything recorded while that zone is current, synchronously or
from a callback bound inside it, nests beneath it. A `record` call with no
enclosing recorded zone starts a new tree.

Every occurrence is also handed to the recorder's [`HistorySink`], by default a
[`RingBuffer`] holding the serialized form of the most recent entries.

The free functions in this module use a recorder local to the current thread.

```rust
use zonewise::history::{self, OccurrenceSpec};
use serde_json::Value;

history::trace(OccurrenceSpec::new("checkout"), || {
    history::leaf(OccurrenceSpec::new("validate cart"));
    Ok(Value::Null)
})
.unwrap();

let tree = history::trees().pop().unwrap();
assert_eq!(tree.items[0].title, "checkout");
assert_eq!(tree.items[1].parent, Some(0));
```
*/

mod occurrence;
mod recorder;
mod sink;

pub use occurrence::{HistoryTree, Occurrence, OccurrenceSpec, SourceLink};
pub use recorder::Recorder;
pub use sink::{DEFAULT_CAPACITY, HistorySink, RingBuffer};

use crate::zone::CallbackResult;
use std::cell::RefCell;

thread_local! {
    static DEFAULT_RECORDER: RefCell<Recorder> = RefCell::new(Recorder::default());
}

/// The recorder behind this module's free functions.
pub fn default_recorder() -> Recorder {
    DEFAULT_RECORDER.with(|recorder| recorder.borrow().clone())
}

/// Replaces this thread's default recorder, returning the previous one.
pub fn set_default_recorder(recorder: Recorder) -> Recorder {
    DEFAULT_RECORDER.with(|current| current.replace(recorder))
}

/// [`Recorder::record`] on the default recorder.
pub fn record<F>(
    f: Option<F>,
    item: OccurrenceSpec,
    parent_item: Option<OccurrenceSpec>,
    force_root: bool,
) -> Option<CallbackResult>
where
    F: FnOnce() -> CallbackResult,
{
    default_recorder().record(f, item, parent_item, force_root)
}

/// [`Recorder::trace`] on the default recorder.
pub fn trace<F>(item: OccurrenceSpec, f: F) -> CallbackResult
where
    F: FnOnce() -> CallbackResult,
{
    default_recorder().trace(item, f)
}

/// [`Recorder::leaf`] on the default recorder.
pub fn leaf(item: OccurrenceSpec) {
    default_recorder().leaf(item)
}

/// [`Recorder::trees`] on the default recorder.
pub fn trees() -> Vec<HistoryTree> {
    default_recorder().trees()
}

/// [`Recorder::tree`] on the default recorder.
pub fn tree(index: usize) -> Option<HistoryTree> {
    default_recorder().tree(index)
}

/// Runs `f` with the default recorder's sink.
pub fn with_sink<R>(f: impl FnOnce(&dyn HistorySink) -> R) -> R {
    let recorder = default_recorder();
    let sink = recorder.sink();
    f(&*sink)
}
