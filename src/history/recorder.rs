// SPDX-License-Identifier: MIT OR Apache-2.0

use super::occurrence::{HistoryTree, OccurrenceSpec};
use super::sink::{HistorySink, RingBuffer};
use crate::config::Config;
use crate::zone::{CallbackResult, Zone, ZoneSpec};
use serde_json::Value;
use std::cell::{Ref, RefCell};
use std::collections::HashMap;
use std::rc::Rc;
use std::sync::atomic::{AtomicU64, Ordering};

static RECORDER_ID: AtomicU64 = AtomicU64::new(0);

/// Attached to zones forked by [`Recorder::record`]: for each recorder, the
/// `(tree, item)` that anything it records inside the zone nests under.
///
/// A fork copies the inherited map and adds its own entry, so nesting one
/// recorder inside another keeps both positions.
#[derive(Debug, Default, Clone)]
struct Cursors(HashMap<u64, (usize, usize)>);

/// Where a new occurrence goes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Placement {
    AttachTo { tree: usize, parent: usize },
    NewRoot,
}

#[derive(Debug)]
struct RecorderInner {
    id: u64,
    trees: RefCell<Vec<HistoryTree>>,
    sink: RefCell<Box<dyn HistorySink>>,
}

/// Builds causality trees out of nested [`record`](Recorder::record) calls.
///
/// Clones share the same trees and sink.
#[derive(Debug, Clone)]
pub struct Recorder {
    inner: Rc<RecorderInner>,
}

impl Default for Recorder {
    fn default() -> Self {
        Self::new(RingBuffer::default())
    }
}

impl Recorder {
    /// A recorder writing to `sink`, which is initialized here.
    pub fn new(sink: impl HistorySink + 'static) -> Recorder {
        let mut sink: Box<dyn HistorySink> = Box::new(sink);
        sink.init();
        Recorder {
            inner: Rc::new(RecorderInner {
                id: RECORDER_ID.fetch_add(1, Ordering::Relaxed),
                trees: RefCell::new(Vec::new()),
                sink: RefCell::new(sink),
            }),
        }
    }

    /// A recorder with a [`RingBuffer`] of the configured capacity.
    pub fn from_config(config: &Config) -> Recorder {
        Self::new(RingBuffer::new(config.history_capacity))
    }

    /// Records `item` and runs `f` beneath it.
    ///
    /// If the current zone was forked by a `record` call of this recorder, `item`
    /// becomes a child of that call's occurrence. Otherwise, or when `force_root`
    /// is set, it becomes the root of a new tree.
    ///
    /// With `f`, a child zone is forked to remember `item`, `f` runs in it, and
    /// its result is returned. Without `f`, `item` is a leaf and `None` is returned.
    ///
    /// `parent_item` is recorded first, in `item`'s place, and `item` becomes its
    /// only child.
    ///
    /// ```rust
    /// use zonewise::history::{OccurrenceSpec, Recorder};
    /// use serde_json::json;
    ///
    /// let recorder = Recorder::default();
    /// let result = recorder.record(
    ///     Some(|| {
    ///         recorder.leaf(OccurrenceSpec::new("b"));
    ///         Ok(json!("done"))
    ///     }),
    ///     OccurrenceSpec::new("a"),
    ///     None,
    ///     false,
    /// );
    /// assert_eq!(result.unwrap().unwrap(), json!("done"));
    ///
    /// let tree = recorder.tree(0).unwrap();
    /// assert_eq!(tree.items[1].title, "b");
    /// assert_eq!(tree.items[1].parent, Some(0));
    /// ```
    pub fn record<F>(
        &self,
        f: Option<F>,
        item: OccurrenceSpec,
        parent_item: Option<OccurrenceSpec>,
        force_root: bool,
    ) -> Option<CallbackResult>
    where
        F: FnOnce() -> CallbackResult,
    {
        let Some(parent_item) = parent_item else {
            return self.record_item(f, item, force_root);
        };
        let leaf = f.is_none();
        let child = || self.record_item(f, item, false).unwrap_or(Ok(Value::Null));
        let result = self.record_item(Some(child), parent_item, force_root);
        if leaf { None } else { result }
    }

    /// Records `item` and runs `f` beneath it, returning `f`'s result.
    pub fn trace<F>(&self, item: OccurrenceSpec, f: F) -> CallbackResult
    where
        F: FnOnce() -> CallbackResult,
    {
        self.record_item(Some(f), item, false)
            .unwrap_or(Ok(Value::Null))
    }

    /// Records `item` with nothing beneath it.
    pub fn leaf(&self, item: OccurrenceSpec) {
        self.record_item(None::<fn() -> CallbackResult>, item, false);
    }

    fn placement(&self, force_root: bool) -> Placement {
        if force_root {
            return Placement::NewRoot;
        }
        let cursor = Zone::current()
            .extension::<Cursors>()
            .and_then(|cursors| cursors.0.get(&self.inner.id).copied());
        match cursor {
            Some((tree, parent)) => Placement::AttachTo { tree, parent },
            None => Placement::NewRoot,
        }
    }

    fn record_item<F>(&self, f: Option<F>, item: OccurrenceSpec, force_root: bool) -> Option<CallbackResult>
    where
        F: FnOnce() -> CallbackResult,
    {
        let leaf = f.is_none();
        let (tree, index) = {
            let mut trees = self.inner.trees.borrow_mut();
            let (tree, parent) = match self.placement(force_root) {
                Placement::AttachTo { tree, parent } if tree < trees.len() => (tree, Some(parent)),
                _ => {
                    let index = trees.len();
                    trees.push(HistoryTree {
                        index,
                        items: Vec::new(),
                    });
                    (index, None)
                }
            };
            let items = &mut trees[tree].items;
            let index = items.len();
            items.push(item.place(tree, index, parent, leaf));
            (tree, index)
        };
        {
            let trees = self.inner.trees.borrow();
            let tree = &trees[tree];
            self.inner.sink.borrow_mut().append(tree, &tree.items[index]);
        }
        let tree_index = tree as u64;
        let item_index = index as u64;
        logwise::debuginternal_sync!("recorded occurrence {item} in tree {tree}", item = item_index, tree = tree_index);

        let f = f?;
        let current = Zone::current();
        let mut cursors = current
            .extension::<Cursors>()
            .map(|inherited| (*inherited).clone())
            .unwrap_or_default();
        cursors.0.insert(self.inner.id, (tree, index));
        let zone = current.fork(ZoneSpec::new().extension(cursors));
        Some(zone.run(f))
    }

    /// A snapshot of every tree recorded so far, in creation order.
    pub fn trees(&self) -> Vec<HistoryTree> {
        self.inner.trees.borrow().clone()
    }

    /// A snapshot of the tree at `index`, if there is one.
    pub fn tree(&self, index: usize) -> Option<HistoryTree> {
        self.inner.trees.borrow().get(index).cloned()
    }

    /// How many trees have been started.
    pub fn tree_count(&self) -> usize {
        self.inner.trees.borrow().len()
    }

    /// The sink occurrences are appended to.
    pub fn sink(&self) -> Ref<'_, dyn HistorySink> {
        Ref::map(self.inner.sink.borrow(), |sink| sink.as_ref())
    }
}
