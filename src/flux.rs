// SPDX-License-Identifier: MIT OR Apache-2.0

//! Tracing helpers for flux-style applications.
//!
//! A flux application moves through three kinds of operations: action creators
//! called from views, actions dispatched to stores, and store methods reacting to
//! them. [`FluxTracer`] wraps each kind in a recorded occurrence with a
//! distinguishing class, so the causality tree reads as view → action creator →
//! action → store.
//!
//! A tracer attached to no recorder runs the wrapped functions and records nothing.
//!
//! ```rust
//! use zonewise::flux::FluxTracer;
//! use zonewise::history::Recorder;
//! use serde_json::{Value, json};
//!
//! let recorder = Recorder::default();
//! let flux = FluxTracer::attach(Some(&recorder));
//! flux.trace_action_creator("TodoActions", "add", vec![json!("milk")], || {
//!     flux.trace_dispatch("ADD_TODO", vec![json!("milk")], || {
//!         flux.trace_store("TodoStore", "onAdd", || Ok(Value::Null))
//!     })
//! })
//! .unwrap();
//!
//! let tree = recorder.tree(0).unwrap();
//! let classes: Vec<_> = tree.items.iter().map(|o| o.class.as_deref().unwrap()).collect();
//! assert_eq!(classes, vec!["Node--actionOriginator", "Node--actionCreator", "Node--action", "Node--store"]);
//! ```

use crate::history::{OccurrenceSpec, Recorder, SourceLink};
use crate::zone::CallbackResult;
use serde_json::Value;
use std::panic::Location;

pub const ACTION_CLASS: &str = "Node--action";
pub const STORE_CLASS: &str = "Node--store";
pub const ACTION_CREATOR_CLASS: &str = "Node--actionCreator";
pub const ACTION_ORIGINATOR_CLASS: &str = "Node--actionOriginator";

fn location_link(label: impl Into<String>, location: &Location<'_>) -> SourceLink {
    SourceLink::new(label, location.to_string())
}

/// Records dispatches, store handlers and action creators into a [`Recorder`].
///
/// A tracer without a recorder runs the traced functions and records nothing.
#[derive(Debug, Clone, Default)]
pub struct FluxTracer {
    recorder: Option<Recorder>,
}

impl FluxTracer {
    /// A tracer writing to `recorder`, or a pass-through tracer for `None`.
    ///
    /// ```rust
    /// use zonewise::flux::FluxTracer;
    /// use zonewise::history::Recorder;
    ///
    /// assert!(!FluxTracer::attach(None).is_attached());
    /// assert!(FluxTracer::attach(Some(&Recorder::default())).is_attached());
    /// ```
    pub fn attach(recorder: Option<&Recorder>) -> FluxTracer {
        FluxTracer {
            recorder: recorder.cloned(),
        }
    }

    pub fn is_attached(&self) -> bool {
        self.recorder.is_some()
    }

    fn record<F>(&self, f: F, item: OccurrenceSpec, parent_item: Option<OccurrenceSpec>) -> CallbackResult
    where
        F: FnOnce() -> CallbackResult,
    {
        match &self.recorder {
            Some(recorder) => recorder
                .record(Some(f), item, parent_item, false)
                .unwrap_or(Ok(Value::Null)),
            None => f(),
        }
    }

    /// Traces the dispatch of `action` with its payload `args`.
    pub fn trace_dispatch<F>(&self, action: &str, args: Vec<Value>, f: F) -> CallbackResult
    where
        F: FnOnce() -> CallbackResult,
    {
        let item = OccurrenceSpec::new(action).class(ACTION_CLASS).args(args);
        self.record(f, item, None)
    }

    /// Traces a store method. The source link points at the caller.
    #[track_caller]
    pub fn trace_store<F>(&self, store: &str, method: &str, f: F) -> CallbackResult
    where
        F: FnOnce() -> CallbackResult,
    {
        let item = OccurrenceSpec::new(store)
            .subtitle(method)
            .class(STORE_CLASS)
            .source_link(location_link(store, Location::caller()));
        self.record(f, item, None)
    }

    /// Traces an action-creator call.
    ///
    /// The call is recorded beneath a synthetic originator occurrence naming the
    /// caller's source location, standing in for the view that triggered it.
    #[track_caller]
    pub fn trace_action_creator<F>(&self, creator: &str, method: &str, args: Vec<Value>, f: F) -> CallbackResult
    where
        F: FnOnce() -> CallbackResult,
    {
        let caller = Location::caller();
        let item = OccurrenceSpec::new(format!("{creator}.{method}"))
            .class(ACTION_CREATOR_CLASS)
            .args(args)
            .source_link(location_link(creator, caller));
        let origin = OccurrenceSpec::new(caller.file())
            .class(ACTION_ORIGINATOR_CLASS)
            .source_link(location_link(caller.file(), caller));
        self.record(f, item, Some(origin))
    }
}
