// SPDX-License-Identifier: MIT OR Apache-2.0

//! Causality trees, including across asynchronous hops through a patched host.

use serde_json::{Value, json};
use zonewise::history::{self, HistorySink, OccurrenceSpec, Recorder, RingBuffer};
use zonewise::host::sim::SimHost;
use zonewise::sys::Duration;
use zonewise::zone::{Callback, CallbackResult};
use zonewise::{Config, install};

#[cfg(target_arch = "wasm32")]
use wasm_bindgen_test::*;
#[cfg(target_arch = "wasm32")]
wasm_bindgen_test::wasm_bindgen_test_configure!(run_in_browser);

#[cfg_attr(not(target_arch = "wasm32"), test)]
#[cfg_attr(target_arch = "wasm32", wasm_bindgen_test)]
fn test_child_index_follows_parent() {
    let recorder = Recorder::default();
    recorder
        .record(
            Some(|| {
                recorder.record(Some(|| Ok(Value::Null)), OccurrenceSpec::new("b"), None, false);
                Ok(Value::Null)
            }),
            OccurrenceSpec::new("a"),
            None,
            false,
        )
        .unwrap()
        .unwrap();

    let tree = recorder.tree(0).unwrap();
    assert_eq!(tree.items[0].title, "a");
    assert_eq!(tree.items[0].index, 0);
    assert_eq!(tree.items[1].title, "b");
    assert_eq!(tree.items[1].parent, Some(0));
    assert_eq!(tree.items[1].index, 1);
}

#[cfg_attr(not(target_arch = "wasm32"), test)]
#[cfg_attr(target_arch = "wasm32", wasm_bindgen_test)]
fn test_force_root_starts_new_tree() {
    let recorder = Recorder::default();
    recorder
        .trace(OccurrenceSpec::new("ambient"), || {
            recorder.leaf(OccurrenceSpec::new("nested"));
            let forced = recorder.record(
                Some(|| {
                    recorder.leaf(OccurrenceSpec::new("under d"));
                    Ok(Value::Null)
                }),
                OccurrenceSpec::new("d"),
                None,
                true,
            );
            forced.unwrap()
        })
        .unwrap();

    let trees = recorder.trees();
    assert_eq!(trees.len(), 2);
    assert_eq!(trees[0].items.len(), 2);
    let forced = &trees[1];
    assert_eq!(forced.index, 1);
    assert_eq!(forced.items[0].title, "d");
    assert_eq!(forced.items[0].index, 0);
    assert_eq!(forced.items[0].parent, None);
    assert_eq!(forced.items[1].parent, Some(0));
}

#[cfg_attr(not(target_arch = "wasm32"), test)]
#[cfg_attr(target_arch = "wasm32", wasm_bindgen_test)]
fn test_ring_buffer_keeps_last_thousand() {
    let recorder = Recorder::new(RingBuffer::default());
    for i in 0..1001 {
        recorder.leaf(OccurrenceSpec::new(format!("item {i}")));
    }
    let sink = recorder.sink();
    assert_eq!(sink.len(), 1000);
    let dump = sink.dump();
    assert!(!dump.contains("\"item 0\""));
    assert!(dump.lines().next().unwrap().contains("\"item 1\""));
    assert!(dump.lines().last().unwrap().contains("\"item 1000\""));
}

#[cfg_attr(not(target_arch = "wasm32"), test)]
#[cfg_attr(target_arch = "wasm32", wasm_bindgen_test)]
fn test_capacity_from_config() {
    let config = Config::from_toml_str("history_capacity = 3").unwrap();
    let recorder = Recorder::from_config(&config);
    for title in ["a", "b", "c", "d"] {
        recorder.leaf(OccurrenceSpec::new(title));
    }
    assert_eq!(recorder.sink().len(), 3);
    assert_eq!(recorder.tree_count(), 4);
}

#[cfg_attr(not(target_arch = "wasm32"), test)]
#[cfg_attr(target_arch = "wasm32", wasm_bindgen_test)]
fn test_history_follows_timers() {
    let sim = SimHost::new();
    let mut host = sim.host();
    install(&mut host, &Config::default());
    let recorder = Recorder::default();

    let timer_recorder = recorder.clone();
    let later = Callback::from_fn(move || timer_recorder.leaf(OccurrenceSpec::new("timer fired")));
    recorder
        .trace(OccurrenceSpec::new("click"), || {
            host.timeout.as_ref().unwrap().set(later, Duration::from_millis(100));
            Ok(Value::Null)
        })
        .unwrap();
    recorder.leaf(OccurrenceSpec::new("unrelated"));

    sim.advance(Duration::from_millis(100));
    let trees = recorder.trees();
    assert_eq!(trees.len(), 2);
    let click = &trees[0];
    assert_eq!(click.items[1].title, "timer fired");
    assert_eq!(click.items[1].parent, Some(0));
    assert_eq!(trees[1].items.len(), 1);
}

#[cfg_attr(not(target_arch = "wasm32"), test)]
#[cfg_attr(target_arch = "wasm32", wasm_bindgen_test)]
fn test_default_recorder_functions() {
    let previous = history::set_default_recorder(Recorder::default());
    let result = history::record(
        Some(|| -> CallbackResult { Ok(json!("ok")) }),
        OccurrenceSpec::new("view handler").arg(json!(1)),
        Some(OccurrenceSpec::new("view")),
        false,
    );
    assert_eq!(result.unwrap().unwrap(), json!("ok"));
    history::leaf(OccurrenceSpec::new("alone"));

    assert_eq!(history::trees().len(), 2);
    let first = history::tree(0).unwrap();
    assert_eq!(first.items[1].args, vec![json!(1)]);
    assert_eq!(history::with_sink(|sink| sink.len()), 3);
    history::set_default_recorder(previous);
}
