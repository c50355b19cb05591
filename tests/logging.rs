// SPDX-License-Identifier: MIT OR Apache-2.0

//! Warnings zonewise emits through the global loggers.

use logwise::InMemoryLogger;
use logwise::global_logger::add_global_logger;
use serde_json::json;
use std::sync::Arc;
use zonewise::host::sim::SimHost;
use zonewise::host::Descriptor;
use zonewise::sys::Duration;
use zonewise::zone::{Callback, Failure};
use zonewise::{Config, install};

#[test]
fn test_uncaught_and_redefinition_warnings() {
    let logger = Arc::new(InMemoryLogger::new());
    add_global_logger(logger.clone());

    let sim = SimHost::new();
    let mut host = sim.host();
    install(&mut host, &Config::default());

    host.timeout
        .as_ref()
        .unwrap()
        .set(Callback::new(|_| Err(Failure::new("boom"))), Duration::ZERO);
    sim.advance(Duration::ZERO);

    let properties = host.properties.as_ref().unwrap();
    let object = sim.create_object();
    properties
        .define_property(object, "fixed", Descriptor::data(json!(1)).configurable(false))
        .unwrap();
    assert!(properties.define_property(object, "fixed", Descriptor::data(json!(2))).is_err());

    let logs = logger.drain_logs();
    assert!(logs.contains("uncaught failure in host callback"));
    assert!(logs.contains("refusing to redefine"));
}
