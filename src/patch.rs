// SPDX-License-Identifier: MIT OR Apache-2.0

//! Installs zone interception into a [`Host`].
//!
//! [`install`] replaces every present slot of a host with a wrapper that binds
//! callbacks to the zone that is current when they are registered. Wrappers
//! delegate to the wrapped implementation with the same arguments and return
//! its result, so a host behaves exactly as before except that callbacks run
//! in the right zone.
//!
//! Slots that are `None` are skipped and stay `None`. Installing twice is a no-op.
//!
//! ```rust
//! use zonewise::config::Config;
//! use zonewise::host::sim::SimHost;
//! use zonewise::patch;
//! use zonewise::sys::Duration;
//! use zonewise::zone::{Callback, Zone, ZoneSpec};
//! use serde_json::json;
//! use std::cell::RefCell;
//! use std::rc::Rc;
//!
//! let sim = SimHost::new();
//! let mut host = sim.host();
//! patch::install(&mut host, &Config::default());
//!
//! let seen = Rc::new(RefCell::new(None));
//! let sink = seen.clone();
//! let request = Zone::current().fork(ZoneSpec::new().data("request", json!(7)));
//! request.enter(|| {
//!     host.timeout.as_ref().unwrap().set(
//!         Callback::from_fn(move || *sink.borrow_mut() = Zone::current().data("request").cloned()),
//!         Duration::from_millis(5),
//!     )
//! });
//!
//! sim.advance(Duration::from_millis(5));
//! assert_eq!(*seen.borrow(), Some(json!(7)));
//! ```

mod classes;
mod delegates;
mod elements;
mod events;
mod promise;
mod properties;
mod timers;

#[cfg(test)]
mod tests;

pub use properties::PatchedProperties;

use crate::config::Config;
use crate::host::Host;
use std::fmt::Display;

/// What [`install`] did to a host.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PatchReport {
    /// Targets that were wrapped, in installation order.
    pub patched: Vec<String>,
    /// Targets that were left alone, usually because the host does not provide them.
    pub skipped: Vec<String>,
    /// Set when the host already had interception installed and nothing was done.
    pub already_installed: bool,
}

impl PatchReport {
    pub(crate) fn patched(&mut self, target: impl Display) {
        self.patched.push(target.to_string());
    }

    pub(crate) fn skipped(&mut self, target: impl Display) {
        self.skipped_because(target, "absent");
    }

    pub(crate) fn skipped_because(&mut self, target: impl Display, reason: &'static str) {
        let name = target.to_string();
        logwise::debuginternal_sync!("skip patching {name}: {reason}", name = name.clone(), reason = reason);
        self.skipped.push(name);
    }

    pub fn is_patched(&self, target: &str) -> bool {
        self.patched.iter().any(|t| t == target)
    }
}

/// Installs interception into every API family `host` provides.
///
/// Targets are patched in a fixed order: set/clear pairs, animation frames,
/// blocking delegates, event targets, inline handler properties, the request
/// class, promises, observer classes, property definition and finally
/// custom-element registration. Inline handlers depend on the already
/// patched event targets, and custom elements on the patched property model.
pub fn install(host: &mut Host, config: &Config) -> PatchReport {
    if host.installed {
        return PatchReport {
            already_installed: true,
            ..PatchReport::default()
        };
    }
    let mut report = PatchReport::default();
    timers::patch_set_clear(host, &mut report);
    timers::patch_frames(host, &mut report);
    delegates::patch_blocking(host, &mut report);
    events::patch_event_targets(host, &mut report);
    events::patch_inline_handlers(host, config, &mut report);
    classes::patch_request_class(host, &mut report);
    if config.patch_promises {
        promise::patch_promise(host, &mut report);
    }
    classes::patch_observer_classes(host, &mut report);
    let properties = properties::patch_properties(host, &mut report);
    elements::patch_register_element(host, properties, &mut report);
    host.installed = true;

    let patched = report.patched.len() as u64;
    let skipped = report.skipped.len() as u64;
    logwise::info_sync!("installed zone interception: {patched} targets patched, {skipped} skipped", patched = patched, skipped = skipped);
    report
}

/// Installs interception with the default [`Config`].
pub fn patch(host: &mut Host) -> PatchReport {
    install(host, &Config::default())
}
