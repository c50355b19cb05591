//SPDX-License-Identifier: MIT OR Apache-2.0
/*!
# zonewise

zonewise provides dynamically-scoped execution contexts ("zones") that follow
callbacks across asynchronous boundaries.

# Development status

zonewise is experimental and the API may change.

# The problem

A callback registered with a timer, an event listener or a promise runs later,
from the host's event loop, with none of the context that was active when it
was registered. Request ids, error handlers and "how many tasks are still
pending" bookkeeping are all lost at the first asynchronous hop.

# Zones

A [`Zone`](zone::Zone) is an immutable context node. Zones fork into children
that inherit and extend their parent's hooks and data, and exactly one zone is
current on each thread at a time. Binding a callback captures the current zone,
so that when the callback eventually runs it runs in (a child of) the zone it
was registered in, with `before_task`/`after_task` hooks around it.

```rust
use zonewise::zone::{Callback, Hook, Zone, ZoneSpec};
use serde_json::json;

let request = Zone::current().fork(
    ZoneSpec::new()
        .data("request", json!(42))
        .hook(Hook::before_task(|zone| println!("entering {zone}"))),
);
let callback = request.bind(
    &Callback::new(|_| Ok(Zone::current().data("request").cloned().unwrap_or_default())),
    false,
);
// later, from anywhere
assert_eq!(callback.call(&[]).unwrap(), json!(42));
```

# Interception

Nobody binds callbacks by hand. The [`host`] module describes the asynchronous
APIs of a host environment as traits gathered in a [`Host`](host::Host);
[`patch::install`] wraps each of them so that every callback registered through
the host is bound to the zone that was current at registration. A complete
deterministic host, [`host::sim::SimHost`], is included for tests and examples.

# History

The [`history`] module is a consumer of zones: it records nested operations as
causality trees, following the chain across asynchronous callbacks, and keeps
the most recent occurrences in a ring buffer. [`flux`] builds flux-style
tracing helpers on top of it.

# Logging

zonewise logs through [logwise](https://crates.io/crates/logwise). Internal
traces such as zone forks and skipped patch targets are `debuginternal` logs,
enabled with the `logwise_internal` feature.

# Threading

Zones are reference counted and not `Send`. Each thread has its own root and
current zone, and each host is driven from a single thread.
*/

pub mod config;
pub mod error;
pub mod flux;
pub mod history;
pub mod host;
pub mod patch;
pub mod sys;
pub mod zone;

logwise::declare_logging_domain!();

pub use config::Config;
pub use error::Error;
pub use history::{Occurrence, OccurrenceSpec, Recorder, record};
pub use host::Host;
pub use patch::{PatchReport, install};
pub use zone::{ApplyZone, Callback, CallbackResult, Failure, Hook, Zone, ZoneSpec};
