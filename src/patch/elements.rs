// SPDX-License-Identifier: MIT OR Apache-2.0

use super::{PatchReport, PatchedProperties};
use crate::error::Error;
use crate::host::{ElementRegistry, Host, ObjectId, PropertyModel, Slot};
use crate::zone::Zone;
use std::rc::Rc;

/// Lifecycle callbacks a custom-element prototype may define.
pub const LIFECYCLE_CALLBACKS: [&str; 4] = [
    "createdCallback",
    "attachedCallback",
    "detachedCallback",
    "attributeChangedCallback",
];

struct PatchedRegistry {
    delegate: Rc<dyn ElementRegistry>,
    properties: Rc<PatchedProperties>,
}

impl ElementRegistry for PatchedRegistry {
    fn register_element(&self, name: &str, prototype: ObjectId) -> Result<(), Error> {
        let zone = Zone::current();
        for callback in LIFECYCLE_CALLBACKS {
            let Some(mut descriptor) = self.properties.get_own_property_descriptor(prototype, callback) else {
                continue;
            };
            let Some(Slot::Callback(original)) = descriptor.value.take() else {
                continue;
            };
            descriptor.value = Some(Slot::Callback(zone.bind(&original, false)));
            self.properties.redefine_property(prototype, callback, descriptor)?;
        }
        self.delegate.register_element(name, prototype)
    }
}

pub(super) fn patch_register_element(
    host: &mut Host,
    properties: Option<Rc<PatchedProperties>>,
    report: &mut PatchReport,
) {
    let Some(delegate) = host.elements.take() else {
        report.skipped("registerElement");
        return;
    };
    let Some(properties) = properties else {
        host.elements = Some(delegate);
        report.skipped_because("registerElement", "no property model to redefine callbacks with");
        return;
    };
    host.elements = Some(Rc::new(PatchedRegistry { delegate, properties }));
    report.patched("registerElement");
}
