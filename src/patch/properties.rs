// SPDX-License-Identifier: MIT OR Apache-2.0

//! Property definition that keeps every property reconfigurable.
//!
//! Interception has to be able to redefine properties after user code has
//! defined them, so the patched model never lets a property reach the host as
//! non-configurable. It remembers which properties were requested as
//! non-configurable instead, reports them that way, and refuses to redefine
//! them for everyone except [`PatchedProperties::redefine_property`].

use super::PatchReport;
use crate::error::Error;
use crate::host::{Descriptor, Host, ObjectId, PropertyModel};
use std::cell::RefCell;
use std::collections::HashSet;
use std::rc::Rc;

/// The property model installed by [`install`](super::install).
pub struct PatchedProperties {
    delegate: Rc<dyn PropertyModel>,
    unconfigurable: RefCell<HashSet<(ObjectId, String)>>,
}

impl PatchedProperties {
    fn is_unconfigurable(&self, object: ObjectId, property: &str) -> bool {
        self.unconfigurable
            .borrow()
            .contains(&(object, property.to_string()))
    }

    /// Forces `configurable`, returning whether the caller asked for a
    /// non-configurable property.
    fn rewrite(descriptor: &mut Descriptor) -> bool {
        let requested = !descriptor.configurable;
        descriptor.configurable = true;
        requested
    }

    fn mark(&self, object: ObjectId, property: &str) {
        self.unconfigurable
            .borrow_mut()
            .insert((object, property.to_string()));
    }

    /// Defines a property without the non-configurable check.
    ///
    /// This is how interception rebinds callbacks stored on objects that user
    /// code has already locked down.
    pub fn redefine_property(&self, object: ObjectId, property: &str, mut descriptor: Descriptor) -> Result<(), Error> {
        if Self::rewrite(&mut descriptor) {
            self.mark(object, property);
        }
        self.delegate.define_property(object, property, descriptor)
    }
}

impl PropertyModel for PatchedProperties {
    fn define_property(&self, object: ObjectId, property: &str, mut descriptor: Descriptor) -> Result<(), Error> {
        if self.is_unconfigurable(object, property) {
            let owner = object.to_string();
            logwise::warn_sync!(
                "refusing to redefine {property} of {owner}",
                property = property,
                owner = owner.clone()
            );
            return Err(Error::CannotRedefine {
                property: property.to_string(),
                owner,
            });
        }
        if property != "prototype" && Self::rewrite(&mut descriptor) {
            self.mark(object, property);
        }
        self.delegate.define_property(object, property, descriptor)
    }

    fn define_properties(&self, object: ObjectId, properties: Vec<(String, Descriptor)>) -> Result<(), Error> {
        for (property, descriptor) in properties {
            self.define_property(object, &property, descriptor)?;
        }
        Ok(())
    }

    fn get_own_property_descriptor(&self, object: ObjectId, property: &str) -> Option<Descriptor> {
        let mut descriptor = self.delegate.get_own_property_descriptor(object, property)?;
        if self.is_unconfigurable(object, property) {
            descriptor.configurable = false;
        }
        Some(descriptor)
    }

    fn create(&self, prototype: Option<ObjectId>, mut properties: Vec<(String, Descriptor)>) -> Result<ObjectId, Error> {
        let requested: Vec<String> = properties
            .iter_mut()
            .filter_map(|(property, descriptor)| Self::rewrite(descriptor).then(|| property.clone()))
            .collect();
        let object = self.delegate.create(prototype, properties)?;
        for property in requested {
            self.mark(object, &property);
        }
        Ok(object)
    }
}

pub(super) fn patch_properties(host: &mut Host, report: &mut PatchReport) -> Option<Rc<PatchedProperties>> {
    let Some(delegate) = host.properties.take() else {
        report.skipped("Object.defineProperty");
        return None;
    };
    let patched = Rc::new(PatchedProperties {
        delegate,
        unconfigurable: RefCell::new(HashSet::new()),
    });
    host.properties = Some(patched.clone());
    report.patched("Object.defineProperty");
    Some(patched)
}
