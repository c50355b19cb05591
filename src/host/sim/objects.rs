// SPDX-License-Identifier: MIT OR Apache-2.0

//! An object store with native property-definition semantics.

use super::SimHost;
use crate::error::Error;
use crate::host::{Descriptor, ObjectId, PropertyModel, Slot};
use serde_json::Value;
use std::collections::BTreeMap;

struct ObjectData {
    prototype: Option<ObjectId>,
    properties: BTreeMap<String, Descriptor>,
}

#[derive(Default)]
pub(super) struct Objects {
    objects: Vec<ObjectData>,
}

impl Objects {
    fn object_mut(&mut self, id: ObjectId) -> Result<&mut ObjectData, Error> {
        self.objects.get_mut(id.0 as usize).ok_or(Error::UnknownObject(id))
    }

    fn define(&mut self, id: ObjectId, property: &str, descriptor: Descriptor) -> Result<(), Error> {
        let object = self.object_mut(id)?;
        if let Some(existing) = object.properties.get(property) {
            if !existing.configurable {
                return Err(Error::CannotRedefine {
                    property: property.to_string(),
                    owner: id.to_string(),
                });
            }
        }
        object.properties.insert(property.to_string(), descriptor);
        Ok(())
    }
}

impl SimHost {
    /// Creates an empty object with no prototype.
    pub fn create_object(&self) -> ObjectId {
        let mut objects = self.inner.objects.borrow_mut();
        objects.objects.push(ObjectData {
            prototype: None,
            properties: BTreeMap::new(),
        });
        ObjectId(objects.objects.len() as u64 - 1)
    }

    pub(super) fn has_object(&self, id: ObjectId) -> bool {
        (id.0 as usize) < self.inner.objects.borrow().objects.len()
    }

    /// Reads a property, following the prototype chain.
    ///
    /// Accessor properties are read by calling their getter.
    pub fn property(&self, object: ObjectId, name: &str) -> Option<Slot> {
        let found = {
            let objects = self.inner.objects.borrow();
            let mut current = Some(object);
            let mut found = None;
            while let Some(id) = current {
                let Some(data) = objects.objects.get(id.0 as usize) else {
                    break;
                };
                if let Some(descriptor) = data.properties.get(name) {
                    found = Some(descriptor.clone());
                    break;
                }
                current = data.prototype;
            }
            found
        };
        let descriptor = found?;
        match (&descriptor.get, descriptor.value) {
            (Some(getter), _) => self.invoke(getter, &[]).map(Slot::Value),
            (None, value) => value.or(Some(Slot::Value(Value::Null))),
        }
    }
}

impl PropertyModel for SimHost {
    fn define_property(&self, object: ObjectId, property: &str, descriptor: Descriptor) -> Result<(), Error> {
        self.inner.objects.borrow_mut().define(object, property, descriptor)
    }

    fn define_properties(&self, object: ObjectId, properties: Vec<(String, Descriptor)>) -> Result<(), Error> {
        let mut objects = self.inner.objects.borrow_mut();
        for (property, descriptor) in properties {
            objects.define(object, &property, descriptor)?;
        }
        Ok(())
    }

    fn get_own_property_descriptor(&self, object: ObjectId, property: &str) -> Option<Descriptor> {
        self.inner
            .objects
            .borrow()
            .objects
            .get(object.0 as usize)
            .and_then(|data| data.properties.get(property).cloned())
    }

    fn create(&self, prototype: Option<ObjectId>, properties: Vec<(String, Descriptor)>) -> Result<ObjectId, Error> {
        if let Some(prototype) = prototype {
            if !self.has_object(prototype) {
                return Err(Error::UnknownObject(prototype));
            }
        }
        let id = self.create_object();
        let mut objects = self.inner.objects.borrow_mut();
        objects.object_mut(id)?.prototype = prototype;
        for (property, descriptor) in properties {
            objects.define(id, &property, descriptor)?;
        }
        Ok(id)
    }
}
