//! Data stores: named root values typed by the schema.
//!
//! A store is the keeper of its roots. The schema never reaches into a store
//! on its own; migrations go through the helpers below, which find every
//! value of interest by walking roots with [`visit_mut`].

use std::collections::BTreeMap;

use serde_json::{Map, Value};

use crate::construct::{TypeHandle, TypeReference};
use crate::datatype::{ValuePath, contains_type, initialize, visit_mut};
use crate::registry::TypeRegistry;

#[derive(Clone, Debug, PartialEq)]
pub struct RootValue {
    pub type_ref: TypeReference,
    pub value: Value,
}

impl RootValue {
    pub fn new(type_ref: TypeReference, value: Value) -> Self {
        Self { type_ref, value }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct DataStore {
    name: String,
    roots: BTreeMap<String, RootValue>,
}

impl DataStore {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_owned(),
            roots: BTreeMap::new(),
        }
    }
    pub fn name(&self) -> &str {
        &self.name
    }
    pub fn roots(&self) -> &BTreeMap<String, RootValue> {
        &self.roots
    }
    pub fn root(&self, name: &str) -> Option<&RootValue> {
        self.roots.get(name)
    }
    pub fn len(&self) -> usize {
        self.roots.len()
    }
    pub fn is_empty(&self) -> bool {
        self.roots.is_empty()
    }
    /// Returns the root previously kept under `name`, if any.
    pub(crate) fn keep(&mut self, name: &str, root: RootValue) -> Option<RootValue> {
        self.roots.insert(name.to_owned(), root)
    }
    pub(crate) fn root_mut(&mut self, name: &str) -> Option<&mut RootValue> {
        self.roots.get_mut(name)
    }
    pub(crate) fn remove(&mut self, name: &str) -> Option<RootValue> {
        self.roots.remove(name)
    }
    /// Names of the roots holding data of type `handle` anywhere inside them.
    pub fn mentions(&self, registry: &TypeRegistry, handle: TypeHandle) -> Vec<String> {
        self.roots
            .iter()
            .filter(|(_, root)| contains_type(registry, &root.type_ref, &root.value, handle))
            .map(|(name, _)| name.clone())
            .collect()
    }

    /// Hands every value whose declared type satisfies `matches` to `f`,
    /// roots first, then their children in pre-order. Returns how many
    /// values were handed over.
    pub fn for_each_value_mut<P, F>(&mut self, registry: &TypeRegistry, mut matches: P, mut f: F) -> usize
    where
        P: FnMut(&TypeReference) -> bool,
        F: FnMut(&str, &ValuePath, &TypeReference, &mut Value),
    {
        let mut count = 0;
        for (name, root) in self.roots.iter_mut() {
            let RootValue { type_ref, value } = root;
            if matches(type_ref) {
                f(name.as_str(), &ValuePath::new(), type_ref, value);
                count += 1;
            }
            visit_mut(registry, type_ref, value, &mut |child_type, path, child| {
                if matches(child_type) {
                    f(name.as_str(), path, child_type, child);
                    count += 1;
                }
                false
            });
        }
        count
    }

    /// Every object whose declared type is `record` or derives from it.
    /// The callback also receives the object's own declared type.
    pub fn for_each_record_mut<F>(&mut self, registry: &TypeRegistry, record: TypeHandle, mut f: F) -> usize
    where
        F: FnMut(&str, &ValuePath, TypeHandle, &mut Map<String, Value>),
    {
        self.for_each_value_mut(
            registry,
            |declared| registry.is_parent_of(record, declared.handle),
            |root, path, declared, value| {
                if let Some(object) = value.as_object_mut() {
                    f(root, path, declared.handle, object);
                }
            },
        )
    }
}

// ------------- Object helpers -------------
/// Makes `object` hold exactly the effective fields of `record`, in field
/// order. Missing fields get their default value. Keys that are not fields
/// (any more) are taken out and returned.
pub fn conform(registry: &TypeRegistry, record: TypeHandle, object: &mut Map<String, Value>) -> Vec<(String, Value)> {
    let mut previous = std::mem::take(object);
    for (_, field) in registry.all_fields(record) {
        let value = previous
            .remove(&field.name)
            .unwrap_or_else(|| initialize(registry, &field.field_type));
        object.insert(field.name.clone(), value);
    }
    previous.into_iter().collect()
}

/// Renames a key in place, keeping its position.
pub fn rename_key(object: &mut Map<String, Value>, from: &str, to: &str) {
    let previous = std::mem::take(object);
    for (key, value) in previous {
        if key == from {
            object.insert(to.to_owned(), value);
        } else {
            object.insert(key, value);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn renamed_keys_keep_their_position() {
        let mut object = json!({"a": 1, "b": 2, "c": 3});
        let map = object.as_object_mut().unwrap();
        rename_key(map, "b", "x");
        let keys: Vec<&String> = map.keys().collect();
        assert_eq!(keys, ["a", "x", "c"]);
        assert_eq!(map["x"], json!(2));
    }
}
