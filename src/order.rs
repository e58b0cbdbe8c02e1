//! Emission order for code generators.
//!
//! A type has to be emitted after everything it holds by value: its base
//! type, its field types, and whatever sits in their template slots that must
//! be complete. Types behind `ref<>` and `own<>` may come later, which is what
//! lets self-referential schemas be ordered at all.

use std::collections::HashSet;

use crate::construct::{TemplateArgument, TemplateParameter, TypeHandle, TypeReference};
use crate::registry::TypeRegistry;

/// Orders `definitions` so that every type comes after its required
/// dependencies. Independent types keep the order they were given in.
pub fn order(registry: &TypeRegistry, definitions: &[TypeHandle]) -> Vec<TypeHandle> {
    let wanted: HashSet<TypeHandle> = definitions.iter().copied().collect();
    let mut closed = HashSet::with_capacity(definitions.len());
    let mut ordered = Vec::with_capacity(definitions.len());
    for &handle in definitions {
        place(registry, handle, &wanted, &mut closed, &mut ordered);
    }
    ordered
}

fn place(
    registry: &TypeRegistry,
    handle: TypeHandle,
    wanted: &HashSet<TypeHandle>,
    closed: &mut HashSet<TypeHandle>,
    ordered: &mut Vec<TypeHandle>,
) {
    // closed before recursing, so a cycle ends here instead of looping
    if !closed.insert(handle) {
        return;
    }
    for dependency in required_dependencies(registry, handle) {
        if wanted.contains(&dependency) {
            place(registry, dependency, wanted, closed, ordered);
        }
    }
    ordered.push(handle);
}

/// The types that must be fully defined before `handle` can be.
pub fn required_dependencies(registry: &TypeRegistry, handle: TypeHandle) -> Vec<TypeHandle> {
    let mut dependencies = Vec::new();
    let Some(definition) = registry.get(handle) else {
        return dependencies;
    };
    if let Some(base) = definition.base_type() {
        collect(registry, base, &mut dependencies);
    }
    if let Some(record) = definition.record() {
        for field in &record.fields {
            collect(registry, &field.field_type, &mut dependencies);
        }
    }
    dependencies
}

fn collect(registry: &TypeRegistry, reference: &TypeReference, dependencies: &mut Vec<TypeHandle>) {
    if !dependencies.contains(&reference.handle) {
        dependencies.push(reference.handle);
    }
    let Some(definition) = registry.get(reference.handle) else {
        return;
    };
    for (index, argument) in reference.arguments.iter().enumerate() {
        if let TemplateArgument::Type(inner) = argument {
            if definition.parameter_for(index).is_some_and(TemplateParameter::must_be_complete) {
                collect(registry, inner, dependencies);
            }
        }
    }
}
