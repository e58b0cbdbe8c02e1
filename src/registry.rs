//! The keeper of type definitions.
//!
//! Definitions are owned by an arena and addressed by [`TypeHandle`]; a
//! bidirectional map keeps names and handles in sync so that lookups in
//! either direction are constant time.

use std::collections::HashMap;
use std::hash::BuildHasherDefault;

// used to keep the one-to-one mapping between names and handles
use bimap::BiMap;
use seahash::SeaHasher;

use crate::construct::{
    BuiltinKind, FieldDefinition, Qualifier, TemplateArgument, TypeDefinition, TypeHandle,
    TypeReference, TypeVariant,
};
use crate::error::{Result, TypewrightError};

pub type OtherHasher = BuildHasherDefault<SeaHasher>;

#[derive(Debug, Clone)]
pub struct TypeRegistry {
    kept: Vec<Option<TypeDefinition>>,
    names: BiMap<String, TypeHandle>,
    builtins: HashMap<BuiltinKind, TypeHandle, OtherHasher>,
}

impl Default for TypeRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl TypeRegistry {
    /// Creates a registry seeded with every built-in type. `void` is always
    /// the first handle.
    pub fn new() -> Self {
        let mut registry = Self {
            kept: Vec::new(),
            names: BiMap::new(),
            builtins: HashMap::default(),
        };
        for kind in BuiltinKind::all() {
            let handle = registry.push(TypeDefinition::builtin(kind));
            registry.builtins.insert(kind, handle);
        }
        registry
    }
    fn push(&mut self, definition: TypeDefinition) -> TypeHandle {
        let handle = TypeHandle(self.kept.len());
        self.names.insert(definition.name.clone(), handle);
        self.kept.push(Some(definition));
        handle
    }
    /// Takes ownership of a new definition. Its name must be unused.
    pub fn keep(&mut self, definition: TypeDefinition) -> Result<TypeHandle> {
        if self.names.contains_left(&definition.name) {
            return Err(TypewrightError::Invariant(format!(
                "a type named '{}' is already kept",
                definition.name
            )));
        }
        Ok(self.push(definition))
    }
    pub fn resolve(&self, name: &str) -> Option<TypeHandle> {
        self.names.get_by_left(name).copied()
    }
    pub fn get(&self, handle: TypeHandle) -> Option<&TypeDefinition> {
        self.kept.get(handle.0).and_then(Option::as_ref)
    }
    /// Like [`get`](Self::get), but a stale handle is an invariant violation.
    pub fn definition(&self, handle: TypeHandle) -> Result<&TypeDefinition> {
        self.get(handle)
            .ok_or_else(|| TypewrightError::Invariant(format!("no type is kept for handle {}", handle)))
    }
    pub(crate) fn definition_mut(&mut self, handle: TypeHandle) -> Result<&mut TypeDefinition> {
        self.kept
            .get_mut(handle.0)
            .and_then(Option::as_mut)
            .ok_or_else(|| TypewrightError::Invariant(format!("no type is kept for handle {}", handle)))
    }
    pub fn name_of(&self, handle: TypeHandle) -> &str {
        self.get(handle).map(TypeDefinition::name).unwrap_or("<deleted>")
    }
    pub fn builtin(&self, kind: BuiltinKind) -> Option<TypeHandle> {
        self.builtins.get(&kind).copied()
    }
    pub fn void(&self) -> TypeHandle {
        TypeHandle(0)
    }
    pub fn is_void(&self, handle: TypeHandle) -> bool {
        handle == self.void()
    }
    pub fn builtin_kind(&self, handle: TypeHandle) -> Option<BuiltinKind> {
        self.get(handle).and_then(TypeDefinition::builtin_kind)
    }
    pub(crate) fn rename(&mut self, handle: TypeHandle, new_name: &str) -> Result<()> {
        let definition = self.definition_mut(handle)?;
        definition.name = new_name.to_owned();
        self.names.remove_by_right(&handle);
        self.names.insert(new_name.to_owned(), handle);
        Ok(())
    }
    pub(crate) fn remove(&mut self, handle: TypeHandle) -> Result<TypeDefinition> {
        let removed = self
            .kept
            .get_mut(handle.0)
            .and_then(Option::take)
            .ok_or_else(|| TypewrightError::Invariant(format!("no type is kept for handle {}", handle)))?;
        self.names.remove_by_right(&handle);
        Ok(removed)
    }
    pub fn len(&self) -> usize {
        self.names.len()
    }
    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }
    /// Every live handle, built-ins included, in declaration order.
    pub fn handles(&self) -> Vec<TypeHandle> {
        self.kept
            .iter()
            .enumerate()
            .filter(|(_, kept)| kept.is_some())
            .map(|(index, _)| TypeHandle(index))
            .collect()
    }
    /// Every user-defined type in declaration order.
    pub fn user_types(&self) -> Vec<TypeHandle> {
        self.handles()
            .into_iter()
            .filter(|handle| self.get(*handle).is_some_and(|definition| !definition.is_builtin()))
            .collect()
    }
    /// Mints an unused name by appending 1, 2, 3... to `base`.
    pub fn fresh_type_name(&self, base: &str) -> String {
        (1..)
            .map(|suffix| format!("{}{}", base, suffix))
            .find(|candidate| self.resolve(candidate).is_none())
            .unwrap_or_else(|| base.to_owned())
    }

    // ------------- Hierarchy -------------
    pub fn base_of(&self, handle: TypeHandle) -> Option<TypeHandle> {
        self.get(handle)
            .and_then(TypeDefinition::base_type)
            .map(|base| base.handle)
    }
    /// Walks the base chain of `child`; true if `parent` is on it. A type
    /// counts as its own parent here, which is what cycle prevention needs.
    pub fn is_parent_of(&self, parent: TypeHandle, child: TypeHandle) -> bool {
        let mut current = Some(child);
        // the chain can never be longer than the arena
        for _ in 0..=self.kept.len() {
            match current {
                Some(handle) if handle == parent => return true,
                Some(handle) => current = self.base_of(handle),
                None => return false,
            }
        }
        false
    }
    /// Like [`is_parent_of`](Self::is_parent_of) but a type is never its own ancestor.
    pub fn is_strict_ancestor(&self, ancestor: TypeHandle, descendant: TypeHandle) -> bool {
        ancestor != descendant && self.is_parent_of(ancestor, descendant)
    }
    /// Ancestors of `handle`, nearest first.
    pub fn ancestors_of(&self, handle: TypeHandle) -> Vec<TypeHandle> {
        let mut ancestors = Vec::new();
        let mut current = self.base_of(handle);
        while let Some(ancestor) = current {
            if ancestor == handle || ancestors.contains(&ancestor) {
                break;
            }
            ancestors.push(ancestor);
            current = self.base_of(ancestor);
        }
        ancestors
    }
    pub fn children_of(&self, handle: TypeHandle) -> Vec<TypeHandle> {
        self.handles()
            .into_iter()
            .filter(|candidate| self.base_of(*candidate) == Some(handle))
            .collect()
    }
    /// All direct and indirect children of `handle`, excluding itself.
    pub fn descendants_of(&self, handle: TypeHandle) -> Vec<TypeHandle> {
        self.handles()
            .into_iter()
            .filter(|candidate| self.is_strict_ancestor(handle, *candidate))
            .collect()
    }
    /// The effective fields of a record: root-most ancestor's fields first,
    /// then each descendant's, ending with the record's own.
    pub fn all_fields(&self, record: TypeHandle) -> Vec<(TypeHandle, &FieldDefinition)> {
        let mut chain = self.ancestors_of(record);
        chain.reverse();
        chain.push(record);
        chain
            .into_iter()
            .filter_map(|owner| self.get(owner).and_then(TypeDefinition::record).map(|r| (owner, r)))
            .flat_map(|(owner, record)| record.fields.iter().map(move |field| (owner, field)))
            .collect()
    }
    pub fn all_field_names(&self, record: TypeHandle) -> Vec<String> {
        self.all_fields(record)
            .into_iter()
            .map(|(_, field)| field.name.clone())
            .collect()
    }

    // ------------- Qualifiers -------------
    /// Whether the type behind `handle` may be substituted for a parameter
    /// carrying `qualifier`.
    pub fn satisfies(&self, handle: TypeHandle, qualifier: Qualifier) -> bool {
        let Some(definition) = self.get(handle) else {
            return false;
        };
        let variant = definition.variant();
        match qualifier {
            Qualifier::AnyType => true,
            Qualifier::Size => false,
            Qualifier::Struct => variant == TypeVariant::Struct,
            Qualifier::Class => variant == TypeVariant::Class,
            Qualifier::Enum => variant == TypeVariant::Enum,
            Qualifier::NotClass => variant != TypeVariant::Class,
            Qualifier::Integral | Qualifier::Floating | Qualifier::Pointer => definition.has_qualifier(qualifier),
            Qualifier::Scalar => variant == TypeVariant::Enum || definition.has_qualifier(qualifier),
        }
    }

    // ------------- Rendering -------------
    /// Canonical text of a reference: the name, then bracketed, comma-joined
    /// arguments, e.g. `map<string,list<i32>>`.
    pub fn render(&self, reference: &TypeReference) -> String {
        let mut rendered = self.name_of(reference.handle).to_owned();
        if !reference.arguments.is_empty() {
            let arguments: Vec<String> = reference
                .arguments
                .iter()
                .map(|argument| match argument {
                    TemplateArgument::Size(size) => size.to_string(),
                    TemplateArgument::Type(inner) => self.render(inner),
                })
                .collect();
            rendered.push('<');
            rendered.push_str(&arguments.join(","));
            rendered.push('>');
        }
        rendered
    }
}
