//! The type-directed value engine.
//!
//! Stored values are plain [`serde_json::Value`] trees whose shape mirrors
//! the [`TypeReference`] they were created for. Nothing here is generated per
//! type: every capability (initialize, describe, visit) is one function that
//! matches on the closed set of type bodies and built-in kinds.
//!
//! | type | shape |
//! |---|---|
//! | `void`, `json`, `ref<T>` | `null` (a `ref` may also hold a root name) |
//! | numbers, `flags<E>`, enums | number |
//! | `list<T>`, `array<T,N>`, `bytes`, vectors | array |
//! | `variant<T...>` | `[active index, payload]` |
//! | `map<K,V>` | array of `[key, value]` pairs |
//! | `own<T>` | `null` or the owned value itself |
//! | struct, class | object keyed by field name |

// used to print out readable forms of a path
use std::fmt;

use serde_json::{Map, Value, json};

use crate::construct::{BuiltinKind, TypeBody, TypeHandle, TypeReference, VectorComponent};
use crate::registry::TypeRegistry;

// ------------- Paths -------------
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum PathSegment {
    Field(String),
    Index(usize),
    /// The payload of a variant.
    Payload,
    /// The value owned by an `own<T>`.
    Pointee,
    MapKey(usize),
    MapValue(usize),
}

/// Structural location of a value below its root.
#[derive(Clone, Debug, Default, PartialEq, Eq, Hash)]
pub struct ValuePath(Vec<PathSegment>);

impl ValuePath {
    pub fn new() -> Self {
        Self(Vec::new())
    }
    pub fn segments(&self) -> &[PathSegment] {
        &self.0
    }
    pub fn is_root(&self) -> bool {
        self.0.is_empty()
    }
    fn push(&mut self, segment: PathSegment) {
        self.0.push(segment);
    }
    fn pop(&mut self) {
        self.0.pop();
    }
    /// Follows the path down from `root`.
    pub fn resolve<'v>(&self, root: &'v Value) -> Option<&'v Value> {
        self.0.iter().try_fold(root, |value, segment| child(value, segment))
    }
}
impl fmt::Display for ValuePath {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        for segment in &self.0 {
            match segment {
                PathSegment::Field(name) => write!(f, ".{}", name)?,
                PathSegment::Index(index) => write!(f, "[{}]", index)?,
                PathSegment::Payload => write!(f, ".value")?,
                PathSegment::Pointee => write!(f, "*")?,
                PathSegment::MapKey(index) => write!(f, "[{}].key", index)?,
                PathSegment::MapValue(index) => write!(f, "[{}].value", index)?,
            }
        }
        Ok(())
    }
}

fn child<'v>(value: &'v Value, segment: &PathSegment) -> Option<&'v Value> {
    match segment {
        PathSegment::Field(name) => value.as_object()?.get(name),
        PathSegment::Index(index) => value.as_array()?.get(*index),
        PathSegment::Payload => value.as_array()?.get(1),
        PathSegment::Pointee => (!value.is_null()).then_some(value),
        PathSegment::MapKey(index) => value.as_array()?.get(*index)?.as_array()?.first(),
        PathSegment::MapValue(index) => value.as_array()?.get(*index)?.as_array()?.get(1),
    }
}

fn child_mut<'v>(value: &'v mut Value, segment: &PathSegment) -> Option<&'v mut Value> {
    match segment {
        PathSegment::Field(name) => value.as_object_mut()?.get_mut(name),
        PathSegment::Index(index) => value.as_array_mut()?.get_mut(*index),
        PathSegment::Payload => value.as_array_mut()?.get_mut(1),
        PathSegment::Pointee => (!value.is_null()).then_some(value),
        PathSegment::MapKey(index) => value.as_array_mut()?.get_mut(*index)?.as_array_mut()?.first_mut(),
        PathSegment::MapValue(index) => value.as_array_mut()?.get_mut(*index)?.as_array_mut()?.get_mut(1),
    }
}

// ------------- Initialize -------------
/// The canonical default value of a type.
pub fn initialize(registry: &TypeRegistry, reference: &TypeReference) -> Value {
    let Some(definition) = registry.get(reference.handle) else {
        return Value::Null;
    };
    match definition.body() {
        TypeBody::BuiltIn(builtin) => initialize_builtin(registry, builtin.kind, reference),
        TypeBody::Enum(enumeration) => json!(enumeration.default_value()),
        TypeBody::Struct(_) | TypeBody::Class(_) => {
            let mut object = Map::new();
            for (_, field) in registry.all_fields(reference.handle) {
                object.insert(field.name.clone(), initialize(registry, &field.field_type));
            }
            Value::Object(object)
        }
    }
}

/// Overwrites `slot` with the default value of a type.
pub fn initialize_into(registry: &TypeRegistry, reference: &TypeReference, slot: &mut Value) {
    *slot = initialize(registry, reference);
}

/// How many values the default of `reference` is made of, counting every
/// array element and record field. Saturates; a record met again inside
/// itself counts as unbounded.
pub fn default_size(registry: &TypeRegistry, reference: &TypeReference) -> u64 {
    let mut within = Vec::new();
    size_of_default(registry, reference, &mut within)
}

fn size_of_default(registry: &TypeRegistry, reference: &TypeReference, within: &mut Vec<TypeHandle>) -> u64 {
    let Some(definition) = registry.get(reference.handle) else {
        return 1;
    };
    match definition.body() {
        TypeBody::Struct(_) | TypeBody::Class(_) => {
            if within.contains(&reference.handle) {
                return u64::MAX;
            }
            within.push(reference.handle);
            let size = registry
                .all_fields(reference.handle)
                .into_iter()
                .fold(1u64, |total, (_, field)| {
                    total.saturating_add(size_of_default(registry, &field.field_type, within))
                });
            within.pop();
            size
        }
        TypeBody::Enum(_) => 1,
        TypeBody::BuiltIn(builtin) => match builtin.kind {
            BuiltinKind::Array => {
                let count = reference.size_argument(1).unwrap_or(0);
                let element = reference
                    .type_argument(0)
                    .map_or(1, |element| size_of_default(registry, element, within));
                count.saturating_mul(element).saturating_add(1)
            }
            BuiltinKind::Variant => reference
                .type_argument(0)
                .map_or(1, |first| size_of_default(registry, first, within).saturating_add(1)),
            BuiltinKind::Vector(_, size) => 1 + size as u64,
            _ => 1,
        },
    }
}

fn initialize_builtin(registry: &TypeRegistry, kind: BuiltinKind, reference: &TypeReference) -> Value {
    match kind {
        BuiltinKind::Void | BuiltinKind::Json | BuiltinKind::Ref | BuiltinKind::Own => Value::Null,
        BuiltinKind::F32 | BuiltinKind::F64 => json!(0.0),
        BuiltinKind::I8
        | BuiltinKind::I16
        | BuiltinKind::I32
        | BuiltinKind::I64
        | BuiltinKind::U8
        | BuiltinKind::U16
        | BuiltinKind::U32
        | BuiltinKind::U64
        | BuiltinKind::Flags => json!(0),
        BuiltinKind::Bool => json!(false),
        BuiltinKind::String => json!(""),
        BuiltinKind::Bytes | BuiltinKind::List | BuiltinKind::Map => json!([]),
        BuiltinKind::Array => {
            let size = reference.size_argument(1).unwrap_or(0);
            let element = match reference.type_argument(0) {
                Some(element) => initialize(registry, element),
                None => Value::Null,
            };
            Value::Array(vec![element; size as usize])
        }
        BuiltinKind::Variant => {
            let payload = match reference.type_argument(0) {
                Some(first) => initialize(registry, first),
                None => Value::Null,
            };
            json!([0, payload])
        }
        BuiltinKind::Vector(component, size) => {
            let zero = match component {
                VectorComponent::Bool => json!(false),
                VectorComponent::Int | VectorComponent::Unsigned => json!(0),
                VectorComponent::Double | VectorComponent::Float => json!(0.0),
            };
            Value::Array(vec![zero; size as usize])
        }
    }
}

// ------------- Visit -------------
/// The typed child slots of a composite value, as present in `value`.
/// Scalars and `ref<T>` have none.
fn children(registry: &TypeRegistry, reference: &TypeReference, value: &Value) -> Vec<(TypeReference, PathSegment)> {
    let Some(definition) = registry.get(reference.handle) else {
        return Vec::new();
    };
    match definition.body() {
        TypeBody::Struct(_) | TypeBody::Class(_) => {
            let Some(object) = value.as_object() else {
                return Vec::new();
            };
            registry
                .all_fields(reference.handle)
                .into_iter()
                .filter(|(_, field)| object.contains_key(&field.name))
                .map(|(_, field)| (field.field_type.clone(), PathSegment::Field(field.name.clone())))
                .collect()
        }
        TypeBody::Enum(_) => Vec::new(),
        TypeBody::BuiltIn(builtin) => match builtin.kind {
            BuiltinKind::List | BuiltinKind::Array => match (reference.type_argument(0), value.as_array()) {
                (Some(element), Some(items)) => (0..items.len())
                    .map(|index| (element.clone(), PathSegment::Index(index)))
                    .collect(),
                _ => Vec::new(),
            },
            BuiltinKind::Variant => {
                let active = value
                    .as_array()
                    .filter(|pair| pair.len() == 2)
                    .and_then(|pair| pair[0].as_u64());
                match active.and_then(|index| reference.type_argument(index as usize)) {
                    Some(alternative) => vec![(alternative.clone(), PathSegment::Payload)],
                    None => Vec::new(),
                }
            }
            BuiltinKind::Own => match reference.type_argument(0) {
                Some(pointee) if !value.is_null() => vec![(pointee.clone(), PathSegment::Pointee)],
                _ => Vec::new(),
            },
            BuiltinKind::Map => match (reference.type_argument(0), reference.type_argument(1), value.as_array()) {
                (Some(key), Some(mapped), Some(pairs)) => (0..pairs.len())
                    .flat_map(|index| {
                        [
                            (key.clone(), PathSegment::MapKey(index)),
                            (mapped.clone(), PathSegment::MapValue(index)),
                        ]
                    })
                    .collect(),
                _ => Vec::new(),
            },
            _ => Vec::new(),
        },
    }
}

/// Walks every child of `value` in pre-order. The callback receives the
/// child's type, its path below `value` and the child itself; returning
/// `true` stops the walk. Returns whether the walk was stopped.
pub fn visit<F>(registry: &TypeRegistry, reference: &TypeReference, value: &Value, callback: &mut F) -> bool
where
    F: FnMut(&TypeReference, &ValuePath, &Value) -> bool,
{
    let mut path = ValuePath::new();
    walk(registry, reference, value, &mut path, callback)
}

fn walk<F>(registry: &TypeRegistry, reference: &TypeReference, value: &Value, path: &mut ValuePath, callback: &mut F) -> bool
where
    F: FnMut(&TypeReference, &ValuePath, &Value) -> bool,
{
    for (child_type, segment) in children(registry, reference, value) {
        let Some(child_value) = child(value, &segment) else {
            continue;
        };
        path.push(segment);
        let stop = callback(&child_type, path, child_value) || walk(registry, &child_type, child_value, path, callback);
        path.pop();
        if stop {
            return true;
        }
    }
    false
}

/// Mutable twin of [`visit`]. Children are recomputed after the callback
/// has seen a value, so a callback may reshape what it is handed.
pub fn visit_mut<F>(registry: &TypeRegistry, reference: &TypeReference, value: &mut Value, callback: &mut F) -> bool
where
    F: FnMut(&TypeReference, &ValuePath, &mut Value) -> bool,
{
    let mut path = ValuePath::new();
    walk_mut(registry, reference, value, &mut path, callback)
}

fn walk_mut<F>(
    registry: &TypeRegistry,
    reference: &TypeReference,
    value: &mut Value,
    path: &mut ValuePath,
    callback: &mut F,
) -> bool
where
    F: FnMut(&TypeReference, &ValuePath, &mut Value) -> bool,
{
    for (child_type, segment) in children(registry, reference, value) {
        let Some(child_value) = child_mut(value, &segment) else {
            continue;
        };
        path.push(segment);
        let stop = callback(&child_type, path, &mut *child_value)
            || walk_mut(registry, &child_type, child_value, path, callback);
        path.pop();
        if stop {
            return true;
        }
    }
    false
}

/// True if `value` holds, anywhere below it, a value whose type mentions `handle`.
pub fn contains_type(registry: &TypeRegistry, reference: &TypeReference, value: &Value, handle: TypeHandle) -> bool {
    reference.mentions(handle) || visit(registry, reference, value, &mut |child_type, _, _| child_type.mentions(handle))
}

// ------------- Describe -------------
/// A short human-readable rendering, used for debug dumps and backups.
pub fn describe(registry: &TypeRegistry, reference: &TypeReference, value: &Value) -> String {
    let Some(definition) = registry.get(reference.handle) else {
        return value.to_string();
    };
    match definition.body() {
        TypeBody::Struct(_) | TypeBody::Class(_) => {
            let parts: Vec<String> = children(registry, reference, value)
                .into_iter()
                .filter_map(|(field_type, segment)| {
                    let field_value = child(value, &segment)?;
                    match segment {
                        PathSegment::Field(name) => {
                            Some(format!("{}: {}", name, describe(registry, &field_type, field_value)))
                        }
                        _ => None,
                    }
                })
                .collect();
            format!("{} {{ {} }}", definition.name(), parts.join(", "))
        }
        TypeBody::Enum(enumeration) => {
            let values = enumeration.values();
            value
                .as_i64()
                .and_then(|number| values.iter().position(|v| *v == number))
                .map(|index| enumeration.enumerators[index].name.clone())
                .unwrap_or_else(|| value.to_string())
        }
        TypeBody::BuiltIn(builtin) => match builtin.kind {
            BuiltinKind::Own if value.is_null() => "null".into(),
            BuiltinKind::Own => match reference.type_argument(0) {
                Some(pointee) => format!("own {}", describe(registry, pointee, value)),
                None => value.to_string(),
            },
            BuiltinKind::Variant => match children(registry, reference, value).into_iter().next() {
                Some((alternative, segment)) => {
                    let payload = child(value, &segment).cloned().unwrap_or(Value::Null);
                    format!("{}({})", registry.render(&alternative), describe(registry, &alternative, &payload))
                }
                None => value.to_string(),
            },
            BuiltinKind::List | BuiltinKind::Array => {
                let items: Vec<String> = children(registry, reference, value)
                    .into_iter()
                    .filter_map(|(element, segment)| child(value, &segment).map(|v| describe(registry, &element, v)))
                    .collect();
                format!("[{}]", items.join(", "))
            }
            _ => value.to_string(),
        },
    }
}

// ------------- Shape -------------
/// Whether `value` has exactly the shape `reference` calls for, all the way down.
pub fn conforms(registry: &TypeRegistry, reference: &TypeReference, value: &Value) -> bool {
    let Some(definition) = registry.get(reference.handle) else {
        return false;
    };
    match definition.body() {
        TypeBody::Enum(_) => value.is_i64() || value.is_u64(),
        TypeBody::Struct(_) | TypeBody::Class(_) => {
            let Some(object) = value.as_object() else {
                return false;
            };
            let fields = registry.all_fields(reference.handle);
            object.len() == fields.len()
                && fields.iter().all(|(_, field)| {
                    object
                        .get(&field.name)
                        .is_some_and(|field_value| conforms(registry, &field.field_type, field_value))
                })
        }
        TypeBody::BuiltIn(builtin) => {
            let all_conform = |element: Option<&TypeReference>, items: &[Value]| {
                element.is_some_and(|element| items.iter().all(|item| conforms(registry, element, item)))
            };
            match builtin.kind {
                BuiltinKind::Void => value.is_null(),
                BuiltinKind::Json => true,
                BuiltinKind::F32 | BuiltinKind::F64 => value.is_number(),
                BuiltinKind::Bool => value.is_boolean(),
                BuiltinKind::String => value.is_string(),
                BuiltinKind::Flags => value.is_u64(),
                kind if kind.is_integral() => integer_fits(kind, value),
                BuiltinKind::Bytes => value
                    .as_array()
                    .is_some_and(|bytes| bytes.iter().all(|byte| integer_fits(BuiltinKind::U8, byte))),
                BuiltinKind::List => value
                    .as_array()
                    .is_some_and(|items| all_conform(reference.type_argument(0), items)),
                BuiltinKind::Array => value.as_array().is_some_and(|items| {
                    reference.size_argument(1) == Some(items.len() as u64)
                        && all_conform(reference.type_argument(0), items)
                }),
                BuiltinKind::Ref => value.is_null() || value.is_string(),
                BuiltinKind::Own => {
                    value.is_null()
                        || reference
                            .type_argument(0)
                            .is_some_and(|pointee| conforms(registry, pointee, value))
                }
                BuiltinKind::Variant => match value.as_array().map(Vec::as_slice) {
                    Some([index, payload]) => index
                        .as_u64()
                        .and_then(|index| reference.type_argument(index as usize))
                        .is_some_and(|alternative| conforms(registry, alternative, payload)),
                    _ => false,
                },
                BuiltinKind::Map => value.as_array().is_some_and(|pairs| {
                    pairs.iter().all(|pair| match pair.as_array().map(Vec::as_slice) {
                        Some([key, mapped]) => {
                            all_conform(reference.type_argument(0), std::slice::from_ref(key))
                                && all_conform(reference.type_argument(1), std::slice::from_ref(mapped))
                        }
                        _ => false,
                    })
                }),
                BuiltinKind::Vector(component, size) => value.as_array().is_some_and(|components| {
                    components.len() == size as usize
                        && components.iter().all(|part| match component {
                            VectorComponent::Bool => part.is_boolean(),
                            VectorComponent::Int | VectorComponent::Unsigned => integer_fits(component.scalar(), part),
                            VectorComponent::Double | VectorComponent::Float => part.is_number(),
                        })
                }),
                _ => false,
            }
        }
    }
}

fn integer_fits(kind: BuiltinKind, value: &Value) -> bool {
    if let Some(i) = value.as_i64() {
        match kind {
            BuiltinKind::I8 => i8::try_from(i).is_ok(),
            BuiltinKind::I16 => i16::try_from(i).is_ok(),
            BuiltinKind::I32 => i32::try_from(i).is_ok(),
            BuiltinKind::I64 => true,
            BuiltinKind::U8 => u8::try_from(i).is_ok(),
            BuiltinKind::U16 => u16::try_from(i).is_ok(),
            BuiltinKind::U32 => u32::try_from(i).is_ok(),
            BuiltinKind::U64 => i >= 0,
            _ => false,
        }
    } else {
        kind == BuiltinKind::U64 && value.is_u64()
    }
}
